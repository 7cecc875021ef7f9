//! Utility functions for byte layouts and output files

use std::path::{Path, PathBuf};

/// Round `value` up to the next multiple of `align` (a power of two)
///
/// # Examples
///
/// ```
/// use nus_update::utils::align_up;
///
/// assert_eq!(align_up(0x20, 0x40), 0x40);
/// assert_eq!(align_up(0x40, 0x40), 0x40);
/// assert_eq!(align_up(17, 16), 32);
/// ```
#[must_use]
pub fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Pad `buf` with zero bytes to a multiple of `align`
pub fn pad_to(buf: &mut Vec<u8>, align: usize) {
    let padded = align_up(buf.len(), align);
    buf.resize(padded, 0);
}

/// Borrow `len` bytes at `offset`, or `None` when out of bounds
pub fn slice_at(data: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    data.get(offset..offset.checked_add(len)?)
}

/// Big-endian u16 at `offset`
pub fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = slice_at(data, offset, 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Big-endian u32 at `offset`
pub fn read_u32_be(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = slice_at(data, offset, 4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    Some(u32::from_be_bytes(buf))
}

/// Big-endian u64 at `offset`
pub fn read_u64_be(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = slice_at(data, offset, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf))
}

/// NUL-terminated ASCII string stored in a fixed-size field
pub fn read_c_string(data: &[u8], offset: usize, len: usize) -> Option<String> {
    let field = slice_at(data, offset, len)?;
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    Some(String::from_utf8_lossy(&field[..end]).into_owned())
}

/// Temporary sibling used while `path` is being written
///
/// ```
/// use std::path::Path;
/// use nus_update::utils::partial_path;
///
/// assert_eq!(
///     partial_path(Path::new("/out/0000000100000002-v513.wad")),
///     Path::new("/out/.0000000100000002-v513.wad.part"),
/// );
/// ```
pub fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.part", name))
}

/// Write `data` to `path` through a temporary file and a rename
///
/// Readers never observe a partially written file at `path`. An existing file
/// is replaced.
pub async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = partial_path(path);
    if let Err(e) = tokio::fs::write(&tmp, data).await {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(e);
    }
    tokio::fs::rename(&tmp, path).await
}
