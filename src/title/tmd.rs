//! Title metadata (TMD)
//!
//! Layout (big-endian), RSA-2048 signed:
//!
//! | offset | size  | field                 |
//! |--------|-------|-----------------------|
//! | 0x000  | 4     | signature type        |
//! | 0x004  | 0x100 | signature             |
//! | 0x140  | 0x40  | issuer                |
//! | 0x18C  | 8     | title id              |
//! | 0x1DC  | 2     | title version         |
//! | 0x1DE  | 2     | number of contents    |
//! | 0x1E0  | 2     | boot content index    |
//! | 0x1E4  | 0x24n | content records       |
//!
//! TMDs served by the CDN carry the CP and CA certificates after the last
//! content record; [`Tmd::parse`] hands those trailing bytes back.

use crate::error::TitleError;
use crate::types::TitleId;
use crate::utils::{read_c_string, read_u16_be, read_u32_be, read_u64_be, slice_at};

use super::cert::SIGNATURE_TYPE_RSA2048;

/// Size of the signed header, up to the first content record
pub const TMD_HEADER_SIZE: usize = 0x1E4;

/// Size of one content record
pub const CONTENT_RECORD_SIZE: usize = 0x24;

const ISSUER_OFFSET: usize = 0x140;
const TITLE_ID_OFFSET: usize = 0x18C;
const TITLE_VERSION_OFFSET: usize = 0x1DC;
const NUM_CONTENTS_OFFSET: usize = 0x1DE;
const BOOT_INDEX_OFFSET: usize = 0x1E0;

/// Content type flag for shared contents
pub const CONTENT_TYPE_SHARED: u16 = 0x8000;

/// One content record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentRecord {
    /// Content id, also the CDN file name
    pub content_id: u32,
    /// Index within the title
    pub index: u16,
    /// Type flags (0x0001 normal, 0x8001 shared)
    pub content_type: u16,
    /// Decrypted size in bytes
    pub size: u64,
    /// SHA-1 of the decrypted content
    pub hash: [u8; 20],
}

impl ContentRecord {
    fn parse(data: &[u8], offset: usize) -> Option<Self> {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(slice_at(data, offset + 0x10, 20)?);
        Some(Self {
            content_id: read_u32_be(data, offset)?,
            index: read_u16_be(data, offset + 4)?,
            content_type: read_u16_be(data, offset + 6)?,
            size: read_u64_be(data, offset + 8)?,
            hash,
        })
    }

    /// Size on the CDN: contents are AES-CBC encrypted and padded to 16 bytes
    ///
    /// Saturates at `u64::MAX`; [`Tmd::parse`] rejects records where that
    /// would happen.
    pub fn encrypted_size(&self) -> u64 {
        self.size.checked_next_multiple_of(16).unwrap_or(u64::MAX)
    }

    /// Whether the content is shared between titles
    pub fn is_shared(&self) -> bool {
        self.content_type & CONTENT_TYPE_SHARED != 0
    }
}

/// Parsed TMD, holding its signed bytes verbatim
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tmd {
    raw: Vec<u8>,
    issuer: String,
    title_id: TitleId,
    title_version: u16,
    boot_index: u16,
    content_records: Vec<ContentRecord>,
}

impl Tmd {
    /// Parse a TMD, ignoring anything after the last content record
    pub fn from_bytes(data: &[u8]) -> Result<Self, TitleError> {
        Self::parse(data).map(|(tmd, _)| tmd)
    }

    /// Parse a TMD and return the bytes that follow it
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), TitleError> {
        let truncated = || TitleError::InvalidTmd(format!("truncated TMD ({} bytes)", data.len()));

        let signature_type = read_u32_be(data, 0).ok_or_else(truncated)?;
        if signature_type != SIGNATURE_TYPE_RSA2048 {
            return Err(TitleError::InvalidTmd(format!(
                "unsupported signature type {:#010x}",
                signature_type
            )));
        }

        let num_contents = read_u16_be(data, NUM_CONTENTS_OFFSET).ok_or_else(truncated)? as usize;
        let len = TMD_HEADER_SIZE + num_contents * CONTENT_RECORD_SIZE;
        if data.len() < len {
            return Err(truncated());
        }

        let content_records = (0..num_contents)
            .map(|i| ContentRecord::parse(data, TMD_HEADER_SIZE + i * CONTENT_RECORD_SIZE))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(truncated)?;

        for record in &content_records {
            let fits = record
                .size
                .checked_next_multiple_of(16)
                .is_some_and(|padded| usize::try_from(padded).is_ok());
            if !fits {
                return Err(TitleError::InvalidTmd(format!(
                    "content {:08x} declares an impossible size of {} bytes",
                    record.content_id, record.size
                )));
            }
        }

        let tmd = Self {
            raw: data[..len].to_vec(),
            issuer: read_c_string(data, ISSUER_OFFSET, 0x40).ok_or_else(truncated)?,
            title_id: TitleId(read_u64_be(data, TITLE_ID_OFFSET).ok_or_else(truncated)?),
            title_version: read_u16_be(data, TITLE_VERSION_OFFSET).ok_or_else(truncated)?,
            boot_index: read_u16_be(data, BOOT_INDEX_OFFSET).ok_or_else(truncated)?,
            content_records,
        };
        Ok((tmd, &data[len..]))
    }

    /// Signed TMD bytes without trailing certificates
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Signature issuer, e.g. `Root-CA00000001-CP00000004`
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Title id
    pub fn title_id(&self) -> TitleId {
        self.title_id
    }

    /// Title version
    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    /// Index of the content booted when the title is launched
    pub fn boot_index(&self) -> u16 {
        self.boot_index
    }

    /// Content records in TMD order
    pub fn content_records(&self) -> &[ContentRecord] {
        &self.content_records
    }

    /// Sum of the decrypted content sizes
    pub fn total_content_size(&self) -> u64 {
        self.content_records
            .iter()
            .fold(0u64, |total, r| total.saturating_add(r.size))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::title::test_helpers::{RecordSpec, cp_cert, tmd_bytes};

    #[test]
    fn parses_header_and_records() {
        let records = [
            RecordSpec::new(0x0000_0001, 0, 0x0001, 100),
            RecordSpec::new(0x0000_0002, 1, 0x8001, 0x40),
        ];
        let raw = tmd_bytes(0x0000_0001_0000_0002, 513, &records);
        let tmd = Tmd::from_bytes(&raw).unwrap();

        assert_eq!(tmd.title_id().to_string(), "0000000100000002");
        assert_eq!(tmd.title_version(), 513);
        assert_eq!(tmd.issuer(), "Root-CA00000001-CP00000004");
        assert_eq!(tmd.content_records().len(), 2);
        assert_eq!(tmd.content_records()[0].size, 100);
        assert_eq!(tmd.content_records()[0].encrypted_size(), 112);
        assert!(!tmd.content_records()[0].is_shared());
        assert!(tmd.content_records()[1].is_shared());
        assert_eq!(tmd.total_content_size(), 164);
        assert_eq!(tmd.as_bytes().len(), TMD_HEADER_SIZE + 2 * CONTENT_RECORD_SIZE);
    }

    #[test]
    fn parse_returns_trailing_certificates() {
        let mut raw = tmd_bytes(0x0000_0001_0000_0002, 513, &[RecordSpec::new(1, 0, 1, 16)]);
        let signed_len = raw.len();
        raw.extend_from_slice(&cp_cert());

        let (tmd, rest) = Tmd::parse(&raw).unwrap();
        assert_eq!(tmd.as_bytes().len(), signed_len);
        assert_eq!(rest.len(), 0x300);
    }

    #[test]
    fn rejects_truncated_record_table() {
        let raw = tmd_bytes(0x0000_0001_0000_0002, 1, &[RecordSpec::new(1, 0, 1, 16)]);
        let err = Tmd::from_bytes(&raw[..raw.len() - 1]).unwrap_err();
        assert!(matches!(err, TitleError::InvalidTmd(_)));
    }

    #[test]
    fn rejects_oversized_content_record() {
        let raw = tmd_bytes(
            0x0000_0001_0000_0002,
            1,
            &[RecordSpec::new(1, 0, 1, 16), RecordSpec::new(2, 1, 1, u64::MAX - 3)],
        );
        match Tmd::from_bytes(&raw) {
            Err(TitleError::InvalidTmd(msg)) => assert!(msg.contains("00000002"), "{msg}"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn encrypted_size_saturates_instead_of_wrapping() {
        let record = ContentRecord {
            content_id: 1,
            index: 0,
            content_type: 1,
            size: u64::MAX,
            hash: [0; 20],
        };
        assert_eq!(record.encrypted_size(), u64::MAX);
    }

    #[test]
    fn rejects_unknown_signature_type() {
        let mut raw = tmd_bytes(0x0000_0001_0000_0002, 1, &[]);
        raw[3] = 0x05;
        assert!(matches!(Tmd::from_bytes(&raw), Err(TitleError::InvalidTmd(_))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Tmd::from_bytes(b"<html>404</html>").is_err());
        assert!(Tmd::from_bytes(&[]).is_err());
    }
}
