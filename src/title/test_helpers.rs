//! Builders for synthetic TMDs, tickets and certificates used in unit tests
//!
//! Signatures are all zero; nothing in this crate verifies them.

use super::cert::{KEY_TYPE_RSA2048, SIGNATURE_TYPE_RSA2048, SIGNATURE_TYPE_RSA4096};
use super::ticket::TICKET_SIZE;
use super::tmd::{CONTENT_RECORD_SIZE, TMD_HEADER_SIZE};
use crate::utils::pad_to;

/// Content record fields for [`tmd_bytes`]
pub struct RecordSpec {
    pub content_id: u32,
    pub index: u16,
    pub content_type: u16,
    pub size: u64,
}

impl RecordSpec {
    pub fn new(content_id: u32, index: u16, content_type: u16, size: u64) -> Self {
        Self {
            content_id,
            index,
            content_type,
            size,
        }
    }
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn name_field(name: &str) -> Vec<u8> {
    let mut field = name.as_bytes().to_vec();
    field.resize(0x40, 0);
    field
}

/// Signed TMD bytes without trailing certificates
pub fn tmd_bytes(title_id: u64, version: u16, records: &[RecordSpec]) -> Vec<u8> {
    let mut buf = vec![0u8; TMD_HEADER_SIZE + records.len() * CONTENT_RECORD_SIZE];
    put(&mut buf, 0, &SIGNATURE_TYPE_RSA2048.to_be_bytes());
    put(&mut buf, 0x140, &name_field("Root-CA00000001-CP00000004"));
    put(&mut buf, 0x18C, &title_id.to_be_bytes());
    put(&mut buf, 0x1DC, &version.to_be_bytes());
    put(&mut buf, 0x1DE, &(records.len() as u16).to_be_bytes());
    for (i, r) in records.iter().enumerate() {
        let at = TMD_HEADER_SIZE + i * CONTENT_RECORD_SIZE;
        put(&mut buf, at, &r.content_id.to_be_bytes());
        put(&mut buf, at + 4, &r.index.to_be_bytes());
        put(&mut buf, at + 6, &r.content_type.to_be_bytes());
        put(&mut buf, at + 8, &r.size.to_be_bytes());
    }
    buf
}

/// Ticket bytes without trailing certificates
pub fn ticket_bytes(title_id: u64, version: u16) -> Vec<u8> {
    let mut buf = vec![0u8; TICKET_SIZE];
    put(&mut buf, 0, &SIGNATURE_TYPE_RSA2048.to_be_bytes());
    put(&mut buf, 0x140, &name_field("Root-CA00000001-XS00000003"));
    put(&mut buf, 0x1DC, &title_id.to_be_bytes());
    put(&mut buf, 0x1E6, &version.to_be_bytes());
    buf
}

fn cert(signature_type: u32, issuer: &str, name: &str) -> Vec<u8> {
    let signature_len = match signature_type {
        SIGNATURE_TYPE_RSA4096 => 0x200,
        _ => 0x100,
    };
    let mut buf = signature_type.to_be_bytes().to_vec();
    buf.resize(4 + signature_len, 0);
    pad_to(&mut buf, 0x40);
    buf.extend_from_slice(&name_field(issuer));
    buf.extend_from_slice(&KEY_TYPE_RSA2048.to_be_bytes());
    buf.extend_from_slice(&name_field(name));
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.resize(buf.len() + 0x100 + 4 + 0x34, 0);
    buf
}

/// Root-signed CA certificate (0x400 bytes)
pub fn ca_cert() -> Vec<u8> {
    cert(SIGNATURE_TYPE_RSA4096, "Root", "CA00000001")
}

/// CA-signed TMD signer certificate (0x300 bytes)
pub fn cp_cert() -> Vec<u8> {
    cert(SIGNATURE_TYPE_RSA2048, "Root-CA00000001", "CP00000004")
}

/// CA-signed ticket signer certificate (0x300 bytes)
pub fn xs_cert() -> Vec<u8> {
    cert(SIGNATURE_TYPE_RSA2048, "Root-CA00000001", "XS00000003")
}

/// TMD as served by the CDN: TMD, CP certificate, CA certificate
pub fn cdn_tmd(title_id: u64, version: u16, records: &[RecordSpec]) -> Vec<u8> {
    let mut buf = tmd_bytes(title_id, version, records);
    buf.extend_from_slice(&cp_cert());
    buf.extend_from_slice(&ca_cert());
    buf
}

/// Ticket as served by the CDN: ticket, XS certificate, CA certificate
pub fn cdn_cetk(title_id: u64, version: u16) -> Vec<u8> {
    let mut buf = ticket_bytes(title_id, version);
    buf.extend_from_slice(&xs_cert());
    buf.extend_from_slice(&ca_cert());
    buf
}

/// Encrypted content blob for a record of `size` decrypted bytes
pub fn content_blob(fill: u8, size: u64) -> Vec<u8> {
    vec![fill; crate::utils::align_up(size as usize, 16)]
}
