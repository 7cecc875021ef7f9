//! Tickets (`cetk` on the CDN)

use crate::error::TitleError;
use crate::types::TitleId;
use crate::utils::{read_c_string, read_u16_be, read_u32_be, read_u64_be, slice_at};

use super::cert::SIGNATURE_TYPE_RSA2048;

/// Size of a v0 ticket
pub const TICKET_SIZE: usize = 0x2A4;

const ISSUER_OFFSET: usize = 0x140;
const TITLE_KEY_OFFSET: usize = 0x1BF;
const TITLE_ID_OFFSET: usize = 0x1DC;
const TITLE_VERSION_OFFSET: usize = 0x1E6;
const COMMON_KEY_INDEX_OFFSET: usize = 0x1F1;

/// Parsed ticket, holding its signed bytes verbatim
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    raw: Vec<u8>,
    issuer: String,
    title_id: TitleId,
    title_version: u16,
    common_key_index: u8,
}

impl Ticket {
    /// Parse a ticket, ignoring anything after it
    pub fn from_bytes(data: &[u8]) -> Result<Self, TitleError> {
        Self::parse(data).map(|(ticket, _)| ticket)
    }

    /// Parse a ticket and return the bytes that follow it (XS and CA certificates on the CDN)
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), TitleError> {
        if data.len() < TICKET_SIZE {
            return Err(TitleError::InvalidTicket(format!(
                "truncated ticket ({} bytes)",
                data.len()
            )));
        }
        let signature_type = field(read_u32_be(data, 0), "signature type")?;
        if signature_type != SIGNATURE_TYPE_RSA2048 {
            return Err(TitleError::InvalidTicket(format!(
                "unsupported signature type {:#010x}",
                signature_type
            )));
        }

        let common_key_index = data[COMMON_KEY_INDEX_OFFSET];
        let ticket = Self {
            raw: data[..TICKET_SIZE].to_vec(),
            issuer: field(read_c_string(data, ISSUER_OFFSET, 0x40), "issuer")?,
            title_id: TitleId(field(read_u64_be(data, TITLE_ID_OFFSET), "title id")?),
            title_version: field(read_u16_be(data, TITLE_VERSION_OFFSET), "title version")?,
            common_key_index,
        };
        Ok((ticket, &data[TICKET_SIZE..]))
    }

    /// Signed ticket bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Signature issuer, e.g. `Root-CA00000001-XS00000003`
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Title id the ticket grants
    pub fn title_id(&self) -> TitleId {
        self.title_id
    }

    /// Title version recorded in the ticket
    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    /// 0 = common key, 1 = Korean key, 2 = vWii key
    pub fn common_key_index(&self) -> u8 {
        self.common_key_index
    }

    /// Encrypted title key
    pub fn title_key(&self) -> [u8; 16] {
        let mut key = [0u8; 16];
        if let Some(bytes) = slice_at(&self.raw, TITLE_KEY_OFFSET, 16) {
            key.copy_from_slice(bytes);
        }
        key
    }
}

fn field<T>(value: Option<T>, name: &str) -> Result<T, TitleError> {
    value.ok_or_else(|| TitleError::InvalidTicket(format!("cannot read {}", name)))
}
