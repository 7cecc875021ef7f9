//! WAD packaging
//!
//! A WAD is a 0x20-byte header followed by the certificate chain, CRL,
//! ticket, TMD, content data and footer, each starting on a 0x40 boundary.
//! Contents are stored still encrypted, in TMD order, each padded to 0x40.

use crate::error::TitleError;
use crate::types::BOOT2_TITLE_ID;
use crate::utils::{align_up, pad_to, read_u16_be, read_u32_be, slice_at};

use super::cert::CertChain;
use super::ticket::Ticket;
use super::tmd::Tmd;

/// Size of the WAD header
pub const WAD_HEADER_SIZE: usize = 0x20;

const SECTION_ALIGN: usize = 0x40;

/// WAD flavour stored in the header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WadType {
    /// Regular installable WAD (`Is`)
    Installable,
    /// boot2 WAD (`ib`)
    Boot2,
}

impl WadType {
    fn magic(self) -> [u8; 2] {
        match self {
            WadType::Installable => *b"Is",
            WadType::Boot2 => *b"ib",
        }
    }

    fn from_magic(magic: u16) -> Option<Self> {
        match &magic.to_be_bytes() {
            b"Is" => Some(WadType::Installable),
            b"ib" => Some(WadType::Boot2),
            _ => None,
        }
    }
}

/// An assembled WAD
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wad {
    /// Header type
    pub wad_type: WadType,
    /// CA, CP and XS certificates
    pub cert_chain: Vec<u8>,
    /// Certificate revocation list, always empty from NUS
    pub crl: Vec<u8>,
    /// Signed ticket
    pub ticket: Vec<u8>,
    /// Signed TMD
    pub tmd: Vec<u8>,
    /// Encrypted contents, each padded to 0x40
    pub content: Vec<u8>,
    /// Optional footer (meta)
    pub footer: Vec<u8>,
}

impl Wad {
    /// Assemble a WAD from the downloaded pieces
    ///
    /// # Errors
    ///
    /// Fails when the ticket belongs to another title, or when the number or
    /// size of the contents does not match the TMD records.
    pub fn build(
        tmd: &Tmd,
        ticket: &Ticket,
        contents: &[Vec<u8>],
        cert_chain: &CertChain,
    ) -> Result<Self, TitleError> {
        if ticket.title_id() != tmd.title_id() {
            return Err(TitleError::Wad(format!(
                "ticket is for {} but TMD is for {}",
                ticket.title_id(),
                tmd.title_id()
            )));
        }
        let records = tmd.content_records();
        if contents.len() != records.len() {
            return Err(TitleError::Wad(format!(
                "TMD lists {} contents but {} were supplied",
                records.len(),
                contents.len()
            )));
        }

        let mut content = Vec::new();
        for (record, data) in records.iter().zip(contents) {
            let expected = usize::try_from(record.encrypted_size())
                .ok()
                .filter(|&expected| expected <= data.len())
                .ok_or_else(|| {
                    TitleError::Wad(format!(
                        "content {:08x} is {} bytes, expected at least {}",
                        record.content_id,
                        data.len(),
                        record.encrypted_size()
                    ))
                })?;
            content.extend_from_slice(&data[..expected]);
            pad_to(&mut content, SECTION_ALIGN);
        }

        let wad_type = if tmd.title_id() == BOOT2_TITLE_ID {
            WadType::Boot2
        } else {
            WadType::Installable
        };

        Ok(Self {
            wad_type,
            cert_chain: cert_chain.to_bytes(),
            crl: Vec::new(),
            ticket: ticket.as_bytes().to_vec(),
            tmd: tmd.as_bytes().to_vec(),
            content,
            footer: Vec::new(),
        })
    }

    /// Serialize to the on-disk format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            SECTION_ALIGN * 7
                + self.cert_chain.len()
                + self.ticket.len()
                + self.tmd.len()
                + self.content.len()
                + self.footer.len(),
        );
        out.extend_from_slice(&(WAD_HEADER_SIZE as u32).to_be_bytes());
        out.extend_from_slice(&self.wad_type.magic());
        out.extend_from_slice(&0u16.to_be_bytes());
        for section in self.sections() {
            out.extend_from_slice(&(section.len() as u32).to_be_bytes());
        }
        pad_to(&mut out, SECTION_ALIGN);

        for section in self.sections() {
            out.extend_from_slice(section);
            pad_to(&mut out, SECTION_ALIGN);
        }
        out
    }

    /// Parse a WAD back into its sections
    pub fn from_bytes(data: &[u8]) -> Result<Self, TitleError> {
        let truncated = || TitleError::Wad("truncated WAD".to_string());

        let header_size = read_u32_be(data, 0).ok_or_else(truncated)? as usize;
        if header_size != WAD_HEADER_SIZE {
            return Err(TitleError::Wad(format!(
                "unexpected header size {:#x}",
                header_size
            )));
        }
        let magic = read_u16_be(data, 4).ok_or_else(truncated)?;
        let wad_type = WadType::from_magic(magic)
            .ok_or_else(|| TitleError::Wad(format!("unknown WAD type {:#06x}", magic)))?;

        let mut sizes = [0usize; 6];
        for (i, size) in sizes.iter_mut().enumerate() {
            *size = read_u32_be(data, 8 + i * 4).ok_or_else(truncated)? as usize;
        }

        let mut offset = align_up(WAD_HEADER_SIZE, SECTION_ALIGN);
        let mut sections: Vec<Vec<u8>> = Vec::with_capacity(6);
        for size in sizes {
            let section = slice_at(data, offset, size).ok_or_else(truncated)?;
            sections.push(section.to_vec());
            offset = align_up(offset + size, SECTION_ALIGN);
        }

        let mut sections = sections.into_iter();
        let mut next = || sections.next().unwrap_or_default();
        Ok(Self {
            wad_type,
            cert_chain: next(),
            crl: next(),
            ticket: next(),
            tmd: next(),
            content: next(),
            footer: next(),
        })
    }

    fn sections(&self) -> [&[u8]; 6] {
        [
            &self.cert_chain,
            &self.crl,
            &self.ticket,
            &self.tmd,
            &self.content,
            &self.footer,
        ]
    }
}
