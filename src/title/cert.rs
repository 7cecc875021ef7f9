//! Certificates and the retail certificate chain
//!
//! A certificate is a signature block followed by the issuer, the key type,
//! the child name and a public key:
//!
//! ```text
//! u32 signature type | signature | pad to 0x40 | issuer[0x40]
//! u32 key type | child name[0x40] | u32 key id | public key
//! ```
//!
//! The chain packed into a WAD is CA, CP (TMD signer), XS (ticket signer).

use crate::error::TitleError;
use crate::utils::{align_up, read_c_string, read_u32_be};

/// RSA-4096 with SHA-1
pub const SIGNATURE_TYPE_RSA4096: u32 = 0x0001_0000;
/// RSA-2048 with SHA-1
pub const SIGNATURE_TYPE_RSA2048: u32 = 0x0001_0001;
/// ECC with SHA-1
pub const SIGNATURE_TYPE_ECC: u32 = 0x0001_0002;

/// RSA-4096 public key
pub const KEY_TYPE_RSA4096: u32 = 0;
/// RSA-2048 public key
pub const KEY_TYPE_RSA2048: u32 = 1;
/// ECC public key
pub const KEY_TYPE_ECC: u32 = 2;

/// One parsed certificate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    raw: Vec<u8>,
    issuer: String,
    child_name: String,
    key_type: u32,
}

impl Certificate {
    /// Parse one certificate and return the bytes that follow it
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), TitleError> {
        let invalid = |what: &str| TitleError::InvalidCertificate(what.to_string());

        let signature_type = read_u32_be(data, 0).ok_or_else(|| invalid("empty certificate"))?;
        let signature_len = match signature_type {
            SIGNATURE_TYPE_RSA4096 => 0x200,
            SIGNATURE_TYPE_RSA2048 => 0x100,
            SIGNATURE_TYPE_ECC => 0x3C,
            other => {
                return Err(TitleError::InvalidCertificate(format!(
                    "unknown signature type {:#010x}",
                    other
                )));
            }
        };

        let issuer_offset = align_up(4 + signature_len, 0x40);
        let key_type_offset = issuer_offset + 0x40;
        let name_offset = key_type_offset + 4;
        let key_offset = name_offset + 0x40 + 4;

        let key_type = read_u32_be(data, key_type_offset).ok_or_else(|| invalid("truncated"))?;
        let key_len = match key_type {
            KEY_TYPE_RSA4096 => 0x200 + 4 + 0x34,
            KEY_TYPE_RSA2048 => 0x100 + 4 + 0x34,
            KEY_TYPE_ECC => 0x3C + 0x3C,
            other => {
                return Err(TitleError::InvalidCertificate(format!(
                    "unknown key type {}",
                    other
                )));
            }
        };

        let len = key_offset + key_len;
        if data.len() < len {
            return Err(invalid("truncated"));
        }

        let cert = Self {
            raw: data[..len].to_vec(),
            issuer: read_c_string(data, issuer_offset, 0x40).ok_or_else(|| invalid("truncated"))?,
            child_name: read_c_string(data, name_offset, 0x40)
                .ok_or_else(|| invalid("truncated"))?,
            key_type,
        };
        Ok((cert, &data[len..]))
    }

    /// Parse every certificate in `data`
    pub fn parse_all(mut data: &[u8]) -> Result<Vec<Self>, TitleError> {
        let mut certs = Vec::new();
        while !data.is_empty() {
            let (cert, rest) = Self::parse(data)?;
            certs.push(cert);
            data = rest;
        }
        Ok(certs)
    }

    /// Raw certificate bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Signer of this certificate, e.g. `Root-CA00000001`
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Name of this certificate, e.g. `CP00000004`
    pub fn child_name(&self) -> &str {
        &self.child_name
    }

    /// Public key type
    pub fn key_type(&self) -> u32 {
        self.key_type
    }

    /// Name other objects use to reference this certificate as their signer
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.issuer, self.child_name)
    }
}

/// Certificate chain in WAD order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertChain {
    ca: Certificate,
    tmd_cert: Certificate,
    ticket_cert: Certificate,
}

impl CertChain {
    /// Build a chain, checking names and that CP and XS are signed by the CA
    pub fn new(
        ca: Certificate,
        tmd_cert: Certificate,
        ticket_cert: Certificate,
    ) -> Result<Self, TitleError> {
        let expect = |cert: &Certificate, prefix: &str| {
            if cert.child_name.starts_with(prefix) {
                Ok(())
            } else {
                Err(TitleError::CertChain(format!(
                    "expected a {} certificate, found {}",
                    prefix, cert.child_name
                )))
            }
        };
        expect(&ca, "CA")?;
        expect(&tmd_cert, "CP")?;
        expect(&ticket_cert, "XS")?;

        let ca_name = ca.full_name();
        for cert in [&tmd_cert, &ticket_cert] {
            if cert.issuer != ca_name {
                return Err(TitleError::CertChain(format!(
                    "{} is issued by {}, not {}",
                    cert.child_name, cert.issuer, ca_name
                )));
            }
        }

        Ok(Self {
            ca,
            tmd_cert,
            ticket_cert,
        })
    }

    /// Pick CA, CP and XS out of an unordered set of certificates
    pub fn from_certificates(certs: Vec<Certificate>) -> Result<Self, TitleError> {
        let mut ca = None;
        let mut cp = None;
        let mut xs = None;
        for cert in certs {
            let slot = match &cert.child_name {
                n if n.starts_with("CA") => &mut ca,
                n if n.starts_with("CP") => &mut cp,
                n if n.starts_with("XS") => &mut xs,
                _ => continue,
            };
            slot.get_or_insert(cert);
        }
        let missing = |name: &str| TitleError::CertChain(format!("no {} certificate found", name));
        Self::new(
            ca.ok_or_else(|| missing("CA"))?,
            cp.ok_or_else(|| missing("CP"))?,
            xs.ok_or_else(|| missing("XS"))?,
        )
    }

    /// Parse a chain stored back to back, as in a WAD
    pub fn from_bytes(data: &[u8]) -> Result<Self, TitleError> {
        Self::from_certificates(Certificate::parse_all(data)?)
    }

    /// Root-signed certificate authority
    pub fn ca(&self) -> &Certificate {
        &self.ca
    }

    /// Certificate that signs TMDs
    pub fn tmd_cert(&self) -> &Certificate {
        &self.tmd_cert
    }

    /// Certificate that signs tickets
    pub fn ticket_cert(&self) -> &Certificate {
        &self.ticket_cert
    }

    /// CA, CP, XS concatenated
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.ca.raw.len() + self.tmd_cert.raw.len() + self.ticket_cert.raw.len(),
        );
        out.extend_from_slice(&self.ca.raw);
        out.extend_from_slice(&self.tmd_cert.raw);
        out.extend_from_slice(&self.ticket_cert.raw);
        out
    }
}
