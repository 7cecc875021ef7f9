//! Title materialization: from a listed title to WAD bytes.
//!
//! - [`tmd`] - Title metadata parsing
//! - [`ticket`] - Ticket parsing
//! - [`cert`] - Certificates and the retail chain
//! - [`wad`] - WAD packaging
//! - [`traits`] - The [`TitleMaterializer`] seam used by the fetcher
//! - [`nus`] - [`NusMaterializer`], backed by the NUS content CDN

pub mod cert;
pub mod nus;
pub mod ticket;
pub mod tmd;
pub mod traits;
pub mod wad;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use cert::{CertChain, Certificate};
pub use nus::NusMaterializer;
pub use ticket::Ticket;
pub use tmd::{ContentRecord, Tmd};
pub use traits::TitleMaterializer;
pub use wad::{Wad, WadType};
