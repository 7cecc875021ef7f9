//! The title materializer seam

use async_trait::async_trait;

use crate::error::TitleError;
use crate::types::{TitleEntry, TitleId};

use super::cert::CertChain;
use super::ticket::Ticket;
use super::tmd::Tmd;
use super::wad::Wad;

/// Source of everything needed to package one title
///
/// The update fetcher only ever calls [`materialize`](Self::materialize); the
/// individual fetch operations exist so implementations can be composed and
/// tested piecewise.
///
/// # Examples
///
/// ```no_run
/// use nus_update::config::Config;
/// use nus_update::title::{NusMaterializer, TitleMaterializer};
/// use nus_update::types::{TitleEntry, TitleId};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let materializer = NusMaterializer::new(&Config::default())?;
/// let entry = TitleEntry {
///     title_id: "0000000100000002".parse::<TitleId>()?,
///     version: 513,
///     fs_size: 0,
/// };
/// let wad = materializer.materialize(&entry).await?;
/// println!("{} bytes", wad.len());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait TitleMaterializer: Send + Sync {
    /// Fetch the TMD for `title_id`, at `version` or the latest one
    ///
    /// # Errors
    ///
    /// [`TitleError::TmdNotFound`] when the service has no such TMD.
    async fn fetch_tmd(&self, title_id: TitleId, version: Option<u16>) -> Result<Tmd, TitleError>;

    /// Fetch the ticket for `title_id`
    ///
    /// # Errors
    ///
    /// [`TitleError::TicketUnavailable`] when the ticket is not published.
    async fn fetch_ticket(&self, title_id: TitleId) -> Result<Ticket, TitleError>;

    /// Fetch every content listed in `tmd`, in record order
    async fn fetch_contents(&self, title_id: TitleId, tmd: &Tmd)
    -> Result<Vec<Vec<u8>>, TitleError>;

    /// Fetch the retail certificate chain
    async fn fetch_cert_chain(&self) -> Result<CertChain, TitleError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;

    /// Fetch all pieces of `entry` and package them as WAD bytes
    async fn materialize(&self, entry: &TitleEntry) -> Result<Vec<u8>, TitleError> {
        let tmd = self.fetch_tmd(entry.title_id, Some(entry.version)).await?;
        let ticket = self.fetch_ticket(entry.title_id).await?;
        let contents = self.fetch_contents(entry.title_id, &tmd).await?;
        let cert_chain = self.fetch_cert_chain().await?;
        Ok(Wad::build(&tmd, &ticket, &contents, &cert_chain)?.to_bytes())
    }
}
