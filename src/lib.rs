//! # nus-update
//!
//! Download the current Wii system update from Nintendo Update Servers (NUS)
//! and package every title in it as an installable WAD.
//!
//! A run sends one `GetSystemUpdate` SOAP request for a region, reads the
//! list of titles from the response and, one title at a time, downloads its
//! TMD, ticket, contents and certificate chain. Each title is written as
//! `<TITLEID>-v<VERSION>.wad` into `<program> Downloads (<REGION>)`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use nus_update::{Config, Region, TitlePolicy, UpdateFetcher, UpdateRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = UpdateFetcher::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = fetcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = fetcher
//!         .run(&UpdateRequest::new(Region::Usa), &TitlePolicy::default())
//!         .await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Update fetcher: listing, per-title processing, run summary
pub mod fetcher;
/// `GetSystemUpdate` request construction
pub mod request;
/// `GetSystemUpdate` response parsing
pub mod response;
/// Retry logic with exponential backoff
pub mod retry;
/// Title materialization and WAD packaging
pub mod title;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, NusConfig, OutputConfig, RetryConfig};
pub use error::{Error, Result, TitleError, ToExitCode};
pub use fetcher::UpdateFetcher;
pub use request::{UpdateRequest, validate_region};
pub use response::parse_response;
pub use title::{NusMaterializer, TitleMaterializer};
pub use types::{
    EntryReport, EntryStatus, Event, Region, RunSummary, SystemUpdate, TitleEntry, TitleId,
    TitlePolicy,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when the process is interrupted (Ctrl+C) or, on Unix,
/// sent SIGTERM
///
/// Returns without cancelling if the token is cancelled elsewhere first. A
/// signal that cannot be listened for is logged and ignored.
///
/// # Example
///
/// ```no_run
/// use nus_update::{Config, UpdateFetcher, cancel_on_signal};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = UpdateFetcher::new(Config::default())?;
/// tokio::spawn(cancel_on_signal(fetcher.cancel_token()));
/// # Ok(())
/// # }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                None
            }
        };
    let terminate = async {
        #[cfg(unix)]
        if let Some(stream) = sigterm.as_mut() {
            stream.recv().await;
            return;
        }
        std::future::pending::<()>().await;
    };

    let received = tokio::select! {
        _ = token.cancelled() => return,
        _ = interrupt => "interrupt",
        _ = terminate => "SIGTERM",
    };
    tracing::info!(signal = received, "Cancelling remaining downloads");
    token.cancel();
}
