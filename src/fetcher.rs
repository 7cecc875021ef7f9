//! System update fetcher
//!
//! Drives a run end to end: one SOAP request for the title listing, then every
//! listed title in response order through the [`TitleMaterializer`], writing
//! each WAD into the region folder. Per-title failures are recorded and the
//! run moves on; only the listing itself can fail a run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result, TitleError};
use crate::request::{SOAP_ACTION, SOAP_CONTENT_TYPE, UpdateRequest};
use crate::response::parse_response;
use crate::title::{NusMaterializer, TitleMaterializer};
use crate::types::{
    EntryReport, EntryStatus, Event, RunSummary, SystemUpdate, TitleEntry, TitlePolicy,
};
use crate::utils::write_atomic;

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Fetches a system update listing and downloads every title in it
///
/// Cloning is cheap; clones share the event channel and cancellation token.
#[derive(Clone)]
pub struct UpdateFetcher {
    /// HTTP client for the SOAP request (timeout and user agent from config)
    client: reqwest::Client,
    /// Configuration
    config: Arc<Config>,
    /// Produces WAD bytes for a listed title
    materializer: Arc<dyn TitleMaterializer>,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
    /// Cancels the remaining entries of a run
    cancel_token: CancellationToken,
}

impl UpdateFetcher {
    /// Create a fetcher downloading titles from the NUS content CDN
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be created
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;
        let materializer = Arc::new(NusMaterializer::with_client(client.clone(), &config));
        Ok(Self::from_parts(client, config, materializer))
    }

    /// Create a fetcher with a custom materializer
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be created
    pub fn with_materializer(
        config: Config,
        materializer: Arc<dyn TitleMaterializer>,
    ) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config)?;
        Ok(Self::from_parts(client, config, materializer))
    }

    fn from_parts(
        client: reqwest::Client,
        config: Config,
        materializer: Arc<dyn TitleMaterializer>,
    ) -> Self {
        info!(
            materializer = materializer.name(),
            soap_url = %config.nus.soap_url,
            content_url = %config.nus.content_base(),
            "Update fetcher initialized"
        );
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            client,
            config: Arc::new(config),
            materializer,
            event_tx,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Use `token` to cancel runs instead of the fetcher's own token
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Subscribe to run events
    ///
    /// Events are delivered in emission order. Subscribe before calling
    /// [`run`](Self::run) to see the whole run.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that cancels the current run
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// POST the SOAP envelope and return the raw response body
    ///
    /// Sent exactly once; a transport failure or non-2xx status is fatal.
    pub async fn send_request(&self, request: &UpdateRequest) -> Result<String> {
        let url = &self.config.nus.soap_url;
        debug!(url = %url, region = %request.region(), "Sending GetSystemUpdate request");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header("SOAPAction", SOAP_ACTION)
            .body(request.to_xml())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.clone(),
            });
        }
        Ok(response.text().await?)
    }

    /// Send the request and parse the listing
    pub async fn fetch_title_list(&self, request: &UpdateRequest) -> Result<SystemUpdate> {
        let body = self.send_request(request).await?;
        let update = parse_response(&body)?;
        if let Some(prefix) = &update.content_prefix_url {
            debug!(content_prefix = %prefix, "Service advertised content prefix");
        }
        Ok(update)
    }

    /// Materialize one entry and write it into `dir`
    ///
    /// Never fails the run: every error ends up in [`EntryStatus::Failed`].
    /// The WAD is written under a temporary name and renamed into place, so an
    /// interrupted entry leaves no file with the final name.
    pub async fn process_entry(&self, entry: &TitleEntry, dir: &Path) -> EntryStatus {
        match self.try_process_entry(entry, dir).await {
            Ok((path, bytes)) => EntryStatus::Downloaded { path, bytes },
            Err(e) => EntryStatus::Failed(e),
        }
    }

    async fn try_process_entry(
        &self,
        entry: &TitleEntry,
        dir: &Path,
    ) -> std::result::Result<(PathBuf, u64), TitleError> {
        let wad = self.materializer.materialize(entry).await?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| TitleError::Output {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        let path = dir.join(entry.file_name(&self.config.output.extension));
        write_atomic(&path, &wad)
            .await
            .map_err(|e| TitleError::Output {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        Ok((path, wad.len() as u64))
    }

    /// Fetch the listing and download every title in it
    ///
    /// Entries are handled one at a time in response order. The policy's
    /// sensitive title is recorded as excluded without any request unless the
    /// policy opts in.
    ///
    /// # Errors
    ///
    /// Only failures to obtain the listing are returned, plus
    /// [`Error::Cancelled`] when the run is cancelled before the listing
    /// arrives. Cancellation after that is reported in the summary.
    pub async fn run(&self, request: &UpdateRequest, policy: &TitlePolicy) -> Result<RunSummary> {
        let region = request.region();
        let dir = self.config.output.region_dir(region)?;

        let update = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => return Err(Error::Cancelled),
            update = self.fetch_title_list(request) => update?,
        };

        let total = update.entries.len();
        info!(
            region = %region,
            titles = total,
            skipped = update.skipped,
            output = %dir.display(),
            "Received system update listing"
        );
        self.emit_event(Event::TitlesListed {
            region,
            count: total,
            skipped: update.skipped,
        });

        let mut summary = RunSummary::default();
        for (index, entry) in update.entries.iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                summary.cancelled = true;
                summary.remaining = total - index;
                break;
            }

            if policy.excludes(entry) {
                info!(title_id = %entry.title_id, version = entry.version, "Excluding title");
                self.emit_event(Event::Excluded {
                    entry: entry.clone(),
                });
                summary.reports.push(EntryReport {
                    entry: entry.clone(),
                    status: EntryStatus::Excluded,
                });
                continue;
            }

            info!(
                title_id = %entry.title_id,
                version = entry.version,
                position = index + 1,
                total,
                "Downloading title"
            );
            self.emit_event(Event::Downloading {
                entry: entry.clone(),
            });

            let status = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    warn!(title_id = %entry.title_id, version = entry.version, "Download interrupted");
                    summary.cancelled = true;
                    summary.remaining = total - index;
                    break;
                }
                status = self.process_entry(entry, &dir) => status,
            };

            match &status {
                EntryStatus::Downloaded { path, bytes } => {
                    info!(
                        title_id = %entry.title_id,
                        version = entry.version,
                        path = %path.display(),
                        bytes,
                        "Title written"
                    );
                    self.emit_event(Event::Downloaded {
                        entry: entry.clone(),
                        path: path.clone(),
                    });
                }
                EntryStatus::Failed(e) => {
                    error!(
                        title_id = %entry.title_id,
                        version = entry.version,
                        error = %e,
                        "Title failed"
                    );
                    self.emit_event(Event::Failed {
                        entry: entry.clone(),
                        error: e.to_string(),
                    });
                }
                EntryStatus::Excluded => {}
            }
            summary.reports.push(EntryReport {
                entry: entry.clone(),
                status,
            });
        }

        if summary.cancelled {
            warn!(remaining = summary.remaining, "Run cancelled");
            self.emit_event(Event::Cancelled {
                remaining: summary.remaining,
            });
        } else {
            info!(
                downloaded = summary.succeeded(),
                failed = summary.failed(),
                excluded = summary.excluded(),
                "Run complete"
            );
        }
        Ok(summary)
    }
}

fn build_client(config: &Config) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.nus.timeout)
        .user_agent(config.nus.user_agent.clone())
        .build()?)
}
