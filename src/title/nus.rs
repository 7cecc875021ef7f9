//! NUS content CDN implementation of [`TitleMaterializer`]

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{Config, RetryConfig};
use crate::error::{Result, TitleError};
use crate::retry::fetch_with_retry;
use crate::types::{SYSTEM_MENU_TITLE_ID, TitleId};

use super::cert::{CertChain, Certificate};
use super::ticket::Ticket;
use super::tmd::Tmd;
use super::traits::TitleMaterializer;

/// System Menu version whose TMD carries the retail CP certificate
const CERT_SOURCE_VERSION: u16 = 513;

/// Downloads titles from the NUS content CDN
///
/// The certificate chain is identical for every retail title, so it is
/// fetched once and reused.
pub struct NusMaterializer {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
    cert_chain: OnceCell<CertChain>,
}

impl NusMaterializer {
    /// Create a materializer with its own HTTP client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.nus.timeout)
            .user_agent(config.nus.user_agent.clone())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create a materializer sharing an existing HTTP client
    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.nus.content_base(),
            retry: config.retry.clone(),
            cert_chain: OnceCell::new(),
        }
    }

    /// Content base URL in use
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, title_id: TitleId, leaf: &str) -> String {
        format!("{}{}/{}", self.base_url, title_id, leaf)
    }

    /// GET `url`; `Ok(None)` on 404
    async fn get(&self, url: &str) -> std::result::Result<Option<Vec<u8>>, TitleError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TitleError::from_reqwest(url, &e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TitleError::Http {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
                status: Some(status.as_u16()),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TitleError::from_reqwest(url, &e))?;
        Ok(Some(body.to_vec()))
    }

    async fn get_with_retry(&self, url: &str) -> std::result::Result<Option<Vec<u8>>, TitleError> {
        fetch_with_retry(&self.retry, || self.get(url)).await
    }

    async fn fetch_raw_tmd(
        &self,
        title_id: TitleId,
        version: Option<u16>,
    ) -> std::result::Result<Vec<u8>, TitleError> {
        let leaf = match version {
            Some(v) => format!("tmd.{}", v),
            None => "tmd".to_string(),
        };
        self.get_with_retry(&self.url(title_id, &leaf))
            .await?
            .ok_or_else(|| TitleError::TmdNotFound {
                title_id,
                version: version.map_or_else(|| "latest".to_string(), |v| v.to_string()),
            })
    }

    async fn fetch_raw_ticket(&self, title_id: TitleId) -> std::result::Result<Vec<u8>, TitleError> {
        self.get_with_retry(&self.url(title_id, "cetk"))
            .await?
            .ok_or(TitleError::TicketUnavailable { title_id })
    }
}

#[async_trait]
impl TitleMaterializer for NusMaterializer {
    async fn fetch_tmd(
        &self,
        title_id: TitleId,
        version: Option<u16>,
    ) -> std::result::Result<Tmd, TitleError> {
        let raw = self.fetch_raw_tmd(title_id, version).await?;
        let tmd = Tmd::from_bytes(&raw)?;
        if tmd.title_id() != title_id {
            return Err(TitleError::InvalidTmd(format!(
                "requested {} but received TMD for {}",
                title_id,
                tmd.title_id()
            )));
        }
        debug!(
            title_id = %title_id,
            version = tmd.title_version(),
            contents = tmd.content_records().len(),
            "Fetched TMD"
        );
        Ok(tmd)
    }

    async fn fetch_ticket(&self, title_id: TitleId) -> std::result::Result<Ticket, TitleError> {
        let raw = self.fetch_raw_ticket(title_id).await?;
        let ticket = Ticket::from_bytes(&raw)?;
        if ticket.title_id() != title_id {
            return Err(TitleError::InvalidTicket(format!(
                "requested {} but received ticket for {}",
                title_id,
                ticket.title_id()
            )));
        }
        Ok(ticket)
    }

    async fn fetch_contents(
        &self,
        title_id: TitleId,
        tmd: &Tmd,
    ) -> std::result::Result<Vec<Vec<u8>>, TitleError> {
        let records = tmd.content_records();
        let mut contents = Vec::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            let url = self.url(title_id, &format!("{:08x}", record.content_id));
            let expected = record.encrypted_size();
            debug!(
                title_id = %title_id,
                content_id = format_args!("{:08x}", record.content_id),
                content = i + 1,
                total = records.len(),
                bytes = expected,
                "Downloading content"
            );

            // a short body is retried, a 404 is final
            let data = fetch_with_retry(&self.retry, || async {
                match self.get(&url).await? {
                    Some(data) if (data.len() as u64) < expected => Err(TitleError::ContentFetch {
                        title_id,
                        content_id: record.content_id,
                        reason: format!("got {} bytes, expected {}", data.len(), expected),
                    }),
                    found => Ok(found),
                }
            })
            .await?
            .ok_or_else(|| TitleError::ContentFetch {
                title_id,
                content_id: record.content_id,
                reason: "not found on the CDN".to_string(),
            })?;
            contents.push(data);
        }
        Ok(contents)
    }

    async fn fetch_cert_chain(&self) -> std::result::Result<CertChain, TitleError> {
        self.cert_chain
            .get_or_try_init(|| async {
                let unavailable = |e: TitleError| TitleError::CertChain(e.to_string());
                let tmd = self
                    .fetch_raw_tmd(SYSTEM_MENU_TITLE_ID, Some(CERT_SOURCE_VERSION))
                    .await
                    .map_err(unavailable)?;
                let cetk = self
                    .fetch_raw_ticket(SYSTEM_MENU_TITLE_ID)
                    .await
                    .map_err(unavailable)?;

                let (_, tmd_certs) = Tmd::parse(&tmd)?;
                let (_, ticket_certs) = Ticket::parse(&cetk)?;
                let mut certs = Certificate::parse_all(tmd_certs)?;
                certs.extend(Certificate::parse_all(ticket_certs)?);
                let chain = CertChain::from_certificates(certs)?;
                info!(
                    ca = chain.ca().child_name(),
                    cp = chain.tmd_cert().child_name(),
                    xs = chain.ticket_cert().child_name(),
                    "Assembled retail certificate chain"
                );
                Ok::<_, TitleError>(chain)
            })
            .await
            .cloned()
    }

    fn name(&self) -> &'static str {
        "nus-cdn"
    }
}
