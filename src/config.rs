//! Configuration types for nus-update

use crate::error::{Error, Result};
use crate::types::{BOOT2_TITLE_ID, Region, TitleId};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// SOAP endpoint of the NetUpdate service
pub const NUS_SOAP_URL: &str = "http://nus.shop.wii.com/nus/services/NetUpdateSOAP";

/// Retail Wii content CDN
pub const WII_CONTENT_URL: &str = "http://nus.cdn.shop.wii.com/ccs/download/";

/// Wii U content CDN (also serves vWii titles)
pub const WIIU_CONTENT_URL: &str = "http://ccs.cdn.wup.shop.nintendo.net/ccs/download/";

/// User agent of the console's update client
pub const NUS_USER_AGENT: &str = "wii libnup/1.0";

/// Device id accepted by the service for any region
pub const DEFAULT_DEVICE_ID: &str = "5555555555";

/// Service endpoints and HTTP behaviour
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NusConfig {
    /// SOAP endpoint for `GetSystemUpdate` (default: retail NUS)
    #[serde(default = "default_soap_url")]
    pub soap_url: String,

    /// Content CDN base URL; overrides `wiiu_endpoint` when set
    #[serde(default)]
    pub content_url: Option<String>,

    /// Download content from the Wii U CDN instead of the retail Wii one (default: false)
    #[serde(default)]
    pub wiiu_endpoint: bool,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Device id embedded in the SOAP request
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

impl Default for NusConfig {
    fn default() -> Self {
        Self {
            soap_url: default_soap_url(),
            content_url: None,
            wiiu_endpoint: false,
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            device_id: default_device_id(),
        }
    }
}

impl NusConfig {
    /// Content base URL actually used, always ending in `/`
    pub fn content_base(&self) -> String {
        let base = match &self.content_url {
            Some(url) => url.clone(),
            None if self.wiiu_endpoint => WIIU_CONTENT_URL.to_string(),
            None => WII_CONTENT_URL.to_string(),
        };
        if base.ends_with('/') {
            base
        } else {
            format!("{}/", base)
        }
    }
}

/// Where and how output files are written
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding the per-region folders (default: current directory)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Prefix of the per-region folder name (default: "nus-update")
    #[serde(default = "default_program_name")]
    pub program_name: String,

    /// Output file extension (default: "wad")
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: None,
            program_name: default_program_name(),
            extension: default_extension(),
        }
    }
}

impl OutputConfig {
    /// Output folder for `region`: `<root>/<program_name> Downloads (<region>)`
    pub fn region_dir(&self, region: Region) -> Result<PathBuf> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => std::env::current_dir()?,
        };
        Ok(root.join(format!("{} Downloads ({})", self.program_name, region)))
    }
}

/// Retry configuration for content downloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration
///
/// Every field has a default, so an empty JSON object is a valid config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Service endpoints and HTTP behaviour
    #[serde(default)]
    pub nus: NusConfig,

    /// Output location and naming
    #[serde(default)]
    pub output: OutputConfig,

    /// Retry policy for content downloads
    #[serde(default)]
    pub retry: RetryConfig,

    /// Title skipped unless explicitly confirmed (default: boot2)
    #[serde(default = "default_sensitive_title")]
    pub sensitive_title: TitleId,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nus: NusConfig::default(),
            output: OutputConfig::default(),
            retry: RetryConfig::default(),
            sensitive_title: default_sensitive_title(),
        }
    }
}

impl Config {
    /// Load a JSON config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read config '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.nus.soap_url)
            .map_err(|e| Error::config("nus.soap_url", format!("invalid URL: {}", e)))?;
        url::Url::parse(&self.nus.content_base())
            .map_err(|e| Error::config("nus.content_url", format!("invalid URL: {}", e)))?;

        if self.nus.timeout.is_zero() {
            return Err(Error::config("nus.timeout", "timeout must be non-zero"));
        }
        if self.nus.device_id.is_empty() || !self.nus.device_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::config(
                "nus.device_id",
                "device id must be a non-empty decimal number",
            ));
        }
        if self.output.program_name.trim().is_empty() {
            return Err(Error::config(
                "output.program_name",
                "program name must not be empty",
            ));
        }
        if self.output.extension.is_empty() || self.output.extension.contains(['/', '\\', '.']) {
            return Err(Error::config(
                "output.extension",
                "extension must be a bare file extension such as \"wad\"",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "backoff multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

fn default_soap_url() -> String {
    NUS_SOAP_URL.to_string()
}

fn default_user_agent() -> String {
    NUS_USER_AGENT.to_string()
}

fn default_device_id() -> String {
    DEFAULT_DEVICE_ID.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_program_name() -> String {
    "nus-update".to_string()
}

fn default_extension() -> String {
    "wad".to_string()
}

fn default_sensitive_title() -> TitleId {
    BOOT2_TITLE_ID
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
