//! Error types for nus-update
//!
//! Two layers of errors exist:
//! - [`Error`] is fatal to a whole run (bad input, SOAP transport failure,
//!   unparseable response, cancellation).
//! - [`TitleError`] describes why a single title could not be materialized.
//!   It never aborts the run; the fetcher records it against the entry and
//!   moves on.

use crate::types::TitleId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nus-update operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nus-update
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "nus.soap_url")
        key: Option<String>,
    },

    /// Region code not in the accepted set
    #[error(
        "invalid region '{0}'. Valid regions are: {valid}",
        valid = crate::types::Region::valid_codes()
    )]
    InvalidRegion(String),

    /// Network error talking to the SOAP service
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SOAP service answered with a non-success HTTP status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// HTTP status code returned by the server
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Malformed XML in the SOAP response
    #[error("malformed XML in response: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Well-formed XML that does not have the expected shape
    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    /// The service returned a SOAP fault
    #[error("SOAP fault: {0}")]
    SoapFault(String),

    /// The service reported a non-zero error code
    #[error("service returned error code {code}")]
    Service {
        /// Value of the `ErrorCode` element
        code: i64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Title materialization error surfaced outside the per-entry loop
    #[error("title error: {0}")]
    Title(#[from] TitleError),

    /// The run was cancelled (Ctrl+C / SIGTERM)
    #[error("cancelled")]
    Cancelled,
}

/// Per-title errors
///
/// Every variant renders a message that is safe to show next to the title id
/// and version of the entry being processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TitleError {
    /// No TMD is published for this title/version
    #[error("the TMD was not found for {title_id} version {version}")]
    TmdNotFound {
        /// Title that was requested
        title_id: TitleId,
        /// Requested version, or "latest"
        version: String,
    },

    /// No ticket is published for this title
    #[error("the ticket for {title_id} is not freely available on the NUS servers")]
    TicketUnavailable {
        /// Title that was requested
        title_id: TitleId,
    },

    /// A content blob could not be downloaded or is truncated
    #[error("content {content_id:08x} of {title_id} could not be fetched: {reason}")]
    ContentFetch {
        /// Title owning the content
        title_id: TitleId,
        /// Content id from the TMD record
        content_id: u32,
        /// What went wrong
        reason: String,
    },

    /// The retail certificate chain could not be assembled
    #[error("certificate chain unavailable: {0}")]
    CertChain(String),

    /// TMD bytes do not parse
    #[error("invalid TMD: {0}")]
    InvalidTmd(String),

    /// Ticket bytes do not parse or do not match the TMD
    #[error("invalid ticket: {0}")]
    InvalidTicket(String),

    /// Certificate bytes do not parse
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// WAD assembly or parsing failed
    #[error("WAD error: {0}")]
    Wad(String),

    /// Transport-level failure while talking to the content endpoint
    #[error("request to {url} failed: {reason} (is the endpoint down?)")]
    Http {
        /// Requested URL
        url: String,
        /// Failure description
        reason: String,
        /// HTTP status, when the server answered
        status: Option<u16>,
    },

    /// Writing the output file failed
    #[error("could not write {path}: {reason}")]
    Output {
        /// Destination path
        path: PathBuf,
        /// Failure description
        reason: String,
    },
}

/// Map errors to process exit codes for the command line front end
pub trait ToExitCode {
    /// Exit status the binary should terminate with
    fn exit_code(&self) -> i32;
}

/// Exit status when every listed title was written (or excluded)
pub const EXIT_OK: i32 = 0;
/// Exit status for bad command line input
pub const EXIT_USAGE: i32 = 1;
/// Exit status for a fatal transport, parse or configuration error
pub const EXIT_FATAL: i32 = 2;
/// Exit status when the run completed but some titles failed
pub const EXIT_PARTIAL: i32 = 3;
/// Exit status after Ctrl+C
pub const EXIT_CANCELLED: i32 = 130;

impl ToExitCode for Error {
    fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidRegion(_) => EXIT_USAGE,
            Error::Cancelled => EXIT_CANCELLED,
            Error::Config { .. }
            | Error::Network(_)
            | Error::HttpStatus { .. }
            | Error::Xml(_)
            | Error::InvalidResponse(_)
            | Error::SoapFault(_)
            | Error::Service { .. }
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Title(_) => EXIT_FATAL,
        }
    }
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

impl TitleError {
    /// Build a [`TitleError::Http`] from a reqwest failure
    pub(crate) fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        TitleError::Http {
            url: url.to_string(),
            reason,
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_region_lists_accepted_codes() {
        let msg = Error::InvalidRegion("ZZZ".into()).to_string();
        assert!(msg.contains("'ZZZ'"));
        for code in ["USA", "EUR", "JPN", "KOR", "TWN"] {
            assert!(msg.contains(code), "missing {code} in: {msg}");
        }
    }

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(Error::InvalidRegion("x".into()).exit_code(), EXIT_USAGE);
        assert_eq!(Error::Cancelled.exit_code(), EXIT_CANCELLED);
        assert_eq!(
            Error::InvalidResponse("no envelope".into()).exit_code(),
            EXIT_FATAL
        );
        assert_eq!(Error::Service { code: 619 }.exit_code(), EXIT_FATAL);
        assert_eq!(
            Error::config("nus.soap_url", "empty").exit_code(),
            EXIT_FATAL
        );
    }

    #[test]
    fn title_errors_name_the_title() {
        let tid: TitleId = "0000000100000002".parse().unwrap();
        let err = TitleError::TmdNotFound {
            title_id: tid,
            version: "512".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0000000100000002"));
        assert!(msg.contains("512"));

        let err = TitleError::ContentFetch {
            title_id: tid,
            content_id: 0x1f,
            reason: "short read".into(),
        };
        assert!(err.to_string().contains("0000001f"));
    }

    #[test]
    fn http_title_error_hints_endpoint_down() {
        let err = TitleError::Http {
            url: "http://example.invalid/x".into(),
            reason: "connection refused".into(),
            status: None,
        };
        assert!(err.to_string().contains("is the endpoint down?"));
    }
}
