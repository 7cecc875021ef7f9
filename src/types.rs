//! Core types for nus-update

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, TitleError};

/// Title id of boot2, the one title excluded from runs unless confirmed
pub const BOOT2_TITLE_ID: TitleId = TitleId(0x0000_0001_0000_0001);

/// Title id of the System Menu
pub const SYSTEM_MENU_TITLE_ID: TitleId = TitleId(0x0000_0001_0000_0002);

/// Region code accepted by the system update service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// North America
    #[serde(rename = "USA")]
    Usa,
    /// Europe
    #[serde(rename = "EUR")]
    Eur,
    /// Japan
    #[serde(rename = "JPN")]
    Jpn,
    /// Korea
    #[serde(rename = "KOR")]
    Kor,
    /// Taiwan
    #[serde(rename = "TWN")]
    Twn,
}

impl Region {
    /// Every accepted region, in the order they are listed to users
    pub const ALL: [Region; 5] = [
        Region::Usa,
        Region::Eur,
        Region::Jpn,
        Region::Kor,
        Region::Twn,
    ];

    /// Wire code sent as `RegionId`
    pub fn code(&self) -> &'static str {
        match self {
            Region::Usa => "USA",
            Region::Eur => "EUR",
            Region::Jpn => "JPN",
            Region::Kor => "KOR",
            Region::Twn => "TWN",
        }
    }

    /// Comma separated list of accepted codes, for error messages
    pub fn valid_codes() -> String {
        Self::ALL
            .iter()
            .map(Region::code)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Region {
    type Err = Error;

    /// Exact, case-sensitive match against the allow-list
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.code() == s)
            .ok_or_else(|| Error::InvalidRegion(s.to_string()))
    }
}

/// 64-bit title identifier, shown as 16 uppercase hex digits
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TitleId(pub u64);

impl TitleId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Upper 32 bits (title type, e.g. 00000001 for system titles)
    pub fn high(&self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl std::fmt::Display for TitleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl std::str::FromStr for TitleId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("title id must be 16 hex digits, got '{}'", s));
        }
        u64::from_str_radix(s, 16)
            .map(TitleId)
            .map_err(|e| format!("invalid title id '{}': {}", s, e))
    }
}

impl TryFrom<String> for TitleId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TitleId> for String {
    fn from(id: TitleId) -> Self {
        id.to_string()
    }
}

impl From<u64> for TitleId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// One `TitleVersion` element of the system update listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleEntry {
    /// Title identifier
    pub title_id: TitleId,
    /// Title version
    pub version: u16,
    /// Declared size on the console filesystem, in bytes
    pub fs_size: u64,
}

impl TitleEntry {
    /// Deterministic output file name, `<TITLEID>-v<version>.<extension>`
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}-v{}.{}", self.title_id, self.version, extension)
    }
}

impl std::fmt::Display for TitleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Title ID {} Version {}", self.title_id, self.version)
    }
}

/// Parsed body of a `GetSystemUpdateResponse`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemUpdate {
    /// `ErrorCode` reported by the service (0 when absent)
    pub error_code: i64,
    /// `ContentPrefixURL` advertised by the service, if any
    pub content_prefix_url: Option<String>,
    /// Entries in response order
    pub entries: Vec<TitleEntry>,
    /// Number of `TitleVersion` elements dropped because a field was missing or invalid
    pub skipped: usize,
}

/// Which listed titles a run should process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TitlePolicy {
    /// Title that is only processed when `include_sensitive` is set
    pub sensitive_title: TitleId,
    /// Whether the sensitive title was explicitly confirmed
    pub include_sensitive: bool,
}

impl Default for TitlePolicy {
    fn default() -> Self {
        Self {
            sensitive_title: BOOT2_TITLE_ID,
            include_sensitive: false,
        }
    }
}

impl TitlePolicy {
    /// Whether `entry` should be skipped without a download attempt
    pub fn excludes(&self, entry: &TitleEntry) -> bool {
        entry.title_id == self.sensitive_title && !self.include_sensitive
    }
}

/// Outcome of one entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryStatus {
    /// WAD written to disk
    Downloaded {
        /// Final output path
        path: PathBuf,
        /// Number of bytes written
        bytes: u64,
    },
    /// Skipped by the title policy, nothing was requested
    Excluded,
    /// Materialization or write failed
    Failed(TitleError),
}

/// One entry and what happened to it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryReport {
    /// The listed title
    pub entry: TitleEntry,
    /// What happened
    pub status: EntryStatus,
}

/// Aggregated result of a run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Per-entry reports in processing order
    pub reports: Vec<EntryReport>,
    /// Entries never visited because the run was cancelled
    pub remaining: usize,
    /// Whether the run stopped early on a cancellation request
    pub cancelled: bool,
}

impl RunSummary {
    /// Number of WADs written
    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, EntryStatus::Downloaded { .. }))
            .count()
    }

    /// Number of entries that failed
    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// Number of entries skipped by policy
    pub fn excluded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status == EntryStatus::Excluded)
            .count()
    }

    /// Failed entries with their cause
    pub fn failures(&self) -> impl Iterator<Item = (&TitleEntry, &TitleError)> {
        self.reports.iter().filter_map(|r| match &r.status {
            EntryStatus::Failed(e) => Some((&r.entry, e)),
            _ => None,
        })
    }

    /// True when nothing failed and the run was not cancelled
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !self.cancelled
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cancelled {
            write!(
                f,
                "Cancelled: {} downloaded, {} failed, {} not attempted.",
                self.succeeded(),
                self.failed(),
                self.remaining
            )
        } else if self.failed() == 0 {
            write!(f, "Successfully downloaded all files!")?;
            if self.excluded() > 0 {
                write!(f, " ({} excluded)", self.excluded())?;
            }
            Ok(())
        } else {
            write!(
                f,
                "Completed with {} failure(s): {} of {} downloaded.",
                self.failed(),
                self.succeeded(),
                self.reports.len() - self.excluded()
            )
        }
    }
}

/// Event emitted while a run progresses
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The service listed the titles of the update
    TitlesListed {
        /// Region queried
        region: Region,
        /// Number of usable entries
        count: usize,
        /// Number of malformed entries dropped
        skipped: usize,
    },

    /// Entry skipped by the title policy
    Excluded {
        /// The entry
        entry: TitleEntry,
    },

    /// Entry download started
    Downloading {
        /// The entry
        entry: TitleEntry,
    },

    /// Entry written to disk
    Downloaded {
        /// The entry
        entry: TitleEntry,
        /// Output path
        path: PathBuf,
    },

    /// Entry failed, run continues
    Failed {
        /// The entry
        entry: TitleEntry,
        /// Error message
        error: String,
    },

    /// Run stopped before all entries were visited
    Cancelled {
        /// Entries not attempted
        remaining: usize,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tid: u64, version: u16) -> TitleEntry {
        TitleEntry {
            title_id: TitleId(tid),
            version,
            fs_size: 0,
        }
    }

    #[test]
    fn region_accepts_exact_codes_only() {
        for code in ["USA", "EUR", "JPN", "KOR", "TWN"] {
            let region: Region = code.parse().unwrap();
            assert_eq!(region.code(), code);
        }
        for bad in ["usa", "Usa", "ZZZ", "", " USA", "USA "] {
            assert!(bad.parse::<Region>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn title_id_display_is_sixteen_hex_digits() {
        let tid: TitleId = "0000000100000002".parse().unwrap();
        assert_eq!(tid, SYSTEM_MENU_TITLE_ID);
        assert_eq!(tid.to_string(), "0000000100000002");
        assert_eq!(tid.high(), 1);

        let lower: TitleId = "000100024f4d4145".parse().unwrap();
        assert_eq!(lower.to_string(), "000100024F4D4145");
    }

    #[test]
    fn title_id_rejects_wrong_length_or_digits() {
        assert!("1234".parse::<TitleId>().is_err());
        assert!("000000010000000G".parse::<TitleId>().is_err());
        assert!("00000001000000021".parse::<TitleId>().is_err());
    }

    #[test]
    fn file_name_is_deterministic() {
        let e = entry(0x0000_0001_0000_0002, 512);
        assert_eq!(e.file_name("wad"), "0000000100000002-v512.wad");
        assert_eq!(e.file_name("wad"), e.file_name("wad"));
    }

    #[test]
    fn file_name_uses_canonical_title_id_case() {
        let e = TitleEntry {
            title_id: "000100024f4d4145".parse().unwrap(),
            version: 3,
            fs_size: 0,
        };
        assert_eq!(e.file_name("wad"), "000100024F4D4145-v3.wad");
    }

    #[test]
    fn policy_excludes_sensitive_title_by_default() {
        let policy = TitlePolicy::default();
        assert!(policy.excludes(&entry(BOOT2_TITLE_ID.get(), 5)));
        assert!(!policy.excludes(&entry(SYSTEM_MENU_TITLE_ID.get(), 513)));

        let opted_in = TitlePolicy {
            include_sensitive: true,
            ..TitlePolicy::default()
        };
        assert!(!opted_in.excludes(&entry(BOOT2_TITLE_ID.get(), 5)));
    }

    #[test]
    fn summary_message_reflects_failures() {
        let mut summary = RunSummary::default();
        summary.reports.push(EntryReport {
            entry: entry(2, 1),
            status: EntryStatus::Downloaded {
                path: PathBuf::from("a.wad"),
                bytes: 10,
            },
        });
        assert!(summary.is_success());
        assert_eq!(summary.to_string(), "Successfully downloaded all files!");

        summary.reports.push(EntryReport {
            entry: entry(3, 1),
            status: EntryStatus::Failed(TitleError::TicketUnavailable {
                title_id: TitleId(3),
            }),
        });
        assert!(!summary.is_success());
        assert_eq!(summary.failed(), 1);
        assert_eq!(
            summary.to_string(),
            "Completed with 1 failure(s): 1 of 2 downloaded."
        );
    }

    #[test]
    fn summary_counts_exclusions_separately() {
        let summary = RunSummary {
            reports: vec![EntryReport {
                entry: entry(BOOT2_TITLE_ID.get(), 5),
                status: EntryStatus::Excluded,
            }],
            ..Default::default()
        };
        assert!(summary.is_success());
        assert_eq!(summary.excluded(), 1);
        assert!(summary.to_string().contains("1 excluded"));
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::Downloading {
            entry: entry(2, 513),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "downloading");
        assert_eq!(json["entry"]["title_id"], "0000000000000002");
    }
}
