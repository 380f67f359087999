//! Reconciled per-mod records

use std::fmt;

/// Classification of one local or discovered mod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModStatus {
    /// Local file whose hash the registry does not know
    Unrecognized,
    /// Recognized local file; updates were not checked or could not be
    /// determined
    Installed,
    /// Recognized local file matching the newest registry version
    UpToDate,
    /// Recognized local file superseded by a newer registry version
    UpdateAvailable { installed: String, latest: String },
    /// Search result available for download, not installed locally
    Available,
}

impl fmt::Display for ModStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModStatus::Unrecognized => write!(f, "Unrecognized"),
            ModStatus::Installed => write!(f, "Installed"),
            ModStatus::UpToDate => write!(f, "Up to date"),
            ModStatus::UpdateAvailable { installed, latest } => {
                write!(f, "Update available ({} -> {})", installed, latest)
            }
            ModStatus::Available => write!(f, "Available"),
        }
    }
}

/// One row of reconciliation or search output.
///
/// Produced by the folder scanner or the search resolver and not mutated
/// afterwards; the consumer decides what to do with it.
#[derive(Debug, Clone)]
pub struct ModRecord {
    pub title: String,
    pub author: String,
    pub version: String,
    pub status: ModStatus,
    /// Artifact to fetch when installing or updating
    pub download_url: Option<String>,
    /// Filename the artifact should be saved under
    pub download_filename: Option<String>,
    pub needs_update: bool,
    pub project_id: Option<String>,
    /// Name of the local file this record was derived from, if any
    pub original_filename: Option<String>,
}

impl ModRecord {
    /// Record for a local file the registry did not recognize.
    pub fn unrecognized(filename: &str) -> Self {
        Self {
            title: filename.to_string(),
            author: "-".to_string(),
            version: "-".to_string(),
            status: ModStatus::Unrecognized,
            download_url: None,
            download_filename: None,
            needs_update: false,
            project_id: None,
            original_filename: Some(filename.to_string()),
        }
    }
}

/// Settings threaded into a scan rather than read from ambient state
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub loader: String,
    pub game_version: String,
    /// When false, recognized files are reported as Installed without any
    /// per-project version lookups.
    pub check_updates: bool,
}

/// Emission from an in-flight scan
#[derive(Debug)]
pub enum ScanEvent {
    Record(ModRecord),
    /// Terminal; always sent, even when every item failed
    Complete,
}
