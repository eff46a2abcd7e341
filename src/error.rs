use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while exporting and extracting a journal
///
/// Anything past extraction (per-entry processing, reports) is reported
/// through `anyhow` instead; a value of this type always means the run
/// cannot trust any entry and must abort.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The login page was still showing after submitting credentials
    #[error("Authentication failed - check DAYONE_EMAIL and DAYONE_PASSWORD")]
    AuthenticationFailed,

    /// Every candidate locator for an automation step failed to resolve
    #[error("No element found for step '{action}' (tried: {})", .candidates.join(", "))]
    StepLocatorExhausted {
        action: String,
        candidates: Vec<String>,
    },

    /// Neither a direct export control nor one behind a menu could be found
    #[error("Export surface unreachable (tried: {})", .attempted.join(", "))]
    ExportSurfaceUnreachable { attempted: Vec<String> },

    /// No export response was observed before the capture deadline
    #[error("Timed out after {seconds}s waiting for the export download")]
    DownloadTimeout { seconds: u64 },

    /// Neither network capture nor the scratch directory produced an archive
    #[error("Export file not found in {}", .dir.display())]
    ExportArtifactNotFound { dir: PathBuf },

    /// The captured artifact does not hold exactly one usable JSON document
    #[error("Malformed export archive: {0}")]
    MalformedArchive(String),

    #[error(transparent)]
    Browser(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Whether re-running the whole export may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            ExportError::AuthenticationFailed | ExportError::MalformedArchive(_) => false,
            ExportError::StepLocatorExhausted { .. }
            | ExportError::ExportSurfaceUnreachable { .. }
            | ExportError::DownloadTimeout { .. }
            | ExportError::ExportArtifactNotFound { .. }
            | ExportError::Browser(_)
            | ExportError::Io(_) => true,
        }
    }
}

/// Stage of a run, used to tell the user where a failed run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Export,
    Extract,
    Process,
    Synchronize,
    Report,
}

impl Phase {
    pub fn as_str(&self) -> &str {
        match self {
            Phase::Export => "export",
            Phase::Extract => "extract",
            Phase::Process => "process",
            Phase::Synchronize => "synchronize",
            Phase::Report => "report",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
