// Error types for the download pipeline

use std::fmt;

#[derive(Debug, Clone)]
pub enum DownloadError {
    /// URL host is not on the configured allow-list
    InvalidDomain,

    /// The site rejected the requested format/codec combination
    FormatUnavailable(String),

    /// Network timeout while the engine talked to the site
    NetworkTimeout,

    /// yt-dlp or ffmpeg not found on this system
    ToolNotFound(String),

    /// Failed to parse engine JSON output
    ParseError(String),

    /// Subprocess execution failed
    ExecutionError(String),

    /// Engine reported success but the artifact is not on disk
    FileMissing(String),

    /// Finished artifact exceeds the configured size limit
    FileTooLarge { size: u64, limit: u64 },

    /// Unknown error with details
    Unknown(String),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDomain => write!(f, "Domain is not allowed"),
            Self::FormatUnavailable(msg) => write!(f, "Requested format is not available: {}", msg),
            Self::NetworkTimeout => write!(f, "Network timeout: the site is not responding"),
            Self::ToolNotFound(tool) => write!(f, "Tool not found: {}", tool),
            Self::ParseError(msg) => write!(f, "Parse error: {}", msg),
            Self::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
            Self::FileMissing(msg) => write!(f, "{}", msg),
            Self::FileTooLarge { limit, .. } => write!(
                f,
                "File size exceeds maximum limit of {}MB",
                limit / (1024 * 1024)
            ),
            Self::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for DownloadError {}

// Classify raw engine stderr into error types
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        // Format negotiation rejected by the site. Checked first: the text
        // also contains words the broader patterns below would match.
        if s.contains("Requested format is not available")
            || s.contains("requested format not available")
        {
            return Self::FormatUnavailable(s);
        }

        if s.contains("timeout") || s.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if s.contains("No such file") || s.contains("command not found") || s.contains("not found")
        {
            return Self::ToolNotFound(s);
        }

        if s.contains("parse") || s.contains("JSON") || s.contains("Invalid JSON") {
            return Self::ParseError(s);
        }

        Self::Unknown(s)
    }
}
