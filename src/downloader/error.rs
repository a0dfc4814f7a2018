//! Download errors and classification of yt-dlp failures.

use std::time::Duration;
use thiserror::Error;

/// Patterns for media that cannot be fetched no matter how often we try
const UNAVAILABLE_PATTERNS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is not available",
    "This video is private",
    "removed by the uploader",
    "no longer available",
    "blocked it in your country",
    "geo-restricted",
    "who has blocked it on copyright grounds",
    "copyright claim",
    "terminated account",
    "This video has been removed",
    "Premieres in",
    "This live event will begin",
    "HTTP Error 404",
    "File is larger than max-filesize",
];

/// Patterns for links yt-dlp does not know how to handle
const UNSUPPORTED_PATTERNS: &[&str] = &[
    "Unsupported URL",
    "is not a valid URL",
    "Unable to extract video data",
    "No video formats found",
    "Requested format is not available",
];

/// Patterns for content that needs a logged-in session (cookies)
const AUTH_PATTERNS: &[&str] = &[
    "Sign in to confirm your age",
    "Sign in to confirm you",
    "Sign in to view this video",
    "age-restricted",
    "members-only",
    "Join this channel to get access",
    "login required",
    "Login required",
    "use --cookies",
    "cookies are no longer valid",
    "HTTP Error 403",
];

/// Patterns for transient network trouble
const TRANSIENT_PATTERNS: &[&str] = &[
    "Connection reset",
    "Connection timed out",
    "Unable to download webpage",
    "HTTP Error 429",
    "HTTP Error 503",
    "Read timed out",
    "network is unreachable",
    "Temporary failure in name resolution",
];

/// Coarse category of a failed yt-dlp run, derived from its stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Private, removed, region-locked or over the size cap
    Unavailable,
    /// Not a link yt-dlp can extract from
    Unsupported,
    /// Needs cookies / a signed-in account
    AuthRequired,
    /// Network hiccup; a later attempt may succeed
    Transient,
    /// Anything else
    Other,
}

impl FailureKind {
    /// Classify yt-dlp error output.
    ///
    /// Unsupported links are checked first, since yt-dlp often adds generic
    /// network noise to those messages.
    #[must_use]
    pub fn classify(stderr: &str) -> Self {
        let matches = |patterns: &[&str]| patterns.iter().any(|p| stderr.contains(p));

        if matches(UNSUPPORTED_PATTERNS) {
            Self::Unsupported
        } else if matches(UNAVAILABLE_PATTERNS) {
            Self::Unavailable
        } else if matches(AUTH_PATTERNS) {
            Self::AuthRequired
        } else if matches(TRANSIENT_PATTERNS) {
            Self::Transient
        } else {
            Self::Other
        }
    }
}

/// Errors produced while fetching media
#[derive(Debug, Error)]
pub enum DownloadError {
    /// yt-dlp could not be started at all
    #[error("failed to launch yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    /// yt-dlp ran and exited unsuccessfully
    #[error("{message}")]
    Failed {
        /// Classified failure category
        kind: FailureKind,
        /// Raw error text reported by yt-dlp
        message: String,
    },

    /// yt-dlp did not finish in time and was killed
    #[error("download timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// yt-dlp reported success but no output file was found
    #[error("could not find the final downloaded file; an error might have occurred during conversion")]
    MissingOutput,

    /// The produced file exceeds the upload limit
    #[error("file is too large for Telegram: {size_mb:.1} MB (limit {limit_mb} MB)")]
    TooLarge {
        /// Actual size in megabytes
        size_mb: f64,
        /// Configured limit in megabytes
        limit_mb: u64,
    },

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Build a `Failed` error from yt-dlp's stderr (falling back to stdout).
    #[must_use]
    pub fn from_output(stderr: &str, stdout: &str) -> Self {
        let raw = if stderr.trim().is_empty() { stdout } else { stderr };
        let message = last_error_lines(raw);
        Self::Failed {
            kind: FailureKind::classify(raw),
            message,
        }
    }

    /// Failure category, if this error came from yt-dlp itself
    #[must_use]
    pub const fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Keeps the `ERROR:` lines of yt-dlp output, or the whole trimmed text when there are none.
fn last_error_lines(raw: &str) -> String {
    let errors: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR:"))
        .collect();

    if errors.is_empty() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            "yt-dlp exited with an error and no output".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        errors.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unsupported() {
        let err = "ERROR: Unsupported URL: https://example.com/page";
        assert_eq!(FailureKind::classify(err), FailureKind::Unsupported);
    }

    #[test]
    fn test_classify_private() {
        let err = "ERROR: [youtube] abc: Private video. Sign in if you've been granted access";
        assert_eq!(FailureKind::classify(err), FailureKind::Unavailable);
    }

    #[test]
    fn test_classify_auth() {
        let err = "ERROR: [instagram] xyz: Requested content is not available, rate-limit reached or login required. Use --cookies";
        assert_eq!(FailureKind::classify(err), FailureKind::AuthRequired);
    }

    #[test]
    fn test_classify_transient() {
        let err = "ERROR: Unable to download webpage: HTTP Error 503: Service Unavailable";
        assert_eq!(FailureKind::classify(err), FailureKind::Transient);
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(FailureKind::classify("something odd"), FailureKind::Other);
    }

    #[test]
    fn test_from_output_keeps_error_lines() {
        let stderr = "[youtube] Extracting URL\nWARNING: slow\nERROR: Video unavailable\n";
        let err = DownloadError::from_output(stderr, "");
        assert_eq!(err.to_string(), "ERROR: Video unavailable");
        assert_eq!(err.kind(), Some(FailureKind::Unavailable));
    }

    #[test]
    fn test_from_output_falls_back_to_stdout() {
        let err = DownloadError::from_output("  ", "boom\n");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_from_output_empty() {
        let err = DownloadError::from_output("", "");
        assert_eq!(err.to_string(), "yt-dlp exited with an error and no output");
        assert_eq!(err.kind(), Some(FailureKind::Other));
    }

    #[test]
    fn test_timeout_message() {
        let err = DownloadError::Timeout(Duration::from_secs(900));
        assert_eq!(err.to_string(), "download timed out after 900s");
        assert_eq!(err.kind(), None);
    }
}
