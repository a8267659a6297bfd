use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the translation-management API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("HTTP error: {status} for URL: {url}")]
    StatusError {
        status: reqwest::StatusCode,
        url: String,
        body: String,
    },

    #[error("Failed to decode response from {url}: {source}")]
    DecodeError {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Async download {job} failed: {reason}")]
    JobFailed { job: String, reason: String },

    #[error("Async download {job} still pending after {polls} polls")]
    JobTimeout { job: String, polls: u32 },

    #[error("Invalid header value: {0}")]
    HeaderError(#[from] reqwest::header::InvalidHeaderValue),
}

/// One defect found in a translation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxIssue {
    FormatMismatch { line: usize },
    QuoteCount { line: usize, found: usize },
    BlacklistedKey { line: usize, key: String },
    Unparseable { reason: String },
}

impl SyntaxIssue {
    /// Line the issue belongs to, `None` for whole-file issues.
    pub fn line(&self) -> Option<usize> {
        match self {
            SyntaxIssue::FormatMismatch { line }
            | SyntaxIssue::QuoteCount { line, .. }
            | SyntaxIssue::BlacklistedKey { line, .. } => Some(*line),
            SyntaxIssue::Unparseable { .. } => None,
        }
    }
}

impl fmt::Display for SyntaxIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxIssue::FormatMismatch { line } => {
                write!(f, "Line {} does not match format", line)
            }
            SyntaxIssue::QuoteCount { line, found } => write!(
                f,
                "Line {} doesn't have exactly 2 unescaped quotes (found {})",
                line, found
            ),
            SyntaxIssue::BlacklistedKey { line, key } => {
                write!(f, "Line {} has blacklisted key {}", line, key)
            }
            SyntaxIssue::Unparseable { reason } => {
                write!(f, "Cannot load file as INI: {}", reason)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Unable to read file \"{path}\" for checking: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File {path} has following errors: {}", join_issues(.issues))]
    Invalid {
        path: PathBuf,
        issues: Vec<SyntaxIssue>,
    },
}

fn join_issues(issues: &[SyntaxIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum EscapeError {
    #[error("RegExp failed while trying to escape quotes: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Translation body is not valid UTF-8: {0}")]
    EncodingError(#[from] std::string::FromUtf8Error),
}

/// Structural failure while reading a whole file as INI.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} on line {line}")]
pub struct IniParseError {
    pub line: usize,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error while writing archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Why a single (resource, language) download did not produce a valid file.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error(transparent)]
    Transport(#[from] ApiError),

    #[error(transparent)]
    Content(#[from] ValidationError),

    #[error(transparent)]
    Escape(#[from] EscapeError),

    #[error("IO error on {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Only remote-side failures are worth another attempt; content will not change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadError::Transport(_))
    }

    /// The downloaded text itself is broken, so the language cannot be packaged.
    pub fn is_content(&self) -> bool {
        matches!(self, DownloadError::Content(_) | DownloadError::Escape(_))
    }
}

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Encountered error during fetching language \"{language}\" details for package build. Error: {source}")]
    LanguageDetails {
        language: String,
        #[source]
        source: ApiError,
    },

    #[error("IO error while packaging \"{language}\" at {path}: {source}")]
    IoError {
        language: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zip error while packaging \"{language}\": {source}")]
    ZipError {
        language: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to serialize metadata for \"{language}\": {source}")]
    JsonError {
        language: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Encountered error during \"{key}\" deletion of previous matching objects. Error: {message}")]
    DeleteError { key: String, message: String },

    #[error("Encountered error during \"{key}\" upload. Error: {message}")]
    PutError { key: String, message: String },

    #[error("IO error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No bucket configured, set AWS_S3_BUCKET to upload packages")]
    MissingBucket,
}

/// Run-level failures. Only these abort a run.
#[derive(Error, Debug)]
pub enum PackerError {
    #[error("Encountered error during fetching all resources. Error: {0}")]
    ResourceEnumeration(#[source] ApiError),

    #[error("IO error on working tree {path}: {source}")]
    WorkingTree {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
