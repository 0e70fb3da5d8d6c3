use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

/// Failure reported by a backing object-storage client.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("api error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sdk error: {0}")]
    Sdk(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

/// Coarse classification of [`FsError`], for callers that branch on the kind
/// of failure rather than on its message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Sdk,
    BucketLoad,
    Upload,
    NotFound,
    Unsupported,
    InvalidExpiration,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Sdk => "sdk",
            ErrorKind::BucketLoad => "bucket_load",
            ErrorKind::Upload => "upload",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::InvalidExpiration => "invalid_expiration",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

pub const B2_SDK_ERROR: u32 = 1000;
pub const BUCKET_LOAD_ERROR: u32 = 1001;
pub const FILE_UPLOAD_ERROR: u32 = 2000;

/// Error returned by every filesystem operation.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("{context}: {source}")]
    Sdk {
        context: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("the requested bucket does not exist: {0}")]
    BucketNotFound(String),

    #[error("error writing file {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: BackendError,
    },

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("expiration must be in the future, got {0} seconds from now")]
    InvalidExpiration(i64),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FsError {
    /// Wraps a backend failure, keeping "not found" distinguishable.
    pub fn sdk(context: &'static str, path: &str, source: BackendError) -> Self {
        if source.is_not_found() {
            return FsError::NotFound(path.to_string());
        }
        FsError::Sdk { context, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::Sdk { .. } => ErrorKind::Sdk,
            FsError::BucketNotFound(_) => ErrorKind::BucketLoad,
            FsError::Upload { .. } => ErrorKind::Upload,
            FsError::NotFound(_) => ErrorKind::NotFound,
            FsError::Unsupported(_) => ErrorKind::Unsupported,
            FsError::InvalidExpiration(_) => ErrorKind::InvalidExpiration,
            FsError::Config(_) => ErrorKind::Config,
        }
    }

    /// Numeric code carried by SDK, bucket and upload failures.
    pub fn code(&self) -> Option<u32> {
        match self.kind() {
            ErrorKind::Sdk => Some(B2_SDK_ERROR),
            ErrorKind::BucketLoad => Some(BUCKET_LOAD_ERROR),
            ErrorKind::Upload => Some(FILE_UPLOAD_ERROR),
            _ => None,
        }
    }
}
