use blockgate_store::StoreError;
use blockgate_tsdb::TsdbError;

/// Errors returned by the upload operations.
///
/// Every variant except [`UploadError::Storage`] and
/// [`UploadError::Internal`] is a client error whose message is shown to the
/// caller verbatim.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TooLarge(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    TooManyRequests(String),

    /// An object store call failed while serving a request.
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("{0}")]
    Internal(String),
}

impl UploadError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Wrap a store error with what was being attempted.
    pub fn storage(context: impl Into<String>) -> impl FnOnce(StoreError) -> Self {
        let context = context.into();
        move |source| Self::Storage { context, source }
    }

    /// Whether the message is safe to show to the client.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage { .. } | Self::Internal(_))
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Reasons a block fails validation. The `Display` text is what gets
/// recorded in `validation.json`.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("block exceeds the maximum block size limit of {0} bytes")]
    BlockTooLarge(i64),

    #[error("invalid negative file size in block metadata")]
    NegativeFileSize,

    #[error("failed to create temporary block directory")]
    StagingDir(#[source] std::io::Error),

    #[error("failed to download block: {0}")]
    Download(String),

    #[error("failed renaming while preparing block for validation")]
    PrepareMeta(#[source] std::io::Error),

    #[error("failed to stat {path}: {source}")]
    Stat {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("file size mismatch for {0}")]
    SizeMismatch(String),

    #[error("error validating block: {0}")]
    Block(#[source] TsdbError),

    #[error("block validation cancelled")]
    Cancelled,

    #[error("block validation task failed: {0}")]
    Task(String),
}
