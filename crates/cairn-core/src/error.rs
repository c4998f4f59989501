use thiserror::Error;

pub type Result<T> = std::result::Result<T, CairnError>;

#[derive(Debug, Error)]
pub enum CairnError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}: {source}")]
    PathIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsafe object key: {0}")]
    InvalidKey(String),

    #[error("invalid byte range {begin}..{end} for '{key}'")]
    InvalidRange { key: String, begin: u64, end: u64 },

    #[error("object not found: '{0}'")]
    MissingObject(String),

    #[error("decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("invalid encryption key: {0}")]
    InvalidEncryptionKey(String),

    #[error("invalid object format: {0}")]
    InvalidFormat(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown backend: '{0}'")]
    UnknownBackend(String),

    #[error("backend '{0}' does not support partial reads")]
    NotPartialRead(String),

    #[error("no source named '{0}' in group")]
    UnknownGroup(String),

    #[error("{0}")]
    Other(String),
}

impl CairnError {
    /// Attach a path to a bare I/O error for per-file diagnostics.
    pub(crate) fn with_path(path: &str, source: std::io::Error) -> Self {
        CairnError::PathIo {
            path: path.to_string(),
            source,
        }
    }
}
