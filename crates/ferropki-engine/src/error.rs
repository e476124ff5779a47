use ferropki_codec::CodecError;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors produced by engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Key algorithm/size combination outside the accepted set
    #[error("unsupported key parameters: {0}")]
    UnsupportedKeyParameters(String),

    /// Cryptographic construction or parsing failure
    #[error(transparent)]
    Codec(CodecError),

    /// Parent/child relationship violates chain constraints
    #[error("invalid CA hierarchy: {0}")]
    InvalidCAHierarchy(String),

    #[error("CA not found: {0}")]
    CANotFound(Uuid),

    /// Operation requires an active CA
    #[error("CA is not active: {0}")]
    CANotActive(Uuid),

    #[error("CA certificate has expired: {0}")]
    CAExpired(Uuid),

    /// CA is revoked and its signing key has been purged
    #[error("CA is revoked: {0}")]
    CARevoked(Uuid),

    #[error(
        "requested validity ends {requested_not_after} but the CA certificate expires {ca_not_after}"
    )]
    ValidityExceedsCAWindow {
        requested_not_after: OffsetDateTime,
        ca_not_after: OffsetDateTime,
    },

    #[error("unsupported usage class: {0}")]
    UnsupportedUsageClass(String),

    #[error("certificate not found: {0}")]
    CertificateNotFound(String),

    /// Serial reservation retries exhausted
    #[error("serial number space exhausted")]
    SerialExhaustion,

    /// Private key absent, or its single-use export already consumed
    #[error("private key unavailable for {0}")]
    PrivateKeyUnavailable(Uuid),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),
}

// Key-parameter rejections keep their own variant; everything else from the
// codec surfaces as a codec failure.
impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedKeyParameters(msg) => Error::UnsupportedKeyParameters(msg),
            other => Error::Codec(other),
        }
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
