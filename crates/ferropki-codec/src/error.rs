use thiserror::Error;

/// Errors produced by codec operations.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Key algorithm/size combination outside the accepted set
    #[error("unsupported key parameters: {0}")]
    UnsupportedKeyParameters(String),

    /// Malformed input bytes (PEM/DER/CSR)
    #[error("parse error: {0}")]
    Parse(String),

    /// Certificate or CRL construction failure
    #[error("build error: {0}")]
    Build(String),

    /// Signing key and certificate material are inconsistent
    #[error("signing error: {0}")]
    Signing(String),

    /// Container packaging failure
    #[error("export error: {0}")]
    Export(String),
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
