//! Ferropki Codec
//!
//! All cryptographic construction and parsing for the ferropki engine:
//! key-pair generation, X.509 certificate building and decoding, CRL
//! construction, and PEM/DER/PKCS#12 container handling.
//!
//! No other crate in the workspace touches raw key or certificate bytes;
//! everything goes through the operations exposed here. All operations are
//! pure functions of their inputs (signatures use randomized padding, so
//! outputs are structurally, not byte-wise, reproducible).

pub mod cert;
pub mod crl;
pub mod error;
pub mod key;
pub mod pkcs12;
pub mod subject;

pub use cert::{
    build_self_signed_certificate, build_signed_certificate, decode, encode, sign_csr_certificate,
    CertificateInfo, EncodingFormat, SanEntry, UsageClass,
};
pub use crl::{build_crl, CrlEntry, RevocationReason};
pub use error::{CodecError, Result};
pub use key::{KeyAlgorithm, KeyMaterial, KeySpec};
pub use pkcs12::package_pkcs12;
pub use subject::SubjectName;
