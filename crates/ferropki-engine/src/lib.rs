//! Ferropki Engine
//!
//! Certificate authority lifecycle: CA creation and chaining, certificate
//! issuance, serial allocation, revocation bookkeeping, CRL generation and
//! export bundles. Cryptographic construction and parsing live in
//! `ferropki-codec`; persistence sits behind the [`store::Store`] trait with
//! an in-memory reference backend.
//!
//! ```no_run
//! use ferropki_engine::{Engine, EngineConfig, IssueRequest, KeySource};
//! use ferropki_codec::{KeySpec, SanEntry, SubjectName, UsageClass};
//!
//! # fn main() -> ferropki_engine::Result<()> {
//! let engine = Engine::in_memory(EngineConfig::default())?;
//! let root = engine.cas.create_root_ca(
//!     SubjectName::new("Example Root").with_organization("Example"),
//!     Some(KeySpec::ecdsa_p256()),
//!     None,
//! )?;
//! let cert = engine.issuer.issue(
//!     root.id,
//!     IssueRequest {
//!         subject: SubjectName::new("www.example.com"),
//!         san: vec![SanEntry::Dns("www.example.com".into())],
//!         usage: UsageClass::Server,
//!         validity_days: None,
//!         key_source: KeySource::Generate(None),
//!     },
//! )?;
//! let bundle = engine.exports.export_chain(cert.id)?;
//! # Ok(())
//! # }
//! ```

pub mod ca;
pub mod config;
pub mod error;
pub mod export;
pub mod issuer;
pub mod model;
pub mod revocation;
pub mod serial;
pub mod store;

use std::sync::Arc;

pub use ca::CaManager;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use export::ExportAdapter;
pub use issuer::{CertificateIssuer, IssueRequest, KeySource};
pub use model::{
    CaDescriptor, CaRecord, CaState, CertState, CertificateDescriptor, CertificateRecord,
    RevocationRecord,
};
pub use revocation::RevocationRegistry;
pub use store::{MemoryStore, Store};

/// The engine's components wired over a shared store.
pub struct Engine {
    pub cas: CaManager,
    pub issuer: CertificateIssuer,
    pub revocations: RevocationRegistry,
    pub exports: ExportAdapter,
}

impl Engine {
    /// Engine over the in-memory reference store.
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    /// Engine over a caller-provided store backend.
    pub fn with_store(store: Arc<dyn Store>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cas: CaManager::new(store.clone(), config.clone()),
            issuer: CertificateIssuer::new(store.clone(), config.clone()),
            revocations: RevocationRegistry::new(store.clone(), config),
            exports: ExportAdapter::new(store),
        })
    }
}
