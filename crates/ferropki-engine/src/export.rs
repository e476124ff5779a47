//! Export bundles: bare certificates, issuer chains and PKCS#12 containers.
//!
//! Bundles are assembled on demand from stored records; nothing produced
//! here is written back to the store, except that a PKCS#12 export consumes
//! the certificate's stored private key.

use std::sync::Arc;

use ferropki_codec::{encode, package_pkcs12, EncodingFormat};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    ca::MAX_CHAIN_DEPTH,
    error::{Error, Result},
    store::Store,
};

/// Read-side adapter producing export formats from stored records.
pub struct ExportAdapter {
    store: Arc<dyn Store>,
}

impl ExportAdapter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The certificate alone, PEM or DER.
    pub fn export_certificate(&self, cert_id: Uuid, format: EncodingFormat) -> Result<Vec<u8>> {
        let record = self.store.certificate(cert_id)?;
        Ok(encode(&record.certificate_pem, format)?)
    }

    /// The certificate followed by its issuer chain up to the root,
    /// leaf first, concatenated PEM.
    pub fn export_chain(&self, cert_id: Uuid) -> Result<String> {
        let record = self.store.certificate(cert_id)?;
        let mut bundle = record.certificate_pem.clone();
        bundle.push_str(&self.ca_chain(record.ca_id)?);
        Ok(bundle)
    }

    /// The CA's own certificate, PEM.
    pub fn export_ca_certificate(&self, ca_id: Uuid) -> Result<String> {
        Ok(self.store.ca(ca_id)?.certificate_pem)
    }

    /// The CA's certificate followed by its ancestors up to the root,
    /// concatenated PEM.
    pub fn export_ca_chain(&self, ca_id: Uuid) -> Result<String> {
        self.ca_chain(ca_id)
    }

    /// Password-protected PKCS#12 container holding the certificate, its
    /// private key and the full issuer chain up to the root.
    ///
    /// The stored private key is single-use: a completed export removes it,
    /// and a second export fails with `PrivateKeyUnavailable`. A failed
    /// packaging attempt puts the key back. Certificates issued from a CSR
    /// never had a stored key to begin with.
    pub fn export_pkcs12(&self, cert_id: Uuid, passphrase: &str) -> Result<Vec<u8>> {
        let record = self.store.certificate(cert_id)?;
        let chain = self.ca_chain(record.ca_id)?;
        let key_pem = self
            .store
            .take_certificate_key(cert_id)?
            .ok_or(Error::PrivateKeyUnavailable(cert_id))?;

        let der = match package_pkcs12(
            &record.certificate_pem,
            &key_pem,
            Some(&chain),
            passphrase,
            &record.subject.common_name,
        ) {
            Ok(der) => der,
            Err(err) => {
                if let Err(restore_err) = self.store.restore_certificate_key(cert_id, key_pem) {
                    warn!(cert_id = %cert_id, %restore_err,
                        "failed to restore private key after export failure");
                }
                return Err(err.into());
            }
        };

        info!(cert_id = %cert_id, "exported PKCS#12 bundle; private key consumed");
        Ok(der)
    }

    fn ca_chain(&self, ca_id: Uuid) -> Result<String> {
        let mut bundle = String::new();
        let mut next = Some(ca_id);
        let mut depth = 0;
        while let Some(id) = next {
            depth += 1;
            if depth > MAX_CHAIN_DEPTH {
                return Err(Error::InvalidCAHierarchy(
                    "parent walk exceeded the chain depth limit".into(),
                ));
            }
            let ca = self.store.ca(id)?;
            bundle.push_str(&ca.certificate_pem);
            next = ca.parent_id;
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use ferropki_codec::{decode, KeySpec, SubjectName, UsageClass};
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::{
        ca::CaManager,
        config::EngineConfig,
        issuer::{CertificateIssuer, IssueRequest, KeySource},
        model::{CertState, CertificateRecord},
        store::MemoryStore,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        exports: ExportAdapter,
        root_id: Uuid,
        inter_id: Uuid,
        cert_id: Uuid,
    }

    fn setup() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig::default();
        let cas = CaManager::new(store.clone(), config.clone());
        let issuer = CertificateIssuer::new(store.clone(), config);
        let exports = ExportAdapter::new(store.clone());

        let root = cas
            .create_root_ca(
                SubjectName::new("Export Root"),
                Some(KeySpec::ecdsa_p256()),
                Some(3650),
            )
            .unwrap();
        let inter = cas
            .create_intermediate_ca(
                root.id,
                SubjectName::new("Export Issuing"),
                Some(KeySpec::ecdsa_p256()),
                Some(730),
            )
            .unwrap();
        let cert = issuer
            .issue(
                inter.id,
                IssueRequest {
                    subject: SubjectName::new("bundle.example.com"),
                    san: vec![],
                    usage: UsageClass::Server,
                    validity_days: Some(365),
                    key_source: KeySource::Generate(Some(KeySpec::ecdsa_p256())),
                },
            )
            .unwrap();

        Fixture {
            store,
            exports,
            root_id: root.id,
            inter_id: inter.id,
            cert_id: cert.id,
        }
    }

    fn count_pem_blocks(bundle: &str) -> usize {
        bundle.matches("-----BEGIN CERTIFICATE-----").count()
    }

    #[test]
    fn der_export_decodes_to_the_same_certificate() {
        let fixture = setup();
        let pem = fixture
            .exports
            .export_certificate(fixture.cert_id, EncodingFormat::Pem)
            .unwrap();
        let der = fixture
            .exports
            .export_certificate(fixture.cert_id, EncodingFormat::Der)
            .unwrap();
        assert_eq!(
            decode(&pem, EncodingFormat::Pem).unwrap(),
            decode(&der, EncodingFormat::Der).unwrap()
        );
    }

    #[test]
    fn chain_walks_to_the_root() {
        let fixture = setup();
        let bundle = fixture.exports.export_chain(fixture.cert_id).unwrap();
        assert_eq!(count_pem_blocks(&bundle), 3);
        assert!(bundle.starts_with("-----BEGIN CERTIFICATE-----"));

        let ca_bundle = fixture.exports.export_ca_chain(fixture.inter_id).unwrap();
        assert_eq!(count_pem_blocks(&ca_bundle), 2);

        let root_only = fixture.exports.export_ca_chain(fixture.root_id).unwrap();
        assert_eq!(count_pem_blocks(&root_only), 1);
    }

    #[test]
    fn ca_certificate_export_matches_chain_head() {
        let fixture = setup();
        let cert = fixture
            .exports
            .export_ca_certificate(fixture.inter_id)
            .unwrap();
        let chain = fixture.exports.export_ca_chain(fixture.inter_id).unwrap();
        assert!(chain.starts_with(&cert));
    }

    #[test]
    fn pkcs12_export_consumes_the_private_key() {
        let fixture = setup();
        let der = fixture
            .exports
            .export_pkcs12(fixture.cert_id, "hunter2")
            .unwrap();
        assert!(!der.is_empty());

        let err = fixture
            .exports
            .export_pkcs12(fixture.cert_id, "hunter2")
            .unwrap_err();
        assert!(matches!(err, Error::PrivateKeyUnavailable(_)));
    }

    #[test]
    fn pkcs12_bundle_carries_the_full_issuer_chain() {
        let fixture = setup();
        let der = fixture
            .exports
            .export_pkcs12(fixture.cert_id, "hunter2")
            .unwrap();

        let pfx = p12::PFX::parse(&der).unwrap();
        assert!(pfx.verify_mac("hunter2"));
        // leaf + intermediate + root
        assert_eq!(pfx.cert_x509_bags("hunter2").unwrap().len(), 3);
    }

    #[test]
    fn failed_packaging_puts_the_key_back() {
        let fixture = setup();
        let now = OffsetDateTime::now_utc();
        let id = Uuid::new_v4();
        let record = CertificateRecord {
            id,
            ca_id: fixture.inter_id,
            subject: SubjectName::new("broken.example.com"),
            san: vec![],
            usage: UsageClass::Server,
            serial: 99,
            certificate_pem: "not a certificate".into(),
            not_before: now,
            not_after: now + Duration::days(1),
            state: CertState::Valid,
            created_at: now,
        };
        fixture
            .store
            .insert_certificate(record, Some("stored-key".into()))
            .unwrap();

        fixture.exports.export_pkcs12(id, "pw").unwrap_err();
        assert_eq!(
            fixture.store.take_certificate_key(id).unwrap().as_deref(),
            Some("stored-key")
        );
    }

    #[test]
    fn unknown_certificate_is_reported() {
        let fixture = setup();
        let err = fixture
            .exports
            .export_chain(Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, Error::CertificateNotFound(_)));
    }
}
