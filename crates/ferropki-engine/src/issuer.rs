//! End-entity certificate issuance.

use std::sync::Arc;

use ferropki_codec::{
    build_signed_certificate, sign_csr_certificate, KeyMaterial, KeySpec, SanEntry, SubjectName,
    UsageClass,
};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    error::{Error, Result},
    model::{window_end, CaState, CertState, CertificateDescriptor, CertificateRecord},
    serial,
    store::Store,
};

/// Where the subject's key pair comes from.
pub enum KeySource {
    /// Generate a key pair server-side; the private key is stored for a
    /// single later export. `None` uses the configured default spec.
    Generate(Option<KeySpec>),
    /// Caller brings a PKCS#10 CSR; no private key ever enters the engine.
    CsrPem(String),
}

/// Issuance parameters. Subject, SANs and validity are caller inputs; the
/// extension set is fixed by the usage class.
pub struct IssueRequest {
    pub subject: SubjectName,
    pub san: Vec<SanEntry>,
    pub usage: UsageClass,
    pub validity_days: Option<u32>,
    pub key_source: KeySource,
}

/// Issues certificates out of an active CA.
pub struct CertificateIssuer {
    store: Arc<dyn Store>,
    config: EngineConfig,
}

impl CertificateIssuer {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Issue a `Server` or `Client` certificate under `ca_id`.
    ///
    /// `UsageClass::Ca` is rejected here; intermediate CAs go through the
    /// CA manager so they enter the hierarchy bookkeeping.
    pub fn issue(&self, ca_id: Uuid, request: IssueRequest) -> Result<CertificateDescriptor> {
        if request.usage == UsageClass::Ca {
            return Err(Error::UnsupportedUsageClass(
                "CA certificates are created through the CA manager".into(),
            ));
        }

        let ca = self.store.ca(ca_id)?;
        if ca.state != CaState::Active {
            return Err(Error::CANotActive(ca_id));
        }
        if ca.is_expired() {
            return Err(Error::CAExpired(ca_id));
        }
        let ca_key_pem = ca
            .private_key_pem
            .as_deref()
            .ok_or(Error::PrivateKeyUnavailable(ca_id))?;
        let ca_key = KeyMaterial::from_private_key_pem(ca_key_pem, ca.key_spec)?;

        let days = request
            .validity_days
            .unwrap_or(self.config.default_cert_validity_days);
        if days == 0 {
            return Err(Error::Config(
                "certificate validity must be at least one day".into(),
            ));
        }
        let now = OffsetDateTime::now_utc();
        let not_after = window_end(now, days)?;
        if not_after > ca.not_after {
            return Err(Error::ValidityExceedsCAWindow {
                requested_not_after: not_after,
                ca_not_after: ca.not_after,
            });
        }

        let serial = serial::allocate(self.store.as_ref(), ca_id)?;

        let built = self.build(&request, &ca.subject, &ca_key, serial, now, not_after);
        let (certificate_pem, private_key_pem) = match built {
            Ok(parts) => parts,
            Err(err) => {
                if let Err(release_err) = self.store.release_serial(ca_id, serial) {
                    warn!(ca_id = %ca_id, serial = format_args!("{serial:x}"), %release_err,
                        "failed to release serial reservation");
                }
                return Err(err);
            }
        };

        let record = CertificateRecord {
            id: Uuid::new_v4(),
            ca_id,
            subject: request.subject,
            san: request.san,
            usage: request.usage,
            serial,
            certificate_pem,
            not_before: now,
            not_after,
            state: CertState::Valid,
            created_at: now,
        };
        let descriptor = CertificateDescriptor::from(&record);
        self.store.insert_certificate(record, private_key_pem)?;

        info!(ca_id = %ca_id, cert_id = %descriptor.id, serial = %descriptor.serial_hex,
            cn = %descriptor.subject.common_name, "issued certificate");
        Ok(descriptor)
    }

    pub fn certificate(&self, id: Uuid) -> Result<CertificateDescriptor> {
        Ok(CertificateDescriptor::from(&self.store.certificate(id)?))
    }

    pub fn certificates_for_ca(&self, ca_id: Uuid) -> Result<Vec<CertificateDescriptor>> {
        Ok(self
            .store
            .certificates_for_ca(ca_id)?
            .iter()
            .map(CertificateDescriptor::from)
            .collect())
    }

    fn build(
        &self,
        request: &IssueRequest,
        issuer_subject: &SubjectName,
        issuer_key: &KeyMaterial,
        serial: u64,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
    ) -> Result<(String, Option<String>)> {
        match &request.key_source {
            KeySource::Generate(spec) => {
                let spec = (*spec).unwrap_or(KeySpec::rsa(self.config.default_cert_key_bits));
                let key = KeyMaterial::generate(spec)?;
                let pem = build_signed_certificate(
                    &key,
                    &request.subject,
                    &request.san,
                    request.usage,
                    serial,
                    not_before,
                    not_after,
                    issuer_subject,
                    issuer_key,
                    None,
                )?;
                Ok((pem, Some(key.private_key_pem().to_string())))
            }
            KeySource::CsrPem(csr_pem) => {
                let pem = sign_csr_certificate(
                    csr_pem,
                    &request.subject,
                    &request.san,
                    request.usage,
                    serial,
                    not_before,
                    not_after,
                    issuer_subject,
                    issuer_key,
                )?;
                Ok((pem, None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ferropki_codec::{decode, EncodingFormat, RevocationReason};

    use super::*;
    use crate::{ca::CaManager, store::MemoryStore};

    fn setup() -> (Arc<MemoryStore>, CaManager, CertificateIssuer, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig::default();
        let cas = CaManager::new(store.clone(), config.clone());
        let issuer = CertificateIssuer::new(store.clone(), config);
        let root = cas
            .create_root_ca(
                SubjectName::new("Test Root"),
                Some(KeySpec::ecdsa_p256()),
                Some(3650),
            )
            .unwrap();
        (store, cas, issuer, root.id)
    }

    fn server_request(cn: &str) -> IssueRequest {
        IssueRequest {
            subject: SubjectName::new(cn),
            san: vec![SanEntry::Dns(cn.to_string())],
            usage: UsageClass::Server,
            validity_days: None,
            key_source: KeySource::Generate(Some(KeySpec::ecdsa_p256())),
        }
    }

    #[test]
    fn issues_server_certificate_with_default_validity() {
        let (store, _cas, issuer, ca_id) = setup();
        let issued_at = OffsetDateTime::now_utc();
        let cert = issuer.issue(ca_id, server_request("www.example.com")).unwrap();

        assert_eq!(cert.state, CertState::Valid);
        let lifetime = cert.not_after - cert.not_before;
        assert_eq!(lifetime.whole_days(), 365);
        assert!((cert.not_before - issued_at).whole_seconds().abs() < 60);

        let record = store.certificate(cert.id).unwrap();
        let info = decode(record.certificate_pem.as_bytes(), EncodingFormat::Pem).unwrap();
        assert!(!info.is_ca);
        assert_eq!(info.key_usage, vec!["DigitalSignature", "KeyEncipherment"]);
        assert_eq!(info.extended_key_usage, vec!["ServerAuth"]);
        assert_eq!(info.san, vec![SanEntry::Dns("www.example.com".into())]);
        assert_eq!(info.issuer_common_name, "Test Root");
        assert_eq!(info.serial_hex, cert.serial_hex);
    }

    #[test]
    fn generated_key_is_stored_for_later_export() {
        let (store, _cas, issuer, ca_id) = setup();
        let cert = issuer.issue(ca_id, server_request("a.example.com")).unwrap();
        let key = store.take_certificate_key(cert.id).unwrap();
        assert!(key.unwrap().contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn csr_issuance_stores_no_private_key() {
        let (store, _cas, issuer, ca_id) = setup();

        let requester = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let mut params = rcgen::CertificateParams::default();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "csr.example.com");
        let csr_pem = params.serialize_request(&requester).unwrap().pem().unwrap();

        let cert = issuer
            .issue(
                ca_id,
                IssueRequest {
                    subject: SubjectName::new("csr.example.com"),
                    san: vec![SanEntry::Dns("csr.example.com".into())],
                    usage: UsageClass::Client,
                    validity_days: Some(90),
                    key_source: KeySource::CsrPem(csr_pem),
                },
            )
            .unwrap();

        assert_eq!(store.take_certificate_key(cert.id).unwrap(), None);
    }

    #[test]
    fn rejects_ca_usage_class() {
        let (_store, _cas, issuer, ca_id) = setup();
        let err = issuer
            .issue(
                ca_id,
                IssueRequest {
                    subject: SubjectName::new("sneaky"),
                    san: vec![],
                    usage: UsageClass::Ca,
                    validity_days: None,
                    key_source: KeySource::Generate(Some(KeySpec::ecdsa_p256())),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedUsageClass(_)));
    }

    #[test]
    fn rejects_zero_and_out_of_range_validity() {
        let (_store, _cas, issuer, ca_id) = setup();

        let mut request = server_request("zero.example.com");
        request.validity_days = Some(0);
        assert!(matches!(
            issuer.issue(ca_id, request),
            Err(Error::Config(_))
        ));

        let mut request = server_request("huge.example.com");
        request.validity_days = Some(u32::MAX);
        assert!(matches!(
            issuer.issue(ca_id, request),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rejects_validity_beyond_ca_window() {
        let (_store, _cas, issuer, ca_id) = setup();
        let mut request = server_request("late.example.com");
        request.validity_days = Some(4000);
        let err = issuer.issue(ca_id, request).unwrap_err();
        assert!(matches!(err, Error::ValidityExceedsCAWindow { .. }));
    }

    #[test]
    fn revoked_ca_stops_issuing_but_prior_certs_stay_valid() {
        let (_store, cas, issuer, ca_id) = setup();
        let earlier = issuer.issue(ca_id, server_request("kept.example.com")).unwrap();

        cas.revoke_ca(ca_id, RevocationReason::CaCompromise).unwrap();

        let err = issuer
            .issue(ca_id, server_request("new.example.com"))
            .unwrap_err();
        assert!(matches!(err, Error::CANotActive(_)));
        assert_eq!(
            issuer.certificate(earlier.id).unwrap().state,
            CertState::Valid
        );
    }

    #[test]
    fn unknown_ca_is_reported() {
        let (_store, _cas, issuer, _ca_id) = setup();
        let err = issuer
            .issue(Uuid::new_v4(), server_request("x"))
            .unwrap_err();
        assert!(matches!(err, Error::CANotFound(_)));
    }

    #[test]
    fn parallel_issuance_yields_distinct_serials() {
        let (_store, _cas, issuer, ca_id) = setup();
        let issuer = Arc::new(issuer);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let issuer = Arc::clone(&issuer);
                std::thread::spawn(move || {
                    issuer
                        .issue(ca_id, server_request(&format!("host{i}.example.com")))
                        .unwrap()
                        .serial_hex
                })
            })
            .collect();

        let serials: std::collections::HashSet<String> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(serials.len(), 8);
    }
}
