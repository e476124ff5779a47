//! Revocation bookkeeping and CRL generation.

use std::sync::Arc;

use ferropki_codec::{build_crl, CrlEntry, EncodingFormat, KeyMaterial, RevocationReason};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    error::{Error, Result},
    model::{window_end, CaState, CertState, RevocationRecord},
    store::Store,
};

/// Records revocations and signs CRLs for each CA.
pub struct RevocationRegistry {
    store: Arc<dyn Store>,
    config: EngineConfig,
}

impl RevocationRegistry {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Revoke the certificate with `serial` under `ca_id`.
    ///
    /// Idempotent: a second call returns the original entry and the first
    /// reason and timestamp stand.
    pub fn revoke_certificate(
        &self,
        ca_id: Uuid,
        serial: u64,
        reason: RevocationReason,
    ) -> Result<RevocationRecord> {
        let cert = self.store.certificate_by_serial(ca_id, serial)?;
        let entry = self.store.insert_revocation(RevocationRecord {
            ca_id,
            serial,
            reason,
            revoked_at: OffsetDateTime::now_utc(),
        })?;
        self.store
            .set_certificate_state(cert.id, CertState::Revoked)?;

        warn!(ca_id = %ca_id, serial = format_args!("{serial:x}"), reason = ?entry.reason,
            "revoked certificate");
        Ok(entry)
    }

    /// Sign a CRL carrying every revocation committed under `ca_id`.
    ///
    /// A revoked CA keeps signing CRLs as long as its key is retained; once
    /// the key has been purged this fails with `CARevoked`. The CRL is a
    /// snapshot, never stored.
    pub fn generate_crl(
        &self,
        ca_id: Uuid,
        next_update_days: Option<u32>,
        format: EncodingFormat,
    ) -> Result<Vec<u8>> {
        let ca = self.store.ca(ca_id)?;
        let key_pem = match ca.private_key_pem.as_deref() {
            Some(pem) => pem,
            None if ca.state == CaState::Revoked => return Err(Error::CARevoked(ca_id)),
            None => return Err(Error::PrivateKeyUnavailable(ca_id)),
        };
        let key = KeyMaterial::from_private_key_pem(key_pem, ca.key_spec)?;

        let entries: Vec<CrlEntry> = self
            .store
            .revocations_for_ca(ca_id)?
            .into_iter()
            .map(|r| CrlEntry {
                serial: r.serial,
                revoked_at: r.revoked_at,
                reason: r.reason,
            })
            .collect();

        let days = next_update_days.unwrap_or(self.config.crl_next_update_days);
        let this_update = OffsetDateTime::now_utc();
        let next_update = window_end(this_update, days)?;
        let crl_number = self.store.next_crl_number(ca_id)?;

        let bytes = build_crl(
            &ca.subject,
            &key,
            &entries,
            crl_number,
            this_update,
            next_update,
            format,
        )?;

        info!(ca_id = %ca_id, crl_number, entries = entries.len(), "generated CRL");
        Ok(bytes)
    }
}
