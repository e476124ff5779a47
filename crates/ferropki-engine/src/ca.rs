//! Certificate authority lifecycle.

use std::sync::Arc;

use ferropki_codec::{
    build_self_signed_certificate, build_signed_certificate, KeyMaterial, KeySpec,
    RevocationReason, SubjectName, UsageClass,
};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    error::{Error, Result},
    model::{window_end, CaDescriptor, CaRecord, CaState, RevocationRecord},
    serial,
    store::Store,
};

/// Upper bound on chain length. The walk that enforces it also guards
/// against corrupted stores with a parent cycle.
pub(crate) const MAX_CHAIN_DEPTH: usize = 32;

/// Creates, inspects and retires certificate authorities.
pub struct CaManager {
    store: Arc<dyn Store>,
    config: EngineConfig,
}

impl CaManager {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Create a self-signed root CA. Omitted parameters fall back to the
    /// configured defaults.
    pub fn create_root_ca(
        &self,
        subject: SubjectName,
        key_spec: Option<KeySpec>,
        validity_days: Option<u32>,
    ) -> Result<CaDescriptor> {
        let spec = key_spec.unwrap_or(KeySpec::rsa(self.config.default_ca_key_bits));
        let days = validity_days.unwrap_or(self.config.default_ca_validity_days);
        if days == 0 {
            return Err(Error::Config("CA validity must be at least one day".into()));
        }

        let id = Uuid::new_v4();
        // A root's serial lives in its own space; it is self-issued.
        let serial = serial::allocate(self.store.as_ref(), id)?;

        let record = self
            .build_ca(id, None, subject, spec, days, serial, None)
            .inspect_err(|_| self.release(id, serial))?;
        self.store.insert_ca(record.clone())?;

        info!(ca_id = %id, cn = %record.subject.common_name, "created root CA");
        Ok(CaDescriptor::from(&record))
    }

    /// Create an intermediate CA signed by `parent_id`.
    ///
    /// The parent must be active and unexpired, and the child's `not_after`
    /// may not extend past the parent's.
    pub fn create_intermediate_ca(
        &self,
        parent_id: Uuid,
        subject: SubjectName,
        key_spec: Option<KeySpec>,
        validity_days: Option<u32>,
    ) -> Result<CaDescriptor> {
        let parent = self.store.ca(parent_id)?;
        if parent.state != CaState::Active {
            return Err(Error::CANotActive(parent_id));
        }
        if parent.is_expired() {
            return Err(Error::CAExpired(parent_id));
        }
        if self.chain_depth(parent_id)? >= MAX_CHAIN_DEPTH {
            return Err(Error::InvalidCAHierarchy(format!(
                "chain depth limit of {MAX_CHAIN_DEPTH} reached"
            )));
        }

        let spec = key_spec.unwrap_or(KeySpec::rsa(self.config.default_ca_key_bits));
        let days = validity_days.unwrap_or(self.config.default_ca_validity_days);
        if days == 0 {
            return Err(Error::Config("CA validity must be at least one day".into()));
        }
        let not_after = window_end(OffsetDateTime::now_utc(), days)?;
        if not_after > parent.not_after {
            return Err(Error::InvalidCAHierarchy(format!(
                "child validity ends {not_after} but parent expires {}",
                parent.not_after
            )));
        }

        let id = Uuid::new_v4();
        // Intermediates are issued out of the parent's serial space.
        let serial = serial::allocate(self.store.as_ref(), parent_id)?;

        let record = self
            .build_ca(id, Some(&parent), subject, spec, days, serial, Some(parent_id))
            .inspect_err(|_| self.release(parent_id, serial))?;
        self.store.insert_ca(record.clone())?;

        info!(ca_id = %id, parent_id = %parent_id, cn = %record.subject.common_name,
            "created intermediate CA");
        Ok(CaDescriptor::from(&record))
    }

    /// Mark a CA revoked. Intermediates also get a revocation entry under
    /// their parent so the parent's next CRL carries them; roots are a bare
    /// state mark. Already-issued certificates are untouched.
    ///
    /// Idempotent: revoking a revoked CA keeps the original entry.
    pub fn revoke_ca(&self, id: Uuid, reason: RevocationReason) -> Result<()> {
        let ca = self.store.ca(id)?;
        if ca.state == CaState::Revoked {
            return Ok(());
        }
        self.store.set_ca_state(id, CaState::Revoked)?;
        if let Some(parent_id) = ca.parent_id {
            self.store.insert_revocation(RevocationRecord {
                ca_id: parent_id,
                serial: ca.serial,
                reason,
                revoked_at: OffsetDateTime::now_utc(),
            })?;
        }
        warn!(ca_id = %id, ?reason, "revoked CA");
        Ok(())
    }

    /// Destroy a CA's signing key. Irreversible; afterwards the CA can no
    /// longer sign CRLs. Intended for revoked CAs once their trailing CRLs
    /// have been published.
    pub fn purge_ca_key(&self, id: Uuid) -> Result<()> {
        self.store.ca(id)?;
        self.store.purge_ca_key(id)?;
        warn!(ca_id = %id, "purged CA signing key");
        Ok(())
    }

    pub fn ca(&self, id: Uuid) -> Result<CaDescriptor> {
        Ok(CaDescriptor::from(&self.store.ca(id)?))
    }

    pub fn list_cas(&self) -> Result<Vec<CaDescriptor>> {
        Ok(self.store.cas()?.iter().map(CaDescriptor::from).collect())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_ca(
        &self,
        id: Uuid,
        parent: Option<&CaRecord>,
        subject: SubjectName,
        spec: KeySpec,
        days: u32,
        serial: u64,
        parent_id: Option<Uuid>,
    ) -> Result<CaRecord> {
        let key = KeyMaterial::generate(spec)?;
        let now = OffsetDateTime::now_utc();
        let not_after = window_end(now, days)?;

        let certificate_pem = match parent {
            None => build_self_signed_certificate(
                &key,
                &subject,
                serial,
                now,
                not_after,
                self.config.max_path_length,
            )?,
            Some(parent) => {
                let parent_key_pem = parent
                    .private_key_pem
                    .as_deref()
                    .ok_or(Error::PrivateKeyUnavailable(parent.id))?;
                let parent_key = KeyMaterial::from_private_key_pem(parent_key_pem, parent.key_spec)?;
                build_signed_certificate(
                    &key,
                    &subject,
                    &[],
                    UsageClass::Ca,
                    serial,
                    now,
                    not_after,
                    &parent.subject,
                    &parent_key,
                    self.config.max_path_length,
                )?
            }
        };

        Ok(CaRecord {
            id,
            subject,
            key_spec: spec,
            parent_id,
            serial,
            certificate_pem,
            private_key_pem: Some(key.private_key_pem().to_string()),
            not_before: now,
            not_after,
            state: CaState::Active,
            created_at: now,
        })
    }

    /// Number of ancestors above `ca_id`, inclusive of itself.
    fn chain_depth(&self, ca_id: Uuid) -> Result<usize> {
        let mut depth = 1;
        let mut current = self.store.ca(ca_id)?;
        while let Some(parent_id) = current.parent_id {
            depth += 1;
            if depth > MAX_CHAIN_DEPTH {
                return Err(Error::InvalidCAHierarchy(
                    "parent walk exceeded the chain depth limit".into(),
                ));
            }
            current = self.store.ca(parent_id)?;
        }
        Ok(depth)
    }

    fn release(&self, ca_id: Uuid, serial: u64) {
        if let Err(err) = self.store.release_serial(ca_id, serial) {
            warn!(ca_id = %ca_id, serial = format_args!("{serial:x}"), %err,
                "failed to release serial reservation");
        }
    }
}
