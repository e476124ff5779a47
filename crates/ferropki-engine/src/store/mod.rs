//! Persistence seam.
//!
//! The engine talks to a [`Store`] trait object; [`MemoryStore`] is the
//! reference backend. A durable backend only has to uphold the same
//! contracts: serial reservation is atomic per CA, revocation insertion
//! keeps the first entry for a serial, and private keys are handed out at
//! most once.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, RwLock},
};

use uuid::Uuid;

use crate::{
    error::{Error, Result},
    model::{CaRecord, CaState, CertState, CertificateRecord, RevocationRecord},
};

pub trait Store: Send + Sync {
    fn insert_ca(&self, record: CaRecord) -> Result<()>;
    fn ca(&self, id: Uuid) -> Result<CaRecord>;
    fn cas(&self) -> Result<Vec<CaRecord>>;
    fn set_ca_state(&self, id: Uuid, state: CaState) -> Result<()>;
    /// Drop the CA's private key. Irreversible.
    fn purge_ca_key(&self, id: Uuid) -> Result<()>;

    /// Reserve `serial` in the CA's serial space. Returns `false` when the
    /// serial is already taken. Must be atomic with respect to concurrent
    /// reservations against the same CA.
    fn try_reserve_serial(&self, ca_id: Uuid, serial: u64) -> Result<bool>;
    /// Give back a reservation whose certificate was never persisted.
    fn release_serial(&self, ca_id: Uuid, serial: u64) -> Result<()>;

    /// Persist a certificate and, when present, its server-generated
    /// private key for later single-use retrieval.
    fn insert_certificate(
        &self,
        record: CertificateRecord,
        private_key_pem: Option<String>,
    ) -> Result<()>;
    fn certificate(&self, id: Uuid) -> Result<CertificateRecord>;
    fn certificate_by_serial(&self, ca_id: Uuid, serial: u64) -> Result<CertificateRecord>;
    fn certificates_for_ca(&self, ca_id: Uuid) -> Result<Vec<CertificateRecord>>;
    fn set_certificate_state(&self, id: Uuid, state: CertState) -> Result<()>;
    /// Remove and return the stored private key. Subsequent calls return
    /// `None`.
    fn take_certificate_key(&self, id: Uuid) -> Result<Option<String>>;
    /// Put back a key taken by `take_certificate_key` whose export never
    /// completed.
    fn restore_certificate_key(&self, id: Uuid, private_key_pem: String) -> Result<()>;

    /// Commit a revocation. When an entry for the serial already exists the
    /// existing entry is returned unchanged; the first reason and timestamp
    /// win.
    fn insert_revocation(&self, entry: RevocationRecord) -> Result<RevocationRecord>;
    fn revocations_for_ca(&self, ca_id: Uuid) -> Result<Vec<RevocationRecord>>;
    /// Monotonically increasing CRL number for the CA, starting at 1.
    fn next_crl_number(&self, ca_id: Uuid) -> Result<u64>;
}

/// In-memory reference backend.
///
/// Serial sets live behind one mutex per CA inside an outer map, so
/// issuance against different CAs never contends on the same lock.
#[derive(Default)]
pub struct MemoryStore {
    cas: RwLock<HashMap<Uuid, CaRecord>>,
    certificates: RwLock<HashMap<Uuid, CertificateRecord>>,
    certificate_keys: Mutex<HashMap<Uuid, String>>,
    serials: RwLock<HashMap<Uuid, Arc<Mutex<HashSet<u64>>>>>,
    revocations: RwLock<HashMap<Uuid, Vec<RevocationRecord>>>,
    crl_numbers: Mutex<HashMap<Uuid, u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn serial_set(&self, ca_id: Uuid) -> Arc<Mutex<HashSet<u64>>> {
        if let Some(set) = self.serials.read().unwrap().get(&ca_id) {
            return Arc::clone(set);
        }
        let mut map = self.serials.write().unwrap();
        Arc::clone(map.entry(ca_id).or_default())
    }
}

impl Store for MemoryStore {
    fn insert_ca(&self, record: CaRecord) -> Result<()> {
        self.cas.write().unwrap().insert(record.id, record);
        Ok(())
    }

    fn ca(&self, id: Uuid) -> Result<CaRecord> {
        self.cas
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::CANotFound(id))
    }

    fn cas(&self) -> Result<Vec<CaRecord>> {
        let mut records: Vec<_> = self.cas.read().unwrap().values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn set_ca_state(&self, id: Uuid, state: CaState) -> Result<()> {
        let mut map = self.cas.write().unwrap();
        let record = map.get_mut(&id).ok_or(Error::CANotFound(id))?;
        record.state = state;
        Ok(())
    }

    fn purge_ca_key(&self, id: Uuid) -> Result<()> {
        let mut map = self.cas.write().unwrap();
        let record = map.get_mut(&id).ok_or(Error::CANotFound(id))?;
        record.private_key_pem = None;
        Ok(())
    }

    fn try_reserve_serial(&self, ca_id: Uuid, serial: u64) -> Result<bool> {
        let set = self.serial_set(ca_id);
        let mut set = set.lock().unwrap();
        Ok(set.insert(serial))
    }

    fn release_serial(&self, ca_id: Uuid, serial: u64) -> Result<()> {
        let set = self.serial_set(ca_id);
        set.lock().unwrap().remove(&serial);
        Ok(())
    }

    fn insert_certificate(
        &self,
        record: CertificateRecord,
        private_key_pem: Option<String>,
    ) -> Result<()> {
        if let Some(pem) = private_key_pem {
            self.certificate_keys.lock().unwrap().insert(record.id, pem);
        }
        self.certificates
            .write()
            .unwrap()
            .insert(record.id, record);
        Ok(())
    }

    fn certificate(&self, id: Uuid) -> Result<CertificateRecord> {
        self.certificates
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::CertificateNotFound(id.to_string()))
    }

    fn certificate_by_serial(&self, ca_id: Uuid, serial: u64) -> Result<CertificateRecord> {
        self.certificates
            .read()
            .unwrap()
            .values()
            .find(|r| r.ca_id == ca_id && r.serial == serial)
            .cloned()
            .ok_or_else(|| Error::CertificateNotFound(format!("{serial:x}")))
    }

    fn certificates_for_ca(&self, ca_id: Uuid) -> Result<Vec<CertificateRecord>> {
        let mut records: Vec<_> = self
            .certificates
            .read()
            .unwrap()
            .values()
            .filter(|r| r.ca_id == ca_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn set_certificate_state(&self, id: Uuid, state: CertState) -> Result<()> {
        let mut map = self.certificates.write().unwrap();
        let record = map
            .get_mut(&id)
            .ok_or_else(|| Error::CertificateNotFound(id.to_string()))?;
        record.state = state;
        Ok(())
    }

    fn take_certificate_key(&self, id: Uuid) -> Result<Option<String>> {
        Ok(self.certificate_keys.lock().unwrap().remove(&id))
    }

    fn restore_certificate_key(&self, id: Uuid, private_key_pem: String) -> Result<()> {
        self.certificate_keys
            .lock()
            .unwrap()
            .insert(id, private_key_pem);
        Ok(())
    }

    fn insert_revocation(&self, entry: RevocationRecord) -> Result<RevocationRecord> {
        let mut map = self.revocations.write().unwrap();
        let entries = map.entry(entry.ca_id).or_default();
        if let Some(existing) = entries.iter().find(|e| e.serial == entry.serial) {
            return Ok(existing.clone());
        }
        entries.push(entry.clone());
        Ok(entry)
    }

    fn revocations_for_ca(&self, ca_id: Uuid) -> Result<Vec<RevocationRecord>> {
        Ok(self
            .revocations
            .read()
            .unwrap()
            .get(&ca_id)
            .cloned()
            .unwrap_or_default())
    }

    fn next_crl_number(&self, ca_id: Uuid) -> Result<u64> {
        let mut map = self.crl_numbers.lock().unwrap();
        let counter = map.entry(ca_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
