//! Serial number allocation.

use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    store::Store,
};

/// Reservation attempts before giving up. With random 64-bit draws the
/// collision probability is negligible until a CA's space is nearly full,
/// so a small bound keeps the worst case short.
const MAX_ATTEMPTS: usize = 8;

/// Draw a random non-zero serial and reserve it in the CA's serial space.
///
/// The caller owns the reservation: release it if the certificate is never
/// persisted.
pub fn allocate(store: &dyn Store, ca_id: Uuid) -> Result<u64> {
    let mut rng = OsRng;
    for _ in 0..MAX_ATTEMPTS {
        let serial = rng.next_u64();
        if serial == 0 {
            continue;
        }
        if store.try_reserve_serial(ca_id, serial)? {
            return Ok(serial);
        }
    }
    Err(Error::SerialExhaustion)
}
