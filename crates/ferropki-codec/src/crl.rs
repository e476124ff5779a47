//! Certificate revocation list construction.

use rcgen::{
    CertificateRevocationListParams, KeyIdMethod, RevokedCertParams, SerialNumber,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    cert::{issuer_certificate, serial_number, EncodingFormat},
    error::{CodecError, Result},
    key::KeyMaterial,
    subject::SubjectName,
};

/// Reason carried in a CRL entry. Closed set; anything else a caller
/// might want collapses to `Unspecified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
}

impl RevocationReason {
    fn to_rcgen(self) -> rcgen::RevocationReason {
        match self {
            Self::Unspecified => rcgen::RevocationReason::Unspecified,
            Self::KeyCompromise => rcgen::RevocationReason::KeyCompromise,
            Self::CaCompromise => rcgen::RevocationReason::CaCompromise,
            Self::AffiliationChanged => rcgen::RevocationReason::AffiliationChanged,
            Self::Superseded => rcgen::RevocationReason::Superseded,
            Self::CessationOfOperation => rcgen::RevocationReason::CessationOfOperation,
        }
    }
}

/// One revoked certificate as it appears in a CRL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrlEntry {
    pub serial: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub revoked_at: OffsetDateTime,
    pub reason: RevocationReason,
}

/// Build a CRL signed by the issuing CA.
///
/// `crl_number` must increase monotonically across CRLs from the same CA;
/// the caller owns that counter. An empty `entries` slice produces a valid
/// empty CRL.
pub fn build_crl(
    issuer_subject: &SubjectName,
    issuer_key: &KeyMaterial,
    entries: &[CrlEntry],
    crl_number: u64,
    this_update: OffsetDateTime,
    next_update: OffsetDateTime,
    format: EncodingFormat,
) -> Result<Vec<u8>> {
    let issuer = issuer_certificate(issuer_subject, issuer_key)?;

    let revoked_certs = entries
        .iter()
        .map(|entry| RevokedCertParams {
            serial_number: serial_number(entry.serial),
            revocation_time: entry.revoked_at,
            reason_code: Some(entry.reason.to_rcgen()),
            invalidity_date: None,
        })
        .collect();

    let params = CertificateRevocationListParams {
        this_update,
        next_update,
        crl_number: SerialNumber::from_slice(&crl_number.to_be_bytes()),
        issuing_distribution_point: None,
        revoked_certs,
        key_identifier_method: KeyIdMethod::Sha256,
    };

    let crl = params
        .signed_by(&issuer, issuer_key.key_pair())
        .map_err(|e| CodecError::Build(format!("CRL build failed: {e}")))?;
    let der = crl.der().to_vec();

    match format {
        EncodingFormat::Der => Ok(der),
        EncodingFormat::Pem => {
            let block = pem::Pem::new("X509 CRL", der);
            Ok(pem::encode(&block).into_bytes())
        }
    }
}
