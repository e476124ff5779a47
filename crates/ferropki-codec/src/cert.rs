//! X.509 certificate construction and decoding.
//!
//! Construction goes through rcgen; decoding through x509-parser. The
//! extension sets embedded per usage class are a closed table — callers
//! only ever contribute SAN entries on top of it.

use std::net::IpAddr;

use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams,
    ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyUsagePurpose, SanType, SerialNumber,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use x509_parser::{
    certificate::X509Certificate, extensions::GeneralName, prelude::FromDer, x509::X509Name,
};

use crate::{
    error::{CodecError, Result},
    key::KeyMaterial,
    subject::SubjectName,
};

/// Wire encodings for certificates and CRLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodingFormat {
    Pem,
    Der,
}

/// What an issued certificate is for. Each class maps to a fixed
/// basicConstraints / keyUsage / extendedKeyUsage set:
///
/// | class  | basicConstraints   | keyUsage                          | extendedKeyUsage |
/// |--------|--------------------|-----------------------------------|------------------|
/// | Server | CA=false           | digitalSignature, keyEncipherment | serverAuth       |
/// | Client | CA=false           | digitalSignature                  | clientAuth       |
/// | Ca     | CA=true, pathLen   | keyCertSign, cRLSign              | —                |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageClass {
    Server,
    Client,
    Ca,
}

/// Subject alternative name entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanEntry {
    Dns(String),
    Ip(IpAddr),
    Email(String),
}

/// Structural view of a decoded certificate. Two encodings of the same
/// certificate decode to equal `CertificateInfo` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Serial number, lowercase hex without leading zeros
    pub serial_hex: String,
    pub subject: SubjectName,
    pub issuer_common_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    pub is_ca: bool,
    pub path_len: Option<u32>,
    pub key_usage: Vec<String>,
    pub extended_key_usage: Vec<String>,
    pub san: Vec<SanEntry>,
    /// SHA-256 over the DER encoding, colon-separated uppercase hex
    pub fingerprint_sha256: String,
}

impl CertificateInfo {
    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        at >= self.not_before && at <= self.not_after
    }

    pub fn is_currently_valid(&self) -> bool {
        self.is_valid_at(OffsetDateTime::now_utc())
    }
}

/// Build a self-signed CA certificate.
///
/// Returns the certificate PEM. `path_len` of `None` leaves basicConstraints
/// unconstrained.
pub fn build_self_signed_certificate(
    key: &KeyMaterial,
    subject: &SubjectName,
    serial: u64,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    path_len: Option<u8>,
) -> Result<String> {
    let mut params = CertificateParams::default();
    params.distinguished_name = subject.to_distinguished_name();
    params.serial_number = Some(serial_number(serial));
    params.not_before = not_before;
    params.not_after = not_after;
    apply_usage_class(&mut params, UsageClass::Ca, path_len);

    let cert = params
        .self_signed(key.key_pair())
        .map_err(|e| CodecError::Build(format!("self-signed certificate build failed: {e}")))?;
    Ok(cert.pem())
}

/// Build a certificate for `subject_key` signed by the issuer.
///
/// Used both for end-entity certificates (`Server`/`Client`) and for
/// intermediate CA certificates (`Ca`, with `path_len` applied to the
/// child's basicConstraints).
#[allow(clippy::too_many_arguments)]
pub fn build_signed_certificate(
    subject_key: &KeyMaterial,
    subject: &SubjectName,
    san: &[SanEntry],
    usage: UsageClass,
    serial: u64,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    issuer_subject: &SubjectName,
    issuer_key: &KeyMaterial,
    path_len: Option<u8>,
) -> Result<String> {
    let issuer = issuer_certificate(issuer_subject, issuer_key)?;

    let mut params = CertificateParams::default();
    params.distinguished_name = subject.to_distinguished_name();
    params.serial_number = Some(serial_number(serial));
    params.not_before = not_before;
    params.not_after = not_after;
    params.subject_alt_names = san_types(san)?;
    apply_usage_class(&mut params, usage, path_len);

    let cert = params
        .signed_by(subject_key.key_pair(), &issuer, issuer_key.key_pair())
        .map_err(|e| CodecError::Signing(format!("certificate signing failed: {e}")))?;
    Ok(cert.pem())
}

/// Sign a caller-supplied CSR.
///
/// Only the public key is taken from the request. Subject, SANs, validity,
/// serial and the usage-class extension set are all imposed by the issuer,
/// so a CSR cannot smuggle extensions past the fixed table.
#[allow(clippy::too_many_arguments)]
pub fn sign_csr_certificate(
    csr_pem: &str,
    subject: &SubjectName,
    san: &[SanEntry],
    usage: UsageClass,
    serial: u64,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    issuer_subject: &SubjectName,
    issuer_key: &KeyMaterial,
) -> Result<String> {
    let issuer = issuer_certificate(issuer_subject, issuer_key)?;

    let mut csr = CertificateSigningRequestParams::from_pem(csr_pem)
        .map_err(|e| CodecError::Parse(format!("CSR parse failed: {e}")))?;
    csr.params.distinguished_name = subject.to_distinguished_name();
    csr.params.serial_number = Some(serial_number(serial));
    csr.params.not_before = not_before;
    csr.params.not_after = not_after;
    csr.params.subject_alt_names = san_types(san)?;
    apply_usage_class(&mut csr.params, usage, None);

    let cert = csr
        .signed_by(&issuer, issuer_key.key_pair())
        .map_err(|e| CodecError::Signing(format!("CSR signing failed: {e}")))?;
    Ok(cert.pem())
}

/// Re-encode a PEM certificate into the requested wire format.
pub fn encode(certificate_pem: &str, format: EncodingFormat) -> Result<Vec<u8>> {
    match format {
        EncodingFormat::Pem => Ok(certificate_pem.as_bytes().to_vec()),
        EncodingFormat::Der => pem_to_der(certificate_pem),
    }
}

/// Decode certificate bytes into their structural description.
pub fn decode(bytes: &[u8], format: EncodingFormat) -> Result<CertificateInfo> {
    let der = match format {
        EncodingFormat::Der => bytes.to_vec(),
        EncodingFormat::Pem => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| CodecError::Parse("certificate PEM is not valid UTF-8".into()))?;
            pem_to_der(text)?
        }
    };

    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| CodecError::Parse(format!("DER parse failed: {e:?}")))?;

    let serial_hex = cert.tbs_certificate.serial.to_str_radix(16);
    let subject = subject_from_name(cert.subject());
    let issuer_common_name = common_name(cert.issuer());

    let not_before = cert.validity().not_before.to_datetime();
    let not_after = cert.validity().not_after.to_datetime();

    let (is_ca, path_len) = match cert.basic_constraints() {
        Ok(Some(bc)) => (bc.value.ca, bc.value.path_len_constraint),
        _ => (false, None),
    };

    let mut key_usage = Vec::new();
    if let Ok(Some(ku)) = cert.key_usage() {
        if ku.value.digital_signature() {
            key_usage.push("DigitalSignature".to_string());
        }
        if ku.value.key_encipherment() {
            key_usage.push("KeyEncipherment".to_string());
        }
        if ku.value.key_cert_sign() {
            key_usage.push("KeyCertSign".to_string());
        }
        if ku.value.crl_sign() {
            key_usage.push("CrlSign".to_string());
        }
    }

    let mut extended_key_usage = Vec::new();
    if let Ok(Some(eku)) = cert.extended_key_usage() {
        if eku.value.server_auth {
            extended_key_usage.push("ServerAuth".to_string());
        }
        if eku.value.client_auth {
            extended_key_usage.push("ClientAuth".to_string());
        }
    }

    let mut san = Vec::new();
    if let Ok(Some(ext)) = cert.subject_alternative_name() {
        for name in &ext.value.general_names {
            match name {
                GeneralName::DNSName(dns) => san.push(SanEntry::Dns((*dns).to_string())),
                GeneralName::RFC822Name(email) => san.push(SanEntry::Email((*email).to_string())),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        san.push(SanEntry::Ip(ip));
                    }
                }
                _ => {}
            }
        }
    }

    Ok(CertificateInfo {
        serial_hex,
        subject,
        issuer_common_name,
        not_before,
        not_after,
        is_ca,
        path_len,
        key_usage,
        extended_key_usage,
        san,
        fingerprint_sha256: fingerprint(&der),
    })
}

/// SHA-256 fingerprint over DER bytes, `AB:CD:...` form.
pub fn fingerprint(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    digest
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

pub(crate) fn pem_to_der(pem_str: &str) -> Result<Vec<u8>> {
    let parsed =
        pem::parse(pem_str).map_err(|e| CodecError::Parse(format!("PEM parse failed: {e}")))?;
    Ok(parsed.contents().to_vec())
}

/// Recreate an rcgen issuer certificate from a CA's stored subject and key.
///
/// rcgen's `signed_by` needs a `Certificate` for the issuer; only the DN and
/// key material flow into the signature, so rebuilding from the stored
/// subject is equivalent to reparsing the CA's own certificate.
pub(crate) fn issuer_certificate(
    subject: &SubjectName,
    key: &KeyMaterial,
) -> Result<rcgen::Certificate> {
    let mut params = CertificateParams::default();
    params.distinguished_name = subject.to_distinguished_name();
    apply_usage_class(&mut params, UsageClass::Ca, None);
    params
        .self_signed(key.key_pair())
        .map_err(|e| CodecError::Signing(format!("issuer reconstruction failed: {e}")))
}

fn apply_usage_class(params: &mut CertificateParams, usage: UsageClass, path_len: Option<u8>) {
    match usage {
        UsageClass::Server => {
            params.is_ca = IsCa::NoCa;
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        }
        UsageClass::Client => {
            params.is_ca = IsCa::NoCa;
            params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        }
        UsageClass::Ca => {
            params.is_ca = match path_len {
                Some(n) => IsCa::Ca(BasicConstraints::Constrained(n)),
                None => IsCa::Ca(BasicConstraints::Unconstrained),
            };
            params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
            params.extended_key_usages = Vec::new();
        }
    }
}

pub(crate) fn serial_number(serial: u64) -> SerialNumber {
    let bytes = serial.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(7);
    SerialNumber::from_slice(&bytes[start..])
}

fn san_types(entries: &[SanEntry]) -> Result<Vec<SanType>> {
    entries
        .iter()
        .map(|entry| match entry {
            SanEntry::Dns(name) => Ok(SanType::DnsName(ia5(name)?)),
            SanEntry::Email(addr) => Ok(SanType::Rfc822Name(ia5(addr)?)),
            SanEntry::Ip(addr) => Ok(SanType::IpAddress(*addr)),
        })
        .collect()
}

fn ia5(s: &str) -> Result<Ia5String> {
    Ia5String::try_from(s).map_err(|e| CodecError::Parse(format!("invalid IA5 string {s:?}: {e}")))
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}

fn subject_from_name(name: &X509Name<'_>) -> SubjectName {
    let mut subject = SubjectName::new("");
    for rdn in name.iter() {
        for attr in rdn.iter() {
            let value = attr.as_str().unwrap_or("").to_string();
            match attr.attr_type().to_string().as_str() {
                "2.5.4.3" => subject.common_name = value,
                "2.5.4.6" => subject.country = Some(value),
                "2.5.4.7" => subject.locality = Some(value),
                "2.5.4.8" => subject.state = Some(value),
                "2.5.4.10" => subject.organization = Some(value),
                "2.5.4.11" => subject.organizational_unit = Some(value),
                _ => {}
            }
        }
    }
    subject
}

fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or_default()
        .to_string()
}
