//! PKCS#12 container packaging.

use crate::{
    cert::pem_to_der,
    error::{CodecError, Result},
};

/// Bundle a certificate, its private key and optionally the issuing chain
/// into a password-protected PKCS#12 container.
///
/// All inputs are PEM; `ca_chain_pem` is a concatenation of one PEM block
/// per issuer certificate, issuer-side first up to the root. Every chain
/// certificate lands in the container as its own bag. Returns DER bytes of
/// the container.
pub fn package_pkcs12(
    certificate_pem: &str,
    private_key_pem: &str,
    ca_chain_pem: Option<&str>,
    password: &str,
    friendly_name: &str,
) -> Result<Vec<u8>> {
    let cert_der = pem_to_der(certificate_pem)?;
    let key_der = pem_to_der(private_key_pem)?;
    let ca_ders: Vec<Vec<u8>> = match ca_chain_pem {
        Some(chain) => pem::parse_many(chain)
            .map_err(|e| CodecError::Parse(format!("PEM parse failed: {e}")))?
            .into_iter()
            .map(pem::Pem::into_contents)
            .collect(),
        None => Vec::new(),
    };
    let ca_refs: Vec<&[u8]> = ca_ders.iter().map(Vec::as_slice).collect();

    let pfx = p12::PFX::new_with_cas(&cert_der, &key_der, &ca_refs, password, friendly_name)
        .ok_or_else(|| CodecError::Export("PKCS#12 packaging failed".into()))?;

    Ok(pfx.to_der())
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::{
        cert::build_self_signed_certificate,
        key::{KeyMaterial, KeySpec},
        subject::SubjectName,
    };

    #[test]
    fn packages_cert_and_key() {
        let key = KeyMaterial::generate(KeySpec::ecdsa_p256()).unwrap();
        let now = OffsetDateTime::now_utc();
        let cert_pem = build_self_signed_certificate(
            &key,
            &SubjectName::new("P12 Test"),
            1,
            now,
            now + Duration::days(1),
            None,
        )
        .unwrap();

        let der =
            package_pkcs12(&cert_pem, key.private_key_pem(), None, "secret", "p12-test").unwrap();
        assert!(!der.is_empty());
        // DER SEQUENCE tag
        assert_eq!(der[0], 0x30);
    }

    #[test]
    fn packages_every_chain_certificate() {
        let now = OffsetDateTime::now_utc();
        let leaf_key = KeyMaterial::generate(KeySpec::ecdsa_p256()).unwrap();
        let leaf_pem = build_self_signed_certificate(
            &leaf_key,
            &SubjectName::new("leaf"),
            1,
            now,
            now + Duration::days(1),
            None,
        )
        .unwrap();

        let mut chain = String::new();
        for cn in ["issuing", "root"] {
            let key = KeyMaterial::generate(KeySpec::ecdsa_p256()).unwrap();
            chain.push_str(
                &build_self_signed_certificate(
                    &key,
                    &SubjectName::new(cn),
                    2,
                    now,
                    now + Duration::days(1),
                    None,
                )
                .unwrap(),
            );
        }

        let der = package_pkcs12(
            &leaf_pem,
            leaf_key.private_key_pem(),
            Some(&chain),
            "secret",
            "chain-test",
        )
        .unwrap();

        let pfx = p12::PFX::parse(&der).unwrap();
        assert!(pfx.verify_mac("secret"));
        assert_eq!(pfx.cert_x509_bags("secret").unwrap().len(), 3);
    }

    #[test]
    fn rejects_malformed_pem() {
        let err = package_pkcs12("not pem", "also not pem", None, "pw", "x").unwrap_err();
        assert!(matches!(err, CodecError::Parse(_)));
    }
}
