//! Asymmetric key material.
//!
//! RSA keys are generated with the `rsa` crate and handed to `rcgen` as
//! PKCS#8 for signing (rcgen can sign with RSA keys but not generate them);
//! ECDSA P-256 keys are generated by rcgen directly.

use pkcs8::{EncodePrivateKey, LineEnding};
use rcgen::{KeyPair, PKCS_ECDSA_P256_SHA256, PKCS_RSA_SHA256};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// Accepted RSA moduli. The upper bound keeps key generation from running
/// pathologically long inside a request.
const RSA_BITS: [u32; 3] = [2048, 3072, 4096];

/// Supported key algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    Rsa,
    EcdsaP256,
}

/// Algorithm plus strength, as stored alongside CA and certificate records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub algorithm: KeyAlgorithm,
    pub bits: u32,
}

impl KeySpec {
    pub fn rsa(bits: u32) -> Self {
        Self {
            algorithm: KeyAlgorithm::Rsa,
            bits,
        }
    }

    pub fn ecdsa_p256() -> Self {
        Self {
            algorithm: KeyAlgorithm::EcdsaP256,
            bits: 256,
        }
    }

    /// Check the spec against the accepted strengths for its algorithm.
    pub fn validate(&self) -> Result<()> {
        match self.algorithm {
            KeyAlgorithm::Rsa => {
                if !RSA_BITS.contains(&self.bits) {
                    return Err(CodecError::UnsupportedKeyParameters(format!(
                        "RSA key size must be one of {RSA_BITS:?}, got {}",
                        self.bits
                    )));
                }
            }
            KeyAlgorithm::EcdsaP256 => {
                if self.bits != 256 {
                    return Err(CodecError::UnsupportedKeyParameters(format!(
                        "ECDSA P-256 key size must be 256, got {}",
                        self.bits
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A generated or reloaded key pair, usable for signing via rcgen.
pub struct KeyMaterial {
    spec: KeySpec,
    key_pair: KeyPair,
    private_key_pem: String,
}

impl KeyMaterial {
    /// Generate a fresh key pair for the given spec.
    pub fn generate(spec: KeySpec) -> Result<Self> {
        spec.validate()?;

        match spec.algorithm {
            KeyAlgorithm::Rsa => {
                let mut rng = rand::thread_rng();
                let private_key = RsaPrivateKey::new(&mut rng, spec.bits as usize)
                    .map_err(|e| CodecError::Build(format!("RSA key generation failed: {e}")))?;
                let pem = private_key
                    .to_pkcs8_pem(LineEnding::LF)
                    .map_err(|e| CodecError::Build(format!("PKCS#8 encoding failed: {e}")))?;
                Self::from_private_key_pem(&pem, spec)
            }
            KeyAlgorithm::EcdsaP256 => {
                let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
                    .map_err(|e| CodecError::Build(format!("ECDSA key generation failed: {e}")))?;
                let private_key_pem = key_pair.serialize_pem();
                Ok(Self {
                    spec,
                    key_pair,
                    private_key_pem,
                })
            }
        }
    }

    /// Reload a key pair from its stored PKCS#8 PEM.
    pub fn from_private_key_pem(pem: &str, spec: KeySpec) -> Result<Self> {
        let alg = match spec.algorithm {
            KeyAlgorithm::Rsa => &PKCS_RSA_SHA256,
            KeyAlgorithm::EcdsaP256 => &PKCS_ECDSA_P256_SHA256,
        };
        let key_pair = KeyPair::from_pkcs8_pem_and_sign_algo(pem, alg)
            .map_err(|e| CodecError::Parse(format!("failed to load private key: {e}")))?;

        Ok(Self {
            spec,
            key_pair,
            private_key_pem: pem.to_string(),
        })
    }

    pub fn spec(&self) -> KeySpec {
        self.spec
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Private key, PKCS#8 PEM. Callers own the sensitivity of this value.
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    /// Public key, SPKI PEM.
    pub fn public_key_pem(&self) -> String {
        self.key_pair.public_key_pem()
    }
}

impl std::fmt::Debug for KeyMaterial {
    // Key material never appears in logs or error output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_weak_rsa() {
        let err = KeyMaterial::generate(KeySpec::rsa(1024)).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedKeyParameters(_)));
    }

    #[test]
    fn rejects_oversized_rsa() {
        let err = KeySpec::rsa(8192).validate().unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedKeyParameters(_)));
    }

    #[test]
    fn generates_and_reloads_p256() {
        let key = KeyMaterial::generate(KeySpec::ecdsa_p256()).unwrap();
        assert!(key.private_key_pem().contains("BEGIN PRIVATE KEY"));
        assert!(key.public_key_pem().contains("BEGIN PUBLIC KEY"));

        let reloaded =
            KeyMaterial::from_private_key_pem(key.private_key_pem(), key.spec()).unwrap();
        assert_eq!(reloaded.public_key_pem(), key.public_key_pem());
    }

    #[test]
    fn generates_and_reloads_rsa_2048() {
        let key = KeyMaterial::generate(KeySpec::rsa(2048)).unwrap();
        let reloaded =
            KeyMaterial::from_private_key_pem(key.private_key_pem(), key.spec()).unwrap();
        assert_eq!(reloaded.public_key_pem(), key.public_key_pem());
    }

    #[test]
    fn debug_omits_key_bytes() {
        let key = KeyMaterial::generate(KeySpec::ecdsa_p256()).unwrap();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
