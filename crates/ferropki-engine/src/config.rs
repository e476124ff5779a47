//! Engine configuration.

use ferropki_codec::KeySpec;

use crate::error::{Error, Result};

/// Defaults applied when a caller omits key or validity parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// RSA modulus for CA keys when no spec is given
    pub default_ca_key_bits: u32,
    pub default_ca_validity_days: u32,
    /// RSA modulus for end-entity keys when no spec is given
    pub default_cert_key_bits: u32,
    pub default_cert_validity_days: u32,
    /// basicConstraints pathLenConstraint on CA certificates
    pub max_path_length: Option<u8>,
    pub crl_next_update_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ca_key_bits: 4096,
            default_ca_validity_days: 3650,
            default_cert_key_bits: 2048,
            default_cert_validity_days: 365,
            max_path_length: Some(1),
            crl_next_update_days: 7,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `FERROPKI_*` environment variables where set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(bits) = read_env("FERROPKI_CA_KEY_BITS")? {
            config.default_ca_key_bits = bits;
        }
        if let Some(days) = read_env("FERROPKI_CA_VALIDITY_DAYS")? {
            config.default_ca_validity_days = days;
        }
        if let Some(bits) = read_env("FERROPKI_CERT_KEY_BITS")? {
            config.default_cert_key_bits = bits;
        }
        if let Some(days) = read_env("FERROPKI_CERT_VALIDITY_DAYS")? {
            config.default_cert_validity_days = days;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_ca_validity_days(mut self, days: u32) -> Self {
        self.default_ca_validity_days = days;
        self
    }

    pub fn with_cert_validity_days(mut self, days: u32) -> Self {
        self.default_cert_validity_days = days;
        self
    }

    pub fn with_max_path_length(mut self, path_len: Option<u8>) -> Self {
        self.max_path_length = path_len;
        self
    }

    pub fn validate(&self) -> Result<()> {
        KeySpec::rsa(self.default_ca_key_bits).validate()?;
        KeySpec::rsa(self.default_cert_key_bits).validate()?;
        if self.default_ca_validity_days == 0 {
            return Err(Error::Config("CA validity must be at least one day".into()));
        }
        if self.default_cert_validity_days == 0 {
            return Err(Error::Config(
                "certificate validity must be at least one day".into(),
            ));
        }
        if self.crl_next_update_days == 0 {
            return Err(Error::Config(
                "CRL next-update window must be at least one day".into(),
            ));
        }
        Ok(())
    }
}

fn read_env(name: &str) -> Result<Option<u32>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} must be a positive integer, got {raw:?}"))),
        Err(_) => Ok(None),
    }
}
