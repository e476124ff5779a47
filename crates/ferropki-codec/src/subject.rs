use rcgen::{DistinguishedName, DnType};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// Certificate subject distinguished name.
///
/// The common name is mandatory, everything else optional. `email` is
/// carried for bookkeeping only; it is not embedded in the X.509 DN
/// (identities beyond the DN go into SAN entries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectName {
    /// Common name (CN)
    pub common_name: String,
    /// Country (C)
    pub country: Option<String>,
    /// State or province (ST)
    pub state: Option<String>,
    /// Locality (L)
    pub locality: Option<String>,
    /// Organization (O)
    pub organization: Option<String>,
    /// Organizational unit (OU)
    pub organizational_unit: Option<String>,
    /// Contact email, informational only
    pub email: Option<String>,
}

impl SubjectName {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            country: None,
            state: None,
            locality: None,
            organization: None,
            organizational_unit: None,
            email: None,
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Render as an OpenSSL-style DN string, e.g. `CN=Root,O=Acme,C=US`.
    pub fn to_dn_string(&self) -> String {
        let mut parts = vec![format!("CN={}", self.common_name)];
        if let Some(o) = &self.organization {
            parts.push(format!("O={o}"));
        }
        if let Some(ou) = &self.organizational_unit {
            parts.push(format!("OU={ou}"));
        }
        if let Some(c) = &self.country {
            parts.push(format!("C={c}"));
        }
        if let Some(st) = &self.state {
            parts.push(format!("ST={st}"));
        }
        if let Some(l) = &self.locality {
            parts.push(format!("L={l}"));
        }
        parts.join(",")
    }

    /// Parse an OpenSSL-style DN string. Unknown attribute types are
    /// rejected rather than dropped.
    pub fn parse_dn(dn: &str) -> Result<Self> {
        let mut subject = Self::new("");
        for part in dn.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| CodecError::Parse(format!("malformed DN component: {part:?}")))?;
            let value = value.trim().to_string();
            match key.trim() {
                "CN" => subject.common_name = value,
                "O" => subject.organization = Some(value),
                "OU" => subject.organizational_unit = Some(value),
                "C" => subject.country = Some(value),
                "ST" => subject.state = Some(value),
                "L" => subject.locality = Some(value),
                other => {
                    return Err(CodecError::Parse(format!(
                        "unsupported DN attribute: {other}"
                    )))
                }
            }
        }
        if subject.common_name.is_empty() {
            return Err(CodecError::Parse("DN is missing a CN attribute".into()));
        }
        Ok(subject)
    }

    pub(crate) fn to_distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        if let Some(c) = &self.country {
            dn.push(DnType::CountryName, c);
        }
        if let Some(st) = &self.state {
            dn.push(DnType::StateOrProvinceName, st);
        }
        if let Some(l) = &self.locality {
            dn.push(DnType::LocalityName, l);
        }
        if let Some(o) = &self.organization {
            dn.push(DnType::OrganizationName, o);
        }
        if let Some(ou) = &self.organizational_unit {
            dn.push(DnType::OrganizationalUnitName, ou);
        }
        dn.push(DnType::CommonName, &self.common_name);
        dn
    }
}
