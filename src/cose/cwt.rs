//! CWT Claims
//!
//! Integer-keyed claims map (RFC 8392) carried inside COSE protected
//! headers at label 15 (RFC 9597). Registration requires `iss` and `sub`.

use ciborium::value::Value;

use super::sign1::integer_label;
use super::{CoseError, CWT_AUD, CWT_EXP, CWT_IAT, CWT_ISS, CWT_NBF, CWT_SUB};

/// Standard CWT claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CwtClaims {
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub aud: Option<String>,
    pub exp: Option<i64>,
    pub nbf: Option<i64>,
    pub iat: Option<i64>,
}

impl CwtClaims {
    /// Claims with issuer and subject set.
    pub fn new(iss: impl Into<String>, sub: impl Into<String>) -> Self {
        Self {
            iss: Some(iss.into()),
            sub: Some(sub.into()),
            ..Self::default()
        }
    }

    /// Claims with only an issuer (receipts bind the log origin).
    pub fn issuer(iss: impl Into<String>) -> Self {
        Self {
            iss: Some(iss.into()),
            ..Self::default()
        }
    }

    /// Encode as the CBOR claims map.
    pub fn to_value(&self) -> Value {
        let mut entries = Vec::new();
        if let Some(iss) = &self.iss {
            entries.push((Value::from(CWT_ISS), Value::Text(iss.clone())));
        }
        if let Some(sub) = &self.sub {
            entries.push((Value::from(CWT_SUB), Value::Text(sub.clone())));
        }
        if let Some(aud) = &self.aud {
            entries.push((Value::from(CWT_AUD), Value::Text(aud.clone())));
        }
        if let Some(exp) = self.exp {
            entries.push((Value::from(CWT_EXP), Value::from(exp)));
        }
        if let Some(nbf) = self.nbf {
            entries.push((Value::from(CWT_NBF), Value::from(nbf)));
        }
        if let Some(iat) = self.iat {
            entries.push((Value::from(CWT_IAT), Value::from(iat)));
        }
        Value::Map(entries)
    }

    /// Decode from a CBOR claims map, tolerating either integer key shape.
    pub fn from_value(value: &Value) -> Result<Self, CoseError> {
        let entries = match value {
            Value::Map(entries) => entries,
            _ => {
                return Err(CoseError::InvalidStructure(
                    "CWT claims must be a map".to_string(),
                ))
            }
        };
        let mut claims = Self::default();
        for (key, val) in entries {
            let Some(label) = integer_label(key) else {
                continue;
            };
            match label {
                CWT_ISS => claims.iss = text_claim(val),
                CWT_SUB => claims.sub = text_claim(val),
                CWT_AUD => claims.aud = text_claim(val),
                CWT_EXP => claims.exp = integer_label(val),
                CWT_NBF => claims.nbf = integer_label(val),
                CWT_IAT => claims.iat = integer_label(val),
                _ => {}
            }
        }
        Ok(claims)
    }

    /// Whether issuer and subject are both present and non-empty.
    pub fn has_registration_claims(&self) -> bool {
        self.iss.as_deref().is_some_and(|s| !s.is_empty())
            && self.sub.as_deref().is_some_and(|s| !s.is_empty())
    }
}

fn text_claim(value: &Value) -> Option<String> {
    match value {
        Value::Text(t) => Some(t.clone()),
        _ => None,
    }
}
