//! COSE Sign1 Structure
//!
//! Wire form: an optionally tagged (18) CBOR array
//! `[protected bstr, unprotected map, payload bstr | nil, signature bstr]`.
//! The signing input is the `Sig_structure` array
//! `["Signature1", protected, external_aad, payload]`; detached payloads
//! are nil on the wire and supplied externally at sign/verify time.

use ciborium::value::Value;

use super::key::{Es256SigningKey, Es256VerifyingKey};
use super::{CoseError, HEADER_ALG, HEADER_KID, TAG_COSE_SIGN1};

/// Encode a CBOR value to bytes.
pub(crate) fn cbor_to_bytes(value: &Value) -> Result<Vec<u8>, CoseError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| CoseError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode exactly one CBOR item; trailing bytes are rejected.
pub(crate) fn cbor_from_bytes_strict(bytes: &[u8]) -> Result<Value, CoseError> {
    let mut remaining = bytes;
    let value: Value = ciborium::de::from_reader(&mut remaining)
        .map_err(|e| CoseError::Decode(e.to_string()))?;
    if !remaining.is_empty() {
        return Err(CoseError::Decode(format!(
            "{} trailing bytes after CBOR item",
            remaining.len()
        )));
    }
    Ok(value)
}

/// Integer value of a CBOR key or scalar, tolerating the signed/unsigned
/// shapes different encoders produce.
pub(crate) fn integer_label(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => i64::try_from(i128::from(*i)).ok(),
        _ => None,
    }
}

/// A decoded COSE Sign1 message.
///
/// `protected` keeps the raw header bytes: the signature covers them
/// byte-for-byte, so they are never re-serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct CoseSign1 {
    pub protected: Vec<u8>,
    pub unprotected: Vec<(Value, Value)>,
    pub payload: Option<Vec<u8>>,
    pub signature: Vec<u8>,
}

impl CoseSign1 {
    /// Strict decode: one CBOR item, optional tag 18, four members of the
    /// right types.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoseError> {
        let value = cbor_from_bytes_strict(bytes)?;
        let inner = match value {
            Value::Tag(TAG_COSE_SIGN1, inner) => *inner,
            Value::Tag(tag, _) => {
                return Err(CoseError::InvalidStructure(format!(
                    "unexpected CBOR tag {}",
                    tag
                )))
            }
            other => other,
        };
        let members = match inner {
            Value::Array(members) => members,
            _ => {
                return Err(CoseError::InvalidStructure(
                    "COSE_Sign1 must be a CBOR array".to_string(),
                ))
            }
        };
        if members.len() != 4 {
            return Err(CoseError::InvalidStructure(format!(
                "COSE_Sign1 has {} members, expected 4",
                members.len()
            )));
        }
        let mut members = members.into_iter();

        let protected = match members.next().unwrap() {
            Value::Bytes(b) => b,
            _ => {
                return Err(CoseError::InvalidStructure(
                    "protected headers must be a byte string".to_string(),
                ))
            }
        };
        let unprotected = match members.next().unwrap() {
            Value::Map(m) => m,
            _ => {
                return Err(CoseError::InvalidStructure(
                    "unprotected headers must be a map".to_string(),
                ))
            }
        };
        let payload = match members.next().unwrap() {
            Value::Bytes(b) => Some(b),
            Value::Null => None,
            _ => {
                return Err(CoseError::InvalidStructure(
                    "payload must be a byte string or nil".to_string(),
                ))
            }
        };
        let signature = match members.next().unwrap() {
            Value::Bytes(b) => b,
            _ => {
                return Err(CoseError::InvalidStructure(
                    "signature must be a byte string".to_string(),
                ))
            }
        };

        // The protected bytes must themselves decode to a header map.
        let decoded = Self {
            protected,
            unprotected,
            payload,
            signature,
        };
        decoded.protected_map()?;
        Ok(decoded)
    }

    /// Encode to the tagged wire form.
    pub fn encode(&self) -> Result<Vec<u8>, CoseError> {
        let payload = match &self.payload {
            Some(bytes) => Value::Bytes(bytes.clone()),
            None => Value::Null,
        };
        let array = Value::Array(vec![
            Value::Bytes(self.protected.clone()),
            Value::Map(self.unprotected.clone()),
            payload,
            Value::Bytes(self.signature.clone()),
        ]);
        cbor_to_bytes(&Value::Tag(TAG_COSE_SIGN1, Box::new(array)))
    }

    /// Decode the protected header bytes into map entries. A zero-length
    /// byte string stands for the empty map.
    pub fn protected_map(&self) -> Result<Vec<(Value, Value)>, CoseError> {
        if self.protected.is_empty() {
            return Ok(Vec::new());
        }
        match cbor_from_bytes_strict(&self.protected)? {
            Value::Map(entries) => Ok(entries),
            _ => Err(CoseError::InvalidStructure(
                "protected headers must encode a map".to_string(),
            )),
        }
    }

    /// Look up a protected header by integer label.
    pub fn protected_header(&self, label: i64) -> Result<Option<Value>, CoseError> {
        Ok(self
            .protected_map()?
            .into_iter()
            .find(|(k, _)| integer_label(k) == Some(label))
            .map(|(_, v)| v))
    }

    /// Look up an unprotected header by integer label.
    pub fn unprotected_header(&self, label: i64) -> Option<&Value> {
        self.unprotected
            .iter()
            .find(|(k, _)| integer_label(k) == Some(label))
            .map(|(_, v)| v)
    }

    /// The `alg` protected header, when present and an integer.
    pub fn alg(&self) -> Result<Option<i64>, CoseError> {
        Ok(self.protected_header(HEADER_ALG)?.as_ref().and_then(integer_label))
    }

    /// The `kid` protected header bytes, when present.
    pub fn kid(&self) -> Result<Option<Vec<u8>>, CoseError> {
        Ok(match self.protected_header(HEADER_KID)? {
            Some(Value::Bytes(b)) => Some(b),
            Some(Value::Text(t)) => Some(t.into_bytes()),
            _ => None,
        })
    }

    /// Build the Sig_structure covered by the signature.
    pub fn sig_structure(
        protected: &[u8],
        external_aad: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, CoseError> {
        cbor_to_bytes(&Value::Array(vec![
            Value::Text("Signature1".to_string()),
            Value::Bytes(protected.to_vec()),
            Value::Bytes(external_aad.to_vec()),
            Value::Bytes(payload.to_vec()),
        ]))
    }

    /// Sign and assemble a COSE Sign1.
    ///
    /// For a detached payload, pass `payload = None` and the signed content
    /// in `external_payload`.
    pub fn sign(
        protected: Vec<u8>,
        unprotected: Vec<(Value, Value)>,
        payload: Option<Vec<u8>>,
        external_payload: Option<&[u8]>,
        key: &Es256SigningKey,
    ) -> Result<Self, CoseError> {
        let content = payload
            .as_deref()
            .or(external_payload)
            .ok_or(CoseError::NoPayload)?;
        let tbs = Self::sig_structure(&protected, b"", content)?;
        let signature = key.sign(&tbs);
        Ok(Self {
            protected,
            unprotected,
            payload,
            signature,
        })
    }

    /// Verify the signature. Detached payloads are supplied externally.
    pub fn verify(
        &self,
        key: &Es256VerifyingKey,
        external_payload: Option<&[u8]>,
    ) -> Result<bool, CoseError> {
        let content = self
            .payload
            .as_deref()
            .or(external_payload)
            .ok_or(CoseError::NoPayload)?;
        let tbs = Self::sig_structure(&self.protected, b"", content)?;
        Ok(key.verify(&tbs, &self.signature).is_ok())
    }
}

/// Encode a protected header map to its byte-string form.
pub fn encode_protected(entries: Vec<(Value, Value)>) -> Result<Vec<u8>, CoseError> {
    cbor_to_bytes(&Value::Map(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cose::ALG_ES256;

    fn protected_es256() -> Vec<u8> {
        encode_protected(vec![(Value::from(HEADER_ALG), Value::from(ALG_ES256))]).unwrap()
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let key = Es256SigningKey::generate();
        let sign1 = CoseSign1::sign(
            protected_es256(),
            vec![(Value::from(99), Value::Text("meta".to_string()))],
            Some(b"payload".to_vec()),
            None,
            &key,
        )
        .unwrap();

        let bytes = sign1.encode().unwrap();
        let decoded = CoseSign1::decode(&bytes).unwrap();
        assert_eq!(decoded, sign1);
        assert_eq!(decoded.alg().unwrap(), Some(ALG_ES256));
        assert!(decoded.verify(&key.verifying_key(), None).unwrap());
    }

    #[test]
    fn test_decode_accepts_untagged() {
        let key = Es256SigningKey::generate();
        let sign1 = CoseSign1::sign(protected_es256(), vec![], Some(b"x".to_vec()), None, &key)
            .unwrap();

        let untagged = cbor_to_bytes(&Value::Array(vec![
            Value::Bytes(sign1.protected.clone()),
            Value::Map(vec![]),
            Value::Bytes(b"x".to_vec()),
            Value::Bytes(sign1.signature.clone()),
        ]))
        .unwrap();
        let decoded = CoseSign1::decode(&untagged).unwrap();
        assert!(decoded.verify(&key.verifying_key(), None).unwrap());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let key = Es256SigningKey::generate();
        let mut bytes = CoseSign1::sign(protected_es256(), vec![], Some(b"x".to_vec()), None, &key)
            .unwrap()
            .encode()
            .unwrap();
        bytes.push(0x00);
        assert!(matches!(CoseSign1::decode(&bytes), Err(CoseError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_shapes() {
        // Not an array.
        let bytes = cbor_to_bytes(&Value::Text("nope".to_string())).unwrap();
        assert!(CoseSign1::decode(&bytes).is_err());

        // Wrong arity.
        let bytes = cbor_to_bytes(&Value::Array(vec![Value::Null; 3])).unwrap();
        assert!(CoseSign1::decode(&bytes).is_err());

        // Wrong member type.
        let bytes = cbor_to_bytes(&Value::Array(vec![
            Value::Text("protected".to_string()),
            Value::Map(vec![]),
            Value::Null,
            Value::Bytes(vec![]),
        ]))
        .unwrap();
        assert!(CoseSign1::decode(&bytes).is_err());

        // Protected bytes that are not a map.
        let bad_protected = cbor_to_bytes(&Value::from(1)).unwrap();
        let bytes = cbor_to_bytes(&Value::Array(vec![
            Value::Bytes(bad_protected),
            Value::Map(vec![]),
            Value::Null,
            Value::Bytes(vec![]),
        ]))
        .unwrap();
        assert!(CoseSign1::decode(&bytes).is_err());
    }

    #[test]
    fn test_detached_payload_sign_verify() {
        let key = Es256SigningKey::generate();
        let sign1 = CoseSign1::sign(
            protected_es256(),
            vec![],
            None,
            Some(b"external content"),
            &key,
        )
        .unwrap();
        assert!(sign1.payload.is_none());

        assert!(sign1
            .verify(&key.verifying_key(), Some(b"external content"))
            .unwrap());
        assert!(!sign1.verify(&key.verifying_key(), Some(b"wrong")).unwrap());
        assert!(matches!(
            sign1.verify(&key.verifying_key(), None),
            Err(CoseError::NoPayload)
        ));
    }

    #[test]
    fn test_signature_covers_protected_headers() {
        let key = Es256SigningKey::generate();
        let mut sign1 = CoseSign1::sign(protected_es256(), vec![], Some(b"x".to_vec()), None, &key)
            .unwrap();
        sign1.protected = encode_protected(vec![
            (Value::from(HEADER_ALG), Value::from(ALG_ES256)),
            (Value::from(HEADER_KID), Value::Bytes(b"evil".to_vec())),
        ])
        .unwrap();
        assert!(!sign1.verify(&key.verifying_key(), None).unwrap());
    }

    #[test]
    fn test_header_lookup_tolerates_key_shapes() {
        // Encoders may emit the same label as u64 or i64; both must match.
        let protected = encode_protected(vec![(
            Value::Integer(ciborium::value::Integer::from(4u64)),
            Value::Bytes(b"kid-1".to_vec()),
        )])
        .unwrap();
        let sign1 = CoseSign1 {
            protected,
            unprotected: vec![],
            payload: None,
            signature: vec![],
        };
        assert_eq!(sign1.kid().unwrap(), Some(b"kid-1".to_vec()));
    }
}
