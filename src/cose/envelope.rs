//! Hash Envelope
//!
//! COSE Sign1 variant for large artifacts: the payload carries
//! SHA-256(artifact) and the protected headers identify the hash
//! algorithm (258), the preimage content type (259), and where the
//! artifact lives (260).

use ciborium::value::Value;
use sha2::{Digest, Sha256};

use super::cwt::CwtClaims;
use super::key::{Es256SigningKey, Es256VerifyingKey};
use super::sign1::{encode_protected, CoseSign1};
use super::{
    CoseError, ALG_ES256, HASH_ALG_SHA256, HEADER_ALG, HEADER_CWT_CLAIMS, HEADER_KID,
    HEADER_PAYLOAD_HASH_ALG, HEADER_PAYLOAD_LOCATION, HEADER_PREIMAGE_CONTENT_TYPE,
};

/// Options for signing a hash envelope.
#[derive(Debug, Clone)]
pub struct HashEnvelopeOptions {
    /// Content type of the artifact the hash commits to.
    pub content_type: String,
    /// Where the artifact can be retrieved, if anywhere.
    pub payload_location: Option<String>,
    /// Emit the hash as a detached payload (nil on the wire).
    pub detached: bool,
}

/// Outcome of verifying a hash envelope against an artifact.
///
/// The two bits are independent: a valid signature over a hash that does
/// not match the artifact yields `signature_valid` without `hash_valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEnvelopeVerification {
    pub signature_valid: bool,
    pub hash_valid: bool,
}

/// Sign a hash envelope over `artifact`.
pub fn sign_hash_envelope(
    artifact: &[u8],
    opts: &HashEnvelopeOptions,
    key: &Es256SigningKey,
    kid: &str,
    claims: &CwtClaims,
) -> Result<CoseSign1, CoseError> {
    let mut entries = vec![
        (Value::from(HEADER_ALG), Value::from(ALG_ES256)),
        (Value::from(HEADER_KID), Value::Bytes(kid.as_bytes().to_vec())),
        (Value::from(HEADER_CWT_CLAIMS), claims.to_value()),
        (
            Value::from(HEADER_PAYLOAD_HASH_ALG),
            Value::from(HASH_ALG_SHA256),
        ),
        (
            Value::from(HEADER_PREIMAGE_CONTENT_TYPE),
            Value::Text(opts.content_type.clone()),
        ),
    ];
    if let Some(location) = &opts.payload_location {
        entries.push((
            Value::from(HEADER_PAYLOAD_LOCATION),
            Value::Text(location.clone()),
        ));
    }
    let protected = encode_protected(entries)?;

    let digest: Vec<u8> = Sha256::digest(artifact).to_vec();
    if opts.detached {
        CoseSign1::sign(protected, Vec::new(), None, Some(&digest), key)
    } else {
        CoseSign1::sign(protected, Vec::new(), Some(digest), None, key)
    }
}

/// Verify a hash envelope against the artifact bytes.
///
/// With an attached payload the signature is checked over the embedded
/// hash, so artifact tampering flips only `hash_valid`. With a detached
/// payload the recomputed hash is the signed content and the two bits
/// coincide.
pub fn verify_hash_envelope(
    sign1: &CoseSign1,
    artifact: &[u8],
    key: &Es256VerifyingKey,
) -> Result<HashEnvelopeVerification, CoseError> {
    let alg = sign1.protected_header(HEADER_PAYLOAD_HASH_ALG)?;
    match alg.as_ref().and_then(super::sign1::integer_label) {
        Some(HASH_ALG_SHA256) => {}
        Some(other) => return Err(CoseError::UnsupportedAlgorithm(other)),
        None => {
            return Err(CoseError::MissingHeader(
                "payload hash algorithm (258)".to_string(),
            ))
        }
    }

    let computed: Vec<u8> = Sha256::digest(artifact).to_vec();
    match &sign1.payload {
        Some(embedded) => Ok(HashEnvelopeVerification {
            signature_valid: sign1.verify(key, None)?,
            hash_valid: *embedded == computed,
        }),
        None => {
            let valid = sign1.verify(key, Some(&computed))?;
            Ok(HashEnvelopeVerification {
                signature_valid: valid,
                hash_valid: valid,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> Vec<u8> {
        (0u16..256).map(|b| b as u8).collect()
    }

    fn opts() -> HashEnvelopeOptions {
        HashEnvelopeOptions {
            content_type: "application/octet-stream".to_string(),
            payload_location: Some("https://example/a.bin".to_string()),
            detached: false,
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let key = Es256SigningKey::generate();
        let kid = key.verifying_key().thumbprint();
        let claims = CwtClaims::new("https://issuer.example", "artifact-1");

        let sign1 = sign_hash_envelope(&artifact(), &opts(), &key, &kid, &claims).unwrap();
        let result = verify_hash_envelope(&sign1, &artifact(), &key.verifying_key()).unwrap();
        assert!(result.signature_valid);
        assert!(result.hash_valid);

        // Headers are all in place.
        assert_eq!(
            sign1
                .protected_header(HEADER_PREIMAGE_CONTENT_TYPE)
                .unwrap(),
            Some(Value::Text("application/octet-stream".to_string()))
        );
        assert_eq!(
            sign1.protected_header(HEADER_PAYLOAD_LOCATION).unwrap(),
            Some(Value::Text("https://example/a.bin".to_string()))
        );
    }

    #[test]
    fn test_artifact_tamper_flips_only_hash_valid() {
        let key = Es256SigningKey::generate();
        let kid = key.verifying_key().thumbprint();
        let claims = CwtClaims::new("https://issuer.example", "artifact-1");
        let sign1 = sign_hash_envelope(&artifact(), &opts(), &key, &kid, &claims).unwrap();

        for position in [0usize, 100, 255] {
            let mut tampered = artifact();
            tampered[position] ^= 0x01;
            let result = verify_hash_envelope(&sign1, &tampered, &key.verifying_key()).unwrap();
            assert!(result.signature_valid, "byte {} broke the signature", position);
            assert!(!result.hash_valid, "byte {} kept the hash valid", position);
        }
    }

    #[test]
    fn test_wrong_key_flips_signature_valid() {
        let key = Es256SigningKey::generate();
        let kid = key.verifying_key().thumbprint();
        let claims = CwtClaims::new("https://issuer.example", "artifact-1");
        let sign1 = sign_hash_envelope(&artifact(), &opts(), &key, &kid, &claims).unwrap();

        let other = Es256SigningKey::generate();
        let result = verify_hash_envelope(&sign1, &artifact(), &other.verifying_key()).unwrap();
        assert!(!result.signature_valid);
        assert!(result.hash_valid);
    }

    #[test]
    fn test_detached_envelope() {
        let key = Es256SigningKey::generate();
        let kid = key.verifying_key().thumbprint();
        let claims = CwtClaims::new("https://issuer.example", "artifact-1");
        let mut detached_opts = opts();
        detached_opts.detached = true;

        let sign1 =
            sign_hash_envelope(&artifact(), &detached_opts, &key, &kid, &claims).unwrap();
        assert!(sign1.payload.is_none());

        let result = verify_hash_envelope(&sign1, &artifact(), &key.verifying_key()).unwrap();
        assert!(result.signature_valid && result.hash_valid);

        let mut tampered = artifact();
        tampered[7] ^= 0xff;
        let result = verify_hash_envelope(&sign1, &tampered, &key.verifying_key()).unwrap();
        assert!(!result.signature_valid && !result.hash_valid);
    }

    #[test]
    fn test_missing_hash_alg_header_is_an_error() {
        let key = Es256SigningKey::generate();
        let protected = encode_protected(vec![(Value::from(HEADER_ALG), Value::from(ALG_ES256))])
            .unwrap();
        let sign1 =
            CoseSign1::sign(protected, vec![], Some(b"not-a-hash".to_vec()), None, &key).unwrap();
        assert!(matches!(
            verify_hash_envelope(&sign1, b"x", &key.verifying_key()),
            Err(CoseError::MissingHeader(_))
        ));
    }
}
