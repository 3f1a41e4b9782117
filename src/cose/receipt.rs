//! Receipts
//!
//! A receipt is a COSE Sign1 signed by the log's key. The payload is
//! detached: the signed content is the Merkle root reconstructed from the
//! statement hash and the embedded inclusion proof, so the signature
//! cryptographically ties the statement to the tree head. The proof triple
//! `[tree_size, leaf_index, [audit path]]` travels CBOR-encoded under
//! label -1 of the Verifiable Data Proof map at unprotected header 396.

use ciborium::value::Value;
use sha2::{Digest, Sha256};

use super::cwt::CwtClaims;
use super::key::{Es256SigningKey, Es256VerifyingKey};
use super::sign1::{cbor_from_bytes_strict, cbor_to_bytes, encode_protected, integer_label, CoseSign1};
use super::{
    CoseError, ALG_ES256, HEADER_ALG, HEADER_CWT_CLAIMS, HEADER_KID, HEADER_VDP,
    VDP_INCLUSION_PROOF,
};
use crate::merkle::{reconstruct_root, Hash, HASH_SIZE};

/// The inclusion proof triple embedded in a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InclusionProofData {
    pub tree_size: u64,
    pub leaf_index: u64,
    pub path: Vec<Hash>,
}

impl InclusionProofData {
    /// Encode as CBOR `[uint, uint, [bstr, ...]]`.
    pub fn to_cbor(&self) -> Result<Vec<u8>, CoseError> {
        let path = self
            .path
            .iter()
            .map(|h| Value::Bytes(h.to_vec()))
            .collect::<Vec<_>>();
        cbor_to_bytes(&Value::Array(vec![
            Value::from(self.tree_size),
            Value::from(self.leaf_index),
            Value::Array(path),
        ]))
    }

    /// Strict decode of the CBOR triple.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CoseError> {
        let value = cbor_from_bytes_strict(bytes)?;
        let members = match value {
            Value::Array(members) if members.len() == 3 => members,
            _ => {
                return Err(CoseError::InvalidStructure(
                    "inclusion proof must be a 3-element array".to_string(),
                ))
            }
        };
        let tree_size = unsigned(&members[0])?;
        let leaf_index = unsigned(&members[1])?;
        let path = match &members[2] {
            Value::Array(items) => {
                let mut path = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Bytes(b) if b.len() == HASH_SIZE => {
                            let mut hash = [0u8; 32];
                            hash.copy_from_slice(b);
                            path.push(hash);
                        }
                        _ => {
                            return Err(CoseError::InvalidStructure(
                                "audit path elements must be 32-byte strings".to_string(),
                            ))
                        }
                    }
                }
                path
            }
            _ => {
                return Err(CoseError::InvalidStructure(
                    "audit path must be an array".to_string(),
                ))
            }
        };
        Ok(Self {
            tree_size,
            leaf_index,
            path,
        })
    }
}

fn unsigned(value: &Value) -> Result<u64, CoseError> {
    integer_label(value)
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| CoseError::InvalidStructure("expected unsigned integer".to_string()))
}

/// Build and sign a receipt for an appended statement.
///
/// `root` must be the Merkle root the proof reconstructs; callers derive
/// it from the proof rather than trusting the live tree (registration
/// asserts the two agree before signing).
pub fn build_receipt(
    proof: &InclusionProofData,
    root: &Hash,
    origin: &str,
    key: &Es256SigningKey,
) -> Result<Vec<u8>, CoseError> {
    let kid = key.verifying_key().thumbprint();
    let protected = encode_protected(vec![
        (Value::from(HEADER_ALG), Value::from(ALG_ES256)),
        (Value::from(HEADER_KID), Value::Bytes(kid.into_bytes())),
        (
            Value::from(HEADER_CWT_CLAIMS),
            CwtClaims::issuer(origin).to_value(),
        ),
    ])?;
    let vdp = Value::Map(vec![(
        Value::from(VDP_INCLUSION_PROOF),
        Value::Bytes(proof.to_cbor()?),
    )]);
    let unprotected = vec![(Value::from(HEADER_VDP), vdp)];

    let sign1 = CoseSign1::sign(protected, unprotected, None, Some(root), key)?;
    sign1.encode()
}

/// Extract the inclusion proof triple from a receipt.
pub fn receipt_proof(sign1: &CoseSign1) -> Result<InclusionProofData, CoseError> {
    let vdp = sign1
        .unprotected_header(HEADER_VDP)
        .ok_or_else(|| CoseError::MissingHeader("verifiable data proof (396)".to_string()))?;
    let entries = match vdp {
        Value::Map(entries) => entries,
        _ => {
            return Err(CoseError::InvalidStructure(
                "VDP header must be a map".to_string(),
            ))
        }
    };
    let proof_bytes = entries
        .iter()
        .find(|(k, _)| integer_label(k) == Some(VDP_INCLUSION_PROOF))
        .map(|(_, v)| v)
        .ok_or_else(|| CoseError::MissingHeader("inclusion proof (-1)".to_string()))?;
    match proof_bytes {
        Value::Bytes(bytes) => InclusionProofData::from_cbor(bytes),
        _ => Err(CoseError::InvalidStructure(
            "inclusion proof must be a byte string".to_string(),
        )),
    }
}

/// Verify a receipt against the statement it covers.
///
/// Reconstructs the Merkle root from SHA-256(statement) and the embedded
/// audit path, then checks the log's signature over that root. Verifying
/// against the wire payload (nil) proves nothing.
pub fn verify_receipt(
    receipt_bytes: &[u8],
    statement_bytes: &[u8],
    key: &Es256VerifyingKey,
) -> Result<bool, CoseError> {
    let sign1 = CoseSign1::decode(receipt_bytes)?;
    match sign1.alg()? {
        Some(ALG_ES256) => {}
        Some(other) => return Err(CoseError::UnsupportedAlgorithm(other)),
        None => return Err(CoseError::MissingHeader("alg".to_string())),
    }
    let proof = receipt_proof(&sign1)?;

    let record: Hash = Sha256::digest(statement_bytes).into();
    let Some(root) = reconstruct_root(&record, proof.leaf_index, proof.tree_size, &proof.path)
    else {
        return Ok(false);
    };
    sign1.verify(key, Some(&root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::{inclusion_proof, leaf_hash, subtree_hash};

    fn statements() -> Vec<Vec<u8>> {
        (0u8..5).map(|i| vec![i; 40]).collect()
    }

    fn records(statements: &[Vec<u8>]) -> Vec<Hash> {
        statements
            .iter()
            .map(|s| Sha256::digest(s).into())
            .collect()
    }

    #[test]
    fn test_proof_triple_round_trip() {
        let data = InclusionProofData {
            tree_size: 10,
            leaf_index: 3,
            path: vec![[1u8; 32], [2u8; 32]],
        };
        let decoded = InclusionProofData::from_cbor(&data.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_proof_triple_rejects_short_hashes() {
        let bytes = cbor_to_bytes(&Value::Array(vec![
            Value::from(1),
            Value::from(0),
            Value::Array(vec![Value::Bytes(vec![0u8; 31])]),
        ]))
        .unwrap();
        assert!(InclusionProofData::from_cbor(&bytes).is_err());
    }

    #[test]
    fn test_receipt_round_trip() {
        let key = Es256SigningKey::generate();
        let stmts = statements();
        let rs = records(&stmts);
        let n = rs.len() as u64;
        let root = subtree_hash(&rs, 0, n);

        for i in 0..n {
            let proof = InclusionProofData {
                tree_size: n,
                leaf_index: i,
                path: inclusion_proof(&rs, i, n).unwrap(),
            };
            let receipt = build_receipt(&proof, &root, "https://log.example", &key).unwrap();
            assert!(verify_receipt(&receipt, &stmts[i as usize], &key.verifying_key()).unwrap());
        }
    }

    #[test]
    fn test_receipt_binds_statement() {
        let key = Es256SigningKey::generate();
        let stmts = statements();
        let rs = records(&stmts);
        let root = subtree_hash(&rs, 0, 5);
        let proof = InclusionProofData {
            tree_size: 5,
            leaf_index: 2,
            path: inclusion_proof(&rs, 2, 5).unwrap(),
        };
        let receipt = build_receipt(&proof, &root, "https://log.example", &key).unwrap();

        // A different statement reconstructs a different root.
        assert!(!verify_receipt(&receipt, &stmts[3], &key.verifying_key()).unwrap());
        assert!(!verify_receipt(&receipt, b"unknown", &key.verifying_key()).unwrap());
    }

    #[test]
    fn test_receipt_rejects_wrong_key() {
        let key = Es256SigningKey::generate();
        let stmts = statements();
        let rs = records(&stmts);
        let root = subtree_hash(&rs, 0, 5);
        let proof = InclusionProofData {
            tree_size: 5,
            leaf_index: 0,
            path: inclusion_proof(&rs, 0, 5).unwrap(),
        };
        let receipt = build_receipt(&proof, &root, "https://log.example", &key).unwrap();

        let other = Es256SigningKey::generate();
        assert!(!verify_receipt(&receipt, &stmts[0], &other.verifying_key()).unwrap());
    }

    #[test]
    fn test_receipt_headers() {
        let key = Es256SigningKey::generate();
        let proof = InclusionProofData {
            tree_size: 1,
            leaf_index: 0,
            path: vec![],
        };
        let record: Hash = Sha256::digest(b"stmt").into();
        let root = leaf_hash(&record);
        let receipt = build_receipt(&proof, &root, "https://log.example", &key).unwrap();
        let sign1 = CoseSign1::decode(&receipt).unwrap();

        assert!(sign1.payload.is_none());
        assert_eq!(
            sign1.kid().unwrap(),
            Some(key.verifying_key().thumbprint().into_bytes())
        );
        let claims_value = sign1.protected_header(HEADER_CWT_CLAIMS).unwrap().unwrap();
        let claims = CwtClaims::from_value(&claims_value).unwrap();
        assert_eq!(claims.iss.as_deref(), Some("https://log.example"));
    }
}
