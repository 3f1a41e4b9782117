//! Registration Pipeline
//!
//! Binds the COSE layer to the tile log: validates an incoming signed
//! statement, appends its hash under the single writer token, records
//! metadata, and issues a signed receipt embedding the inclusion proof.
//! Also serves the retrieval flow (receipt for an existing entry) and
//! checkpoint signing.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use ciborium::value::Value;

use crate::checkpoint::{CheckpointSigner, SignedCheckpoint};
use crate::common::error::ScittError;
use crate::cose::sign1::integer_label;
use crate::cose::{
    build_receipt, CoseSign1, CwtClaims, Es256SigningKey, Es256VerifyingKey, InclusionProofData,
    ALG_ES256, HEADER_CTY, HEADER_CWT_CLAIMS, HEADER_PAYLOAD_HASH_ALG,
};
use crate::index::{EntryMetadata, MetadataIndex};
use crate::merkle::{reconstruct_root, Hash};
use crate::tlog::{entry_coords, entry_tile_key, TileLog};

/// Statement acceptance predicate.
///
/// Acceptance policy is an external concern; the pipeline only asks
/// whether a decoded statement may enter the log.
pub trait StatementPolicy: Send + Sync {
    /// Policy name reported by the configuration endpoint
    fn name(&self) -> &'static str;

    /// Accept or reject a decoded statement
    fn evaluate(&self, statement: &CoseSign1) -> Result<(), ScittError>;
}

/// Accepts every well-formed statement as opaque.
pub struct AcceptAllPolicy;

impl StatementPolicy for AcceptAllPolicy {
    fn name(&self) -> &'static str {
        "accept-all"
    }

    fn evaluate(&self, _statement: &CoseSign1) -> Result<(), ScittError> {
        Ok(())
    }
}

/// Requires a valid statement signature from a trusted key.
///
/// Keys are matched by `kid` (the RFC 7638 thumbprint) when the statement
/// carries one; otherwise every trusted key is tried.
#[derive(Default)]
pub struct RequireSignaturePolicy {
    trusted: Vec<Es256VerifyingKey>,
}

impl RequireSignaturePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trusted issuer key.
    pub fn trust(mut self, key: Es256VerifyingKey) -> Self {
        self.trusted.push(key);
        self
    }
}

impl StatementPolicy for RequireSignaturePolicy {
    fn name(&self) -> &'static str {
        "require-signature"
    }

    fn evaluate(&self, statement: &CoseSign1) -> Result<(), ScittError> {
        if statement.payload.is_none() {
            return Err(ScittError::bad_signature(
                "detached payloads cannot be verified at registration",
            ));
        }
        let kid = statement
            .kid()
            .map_err(|e| ScittError::malformed(e.to_string()))?;

        let candidates: Vec<&Es256VerifyingKey> = match &kid {
            Some(kid) => self
                .trusted
                .iter()
                .filter(|k| k.thumbprint().as_bytes() == kid.as_slice())
                .collect(),
            None => self.trusted.iter().collect(),
        };
        if candidates.is_empty() {
            return Err(ScittError::bad_signature("no trusted key matches the statement kid"));
        }
        for key in candidates {
            if statement
                .verify(key, None)
                .map_err(|e| ScittError::malformed(e.to_string()))?
            {
                return Ok(());
            }
        }
        Err(ScittError::bad_signature(
            "statement signature does not verify under any trusted key",
        ))
    }
}

/// The registration service.
///
/// Appends serialize on the tile log's write lock (the single writer
/// token); proof reads for retrieval take the read lock.
pub struct RegistrationService {
    log: Arc<RwLock<TileLog>>,
    index: Arc<dyn MetadataIndex>,
    signer: CheckpointSigner,
    key: Es256SigningKey,
    origin: String,
    policy: Arc<dyn StatementPolicy>,
    poisoned: AtomicBool,
}

impl RegistrationService {
    pub fn new(
        log: Arc<RwLock<TileLog>>,
        index: Arc<dyn MetadataIndex>,
        key: Es256SigningKey,
        origin: impl Into<String>,
        policy: Arc<dyn StatementPolicy>,
    ) -> Self {
        let origin = origin.into();
        Self {
            log,
            index,
            signer: CheckpointSigner::new(key.clone(), origin.clone()),
            key,
            origin,
            policy,
            poisoned: AtomicBool::new(false),
        }
    }

    /// The log origin bound into receipts and checkpoints.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The service public key receipts verify under.
    pub fn verifying_key(&self) -> Es256VerifyingKey {
        self.key.verifying_key()
    }

    /// Name of the active acceptance policy.
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Current tree size.
    pub async fn tree_size(&self) -> u64 {
        self.log.read().await.size()
    }

    /// Whether the write path is disabled after an internal inconsistency.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Register a signed statement; returns the receipt bytes.
    pub async fn register(&self, statement_bytes: &[u8]) -> Result<Vec<u8>, ScittError> {
        if self.is_poisoned() {
            return Err(ScittError::inconsistency(
                "write path disabled after root mismatch; operator intervention required",
            ));
        }

        let statement = CoseSign1::decode(statement_bytes)
            .map_err(|e| ScittError::malformed(e.to_string()))?;
        let claims = self.validate_statement(&statement)?;
        self.policy.evaluate(&statement)?;

        let record: Hash = Sha256::digest(statement_bytes).into();

        // Leaf persistence, compact-range update, and tree-state persistence
        // happen under the exclusive writer token; the proof and root are
        // snapshotted before it is released so no later append can slip in.
        let (entry_index, tree_size, proof, root) = {
            let mut log = self.log.write().await;
            let entry_index = log.append(record).await?;
            let tree_size = log.size();
            let proof = log.inclusion_proof(entry_index, tree_size).await?;
            let root = log.root()?;
            (entry_index, tree_size, proof, root)
        };

        // Metadata is best-effort durability: a failed insert leaves an
        // index gap, never a corrupt log.
        let meta = self.metadata_for(&statement, &claims, &record, entry_index, tree_size);
        if let Err(e) = self.index.record(&meta).await {
            warn!(
                target: "scitt::registration",
                entry_index,
                error = %e,
                "metadata index write failed; entry remains valid in the log"
            );
        }

        // The receipt signs the root reconstructed from the proof, so the
        // two must agree before the key touches anything.
        if reconstruct_root(&record, entry_index, tree_size, &proof) != Some(root) {
            self.poisoned.store(true, Ordering::SeqCst);
            error!(
                target: "scitt::registration",
                entry_index,
                tree_size,
                "reconstructed root diverges from tree head; refusing further writes"
            );
            return Err(ScittError::inconsistency(format!(
                "reconstructed root diverges at entry {}",
                entry_index
            )));
        }

        let proof_data = InclusionProofData {
            tree_size,
            leaf_index: entry_index,
            path: proof,
        };
        let receipt = build_receipt(&proof_data, &root, &self.origin, &self.key)
            .map_err(|e| ScittError::inconsistency(format!("receipt encoding: {e}")))?;

        info!(
            target: "scitt::registration",
            entry_index,
            tree_size,
            statement_hash = %meta.statement_hash,
            iss = %meta.iss,
            sub = %meta.sub,
            "statement registered"
        );
        Ok(receipt)
    }

    /// Issue a fresh receipt for an already-registered entry.
    pub async fn receipt_for_entry(&self, entry_index: u64) -> Result<Vec<u8>, ScittError> {
        let (tree_size, record, proof, root) = {
            let log = self.log.read().await;
            let tree_size = log.size();
            if entry_index >= tree_size {
                return Err(ScittError::not_found(format!(
                    "entry {} in tree of size {}",
                    entry_index, tree_size
                )));
            }
            let record = log.get_leaf(entry_index).await?;
            let proof = log.inclusion_proof(entry_index, tree_size).await?;
            let root = log.root()?;
            (tree_size, record, proof, root)
        };

        if self
            .index
            .get(entry_index)
            .await
            .ok()
            .flatten()
            .is_none()
        {
            // Tolerated orphan gap: the entry is in the log but its
            // metadata row is missing.
            warn!(
                target: "scitt::registration",
                entry_index,
                "serving entry with no metadata row"
            );
        }

        if reconstruct_root(&record, entry_index, tree_size, &proof) != Some(root) {
            return Err(ScittError::ProofFailure(format!(
                "inclusion proof for entry {} does not reach the tree head",
                entry_index
            )));
        }

        let proof_data = InclusionProofData {
            tree_size,
            leaf_index: entry_index,
            path: proof,
        };
        build_receipt(&proof_data, &root, &self.origin, &self.key)
            .map_err(|e| ScittError::inconsistency(format!("receipt encoding: {e}")))
    }

    /// Sign a checkpoint over the current tree head.
    pub async fn checkpoint(&self) -> Result<SignedCheckpoint, ScittError> {
        let head = {
            let log = self.log.read().await;
            log.head()?
        };
        Ok(self.signer.sign(head.size, head.root))
    }

    /// Validate protected headers; returns the CWT claims.
    fn validate_statement(&self, statement: &CoseSign1) -> Result<CwtClaims, ScittError> {
        match statement
            .alg()
            .map_err(|e| ScittError::malformed(e.to_string()))?
        {
            Some(ALG_ES256) => {}
            Some(other) => {
                return Err(ScittError::UnsupportedAlgorithm(format!(
                    "statement alg {} (only ES256 is registered)",
                    other
                )))
            }
            None => {
                return Err(ScittError::UnsupportedAlgorithm(
                    "statement has no alg header".to_string(),
                ))
            }
        }

        let claims_value = statement
            .protected_header(HEADER_CWT_CLAIMS)
            .map_err(|e| ScittError::malformed(e.to_string()))?
            .ok_or_else(|| ScittError::missing_claims("CWT claims header (15) absent"))?;
        let claims = CwtClaims::from_value(&claims_value)
            .map_err(|e| ScittError::missing_claims(e.to_string()))?;
        if !claims.has_registration_claims() {
            return Err(ScittError::missing_claims(
                "iss (1) and sub (2) are required",
            ));
        }
        Ok(claims)
    }

    fn metadata_for(
        &self,
        statement: &CoseSign1,
        claims: &CwtClaims,
        record: &Hash,
        entry_index: u64,
        tree_size: u64,
    ) -> EntryMetadata {
        let cty = statement
            .protected_header(HEADER_CTY)
            .ok()
            .flatten()
            .and_then(|v| match v {
                Value::Text(t) => Some(t),
                Value::Integer(i) => Some(i128::from(i).to_string()),
                _ => None,
            });
        let payload_hash_alg = statement
            .protected_header(HEADER_PAYLOAD_HASH_ALG)
            .ok()
            .flatten()
            .as_ref()
            .and_then(integer_label);
        let payload_hash = payload_hash_alg
            .and(statement.payload.as_ref())
            .map(hex::encode);

        let (tile, offset) = entry_coords(entry_index);
        EntryMetadata {
            entry_index,
            statement_hash: hex::encode(record),
            iss: claims.iss.clone().unwrap_or_default(),
            sub: claims.sub.clone().unwrap_or_default(),
            cty,
            payload_hash_alg,
            payload_hash,
            tree_size_at_registration: tree_size,
            entry_tile_key: entry_tile_key(tile),
            entry_tile_offset: offset,
            registered_at: chrono::Utc::now().timestamp().max(0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cose::sign1::encode_protected;
    use crate::cose::verify_receipt;
    use crate::index::MemoryMetadataIndex;
    use crate::storage::MemoryBlobStore;

    async fn service_with_policy(policy: Arc<dyn StatementPolicy>) -> RegistrationService {
        let store = Arc::new(MemoryBlobStore::new());
        let log = TileLog::load(store).await.unwrap();
        RegistrationService::new(
            Arc::new(RwLock::new(log)),
            Arc::new(MemoryMetadataIndex::new()),
            Es256SigningKey::generate(),
            "https://log.example",
            policy,
        )
    }

    async fn service() -> RegistrationService {
        service_with_policy(Arc::new(AcceptAllPolicy)).await
    }

    fn statement_bytes(key: &Es256SigningKey, sub: &str) -> Vec<u8> {
        let protected = encode_protected(vec![
            (Value::from(1), Value::from(ALG_ES256)),
            (
                Value::from(HEADER_CWT_CLAIMS),
                CwtClaims::new("https://issuer.example", sub).to_value(),
            ),
        ])
        .unwrap();
        CoseSign1::sign(protected, vec![], Some(b"payload".to_vec()), None, key)
            .unwrap()
            .encode()
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_returns_verifiable_receipt() {
        let service = service().await;
        let issuer = Es256SigningKey::generate();
        let statement = statement_bytes(&issuer, "artifact-1");

        let receipt = service.register(&statement).await.unwrap();
        assert!(verify_receipt(&receipt, &statement, &service.verifying_key()).unwrap());
        assert_eq!(service.tree_size().await, 1);
    }

    #[tokio::test]
    async fn test_register_assigns_dense_indices() {
        let service = service().await;
        let issuer = Es256SigningKey::generate();

        for i in 0..5u64 {
            let statement = statement_bytes(&issuer, &format!("artifact-{i}"));
            let receipt = service.register(&statement).await.unwrap();
            let sign1 = CoseSign1::decode(&receipt).unwrap();
            let proof = crate::cose::receipt::receipt_proof(&sign1).unwrap();
            assert_eq!(proof.leaf_index, i);
            assert_eq!(proof.tree_size, i + 1);
        }
    }

    #[tokio::test]
    async fn test_register_records_metadata() {
        let store = Arc::new(MemoryBlobStore::new());
        let log = TileLog::load(store).await.unwrap();
        let index = Arc::new(MemoryMetadataIndex::new());
        let service = RegistrationService::new(
            Arc::new(RwLock::new(log)),
            index.clone(),
            Es256SigningKey::generate(),
            "https://log.example",
            Arc::new(AcceptAllPolicy),
        );

        let issuer = Es256SigningKey::generate();
        let statement = statement_bytes(&issuer, "pkg:example/widget");
        service.register(&statement).await.unwrap();

        let meta = index.get(0).await.unwrap().unwrap();
        assert_eq!(meta.iss, "https://issuer.example");
        assert_eq!(meta.sub, "pkg:example/widget");
        assert_eq!(meta.statement_hash, hex::encode(Sha256::digest(&statement)));
        assert_eq!(meta.entry_tile_key, "tile/entries/000");
        assert_eq!(meta.entry_tile_offset, 0);
        assert_eq!(meta.tree_size_at_registration, 1);
        assert_eq!(index.tree_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_garbage() {
        let service = service().await;
        let err = service.register(b"not cbor at all").await.unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_STATEMENT");
        assert_eq!(service.tree_size().await, 0);
    }

    #[tokio::test]
    async fn test_register_rejects_wrong_alg() {
        let service = service().await;
        let key = Es256SigningKey::generate();
        let protected = encode_protected(vec![
            (Value::from(1), Value::from(-35)), // ES384
            (
                Value::from(HEADER_CWT_CLAIMS),
                CwtClaims::new("https://issuer.example", "s").to_value(),
            ),
        ])
        .unwrap();
        let bytes = CoseSign1::sign(protected, vec![], Some(b"p".to_vec()), None, &key)
            .unwrap()
            .encode()
            .unwrap();

        let err = service.register(&bytes).await.unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_ALGORITHM");
    }

    #[tokio::test]
    async fn test_register_rejects_missing_claims() {
        let service = service().await;
        let key = Es256SigningKey::generate();

        // No CWT header at all.
        let protected = encode_protected(vec![(Value::from(1), Value::from(ALG_ES256))]).unwrap();
        let bytes = CoseSign1::sign(protected, vec![], Some(b"p".to_vec()), None, &key)
            .unwrap()
            .encode()
            .unwrap();
        let err = service.register(&bytes).await.unwrap_err();
        assert_eq!(err.error_code(), "MISSING_CLAIMS");

        // Claims present but sub absent.
        let protected = encode_protected(vec![
            (Value::from(1), Value::from(ALG_ES256)),
            (
                Value::from(HEADER_CWT_CLAIMS),
                CwtClaims::issuer("https://issuer.example").to_value(),
            ),
        ])
        .unwrap();
        let bytes = CoseSign1::sign(protected, vec![], Some(b"p".to_vec()), None, &key)
            .unwrap()
            .encode()
            .unwrap();
        let err = service.register(&bytes).await.unwrap_err();
        assert_eq!(err.error_code(), "MISSING_CLAIMS");
    }

    #[tokio::test]
    async fn test_require_signature_policy() {
        let issuer = Es256SigningKey::generate();
        let policy = RequireSignaturePolicy::new().trust(issuer.verifying_key());
        let service = service_with_policy(Arc::new(policy)).await;

        let statement = statement_bytes(&issuer, "signed-artifact");
        assert!(service.register(&statement).await.is_ok());

        // A statement signed by an untrusted key is refused.
        let rogue = Es256SigningKey::generate();
        let statement = statement_bytes(&rogue, "rogue-artifact");
        let err = service.register(&statement).await.unwrap_err();
        assert_eq!(err.error_code(), "BAD_SIGNATURE");
        assert_eq!(service.tree_size().await, 1);
    }

    #[tokio::test]
    async fn test_receipt_for_entry() {
        let service = service().await;
        let issuer = Es256SigningKey::generate();
        let first = statement_bytes(&issuer, "first");
        let second = statement_bytes(&issuer, "second");
        service.register(&first).await.unwrap();
        service.register(&second).await.unwrap();

        // Receipts reissued later cover the current tree head.
        let receipt = service.receipt_for_entry(0).await.unwrap();
        assert!(verify_receipt(&receipt, &first, &service.verifying_key()).unwrap());
        let sign1 = CoseSign1::decode(&receipt).unwrap();
        let proof = crate::cose::receipt::receipt_proof(&sign1).unwrap();
        assert_eq!(proof.tree_size, 2);

        let err = service.receipt_for_entry(2).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_checkpoint_signs_current_head() {
        let service = service().await;
        let err = service.checkpoint().await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");

        let issuer = Es256SigningKey::generate();
        service
            .register(&statement_bytes(&issuer, "artifact"))
            .await
            .unwrap();

        let signed = service.checkpoint().await.unwrap();
        assert_eq!(signed.checkpoint.tree_size, 1);
        assert_eq!(signed.checkpoint.origin, "https://log.example");
        assert!(signed.verify(&service.verifying_key()));
    }
}
