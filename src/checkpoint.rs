//! Checkpoints
//!
//! A checkpoint commits the log to a tree head (size, root, timestamp,
//! origin). The ES256 signature covers a fixed binary layout; the textual
//! transport form follows the signed-note convention:
//!
//! ```text
//! <origin>
//! <tree_size>
//! <base64(root_hash)>
//! <timestamp_ms>
//!
//! — <origin> <base64(signature)>
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;
use thiserror::Error;

use crate::cose::{Es256SigningKey, Es256VerifyingKey};
use crate::merkle::{Hash, HASH_SIZE};

/// Checkpoint errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("malformed checkpoint note: {0}")]
    Malformed(String),

    #[error("signature error: {0}")]
    Signature(String),
}

/// An unsigned tree head commitment. Defined only for tree_size >= 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub origin: String,
    pub tree_size: u64,
    pub root_hash: Hash,
    pub timestamp_ms: i64,
}

impl Checkpoint {
    /// Canonical binary signing input:
    /// size (u64 BE) || root (32 B) || timestamp_ms (i64 BE) || origin bytes.
    pub fn signing_input(&self) -> Vec<u8> {
        let mut input = Vec::with_capacity(8 + HASH_SIZE + 8 + self.origin.len());
        input.extend_from_slice(&self.tree_size.to_be_bytes());
        input.extend_from_slice(&self.root_hash);
        input.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        input.extend_from_slice(self.origin.as_bytes());
        input
    }
}

/// A checkpoint plus the log's signature over it.
///
/// `signature_origin` is the origin named on the signature line; it is not
/// required to match the header origin (future multi-signer notes carry
/// witness origins on additional lines).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCheckpoint {
    pub checkpoint: Checkpoint,
    pub signature: Vec<u8>,
    pub signature_origin: String,
}

impl SignedCheckpoint {
    /// Render the signed-note textual form.
    pub fn to_note(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n\n— {} {}\n",
            self.checkpoint.origin,
            self.checkpoint.tree_size,
            BASE64.encode(self.checkpoint.root_hash),
            self.checkpoint.timestamp_ms,
            self.signature_origin,
            BASE64.encode(&self.signature),
        )
    }

    /// Parse the signed-note textual form. Trailing whitespace is
    /// tolerated; structural deviations are not.
    pub fn from_note(text: &str) -> Result<Self, CheckpointError> {
        let lines: Vec<&str> = text.trim_end().split('\n').collect();
        if lines.len() < 6 {
            return Err(CheckpointError::Malformed(format!(
                "{} lines, expected at least 6",
                lines.len()
            )));
        }

        let origin = lines[0].to_string();
        let tree_size: u64 = lines[1]
            .parse()
            .map_err(|e| CheckpointError::Malformed(format!("tree size: {e}")))?;
        let root_bytes = BASE64
            .decode(lines[2])
            .map_err(|e| CheckpointError::Malformed(format!("root hash: {e}")))?;
        if root_bytes.len() != HASH_SIZE {
            return Err(CheckpointError::Malformed(format!(
                "root hash is {} bytes, expected {}",
                root_bytes.len(),
                HASH_SIZE
            )));
        }
        let mut root_hash = [0u8; 32];
        root_hash.copy_from_slice(&root_bytes);
        let timestamp_ms: i64 = lines[3]
            .parse()
            .map_err(|e| CheckpointError::Malformed(format!("timestamp: {e}")))?;
        if !lines[4].is_empty() {
            return Err(CheckpointError::Malformed(
                "missing blank separator line".to_string(),
            ));
        }

        let sig_line = Regex::new(r"^— (.+) (.+)$").expect("static regex");
        let captures = sig_line.captures(lines[5]).ok_or_else(|| {
            CheckpointError::Malformed(format!("bad signature line {:?}", lines[5]))
        })?;
        let signature_origin = captures[1].to_string();
        let signature = BASE64
            .decode(&captures[2])
            .map_err(|e| CheckpointError::Malformed(format!("signature: {e}")))?;

        Ok(Self {
            checkpoint: Checkpoint {
                origin,
                tree_size,
                root_hash,
                timestamp_ms,
            },
            signature,
            signature_origin,
        })
    }

    /// Verify the signature under the log's public key.
    pub fn verify(&self, key: &Es256VerifyingKey) -> bool {
        key.verify(&self.checkpoint.signing_input(), &self.signature)
            .is_ok()
    }
}

/// Signs tree heads under the service key.
pub struct CheckpointSigner {
    key: Es256SigningKey,
    origin: String,
}

impl CheckpointSigner {
    pub fn new(key: Es256SigningKey, origin: impl Into<String>) -> Self {
        Self {
            key,
            origin: origin.into(),
        }
    }

    /// The origin bound into every checkpoint.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Sign a tree head with the current wall-clock timestamp.
    pub fn sign(&self, tree_size: u64, root_hash: Hash) -> SignedCheckpoint {
        self.sign_at(tree_size, root_hash, chrono::Utc::now().timestamp_millis())
    }

    /// Sign a tree head at an explicit timestamp.
    pub fn sign_at(&self, tree_size: u64, root_hash: Hash, timestamp_ms: i64) -> SignedCheckpoint {
        let checkpoint = Checkpoint {
            origin: self.origin.clone(),
            tree_size,
            root_hash,
            timestamp_ms,
        };
        let signature = self.key.sign(&checkpoint.signing_input());
        SignedCheckpoint {
            checkpoint,
            signature,
            signature_origin: self.origin.clone(),
        }
    }
}
