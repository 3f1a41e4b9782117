//! COSE Sign1 Codec
//!
//! CBOR-encoded single-signer signed messages per RFC 9052/9053, with
//! CWT claims (RFC 8392/9597), the hash-envelope variant for large
//! artifacts, and the receipt format carrying an inclusion proof.
//!
//! This module contains:
//! - `key` - ES256 (P-256 + SHA-256) keys, COSE_Key form, JWK thumbprints
//! - `sign1` - COSE Sign1 structure, strict decode, Sig_structure, sign/verify
//! - `cwt` - CWT claims map embedded at protected header label 15
//! - `envelope` - hash-envelope signing and verification
//! - `receipt` - log receipts with embedded inclusion proofs

pub mod cwt;
pub mod envelope;
pub mod key;
pub mod receipt;
pub mod sign1;

use thiserror::Error;

/// COSE algorithm identifier for ES256.
pub const ALG_ES256: i64 = -7;

/// Protected header label: algorithm.
pub const HEADER_ALG: i64 = 1;

/// Protected header label: content type.
pub const HEADER_CTY: i64 = 3;

/// Protected header label: key identifier.
pub const HEADER_KID: i64 = 4;

/// Protected header label: CWT claims map (RFC 9597).
pub const HEADER_CWT_CLAIMS: i64 = 15;

/// Protected header label: hash-envelope payload hash algorithm.
pub const HEADER_PAYLOAD_HASH_ALG: i64 = 258;

/// Protected header label: hash-envelope preimage content type.
pub const HEADER_PREIMAGE_CONTENT_TYPE: i64 = 259;

/// Protected header label: hash-envelope payload location.
pub const HEADER_PAYLOAD_LOCATION: i64 = 260;

/// Unprotected header label: verifiable data proof.
pub const HEADER_VDP: i64 = 396;

/// VDP map label carrying the CBOR-encoded inclusion proof triple.
pub const VDP_INCLUSION_PROOF: i64 = -1;

/// COSE hash algorithm identifier for SHA-256.
pub const HASH_ALG_SHA256: i64 = -16;

/// CBOR tag for COSE_Sign1.
pub const TAG_COSE_SIGN1: u64 = 18;

/// CWT claim keys.
pub const CWT_ISS: i64 = 1;
pub const CWT_SUB: i64 = 2;
pub const CWT_AUD: i64 = 3;
pub const CWT_EXP: i64 = 4;
pub const CWT_NBF: i64 = 5;
pub const CWT_IAT: i64 = 6;

/// COSE codec errors
#[derive(Debug, Error)]
pub enum CoseError {
    #[error("CBOR decode error: {0}")]
    Decode(String),

    #[error("CBOR encode error: {0}")]
    Encode(String),

    #[error("malformed COSE structure: {0}")]
    InvalidStructure(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("missing header: {0}")]
    MissingHeader(String),

    #[error("missing claim: {0}")]
    MissingClaim(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("no payload: detached content must be supplied externally")]
    NoPayload,
}

pub use cwt::CwtClaims;
pub use envelope::{sign_hash_envelope, verify_hash_envelope, HashEnvelopeOptions, HashEnvelopeVerification};
pub use key::{cose_key_set, Es256SigningKey, Es256VerifyingKey};
pub use receipt::{build_receipt, verify_receipt, InclusionProofData};
pub use sign1::CoseSign1;
