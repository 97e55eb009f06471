//! Data model for consent blocks, chain verification reports, and status views.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `prevHash` carried by the genesis block.
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Block discriminator. Exactly one `Genesis` sits at index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockKind {
    Genesis,
    Give,
    Revoke,
}

/// Consent-bearing block payload. Genesis carries no fields, GIVE carries all
/// four, REVOKE carries only `consent_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_id: Option<String>,
    /// Comma-separated scope tags as granted, e.g. `"sms,email"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
    /// Expiry as Unix epoch seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    /// Caller-supplied hash of the covered data set (opaque to the ledger).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_hash: Option<String>,
}

impl BlockPayload {
    pub fn give(consent_id: String, scopes: &str, expiry: i64, data_hash: &str) -> Self {
        Self {
            consent_id: Some(consent_id),
            scopes: Some(scopes.to_string()),
            expiry: Some(expiry),
            data_hash: Some(data_hash.to_string()),
        }
    }

    pub fn revoke(consent_id: &str) -> Self {
        Self {
            consent_id: Some(consent_id.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentBlock {
    /// 0-indexed position in the chain.
    pub index: u64,
    /// RFC3339 timestamp string.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub payload: BlockPayload,
    /// Hex Ed25519 public key of the consent subject (empty in insecure mode).
    pub subject_pub_key: String,
    /// Hex Ed25519 signature over the canonical message hash (empty in insecure mode).
    pub signature: String,
    /// Hash of the previous block, or the zero sentinel for genesis.
    pub prev_hash: String,
    /// SHA-256 hex over the canonical digest view of this block.
    pub hash: String,
}

/// Digest view: the fields covered by a block hash, in fixed order. The
/// signature is deliberately outside the digest so that verification can
/// report a bad signature as such instead of as a hash mismatch.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DigestView<'a> {
    index: u64,
    timestamp: &'a str,
    #[serde(rename = "type")]
    kind: BlockKind,
    payload: &'a BlockPayload,
    subject_pub_key: &'a str,
    prev_hash: &'a str,
}

/// Hash inputs (concatenate as bytes, SHA-256) and return lowercase hex.
pub fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    hex::encode(hasher.finalize())
}

/// Compute a block hash from its digest view.
pub fn compute_block_hash(b: &ConsentBlock) -> String {
    let view = DigestView {
        index: b.index,
        timestamp: &b.timestamp,
        kind: b.kind,
        payload: &b.payload,
        subject_pub_key: &b.subject_pub_key,
        prev_hash: &b.prev_hash,
    };
    let bytes = serde_json::to_vec(&view).unwrap_or_default();
    sha256_hex(&[&bytes])
}

/// Why a chain failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyFailure {
    HashMismatch,
    LinkBroken,
    SignatureInvalid,
}

/// Result of a full-chain verification walk. Reports the first defect only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_invalid_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<VerifyFailure>,
}

impl ChainCheck {
    pub fn ok() -> Self {
        Self {
            valid: true,
            first_invalid_index: None,
            reason: None,
        }
    }

    pub fn invalid(index: u64, reason: VerifyFailure) -> Self {
        Self {
            valid: false,
            first_invalid_index: Some(index),
            reason: Some(reason),
        }
    }
}

/// Why an existing consent is not currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InactiveReason {
    Expired,
    Revoked,
}

impl InactiveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InactiveReason::Expired => "expired",
            InactiveReason::Revoked => "revoked",
        }
    }
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one consent, resolved from its block history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentStatus {
    pub found: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InactiveReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_pub_key: Option<String>,
}

impl ConsentStatus {
    pub fn not_found() -> Self {
        Self {
            found: false,
            active: false,
            reason: None,
            scope: None,
            expiry: None,
            last_block_hash: None,
            subject_pub_key: None,
        }
    }
}
