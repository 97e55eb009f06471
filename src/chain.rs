//! Append-only consent chain: block linking, verification, status resolution.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::crypto::{derive_consent_id, give_message_hash, revoke_message_hash, SignatureVerifier};
use crate::model::{
    compute_block_hash, BlockKind, BlockPayload, ChainCheck, ConsentBlock, ConsentStatus,
    InactiveReason, VerifyFailure, GENESIS_PREV_HASH,
};

/// How scopes resolve when a consent id carries several GIVE blocks without an
/// intervening REVOKE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RegrantPolicy {
    /// The most recent GIVE wins outright.
    Latest,
    /// Union of scopes across GIVE blocks since the last REVOKE.
    Union,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain has no genesis block")]
    NoGenesis,
    #[error("consent {consent_id} not found")]
    NotFound { consent_id: String },
    #[error("consent {consent_id} is not active ({reason})")]
    Inactive {
        consent_id: String,
        reason: InactiveReason,
    },
    #[error("revoke signer does not match the granting key")]
    SignerMismatch,
    #[error("invalid signature for {action} message")]
    SignatureRejected { action: &'static str },
}

/// In-memory chain. Index 0 is always the genesis block; every later block
/// links to its predecessor by hash.
#[derive(Debug, Default)]
pub struct ConsentChain {
    blocks: Vec<ConsentBlock>,
}

impl ConsentChain {
    /// Wrap blocks loaded from storage. Callers are expected to pass blocks
    /// sorted by index; `verify` reports any damage.
    pub fn new(blocks: Vec<ConsentBlock>) -> Self {
        Self { blocks }
    }

    /// Start a fresh chain with a computed genesis block.
    pub fn bootstrap(timestamp: String) -> Self {
        let mut genesis = ConsentBlock {
            index: 0,
            timestamp,
            kind: BlockKind::Genesis,
            payload: BlockPayload::default(),
            subject_pub_key: String::new(),
            signature: String::new(),
            prev_hash: GENESIS_PREV_HASH.to_string(),
            hash: String::new(),
        };
        genesis.hash = compute_block_hash(&genesis);
        Self {
            blocks: vec![genesis],
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[ConsentBlock] {
        &self.blocks
    }

    pub fn tip(&self) -> Option<&ConsentBlock> {
        self.blocks.last()
    }

    /// Most recent GIVE block for a consent id, if any.
    pub fn latest_give(&self, consent_id: &str) -> Option<&ConsentBlock> {
        self.blocks.iter().rev().find(|b| {
            b.kind == BlockKind::Give && b.payload.consent_id.as_deref() == Some(consent_id)
        })
    }

    /// All GIVE/REVOKE blocks for a consent id, oldest first.
    pub fn blocks_for(&self, consent_id: &str) -> Vec<ConsentBlock> {
        self.history(consent_id).into_iter().cloned().collect()
    }

    fn history(&self, consent_id: &str) -> Vec<&ConsentBlock> {
        self.blocks
            .iter()
            .filter(|b| {
                matches!(b.kind, BlockKind::Give | BlockKind::Revoke)
                    && b.payload.consent_id.as_deref() == Some(consent_id)
            })
            .collect()
    }

    /// Link a new block onto the tip. The hash is computed here so callers
    /// can never append a block with a stale digest.
    fn append(
        &mut self,
        kind: BlockKind,
        payload: BlockPayload,
        subject_pub_key: String,
        signature: String,
        timestamp: String,
    ) -> Result<ConsentBlock, ChainError> {
        let prev = self.tip().ok_or(ChainError::NoGenesis)?;
        let mut block = ConsentBlock {
            index: prev.index + 1,
            timestamp,
            kind,
            payload,
            subject_pub_key,
            signature,
            prev_hash: prev.hash.clone(),
            hash: String::new(),
        };
        block.hash = compute_block_hash(&block);
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Append a GIVE block after the signature clears the verifier. Returns
    /// the derived consent id alongside the new block.
    pub fn append_give(
        &mut self,
        scopes: &str,
        expiry: i64,
        data_hash: &str,
        subject_pub_key: &str,
        signature: &str,
        verifier: &dyn SignatureVerifier,
        timestamp: String,
    ) -> Result<(String, ConsentBlock), ChainError> {
        let msg_hash = give_message_hash(scopes, expiry, data_hash);
        if !verifier.verify(subject_pub_key, &msg_hash, signature) {
            return Err(ChainError::SignatureRejected { action: "GIVE" });
        }
        let consent_id = derive_consent_id(&msg_hash, subject_pub_key);
        let payload = BlockPayload::give(consent_id.clone(), scopes, expiry, data_hash);
        let block = self.append(
            BlockKind::Give,
            payload,
            subject_pub_key.to_string(),
            signature.to_string(),
            timestamp,
        )?;
        Ok((consent_id, block))
    }

    /// Append a REVOKE block. The grant must exist and still be active, the
    /// revoker must hold the granting key, and the signature must clear the
    /// verifier.
    pub fn append_revoke(
        &mut self,
        consent_id: &str,
        subject_pub_key: &str,
        signature: &str,
        verifier: &dyn SignatureVerifier,
        now: i64,
        timestamp: String,
    ) -> Result<ConsentBlock, ChainError> {
        let grant_key = self
            .latest_give(consent_id)
            .ok_or_else(|| ChainError::NotFound {
                consent_id: consent_id.to_string(),
            })?
            .subject_pub_key
            .clone();
        if !grant_key.is_empty() && !subject_pub_key.is_empty() && grant_key != subject_pub_key {
            return Err(ChainError::SignerMismatch);
        }
        let msg_hash = revoke_message_hash(consent_id);
        if !verifier.verify(subject_pub_key, &msg_hash, signature) {
            return Err(ChainError::SignatureRejected { action: "REVOKE" });
        }
        // Activeness does not depend on the regrant policy, only scope does.
        let status = self.status(consent_id, now, RegrantPolicy::Latest);
        if !status.active {
            return Err(ChainError::Inactive {
                consent_id: consent_id.to_string(),
                reason: status.reason.unwrap_or(InactiveReason::Expired),
            });
        }
        self.append(
            BlockKind::Revoke,
            BlockPayload::revoke(consent_id),
            subject_pub_key.to_string(),
            signature.to_string(),
            timestamp,
        )
    }

    /// Resolve the point-in-time status of a consent. The latest block for
    /// the id wins: a REVOKE makes it revoked, a GIVE makes it active unless
    /// its expiry has passed. An expiry equal to `now` counts as expired.
    pub fn status(&self, consent_id: &str, now: i64, policy: RegrantPolicy) -> ConsentStatus {
        let history = self.history(consent_id);
        let Some(&last) = history.last() else {
            return ConsentStatus::not_found();
        };
        match last.kind {
            BlockKind::Revoke => {
                let last_give = history
                    .iter()
                    .rev()
                    .find(|b| b.kind == BlockKind::Give)
                    .copied();
                ConsentStatus {
                    found: true,
                    active: false,
                    reason: Some(InactiveReason::Revoked),
                    scope: last_give.and_then(|g| g.payload.scopes.clone()),
                    expiry: last_give.and_then(|g| g.payload.expiry),
                    last_block_hash: Some(last.hash.clone()),
                    subject_pub_key: Some(last.subject_pub_key.clone()),
                }
            }
            BlockKind::Give => {
                let expiry = last.payload.expiry;
                let active = expiry.map_or(false, |e| e > now);
                let scope = match policy {
                    RegrantPolicy::Latest => last.payload.scopes.clone(),
                    RegrantPolicy::Union => {
                        let cut = history
                            .iter()
                            .rposition(|b| b.kind == BlockKind::Revoke)
                            .map_or(0, |i| i + 1);
                        Some(union_scopes(&history[cut..]))
                    }
                };
                ConsentStatus {
                    found: true,
                    active,
                    reason: if active {
                        None
                    } else {
                        Some(InactiveReason::Expired)
                    },
                    scope,
                    expiry,
                    last_block_hash: Some(last.hash.clone()),
                    subject_pub_key: Some(last.subject_pub_key.clone()),
                }
            }
            BlockKind::Genesis => ConsentStatus::not_found(),
        }
    }

    /// Walk the whole chain and report the first defect: recomputed hash vs
    /// stored hash, then linkage, then signature. Blocks with empty identity
    /// fields skip the signature check so insecure-mode chains still verify.
    pub fn verify(&self, verifier: &dyn SignatureVerifier) -> ChainCheck {
        for (i, b) in self.blocks.iter().enumerate() {
            let position = i as u64;

            // block hash
            if compute_block_hash(b) != b.hash {
                return ChainCheck::invalid(position, VerifyFailure::HashMismatch);
            }

            // linkage
            if i == 0 {
                if b.prev_hash != GENESIS_PREV_HASH || b.index != 0 {
                    return ChainCheck::invalid(position, VerifyFailure::LinkBroken);
                }
            } else {
                let prev = &self.blocks[i - 1];
                if b.prev_hash != prev.hash || b.index != prev.index + 1 {
                    return ChainCheck::invalid(position, VerifyFailure::LinkBroken);
                }
            }

            // signature
            if b.kind != BlockKind::Genesis
                && !b.subject_pub_key.is_empty()
                && !b.signature.is_empty()
            {
                match signed_message_hash(b) {
                    Some(msg_hash)
                        if verifier.verify(&b.subject_pub_key, &msg_hash, &b.signature) => {}
                    _ => return ChainCheck::invalid(position, VerifyFailure::SignatureInvalid),
                }
            }
        }
        ChainCheck::ok()
    }
}

/// Rebuild the canonical message hash a block's signature covers. `None` for
/// genesis or when a signed block is missing payload fields.
fn signed_message_hash(b: &ConsentBlock) -> Option<String> {
    match b.kind {
        BlockKind::Give => {
            let scopes = b.payload.scopes.as_deref()?;
            let expiry = b.payload.expiry?;
            let data_hash = b.payload.data_hash.as_deref()?;
            Some(give_message_hash(scopes, expiry, data_hash))
        }
        BlockKind::Revoke => Some(revoke_message_hash(b.payload.consent_id.as_deref()?)),
        BlockKind::Genesis => None,
    }
}

/// Union of scope tags across GIVE blocks, deduplicated and sorted.
fn union_scopes(gives: &[&ConsentBlock]) -> String {
    let mut tags: BTreeSet<String> = BTreeSet::new();
    for b in gives {
        if b.kind != BlockKind::Give {
            continue;
        }
        if let Some(s) = &b.payload.scopes {
            for tag in s.split(',') {
                let tag = tag.trim();
                if !tag.is_empty() {
                    tags.insert(tag.to_string());
                }
            }
        }
    }
    tags.into_iter().collect::<Vec<_>>().join(",")
}
