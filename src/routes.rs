//! HTTP routes for consent grants, proofs, chain inspection, and scoring.

use std::sync::{Arc, RwLock};

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{error, info};

use crate::chain::{ChainError, ConsentChain};
use crate::config::Config;
use crate::crypto::{generate_keypair, SignatureVerifier};
use crate::error::ApiError;
use crate::features::{FeatureBuilder, FeatureMap};
use crate::model::{ChainCheck, ConsentBlock, ConsentStatus, InactiveReason};
use crate::scope;
use crate::scorer::{ScoreVerdict, ScorerClient, ScorerError};
use crate::signals::RawSignals;
use crate::storage;

/// Shared server state. The chain sits behind a `RwLock` so status and proof
/// reads run concurrently while appends serialize.
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<RwLock<ConsentChain>>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub scorer: Option<Arc<ScorerClient>>,
    pub features: Arc<FeatureBuilder>,
    pub config: Arc<Config>,
}

fn now_rfc3339() -> Result<String, ApiError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|_| ApiError::internal("time format error"))
}

fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn persist(state: &AppState, block: &ConsentBlock) -> Result<(), ApiError> {
    if let Err(e) = storage::save_block(&state.config.data_dir, block) {
        error!(index = block.index, error = %e, "failed to save block");
        return Err(ApiError::internal("persist failed"));
    }
    Ok(())
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GiveRequest {
    pub scopes: Option<String>,
    pub expiry: Option<i64>,
    pub data_hash: Option<String>,
    pub subject_pub_key: Option<String>,
    pub signature: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResponse {
    pub ok: bool,
    pub consent_id: String,
    pub block: ConsentBlock,
    pub chain_check: ChainCheck,
}

/// POST /consents/give
pub async fn give_consent(
    State(state): State<AppState>,
    Json(req): Json<GiveRequest>,
) -> Result<Json<AppendResponse>, ApiError> {
    // 1) Required grant fields
    let scopes = match req.scopes {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Err(ApiError::bad_request("scopes, expiry and dataHash are required")),
    };
    let data_hash = match req.data_hash {
        Some(h) if !h.trim().is_empty() => h,
        _ => return Err(ApiError::bad_request("scopes, expiry and dataHash are required")),
    };
    let Some(expiry) = req.expiry else {
        return Err(ApiError::bad_request("scopes, expiry and dataHash are required"));
    };

    // 2) Identity fields; optional only in insecure mode
    let subject_pub_key = req.subject_pub_key.unwrap_or_default();
    let signature = req.signature.unwrap_or_default();
    if !state.config.insecure && (subject_pub_key.is_empty() || signature.is_empty()) {
        return Err(ApiError::bad_request(
            "subjectPubKey and signature are required",
        ));
    }

    // 3) Verify, derive the consent id, append
    let ts = now_rfc3339()?;
    let mut guard = state.chain.write().unwrap();
    let (consent_id, block) = guard.append_give(
        &scopes,
        expiry,
        &data_hash,
        &subject_pub_key,
        &signature,
        state.verifier.as_ref(),
        ts,
    )?;
    let chain_check = guard.verify(state.verifier.as_ref());
    drop(guard);

    // 4) Persist
    persist(&state, &block)?;
    info!(consent_id = %consent_id, index = block.index, "appended GIVE block");

    Ok(Json(AppendResponse {
        ok: true,
        consent_id,
        block,
        chain_check,
    }))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RevokeRequest {
    pub subject_pub_key: Option<String>,
    pub signature: Option<String>,
}

/// POST /consents/:id/revoke
pub async fn revoke_consent(
    State(state): State<AppState>,
    Path(consent_id): Path<String>,
    body: Option<Json<RevokeRequest>>,
) -> Result<Json<AppendResponse>, ApiError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let mut subject_pub_key = req.subject_pub_key.unwrap_or_default();
    let signature = req.signature.unwrap_or_default();

    // 1) Identity fields; optional only in insecure mode
    if !state.config.insecure && (subject_pub_key.is_empty() || signature.is_empty()) {
        return Err(ApiError::bad_request(
            "subjectPubKey and signature are required",
        ));
    }

    let ts = now_rfc3339()?;
    let now = now_epoch();
    let mut guard = state.chain.write().unwrap();

    // 2) Insecure revokes inherit the granting key so the block stays
    //    attributable to its subject
    if state.config.insecure && subject_pub_key.is_empty() {
        if let Some(grant) = guard.latest_give(&consent_id) {
            subject_pub_key = grant.subject_pub_key.clone();
        }
    }

    // 3) Append after active/signer/signature checks
    let block = guard.append_revoke(
        &consent_id,
        &subject_pub_key,
        &signature,
        state.verifier.as_ref(),
        now,
        ts,
    )?;
    let chain_check = guard.verify(state.verifier.as_ref());
    drop(guard);

    // 4) Persist
    persist(&state, &block)?;
    info!(consent_id = %consent_id, index = block.index, "appended REVOKE block");

    Ok(Json(AppendResponse {
        ok: true,
        consent_id,
        block,
        chain_check,
    }))
}

/// GET /consents/:id/status
pub async fn consent_status(
    State(state): State<AppState>,
    Path(consent_id): Path<String>,
) -> Json<ConsentStatus> {
    let now = now_epoch();
    let guard = state.chain.read().unwrap();
    Json(guard.status(&consent_id, now, state.config.regrant_policy))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResponse {
    pub ok: bool,
    pub consent_id: String,
    pub blocks: Vec<ConsentBlock>,
    pub chain_check: ChainCheck,
}

/// GET /consents/:id/proof — the consent's blocks plus a full-chain check, so
/// a verifier can tell whether the history it sees sits on an intact chain.
pub async fn consent_proof(
    State(state): State<AppState>,
    Path(consent_id): Path<String>,
) -> Result<Json<ProofResponse>, ApiError> {
    let guard = state.chain.read().unwrap();
    let blocks = guard.blocks_for(&consent_id);
    if blocks.is_empty() {
        return Err(ApiError::not_found("consentId not found"));
    }
    let chain_check = guard.verify(state.verifier.as_ref());
    Ok(Json(ProofResponse {
        ok: true,
        consent_id,
        blocks,
        chain_check,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreFromRawResponse {
    pub ok: bool,
    pub consent_id: String,
    pub features: FeatureMap,
    #[serde(flatten)]
    pub verdict: ScoreVerdict,
}

/// POST /consents/:id/score-from-raw
pub async fn score_from_raw(
    State(state): State<AppState>,
    Path(consent_id): Path<String>,
    Json(raw): Json<RawSignals>,
) -> Result<Json<ScoreFromRawResponse>, ApiError> {
    // 1) Consent must exist and be active right now
    let now = now_epoch();
    let status = {
        let guard = state.chain.read().unwrap();
        guard.status(&consent_id, now, state.config.regrant_policy)
    };
    if !status.found {
        return Err(ApiError::not_found("consentId not found"));
    }
    if !status.active {
        return Err(ChainError::Inactive {
            consent_id,
            reason: status.reason.unwrap_or(InactiveReason::Expired),
        }
        .into());
    }

    // 2) Gate the raw payload against the granted scope
    let permitted = scope::parse_scope(status.scope.as_deref().unwrap_or(""));
    let limits = state.config.size_limits();
    scope::enforce(&raw, &permitted, &limits)?;

    // 3) Extract features for granted scopes only
    let features = state.features.build(&raw, &permitted);

    // 4) Score through the external model
    let scorer = state.scorer.as_ref().ok_or(ScorerError::NotConfigured)?;
    let verdict = scorer.score(&features).await?;
    info!(
        consent_id = %consent_id,
        features = features.len(),
        decision = %verdict.decision,
        "scored raw signals"
    );

    Ok(Json(ScoreFromRawResponse {
        ok: true,
        consent_id,
        features,
        verdict,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResponse {
    pub length: usize,
    pub tip: Option<ConsentBlock>,
    pub blocks: Vec<ConsentBlock>,
}

/// GET /chain
pub async fn chain_blocks(State(state): State<AppState>) -> Json<ChainResponse> {
    let guard = state.chain.read().unwrap();
    Json(ChainResponse {
        length: guard.len(),
        tip: guard.tip().cloned(),
        blocks: guard.blocks().to_vec(),
    })
}

/// GET /chain/verify
pub async fn chain_verify(State(state): State<AppState>) -> Json<ChainCheck> {
    let guard = state.chain.read().unwrap();
    Json(guard.verify(state.verifier.as_ref()))
}

/// GET /health — liveness plus the current integrity verdict.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub chain_length: usize,
    pub valid: bool,
    pub detail: ChainCheck,
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    let guard = state.chain.read().unwrap();
    let detail = guard.verify(state.verifier.as_ref());
    Json(Health {
        status: "ok",
        chain_length: guard.len(),
        valid: detail.valid,
        detail,
    })
}

/// POST /wallets/new — demo keypair generation; nothing is stored server-side.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub private_key: String,
    pub public_key: String,
}

pub async fn new_wallet() -> Json<WalletResponse> {
    let kp = generate_keypair();
    Json(WalletResponse {
        private_key: hex::encode(kp.signing.to_bytes()),
        public_key: hex::encode(kp.verifying.to_bytes()),
    })
}

/// GET /version
#[derive(Serialize)]
pub struct Version {
    pub version: &'static str,
    pub git_sha: Option<&'static str>,
}

pub async fn version() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
        git_sha: option_env!("GIT_SHA"),
    })
}
