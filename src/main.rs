//! Application entrypoint and state wiring.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use consent_ledger_node::chain::ConsentChain;
use consent_ledger_node::config::Config;
use consent_ledger_node::crypto::{Ed25519Verifier, InsecureVerifier, SignatureVerifier};
use consent_ledger_node::features::FeatureBuilder;
use consent_ledger_node::routes::{self, AppState};
use consent_ledger_node::scorer::ScorerClient;
use consent_ledger_node::storage;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let addr = config.addr;

    // 1) load or bootstrap the chain
    storage::ensure_dir(&config.data_dir).expect("create data dir");
    let blocks = storage::load_blocks(&config.data_dir).expect("load blocks");
    let chain = if blocks.is_empty() {
        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .expect("format timestamp");
        let chain = ConsentChain::bootstrap(ts);
        let genesis = &chain.blocks()[0];
        storage::save_block(&config.data_dir, genesis).expect("save genesis block");
        info!(hash = %genesis.hash, "created genesis block");
        chain
    } else {
        info!(blocks = blocks.len(), "loaded chain from disk");
        ConsentChain::new(blocks)
    };

    // 2) signature capability
    let verifier: Arc<dyn SignatureVerifier> = if config.insecure {
        warn!("insecure mode: accepting unsigned consent writes");
        Arc::new(InsecureVerifier)
    } else {
        Arc::new(Ed25519Verifier)
    };

    let check = chain.verify(verifier.as_ref());
    if check.valid {
        info!(length = chain.len(), "chain verified");
    } else {
        warn!(?check, "chain failed verification at startup; serving read-only evidence as-is");
    }

    // 3) scorer client, if configured
    let scorer = match &config.model_base_url {
        Some(url) => {
            match ScorerClient::new(url.clone(), Duration::from_secs(config.model_timeout_secs)) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "scorer client unavailable; scoring endpoints will answer 502");
                    None
                }
            }
        }
        None => None,
    };

    // 4) shared state and router
    let state = AppState {
        chain: Arc::new(RwLock::new(chain)),
        verifier,
        scorer,
        features: Arc::new(FeatureBuilder::new()),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/version", get(routes::version))
        .route("/wallets/new", post(routes::new_wallet))
        .route("/consents/give", post(routes::give_consent))
        .route("/consents/:id/revoke", post(routes::revoke_consent))
        .route("/consents/:id/status", get(routes::consent_status))
        .route("/consents/:id/proof", get(routes::consent_proof))
        .route("/consents/:id/score-from-raw", post(routes::score_from_raw))
        .route("/chain", get(routes::chain_blocks))
        .route("/chain/verify", get(routes::chain_verify))
        .with_state(state);

    // 5) serve
    info!(%addr, "consent ledger node listening");
    axum::serve(
        tokio::net::TcpListener::bind(addr).await.expect("bind addr"),
        app,
    )
    .await
    .expect("server run");
}
