//! Tamper-evident consent ledger with scope-gated feature extraction.
//!
//! Subjects grant and revoke consent as signed blocks on an append-only hash
//! chain. Scoring requests carry raw behavioral signals that pass a fail-closed
//! scope gate before features are extracted and sent to an external model.

pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod features;
pub mod model;
pub mod routes;
pub mod scope;
pub mod scorer;
pub mod signals;
pub mod storage;
