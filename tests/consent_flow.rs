//! End-to-end consent flows: grant, gate, score inputs, revoke, proof.

use std::collections::BTreeSet;

use consent_ledger_node::chain::{ConsentChain, RegrantPolicy};
use consent_ledger_node::crypto::{
    generate_keypair, give_message_hash, revoke_message_hash, sign_hex, Ed25519Verifier,
    InsecureVerifier, Keypair,
};
use consent_ledger_node::features::FeatureBuilder;
use consent_ledger_node::model::InactiveReason;
use consent_ledger_node::scope::{self, SignalCategory, SizeLimits};
use consent_ledger_node::signals::{Contact, EcomEvent, Email, RawSignals, SmsMessage};
use consent_ledger_node::storage;

const NOW: i64 = 1_700_000_000;
const WEEK: i64 = 7 * 24 * 3600;
const DATA_HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

fn ts() -> String {
    "2024-01-01T00:00:00Z".to_string()
}

fn give_signed(chain: &mut ConsentChain, kp: &Keypair, scopes: &str, expiry: i64) -> String {
    let msg_hash = give_message_hash(scopes, expiry, DATA_HASH);
    let sig = sign_hex(&kp.signing, &msg_hash);
    let pub_hex = hex::encode(kp.verifying.to_bytes());
    let (id, block) = chain
        .append_give(scopes, expiry, DATA_HASH, &pub_hex, &sig, &Ed25519Verifier, ts())
        .unwrap();
    assert_eq!(block.payload.consent_id.as_deref(), Some(id.as_str()));
    id
}

fn revoke_signed(chain: &mut ConsentChain, kp: &Keypair, consent_id: &str) {
    let msg_hash = revoke_message_hash(consent_id);
    let sig = sign_hex(&kp.signing, &msg_hash);
    let pub_hex = hex::encode(kp.verifying.to_bytes());
    chain
        .append_revoke(consent_id, &pub_hex, &sig, &Ed25519Verifier, NOW, ts())
        .unwrap();
}

fn sms(text: &str) -> SmsMessage {
    SmsMessage {
        text: text.to_string(),
        ts: None,
    }
}

#[test]
fn grant_gate_and_extract_respect_scope() {
    let mut chain = ConsentChain::bootstrap(ts());
    let kp = generate_keypair();
    let id = give_signed(&mut chain, &kp, "sms,email", NOW + WEEK);

    let status = chain.status(&id, NOW, RegrantPolicy::Latest);
    assert!(status.active);
    let permitted = scope::parse_scope(status.scope.as_deref().unwrap());
    assert_eq!(
        permitted,
        [SignalCategory::Sms, SignalCategory::Email]
            .into_iter()
            .collect::<BTreeSet<_>>()
    );

    // Out-of-scope ecom events are refused outright.
    let mut bad = RawSignals::default();
    bad.sms.push(sms("loan reminder"));
    bad.ecom.push(EcomEvent {
        category: "fashion".to_string(),
        amount: Some(10.0),
        ts: None,
    });
    let err = scope::enforce(&bad, &permitted, &SizeLimits::default()).unwrap_err();
    assert!(err.to_string().contains("ecom"));

    // In-scope payload flows through to features for granted scopes only.
    let mut good = RawSignals::default();
    good.sms.push(sms("please repay your loan"));
    good.sms.push(sms("see you tonight"));
    good.emails.push(Email {
        subject: "final notice".to_string(),
        overdue_notice: true,
        ts: None,
    });
    scope::enforce(&good, &permitted, &SizeLimits::default()).unwrap();
    let features = FeatureBuilder::new().build(&good, &permitted);
    assert_eq!(features["sms_count"], 2.0);
    assert_eq!(features["sms_fin_ratio"], 0.5);
    assert_eq!(features["email_overdue_ratio"], 1.0);
    assert!(!features.contains_key("contacts_count"));
    assert!(!features.contains_key("web_visits"));
}

#[test]
fn contacts_only_grant_blocks_everything_else() {
    let mut chain = ConsentChain::bootstrap(ts());
    let kp = generate_keypair();
    let id = give_signed(&mut chain, &kp, "contacts", NOW + WEEK);
    let status = chain.status(&id, NOW, RegrantPolicy::Latest);
    let permitted = scope::parse_scope(status.scope.as_deref().unwrap());

    let mut raw = RawSignals::default();
    raw.contacts.push(Contact {
        name: "Ada".to_string(),
        phone: "+123".to_string(),
    });
    scope::enforce(&raw, &permitted, &SizeLimits::default()).unwrap();
    let features = FeatureBuilder::new().build(&raw, &permitted);
    assert_eq!(features.len(), 1);
    assert_eq!(features["contacts_count"], 1.0);

    raw.sms.push(sms("hi"));
    assert!(scope::enforce(&raw, &permitted, &SizeLimits::default()).is_err());
}

#[test]
fn revoke_then_proof_shows_tamper_evident_history() {
    let mut chain = ConsentChain::bootstrap(ts());
    let kp = generate_keypair();
    let id = give_signed(&mut chain, &kp, "sms", NOW + WEEK);
    revoke_signed(&mut chain, &kp, &id);

    let status = chain.status(&id, NOW, RegrantPolicy::Latest);
    assert!(status.found);
    assert!(!status.active);
    assert_eq!(status.reason, Some(InactiveReason::Revoked));

    let history = chain.blocks_for(&id);
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].prev_hash, history[0].hash);
    assert!(chain.verify(&Ed25519Verifier).valid);
}

#[test]
fn regrant_after_revoke_restores_access() {
    let mut chain = ConsentChain::bootstrap(ts());
    let kp = generate_keypair();
    let id = give_signed(&mut chain, &kp, "sms", NOW + WEEK);
    revoke_signed(&mut chain, &kp, &id);
    assert!(!chain.status(&id, NOW, RegrantPolicy::Latest).active);

    let again = give_signed(&mut chain, &kp, "sms", NOW + WEEK);
    assert_eq!(id, again);
    for policy in [RegrantPolicy::Latest, RegrantPolicy::Union] {
        let status = chain.status(&id, NOW, policy);
        assert!(status.active);
        assert_eq!(status.scope.as_deref(), Some("sms"));
    }
    assert_eq!(chain.blocks_for(&id).len(), 3);
}

#[test]
fn insecure_mode_runs_the_same_flow_unsigned() {
    let mut chain = ConsentChain::bootstrap(ts());
    let (id, block) = chain
        .append_give("web", NOW + WEEK, DATA_HASH, "", "", &InsecureVerifier, ts())
        .unwrap();
    assert!(block.signature.is_empty());
    assert!(chain.status(&id, NOW, RegrantPolicy::Latest).active);

    chain
        .append_revoke(&id, "", "", &InsecureVerifier, NOW, ts())
        .unwrap();
    let status = chain.status(&id, NOW, RegrantPolicy::Latest);
    assert_eq!(status.reason, Some(InactiveReason::Revoked));
    // Unsigned blocks skip the signature leg, hashes and links still count.
    assert!(chain.verify(&Ed25519Verifier).valid);
}

#[test]
fn chain_survives_a_restart_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let kp = generate_keypair();
    let id;
    {
        let mut chain = ConsentChain::bootstrap(ts());
        id = give_signed(&mut chain, &kp, "sms,ecom", NOW + WEEK);
        for block in chain.blocks() {
            storage::save_block(dir.path(), block).unwrap();
        }
    }

    let reloaded = ConsentChain::new(storage::load_blocks(dir.path()).unwrap());
    assert_eq!(reloaded.len(), 2);
    assert!(reloaded.verify(&Ed25519Verifier).valid);
    let status = reloaded.status(&id, NOW, RegrantPolicy::Latest);
    assert!(status.active);
    assert_eq!(status.scope.as_deref(), Some("sms,ecom"));
}
