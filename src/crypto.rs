//! Cryptographic helpers: Ed25519 keys, canonical consent messages, and the
//! pluggable signature verifier.

use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use serde::Serialize;

use crate::model::sha256_hex;

/// Simple in-memory keypair bundle handed out by the wallet endpoint.
pub struct Keypair {
    pub signing: SigningKey,
    pub verifying: VerifyingKey,
}

/// Generate a fresh Ed25519 keypair using the OS RNG.
pub fn generate_keypair() -> Keypair {
    let mut rng = OsRng;
    let signing = SigningKey::generate(&mut rng);
    let verifying = signing.verifying_key();
    Keypair { signing, verifying }
}

/// Sign arbitrary bytes with the provided signing key.
pub fn sign_bytes(signing: &SigningKey, msg: &[u8]) -> Signature {
    signing.sign(msg)
}

/// Verify a message/signature pair using the provided verifying key.
pub fn verify_bytes(verifying: &VerifyingKey, msg: &[u8], sig: &Signature) -> bool {
    verifying.verify(msg, sig).is_ok()
}

/// Sign the ASCII bytes of a hex message hash and return the signature as hex.
/// Subjects sign the hash string itself, not the raw message bytes.
pub fn sign_hex(signing: &SigningKey, msg_hash_hex: &str) -> String {
    hex::encode(sign_bytes(signing, msg_hash_hex.as_bytes()).to_bytes())
}

/// Canonical GIVE message. Field order is fixed; the hash of this JSON is what
/// subjects sign and what the consent id is derived from.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GiveMessage<'a> {
    action: &'static str,
    scopes: &'a str,
    expiry: i64,
    data_hash: &'a str,
}

/// Canonical REVOKE message.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RevokeMessage<'a> {
    action: &'static str,
    consent_id: &'a str,
}

/// SHA-256 hex of the canonical GIVE message.
pub fn give_message_hash(scopes: &str, expiry: i64, data_hash: &str) -> String {
    let msg = GiveMessage {
        action: "GIVE",
        scopes,
        expiry,
        data_hash,
    };
    let bytes = serde_json::to_vec(&msg).unwrap_or_default();
    sha256_hex(&[&bytes])
}

/// SHA-256 hex of the canonical REVOKE message.
pub fn revoke_message_hash(consent_id: &str) -> String {
    let msg = RevokeMessage {
        action: "REVOKE",
        consent_id,
    };
    let bytes = serde_json::to_vec(&msg).unwrap_or_default();
    sha256_hex(&[&bytes])
}

/// Consent id: SHA-256 hex over the GIVE message hash concatenated with the
/// subject public key, both as hex strings. Binds the grant to its signer.
pub fn derive_consent_id(give_msg_hash_hex: &str, subject_pub_key_hex: &str) -> String {
    sha256_hex(&[give_msg_hash_hex.as_bytes(), subject_pub_key_hex.as_bytes()])
}

/// Trust decision for consent writes and chain verification. The production
/// verifier checks Ed25519 signatures; the insecure one accepts everything so
/// demos can run without client-side key handling.
pub trait SignatureVerifier: Send + Sync {
    /// True when `sig_hex` is a valid signature by `pub_key_hex` over the
    /// ASCII bytes of `msg_hash_hex`.
    fn verify(&self, pub_key_hex: &str, msg_hash_hex: &str, sig_hex: &str) -> bool;
}

pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, pub_key_hex: &str, msg_hash_hex: &str, sig_hex: &str) -> bool {
        let Ok(pk_bytes) = hex::decode(pub_key_hex) else {
            return false;
        };
        let Ok(pk_arr) = <[u8; 32]>::try_from(pk_bytes.as_slice()) else {
            return false;
        };
        let Ok(verifying) = VerifyingKey::from_bytes(&pk_arr) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(sig_hex) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&sig_bytes) else {
            return false;
        };
        verify_bytes(&verifying, msg_hash_hex.as_bytes(), &sig)
    }
}

/// Accepts any signature, including empty ones. Selected by `--insecure`.
pub struct InsecureVerifier;

impl SignatureVerifier for InsecureVerifier {
    fn verify(&self, _pub_key_hex: &str, _msg_hash_hex: &str, _sig_hex: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = generate_keypair();
        let msg_hash = give_message_hash("sms", 1_700_000_000, "abc");
        let sig = sign_hex(&kp.signing, &msg_hash);
        let pub_hex = hex::encode(kp.verifying.to_bytes());
        assert!(Ed25519Verifier.verify(&pub_hex, &msg_hash, &sig));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let kp = generate_keypair();
        let other = generate_keypair();
        let msg_hash = revoke_message_hash("some-id");
        let sig = sign_hex(&kp.signing, &msg_hash);
        let other_pub = hex::encode(other.verifying.to_bytes());
        assert!(!Ed25519Verifier.verify(&other_pub, &msg_hash, &sig));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = generate_keypair();
        let msg_hash = give_message_hash("sms", 1_700_000_000, "abc");
        let sig = sign_hex(&kp.signing, &msg_hash);
        let pub_hex = hex::encode(kp.verifying.to_bytes());
        let other_hash = give_message_hash("sms,email", 1_700_000_000, "abc");
        assert!(!Ed25519Verifier.verify(&pub_hex, &other_hash, &sig));
    }

    #[test]
    fn verify_tolerates_malformed_inputs() {
        assert!(!Ed25519Verifier.verify("", "deadbeef", ""));
        assert!(!Ed25519Verifier.verify("zz-not-hex", "deadbeef", "also-not-hex"));
        assert!(!Ed25519Verifier.verify("abcd", "deadbeef", "ef"));
    }

    #[test]
    fn insecure_verifier_accepts_anything() {
        assert!(InsecureVerifier.verify("", "", ""));
        assert!(InsecureVerifier.verify("garbage", "garbage", "garbage"));
    }

    #[test]
    fn consent_id_depends_on_message_and_key() {
        let h1 = give_message_hash("sms", 1, "d");
        let h2 = give_message_hash("email", 1, "d");
        let id_a = derive_consent_id(&h1, "key1");
        assert_eq!(id_a, derive_consent_id(&h1, "key1"));
        assert_ne!(id_a, derive_consent_id(&h1, "key2"));
        assert_ne!(id_a, derive_consent_id(&h2, "key1"));
        assert_eq!(id_a.len(), 64);
    }

    #[test]
    fn message_hashes_are_stable_per_action() {
        assert_ne!(
            give_message_hash("sms", 5, "x"),
            revoke_message_hash("sms")
        );
        assert_eq!(
            revoke_message_hash("id-1"),
            revoke_message_hash("id-1")
        );
    }
}
