//! Secure payload codec.
//!
//! Bundles travel between sites encrypted with AES-GCM under a per-transfer key and a fixed
//! associated-data constant. The ciphertext layout is:
//!
//! ```text
//! nonce (12 bytes) || ciphertext || tag (16 bytes)
//! ```
//!
//! The key length selects the cipher: 16 bytes for AES-128-GCM, 32 bytes for AES-256-GCM.
//!
//! ## Fault collapsing
//!
//! Every encryption failure surfaces as [`TransferError::Encryption`] and every decryption
//! failure as [`TransferError::Decryption`]. The underlying cause (bad key length, short input,
//! tag mismatch, non-bundle plaintext) is logged locally and never returned, so the peer site
//! gets nothing to build an oracle from.
//!
//! ## Pseudonym redaction
//!
//! Validation-error bundles returned to the originating site are rewritten on their serialized
//! form before encryption: the receiving site's pseudonym becomes a placeholder and the
//! receiving site's naming system becomes the originating site's.

use crate::constants::{AES_GCM_NONCE_LEN, AES_GCM_TAG_LEN, RETURN_KEY_LEN};
use crate::{TransferError, TransferResult};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use fhir::Bundle;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Per-transfer symmetric key.
///
/// Held only in process memory and wiped on drop. The length is not validated on construction:
/// a malformed key is reported by the codec as an opaque crypto fault.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ReturnKey(Vec<u8>);

impl ReturnKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Generate a fresh AES-256 key from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; RETURN_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Decode a standard base64 key.
    pub fn from_base64(encoded: &str) -> TransferResult<Self> {
        BASE64
            .decode(encoded.trim())
            .map(Self)
            .map_err(|e| TransferError::InvalidConfig(format!("key is not valid base64: {e}")))
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ReturnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReturnKey({} bytes)", self.0.len())
    }
}

/// Internal cause of a crypto fault; only ever logged.
#[derive(Debug)]
enum CipherFault {
    KeyLength(usize),
    InputTooShort(usize),
    Serialization(fhir::FhirError),
    EmptyPseudonym,
    Primitive,
    PlaintextNotBundle(fhir::FhirError),
}

impl fmt::Display for CipherFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherFault::KeyLength(len) => {
                write!(f, "unsupported key length {len} (expected 16 or 32 bytes)")
            }
            CipherFault::InputTooShort(len) => write!(f, "ciphertext too short ({len} bytes)"),
            CipherFault::Serialization(e) => write!(f, "bundle serialization failed: {e}"),
            CipherFault::EmptyPseudonym => f.write_str("pseudonym to redact is empty"),
            CipherFault::Primitive => f.write_str("AEAD primitive rejected the input"),
            CipherFault::PlaintextNotBundle(e) => write!(f, "plaintext is not a bundle: {e}"),
        }
    }
}

enum Cipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl Cipher {
    fn for_key(key: &ReturnKey) -> Result<Self, CipherFault> {
        let bytes = key.as_bytes();
        let invalid = |_| CipherFault::KeyLength(bytes.len());
        match bytes.len() {
            16 => Aes128Gcm::new_from_slice(bytes)
                .map(|c| Cipher::Aes128(Box::new(c)))
                .map_err(invalid),
            32 => Aes256Gcm::new_from_slice(bytes)
                .map(|c| Cipher::Aes256(Box::new(c)))
                .map_err(invalid),
            other => Err(CipherFault::KeyLength(other)),
        }
    }

    fn seal(&self, nonce: &[u8], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, CipherFault> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload { msg, aad };
        match self {
            Cipher::Aes128(c) => c.encrypt(nonce, payload),
            Cipher::Aes256(c) => c.encrypt(nonce, payload),
        }
        .map_err(|_| CipherFault::Primitive)
    }

    fn open(&self, nonce: &[u8], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, CipherFault> {
        let nonce = Nonce::from_slice(nonce);
        let payload = Payload { msg, aad };
        match self {
            Cipher::Aes128(c) => c.decrypt(nonce, payload),
            Cipher::Aes256(c) => c.decrypt(nonce, payload),
        }
        .map_err(|_| CipherFault::Primitive)
    }
}

/// Payload codec operations.
///
/// This is a zero-sized type used for namespacing; it holds no key material between calls.
pub struct PayloadCodec;

impl PayloadCodec {
    /// Serialize `bundle` canonically and encrypt it.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Encryption`] for any failure.
    pub fn encrypt(bundle: &Bundle, aad: &[u8], key: &ReturnKey) -> TransferResult<Vec<u8>> {
        bundle
            .to_canonical_bytes()
            .map_err(CipherFault::Serialization)
            .and_then(|plaintext| seal(&plaintext, aad, key))
            .map_err(encryption_failed)
    }

    /// Encrypt a validation-error bundle for return to the originating site.
    ///
    /// On the serialized bundle, every occurrence of `pseudonym` is replaced with
    /// `placeholder`, then every occurrence of `own_system` with `peer_system`. Both
    /// replacements work on the JSON-escaped forms of their inputs, so values containing
    /// characters JSON escapes are still found.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Encryption`] for any failure, including an empty pseudonym.
    pub fn encrypt_with_pseudonym_redaction(
        bundle: &Bundle,
        redaction: &Redaction<'_>,
        aad: &[u8],
        key: &ReturnKey,
    ) -> TransferResult<Vec<u8>> {
        redact(bundle, redaction)
            .and_then(|plaintext| seal(plaintext.as_bytes(), aad, key))
            .map_err(encryption_failed)
    }

    /// Authenticate and decrypt a ciphertext produced by [`PayloadCodec::encrypt`].
    ///
    /// No plaintext is returned unless the tag verifies.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Decryption`] for any failure.
    pub fn decrypt(ciphertext: &[u8], aad: &[u8], key: &ReturnKey) -> TransferResult<Bundle> {
        open(ciphertext, aad, key)
            .and_then(|plaintext| {
                Bundle::from_bytes(&plaintext).map_err(CipherFault::PlaintextNotBundle)
            })
            .map_err(|fault| {
                tracing::warn!("unable to decrypt bundle: {fault}");
                TransferError::Decryption
            })
    }
}

/// Inputs of the pseudonym substitution applied before returning a bundle.
#[derive(Clone, Copy, Debug)]
pub struct Redaction<'a> {
    /// The receiving site's pseudonym for the patient.
    pub pseudonym: &'a str,
    /// Placeholder written in place of the pseudonym.
    pub placeholder: &'a str,
    /// The receiving site's pseudonym naming system.
    pub own_system: &'a str,
    /// The originating site's pseudonym naming system.
    pub peer_system: &'a str,
}

fn encryption_failed(fault: CipherFault) -> TransferError {
    tracing::warn!("unable to encrypt bundle: {fault}");
    TransferError::Encryption
}

/// JSON-escaped body of `value` (without the surrounding quotes).
fn json_escaped(value: &str) -> Result<String, CipherFault> {
    let quoted = serde_json::to_string(value)
        .map_err(|e| CipherFault::Serialization(fhir::FhirError::InvalidJson(e)))?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

fn redact(bundle: &Bundle, redaction: &Redaction<'_>) -> Result<String, CipherFault> {
    if redaction.pseudonym.is_empty() {
        return Err(CipherFault::EmptyPseudonym);
    }

    let serialized = bundle
        .to_canonical_string()
        .map_err(CipherFault::Serialization)?;

    let redacted = serialized
        .replace(
            &json_escaped(redaction.pseudonym)?,
            &json_escaped(redaction.placeholder)?,
        )
        .replace(
            &json_escaped(redaction.own_system)?,
            &json_escaped(redaction.peer_system)?,
        );

    Ok(redacted)
}

fn seal(plaintext: &[u8], aad: &[u8], key: &ReturnKey) -> Result<Vec<u8>, CipherFault> {
    let cipher = Cipher::for_key(key)?;

    let mut nonce = [0u8; AES_GCM_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher.seal(&nonce, plaintext, aad)?;

    let mut out = Vec::with_capacity(AES_GCM_NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn open(ciphertext: &[u8], aad: &[u8], key: &ReturnKey) -> Result<Vec<u8>, CipherFault> {
    let cipher = Cipher::for_key(key)?;

    if ciphertext.len() < AES_GCM_NONCE_LEN + AES_GCM_TAG_LEN {
        return Err(CipherFault::InputTooShort(ciphertext.len()));
    }

    let (nonce, sealed) = ciphertext.split_at(AES_GCM_NONCE_LEN);
    cipher.open(nonce, sealed, aad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        NAMING_SYSTEM_CRR_PSEUDONYM, NAMING_SYSTEM_DIC_PSEUDONYM, PSEUDONYM_PLACEHOLDER,
        RETURN_AAD,
    };
    use serde_json::json;

    fn sample_bundle() -> Bundle {
        let mut bundle = Bundle::new("transaction");
        bundle.push_resource(
            Some("urn:uuid:p".into()),
            json!({
                "resourceType": "Patient",
                "identifier": [{"system": NAMING_SYSTEM_DIC_PSEUDONYM, "value": "PSN-7"}]
            }),
        );
        bundle.push_resource(
            Some("urn:uuid:o".into()),
            json!({
                "resourceType": "Observation",
                "subject": {"identifier": {"system": NAMING_SYSTEM_DIC_PSEUDONYM, "value": "PSN-7"}},
                "status": "final"
            }),
        );
        bundle
    }

    fn redaction() -> Redaction<'static> {
        Redaction {
            pseudonym: "PSN-7",
            placeholder: PSEUDONYM_PLACEHOLDER,
            own_system: NAMING_SYSTEM_DIC_PSEUDONYM,
            peer_system: NAMING_SYSTEM_CRR_PSEUDONYM,
        }
    }

    #[test]
    fn round_trips_with_aes_256_and_aes_128() {
        let bundle = sample_bundle();
        for key in [ReturnKey::generate(), ReturnKey::from_bytes(vec![7u8; 16])] {
            let ciphertext = PayloadCodec::encrypt(&bundle, RETURN_AAD, &key).expect("encrypt");
            let decrypted = PayloadCodec::decrypt(&ciphertext, RETURN_AAD, &key).expect("decrypt");
            assert_eq!(decrypted, bundle);
        }
    }

    #[test]
    fn ciphertext_has_nonce_and_tag_overhead() {
        let bundle = sample_bundle();
        let key = ReturnKey::generate();
        let plaintext_len = bundle.to_canonical_bytes().expect("render").len();
        let ciphertext = PayloadCodec::encrypt(&bundle, RETURN_AAD, &key).expect("encrypt");
        assert_eq!(
            ciphertext.len(),
            plaintext_len + AES_GCM_NONCE_LEN + AES_GCM_TAG_LEN
        );
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let bundle = sample_bundle();
        let key = ReturnKey::generate();
        let a = PayloadCodec::encrypt(&bundle, RETURN_AAD, &key).expect("encrypt");
        let b = PayloadCodec::encrypt(&bundle, RETURN_AAD, &key).expect("encrypt");
        assert_ne!(a[..AES_GCM_NONCE_LEN], b[..AES_GCM_NONCE_LEN]);
    }

    #[test]
    fn any_flipped_bit_is_rejected() {
        let bundle = sample_bundle();
        let key = ReturnKey::generate();
        let ciphertext = PayloadCodec::encrypt(&bundle, RETURN_AAD, &key).expect("encrypt");

        for index in [0, AES_GCM_NONCE_LEN, ciphertext.len() / 2, ciphertext.len() - 1] {
            let mut tampered = ciphertext.clone();
            tampered[index] ^= 0x01;
            let err = PayloadCodec::decrypt(&tampered, RETURN_AAD, &key)
                .expect_err("tampered ciphertext must not decrypt");
            assert!(matches!(err, TransferError::Decryption));
        }
    }

    #[test]
    fn wrong_aad_or_key_is_rejected() {
        let bundle = sample_bundle();
        let key = ReturnKey::generate();
        let ciphertext = PayloadCodec::encrypt(&bundle, RETURN_AAD, &key).expect("encrypt");

        let wrong_aad = PayloadCodec::decrypt(&ciphertext, b"other context", &key);
        assert!(matches!(wrong_aad, Err(TransferError::Decryption)));

        let wrong_key = PayloadCodec::decrypt(&ciphertext, RETURN_AAD, &ReturnKey::generate());
        assert!(matches!(wrong_key, Err(TransferError::Decryption)));
    }

    #[test]
    fn malformed_keys_collapse_to_opaque_faults() {
        let bundle = sample_bundle();
        let bad_key = ReturnKey::from_bytes(vec![1u8; 20]);

        let err = PayloadCodec::encrypt(&bundle, RETURN_AAD, &bad_key).expect_err("bad key");
        assert!(matches!(err, TransferError::Encryption));

        let err = PayloadCodec::decrypt(&[0u8; 64], RETURN_AAD, &bad_key).expect_err("bad key");
        assert!(matches!(err, TransferError::Decryption));
    }

    #[test]
    fn short_ciphertext_is_rejected() {
        let key = ReturnKey::generate();
        let err = PayloadCodec::decrypt(&[0u8; 10], RETURN_AAD, &key).expect_err("too short");
        assert!(matches!(err, TransferError::Decryption));
    }

    #[test]
    fn redaction_replaces_pseudonym_and_naming_system() {
        let bundle = sample_bundle();
        let key = ReturnKey::generate();

        let ciphertext =
            PayloadCodec::encrypt_with_pseudonym_redaction(&bundle, &redaction(), RETURN_AAD, &key)
                .expect("encrypt");
        let decrypted = PayloadCodec::decrypt(&ciphertext, RETURN_AAD, &key).expect("decrypt");
        let text = decrypted.to_canonical_string().expect("render");

        assert!(!text.contains("PSN-7"));
        assert!(!text.contains(NAMING_SYSTEM_DIC_PSEUDONYM));
        assert_eq!(text.matches(PSEUDONYM_PLACEHOLDER).count(), 2);
        assert_eq!(text.matches(NAMING_SYSTEM_CRR_PSEUDONYM).count(), 2);
    }

    #[test]
    fn redaction_handles_values_json_escapes() {
        let mut bundle = Bundle::new("transaction");
        bundle.push_resource(None, json!({"resourceType": "Basic", "text": "psn \"q\" 1"}));
        let key = ReturnKey::generate();
        let redaction = Redaction {
            pseudonym: "psn \"q\" 1",
            ..redaction()
        };

        let ciphertext =
            PayloadCodec::encrypt_with_pseudonym_redaction(&bundle, &redaction, RETURN_AAD, &key)
                .expect("encrypt");
        let decrypted = PayloadCodec::decrypt(&ciphertext, RETURN_AAD, &key).expect("decrypt");
        let text = decrypted.to_canonical_string().expect("render");

        assert!(text.contains(PSEUDONYM_PLACEHOLDER));
        assert!(!text.contains("q\\\""));
    }

    #[test]
    fn empty_pseudonym_is_refused() {
        let key = ReturnKey::generate();
        let redaction = Redaction {
            pseudonym: "",
            ..redaction()
        };
        let err = PayloadCodec::encrypt_with_pseudonym_redaction(
            &sample_bundle(),
            &redaction,
            RETURN_AAD,
            &key,
        )
        .expect_err("empty pseudonym");
        assert!(matches!(err, TransferError::Encryption));
    }

    #[test]
    fn base64_round_trip_and_redacted_debug() {
        let key = ReturnKey::generate();
        let decoded = ReturnKey::from_base64(&key.to_base64()).expect("decode");
        assert_eq!(decoded, key);
        assert_eq!(format!("{key:?}"), "ReturnKey(32 bytes)");
        assert!(ReturnKey::from_base64("not base64!").is_err());
    }
}
