// src/utils/crypto.rs
//! Cryptographic utilities for resource checksums and signature checks.
//!
//! Uses SHA-256 (via `ring`) for resource checksums, `ring` for Ed25519
//! verification and `k256` for secp256k1 (ES256K) verification.

use k256::ecdsa::signature::Verifier as _;
use ring::digest::{digest, SHA256};
use ring::signature::{UnparsedPublicKey, ED25519};
use thiserror::Error;

use crate::models::verification_method::KeyValuePair;

/// Multicodec prefix of an Ed25519 public key.
pub const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

/// Length of a raw Ed25519 public key.
pub const ED25519_KEY_LENGTH: usize = 32;

/// Errors decoding public key material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("multibase: {0}")]
    Multibase(String),

    #[error("base64url: {0}")]
    Base64(String),

    #[error("expected a {expected} byte key, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("publicKeyJwk is missing {0}")]
    MissingMember(&'static str),

    #[error("unsupported key type {kty}/{crv}")]
    Unsupported { kty: String, crv: String },

    #[error("invalid secp256k1 point")]
    InvalidPoint,
}

/// Computes the SHA-256 digest of `data`.
///
/// # Returns
/// Fixed-size 32-byte array containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// Resource checksum: lowercase hex SHA-256 of the payload.
pub fn checksum(data: &[u8]) -> String {
    hash_data(data).iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes a multibase Ed25519 public key.
///
/// Both the raw 32-byte form and the multicodec form (`0xed01` prefix) are
/// accepted.
pub fn decode_ed25519_multibase(encoded: &str) -> Result<Vec<u8>, KeyError> {
    let (_, bytes) = multibase::decode(encoded).map_err(|e| KeyError::Multibase(e.to_string()))?;
    let prefixed = bytes.len() == ED25519_CODEC.len() + ED25519_KEY_LENGTH;
    let key = if prefixed && bytes.starts_with(&ED25519_CODEC) {
        bytes[ED25519_CODEC.len()..].to_vec()
    } else {
        bytes
    };
    if key.len() != ED25519_KEY_LENGTH {
        return Err(KeyError::Length {
            expected: ED25519_KEY_LENGTH,
            actual: key.len(),
        });
    }
    Ok(key)
}

/// Verifies a raw Ed25519 signature.
pub fn verify_ed25519(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    UnparsedPublicKey::new(&ED25519, public_key)
        .verify(message, signature)
        .is_ok()
}

/// Verifies an ES256K signature (64-byte `r || s`, SHA-256 prehash) against a
/// SEC1 encoded secp256k1 key.
pub fn verify_es256k(
    sec1_point: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(sec1_point)
        .map_err(|_| KeyError::InvalidPoint)?;
    let Ok(signature) = k256::ecdsa::Signature::from_slice(signature) else {
        return Ok(false);
    };
    Ok(key.verify(message, &signature).is_ok())
}

/// Looks up a JWK member by name.
pub fn jwk_get<'a>(jwk: &'a [KeyValuePair], key: &str) -> Option<&'a str> {
    jwk.iter().find(|kv| kv.key == key).map(|kv| kv.value.as_str())
}

fn jwk_member<'a>(jwk: &'a [KeyValuePair], key: &'static str) -> Result<&'a str, KeyError> {
    jwk_get(jwk, key).ok_or(KeyError::MissingMember(key))
}

fn decode_b64url(value: &str) -> Result<Vec<u8>, KeyError> {
    base64::decode_config(value, base64::URL_SAFE_NO_PAD)
        .map_err(|e| KeyError::Base64(e.to_string()))
}

/// Verifies a detached signature against a JSON Web Key.
///
/// Supported keys:
/// - `OKP` / `Ed25519` (EdDSA)
/// - `EC` / `secp256k1` (ES256K)
///
/// # Errors
/// [`KeyError::Unsupported`] for any other key type, or a decoding error if the
/// JWK members are malformed. A well-formed key with a bad signature is
/// `Ok(false)`.
pub fn verify_jwk(
    jwk: &[KeyValuePair],
    message: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let kty = jwk_member(jwk, "kty")?;
    let crv = jwk_get(jwk, "crv").unwrap_or_default();

    match (kty, crv) {
        ("OKP", "Ed25519") => {
            let x = decode_b64url(jwk_member(jwk, "x")?)?;
            if x.len() != ED25519_KEY_LENGTH {
                return Err(KeyError::Length {
                    expected: ED25519_KEY_LENGTH,
                    actual: x.len(),
                });
            }
            Ok(verify_ed25519(&x, message, signature))
        }
        ("EC", "secp256k1") => {
            let x = decode_b64url(jwk_member(jwk, "x")?)?;
            let y = decode_b64url(jwk_member(jwk, "y")?)?;
            let mut point = Vec::with_capacity(1 + x.len() + y.len());
            point.push(0x04);
            point.extend_from_slice(&x);
            point.extend_from_slice(&y);
            verify_es256k(&point, message, signature)
        }
        _ => Err(KeyError::Unsupported {
            kty: kty.to_string(),
            crv: crv.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Signer as _;
    use ring::rand::SystemRandom;
    use ring::signature::{Ed25519KeyPair, KeyPair};

    fn ed25519_keypair() -> Ed25519KeyPair {
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
    }

    fn b64url(bytes: &[u8]) -> String {
        base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            checksum(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_decode_multibase_raw_and_multicodec() {
        let raw = [9u8; 32];
        let encoded = multibase::encode(multibase::Base::Base58Btc, raw);
        assert_eq!(decode_ed25519_multibase(&encoded).unwrap(), raw.to_vec());

        let mut prefixed = ED25519_CODEC.to_vec();
        prefixed.extend_from_slice(&raw);
        let encoded = multibase::encode(multibase::Base::Base58Btc, &prefixed);
        assert_eq!(decode_ed25519_multibase(&encoded).unwrap(), raw.to_vec());

        let short = multibase::encode(multibase::Base::Base58Btc, [1u8; 16]);
        assert_eq!(
            decode_ed25519_multibase(&short),
            Err(KeyError::Length { expected: 32, actual: 16 })
        );
    }

    #[test]
    fn test_verify_ed25519() {
        let kp = ed25519_keypair();
        let sig = kp.sign(b"payload");
        assert!(verify_ed25519(kp.public_key().as_ref(), b"payload", sig.as_ref()));
        assert!(!verify_ed25519(kp.public_key().as_ref(), b"tampered", sig.as_ref()));
    }

    #[test]
    fn test_verify_jwk_okp() {
        let kp = ed25519_keypair();
        let jwk = vec![
            KeyValuePair::new("kty", "OKP"),
            KeyValuePair::new("crv", "Ed25519"),
            KeyValuePair::new("x", b64url(kp.public_key().as_ref())),
        ];
        let sig = kp.sign(b"payload");
        assert_eq!(verify_jwk(&jwk, b"payload", sig.as_ref()), Ok(true));
        assert_eq!(verify_jwk(&jwk, b"other", sig.as_ref()), Ok(false));
    }

    #[test]
    fn test_verify_jwk_secp256k1() {
        let sk = k256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap();
        let point = sk.verifying_key().to_encoded_point(false);
        let jwk = vec![
            KeyValuePair::new("kty", "EC"),
            KeyValuePair::new("crv", "secp256k1"),
            KeyValuePair::new("x", b64url(&point.as_bytes()[1..33])),
            KeyValuePair::new("y", b64url(&point.as_bytes()[33..65])),
        ];
        let sig: k256::ecdsa::Signature = sk.sign(b"payload");
        assert_eq!(verify_jwk(&jwk, b"payload", &sig.to_bytes()), Ok(true));
        assert_eq!(verify_jwk(&jwk, b"payload", &[0u8; 64]), Ok(false));
    }

    #[test]
    fn test_verify_jwk_rejects_unsupported_keys() {
        let jwk = vec![KeyValuePair::new("kty", "RSA"), KeyValuePair::new("n", "AQAB")];
        assert!(matches!(verify_jwk(&jwk, b"m", b"s"), Err(KeyError::Unsupported { .. })));
    }
}
