// src/models/verification_method.rs
//! Verification method data model.
//!
//! A verification method is a named public key scoped to an identity
//! document. The key material is a closed tagged variant selected by the
//! method `type`, so a method can never carry both a multibase key and a JWK,
//! and every new signature scheme is an explicit, exhaustively matched case.

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::utils::crypto::{decode_ed25519_multibase, jwk_get};

/// Method type name for multibase encoded Ed25519 keys.
pub const ED25519_VERIFICATION_KEY_2020: &str = "Ed25519VerificationKey2020";

/// Method type name for JSON Web Keys.
pub const JSON_WEB_KEY_2020: &str = "JsonWebKey2020";

/// A single JWK member, kept as an ordered key/value list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Public key material of a verification method, tagged by method type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum VerificationMaterial {
    /// Ed25519 public key, multibase encoded.
    Ed25519VerificationKey2020 {
        #[serde(rename = "publicKeyMultibase")]
        public_key_multibase: String,
    },

    /// Public key as a JSON Web Key.
    JsonWebKey2020 {
        #[serde(rename = "publicKeyJwk")]
        public_key_jwk: Vec<KeyValuePair>,
    },
}

impl VerificationMaterial {
    /// The method `type` string this material is serialized under.
    pub fn type_name(&self) -> &'static str {
        match self {
            VerificationMaterial::Ed25519VerificationKey2020 { .. } => {
                ED25519_VERIFICATION_KEY_2020
            }
            VerificationMaterial::JsonWebKey2020 { .. } => JSON_WEB_KEY_2020,
        }
    }
}

/// A public key record on an identity document.
///
/// # Fields
/// - `id`: DID URL of the method, e.g. `did:cheqd:testnet:abc#key1`
/// - `controller`: identity that controls the key
/// - `material`: type tag plus `publicKeyMultibase` or `publicKeyJwk`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerificationMethod {
    pub id: String,
    pub controller: String,
    #[serde(flatten)]
    pub material: VerificationMaterial,
}

impl VerificationMethod {
    pub fn ed25519(
        id: impl Into<String>,
        controller: impl Into<String>,
        public_key_multibase: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            controller: controller.into(),
            material: VerificationMaterial::Ed25519VerificationKey2020 {
                public_key_multibase: public_key_multibase.into(),
            },
        }
    }

    pub fn jwk(
        id: impl Into<String>,
        controller: impl Into<String>,
        public_key_jwk: Vec<KeyValuePair>,
    ) -> Self {
        Self {
            id: id.into(),
            controller: controller.into(),
            material: VerificationMaterial::JsonWebKey2020 { public_key_jwk },
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.material.type_name()
    }

    /// Checks the structural invariants of the method.
    ///
    /// # Errors
    /// Returns [`ValidationError::InvalidVerificationMethod`] if the id or
    /// controller is empty, the multibase key does not decode to an Ed25519
    /// key, or the JWK has no `kty`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidVerificationMethod {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() {
            return Err(invalid("id is required"));
        }
        if self.controller.is_empty() {
            return Err(invalid("controller is required"));
        }

        match &self.material {
            VerificationMaterial::Ed25519VerificationKey2020 { public_key_multibase } => {
                decode_ed25519_multibase(public_key_multibase)
                    .map(|_| ())
                    .map_err(|e| invalid(&e.to_string()))
            }
            VerificationMaterial::JsonWebKey2020 { public_key_jwk } => {
                if jwk_get(public_key_jwk, "kty").is_none() {
                    return Err(invalid("publicKeyJwk must contain kty"));
                }
                Ok(())
            }
        }
    }
}

/// Finds a verification method by id.
pub fn find_verification_method<'a>(
    vms: &'a [VerificationMethod],
    id: &str,
) -> Option<&'a VerificationMethod> {
    vms.iter().find(|vm| vm.id == id)
}

/// A signature over a payload, naming the verification method that made it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignInfo {
    pub verification_method_id: String,
    #[serde(with = "crate::utils::serialization::base64_bytes")]
    pub signature: Vec<u8>,
}

impl SignInfo {
    pub fn new(verification_method_id: impl Into<String>, signature: Vec<u8>) -> Self {
        Self {
            verification_method_id: verification_method_id.into(),
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ed25519_method_serializes_with_type_tag() {
        let key = multibase::encode(multibase::Base::Base58Btc, [7u8; 32]);
        let did = "did:cheqd:testnet:abc";
        let vm = VerificationMethod::ed25519(format!("{did}#key1"), did, key.clone());

        let json = serde_json::to_value(&vm).unwrap();
        assert_eq!(json["type"], "Ed25519VerificationKey2020");
        assert_eq!(json["publicKeyMultibase"], key);
        assert!(json.get("publicKeyJwk").is_none());

        let back: VerificationMethod = serde_json::from_value(json).unwrap();
        assert_eq!(back, vm);
    }

    #[test]
    fn test_unknown_method_type_is_rejected() {
        let json = serde_json::json!({
            "id": "did:cheqd:testnet:abc#key1",
            "controller": "did:cheqd:testnet:abc",
            "type": "RsaVerificationKey2018",
            "publicKeyPem": "-----BEGIN PUBLIC KEY-----",
        });
        assert!(serde_json::from_value::<VerificationMethod>(json).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_multibase() {
        let vm = VerificationMethod::ed25519(
            "did:cheqd:testnet:abc#key1",
            "did:cheqd:testnet:abc",
            "not-multibase",
        );
        assert!(matches!(vm.validate(), Err(ValidationError::InvalidVerificationMethod { .. })));
    }

    #[test]
    fn test_validate_requires_kty() {
        let vm = VerificationMethod::jwk(
            "did:cheqd:testnet:abc#key2",
            "did:cheqd:testnet:abc",
            vec![KeyValuePair::new("crv", "Ed25519")],
        );
        assert!(vm.validate().is_err());

        let vm = VerificationMethod::jwk(
            "did:cheqd:testnet:abc#key2",
            "did:cheqd:testnet:abc",
            vec![KeyValuePair::new("kty", "OKP"), KeyValuePair::new("crv", "Ed25519")],
        );
        assert!(vm.validate().is_ok());
    }

    #[test]
    fn test_find_verification_method() {
        let key = multibase::encode(multibase::Base::Base58Btc, [1u8; 32]);
        let vms = vec![
            VerificationMethod::ed25519("did:x:a#1", "did:x:a", key.clone()),
            VerificationMethod::ed25519("did:x:a#2", "did:x:a", key),
        ];
        let found = find_verification_method(&vms, "did:x:a#2").map(|vm| vm.id.as_str());
        assert_eq!(found, Some("did:x:a#2"));
        assert!(find_verification_method(&vms, "did:x:a#3").is_none());
    }
}
