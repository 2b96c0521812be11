// src/test_utils.rs
//! Fixtures shared by the unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use uuid::Uuid;

use crate::models::did::{join_did, IdentityDocument};
use crate::models::resource::{CreateResourcePayload, Resource};
use crate::models::verification_method::{SignInfo, VerificationMethod};
use crate::utils::crypto::checksum;

pub const NAMESPACE: &str = "testnet";
pub const METHOD: &str = "cheqd";
pub const SCHEMA_DATA: &str = r#"{"attrNames":["name","age","degree"]}"#;

pub fn genesis_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 6, 1, 12, 0, 0).unwrap()
}

/// A stored resource without links, created `offset` seconds after genesis.
pub fn resource(collection_id: &str, name: &str, resource_type: &str, offset: i64) -> Resource {
    let data = format!("{SCHEMA_DATA}{offset}").into_bytes();
    Resource {
        id: Uuid::new_v4(),
        collection_id: collection_id.to_string(),
        name: name.to_string(),
        resource_type: resource_type.to_string(),
        mime_type: "application/json".to_string(),
        checksum: checksum(&data),
        data,
        created: genesis_time() + Duration::seconds(offset),
        previous_version_id: None,
        next_version_id: None,
    }
}

/// An Ed25519 key registered as a verification method.
pub struct TestKey {
    pub method_id: String,
    pub keypair: Ed25519KeyPair,
}

impl TestKey {
    pub fn generate(method_id: impl Into<String>) -> Self {
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
        Self {
            method_id: method_id.into(),
            keypair: Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap(),
        }
    }

    pub fn public_key_multibase(&self) -> String {
        multibase::encode(multibase::Base::Base58Btc, self.keypair.public_key().as_ref())
    }

    pub fn method(&self, controller: &str) -> VerificationMethod {
        VerificationMethod::ed25519(&self.method_id, controller, self.public_key_multibase())
    }

    pub fn sign(&self, message: &[u8]) -> SignInfo {
        SignInfo::new(&self.method_id, self.keypair.sign(message).as_ref().to_vec())
    }
}

/// A collection's DID document with one authentication key.
pub struct TestIdentity {
    pub collection_id: String,
    pub did: String,
    pub key: TestKey,
}

impl TestIdentity {
    pub fn new() -> Self {
        let collection_id = Uuid::new_v4().simple().to_string();
        let did = join_did(METHOD, NAMESPACE, &collection_id);
        let key = TestKey::generate(format!("{did}#key1"));
        Self { collection_id, did, key }
    }

    pub fn document(&self) -> IdentityDocument {
        IdentityDocument::new(&self.did).with_method(self.key.method(&self.did), true)
    }

    pub fn payload(&self, name: &str, resource_type: &str) -> CreateResourcePayload {
        CreateResourcePayload {
            collection_id: self.collection_id.clone(),
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            mime_type: "application/json".to_string(),
            data: SCHEMA_DATA.as_bytes().to_vec(),
        }
    }

    pub fn sign(&self, payload: &CreateResourcePayload) -> Vec<SignInfo> {
        vec![self.key.sign(&payload.sign_bytes().unwrap())]
    }
}
