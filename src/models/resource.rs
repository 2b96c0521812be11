// src/models/resource.rs
//! Resource data model.
//!
//! A resource is an immutable, content-addressed binary artifact (a schema,
//! a credential definition, ...) anchored to an identity document. Resources
//! sharing `(collection_id, name, resource_type)` form a *family*, linked into
//! a single version chain through `previous_version_id` / `next_version_id`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{StoreError, ValidationError};
use crate::utils::serialization::canonical_bytes;

/// Identifies a resource family.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub struct FamilyKey {
    pub collection_id: String,
    pub name: String,
    pub resource_type: String,
}

impl FamilyKey {
    pub fn new(
        collection_id: impl Into<String>,
        name: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            collection_id: collection_id.into(),
            name: name.into(),
            resource_type: resource_type.into(),
        }
    }
}

impl fmt::Display for FamilyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.collection_id, self.name, self.resource_type)
    }
}

/// A persisted resource version.
///
/// # Invariants
/// - `checksum` is the SHA-256 of `data`, computed by the registry
/// - within a family, the link fields form one chain ordered by `created`
/// - only the link fields change after creation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: Uuid,
    pub collection_id: String,
    pub name: String,
    pub resource_type: String,
    pub mime_type: String,
    #[serde(with = "crate::utils::serialization::base64_bytes")]
    pub data: Vec<u8>,
    pub checksum: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub previous_version_id: Option<Uuid>,
    #[serde(default)]
    pub next_version_id: Option<Uuid>,
}

impl Resource {
    pub fn family(&self) -> FamilyKey {
        FamilyKey::new(&self.collection_id, &self.name, &self.resource_type)
    }

    pub fn is_head(&self) -> bool {
        self.next_version_id.is_none()
    }

    /// Metadata view of the resource, without the payload.
    pub fn header(&self) -> ResourceHeader {
        ResourceHeader {
            id: self.id,
            collection_id: self.collection_id.clone(),
            name: self.name.clone(),
            resource_type: self.resource_type.clone(),
            mime_type: self.mime_type.clone(),
            checksum: self.checksum.clone(),
            created: self.created,
            previous_version_id: self.previous_version_id,
            next_version_id: self.next_version_id,
        }
    }
}

/// Resource metadata without `data`, as returned by listing queries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceHeader {
    pub id: Uuid,
    pub collection_id: String,
    pub name: String,
    pub resource_type: String,
    pub mime_type: String,
    pub checksum: String,
    pub created: DateTime<Utc>,
    pub previous_version_id: Option<Uuid>,
    pub next_version_id: Option<Uuid>,
}

impl ResourceHeader {
    pub fn family(&self) -> FamilyKey {
        FamilyKey::new(&self.collection_id, &self.name, &self.resource_type)
    }
}

/// The signed part of a create-resource request.
///
/// Signers sign [`CreateResourcePayload::sign_bytes`]; the checksum, creation
/// time and links are decided by the registry and are not part of it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourcePayload {
    pub collection_id: String,
    pub id: String,
    pub name: String,
    pub resource_type: String,
    pub mime_type: String,
    #[serde(with = "crate::utils::serialization::base64_bytes")]
    pub data: Vec<u8>,
}

impl CreateResourcePayload {
    /// Canonical byte serialization that signatures are made over.
    pub fn sign_bytes(&self) -> Result<Vec<u8>, StoreError> {
        canonical_bytes(self)
    }

    /// Checks that every required field is present and the id is a UUID.
    ///
    /// # Errors
    /// Returns the first [`ValidationError`] found, checking fields in
    /// declaration order.
    pub fn validate(&self) -> Result<Uuid, ValidationError> {
        if self.collection_id.is_empty() {
            return Err(ValidationError::MissingField("collection id"));
        }
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("resource id"));
        }
        if self.name.is_empty() {
            return Err(ValidationError::MissingField("resource name"));
        }
        if self.resource_type.is_empty() {
            return Err(ValidationError::MissingField("resource type"));
        }
        if self.data.is_empty() {
            return Err(ValidationError::MissingField("resource data"));
        }
        Uuid::parse_str(&self.id).map_err(|_| ValidationError::InvalidResourceId(self.id.clone()))
    }

    pub fn family(&self) -> FamilyKey {
        FamilyKey::new(&self.collection_id, &self.name, &self.resource_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CreateResourcePayload {
        CreateResourcePayload {
            collection_id: "zABCDEFGHIJKLMNO".to_string(),
            id: "3e7d9f6b-6b4b-4b8e-9c1e-2f1a5b7c9d00".to_string(),
            name: "Test Resource Name".to_string(),
            resource_type: "CL-Schema".to_string(),
            mime_type: "application/json".to_string(),
            data: br#"{"attr":["name","age"]}"#.to_vec(),
        }
    }

    #[test]
    fn test_validate_accepts_complete_payload() {
        let p = payload();
        assert_eq!(p.validate().unwrap().to_string(), p.id);
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let mut p = payload();
        p.collection_id.clear();
        assert_eq!(p.validate(), Err(ValidationError::MissingField("collection id")));

        let mut p = payload();
        p.name.clear();
        assert_eq!(p.validate(), Err(ValidationError::MissingField("resource name")));

        let mut p = payload();
        p.data.clear();
        assert_eq!(p.validate(), Err(ValidationError::MissingField("resource data")));
    }

    #[test]
    fn test_validate_rejects_non_uuid_id() {
        let mut p = payload();
        p.id = "not-a-uuid".to_string();
        assert_eq!(p.validate(), Err(ValidationError::InvalidResourceId("not-a-uuid".to_string())));
    }

    #[test]
    fn test_sign_bytes_depend_on_data() {
        let a = payload();
        let mut b = payload();
        b.data.push(b' ');
        assert_eq!(a.sign_bytes().unwrap(), payload().sign_bytes().unwrap());
        assert_ne!(a.sign_bytes().unwrap(), b.sign_bytes().unwrap());
    }

    #[test]
    fn test_header_drops_data() {
        let r = Resource {
            id: Uuid::new_v4(),
            collection_id: "c".into(),
            name: "n".into(),
            resource_type: "t".into(),
            mime_type: "application/json".into(),
            data: vec![1, 2, 3],
            checksum: "00".into(),
            created: Utc::now(),
            previous_version_id: None,
            next_version_id: None,
        };
        let h = r.header();
        assert_eq!(h.id, r.id);
        assert_eq!(h.family(), r.family());
        assert!(serde_json::to_value(&h).unwrap().get("data").is_none());
    }
}
