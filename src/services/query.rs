// src/services/query.rs
//! Argument-checked entry points for transaction and query clients.
//!
//! Clients address resources by collection id and plain strings. This layer
//! rejects missing arguments and malformed ids before touching state, maps
//! collections to their owner documents and hands the rest to the
//! [`ResourceManager`].

use log::debug;
use uuid::Uuid;

use crate::errors::{RegistryError, ValidationError};
use crate::models::resource::{CreateResourcePayload, FamilyKey, Resource, ResourceHeader};
use crate::models::verification_method::SignInfo;
use crate::services::resource_manager::ResourceManager;
use crate::storage::{IdentityStore, LogicalClock, RegistryStore};

fn required<'v>(value: &'v str, field: &'static str) -> Result<&'v str, ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(value)
    }
}

/// Client-facing registry surface.
pub struct Registry<S, C> {
    manager: ResourceManager<S, C>,
}

impl<S: RegistryStore, C: LogicalClock> Registry<S, C> {
    pub fn new(manager: ResourceManager<S, C>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &ResourceManager<S, C> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ResourceManager<S, C> {
        &mut self.manager
    }

    /// Submits a signed resource creation for the collection's owner document.
    ///
    /// # Errors
    /// [`ValidationError::EmptySignatures`] if no signature is supplied, then
    /// everything [`ResourceManager::create_resource`] returns.
    pub fn submit_create_resource(
        &mut self,
        payload: &CreateResourcePayload,
        signatures: &[SignInfo],
    ) -> Result<Resource, RegistryError> {
        payload.validate()?;
        if signatures.is_empty() {
            return Err(ValidationError::EmptySignatures.into());
        }
        let owner = self.manager.settings().collection_did(&payload.collection_id);
        self.manager.create_resource(payload, &owner, signatures)
    }

    /// Fetches one resource of a collection.
    pub fn query_resource(
        &self,
        collection_id: &str,
        resource_id: &str,
    ) -> Result<Resource, RegistryError> {
        let collection_id = required(collection_id, "collection id")?;
        let resource_id = required(resource_id, "resource id")?;
        let id = Uuid::parse_str(resource_id)
            .map_err(|_| ValidationError::InvalidResourceId(resource_id.to_string()))?;
        self.ensure_collection(collection_id)?;

        match self.manager.get_resource(&id)? {
            Some(resource) if resource.collection_id == collection_id => Ok(resource),
            _ => Err(RegistryError::ResourceNotFound {
                collection_id: collection_id.to_string(),
                id,
            }),
        }
    }

    /// Lists a family's versions oldest first, optionally only one media type.
    ///
    /// An unknown family in an existing collection yields an empty list.
    pub fn query_family_versions(
        &self,
        collection_id: &str,
        name: &str,
        resource_type: &str,
        mime_type: Option<&str>,
    ) -> Result<Vec<ResourceHeader>, RegistryError> {
        let family = FamilyKey::new(
            required(collection_id, "collection id")?,
            required(name, "resource name")?,
            required(resource_type, "resource type")?,
        );
        self.ensure_collection(&family.collection_id)?;

        let mut versions = Vec::new();
        for header in self.manager.list_family_versions(&family)? {
            let header = header?;
            if mime_type.map_or(true, |m| m == header.mime_type) {
                versions.push(header);
            }
        }
        debug!("{} versions listed for {}", versions.len(), family);
        Ok(versions)
    }

    /// Lists every resource of an existing collection.
    pub fn query_collection(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ResourceHeader>, RegistryError> {
        let collection_id = required(collection_id, "collection id")?;
        self.ensure_collection(collection_id)?;
        self.manager.list_collection(collection_id)
    }

    fn ensure_collection(&self, collection_id: &str) -> Result<(), RegistryError> {
        let did = self.manager.settings().collection_did(collection_id);
        match self.manager.store().get_document(&did)? {
            Some(_) => Ok(()),
            None => Err(RegistryError::CollectionNotFound(collection_id.to_string())),
        }
    }
}
