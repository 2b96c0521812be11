// src/genesis.rs
//! Genesis state of the registry.
//!
//! A genesis file is a JSON object with the identity documents and resources
//! the registry starts from:
//!
//! ```json
//! { "documents": [ ... ], "resources": [ ... ] }
//! ```
//!
//! Resources may carry stale links; the migration runner repairs them after
//! import.

use std::collections::HashSet;

use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::{GenesisError, StoreError};
use crate::models::did::{split_did, IdentityDocument};
use crate::models::resource::Resource;
use crate::storage::{atomically, IdentityStore, RegistryStore, ResourceStore};
use crate::utils::crypto::checksum;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GenesisState {
    pub documents: Vec<IdentityDocument>,
    pub resources: Vec<Resource>,
}

impl GenesisState {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks the state's invariants.
    ///
    /// # Errors
    /// - [`GenesisError::DuplicateDocument`] / [`GenesisError::DuplicateResource`]
    ///   for repeated ids
    /// - [`GenesisError::InvalidDocument`] for malformed documents
    /// - [`GenesisError::ChecksumMismatch`] if a checksum does not match the data
    /// - [`GenesisError::OrphanResource`] if no document owns the collection
    pub fn validate(&self) -> Result<(), GenesisError> {
        let mut collections = HashSet::new();
        let mut document_ids = HashSet::new();
        for doc in &self.documents {
            if !document_ids.insert(doc.id.as_str()) {
                return Err(GenesisError::DuplicateDocument(doc.id.clone()));
            }
            doc.validate().map_err(|source| GenesisError::InvalidDocument {
                id: doc.id.clone(),
                source,
            })?;
            if let Some((_, _, unique_id)) = split_did(&doc.id) {
                collections.insert(unique_id);
            }
        }

        let mut resource_ids = HashSet::new();
        for resource in &self.resources {
            if !resource_ids.insert(resource.id) {
                return Err(GenesisError::DuplicateResource(resource.id));
            }
            if checksum(&resource.data) != resource.checksum {
                return Err(GenesisError::ChecksumMismatch { id: resource.id });
            }
            if !collections.contains(resource.collection_id.as_str()) {
                return Err(GenesisError::OrphanResource {
                    id: resource.id,
                    collection_id: resource.collection_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Validates the state and writes it to `store` in one unit of work.
    ///
    /// Resources without a successor become their family's head.
    pub fn import<S: RegistryStore + ?Sized>(
        &self,
        store: &mut S,
    ) -> Result<(), GenesisError> {
        self.validate()?;
        atomically(store, |s| {
            for doc in &self.documents {
                s.put_document(doc)?;
            }
            for resource in &self.resources {
                s.put_resource(resource)?;
                if resource.is_head() {
                    s.set_family_head(&resource.family(), resource.id)?;
                }
            }
            Ok::<_, GenesisError>(())
        })?;

        info!(
            "imported {} documents and {} resources",
            self.documents.len(),
            self.resources.len()
        );
        Ok(())
    }
}
