// src/services/resource_manager.rs
//! Resource version-chain manager.
//!
//! Creates resources and keeps every family's version chain linked:
//!
//! 1. Reject duplicate ids
//! 2. Load the owning identity document
//! 3. Verify the owner's required signers over the canonical payload
//! 4. Compute the checksum and take `created` from the logical clock
//! 5. Link the new resource after the family head and move the head
//! 6. Append the backlink to the owning document
//! 7. Persist everything in one unit of work
//!
//! Read-only queries (single resource, family head, family versions,
//! collection listing) need no authorization.

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::config::Settings;
use crate::errors::{RegistryError, RepairError, ValidationError};
use crate::models::did::split_did;
use crate::models::resource::{CreateResourcePayload, FamilyKey, Resource, ResourceHeader};
use crate::models::verification_method::SignInfo;
use crate::services::chain_repair::{repair_links, RepairOptions, RepairReport};
use crate::services::verifier::Verifier;
use crate::storage::{atomically, IdentityStore, LogicalClock, RegistryStore, ResourceStore};
use crate::utils::crypto::checksum;

/// Orchestrates resource creation and queries over a host store.
///
/// # Type Parameters
/// * `S` - Host store (documents, resources, transactions)
/// * `C` - Logical clock of the execution context
pub struct ResourceManager<S, C> {
    store: S,
    clock: C,
    settings: Settings,
}

impl<S: RegistryStore, C: LogicalClock> ResourceManager<S, C> {
    pub fn new(store: S, clock: C, settings: Settings) -> Self {
        Self { store, clock, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Store scan page size; `Settings` built by hand may carry zero.
    fn page_size(&self) -> usize {
        self.settings.repair_page_size.max(1)
    }

    /// Creates a new resource version.
    ///
    /// # Arguments
    /// * `payload` - Signed resource fields
    /// * `owner_document_id` - DID of the document the resource is anchored to
    /// * `signatures` - Signatures over [`CreateResourcePayload::sign_bytes`]
    ///
    /// # Returns
    /// The stored resource, with checksum, creation time and links set.
    ///
    /// # Errors
    /// - `Validation` for malformed payloads, checked before any state is read
    /// - `ResourceExists` if the id is taken in any family
    /// - `DocumentNotFound` if the owner document does not exist
    /// - `Authorization` errors from the verifier, unchanged
    /// - `BrokenChain` / `ClockRegression` if the family head is inconsistent
    ///
    /// On any error nothing is written.
    pub fn create_resource(
        &mut self,
        payload: &CreateResourcePayload,
        owner_document_id: &str,
        signatures: &[SignInfo],
    ) -> Result<Resource, RegistryError> {
        let id = self.validate_payload(payload, owner_document_id)?;
        let now = self.clock.now();

        let resource = atomically(&mut self.store, |store| {
            create_in_store(store, payload, id, owner_document_id, signatures, now)
        })?;

        info!(
            "created resource {} in {} (previous version: {:?})",
            resource.id,
            resource.family(),
            resource.previous_version_id
        );
        Ok(resource)
    }

    fn validate_payload(
        &self,
        payload: &CreateResourcePayload,
        owner_document_id: &str,
    ) -> Result<Uuid, ValidationError> {
        let id = payload.validate()?;
        if payload.data.len() > self.settings.max_resource_size {
            return Err(ValidationError::ResourceTooLarge {
                size: payload.data.len(),
                limit: self.settings.max_resource_size,
            });
        }
        match split_did(owner_document_id) {
            Some((_, _, unique_id)) if unique_id == payload.collection_id => Ok(id),
            _ => Err(ValidationError::CollectionMismatch {
                collection_id: payload.collection_id.clone(),
                document_id: owner_document_id.to_string(),
            }),
        }
    }

    pub fn get_resource(&self, id: &Uuid) -> Result<Option<Resource>, RegistryError> {
        Ok(self.store.get_resource(id)?)
    }

    /// Header of the newest version of a family.
    pub fn get_family_head(
        &self,
        family: &FamilyKey,
    ) -> Result<Option<ResourceHeader>, RegistryError> {
        let Some(head_id) = self.store.family_head(family)? else {
            return Ok(None);
        };
        let head = load_member(&self.store, family, head_id)?;
        Ok(Some(head.header()))
    }

    /// Lazily lists a family's versions, oldest first.
    ///
    /// An unknown family yields an empty sequence. Calling this again restarts
    /// the traversal from the oldest version.
    pub fn list_family_versions(
        &self,
        family: &FamilyKey,
    ) -> Result<FamilyVersions<'_, S>, RegistryError> {
        FamilyVersions::new(&self.store, family, self.page_size())
    }

    /// All resources anchored to a collection, regardless of family.
    pub fn list_collection(
        &self,
        collection_id: &str,
    ) -> Result<Vec<ResourceHeader>, RegistryError> {
        let page_size = self.page_size();
        let mut headers = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.store.collection_page(collection_id, cursor, page_size)?;
            let full = page.len() == page_size;
            cursor = page.last().map(|h| h.id);
            headers.extend(page);
            if !full {
                return Ok(headers);
            }
        }
    }

    /// Rebuilds every family's links from creation order.
    pub fn repair_links(&mut self) -> Result<RepairReport, RepairError> {
        let options = RepairOptions {
            page_size: self.page_size(),
            resume_after: None,
        };
        repair_links(&mut self.store, &options)
    }
}

/// The part of resource creation that runs inside the unit of work.
fn create_in_store<S: RegistryStore + ?Sized>(
    store: &mut S,
    payload: &CreateResourcePayload,
    id: Uuid,
    owner_document_id: &str,
    signatures: &[SignInfo],
    now: DateTime<Utc>,
) -> Result<Resource, RegistryError> {
    if store.has_resource(&id)? {
        return Err(RegistryError::ResourceExists(id));
    }

    let mut document = store
        .get_document(owner_document_id)?
        .ok_or_else(|| RegistryError::DocumentNotFound(owner_document_id.to_string()))?;

    let message = payload.sign_bytes()?;
    let report = Verifier::new(&*store).verify_document_signers(&document, &message, signatures)?;
    for ignored in &report.ignored {
        debug!("ignored signature {}: {}", ignored.verification_method_id, ignored.reason);
    }

    let family = payload.family();
    let mut resource = Resource {
        id,
        collection_id: payload.collection_id.clone(),
        name: payload.name.clone(),
        resource_type: payload.resource_type.clone(),
        mime_type: payload.mime_type.clone(),
        data: payload.data.clone(),
        checksum: checksum(&payload.data),
        created: now,
        previous_version_id: None,
        next_version_id: None,
    };

    if let Some(head_id) = store.family_head(&family)? {
        let mut head = load_member(&*store, &family, head_id)?;
        if head.next_version_id.is_some() {
            return Err(RegistryError::BrokenChain { family, at: head_id });
        }
        if head.created > now {
            return Err(RegistryError::ClockRegression {
                now: now.to_rfc3339(),
                head: head_id,
                head_created: head.created.to_rfc3339(),
            });
        }
        head.next_version_id = Some(id);
        resource.previous_version_id = Some(head_id);
        store.put_resource(&head)?;
        debug!("moved head of {} from {} to {}", family, head_id, id);
    }

    document.add_resource(id);
    store.put_document(&document)?;

    store.put_resource(&resource)?;
    store.set_family_head(&family, id)?;
    Ok(resource)
}

/// Loads a resource that the index says belongs to `family`.
fn load_member<S: ResourceStore + ?Sized>(
    store: &S,
    family: &FamilyKey,
    id: Uuid,
) -> Result<Resource, RegistryError> {
    match store.get_resource(&id)? {
        Some(resource) if &resource.family() == family => Ok(resource),
        _ => Err(RegistryError::BrokenChain {
            family: family.clone(),
            at: id,
        }),
    }
}

/// Counts a family's members by paging through the membership index.
pub(crate) fn family_len<S: ResourceStore + ?Sized>(
    store: &S,
    family: &FamilyKey,
    page_size: usize,
) -> Result<usize, RegistryError> {
    let page_size = page_size.max(1);
    let mut count = 0;
    let mut cursor = None;
    loop {
        let page = store.family_page(family, cursor, page_size)?;
        count += page.len();
        if page.len() < page_size {
            return Ok(count);
        }
        cursor = page.last().map(|h| h.id);
    }
}

/// Oldest-to-newest traversal of a family's version chain.
///
/// Holds one resource id at a time. The traversal is bounded by the family's
/// member count, so a corrupted chain with a cycle ends in
/// [`RegistryError::BrokenChain`] instead of looping.
pub struct FamilyVersions<'a, S: ResourceStore + ?Sized> {
    store: &'a S,
    family: FamilyKey,
    next: Option<Uuid>,
    remaining: usize,
}

impl<'a, S: ResourceStore + ?Sized> FamilyVersions<'a, S> {
    /// Positions a traversal at the family's oldest version.
    pub fn new(store: &'a S, family: &FamilyKey, page_size: usize) -> Result<Self, RegistryError> {
        let mut versions = Self {
            store,
            family: family.clone(),
            next: None,
            remaining: 0,
        };
        let Some(head_id) = store.family_head(family)? else {
            return Ok(versions);
        };

        let members = family_len(store, family, page_size)?;
        let mut oldest = head_id;
        let mut steps = 1;
        loop {
            let resource = load_member(store, family, oldest)?;
            match resource.previous_version_id {
                Some(previous) if steps < members => {
                    oldest = previous;
                    steps += 1;
                }
                Some(_) => {
                    return Err(RegistryError::BrokenChain {
                        family: family.clone(),
                        at: oldest,
                    })
                }
                None => break,
            }
        }

        versions.next = Some(oldest);
        versions.remaining = members;
        Ok(versions)
    }
}

impl<S: ResourceStore + ?Sized> Clone for FamilyVersions<'_, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            family: self.family.clone(),
            next: self.next,
            remaining: self.remaining,
        }
    }
}

impl<S: ResourceStore + ?Sized> Iterator for FamilyVersions<'_, S> {
    type Item = Result<ResourceHeader, RegistryError>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        if self.remaining == 0 {
            return Some(Err(RegistryError::BrokenChain {
                family: self.family.clone(),
                at: id,
            }));
        }
        self.remaining -= 1;

        match load_member(self.store, &self.family, id) {
            Ok(resource) => {
                self.next = resource.next_version_id;
                Some(Ok(resource.header()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
