// src/storage/mod.rs
//! Host storage interfaces.
//!
//! The registry runs inside a deterministic state-transition step supplied by
//! a host. The host owns the key-value store and the commit/rollback
//! boundary; these traits are the registry's view of it:
//!
//! ```text
//! IdentityStore:  get_document(did) → doc,   put_document(doc)
//! ResourceStore:  get_resource(id) → r,      put_resource(r)
//!                 family_head(key) → id,     set_family_head(key, id)
//!                 family_keys_page / family_page / collection_page (paged scans)
//! Transactional:  begin → commit | rollback
//! LogicalClock:   now() → block time
//! ```
//!
//! All calls are synchronous. Paged scans return at most `limit` entries
//! strictly after the given cursor, in key order, so that callers can walk
//! unbounded datasets in bounded memory.

pub mod memory;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::did::IdentityDocument;
use crate::models::resource::{FamilyKey, Resource, ResourceHeader};

/// Read/write access to identity documents.
pub trait IdentityStore {
    fn get_document(&self, id: &str) -> Result<Option<IdentityDocument>, StoreError>;

    fn put_document(&mut self, doc: &IdentityDocument) -> Result<(), StoreError>;
}

/// Read/write access to resources and the per-family head index.
pub trait ResourceStore {
    fn get_resource(&self, id: &Uuid) -> Result<Option<Resource>, StoreError>;

    fn has_resource(&self, id: &Uuid) -> Result<bool, StoreError> {
        Ok(self.get_resource(id)?.is_some())
    }

    /// Persists a resource, inserting or replacing it by id.
    fn put_resource(&mut self, resource: &Resource) -> Result<(), StoreError>;

    /// Id of the newest member of a family, if the family exists.
    fn family_head(&self, family: &FamilyKey) -> Result<Option<Uuid>, StoreError>;

    fn set_family_head(&mut self, family: &FamilyKey, id: Uuid) -> Result<(), StoreError>;

    /// Distinct family keys, in key order.
    fn family_keys_page(&self, after: Option<&FamilyKey>, limit: usize)
        -> Result<Vec<FamilyKey>, StoreError>;

    /// Members of one family, ordered by id.
    ///
    /// Family membership derives from immutable fields only, so this index is
    /// trustworthy even when link fields are not.
    fn family_page(&self, family: &FamilyKey, after: Option<Uuid>, limit: usize)
        -> Result<Vec<ResourceHeader>, StoreError>;

    /// Resources anchored to one collection, ordered by id.
    fn collection_page(&self, collection_id: &str, after: Option<Uuid>, limit: usize)
        -> Result<Vec<ResourceHeader>, StoreError>;
}

/// The host's unit-of-work boundary.
///
/// Writes made between [`begin`](Transactional::begin) and
/// [`commit`](Transactional::commit) become visible to other units of work
/// together, or not at all after [`rollback`](Transactional::rollback).
pub trait Transactional {
    fn begin(&mut self) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self);
}

/// Everything the registry needs from the host store.
pub trait RegistryStore: IdentityStore + ResourceStore + Transactional {}

impl<T: IdentityStore + ResourceStore + Transactional + ?Sized> RegistryStore for T {}

/// Deterministic time source of the execution context (block time).
pub trait LogicalClock {
    fn now(&self) -> DateTime<Utc>;
}

/// Runs `f` as one unit of work: commits if it succeeds, rolls back if it
/// fails.
///
/// # Errors
/// The error of `f`, or the commit failure converted into `E`.
pub fn atomically<S, T, E, F>(store: &mut S, f: F) -> Result<T, E>
where
    S: Transactional + ?Sized,
    E: From<StoreError>,
    F: FnOnce(&mut S) -> Result<T, E>,
{
    store.begin()?;
    match f(store) {
        Ok(value) => {
            if let Err(e) = store.commit() {
                store.rollback();
                return Err(e.into());
            }
            Ok(value)
        }
        Err(e) => {
            store.rollback();
            Err(e)
        }
    }
}

/// Iterator over every family key in the store, fetched one page at a time.
///
/// Holds at most one page in memory. Yields `Err` once and then stops if the
/// store fails.
pub struct FamilyKeys<'a, S: ResourceStore + ?Sized> {
    store: &'a S,
    page_size: usize,
    cursor: Option<FamilyKey>,
    buffer: std::vec::IntoIter<FamilyKey>,
    done: bool,
}

impl<'a, S: ResourceStore + ?Sized> FamilyKeys<'a, S> {
    pub fn new(store: &'a S, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            cursor: None,
            buffer: Vec::new().into_iter(),
            done: false,
        }
    }
}

impl<S: ResourceStore + ?Sized> Iterator for FamilyKeys<'_, S> {
    type Item = Result<FamilyKey, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(family) = self.buffer.next() {
                self.cursor = Some(family.clone());
                return Some(Ok(family));
            }
            if self.done {
                return None;
            }
            match self.store.family_keys_page(self.cursor.as_ref(), self.page_size) {
                Ok(page) => {
                    if page.len() < self.page_size {
                        self.done = true;
                    }
                    if page.is_empty() {
                        return None;
                    }
                    self.buffer = page.into_iter();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
