// src/storage/memory.rs
//! In-memory host store.
//!
//! Records are kept serialized, the way a host key-value store keeps them,
//! with secondary indexes for family heads, family membership and
//! collections. A single level of transaction is supported through a write
//! overlay that is merged on commit and dropped on rollback.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use uuid::Uuid;

use super::{IdentityStore, LogicalClock, ResourceStore, Transactional};
use crate::errors::StoreError;
use crate::models::did::IdentityDocument;
use crate::models::resource::{FamilyKey, Resource, ResourceHeader};
use crate::utils::serialization::{from_record, to_record};

#[derive(Debug, Default, Clone)]
struct Tables {
    documents: BTreeMap<String, Vec<u8>>,
    resources: BTreeMap<Uuid, Vec<u8>>,
    heads: BTreeMap<FamilyKey, Uuid>,
    families: BTreeSet<(FamilyKey, Uuid)>,
    collections: BTreeSet<(String, Uuid)>,
}

impl Tables {
    fn merge(&mut self, other: Tables) {
        self.documents.extend(other.documents);
        self.resources.extend(other.resources);
        self.heads.extend(other.heads);
        self.families.extend(other.families);
        self.collections.extend(other.collections);
    }
}

/// In-memory store implementing every host storage trait.
///
/// # Note
/// Not thread-safe; the host serializes all state transitions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Tables,
    pending: Option<Tables>,
    #[cfg(test)]
    failing_writes: BTreeSet<Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        debug!("creating new in-memory store");
        Self::default()
    }

    pub fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of committed and pending resources.
    pub fn resource_count(&self) -> usize {
        let pending = self
            .pending
            .as_ref()
            .map(|p| {
                p.resources
                    .keys()
                    .filter(|id| !self.committed.resources.contains_key(id))
                    .count()
            })
            .unwrap_or(0);
        self.committed.resources.len() + pending
    }

    /// Makes every later write of resource `id` fail.
    #[cfg(test)]
    pub(crate) fn fail_writes_to(&mut self, id: Uuid) {
        self.failing_writes.insert(id);
    }

    #[cfg(test)]
    fn check_write(&self, id: &Uuid) -> Result<(), StoreError> {
        if self.failing_writes.contains(id) {
            return Err(StoreError::Backend(format!("write to {id} rejected")));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_write(&self, _id: &Uuid) -> Result<(), StoreError> {
        Ok(())
    }

    fn write_tables(&mut self) -> &mut Tables {
        self.pending.as_mut().unwrap_or(&mut self.committed)
    }

    fn lookup_resource(&self, id: &Uuid) -> Option<&Vec<u8>> {
        self.pending
            .as_ref()
            .and_then(|p| p.resources.get(id))
            .or_else(|| self.committed.resources.get(id))
    }

    fn load_headers(&self, ids: Vec<Uuid>) -> Result<Vec<ResourceHeader>, StoreError> {
        let mut headers = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_resource(&id)? {
                Some(resource) => headers.push(resource.header()),
                None => {
                    return Err(StoreError::Backend(format!(
                        "index references missing resource {id}"
                    )))
                }
            }
        }
        Ok(headers)
    }

    /// Merges the next `limit` ids of the committed and pending views.
    fn merged_page<'a, F, I>(&'a self, select: F, limit: usize) -> Vec<Uuid>
    where
        F: Fn(&'a Tables) -> I,
        I: Iterator<Item = Uuid>,
    {
        let mut ids: BTreeSet<Uuid> = select(&self.committed).take(limit).collect();
        if let Some(pending) = &self.pending {
            ids.extend(select(pending).take(limit));
        }
        ids.into_iter().take(limit).collect()
    }
}

/// The first `limit` distinct family keys of `tables` strictly after `after`.
fn distinct_families(
    tables: &Tables,
    after: Option<&FamilyKey>,
    limit: usize,
) -> BTreeSet<FamilyKey> {
    let start = match after {
        Some(family) => Bound::Excluded((family.clone(), Uuid::from_u128(u128::MAX))),
        None => Bound::Unbounded,
    };
    let mut keys = BTreeSet::new();
    for (family, _) in tables.families.range((start, Bound::Unbounded)) {
        if keys.len() == limit && !keys.contains(family) {
            break;
        }
        keys.insert(family.clone());
    }
    keys
}

fn after_bound<K: Clone>(prefix: &K, after: Option<Uuid>) -> Bound<(K, Uuid)> {
    match after {
        Some(id) => Bound::Excluded((prefix.clone(), id)),
        None => Bound::Included((prefix.clone(), Uuid::nil())),
    }
}

impl IdentityStore for MemoryStore {
    fn get_document(&self, id: &str) -> Result<Option<IdentityDocument>, StoreError> {
        let bytes = self
            .pending
            .as_ref()
            .and_then(|p| p.documents.get(id))
            .or_else(|| self.committed.documents.get(id));
        bytes.map(|b| from_record(b)).transpose()
    }

    fn put_document(&mut self, doc: &IdentityDocument) -> Result<(), StoreError> {
        let bytes = to_record(doc)?;
        self.write_tables().documents.insert(doc.id.clone(), bytes);
        Ok(())
    }
}

impl ResourceStore for MemoryStore {
    fn get_resource(&self, id: &Uuid) -> Result<Option<Resource>, StoreError> {
        self.lookup_resource(id).map(|b| from_record(b)).transpose()
    }

    fn has_resource(&self, id: &Uuid) -> Result<bool, StoreError> {
        Ok(self.lookup_resource(id).is_some())
    }

    fn put_resource(&mut self, resource: &Resource) -> Result<(), StoreError> {
        self.check_write(&resource.id)?;

        let bytes = to_record(resource)?;
        let tables = self.write_tables();
        tables.resources.insert(resource.id, bytes);
        tables.families.insert((resource.family(), resource.id));
        tables.collections.insert((resource.collection_id.clone(), resource.id));
        Ok(())
    }

    fn family_head(&self, family: &FamilyKey) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .pending
            .as_ref()
            .and_then(|p| p.heads.get(family))
            .or_else(|| self.committed.heads.get(family))
            .copied())
    }

    fn set_family_head(&mut self, family: &FamilyKey, id: Uuid) -> Result<(), StoreError> {
        self.write_tables().heads.insert(family.clone(), id);
        Ok(())
    }

    fn family_keys_page(
        &self,
        after: Option<&FamilyKey>,
        limit: usize,
    ) -> Result<Vec<FamilyKey>, StoreError> {
        let mut keys = distinct_families(&self.committed, after, limit);
        if let Some(pending) = &self.pending {
            keys.extend(distinct_families(pending, after, limit));
        }
        Ok(keys.into_iter().take(limit).collect())
    }

    fn family_page(
        &self,
        family: &FamilyKey,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ResourceHeader>, StoreError> {
        let ids = self.merged_page(
            |t| {
                t.families
                    .range((after_bound(family, after), Bound::Unbounded))
                    .take_while(move |(k, _)| k == family)
                    .map(|(_, id)| *id)
            },
            limit,
        );
        self.load_headers(ids)
    }

    fn collection_page(
        &self,
        collection_id: &str,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ResourceHeader>, StoreError> {
        let collection = collection_id.to_string();
        let ids = self.merged_page(
            |t| {
                let collection = collection.clone();
                t.collections
                    .range((after_bound(&collection, after), Bound::Unbounded))
                    .take_while(move |(c, _)| *c == collection)
                    .map(|(_, id)| *id)
            },
            limit,
        );
        self.load_headers(ids)
    }
}

impl Transactional for MemoryStore {
    fn begin(&mut self) -> Result<(), StoreError> {
        if self.pending.is_some() {
            return Err(StoreError::TransactionOpen);
        }
        self.pending = Some(Tables::default());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let pending = self.pending.take().ok_or(StoreError::NoTransaction)?;
        self.committed.merge(pending);
        Ok(())
    }

    fn rollback(&mut self) {
        self.pending = None;
    }
}

/// Logical clock driven by the host's block time.
#[derive(Debug)]
pub struct BlockClock {
    time: Cell<DateTime<Utc>>,
}

impl BlockClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { time: Cell::new(time) }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        self.time.set(time);
    }

    /// Moves block time forward, as the next block would.
    pub fn advance(&self, seconds: i64) {
        self.time.set(self.time.get() + Duration::seconds(seconds));
    }
}

impl LogicalClock for BlockClock {
    fn now(&self) -> DateTime<Utc> {
        self.time.get()
    }
}
