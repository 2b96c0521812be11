// src/services/chain_repair.rs
//! Version-chain repair migration.
//!
//! An earlier release linked new resources to the wrong predecessor, leaving
//! `previous_version_id` / `next_version_id` inconsistent across families.
//! Family membership and `created` were always written correctly, so the
//! chains can be rebuilt from them alone:
//!
//! 1. Walk the family index one page of keys at a time
//! 2. For each family, order the members by `(created, id)`
//! 3. Rewrite the records whose links differ from that order
//! 4. Point the head index at the newest member
//!
//! Each family is repaired in its own unit of work. A family that fails is
//! rolled back and reported; the others still complete. Rerunning on a
//! repaired store changes nothing.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{RegistryError, RepairError, StoreError};
use crate::models::resource::FamilyKey;
use crate::services::resource_manager::{family_len, FamilyVersions};
use crate::storage::{atomically, ResourceStore, Transactional};

/// Tuning of a repair run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOptions {
    /// Headers fetched per store scan.
    pub page_size: usize,

    /// Skip every family up to and including this one. Pass the
    /// `last_completed_family` of an interrupted run to resume it.
    pub resume_after: Option<FamilyKey>,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            resume_after: None,
        }
    }
}

/// A family whose repair was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairFailure {
    pub family: FamilyKey,
    pub resource_id: Option<Uuid>,
    pub cause: String,
}

/// Summary of a repair run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub families_scanned: usize,
    pub resources_scanned: usize,
    pub records_updated: usize,
    pub heads_updated: usize,
    pub failures: Vec<RepairFailure>,
    /// Last family processed, repaired or failed; `resume_after` if the run
    /// processed none.
    pub last_completed_family: Option<FamilyKey>,
}

#[derive(Debug, Default)]
struct FamilyStats {
    resources: usize,
    records_updated: usize,
    head_updated: bool,
}

/// Failure inside one family's unit of work.
struct FamilyFailure {
    resource_id: Option<Uuid>,
    cause: StoreError,
}

impl From<StoreError> for FamilyFailure {
    fn from(cause: StoreError) -> Self {
        Self { resource_id: None, cause }
    }
}

/// Chain position of one member, as recorded before repair.
struct Member {
    created: DateTime<Utc>,
    id: Uuid,
    previous_version_id: Option<Uuid>,
    next_version_id: Option<Uuid>,
}

/// Rebuilds the version chain of every family from creation order.
///
/// # Errors
/// - [`RepairError::InvalidPageSize`] if `options.page_size` is zero
/// - [`RepairError::Scan`] if reading the family index fails; families
///   already repaired stay repaired
///
/// Memory use is bounded by one page of family keys plus the `(created, id)`
/// pairs of the family being repaired.
pub fn repair_links<S>(store: &mut S, options: &RepairOptions) -> Result<RepairReport, RepairError>
where
    S: ResourceStore + Transactional + ?Sized,
{
    if options.page_size == 0 {
        return Err(RepairError::InvalidPageSize);
    }

    info!("repairing version chains, resuming after {:?}", options.resume_after);

    let mut report = RepairReport::default();
    let mut cursor = options.resume_after.clone();
    loop {
        let families = store
            .family_keys_page(cursor.as_ref(), options.page_size)
            .map_err(RepairError::Scan)?;
        let last_page = families.len() < options.page_size;

        for family in families {
            report.families_scanned += 1;
            match atomically(store, |s| repair_family(s, &family, options.page_size)) {
                Ok(stats) => {
                    debug!(
                        "family {}: {} resources, {} records rewritten",
                        family, stats.resources, stats.records_updated
                    );
                    report.resources_scanned += stats.resources;
                    report.records_updated += stats.records_updated;
                    report.heads_updated += usize::from(stats.head_updated);
                }
                Err(failure) => {
                    warn!("family {} not repaired: {}", family, failure.cause);
                    report.failures.push(RepairFailure {
                        family: family.clone(),
                        resource_id: failure.resource_id,
                        cause: failure.cause.to_string(),
                    });
                }
            }
            cursor = Some(family);
        }

        if last_page {
            break;
        }
    }
    report.last_completed_family = cursor;

    info!(
        "repair finished: {} families, {} records rewritten, {} heads moved, {} failures",
        report.families_scanned,
        report.records_updated,
        report.heads_updated,
        report.failures.len()
    );
    Ok(report)
}

fn repair_family<S: ResourceStore + ?Sized>(
    store: &mut S,
    family: &FamilyKey,
    page_size: usize,
) -> Result<FamilyStats, FamilyFailure> {
    let mut members = Vec::new();
    let mut cursor = None;
    loop {
        let page = store.family_page(family, cursor, page_size)?;
        let full = page.len() == page_size;
        cursor = page.last().map(|h| h.id);
        members.extend(page.into_iter().map(|h| Member {
            created: h.created,
            id: h.id,
            previous_version_id: h.previous_version_id,
            next_version_id: h.next_version_id,
        }));
        if !full {
            break;
        }
    }
    members.sort_by(|a, b| (a.created, a.id).cmp(&(b.created, b.id)));

    let mut stats = FamilyStats {
        resources: members.len(),
        ..FamilyStats::default()
    };

    for (i, member) in members.iter().enumerate() {
        let previous = i.checked_sub(1).map(|p| members[p].id);
        let next = members.get(i + 1).map(|m| m.id);
        if member.previous_version_id == previous && member.next_version_id == next {
            continue;
        }

        let failed = |cause: StoreError| FamilyFailure {
            resource_id: Some(member.id),
            cause,
        };
        let mut resource = store
            .get_resource(&member.id)
            .map_err(failed)?
            .ok_or_else(|| {
                failed(StoreError::Backend(format!(
                    "resource {} vanished during repair",
                    member.id
                )))
            })?;
        resource.previous_version_id = previous;
        resource.next_version_id = next;
        store.put_resource(&resource).map_err(failed)?;
        stats.records_updated += 1;
    }

    if let Some(newest) = members.last() {
        if store.family_head(family)? != Some(newest.id) {
            store.set_family_head(family, newest.id)?;
            stats.head_updated = true;
        }
    }
    Ok(stats)
}

/// Checks that a family's chain is a single consistent line.
///
/// Following `next_version_id` from the oldest member must visit every member
/// exactly once, in non-decreasing `created` order, with each
/// `previous_version_id` pointing at the member visited before it, and end at
/// the indexed head.
///
/// # Errors
/// [`RegistryError::BrokenChain`] at the first member that breaks the chain.
pub fn audit_family<S: ResourceStore + ?Sized>(
    store: &S,
    family: &FamilyKey,
    page_size: usize,
) -> Result<(), RegistryError> {
    let broken = |at: Uuid| RegistryError::BrokenChain {
        family: family.clone(),
        at,
    };

    let mut visited = HashSet::new();
    let mut last: Option<(Uuid, DateTime<Utc>)> = None;
    for header in FamilyVersions::new(store, family, page_size)? {
        let header = header?;
        let previous = last.map(|(id, _)| id);
        let out_of_order = last.is_some_and(|(_, created)| header.created < created);
        if header.previous_version_id != previous || out_of_order || !visited.insert(header.id) {
            return Err(broken(header.id));
        }
        last = Some((header.id, header.created));
    }

    let members = family_len(store, family, page_size)?;
    let head = store.family_head(family)?;
    match last {
        Some((tail, _)) if visited.len() != members || head != Some(tail) => Err(broken(tail)),
        None if members > 0 => Err(broken(head.unwrap_or_default())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resource::Resource;
    use crate::storage::memory::MemoryStore;
    use crate::test_utils::resource;
    use proptest::prelude::*;

    fn put_all(store: &mut MemoryStore, resources: &[Resource]) {
        for r in resources {
            store.put_resource(r).unwrap();
        }
    }

    fn chain(store: &MemoryStore, family: &FamilyKey) -> Vec<Uuid> {
        FamilyVersions::new(store, family, 2)
            .unwrap()
            .map(|h| h.unwrap().id)
            .collect()
    }

    #[test]
    fn test_relinks_unlinked_family_in_creation_order() {
        let mut store = MemoryStore::new();
        let r1 = resource("c1", "schema", "CL", 0);
        let r2 = resource("c1", "schema", "CL", 5);
        let r3 = resource("c1", "schema", "CL", 10);
        put_all(&mut store, &[r3.clone(), r1.clone(), r2.clone()]);

        let report = repair_links(&mut store, &RepairOptions::default()).unwrap();
        assert_eq!(report.families_scanned, 1);
        assert_eq!(report.resources_scanned, 3);
        assert_eq!(report.records_updated, 3);
        assert_eq!(report.heads_updated, 1);
        assert!(report.failures.is_empty());

        let family = r1.family();
        assert_eq!(store.family_head(&family).unwrap(), Some(r3.id));
        assert_eq!(chain(&store, &family), vec![r1.id, r2.id, r3.id]);
        let r2 = store.get_resource(&r2.id).unwrap().unwrap();
        assert_eq!(r2.previous_version_id, Some(r1.id));
        assert_eq!(r2.next_version_id, Some(r3.id));
        audit_family(&store, &family, 2).unwrap();
    }

    #[test]
    fn test_fixes_links_pointing_across_families() {
        let mut store = MemoryStore::new();
        let a1 = resource("c1", "schema", "CL", 0);
        let mut a2 = resource("c1", "schema", "CL", 2);
        let mut b1 = resource("c1", "schema", "JSON", 1);
        a2.previous_version_id = Some(b1.id);
        b1.next_version_id = Some(a2.id);
        put_all(&mut store, &[a1.clone(), a2.clone(), b1.clone()]);
        store.set_family_head(&a2.family(), b1.id).unwrap();

        repair_links(&mut store, &RepairOptions::default()).unwrap();

        assert_eq!(chain(&store, &a1.family()), vec![a1.id, a2.id]);
        assert_eq!(chain(&store, &b1.family()), vec![b1.id]);
        audit_family(&store, &a1.family(), 10).unwrap();
        audit_family(&store, &b1.family(), 10).unwrap();
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let mut store = MemoryStore::new();
        put_all(
            &mut store,
            &[
                resource("c1", "n", "t", 3),
                resource("c1", "n", "t", 1),
                resource("c2", "n", "t", 0),
            ],
        );
        repair_links(&mut store, &RepairOptions::default()).unwrap();

        let again = repair_links(&mut store, &RepairOptions::default()).unwrap();
        assert_eq!(again.families_scanned, 2);
        assert_eq!(again.resources_scanned, 3);
        assert_eq!(again.records_updated, 0);
        assert_eq!(again.heads_updated, 0);
    }

    #[test]
    fn test_equal_timestamps_are_ordered_by_id() {
        let mut store = MemoryStore::new();
        let x = resource("c1", "n", "t", 4);
        let y = resource("c1", "n", "t", 4);
        put_all(&mut store, &[x.clone(), y.clone()]);

        repair_links(&mut store, &RepairOptions::default()).unwrap();

        let mut expected = vec![x.id, y.id];
        expected.sort();
        assert_eq!(chain(&store, &x.family()), expected);
    }

    #[test]
    fn test_failed_family_is_rolled_back_and_reported() {
        let mut store = MemoryStore::new();
        let a1 = resource("a", "n", "t", 0);
        let a2 = resource("a", "n", "t", 1);
        let b1 = resource("b", "n", "t", 0);
        let b2 = resource("b", "n", "t", 1);
        put_all(&mut store, &[a1.clone(), a2.clone(), b1.clone(), b2.clone()]);
        store.fail_writes_to(a2.id);

        let report = repair_links(&mut store, &RepairOptions::default()).unwrap();
        assert_eq!(report.families_scanned, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].family, a1.family());
        assert_eq!(report.failures[0].resource_id, Some(a2.id));

        assert_eq!(store.get_resource(&a1.id).unwrap().unwrap().next_version_id, None);
        assert_eq!(store.family_head(&a1.family()).unwrap(), None);
        assert!(!store.in_transaction());

        assert_eq!(chain(&store, &b1.family()), vec![b1.id, b2.id]);
    }

    #[test]
    fn test_resume_skips_completed_families() {
        let mut store = MemoryStore::new();
        let a = resource("a", "n", "t", 0);
        let b = resource("b", "n", "t", 0);
        put_all(&mut store, &[a.clone(), b.clone()]);

        let options = RepairOptions {
            page_size: 1,
            resume_after: Some(a.family()),
        };
        let report = repair_links(&mut store, &options).unwrap();
        assert_eq!(report.families_scanned, 1);
        assert_eq!(report.last_completed_family, Some(b.family()));
        assert_eq!(store.family_head(&a.family()).unwrap(), None);
        assert_eq!(store.family_head(&b.family()).unwrap(), Some(b.id));
    }

    #[test]
    fn test_walks_more_families_than_one_page() {
        let mut store = MemoryStore::new();
        let mut heads = Vec::new();
        for collection in ["c1", "c2", "c3", "c4", "c5"] {
            let older = resource(collection, "n", "t", 0);
            let newer = resource(collection, "n", "t", 1);
            put_all(&mut store, &[older, newer.clone()]);
            heads.push(newer);
        }
        let options = RepairOptions {
            page_size: 2,
            resume_after: None,
        };

        let report = repair_links(&mut store, &options).unwrap();
        assert_eq!(report.families_scanned, 5);
        assert_eq!(report.resources_scanned, 10);
        assert_eq!(report.heads_updated, 5);
        assert_eq!(report.last_completed_family, Some(FamilyKey::new("c5", "n", "t")));
        for head in &heads {
            assert_eq!(store.family_head(&head.family()).unwrap(), Some(head.id));
            audit_family(&store, &head.family(), 2).unwrap();
        }

        let resumed = RepairOptions {
            page_size: 2,
            resume_after: Some(FamilyKey::new("c2", "n", "t")),
        };
        assert_eq!(repair_links(&mut store, &resumed).unwrap().families_scanned, 3);
    }

    #[test]
    fn test_zero_page_size() {
        let mut store = MemoryStore::new();
        let options = RepairOptions {
            page_size: 0,
            resume_after: None,
        };
        assert!(matches!(repair_links(&mut store, &options), Err(RepairError::InvalidPageSize)));
    }

    #[test]
    fn test_audit_detects_dangling_member() {
        let mut store = MemoryStore::new();
        let r1 = resource("c1", "n", "t", 0);
        let r2 = resource("c1", "n", "t", 1);
        put_all(&mut store, &[r1.clone(), r2.clone()]);
        store.set_family_head(&r1.family(), r2.id).unwrap();

        assert!(matches!(
            audit_family(&store, &r1.family(), 10),
            Err(RegistryError::BrokenChain { .. })
        ));
    }

    proptest! {
        /// Any creation order, page size and initial link garbage ends in one
        /// chain sorted by `(created, id)`, and a second run is a no-op.
        #[test]
        fn repaired_chain_follows_creation_order(
            offsets in prop::collection::vec(0i64..20, 1..12),
            page_size in 1usize..5,
            scramble in any::<bool>(),
        ) {
            let mut store = MemoryStore::new();
            let mut resources: Vec<Resource> =
                offsets.iter().map(|o| resource("c", "n", "t", *o)).collect();
            if scramble {
                let ids: Vec<Uuid> = resources.iter().map(|r| r.id).collect();
                for (i, r) in resources.iter_mut().enumerate() {
                    r.next_version_id = Some(ids[(i + 1) % ids.len()]);
                }
            }
            put_all(&mut store, &resources);

            let options = RepairOptions { page_size, resume_after: None };
            let report = repair_links(&mut store, &options).unwrap();
            prop_assert!(report.failures.is_empty());

            let mut expected: Vec<(DateTime<Utc>, Uuid)> =
                resources.iter().map(|r| (r.created, r.id)).collect();
            expected.sort();
            let expected: Vec<Uuid> = expected.into_iter().map(|(_, id)| id).collect();
            let family = resources[0].family();
            prop_assert_eq!(chain(&store, &family), expected);
            prop_assert!(audit_family(&store, &family, page_size).is_ok());

            let again = repair_links(&mut store, &options).unwrap();
            prop_assert_eq!(again.records_updated, 0);
            prop_assert_eq!(again.heads_updated, 0);
        }
    }
}
