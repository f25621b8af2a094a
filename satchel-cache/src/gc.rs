//! Garbage collection policy and tag index reconciliation.
//!
//! Item writes never read the index they replace, so the item records
//! and the tag sets drift apart over time: a set may hold members whose
//! item expired or stopped listing the tag, and an item may list tags
//! whose set no longer holds it. The reconciliation pass walks both
//! directions and restores the agreement; [`GcPolicy`] rate limits how
//! often a cache is willing to pay for that walk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use satchel_core::{
    time::ttl_from_expiration, CacheOptions, Expires, SatchelResult,
};
use satchel_store::{Store, WriteBatch};

use crate::tags::{encode_tags, TagIndex, DATA_FIELD, TAGS_FIELD};

// =============================================================================
// Optimize Report
// =============================================================================

/// Counts of what one reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Set members removed because their item vanished or stopped
    /// listing the tag.
    pub stale_members_removed: u64,
    /// Items whose tag list was trimmed to the sets that still hold
    /// them, plus records dropped for carrying a tag list without a
    /// payload.
    pub items_repaired: u64,
    /// Tag sets that ended the pass with no members and were dropped.
    pub empty_sets_dropped: u64,
}

impl OptimizeReport {
    /// True when the pass found nothing to change.
    pub fn is_clean(&self) -> bool {
        self.stale_members_removed == 0 && self.items_repaired == 0 && self.empty_sets_dropped == 0
    }
}

// =============================================================================
// GC Policy
// =============================================================================

/// Decides whether a garbage collection cycle may run.
///
/// The policy itself holds no clock. The interval lives in the store as
/// a marker record with its own expiration: while the marker is alive
/// the previous cycle is considered recent enough, and once it expires
/// the next [`collect_garbage`] call reseeds it and runs. The first
/// call after construction only seeds the marker, so a fleet of fresh
/// processes does not stampede the store with simultaneous passes.
///
/// [`collect_garbage`]: crate::TaggedCache::collect_garbage
#[derive(Debug)]
pub struct GcPolicy {
    optimize_after: Option<Expires>,
    primed: AtomicBool,
}

impl GcPolicy {
    /// Build the policy from cache options, validating the interval
    /// expression up front. `optimize_after: None` disables GC.
    pub fn from_options(options: &CacheOptions) -> SatchelResult<Self> {
        let optimize_after = options
            .optimize_after
            .as_ref()
            .map(|expr| Expires::from(expr.clone()));
        if let Some(expires) = &optimize_after {
            ttl_from_expiration(expires)?;
        }
        Ok(Self {
            optimize_after,
            primed: AtomicBool::new(false),
        })
    }

    pub fn enabled(&self) -> bool {
        self.optimize_after.is_some()
    }

    /// Marker lifetime for the current cycle, floored at one second so
    /// an already-elapsed interval still spaces consecutive cycles out.
    /// `None` when GC is disabled.
    pub fn marker_ttl_secs(&self) -> SatchelResult<Option<i64>> {
        match &self.optimize_after {
            Some(expires) => Ok(Some(ttl_from_expiration(expires)?.max(1))),
            None => Ok(None),
        }
    }

    /// Whether this instance has already seeded the marker once.
    pub fn primed(&self) -> bool {
        self.primed.load(Ordering::SeqCst)
    }

    pub fn set_primed(&self) {
        self.primed.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Walk the namespace and restore item/tag agreement.
///
/// Three phases, each applied before the next one reads:
/// 1. prune set members whose item is gone or no longer lists the tag,
/// 2. repair item records against the pruned sets: trim tag lists to
///    the tags whose set still holds the item, and drop records that
///    carry a tag list but no payload,
/// 3. count the sets the earlier phases emptied (the store drops them
///    on the last removal).
///
/// Set membership is the conservative truth here: a tag the sets never
/// knew about is dropped from the item rather than resurrected into the
/// set, so a concurrent tag-based purge is never undone. Repairs land
/// one item at a time behind a fresh liveness check; an item expiring
/// mid-pass at worst leaves a payload-less record that the next pass
/// drops.
pub(crate) async fn reconcile<S: Store>(store: &S, index: &TagIndex) -> SatchelResult<OptimizeReport> {
    let keyspace = index.keyspace();
    let mut report = OptimizeReport::default();

    // Phase 1: tag sets against item records.
    let set_keys = index.tag_set_keys(store).await?;
    let mut removals: Vec<(String, Vec<String>)> = Vec::new();
    let mut item_tags_memo: HashMap<String, Option<Vec<String>>> = HashMap::new();

    for set_key in &set_keys {
        let Some(tag) = keyspace.tag_of(set_key) else {
            continue;
        };
        let mut stale = Vec::new();
        for member in store.members(set_key).await? {
            if !item_tags_memo.contains_key(&member) {
                let tags = index.item_tags(store, &member).await?;
                item_tags_memo.insert(member.clone(), tags);
            }
            let listed = item_tags_memo[&member]
                .as_ref()
                .is_some_and(|tags| tags.iter().any(|t| t == tag));
            if !listed {
                stale.push(member);
            }
        }
        if !stale.is_empty() {
            removals.push((set_key.clone(), stale));
        }
    }

    let mut touched_sets: Vec<String> =
        removals.iter().map(|(set_key, _)| set_key.clone()).collect();
    if !removals.is_empty() {
        let mut batch = WriteBatch::new();
        for (set_key, members) in &removals {
            report.stale_members_removed += members.len() as u64;
            batch.remove_members(set_key.as_str(), members.clone());
        }
        store.apply(batch).await?;
    }

    // Phase 2: item records against the pruned sets.
    for key in store.scan_prefix(&keyspace.prefix()).await? {
        if keyspace.is_tag_key(&key) || keyspace.is_gc_marker_key(&key) {
            continue;
        }
        let Some(tags) = index.item_tags(store, &key).await? else {
            continue;
        };
        if store.field(&key, DATA_FIELD).await?.is_none() {
            // A tag list without a payload is what a repair that raced
            // the item's expiry leaves behind. The record reads as
            // present while holding nothing; drop it with its
            // memberships.
            let mut cleanup = WriteBatch::new();
            for tag in &tags {
                let set_key = keyspace.tag_key(tag);
                if store.is_member(&set_key, &key).await? {
                    cleanup.remove_members(set_key.as_str(), vec![key.clone()]);
                    report.stale_members_removed += 1;
                    touched_sets.push(set_key);
                }
            }
            cleanup.delete(key.as_str());
            store.apply(cleanup).await?;
            report.items_repaired += 1;
            continue;
        }
        let mut retained = Vec::with_capacity(tags.len());
        for tag in &tags {
            if store.is_member(&keyspace.tag_key(tag), &key).await? {
                retained.push(tag.clone());
            }
        }
        if retained.len() != tags.len() {
            // The item may have expired since its tags were read, and a
            // write now would recreate the record without an expiry.
            if !store.exists(&key).await? {
                continue;
            }
            let mut repair = WriteBatch::new();
            repair.put_field(key.as_str(), TAGS_FIELD, encode_tags(&retained)?);
            store.apply(repair).await?;
            report.items_repaired += 1;
        }
    }

    // Phase 3: removing the last member dropped the set key.
    touched_sets.sort();
    touched_sets.dedup();
    for set_key in &touched_sets {
        if !store.exists(set_key).await? {
            report.empty_sets_dropped += 1;
        }
    }

    Ok(report)
}

// =============================================================================
// Tests
// =============================================================================
