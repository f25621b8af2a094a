//! Tagged cache engine.
//!
//! [`TaggedCache`] binds a [`Store`] to one namespace and layers the
//! tagged-item protocol on top: every logical key becomes a namespaced
//! record holding the payload and its tag list, and every tag owns a
//! set of the physical keys carrying it. Writes are write-only; an
//! overwrite never reads the index entries it is replacing, and the
//! drift that leaves behind is repaired by [`optimize`].
//!
//! [`optimize`]: TaggedCache::optimize

use async_trait::async_trait;

use satchel_core::{
    time::{expires_to_timestamp, ttl_from_expiration},
    AdapterCapabilities, CacheOptions, Expires, Keyspace, SatchelResult,
};
use satchel_store::{Store, WriteBatch};

use crate::gc::{self, GcPolicy, OptimizeReport};
use crate::tags::{TagIndex, DATA_FIELD};

/// Keys removed per batch when flushing a namespace.
const DELETE_CHUNK: usize = 512;

// =============================================================================
// Write Options
// =============================================================================

/// Per-write options for [`TaggedCache::set`] and [`TaggedCache::add`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Tags to index the item under.
    pub tags: Vec<String>,
    /// Explicit TTL in seconds. Takes precedence over `expires` and the
    /// adapter default. Negative values clamp to zero, which deletes
    /// the item immediately.
    pub ttl: Option<i64>,
    /// Expiration to resolve when no explicit TTL is given.
    pub expires: Option<Expires>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_expires(mut self, expires: impl Into<Expires>) -> Self {
        self.expires = Some(expires.into());
        self
    }
}

/// How multiple tags combine when selecting items to purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagMatch {
    /// Items carrying every listed tag.
    #[default]
    All,
    /// Items carrying at least one listed tag.
    Any,
}

// =============================================================================
// Adapter Trait
// =============================================================================

/// Object-safe surface of a cache adapter.
///
/// [`TaggedCache`] implements this for any [`Store`]; the registry
/// hands adapters out behind `Arc<dyn CacheAdapter>` so callers do not
/// carry the backing store type around.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Namespace this adapter reads and writes.
    fn namespace(&self) -> &str;

    /// Administrative operations this adapter supports.
    fn capabilities(&self) -> AdapterCapabilities;

    /// Store `value` under `key`, unconditionally replacing any
    /// previous item, and index it under `options.tags`.
    async fn set(&self, key: &str, value: &[u8], options: &SetOptions) -> SatchelResult<()>;

    /// Store `value` only when `key` holds no live item. Returns whether
    /// the write happened. The existence check and the write are not
    /// atomic.
    async fn add(&self, key: &str, value: &[u8], options: &SetOptions) -> SatchelResult<bool>;

    /// Payload stored under `key`, or `None` when the item is missing
    /// or expired.
    async fn get(&self, key: &str) -> SatchelResult<Option<Vec<u8>>>;

    /// Whether `key` holds a live item.
    async fn exists(&self, key: &str) -> SatchelResult<bool>;

    /// Remove the item and its tag memberships. Returns whether an item
    /// was there to remove.
    async fn delete(&self, key: &str) -> SatchelResult<bool>;

    /// Remove every item selected by `tags` under the given match mode
    /// and purge the victims from the tag sets they belong to. Returns
    /// the number of items removed; a stale set member whose record is
    /// already gone is swept without being counted. An empty tag list
    /// selects nothing.
    async fn delete_by_tags(&self, tags: &[String], matching: TagMatch) -> SatchelResult<u64>;

    /// Remove everything in the namespace. Returns the number of item
    /// records removed; tag sets and the GC marker are wiped alongside.
    async fn delete_all(&self) -> SatchelResult<u64>;

    /// Reconcile item records and tag sets now, regardless of the GC
    /// interval.
    async fn optimize(&self) -> SatchelResult<OptimizeReport>;

    /// Run [`optimize`] if the GC interval has elapsed. Returns `None`
    /// when GC is disabled, the interval has not elapsed, or this call
    /// only seeded the interval marker.
    ///
    /// [`optimize`]: CacheAdapter::optimize
    async fn collect_garbage(&self) -> SatchelResult<Option<OptimizeReport>>;
}

// =============================================================================
// Tagged Cache
// =============================================================================

/// Resolved expiration for one write.
enum ResolvedExpiry {
    In(i64),
    At(i64),
}

/// Tagged cache over a [`Store`], scoped to one namespace.
#[derive(Debug)]
pub struct TaggedCache<S> {
    store: S,
    index: TagIndex,
    options: CacheOptions,
    gc: GcPolicy,
}

impl<S: Store> TaggedCache<S> {
    /// Bind `store` to the namespace in `options`, validating the
    /// namespace, separator, and GC interval up front.
    pub fn new(store: S, options: CacheOptions) -> SatchelResult<Self> {
        let keyspace = Keyspace::with_separator(
            options.namespace.as_str(),
            options.namespace_separator.as_str(),
        )?;
        let gc = GcPolicy::from_options(&options)?;
        Ok(Self {
            store,
            index: TagIndex::new(keyspace),
            options,
            gc,
        })
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn keyspace(&self) -> &Keyspace {
        self.index.keyspace()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Tags recorded on an item, or `None` when the item is missing.
    pub async fn item_tags(&self, key: &str) -> SatchelResult<Option<Vec<String>>> {
        self.index.item_tags(&self.store, key).await
    }

    /// Physical keys currently indexed under `tag`.
    pub async fn tagged_items(&self, tag: &str) -> SatchelResult<Vec<String>> {
        self.index.tagged_items(&self.store, tag).await
    }

    /// TTL precedence: explicit TTL, then `expires`, then the adapter
    /// default. Relative expirations ship as a TTL so the store applies
    /// them against its own clock; absolute ones ship as a deadline.
    fn resolve_expiry(&self, options: &SetOptions) -> SatchelResult<ResolvedExpiry> {
        if let Some(ttl) = options.ttl {
            return Ok(ResolvedExpiry::In(ttl.max(0)));
        }
        if let Some(expires) = &options.expires {
            if expires.is_relative() {
                return Ok(ResolvedExpiry::In(ttl_from_expiration(expires)?));
            }
            return Ok(ResolvedExpiry::At(expires_to_timestamp(expires)?));
        }
        Ok(ResolvedExpiry::In(self.options.ttl.max(0)))
    }

    pub async fn set(&self, key: &str, value: &[u8], options: &SetOptions) -> SatchelResult<()> {
        let physical = self.keyspace().item_key(key);
        let expiry = self.resolve_expiry(options)?;

        let mut batch = WriteBatch::new();
        batch.put_field(physical.as_str(), DATA_FIELD, value.to_vec());
        self.index.append_set_ops(&mut batch, &physical, &options.tags)?;
        match expiry {
            ResolvedExpiry::In(ttl) => batch.expire_in(physical.as_str(), ttl),
            ResolvedExpiry::At(epoch) => batch.expire_at(physical.as_str(), epoch),
        };
        self.store.apply(batch).await?;
        Ok(())
    }

    pub async fn add(&self, key: &str, value: &[u8], options: &SetOptions) -> SatchelResult<bool> {
        let physical = self.keyspace().item_key(key);
        if self.store.exists(&physical).await? {
            return Ok(false);
        }
        self.set(key, value, options).await?;
        Ok(true)
    }

    pub async fn get(&self, key: &str) -> SatchelResult<Option<Vec<u8>>> {
        let physical = self.keyspace().item_key(key);
        Ok(self.store.field(&physical, DATA_FIELD).await?)
    }

    pub async fn exists(&self, key: &str) -> SatchelResult<bool> {
        let physical = self.keyspace().item_key(key);
        Ok(self.store.exists(&physical).await?)
    }

    pub async fn delete(&self, key: &str) -> SatchelResult<bool> {
        let physical = self.keyspace().item_key(key);
        if !self.store.exists(&physical).await? {
            return Ok(false);
        }
        let tags = self.item_tags(&physical).await?.unwrap_or_default();

        let mut batch = WriteBatch::new();
        for tag in &tags {
            batch.remove_members(self.keyspace().tag_key(tag), vec![physical.clone()]);
        }
        batch.delete(physical.as_str());
        self.store.apply(batch).await?;
        Ok(true)
    }

    pub async fn delete_by_tags(&self, tags: &[String], matching: TagMatch) -> SatchelResult<u64> {
        if tags.is_empty() {
            return Ok(0);
        }
        let set_keys: Vec<String> = tags.iter().map(|t| self.keyspace().tag_key(t)).collect();
        let victims = match matching {
            TagMatch::All => self.store.intersection(&set_keys).await?,
            TagMatch::Any => self.store.union(&set_keys).await?,
        };
        if victims.is_empty() {
            return Ok(0);
        }

        // The sets may hold members whose record is already gone; only
        // victims observed live count toward the removal total.
        let mut removed = 0;
        let mut batch = WriteBatch::new();
        for victim in &victims {
            if let Some(victim_tags) = self.index.item_tags(&self.store, victim).await? {
                for tag in &victim_tags {
                    batch.remove_members(self.keyspace().tag_key(tag), vec![victim.clone()]);
                }
                removed += 1;
            }
            batch.delete(victim.as_str());
        }
        // Victims whose tag list drifted may still sit in the filter
        // sets; sweep those explicitly.
        for set_key in &set_keys {
            batch.remove_members(set_key.as_str(), victims.clone());
        }
        self.store.apply(batch).await?;
        Ok(removed)
    }

    pub async fn delete_all(&self) -> SatchelResult<u64> {
        let keys = self.store.scan_prefix(&self.keyspace().prefix()).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let items = keys
            .iter()
            .filter(|k| !self.keyspace().is_tag_key(k) && !self.keyspace().is_gc_marker_key(k))
            .count() as u64;
        for chunk in keys.chunks(DELETE_CHUNK) {
            let mut batch = WriteBatch::new();
            for key in chunk {
                batch.delete(key.as_str());
            }
            self.store.apply(batch).await?;
        }
        tracing::info!(
            namespace = %self.keyspace().namespace(),
            items,
            "Cache namespace flushed"
        );
        Ok(items)
    }

    pub async fn optimize(&self) -> SatchelResult<OptimizeReport> {
        let report = gc::reconcile(&self.store, &self.index).await?;
        if report.is_clean() {
            tracing::trace!(
                namespace = %self.keyspace().namespace(),
                "Tag index reconciliation found nothing to repair"
            );
        } else {
            tracing::info!(
                namespace = %self.keyspace().namespace(),
                stale_members = report.stale_members_removed,
                repaired_items = report.items_repaired,
                dropped_sets = report.empty_sets_dropped,
                "Tag index reconciliation completed"
            );
        }
        Ok(report)
    }

    pub async fn collect_garbage(&self) -> SatchelResult<Option<OptimizeReport>> {
        let Some(marker_ttl) = self.gc.marker_ttl_secs()? else {
            return Ok(None);
        };
        let marker = self.keyspace().gc_marker_key();
        if self.store.exists(&marker).await? {
            tracing::trace!(
                namespace = %self.keyspace().namespace(),
                "Garbage collection interval has not elapsed"
            );
            return Ok(None);
        }

        let seeding = !self.gc.primed();
        let mut batch = WriteBatch::new();
        batch.put_field(marker.as_str(), DATA_FIELD, b"1".to_vec());
        batch.expire_in(marker.as_str(), marker_ttl);
        self.store.apply(batch).await?;
        self.gc.set_primed();

        if seeding {
            tracing::debug!(
                namespace = %self.keyspace().namespace(),
                interval_secs = marker_ttl,
                "Garbage collection marker seeded"
            );
            return Ok(None);
        }
        let report = self.optimize().await?;
        Ok(Some(report))
    }
}

#[async_trait]
impl<S: Store> CacheAdapter for TaggedCache<S> {
    fn namespace(&self) -> &str {
        self.keyspace().namespace()
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities::DELETE_ALL | AdapterCapabilities::OPTIMIZE
    }

    async fn set(&self, key: &str, value: &[u8], options: &SetOptions) -> SatchelResult<()> {
        TaggedCache::set(self, key, value, options).await
    }

    async fn add(&self, key: &str, value: &[u8], options: &SetOptions) -> SatchelResult<bool> {
        TaggedCache::add(self, key, value, options).await
    }

    async fn get(&self, key: &str) -> SatchelResult<Option<Vec<u8>>> {
        TaggedCache::get(self, key).await
    }

    async fn exists(&self, key: &str) -> SatchelResult<bool> {
        TaggedCache::exists(self, key).await
    }

    async fn delete(&self, key: &str) -> SatchelResult<bool> {
        TaggedCache::delete(self, key).await
    }

    async fn delete_by_tags(&self, tags: &[String], matching: TagMatch) -> SatchelResult<u64> {
        TaggedCache::delete_by_tags(self, tags, matching).await
    }

    async fn delete_all(&self) -> SatchelResult<u64> {
        TaggedCache::delete_all(self).await
    }

    async fn optimize(&self) -> SatchelResult<OptimizeReport> {
        TaggedCache::optimize(self).await
    }

    async fn collect_garbage(&self) -> SatchelResult<Option<OptimizeReport>> {
        TaggedCache::collect_garbage(self).await
    }
}

// =============================================================================
// Tests
// =============================================================================
