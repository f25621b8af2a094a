//! Tag index maintenance.
//!
//! Every item record carries its payload in the `data` field and a
//! JSON-encoded list of its tags in the `tags` field, and every tag
//! owns a set keyed under the namespace's tag prefix whose members are
//! physical item keys. `TagIndex` is the one place that knows both
//! halves of that layout: it appends the index writes that accompany
//! an item write, and it reads either direction back (item to tags,
//! tag to items).

use satchel_core::{Keyspace, SatchelResult, StoreError};
use satchel_store::{Store, WriteBatch};

/// Record field holding the item payload.
pub(crate) const DATA_FIELD: &str = "data";

/// Record field holding the JSON-encoded tag list of an item.
pub(crate) const TAGS_FIELD: &str = "tags";

// =============================================================================
// Tag Codec
// =============================================================================

pub(crate) fn encode_tags(tags: &[String]) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(tags).map_err(|e| StoreError::Serialization {
        what: "tags".to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn decode_tags(bytes: &[u8]) -> Result<Vec<String>, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization {
        what: "tags".to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Tag Index
// =============================================================================

/// Reader and writer for the item/tag cross references of one namespace.
#[derive(Debug, Clone)]
pub struct TagIndex {
    keyspace: Keyspace,
}

impl TagIndex {
    pub fn new(keyspace: Keyspace) -> Self {
        Self { keyspace }
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// Append the index writes for storing `physical_key` under `tags`:
    /// the JSON tag list on the record itself plus one set insertion per
    /// tag. The caller owns the batch so the item write and its index
    /// writes land in a single atomic apply.
    pub fn append_set_ops(
        &self,
        batch: &mut WriteBatch,
        physical_key: &str,
        tags: &[String],
    ) -> Result<(), StoreError> {
        batch.put_field(physical_key, TAGS_FIELD, encode_tags(tags)?);
        for tag in tags {
            batch.add_members(self.keyspace.tag_key(tag), vec![physical_key.to_string()]);
        }
        Ok(())
    }

    /// Tags recorded on an item, or `None` when the record (or its tag
    /// field) is missing. Accepts logical or physical keys.
    pub async fn item_tags<S: Store + ?Sized>(
        &self,
        store: &S,
        key: &str,
    ) -> SatchelResult<Option<Vec<String>>> {
        let physical = self.keyspace.item_key(key);
        match store.field(&physical, TAGS_FIELD).await? {
            Some(bytes) => Ok(Some(decode_tags(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Physical keys of the items currently indexed under `tag`. Empty
    /// when the tag has no set.
    pub async fn tagged_items<S: Store + ?Sized>(
        &self,
        store: &S,
        tag: &str,
    ) -> SatchelResult<Vec<String>> {
        Ok(store.members(&self.keyspace.tag_key(tag)).await?)
    }

    /// Every tag set key currently present in the namespace.
    pub async fn tag_set_keys<S: Store + ?Sized>(&self, store: &S) -> SatchelResult<Vec<String>> {
        Ok(store.scan_prefix(&self.keyspace.tag_prefix()).await?)
    }
}

// =============================================================================
// Tests
// =============================================================================
