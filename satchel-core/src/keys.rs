//! Namespace-scoped key naming for cache records.
//!
//! Every physical key an adapter touches is derived through a `Keyspace`,
//! so two caches sharing one store can never collide as long as their
//! namespaces differ. Tag sets and the garbage-collection marker live
//! under reserved segments inside the same namespace, which keeps a
//! whole-namespace wipe a single prefix scan.

use crate::error::ConfigError;

/// Default separator between namespace and key segments.
pub const DEFAULT_SEPARATOR: &str = "::";

/// Reserved segment under which tag sets are stored.
const TAG_SEGMENT: &str = "tags";

/// Reserved key for the garbage-collection interval marker.
const GC_SEGMENT: &str = "__gc";

/// Derives the physical store keys for one cache namespace.
///
/// # Layout
///
/// For namespace `app` with the default separator:
///
/// - item:      `app::<key>`
/// - tag set:   `app::tags::<tag>`
/// - GC marker: `app::__gc`
///
/// Item-key derivation is idempotent: a key that already carries the
/// namespace prefix passes through unchanged. Recognition is a prefix
/// test, so tag sets and the GC marker are also inside the item prefix;
/// callers that need to tell them apart check [`Keyspace::is_tag_key`]
/// and [`Keyspace::is_gc_marker_key`] first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    namespace: String,
    separator: String,
}

impl Keyspace {
    /// Creates a keyspace with the default `"::"` separator.
    pub fn new(namespace: impl Into<String>) -> Result<Self, ConfigError> {
        Self::with_separator(namespace, DEFAULT_SEPARATOR)
    }

    /// Creates a keyspace with a custom separator.
    ///
    /// Both the namespace and the separator must be non-empty; an empty
    /// separator would make tag keys indistinguishable from item keys.
    pub fn with_separator(
        namespace: impl Into<String>,
        separator: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let namespace = namespace.into();
        let separator = separator.into();
        if namespace.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "namespace".to_string(),
            });
        }
        if separator.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "namespace_separator".to_string(),
                value: separator,
                reason: "must not be empty".to_string(),
            });
        }
        Ok(Self {
            namespace,
            separator,
        })
    }

    /// The namespace this keyspace scopes to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The segment separator in use.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Prefix shared by every physical key in this namespace.
    pub fn prefix(&self) -> String {
        format!("{}{}", self.namespace, self.separator)
    }

    /// Prefix shared by every tag-set key in this namespace.
    pub fn tag_prefix(&self) -> String {
        format!("{}{}{}{}", self.namespace, self.separator, TAG_SEGMENT, self.separator)
    }

    /// Physical key for an item.
    ///
    /// Idempotent: applying it to an already-derived key returns the key
    /// unchanged.
    pub fn item_key(&self, key: &str) -> String {
        if self.is_item_key(key) {
            key.to_string()
        } else {
            format!("{}{}", self.prefix(), key)
        }
    }

    /// Whether `key` carries this namespace's prefix.
    pub fn is_item_key(&self, key: &str) -> bool {
        key.starts_with(&self.prefix())
    }

    /// Physical key for a tag set.
    pub fn tag_key(&self, tag: &str) -> String {
        format!("{}{}", self.tag_prefix(), tag)
    }

    /// Whether `key` is a tag-set key in this namespace.
    pub fn is_tag_key(&self, key: &str) -> bool {
        key.starts_with(&self.tag_prefix())
    }

    /// Recovers the tag name from a tag-set key.
    ///
    /// Returns `None` when `key` is not a tag-set key of this namespace.
    pub fn tag_of<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.tag_prefix().as_str())
    }

    /// Physical key of the garbage-collection interval marker.
    pub fn gc_marker_key(&self) -> String {
        format!("{}{}", self.prefix(), GC_SEGMENT)
    }

    /// Whether `key` is this namespace's garbage-collection marker.
    pub fn is_gc_marker_key(&self, key: &str) -> bool {
        key == self.gc_marker_key()
    }
}
