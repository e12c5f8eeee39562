//! Key Namespacing Module
//!
//! Derives namespaced key names for values and tag indexes from a configured
//! instance name. Keys are opaque byte strings on the Redis side, so plain
//! prefix concatenation is sufficient; no escaping is needed.

// == Prefix Tags ==
/// Marker segment for value keys.
const VALUE_PREFIX_TAG: &str = "__RTCV_";

/// Marker segment for per-tag index keys. The global tag registry uses the
/// same segment without the trailing separator, which makes it distinct from
/// every real tag key by construction.
const TAG_PREFIX_TAG: &str = "__RTCT";

// == Key Namespacer ==
/// Derives namespaced keys from a configured instance name.
///
/// This allows partitioning a single backend cache for use with multiple
/// apps/services.
#[derive(Debug, Clone)]
pub struct KeyNamespacer {
    value_prefix: String,
    tag_prefix: String,
    tag_registry: String,
}

impl KeyNamespacer {
    /// Creates a namespacer for the given instance name.
    pub fn new(instance_name: &str) -> Self {
        Self {
            value_prefix: format!("{instance_name}{VALUE_PREFIX_TAG}"),
            tag_prefix: format!("{instance_name}{TAG_PREFIX_TAG}_"),
            tag_registry: format!("{instance_name}{TAG_PREFIX_TAG}"),
        }
    }

    /// Returns the storage key for a cache entry.
    pub fn value_key(&self, key: &str) -> String {
        format!("{}{key}", self.value_prefix)
    }

    /// Returns the sorted-set key holding the members of a tag.
    pub fn tag_key(&self, tag: &str) -> String {
        format!("{}{tag}", self.tag_prefix)
    }

    /// Returns the sorted-set key of the global tag registry.
    pub fn tag_registry_key(&self) -> &str {
        &self.tag_registry
    }
}
