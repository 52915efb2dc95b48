/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Bucket region discovery cache.
//!
//! The service reports a bucket's region through the `?location`
//! subresource; entries live here until a `NoSuchBucket` response proves
//! them stale. One process-wide cache is shared by default so clients
//! pointed at the same service agree on what they discovered, tests
//! inject their own instance.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// The region assumed when the service does not say otherwise.
pub const DEFAULT_REGION: &str = "us-east-1";

static SHARED: OnceLock<RegionCache> = OnceLock::new();

/// Concurrent bucket to region mapping.
#[derive(Clone, Debug, Default)]
pub struct RegionCache {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl RegionCache {
    /// Create an empty, independent cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache instance.
    pub fn shared() -> RegionCache {
        SHARED.get_or_init(RegionCache::new).clone()
    }

    pub(crate) fn get(&self, bucket: &str) -> Option<String> {
        self.inner.read().expect("region cache lock").get(bucket).cloned()
    }

    pub(crate) fn set(&self, bucket: &str, region: &str) {
        self.inner
            .write()
            .expect("region cache lock")
            .insert(bucket.to_string(), region.to_string());
    }

    pub(crate) fn remove(&self, bucket: &str) {
        self.inner.write().expect("region cache lock").remove(bucket);
    }
}

/// Map a reported `LocationConstraint` to a usable region name.
///
/// An empty constraint means `us-east-1`; the legacy `EU` constant names
/// `eu-west-1`; everything else passes through.
pub(crate) fn normalize_location(location: &str) -> String {
    match location {
        "" => DEFAULT_REGION.to_string(),
        "EU" => "eu-west-1".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_legacy_locations() {
        assert_eq!(normalize_location(""), "us-east-1");
        assert_eq!(normalize_location("EU"), "eu-west-1");
        assert_eq!(normalize_location("ap-south-1"), "ap-south-1");
    }

    #[test]
    fn cache_set_get_remove() {
        let cache = RegionCache::new();
        assert_eq!(cache.get("b"), None);
        cache.set("b", "eu-central-1");
        assert_eq!(cache.get("b").as_deref(), Some("eu-central-1"));
        cache.remove("b");
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn shared_cache_is_shared() {
        RegionCache::shared().set("shared-bucket", "us-west-2");
        assert_eq!(
            RegionCache::shared().get("shared-bucket").as_deref(),
            Some("us-west-2")
        );
        RegionCache::shared().remove("shared-bucket");
    }
}
