// Remembers hostname resolutions, unknown hostnames included, so repeated
// requests for the same host skip the registry. Entries expire after a fixed
// time to live.
use crate::metrics_defs::{HOSTNAME_CACHE_HIT, HOSTNAME_CACHE_MISS};
use moka::sync::Cache;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use tenancy::TenantDescriptor;

pub struct HostnameCache {
    // `None` records a hostname that belongs to no tenant.
    cache: Cache<String, Option<Arc<TenantDescriptor>>>,
}

impl HostnameCache {
    pub fn new(size: u64, ttl: Duration) -> Self {
        HostnameCache {
            cache: Cache::builder().max_capacity(size).time_to_live(ttl).build(),
        }
    }

    /// `Some(None)` when the hostname is cached as unknown.
    pub fn get(&self, hostname: &str) -> Option<Option<Arc<TenantDescriptor>>> {
        let cached = self.cache.get(hostname);
        match &cached {
            Some(Some(_)) => counter!(HOSTNAME_CACHE_HIT, "result" => "tenant").increment(1),
            Some(None) => counter!(HOSTNAME_CACHE_HIT, "result" => "unknown").increment(1),
            None => counter!(HOSTNAME_CACHE_MISS).increment(1),
        }
        cached
    }

    pub fn insert(&self, hostname: String, descriptor: Option<Arc<TenantDescriptor>>) {
        self.cache.insert(hostname, descriptor);
    }
}
