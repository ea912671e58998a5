//! Database-backed feature flags with a short-TTL read-through cache.
//!
//! Flag changes propagate without restarts: readers see a new value within
//! the cache TTL. The sentinel flips `publisher_autopublish` through the
//! same store path every other writer uses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::{Caller, Store};

/// Known flags.
pub const PUBLISHER_AUTOPUBLISH: &str = "publisher_autopublish";
pub const LLM_COPY_AGENT: &str = "llm_copy_agent";
pub const INTEGRITY_SENTINEL: &str = "integrity_sentinel";
pub const AUTOROLLBACK_ON_INTEGRITY: &str = "autorollback_on_integrity";
pub const PARLAY_ENABLED: &str = "parlay_enabled";

const CACHE_TTL: Duration = Duration::from_secs(10);

/// Defaults when the flag row does not exist yet.
fn default_for(name: &str) -> bool {
    match name {
        PUBLISHER_AUTOPUBLISH => true,
        LLM_COPY_AGENT => false,
        INTEGRITY_SENTINEL => true,
        AUTOROLLBACK_ON_INTEGRITY => false,
        PARLAY_ENABLED => true,
        _ => false,
    }
}

struct CachedFlag {
    value: bool,
    fetched_at: Instant,
}

pub struct FeatureFlags {
    store: Arc<dyn Store>,
    cache: RwLock<HashMap<String, CachedFlag>>,
}

impl FeatureFlags {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Read through the cache; a stale entry refetches from the store.
    pub async fn is_enabled(&self, name: &str) -> Result<bool> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(name) {
                if cached.fetched_at.elapsed() < CACHE_TTL {
                    return Ok(cached.value);
                }
            }
        }

        let value = self
            .store
            .get_flag(name)
            .await?
            .unwrap_or_else(|| default_for(name));
        self.cache.write().await.insert(
            name.to_string(),
            CachedFlag {
                value,
                fetched_at: Instant::now(),
            },
        );
        Ok(value)
    }

    /// Write a flag and invalidate the local cache entry immediately.
    pub async fn set(&self, caller: Caller, name: &str, value: bool) -> Result<()> {
        self.store.set_flag(caller, name, value).await?;
        self.cache.write().await.insert(
            name.to_string(),
            CachedFlag {
                value,
                fetched_at: Instant::now(),
            },
        );
        Ok(())
    }
}
