//! Two-tier cache for computed dashboard widget payloads.
//!
//! The memory tier is a read-through accelerator in front of the persistent
//! tier ([`WidgetCacheStore`]). Only owner-scoped entries are persisted. Every
//! storage failure is logged and degrades to a miss on read or a dropped write;
//! callers never see an error.

mod key;
mod ttl;

pub use key::CacheKey;
pub use ttl::{WidgetTtlTable, DEFAULT_WIDGET_TTL};

use crate::clock::Clock;
use crate::dashboard_store::WidgetCacheStore;
use crate::metrics;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: JsonValue,
    expires_at: DateTime<Utc>,
    hit_count: u64,
    last_accessed_at: Option<DateTime<Utc>>,
}

/// Outcome of a [`WidgetCache::cleanup`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheCleanupStats {
    pub memory_evicted: usize,
    /// `None` when the persistent sweep failed.
    pub persistent_deleted: Option<usize>,
}

pub struct WidgetCache {
    memory: Mutex<HashMap<String, MemoryEntry>>,
    /// Bumped under the memory lock by every invalidation.
    generation: AtomicU64,
    store: Arc<dyn WidgetCacheStore>,
    clock: Arc<dyn Clock>,
    ttls: WidgetTtlTable,
}

impl WidgetCache {
    pub fn new(
        store: Arc<dyn WidgetCacheStore>,
        clock: Arc<dyn Clock>,
        ttls: WidgetTtlTable,
    ) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            store,
            clock,
            ttls,
        }
    }

    fn memory(&self) -> MutexGuard<'_, HashMap<String, MemoryEntry>> {
        // Entries are plain data, a panic elsewhere cannot leave them torn
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// TTL configured for a widget.
    pub fn ttl_for(&self, widget_id: &str) -> Duration {
        self.ttls.ttl_for(widget_id)
    }

    pub fn get(&self, key: &CacheKey) -> Option<JsonValue> {
        let now = self.clock.now();
        let rendered = key.to_string();

        {
            let mut memory = self.memory();
            match memory.get_mut(&rendered) {
                Some(entry) if now < entry.expires_at => {
                    entry.hit_count += 1;
                    entry.last_accessed_at = Some(now);
                    metrics::record_widget_cache_lookup("memory", "hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {
                    memory.remove(&rendered);
                }
                None => {}
            }
        }
        metrics::record_widget_cache_lookup("memory", "miss");

        let owner_id = key.owner_id()?;
        let generation = self.generation.load(Ordering::SeqCst);
        let row = match self.store.get_cached_widget(key.widget_id(), owner_id) {
            Ok(Some(row)) if row.is_live_at(now) => row,
            Ok(_) => {
                metrics::record_widget_cache_lookup("persistent", "miss");
                return None;
            }
            Err(e) => {
                warn!("Widget cache read failed for {}: {:#}", rendered, e);
                metrics::record_widget_cache_lookup("persistent", "error");
                return None;
            }
        };
        metrics::record_widget_cache_lookup("persistent", "hit");

        {
            let mut memory = self.memory();
            // An invalidation may have deleted the row after it was read
            if self.generation.load(Ordering::SeqCst) == generation {
                // A concurrent set may have landed while the store was queried
                memory.entry(rendered.clone()).or_insert_with(|| MemoryEntry {
                    value: row.data.clone(),
                    expires_at: row.expires_at,
                    hit_count: row.hit_count + 1,
                    last_accessed_at: Some(now),
                });
            } else {
                debug!("Skipping memory backfill of invalidated entry {}", rendered);
            }
        }

        if let Err(e) = self
            .store
            .record_cached_widget_hit(key.widget_id(), owner_id, now)
        {
            warn!("Failed to record widget cache hit for {}: {:#}", rendered, e);
        }

        Some(row.data)
    }

    /// Stores `value` under `key` until `now + ttl`.
    pub fn set(&self, key: &CacheKey, value: JsonValue, ttl: Duration) {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let rendered = key.to_string();

        {
            let mut memory = self.memory();
            let hit_count = memory.get(&rendered).map_or(0, |e| e.hit_count);
            let last_accessed_at = memory.get(&rendered).and_then(|e| e.last_accessed_at);
            memory.insert(
                rendered.clone(),
                MemoryEntry {
                    value: value.clone(),
                    expires_at,
                    hit_count,
                    last_accessed_at,
                },
            );
        }
        metrics::record_widget_cache_write("memory", "ok");

        let Some(owner_id) = key.owner_id() else {
            return;
        };
        match self
            .store
            .upsert_cached_widget(key.widget_id(), owner_id, &value, expires_at)
        {
            Ok(()) => metrics::record_widget_cache_write("persistent", "ok"),
            Err(e) => {
                warn!("Widget cache write failed for {}: {:#}", rendered, e);
                metrics::record_widget_cache_write("persistent", "error");
            }
        }
    }

    /// Stores `value` with the TTL configured for the key's widget.
    pub fn set_with_widget_ttl(&self, key: &CacheKey, value: JsonValue) {
        let ttl = self.ttl_for(key.widget_id());
        self.set(key, value, ttl);
    }

    /// Removes every memory entry whose rendered key contains `pattern`.
    ///
    /// When `pattern` names a widget, either as a rendered key or as a bare
    /// `{widget_id}` / `{widget_id}:{owner_id}`, the matching persistent rows
    /// are deleted too: one row for an owner-scoped key, every owner's row for
    /// a global one. Returns the number of memory entries removed.
    pub fn invalidate(&self, pattern: &str) -> usize {
        if pattern.is_empty() {
            return 0;
        }

        match CacheKey::from_pattern(pattern) {
            Some(key) => self.delete_persistent(&key),
            None => debug!(
                "Invalidation pattern '{}' is not a widget key, persistent tier untouched",
                pattern
            ),
        }

        let mut memory = self.lock_for_invalidation();
        let before = memory.len();
        memory.retain(|key, _| !key.contains(pattern));
        before - memory.len()
    }

    /// Exact variant of [`invalidate`](Self::invalidate). A global key removes
    /// every entry of its widget, an owner-scoped key exactly one entry.
    pub fn invalidate_key(&self, key: &CacheKey) -> usize {
        self.delete_persistent(key);

        let rendered = key.to_string();
        let mut memory = self.lock_for_invalidation();
        let before = memory.len();
        if key.is_owner_scoped() {
            memory.remove(&rendered);
        } else {
            let owner_prefix = format!("{}:", rendered);
            memory.retain(|k, _| k != &rendered && !k.starts_with(&owner_prefix));
        }
        before - memory.len()
    }

    /// Memory guard for removals. Callers delete persistent rows first.
    fn lock_for_invalidation(&self) -> MutexGuard<'_, HashMap<String, MemoryEntry>> {
        let memory = self.memory();
        self.generation.fetch_add(1, Ordering::SeqCst);
        memory
    }

    fn delete_persistent(&self, key: &CacheKey) {
        let result = match key.owner_id() {
            Some(owner_id) => self
                .store
                .delete_cached_widget(key.widget_id(), owner_id)
                .map(usize::from),
            None => self.store.delete_cached_widgets_for_widget(key.widget_id()),
        };
        match result {
            Ok(deleted) => debug!("Deleted {} persisted entries for {}", deleted, key),
            Err(e) => warn!("Failed to delete persisted entries for {}: {:#}", key, e),
        }
    }

    /// Empties the memory tier and sweeps expired persistent rows.
    /// Live persistent rows are kept.
    pub fn clear(&self) {
        self.lock_for_invalidation().clear();
        metrics::set_widget_cache_memory_entries(0);
        self.sweep_persistent();
    }

    /// Evicts expired entries from both tiers.
    pub fn cleanup(&self) -> CacheCleanupStats {
        let now = self.clock.now();
        let (memory_evicted, remaining) = {
            let mut memory = self.memory();
            let before = memory.len();
            memory.retain(|_, entry| now < entry.expires_at);
            (before - memory.len(), memory.len())
        };
        metrics::set_widget_cache_memory_entries(remaining);

        CacheCleanupStats {
            memory_evicted,
            persistent_deleted: self.sweep_persistent(),
        }
    }

    fn sweep_persistent(&self) -> Option<usize> {
        match self.store.delete_expired_cached_widgets(self.clock.now()) {
            Ok(deleted) => Some(deleted),
            Err(e) => {
                warn!("Failed to delete expired widget cache rows: {:#}", e);
                None
            }
        }
    }

    /// Number of entries in the memory tier, expired ones included.
    pub fn memory_len(&self) -> usize {
        self.memory().len()
    }
}
