use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{CacheKey, Clock, ResourceKind};

/// Status and traffic change slowly; an hour keeps call volume low.
pub const DEFAULT_STATUS_TTL_MINUTES: i64 = 60;

/// Action logs are short-lived and never served from cache.
pub const DEFAULT_ACTION_LOGS_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    #[serde(rename = "timestamp")]
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T, cached_at: DateTime<Utc>) -> Self {
        Self { data, cached_at }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.cached_at
    }

    /// Fresh while younger than `ttl`. A timestamp in the future counts as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = self.age(now).num_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Time-to-live per resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub status: Duration,
    pub action_logs: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            status: Duration::minutes(DEFAULT_STATUS_TTL_MINUTES),
            action_logs: Duration::minutes(DEFAULT_ACTION_LOGS_TTL_MINUTES),
        }
    }
}

impl CacheTtls {
    pub fn for_kind(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Status => self.status,
            ResourceKind::ActionLogs => self.action_logs,
        }
    }
}

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub data: Value,
    pub cached_at: DateTime<Utc>,
    pub fresh: bool,
}

/// Per-server resource cache, one JSON record per `(server, kind)`.
///
/// Records live on disk so they survive restarts; `clear` wipes them on logout.
pub struct ResourceCache {
    dir: PathBuf,
    ttls: CacheTtls,
    clock: Arc<dyn Clock>,
    write_seq: AtomicU64,
}

impl ResourceCache {
    pub fn new(dir: PathBuf, ttls: CacheTtls, clock: Arc<dyn Clock>) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        Ok(Self {
            dir,
            ttls,
            clock,
            write_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn ttl(&self, kind: ResourceKind) -> Duration {
        self.ttls.for_kind(kind)
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    fn load(&self, key: &CacheKey) -> Result<Option<CachedData<Value>>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache entry: {}", key))?;
        let cached: CachedData<Value> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache entry: {}", key))?;

        Ok(Some(cached))
    }

    /// Stored value and whether it is still within its kind's TTL.
    /// Unreadable entries count as absent.
    pub fn get(&self, key: &CacheKey) -> Option<CacheLookup> {
        match self.load(key) {
            Ok(Some(cached)) => {
                let fresh = cached.is_fresh(self.now(), self.ttl(key.kind));
                Some(CacheLookup {
                    data: cached.data,
                    cached_at: cached.cached_at,
                    fresh,
                })
            }
            Ok(None) => None,
            Err(e) => {
                debug!(cache = %key, error = %e, "Failed to load cache entry");
                None
            }
        }
    }

    /// Replace the entry for `key`. Readers see either the old or the new record.
    pub fn put(&self, key: &CacheKey, data: Value, now: DateTime<Utc>) -> Result<()> {
        let cached = CachedData::new(data, now);
        let contents = serde_json::to_string_pretty(&cached)?;

        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!(".{}.{}.tmp", key.file_name(), seq));
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write cache entry: {}", key))?;
        std::fs::rename(&tmp, self.entry_path(key))
            .with_context(|| format!("Failed to replace cache entry: {}", key))?;

        debug!(cache = %key, "Cache entry stored");
        Ok(())
    }

    pub fn invalidate(&self, key: &CacheKey) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove cache entry: {}", key))?;
        }
        Ok(())
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }

    /// How old the entry is, for display. `None` when nothing is cached.
    pub fn age_display(&self, key: &CacheKey) -> Option<String> {
        match self.load(key) {
            Ok(Some(cached)) => Some(cached.age_display(self.now())),
            Ok(None) => None,
            Err(e) => {
                debug!(cache = %key, error = %e, "Failed to load cache for age display");
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ManualClock;
    use serde_json::json;

    fn cache_with_clock() -> (tempfile::TempDir, ResourceCache, Arc<ManualClock>) {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new();
        let cache = ResourceCache::new(
            dir.path().join("resources"),
            CacheTtls::default(),
            clock.clone(),
        )
        .unwrap();
        (dir, cache, clock)
    }

    #[test]
    fn test_cached_data_age_display() {
        let now = Utc::now();
        assert_eq!(CachedData::new(1, now).age_display(now), "just now");
        assert_eq!(
            CachedData::new(1, now - Duration::minutes(5)).age_display(now),
            "5m ago"
        );
        assert_eq!(
            CachedData::new(1, now - Duration::minutes(95)).age_display(now),
            "2h ago"
        );
        assert_eq!(
            CachedData::new(1, now + Duration::minutes(3)).age_display(now),
            "just now"
        );
    }

    #[test]
    fn test_freshness_is_strictly_below_ttl() {
        let now = Utc::now();
        let ttl = Duration::minutes(60);
        assert!(CachedData::new(1, now - Duration::minutes(59)).is_fresh(now, ttl));
        assert!(!CachedData::new(1, now - Duration::minutes(60)).is_fresh(now, ttl));
    }

    #[test]
    fn test_get_reports_freshness_per_kind() {
        let (_dir, cache, clock) = cache_with_clock();
        let status = CacheKey::new("vm-1", ResourceKind::Status);
        let logs = CacheKey::new("vm-1", ResourceKind::ActionLogs);

        cache.put(&status, json!({"status": "RUNNING"}), clock.now()).unwrap();
        cache.put(&logs, json!([]), clock.now()).unwrap();

        clock.advance(Duration::minutes(10));
        assert!(cache.get(&status).unwrap().fresh);
        assert!(!cache.get(&logs).unwrap().fresh);

        clock.advance(Duration::minutes(55));
        let stale = cache.get(&status).unwrap();
        assert!(!stale.fresh);
        assert_eq!(stale.data, json!({"status": "RUNNING"}));
    }

    #[test]
    fn test_put_overwrites_and_invalidate_removes() {
        let (_dir, cache, clock) = cache_with_clock();
        let key = CacheKey::new("vm-1", ResourceKind::Status);

        assert!(cache.get(&key).is_none());
        cache.put(&key, json!(1), clock.now()).unwrap();
        cache.put(&key, json!(2), clock.now()).unwrap();
        assert_eq!(cache.get(&key).unwrap().data, json!(2));

        cache.invalidate(&key).unwrap();
        assert!(cache.get(&key).is_none());
        // Invalidating a missing entry is fine
        cache.invalidate(&key).unwrap();
    }

    #[test]
    fn test_servers_do_not_collide() {
        let (_dir, cache, clock) = cache_with_clock();
        let a = CacheKey::new("vm-1", ResourceKind::Status);
        let b = CacheKey::new("vm-2", ResourceKind::Status);

        cache.put(&a, json!("a"), clock.now()).unwrap();
        cache.put(&b, json!("b"), clock.now()).unwrap();

        assert_eq!(cache.get(&a).unwrap().data, json!("a"));
        assert_eq!(cache.get(&b).unwrap().data, json!("b"));
    }

    #[test]
    fn test_entries_survive_reopen_and_clear() {
        let (dir, cache, clock) = cache_with_clock();
        let key = CacheKey::new("vm-1", ResourceKind::Status);
        cache.put(&key, json!({"ok": true}), clock.now()).unwrap();
        drop(cache);

        let reopened = ResourceCache::new(
            dir.path().join("resources"),
            CacheTtls::default(),
            clock.clone(),
        )
        .unwrap();
        assert!(reopened.get(&key).unwrap().fresh);

        reopened.clear().unwrap();
        assert!(reopened.get(&key).is_none());
    }

    #[test]
    fn test_corrupt_entry_is_absent() {
        let (_dir, cache, _clock) = cache_with_clock();
        let key = CacheKey::new("vm-1", ResourceKind::Status);
        std::fs::write(cache.dir().join(key.file_name()), "{not json").unwrap();

        assert!(cache.get(&key).is_none());
        assert!(cache.age_display(&key).is_none());
    }

    #[test]
    fn test_record_layout() {
        let (_dir, cache, clock) = cache_with_clock();
        let key = CacheKey::new("vm-1", ResourceKind::Status);
        cache.put(&key, json!({"a": 1}), clock.now()).unwrap();

        let raw = std::fs::read_to_string(cache.dir().join(key.file_name())).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["data"], json!({"a": 1}));
        assert!(value["timestamp"].is_string());
    }
}
