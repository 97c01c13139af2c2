use overseer_core::RoutingDecision;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    task: String,
    team_signature: String,
}

struct CachedDecision {
    decision: Arc<RoutingDecision>,
    inserted_at: Instant,
}

/// Bounded TTL cache from `(task, team signature)` to a routing decision.
///
/// Entries are immutable: a lookup hands out a shared pointer and an insert
/// replaces the whole entry.
pub struct RoutingCache {
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<CacheKey, CachedDecision>>,
}

impl RoutingCache {
    /// Create a cache. A zero capacity is treated as one entry.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn key(task: &str, team_signature: &str) -> CacheKey {
        CacheKey {
            task: task.trim().to_string(),
            team_signature: team_signature.to_string(),
        }
    }

    /// Cached decision, unless missing or expired.
    pub fn get(&self, task: &str, team_signature: &str) -> Option<Arc<RoutingDecision>> {
        let entries = self.entries.read();
        entries
            .get(&Self::key(task, team_signature))
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| Arc::clone(&e.decision))
    }

    /// Insert or replace a decision, evicting the oldest entry when full.
    pub fn insert(&self, task: &str, team_signature: &str, decision: Arc<RoutingDecision>) {
        let key = Self::key(task, team_signature);
        let mut entries = self.entries.write();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CachedDecision {
                decision,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        before - entries.len()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entry time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn decision(worker: &str) -> Arc<RoutingDecision> {
        Arc::new(RoutingDecision::delegated(worker))
    }

    #[test]
    fn test_hit_and_team_isolation() {
        let cache = RoutingCache::new(Duration::from_secs(60), 8);
        cache.insert("2+2", "team-a", decision("Analyst"));

        let hit = cache.get("  2+2 ", "team-a").unwrap();
        assert_eq!(hit.assigned_workers, vec!["Analyst"]);
        assert!(cache.get("2+2", "team-b").is_none());
        assert!(cache.get("3+3", "team-a").is_none());
    }

    #[test]
    fn test_expired_entries_miss_and_purge() {
        let cache = RoutingCache::new(Duration::from_millis(20), 8);
        cache.insert("task", "team", decision("A"));
        std::thread::sleep(Duration::from_millis(40));

        assert!(cache.get("task", "team").is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = RoutingCache::new(Duration::from_secs(60), 2);
        cache.insert("one", "t", decision("A"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("two", "t", decision("B"));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("three", "t", decision("C"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("one", "t").is_none());
        assert!(cache.get("two", "t").is_some());
        assert!(cache.get("three", "t").is_some());
    }

    #[test]
    fn test_overwrite_and_clear() {
        let cache = RoutingCache::new(Duration::from_secs(60), 1);
        cache.insert("task", "t", decision("A"));
        cache.insert("task", "t", decision("B"));
        assert_eq!(cache.get("task", "t").unwrap().assigned_workers, vec!["B"]);
        cache.clear();
        assert!(cache.is_empty());
    }
}
