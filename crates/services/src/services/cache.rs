//! In-memory memoization of hot repository lookups.
//!
//! Projects and boards are cached by id and memberships by
//! `(project_id, user_id)`. Nothing is invalidated automatically: every
//! write path in the services calls the matching `invalidate*` method.
//! Board writes that move positions drop the whole project's boards.

use std::{
    future::Future,
    hash::Hash,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use db::models::{board::Board, project::Project, project::ProjectRole};
use uuid::Uuid;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: DEFAULT_CACHE_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Thread-safe TTL cache with a bounded number of entries.
pub struct EntityCache<K, V> {
    inner: Arc<DashMap<K, CacheEntry<V>>>,
    config: CacheConfig,
}

impl<K, V> Clone for EntityCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config,
        }
    }
}

impl<K, V> EntityCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(DashMap::with_capacity(if config.enabled { 64 } else { 0 })),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if !self.config.enabled {
            return None;
        }
        let entry = self.inner.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.inner.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        if !self.config.enabled {
            return;
        }
        let max = self.config.max_entries.max(1);
        if self.inner.len() >= max {
            self.evict_expired();

            if self.inner.len() >= max {
                let to_remove = (max / 10).max(1);
                let keys: Vec<K> = self
                    .inner
                    .iter()
                    .take(to_remove)
                    .map(|r| r.key().clone())
                    .collect();
                for key in keys {
                    self.inner.remove(&key);
                }
            }
        }

        self.inner.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.config.ttl,
            },
        );
    }

    /// Returns the cached value or runs `load` and caches its result.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = load().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        self.inner.remove(key);
    }

    pub fn invalidate_where(&self, predicate: impl Fn(&K, &V) -> bool) {
        self.inner.retain(|key, entry| !predicate(key, &entry.value));
    }

    pub fn evict_expired(&self) {
        self.inner.retain(|_, entry| !entry.is_expired());
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// The caches shared by all services.
#[derive(Clone)]
pub struct Caches {
    pub projects: EntityCache<Uuid, Project>,
    pub boards: EntityCache<Uuid, Board>,
    pub memberships: EntityCache<(Uuid, Uuid), Option<ProjectRole>>,
}

impl Caches {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            projects: EntityCache::new(config),
            boards: EntityCache::new(config),
            memberships: EntityCache::new(config),
        }
    }

    /// Drops the project itself and every membership row cached for it.
    pub fn invalidate_project(&self, project_id: Uuid) {
        self.projects.invalidate(&project_id);
        self.memberships
            .invalidate_where(|(project, _), _| *project == project_id);
    }

    /// Drops every cached board of the project.
    pub fn invalidate_project_boards(&self, project_id: Uuid) {
        self.boards
            .invalidate_where(|_, board| board.project_id == project_id);
    }

    pub fn invalidate_membership(&self, project_id: Uuid, user_id: Uuid) {
        self.memberships.invalidate(&(project_id, user_id));
    }

    pub fn invalidate_user(&self, user_id: Uuid) {
        self.memberships
            .invalidate_where(|(_, user), _| *user == user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ttl: Duration, max_entries: usize) -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl,
            max_entries,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cache: EntityCache<u32, String> = EntityCache::new(CacheConfig::default());
        cache.insert(1, "one".to_string());
        assert_eq!(cache.get(&1).as_deref(), Some("one"));
        assert!(cache.get(&2).is_none());
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache: EntityCache<u32, u32> = EntityCache::new(CacheConfig::disabled());
        cache.insert(1, 1);
        assert!(cache.is_empty());
        assert!(cache.get(&1).is_none());
    }

    #[test]
    fn test_invalidate_where() {
        let cache: EntityCache<(u32, u32), bool> = EntityCache::new(CacheConfig::default());
        cache.insert((1, 1), true);
        cache.insert((1, 2), true);
        cache.insert((2, 1), false);

        cache.invalidate_where(|(project, _), _| *project == 1);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&(2, 1)), Some(false));
    }

    #[test]
    fn test_bounded_size_evicts() {
        let cache: EntityCache<u32, u32> =
            EntityCache::new(config(Duration::from_secs(60), 20));
        for i in 0..20 {
            cache.insert(i, i);
        }
        assert_eq!(cache.len(), 20);

        cache.insert(100, 100);
        assert!(cache.len() <= 20);
        assert_eq!(cache.get(&100), Some(100));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache: EntityCache<u32, u32> = EntityCache::new(config(Duration::from_millis(50), 10));
        cache.insert(7, 7);
        assert_eq!(cache.get(&7), Some(7));

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.get(&7).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_try_insert_with_loads_once() {
        let cache: EntityCache<u32, u32> = EntityCache::new(CacheConfig::default());
        let first: Result<u32, ()> = cache.get_or_try_insert_with(5, || async { Ok(50) }).await;
        assert_eq!(first, Ok(50));

        let second: Result<u32, ()> = cache
            .get_or_try_insert_with(5, || async { panic!("loader must not run on a hit") })
            .await;
        assert_eq!(second, Ok(50));
    }

    #[tokio::test]
    async fn test_loader_errors_are_not_cached() {
        let cache: EntityCache<u32, u32> = EntityCache::new(CacheConfig::default());
        let result: Result<u32, &str> =
            cache.get_or_try_insert_with(1, || async { Err("missing") }).await;
        assert_eq!(result, Err("missing"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_project_drops_memberships() {
        let caches = Caches::new(CacheConfig::default());
        let project = Uuid::new_v4();
        let other = Uuid::new_v4();
        let user = Uuid::new_v4();
        caches
            .memberships
            .insert((project, user), Some(ProjectRole::Member));
        caches
            .memberships
            .insert((other, user), Some(ProjectRole::Viewer));

        caches.invalidate_project(project);

        assert!(caches.memberships.get(&(project, user)).is_none());
        assert_eq!(
            caches.memberships.get(&(other, user)),
            Some(Some(ProjectRole::Viewer))
        );
    }

    fn board(project_id: Uuid, position: i32) -> Board {
        let now = chrono::Utc::now();
        Board {
            id: Uuid::new_v4(),
            project_id,
            name: format!("board {position}"),
            description: None,
            position,
            created_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_invalidate_project_boards_keeps_other_projects() {
        let caches = Caches::new(CacheConfig::default());
        let project = Uuid::new_v4();
        let other = Uuid::new_v4();
        let (first, second, foreign) = (board(project, 0), board(project, 1), board(other, 0));
        for b in [&first, &second, &foreign] {
            caches.boards.insert(b.id, b.clone());
        }

        caches.invalidate_project_boards(project);

        assert!(caches.boards.get(&first.id).is_none());
        assert!(caches.boards.get(&second.id).is_none());
        assert_eq!(caches.boards.get(&foreign.id).map(|b| b.id), Some(foreign.id));
    }
}
