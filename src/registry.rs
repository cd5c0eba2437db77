//! Resource instance registry: load on demand, cache under capacity and age bounds.
//!
//! # Caching
//! - One live instance per [`RoutingKey`]; a hit touches `last_used_at` and does no I/O.
//! - After an insertion pushes the table past `max_instances`, every entry not used
//!   within `instance_ttl` is dropped in one pass. Nothing else evicts.
//! - Construction is single-flight per key: concurrent misses for the same key queue on
//!   a per-key gate and the later ones pick up the instance the first one inserted.
//!
//! Failed registrations are logged and reported as `None`; they never insert an entry.

use crate::config::ResourceConfig;
use crate::error::RegistryError;
use crate::loader::{resolve_location, ResourceLoader};
use crate::resource::{Resource, ResourceContext};
use crate::tool::ToolCatalog;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const MAX_INSTANCES: usize = 1000;
pub const INSTANCE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    pub hostname: String,
    pub service: String,
    pub name: String,
}

impl RoutingKey {
    pub fn new(hostname: impl Into<String>, service: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            service: service.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.hostname, self.service, self.name)
    }
}

pub struct CacheEntry {
    pub instance: Arc<dyn Resource>,
    pub created_at: Instant,
    pub last_used_at: Instant,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RegistryOptions {
    pub max_instances: usize,
    pub instance_ttl: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            max_instances: MAX_INSTANCES,
            instance_ttl: INSTANCE_TTL,
        }
    }
}

pub struct ResourceRegistry {
    loader: Arc<dyn ResourceLoader>,
    tools: Arc<ToolCatalog>,
    clock: Arc<dyn Clock>,
    options: RegistryOptions,
    entries: Mutex<HashMap<RoutingKey, CacheEntry>>,
    inflight: DashMap<RoutingKey, Arc<tokio::sync::Mutex<()>>>,
    open: AtomicBool,
}

impl ResourceRegistry {
    /// Open an empty registry that loads sources through `loader`.
    pub fn open(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            tools: Arc::new(ToolCatalog::new()),
            clock: Arc::new(SystemClock),
            options: RegistryOptions::default(),
            entries: Mutex::new(HashMap::new()),
            inflight: DashMap::new(),
            open: AtomicBool::new(true),
        }
    }

    pub fn with_options(mut self, options: RegistryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolCatalog>) -> Self {
        self.tools = tools;
        self
    }

    /// Drop every cached instance and refuse further registrations.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let dropped = {
            let mut entries = self.lock_entries();
            let n = entries.len();
            entries.clear();
            n
        };
        tracing::info!(dropped, "resource registry closed");
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    pub fn contains(&self, key: &RoutingKey) -> bool {
        self.lock_entries().contains_key(key)
    }

    pub fn options(&self) -> RegistryOptions {
        self.options
    }

    /// Cached or newly constructed instance for `(hostname, service, name)`; `None` if the
    /// resource cannot be loaded. Failures are logged here and never propagate.
    pub async fn register(
        &self,
        hostname: &str,
        service: &str,
        name: &str,
        config: &ResourceConfig,
    ) -> Option<Arc<dyn Resource>> {
        let key = RoutingKey::new(hostname, service, name);
        match self.get_or_construct(&key, config).await {
            Ok(instance) => Some(instance),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "resource registration failed");
                None
            }
        }
    }

    async fn get_or_construct(
        &self,
        key: &RoutingKey,
        config: &ResourceConfig,
    ) -> Result<Arc<dyn Resource>, RegistryError> {
        if !self.is_open() {
            return Err(RegistryError::Closed);
        }
        if let Some(instance) = self.touch(key) {
            tracing::debug!(key = %key, "instance reused");
            return Ok(instance);
        }

        let gate = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let result = {
            let _turn = gate.lock().await;
            // a construction we queued behind may have just inserted it
            match self.touch(key) {
                Some(instance) => {
                    tracing::debug!(key = %key, "instance reused after concurrent construction");
                    Ok(instance)
                }
                None => self.construct(key, config).await,
            }
        };
        self.release_gate(key, &gate);
        result
    }

    /// Forget the key's gate once no other caller holds or waits on it. The strong count is
    /// read under the map's shard lock, so no caller can pick up the gate concurrently.
    fn release_gate(&self, key: &RoutingKey, gate: &Arc<tokio::sync::Mutex<()>>) {
        self.inflight
            .remove_if(key, |_, g| Arc::ptr_eq(g, gate) && Arc::strong_count(g) == 2);
    }

    async fn construct(&self, key: &RoutingKey, config: &ResourceConfig) -> Result<Arc<dyn Resource>, RegistryError> {
        let location = resolve_location(config.resource_path(), &key.hostname, &key.service, &key.name);
        let unit = self.loader.load(&location).await?;
        let ctor = unit
            .export(&key.name)
            .ok_or_else(|| RegistryError::InvalidResourceExport {
                location: location.clone(),
                export: key.name.clone(),
            })?;

        let ctx = ResourceContext::new(
            key.hostname.clone(),
            key.service.clone(),
            key.name.clone(),
            config.clone(),
            self.tools.clone(),
        );
        let instance = ctor(ctx).map_err(|source| RegistryError::Construct {
            key: key.to_string(),
            source,
        })?;

        self.insert(key.clone(), instance.clone())?;
        tracing::info!(key = %key, location = %location.display(), "instance created");
        Ok(instance)
    }

    fn touch(&self, key: &RoutingKey) -> Option<Arc<dyn Resource>> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        entries.get_mut(key).map(|entry| {
            entry.last_used_at = now;
            entry.instance.clone()
        })
    }

    /// Cache a new instance. Checked against `close()` under the table lock, so nothing is
    /// cached once the registry has been closed.
    fn insert(&self, key: RoutingKey, instance: Arc<dyn Resource>) -> Result<(), RegistryError> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        if !self.is_open() {
            return Err(RegistryError::Closed);
        }
        entries.insert(
            key,
            CacheEntry {
                instance,
                created_at: now,
                last_used_at: now,
            },
        );
        if entries.len() > self.options.max_instances {
            let swept = sweep(&mut entries, now, self.options.instance_ttl);
            tracing::info!(swept, remaining = entries.len(), "swept stale resource instances");
        }
        Ok(())
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<RoutingKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Remove entries last used before `now - ttl`; returns how many were removed.
fn sweep(entries: &mut HashMap<RoutingKey, CacheEntry>, now: Instant, ttl: Duration) -> usize {
    let Some(cutoff) = now.checked_sub(ttl) else {
        return 0;
    };
    let before = entries.len();
    entries.retain(|_, entry| entry.last_used_at >= cutoff);
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceCatalog;
    use crate::loader::LoadedUnit;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;

    struct Noop;
    impl Resource for Noop {}

    /// Serves every location from memory; locations whose file stem is listed in `missing`
    /// are not found, and `broken` exports nothing.
    struct MemoryLoader {
        catalog: ResourceCatalog,
        loads: AtomicUsize,
        seen: Mutex<Vec<PathBuf>>,
    }

    impl MemoryLoader {
        fn new() -> Self {
            let mut catalog = ResourceCatalog::new();
            catalog.register("noop", |_ctx| Noop);
            Self {
                catalog,
                loads: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceLoader for MemoryLoader {
        async fn load(&self, location: &Path) -> Result<LoadedUnit, RegistryError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(location.to_path_buf());
            let name = location.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
            match name.as_str() {
                "missing" => Err(RegistryError::ResourceNotFound {
                    location: location.to_path_buf(),
                    reason: "no such file".into(),
                }),
                "broken" => Ok(LoadedUnit::new()),
                _ => Ok(LoadedUnit::new().with_export(name.clone(), self.catalog.get("noop").unwrap().clone())),
            }
        }
    }

    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            // start far enough from process start that `now - ttl` never underflows
            Arc::new(Self {
                now: Mutex::new(Instant::now() + Duration::from_secs(30 * 24 * 60 * 60)),
            })
        }

        fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    fn registry(loader: Arc<MemoryLoader>) -> ResourceRegistry {
        ResourceRegistry::open(loader)
    }

    #[tokio::test]
    async fn hit_returns_same_instance_without_loading() {
        let loader = Arc::new(MemoryLoader::new());
        let reg = registry(loader.clone());
        let cfg = ResourceConfig::default();

        let a = reg.register("localhost", "test", "hello", &cfg).await.unwrap();
        let b = reg.register("localhost", "test", "hello", &cfg).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.loads(), 1);
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test]
    async fn keys_differ_by_host_and_service() {
        let loader = Arc::new(MemoryLoader::new());
        let reg = registry(loader.clone());
        let cfg = ResourceConfig::default();

        let a = reg.register("a.example", "test", "hello", &cfg).await.unwrap();
        let b = reg.register("b.example", "test", "hello", &cfg).await.unwrap();
        let c = reg.register("a.example", "other", "hello", &cfg).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(reg.len(), 3);
    }

    #[tokio::test]
    async fn failures_insert_nothing() {
        let loader = Arc::new(MemoryLoader::new());
        let reg = registry(loader.clone());
        let cfg = ResourceConfig::default();

        assert!(reg.register("h", "test", "missing", &cfg).await.is_none());
        assert!(reg.register("h", "test", "broken", &cfg).await.is_none());
        assert!(reg.is_empty());
        // failures are not cached: a retry loads again
        assert!(reg.register("h", "test", "missing", &cfg).await.is_none());
        assert_eq!(loader.loads(), 3);
    }

    #[tokio::test]
    async fn constructor_failure_inserts_nothing() {
        struct Refusing;
        #[async_trait]
        impl ResourceLoader for Refusing {
            async fn load(&self, _location: &Path) -> Result<LoadedUnit, RegistryError> {
                let mut catalog = ResourceCatalog::new();
                catalog.register_fallible("hello", |_ctx| -> Result<Noop, crate::error::HandlerError> {
                    Err(crate::error::HandlerError::msg("needs a database"))
                });
                Ok(LoadedUnit::new().with_export("hello", catalog.get("hello").unwrap().clone()))
            }
        }
        let reg = ResourceRegistry::open(Arc::new(Refusing));
        assert!(reg.register("h", "s", "hello", &ResourceConfig::default()).await.is_none());
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn location_comes_from_global_resource_path() {
        let loader = Arc::new(MemoryLoader::new());
        let reg = registry(loader.clone());
        let mut cfg = ResourceConfig::default();
        cfg.global
            .insert("resourcePath".into(), serde_json::json!("/srv/{hostname}/${service}/{name}"));

        reg.register("example.com", "blog", "posts", &cfg).await.unwrap();
        reg.register("example.com", "blog", "index", &ResourceConfig::default()).await.unwrap();
        let seen = loader.seen.lock().unwrap().clone();
        assert_eq!(seen[0], PathBuf::from("/srv/example.com/blog/posts"));
        assert_eq!(seen[1], PathBuf::from("services/blog/resources/index"));
    }

    #[tokio::test]
    async fn overflow_sweeps_only_stale_entries() {
        let loader = Arc::new(MemoryLoader::new());
        let clock = ManualClock::new();
        let reg = registry(loader.clone())
            .with_clock(clock.clone())
            .with_options(RegistryOptions {
                max_instances: 3,
                instance_ttl: Duration::from_secs(60),
            });
        let cfg = ResourceConfig::default();

        reg.register("h", "s", "old1", &cfg).await.unwrap();
        reg.register("h", "s", "old2", &cfg).await.unwrap();
        clock.advance(Duration::from_secs(120));
        reg.register("h", "s", "fresh", &cfg).await.unwrap();
        assert_eq!(reg.len(), 3);

        // fourth entry exceeds the bound: old1 and old2 are past the TTL
        reg.register("h", "s", "newest", &cfg).await.unwrap();
        assert_eq!(reg.len(), 2);
        assert!(reg.contains(&RoutingKey::new("h", "s", "fresh")));
        assert!(reg.contains(&RoutingKey::new("h", "s", "newest")));
        assert!(!reg.contains(&RoutingKey::new("h", "s", "old1")));
    }

    #[tokio::test]
    async fn touched_entries_survive_sweep() {
        let loader = Arc::new(MemoryLoader::new());
        let clock = ManualClock::new();
        let reg = registry(loader.clone())
            .with_clock(clock.clone())
            .with_options(RegistryOptions {
                max_instances: 2,
                instance_ttl: Duration::from_secs(60),
            });
        let cfg = ResourceConfig::default();

        reg.register("h", "s", "a", &cfg).await.unwrap();
        reg.register("h", "s", "b", &cfg).await.unwrap();
        clock.advance(Duration::from_secs(120));
        reg.register("h", "s", "a", &cfg).await.unwrap(); // hit, refreshes a
        reg.register("h", "s", "c", &cfg).await.unwrap();

        assert!(reg.contains(&RoutingKey::new("h", "s", "a")));
        assert!(!reg.contains(&RoutingKey::new("h", "s", "b")));
        assert!(reg.contains(&RoutingKey::new("h", "s", "c")));
    }

    #[tokio::test]
    async fn overflow_without_stale_entries_keeps_everything() {
        let loader = Arc::new(MemoryLoader::new());
        let reg = registry(loader.clone()).with_options(RegistryOptions {
            max_instances: 1,
            instance_ttl: Duration::from_secs(3600),
        });
        let cfg = ResourceConfig::default();
        reg.register("h", "s", "a", &cfg).await.unwrap();
        reg.register("h", "s", "b", &cfg).await.unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[tokio::test]
    async fn closed_registry_serves_nothing() {
        let loader = Arc::new(MemoryLoader::new());
        let reg = registry(loader.clone());
        let cfg = ResourceConfig::default();
        reg.register("h", "s", "a", &cfg).await.unwrap();
        reg.close();
        assert!(reg.is_empty());
        assert!(reg.register("h", "s", "a", &cfg).await.is_none());
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn entry_exactly_at_cutoff_survives() {
        let loader = Arc::new(MemoryLoader::new());
        let clock = ManualClock::new();
        let ttl = Duration::from_secs(60);
        let reg = registry(loader.clone())
            .with_clock(clock.clone())
            .with_options(RegistryOptions {
                max_instances: 1,
                instance_ttl: ttl,
            });
        let cfg = ResourceConfig::default();

        reg.register("h", "s", "a", &cfg).await.unwrap();
        clock.advance(ttl);
        reg.register("h", "s", "b", &cfg).await.unwrap();
        assert!(reg.contains(&RoutingKey::new("h", "s", "a")));
        assert_eq!(reg.len(), 2);

        clock.advance(Duration::from_secs(1));
        reg.register("h", "s", "c", &cfg).await.unwrap();
        assert!(!reg.contains(&RoutingKey::new("h", "s", "a")));
        assert!(reg.contains(&RoutingKey::new("h", "s", "b")));
        assert!(reg.contains(&RoutingKey::new("h", "s", "c")));
    }

    /// Closes the registry from inside the clock read that precedes the cache insert.
    struct ClosingClock {
        calls: AtomicUsize,
        close_on_call: usize,
        registry: std::sync::OnceLock<std::sync::Weak<ResourceRegistry>>,
    }

    impl Clock for ClosingClock {
        fn now(&self) -> Instant {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.close_on_call {
                if let Some(reg) = self.registry.get().and_then(|w| w.upgrade()) {
                    reg.close();
                }
            }
            Instant::now()
        }
    }

    #[tokio::test]
    async fn close_during_construction_caches_nothing() {
        // clock reads on a miss: cache check, re-check behind the gate, insert
        let clock = Arc::new(ClosingClock {
            calls: AtomicUsize::new(0),
            close_on_call: 3,
            registry: std::sync::OnceLock::new(),
        });
        let reg = Arc::new(ResourceRegistry::open(Arc::new(MemoryLoader::new())).with_clock(clock.clone()));
        clock.registry.set(Arc::downgrade(&reg)).unwrap();

        assert!(reg.register("h", "s", "a", &ResourceConfig::default()).await.is_none());
        assert!(!reg.is_open());
        assert!(reg.is_empty());
    }

    #[test]
    fn routing_key_display() {
        assert_eq!(RoutingKey::new("h", "s", "n").to_string(), "h/s/n");
    }
}
