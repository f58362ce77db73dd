//! Connection group registry.
//!
//! A connection group is a primary pool plus zero or more replica pools,
//! resolved by name through a [`ConfigProvider`] and cached for the life of the
//! registry.
//!
//! # Design Decisions
//!
//! - **`OnceCell` per group name**: single-flight creation, so concurrent first
//!   use of a group dials each host once
//! - **Failed resolution leaves the cell empty**: the next call retries instead
//!   of caching the error
//! - **Explicit `shutdown`**: pools are closed by the owner, never implicitly
//!
//! # Concurrency Safety
//!
//! - The map lock is released before any await on pool creation
//! - Read lock for lookups, write lock only to insert a new cell or remove on shutdown
//! - A cell removed by `shutdown` stays valid for handles already holding its
//!   group (the `Arc` keeps it alive) but its pools are closed

use crate::config::{ConfigProvider, GroupConfig, HostConfig, ReplicaPolicy};
use crate::db::handle::Db;
use crate::db::hooks::HookRegistry;
use crate::error::{DbError, DbResult};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

/// Resolved pools of one group.
pub struct ConnectionGroup {
    name: String,
    primary: MySqlPool,
    replicas: Vec<MySqlPool>,
    host: String,
    port: u16,
    dbname: String,
    replica_policy: ReplicaPolicy,
}

impl ConnectionGroup {
    /// Build pools for the primary and every replica.
    pub async fn connect(name: &str, config: &GroupConfig) -> DbResult<Self> {
        config.validate(name)?;
        let primary = open_pool(name, "primary", &config.primary).await?;
        let mut replicas = Vec::with_capacity(config.replicas.len());
        for (i, host) in config.replicas.iter().enumerate() {
            match open_pool(name, &format!("replica[{i}]"), host).await {
                Ok(pool) => replicas.push(pool),
                Err(e) => {
                    primary.close().await;
                    for pool in &replicas {
                        pool.close().await;
                    }
                    return Err(e);
                }
            }
        }

        info!(
            group = %name,
            primary = %config.primary.summary(),
            replicas = replicas.len(),
            policy = %config.replica_policy,
            "Connection group ready"
        );

        Ok(Self {
            name: name.to_string(),
            primary,
            replicas,
            host: config.primary.host.clone(),
            port: config.primary.port,
            dbname: config.primary.dbname.clone(),
            replica_policy: config.replica_policy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary(&self) -> &MySqlPool {
        &self.primary
    }

    pub fn replicas(&self) -> &[MySqlPool] {
        &self.replicas
    }

    pub fn replica(&self, index: usize) -> Option<&MySqlPool> {
        self.replicas.get(index)
    }

    pub fn replica_policy(&self) -> ReplicaPolicy {
        self.replica_policy
    }

    /// Primary host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    pub async fn close(&self) {
        info!(group = %self.name, "Closing connection group");
        self.primary.close().await;
        for pool in &self.replicas {
            pool.close().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.primary.is_closed()
    }
}

impl std::fmt::Debug for ConnectionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGroup")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("replicas", &self.replicas.len())
            .field("replica_policy", &self.replica_policy)
            .finish()
    }
}

/// Pool options for one host.
pub fn pool_options(host: &HostConfig) -> MySqlPoolOptions {
    let pool = &host.pool;
    MySqlPoolOptions::new()
        .max_connections(pool.max_open_or_default())
        .min_connections(pool.max_idle_or_default())
        .max_lifetime(pool.max_lifetime())
        .acquire_timeout(pool.acquire_timeout_or_default())
        .idle_timeout(Some(pool.idle_timeout_or_default()))
        .test_before_acquire(pool.test_before_acquire_or_default())
}

async fn open_pool(group: &str, role: &str, host: &HostConfig) -> DbResult<MySqlPool> {
    let options = pool_options(host);
    if host.pool.connect_lazily_or_default() {
        debug!(group = %group, role = %role, host = %host.summary(), "Creating lazy pool");
        return Ok(options.connect_lazy_with(host.connect_options()));
    }

    debug!(group = %group, role = %role, host = %host.summary(), "Connecting pool");
    options
        .connect_with(host.connect_options())
        .await
        .map_err(|e| {
            DbError::connection(
                format!(
                    "Failed to connect {} {} of group '{}': {}",
                    role,
                    host.summary(),
                    group,
                    e
                ),
                "Check the host, credentials and database name in the group configuration",
            )
        })
}

/// Shared registry of connection groups.
pub struct ConnectionRegistry {
    provider: Arc<dyn ConfigProvider>,
    hooks: Arc<HookRegistry>,
    /// Per-group lazy cells. OnceCell ensures single-flight creation.
    groups: RwLock<HashMap<String, Arc<OnceCell<Arc<ConnectionGroup>>>>>,
}

impl ConnectionRegistry {
    pub fn new(provider: Arc<dyn ConfigProvider>) -> Self {
        Self::with_hooks(provider, Arc::new(HookRegistry::new()))
    }

    pub fn with_hooks(provider: Arc<dyn ConfigProvider>, hooks: Arc<HookRegistry>) -> Self {
        Self {
            provider,
            hooks,
            groups: RwLock::new(HashMap::new()),
        }
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// Get or create the group for `name`.
    ///
    /// Concurrent calls for the same name wait for the first to finish.
    pub async fn resolve(&self, name: &str) -> DbResult<Arc<ConnectionGroup>> {
        let cell = {
            let groups = self.groups.read().await;
            if let Some(cell) = groups.get(name) {
                Arc::clone(cell)
            } else {
                drop(groups);
                let mut groups = self.groups.write().await;
                // Double-check after acquiring write lock
                Arc::clone(groups.entry(name.to_string()).or_default())
            }
        };

        let group = cell
            .get_or_try_init(|| async {
                debug!(group = %name, "Resolving connection group");
                let config = self.provider.group_config(name)?;
                ConnectionGroup::connect(name, &config).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(group))
    }

    /// Fresh `Db` handle on the named group.
    pub async fn db(&self, name: &str) -> DbResult<Db> {
        let group = self.resolve(name).await?;
        Ok(Db::new(group, Arc::clone(&self.hooks)))
    }

    /// Names of groups that have been resolved.
    pub async fn resolved_groups(&self) -> Vec<String> {
        let groups = self.groups.read().await;
        let mut names: Vec<String> = groups
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Close and forget the named groups, or every group when `names` is empty.
    pub async fn shutdown(&self, names: &[&str]) {
        // Drain under lock, close outside lock
        let removed: Vec<_> = {
            let mut groups = self.groups.write().await;
            if names.is_empty() {
                groups.drain().collect()
            } else {
                names
                    .iter()
                    .filter_map(|n| groups.remove_entry(*n))
                    .collect()
            }
        };

        for (_, cell) in removed {
            if let Some(group) = cell.get() {
                group.close().await;
            }
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolOptions, StaticConfigProvider};
    use std::time::Duration;

    fn lazy_host(host: &str) -> HostConfig {
        let mut config = HostConfig::from_url(&format!("mysql://root@{host}/app")).unwrap();
        config.pool.connect_lazily = Some(true);
        config
    }

    fn registry() -> ConnectionRegistry {
        let group = GroupConfig::new(lazy_host("primary.invalid"))
            .with_replica(lazy_host("replica.invalid"));
        let provider = StaticConfigProvider::new().with_group("db/main", group);
        ConnectionRegistry::new(Arc::new(provider))
    }

    #[test]
    fn test_pool_options_mapping() {
        let host = HostConfig {
            pool: PoolOptions {
                max_open_conns: Some(8),
                max_idle_conns: Some(3),
                conns_max_lifetime: Some(60),
                acquire_timeout: Some(5),
                ..Default::default()
            },
            ..lazy_host("h")
        };
        let options = pool_options(&host);
        assert_eq!(options.get_max_connections(), 8);
        assert_eq!(options.get_min_connections(), 3);
        assert_eq!(options.get_max_lifetime(), Some(Duration::from_secs(60)));
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_resolve_is_memoized() {
        let registry = registry();
        let first = registry.resolve("db/main").await.unwrap();
        let second = registry.resolve("db/main").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.replicas().len(), 1);
        assert_eq!(first.host(), "primary.invalid");
        assert_eq!(registry.resolved_groups().await, vec!["db/main".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_resolve_single_flight() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.resolve("db/main").await.unwrap() })
            })
            .collect();
        let mut groups = Vec::new();
        for handle in handles {
            groups.push(handle.await.unwrap());
        }
        assert!(groups.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_unknown_group_is_not_cached() {
        let registry = registry();
        let err = registry.resolve("missing").await.unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
        assert!(registry.resolved_groups().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_forgets() {
        let registry = registry();
        let group = registry.resolve("db/main").await.unwrap();
        registry.shutdown(&["db/main"]).await;
        assert!(group.is_closed());
        assert!(registry.resolved_groups().await.is_empty());

        let again = registry.resolve("db/main").await.unwrap();
        assert!(!Arc::ptr_eq(&group, &again));
        registry.shutdown(&[]).await;
    }
}
