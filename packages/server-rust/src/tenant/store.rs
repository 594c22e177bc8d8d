//! In-memory tenant table published through `ArcSwap`.
//!
//! Dispatch only ever reads a fully built [`TenantTable`] snapshot. Updates
//! build a new table off to the side and swap the pointer, so a request in
//! flight keeps the snapshot it started with.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use http::header::HOST;
use http::request::Parts;
use tracing::info;

use super::config::{TenantConfig, TenantConfigError};
use super::TenantLookupError;
use crate::traits::TenantConfigStore;

/// Header naming the tenant explicitly. Takes precedence over `Host`.
pub const TENANT_HEADER: &str = "x-gatehouse-tenant";

// ---------------------------------------------------------------------------
// TenantTable
// ---------------------------------------------------------------------------

/// Immutable snapshot of every known tenant, indexed by id and by host.
#[derive(Debug, Default)]
pub struct TenantTable {
    by_id: HashMap<String, Arc<TenantConfig>>,
    by_host: HashMap<String, Arc<TenantConfig>>,
}

impl TenantTable {
    fn build(configs: Vec<Arc<TenantConfig>>) -> Self {
        let mut table = Self::default();
        for config in configs {
            for host in &config.hosts {
                table
                    .by_host
                    .insert(host.to_ascii_lowercase(), Arc::clone(&config));
            }
            table.by_id.insert(config.tenant_id.clone(), config);
        }
        table
    }

    fn configs(&self) -> Vec<Arc<TenantConfig>> {
        self.by_id.values().cloned().collect()
    }

    /// Tenant named by [`TENANT_HEADER`], else the one owning the request host.
    #[must_use]
    pub fn lookup(&self, request: &Parts) -> Option<Arc<TenantConfig>> {
        if let Some(id) = request
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            return self.by_id.get(id.trim()).cloned();
        }

        let host = request
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri.host())?;
        let host = strip_port(host).to_ascii_lowercase();
        self.by_host.get(&host).cloned()
    }

    #[must_use]
    pub fn get(&self, tenant_id: &str) -> Option<Arc<TenantConfig>> {
        self.by_id.get(tenant_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    host.split(':').next().unwrap_or(host)
}

fn validated(configs: Vec<TenantConfig>) -> Result<Vec<Arc<TenantConfig>>, TenantConfigError> {
    let mut seen = std::collections::HashSet::new();
    configs
        .into_iter()
        .map(|config| {
            config.validate()?;
            if !seen.insert(config.tenant_id.clone()) {
                return Err(TenantConfigError::Duplicate {
                    tenant_id: config.tenant_id,
                });
            }
            Ok(Arc::new(config))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// StaticTenantStore
// ---------------------------------------------------------------------------

/// Tenant store backed by a copy-and-swap in-memory table.
#[derive(Debug, Default)]
pub struct StaticTenantStore {
    table: ArcSwap<TenantTable>,
}

impl StaticTenantStore {
    /// Builds a store from validated configurations.
    ///
    /// # Errors
    ///
    /// Returns the first invalid or duplicate configuration.
    pub fn new(configs: Vec<TenantConfig>) -> Result<Self, TenantConfigError> {
        let table = TenantTable::build(validated(configs)?);
        Ok(Self {
            table: ArcSwap::from_pointee(table),
        })
    }

    /// Current table snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TenantTable> {
        self.table.load_full()
    }

    /// Replaces every tenant at once. Nothing is published if any config is invalid.
    ///
    /// # Errors
    ///
    /// Returns the first invalid or duplicate configuration.
    pub fn replace(&self, configs: Vec<TenantConfig>) -> Result<(), TenantConfigError> {
        let table = TenantTable::build(validated(configs)?);
        let count = table.len();
        self.table.store(Arc::new(table));
        info!(tenants = count, "tenant table replaced");
        Ok(())
    }

    /// Adds or replaces a single tenant.
    ///
    /// # Errors
    ///
    /// Returns the validation error if `config` is unusable.
    pub fn upsert(&self, config: TenantConfig) -> Result<(), TenantConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        self.table.rcu(|current| {
            let mut configs: Vec<_> = current
                .configs()
                .into_iter()
                .filter(|c| c.tenant_id != config.tenant_id)
                .collect();
            configs.push(Arc::clone(&config));
            TenantTable::build(configs)
        });
        Ok(())
    }

    /// Removes a tenant. Returns whether it existed.
    pub fn remove(&self, tenant_id: &str) -> bool {
        let mut removed = false;
        self.table.rcu(|current| {
            removed = current.get(tenant_id).is_some();
            TenantTable::build(
                current
                    .configs()
                    .into_iter()
                    .filter(|c| c.tenant_id != tenant_id)
                    .collect(),
            )
        });
        removed
    }
}

#[async_trait]
impl TenantConfigStore for StaticTenantStore {
    async fn get_tenant_config(
        &self,
        request: &Parts,
    ) -> Result<Arc<TenantConfig>, TenantLookupError> {
        self.table
            .load()
            .lookup(request)
            .ok_or(TenantLookupError::NotFound)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
