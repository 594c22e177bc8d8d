//! Principal lookups shared by the credential strategies.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use gatehouse_core::{AuthFailure, AuthInfo};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::warn;

use crate::traits::PrincipalStore;

/// Loads the user behind verified credentials.
pub(crate) async fn load_principal(
    store: &dyn PrincipalStore,
    tenant_id: &str,
    user_id: &str,
) -> Result<AuthInfo, AuthFailure> {
    match store.get_auth_info(tenant_id, user_id).await {
        Ok(Some(info)) => Ok(info),
        Ok(None) => Err(AuthFailure::UnknownPrincipal),
        Err(err) => {
            warn!(tenant = tenant_id, error = %err, "principal store lookup failed");
            Err(AuthFailure::StoreUnavailable(err.to_string()))
        }
    }
}

/// Principal store held in memory, keyed by `(tenant_id, user_id)`.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalStore {
    users: RwLock<HashMap<(String, String), AuthInfo>>,
}

impl InMemoryPrincipalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: impl Into<String>, info: AuthInfo) {
        self.users
            .write()
            .insert((tenant_id.into(), info.user_id.clone()), info);
    }

    pub fn remove(&self, tenant_id: &str, user_id: &str) -> Option<AuthInfo> {
        self.users
            .write()
            .remove(&(tenant_id.to_string(), user_id.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

/// One entry of a principal seed file: the tenant plus the user's fields.
#[derive(Debug, Clone, Deserialize)]
pub struct PrincipalRecord {
    pub tenant_id: String,
    #[serde(flatten)]
    pub info: AuthInfo,
}

/// Reads a JSON array of [`PrincipalRecord`]s into a fresh store.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_principal_file(path: &Path) -> anyhow::Result<InMemoryPrincipalStore> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading principal file {}", path.display()))?;
    let records: Vec<PrincipalRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing principal file {}", path.display()))?;

    let store = InMemoryPrincipalStore::new();
    for record in records {
        store.insert(record.tenant_id, record.info);
    }
    Ok(store)
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn get_auth_info(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> anyhow::Result<Option<AuthInfo>> {
        Ok(self
            .users
            .read()
            .get(&(tenant_id.to_string(), user_id.to_string()))
            .cloned())
    }
}
