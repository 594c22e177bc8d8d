//! Tenant configuration schema.

use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_COOKIE: &str = "gatehouse_session";

fn default_cookie_name() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

fn default_resolve_timeout_ms() -> u64 {
    3_000
}

/// How a tenant's requests are authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthStrategy {
    /// Never authenticate users; every request resolves to anonymous.
    #[default]
    Anonymous,
    /// Opaque session token carried in a cookie.
    SessionCookie {
        #[serde(default = "default_cookie_name")]
        cookie_name: String,
    },
    /// HS256 JWT in an `Authorization: Bearer` header.
    JwtBearer {
        secret: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issuer: Option<String>,
    },
}

/// Configuration of a single tenant. Immutable once published to a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: String,
    /// Host names (without port) whose requests belong to this tenant.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Client access key.
    pub api_key: String,
    /// Master access key.
    pub master_key: String,
    #[serde(default)]
    pub auth: AuthStrategy,
    /// Upper bound on credential lookups during auth resolution.
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
}

/// Reasons a tenant configuration is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenantConfigError {
    #[error("tenant_id must not be empty")]
    EmptyTenantId,
    #[error("tenant `{tenant_id}`: {field} must not be empty")]
    EmptyKey {
        tenant_id: String,
        field: &'static str,
    },
    #[error("tenant `{tenant_id}`: api_key and master_key must differ")]
    SharedKeys { tenant_id: String },
    #[error("tenant `{tenant_id}`: jwt_bearer secret must not be empty")]
    EmptyJwtSecret { tenant_id: String },
    #[error("tenant `{tenant_id}`: resolve_timeout_ms must be positive")]
    ZeroTimeout { tenant_id: String },
    #[error("tenant `{tenant_id}` is defined more than once")]
    Duplicate { tenant_id: String },
}

impl TenantConfig {
    pub fn new(
        tenant_id: impl Into<String>,
        api_key: impl Into<String>,
        master_key: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            hosts: Vec::new(),
            api_key: api_key.into(),
            master_key: master_key.into(),
            auth: AuthStrategy::default(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: AuthStrategy) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    /// Checks the invariants a store relies on before publishing the config.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), TenantConfigError> {
        let tenant_id = || self.tenant_id.clone();
        if self.tenant_id.is_empty() {
            return Err(TenantConfigError::EmptyTenantId);
        }
        if self.api_key.is_empty() {
            return Err(TenantConfigError::EmptyKey {
                tenant_id: tenant_id(),
                field: "api_key",
            });
        }
        if self.master_key.is_empty() {
            return Err(TenantConfigError::EmptyKey {
                tenant_id: tenant_id(),
                field: "master_key",
            });
        }
        if self.api_key == self.master_key {
            return Err(TenantConfigError::SharedKeys {
                tenant_id: tenant_id(),
            });
        }
        if let AuthStrategy::JwtBearer { secret, .. } = &self.auth {
            if secret.is_empty() {
                return Err(TenantConfigError::EmptyJwtSecret {
                    tenant_id: tenant_id(),
                });
            }
        }
        if self.resolve_timeout_ms == 0 {
            return Err(TenantConfigError::ZeroTimeout {
                tenant_id: tenant_id(),
            });
        }
        Ok(())
    }
}

/// Reads a JSON array of tenant configurations.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed. Validation
/// happens when the configs are published to a store.
pub fn load_tenant_file(path: &Path) -> anyhow::Result<Vec<TenantConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading tenant file {}", path.display()))?;
    let configs: Vec<TenantConfig> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing tenant file {}", path.display()))?;
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_from_minimal_json() {
        let config: TenantConfig = serde_json::from_str(
            r#"{"tenant_id":"acme","api_key":"ck","master_key":"mk"}"#,
        )
        .unwrap();
        assert_eq!(config.auth, AuthStrategy::Anonymous);
        assert_eq!(config.resolve_timeout(), Duration::from_secs(3));
        assert!(config.hosts.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn strategy_tagged_by_type() {
        let config: TenantConfig = serde_json::from_str(
            r#"{"tenant_id":"acme","api_key":"ck","master_key":"mk",
                "auth":{"type":"session_cookie"}}"#,
        )
        .unwrap();
        assert_eq!(
            config.auth,
            AuthStrategy::SessionCookie {
                cookie_name: DEFAULT_SESSION_COOKIE.to_string()
            }
        );

        let config: TenantConfig = serde_json::from_str(
            r#"{"tenant_id":"acme","api_key":"ck","master_key":"mk",
                "auth":{"type":"jwt_bearer","secret":"s3cret","issuer":"idp"}}"#,
        )
        .unwrap();
        assert!(matches!(
            config.auth,
            AuthStrategy::JwtBearer { ref issuer, .. } if issuer.as_deref() == Some("idp")
        ));
    }

    #[test]
    fn validate_rejects_bad_configs() {
        assert_eq!(
            TenantConfig::new("", "ck", "mk").validate(),
            Err(TenantConfigError::EmptyTenantId)
        );
        assert!(matches!(
            TenantConfig::new("t", "", "mk").validate(),
            Err(TenantConfigError::EmptyKey { field: "api_key", .. })
        ));
        assert!(matches!(
            TenantConfig::new("t", "k", "k").validate(),
            Err(TenantConfigError::SharedKeys { .. })
        ));
        let jwt = TenantConfig::new("t", "ck", "mk").with_auth(AuthStrategy::JwtBearer {
            secret: String::new(),
            issuer: None,
        });
        assert!(matches!(
            jwt.validate(),
            Err(TenantConfigError::EmptyJwtSecret { .. })
        ));
        let mut zero = TenantConfig::new("t", "ck", "mk");
        zero.resolve_timeout_ms = 0;
        assert!(matches!(zero.validate(), Err(TenantConfigError::ZeroTimeout { .. })));
    }

    #[test]
    fn load_tenant_file_reads_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"tenant_id":"a","api_key":"ck","master_key":"mk","hosts":["a.example.com"]}},
                {{"tenant_id":"b","api_key":"ck2","master_key":"mk2"}}]"#
        )
        .unwrap();

        let configs = load_tenant_file(file.path()).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].hosts, vec!["a.example.com"]);
    }

    #[test]
    fn load_tenant_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_tenant_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("parsing tenant file"));
    }
}
