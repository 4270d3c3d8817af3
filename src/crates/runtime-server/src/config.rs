//! Runtime configuration, read once at startup from the environment.

use llm::ProviderKeys;

/// Identity provider settings. Absent means dev mode: every request passes
/// through as `anonymous` and owner scoping is not meaningful.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// HS256 secret shared with the identity provider.
    pub jwt_secret: String,

    /// Expected issuer claim, when set.
    pub issuer: Option<String>,
}

/// Observability (tracing backend) settings. When unset, trace-metadata
/// injection is a no-op.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub public_key: String,
    pub secret_key: String,
}

/// Which assistants to pull from the external catalog at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    None,
    All,
    Org(String),
}

impl SyncScope {
    fn parse(raw: &str) -> Self {
        match raw {
            "" | "none" => SyncScope::None,
            "all" => SyncScope::All,
            other => match other.strip_prefix("org:") {
                Some(org) if !org.is_empty() => SyncScope::Org(org.to_string()),
                _ => {
                    tracing::warn!(scope = %other, "unknown AGENT_SYNC_SCOPE, disabling sync");
                    SyncScope::None
                }
            },
        }
    }
}

/// All runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,

    pub database_url: String,
    pub database_max_connections: u32,

    pub identity: Option<IdentityConfig>,
    pub observability: Option<ObservabilityConfig>,

    pub provider_keys: ProviderKeys,

    pub sync_scope: SyncScope,
    pub catalog_url: Option<String>,
}

impl RuntimeConfig {
    /// Read configuration from the environment.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8123);

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:runtime.db".to_string());
        let database_max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let identity = std::env::var("JWT_SECRET").ok().map(|jwt_secret| IdentityConfig {
            jwt_secret,
            issuer: std::env::var("JWT_ISSUER").ok(),
        });

        let observability = match (
            std::env::var("LANGFUSE_PUBLIC_KEY").ok(),
            std::env::var("LANGFUSE_SECRET_KEY").ok(),
        ) {
            (Some(public_key), Some(secret_key)) => Some(ObservabilityConfig {
                public_key,
                secret_key,
            }),
            _ => None,
        };

        let sync_scope = SyncScope::parse(
            &std::env::var("AGENT_SYNC_SCOPE").unwrap_or_default().to_lowercase(),
        );
        let catalog_url = std::env::var("AGENT_CATALOG_URL").ok();

        Self {
            host,
            port,
            database_url,
            database_max_connections,
            identity,
            observability,
            provider_keys: ProviderKeys::from_env(),
            sync_scope,
            catalog_url,
        }
    }

    /// In-memory defaults for tests: no identity provider, no catalog.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 5,
            identity: None,
            observability: None,
            provider_keys: ProviderKeys::default(),
            sync_scope: SyncScope::None,
            catalog_url: None,
        }
    }

    /// Dev mode: no identity provider configured.
    pub fn is_dev_mode(&self) -> bool {
        self.identity.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_scope_parses_org() {
        assert_eq!(SyncScope::parse("none"), SyncScope::None);
        assert_eq!(SyncScope::parse("all"), SyncScope::All);
        assert_eq!(SyncScope::parse("org:acme"), SyncScope::Org("acme".to_string()));
        assert_eq!(SyncScope::parse("org:"), SyncScope::None);
        assert_eq!(SyncScope::parse("banana"), SyncScope::None);
    }

    #[test]
    fn test_config_is_dev_mode() {
        let config = RuntimeConfig::for_tests();
        assert!(config.is_dev_mode());
        assert_eq!(config.database_url, "sqlite::memory:");
    }
}
