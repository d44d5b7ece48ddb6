//! Process configuration read from the environment.

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3001,http://localhost:3002,http://localhost:3003";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEV_JWT_SECRET: &str = "dev-identity-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Where application data lives.
#[derive(Clone, PartialEq, Eq)]
pub enum Persistence {
    InMemory,
    Postgres { database_url: String, max_connections: u32 },
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Persistence::InMemory => f.write_str("InMemory"),
            Persistence::Postgres { max_connections, .. } => f
                .debug_struct("Postgres")
                .field("database_url", &"<redacted>")
                .field("max_connections", max_connections)
                .finish(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub jwt_secret: String,
    pub persistence: Persistence,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("allowed_origins", &self.allowed_origins)
            .field("jwt_secret", &"<redacted>")
            .field("persistence", &self.persistence)
            .finish()
    }
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match read("API_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                var: "API_PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let allowed_origins = read("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let persistent = match read("USE_PERSISTENT_STORES") {
            Some(raw) => raw.parse::<bool>().map_err(|_| ConfigError::Invalid {
                var: "USE_PERSISTENT_STORES",
                value: raw,
            })?,
            None => false,
        };

        let persistence = if persistent {
            let database_url = read("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let max_connections = match read("DATABASE_MAX_CONNECTIONS") {
                Some(raw) => raw
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or(ConfigError::Invalid {
                        var: "DATABASE_MAX_CONNECTIONS",
                        value: raw,
                    })?,
                None => DEFAULT_MAX_CONNECTIONS,
            };
            Persistence::Postgres {
                database_url,
                max_connections,
            }
        } else {
            Persistence::InMemory
        };

        // The dev secret is public; only in-memory runs may fall back to it.
        let jwt_secret = match (read("IDENTITY_JWT_SECRET"), &persistence) {
            (Some(secret), _) => secret,
            (None, Persistence::Postgres { .. }) => return Err(ConfigError::Missing("IDENTITY_JWT_SECRET")),
            (None, Persistence::InMemory) => {
                tracing::warn!("IDENTITY_JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        Ok(Self {
            port,
            allowed_origins,
            jwt_secret,
            persistence,
        })
    }

    /// In-memory configuration with the given secret; used by tests and local tooling.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Self {
            port: 0,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.split(',').map(str::to_string).collect(),
            jwt_secret: jwt_secret.into(),
            persistence: Persistence::InMemory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.allowed_origins.len(), 3);
        assert_eq!(cfg.persistence, Persistence::InMemory);
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let cfg = config(&[("ALLOWED_ORIGINS", "https://a.test, https://b.test,,")]).unwrap();
        assert_eq!(cfg.allowed_origins, vec!["https://a.test", "https://b.test"]);
    }

    #[test]
    fn persistent_requires_database_url() {
        assert_eq!(
            config(&[("USE_PERSISTENT_STORES", "true")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/classroom"),
            ("IDENTITY_JWT_SECRET", "a-real-signing-secret"),
        ])
        .unwrap();
        assert!(matches!(cfg.persistence, Persistence::Postgres { max_connections: 10, .. }));
    }

    #[test]
    fn persistent_requires_jwt_secret() {
        assert_eq!(
            config(&[("USE_PERSISTENT_STORES", "true"), ("DATABASE_URL", "postgres://db/x")]),
            Err(ConfigError::Missing("IDENTITY_JWT_SECRET"))
        );
        assert_eq!(config(&[]).unwrap().jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(config(&[("API_PORT", "http")]), Err(ConfigError::Invalid { var: "API_PORT", .. })));
        assert!(config(&[("USE_PERSISTENT_STORES", "yes")]).is_err());
        assert!(
            config(&[
                ("USE_PERSISTENT_STORES", "true"),
                ("DATABASE_URL", "postgres://x"),
                ("IDENTITY_JWT_SECRET", "secret"),
                ("DATABASE_MAX_CONNECTIONS", "0"),
            ])
            .is_err()
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = config(&[
            ("IDENTITY_JWT_SECRET", "hunter2"),
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://user:pw@db/x"),
        ])
        .unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("pw@db"));
    }
}
