//! Process configuration, read once at startup.
//!
//! | variable | required | meaning |
//! |----------|----------|---------|
//! | `TOKEN_ENCRYPTION_SECRET` | yes | secret the token-encryption key is derived from |
//! | `DATABASE_URL` | no | Postgres URL; the in-memory store is used when unset |
//! | `DATABASE_MAX_CONNECTIONS` | no | pool size (default 5) |
//! | `APP_ENV` | no | `development` exposes error details at the boundary |

use thiserror::Error;

pub const TOKEN_ENCRYPTION_SECRET: &str = "TOKEN_ENCRYPTION_SECRET";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";
pub const APP_ENV: &str = "APP_ENV";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Deployment mode. Controls how much error detail leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

/// Secret material for token encryption.
///
/// Handed to [`TokenCipher::new`](crate::crypto::TokenCipher::new) once; the cipher
/// derives and owns the key from then on.
#[derive(Clone)]
pub struct EncryptionConfig {
    secret: String,
}

impl EncryptionConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl core::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub encryption: EncryptionConfig,
    pub database: Option<DatabaseConfig>,
    pub environment: Environment,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary lookup (tests, alternative sources).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup(TOKEN_ENCRYPTION_SECRET)
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing(TOKEN_ENCRYPTION_SECRET))?;

        let database = match lookup(DATABASE_URL).filter(|s| !s.trim().is_empty()) {
            None => None,
            Some(url) => {
                let max_connections = match lookup(DATABASE_MAX_CONNECTIONS) {
                    None => DEFAULT_MAX_CONNECTIONS,
                    Some(raw) => parse_pool_size(&raw)?,
                };
                Some(DatabaseConfig {
                    url,
                    max_connections,
                })
            }
        };

        let environment = match lookup(APP_ENV).as_deref().map(str::trim) {
            None | Some("") | Some("production") => Environment::Production,
            Some("development") => Environment::Development,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: APP_ENV,
                    reason: format!("expected `development` or `production`, got `{other}`"),
                });
            }
        };

        Ok(Self {
            encryption: EncryptionConfig::new(secret),
            database,
            environment,
        })
    }
}

fn parse_pool_size(raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(ConfigError::Invalid {
            name: DATABASE_MAX_CONNECTIONS,
            reason: "must be at least 1".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::Invalid {
            name: DATABASE_MAX_CONNECTIONS,
            reason: e.to_string(),
        }),
    }
}
