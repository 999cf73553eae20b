use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PoolError, Result};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "tenantpool.toml";

/// Load `.env` from the current directory, if one exists.
///
/// Variables already set in the environment win over the file.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded .env from {}", path.display()),
        Err(e) => debug!("No .env loaded: {}", e),
    }
}

// ============================================================================
// TOML Configuration
// ============================================================================

/// Registry configuration: pool defaults plus one entry per tenant
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

/// Pool sizing shared by every tenant unless overridden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub min_connections: u32,

    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Seconds before an idle connection is closed; 0 keeps them forever
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: Option<u64>,

    /// Create pools without connecting; the first query opens a connection
    #[serde(default)]
    pub lazy: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: 0,
            acquire_timeout_secs: default_acquire_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            lazy: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub id: String,

    /// Connection string; credentials and TLS mode travel inside it
    pub database_url: String,

    #[serde(default)]
    pub max_connections: Option<u32>,

    #[serde(default)]
    pub min_connections: Option<u32>,

    #[serde(default)]
    pub lazy: Option<bool>,
}

impl TenantConfig {
    /// Pool settings for this tenant, with its overrides applied to `defaults`.
    pub fn settings(&self, defaults: &PoolSettings) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            min_connections: self.min_connections.unwrap_or(defaults.min_connections),
            lazy: self.lazy.unwrap_or(defaults.lazy),
            ..defaults.clone()
        }
    }
}

// Default value functions for serde
fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> Option<u64> {
    Some(600)
}

impl RegistryConfig {
    /// Read, expand, and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| PoolError::io(path, e))?;
        let config = Self::from_toml_str(&contents)?;
        info!(
            "Loaded {} tenant(s) from {}",
            config.tenants.len(),
            path.display()
        );
        Ok(config)
    }

    /// Load from `path` if given, else `./tenantpool.toml`.
    pub fn load_default(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(path)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(contents)?;
        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Substitute `${VAR}` references in connection strings.
    fn expand_env_vars(&mut self) -> Result<()> {
        for tenant in &mut self.tenants {
            tenant.database_url = expand_env(&tenant.database_url)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        check_sizes("[pool]", &self.pool)?;

        let mut seen = HashSet::new();
        for tenant in &self.tenants {
            if tenant.id.is_empty() {
                return Err(PoolError::invalid_config("tenant id must not be empty"));
            }
            if !seen.insert(tenant.id.as_str()) {
                return Err(PoolError::invalid_config(format!(
                    "duplicate tenant id '{}'",
                    tenant.id
                )));
            }
            if tenant.database_url.is_empty() {
                return Err(PoolError::invalid_config(format!(
                    "tenant '{}' has an empty database_url",
                    tenant.id
                )));
            }
            check_sizes(&format!("tenant '{}'", tenant.id), &tenant.settings(&self.pool))?;
        }
        Ok(())
    }

    pub fn tenant(&self, id: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|t| t.id == id)
    }
}

fn check_sizes(scope: &str, settings: &PoolSettings) -> Result<()> {
    if settings.max_connections == 0 {
        return Err(PoolError::invalid_config(format!(
            "{scope}: max_connections must be at least 1"
        )));
    }
    if settings.min_connections > settings.max_connections {
        return Err(PoolError::invalid_config(format!(
            "{scope}: min_connections ({}) exceeds max_connections ({})",
            settings.min_connections, settings.max_connections
        )));
    }
    Ok(())
}

/// Replace every `${NAME}` in `value` with the environment variable `NAME`.
fn expand_env(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // unterminated reference, keep it literally
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        let resolved = std::env::var(name).map_err(|_| PoolError::missing_env_var(name))?;
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
