/// Structured error types for tenantpool-core.
///
/// Only configuration and bootstrap fail with `PoolError`. Database
/// operations on a `PoolHandle` hand back `sqlx::Error` untouched, and
/// registry lifecycle calls never fail at all.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error raised while loading configuration or connecting tenant pools
#[derive(Error, Debug)]
pub enum PoolError {
    /// Config file could not be read
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML or does not match the schema
    #[error("Invalid config TOML: {source}")]
    Toml {
        #[from]
        source: toml::de::Error,
    },

    /// `${VAR}` reference to an unset environment variable
    #[error("Environment variable '{name}' referenced in config is not set")]
    MissingEnvVar { name: String },

    /// Semantically invalid tenant or pool settings
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// Underlying pool could not be created for a tenant
    #[error("Failed to connect pool for project '{project}': {source}")]
    Connect {
        project: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Result type alias for tenantpool-core configuration and bootstrap
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn missing_env_var(name: impl Into<String>) -> Self {
        Self::MissingEnvVar { name: name.into() }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn connect(project: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Connect {
            project: project.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = PoolError::missing_env_var("P1_DATABASE_URL");
        assert_eq!(
            err.to_string(),
            "Environment variable 'P1_DATABASE_URL' referenced in config is not set"
        );

        let err = PoolError::invalid_config("duplicate tenant id 'p1'");
        assert!(err.to_string().contains("duplicate tenant id 'p1'"));
    }

    #[test]
    fn test_connect_error_keeps_source() {
        let err = PoolError::connect("p1", sqlx::Error::PoolTimedOut);

        assert!(err.to_string().contains("'p1'"));
        let source = err.source().expect("connect error has a source");
        assert!(source.downcast_ref::<sqlx::Error>().is_some());
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: PoolError = toml_err.into();

        assert!(matches!(err, PoolError::Toml { .. }));
    }
}
