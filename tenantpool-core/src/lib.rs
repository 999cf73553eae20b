//! tenantpool-core: per-tenant Postgres pools behind one registry
//!
//! A [`Registry`] maps project ids to [`PoolHandle`]s. Each handle wraps
//! one tenant's `sqlx` pool and runs `query_row`, `query`, `exec`, and
//! `begin` inside a tracing span tagged with the statement and its
//! arguments.
//!
//! ```ignore
//! let config = RegistryConfig::load("tenantpool.toml")?;
//! let registry = Registry::connect(&config).await?;
//!
//! let pool = registry.get("p1").expect("tenant registered");
//! pool.exec("INSERT INTO notes (body) VALUES ($1)", &["hi".into()]).await?;
//! let (body,): (String,) = pool
//!     .query_row("SELECT body FROM notes LIMIT 1", &[])
//!     .await
//!     .scan()?;
//! ```

pub mod args;
pub mod backend;
pub mod config;
pub mod error;
pub mod handle;
pub mod pg;
pub mod registry;
pub mod traced;

#[cfg(test)]
pub(crate) mod testing;

pub use args::{ArgList, CommandTag, PoolStats, Rows, SingleRow, SqlArg};
pub use backend::Backend;
pub use config::{load_dotenv, PoolSettings, RegistryConfig, TenantConfig};
pub use error::{PoolError, Result};
pub use handle::PoolHandle;
pub use pg::PgBackend;
pub use registry::{Registration, Registry};
pub use traced::Traced;
