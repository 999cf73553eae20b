//! PostgreSQL backend on top of `sqlx::PgPool`.
//!
//! The pool itself (connection limits, queueing, health checks, TLS) is
//! sqlx's business; this module only binds arguments and maps results.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgPoolOptions, PgRow, PgTypeInfo};
use sqlx::query::Query;
use sqlx::{Encode, FromRow, PgPool, Postgres, Transaction, Type};
use tracing::{info, warn};

use crate::args::{CommandTag, PoolStats, Rows, SingleRow, SqlArg};
use crate::backend::Backend;
use crate::config::{PoolSettings, RegistryConfig, TenantConfig};
use crate::error::{PoolError, Result};
use crate::handle::PoolHandle;
use crate::registry::{Registration, Registry};

/// Backend over a live `PgPool`
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool for a tenant using its resolved settings.
    ///
    /// With `lazy` set, no connection is attempted until the first query.
    pub async fn connect(tenant: &TenantConfig, defaults: &PoolSettings) -> Result<Self> {
        let settings = tenant.settings(defaults);
        let options = pool_options(&settings);

        let pool = if settings.lazy {
            options.connect_lazy(&tenant.database_url)
        } else {
            options.connect(&tenant.database_url).await
        }
        .map_err(|e| PoolError::connect(&tenant.id, e))?;

        info!(
            project = %tenant.id,
            max_connections = settings.max_connections,
            lazy = settings.lazy,
            "opened tenant pool"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn pool_options(settings: &PoolSettings) -> PgPoolOptions {
    let options = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));

    match settings.idle_timeout_secs {
        Some(0) | None => options.idle_timeout(None),
        Some(secs) => options.idle_timeout(Duration::from_secs(secs)),
    }
}

/// NULL sent with parameter type 0, so the server infers the type from
/// the statement and it fits any column.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(
        &self,
        _buf: &mut PgArgumentBuffer,
    ) -> std::result::Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

// Parameters travel in binary format, so only NULL can be left untyped.
// Text binds as TEXT; uuid and timestamp values need their own variants.
fn bind_args<'q>(statement: &'q str, args: &'q [SqlArg]) -> Query<'q, Postgres, PgArguments> {
    args.iter().fold(sqlx::query(statement), |query, arg| match arg {
        SqlArg::Null => query.bind(UntypedNull),
        SqlArg::Bool(v) => query.bind(*v),
        SqlArg::Int(v) => query.bind(*v),
        SqlArg::Float(v) => query.bind(*v),
        SqlArg::Text(v) => query.bind(v.as_str()),
        SqlArg::Bytes(v) => query.bind(v.as_slice()),
        SqlArg::Uuid(v) => query.bind(*v),
        SqlArg::Timestamp(v) => query.bind(*v),
        SqlArg::Json(v) => query.bind(v),
    })
}

#[async_trait]
impl Backend for PgBackend {
    type Row = PgRow;
    type Transaction = Transaction<'static, Postgres>;

    const SYSTEM: &'static str = "postgresql";

    async fn query_row(
        &self,
        statement: &str,
        args: &[SqlArg],
    ) -> std::result::Result<Option<PgRow>, sqlx::Error> {
        bind_args(statement, args).fetch_optional(&self.pool).await
    }

    async fn query(
        &self,
        statement: &str,
        args: &[SqlArg],
    ) -> std::result::Result<Vec<PgRow>, sqlx::Error> {
        bind_args(statement, args).fetch_all(&self.pool).await
    }

    async fn exec(
        &self,
        statement: &str,
        args: &[SqlArg],
    ) -> std::result::Result<CommandTag, sqlx::Error> {
        let done = bind_args(statement, args).execute(&self.pool).await?;
        Ok(CommandTag::for_statement(statement, done.rows_affected()))
    }

    async fn begin(&self) -> std::result::Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
        }
    }

    async fn close(&self) {
        self.pool.close().await
    }
}

impl Registry<PgBackend> {
    /// Open every configured tenant pool and register it.
    ///
    /// Stops at the first tenant that fails to connect; pools opened
    /// before it are closed again.
    pub async fn connect(config: &RegistryConfig) -> Result<Self> {
        let registry = Registry::new();

        for tenant in &config.tenants {
            let backend = match PgBackend::connect(tenant, &config.pool).await {
                Ok(backend) => backend,
                Err(e) => {
                    registry.shutdown().await;
                    return Err(e);
                }
            };
            let outcome = registry.add(&tenant.id, PoolHandle::new(tenant.id.clone(), backend));
            if outcome != Registration::Added {
                warn!(project = %tenant.id, ?outcome, "tenant pool not registered");
            }
        }

        info!(tenants = registry.len(), "tenant pool registry ready");
        Ok(registry)
    }
}

impl SingleRow<PgRow> {
    /// Read the row and decode it, e.g. `scan::<(i64, String)>()`.
    pub fn scan<T>(self) -> std::result::Result<T, sqlx::Error>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        T::from_row(&self.into_row()?)
    }
}

impl Rows<PgRow> {
    pub fn scan_all<T>(&self) -> std::result::Result<Vec<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        self.iter().map(|row| T::from_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(url: &str) -> TenantConfig {
        TenantConfig {
            id: "p1".into(),
            database_url: url.into(),
            max_connections: Some(3),
            min_connections: None,
            lazy: Some(true),
        }
    }

    #[tokio::test]
    async fn test_lazy_connect_does_not_touch_the_network() {
        let backend = PgBackend::connect(
            &tenant("postgres://nobody@127.0.0.1:1/none"),
            &PoolSettings::default(),
        )
        .await
        .expect("lazy pools are created without connecting");

        assert_eq!(backend.stats(), PoolStats { size: 0, idle: 0 });
        assert_eq!(backend.pool().options().get_max_connections(), 3);
    }

    #[tokio::test]
    async fn test_invalid_url_names_the_tenant() {
        let err = PgBackend::connect(&tenant("not a url"), &PoolSettings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PoolError::Connect { ref project, .. } if project == "p1"));
    }

    #[tokio::test]
    async fn test_registry_connect_registers_every_tenant() {
        let config = RegistryConfig::from_toml_str(
            r#"
            [pool]
            lazy = true

            [[tenants]]
            id = "p1"
            database_url = "postgres://nobody@127.0.0.1:1/p1"

            [[tenants]]
            id = "p2"
            database_url = "postgres://nobody@127.0.0.1:1/p2"
            "#,
        )
        .unwrap();

        let registry = Registry::connect(&config).await.unwrap();
        assert_eq!(registry.projects(), vec!["p1", "p2"]);
        assert_eq!(registry.get("p2").unwrap().project(), "p2");
        assert_eq!(registry.shutdown().await, 2);
    }

    // Integration tests require a real database
    // Run with: DATABASE_URL=postgres://... cargo test -p tenantpool-core -- --ignored

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_binds_every_argument_kind() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let backend = PgBackend::new(PgPool::connect(&url).await.expect("connect failed"));

        let args = [
            SqlArg::Null,
            SqlArg::from(true),
            SqlArg::from(7i64),
            SqlArg::from(1.5),
            SqlArg::from("text"),
            SqlArg::from(vec![1u8, 2, 3]),
            SqlArg::from(uuid::Uuid::nil()),
            SqlArg::from(chrono::Utc::now()),
            SqlArg::from(serde_json::json!({"k": 1})),
        ];
        let row = backend
            .query_row(
                "SELECT $1::text IS NULL, $2::bool, $3::int8, $4::float8, $5::text, \
                 length($6::bytea), $7::uuid IS NOT NULL, $8::timestamptz IS NOT NULL, $9::jsonb->>'k'",
                &args,
            )
            .await
            .expect("query failed");

        let row = SingleRow::new(Ok(row));
        let decoded: (bool, bool, i64, f64, String, i32, bool, bool, String) =
            row.scan().expect("decode failed");
        assert_eq!(
            decoded,
            (true, true, 7, 1.5, "text".to_string(), 3, true, true, "1".to_string())
        );
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn test_null_binds_into_non_text_columns_without_casts() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let backend = PgBackend::new(PgPool::connect(&url).await.expect("connect failed"));
        let table = format!("tp_nulls_{}", uuid::Uuid::new_v4().simple());

        backend
            .exec(
                &format!("CREATE TABLE {table} (n INT4, id UUID, at TIMESTAMPTZ, label VARCHAR(8))"),
                &[],
            )
            .await
            .expect("create failed");

        let tag = backend
            .exec(
                &format!("INSERT INTO {table} (n, id, at, label) VALUES ($1, $2, $3, $4)"),
                &[SqlArg::Null, SqlArg::Null, SqlArg::Null, SqlArg::from("short")],
            )
            .await
            .expect("insert failed");
        assert_eq!(tag.to_string(), "INSERT 0 1");

        let uuid_match = backend
            .query(
                &format!("SELECT n FROM {table} WHERE id IS NULL AND $1 <> gen_random_uuid()"),
                &[SqlArg::from(uuid::Uuid::nil())],
            )
            .await
            .expect("uuid comparison failed");
        assert_eq!(uuid_match.len(), 1);

        backend
            .exec(&format!("DROP TABLE {table}"), &[])
            .await
            .expect("drop failed");
    }
}
