//! tenantpool CLI - probe the per-tenant pools described by a registry config
//!
//! Subcommands:
//! - `tenants`: list configured tenants
//! - `ping`: open each tenant pool and run `SELECT 1` through its handle
//! - `exec` / `query`: run an ad-hoc statement against one tenant

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tenantpool_core::{load_dotenv, Registry, RegistryConfig, SqlArg};
use tracing::{info, warn};

mod render;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "tenantpool",
    author,
    version,
    about = "Probe per-tenant Postgres pools from a tenantpool registry config"
)]
struct Cli {
    /// Registry config file
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "TENANTPOOL_CONFIG",
        default_value = "tenantpool.toml"
    )]
    config: PathBuf,

    /// Debug logging, including one line per finished database span
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long = "json-logs", global = true)]
    json_logs: bool,

    /// Export spans over OTLP (requires the `telemetry` feature)
    #[arg(long, global = true)]
    otel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List configured tenant ids
    Tenants,
    /// Connect tenant pools and run `SELECT 1` through each
    Ping {
        /// Only ping this tenant
        #[arg(long)]
        project: Option<String>,
    },
    /// Run a statement that returns no rows and print its command tag
    Exec(StatementArgs),
    /// Run a statement and print each row as a JSON line
    Query(StatementArgs),
}

#[derive(Parser, Debug)]
struct StatementArgs {
    /// Tenant to run against
    #[arg(long, short = 'p')]
    project: String,

    /// SQL with $1, $2, ... placeholders
    statement: String,

    /// Positional bind argument (repeatable); `text:` prefix forces a string
    #[arg(long = "arg", value_name = "VALUE", value_parser = render::parse_arg)]
    args: Vec<SqlArg>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // before parsing, so TENANTPOOL_CONFIG and RUST_LOG can come from .env
    load_dotenv();
    let cli = Cli::parse();

    tracing_setup::init(&tracing_setup::TracingConfig {
        debug: cli.debug,
        json: cli.json_logs,
        otel: cli.otel,
    })?;

    let result = run(cli).await;
    tracing_setup::shutdown_otel();
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = RegistryConfig::load(&cli.config)
        .with_context(|| format!("Failed to load registry config {}", cli.config.display()))?;

    match cli.command {
        Commands::Tenants => {
            for tenant in &config.tenants {
                let settings = tenant.settings(&config.pool);
                println!(
                    "{}\tmax_connections={}\tlazy={}",
                    tenant.id, settings.max_connections, settings.lazy
                );
            }
            Ok(())
        }
        Commands::Ping { project } => ping(only(config, project.as_deref())?).await,
        Commands::Exec(args) => {
            let registry = connect_one(config, &args.project).await?;
            let result = exec(&registry, &args).await;
            registry.shutdown().await;
            result
        }
        Commands::Query(args) => {
            let registry = connect_one(config, &args.project).await?;
            let result = query(&registry, &args).await;
            registry.shutdown().await;
            result
        }
    }
}

async fn exec(registry: &Registry, args: &StatementArgs) -> Result<()> {
    let pool = registry
        .get(&args.project)
        .ok_or_else(|| anyhow!("project '{}' is not registered", args.project))?;

    let tag = pool.exec(&args.statement, &args.args).await?;
    println!("{tag}");
    Ok(())
}

async fn query(registry: &Registry, args: &StatementArgs) -> Result<()> {
    let pool = registry
        .get(&args.project)
        .ok_or_else(|| anyhow!("project '{}' is not registered", args.project))?;

    let rows = pool.query(&args.statement, &args.args).await?;
    for row in &rows {
        println!("{}", render::row_to_json(row));
    }
    info!(rows = rows.len(), "query finished");
    Ok(())
}

/// Restrict a config to a single tenant.
fn only(mut config: RegistryConfig, project: Option<&str>) -> Result<RegistryConfig> {
    if let Some(project) = project {
        config.tenants.retain(|t| t.id == project);
        if config.tenants.is_empty() {
            anyhow::bail!("project '{project}' is not in the config");
        }
    }
    Ok(config)
}

async fn connect_one(config: RegistryConfig, project: &str) -> Result<Registry> {
    let config = only(config, Some(project))?;
    Ok(Registry::connect(&config).await?)
}

async fn ping(config: RegistryConfig) -> Result<()> {
    let registry = Registry::connect(&config).await?;
    let mut failures = 0usize;

    for project in registry.projects() {
        let Some(pool) = registry.get(&project) else {
            continue;
        };

        let started = Instant::now();
        let result = pool.query_row("SELECT 1::int4", &[]).await.scan::<(i32,)>();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let stats = pool.stats();

        match result {
            Ok(_) => println!(
                "{project}\tok\t{elapsed_ms:.1}ms\tsize={}\tidle={}",
                stats.size, stats.idle
            ),
            Err(e) => {
                failures += 1;
                warn!(project = %project, error = %e, "ping failed");
                println!("{project}\tfailed\t{e}");
            }
        }
    }

    registry.shutdown().await;
    if failures > 0 {
        anyhow::bail!("{failures} tenant(s) failed to respond");
    }
    Ok(())
}
