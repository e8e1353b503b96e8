use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use stk_config::secrets::{resolve_secrets, ResolvedSecrets};
use stk_config::{SyncConfig, UnusedKeyPolicy};
use stk_store::{MarketplaceCredentials, MemoryStore, PgStore, ShopRecord, SyncStore};
use stk_sync::{run_sync_once, SyncContext};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "stk")]
#[command(about = "Two-way stock sync between a primary store and a marketplace shop", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass for a shop
    Sync {
        /// Primary shop domain (e.g. demo.myshopify.com)
        #[arg(long)]
        shop: String,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Debug-level logging unless RUST_LOG says otherwise
        #[arg(long, default_value_t = false)]
        debug: bool,

        /// Use an in-memory store seeded from the bootstrap tokens
        #[arg(long, default_value_t = false)]
        memory: bool,
    },

    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> shop overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply embedded SQL migrations.
    Migrate,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; deployments inject env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();
    let debug = matches!(cli.cmd, Commands::Sync { debug: true, .. });
    init_tracing(debug);

    match cli.cmd {
        Commands::Sync {
            shop,
            config_paths,
            memory,
            ..
        } => sync(&shop, &config_paths, memory).await,

        Commands::Db { cmd } => {
            let pool = stk_store::connect_from_env(stk_store::ENV_DB_URL).await?;
            let store = PgStore::new(pool);
            match cmd {
                DbCmd::Status => {
                    let s = store.status().await?;
                    println!("db_ok={} has_stock_records_table={}", s.ok, s.has_stock_records_table);
                }
                DbCmd::Migrate => {
                    store.migrate().await?;
                    println!("migrations_applied=true");
                }
            }
            Ok(())
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = stk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(())
        }
    }
}

async fn sync(shop: &str, config_paths: &[String], memory: bool) -> Result<()> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = stk_config::load_layered_yaml(&path_refs)?;
    let unused = stk_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config keys not consumed by any setting");
    }
    let cfg = SyncConfig::from_json(&loaded.config_json)?;
    let secrets = resolve_secrets(&loaded.config_json)?;
    info!(shop, config_hash = %loaded.config_hash, memory, "configuration loaded");

    let store: Arc<dyn SyncStore> = if memory {
        Arc::new(seeded_memory_store(shop, &secrets))
    } else {
        let url = secrets.database_url.as_deref().with_context(|| {
            format!(
                "database url env var '{}' is not set (use --memory for a dry store)",
                cfg.store.database_url_env
            )
        })?;
        Arc::new(PgStore::new(stk_store::connect(url).await?))
    };

    let ctx = SyncContext::from_config(&cfg, &secrets, store);
    match run_sync_once(&ctx, shop).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "{}",
                json!({ "ok": false, "shop": shop, "stage": e.stage, "error": e.cause.to_string() })
            );
            std::process::exit(1);
        }
    }
}

/// Shop record for a `--memory` run. The marketplace side starts from a
/// refresh token so the first call obtains a fresh access token.
fn seeded_memory_store(shop: &str, secrets: &ResolvedSecrets) -> MemoryStore {
    let mut record = ShopRecord::new(shop);
    record.primary_access_token = secrets.bootstrap_primary_token.clone();
    if let Some(refresh) = &secrets.bootstrap_marketplace_refresh_token {
        record.marketplace = MarketplaceCredentials {
            onboarded: true,
            refresh_token: Some(refresh.clone()),
            ..Default::default()
        };
    } else {
        warn!(shop, "no bootstrap marketplace refresh token; marketplace auth will fail");
    }
    MemoryStore::with_shop(record)
}
