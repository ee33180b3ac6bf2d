//! Herald Server
//!
//! Publishes events to external channels, schedules deferred publication,
//! reconciles RSVP attendance and sends reminders.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, LoadedConfig, get_database_url};
use herald_core::Engine;
use herald_core::channels::{
    MessageIdCache, ReminderNotifier, TracingReminderNotifier, WebhookReminderNotifier,
};
use herald_core::config::ConfigStore;
use herald_core::events::rsvp_update_channel;
use herald_core::framework::DatabaseProcessor;
use herald_core::store::{HttpImageStore, ImageStore, MemoryStore, NoopImageStore, Store};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Herald - event publication and attendance engine
#[derive(Parser, Debug)]
#[command(name = "herald-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, default_value = "./herald-config.toml")]
    config: PathBuf,

    /// Listen address, overriding `[server] listen`
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Apply pending migrations before serving
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Keep everything in process memory instead of Postgres
    #[arg(long, default_value = "false")]
    in_memory: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "HERALD_LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "herald-server starting");

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded = config_loader.load().inspect_err(|e| {
        tracing::error!(path = %args.config.display(), error = %e, "Invalid configuration");
    })?;
    tracing::info!(
        path = %args.config.display(),
        channels = loaded.channels.len(),
        push_enabled = loaded.push_secret.is_some(),
        "Configuration loaded"
    );

    let db_pool = if args.in_memory {
        tracing::warn!("Running with the in-memory store, nothing survives a restart");
        None
    } else {
        Some(connect_database(args.migrate).await?)
    };
    let store: Arc<dyn Store> = match &db_pool {
        Some(pool) => Arc::new(DatabaseProcessor::new(
            pool.clone(),
            loaded.legacy_channel.clone(),
        )),
        None => Arc::new(MemoryStore::new()),
    };

    let http_client = reqwest::Client::new();
    let engine = Arc::new(build_engine(store, &loaded, &http_client).await?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (rsvp_tx, rsvp_rx) = rsvp_update_channel();
    let engine_handles = engine.start(shutdown_rx, rsvp_rx);

    let listen_addr = loaded.listen;
    let state = AppState::new(engine, loaded.push_secret, rsvp_tx);
    let reload_stop = spawn_config_reload_handler(state.clone(), config_loader, http_client);

    let served = run_server(build_router(state), listen_addr).await;

    reload_stop.notify_one();
    let _ = shutdown_tx.send(true);
    engine_handles.join().await;
    if let Some(pool) = db_pool {
        pool.close().await;
    }
    tracing::info!("herald-server stopped");

    served.map_err(Into::into)
}

async fn connect_database(migrate: bool) -> anyhow::Result<PgPool> {
    let database_url = get_database_url()?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Database connection failed"))?;
    tracing::info!("Connected to Postgres");

    if migrate {
        sqlx::migrate!("../migrations")
            .run(&pool)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Migrations failed"))?;
        tracing::info!("Migrations applied");
    }
    Ok(pool)
}

async fn build_engine(
    store: Arc<dyn Store>,
    config: &LoadedConfig,
    http_client: &reqwest::Client,
) -> anyhow::Result<Engine> {
    let registry = config.channel_registry(http_client);

    let notifier: Arc<dyn ReminderNotifier> = match &config.notifier_url {
        Some(url) => Arc::new(WebhookReminderNotifier::new(
            url.clone(),
            config.notifier_secret.clone(),
            http_client.clone(),
        )),
        None => {
            tracing::warn!("No reminder notifier configured, reminders are only logged");
            Arc::new(TracingReminderNotifier)
        }
    };
    let images: Arc<dyn ImageStore> = match &config.image_upload_url {
        Some(url) => Arc::new(HttpImageStore::new(url.clone())),
        None => Arc::new(NoopImageStore),
    };

    let mut builder = Engine::builder(store, ConfigStore::new(registry))
        .with_config(config.engine)
        .with_notifier(notifier)
        .with_image_store(images);
    if let Some(path) = &config.fallback_cache {
        let cache = MessageIdCache::load(path).await.inspect_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to load fallback message-id cache");
        })?;
        builder = builder.with_fallback_cache(Arc::new(cache));
    }
    Ok(builder.build())
}

/// `RUST_LOG` wins over the built-in filter.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
