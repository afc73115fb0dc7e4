//! TVCast hub - main entry point
//!
//! Wires the agent registry, job dispatcher, playback coordinator and HTTP
//! API together, then runs until Ctrl+C or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tvcast_common::config::{load_toml_config, resolve_config_location, CONFIG_ENV_VAR};
use tvcast_common::events::EventBus;
use tvcast_hub::agents::AgentRegistry;
use tvcast_hub::announce::{Announcer, EventAnnouncer, WebhookAnnouncer};
use tvcast_hub::api::{self, AppState};
use tvcast_hub::config::HubConfig;
use tvcast_hub::jobs::{JobDispatcher, MailboxTransport};
use tvcast_hub::library::InventoryLibrary;
use tvcast_hub::playback::{spawn_promotion_loop, CoordinatorSettings, PlaybackCoordinator};
use tvcast_hub::player::FfmpegPlayer;
use tvcast_hub::schedule::DailySchedule;
use tvcast_hub::store::SqliteStore;

/// Command-line arguments for tvcast-hub
#[derive(Parser, Debug)]
#[command(name = "tvcast-hub")]
#[command(about = "Broadcast coordinator for TVCast playback agents")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "TVCAST_PORT")]
    port: Option<u16>,

    /// SQLite database file (overrides config)
    #[arg(short, long, env = "TVCAST_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let location = resolve_config_location(args.config.as_deref(), CONFIG_ENV_VAR, "hub");
    let mut config: HubConfig = load_toml_config(&location).context("Failed to load config")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = Some(database);
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tvcast_hub={},tower_http={}", config.logging.level, config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting tvcast-hub v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Config: {:?}", location);

    config.validate().context("Invalid configuration")?;

    let database_path = config.database_path();
    let pool = tvcast_common::db::init_database(&database_path)
        .await
        .context("Failed to initialize database")?;
    let store = Arc::new(SqliteStore::new(pool));

    let events = EventBus::default();
    let timing = config.timing.clone();

    let registry = Arc::new(AgentRegistry::new(
        store.clone(),
        timing.heartbeat_period(),
        events.clone(),
    ));

    let mailboxes = Arc::new(MailboxTransport::new());
    let dispatcher = Arc::new(JobDispatcher::new(mailboxes.clone()));

    let library = Arc::new(InventoryLibrary::new(
        config.commercials.clone(),
        config.scratch_dir(),
    ));
    info!("{} commercial sources configured", config.commercials.len());

    let event_announcer = EventAnnouncer::new(events.clone(), config.announce.prefix.clone());
    let announcer: Arc<dyn Announcer> = match &config.announce.webhook_url {
        Some(url) => {
            info!("Announcements also posted to webhook");
            Arc::new(WebhookAnnouncer::new(event_announcer, url.clone()))
        }
        None => Arc::new(event_announcer),
    };

    let schedule = Arc::new(DailySchedule::from_config(&config.blocks).context("Invalid block schedule")?);

    let coordinator = Arc::new(PlaybackCoordinator::new(
        dispatcher.clone(),
        store.clone(),
        library.clone(),
        Arc::new(FfmpegPlayer::default()),
        announcer,
        schedule.clone(),
        events.clone(),
        CoordinatorSettings {
            fudge_factor_ms: i64::try_from(timing.fudge_factor_ms).context("fudge_factor_ms out of range")?,
            play_timeout: timing.play_timeout(),
            stop_timeout: timing.stop_timeout(),
            stream_url: config.stream_url.clone(),
            viewer_url: config.viewer_url.clone(),
        },
    ));

    let shutdown = CancellationToken::new();
    let background = vec![
        registry.clone().spawn_reaper(timing.reaper_interval(), shutdown.clone()),
        spawn_promotion_loop(coordinator.clone(), timing.promotion_interval(), shutdown.clone()),
        schedule.clone().spawn_trigger(coordinator.clone(), shutdown.clone()),
    ];

    let app = api::build_router(AppState {
        registry,
        dispatcher,
        mailboxes,
        library,
        coordinator,
        events,
        agent_password: config.agents.password.clone(),
        shutdown: shutdown.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    let token = shutdown.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            token.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    for task in background {
        if let Err(e) = task.await {
            error!("Background task ended abnormally: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
