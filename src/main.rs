use anyhow::Context;
use clap::{Parser, Subcommand};
use mcp_gateway::config::{
    merge_configs, ConfigNotifier, FileConfigStore, GatewaySettings, SessionBackend,
};
use mcp_gateway::gateway::{reload, spawn_internal_listener, spawn_public_listener, GatewayServer};
use mcp_gateway::session::SessionStore;
use mcp_gateway::utils::{read_pid, PidManager};
use mcp_gateway::VERSION;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mcp-gateway")]
#[command(about = "API gateway for the MCP ecosystem")]
#[command(version)]
struct Cli {
    /// Path to the settings file
    #[arg(short, long, default_value = "gateway.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to the PID file (overrides the settings file)
    #[arg(long)]
    pid: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the version number
    Version,
    /// Reload the configuration of a running gateway instance
    Reload,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("mcp-gateway version {}", VERSION);
            return Ok(());
        }
        Some(Commands::Reload) => return send_reload(&cli),
        None => {}
    }

    init_logging(&cli.log_level);
    run(cli).await
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Send SIGHUP to the process named by the PID file
fn send_reload(cli: &Cli) -> anyhow::Result<()> {
    let settings = GatewaySettings::load(&cli.config)?;
    let pid_path = cli
        .pid
        .clone()
        .or(settings.server.pid_file)
        .context("no PID file configured")?;
    let pid = read_pid(&pid_path)?;

    let result = unsafe { libc::kill(pid, libc::SIGHUP) };
    if result != 0 {
        anyhow::bail!("failed to send reload signal to pid {}", pid);
    }
    println!("Reload signal sent successfully");
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = GatewaySettings::load(&cli.config)
        .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;
    info!("Starting mcp-gateway {}", VERSION);

    let pid_manager = PidManager::new(cli.pid.or_else(|| settings.server.pid_file.clone()));
    pid_manager.write()?;

    // Boot-time config errors are fatal; reload-time errors keep the old
    // snapshot (see gateway::reload).
    let store = FileConfigStore::new(&settings.storage.path);
    let documents = store.list().context("failed to load configurations")?;
    let snapshot = Arc::new(merge_configs(documents).context("failed to merge configurations")?);
    info!(
        "Loaded configuration with {} routed prefix(es)",
        snapshot.routers().len()
    );

    let sessions = match settings.session.backend {
        SessionBackend::Local => SessionStore::local(),
        SessionBackend::Redis => {
            SessionStore::shared(&settings.session.redis.url, &settings.session.redis.topic)
                .await
                .context("failed to connect session store")?
        }
    };

    let server = GatewayServer::new(Arc::clone(&snapshot), sessions);

    let mut public = Some(spawn_public_listener(
        Arc::clone(&server),
        &snapshot,
        &settings.server.host,
        settings.server.port,
    )?);

    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(1);
    let internal = spawn_internal_listener(
        reload_tx,
        &settings.server.host,
        settings.server.inner_port,
    )?;

    let (_notifier, mut watch_rx) = if settings.notifier.watch {
        let (notifier, rx) = ConfigNotifier::start(store.path())?;
        (Some(notifier), rx)
    } else {
        (None, mcp_gateway::config::disabled_notifier())
    };

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
            _ = sighup.recv() => {
                info!("Received reload signal");
                reload::handle_reload(&server, &store, &mut public, &settings.server.host, settings.server.port).await;
            }
            Some(_) = reload_rx.recv() => {
                reload::handle_reload(&server, &store, &mut public, &settings.server.host, settings.server.port).await;
            }
            Some(_) = watch_rx.recv() => {
                info!("Config change detected");
                reload::handle_reload(&server, &store, &mut public, &settings.server.host, settings.server.port).await;
            }
        }
    }

    server.signal_shutdown();
    if let Some(public) = public.take() {
        public.stop().await;
    }
    internal.stop().await;
    if let Err(e) = server.sessions().close().await {
        warn!("Failed to close session store: {}", e);
    }
    pid_manager.remove();
    info!("Shutdown complete");
    Ok(())
}
