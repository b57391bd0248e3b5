use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use statuscast::channels::{BridgeClient, StatusClient};
use statuscast::gateway::{self, qr, AppState};
use statuscast::{AuthGate, ConfigStore, SessionEvent, SessionState, Settings, UploadPipeline};

/// Post status updates through a paired messaging session.
#[derive(Parser, Debug)]
#[command(name = "statuscast", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the messaging bridge and the HTTP gateway
    Serve(Settings),

    /// Print resolved settings and where the config lives
    ShowConfig(Settings),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Serve(settings) => serve(settings).await,
        Commands::ShowConfig(settings) => show_config(settings).await,
    }
}

fn print_terminal_qr(code: &str) {
    match qr::terminal(code) {
        Ok(art) => eprintln!("\nScan this QR code with the messaging app to log in:\n{art}"),
        Err(e) => warn!(error = %e, "Could not render pairing code for the terminal"),
    }
}

async fn serve(settings: Settings) -> Result<()> {
    let (program, args) = settings
        .bridge_command()
        .context("No messaging bridge configured; pass --bridge or set STATUSCAST_BRIDGE")?;

    let data_dir = settings.resolve_data_dir();
    let store = ConfigStore::new(&data_dir);
    let saved = store.load().await;

    let session = Arc::new(SessionState::new());
    let auth = Arc::new(AuthGate::new(
        Arc::clone(&session),
        store,
        settings.initial_password(&saved),
    ));
    if !auth.is_configured() {
        warn!("Manager password is not set. Complete setup at /setup.");
    }

    let client: Arc<dyn StatusClient> = Arc::new(BridgeClient::spawn(&program, &args)?);
    let (tx, rx) = mpsc::channel(16);

    let listener = Arc::clone(&client);
    tokio::spawn(async move {
        if let Err(e) = listener.listen(tx).await {
            error!(client = listener.name(), error = %e, "Messaging client stopped");
        }
    });

    let show_qr = !settings.no_terminal_qr;
    let driver = Arc::clone(&session);
    tokio::spawn(async move {
        driver
            .drive(rx, |event| {
                if let (true, SessionEvent::PairingCode(code)) = (show_qr, event) {
                    print_terminal_qr(code);
                }
            })
            .await;
    });

    let limits = settings.limits();
    info!(
        data_dir = %data_dir.display(),
        max_files = limits.max_files,
        max_file_bytes = limits.max_file_bytes,
        "Starting statuscast"
    );
    info!("Open http://localhost:{}/setup in your browser", settings.port);

    let state = AppState {
        session,
        auth,
        pipeline: Arc::new(UploadPipeline::new(client, limits)),
    };
    gateway::serve(state, settings.listen_addr(), settings.body_limit()).await
}

async fn show_config(settings: Settings) -> Result<()> {
    let data_dir = settings.resolve_data_dir();
    let store = ConfigStore::new(&data_dir);
    let saved = store.load().await;
    let limits = settings.limits();

    println!("Data dir:          {}", data_dir.display());
    println!("Config file:       {}", store.path().display());
    println!("Listen:            {}", settings.listen_addr());
    println!("Max files:         {}", limits.max_files);
    println!("Max file size:     {} MiB", settings.max_file_mb);
    println!("Allowed types:     {}", limits.allowed_mime_prefixes.join(", "));
    println!(
        "Manager password:  {}",
        match (saved.password(), settings.initial_password(&saved)) {
            (Some(_), _) => "saved",
            (None, Some(_)) => "from environment",
            (None, None) => "not set (complete setup at /setup)",
        }
    );
    println!(
        "Bridge:            {}",
        settings.bridge.as_deref().unwrap_or("(not configured)")
    );
    Ok(())
}
