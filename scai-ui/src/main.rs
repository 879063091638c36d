//! SimCity AI operator console (scai-ui) - Main entry point
//!
//! Connects to the simulation backend, loads the baseline road network, starts a
//! policy run and follows its event stream. Operator commands are read from stdin.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use scai_common::config::{self, ConfigOverrides, ResolvedConfig};
use scai_ui::console::{self, Command};
use scai_ui::map::{BuiltinLibraryLoader, GeoJsonSurface, LayerSynchronizer};
use scai_ui::{
    Backend, HttpBackend, RunOutcome, SessionBus, SessionController, StartOutcome, StreamClient,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for scai-ui
#[derive(Parser, Debug)]
#[command(name = "scai-ui")]
#[command(about = "Operator console for SimCity AI policy simulations")]
#[command(version)]
struct Args {
    /// Backend API base URL
    #[arg(short, long)]
    backend_url: Option<String>,

    /// City sent with each run
    #[arg(long)]
    city: Option<String>,

    /// Config file path
    #[arg(short, long, env = "SCAI_CONFIG")]
    config: Option<PathBuf>,

    /// Policy description to simulate at startup
    #[arg(short, long, conflicts_with = "preset")]
    policy: Option<String>,

    /// Preset id to simulate at startup
    #[arg(long)]
    preset: Option<String>,

    /// Write the rendered map overlays (GeoJSON) here after each completed run
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Exit after the first run finishes
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = config::resolve_config_path(args.config.as_deref());
    let toml_config = config::load_config(config_path.as_deref())
        .context("Failed to load configuration")?;
    let overrides = ConfigOverrides {
        backend_url: args.backend_url.clone(),
        city: args.city.clone(),
        output_path: args.output.clone(),
        log_level: args.log_level.clone(),
    };
    let config = ResolvedConfig::resolve(&overrides, &toml_config)
        .context("Invalid configuration")?;

    init_tracing(&config)?;

    info!("Starting SimCity AI operator console");
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }
    info!("Backend: {}", config.backend_url);
    info!("City: {}", config.city);

    let backend: Arc<dyn Backend> = Arc::new(
        HttpBackend::new(config.backend_url.clone()).context("Failed to create backend client")?,
    );
    let stream_client =
        StreamClient::new(Arc::clone(&backend)).with_max_frame_bytes(config.max_frame_bytes);
    let map = LayerSynchronizer::new(Arc::new(BuiltinLibraryLoader));
    map.mount(|| Box::new(GeoJsonSurface::new()));
    let bus = SessionBus::default();
    let printer = tokio::spawn(print_updates(BroadcastStream::new(bus.subscribe())));

    let mut controller = SessionController::new(
        Arc::clone(&backend),
        stream_client,
        map,
        bus,
        config.city.clone(),
    );

    let (presets, network, metrics) = tokio::join!(
        backend.fetch_presets(),
        backend.fetch_city_network(),
        backend.fetch_baseline_metrics(),
    );
    let presets = presets.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load presets");
        Vec::new()
    });
    match network {
        Ok(network) => {
            controller.load_baseline(network);
        }
        Err(e) => warn!(error = %e, "Failed to load baseline road network"),
    }
    match metrics {
        Ok(metrics) => {
            println!("{}", console::format_baseline(&metrics));
            controller.set_baseline_metrics(metrics);
        }
        Err(e) => warn!(error = %e, "Failed to load baseline metrics"),
    }

    let mut last_policy = None;
    if args.policy.is_some() || args.preset.is_some() {
        let policy = console::select_policy(args.policy.as_deref(), args.preset.as_deref(), &presets)
            .map_err(|reason| anyhow!(reason))?;
        controller
            .start(&policy)
            .await
            .context("Failed to start simulation")?;
        last_policy = Some(policy);
    } else {
        println!("{}", console::HELP);
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            delivery = controller.next_delivery() => {
                let Some(delivery) = delivery else {
                    continue;
                };
                if let Some(outcome) = controller.handle_delivery(delivery).await {
                    report_finished(&controller, &outcome, config.output_path.as_deref()).await;
                    if args.once || !stdin_open {
                        break;
                    }
                }
            }
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        stdin_open = false;
                        if !controller.session().is_running() {
                            break;
                        }
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        stdin_open = false;
                        continue;
                    }
                };
                let Some(command) = console::parse_command(&line) else {
                    continue;
                };
                match command {
                    Command::Rerun(policy) => {
                        let Some(policy) = policy.or_else(|| last_policy.clone()) else {
                            println!("no previous policy; use: rerun <policy text>");
                            continue;
                        };
                        match controller.start(&policy).await {
                            Ok(StartOutcome::Started(_)) => last_policy = Some(policy),
                            Ok(StartOutcome::AlreadyRunning) => println!("a run is already in progress"),
                            Err(e) => println!("could not start run: {}", e),
                        }
                    }
                    Command::View(view_mode) => {
                        controller.set_view_mode(view_mode);
                        println!("view: {}", view_mode);
                    }
                    Command::Status => {
                        let session = controller.session();
                        let state = if session.is_running() { "running" } else { "idle" };
                        println!("{} | view {}", state, session.view_mode());
                        print!("{}", console::format_stages(session.stages()));
                    }
                    Command::Presets => print!("{}", console::format_presets(&presets)),
                    Command::Help => println!("{}", console::HELP),
                    Command::Quit => break,
                    Command::Unknown(input) => {
                        println!("unknown command: {}", input);
                        println!("{}", console::HELP);
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }

    controller.shutdown();
    drop(controller);
    printer.abort();
    info!("Operator console shut down");
    Ok(())
}

fn init_tracing(config: &ResolvedConfig) -> Result<()> {
    // A bare level applies to the scai crates; anything else is a full directive
    let default_filter = if config.log_level.contains(['=', ',']) {
        config.log_level.clone()
    } else {
        format!("scai_ui={level},scai_common={level}", level = config.log_level)
    };

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

async fn print_updates(mut updates: BroadcastStream<scai_ui::SessionUpdate>) {
    while let Some(update) = updates.next().await {
        match update {
            Ok(update) => {
                debug!(update = update.update_type(), "Session update");
                if let Some(line) = console::format_update(&update) {
                    println!("{}", line);
                }
            }
            Err(e) => warn!(error = %e, "Console fell behind session updates"),
        }
    }
}

async fn report_finished(controller: &SessionController, outcome: &RunOutcome, output: Option<&Path>) {
    print!("{}", console::format_stages(controller.session().stages()));
    if *outcome != RunOutcome::Completed {
        return;
    }
    println!("{}", console::format_report(controller.session()));

    let Some(path) = output else {
        return;
    };
    controller.map().settle().await;
    let Some(exported) = controller.map().export() else {
        warn!("Map surface not mounted, nothing to export");
        return;
    };
    let written = match serde_json::to_string_pretty(&exported) {
        Ok(text) => tokio::fs::write(path, text).await.map_err(anyhow::Error::from),
        Err(e) => Err(e.into()),
    };
    match written {
        Ok(()) => info!("Map overlays written to {}", path.display()),
        Err(e) => warn!(error = %e, path = %path.display(), "Failed to write map overlays"),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
