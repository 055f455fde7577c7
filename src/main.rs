// src/main.rs - Pump control host: printer task plus the web API
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

use enose_control::scheduler::HostClock;
use enose_control::web::printer_channel::{PrinterRequest, run_printer_task};
use enose_control::{Printer, load_config, web};

#[derive(Parser, Debug)]
#[command(name = "enose-host", version, about = "E-nose pump control host")]
struct Args {
    /// Configuration file
    #[arg(default_value = "enose.toml")]
    config: PathBuf,

    /// Override the web API bind address
    #[arg(long)]
    bind: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();
    init_logging(args.log_json);

    tracing::info!("Starting enose-host v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loading configuration from: {}", args.config.display());

    let config = load_config(&args.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", args.config.display(), e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    tracing::info!("MCU: {} (print time offset {}s)", config.mcu.serial, config.mcu.print_time_offset);
    tracing::info!(
        "Safety margin: {}s, step generation window: {}s",
        config.motion.safety_margin,
        config.motion.step_gen_window
    );

    let bind = args.bind.unwrap_or_else(|| config.web.bind.clone());
    let tick = Duration::from_millis(config.reactor.tick_ms.max(1));
    let clock = HostClock::with_offset(config.mcu.print_time_offset);

    let printer = match Printer::new(config, Box::new(clock)) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Failed to initialize printer: {}", e);
            return Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>);
        }
    };

    // Set up a channel for communication between Axum handlers and the printer task.
    let (printer_tx, printer_rx) = mpsc::channel::<PrinterRequest>(16);

    // The printer is !Send, so it lives on a LocalSet.
    let local = LocalSet::new();
    local.spawn_local(run_printer_task(printer, printer_rx, tick));

    let app = web::api::create_router(printer_tx);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);

    local
        .run_until(async move { axum::serve(listener, app).await })
        .await?;

    Ok(())
}
