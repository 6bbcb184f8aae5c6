//! flashd - Remote STM32F4 flashing
//!
//! Runs the flash HTTP service, flashes an image locally, or uploads an image
//! to a running service and follows its progress.
//!
//! Usage:
//!   flashd serve [--config flashd.toml] [--port 8000]
//!   flashd flash blink.elf [--openocd /usr/bin/openocd]
//!   flashd upload blink.elf --server http://flasher.local:8000

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flashd_api::{create_router, AppState};
use flashd_client::FlashClient;
use flashd_core::{FlashEngine, FlashEvent};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::FlashdConfig;

const SERVE_LOG_FILTER: &str = "flashd=info,flashd_api=info,flashd_core=debug,tower_http=info";
const SERVE_VERBOSE_FILTER: &str = "flashd=debug,flashd_api=debug,flashd_core=debug,tower_http=debug";
const TOOL_LOG_FILTER: &str = "warn";
const TOOL_VERBOSE_FILTER: &str = "flashd=debug,flashd_core=debug,flashd_client=debug";

#[derive(Parser)]
#[command(name = "flashd")]
#[command(author, version, about = "Remote STM32F4 flashing over OpenOCD")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "FLASHD_CONFIG")]
    config: Option<PathBuf>,

    /// OpenOCD executable (searched on PATH when unset)
    #[arg(long, global = true, env = "FLASHD_OPENOCD")]
    openocd: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the flash HTTP service
    Serve {
        /// Listen port (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Flash an image on this machine
    Flash {
        /// ELF image to write
        image: PathBuf,
    },

    /// Upload an image to a flash service and follow the run
    Upload {
        /// ELF image to write
        image: PathBuf,

        /// Server URL
        #[arg(
            short,
            long,
            env = "FLASHD_SERVER",
            default_value = "http://localhost:8000"
        )]
        server: String,
    },
}

impl Cli {
    fn log_filter(&self) -> &'static str {
        match (&self.command, self.verbose) {
            (Commands::Serve { .. }, false) => SERVE_LOG_FILTER,
            (Commands::Serve { .. }, true) => SERVE_VERBOSE_FILTER,
            (_, false) => TOOL_LOG_FILTER,
            (_, true) => TOOL_VERBOSE_FILTER,
        }
    }

    /// Config file values with command-line overrides applied
    fn load_config(&self) -> Result<FlashdConfig> {
        let mut config = match &self.config {
            Some(path) => FlashdConfig::load(path)?,
            None => FlashdConfig::default(),
        };

        if let Some(openocd) = &self.openocd {
            config.programmer.path = Some(openocd.clone());
        }
        if let Commands::Serve { port: Some(port) } = self.command {
            config.server.port = port;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_filter().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.load_config()?;

    match &cli.command {
        Commands::Serve { .. } => {
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Flash { image } => Ok(exit_code(flash_local(&config, image).await)),
        Commands::Upload { image, server } => Ok(exit_code(upload(server, image).await?)),
    }
}

async fn serve(config: FlashdConfig) -> Result<()> {
    tracing::info!("Starting flashd");

    let staging = config.staging_area();
    std::fs::create_dir_all(staging.dir()).with_context(|| {
        format!("Failed to create staging directory: {}", staging.dir().display())
    })?;

    let engine = FlashEngine::new(config.engine_config());
    match &engine.config().programmer {
        Some(path) => tracing::info!(programmer = %path.display(), "Using configured OpenOCD"),
        None => tracing::info!("Using OpenOCD from PATH"),
    }

    let state = AppState::new(engine, staging).with_max_upload_bytes(config.server.max_upload_bytes);
    let app = create_router(state);

    let addr = config.listen_addr();
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Run the engine in-process, printing lines as they arrive
async fn flash_local(config: &FlashdConfig, image: &Path) -> bool {
    let engine = FlashEngine::new(config.engine_config());

    let mut run = match engine.start(image) {
        Ok(run) => run,
        Err(e) => {
            print_line(&e.to_string());
            return false;
        }
    };

    while let Some(event) = run.next().await {
        match event {
            FlashEvent::Log(log) => print_line(&log.message()),
            // The verdict already arrived as the last log line
            FlashEvent::Outcome(outcome) => return outcome.success,
        }
    }

    let outcome = flashd_core::missing_outcome();
    print_line(&outcome.message);
    false
}

/// Send the image to a flash service, printing records as they arrive
async fn upload(server: &str, image: &Path) -> Result<bool> {
    let client = FlashClient::new(server)?;

    let stream = match client.flash_file(image).await {
        Ok(stream) => stream,
        Err(flashd_client::FlashClientError::ServerError { status, message }) => {
            print_line(&format!("Rejected ({}): {}", status, message));
            return Ok(false);
        }
        Err(e) => return Err(e).context(format!("Failed to upload {}", image.display())),
    };

    let (success, _) = stream.finish_with(print_line).await?;
    Ok(success)
}

fn print_line(message: &str) {
    println!("{}", timestamped(chrono::Local::now().time(), message));
}

fn timestamped(time: chrono::NaiveTime, message: &str) -> String {
    format!("[{}] {}", time.format("%H:%M:%S"), message)
}

fn exit_code(success: bool) -> ExitCode {
    println!("Flash result: {}", if success { "Success" } else { "Failed" });
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
