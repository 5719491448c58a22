//! sidecast receiver: entry point.
//!
//! ```text
//! sidecast-receiver                      Listen with sidecast-receiver.toml (or defaults)
//! sidecast-receiver --config <path>      Load a custom config TOML
//! sidecast-receiver --port 6000          Override the UDP listen port
//! sidecast-receiver --output out.h264    Dump assembled frames to a file
//! sidecast-receiver --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sidecast_receiver::config::ReceiverConfig;
use sidecast_receiver::service::{BoxError, ReceiverService};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sidecast-receiver", about = "sidecast screen-mirroring receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "sidecast-receiver.toml")]
    config: PathBuf,

    /// UDP port to listen on (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// File to append assembled frames to (overrides the config file).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply CLI overrides.
    let mut config = ReceiverConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.listen_port = port;
    }
    if let Some(output) = cli.output {
        config.output.file = output.display().to_string();
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("sidecast-receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("listen: {}:{}", config.network.bind_address, config.network.listen_port);
    info!("repair sizing: {:?}", config.network.repair_sizing);
    if config.output.file.is_empty() {
        info!("output: count only");
    } else {
        info!("output: {}", config.output.file);
    }

    let service = ReceiverService::bind(config)?;
    let shutdown = service.shutdown_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        shutdown.stop();
    });

    let stats = service.run().await?;
    info!(%stats, "final stats");

    Ok(())
}
