use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use vr_relay::config::RelayParams;
use vr_relay::relay::{MainCycle, RelayError};
use vr_relay::tracking::{open_runtime, RuntimeKind};

#[derive(Parser, Debug)]
#[command(version, about = "Relays tracked VR controllers and trackers as JSON over UDP")]
struct Cli {
    /// Parameter file (JSON, or TOML with a .toml extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tracking runtime to read devices from
    #[arg(short, long, value_enum, default_value_t = RuntimeKind::Demo)]
    runtime: RuntimeKind,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    let path = cli.config.unwrap_or_else(RelayParams::default_path);
    info!("Loading parameters from {}", path.display());
    let params = RelayParams::load(&path).await.map_err(RelayError::from)?;

    let running = Arc::new(AtomicBool::new(false));
    let system = open_runtime(cli.runtime).map_err(RelayError::from)?;
    let cycle = MainCycle::prepare(&params, system, running.clone()).await?;

    let cycle = cycle.start();
    spawn_signal_handler(running);

    let stopped = cycle.run().await;
    info!("Relay finished: {:?}", stopped.stats());
    Ok(())
}

fn spawn_signal_handler(running: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, stopping relay");
                running.store(false, Ordering::SeqCst);
            }
            Err(e) => error!("Unable to listen for interrupt signal: {}", e),
        }
    });
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
