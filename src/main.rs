pub mod config;
pub mod console;
pub mod device;
pub mod mapping;
pub mod pointer;
pub mod session;

use crate::config::{AppConfig, DeviceBackendKind};
use crate::device::{simulated::SimulatedBackend, ImuBackend};
use crate::session::SessionLoop;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    console::status(&format!(
        "{} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ));

    if let Err(e) = run().await {
        error!("Fatal error: {:?}", e);
        console::status(&e.to_string());
        console::status("Press any key to exit...");
        tokio::task::spawn_blocking(console::wait_for_any_key).await?;
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(console::log_writer)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

async fn run() -> Result<()> {
    let loaded = AppConfig::load_or_default().await;
    let level = loaded
        .as_ref()
        .ok()
        .and_then(|(c, _)| c.log_level.parse().ok())
        .unwrap_or(Level::INFO);
    setup_logging_env(level);
    let (config, origin) = loaded?;
    origin.log();
    info!("Starting with configuration: {:?}", config);

    let backend: Arc<dyn ImuBackend> = match config.device.backend {
        DeviceBackendKind::Simulated => {
            info!("Using simulated device backend");
            Arc::new(SimulatedBackend::new(config.device.simulated.clone()))
        }
    };

    let pointer = pointer::open_pointer(&config.pointer)?;

    let cancel = CancellationToken::new();
    let (command_tx, command_rx) = mpsc::channel(16);
    let key_reader = console::spawn_key_reader(cancel.clone(), command_tx)
        .map_err(|e| eyre!("Failed to start console key reader: {}", e))?;

    let machine = SessionLoop::create(backend, pointer, command_rx, cancel.clone(), config.session);
    let result = session::run(machine).await;

    // the key reader owns raw mode, release it before any prompt
    cancel.cancel();
    if tokio::task::spawn_blocking(move || key_reader.join())
        .await?
        .is_err()
    {
        error!("Console key reader panicked");
    }

    result?;
    Ok(())
}
