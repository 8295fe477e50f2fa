mod app;
mod domain;
mod error;
mod infrastructure;
mod relay;

use anyhow::{Context, Result};
use app::{shutdown_signal, RelayService};
use domain::settings::{Settings, SettingsService};
use std::process::ExitCode;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let settings_service = match SettingsService::new() {
        Ok(service) => service,
        Err(e) => {
            eprintln!("hid-relay: failed to load settings: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let logging_guard = infrastructure::logging::init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    for warning in settings_service.warnings() {
        if logging_guard.is_some() {
            warn!("{}", warning);
        } else {
            eprintln!("hid-relay: {}", warning);
        }
    }

    info!(
        "Starting HID relay (settings: {})",
        settings_service.path().display()
    );

    match run(settings_service.get()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("hid-relay: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    rt.block_on(async {
        let shutdown = shutdown_signal()?;
        let mut service = RelayService::init(settings).await?;
        service.run(shutdown).await;
        service.shutdown().await;
        Ok(())
    })
}
