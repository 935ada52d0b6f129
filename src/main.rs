//! The `dbus-reconnect` binary.
//!
//! Publishes `org.freedesktop.ReconnectExample` on the system bus and keeps it
//! published across restarts of the bus daemon.

use clap::Parser;
use dbus_reconnect::{
    bus::SystemBus,
    config::{Config, SYSTEM_BUS_ADDRESS},
    run_service,
};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Transport locator of the bus daemon.
    #[arg(long, env = "DBUS_RECONNECT_ADDRESS", default_value = SYSTEM_BUS_ADDRESS)]
    address: String,

    /// Log filter directives, e.g. `dbus_reconnect=debug`.
    #[arg(long, env = "RUST_LOG", default_value = "dbus_reconnect=info")]
    log_filter: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log_filter))
        .with_target(true)
        .init();

    let mut config = Config::default();
    config.connection.address = cli.address;
    info!(address = %config.connection.address, name = %config.service.well_known_name, "Starting");

    let bus = SystemBus::new(&config.connection);
    match run_service(bus, config).await {
        Ok(reason) => {
            info!(?reason, "Stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
