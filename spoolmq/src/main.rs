mod config;
mod dispatch;
mod printer;
mod relay;

#[cfg(test)]
mod testbroker;

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::{info, warn};
use std::io::Write;
use tokio::signal;
use tokio::sync::watch;

use crate::dispatch::Observer;
use crate::printer::Printer;
use crate::relay::Relay;

fn setup_logger() {
    let mut builder = Builder::from_default_env();

    builder
        .format(|buf, record| {
            let style = buf.default_level_style(record.level()).bold();

            writeln!(
                buf,
                "{} - {style}[{:5}]{style:#} {}:{} - {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or_default(),
                record.line().unwrap_or_default(),
                record.args()
            )
        })
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logger();

    let cli = config::Cli::parse();
    let config = config::load(&cli.config)?;

    let mut printer = Printer::new(config.printer.clone());

    // Messages are relayed even without a printer; every delivery retries
    // the open.
    if let Err(e) = printer.open() {
        warn!("Printer not available: {}", e);
    }

    let observer: Observer = Box::new(|text| info!("Dispatched message: {}", text));

    let (stop_tx, stop_rx) = watch::channel(false);

    let relay = Relay::new(&config, printer, Some(observer), stop_rx);
    let relay_task = tokio::spawn(relay.run());

    signal::ctrl_c().await?;

    info!("Shutting down");

    let _ = stop_tx.send(true);

    relay_task.await?;

    Ok(())
}
