use anyhow::Result;
use clap::Parser;
use serde_derive::Deserialize;

#[derive(Parser)]
#[command(name = "spoolmq", about = "Relay broker queue messages to a serial receipt printer")]
pub(crate) struct Cli {
    /// Path to the config file
    #[arg(short, long, value_name = "FILE", default_value = "spoolmq.toml")]
    pub(crate) config: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Config {
    pub(crate) broker: BrokerConfig,
    pub(crate) printer: PrinterConfig,
    /// Fixed delay before a reconnect attempt, in seconds.
    #[serde(default = "default_reconnect_delay")]
    pub(crate) reconnect_delay_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct BrokerConfig {
    pub(crate) host: String,
    #[serde(default = "default_port")]
    pub(crate) port: u16,
    pub(crate) username: String,
    pub(crate) password: String,
    #[serde(default = "default_virtual_host")]
    pub(crate) virtual_host: String,
    /// Queue shared with the publisher side.
    pub(crate) queue: String,
}

impl BrokerConfig {
    pub(crate) fn url(&self) -> String {
        format!(
            "amqp://{}:{}/{}",
            self.host,
            self.port,
            self.virtual_host.trim_start_matches('/')
        )
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct PrinterConfig {
    /// Explicit serial device path, wins over `name_contains`.
    #[serde(default)]
    pub(crate) port: Option<String>,
    /// Substring matched against the product name of the connected
    /// serial devices.
    #[serde(default)]
    pub(crate) name_contains: Option<String>,
    #[serde(default = "default_baud")]
    pub(crate) baud: u32,
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_port() -> u16 {
    5672
}

fn default_virtual_host() -> String {
    "/".to_string()
}

fn default_baud() -> u32 {
    9600
}

pub(crate) fn load(path: &str) -> Result<Config> {
    let raw = std::fs::read_to_string(path)?;

    Ok(toml::from_str(&raw)?)
}
