//! Publish a message to the relay's queue, fire and forget.

use anyhow::Result;
use clap::Parser;
use spoolmq_client::{AutoDelete, Durable, Exclusive};

#[derive(Parser)]
#[command(name = "spoolmq-send", about = "Publish a message to a spoolmq queue")]
struct Cli {
    /// Broker address, `host:port` or an `amqp://` url
    #[arg(long, default_value = "localhost:5672")]
    url: String,

    #[arg(long, default_value = "guest")]
    username: String,

    #[arg(long, default_value = "guest")]
    password: String,

    /// Queue the relay consumes
    #[arg(long)]
    queue: String,

    /// Message text to publish
    #[arg(required = true)]
    message: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut client = spoolmq_client::connect(&cli.url, &cli.username, &cli.password).await?;
    let channel = client.channel_open(1).await?;

    channel
        .queue_declare(&cli.queue, Durable(true), Exclusive(false), AutoDelete(false))
        .await?;

    channel.basic_publish(&cli.queue, cli.message.join(" ").into_bytes()).await?;

    channel.close().await?;
    client.close().await?;

    Ok(())
}
