//! AMQP 0.9.1 client used by the spoolmq relay.
//!
//! The client owns a single connection to the broker. [`connect`] performs
//! the protocol handshake and gives back a [`Client`], channels are opened
//! with [`Client::channel_open`] and queues are consumed through a
//! [`ConsumerHandler`] whose signal stream delivers messages and
//! connection lifecycle events.
//!
//! ```no_run
//! use spoolmq_client::{ConsumerSignal, Durable, Exclusive, AutoDelete, NoAck};
//!
//! async fn consume() -> anyhow::Result<()> {
//!     let mut client = spoolmq_client::connect("localhost:5672", "guest", "guest").await?;
//!     let channel = client.channel_open(1).await?;
//!
//!     channel
//!         .queue_declare("prints", Durable(true), Exclusive(false), AutoDelete(false))
//!         .await?;
//!
//!     let mut handler = channel.basic_consume("prints", NoAck(false), Exclusive(false)).await?;
//!
//!     while let Some(signal) = handler.signal_stream.recv().await {
//!         match signal {
//!             ConsumerSignal::Delivered(m) => {
//!                 handler.basic_ack(m.delivery_tag).await?;
//!             }
//!             _ => break,
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
mod channel_api;
mod client_api;
mod consumer;
mod error;
mod message;
mod model;
mod processor;
mod state;

pub use channel_api::{AutoDelete, Channel, Durable, Exclusive, NoAck};
pub use client_api::{connect, Client};
pub use consumer::{ConsumerHandler, ConsumerSignal};
pub use error::ClientError;
pub use message::DeliveredMessage;
pub use model::{ChannelNumber, DeliveryTag};
