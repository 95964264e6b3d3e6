use std::time::Duration;

use crate::channel_api::{Channel, Exclusive, NoAck};
use crate::client_error;
use crate::message::DeliveredMessage;
use crate::model::{ChannelNumber, DeliveryTag};
use crate::processor::{self, Param, Request, RequestSink, WaitFor};
use anyhow::Result;
use spoolmq_codec::frame;
use tokio::sync::{mpsc, oneshot};

/// A signal arriving from the server while consuming a queue.
#[derive(Debug)]
pub enum ConsumerSignal {
    Delivered(Box<DeliveredMessage>),
    /// The broker revoked the consumer, for example the queue was deleted.
    Cancelled,
    ChannelClosed {
        reply_code: u16,
        reply_text: String,
        class_method: u32,
    },
    ConnectionClosed {
        reply_code: u16,
        reply_text: String,
        class_method: u32,
    },
}

/// Consumer API for `Basic.Consume`.
///
/// Returned by [`Channel::basic_consume`]. Deliveries and lifecycle events
/// arrive as [`ConsumerSignal`] values on the signal stream; the stream
/// ends when the connection is gone.
pub struct ConsumerHandler {
    /// The channel the queue is consumed on. One client has at most one
    /// consumer per channel.
    pub channel: ChannelNumber,
    /// Identifier of the consumer in the server.
    pub consumer_tag: String,
    client_sink: RequestSink,
    /// Stream of deliveries and of channel or connection close events.
    pub signal_stream: mpsc::UnboundedReceiver<ConsumerSignal>,
}

impl ConsumerHandler {
    /// Wait for the next signal with a timeout.
    pub async fn receive(&mut self, timeout: Duration) -> Option<ConsumerSignal> {
        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        tokio::select! {
            signal = self.signal_stream.recv() => {
                signal
            }
            _ = &mut sleep => {
                None
            }
        }
    }

    /// Acknowledge exactly one delivery. Must not be called twice with the
    /// same tag.
    pub async fn basic_ack(&self, delivery_tag: DeliveryTag) -> Result<()> {
        processor::sync_send(&self.client_sink, frame::basic_ack(self.channel, delivery_tag, false)).await
    }

    /// Stop consuming the queue.
    pub async fn basic_cancel(self) -> Result<()> {
        processor::call(
            &self.client_sink,
            frame::basic_cancel(self.channel, &self.consumer_tag, false),
        )
        .await
    }
}

impl Channel {
    /// Start consuming a queue.
    ///
    /// With `NoAck(false)` every delivery has to be acknowledged through
    /// [`ConsumerHandler::basic_ack`]; `NoAck(true)` is the convenience
    /// path where the broker considers a message done once sent.
    pub async fn basic_consume(&self, queue_name: &str, no_ack: NoAck, exclusive: Exclusive) -> Result<ConsumerHandler> {
        let consumer_tag = format!("spoolmq-{}", rand::random::<u128>());

        let mut flags = frame::BasicConsumeFlags::default();
        flags.set(frame::BasicConsumeFlags::NO_ACK, no_ack.0);
        flags.set(frame::BasicConsumeFlags::EXCLUSIVE, exclusive.0);

        let frame = frame::basic_consume(self.channel, queue_name, &consumer_tag, Some(flags));

        // Buffer of the incoming deliveries and of the other signals like
        // consumer cancelled.
        let (signal_sink, signal_stream) = mpsc::unbounded_channel::<ConsumerSignal>();

        let handler = ConsumerHandler {
            channel: self.channel,
            consumer_tag,
            client_sink: self.sink.clone(),
            signal_stream,
        };

        let (tx, rx) = oneshot::channel();

        self.sink
            .send(Request {
                param: Param::Consume(frame, signal_sink),
                response: WaitFor::FrameResponse(tx),
            })
            .await?;

        match rx.await {
            Ok(Ok(())) => Ok(handler),
            Ok(Err(e)) => Err(e),
            Err(_) => client_error!(None, 501, "Channel recv error", 0),
        }
    }
}
