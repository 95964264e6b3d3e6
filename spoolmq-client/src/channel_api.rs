use crate::model::ChannelNumber;
use crate::processor::{self, Param, Request, RequestSink, WaitFor};
use anyhow::Result;
use spoolmq_codec::frame;
use tokio::sync::oneshot;

/// Queue survives a broker restart.
pub struct Durable(pub bool);
/// Queue or consumer is exclusive to this connection.
pub struct Exclusive(pub bool);
/// Queue is deleted when the last consumer goes away.
pub struct AutoDelete(pub bool);
/// Deliveries do not need to be acknowledged.
pub struct NoAck(pub bool);

/// A channel opened inside the connection.
///
/// Queue declaration, publishing and consuming happen on a channel; the
/// channel is invalid once the connection is closed.
#[derive(Debug)]
pub struct Channel {
    pub(crate) channel: ChannelNumber,
    pub(crate) sink: RequestSink,
}

impl Channel {
    pub(crate) fn new(channel: ChannelNumber, sink: RequestSink) -> Channel {
        Channel { channel, sink }
    }

    /// Declare a queue.
    ///
    /// Declaring an existing queue with the same properties is a no-op;
    /// conflicting properties close the channel with a channel error.
    pub async fn queue_declare(
        &self,
        queue_name: &str,
        durable: Durable,
        exclusive: Exclusive,
        auto_delete: AutoDelete,
    ) -> Result<()> {
        let mut flags = frame::QueueDeclareFlags::default();
        flags.set(frame::QueueDeclareFlags::DURABLE, durable.0);
        flags.set(frame::QueueDeclareFlags::EXCLUSIVE, exclusive.0);
        flags.set(frame::QueueDeclareFlags::AUTO_DELETE, auto_delete.0);

        processor::call(&self.sink, frame::queue_declare(self.channel, queue_name, Some(flags))).await
    }

    /// Publish a message to the default exchange, fire and forget.
    pub async fn basic_publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<()> {
        let method = frame::basic_publish(self.channel, "", routing_key);
        let (tx, rx) = oneshot::channel();

        self.sink
            .send(Request {
                param: Param::Publish(method, payload),
                response: WaitFor::SentOut(tx),
            })
            .await?;

        rx.await?
    }

    /// Close the channel.
    pub async fn close(&self) -> Result<()> {
        let (class_id, method_id) = frame::split_class_method(frame::CHANNEL_CLOSE);

        processor::call(
            &self.sink,
            frame::channel_close(self.channel, 200, "Normal close", class_id, method_id),
        )
        .await
    }
}
