//! Client side connection state: the consumers registered per channel and
//! the delivered content being assembled from method, content header and
//! content body frames.
//!
//! Everything which comes from the server or goes to the server is an AMQP
//! frame; everything which talks to the consumer side is a typed signal.

use crate::consumer::ConsumerSignal;
use crate::message::DeliveredMessage;
use crate::model::ChannelNumber;
use crate::processor::ConsumerSink;
use anyhow::{anyhow, Result};
use log::warn;
use spoolmq_codec::codec::Frame;
use spoolmq_codec::frame::{self, AMQPFrame};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// A content being delivered by content frames, building up step by step.
#[derive(Debug)]
struct PendingDelivery {
    consumer_tag: String,
    delivery_tag: u64,
    redelivered: bool,
    exchange: String,
    routing_key: String,
    body_size: u64,
    body: Vec<u8>,
}

pub(crate) struct ClientState {
    /// Active consumer per channel. One client has at most one consumer on
    /// a channel.
    pub(crate) consumers: HashMap<ChannelNumber, ConsumerSink>,
    /// Deliveries whose content frames have not all arrived yet.
    in_delivery: HashMap<ChannelNumber, PendingDelivery>,
    /// Channel towards the I/O task writing the socket.
    outgoing: mpsc::Sender<Frame>,
}

pub(crate) fn new(outgoing: mpsc::Sender<Frame>) -> ClientState {
    ClientState {
        consumers: HashMap::new(),
        in_delivery: HashMap::new(),
        outgoing,
    }
}

impl ClientState {
    async fn send_out(&self, frame: Frame) -> Result<()> {
        self.outgoing
            .send(frame)
            .await
            .map_err(|e| anyhow!("Cannot send frame {:?}", e))
    }

    pub(crate) async fn send_method(&mut self, frame: AMQPFrame) -> Result<()> {
        self.send_out(Frame::Frame(frame)).await
    }

    pub(crate) async fn basic_consume(
        &mut self,
        channel: ChannelNumber,
        frame: AMQPFrame,
        sink: ConsumerSink,
    ) -> Result<()> {
        self.consumers.insert(channel, sink);

        self.send_out(Frame::Frame(frame)).await
    }

    /// A publish is a method frame, a content header and a content body
    /// which go out in one write.
    pub(crate) async fn basic_publish(&mut self, method: AMQPFrame, body: Vec<u8>) -> Result<()> {
        let channel = match &method {
            AMQPFrame::Method(ch, _, _) => *ch,
            _ => 0,
        };

        let header = frame::content_header(channel, body.len() as u64);
        let frames = vec![method, header.into(), frame::content_body(channel, &body).into()];

        self.send_out(Frame::Frames(frames)).await
    }

    pub(crate) fn basic_deliver(&mut self, channel: ChannelNumber, args: frame::BasicDeliverArgs) -> Result<()> {
        self.in_delivery.insert(
            channel,
            PendingDelivery {
                consumer_tag: args.consumer_tag,
                delivery_tag: args.delivery_tag,
                redelivered: args.redelivered,
                exchange: args.exchange_name,
                routing_key: args.routing_key,
                body_size: 0,
                body: Vec::new(),
            },
        );

        Ok(())
    }

    pub(crate) fn content_header(&mut self, header: frame::ContentHeaderFrame) -> Result<()> {
        if let Some(delivery) = self.in_delivery.get_mut(&header.channel) {
            delivery.body_size = header.body_size;
            delivery.body.reserve(header.body_size as usize);
        }

        Ok(())
    }

    /// A body frame completes the delivery unless the content is longer
    /// than the frame max and more body frames follow.
    pub(crate) fn content_body(&mut self, body: frame::ContentBodyFrame) -> Result<()> {
        let channel = body.channel;

        if let Some(mut delivery) = self.in_delivery.remove(&channel) {
            delivery.body.extend_from_slice(&body.body);

            if (delivery.body.len() as u64) < delivery.body_size {
                self.in_delivery.insert(channel, delivery);

                return Ok(());
            }

            let message = DeliveredMessage {
                channel,
                consumer_tag: delivery.consumer_tag,
                delivery_tag: delivery.delivery_tag,
                redelivered: delivery.redelivered,
                exchange: delivery.exchange,
                routing_key: delivery.routing_key,
                body: delivery.body,
            };

            if let Some(sink) = self.consumers.get(&channel) {
                // The consumer may be gone already, that is fine.
                let _ = sink.send(ConsumerSignal::Delivered(Box::new(message)));
            } else {
                warn!("Delivery on channel {} without a consumer", channel);
            }
        }

        Ok(())
    }

    /// The server revoked the consumer, for example because the queue was
    /// deleted. The cancel is confirmed and the consumer is told.
    pub(crate) async fn on_basic_cancel(&mut self, channel: ChannelNumber, args: frame::BasicCancelArgs) -> Result<()> {
        if let Some(sink) = self.consumers.remove(&channel) {
            let _ = sink.send(ConsumerSignal::Cancelled);
        }

        if !args.no_wait {
            self.send_method(frame::basic_cancel_ok(channel, &args.consumer_tag)).await?;
        }

        Ok(())
    }

    /// Answer of a client sent `Basic.Cancel`.
    pub(crate) fn basic_cancel_ok(&mut self, channel: ChannelNumber, _args: frame::BasicCancelOkArgs) -> Result<()> {
        if let Some(sink) = self.consumers.remove(&channel) {
            let _ = sink.send(ConsumerSignal::Cancelled);
        }

        Ok(())
    }

    /// The server closes the channel, mostly because of an error. The close
    /// is confirmed and the consumer of the channel is told.
    pub(crate) async fn handle_channel_close(
        &mut self,
        channel: ChannelNumber,
        args: frame::ChannelCloseArgs,
    ) -> Result<()> {
        if let Some(sink) = self.consumers.remove(&channel) {
            let _ = sink.send(ConsumerSignal::ChannelClosed {
                reply_code: args.code,
                reply_text: args.text.clone(),
                class_method: frame::unify_class_method(args.class_id, args.method_id),
            });
        }

        self.send_method(frame::channel_close_ok(channel)).await
    }

    pub(crate) fn channel_close_ok(&mut self, channel: ChannelNumber) -> Result<()> {
        if let Some(sink) = self.consumers.remove(&channel) {
            let _ = sink.send(ConsumerSignal::ChannelClosed {
                reply_code: 200,
                reply_text: "Normal close".to_string(),
                class_method: frame::CHANNEL_CLOSE,
            });
        }

        Ok(())
    }

    /// The server closes the whole connection. The close is confirmed and
    /// every consumer is told.
    pub(crate) async fn handle_connection_close(&mut self, args: frame::ConnectionCloseArgs) -> Result<()> {
        for (_, sink) in self.consumers.drain() {
            let _ = sink.send(ConsumerSignal::ConnectionClosed {
                reply_code: args.code,
                reply_text: args.text.clone(),
                class_method: frame::unify_class_method(args.class_id, args.method_id),
            });
        }

        self.send_method(frame::connection_close_ok(0)).await
    }

    pub(crate) fn connection_close_ok(&mut self) -> Result<()> {
        for (_, sink) in self.consumers.drain() {
            let _ = sink.send(ConsumerSignal::ConnectionClosed {
                reply_code: 200,
                reply_text: "Normal close".to_string(),
                class_method: frame::CONNECTION_CLOSE,
            });
        }

        Ok(())
    }

    /// The socket is gone without a proper close handshake. Consumers get a
    /// connection closed signal so the caller can start reconnecting.
    pub(crate) fn connection_lost(&mut self) {
        for (_, sink) in self.consumers.drain() {
            let _ = sink.send(ConsumerSignal::ConnectionClosed {
                reply_code: 501,
                reply_text: "Connection lost".to_string(),
                class_method: frame::CONNECTION_CLOSE,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_consumer(
        channel: ChannelNumber,
    ) -> (
        ClientState,
        mpsc::Receiver<Frame>,
        mpsc::UnboundedReceiver<ConsumerSignal>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(8);
        let mut cs = new(out_tx);
        let (consumer_sink, consumer_stream) = mpsc::unbounded_channel();

        cs.consumers.insert(channel, consumer_sink);

        (cs, out_rx, consumer_stream)
    }

    #[tokio::test]
    async fn content_frames_complete_a_delivery() {
        let (mut cs, _out_rx, mut consumer_stream) = state_with_consumer(4);

        cs.basic_deliver(
            4,
            frame::BasicDeliverArgs {
                consumer_tag: "ctag-1".to_string(),
                delivery_tag: 10,
                redelivered: false,
                exchange_name: "".to_string(),
                routing_key: "prints".to_string(),
            },
        )
        .unwrap();

        cs.content_header(frame::content_header(4, 5)).unwrap();
        cs.content_body(frame::content_body(4, b"hello")).unwrap();

        let signal = consumer_stream.recv().await.unwrap();

        match signal {
            ConsumerSignal::Delivered(message) => {
                assert_eq!(message.delivery_tag, 10);
                assert_eq!(message.body, b"hello");
                assert_eq!(message.routing_key, "prints");
            }
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[tokio::test]
    async fn split_content_body_is_reassembled() {
        let (mut cs, _out_rx, mut consumer_stream) = state_with_consumer(1);

        cs.basic_deliver(1, frame::BasicDeliverArgs::default()).unwrap();
        cs.content_header(frame::content_header(1, 10)).unwrap();
        cs.content_body(frame::content_body(1, b"hello")).unwrap();

        assert!(consumer_stream.try_recv().is_err());

        cs.content_body(frame::content_body(1, b"again")).unwrap();

        let signal = consumer_stream.recv().await.unwrap();

        match signal {
            ConsumerSignal::Delivered(message) => assert_eq!(message.body, b"helloagain"),
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[tokio::test]
    async fn server_cancel_signals_consumer_and_confirms() {
        let (mut cs, mut out_rx, mut consumer_stream) = state_with_consumer(1);

        cs.on_basic_cancel(
            1,
            frame::BasicCancelArgs {
                consumer_tag: "ctag-1".to_string(),
                no_wait: false,
            },
        )
        .await
        .unwrap();

        let signal = consumer_stream.recv().await.unwrap();

        assert!(matches!(signal, ConsumerSignal::Cancelled));

        match out_rx.recv().await.unwrap() {
            Frame::Frame(AMQPFrame::Method(1, frame::BASIC_CANCEL_OK, _)) => (),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn connection_close_signals_consumers() {
        let (mut cs, mut out_rx, mut consumer_stream) = state_with_consumer(2);

        cs.handle_connection_close(frame::ConnectionCloseArgs {
            code: 320,
            text: "Connection forced".to_string(),
            class_id: 0x0A,
            method_id: 0x32,
        })
        .await
        .unwrap();

        let signal = consumer_stream.recv().await.unwrap();

        assert!(matches!(
            signal,
            ConsumerSignal::ConnectionClosed { reply_code: 320, .. }
        ));

        match out_rx.recv().await.unwrap() {
            Frame::Frame(AMQPFrame::Method(0, frame::CONNECTION_CLOSE_OK, _)) => (),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn lost_connection_signals_consumers() {
        let (mut cs, _out_rx, mut consumer_stream) = state_with_consumer(1);

        cs.connection_lost();

        let signal = consumer_stream.recv().await.unwrap();

        assert!(matches!(
            signal,
            ConsumerSignal::ConnectionClosed { reply_code: 501, .. }
        ));
    }
}
