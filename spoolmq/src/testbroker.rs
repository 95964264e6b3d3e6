//! A scripted in-process broker for the relay tests.
//!
//! Listens on a loopback port and speaks just enough of the wire protocol
//! to walk a client through the handshake, hand out deliveries and record
//! acknowledgements. Every expectation panics on protocol mismatch so a
//! failing test points at the exact step.

use futures::{SinkExt, StreamExt};
use spoolmq_codec::codec::{AMQPCodec, Frame};
use spoolmq_codec::frame::{self, AMQPFrame, MethodFrameArgs};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

pub(crate) struct TestBroker {
    listener: TcpListener,
    pub(crate) addr: SocketAddr,
}

impl TestBroker {
    pub(crate) async fn bind() -> TestBroker {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        TestBroker { listener, addr }
    }

    pub(crate) async fn accept(&self) -> Session {
        let (socket, _) = self.listener.accept().await.unwrap();

        Session {
            framed: Framed::new(socket, AMQPCodec {}),
            channel: 0,
            consumer_tag: String::new(),
            queue: String::new(),
            next_delivery_tag: 0,
        }
    }
}

pub(crate) struct Session {
    framed: Framed<TcpStream, AMQPCodec>,
    channel: u16,
    consumer_tag: String,
    queue: String,
    next_delivery_tag: u64,
}

impl Session {
    async fn send(&mut self, frame: AMQPFrame) {
        self.framed.send(Frame::Frame(frame)).await.unwrap();
    }

    async fn recv(&mut self) -> AMQPFrame {
        match self.framed.next().await {
            Some(Ok(Frame::Frame(frame))) => frame,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    /// Walk the client through the connection handshake.
    pub(crate) async fn handshake(&mut self) {
        match self.recv().await {
            AMQPFrame::Header => (),
            other => panic!("expected protocol header, got {:?}", other),
        }

        self.send(frame::connection_start(0)).await;

        match self.recv().await {
            AMQPFrame::Method(0, frame::CONNECTION_START_OK, _) => (),
            other => panic!("expected Connection.StartOk, got {:?}", other),
        }

        self.send(frame::connection_tune(0)).await;

        match self.recv().await {
            AMQPFrame::Method(0, frame::CONNECTION_TUNE_OK, _) => (),
            other => panic!("expected Connection.TuneOk, got {:?}", other),
        }

        match self.recv().await {
            AMQPFrame::Method(0, frame::CONNECTION_OPEN, _) => (),
            other => panic!("expected Connection.Open, got {:?}", other),
        }

        self.send(frame::connection_open_ok(0)).await;
    }

    pub(crate) async fn expect_channel_open(&mut self) {
        match self.recv().await {
            AMQPFrame::Method(channel, frame::CHANNEL_OPEN, _) => {
                self.channel = channel;

                self.send(frame::channel_open_ok(channel)).await;
            }
            other => panic!("expected Channel.Open, got {:?}", other),
        }
    }

    pub(crate) async fn expect_queue_declare(&mut self) -> frame::QueueDeclareArgs {
        match self.recv().await {
            AMQPFrame::Method(channel, frame::QUEUE_DECLARE, MethodFrameArgs::QueueDeclare(args)) => {
                self.queue = args.name.clone();

                self.send(frame::queue_declare_ok(channel, args.name.clone(), 0, 0)).await;

                args
            }
            other => panic!("expected Queue.Declare, got {:?}", other),
        }
    }

    pub(crate) async fn expect_basic_consume(&mut self) -> frame::BasicConsumeArgs {
        match self.recv().await {
            AMQPFrame::Method(channel, frame::BASIC_CONSUME, MethodFrameArgs::BasicConsume(args)) => {
                self.consumer_tag = args.consumer_tag.clone();

                self.send(frame::basic_consume_ok(channel, &args.consumer_tag)).await;

                args
            }
            other => panic!("expected Basic.Consume, got {:?}", other),
        }
    }

    /// Push one message to the consumer, returns its delivery tag.
    pub(crate) async fn deliver(&mut self, body: &[u8]) -> u64 {
        self.next_delivery_tag += 1;

        let tag = self.next_delivery_tag;

        self.send(frame::basic_deliver(
            self.channel,
            &self.consumer_tag,
            tag,
            false,
            "",
            &self.queue,
        ))
        .await;
        self.send(frame::content_header(self.channel, body.len() as u64).into())
            .await;
        self.send(frame::content_body(self.channel, body).into()).await;

        tag
    }

    /// Expect a published message and collect its body.
    pub(crate) async fn expect_publish(&mut self) -> (frame::BasicPublishArgs, Vec<u8>) {
        let args = match self.recv().await {
            AMQPFrame::Method(_, frame::BASIC_PUBLISH, MethodFrameArgs::BasicPublish(args)) => args,
            other => panic!("expected Basic.Publish, got {:?}", other),
        };

        let body_size = match self.recv().await {
            AMQPFrame::ContentHeader(header) => header.body_size,
            other => panic!("expected a content header, got {:?}", other),
        };

        let mut body = Vec::new();

        while (body.len() as u64) < body_size {
            match self.recv().await {
                AMQPFrame::ContentBody(chunk) => body.extend_from_slice(&chunk.body),
                other => panic!("expected a content body, got {:?}", other),
            }
        }

        (args, body)
    }

    /// Wait for the next acknowledgement, skipping unrelated frames.
    pub(crate) async fn expect_basic_ack(&mut self) -> u64 {
        loop {
            if let AMQPFrame::Method(_, frame::BASIC_ACK, MethodFrameArgs::BasicAck(args)) = self.recv().await {
                return args.delivery_tag;
            }
        }
    }

    /// Revoke the consumer the way a broker does when the queue goes away.
    pub(crate) async fn cancel_consumer(&mut self) {
        let cancel = frame::basic_cancel(self.channel, &self.consumer_tag, false);

        self.send(cancel).await;
    }

    /// Answer teardown frames until the peer goes away, so that close
    /// handshakes never leave the client hanging.
    pub(crate) async fn serve_teardown(mut self) {
        loop {
            let frame = match self.framed.next().await {
                Some(Ok(Frame::Frame(frame))) => frame,
                Some(Ok(Frame::Frames(_))) => continue,
                Some(Err(_)) | None => break,
            };

            match frame {
                AMQPFrame::Method(channel, frame::BASIC_CANCEL, MethodFrameArgs::BasicCancel(args)) => {
                    self.send(frame::basic_cancel_ok(channel, &args.consumer_tag)).await;
                }
                AMQPFrame::Method(channel, frame::CHANNEL_CLOSE, _) => {
                    self.send(frame::channel_close_ok(channel)).await;
                }
                AMQPFrame::Method(_, frame::CONNECTION_CLOSE, _) => {
                    self.send(frame::connection_close_ok(0)).await;

                    break;
                }
                _ => (),
            }
        }
    }
}
