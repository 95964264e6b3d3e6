//! The resilient consumer loop.
//!
//! One task owns the whole broker session: connect, open channel, declare
//! the queue, consume, then suspend on the consumer signal stream until
//! either a delivery arrives, the session dies or the stop signal fires.
//! Any failure tears the session down and the loop goes back to
//! connecting after a fixed delay, forever.

use crate::config::{BrokerConfig, Config};
use crate::dispatch::{self, Observer};
use crate::printer::Printer;
use anyhow::Result;
use log::{debug, info, warn};
use spoolmq_client::{AutoDelete, Channel, Client, ConsumerHandler, ConsumerSignal, Durable, Exclusive, NoAck};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Why a consuming session ended.
#[derive(Debug, PartialEq)]
enum SessionEnd {
    /// The stop signal fired, the relay is done.
    Stopped,
    /// The broker went away or revoked the consumer, time to reconnect.
    Disconnected,
}

pub(crate) struct Relay {
    broker: BrokerConfig,
    backoff: Duration,
    printer: Printer,
    observer: Option<Observer>,
    stop: watch::Receiver<bool>,
}

impl Relay {
    pub(crate) fn new(config: &Config, printer: Printer, observer: Option<Observer>, stop: watch::Receiver<bool>) -> Relay {
        Relay {
            broker: config.broker.clone(),
            backoff: Duration::from_secs(config.reconnect_delay_secs),
            printer,
            observer,
            stop,
        }
    }

    /// Consume the queue until the stop signal fires. No failure is fatal;
    /// the first connect attempt is immediate, every retry waits the
    /// backoff first.
    pub(crate) async fn run(mut self) {
        let mut first_attempt = true;

        loop {
            if *self.stop.borrow() {
                break;
            }

            if !first_attempt {
                tokio::select! {
                    _ = sleep(self.backoff) => (),
                    changed = self.stop.changed() => {
                        // A dropped stop sender counts as a stop signal.
                        if changed.is_err() {
                            break;
                        }

                        continue;
                    }
                }
            }

            first_attempt = false;

            match self.session().await {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::Disconnected) => {
                    info!("Reconnecting in {:?}", self.backoff);
                }
                Err(e) => {
                    warn!("Connecting failed: {:#}, retrying in {:?}", e, self.backoff);
                }
            }
        }

        self.printer.close();

        info!("Relay stopped");
    }

    /// One connect-and-consume session. An error means the session could
    /// not be set up; a session which reached consuming ends with the
    /// reason. Nothing of a failed setup survives into the next attempt.
    async fn session(&mut self) -> Result<SessionEnd> {
        let url = self.broker.url();

        info!("Connecting to {}", url);

        let mut client = spoolmq_client::connect(&url, &self.broker.username, &self.broker.password).await?;

        let (channel, mut handler) = match self.open_consumer(&mut client).await {
            Ok(consumer) => consumer,
            Err(e) => {
                // A half opened connection must not leak into the retry.
                let _ = client.close().await;

                return Err(e);
            }
        };

        info!("Consuming queue {}", self.broker.queue);

        let end = loop {
            tokio::select! {
                signal = handler.signal_stream.recv() => match signal {
                    Some(ConsumerSignal::Delivered(message)) => {
                        if let Err(e) =
                            dispatch::dispatch(*message, &mut self.printer, self.observer.as_ref(), &handler).await
                        {
                            warn!("Acknowledgement failed: {:#}", e);

                            break SessionEnd::Disconnected;
                        }
                    }
                    Some(ConsumerSignal::Cancelled) => {
                        warn!("Consumer cancelled by the broker");

                        break SessionEnd::Disconnected;
                    }
                    Some(ConsumerSignal::ChannelClosed { reply_code, reply_text, .. }) => {
                        warn!("Channel closed by the broker: {} {}", reply_code, reply_text);

                        break SessionEnd::Disconnected;
                    }
                    Some(ConsumerSignal::ConnectionClosed { reply_code, reply_text, .. }) => {
                        warn!("Connection closed by the broker: {} {}", reply_code, reply_text);

                        break SessionEnd::Disconnected;
                    }
                    None => {
                        warn!("Connection lost");

                        break SessionEnd::Disconnected;
                    }
                },
                _ = self.stop.changed() => break SessionEnd::Stopped,
            }
        };

        match end {
            SessionEnd::Stopped => {
                // Orderly teardown, all of it best effort.
                if let Err(e) = handler.basic_cancel().await {
                    debug!("Cancel failed on shutdown: {:#}", e);
                }

                if let Err(e) = channel.close().await {
                    debug!("Channel close failed on shutdown: {:#}", e);
                }

                if let Err(e) = client.close().await {
                    debug!("Connection close failed on shutdown: {:#}", e);
                }
            }
            SessionEnd::Disconnected => {
                // The connection is gone or about to be; make sure nothing
                // half open is carried into the retry.
                if let Err(e) = client.close().await {
                    debug!("Connection close failed: {:#}", e);
                }
            }
        }

        Ok(end)
    }

    async fn open_consumer(&mut self, client: &mut Client) -> Result<(Channel, ConsumerHandler)> {
        let channel = client.channel_open(1).await?;

        channel
            .queue_declare(&self.broker.queue, Durable(true), Exclusive(false), AutoDelete(false))
            .await?;

        let handler = channel
            .basic_consume(&self.broker.queue, NoAck(false), Exclusive(false))
            .await?;

        Ok((channel, handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrinterConfig;
    use crate::testbroker::TestBroker;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use tokio::time::timeout;

    fn test_config(addr: &std::net::SocketAddr, reconnect_delay_secs: u64) -> Config {
        Config {
            broker: BrokerConfig {
                host: addr.ip().to_string(),
                port: addr.port(),
                username: "guest".to_string(),
                password: "guest".to_string(),
                virtual_host: "/".to_string(),
                queue: "prints".to_string(),
            },
            printer: PrinterConfig {
                port: None,
                name_contains: None,
                baud: 9600,
            },
            reconnect_delay_secs,
        }
    }

    fn no_printer() -> Printer {
        Printer::new(PrinterConfig {
            port: None,
            name_contains: None,
            baud: 9600,
        })
    }

    async fn recv_within<T>(future: impl std::future::Future<Output = T>) -> T {
        timeout(Duration::from_secs(30), future).await.expect("test timed out")
    }

    #[tokio::test]
    async fn deliveries_are_dispatched_in_order_and_acked_once_each() {
        let broker = TestBroker::bind().await;
        let config = test_config(&broker.addr, 1);

        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen_by_observer = seen.clone();
        let observer: Observer = Box::new(move |text| seen_by_observer.lock().unwrap().push(text.to_string()));

        let (stop_tx, stop_rx) = watch::channel(false);
        let relay = Relay::new(&config, no_printer(), Some(observer), stop_rx);
        let relay_task = tokio::spawn(relay.run());

        let mut session = recv_within(broker.accept()).await;
        session.handshake().await;
        session.expect_channel_open().await;

        let declare = session.expect_queue_declare().await;

        assert_eq!(declare.name, "prints");
        assert!(declare.flags.contains(spoolmq_codec::frame::QueueDeclareFlags::DURABLE));
        assert!(!declare.flags.contains(spoolmq_codec::frame::QueueDeclareFlags::EXCLUSIVE));
        assert!(!declare
            .flags
            .contains(spoolmq_codec::frame::QueueDeclareFlags::AUTO_DELETE));

        let consume = session.expect_basic_consume().await;

        assert!(!consume.flags.contains(spoolmq_codec::frame::BasicConsumeFlags::NO_ACK));

        let tag_a = session.deliver(b"A").await;
        let tag_b = session.deliver(b"B").await;
        let tag_c = session.deliver(b"C").await;

        assert_eq!(recv_within(session.expect_basic_ack()).await, tag_a);
        assert_eq!(recv_within(session.expect_basic_ack()).await, tag_b);
        assert_eq!(recv_within(session.expect_basic_ack()).await, tag_c);

        assert_eq!(*seen.lock().unwrap(), vec!["A", "B", "C"]);

        tokio::spawn(session.serve_teardown());

        stop_tx.send(true).unwrap();

        recv_within(relay_task).await.unwrap();
    }

    #[tokio::test]
    async fn failed_connects_are_retried_with_the_backoff() {
        let broker = TestBroker::bind().await;
        let config = test_config(&broker.addr, 1);

        let (stop_tx, stop_rx) = watch::channel(false);
        let relay = Relay::new(&config, no_printer(), None, stop_rx);
        let relay_task = tokio::spawn(relay.run());

        // Three attempts die before the handshake.
        let mut attempts = Vec::new();

        for _ in 0..3 {
            let session = recv_within(broker.accept()).await;

            attempts.push(Instant::now());

            drop(session);
        }

        // The fourth one goes through and reaches consuming.
        let mut session = recv_within(broker.accept()).await;

        attempts.push(Instant::now());

        for window in attempts.windows(2) {
            assert!(window[1] - window[0] >= Duration::from_secs(1));
        }

        session.handshake().await;
        session.expect_channel_open().await;
        session.expect_queue_declare().await;
        session.expect_basic_consume().await;

        let tag = session.deliver(b"back online").await;

        assert_eq!(recv_within(session.expect_basic_ack()).await, tag);

        tokio::spawn(session.serve_teardown());

        stop_tx.send(true).unwrap();

        recv_within(relay_task).await.unwrap();
    }

    #[tokio::test]
    async fn broker_cancel_triggers_a_reconnect() {
        let broker = TestBroker::bind().await;
        let config = test_config(&broker.addr, 1);

        let (stop_tx, stop_rx) = watch::channel(false);
        let relay = Relay::new(&config, no_printer(), None, stop_rx);
        let relay_task = tokio::spawn(relay.run());

        let mut session = recv_within(broker.accept()).await;
        session.handshake().await;
        session.expect_channel_open().await;
        session.expect_queue_declare().await;
        session.expect_basic_consume().await;

        let tag = session.deliver(b"before cancel").await;

        assert_eq!(recv_within(session.expect_basic_ack()).await, tag);

        // The broker revokes the consumer; the relay must come back on its
        // own with a brand new session.
        session.cancel_consumer().await;
        tokio::spawn(session.serve_teardown());

        let mut session = recv_within(broker.accept()).await;
        session.handshake().await;
        session.expect_channel_open().await;
        session.expect_queue_declare().await;
        session.expect_basic_consume().await;

        tokio::spawn(session.serve_teardown());

        stop_tx.send(true).unwrap();

        recv_within(relay_task).await.unwrap();
    }

    #[tokio::test]
    async fn published_message_reaches_the_broker() {
        let broker = TestBroker::bind().await;
        let address = broker.addr.to_string();

        let server = tokio::spawn(async move {
            let mut session = broker.accept().await;
            session.handshake().await;
            session.expect_channel_open().await;

            let (publish, body) = session.expect_publish().await;

            assert_eq!(publish.exchange_name, "");
            assert_eq!(publish.routing_key, "prints");
            assert_eq!(body, b"Pedido #42");

            session.serve_teardown().await;
        });

        let mut client = spoolmq_client::connect(&address, "guest", "guest").await.unwrap();
        let channel = client.channel_open(1).await.unwrap();

        channel
            .basic_publish("prints", b"Pedido #42".to_vec())
            .await
            .unwrap();

        channel.close().await.unwrap();
        client.close().await.unwrap();

        recv_within(server).await.unwrap();
    }

    #[tokio::test]
    async fn declaring_the_same_queue_twice_succeeds() {
        let broker = TestBroker::bind().await;
        let address = broker.addr.to_string();

        let server = tokio::spawn(async move {
            let mut session = broker.accept().await;
            session.handshake().await;
            session.expect_channel_open().await;
            session.expect_queue_declare().await;
            session.expect_queue_declare().await;
            session.serve_teardown().await;
        });

        let mut client = spoolmq_client::connect(&address, "guest", "guest").await.unwrap();
        let channel = client.channel_open(1).await.unwrap();

        channel
            .queue_declare("prints", Durable(true), Exclusive(false), AutoDelete(false))
            .await
            .unwrap();
        channel
            .queue_declare("prints", Durable(true), Exclusive(false), AutoDelete(false))
            .await
            .unwrap();

        channel.close().await.unwrap();
        client.close().await.unwrap();

        recv_within(server).await.unwrap();
    }
}
