use crate::channel_api::Channel;
use crate::model::ChannelNumber;
use crate::processor::{self, RequestSink};
use anyhow::{anyhow, Result};
use spoolmq_codec::frame;

/// Represents a connection to the broker.
///
/// There is at most one live connection per client value; when an
/// operation fails with a connection error the client is gone and a new
/// one needs to be connected.
pub struct Client {
    request_sink: RequestSink,
}

/// Connect to the broker and do the protocol handshake with the given
/// credentials.
///
/// The url is either a plain `host:port` address or an
/// `amqp://host:port/vhost` style url. There is no retry here, reconnect
/// policy belongs to the caller.
pub async fn connect(url: &str, username: &str, password: &str) -> Result<Client> {
    let (address, virtual_host) = parse_url(url)?;

    let client_sink = processor::create_connection(&address).await?;

    // Protocol header, the server answers with Connection.Start.
    processor::call(&client_sink, frame::AMQPFrame::Header).await?;

    let mut caps = frame::FieldTable::new();

    caps.insert(
        "authentication_failure_close".to_string(),
        frame::AMQPFieldValue::Bool(true),
    );
    caps.insert("consumer_cancel_notify".to_string(), frame::AMQPFieldValue::Bool(true));

    // Start-Ok is answered by Tune, Open by Open-Ok.
    processor::call(&client_sink, frame::connection_start_ok(username, password, caps)).await?;

    processor::send(&client_sink, frame::connection_tune_ok(0)).await?;

    processor::call(&client_sink, frame::connection_open(0, &virtual_host)).await?;

    Ok(Client {
        request_sink: client_sink,
    })
}

/// Split an address into the TCP endpoint and the virtual host.
fn parse_url(url: &str) -> Result<(String, String)> {
    if !url.contains("://") {
        return Ok((url.to_string(), "/".to_string()));
    }

    let parsed = url::Url::parse(url)?;

    if parsed.scheme() != "amqp" {
        return Err(anyhow!("Unsupported scheme {}", parsed.scheme()));
    }

    let host = parsed.host_str().ok_or_else(|| anyhow!("Missing host in {}", url))?;
    let port = parsed.port().unwrap_or(5672);

    let virtual_host = match parsed.path() {
        "" | "/" => "/".to_string(),
        path => path.trim_start_matches('/').to_string(),
    };

    Ok((format!("{}:{}", host, port), virtual_host))
}

impl Client {
    /// Open a channel inside the connection.
    pub async fn channel_open(&mut self, channel: ChannelNumber) -> Result<Channel> {
        processor::call(&self.request_sink, frame::channel_open(channel)).await?;

        Ok(Channel::new(channel, self.request_sink.clone()))
    }

    /// Close the connection.
    pub async fn close(&mut self) -> Result<()> {
        let (class_id, method_id) = frame::split_class_method(frame::CONNECTION_CLOSE);

        processor::call(
            &self.request_sink,
            frame::connection_close(0, 200, "Normal close", class_id, method_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::parse_url;

    #[test]
    fn plain_address_gets_default_virtual_host() {
        let (address, virtual_host) = parse_url("localhost:5672").unwrap();

        assert_eq!(address, "localhost:5672");
        assert_eq!(virtual_host, "/");
    }

    #[test]
    fn amqp_url_is_split_into_address_and_virtual_host() {
        let (address, virtual_host) = parse_url("amqp://broker.local:5673/orders").unwrap();

        assert_eq!(address, "broker.local:5673");
        assert_eq!(virtual_host, "orders");
    }

    #[test]
    fn amqp_url_without_port_uses_the_default() {
        let (address, virtual_host) = parse_url("amqp://broker.local").unwrap();

        assert_eq!(address, "broker.local:5672");
        assert_eq!(virtual_host, "/");
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(parse_url("http://broker.local").is_err());
    }
}
