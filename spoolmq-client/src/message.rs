use crate::model::{ChannelNumber, DeliveryTag};

/// A message delivered by the broker.
///
/// With the `delivery_tag` the client sends back the acknowledgement,
/// telling the broker that the message was handled.
#[derive(Debug, Default)]
pub struct DeliveredMessage {
    pub channel: ChannelNumber,
    pub consumer_tag: String,
    pub delivery_tag: DeliveryTag,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
}
