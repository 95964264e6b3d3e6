use spoolmq_codec::frame;

/// AMQP channel number
pub type ChannelNumber = frame::Channel;
/// AMQP class id method id number
pub type ClassMethod = frame::ClassMethod;
/// Identifier of one unacknowledged delivery within a channel
pub type DeliveryTag = u64;
