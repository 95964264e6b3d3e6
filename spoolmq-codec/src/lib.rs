//! AMQP 0.9.1 wire framing for the spoolmq relay.
//!
//! The `frame` module holds the data types for the methods the relay
//! pipeline exchanges with a broker (connection and channel lifecycle,
//! queue declaration, publish, consume, deliver, ack), the `codec` module
//! the encoder and decoder working on those types.
pub mod codec;
pub mod frame;

#[cfg(test)]
mod tests;
