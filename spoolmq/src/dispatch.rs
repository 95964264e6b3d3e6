//! Per-delivery handler: decode the payload, tell the observer, print,
//! then acknowledge.
//!
//! Decode and printer failures are contained here, the consumer loop must
//! keep running whatever a single message does. The acknowledgement is
//! sent after the print attempt no matter how the attempt went, a broken
//! printer must not pile up redeliveries. Only a failed ack escapes,
//! because then the connection itself is gone.

use crate::printer::Printer;
use anyhow::Result;
use log::{debug, warn};
use spoolmq_client::{ConsumerHandler, DeliveredMessage, DeliveryTag};

/// Callback invoked with every dispatched message text.
pub(crate) type Observer = Box<dyn Fn(&str) + Send + Sync>;

/// The acknowledging side of a consumer.
pub(crate) trait Acker {
    async fn ack(&self, delivery_tag: DeliveryTag) -> Result<()>;
}

impl Acker for ConsumerHandler {
    async fn ack(&self, delivery_tag: DeliveryTag) -> Result<()> {
        self.basic_ack(delivery_tag).await
    }
}

pub(crate) async fn dispatch<A: Acker>(
    message: DeliveredMessage,
    printer: &mut Printer,
    observer: Option<&Observer>,
    acker: &A,
) -> Result<()> {
    match std::str::from_utf8(&message.body) {
        Ok(text) => {
            if let Some(observer) = observer {
                observer(text);
            }

            match printer.print(text) {
                Ok(()) => debug!("Printed message of {} bytes", message.body.len()),
                Err(e) => warn!("Printing message failed: {}", e),
            }
        }
        Err(e) => warn!("Dropping non UTF-8 payload of {} bytes: {}", message.body.len(), e),
    }

    acker.ack(message.delivery_tag).await
}
