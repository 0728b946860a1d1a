use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after a workflow commits. Delivery is
/// fire-and-forget: a failed send is logged, never surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    InvoiceCreated(Uuid),
    InvoiceVoided(Uuid),
    ReturnCreated(Uuid),
    ReturnCompleted {
        return_id: Uuid,
        invoice_id: Uuid,
        fully_returned: bool,
    },
    StockAdjusted {
        product_id: Uuid,
        delta: i32,
        stock_after: i32,
        reason: String,
    },
    LowStock {
        product_id: Uuid,
        stock: i32,
        min_stock: i32,
    },
    CustomerCreated(Uuid),
    ProductCreated(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, reporting the failure as a string so callers can log
    /// without aborting their workflow.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }
}

/// Creates a connected sender/receiver pair with the given channel capacity.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Consumes events from the channel until all senders are dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::LowStock {
                product_id,
                stock,
                min_stock,
            } => {
                warn!(product_id = %product_id, stock, min_stock, "product below minimum stock");
            }
            other => {
                info!(event = ?other, "domain event");
            }
        }
    }
    info!("event channel closed, stopping event processor");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = channel(4);
        let id = Uuid::new_v4();
        sender.send(Event::InvoiceCreated(id)).await.unwrap();

        match rx.recv().await {
            Some(Event::InvoiceCreated(got)) => assert_eq!(got, id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (sender, rx) = channel(1);
        drop(rx);
        assert!(sender.send(Event::InvoiceCreated(Uuid::new_v4())).await.is_err());
    }
}
