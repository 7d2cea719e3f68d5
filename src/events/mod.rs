use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Events emitted by the order lifecycle. Consumers are decoupled from the
/// request path; a failed send never fails the request that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: i64,
        order_code: String,
        customer_id: i64,
        total_cents: i64,
    },
    OrderPaymentStatusChanged {
        order_id: i64,
        old_status: String,
        new_status: String,
        source: String,
    },
    OrderShipmentStatusChanged {
        order_id: i64,
        old_status: String,
        new_status: String,
        source: String,
    },
    OrderCancelled {
        order_id: i64,
        customer_id: i64,
    },
    PaymentEventReceived {
        external_event_id: String,
        event_type: String,
        outcome: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort send used from request paths
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "event dropped");
        }
    }
}

/// Builds a connected sender/receiver pair with a bounded buffer.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Background consumer logging every lifecycle event. Runs until all
/// senders are dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_code,
                customer_id,
                total_cents,
            } => {
                info!(
                    order_id,
                    order_code = %order_code,
                    customer_id,
                    total_cents,
                    "order created"
                );
            }
            Event::OrderPaymentStatusChanged {
                order_id,
                old_status,
                new_status,
                source,
            } => {
                info!(
                    order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    source = %source,
                    "payment status changed"
                );
            }
            Event::OrderShipmentStatusChanged {
                order_id,
                old_status,
                new_status,
                source,
            } => {
                info!(
                    order_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    source = %source,
                    "shipment status changed"
                );
            }
            Event::OrderCancelled {
                order_id,
                customer_id,
            } => {
                info!(order_id, customer_id, "order cancelled by customer");
            }
            Event::PaymentEventReceived {
                external_event_id,
                event_type,
                outcome,
            } => {
                info!(
                    external_event_id = %external_event_id,
                    event_type = %event_type,
                    outcome = %outcome,
                    "payment gateway event processed"
                );
            }
        }
    }
    info!("event channel closed, processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = channel(4);
        sender
            .send(Event::OrderCancelled {
                order_id: 1,
                customer_id: 2,
            })
            .await
            .unwrap();

        match rx.recv().await {
            Some(Event::OrderCancelled {
                order_id,
                customer_id,
            }) => {
                assert_eq!(order_id, 1);
                assert_eq!(customer_id, 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_after_receiver_dropped_reports_error() {
        let (sender, rx) = channel(1);
        drop(rx);
        assert!(sender
            .send(Event::OrderCancelled {
                order_id: 1,
                customer_id: 2,
            })
            .await
            .is_err());
    }
}
