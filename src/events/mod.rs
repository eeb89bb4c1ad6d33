use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the services after their state change commits.
///
/// Delivery is best-effort: a full or closed channel never aborts the
/// underlying state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Movement lifecycle events
    MovementCreated {
        movement_id: Uuid,
        movement_type: String,
        item_count: usize,
    },
    MovementUpdated(Uuid),
    MovementDeleted(Uuid),
    MovementItemAdded {
        movement_id: Uuid,
        item_id: Uuid,
        product_id: Uuid,
    },
    MovementItemRemoved {
        movement_id: Uuid,
        item_id: Uuid,
    },
    MovementPosted {
        movement_id: Uuid,
        movement_type: String,
        item_count: usize,
        posted_at: DateTime<Utc>,
    },
    MovementCancelled(Uuid),

    // Stock events, one per product touched by a posting
    StockLevelChanged {
        movement_id: Uuid,
        product_id: Uuid,
        sku: String,
        previous_stock: i32,
        new_stock: i32,
    },

    // Product catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
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
}

/// Event processing loop; consumes events until the channel closes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::MovementPosted {
                movement_id,
                movement_type,
                item_count,
                posted_at,
            } => {
                info!(
                    movement_id = %movement_id,
                    movement_type = %movement_type,
                    item_count = %item_count,
                    posted_at = %posted_at,
                    "Movement posted"
                );
            }
            Event::StockLevelChanged {
                product_id,
                sku,
                previous_stock,
                new_stock,
                ..
            } => {
                info!(
                    product_id = %product_id,
                    sku = %sku,
                    previous_stock = %previous_stock,
                    new_stock = %new_stock,
                    "Stock level changed"
                );
                if *new_stock == 0 {
                    warn!(sku = %sku, "Product is out of stock");
                }
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event channel closed; stopping event processing loop");
}
