use crate::entities::{booking, order, order_item};
use crate::services::emails::EmailService;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events emitted by the domain services. Everything here is a
/// fire-and-forget side-effect trigger; the primary transaction has already
/// committed by the time an event is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    BookingCreated(i32),
    BookingCancelled { booking_number: String },
    OrderCreated(i32),
    OrderCancelled(i32),
    OrderStatusChanged {
        order_id: i32,
        old_status: String,
        new_status: String,
    },
    PaymentCompleted { order_id: i32, transaction_id: String },
    PaymentFailed { order_id: i32, transaction_id: String },
    CartCreated(Uuid),
    CouponApplied { cart_session_id: Uuid, code: String },
    InventoryAdjusted {
        product_id: i32,
        variant_id: Option<i32>,
        quantity_change: i32,
        quantity_after: i32,
        reason: String,
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

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }

    /// Send an event, logging on failure. Events never gate the primary
    /// outcome, so a full channel is a warning, not an error path.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropped event");
        }
    }
}

/// Event-processing loop. Confirmation and status emails are delivered from
/// here so a slow or failing mail provider never blocks a request thread;
/// failures are logged and swallowed.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    db: Arc<DatabaseConnection>,
    emails: Arc<EmailService>,
) {
    info!("starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated(order_id) => {
                if let Err(e) = send_order_confirmation(&db, &emails, order_id).await {
                    error!(order_id, error = %e, "failed to send order confirmation");
                }
            }
            Event::OrderStatusChanged {
                order_id,
                ref new_status,
                ..
            } => {
                if let Err(e) = send_order_status_update(&db, &emails, order_id, new_status).await {
                    error!(order_id, error = %e, "failed to send order status email");
                }
            }
            Event::BookingCreated(booking_id) => {
                if let Err(e) = send_booking_confirmation(&db, &emails, booking_id).await {
                    error!(booking_id, error = %e, "failed to send booking confirmation");
                }
            }
            ref other => {
                info!(event = ?other, "event processed");
            }
        }
    }

    info!("event channel closed, stopping event processing loop");
}

async fn send_order_confirmation(
    db: &DatabaseConnection,
    emails: &EmailService,
    order_id: i32,
) -> anyhow::Result<()> {
    let order = order::Entity::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("order {order_id} no longer exists"))?;
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Id)
        .all(db)
        .await?;

    emails.send_order_confirmation(&order, &items).await
}

async fn send_order_status_update(
    db: &DatabaseConnection,
    emails: &EmailService,
    order_id: i32,
    new_status: &str,
) -> anyhow::Result<()> {
    let order = order::Entity::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("order {order_id} no longer exists"))?;

    emails.send_order_status_update(&order, new_status).await
}

async fn send_booking_confirmation(
    db: &DatabaseConnection,
    emails: &EmailService,
    booking_id: i32,
) -> anyhow::Result<()> {
    let booking = booking::Entity::find_by_id(booking_id)
        .one(db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("booking {booking_id} no longer exists"))?;

    emails.send_booking_confirmation(&booking).await
}
