//! Domain events for the Order & Payment context.

use keel_core::event::DomainEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type for `OrderEvent::Created`.
pub const ORDER_CREATED_EVENT_TYPE: &str = "order.created";
/// Event type for `OrderEvent::ItemAdded`.
pub const ORDER_ITEM_ADDED_EVENT_TYPE: &str = "order.item_added";
/// Event type for `OrderEvent::Placed`.
pub const ORDER_PLACED_EVENT_TYPE: &str = "order.placed";
/// Event type for `OrderEvent::Confirmed`.
pub const ORDER_CONFIRMED_EVENT_TYPE: &str = "order.confirmed";
/// Event type for `OrderEvent::Cancelled`.
pub const ORDER_CANCELLED_EVENT_TYPE: &str = "order.cancelled";
/// Event type for `PaymentEvent::Authorized`.
pub const PAYMENT_AUTHORIZED_EVENT_TYPE: &str = "payment.authorized";
/// Event type for `PaymentEvent::Voided`.
pub const PAYMENT_VOIDED_EVENT_TYPE: &str = "payment.voided";

/// Events of the `Order` aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    /// An order was opened for a customer.
    Created {
        /// The order identifier.
        order_id: Uuid,
        /// The customer placing the order.
        customer_id: Uuid,
    },
    /// A line was added to an open order.
    ItemAdded {
        /// Stock keeping unit.
        sku: String,
        /// Number of units.
        quantity: u32,
        /// Price per unit in cents.
        unit_price_cents: i64,
    },
    /// The order was submitted for checkout.
    Placed {
        /// Order total in cents at the time of placing.
        total_cents: i64,
    },
    /// Payment succeeded and the order is final.
    Confirmed,
    /// The order was abandoned or rolled back.
    Cancelled {
        /// Why the order was cancelled.
        reason: String,
    },
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => ORDER_CREATED_EVENT_TYPE,
            Self::ItemAdded { .. } => ORDER_ITEM_ADDED_EVENT_TYPE,
            Self::Placed { .. } => ORDER_PLACED_EVENT_TYPE,
            Self::Confirmed => ORDER_CONFIRMED_EVENT_TYPE,
            Self::Cancelled { .. } => ORDER_CANCELLED_EVENT_TYPE,
        }
    }
}

/// Events of the `Payment` aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    /// Funds were reserved for an order.
    Authorized {
        /// The order being paid for.
        order_id: Uuid,
        /// Amount reserved in cents.
        amount_cents: i64,
    },
    /// A reservation was released.
    Voided {
        /// Why the authorization was voided.
        reason: String,
    },
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Authorized { .. } => PAYMENT_AUTHORIZED_EVENT_TYPE,
            Self::Voided { .. } => PAYMENT_VOIDED_EVENT_TYPE,
        }
    }
}
