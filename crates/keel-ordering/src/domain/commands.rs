//! Commands for the Order & Payment context.

use keel_core::command::Command;
use uuid::Uuid;

/// Command to open a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
    /// The customer placing the order.
    pub customer_id: Uuid,
}

/// Command to add a line to an open order.
#[derive(Debug, Clone)]
pub struct AddOrderItem {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
    /// Stock keeping unit.
    pub sku: String,
    /// Number of units.
    pub quantity: u32,
    /// Price per unit in cents.
    pub unit_price_cents: i64,
}

/// Command to submit an order for checkout.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
}

/// Command to finalize a placed order.
#[derive(Debug, Clone)]
pub struct ConfirmOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
}

/// Command to cancel an order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
    /// Why the order is cancelled.
    pub reason: String,
}

/// Command to reserve funds for an order.
#[derive(Debug, Clone)]
pub struct AuthorizePayment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The payment identifier.
    pub payment_id: Uuid,
    /// The order being paid for.
    pub order_id: Uuid,
    /// Amount to reserve in cents.
    pub amount_cents: i64,
    /// Funds available to the customer in cents.
    pub available_cents: i64,
}

/// Command to release a payment authorization.
#[derive(Debug, Clone)]
pub struct VoidPayment {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The payment identifier.
    pub payment_id: Uuid,
    /// Why the authorization is voided.
    pub reason: String,
}

macro_rules! impl_command {
    ($($command:ty => $name:literal),+ $(,)?) => {
        $(
            impl Command for $command {
                fn command_type(&self) -> &'static str {
                    $name
                }

                fn correlation_id(&self) -> Uuid {
                    self.correlation_id
                }
            }
        )+
    };
}

impl_command! {
    CreateOrder => "order.create",
    AddOrderItem => "order.add_item",
    PlaceOrder => "order.place",
    ConfirmOrder => "order.confirm",
    CancelOrder => "order.cancel",
    AuthorizePayment => "payment.authorize",
    VoidPayment => "payment.void",
}
