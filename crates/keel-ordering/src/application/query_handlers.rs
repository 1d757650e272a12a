//! Query handlers for the Order & Payment context.
//!
//! Queries load aggregates through the same repositories as commands and
//! return read-only view DTOs.

use keel_core::error::DomainError;
use keel_core::repository::AggregateRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::application::command_handlers::{order_stream, payment_stream};
use crate::domain::aggregates::{Order, OrderLine, OrderStatus, Payment, PaymentStatus};

/// Read-only view of an order.
#[derive(Debug, Serialize)]
pub struct OrderView {
    /// The order identifier.
    pub order_id: Uuid,
    /// The customer who placed the order.
    pub customer_id: Option<Uuid>,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Lines in the order they were added.
    pub lines: Vec<OrderLine>,
    /// Current total in cents, `None` if it overflows.
    pub total_cents: Option<i64>,
    /// Version of the last applied event.
    pub version: i64,
}

/// Read-only view of a payment.
#[derive(Debug, Serialize)]
pub struct PaymentView {
    /// The payment identifier.
    pub payment_id: Uuid,
    /// The order being paid for.
    pub order_id: Option<Uuid>,
    /// Amount reserved in cents.
    pub amount_cents: i64,
    /// Current lifecycle status.
    pub status: PaymentStatus,
    /// Version of the last applied event.
    pub version: i64,
}

/// Retrieves an order by its identifier.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the order has no events,
/// or any repository error.
pub async fn get_order_by_id(
    order_id: Uuid,
    repo: &AggregateRepository<Order>,
) -> Result<OrderView, DomainError> {
    let order = repo.get(&order_stream(order_id)).await?;
    let state = order.state();
    Ok(OrderView {
        order_id,
        customer_id: state.customer_id,
        status: state.status,
        lines: state.lines.clone(),
        total_cents: state.total_cents(),
        version: order.version(),
    })
}

/// Retrieves a payment by its identifier.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the payment has no events,
/// or any repository error.
pub async fn get_payment_by_id(
    payment_id: Uuid,
    repo: &AggregateRepository<Payment>,
) -> Result<PaymentView, DomainError> {
    let payment = repo.get(&payment_stream(payment_id)).await?;
    let state = payment.state();
    Ok(PaymentView {
        payment_id,
        order_id: state.order_id,
        amount_cents: state.amount_cents,
        status: state.status,
        version: payment.version(),
    })
}
