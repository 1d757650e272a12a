//! Command handlers for the Order & Payment context.
//!
//! Each handler loads the aggregate through its repository, runs the
//! command's decision against it, and saves the resulting events. A save
//! that loses an optimistic-concurrency race returns
//! `DomainError::ConcurrencyConflict` unchanged; callers that want to retry
//! wrap the handler in `keel_core::retry::retry_on_conflict`.

use keel_core::aggregate::{Aggregate, AggregateRoot};
use keel_core::clock::Clock;
use keel_core::error::DomainError;
use keel_core::event::StoredEvent;
use keel_core::repository::AggregateRepository;
use keel_core::stream::StreamId;
use uuid::Uuid;

use crate::domain::aggregates::{Order, Payment};
use crate::domain::commands::{
    AddOrderItem, AuthorizePayment, CancelOrder, ConfirmOrder, CreateOrder, PlaceOrder,
    VoidPayment,
};

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct OrderingCommandResult {
    /// The stream affected by the command.
    pub stream_id: StreamId,
    /// The events produced and persisted. Empty if the command was a no-op.
    pub stored_events: Vec<StoredEvent>,
}

/// Stream identifier of an order.
#[must_use]
pub fn order_stream(order_id: Uuid) -> StreamId {
    StreamId::prefixed("order", order_id)
}

/// Stream identifier of a payment.
#[must_use]
pub fn payment_stream(payment_id: Uuid) -> StreamId {
    StreamId::prefixed("payment", payment_id)
}

async fn persist<A: Aggregate>(
    repo: &AggregateRepository<A>,
    mut root: AggregateRoot<A>,
) -> Result<OrderingCommandResult, DomainError> {
    let stored_events = repo.save(&mut root).await?;
    Ok(OrderingCommandResult {
        stream_id: root.id().clone(),
        stored_events,
    })
}

/// Handles the `CreateOrder` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the order already exists, or any
/// repository error.
#[tracing::instrument(skip(clock, repo), fields(order_id = %command.order_id))]
pub async fn handle_create_order(
    command: &CreateOrder,
    clock: &dyn Clock,
    repo: &AggregateRepository<Order>,
) -> Result<OrderingCommandResult, DomainError> {
    let stream_id = order_stream(command.order_id);
    let mut order = repo
        .load(&stream_id)
        .await?
        .unwrap_or_else(|| AggregateRoot::new(stream_id));
    order.execute(command, clock, |state| {
        state.create(command.order_id, command.customer_id)
    })?;
    persist(repo, order).await
}

/// Handles the `AddOrderItem` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the order does not exist,
/// `DomainError::Validation` if the order is not open, or any repository
/// error.
pub async fn handle_add_order_item(
    command: &AddOrderItem,
    clock: &dyn Clock,
    repo: &AggregateRepository<Order>,
) -> Result<OrderingCommandResult, DomainError> {
    let mut order = repo.get(&order_stream(command.order_id)).await?;
    order.execute(command, clock, |state| {
        state.add_item(&command.sku, command.quantity, command.unit_price_cents)
    })?;
    persist(repo, order).await
}

/// Handles the `PlaceOrder` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the order does not exist,
/// `DomainError::Validation` if it cannot be placed, or any repository
/// error.
pub async fn handle_place_order(
    command: &PlaceOrder,
    clock: &dyn Clock,
    repo: &AggregateRepository<Order>,
) -> Result<OrderingCommandResult, DomainError> {
    let mut order = repo.get(&order_stream(command.order_id)).await?;
    order.execute(command, clock, Order::place)?;
    persist(repo, order).await
}

/// Handles the `ConfirmOrder` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the order does not exist,
/// `DomainError::Validation` if it is not placed, or any repository error.
pub async fn handle_confirm_order(
    command: &ConfirmOrder,
    clock: &dyn Clock,
    repo: &AggregateRepository<Order>,
) -> Result<OrderingCommandResult, DomainError> {
    let mut order = repo.get(&order_stream(command.order_id)).await?;
    order.execute(command, clock, Order::confirm)?;
    persist(repo, order).await
}

/// Handles the `CancelOrder` command. Cancelling an unknown or already
/// cancelled order succeeds without producing events.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the order is confirmed, or any
/// repository error.
pub async fn handle_cancel_order(
    command: &CancelOrder,
    clock: &dyn Clock,
    repo: &AggregateRepository<Order>,
) -> Result<OrderingCommandResult, DomainError> {
    let stream_id = order_stream(command.order_id);
    let Some(mut order) = repo.load(&stream_id).await? else {
        return Ok(OrderingCommandResult {
            stream_id,
            stored_events: Vec::new(),
        });
    };
    order.execute(command, clock, |state| state.cancel(&command.reason))?;
    persist(repo, order).await
}

/// Handles the `AuthorizePayment` command.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the payment was already used or
/// funds are insufficient, or any repository error.
#[tracing::instrument(skip(clock, repo), fields(payment_id = %command.payment_id))]
pub async fn handle_authorize_payment(
    command: &AuthorizePayment,
    clock: &dyn Clock,
    repo: &AggregateRepository<Payment>,
) -> Result<OrderingCommandResult, DomainError> {
    let stream_id = payment_stream(command.payment_id);
    let mut payment = repo
        .load(&stream_id)
        .await?
        .unwrap_or_else(|| AggregateRoot::new(stream_id));
    payment.execute(command, clock, |state| {
        state.authorize(command.order_id, command.amount_cents, command.available_cents)
    })?;
    persist(repo, payment).await
}

/// Handles the `VoidPayment` command. Voiding an unknown or already voided
/// payment succeeds without producing events.
///
/// # Errors
///
/// Returns any repository error.
pub async fn handle_void_payment(
    command: &VoidPayment,
    clock: &dyn Clock,
    repo: &AggregateRepository<Payment>,
) -> Result<OrderingCommandResult, DomainError> {
    let stream_id = payment_stream(command.payment_id);
    let Some(mut payment) = repo.load(&stream_id).await? else {
        return Ok(OrderingCommandResult {
            stream_id,
            stored_events: Vec::new(),
        });
    };
    payment.execute(command, clock, |state| state.void(&command.reason))?;
    persist(repo, payment).await
}
