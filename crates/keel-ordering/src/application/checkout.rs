//! The checkout saga: place the order, authorize payment, confirm.
//!
//! If authorization fails the order is cancelled; if confirmation fails the
//! payment is voided and the order cancelled. Every compensation tolerates
//! being run against a step that never took effect, so the saga can be
//! recovered after a crash.

use std::time::Duration;

use async_trait::async_trait;
use keel_core::clock::SharedClock;
use keel_core::error::DomainError;
use keel_core::repository::AggregateRepository;
use keel_saga::{SagaOrchestrator, SagaStep, TimeoutStep};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::command_handlers::{
    handle_authorize_payment, handle_cancel_order, handle_confirm_order, handle_void_payment,
    order_stream,
};
use crate::domain::aggregates::{Order, Payment};
use crate::domain::commands::{
    AuthorizePayment, CancelOrder, ConfirmOrder, PlaceOrder, VoidPayment,
};

/// Saga type under which checkout progress is persisted.
pub const CHECKOUT_SAGA_TYPE: &str = "checkout";

const ROLLBACK_REASON: &str = "checkout rolled back";

/// Data carried through a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutData {
    /// Correlation ID stamped on every event the saga produces.
    pub correlation_id: Uuid,
    /// The order being checked out. Must exist and be open.
    pub order_id: Uuid,
    /// The payment to authorize.
    pub payment_id: Uuid,
    /// Funds available to the customer in cents.
    pub available_cents: i64,
    /// Order total, known once the order is placed.
    pub amount_cents: Option<i64>,
}

impl CheckoutData {
    /// Starts a checkout for an existing open order.
    #[must_use]
    pub fn new(order_id: Uuid, available_cents: i64) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            order_id,
            payment_id: Uuid::new_v4(),
            available_cents,
            amount_cents: None,
        }
    }

    fn cancel_order(&self) -> CancelOrder {
        CancelOrder {
            correlation_id: self.correlation_id,
            order_id: self.order_id,
            reason: ROLLBACK_REASON.to_owned(),
        }
    }
}

/// Places the order and records its total. Compensated by cancelling it.
#[derive(Clone)]
pub struct PlaceOrderStep {
    orders: AggregateRepository<Order>,
    clock: SharedClock,
}

#[async_trait]
impl SagaStep<CheckoutData> for PlaceOrderStep {
    fn name(&self) -> &str {
        "place_order"
    }

    async fn execute(&self, data: &mut CheckoutData) -> Result<(), DomainError> {
        let command = PlaceOrder {
            correlation_id: data.correlation_id,
            order_id: data.order_id,
        };
        let mut order = self.orders.get(&order_stream(data.order_id)).await?;
        order.execute(&command, self.clock.as_ref(), Order::place)?;
        self.orders.save(&mut order).await?;
        data.amount_cents = order.state().placed_total_cents;
        Ok(())
    }

    async fn compensate(&self, data: &mut CheckoutData) -> Result<(), DomainError> {
        handle_cancel_order(&data.cancel_order(), self.clock.as_ref(), &self.orders).await?;
        Ok(())
    }
}

/// Authorizes payment for the order total. Compensated by voiding it.
#[derive(Clone)]
pub struct AuthorizePaymentStep {
    payments: AggregateRepository<Payment>,
    clock: SharedClock,
}

#[async_trait]
impl SagaStep<CheckoutData> for AuthorizePaymentStep {
    fn name(&self) -> &str {
        "authorize_payment"
    }

    async fn execute(&self, data: &mut CheckoutData) -> Result<(), DomainError> {
        let amount_cents = data.amount_cents.ok_or_else(|| {
            DomainError::Validation(format!("order {} has not been placed", data.order_id))
        })?;
        let command = AuthorizePayment {
            correlation_id: data.correlation_id,
            payment_id: data.payment_id,
            order_id: data.order_id,
            amount_cents,
            available_cents: data.available_cents,
        };
        handle_authorize_payment(&command, self.clock.as_ref(), &self.payments).await?;
        Ok(())
    }

    async fn compensate(&self, data: &mut CheckoutData) -> Result<(), DomainError> {
        let command = VoidPayment {
            correlation_id: data.correlation_id,
            payment_id: data.payment_id,
            reason: ROLLBACK_REASON.to_owned(),
        };
        handle_void_payment(&command, self.clock.as_ref(), &self.payments).await?;
        Ok(())
    }
}

/// Confirms the order. Confirmation is final, so there is nothing to undo.
#[derive(Clone)]
pub struct ConfirmOrderStep {
    orders: AggregateRepository<Order>,
    clock: SharedClock,
}

#[async_trait]
impl SagaStep<CheckoutData> for ConfirmOrderStep {
    fn name(&self) -> &str {
        "confirm_order"
    }

    async fn execute(&self, data: &mut CheckoutData) -> Result<(), DomainError> {
        let command = ConfirmOrder {
            correlation_id: data.correlation_id,
            order_id: data.order_id,
        };
        handle_confirm_order(&command, self.clock.as_ref(), &self.orders).await?;
        Ok(())
    }

    async fn compensate(&self, _data: &mut CheckoutData) -> Result<(), DomainError> {
        Ok(())
    }
}

/// Builds the checkout saga. Every step's `execute` is bounded by
/// `step_timeout`.
#[must_use]
pub fn checkout_saga(
    orders: &AggregateRepository<Order>,
    payments: &AggregateRepository<Payment>,
    clock: &SharedClock,
    step_timeout: Duration,
) -> SagaOrchestrator<CheckoutData> {
    SagaOrchestrator::new(CHECKOUT_SAGA_TYPE)
        .step(TimeoutStep::new(
            PlaceOrderStep {
                orders: orders.clone(),
                clock: clock.clone(),
            },
            step_timeout,
        ))
        .step(TimeoutStep::new(
            AuthorizePaymentStep {
                payments: payments.clone(),
                clock: clock.clone(),
            },
            step_timeout,
        ))
        .step(TimeoutStep::new(
            ConfirmOrderStep {
                orders: orders.clone(),
                clock: clock.clone(),
            },
            step_timeout,
        ))
}
