//! Aggregates for the Order & Payment context.
//!
//! Each aggregate's decision methods validate a transition against the
//! current state and return the events it produces; `apply` folds those
//! events back in. Neither touches storage.

use keel_core::aggregate::Aggregate;
use keel_core::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{OrderEvent, PaymentEvent};

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// No `Created` event yet.
    #[default]
    Draft,
    /// Accepting items.
    Open,
    /// Submitted for checkout.
    Placed,
    /// Paid and final.
    Confirmed,
    /// Abandoned or rolled back.
    Cancelled,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Stock keeping unit.
    pub sku: String,
    /// Number of units.
    pub quantity: u32,
    /// Price per unit in cents.
    pub unit_price_cents: i64,
}

impl OrderLine {
    /// Line total in cents, or `None` if it does not fit in an `i64`.
    #[must_use]
    pub fn total_cents(&self) -> Option<i64> {
        self.unit_price_cents.checked_mul(i64::from(self.quantity))
    }
}

/// State of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// The order identifier, once created.
    pub order_id: Option<Uuid>,
    /// The customer placing the order.
    pub customer_id: Option<Uuid>,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Lines in the order they were added.
    pub lines: Vec<OrderLine>,
    /// Total fixed when the order was placed.
    pub placed_total_cents: Option<i64>,
    /// Reason given when the order was cancelled.
    pub cancellation_reason: Option<String>,
}

impl Order {
    /// Sum of all line totals in cents, or `None` on overflow.
    #[must_use]
    pub fn total_cents(&self) -> Option<i64> {
        self.lines
            .iter()
            .try_fold(0_i64, |total, line| total.checked_add(line.total_cents()?))
    }

    /// Opens the order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order already exists.
    pub fn create(&self, order_id: Uuid, customer_id: Uuid) -> Result<Vec<OrderEvent>, DomainError> {
        if self.status != OrderStatus::Draft {
            return Err(DomainError::Validation(format!(
                "order {order_id} already exists"
            )));
        }
        Ok(vec![OrderEvent::Created {
            order_id,
            customer_id,
        }])
    }

    /// Adds a line to an open order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order is not open, the
    /// quantity is zero, the price is negative, or the order total would no
    /// longer fit in an `i64`.
    pub fn add_item(
        &self,
        sku: &str,
        quantity: u32,
        unit_price_cents: i64,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.require(OrderStatus::Open, "add items to")?;
        if quantity == 0 {
            return Err(DomainError::Validation("quantity must be positive".into()));
        }
        if unit_price_cents < 0 {
            return Err(DomainError::Validation("unit price must not be negative".into()));
        }
        let line = OrderLine {
            sku: sku.to_owned(),
            quantity,
            unit_price_cents,
        };
        self.total_cents()
            .zip(line.total_cents())
            .and_then(|(total, line_total)| total.checked_add(line_total))
            .ok_or_else(|| DomainError::Validation("order total is too large".into()))?;
        Ok(vec![OrderEvent::ItemAdded {
            sku: line.sku,
            quantity,
            unit_price_cents,
        }])
    }

    /// Submits the order for checkout, fixing its total.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order is not open or empty.
    pub fn place(&self) -> Result<Vec<OrderEvent>, DomainError> {
        self.require(OrderStatus::Open, "place")?;
        if self.lines.is_empty() {
            return Err(DomainError::Validation("cannot place an empty order".into()));
        }
        let total_cents = self
            .total_cents()
            .ok_or_else(|| DomainError::Validation("order total is too large".into()))?;
        Ok(vec![OrderEvent::Placed { total_cents }])
    }

    /// Finalizes a placed order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order is not placed.
    pub fn confirm(&self) -> Result<Vec<OrderEvent>, DomainError> {
        self.require(OrderStatus::Placed, "confirm")?;
        Ok(vec![OrderEvent::Confirmed])
    }

    /// Cancels the order. Cancelling a cancelled order produces no events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order is confirmed.
    pub fn cancel(&self, reason: &str) -> Result<Vec<OrderEvent>, DomainError> {
        match self.status {
            OrderStatus::Cancelled => Ok(Vec::new()),
            OrderStatus::Confirmed => Err(DomainError::Validation(
                "cannot cancel a confirmed order".into(),
            )),
            OrderStatus::Draft | OrderStatus::Open | OrderStatus::Placed => {
                Ok(vec![OrderEvent::Cancelled {
                    reason: reason.to_owned(),
                }])
            }
        }
    }

    fn require(&self, status: OrderStatus, action: &str) -> Result<(), DomainError> {
        if self.status == status {
            Ok(())
        } else {
            Err(DomainError::Validation(format!(
                "cannot {action} an order in status {:?}",
                self.status
            )))
        }
    }
}

impl Aggregate for Order {
    const STREAM_TYPE: &'static str = "Order";
    type Event = OrderEvent;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Created {
                order_id,
                customer_id,
            } => {
                self.order_id = Some(*order_id);
                self.customer_id = Some(*customer_id);
                self.status = OrderStatus::Open;
            }
            OrderEvent::ItemAdded {
                sku,
                quantity,
                unit_price_cents,
            } => self.lines.push(OrderLine {
                sku: sku.clone(),
                quantity: *quantity,
                unit_price_cents: *unit_price_cents,
            }),
            OrderEvent::Placed { total_cents } => {
                self.placed_total_cents = Some(*total_cents);
                self.status = OrderStatus::Placed;
            }
            OrderEvent::Confirmed => self.status = OrderStatus::Confirmed,
            OrderEvent::Cancelled { reason } => {
                self.cancellation_reason = Some(reason.clone());
                self.status = OrderStatus::Cancelled;
            }
        }
    }
}

/// Lifecycle of a payment authorization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Nothing authorized yet.
    #[default]
    Pending,
    /// Funds are reserved.
    Authorized,
    /// The reservation was released.
    Voided,
}

/// State of a payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// The order being paid for.
    pub order_id: Option<Uuid>,
    /// Amount reserved in cents.
    pub amount_cents: i64,
    /// Current lifecycle status.
    pub status: PaymentStatus,
}

impl Payment {
    /// Reserves `amount_cents` for an order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the payment was already used,
    /// the amount is not positive, or it exceeds `available_cents`.
    pub fn authorize(
        &self,
        order_id: Uuid,
        amount_cents: i64,
        available_cents: i64,
    ) -> Result<Vec<PaymentEvent>, DomainError> {
        if self.status != PaymentStatus::Pending {
            return Err(DomainError::Validation(format!(
                "payment for order {order_id} already {:?}",
                self.status
            )));
        }
        if amount_cents <= 0 {
            return Err(DomainError::Validation("amount must be positive".into()));
        }
        if amount_cents > available_cents {
            return Err(DomainError::Validation(format!(
                "insufficient funds: {amount_cents} requested, {available_cents} available"
            )));
        }
        Ok(vec![PaymentEvent::Authorized {
            order_id,
            amount_cents,
        }])
    }

    /// Releases an authorization. Voiding a payment that holds no funds
    /// produces no events.
    ///
    /// # Errors
    ///
    /// Currently infallible.
    pub fn void(&self, reason: &str) -> Result<Vec<PaymentEvent>, DomainError> {
        if self.status == PaymentStatus::Authorized {
            Ok(vec![PaymentEvent::Voided {
                reason: reason.to_owned(),
            }])
        } else {
            Ok(Vec::new())
        }
    }
}

impl Aggregate for Payment {
    const STREAM_TYPE: &'static str = "Payment";
    type Event = PaymentEvent;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentEvent::Authorized {
                order_id,
                amount_cents,
            } => {
                self.order_id = Some(*order_id);
                self.amount_cents = *amount_cents;
                self.status = PaymentStatus::Authorized;
            }
            PaymentEvent::Voided { .. } => self.status = PaymentStatus::Voided,
        }
    }
}
