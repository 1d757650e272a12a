//! Application services: command and query handlers, and the checkout saga.

pub mod checkout;
pub mod command_handlers;
pub mod query_handlers;
