//! Keel — Order & Payment bounded context.
//!
//! Responsible for order lifecycle, payment authorization, and the checkout
//! saga that ties the two together.

pub mod application;
pub mod domain;
