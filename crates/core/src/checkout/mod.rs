//! Checkout: order creation, payment verification and the buyer-side flow.
//!
//! The server runs [`OrderCoordinator`] and [`PaymentVerifier`] behind
//! [`CheckoutService`]. Buyers are driven by a [`CheckoutController`] talking
//! to any [`CheckoutBackend`], in-process or over HTTP.

mod backend;
mod controller;
mod error;
mod http_backend;
mod order;
mod service;
mod types;
mod verifier;
pub mod wire;

pub use backend::CheckoutBackend;
pub use controller::{
    sanitize_mobile, CheckoutController, CheckoutFailure, CheckoutPhase, ControllerError,
    FailureKind,
};
pub use error::{CheckoutError, VerifyError};
pub use http_backend::HttpCheckoutBackend;
pub use order::OrderCoordinator;
pub use service::CheckoutService;
pub use types::{CheckoutSession, Order, Verification};
pub use verifier::PaymentVerifier;
