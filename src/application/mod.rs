//! Application layer: the checkout services and the `CheckoutEngine` that wires them.
//!
//! Each service performs at most one conditional ledger write per call, so a request never
//! holds a payment open across a gateway round trip.

pub mod engine;
pub mod enrollment;
pub mod issuance;
pub mod refund;
pub mod verification;
