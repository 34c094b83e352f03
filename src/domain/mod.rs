//! Domain layer: the Payment state machine, entitlements, and the ports the services talk to.

pub mod enrollment;
pub mod gateway;
pub mod money;
pub mod payment;
pub mod ports;
pub mod signature;
