//! Adapters for the domain ports: storage backends and payment gateways.

pub mod in_memory;
pub mod razorpay;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox;
