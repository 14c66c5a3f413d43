//! Logging setup for the weir-rs gateway.

pub mod logger;
