//! Data models and domain types for the weir-rs rate-limit core.
//!
//! # Module Organization
//!
//! - [`rule`] - Rate-limit policies and identifier-source configuration
//! - [`decision`] - Decision results and the published event record
//! - [`error`] - Core and admin error types with HTTP response mapping
//! - [`settings`] - Gateway runtime configuration

pub mod decision;
pub mod error;
pub mod rule;
pub mod settings;
