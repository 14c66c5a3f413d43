//! Request-path middleware for the weir-rs core.
//!
//! - [`rate_limit`] - The admission filter applied to every public request

pub mod rate_limit;
