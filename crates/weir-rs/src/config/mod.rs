//! Gateway configuration loading.

pub mod settings;
