//! Utility modules: shared HTTP helpers and timeouts.

pub mod http;
pub mod timeout;
