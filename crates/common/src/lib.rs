//! Shared foundation for the Courier notification service: domain types,
//! the common error enum, environment configuration, and connection
//! construction for the backing stores.

pub mod config;
pub mod error;
pub mod pool;
pub mod types;
