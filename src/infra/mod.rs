pub mod config;
pub mod connection;

pub use connection::{ConnectionConfig, ConnectionManager, LogVerbosity, RetryPolicy};
