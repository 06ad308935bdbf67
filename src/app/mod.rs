pub mod database_service;
pub mod pipeline;

pub use database_service::DatabaseService;
pub use pipeline::{Pipeline, QueryExecutor};
