pub mod sql;

pub use sql::SqlExecutor;
