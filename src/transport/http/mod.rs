pub mod router;
pub mod types;
pub mod handlers {
    pub mod common;
    pub mod execute;
    pub mod health;
}

pub use router::create_router;
pub use types::AppState;
