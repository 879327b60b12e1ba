//! HTTP surface: router, health, and room lookup

pub mod routes;

pub use routes::{build_router, AppError};
