//! service-core: Shared observability and middleware for the newsletter frontend.
pub mod middleware;
pub mod observability;

pub use axum;
pub use tracing;
