//! HTTP surface: routes, handlers, middleware, wire models.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::{create_router, AppState};
