//! Request middleware: authentication and metrics.

pub mod auth;
pub mod metrics;

pub use auth::{auth_middleware, BearerToken, Identity};
pub use metrics::{metrics_middleware, Metrics};
