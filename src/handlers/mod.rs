//! HTTP handlers. Each one validates its request, calls the
//! [`StorageGateway`](crate::services::gateway::StorageGateway) and answers
//! with the JSON envelope, a redirect or a byte stream.

pub mod file_handlers;
pub mod health_handlers;

use crate::errors::AppError;

/// Fallback for routes hit with an unsupported method.
pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}
