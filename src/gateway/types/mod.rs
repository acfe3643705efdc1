//! Gateway types module
//!
//! - [`ApiResponse<T>`]: Unified API response wrapper
//! - [`ApiError`] / [`ApiResult`]: handler error path
//! - [`WebhookAck`]: payment webhook acknowledgement

pub mod response;

pub use response::{ApiError, ApiResponse, ApiResult, WebhookAck, error_codes, ok};
