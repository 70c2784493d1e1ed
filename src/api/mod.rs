//! REST client for the AMApill backend.
//!
//! `ApiClient` attaches the bearer token, decodes JSON, and routes every
//! failure through the `ErrorInterceptor` (401 → logout + login route).
//! Endpoint groups are traits so stores can be tested against mocks.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod interceptor;

pub use client::ApiClient;
pub use endpoints::auth::{AuthApi, AuthEndpoints, LoginResponse, SessionTokens};
pub use endpoints::medication_logs::MedicationLogApi;
pub use endpoints::notifications::NotificationApi;
pub use error::{ApiError, ErrorCode};
pub use interceptor::{ErrorInterceptor, ErrorOutcome};
