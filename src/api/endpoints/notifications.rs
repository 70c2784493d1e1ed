//! Notification endpoints.
//!
//! - `GET /notifications`: newest first
//! - `PATCH /notifications/{id}/read`

use async_trait::async_trait;

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::models::Notification;

#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list_notifications(&self) -> Result<Vec<Notification>, ApiError>;
    async fn mark_read(&self, id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl NotificationApi for ApiClient {
    async fn list_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.get("notifications", &[]).await
    }

    async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        self.patch::<(), ()>(&format!("notifications/{id}/read"), None)
            .await
    }
}
