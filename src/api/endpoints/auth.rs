//! Auth endpoints.
//!
//! - `POST /auth/refresh`: exchange a refresh token for a new pair
//! - `POST /auth/kakao/login`: exchange a Kakao authorization code
//!
//! These run without the interceptor: a failed refresh is reported to the
//! session manager, which decides whether the user must sign in again.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::api::client::execute;
use crate::api::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Result of a login exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: SessionTokens,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
    #[serde(default)]
    pub role: Option<String>,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, ApiError>;
    async fn kakao_login(&self, code: &str, redirect_uri: &str) -> Result<LoginResponse, ApiError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KakaoLoginRequest<'a> {
    code: &'a str,
    redirect_uri: &'a str,
}

/// Unauthenticated auth endpoints.
pub struct AuthEndpoints {
    base_url: String,
    http: reqwest::Client,
}

impl AuthEndpoints {
    pub fn new(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }
}

#[async_trait]
impl AuthApi for AuthEndpoints {
    async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, ApiError> {
        let url = format!("{}/auth/refresh", self.base_url);
        let request = self.http.post(&url).json(&RefreshRequest { refresh_token });
        execute(&Method::POST, &url, request).await
    }

    async fn kakao_login(&self, code: &str, redirect_uri: &str) -> Result<LoginResponse, ApiError> {
        let url = format!("{}/auth/kakao/login", self.base_url);
        let request = self
            .http
            .post(&url)
            .json(&KakaoLoginRequest { code, redirect_uri });
        execute(&Method::POST, &url, request).await
    }
}
