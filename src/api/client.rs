use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::interceptor::ErrorInterceptor;
use crate::session::SessionManager;

/// Build the shared HTTP client.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, ApiError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("amapill-client/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {e}")))
}

/// Client for long-lived streaming responses: connect timeout only.
pub fn build_stream_client() -> Result<reqwest::Client, ApiError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("amapill-client/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ApiError::Network(format!("Failed to create stream client: {e}")))
}

/// Send a request and decode a JSON body.
///
/// Non-2xx responses become `ApiError::Status` with the backend
/// `code`/`message` parsed out. Empty bodies decode as JSON `null`, so
/// `()` and `Option<T>` work for 204 responses.
pub(crate) async fn execute<T: DeserializeOwned>(
    method: &Method,
    url: &str,
    request: RequestBuilder,
) -> Result<T, ApiError> {
    let start = Instant::now();
    let response = request.send().await.map_err(|e| {
        tracing::warn!(%method, url, error = %e, "Request failed before response");
        ApiError::from(e)
    })?;

    let status = response.status();
    tracing::debug!(
        %method,
        url,
        status = status.as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "API response"
    );

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::from_status(status.as_u16(), &body));
    }

    let text = response.text().await?;
    let raw = if text.trim().is_empty() { "null" } else { text.as_str() };
    serde_json::from_str(raw).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Authenticated REST client.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    session: Arc<SessionManager>,
    interceptor: ErrorInterceptor,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        http: reqwest::Client,
        session: Arc<SessionManager>,
        interceptor: ErrorInterceptor,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            session,
            interceptor,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.send::<T, ()>(Method::GET, path, query, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        self.send(Method::PATCH, path, &[], body).await
    }

    /// Send with the stored bearer token; errors pass through the interceptor.
    pub async fn send<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut request = self.http.request(method.clone(), &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        match self.session.access_token() {
            Ok(Some(token)) => request = request.bearer_auth(token),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Cannot read stored token"),
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let result = execute(&method, &url, request).await;
        if let Err(err) = &result {
            self.intercept(err);
        }
        result
    }

    fn intercept(&self, err: &ApiError) {
        let outcome = self.interceptor.handle(err);
        if outcome.end_session {
            if let Err(e) = self.session.logout() {
                tracing::error!(error = %e, "Failed to clear session after auth error");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};

    use crate::session::tests::{session_with, MockAuthApi};
    use crate::storage::StorageKey;
    use crate::ui::{RecordingNavigator, RecordingToasts, Route};

    /// Serve `router` on an ephemeral local port.
    pub(crate) async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    pub(crate) struct Harness {
        pub client: ApiClient,
        pub toasts: Arc<RecordingToasts>,
        pub nav: Arc<RecordingNavigator>,
    }

    pub(crate) fn harness(addr: SocketAddr, token: Option<&str>) -> Harness {
        let toasts = Arc::new(RecordingToasts::new());
        let nav = Arc::new(RecordingNavigator::new());
        let session = session_with(token, Arc::new(MockAuthApi::new("unused")));
        let client = ApiClient::new(
            &format!("http://{addr}/api/"),
            build_http_client(5).unwrap(),
            session,
            ErrorInterceptor::new(toasts.clone(), nav.clone()),
        );
        Harness { client, toasts, nav }
    }

    async fn whoami(headers: HeaderMap) -> Json<serde_json::Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        Json(serde_json::json!({ "authorization": auth }))
    }

    #[tokio::test]
    async fn attaches_bearer_token() {
        let addr = serve(Router::new().route("/api/me", get(whoami))).await;
        let h = harness(addr, Some("token-1"));

        let body: serde_json::Value = h.client.get("/me", &[]).await.unwrap();
        assert_eq!(body["authorization"], "Bearer token-1");
    }

    #[tokio::test]
    async fn unauthorized_logs_out_and_redirects() {
        let router = Router::new().route(
            "/api/me",
            get(|| async { (StatusCode::UNAUTHORIZED, r#"{"code":"SECURITY_001"}"#) }),
        );
        let addr = serve(router).await;
        let h = harness(addr, Some("stale"));

        let err = h.client.get::<serde_json::Value>("me", &[]).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!h.client.session().is_authenticated());
        assert!(h
            .client
            .session()
            .storage()
            .get(StorageKey::RefreshToken)
            .unwrap()
            .is_none());
        assert_eq!(h.nav.visited(), vec![Route::Login]);
        assert_eq!(h.toasts.shown().len(), 1);
    }

    #[tokio::test]
    async fn not_found_is_left_to_caller() {
        let addr = serve(Router::new()).await;
        let h = harness(addr, Some("t"));

        let err = h.client.get::<serde_json::Value>("missing", &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(h.toasts.shown().is_empty());
        assert!(h.client.session().is_authenticated());
    }

    #[tokio::test]
    async fn empty_body_decodes_as_unit() {
        let router = Router::new().route(
            "/api/ping",
            axum::routing::patch(|| async { StatusCode::NO_CONTENT }),
        );
        let addr = serve(router).await;
        let h = harness(addr, None);

        h.client.patch::<(), ()>("ping", None).await.unwrap();
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let h = harness(addr, Some("t"));

        let err = h.client.get::<serde_json::Value>("me", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert!(h.toasts.shown().is_empty());
    }
}
