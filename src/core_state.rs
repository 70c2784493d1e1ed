//! Client state container.
//!
//! `ClientState` builds every store and service once from a
//! `ClientConfig` and hands out shared references. A shell creates one
//! per signed-in window; nothing in the crate is a global.
//!
//! When the session ends, through `logout` or from the server side,
//! cached user data is dropped and the event stream is closed.

use std::sync::Arc;

use crate::api::client::{build_http_client, build_stream_client};
use crate::api::{ApiClient, ApiError, AuthEndpoints, ErrorInterceptor};
use crate::config::ClientConfig;
use crate::events::{HttpStreamConnector, IntentApplier, RealtimeNotifications, StreamConnector};
use crate::medication_logs::MedicationLogStore;
use crate::notifications::NotificationStore;
use crate::oauth::KakaoOAuth;
use crate::session::{SessionError, SessionManager};
use crate::storage::{KeyValueStore, StorageError, StorageKey};
use crate::ui::{Navigator, ToastSink};

pub struct ClientState {
    config: ClientConfig,
    storage: Arc<dyn KeyValueStore>,
    session: Arc<SessionManager>,
    api: Arc<ApiClient>,
    notifications: Arc<NotificationStore>,
    logs: Arc<MedicationLogStore>,
    realtime: RealtimeNotifications,
    oauth: Option<KakaoOAuth>,
}

impl ClientState {
    /// Build against the configured backend and event stream.
    pub fn new(
        config: ClientConfig,
        storage: Arc<dyn KeyValueStore>,
        toasts: Arc<dyn ToastSink>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let connector = Arc::new(HttpStreamConnector::new(
            &config.events_base_url,
            build_stream_client()?,
        ));
        Self::with_connector(config, storage, toasts, navigator, connector)
    }

    /// Build with a caller-supplied event stream connector.
    pub fn with_connector(
        config: ClientConfig,
        storage: Arc<dyn KeyValueStore>,
        toasts: Arc<dyn ToastSink>,
        navigator: Arc<dyn Navigator>,
        connector: Arc<dyn StreamConnector>,
    ) -> Result<Self, ApiError> {
        let http = build_http_client(config.request_timeout_secs)?;
        let auth = Arc::new(AuthEndpoints::new(&config.api_base_url, http.clone()));
        let session = Arc::new(SessionManager::new(
            storage.clone(),
            auth.clone(),
            config.token_refresh_margin_secs,
        ));

        let api = Arc::new(ApiClient::new(
            &config.api_base_url,
            http,
            session.clone(),
            ErrorInterceptor::new(toasts.clone(), navigator.clone()),
        ));
        let notifications = Arc::new(NotificationStore::new());
        let logs = Arc::new(MedicationLogStore::new(api.clone(), config.log_cache_dates));

        // Weak: the log store reaches the session through the API client.
        let ended_notifications = Arc::downgrade(&notifications);
        let ended_logs = Arc::downgrade(&logs);
        session.on_session_end(move || {
            if let Some(notifications) = ended_notifications.upgrade() {
                notifications.clear();
            }
            if let Some(logs) = ended_logs.upgrade() {
                logs.clear();
            }
        });

        let applier = IntentApplier::new(
            notifications.clone(),
            toasts.clone(),
            navigator.clone(),
            storage.clone(),
        )
        .with_session(session.clone())
        .with_logs(logs.clone());
        let realtime = RealtimeNotifications::new(connector, session.clone(), Arc::new(applier));

        let oauth = config.kakao.clone().map(|kakao| {
            KakaoOAuth::new(kakao, auth.clone(), session.clone(), toasts.clone(), navigator.clone())
        });

        tracing::info!(
            deployment = ?config.deployment,
            api = %config.api_base_url,
            events = %config.events_base_url,
            kakao = oauth.is_some(),
            "Client state initialised"
        );

        Ok(Self {
            config,
            storage,
            session,
            api,
            notifications,
            logs,
            realtime,
            oauth,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn notifications(&self) -> &Arc<NotificationStore> {
        &self.notifications
    }

    pub fn logs(&self) -> &Arc<MedicationLogStore> {
        &self.logs
    }

    pub fn realtime(&self) -> &RealtimeNotifications {
        &self.realtime
    }

    /// `None` when no Kakao client is configured.
    pub fn oauth(&self) -> Option<&KakaoOAuth> {
        self.oauth.as_ref()
    }

    pub async fn refresh_notifications(&self) -> Result<usize, ApiError> {
        self.notifications.refresh(self.api.as_ref()).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<bool, ApiError> {
        self.notifications.mark_as_read_remote(self.api.as_ref(), id).await
    }

    pub fn dev_mode(&self) -> bool {
        matches!(self.storage.get(StorageKey::DevMode), Ok(Some(v)) if v == "true")
    }

    pub fn set_dev_mode(&self, enabled: bool) -> Result<(), StorageError> {
        self.storage
            .set(StorageKey::DevMode, if enabled { "true" } else { "false" })
    }

    /// Close the stream, drop cached user data and clear the stored
    /// session. Memory is cleared even if storage fails.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.realtime.disconnect().await;
        self.logs.clear();
        self.notifications.clear();
        self.session.logout()
    }
}
