//! Kakao OAuth redirect flow.
//!
//! `authorize_url` stores a one-time random state and returns the
//! provider URL. `handle_callback` validates the redirect against that
//! state before any code exchange; every rejection shows an error toast
//! and returns to the login screen.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::Url;

use crate::api::{ApiError, AuthApi, LoginResponse};
use crate::config::{KakaoConfig, KAKAO_AUTHORIZE_URL};
use crate::session::{SessionError, SessionManager};
use crate::storage::{KeyValueStore, StorageError, StorageKey};
use crate::ui::{Navigator, Route, Toast, ToastSink};

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Kakao login was cancelled or refused: {0}")]
    ProviderDenied(String),
    #[error("Kakao callback carried no authorization code")]
    MissingCode,
    #[error("No pending Kakao login; start again")]
    MissingState,
    #[error("Kakao login state did not match")]
    StateMismatch,
    #[error("Invalid callback URL: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Exchange(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OAuthError {
    pub fn user_message(&self) -> String {
        match self {
            Self::ProviderDenied(_) => "Kakao login was cancelled.".into(),
            Self::MissingCode | Self::MissingState | Self::StateMismatch | Self::InvalidUrl(_) => {
                "Kakao login could not be verified. Please try again.".into()
            }
            Self::Exchange(e) => e.user_message(),
            Self::Session(_) | Self::Storage(_) => "Could not save your login. Please try again.".into(),
        }
    }
}

/// Query parameters of the redirect back from Kakao.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackQuery {
    pub fn from_url(url: &str) -> Result<Self, OAuthError> {
        let url = Url::parse(url).map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;
        let mut query = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match &*key {
                "code" => &mut query.code,
                "state" => &mut query.state,
                "error" => &mut query.error,
                "error_description" => &mut query.error_description,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        Ok(query)
    }
}

pub struct KakaoOAuth {
    config: KakaoConfig,
    auth: Arc<dyn AuthApi>,
    session: Arc<SessionManager>,
    toasts: Arc<dyn ToastSink>,
    navigator: Arc<dyn Navigator>,
}

impl KakaoOAuth {
    pub fn new(
        config: KakaoConfig,
        auth: Arc<dyn AuthApi>,
        session: Arc<SessionManager>,
        toasts: Arc<dyn ToastSink>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            config,
            auth,
            session,
            toasts,
            navigator,
        }
    }

    fn storage(&self) -> &Arc<dyn KeyValueStore> {
        self.session.storage()
    }

    /// Provider URL to send the user to. Replaces any pending state.
    pub fn authorize_url(&self) -> Result<String, OAuthError> {
        let state = new_state();
        self.storage().set(StorageKey::KakaoOAuthState, &state)?;

        let url = Url::parse_with_params(
            KAKAO_AUTHORIZE_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;
        Ok(url.into())
    }

    /// Finish the redirect: validate, exchange, persist, navigate.
    pub async fn handle_callback(&self, query: &CallbackQuery) -> Result<LoginResponse, OAuthError> {
        match self.exchange(query).await {
            Ok(login) => {
                let route = if login.role.is_some() {
                    Route::Home
                } else {
                    Route::RoleSelect
                };
                tracing::info!(route = %route.path(), "Kakao login complete");
                self.navigator.navigate(route);
                Ok(login)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Kakao login rejected");
                self.toasts.show(Toast::error(e.user_message()));
                self.navigator.navigate(Route::Login);
                Err(e)
            }
        }
    }

    async fn exchange(&self, query: &CallbackQuery) -> Result<LoginResponse, OAuthError> {
        if let Some(error) = &query.error {
            return Err(OAuthError::ProviderDenied(
                query.error_description.clone().unwrap_or_else(|| error.clone()),
            ));
        }
        let code = query
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(OAuthError::MissingCode)?;

        // The stored state is single use, matched or not.
        let expected = self
            .storage()
            .get(StorageKey::KakaoOAuthState)?
            .ok_or(OAuthError::MissingState)?;
        self.storage().remove(StorageKey::KakaoOAuthState)?;
        if query.state.as_deref() != Some(expected.as_str()) {
            return Err(OAuthError::StateMismatch);
        }

        let login = self.auth.kakao_login(code, &self.config.redirect_uri).await?;
        self.session.store_login(&login)?;
        Ok(login)
    }
}

fn new_state() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
