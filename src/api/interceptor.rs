//! Cross-cutting response handling.
//!
//! Successful responses pass through untouched. Errors are classified by
//! status and backend `code` into an `ErrorOutcome`; the interceptor then
//! applies it. This is rule dispatch only: nothing is retried.

use std::sync::Arc;

use crate::api::error::{ApiError, ErrorCode};
use crate::ui::{Navigator, Route, Toast, ToastSink};

/// What the client does globally about one failed request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorOutcome {
    pub toast: Option<Toast>,
    pub navigate: Option<Route>,
    /// Clear stored credentials.
    pub end_session: bool,
}

/// Classify an error. Pure; no side effects.
///
/// Only cross-cutting cases produce an outcome. Anything else is left to
/// the caller, which shows `ApiError::user_message` locally.
pub fn classify(err: &ApiError) -> ErrorOutcome {
    let message = err.user_message();

    match err.code() {
        Some(ErrorCode::Security001) | Some(ErrorCode::Security002) => {
            return ErrorOutcome {
                toast: Some(Toast::warning(message)),
                navigate: Some(Route::Login),
                end_session: true,
            }
        }
        Some(ErrorCode::Security003) => {
            return ErrorOutcome {
                toast: Some(Toast::error(message)),
                navigate: Some(Route::Home),
                end_session: false,
            }
        }
        Some(ErrorCode::RoleRequired) => {
            return ErrorOutcome {
                toast: Some(Toast::info(message)),
                navigate: Some(Route::RoleSelect),
                end_session: false,
            }
        }
        Some(ErrorCode::InviteExpired)
        | Some(ErrorCode::InviteNotFound)
        | Some(ErrorCode::AlreadyMember) => {
            return ErrorOutcome {
                toast: Some(Toast::warning(message)),
                navigate: None,
                end_session: false,
            }
        }
        Some(ErrorCode::Other(_)) | None => {}
    }

    if err.is_unauthorized() {
        return ErrorOutcome {
            toast: Some(Toast::warning(message)),
            navigate: Some(Route::Login),
            end_session: true,
        };
    }

    match err.status() {
        Some(status) if status >= 500 => ErrorOutcome {
            toast: Some(Toast::error(message)),
            ..ErrorOutcome::default()
        },
        _ => ErrorOutcome::default(),
    }
}

/// Applies classified outcomes to the UI seams.
#[derive(Clone)]
pub struct ErrorInterceptor {
    toasts: Arc<dyn ToastSink>,
    navigator: Arc<dyn Navigator>,
}

impl ErrorInterceptor {
    pub fn new(toasts: Arc<dyn ToastSink>, navigator: Arc<dyn Navigator>) -> Self {
        Self { toasts, navigator }
    }

    /// Show the toast and navigate. Returns the outcome so the caller can
    /// end the session when asked to.
    pub fn handle(&self, err: &ApiError) -> ErrorOutcome {
        let outcome = classify(err);
        if outcome.toast.is_none() && outcome.navigate.is_none() && !outcome.end_session {
            return outcome;
        }

        tracing::warn!(
            error = %err,
            end_session = outcome.end_session,
            navigate = ?outcome.navigate.as_ref().map(Route::path),
            "API error intercepted"
        );
        if let Some(toast) = &outcome.toast {
            self.toasts.show(toast.clone());
        }
        if let Some(route) = &outcome.navigate {
            self.navigator.navigate(route.clone());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use crate::ui::{RecordingNavigator, RecordingToasts};

    #[test]
    fn unauthorized_ends_session_and_redirects() {
        let outcome = classify(&ApiError::from_status(401, ""));
        assert!(outcome.end_session);
        assert_eq!(outcome.navigate, Some(Route::Login));
        assert_eq!(outcome.toast.unwrap().severity, Severity::Warning);
    }

    #[test]
    fn expired_token_code_redirects_even_on_403() {
        let outcome = classify(&ApiError::from_status(403, r#"{"code":"SECURITY_002"}"#));
        assert!(outcome.end_session);
        assert_eq!(outcome.navigate, Some(Route::Login));
    }

    #[test]
    fn role_required_goes_to_role_select() {
        let outcome = classify(&ApiError::from_status(403, r#"{"code":"ROLE_REQUIRED"}"#));
        assert!(!outcome.end_session);
        assert_eq!(outcome.navigate, Some(Route::RoleSelect));
    }

    #[test]
    fn invite_codes_only_toast() {
        let outcome = classify(&ApiError::from_status(410, r#"{"code":"INVITE_EXPIRED"}"#));
        assert_eq!(outcome.navigate, None);
        assert_eq!(outcome.toast.unwrap().severity, Severity::Warning);
    }

    #[test]
    fn server_errors_toast_error() {
        let outcome = classify(&ApiError::from_status(500, ""));
        assert_eq!(outcome.toast.unwrap().severity, Severity::Error);
        assert!(!outcome.end_session);
    }

    #[test]
    fn plain_client_errors_left_to_caller() {
        assert_eq!(classify(&ApiError::from_status(404, "")), ErrorOutcome::default());
        assert_eq!(
            classify(&ApiError::Network("refused".into())),
            ErrorOutcome::default()
        );
    }

    #[test]
    fn handle_applies_toast_and_navigation() {
        let toasts = Arc::new(RecordingToasts::new());
        let nav = Arc::new(RecordingNavigator::new());
        let interceptor = ErrorInterceptor::new(toasts.clone(), nav.clone());

        interceptor.handle(&ApiError::from_status(401, ""));
        interceptor.handle(&ApiError::from_status(404, ""));

        assert_eq!(toasts.shown().len(), 1);
        assert_eq!(nav.visited(), vec![Route::Login]);
    }
}
