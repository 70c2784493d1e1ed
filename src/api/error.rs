//! API error types and user-facing copy.
//!
//! Three layers, most specific wins:
//! 1. server-supplied `message`
//! 2. domain `code` copy (`SECURITY_00x`, invite flow, role)
//! 3. status-keyed default copy
//!
//! Network failures (no response) get the connectivity message.

use serde::Deserialize;

/// Backend error body: `{"code": "...", "message": "..."}`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Domain error codes the client reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid token.
    Security001,
    /// Expired token.
    Security002,
    /// Access to another family's data.
    Security003,
    RoleRequired,
    InviteExpired,
    InviteNotFound,
    AlreadyMember,
    Other(String),
}

impl ErrorCode {
    pub fn parse(code: &str) -> Self {
        match code {
            "SECURITY_001" => Self::Security001,
            "SECURITY_002" => Self::Security002,
            "SECURITY_003" => Self::Security003,
            "ROLE_REQUIRED" => Self::RoleRequired,
            "INVITE_EXPIRED" => Self::InviteExpired,
            "INVITE_NOT_FOUND" => Self::InviteNotFound,
            "ALREADY_MEMBER" => Self::AlreadyMember,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Security001 => "SECURITY_001",
            Self::Security002 => "SECURITY_002",
            Self::Security003 => "SECURITY_003",
            Self::RoleRequired => "ROLE_REQUIRED",
            Self::InviteExpired => "INVITE_EXPIRED",
            Self::InviteNotFound => "INVITE_NOT_FOUND",
            Self::AlreadyMember => "ALREADY_MEMBER",
            Self::Other(code) => code,
        }
    }

    /// Copy for codes that have dedicated wording.
    pub fn default_message(&self) -> Option<&'static str> {
        match self {
            Self::Security001 => Some("Your sign-in is no longer valid. Please sign in again."),
            Self::Security002 => Some("Your session has expired. Please sign in again."),
            Self::Security003 => Some("You do not have access to this family's information."),
            Self::RoleRequired => Some("Choose your role before continuing."),
            Self::InviteExpired => Some("This invitation has expired. Ask for a new invite link."),
            Self::InviteNotFound => Some("This invitation could not be found."),
            Self::AlreadyMember => Some("You are already a member of this family group."),
            Self::Other(_) => None,
        }
    }
}

/// Errors from REST calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}{}", .code.as_ref().map(|c| format!(" ({})", c.as_str())).unwrap_or_default())]
    Status {
        status: u16,
        code: Option<ErrorCode>,
        message: Option<String>,
    },
    #[error("Unexpected response body: {0}")]
    Decode(String),
    #[error("Not signed in")]
    NotAuthenticated,
}

impl ApiError {
    /// Build a status error from a raw body (JSON or not).
    pub fn from_status(status: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        Self::Status {
            status,
            code: parsed.code.as_deref().map(ErrorCode::parse),
            message: parsed.message.filter(|m| !m.trim().is_empty()),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::NotAuthenticated => Some(401),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Status { code, .. } => code.as_ref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Message suitable for a toast.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Unable to reach the server. Check your connection.".into(),
            Self::Decode(_) => "The server sent an unexpected response.".into(),
            Self::NotAuthenticated => status_message(401).into(),
            Self::Status {
                status,
                code,
                message,
            } => message
                .clone()
                .or_else(|| {
                    code.as_ref()
                        .and_then(|c| c.default_message())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| status_message(*status).to_string()),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::Status {
                status: status.as_u16(),
                code: None,
                message: None,
            }
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Default copy per HTTP status.
pub fn status_message(status: u16) -> &'static str {
    match status {
        400 => "The request could not be processed.",
        401 => "Your session has expired. Please sign in again.",
        403 => "You do not have permission to do that.",
        404 => "The requested information could not be found.",
        409 => "This conflicts with a recent change. Refresh and try again.",
        429 => "Too many requests. Please wait a moment.",
        500 => "A server error occurred. Please try again later.",
        502..=504 => "The service is temporarily unavailable.",
        _ => "Something went wrong. Please try again.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_wins() {
        let err = ApiError::from_status(
            400,
            r#"{"code":"INVITE_EXPIRED","message":"Invite 3 expired yesterday"}"#,
        );
        assert_eq!(err.user_message(), "Invite 3 expired yesterday");
        assert_eq!(err.code(), Some(&ErrorCode::InviteExpired));
    }

    #[test]
    fn code_copy_beats_status_copy() {
        let err = ApiError::from_status(403, r#"{"code":"SECURITY_003"}"#);
        assert_eq!(
            err.user_message(),
            "You do not have access to this family's information."
        );
    }

    #[test]
    fn status_copy_for_plain_body() {
        let err = ApiError::from_status(503, "<html>bad gateway</html>");
        assert!(err.code().is_none());
        assert_eq!(err.user_message(), "The service is temporarily unavailable.");
    }

    #[test]
    fn blank_server_message_ignored() {
        let err = ApiError::from_status(404, r#"{"message":"  "}"#);
        assert_eq!(err.user_message(), status_message(404));
    }

    #[test]
    fn network_error_copy() {
        let err = ApiError::Network("connection refused".into());
        assert!(err.user_message().contains("connection"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn unknown_code_kept_verbatim() {
        let err = ApiError::from_status(422, r#"{"code":"MED_DUPLICATE"}"#);
        assert_eq!(err.code().unwrap().as_str(), "MED_DUPLICATE");
        assert_eq!(err.to_string(), "HTTP 422 (MED_DUPLICATE)");
    }

    #[test]
    fn not_authenticated_counts_as_401() {
        assert!(ApiError::NotAuthenticated.is_unauthorized());
    }
}
