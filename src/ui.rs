//! UI side-effect seams: toasts and navigation.
//!
//! The library never renders. It hands `Toast`s to a `ToastSink` and
//! `Route`s to a `Navigator`; the shell decides how to show them.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::models::Severity;

/// Navigation targets referenced by events and errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    Login,
    Home,
    RoleSelect,
    Notifications,
    TodayMedications,
    FamilyGroup,
    OcrResult { job_id: String },
    DietResult { job_id: String },
    ChatRoom { room_id: String },
}

impl Route {
    /// Path as the router knows it.
    pub fn path(&self) -> String {
        match self {
            Self::Login => "/login".into(),
            Self::Home => "/".into(),
            Self::RoleSelect => "/role".into(),
            Self::Notifications => "/notifications".into(),
            Self::TodayMedications => "/medication/today".into(),
            Self::FamilyGroup => "/family".into(),
            Self::OcrResult { job_id } => format!("/ocr/result/{job_id}"),
            Self::DietResult { job_id } => format!("/diet/result/{job_id}"),
            Self::ChatRoom { room_id } => format!("/chat/{room_id}"),
        }
    }
}

/// Clickable toast action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastAction {
    pub label: String,
    pub route: Route,
}

/// A transient message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub severity: Severity,
    pub message: String,
    pub action: Option<ToastAction>,
}

impl Toast {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            action: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn with_action(mut self, label: impl Into<String>, route: Route) -> Self {
        self.action = Some(ToastAction {
            label: label.into(),
            route,
        });
        self
    }
}

pub trait ToastSink: Send + Sync {
    fn show(&self, toast: Toast);
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

// ═══════════════════════════════════════════════════════════
// Implementations
// ═══════════════════════════════════════════════════════════

/// Logs toasts instead of rendering them (headless shells).
pub struct TracingToastSink;

impl ToastSink for TracingToastSink {
    fn show(&self, toast: Toast) {
        let action = toast.action.as_ref().map(|a| a.route.path());
        match toast.severity {
            Severity::Error => tracing::error!(message = %toast.message, ?action, "toast"),
            Severity::Warning => tracing::warn!(message = %toast.message, ?action, "toast"),
            _ => tracing::info!(
                severity = %toast.severity,
                message = %toast.message,
                ?action,
                "toast"
            ),
        }
    }
}

/// Logs navigation requests.
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, route: Route) {
        tracing::info!(path = %route.path(), "navigate");
    }
}

/// Collects toasts in memory, in order.
#[derive(Default)]
pub struct RecordingToasts {
    shown: Mutex<Vec<Toast>>,
}

impl RecordingToasts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<Toast> {
        self.shown.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl ToastSink for RecordingToasts {
    fn show(&self, toast: Toast) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.push(toast);
        }
    }
}

/// Collects navigation requests in memory, in order.
#[derive(Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<Route> {
        self.visited.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        if let Ok(mut visited) = self.visited.lock() {
            visited.push(route);
        }
    }
}
