//! Carries out planned intents against the client's subsystems.

use std::sync::Arc;

use crate::events::planner::Intent;
use crate::medication_logs::MedicationLogStore;
use crate::notifications::NotificationStore;
use crate::session::SessionManager;
use crate::storage::{KeyValueStore, KeyValueStoreExt};
use crate::ui::{Navigator, ToastSink};

pub struct IntentApplier {
    notifications: Arc<NotificationStore>,
    toasts: Arc<dyn ToastSink>,
    navigator: Arc<dyn Navigator>,
    storage: Arc<dyn KeyValueStore>,
    session: Option<Arc<SessionManager>>,
    logs: Option<Arc<MedicationLogStore>>,
}

impl IntentApplier {
    pub fn new(
        notifications: Arc<NotificationStore>,
        toasts: Arc<dyn ToastSink>,
        navigator: Arc<dyn Navigator>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            notifications,
            toasts,
            navigator,
            storage,
            session: None,
            logs: None,
        }
    }

    pub fn with_session(mut self, session: Arc<SessionManager>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_logs(mut self, logs: Arc<MedicationLogStore>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn notifications(&self) -> &Arc<NotificationStore> {
        &self.notifications
    }

    /// Apply one intent. Storage failures are logged, never propagated:
    /// a failed write must not stop the remaining intents of an event.
    pub fn apply(&self, intent: Intent) {
        match intent {
            Intent::ShowToast(toast) => self.toasts.show(toast),
            Intent::AddNotification(notification) => {
                self.notifications.add_realtime_notification(notification)
            }
            Intent::Navigate(route) => self.navigator.navigate(route),
            Intent::Persist { key, value } => {
                let result = match &value {
                    serde_json::Value::String(s) => self.storage.set(key, s),
                    other => self.storage.set_json(key, other),
                };
                if let Err(e) = result {
                    tracing::warn!(key = %key.key(), error = %e, "Failed to persist event state");
                }
            }
            Intent::InvalidateLogs(date) => {
                if let Some(logs) = &self.logs {
                    logs.invalidate(date);
                }
            }
            Intent::EndSession => match &self.session {
                Some(session) => {
                    // Stream and cache teardown hang off the logout itself.
                    if let Err(e) = session.logout() {
                        tracing::warn!(error = %e, "Failed to clear session");
                    }
                }
                None => tracing::debug!("EndSession without a session manager"),
            },
        }
    }

    pub fn apply_all(&self, intents: Vec<Intent>) {
        for intent in intents {
            self.apply(intent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use serde_json::json;

    use crate::models::{Notification, NotificationKind};
    use crate::session::tests::{session_with, MockAuthApi};
    use crate::storage::StorageKey;
    use crate::ui::{RecordingNavigator, RecordingToasts, Route, Toast};

    struct Fixture {
        applier: IntentApplier,
        toasts: Arc<RecordingToasts>,
        nav: Arc<RecordingNavigator>,
        session: Arc<SessionManager>,
    }

    fn fixture() -> Fixture {
        let session = session_with(Some("token"), Arc::new(MockAuthApi::new("next")));
        let toasts = Arc::new(RecordingToasts::new());
        let nav = Arc::new(RecordingNavigator::new());
        let applier = IntentApplier::new(
            Arc::new(NotificationStore::new()),
            toasts.clone(),
            nav.clone(),
            session.storage().clone(),
        )
        .with_session(session.clone());
        Fixture {
            applier,
            toasts,
            nav,
            session,
        }
    }

    #[test]
    fn routes_each_intent_to_its_subsystem() {
        let f = fixture();
        f.applier.apply_all(vec![
            Intent::AddNotification(Notification::new(
                "ocr-1",
                NotificationKind::OcrResult,
                "Scan complete",
                "",
                Utc::now(),
            )),
            Intent::ShowToast(Toast::success("done")),
            Intent::Navigate(Route::Notifications),
            Intent::Persist {
                key: StorageKey::OcrStateId,
                value: json!("1"),
            },
        ]);

        assert_eq!(f.applier.notifications().len(), 1);
        assert_eq!(f.toasts.shown().len(), 1);
        assert_eq!(f.nav.visited(), vec![Route::Notifications]);
        let stored = f.session.storage().get(StorageKey::OcrStateId).unwrap();
        assert_eq!(stored.as_deref(), Some("1"));
    }

    #[test]
    fn structured_values_persist_as_json() {
        let f = fixture();
        f.applier.apply(Intent::Persist {
            key: StorageKey::DietLogsSeed,
            value: json!({"meals": [1, 2]}),
        });
        let stored: serde_json::Value = f
            .session
            .storage()
            .get_json(StorageKey::DietLogsSeed)
            .unwrap()
            .unwrap();
        assert_eq!(stored["meals"][1], 2);
    }

    #[test]
    fn end_session_clears_tokens() {
        let f = fixture();
        assert!(f.session.is_authenticated());
        f.applier.apply(Intent::EndSession);
        assert!(!f.session.is_authenticated());
    }
}
