//! Realtime notifications: stream subscriber, planner and applier wired
//! together.
//!
//! The stream follows the session: once connected, any logout closes it,
//! including one triggered by an event on the stream itself.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::events::dispatch::IntentApplier;
use crate::events::planner::plan;
use crate::events::subscriber::{
    ErrorHandler, EventStreamSubscriber, MessageHandler, StreamConnector, StreamError,
};
use crate::events::types::ServerEvent;
use crate::session::{SessionError, SessionManager};

pub struct RealtimeNotifications {
    subscriber: Arc<EventStreamSubscriber>,
    applier: Arc<IntentApplier>,
    session: Arc<SessionManager>,
    on_error: Arc<Mutex<Option<ErrorHandler>>>,
    session_watch: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl RealtimeNotifications {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        session: Arc<SessionManager>,
        applier: Arc<IntentApplier>,
    ) -> Self {
        Self {
            subscriber: Arc::new(EventStreamSubscriber::new(connector, session.clone())),
            applier,
            session,
            on_error: Arc::new(Mutex::new(None)),
            session_watch: Mutex::new(None),
        }
    }

    /// Extra callback for stream failures, after they are logged.
    pub fn with_error_handler(self, on_error: ErrorHandler) -> Self {
        self.set_error_handler(on_error);
        self
    }

    /// Replace the extra failure callback. Stream failures pick it up on
    /// the next `connect`; session-end closes see it immediately.
    pub fn set_error_handler(&self, on_error: ErrorHandler) {
        *lock(&self.on_error) = Some(on_error);
    }

    pub fn subscriber(&self) -> &EventStreamSubscriber {
        &self.subscriber
    }

    /// Plan and apply one event.
    pub fn handle_event(&self, event: &ServerEvent) {
        handle(&self.applier, event);
    }

    /// Open (or reopen) the stream.
    pub async fn connect(&self) -> Result<(), StreamError> {
        self.watch_session();

        let applier = self.applier.clone();
        let on_message: MessageHandler = Arc::new(move |event: ServerEvent| handle(&applier, &event));

        let extra = lock(&self.on_error).clone();
        let on_error: ErrorHandler = Arc::new(move |e: &StreamError| {
            tracing::warn!(error = %e, "Realtime notifications interrupted");
            if let Some(extra) = &extra {
                extra(e);
            }
        });

        self.subscriber.subscribe(on_message, on_error).await
    }

    pub async fn disconnect(&self) {
        self.subscriber.close().await;
    }

    /// Close the stream after every logout and report it to the extra
    /// error handler as `NotAuthenticated`.
    ///
    /// The close runs on its own task: a logout applied from the reader
    /// task cannot wait for that same task to finish.
    fn watch_session(&self) {
        let mut slot = lock(&self.session_watch);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        // A fresh receiver treats the current generation as seen.
        let mut ended = self.session.session_ended();
        let subscriber = Arc::downgrade(&self.subscriber);
        let handlers = self.on_error.clone();
        *slot = Some(tokio::spawn(async move {
            while ended.changed().await.is_ok() {
                let Some(subscriber) = subscriber.upgrade() else {
                    break;
                };
                let was_open = subscriber.is_open().await;
                subscriber.close().await;
                if !was_open {
                    continue;
                }
                tracing::info!("Event stream closed at session end");
                let extra = lock(&handlers).clone();
                if let Some(extra) = extra {
                    extra(&StreamError::Session(SessionError::NotAuthenticated));
                }
            }
        }));
    }

    /// Reconcile the stream with the session: connect when signed in and
    /// not connected with the current token, disconnect when signed out.
    pub async fn sync_with_session(&self) -> Result<(), StreamError> {
        let token = self.session.access_token()?;
        match token {
            None => {
                self.disconnect().await;
                Ok(())
            }
            Some(token) => {
                let current = self.subscriber.current_token().await;
                if self.subscriber.is_open().await && current.as_deref() == Some(token.as_str()) {
                    return Ok(());
                }
                self.connect().await
            }
        }
    }
}

impl Drop for RealtimeNotifications {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.session_watch).take() {
            task.abort();
        }
    }
}

fn handle(applier: &IntentApplier, event: &ServerEvent) {
    let intents = plan(event, Utc::now());
    tracing::debug!(kind = %event.kind(), intents = intents.len(), "Applying event");
    applier.apply_all(intents);
}
