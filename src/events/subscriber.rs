//! Event stream subscription.
//!
//! One `EventStreamSubscriber` owns at most one open stream. Every
//! `subscribe` tears the previous stream down and waits for its reader
//! task to finish before opening the next one, and asks the session for
//! a token that will not expire mid-handshake. Reconnection is driven by
//! the caller (auth change, explicit retry); there is no backoff loop.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::events::sse::{SseDecoder, SseFrame};
use crate::events::types::ServerEvent;
use crate::session::{SessionError, SessionManager};

/// Decoded frames of one open connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, StreamError>> + Send>>;

pub type MessageHandler = Arc<dyn Fn(ServerEvent) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&StreamError) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Event stream transport error: {0}")]
    Transport(String),
    #[error("Event stream rejected with HTTP {0}")]
    Status(u16),
    #[error("Event stream closed by server")]
    Closed,
    #[error(transparent)]
    Session(#[from] SessionError),
}

// ═══════════════════════════════════════════════════════════
// Connector
// ═══════════════════════════════════════════════════════════

/// Opens one authenticated stream.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn open(&self, token: &str) -> Result<FrameStream, StreamError>;
}

/// `GET {events_base}/notifications/subscribe?token=` over reqwest.
///
/// The client must not carry a total request timeout; see
/// `build_stream_client`.
pub struct HttpStreamConnector {
    url: String,
    http: reqwest::Client,
}

impl HttpStreamConnector {
    pub fn new(events_base_url: &str, http: reqwest::Client) -> Self {
        Self {
            url: format!(
                "{}/notifications/subscribe",
                events_base_url.trim_end_matches('/')
            ),
            http,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StreamConnector for HttpStreamConnector {
    async fn open(&self, token: &str) -> Result<FrameStream, StreamError> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("token", token)])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status.as_u16()));
        }

        tracing::info!(url = %self.url, "Event stream opened");
        Ok(decode_frames(response.bytes_stream()))
    }
}

/// Turn a byte stream into an SSE frame stream.
pub fn decode_frames<S, B, E>(bytes: S) -> FrameStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (Box::pin(bytes), SseDecoder::new(), VecDeque::new());
    Box::pin(stream::unfold(
        state,
        |(mut bytes, mut decoder, mut pending)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (bytes, decoder, pending)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.feed(chunk.as_ref())),
                    Some(Err(e)) => {
                        let err = StreamError::Transport(e.to_string());
                        return Some((Err(err), (bytes, decoder, pending)));
                    }
                    None => return None,
                }
            }
        },
    ))
}

// ═══════════════════════════════════════════════════════════
// Subscriber
// ═══════════════════════════════════════════════════════════

/// Decrements the open-connection count when the reader task ends or is
/// aborted.
struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ActiveStream {
    token: String,
    task: JoinHandle<()>,
}

pub struct EventStreamSubscriber {
    connector: Arc<dyn StreamConnector>,
    session: Arc<SessionManager>,
    active: Mutex<Option<ActiveStream>>,
    open_connections: Arc<AtomicUsize>,
    attempts: AtomicU32,
}

impl EventStreamSubscriber {
    pub fn new(connector: Arc<dyn StreamConnector>, session: Arc<SessionManager>) -> Self {
        Self {
            connector,
            session,
            active: Mutex::new(None),
            open_connections: Arc::new(AtomicUsize::new(0)),
            attempts: AtomicU32::new(0),
        }
    }

    /// Replace any open stream with a new one.
    ///
    /// Failures are returned and also passed to `on_error`.
    pub async fn subscribe(
        &self,
        on_message: MessageHandler,
        on_error: ErrorHandler,
    ) -> Result<(), StreamError> {
        let mut active = self.active.lock().await;
        teardown(active.take()).await;

        // Without a usable token nothing is attempted.
        let token = match self.session.fresh_access_token().await {
            Ok(token) => token,
            Err(e) => {
                let err = StreamError::from(e);
                tracing::warn!(error = %err, "Event stream not opened");
                on_error(&err);
                return Err(err);
            }
        };
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        let stream = match self.connector.open(&token).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Event stream connect failed");
                on_error(&e);
                return Err(e);
            }
        };

        let guard = ConnectionGuard::new(self.open_connections.clone());
        let task = tokio::spawn(read_loop(stream, guard, on_message, on_error));
        *active = Some(ActiveStream { token, task });
        tracing::debug!(attempt, "Event stream subscribed");
        Ok(())
    }

    /// Close the stream, if any.
    pub async fn close(&self) {
        let mut active = self.active.lock().await;
        if active.is_some() {
            tracing::info!("Event stream closed");
        }
        teardown(active.take()).await;
        self.attempts.store(0, Ordering::SeqCst);
    }

    /// Whether a reader task is still running.
    pub async fn is_open(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|a| !a.task.is_finished())
    }

    /// Token the current stream was opened with.
    pub async fn current_token(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|a| a.token.clone())
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Subscriptions made after the first since the last `close`.
    pub fn retry_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst).saturating_sub(1)
    }
}

impl Drop for EventStreamSubscriber {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.task.abort();
        }
    }
}

async fn teardown(active: Option<ActiveStream>) {
    if let Some(active) = active {
        active.task.abort();
        // Aborted tasks resolve with a cancellation error; the stream is
        // dropped by then.
        let _ = active.task.await;
    }
}

async fn read_loop(
    mut stream: FrameStream,
    guard: ConnectionGuard,
    on_message: MessageHandler,
    on_error: ErrorHandler,
) {
    let err = loop {
        match stream.next().await {
            Some(Ok(frame)) => match ServerEvent::decode_frame(&frame) {
                Ok(event) => {
                    tracing::debug!(kind = %event.kind(), id = ?frame.id, "Event received");
                    on_message(event);
                }
                Err(e) => tracing::warn!(error = %e, "Dropping undecodable event"),
            },
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Event stream error");
                break e;
            }
            None => {
                tracing::info!("Event stream ended by server");
                break StreamError::Closed;
            }
        }
    };
    drop(stream);
    drop(guard);
    on_error(&err);
}
