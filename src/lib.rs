pub mod api; // REST client + error interceptor
pub mod config;
pub mod core_state; // Composition root
pub mod events; // SSE stream, typed events, planner
pub mod medication_logs; // Per-date log cache
pub mod models;
pub mod notifications;
pub mod oauth; // Kakao redirect flow
pub mod session;
pub mod storage;
pub mod ui; // Toast / navigation seams

pub use core_state::ClientState;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// The filter comes from `AMAPILL_LOG`, falling back to
/// `config::default_log_filter()`. Safe to call more than once; later
/// calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(config::LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
