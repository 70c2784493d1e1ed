pub mod auth;
pub mod medication_logs;
pub mod notifications;
