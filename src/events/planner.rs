//! Event planning.
//!
//! `plan` turns one `ServerEvent` into the side effects it calls for,
//! described as `Intent` values. It touches no state; `IntentApplier`
//! carries the intents out.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::events::types::{EventMeta, JobEvent, MedicationEvent, ServerEvent};
use crate::models::{Notification, NotificationKind, Severity};
use crate::storage::StorageKey;
use crate::ui::{Route, Toast};

/// A side effect requested by an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    ShowToast(Toast),
    AddNotification(Notification),
    Navigate(Route),
    Persist { key: StorageKey, value: Value },
    /// Drop the cached logs of a date so the next read refetches.
    InvalidateLogs(NaiveDate),
    EndSession,
}

/// Label on toast actions that open a result screen.
const VIEW: &str = "View";

/// Plan the effects of one event. `now` stamps notifications the server
/// sent without a timestamp.
pub fn plan(event: &ServerEvent, now: DateTime<Utc>) -> Vec<Intent> {
    match event {
        ServerEvent::Connected(_) | ServerEvent::Heartbeat(_) => Vec::new(),

        ServerEvent::MedicationLogged(e) => {
            let message = text_or(&e.meta.message, || {
                format!("{} took {}", who(&e.member_name), what(e))
            });
            let mut intents = vec![
                notification(
                    &e.meta,
                    "medication.logged",
                    NotificationKind::MedicationLogged,
                    "Medication taken",
                    &message,
                    now,
                    Some(Severity::Success),
                ),
                Intent::ShowToast(Toast::success(message)),
            ];
            intents.extend(invalidate(e));
            intents
        }

        ServerEvent::MedicationMissed(e) => {
            let message = text_or(&e.meta.message, || {
                format!("{} missed {}", who(&e.member_name), what(e))
            });
            let mut intents = vec![
                notification(
                    &e.meta,
                    "medication.missed",
                    NotificationKind::MedicationMissed,
                    "Missed dose",
                    &message,
                    now,
                    Some(Severity::Warning),
                ),
                Intent::ShowToast(Toast::warning(message).with_action(VIEW, Route::TodayMedications)),
            ];
            intents.extend(invalidate(e));
            intents
        }

        ServerEvent::MedicationMissedAggregated(e) => {
            let message = text_or(&e.meta.message, || match &e.member_name {
                Some(name) => format!("{name} missed {} doses", e.count),
                None => format!("{} doses were missed", e.count),
            });
            let mut intents = vec![
                notification(
                    &e.meta,
                    "medication.missed.aggregated",
                    NotificationKind::MedicationMissed,
                    "Missed doses",
                    &message,
                    now,
                    Some(Severity::Warning),
                ),
                Intent::ShowToast(Toast::warning(message).with_action(VIEW, Route::Notifications)),
            ];
            if let Some(date) = e.date {
                intents.push(Intent::InvalidateLogs(date));
            }
            intents
        }

        ServerEvent::MedicationReminder(e) => {
            let message = text_or(&e.meta.message, || format!("Time to take {}", what(e)));
            vec![
                notification(
                    &e.meta,
                    "medication.reminder",
                    NotificationKind::MedicationReminder,
                    "Medication reminder",
                    &message,
                    now,
                    None,
                ),
                Intent::ShowToast(Toast::info(message).with_action(VIEW, Route::TodayMedications)),
            ]
        }

        ServerEvent::DietWarning(e) => {
            let message = text_or(&e.meta.message, || match &e.food_name {
                Some(food) => format!("{food} may interact with current medication"),
                None => "A recent meal may interact with current medication".into(),
            });
            vec![
                notification(
                    &e.meta,
                    "diet.warning",
                    NotificationKind::DietWarning,
                    "Diet warning",
                    &message,
                    now,
                    Some(Severity::Warning),
                ),
                Intent::ShowToast(Toast::warning(message)),
            ]
        }

        ServerEvent::DietJobDone(job) if job.succeeded() => {
            let mut intents = job_done(
                job,
                "diet",
                NotificationKind::DietResult,
                "Diet analysis ready",
                "Your meal analysis is ready".into(),
                Route::DietResult {
                    job_id: job.job_id.clone(),
                },
                now,
            );
            if let Some(result) = &job.result {
                intents.push(Intent::Persist {
                    key: StorageKey::DietLogsSeed,
                    value: result.clone(),
                });
            }
            intents
        }
        ServerEvent::DietJobDone(job) | ServerEvent::DietJobFailed(job) => job_failed(
            job,
            "diet",
            NotificationKind::DietResult,
            "Diet analysis failed",
            now,
        ),

        ServerEvent::OcrJobDone(job) if job.succeeded() => {
            let message = match job.medication_count() {
                Some(n) => format!("Prescription scan finished: {n} medications found"),
                None => "Prescription scan finished".into(),
            };
            let mut intents = job_done(
                job,
                "ocr",
                NotificationKind::OcrResult,
                "Scan complete",
                message,
                Route::OcrResult {
                    job_id: job.job_id.clone(),
                },
                now,
            );
            intents.push(Intent::Persist {
                key: StorageKey::OcrStateId,
                value: Value::String(job.job_id.clone()),
            });
            intents
        }
        ServerEvent::OcrJobDone(job) | ServerEvent::OcrJobFailed(job) => job_failed(
            job,
            "ocr",
            NotificationKind::OcrResult,
            "Scan failed",
            now,
        ),

        ServerEvent::InviteReceived(e) => {
            let message = text_or(&e.meta.message, || match &e.group_name {
                Some(group) => format!("You were invited to {group}"),
                None => "You received a family invite".into(),
            });
            vec![
                notification(
                    &e.meta,
                    "invite.received",
                    NotificationKind::InviteReceived,
                    "Family invite",
                    &message,
                    now,
                    None,
                ),
                Intent::ShowToast(Toast::info(message).with_action(VIEW, Route::FamilyGroup)),
            ]
        }

        ServerEvent::InviteAccepted(e) => {
            let message = text_or(&e.meta.message, || {
                format!("{} joined the family group", who(&e.member_name))
            });
            vec![
                notification(
                    &e.meta,
                    "invite.accepted",
                    NotificationKind::InviteAccepted,
                    "Invite accepted",
                    &message,
                    now,
                    Some(Severity::Success),
                ),
                Intent::ShowToast(Toast::success(message).with_action(VIEW, Route::FamilyGroup)),
            ]
        }

        ServerEvent::FamilyMemberLeft(e) => {
            let message = text_or(&e.meta.message, || {
                format!("{} left the family group", who(&e.member_name))
            });
            vec![
                notification(
                    &e.meta,
                    "family.member.left",
                    NotificationKind::FamilyUpdate,
                    "Family update",
                    &message,
                    now,
                    None,
                ),
                Intent::ShowToast(Toast::info(message)),
            ]
        }

        ServerEvent::ChatMessage(e) => {
            let sender = e.sender_name.as_deref().unwrap_or("Family");
            let message = match (&e.meta.message, &e.preview) {
                (Some(message), _) => message.clone(),
                (None, Some(preview)) => format!("{sender}: {preview}"),
                (None, None) => format!("New message from {sender}"),
            };
            let route = Route::ChatRoom {
                room_id: e.room_id.clone(),
            };
            let mut intents = Vec::new();
            // Chat pushes only reach the bell list when the server stored one.
            if let Some(id) = &e.meta.notification_id {
                intents.push(Intent::AddNotification(
                    Notification::new(
                        id.clone(),
                        NotificationKind::Chat,
                        text_or(&e.meta.title, || "New message".into()),
                        message.clone(),
                        e.meta.created_at.unwrap_or(now),
                    )
                    .with_related(e.room_id.clone()),
                ));
            }
            intents.push(Intent::ShowToast(Toast::info(message).with_action("Open", route)));
            intents
        }

        ServerEvent::SessionRevoked(e) => {
            tracing::warn!(reason = ?e.reason, "Session revoked by server");
            vec![
                Intent::ShowToast(Toast::warning(
                    e.reason
                        .clone()
                        .unwrap_or_else(|| "You were signed out. Please sign in again.".into()),
                )),
                Intent::EndSession,
                Intent::Navigate(Route::Login),
            ]
        }

        ServerEvent::Info(e) => {
            let severity = e.severity.unwrap_or_default();
            let message = text_or(&e.meta.message, || {
                e.meta.title.clone().unwrap_or_else(|| "New update".into())
            });
            let mut intents = Vec::new();
            if e.meta.notification_id.is_some() {
                intents.push(notification(
                    &e.meta,
                    "info",
                    NotificationKind::Info,
                    "Notice",
                    &message,
                    now,
                    Some(severity),
                ));
            }
            intents.push(Intent::ShowToast(Toast::new(severity, message)));
            intents
        }

        ServerEvent::Unrecognized(e) => {
            tracing::debug!(kind = %e.kind, "Unrecognized event type");
            let message = e
                .message
                .clone()
                .or_else(|| e.title.clone())
                .unwrap_or_else(|| "You have a new update".into());
            vec![Intent::ShowToast(Toast::info(message))]
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

fn text_or(value: &Option<String>, fallback: impl FnOnce() -> String) -> String {
    value.clone().unwrap_or_else(fallback)
}

fn who(member: &Option<String>) -> &str {
    member.as_deref().unwrap_or("A family member")
}

fn what(e: &MedicationEvent) -> &str {
    e.medication_name.as_deref().unwrap_or("a medication")
}

fn invalidate(e: &MedicationEvent) -> Option<Intent> {
    e.scheduled_at.map(|at| Intent::InvalidateLogs(at.date()))
}

fn notification(
    meta: &EventMeta,
    id_prefix: &str,
    kind: NotificationKind,
    default_title: &str,
    message: &str,
    now: DateTime<Utc>,
    severity: Option<Severity>,
) -> Intent {
    let id = meta
        .notification_id
        .clone()
        .unwrap_or_else(|| format!("{id_prefix}-{}", uuid::Uuid::new_v4()));
    let mut n = Notification::new(
        id,
        kind,
        text_or(&meta.title, || default_title.into()),
        message,
        meta.created_at.unwrap_or(now),
    );
    n.severity = severity;
    Intent::AddNotification(n)
}

/// Job notifications use `{prefix}-{jobId}` ids so a repeated or
/// superseding event replaces the earlier entry.
fn job_notification(
    job: &JobEvent,
    prefix: &str,
    kind: NotificationKind,
    title: &str,
    message: &str,
    severity: Severity,
    now: DateTime<Utc>,
) -> Notification {
    Notification::new(
        format!("{prefix}-{}", job.job_id),
        kind,
        text_or(&job.meta.title, || title.into()),
        message,
        job.meta.created_at.unwrap_or(now),
    )
    .with_related(job.job_id.clone())
    .with_severity(severity)
}

fn job_done(
    job: &JobEvent,
    prefix: &str,
    kind: NotificationKind,
    title: &str,
    message: String,
    route: Route,
    now: DateTime<Utc>,
) -> Vec<Intent> {
    let message = job.meta.message.clone().unwrap_or(message);
    vec![
        Intent::AddNotification(job_notification(
            job,
            prefix,
            kind,
            title,
            &message,
            Severity::Success,
            now,
        )),
        Intent::ShowToast(Toast::success(message).with_action(VIEW, route)),
    ]
}

fn job_failed(
    job: &JobEvent,
    prefix: &str,
    kind: NotificationKind,
    title: &str,
    now: DateTime<Utc>,
) -> Vec<Intent> {
    let message = job
        .meta
        .message
        .clone()
        .or_else(|| job.error.clone())
        .unwrap_or_else(|| format!("{title}. Please try again."));
    vec![
        Intent::AddNotification(job_notification(
            job,
            prefix,
            kind,
            title,
            &message,
            Severity::Error,
            now,
        )),
        Intent::ShowToast(Toast::error(message)),
    ]
}
