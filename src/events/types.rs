//! Typed server push events.
//!
//! The stream carries JSON objects with a `type` discriminator. Known
//! types decode into a dedicated variant; anything else becomes
//! `ServerEvent::Unrecognized` so the caller still sees it and can fall
//! back to an informational toast.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::sse::SseFrame;
use crate::models::de::{opt_string_or_number, string_or_number};
use crate::models::enums::{str_enum, UnknownVariant};
use crate::models::Severity;

str_enum!(
    /// Every `type` value the client understands.
    EventKind {
        Connected => "connected",
        Heartbeat => "heartbeat",
        MedicationLogged => "medication.logged",
        MedicationMissed => "medication.missed",
        MedicationMissedAggregated => "medication.missed.aggregated",
        MedicationReminder => "medication.reminder",
        DietWarning => "diet.warning",
        DietJobDone => "diet.job.done",
        DietJobFailed => "diet.job.failed",
        OcrJobDone => "ocr.job.done",
        OcrJobFailed => "ocr.job.failed",
        InviteReceived => "invite.received",
        InviteAccepted => "invite.accepted",
        FamilyMemberLeft => "family.member.left",
        ChatMessage => "chat.message",
        SessionRevoked => "session.revoked",
        Info => "info",
    }
);

/// Fields any event may carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Server-side notification id, when the event was also persisted.
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub notification_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedEvent {
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatEvent {
    #[serde(default)]
    pub server_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(default)]
    pub medication_name: Option<String>,
    #[serde(default)]
    pub schedule_id: Option<i64>,
    #[serde(default)]
    pub log_id: Option<i64>,
    #[serde(default)]
    pub scheduled_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissedAggregateEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietWarningEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(default)]
    pub food_name: Option<String>,
    #[serde(default)]
    pub warning_level: Option<String>,
}

/// Completion of a background job (OCR scan or diet analysis).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(deserialize_with = "string_or_number")]
    pub job_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobEvent {
    /// A done event whose status says otherwise is treated as failed.
    pub fn succeeded(&self) -> bool {
        match self.status.as_deref() {
            None => true,
            Some(s) => matches!(
                s.to_ascii_uppercase().as_str(),
                "DONE" | "COMPLETED" | "SUCCESS"
            ),
        }
    }

    /// Number of medications an OCR result recognised.
    pub fn medication_count(&self) -> Option<usize> {
        self.result
            .as_ref()?
            .get("medications")?
            .as_array()
            .map(Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub invite_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(deserialize_with = "string_or_number")]
    pub room_id: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRevokedEvent {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// An event whose `type` this client does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnrecognizedEvent {
    pub kind: String,
    pub title: Option<String>,
    pub message: Option<String>,
}

/// One decoded push event. Inbound only; the client never re-encodes
/// events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "connected")]
    Connected(ConnectedEvent),
    #[serde(rename = "heartbeat")]
    Heartbeat(HeartbeatEvent),
    #[serde(rename = "medication.logged")]
    MedicationLogged(MedicationEvent),
    #[serde(rename = "medication.missed")]
    MedicationMissed(MedicationEvent),
    #[serde(rename = "medication.missed.aggregated")]
    MedicationMissedAggregated(MissedAggregateEvent),
    #[serde(rename = "medication.reminder")]
    MedicationReminder(MedicationEvent),
    #[serde(rename = "diet.warning")]
    DietWarning(DietWarningEvent),
    #[serde(rename = "diet.job.done")]
    DietJobDone(JobEvent),
    #[serde(rename = "diet.job.failed")]
    DietJobFailed(JobEvent),
    #[serde(rename = "ocr.job.done")]
    OcrJobDone(JobEvent),
    #[serde(rename = "ocr.job.failed")]
    OcrJobFailed(JobEvent),
    #[serde(rename = "invite.received")]
    InviteReceived(InviteEvent),
    #[serde(rename = "invite.accepted")]
    InviteAccepted(InviteEvent),
    #[serde(rename = "family.member.left")]
    FamilyMemberLeft(InviteEvent),
    #[serde(rename = "chat.message")]
    ChatMessage(ChatMessageEvent),
    #[serde(rename = "session.revoked")]
    SessionRevoked(SessionRevokedEvent),
    #[serde(rename = "info")]
    Info(InfoEvent),
    /// Built by `decode` for unknown types, never by serde.
    #[serde(skip)]
    Unrecognized(UnrecognizedEvent),
}

/// Errors decoding a push payload.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("Event payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Event payload has no type")]
    MissingType,
    #[error("Malformed {kind} event: {source}")]
    Malformed {
        kind: String,
        source: serde_json::Error,
    },
}

impl ServerEvent {
    /// Decode a JSON payload.
    pub fn decode(data: &str) -> Result<Self, EventDecodeError> {
        Self::from_value(serde_json::from_str(data)?)
    }

    /// Decode an SSE frame. A payload without `type` takes the frame's
    /// `event:` name instead.
    pub fn decode_frame(frame: &SseFrame) -> Result<Self, EventDecodeError> {
        let mut value: Value = serde_json::from_str(&frame.data)?;
        if value.get("type").is_none() {
            if let (Some(event), Some(object)) = (&frame.event, value.as_object_mut()) {
                object.insert("type".into(), Value::String(event.clone()));
            }
        }
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, EventDecodeError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EventDecodeError::MissingType)?
            .to_string();

        let known: Result<EventKind, UnknownVariant> = kind.parse();
        if known.is_err() {
            let text = |field: &str| value.get(field).and_then(Value::as_str).map(str::to_string);
            return Ok(Self::Unrecognized(UnrecognizedEvent {
                title: text("title"),
                message: text("message"),
                kind,
            }));
        }

        serde_json::from_value(value).map_err(|source| EventDecodeError::Malformed { kind, source })
    }

    /// Wire `type` of this event.
    pub fn kind(&self) -> &str {
        let kind = match self {
            Self::Connected(_) => EventKind::Connected,
            Self::Heartbeat(_) => EventKind::Heartbeat,
            Self::MedicationLogged(_) => EventKind::MedicationLogged,
            Self::MedicationMissed(_) => EventKind::MedicationMissed,
            Self::MedicationMissedAggregated(_) => EventKind::MedicationMissedAggregated,
            Self::MedicationReminder(_) => EventKind::MedicationReminder,
            Self::DietWarning(_) => EventKind::DietWarning,
            Self::DietJobDone(_) => EventKind::DietJobDone,
            Self::DietJobFailed(_) => EventKind::DietJobFailed,
            Self::OcrJobDone(_) => EventKind::OcrJobDone,
            Self::OcrJobFailed(_) => EventKind::OcrJobFailed,
            Self::InviteReceived(_) => EventKind::InviteReceived,
            Self::InviteAccepted(_) => EventKind::InviteAccepted,
            Self::FamilyMemberLeft(_) => EventKind::FamilyMemberLeft,
            Self::ChatMessage(_) => EventKind::ChatMessage,
            Self::SessionRevoked(_) => EventKind::SessionRevoked,
            Self::Info(_) => EventKind::Info,
            Self::Unrecognized(event) => return &event.kind,
        };
        kind.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_only_decodes_through_fallback() {
        let raw = r#"{"type":"something.new","message":"hi"}"#;
        assert!(serde_json::from_str::<ServerEvent>(raw).is_err());

        match ServerEvent::decode(raw).unwrap() {
            ServerEvent::Unrecognized(event) => {
                assert_eq!(event.kind, "something.new");
                assert_eq!(event.message.as_deref(), Some("hi"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_ocr_job_done() {
        let event = ServerEvent::decode(
            r#"{"type":"ocr.job.done","status":"DONE","jobId":"123",
                "result":{"medications":[{"name":"Amlodipine"},{"name":"Aspirin"}]}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::OcrJobDone(job) => {
                assert_eq!(job.job_id, "123");
                assert!(job.succeeded());
                assert_eq!(job.medication_count(), Some(2));
            }
            other => panic!("Expected OcrJobDone, got {other:?}"),
        }
    }

    #[test]
    fn numeric_job_id_accepted() {
        let event = ServerEvent::decode(r#"{"type":"diet.job.done","jobId":88}"#).unwrap();
        assert!(matches!(event, ServerEvent::DietJobDone(ref j) if j.job_id == "88"));
    }

    #[test]
    fn failed_status_on_done_event() {
        let event = ServerEvent::decode(r#"{"type":"ocr.job.done","jobId":"1","status":"FAILED"}"#).unwrap();
        match event {
            ServerEvent::OcrJobDone(job) => assert!(!job.succeeded()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_unrecognized_not_error() {
        let event =
            ServerEvent::decode(r#"{"type":"pharmacy.stock.low","message":"Refill soon"}"#).unwrap();
        assert_eq!(event.kind(), "pharmacy.stock.low");
        match event {
            ServerEvent::Unrecognized(e) => assert_eq!(e.message.as_deref(), Some("Refill soon")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_type_is_error() {
        assert!(matches!(
            ServerEvent::decode(r#"{"jobId":"1"}"#),
            Err(EventDecodeError::MissingType)
        ));
        assert!(matches!(
            ServerEvent::decode("[1,2]"),
            Err(EventDecodeError::MissingType)
        ));
        assert!(matches!(ServerEvent::decode("not json"), Err(EventDecodeError::Json(_))));
    }

    #[test]
    fn known_type_with_bad_fields_is_malformed() {
        let err = ServerEvent::decode(r#"{"type":"chat.message"}"#).unwrap_err();
        assert!(matches!(err, EventDecodeError::Malformed { ref kind, .. } if kind == "chat.message"));
    }

    #[test]
    fn frame_event_name_supplies_type() {
        let frame = SseFrame {
            event: Some("heartbeat".into()),
            data: r#"{"serverTime":"12:00"}"#.into(),
            ..SseFrame::default()
        };
        let event = ServerEvent::decode_frame(&frame).unwrap();
        assert_eq!(event.kind(), "heartbeat");
    }

    #[test]
    fn meta_fields_flattened() {
        let event = ServerEvent::decode(
            r#"{"type":"medication.missed","notificationId":501,"title":"Missed",
                "memberName":"Dad","medicationName":"Warfarin","scheduledAt":"2024-05-01T08:00:00"}"#,
        )
        .unwrap();
        match event {
            ServerEvent::MedicationMissed(e) => {
                assert_eq!(e.meta.notification_id.as_deref(), Some("501"));
                assert_eq!(e.member_name.as_deref(), Some("Dad"));
                assert!(e.scheduled_at.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn every_kind_round_trips_through_str() {
        for raw in ["connected", "medication.missed.aggregated", "session.revoked", "info"] {
            assert_eq!(raw.parse::<EventKind>().unwrap().as_str(), raw);
        }
    }
}
