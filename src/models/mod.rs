pub mod enums;
pub mod medication_log;
pub mod notification;

pub use enums::{LogStatus, NotificationKind, Severity, UnknownVariant};
pub use medication_log::MedicationLog;
pub use notification::Notification;

/// Lenient field decoders for backend payloads.
pub(crate) mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Int(i64),
        Float(f64),
    }

    impl From<StringOrNumber> for String {
        fn from(value: StringOrNumber) -> Self {
            match value {
                StringOrNumber::String(s) => s,
                StringOrNumber::Int(n) => n.to_string(),
                StringOrNumber::Float(n) => n.to_string(),
            }
        }
    }

    /// Identifiers arrive as JSON strings or numbers depending on the endpoint.
    pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        StringOrNumber::deserialize(deserializer).map(String::from)
    }

    pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<StringOrNumber>::deserialize(deserializer).map(|v| v.map(String::from))
    }
}
