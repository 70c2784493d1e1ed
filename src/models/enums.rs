use serde::{Deserialize, Serialize};

/// A string did not match any variant of a wire enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid value for {field}: {value}")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The serde representation uses the same literal as `as_str`.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(UnknownVariant {
                        field: stringify!($name),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

pub(crate) use str_enum;

str_enum!(
    /// Presentation severity shared by toasts and notifications.
    Severity {
        Info => "info",
        Success => "success",
        Warning => "warning",
        Error => "error",
    }
);

str_enum!(
    /// Category of a notification as the backend lists it.
    NotificationKind {
        MedicationLogged => "MEDICATION_LOGGED",
        MedicationMissed => "MEDICATION_MISSED",
        MedicationReminder => "MEDICATION_REMINDER",
        DietWarning => "DIET_WARNING",
        DietResult => "DIET_RESULT",
        OcrResult => "OCR_RESULT",
        InviteReceived => "INVITE_RECEIVED",
        InviteAccepted => "INVITE_ACCEPTED",
        FamilyUpdate => "FAMILY_UPDATE",
        Chat => "CHAT",
        Info => "INFO",
    }
);

str_enum!(LogStatus {
    Taken => "TAKEN",
    Missed => "MISSED",
    Pending => "PENDING",
    Skipped => "SKIPPED",
});

impl Default for Severity {
    fn default() -> Self {
        Self::Info
    }
}

impl Default for NotificationKind {
    fn default() -> Self {
        Self::Info
    }
}
