//! Call log records returned by the telephony provider.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::PhoneNumber;

/// Direction of a call, as reported by the provider.
///
/// Unrecognized values deserialize to `Unknown` rather than failing the whole
/// record; backfilled audio with no metadata also ends up `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CallDirection {
    Inbound,
    Outbound,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inbound => "Inbound",
            Self::Outbound => "Outbound",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// One provider call-log record.
///
/// Produced by `CallSource::list_calls`; never persisted. Only records
/// carrying a recording id are of interest downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecordEvent {
    /// Provider id of the attached recording, if the call was recorded
    pub recording_id: Option<String>,

    /// Telephony session id (webhook deliveries key recordings by this)
    pub session_id: Option<String>,

    /// Inbound or outbound
    pub direction: CallDirection,

    /// Call duration in seconds
    pub duration: u64,

    /// When the call started; filenames derive their timestamp from this
    pub start_time: DateTime<Utc>,

    /// When the call ended, if the provider reported it
    pub end_time: Option<DateTime<Utc>>,

    /// Calling party number, normalized
    pub from: Option<PhoneNumber>,

    /// Called party number, normalized
    pub to: Option<PhoneNumber>,
}

impl CallRecordEvent {
    /// Whether this call has a recording attached.
    pub fn has_recording(&self) -> bool {
        self.recording_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parses_provider_values() {
        let d: CallDirection = serde_json::from_str("\"Inbound\"").unwrap();
        assert_eq!(d, CallDirection::Inbound);

        let d: CallDirection = serde_json::from_str("\"Outbound\"").unwrap();
        assert_eq!(d, CallDirection::Outbound);
    }

    #[test]
    fn test_unrecognized_direction_is_unknown() {
        let d: CallDirection = serde_json::from_str("\"Conference\"").unwrap();
        assert_eq!(d, CallDirection::Unknown);
    }

    #[test]
    fn test_direction_display_matches_wire_form() {
        assert_eq!(CallDirection::Inbound.to_string(), "Inbound");
        assert_eq!(CallDirection::Unknown.to_string(), "Unknown");
    }
}
