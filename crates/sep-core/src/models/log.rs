//! Device log event model

use serde::{Deserialize, Serialize};

use super::Identified;

/// A log entry posted by an end device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Epoch seconds; log lists are ordered by this field
    pub created_date_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default)]
    pub function_set: u8,
    #[serde(default)]
    pub log_event_code: u8,
    #[serde(default)]
    pub log_event_id: u16,
    #[serde(default)]
    pub log_event_pen: u32,
    #[serde(default)]
    pub profile_id: u8,
}

impl Identified for LogEvent {}
