//! DER, program, control and curve models

use serde::{Deserialize, Serialize};

use super::{Identified, Link, ListLink};

/// Activation window, `[start, start + duration)` in epoch seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeInterval {
    pub start: i64,
    pub duration: u32,
}

impl DateTimeInterval {
    pub fn new(start: i64, duration: u32) -> Self {
        Self { start, duration }
    }

    /// First second after the window
    pub fn end(&self) -> i64 {
        self.start + i64::from(self.duration)
    }

    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && t < self.end()
    }
}

/// Control event state. Wire values are 0, 1 and -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum EventStatusKind {
    Scheduled,
    Active,
    Complete,
}

impl From<EventStatusKind> for i8 {
    fn from(kind: EventStatusKind) -> i8 {
        match kind {
            EventStatusKind::Scheduled => 0,
            EventStatusKind::Active => 1,
            EventStatusKind::Complete => -1,
        }
    }
}

impl TryFrom<i8> for EventStatusKind {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventStatusKind::Scheduled),
            1 => Ok(EventStatusKind::Active),
            -1 => Ok(EventStatusKind::Complete),
            other => Err(format!("unknown event status {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStatus {
    pub current_status: EventStatusKind,
    /// Epoch seconds of the last transition
    pub date_time: i64,
    #[serde(default)]
    pub potentially_superseded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EventStatus {
    pub fn new(status: EventStatusKind, date_time: i64, reason: impl Into<String>) -> Self {
        Self {
            current_status: status,
            date_time,
            potentially_superseded: false,
            reason: Some(reason.into()),
        }
    }
}

/// Operating mode settings carried by a control
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerControlBase {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_mod_connect: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_mod_energize: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_mod_fixed_pf_inject_w: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_mod_fixed_var: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_mod_fixed_w: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_mod_max_lim_w: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_mod_target_w: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_mod_volt_var: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_mod_freq_watt: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp_tms: Option<u16>,
}

/// A scheduled directive to a DER
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerControl {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(rename = "mRID", skip_serializing_if = "Option::is_none")]
    pub mrid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub creation_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<DateTimeInterval>,
    /// Unset until the scheduler first evaluates the control
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_status: Option<EventStatus>,
    #[serde(default)]
    pub der_control_base: DerControlBase,
}

impl DerControl {
    pub fn status(&self) -> Option<EventStatusKind> {
        self.event_status.as_ref().map(|s| s.current_status)
    }
}

impl Identified for DerControl {
    fn mrid(&self) -> Option<&str> {
        self.mrid.as_deref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveData {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerCurve {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(rename = "mRID", skip_serializing_if = "Option::is_none")]
    pub mrid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub curve_type: u8,
    #[serde(default)]
    pub curve_data: Vec<CurveData>,
}

impl Identified for DerCurve {
    fn mrid(&self) -> Option<&str> {
        self.mrid.as_deref()
    }
}

/// A bundle of controls, a default control and curves
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerProgram {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(rename = "mRID", skip_serializing_if = "Option::is_none")]
    pub mrid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub primacy: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_der_control_list_link: Option<ListLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_der_control_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub der_control_list_link: Option<ListLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub der_curve_list_link: Option<ListLink>,
}

impl Identified for DerProgram {
    fn mrid(&self) -> Option<&str> {
        self.mrid.as_deref()
    }
}

/// A distributed energy resource attached to an end device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Der {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub der_capability_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub der_settings_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub der_status_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub der_availability_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_der_program_link: Option<Link>,
}

impl Identified for Der {}
