//! End device and device capability models

use serde::{Deserialize, Serialize};

use super::{Identified, Link, ListLink};
use crate::identity::{Lfdi, Sfdi};

/// A client device registered with the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndDevice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lfdi: Option<Lfdi>,
    pub sfdi: Sfdi,
    /// Hex-encoded device category bitmap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_category: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    /// Epoch seconds of the last change
    #[serde(default)]
    pub changed_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_information_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_status_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_set_assignments_list_link: Option<ListLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub der_list_link: Option<ListLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_event_list_link: Option<ListLink>,
}

impl Identified for EndDevice {}

/// Registration PIN handed to a device out of band
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    pub pin: u32,
    /// Epoch seconds
    pub date_time_registered: i64,
}

impl Identified for Registration {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lfdi: Option<Lfdi>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mf_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mf_ser_num: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_power: Option<u8>,
}

impl Identified for DeviceInformation {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    pub changed_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_state: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_time: Option<u32>,
}

impl Identified for DeviceStatus {}

/// Entry point a client reads first to discover the function sets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    pub poll_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_device_list_link: Option<ListLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_usage_point_list_link: Option<ListLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_point_list_link: Option<ListLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_set_list_link: Option<ListLink>,
}

impl Identified for DeviceCapability {}

/// Program assignments for a group of end devices
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSetAssignments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(rename = "mRID", skip_serializing_if = "Option::is_none")]
    pub mrid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub subscribable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub der_program_list_link: Option<ListLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_link: Option<Link>,
}

impl Identified for FunctionSetAssignments {
    fn mrid(&self) -> Option<&str> {
        self.mrid.as_deref()
    }
}
