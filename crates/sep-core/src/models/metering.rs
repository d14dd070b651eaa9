//! Metering mirror models

use serde::{Deserialize, Serialize};

use super::{DateTimeInterval, Identified, Link, ListLink};

/// Units and scaling of a reading
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingType {
    pub uom: u8,
    #[serde(default)]
    pub power_of_ten_multiplier: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accumulation_behaviour: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_direction: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub value: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_period: Option<DateTimeInterval>,
}

/// A reading posted by a client against a mirror usage point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorMeterReading {
    #[serde(rename = "mRID")]
    pub mrid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_type: Option<ReadingType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<Reading>,
}

/// Client-side metering mirrored onto the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorUsagePoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(rename = "mRID")]
    pub mrid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_lfdi: Option<String>,
    #[serde(default)]
    pub role_flags: u16,
    #[serde(default)]
    pub service_category_kind: u8,
    #[serde(default)]
    pub status: u8,
    #[serde(default)]
    pub mirror_meter_readings: Vec<MirrorMeterReading>,
}

impl Identified for MirrorUsagePoint {
    fn mrid(&self) -> Option<&str> {
        Some(&self.mrid)
    }
}

/// Server-side view of a mirror usage point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(rename = "mRID")]
    pub mrid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_lfdi: Option<String>,
    #[serde(default)]
    pub role_flags: u16,
    #[serde(default)]
    pub service_category_kind: u8,
    #[serde(default)]
    pub status: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_reading_list_link: Option<ListLink>,
}

impl UsagePoint {
    /// Server usage point mirroring `mup`
    pub fn mirroring(mup: &MirrorUsagePoint) -> Self {
        Self {
            href: None,
            mrid: mup.mrid.clone(),
            description: mup.description.clone(),
            device_lfdi: mup.device_lfdi.clone(),
            role_flags: mup.role_flags,
            service_category_kind: mup.service_category_kind,
            status: mup.status,
            meter_reading_list_link: None,
        }
    }
}

impl Identified for UsagePoint {
    fn mrid(&self) -> Option<&str> {
        Some(&self.mrid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(rename = "mRID")]
    pub mrid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_type: Option<ReadingType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_type_link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<Reading>,
}

impl From<MirrorMeterReading> for MeterReading {
    fn from(mmr: MirrorMeterReading) -> Self {
        Self {
            href: None,
            mrid: mmr.mrid,
            description: mmr.description,
            reading_type: mmr.reading_type,
            reading_type_link: None,
            reading: mmr.reading,
        }
    }
}

impl Identified for MeterReading {
    fn mrid(&self) -> Option<&str> {
        Some(&self.mrid)
    }
}
