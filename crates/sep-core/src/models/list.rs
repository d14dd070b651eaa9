//! List envelopes
//!
//! Protocol list resources report the total size of a collection (`all`)
//! and the size of the returned slice (`results`) alongside the items.

use serde::{Deserialize, Serialize};

use super::{
    Der, DerControl, DerCurve, DerProgram, EndDevice, FunctionSetAssignments, LogEvent,
    MeterReading, MirrorUsagePoint, Resource, UsagePoint,
};

/// A list resource that can be populated from a store slice
pub trait ListEnvelope<T: Resource> {
    fn set_items(&mut self, items: Vec<T>);
    fn set_all(&mut self, all: usize);
    fn set_results(&mut self, results: usize);

    fn items(&self) -> &[T];
    fn all(&self) -> usize;
    fn results(&self) -> usize;
}

macro_rules! list_envelopes {
    ($($list:ident => $item:ident as $field:literal),+ $(,)?) => {
        $(
            #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
            #[serde(rename_all = "camelCase")]
            pub struct $list {
                #[serde(skip_serializing_if = "Option::is_none")]
                pub href: Option<String>,
                pub all: usize,
                pub results: usize,
                #[serde(skip_serializing_if = "Option::is_none")]
                pub poll_rate: Option<u32>,
                #[serde(rename = $field, default)]
                pub items: Vec<$item>,
            }

            impl $list {
                pub fn new(href: impl Into<String>) -> Self {
                    Self {
                        href: Some(href.into()),
                        ..Self::default()
                    }
                }

                pub fn with_poll_rate(mut self, poll_rate: u32) -> Self {
                    self.poll_rate = Some(poll_rate);
                    self
                }
            }

            impl ListEnvelope<$item> for $list {
                fn set_items(&mut self, items: Vec<$item>) {
                    self.items = items;
                }

                fn set_all(&mut self, all: usize) {
                    self.all = all;
                }

                fn set_results(&mut self, results: usize) {
                    self.results = results;
                }

                fn items(&self) -> &[$item] {
                    &self.items
                }

                fn all(&self) -> usize {
                    self.all
                }

                fn results(&self) -> usize {
                    self.results
                }
            }
        )+
    };
}

list_envelopes!(
    EndDeviceList => EndDevice as "EndDevice",
    DerList => Der as "DER",
    DerProgramList => DerProgram as "DERProgram",
    DerControlList => DerControl as "DERControl",
    DerCurveList => DerCurve as "DERCurve",
    FunctionSetAssignmentsList => FunctionSetAssignments as "FunctionSetAssignments",
    MirrorUsagePointList => MirrorUsagePoint as "MirrorUsagePoint",
    UsagePointList => UsagePoint as "UsagePoint",
    MeterReadingList => MeterReading as "MeterReading",
    LogEventList => LogEvent as "LogEvent",
);
