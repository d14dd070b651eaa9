//! Resource trait and the closed set of resource kinds

use std::fmt::{self, Debug};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    Der, DerControl, DerCurve, DerProgram, DeviceCapability, DeviceInformation, DeviceStatus,
    EndDevice, FunctionSetAssignments, LogEvent, MeterReading, MirrorUsagePoint, Registration,
    UsagePoint,
};

/// Resources that may carry a master resource identifier
pub trait Identified {
    fn mrid(&self) -> Option<&str> {
        None
    }
}

/// A protocol resource addressable by href
pub trait Resource:
    Identified + Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Concrete kind tag
    const KIND: ResourceKind;

    fn href(&self) -> Option<&str>;

    /// Overwrites unconditionally; stores only call this while the href is unset
    fn set_href(&mut self, href: String);

    fn into_any(self) -> AnyResource;

    /// Recover the concrete type, handing the value back on mismatch
    fn from_any(any: AnyResource) -> Result<Self, AnyResource>;

    fn from_any_ref(any: &AnyResource) -> Option<&Self>;

    fn from_any_mut(any: &mut AnyResource) -> Option<&mut Self>;
}

macro_rules! resource_kinds {
    ($($kind:ident),+ $(,)?) => {
        /// Every concrete resource type the store can hold
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ResourceKind {
            $($kind),+
        }

        impl fmt::Display for ResourceKind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(ResourceKind::$kind => f.write_str(stringify!($kind))),+
                }
            }
        }

        /// A resource of any kind, used where children of different
        /// families share one map
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "kind", content = "resource")]
        pub enum AnyResource {
            $($kind($kind)),+
        }

        impl AnyResource {
            pub fn kind(&self) -> ResourceKind {
                match self {
                    $(AnyResource::$kind(_) => ResourceKind::$kind),+
                }
            }

            pub fn href(&self) -> Option<&str> {
                match self {
                    $(AnyResource::$kind(r) => r.href.as_deref()),+
                }
            }

            pub fn mrid(&self) -> Option<&str> {
                match self {
                    $(AnyResource::$kind(r) => r.mrid()),+
                }
            }

            pub(crate) fn set_href(&mut self, href: String) {
                match self {
                    $(AnyResource::$kind(r) => r.href = Some(href)),+
                }
            }

            /// Serializable view of the wrapped resource without the kind tag
            pub fn untagged(&self) -> Untagged<'_> {
                Untagged(self)
            }
        }

        /// Serializes exactly like the concrete resource inside an [`AnyResource`]
        #[derive(Debug, Clone, Copy)]
        pub struct Untagged<'a>(&'a AnyResource);

        impl Serialize for Untagged<'_> {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self.0 {
                    $(AnyResource::$kind(r) => r.serialize(serializer)),+
                }
            }
        }

        $(
            impl Resource for $kind {
                const KIND: ResourceKind = ResourceKind::$kind;

                fn href(&self) -> Option<&str> {
                    self.href.as_deref()
                }

                fn set_href(&mut self, href: String) {
                    self.href = Some(href);
                }

                fn into_any(self) -> AnyResource {
                    AnyResource::$kind(self)
                }

                fn from_any(any: AnyResource) -> Result<Self, AnyResource> {
                    match any {
                        AnyResource::$kind(r) => Ok(r),
                        other => Err(other),
                    }
                }

                fn from_any_ref(any: &AnyResource) -> Option<&Self> {
                    match any {
                        AnyResource::$kind(r) => Some(r),
                        _ => None,
                    }
                }

                fn from_any_mut(any: &mut AnyResource) -> Option<&mut Self> {
                    match any {
                        AnyResource::$kind(r) => Some(r),
                        _ => None,
                    }
                }
            }

            impl From<$kind> for AnyResource {
                fn from(r: $kind) -> Self {
                    AnyResource::$kind(r)
                }
            }
        )+
    };
}

resource_kinds!(
    EndDevice,
    Registration,
    DeviceInformation,
    DeviceStatus,
    DeviceCapability,
    FunctionSetAssignments,
    Der,
    DerProgram,
    DerControl,
    DerCurve,
    MirrorUsagePoint,
    UsagePoint,
    MeterReading,
    LogEvent,
);

impl AnyResource {
    /// Assign `href` only when none is set yet
    pub fn ensure_href(&mut self, href: impl FnOnce() -> String) {
        if self.href().is_none() {
            self.set_href(href());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_round_trip() {
        let ctl = DerControl {
            href: Some("/derc_0".into()),
            mrid: Some("ABC".into()),
            ..DerControl::default()
        };
        let any = ctl.clone().into_any();
        assert_eq!(any.kind(), ResourceKind::DerControl);
        assert_eq!(any.href(), Some("/derc_0"));
        assert_eq!(any.mrid(), Some("ABC"));
        assert_eq!(DerControl::from_any_ref(&any), Some(&ctl));
        assert!(DerCurve::from_any_ref(&any).is_none());
        assert_eq!(DerControl::from_any(any).unwrap(), ctl);
    }

    #[test]
    fn test_from_any_returns_value_on_mismatch() {
        let any = AnyResource::from(DerCurve::default());
        let back = DerControl::from_any(any).unwrap_err();
        assert_eq!(back.kind(), ResourceKind::DerCurve);
    }

    #[test]
    fn test_untagged_matches_concrete_encoding() {
        let ctl = DerControl {
            href: Some("/derc_1".into()),
            description: Some("Curtail".into()),
            ..DerControl::default()
        };
        let any = ctl.clone().into_any();
        assert_eq!(
            serde_json::to_value(any.untagged()).unwrap(),
            serde_json::to_value(&ctl).unwrap()
        );
        let back: DerControl = serde_json::from_value(serde_json::to_value(any.untagged()).unwrap()).unwrap();
        assert_eq!(back, ctl);
    }

    #[test]
    fn test_ensure_href_keeps_existing() {
        let mut any = AnyResource::from(LogEvent {
            href: Some("/edev_0_lel_0".into()),
            ..LogEvent::default()
        });
        any.ensure_href(|| "/other".into());
        assert_eq!(any.href(), Some("/edev_0_lel_0"));

        let mut fresh = AnyResource::from(LogEvent::default());
        fresh.ensure_href(|| "/edev_0_lel_1".into());
        assert_eq!(fresh.href(), Some("/edev_0_lel_1"));
    }
}
