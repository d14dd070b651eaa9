//! Mirror usage point tests
//!
//! Post mirrors and readings through the server context and read back the
//! usage points and meter readings the server keeps for them.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sep_core::{
    Link, MemoryPointStore, MirrorMeterReading, MirrorUsagePoint, Reading, ReadingType, StoreError,
};
use sep_store::{CreateStatus, Page};
use sepd::{ConfiguredFingerprints, ServerConfig, ServerContext};

fn context() -> ServerContext {
    let config = ServerConfig::from_toml_str(
        r#"
usage_point_post_rate = 60
[server]
hostname = "sep.local"
[[devices]]
id = "meter"
"#,
    )
    .unwrap();
    let certs = Arc::new(ConfiguredFingerprints::from_devices(&config.devices));
    ServerContext::new(config, certs, Arc::new(MemoryPointStore::new()))
}

fn reading(mrid: &str, value: i64, with_type: bool) -> MirrorMeterReading {
    MirrorMeterReading {
        mrid: mrid.into(),
        description: None,
        reading_type: with_type.then(|| ReadingType {
            uom: 38,
            ..ReadingType::default()
        }),
        reading: Some(Reading {
            value,
            time_period: None,
        }),
    }
}

fn mirror(mrid: &str, readings: Vec<MirrorMeterReading>) -> MirrorUsagePoint {
    MirrorUsagePoint {
        mrid: mrid.into(),
        description: Some("site meter".into()),
        href: Some("/client/chosen".into()),
        role_flags: 13,
        mirror_meter_readings: readings,
        ..MirrorUsagePoint::default()
    }
}

#[test]
fn test_mirror_with_readings() {
    let ctx = context();
    let registry = ctx.usage_points();

    let (status, href) = registry
        .create(mirror("A1", vec![reading("R1", 5, true)]))
        .unwrap();
    assert_eq!(status, CreateStatus::Created);
    assert_eq!(status.status_code(), 201);
    assert_eq!(href, "/mup_0");

    let upt = registry.fetch_usage_point("/upt_0").unwrap();
    assert_eq!(upt.mrid, "A1");
    assert_eq!(upt.role_flags, 13);

    let readings = registry.fetch_meter_readings("/upt_0", Page::all()).unwrap();
    assert_eq!(readings.all, 1);
    assert_eq!(readings.items[0].href.as_deref(), Some("/upt_0_mr_0"));
    assert_eq!(
        readings.items[0].reading_type_link,
        Some(Link::new("/upt_0_mr_0_rt"))
    );

    let list = registry.fetch_list(Page::all());
    assert_eq!(list.poll_rate, Some(60));
    assert_eq!(list.items[0].href.as_deref(), Some("/mup_0"));
}

#[test]
fn test_reposting_mirror_updates_in_place() {
    let ctx = context();
    let registry = ctx.usage_points();
    registry.create(mirror("A1", vec![])).unwrap();
    registry.create(mirror("B2", vec![])).unwrap();

    let mut changed = mirror("A1", vec![]);
    changed.description = Some("renamed".into());
    let (status, href) = registry.create(changed).unwrap();
    assert_eq!(status, CreateStatus::Updated);
    assert_eq!(status.status_code(), 204);
    assert_eq!(href, "/mup_0");
    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.fetch_usage_point("/upt_0").unwrap().description.as_deref(),
        Some("renamed")
    );
    assert_eq!(registry.fetch_at(Some(0), Some(0)).unwrap().mrid, "B2");
}

#[test]
fn test_readings_replace_by_mrid() {
    let ctx = context();
    let registry = ctx.usage_points();
    registry.create(mirror("A1", vec![])).unwrap();

    let (status, first) = registry.create_reading("/mup_0", reading("R1", 1, true)).unwrap();
    assert_eq!(status, CreateStatus::Created);
    let (status, second) = registry.create_reading("/mup_0", reading("R1", 2, false)).unwrap();
    assert_eq!(status, CreateStatus::Updated);
    assert_eq!(first, second);

    let readings = registry.fetch_meter_readings("/upt_0", Page::all()).unwrap();
    assert_eq!(readings.all, 1);
    assert_eq!(readings.items[0].reading.as_ref().map(|r| r.value), Some(2));
    assert!(readings.items[0].reading_type.is_some());

    match registry.create_reading("/mup_0", reading("R2", 3, false)) {
        Err(e @ StoreError::InvalidRequest(_)) => assert_eq!(e.status_code(), 400),
        other => panic!("expected invalid request, got {:?}", other),
    }
    assert!(matches!(
        registry.create_reading("/mup_7", reading("R3", 3, true)),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        registry.create_reading("/edev_0", reading("R3", 3, true)),
        Err(StoreError::InvalidHref(_))
    ));
}

#[test]
fn test_list_wire_shape() {
    let ctx = context();
    let registry = ctx.usage_points();
    registry
        .create(mirror("A1", vec![reading("R1", 7, true)]))
        .unwrap();

    let json = serde_json::to_value(registry.fetch_list(Page::all())).unwrap();
    assert_eq!(json["href"], "/mup");
    assert_eq!(json["all"], 1);
    assert_eq!(json["pollRate"], 60);
    assert_eq!(json["MirrorUsagePoint"][0]["mRID"], "A1");
    assert_eq!(json["MirrorUsagePoint"][0]["href"], "/mup_0");

    let json = serde_json::to_value(registry.fetch_meter_readings("/upt_0", Page::all()).unwrap())
        .unwrap();
    assert_eq!(json["MeterReading"][0]["readingTypeLink"]["href"], "/upt_0_mr_0_rt");
}
