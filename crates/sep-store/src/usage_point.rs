//! Mirror usage points
//!
//! Each mirror posted by a client (`/mup_n`) is paired with a server usage
//! point (`/upt_n`). Readings posted against the mirror are kept as meter
//! readings under the usage point (`/upt_n_mr_k`).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use sep_core::href::{self, MirrorUsagePointHref, ReadingSubType, UsagePointHref, MUP, UPT};
use sep_core::{
    Link, ListLink, MeterReading, MeterReadingList, MirrorMeterReading, MirrorUsagePoint,
    MirrorUsagePointList, StoreError, StoreResult, UsagePoint, UsagePointList,
};

use crate::index::HrefIndex;
use crate::page::Page;
use crate::store::ResourceStore;

const METER_READINGS: &str = "mr";

/// Outcome of a create-or-replace request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStatus {
    Created,
    Updated,
}

impl CreateStatus {
    /// HTTP status for the response
    pub fn status_code(&self) -> u16 {
        match self {
            CreateStatus::Created => 201,
            CreateStatus::Updated => 204,
        }
    }
}

#[derive(Debug)]
struct Inner {
    mirrors: ResourceStore<MirrorUsagePoint>,
    usage_points: ResourceStore<UsagePoint>,
}

/// Mirror usage points and their server-side usage points
#[derive(Debug)]
pub struct MirrorUsagePointRegistry {
    inner: RwLock<Inner>,
    post_rate: u32,
}

impl MirrorUsagePointRegistry {
    /// `post_rate` is advertised in list responses
    pub fn new(post_rate: u32) -> Self {
        Self::build(
            post_rate,
            ResourceStore::new(href::root(MUP)),
            ResourceStore::new(href::root(UPT)),
        )
    }

    pub fn with_index(post_rate: u32, index: Arc<HrefIndex>) -> Self {
        Self::build(
            post_rate,
            ResourceStore::with_index(href::root(MUP), index.clone()),
            ResourceStore::with_index(href::root(UPT), index),
        )
    }

    fn build(
        post_rate: u32,
        mirrors: ResourceStore<MirrorUsagePoint>,
        usage_points: ResourceStore<UsagePoint>,
    ) -> Self {
        Self {
            inner: RwLock::new(Inner {
                mirrors,
                usage_points,
            }),
            post_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a mirror, or replace the one with the same mRID in place.
    /// Readings carried by the mirror are posted as well.
    pub fn create(&self, mut mup: MirrorUsagePoint) -> StoreResult<(CreateStatus, String)> {
        let mut inner = self.inner.write();
        let readings = mup.mirror_meter_readings.clone();

        let existing = inner
            .mirrors
            .fetch_index_by_property(|m| Some(m.mrid.as_str()), mup.mrid.as_str())
            .ok();
        let existing_upt = existing.and_then(|_| {
            inner
                .usage_points
                .fetch_index_by_property(|u| Some(u.mrid.as_str()), mup.mrid.as_str())
                .ok()
        });
        Self::check_readings(&inner, existing_upt, &readings)?;

        let (status, mup_href, upt_index) = match existing {
            Some(index) => {
                inner.mirrors.replace(index, mup.clone())?;
                let mup_href = inner.mirrors.fetch(index)?.href.clone().unwrap_or_default();

                let upt_index = inner
                    .usage_points
                    .fetch_index_by_property(|u| Some(u.mrid.as_str()), mup.mrid.as_str())?;
                let mut upt = UsagePoint::mirroring(&mup);
                upt.meter_reading_list_link = inner
                    .usage_points
                    .fetch(upt_index)?
                    .meter_reading_list_link
                    .clone();
                inner.usage_points.replace(upt_index, upt)?;

                debug!(href = %mup_href, mrid = %mup.mrid, "Mirror usage point replaced");
                (CreateStatus::Updated, mup_href, upt_index)
            }
            None => {
                // Client supplied hrefs are not trusted
                mup.href = None;
                let index = inner.mirrors.add(mup.clone())?;
                let mup_href = inner.mirrors.fetch(index)?.href.clone().unwrap_or_default();

                let mut upt = UsagePoint::mirroring(&mup);
                let upt_href = UsagePointHref::usage_point(index).to_string();
                upt.meter_reading_list_link =
                    Some(ListLink::new(href::child_list(&upt_href, METER_READINGS)));
                upt.href = Some(upt_href);
                let upt_index = inner.usage_points.add(upt)?;

                info!(href = %mup_href, mrid = %mup.mrid, "Mirror usage point created");
                (CreateStatus::Created, mup_href, upt_index)
            }
        };

        for reading in readings {
            Self::post_reading(&mut inner, upt_index, reading)?;
        }
        Ok((status, mup_href))
    }

    /// Post a reading against the mirror at `mup_href`
    pub fn create_reading(
        &self,
        mup_href: &str,
        reading: MirrorMeterReading,
    ) -> StoreResult<(CreateStatus, String)> {
        let upt_href = MirrorUsagePointHref::parse(mup_href)?
            .usage_point()
            .to_string();
        let mut inner = self.inner.write();
        let upt_index = inner
            .usage_points
            .fetch_index_by_property(|u| u.href.as_deref(), upt_href.as_str())
            .map_err(|_| StoreError::not_found(format!("usage point for {}", mup_href)))?;
        Self::post_reading(&mut inner, upt_index, reading)
    }

    /// Every reading must either carry a ReadingType or update a reading
    /// already known under the usage point, so nothing is stored on failure.
    fn check_readings(
        inner: &Inner,
        upt_index: Option<usize>,
        readings: &[MirrorMeterReading],
    ) -> StoreResult<()> {
        let mut typed: HashSet<&str> = HashSet::new();
        for reading in readings {
            if reading.reading_type.is_some() {
                typed.insert(reading.mrid.as_str());
                continue;
            }
            let known = typed.contains(reading.mrid.as_str())
                || upt_index.is_some_and(|index| {
                    inner
                        .usage_points
                        .fetch_child_index_by_mrid(index, METER_READINGS, &reading.mrid)
                        .is_ok()
                });
            if !known {
                return Err(missing_reading_type(&reading.mrid));
            }
        }
        Ok(())
    }

    fn post_reading(
        inner: &mut Inner,
        upt_index: usize,
        reading: MirrorMeterReading,
    ) -> StoreResult<(CreateStatus, String)> {
        let store = &mut inner.usage_points;

        if let Ok(pos) = store.fetch_child_index_by_mrid(upt_index, METER_READINGS, &reading.mrid)
        {
            let existing: &MeterReading = store.fetch_child(upt_index, METER_READINGS, pos)?;
            let mut updated = MeterReading::from(reading);
            updated.reading_type_link = existing.reading_type_link.clone();
            if updated.reading_type.is_none() {
                updated.reading_type = existing.reading_type.clone();
            }
            let href = existing.href.clone().unwrap_or_default();
            store.replace_child(upt_index, METER_READINGS, pos, updated)?;
            debug!(href = %href, "Meter reading replaced");
            return Ok((CreateStatus::Updated, href));
        }

        if reading.reading_type.is_none() {
            return Err(missing_reading_type(&reading.mrid));
        }

        let upt_href = store
            .fetch(upt_index)?
            .href
            .clone()
            .unwrap_or_else(|| href::indexed(&href::root(UPT), upt_index));
        let position = store.size_children(upt_index, METER_READINGS)?;
        let mr_href = href::child(&upt_href, METER_READINGS, position);
        let rt_href = UsagePointHref::parse(&mr_href)?
            .with_reading_subtype(ReadingSubType::ReadingType)
            .to_string();

        let mut mr = MeterReading::from(reading);
        mr.href = Some(mr_href);
        mr.reading_type_link = Some(Link::new(rt_href));
        let href = store.add_replace_child(upt_index, METER_READINGS, mr, None)?;
        debug!(href = %href, "Meter reading created");
        Ok((CreateStatus::Created, href))
    }

    /// Page over the mirrors
    pub fn fetch_list(&self, page: Page) -> MirrorUsagePointList {
        let list = MirrorUsagePointList::new(href::root(MUP)).with_poll_rate(self.post_rate);
        self.inner.read().mirrors.fetch_page(list, page)
    }

    /// Single mirror at `after + 1 + start`
    pub fn fetch_at(
        &self,
        start: Option<usize>,
        after: Option<usize>,
    ) -> StoreResult<MirrorUsagePoint> {
        self.inner
            .read()
            .mirrors
            .fetch_at_offset(start, after)
            .cloned()
    }

    pub fn fetch_mirror(&self, mup_href: &str) -> StoreResult<MirrorUsagePoint> {
        self.inner
            .read()
            .mirrors
            .fetch_by_href(mup_href)
            .cloned()
            .ok_or_else(|| StoreError::not_found(mup_href))
    }

    pub fn fetch_usage_point_list(&self, page: Page) -> UsagePointList {
        let list = UsagePointList::new(href::root(UPT));
        self.inner.read().usage_points.fetch_page(list, page)
    }

    pub fn fetch_usage_point(&self, upt_href: &str) -> StoreResult<UsagePoint> {
        self.inner
            .read()
            .usage_points
            .fetch_by_href(upt_href)
            .cloned()
            .ok_or_else(|| StoreError::not_found(upt_href))
    }

    /// Page over the meter readings of a usage point
    pub fn fetch_meter_readings(&self, upt_href: &str, page: Page) -> StoreResult<MeterReadingList> {
        let inner = self.inner.read();
        let index = inner
            .usage_points
            .fetch_index_by_property(|u| u.href.as_deref(), upt_href)?;
        inner.usage_points.fetch_children_page(
            index,
            METER_READINGS,
            MeterReadingList::new(href::child_list(upt_href, METER_READINGS)),
            page,
        )
    }
}

fn missing_reading_type(mrid: &str) -> StoreError {
    StoreError::InvalidRequest(format!("reading {} has no ReadingType", mrid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sep_core::{MemoryPointStore, Reading, ReadingType};

    fn mirror(mrid: &str) -> MirrorUsagePoint {
        MirrorUsagePoint {
            mrid: mrid.into(),
            description: Some(format!("mirror {}", mrid)),
            ..MirrorUsagePoint::default()
        }
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

    #[test]
    fn test_create_then_update() {
        let registry = MirrorUsagePointRegistry::new(300);
        let (status, href) = registry.create(mirror("A")).unwrap();
        assert_eq!((status, href.as_str()), (CreateStatus::Created, "/mup_0"));
        assert_eq!(status.status_code(), 201);

        let (status, href) = registry.create(mirror("B")).unwrap();
        assert_eq!((status, href.as_str()), (CreateStatus::Created, "/mup_1"));

        let mut changed = mirror("A");
        changed.description = Some("renamed".into());
        let (status, href) = registry.create(changed).unwrap();
        assert_eq!((status, href.as_str()), (CreateStatus::Updated, "/mup_0"));
        assert_eq!(registry.len(), 2);

        let upt = registry.fetch_usage_point("/upt_0").unwrap();
        assert_eq!(upt.description.as_deref(), Some("renamed"));
        assert_eq!(
            upt.meter_reading_list_link.map(|l| l.href),
            Some("/upt_0_mr".to_string())
        );
    }

    #[test]
    fn test_client_href_ignored() {
        let registry = MirrorUsagePointRegistry::new(300);
        let mut mup = mirror("A");
        mup.href = Some("/elsewhere".into());
        let (_, href) = registry.create(mup).unwrap();
        assert_eq!(href, "/mup_0");
    }

    #[test]
    fn test_readings() {
        let registry = MirrorUsagePointRegistry::new(300);
        registry.create(mirror("A")).unwrap();

        let (status, href) = registry
            .create_reading("/mup_0", reading("R1", 10, true))
            .unwrap();
        assert_eq!((status, href.as_str()), (CreateStatus::Created, "/upt_0_mr_0"));

        let (status, href) = registry
            .create_reading("/mup_0", reading("R1", 20, false))
            .unwrap();
        assert_eq!((status, href.as_str()), (CreateStatus::Updated, "/upt_0_mr_0"));

        let list = registry.fetch_meter_readings("/upt_0", Page::all()).unwrap();
        assert_eq!(list.all, 1);
        let mr = &list.items[0];
        assert_eq!(mr.reading.as_ref().map(|r| r.value), Some(20));
        assert!(mr.reading_type.is_some());
        assert_eq!(
            mr.reading_type_link.as_ref().map(|l| l.href.as_str()),
            Some("/upt_0_mr_0_rt")
        );
    }

    #[test]
    fn test_new_reading_needs_type() {
        let registry = MirrorUsagePointRegistry::new(300);
        registry.create(mirror("A")).unwrap();
        let err = registry
            .create_reading("/mup_0", reading("R1", 1, false))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_reading_for_unknown_mirror() {
        let registry = MirrorUsagePointRegistry::new(300);
        assert!(matches!(
            registry.create_reading("/mup_4", reading("R1", 1, true)),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            registry.create_reading("/edev_0", reading("R1", 1, true)),
            Err(StoreError::InvalidHref(_))
        ));
    }

    #[test]
    fn test_readings_posted_with_mirror() {
        let registry = MirrorUsagePointRegistry::new(300);
        let mut mup = mirror("A");
        mup.mirror_meter_readings = vec![reading("R1", 1, true), reading("R2", 2, true)];
        registry.create(mup).unwrap();
        let list = registry.fetch_meter_readings("/upt_0", Page::all()).unwrap();
        assert_eq!(list.results, 2);
    }

    #[test]
    fn test_rejected_mirror_is_not_stored() {
        let registry = MirrorUsagePointRegistry::new(300);
        let mut mup = mirror("A");
        mup.mirror_meter_readings = vec![reading("R1", 1, true), reading("R2", 2, false)];
        assert!(matches!(
            registry.create(mup),
            Err(StoreError::InvalidRequest(_))
        ));
        assert!(registry.is_empty());
        assert!(matches!(
            registry.fetch_mirror("/mup_0"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            registry.fetch_usage_point("/upt_0"),
            Err(StoreError::NotFound(_))
        ));

        // A valid retry is a fresh create
        let mut mup = mirror("A");
        mup.mirror_meter_readings = vec![reading("R1", 1, true)];
        let (status, href) = registry.create(mup).unwrap();
        assert_eq!((status, href.as_str()), (CreateStatus::Created, "/mup_0"));
    }

    #[test]
    fn test_rejected_update_keeps_previous_mirror() {
        let registry = MirrorUsagePointRegistry::new(300);
        let mut mup = mirror("A");
        mup.mirror_meter_readings = vec![reading("R1", 1, true)];
        registry.create(mup).unwrap();

        let mut changed = mirror("A");
        changed.description = Some("renamed".into());
        changed.mirror_meter_readings = vec![reading("R1", 5, false), reading("R9", 9, false)];
        assert!(matches!(
            registry.create(changed),
            Err(StoreError::InvalidRequest(_))
        ));
        assert_eq!(
            registry.fetch_mirror("/mup_0").unwrap().description.as_deref(),
            Some("mirror A")
        );
        let list = registry.fetch_meter_readings("/upt_0", Page::all()).unwrap();
        assert_eq!(list.all, 1);
        assert_eq!(list.items[0].reading.as_ref().map(|r| r.value), Some(1));

        // Untyped updates of known readings are fine
        let mut changed = mirror("A");
        changed.mirror_meter_readings = vec![reading("R1", 5, false)];
        let (status, _) = registry.create(changed).unwrap();
        assert_eq!(status, CreateStatus::Updated);
    }

    #[test]
    fn test_list_and_offset_lookup() {
        let registry = MirrorUsagePointRegistry::new(300);
        for m in ["A", "B", "C", "D"] {
            registry.create(mirror(m)).unwrap();
        }
        let list = registry.fetch_list(Page::new(1, 2));
        assert_eq!((list.all, list.results), (4, 2));
        assert_eq!(list.poll_rate, Some(300));

        assert_eq!(registry.fetch_at(Some(1), Some(1)).unwrap().mrid, "D");
        assert_eq!(registry.fetch_at(None, Some(0)).unwrap().mrid, "B");
        assert_eq!(registry.fetch_at(None, None).unwrap().mrid, "A");
        assert!(registry.fetch_at(Some(4), None).is_err());

        assert_eq!(registry.fetch_usage_point_list(Page::all()).all, 4);
        assert_eq!(registry.fetch_mirror("/mup_2").unwrap().mrid, "C");
    }

    #[test]
    fn test_snapshots_persisted() {
        let index = Arc::new(HrefIndex::new(Arc::new(MemoryPointStore::new())));
        let registry = MirrorUsagePointRegistry::with_index(300, index.clone());
        registry.create(mirror("A")).unwrap();
        let upt: Option<UsagePoint> = index.get("/upt_0").unwrap();
        assert_eq!(upt.map(|u| u.mrid), Some("A".to_string()));
    }
}
