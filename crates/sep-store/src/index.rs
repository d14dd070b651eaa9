//! Href snapshot index
//!
//! Caches the serialized form of each resource by href and writes it through
//! to a [`PointStore`] only when the bytes differ from the last write.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use sep_core::{PointStore, StoreResult};

#[derive(Debug, Clone)]
struct Snapshot {
    bytes: Bytes,
    added: DateTime<Utc>,
    last_written: DateTime<Utc>,
}

/// Write-through cache of resource snapshots keyed by href
#[derive(Debug)]
pub struct HrefIndex {
    points: Arc<dyn PointStore>,
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl HrefIndex {
    pub fn new(points: Arc<dyn PointStore>) -> Self {
        Self {
            points,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Record `value` under `href`. Returns whether the point store was written.
    pub fn put<S: Serialize>(&self, href: &str, value: &S) -> StoreResult<bool> {
        let bytes = Bytes::from(serde_json::to_vec(value)?);
        let now = Utc::now();

        let mut snapshots = self.snapshots.write();
        if let Some(existing) = snapshots.get(href) {
            if existing.bytes == bytes {
                return Ok(false);
            }
        }

        self.points.set(href, bytes.clone())?;
        let added = snapshots.get(href).map(|s| s.added).unwrap_or(now);
        snapshots.insert(
            href.to_string(),
            Snapshot {
                bytes,
                added,
                last_written: now,
            },
        );
        trace!(href = %href, "Snapshot written");
        Ok(true)
    }

    /// Read a typed snapshot, falling back to the point store for hrefs
    /// written by an earlier process
    pub fn get<T: DeserializeOwned>(&self, href: &str) -> StoreResult<Option<T>> {
        let cached = self.snapshots.read().get(href).map(|s| s.bytes.clone());
        let bytes = match cached {
            Some(bytes) => Some(bytes),
            None => self.points.get(href)?,
        };
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stored hrefs starting with `prefix`, sorted
    pub fn hrefs_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .points
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    /// When `href` was first and last written by this process
    pub fn timestamps(&self, href: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.snapshots
            .read()
            .get(href)
            .map(|s| (s.added, s.last_written))
    }
}
