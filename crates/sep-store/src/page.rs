//! Pagination
//!
//! Two conventions coexist and are kept apart on purpose:
//!
//! - [`Page`] slices a collection (`start`, `limit`) and fills a list envelope.
//! - [`offset_index`] resolves a single item from `start`/`after` query values
//!   as `after + 1 + start`.

use serde::{Deserialize, Serialize};

use sep_core::{ListEnvelope, Resource};

/// Slice request for a list resource. Defaults to `start=0, after=0, limit=1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    /// First item index
    #[serde(rename = "s")]
    pub start: usize,
    /// Accepted for query compatibility, not used by slicing
    #[serde(rename = "a")]
    pub after: usize,
    /// Maximum items; 0 means "all from start"
    #[serde(rename = "l")]
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            start: 0,
            after: 0,
            limit: 1,
        }
    }
}

impl Page {
    pub fn new(start: usize, limit: usize) -> Self {
        Self {
            start,
            after: 0,
            limit,
        }
    }

    /// Every item
    pub fn all() -> Self {
        Self::new(0, 0)
    }

    pub fn with_after(mut self, after: usize) -> Self {
        self.after = after;
        self
    }

    /// Apply the slice rule.
    ///
    /// `start` past the end yields nothing, `limit == 0` yields everything
    /// from `start`, otherwise at most `limit` items.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        if self.start > items.len() {
            return &[];
        }
        let end = if self.limit == 0 {
            items.len()
        } else {
            self.start.saturating_add(self.limit).min(items.len())
        };
        &items[self.start..end]
    }
}

/// Fill `envelope` with a page of `items`. `all` is always the full count.
pub fn paginate<T, L>(items: &[T], mut envelope: L, page: Page) -> L
where
    T: Resource,
    L: ListEnvelope<T>,
{
    let slice = page.slice(items);
    envelope.set_results(slice.len());
    envelope.set_all(items.len());
    envelope.set_items(slice.to_vec());
    envelope
}

/// Index addressed by optional `start`/`after` query values.
///
/// Both given: `after + 1 + start`; only `start`: `start`; only `after`:
/// `after + 1`; neither: 0. Saturates at `usize::MAX`.
pub fn offset_index(start: Option<usize>, after: Option<usize>) -> usize {
    match (start, after) {
        (Some(s), Some(a)) => a.saturating_add(1).saturating_add(s),
        (Some(s), None) => s,
        (None, Some(a)) => a.saturating_add(1),
        (None, None) => 0,
    }
}
