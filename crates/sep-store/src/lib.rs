//! sep-store - In-memory resource tree for IEEE 2030.5 servers
//!
//! [`ResourceStore`] holds one resource family in insertion order together
//! with the named child lists hanging off each item. Optional write-through
//! to a [`sep_core::PointStore`] goes via [`HrefIndex`].

pub mod index;
pub mod page;
pub mod store;
pub mod usage_point;

pub use index::HrefIndex;
pub use page::{offset_index, paginate, Page};
pub use store::{ResourceStore, SharedStore};
pub use usage_point::{CreateStatus, MirrorUsagePointRegistry};
