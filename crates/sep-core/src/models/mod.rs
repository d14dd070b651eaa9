//! Resource models for the 2030.5 function sets

mod der;
mod device;
mod list;
mod log;
mod metering;
mod resource;

pub use der::*;
pub use device::*;
pub use list::*;
pub use log::*;
pub use metering::*;
pub use resource::*;

use serde::{Deserialize, Serialize};

/// Reference to a single resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// Reference to a list resource, optionally with its size
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLink {
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all: Option<usize>,
}

impl ListLink {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            all: None,
        }
    }

    pub fn with_all(mut self, all: usize) -> Self {
        self.all = Some(all);
        self
    }
}
