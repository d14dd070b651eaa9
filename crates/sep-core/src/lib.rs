//! sep-core - Core types for IEEE 2030.5 (SEP 2.0) servers
//!
//! This crate provides the pieces every other layer builds on:
//!
//! - [`models`]: typed protocol resources (EndDevice, DERProgram, DERControl, ...)
//!   and the list envelopes used to report paginated collections
//! - [`href`]: the `_`-separated addressing grammar that encodes parent/child
//!   relationships into resource paths
//! - [`identity`]: LFDI/SFDI derivation from certificate fingerprints
//! - [`persistence`]: the byte-oriented key/value collaborator used for
//!   resource snapshots

pub mod error;
pub mod href;
pub mod identity;
pub mod models;
pub mod persistence;

pub use error::{StoreError, StoreResult};
pub use href::{Href, HrefError, NO_INDEX, SEP};
pub use identity::{lfdi_from_fingerprint, sfdi_from_lfdi, IdentityError, Lfdi, Sfdi};
pub use models::*;
pub use persistence::{FsPointStore, MemoryPointStore, PointStore};
