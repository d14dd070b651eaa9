//! sepd - IEEE 2030.5 server daemon
//!
//! Loads a [`ServerConfig`], builds the resource tree into a
//! [`ServerContext`] and drives DER control activation from a clock.

pub mod certs;
pub mod config;
pub mod context;
pub mod init;

pub use certs::{
    fingerprint_of, find_device_id_from_sfdi, CertError, CertResult, CertificateRepository,
    ConfiguredFingerprints, DerFileCertificates,
};
pub use config::{
    ConfigError, ConfigResult, ControlConfig, CurveConfig, DerConfig, DeviceConfig, LfdiMode,
    ProgramConfig, ServerConfig, ServerMode, ServerSection,
};
pub use context::ServerContext;
pub use init::{stable_mrid, InitError, InitReport, InitResult};
