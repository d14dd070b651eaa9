//! Device certificate access
//!
//! Only the fingerprint side is implemented; issuing certificates belongs to
//! an external CA.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use sep_core::{lfdi_from_fingerprint, IdentityError, Lfdi, Sfdi};

use crate::config::DeviceConfig;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("Failed to read certificate '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

pub type CertResult<T> = Result<T, CertError>;

/// Source of device certificate fingerprints
pub trait CertificateRepository: Send + Sync + std::fmt::Debug {
    /// Colon-delimited hex fingerprint of the device's certificate
    fn fingerprint(&self, device_id: &str) -> CertResult<String>;

    fn create_cert(&self, common_name: &str) -> CertResult<()>;

    fn lfdi(&self, device_id: &str) -> CertResult<Lfdi> {
        let fingerprint = self.fingerprint(device_id)?;
        Ok(lfdi_from_fingerprint(&fingerprint)?)
    }

    fn sfdi(&self, device_id: &str) -> CertResult<Sfdi> {
        Ok(self.lfdi(device_id)?.sfdi())
    }
}

/// SHA-256 of `der` as uppercase hex pairs joined by `:`
pub fn fingerprint_of(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    digest
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(":")
}

/// Certificates stored as `<dir>/<device id>.der`
#[derive(Debug, Clone)]
pub struct DerFileCertificates {
    dir: PathBuf,
}

impl DerFileCertificates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, device_id: &str) -> PathBuf {
        self.dir.join(format!("{}.der", device_id))
    }
}

impl CertificateRepository for DerFileCertificates {
    fn fingerprint(&self, device_id: &str) -> CertResult<String> {
        let path = self.path_for(device_id);
        let der = std::fs::read(&path).map_err(|source| CertError::Io { path, source })?;
        Ok(fingerprint_of(&der))
    }

    fn create_cert(&self, common_name: &str) -> CertResult<()> {
        Err(CertError::NotSupported(format!(
            "certificate issuance for '{}'",
            common_name
        )))
    }
}

/// Fingerprints listed in the device configuration
#[derive(Debug, Clone, Default)]
pub struct ConfiguredFingerprints {
    fingerprints: HashMap<String, String>,
}

impl ConfiguredFingerprints {
    pub fn from_devices(devices: &[DeviceConfig]) -> Self {
        let fingerprints = devices
            .iter()
            .filter_map(|d| d.fingerprint.clone().map(|fp| (d.id.clone(), fp)))
            .collect();
        Self { fingerprints }
    }

    pub fn insert(&mut self, device_id: impl Into<String>, fingerprint: impl Into<String>) {
        self.fingerprints.insert(device_id.into(), fingerprint.into());
    }
}

impl CertificateRepository for ConfiguredFingerprints {
    fn fingerprint(&self, device_id: &str) -> CertResult<String> {
        self.fingerprints
            .get(device_id)
            .cloned()
            .ok_or_else(|| CertError::UnknownDevice(device_id.to_string()))
    }

    fn create_cert(&self, common_name: &str) -> CertResult<()> {
        Err(CertError::NotSupported(format!(
            "certificate issuance for '{}'",
            common_name
        )))
    }
}

/// First configured device whose certificate hashes to `sfdi`.
/// Devices whose fingerprint cannot be read are skipped.
pub fn find_device_id_from_sfdi<'a>(
    certs: &dyn CertificateRepository,
    devices: &'a [DeviceConfig],
    sfdi: Sfdi,
) -> Option<&'a str> {
    devices
        .iter()
        .find(|d| certs.sfdi(&d.id).map(|s| s == sfdi).unwrap_or(false))
        .map(|d| d.id.as_str())
}
