//! Server configuration
//!
//! Loaded from TOML, or YAML when the file ends in `.yaml`/`.yml`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sep_core::{CurveData, DateTimeInterval, DerControlBase};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// How end devices come into existence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMode {
    /// Devices must register themselves
    #[default]
    EnddevicesRegisterAccessOnly,
    /// Every configured device is created at startup
    EnddevicesCreateOnStart,
}

/// Where device fingerprints come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LfdiMode {
    /// Hash of `<tls_repository>/<device id>.der`
    #[default]
    LfdiModeFromCertFingerprint,
    /// `fingerprint` field of each device entry
    LfdiModeFromFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub hostname: String,
    #[serde(default = "default_https_port")]
    pub https_port: u16,
    #[serde(default)]
    pub http_port: Option<u16>,
}

fn default_https_port() -> u16 {
    8443
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerConfig {
    /// Description of the program the DER currently follows
    #[serde(default)]
    pub program: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Certificate name; also the key for fingerprint lookup
    pub id: String,
    #[serde(default)]
    pub device_category: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub pin: u32,
    /// Program descriptions assigned to this device
    #[serde(default)]
    pub programs: Vec<String>,
    #[serde(default)]
    pub ders: Vec<DerConfig>,
    /// Used in `lfdi_mode_from_file`
    #[serde(default)]
    pub fingerprint: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub description: String,
    #[serde(default)]
    pub primacy: u8,
    #[serde(default)]
    pub mrid: Option<String>,
    pub default_control: String,
    #[serde(default)]
    pub controls: Vec<String>,
    #[serde(default)]
    pub curves: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    pub description: String,
    #[serde(default)]
    pub mrid: Option<String>,
    #[serde(default)]
    pub interval: Option<DateTimeInterval>,
    #[serde(default)]
    pub base: DerControlBase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveConfig {
    pub description: String,
    #[serde(default)]
    pub mrid: Option<String>,
    #[serde(default)]
    pub curve_type: u8,
    #[serde(default)]
    pub curve_data: Vec<CurveData>,
}

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSection,
    #[serde(default = "default_log_event_list_poll_rate")]
    pub log_event_list_poll_rate: u32,
    #[serde(default = "default_device_capability_poll_rate")]
    pub device_capability_poll_rate: u32,
    #[serde(default = "default_usage_point_post_rate")]
    pub usage_point_post_rate: u32,
    #[serde(default = "default_end_device_list_poll_rate")]
    pub end_device_list_poll_rate: u32,
    #[serde(default)]
    pub server_mode: ServerMode,
    #[serde(default)]
    pub lfdi_mode: LfdiMode,
    #[serde(default = "default_tls_repository")]
    pub tls_repository: PathBuf,
    /// File-backed snapshots when set, memory otherwise
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub programs: Vec<ProgramConfig>,
    #[serde(default)]
    pub controls: Vec<ControlConfig>,
    #[serde(default)]
    pub curves: Vec<CurveConfig>,
}

fn default_log_event_list_poll_rate() -> u32 {
    900
}

fn default_device_capability_poll_rate() -> u32 {
    900
}

fn default_usage_point_post_rate() -> u32 {
    300
}

fn default_end_device_list_poll_rate() -> u32 {
    86400
}

fn default_tls_repository() -> PathBuf {
    PathBuf::from("tls")
}

impl ServerConfig {
    /// Load and validate a config file, picking the format by extension
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "toml" => Self::from_toml_str(&content),
            "yaml" | "yml" => Self::from_yaml_str(&content),
            other => Err(ConfigError::UnsupportedFormat(format!(
                "'{}' ({})",
                other,
                path.display()
            ))),
        }
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross references between devices, programs, controls and curves
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.hostname.trim().is_empty() {
            return Err(ConfigError::Invalid("server.hostname is empty".into()));
        }
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid("no devices configured".into()));
        }

        let mut ids = HashSet::new();
        for device in &self.devices {
            if !ids.insert(device.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device id '{}'",
                    device.id
                )));
            }
            for program in &device.programs {
                self.program(program).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "device '{}' references unknown program '{}'",
                        device.id, program
                    ))
                })?;
            }
            for der in &device.ders {
                if let Some(program) = &der.program {
                    self.program(program).ok_or_else(|| {
                        ConfigError::Invalid(format!(
                            "DER of device '{}' references unknown program '{}'",
                            device.id, program
                        ))
                    })?;
                }
            }
            if self.lfdi_mode == LfdiMode::LfdiModeFromFile && device.fingerprint.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "device '{}' has no fingerprint (lfdi_mode_from_file)",
                    device.id
                )));
            }
        }

        let mut owned_controls = HashSet::new();
        for program in &self.programs {
            if self.control(&program.default_control).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "program '{}' default control '{}' not found",
                    program.description, program.default_control
                )));
            }
            for control in &program.controls {
                if self.control(control).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "program '{}' references unknown control '{}'",
                        program.description, control
                    )));
                }
                // A control is listed by at most one program
                if !owned_controls.insert(control.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "control '{}' is listed by more than one program",
                        control
                    )));
                }
            }
            for curve in &program.curves {
                if self.curve(curve).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "program '{}' references unknown curve '{}'",
                        program.description, curve
                    )));
                }
            }
        }

        Ok(())
    }

    /// `hostname:https_port`
    pub fn server_hostname(&self) -> String {
        format!("{}:{}", self.server.hostname, self.server.https_port)
    }

    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn program(&self, description: &str) -> Option<&ProgramConfig> {
        self.programs.iter().find(|p| p.description == description)
    }

    pub fn control(&self, description: &str) -> Option<&ControlConfig> {
        self.controls.iter().find(|c| c.description == description)
    }

    pub fn curve(&self, description: &str) -> Option<&CurveConfig> {
        self.curves.iter().find(|c| c.description == description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TOML: &str = r#"
server_mode = "enddevices_create_on_start"
lfdi_mode = "lfdi_mode_from_file"

[server]
hostname = "127.0.0.1"
https_port = 8443

[[devices]]
id = "dev1"
pin = 111115
programs = ["P1"]
fingerprint = "3E:4F:45:AB:31:ED:FE:5B:67:E3:43:E5:E4:56:2E:31:98:4E:23:E5"

[[devices.ders]]
program = "P1"

[[programs]]
description = "P1"
primacy = 89
default_control = "DC"
controls = ["C1"]
curves = ["VV"]

[[controls]]
description = "DC"

[controls.base]
opModConnect = true

[[controls]]
description = "C1"
interval = { start = 1000, duration = 500 }

[controls.base]
opModMaxLimW = 9000

[[curves]]
description = "VV"
curve_type = 11
curve_data = [{ x = 92.0, y = 30.0 }, { x = 108.0, y = -30.0 }]
"#;

    #[test]
    fn test_toml_config() {
        let config = ServerConfig::from_toml_str(TOML).unwrap();
        assert_eq!(config.server_mode, ServerMode::EnddevicesCreateOnStart);
        assert_eq!(config.lfdi_mode, LfdiMode::LfdiModeFromFile);
        assert_eq!(config.server_hostname(), "127.0.0.1:8443");
        assert_eq!(config.log_event_list_poll_rate, 900);
        assert_eq!(config.end_device_list_poll_rate, 86400);
        assert_eq!(config.usage_point_post_rate, 300);

        let device = config.device("dev1").unwrap();
        assert!(device.enabled);
        assert_eq!(device.ders, vec![DerConfig { program: Some("P1".into()) }]);

        assert_eq!(config.control("DC").unwrap().base.op_mod_connect, Some(true));
        let c1 = config.control("C1").unwrap();
        assert_eq!(c1.interval, Some(DateTimeInterval::new(1000, 500)));
        assert_eq!(c1.base.op_mod_max_lim_w, Some(9000));
        assert_eq!(config.curve("VV").unwrap().curve_data.len(), 2);
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
server:
  hostname: server.local
devices:
  - id: dev1
    pin: 1234
programs:
  - description: P1
    default_control: DC
controls:
  - description: DC
"#;
        let config = ServerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.server.https_port, 8443);
        assert_eq!(config.server_mode, ServerMode::EnddevicesRegisterAccessOnly);
        assert_eq!(config.lfdi_mode, LfdiMode::LfdiModeFromCertFingerprint);
        assert_eq!(config.tls_repository, PathBuf::from("tls"));
    }

    fn invalid(toml: &str) -> String {
        match ServerConfig::from_toml_str(toml) {
            Err(ConfigError::Invalid(msg)) => msg,
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_default_control() {
        let msg = invalid(
            r#"
[server]
hostname = "h"
[[devices]]
id = "d"
[[programs]]
description = "P"
default_control = "nope"
"#,
        );
        assert!(msg.contains("default control 'nope'"), "{}", msg);
    }

    #[test]
    fn test_no_devices() {
        let msg = invalid("[server]\nhostname = \"h\"\n");
        assert_eq!(msg, "no devices configured");
    }

    #[test]
    fn test_duplicate_device() {
        let msg = invalid(
            r#"
[server]
hostname = "h"
[[devices]]
id = "d"
[[devices]]
id = "d"
"#,
        );
        assert!(msg.contains("duplicate device id"), "{}", msg);
    }

    #[test]
    fn test_control_shared_between_programs() {
        let msg = invalid(
            r#"
[server]
hostname = "h"
[[devices]]
id = "d"
[[programs]]
description = "A"
default_control = "C"
controls = ["C"]
[[programs]]
description = "B"
default_control = "C"
controls = ["C"]
[[controls]]
description = "C"
"#,
        );
        assert!(msg.contains("more than one program"), "{}", msg);
    }

    #[test]
    fn test_from_file_requires_fingerprint() {
        let msg = invalid(
            r#"
lfdi_mode = "lfdi_mode_from_file"
[server]
hostname = "h"
[[devices]]
id = "d"
"#,
        );
        assert!(msg.contains("no fingerprint"), "{}", msg);
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("server.toml");
        std::fs::write(&toml_path, TOML).unwrap();
        assert!(ServerConfig::load(&toml_path).is_ok());

        let ini_path = dir.path().join("server.ini");
        std::fs::write(&ini_path, TOML).unwrap();
        assert!(matches!(
            ServerConfig::load(&ini_path),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        assert!(matches!(
            ServerConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
