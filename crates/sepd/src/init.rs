//! Resource initialization
//!
//! Builds curves, controls, programs and (in `enddevices_create_on_start`
//! mode) end devices from the configuration. Items whose mRID is already
//! stored are left alone, so running it twice does not duplicate anything.

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sep_core::href::{
    CollectionHref, CollectionRoot, DerProgramHref, DerProgramSubType, DerSubType, EdevHref,
    EdevSubType, FsaHref, FsaSubType,
};
use sep_core::{
    Der, DerControl, DerCurve, DerProgram, DeviceInformation, DeviceStatus, EndDevice,
    FunctionSetAssignments, Lfdi, Link, ListLink, Registration, StoreError,
};
use sep_store::CreateStatus;

use crate::config::{DeviceConfig, ServerMode};
use crate::context::ServerContext;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type InitResult<T> = Result<T, InitError>;

/// What [`ServerContext::initialize`] created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub curves: usize,
    pub controls: usize,
    pub programs: usize,
    pub end_devices: usize,
    /// Device ids whose SFDI was already registered
    pub skipped_devices: Vec<String>,
    /// Device ids whose identity could not be derived
    pub failed_devices: Vec<String>,
}

/// mRID derived from a resource kind and description.
/// The same inputs always give the same 32 uppercase hex characters.
pub fn stable_mrid(kind: &str, description: &str) -> String {
    let name = format!("{}:{}", kind, description);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
        .simple()
        .to_string()
        .to_ascii_uppercase()
}

fn invalid(msg: String) -> InitError {
    InitError::InvalidConfig(msg)
}

impl ServerContext {
    /// Populate the stores from the configuration. `now` stamps creation
    /// and registration times.
    pub fn initialize(&self, now: i64) -> InitResult<InitReport> {
        let mut report = InitReport {
            curves: self.init_curves()?,
            controls: self.init_controls(now)?,
            programs: self.init_programs()?,
            ..InitReport::default()
        };

        let create = self.config().server_mode == ServerMode::EnddevicesCreateOnStart;
        for device in &self.config().devices {
            let lfdi = match self.certs().lfdi(&device.id) {
                Ok(lfdi) => lfdi,
                Err(e) => {
                    error!(device = %device.id, error = %e, "Failed to derive device identity");
                    report.failed_devices.push(device.id.clone());
                    continue;
                }
            };
            self.register_lfdi(&lfdi, device.clone());

            if !create {
                continue;
            }
            match self.add_end_device(device, &lfdi, now)? {
                (CreateStatus::Created, href) => {
                    info!(device = %device.id, href = %href, sfdi = lfdi.sfdi(), "End device created");
                    report.end_devices += 1;
                }
                (CreateStatus::Updated, href) => {
                    debug!(device = %device.id, href = %href, "End device already registered");
                    report.skipped_devices.push(device.id.clone());
                }
            }
        }

        info!(
            curves = report.curves,
            controls = report.controls,
            programs = report.programs,
            end_devices = report.end_devices,
            failed = report.failed_devices.len(),
            "Resources initialized"
        );
        Ok(report)
    }

    /// Create the end device of a configured device on first contact.
    /// Only LFDIs known from the configuration are accepted.
    pub fn register_end_device(&self, lfdi: &str, now: i64) -> InitResult<(CreateStatus, String)> {
        let device = self
            .device_config_for_lfdi(lfdi)
            .ok_or_else(|| StoreError::not_found(format!("device with LFDI {}", lfdi)))?;
        let lfdi = Lfdi::new(lfdi).map_err(StoreError::from)?;
        self.add_end_device(&device, &lfdi, now)
    }

    fn init_curves(&self) -> InitResult<usize> {
        let mut curves = self.curves().write();
        let mut added = 0;
        for cfg in &self.config().curves {
            let mrid = cfg
                .mrid
                .clone()
                .unwrap_or_else(|| stable_mrid("curve", &cfg.description));
            if curves.fetch_by_mrid(&mrid).is_some() {
                continue;
            }
            curves.add(DerCurve {
                href: None,
                mrid: Some(mrid),
                description: Some(cfg.description.clone()),
                curve_type: cfg.curve_type,
                curve_data: cfg.curve_data.clone(),
            })?;
            added += 1;
        }
        Ok(added)
    }

    fn init_controls(&self, now: i64) -> InitResult<usize> {
        let mut controls = self.controls().write();
        let mut added = 0;
        for cfg in &self.config().controls {
            let mrid = cfg
                .mrid
                .clone()
                .unwrap_or_else(|| stable_mrid("control", &cfg.description));
            if controls.fetch_by_mrid(&mrid).is_some() {
                continue;
            }
            controls.add(DerControl {
                href: None,
                mrid: Some(mrid),
                description: Some(cfg.description.clone()),
                creation_time: now,
                interval: cfg.interval,
                event_status: None,
                der_control_base: cfg.base.clone(),
            })?;
            added += 1;
        }
        Ok(added)
    }

    fn init_programs(&self) -> InitResult<usize> {
        let controls = self.controls().read();
        let curves = self.curves().read();
        let mut programs = self.programs().write();
        let mut added = 0;

        for cfg in &self.config().programs {
            let mrid = cfg
                .mrid
                .clone()
                .unwrap_or_else(|| stable_mrid("program", &cfg.description));
            if programs.fetch_by_mrid(&mrid).is_some() {
                continue;
            }

            let control_for = |description: &str| {
                controls
                    .fetch_by_property(|c| c.description.as_deref(), description)
                    .cloned()
                    .ok_or_else(|| {
                        invalid(format!(
                            "program '{}' references unknown control '{}'",
                            cfg.description, description
                        ))
                    })
            };
            let default_control = control_for(&cfg.default_control)?;

            let program_href = DerProgramHref::program(programs.len());
            let sub = |t: DerProgramSubType| program_href.with_subtype(t).to_string();
            let index = programs.add(DerProgram {
                href: None,
                mrid: Some(mrid),
                description: Some(cfg.description.clone()),
                primacy: cfg.primacy,
                active_der_control_list_link: Some(ListLink::new(sub(
                    DerProgramSubType::ActiveControls,
                ))),
                default_der_control_link: Some(Link::new(sub(DerProgramSubType::DefaultControl))),
                der_control_list_link: Some(
                    ListLink::new(sub(DerProgramSubType::Controls)).with_all(cfg.controls.len()),
                ),
                der_curve_list_link: Some(
                    ListLink::new(sub(DerProgramSubType::Curves)).with_all(cfg.curves.len()),
                ),
            })?;

            for description in &cfg.controls {
                let control = control_for(description)?;
                programs.add_replace_child(index, DerProgramSubType::Controls.token(), control, None)?;
            }
            programs.add_replace_child(
                index,
                DerProgramSubType::DefaultControl.token(),
                default_control,
                Some(sub(DerProgramSubType::DefaultControl)),
            )?;
            for description in &cfg.curves {
                let curve = curves
                    .fetch_by_property(|c| c.description.as_deref(), description.as_str())
                    .cloned()
                    .ok_or_else(|| {
                        invalid(format!(
                            "program '{}' references unknown curve '{}'",
                            cfg.description, description
                        ))
                    })?;
                programs.add_replace_child(index, DerProgramSubType::Curves.token(), curve, None)?;
            }

            debug!(
                program = %program_href,
                controls = cfg.controls.len(),
                curves = cfg.curves.len(),
                "Program created"
            );
            added += 1;
        }
        Ok(added)
    }

    fn program_by_description(&self, description: &str) -> InitResult<DerProgram> {
        self.programs()
            .read()
            .fetch_by_property(|p| p.description.as_deref(), description)
            .cloned()
            .ok_or_else(|| invalid(format!("unknown program '{}'", description)))
    }

    /// Add `device` with its registration, information, status, function set
    /// assignment and DERs. Returns `Updated` with the existing href when the
    /// SFDI is already registered.
    fn add_end_device(
        &self,
        device: &DeviceConfig,
        lfdi: &Lfdi,
        now: i64,
    ) -> InitResult<(CreateStatus, String)> {
        let sfdi = lfdi.sfdi();

        // Resolve programs before locking the end device store
        let programs = device
            .programs
            .iter()
            .map(|p| self.program_by_description(p))
            .collect::<InitResult<Vec<_>>>()?;
        let der_programs = device
            .ders
            .iter()
            .map(|der| {
                der.program
                    .as_deref()
                    .map(|p| self.program_by_description(p))
                    .transpose()
            })
            .collect::<InitResult<Vec<_>>>()?;

        let mut end_devices = self.end_devices().write();
        if let Some(existing) = end_devices.fetch_by_property(|d| Some(&d.sfdi), &sfdi) {
            return Ok((
                CreateStatus::Updated,
                existing.href.clone().unwrap_or_default(),
            ));
        }

        let edev = EdevHref::device(end_devices.len());
        let sub = |t: EdevSubType| edev.with_subtype(t).to_string();

        let index = end_devices.add(EndDevice {
            href: None,
            lfdi: Some(lfdi.clone()),
            sfdi,
            device_category: device.device_category.clone(),
            enabled: device.enabled,
            changed_time: now,
            registration_link: Some(Link::new(sub(EdevSubType::Registration))),
            device_information_link: Some(Link::new(sub(EdevSubType::DeviceInformation))),
            device_status_link: Some(Link::new(sub(EdevSubType::DeviceStatus))),
            function_set_assignments_list_link: (!programs.is_empty()).then(|| {
                ListLink::new(sub(EdevSubType::FunctionSetAssignments)).with_all(1)
            }),
            der_list_link: (!device.ders.is_empty())
                .then(|| ListLink::new(sub(EdevSubType::Der)).with_all(device.ders.len())),
            log_event_list_link: Some(ListLink::new(sub(EdevSubType::LogEventList))),
        })?;
        let href = edev.to_string();

        end_devices.add_replace_child(
            index,
            EdevSubType::Registration.token(),
            Registration {
                href: None,
                pin: device.pin,
                date_time_registered: now,
            },
            Some(sub(EdevSubType::Registration)),
        )?;
        end_devices.add_replace_child(
            index,
            EdevSubType::DeviceInformation.token(),
            DeviceInformation {
                lfdi: Some(lfdi.clone()),
                ..DeviceInformation::default()
            },
            Some(sub(EdevSubType::DeviceInformation)),
        )?;
        end_devices.add_replace_child(
            index,
            EdevSubType::DeviceStatus.token(),
            DeviceStatus {
                changed_time: now,
                ..DeviceStatus::default()
            },
            Some(sub(EdevSubType::DeviceStatus)),
        )?;

        if !programs.is_empty() {
            let assignment = self.add_function_set_assignment(device, programs)?;
            end_devices.add_replace_child(
                index,
                EdevSubType::FunctionSetAssignments.token(),
                assignment,
                None,
            )?;
        }

        for (position, program) in der_programs.into_iter().enumerate() {
            let der_href = edev
                .with_subtype(EdevSubType::Der)
                .with_subtype_index(position);
            let link = |t: DerSubType| Some(Link::new(der_href.with_der_subtype(t).to_string()));
            let current_program = match program {
                Some(p) => match p.href {
                    Some(h) => Some(Link::new(h)),
                    None => {
                        warn!(device = %device.id, "Assigned program has no href");
                        None
                    }
                },
                None => None,
            };
            end_devices.add_replace_child(
                index,
                EdevSubType::Der.token(),
                Der {
                    href: None,
                    der_capability_link: link(DerSubType::Capability),
                    der_settings_link: link(DerSubType::Settings),
                    der_status_link: link(DerSubType::Status),
                    der_availability_link: link(DerSubType::Availability),
                    current_der_program_link: current_program,
                },
                None,
            )?;
        }

        Ok((CreateStatus::Created, href))
    }

    fn add_function_set_assignment(
        &self,
        device: &DeviceConfig,
        programs: Vec<DerProgram>,
    ) -> InitResult<FunctionSetAssignments> {
        let mut assignments = self.function_set_assignments().write();
        let fsa = FsaHref::assignment(assignments.len());
        let index = assignments.add(FunctionSetAssignments {
            href: None,
            mrid: Some(stable_mrid("fsa", &device.id)),
            description: Some(format!("{} assignments", device.id)),
            subscribable: false,
            der_program_list_link: Some(
                ListLink::new(fsa.with_subtype(FsaSubType::DerPrograms).to_string())
                    .with_all(programs.len()),
            ),
            time_link: Some(Link::new(
                CollectionHref::root(CollectionRoot::Time).to_string(),
            )),
        })?;
        for program in programs {
            assignments.add_replace_child(index, FsaSubType::DerPrograms.token(), program, None)?;
        }
        Ok(assignments.fetch(index)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sep_core::{EventStatusKind, MemoryPointStore};
    use std::sync::Arc;

    use crate::certs::ConfiguredFingerprints;
    use crate::config::ServerConfig;

    const FP1: &str = "3E:4F:45:AB:31:ED:FE:5B:67:E3:43:E5:E4:56:2E:31:98:4E:23:E5";
    const FP2: &str = "11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF:00:11:22:33:44";
    const LFDI1: &str = "3E4F45AB31EDFE5B67E343E5E4562E31984E23E5";

    fn config_toml(mode: &str) -> String {
        format!(
            r#"
server_mode = "{mode}"
lfdi_mode = "lfdi_mode_from_file"

[server]
hostname = "localhost"

[[devices]]
id = "inverter"
pin = 111115
device_category = "0x0200"
programs = ["Solar"]
fingerprint = "{FP1}"
ders = [{{ program = "Solar" }}, {{}}]

[[devices]]
id = "meter"
pin = 222220
fingerprint = "{FP2}"

[[devices]]
id = "broken"
fingerprint = "AB:CD"

[[programs]]
description = "Solar"
primacy = 1
default_control = "Normal"
controls = ["Curtail", "Export"]
curves = ["VoltVar"]

[[programs]]
description = "Backup"
mrid = "B0000000000000000000000000000001"
default_control = "Normal"

[[controls]]
description = "Normal"

[[controls]]
description = "Curtail"
interval = {{ start = 1000, duration = 600 }}

[[controls]]
description = "Export"
mrid = "E0000000000000000000000000000001"
interval = {{ start = 2000, duration = 60 }}

[[curves]]
description = "VoltVar"
curve_type = 11
curve_data = [{{ x = 95.0, y = 20.0 }}]
"#
        )
    }

    fn context(mode: &str) -> ServerContext {
        let config = ServerConfig::from_toml_str(&config_toml(mode)).unwrap();
        let certs = Arc::new(ConfiguredFingerprints::from_devices(&config.devices));
        ServerContext::new(config, certs, Arc::new(MemoryPointStore::new()))
    }

    #[test]
    fn test_stable_mrid() {
        let a = stable_mrid("control", "Curtail");
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(a, stable_mrid("control", "Curtail"));
        assert_ne!(a, stable_mrid("program", "Curtail"));
    }

    #[test]
    fn test_programs_controls_curves() {
        let ctx = context("enddevices_register_access_only");
        let report = ctx.initialize(500).unwrap();
        assert_eq!(report.curves, 1);
        assert_eq!(report.controls, 3);
        assert_eq!(report.programs, 2);
        assert_eq!(report.end_devices, 0);
        assert_eq!(report.failed_devices, vec!["broken".to_string()]);

        let controls = ctx.controls().read();
        let curtail = controls.fetch(1).unwrap();
        assert_eq!(curtail.href.as_deref(), Some("/derc_1"));
        assert_eq!(curtail.creation_time, 500);
        assert_eq!(curtail.event_status, None);
        assert_eq!(curtail.mrid, Some(stable_mrid("control", "Curtail")));
        assert_eq!(
            controls.fetch(2).unwrap().mrid.as_deref(),
            Some("E0000000000000000000000000000001")
        );
        assert_eq!(ctx.curves().read().fetch(0).unwrap().href.as_deref(), Some("/dc_0"));

        let programs = ctx.programs().read();
        let solar = programs.fetch(0).unwrap();
        assert_eq!(solar.href.as_deref(), Some("/derp_0"));
        assert_eq!(
            solar.active_der_control_list_link,
            Some(ListLink::new("/derp_0_derca"))
        );
        assert_eq!(solar.default_der_control_link, Some(Link::new("/derp_0_dderc")));
        assert_eq!(
            solar.der_control_list_link,
            Some(ListLink::new("/derp_0_derc").with_all(2))
        );
        assert_eq!(solar.der_curve_list_link, Some(ListLink::new("/derp_0_dc").with_all(1)));

        let derc: Vec<DerControl> = programs.fetch_children(0, "derc").unwrap();
        let hrefs: Vec<&str> = derc.iter().filter_map(|c| c.href.as_deref()).collect();
        assert_eq!(hrefs, vec!["/derc_1", "/derc_2"]);

        let dderc: &DerControl = programs.fetch_child(0, "dderc", 0).unwrap();
        assert_eq!(dderc.href.as_deref(), Some("/derp_0_dderc"));
        assert_eq!(dderc.description.as_deref(), Some("Normal"));

        let dc: Vec<DerCurve> = programs.fetch_children(0, "dc").unwrap();
        assert_eq!(dc[0].href.as_deref(), Some("/dc_0"));

        assert_eq!(programs.size_children(1, "derc").unwrap(), 0);
        assert_eq!(
            programs.fetch(1).unwrap().mrid.as_deref(),
            Some("B0000000000000000000000000000001")
        );

        // register_access_only still knows configured identities
        assert_eq!(ctx.device_pin(LFDI1), Some(111115));
        assert!(ctx.end_devices().read().is_empty());
    }

    #[test]
    fn test_end_devices_created_on_start() {
        let ctx = context("enddevices_create_on_start");
        let report = ctx.initialize(500).unwrap();
        assert_eq!(report.end_devices, 2);

        let edevs = ctx.end_devices().read();
        let inverter = edevs.fetch(0).unwrap();
        assert_eq!(inverter.href.as_deref(), Some("/edev_0"));
        assert_eq!(inverter.sfdi, 167261211391);
        assert_eq!(inverter.device_category.as_deref(), Some("0x0200"));
        assert_eq!(inverter.registration_link, Some(Link::new("/edev_0_rg")));
        assert_eq!(
            inverter.function_set_assignments_list_link,
            Some(ListLink::new("/edev_0_fsa").with_all(1))
        );
        assert_eq!(inverter.der_list_link, Some(ListLink::new("/edev_0_der").with_all(2)));

        let rg: &Registration = edevs.fetch_child(0, "rg", 0).unwrap();
        assert_eq!(rg.href.as_deref(), Some("/edev_0_rg"));
        assert_eq!(rg.pin, 111115);
        assert_eq!(rg.date_time_registered, 500);
        let di: &DeviceInformation = edevs.fetch_child(0, "di", 0).unwrap();
        assert_eq!(di.lfdi.as_ref().map(Lfdi::as_str), Some(LFDI1));

        let fsa: &FunctionSetAssignments = edevs.fetch_child(0, "fsa", 0).unwrap();
        assert_eq!(fsa.href.as_deref(), Some("/fsa_0"));
        let fsa_programs: Vec<DerProgram> = ctx
            .function_set_assignments()
            .read()
            .fetch_children(0, "derp")
            .unwrap();
        assert_eq!(fsa_programs[0].href.as_deref(), Some("/derp_0"));

        let ders: Vec<Der> = edevs.fetch_children(0, "der").unwrap();
        assert_eq!(ders.len(), 2);
        assert_eq!(ders[0].href.as_deref(), Some("/edev_0_der_0"));
        assert_eq!(
            ders[0].der_capability_link,
            Some(Link::new("/edev_0_der_0_dercap"))
        );
        assert_eq!(ders[0].current_der_program_link, Some(Link::new("/derp_0")));
        assert_eq!(ders[1].current_der_program_link, None);

        let meter = edevs.fetch(1).unwrap();
        assert_eq!(meter.function_set_assignments_list_link, None);
        assert_eq!(meter.der_list_link, None);
    }

    #[test]
    fn test_initialize_twice_is_stable() {
        let ctx = context("enddevices_create_on_start");
        ctx.initialize(500).unwrap();
        let first_mrids: Vec<Option<String>> =
            ctx.controls().read().items().iter().map(|c| c.mrid.clone()).collect();

        let again = ctx.initialize(900).unwrap();
        assert_eq!(again.controls, 0);
        assert_eq!(again.programs, 0);
        assert_eq!(again.end_devices, 0);
        assert_eq!(again.skipped_devices, vec!["inverter".to_string(), "meter".to_string()]);

        let mrids: Vec<Option<String>> =
            ctx.controls().read().items().iter().map(|c| c.mrid.clone()).collect();
        assert_eq!(mrids, first_mrids);
        assert_eq!(ctx.end_devices().read().len(), 2);
    }

    #[test]
    fn test_missing_default_control() {
        let mut config = ServerConfig::from_toml_str(&config_toml("enddevices_create_on_start")).unwrap();
        config.programs[0].default_control = "Missing".into();
        let certs = Arc::new(ConfiguredFingerprints::from_devices(&config.devices));
        let ctx = ServerContext::new(config, certs, Arc::new(MemoryPointStore::new()));

        match ctx.initialize(0) {
            Err(InitError::InvalidConfig(msg)) => assert!(msg.contains("Missing"), "{}", msg),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_register_end_device() {
        let ctx = context("enddevices_register_access_only");
        ctx.initialize(0).unwrap();

        let (status, href) = ctx.register_end_device(&LFDI1.to_lowercase(), 10).unwrap();
        assert_eq!(status, CreateStatus::Created);
        assert_eq!(href, "/edev_0");

        let (status, href) = ctx.register_end_device(LFDI1, 20).unwrap();
        assert_eq!(status, CreateStatus::Updated);
        assert_eq!(href, "/edev_0");

        let unknown = "0".repeat(40);
        assert!(matches!(
            ctx.register_end_device(&unknown, 0),
            Err(InitError::Store(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn test_register_with_lowercase_fingerprint() {
        let toml = config_toml("enddevices_register_access_only").replace(FP1, &FP1.to_lowercase());
        let config = ServerConfig::from_toml_str(&toml).unwrap();
        let certs = Arc::new(ConfiguredFingerprints::from_devices(&config.devices));
        let ctx = ServerContext::new(config, certs, Arc::new(MemoryPointStore::new()));
        ctx.initialize(0).unwrap();

        assert_eq!(ctx.device_pin(LFDI1), Some(111115));
        let (status, href) = ctx.register_end_device(LFDI1, 10).unwrap();
        assert_eq!(status, CreateStatus::Created);
        assert_eq!(href, "/edev_0");
        let (status, _) = ctx.register_end_device(&LFDI1.to_lowercase(), 20).unwrap();
        assert_eq!(status, CreateStatus::Updated);
    }

    #[test]
    fn test_snapshots_written_through() {
        let ctx = context("enddevices_create_on_start");
        ctx.initialize(0).unwrap();
        let control: DerControl = ctx.index().get("/derc_1").unwrap().unwrap();
        assert_eq!(control.description.as_deref(), Some("Curtail"));
        assert_eq!(control.status(), None::<EventStatusKind>);
        let edev: EndDevice = ctx.index().get("/edev_0").unwrap().unwrap();
        assert_eq!(edev.sfdi, 167261211391);
    }
}
