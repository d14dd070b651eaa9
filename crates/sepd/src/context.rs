//! Server context
//!
//! Holds the parsed configuration and every resource store. Created once at
//! startup and passed by reference to whatever needs it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use sep_control::DerControlScheduler;
use sep_core::href::{self, CollectionHref, CollectionRoot, EdevSubType, EDEV, MUP, UPT};
use sep_core::{
    DerControl, DerCurve, DerProgram, DeviceCapability, EndDevice, EndDeviceList,
    FsPointStore, FunctionSetAssignments, Lfdi, Link, ListLink, LogEvent, LogEventList,
    MemoryPointStore, PointStore, StoreResult,
};
use sep_store::{HrefIndex, MirrorUsagePointRegistry, Page, ResourceStore, SharedStore};

use crate::certs::{CertificateRepository, ConfiguredFingerprints, DerFileCertificates};
use crate::config::{DeviceConfig, LfdiMode, ServerConfig};

/// Configuration plus the resource tree built from it
#[derive(Debug)]
pub struct ServerContext {
    config: ServerConfig,
    certs: Arc<dyn CertificateRepository>,
    index: Arc<HrefIndex>,
    end_devices: SharedStore<EndDevice>,
    programs: SharedStore<DerProgram>,
    controls: SharedStore<DerControl>,
    curves: SharedStore<DerCurve>,
    fsa: SharedStore<FunctionSetAssignments>,
    usage_points: Arc<MirrorUsagePointRegistry>,
    /// LFDI -> device configuration
    lfdi_devices: RwLock<HashMap<String, DeviceConfig>>,
}

impl ServerContext {
    /// Context with empty stores backed by `points`
    pub fn new(
        config: ServerConfig,
        certs: Arc<dyn CertificateRepository>,
        points: Arc<dyn PointStore>,
    ) -> Self {
        let index = Arc::new(HrefIndex::new(points));
        Self {
            end_devices: ResourceStore::with_index(href::root(EDEV), index.clone()).shared(),
            programs: ResourceStore::with_index(href::root(href::DERP), index.clone()).shared(),
            controls: ResourceStore::with_index(
                CollectionHref::root(CollectionRoot::Controls).to_string(),
                index.clone(),
            )
            .shared(),
            curves: ResourceStore::with_index(
                CollectionHref::root(CollectionRoot::Curves).to_string(),
                index.clone(),
            )
            .shared(),
            fsa: ResourceStore::with_index(href::root(href::FSA), index.clone()).shared(),
            usage_points: Arc::new(MirrorUsagePointRegistry::with_index(
                config.usage_point_post_rate,
                index.clone(),
            )),
            lfdi_devices: RwLock::new(HashMap::new()),
            config,
            certs,
            index,
        }
    }

    /// Context with the point store and certificate source the config asks for
    pub fn from_config(config: ServerConfig) -> StoreResult<Self> {
        let points: Arc<dyn PointStore> = match &config.storage_path {
            Some(path) => {
                info!(path = %path.display(), "Using file-backed point store");
                Arc::new(FsPointStore::open(path)?)
            }
            None => Arc::new(MemoryPointStore::new()),
        };
        let certs: Arc<dyn CertificateRepository> = match config.lfdi_mode {
            LfdiMode::LfdiModeFromCertFingerprint => {
                Arc::new(DerFileCertificates::new(&config.tls_repository))
            }
            LfdiMode::LfdiModeFromFile => {
                Arc::new(ConfiguredFingerprints::from_devices(&config.devices))
            }
        };
        Ok(Self::new(config, certs, points))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn certs(&self) -> &dyn CertificateRepository {
        self.certs.as_ref()
    }

    pub fn index(&self) -> &Arc<HrefIndex> {
        &self.index
    }

    pub fn end_devices(&self) -> &SharedStore<EndDevice> {
        &self.end_devices
    }

    pub fn programs(&self) -> &SharedStore<DerProgram> {
        &self.programs
    }

    pub fn controls(&self) -> &SharedStore<DerControl> {
        &self.controls
    }

    pub fn curves(&self) -> &SharedStore<DerCurve> {
        &self.curves
    }

    pub fn function_set_assignments(&self) -> &SharedStore<FunctionSetAssignments> {
        &self.fsa
    }

    pub fn usage_points(&self) -> &Arc<MirrorUsagePointRegistry> {
        &self.usage_points
    }

    /// Scheduler over this context's program store. Status changes are
    /// mirrored into the control store.
    pub fn scheduler(&self) -> DerControlScheduler {
        DerControlScheduler::new(self.programs.clone()).with_controls(self.controls.clone())
    }

    pub(crate) fn register_lfdi(&self, lfdi: &Lfdi, device: DeviceConfig) {
        self.lfdi_devices
            .write()
            .insert(lfdi.as_str().to_string(), device);
    }

    /// Configuration of the device with this LFDI, if any
    pub fn device_config_for_lfdi(&self, lfdi: &str) -> Option<DeviceConfig> {
        self.lfdi_devices
            .read()
            .get(&lfdi.to_ascii_uppercase())
            .cloned()
    }

    pub fn device_pin(&self, lfdi: &str) -> Option<u32> {
        self.device_config_for_lfdi(lfdi).map(|d| d.pin)
    }

    /// The DeviceCapability resource as seen by the device with `lfdi`.
    /// Unknown devices get an end device list link without entries.
    pub fn device_capability(&self, lfdi: &str) -> DeviceCapability {
        let mut end_devices = ListLink::new(href::root(EDEV));
        if self.device_config_for_lfdi(lfdi).is_some() {
            end_devices = end_devices.with_all(1);
        }

        DeviceCapability {
            href: Some(CollectionHref::root(CollectionRoot::DeviceCapability).to_string()),
            poll_rate: self.config.device_capability_poll_rate,
            time_link: Some(Link::new(
                CollectionHref::root(CollectionRoot::Time).to_string(),
            )),
            end_device_list_link: Some(end_devices),
            mirror_usage_point_list_link: Some(ListLink::new(href::root(MUP))),
            usage_point_list_link: Some(ListLink::new(href::root(UPT))),
            response_set_list_link: Some(ListLink::new(
                CollectionHref::root(CollectionRoot::ResponseSets).to_string(),
            )),
        }
    }

    pub fn end_device_list(&self, page: Page) -> EndDeviceList {
        let envelope =
            EndDeviceList::new(href::root(EDEV)).with_poll_rate(self.config.end_device_list_poll_rate);
        self.end_devices.read().fetch_page(envelope, page)
    }

    /// Append a log event to a device's `lel` list, keeping it ordered by
    /// creation time. Returns the event href.
    pub fn store_log_event(&self, edev_href: &str, event: LogEvent) -> StoreResult<String> {
        let name = EdevSubType::LogEventList.token();
        let mut store = self.end_devices.write();
        let index = store.fetch_index_by_property(|d| d.href.as_deref(), edev_href)?;
        let created = event.created_date_time;
        let event_href = store.add_replace_child(index, name, event, None)?;
        store.sort_children_by_key::<LogEvent, _, _>(index, name, |e| e.created_date_time)?;
        debug!(device = %edev_href, event = %event_href, created, "Log event stored");
        Ok(event_href)
    }

    pub fn fetch_log_events(&self, edev_href: &str, page: Page) -> StoreResult<LogEventList> {
        let name = EdevSubType::LogEventList.token();
        let store = self.end_devices.read();
        let index = store.fetch_index_by_property(|d| d.href.as_deref(), edev_href)?;
        let envelope = LogEventList::new(href::child_list(edev_href, name))
            .with_poll_rate(self.config.log_event_list_poll_rate);
        store.fetch_children_page::<LogEvent, _>(index, name, envelope, page)
    }
}
