//! Simulated collaborators for running the driver without hardware.
//!
//! - `FileBus` serves an EDID dump from disk as the DDC bus
//! - `SimClock` logs rate and gate changes
//! - `SimMaster` logs compositor object registration
//! - `SimResources` hands those out by name to the registry

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{ensure, Context};
use tracing::{debug, info};

use crate::hdmi::{
    BridgeId, BusError, Clock, ConnectorDesc, ConnectorId, DdcBus, DrmMaster, EncoderDesc,
    EncoderId, EDID_BLOCK_LEN,
};
use crate::registry::{BusProvider, ClockProvider};

/// An EDID dump standing in for a connected sink.
#[derive(Debug)]
pub struct FileBus {
    name: String,
    edid: Vec<u8>,
}

impl FileBus {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let edid =
            std::fs::read(path).with_context(|| format!("error reading EDID from {path:?}"))?;
        ensure!(
            !edid.is_empty() && edid.len() % EDID_BLOCK_LEN == 0,
            "EDID dump {path:?} is {} bytes, not a multiple of {EDID_BLOCK_LEN}",
            edid.len()
        );

        Ok(Self {
            name: path.display().to_string(),
            edid,
        })
    }

    pub fn from_bytes(name: impl Into<String>, edid: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            edid,
        }
    }
}

impl DdcBus for FileBus {
    fn read_block(&self, index: u8) -> Result<[u8; EDID_BLOCK_LEN], BusError> {
        let start = usize::from(index) * EDID_BLOCK_LEN;
        let data = self
            .edid
            .get(start..start + EDID_BLOCK_LEN)
            .ok_or(BusError::NotFound)?;

        let mut block = [0; EDID_BLOCK_LEN];
        block.copy_from_slice(data);
        Ok(block)
    }

    fn probe(&self) -> bool {
        !self.edid.is_empty()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub struct SimClock {
    name: String,
    rate: Option<u64>,
}

impl SimClock {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            rate: None,
        }
    }
}

impl Clock for SimClock {
    fn set_rate(&mut self, hz: u64) -> anyhow::Result<()> {
        info!("clock {}: rate {hz} Hz", self.name);
        self.rate = Some(hz);
        Ok(())
    }

    fn prepare_enable(&mut self) -> anyhow::Result<()> {
        info!("clock {}: enabled", self.name);
        Ok(())
    }

    fn disable_unprepare(&mut self) {
        info!("clock {}: disabled", self.name);
    }

    fn rate(&self) -> Option<u64> {
        self.rate
    }
}

/// A compositor that only logs what it is asked to do.
#[derive(Debug, Default)]
pub struct SimMaster {
    next_id: u32,
    live: usize,
}

impl SimMaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects created and not yet released.
    pub fn live_objects(&self) -> usize {
        self.live
    }

    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        self.live += 1;
        self.next_id
    }

    fn release(&mut self) {
        self.live = self.live.saturating_sub(1);
    }
}

impl DrmMaster for SimMaster {
    fn encoder_init(&mut self, desc: &EncoderDesc) -> anyhow::Result<EncoderId> {
        let id = self.alloc();
        debug!("encoder {id}: init {desc:?}");
        Ok(EncoderId(id))
    }

    fn encoder_cleanup(&mut self, encoder: EncoderId) {
        debug!("encoder {}: cleanup", encoder.0);
        self.release();
    }

    fn bridge_attach(&mut self, encoder: EncoderId) -> anyhow::Result<BridgeId> {
        let id = self.alloc();
        debug!("bridge {id}: attached to encoder {}", encoder.0);
        Ok(BridgeId(id))
    }

    fn bridge_detach(&mut self, bridge: BridgeId) {
        debug!("bridge {}: detached", bridge.0);
        self.release();
    }

    fn connector_init(&mut self, desc: &ConnectorDesc) -> anyhow::Result<ConnectorId> {
        let id = self.alloc();
        debug!("connector {id}: init {desc:?}");
        Ok(ConnectorId(id))
    }

    fn connector_register(&mut self, connector: ConnectorId) -> anyhow::Result<()> {
        debug!("connector {}: registered", connector.0);
        Ok(())
    }

    fn connector_unregister(&mut self, connector: ConnectorId) {
        debug!("connector {}: unregistered", connector.0);
    }

    fn connector_cleanup(&mut self, connector: ConnectorId) {
        debug!("connector {}: cleanup", connector.0);
        self.release();
    }

    fn connector_attach_encoder(
        &mut self,
        connector: ConnectorId,
        encoder: EncoderId,
    ) -> anyhow::Result<()> {
        debug!("connector {}: attached to encoder {}", connector.0, encoder.0);
        Ok(())
    }
}

/// Clocks and buses available to the simulation.
///
/// Every clock name resolves. Only adapters given an EDID dump exist; referencing any other
/// adapter defers the probe.
#[derive(Default)]
pub struct SimResources {
    buses: HashMap<String, Arc<dyn DdcBus>>,
}

impl SimResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bus(&mut self, adapter: impl Into<String>, bus: Arc<dyn DdcBus>) {
        self.buses.insert(adapter.into(), bus);
    }

    pub fn add_edid_file(&mut self, adapter: &str, path: &Path) -> anyhow::Result<()> {
        let bus = FileBus::open(path)?;
        self.add_bus(adapter, Arc::new(bus));
        Ok(())
    }
}

impl ClockProvider for SimResources {
    fn acquire(&self, name: &str) -> anyhow::Result<Box<dyn Clock>> {
        Ok(Box::new(SimClock::new(name)))
    }
}

impl BusProvider for SimResources {
    fn adapter(&self, name: &str) -> Option<Arc<dyn DdcBus>> {
        self.buses.get(name).cloned()
    }
}

/// Parses `ADAPTER=FILE`.
pub fn parse_edid_arg(arg: &str) -> anyhow::Result<(String, PathBuf)> {
    let (adapter, path) = arg
        .split_once('=')
        .with_context(|| format!("expected ADAPTER=FILE, got {arg:?}"))?;
    ensure!(!adapter.is_empty(), "adapter name must not be empty");
    ensure!(!path.is_empty(), "EDID file path must not be empty");
    Ok((adapter.to_owned(), PathBuf::from(path)))
}
