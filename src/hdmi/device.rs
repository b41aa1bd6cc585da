//! One HDMI transmitter as seen by the compositor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::bus::DdcBus;
use super::clock::ClockController;
use super::connector::{ConnectorRole, ModeStatus};
use super::edid::EdidIdentity;
use super::encoder::{EncoderRole, LifecycleState};
use super::error::Result;
use super::master::DrmMaster;
use super::modes::TimingMode;
use super::types::{CapabilityLimits, ConnectorStatus};

/// Construction parameters, resolved from configuration by the registry.
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    pub name: String,
    pub limits: CapabilityLimits,
    pub force_connected: bool,
    pub with_bridge: bool,
}

/// Connector and encoder roles of one transmitter.
///
/// Every method takes `&self`. Hot-plug handling may call `detect` and `modes` from another
/// thread while a commit runs; those paths do not touch the lifecycle lock.
pub struct OutputDevice {
    name: String,
    connector: ConnectorRole,
    lifecycle: Mutex<EncoderRole>,
    identity: Mutex<Option<EdidIdentity>>,
}

impl OutputDevice {
    pub fn new(
        options: DeviceOptions,
        clock: ClockController,
        bus: Option<Arc<dyn DdcBus>>,
    ) -> Self {
        let DeviceOptions {
            name,
            limits,
            force_connected,
            with_bridge,
        } = options;

        Self {
            connector: ConnectorRole::new(limits, bus, force_connected),
            lifecycle: Mutex::new(EncoderRole::new(name.clone(), limits, with_bridge, clock)),
            identity: Mutex::new(None),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limits(&self) -> &CapabilityLimits {
        self.connector.limits()
    }

    pub fn has_bus(&self) -> bool {
        self.connector.has_bus()
    }

    fn lifecycle(&self) -> MutexGuard<'_, EncoderRole> {
        // Every transition completes or leaves the role untouched, so a panic elsewhere
        // cannot leave it half-updated.
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Candidate modes, probed fresh. Remembers the sink identity if an EDID was read.
    pub fn modes(&self) -> Vec<TimingMode> {
        let probed = self.connector.get_modes();

        let mut identity = self.identity.lock().unwrap_or_else(PoisonError::into_inner);
        match probed.identity() {
            Some(new) if identity.as_ref() != Some(new) => {
                info!(
                    "{}: sink is {} {}",
                    self.name,
                    new.make.as_deref().unwrap_or("Unknown"),
                    new.model.as_deref().unwrap_or("Unknown"),
                );
                *identity = Some(new.clone());
            }
            Some(_) => (),
            None => *identity = None,
        }

        probed.modes
    }

    pub fn valid_modes(&self) -> Vec<TimingMode> {
        let mut modes = self.modes();
        self.connector.retain_valid(&mut modes);
        modes
    }

    pub fn mode_valid(&self, mode: Option<&TimingMode>) -> ModeStatus {
        self.connector.mode_valid(mode)
    }

    pub fn detect(&self, force: bool) -> ConnectorStatus {
        self.connector.detect(force)
    }

    pub fn bind(&self, master: &mut dyn DrmMaster) -> Result<()> {
        self.lifecycle().bind(master)
    }

    pub fn unbind(&self, master: &mut dyn DrmMaster) {
        self.lifecycle().unbind(master);
    }

    pub fn mode_set(&self, mode: &TimingMode) -> Result<()> {
        self.lifecycle().mode_set(mode)
    }

    pub fn enable(&self) -> Result<()> {
        self.lifecycle().enable()
    }

    pub fn disable(&self) {
        self.lifecycle().disable();
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle().state()
    }

    pub fn clock_running(&self) -> bool {
        self.lifecycle().clock_running()
    }

    pub fn clock_rate(&self) -> Option<u64> {
        self.lifecycle().clock_rate()
    }

    pub fn is_bound(&self) -> bool {
        self.lifecycle().is_bound()
    }

    pub fn current_mode(&self) -> Option<TimingMode> {
        self.lifecycle().mode().cloned()
    }

    /// Sink identity from the last successful EDID read.
    pub fn identity(&self) -> Option<EdidIdentity> {
        self.identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tears the device down: stops the clock, unbinds if bound and releases the bus.
    pub fn remove(mut self, master: &mut dyn DrmMaster) {
        let _span = tracy_client::span!("OutputDevice::remove");

        self.lifecycle().unbind(master);
        self.connector.release_bus();
        debug!("{} removed", self.name);
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        self.lifecycle().disable();
    }
}
