//! Driver variants and device construction from configuration nodes.

use std::sync::Arc;

use anyhow::Context;
use fpga_hdmi_config::HdmiNode;
use tracing::{debug, info, warn};

use crate::hdmi::{
    CapabilityLimits, Clock, ClockController, DdcBus, DeviceOptions, Error, OutputDevice,
    DEFAULT_MAX_PIXEL_CLOCK_KHZ, DEFAULT_PREFERRED_HORIZONTAL, DEFAULT_PREFERRED_VERTICAL,
};

/// Hands out clocks by name.
pub trait ClockProvider {
    fn acquire(&self, name: &str) -> anyhow::Result<Box<dyn Clock>>;
}

/// Looks up DDC adapters by reference.
pub trait BusProvider {
    /// `None` if the adapter exists in the configuration but has not come up yet.
    fn adapter(&self, name: &str) -> Option<Arc<dyn DdcBus>>;
}

/// A transmitter flavour: its compatible string and what it assumes when keys are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverVariant {
    pub compatible: String,
    pub defaults: CapabilityLimits,
    pub bridge: bool,
}

impl DriverVariant {
    pub fn new(compatible: impl Into<String>, defaults: CapabilityLimits) -> Self {
        Self {
            compatible: compatible.into(),
            defaults,
            bridge: false,
        }
    }

    pub fn with_bridge(mut self) -> Self {
        self.bridge = true;
        self
    }

    /// Limits for `node`, falling back to this variant's defaults.
    pub fn limits_for(&self, node: &HdmiNode) -> CapabilityLimits {
        let defaults = &self.defaults;
        CapabilityLimits {
            max_pixel_clock_khz: node.fmax.unwrap_or(defaults.max_pixel_clock_khz),
            max_horizontal: node.hmax.unwrap_or(defaults.max_horizontal),
            max_vertical: node.vmax.unwrap_or(defaults.max_vertical),
            preferred_horizontal: node.hpref.unwrap_or(defaults.preferred_horizontal),
            preferred_vertical: node.vpref.unwrap_or(defaults.preferred_vertical),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("no driver for compatible {0:?}")]
    NoMatch(String),
    #[error(transparent)]
    Driver(#[from] Error),
}

impl ProbeError {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Driver(err) if err.is_deferred())
    }
}

#[derive(Debug, Default)]
pub struct DriverRegistry {
    variants: Vec<DriverVariant>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_variants() -> Self {
        let digilent = CapabilityLimits::default();
        let rehsd = CapabilityLimits {
            max_pixel_clock_khz: DEFAULT_MAX_PIXEL_CLOCK_KHZ,
            max_horizontal: 1280,
            max_vertical: 720,
            preferred_horizontal: DEFAULT_PREFERRED_HORIZONTAL,
            preferred_vertical: DEFAULT_PREFERRED_VERTICAL,
        };

        let mut registry = Self::new();
        registry.register(DriverVariant::new("digilent,hdmi", digilent));
        registry.register(DriverVariant::new("rehsd,hdmi", rehsd));
        registry.register(DriverVariant::new("digilent,hdmi-bridge", digilent).with_bridge());
        registry
    }

    /// Adds a variant, replacing any previous one with the same compatible string.
    pub fn register(&mut self, variant: DriverVariant) {
        if let Some(existing) = self
            .variants
            .iter_mut()
            .find(|v| v.compatible == variant.compatible)
        {
            warn!("replacing driver variant {:?}", variant.compatible);
            *existing = variant;
            return;
        }

        debug!("registered driver variant {:?}", variant.compatible);
        self.variants.push(variant);
    }

    pub fn variant(&self, compatible: &str) -> Option<&DriverVariant> {
        self.variants.iter().find(|v| v.compatible == compatible)
    }

    pub fn compatibles(&self) -> impl Iterator<Item = &str> + '_ {
        self.variants.iter().map(|v| v.compatible.as_str())
    }

    /// Builds the device described by `node`.
    ///
    /// A missing clock is fatal. A bus that is referenced but not available yet defers the
    /// probe, and the caller is expected to retry once the adapter shows up.
    pub fn probe(
        &self,
        node: &HdmiNode,
        clocks: &dyn ClockProvider,
        buses: &dyn BusProvider,
    ) -> Result<OutputDevice, ProbeError> {
        let _span = tracy_client::span!("DriverRegistry::probe");

        let variant = self
            .variant(&node.compatible)
            .ok_or_else(|| ProbeError::NoMatch(node.compatible.clone()))?;
        let name = node.display_name();

        let clock_name = node.clock_name();
        let clock = clocks
            .acquire(clock_name)
            .with_context(|| format!("error acquiring clock for {name}"))
            .map_err(|source| Error::Configuration {
                resource: clock_name.to_owned(),
                source,
            })?;

        let bus = match &node.edid_i2c {
            Some(adapter) => match buses.adapter(adapter) {
                Some(bus) => Some(bus),
                None => {
                    debug!("{name}: DDC adapter {adapter:?} not ready, deferring");
                    return Err(Error::DeferredDependency {
                        resource: adapter.clone(),
                    }
                    .into());
                }
            },
            None => {
                debug!("{name}: no DDC adapter configured, using built-in modes");
                None
            }
        };

        let limits = variant.limits_for(node);
        if !limits.preferred_fits() {
            warn!(
                "{name}: preferred size {}x{} exceeds maximum {}x{}",
                limits.preferred_horizontal,
                limits.preferred_vertical,
                limits.max_horizontal,
                limits.max_vertical
            );
        }

        let options = DeviceOptions {
            name: name.to_owned(),
            limits,
            force_connected: node.force_hot_plug,
            with_bridge: variant.bridge || node.bridge,
        };
        info!(
            "{name}: probed as {} (max {} kHz, {}x{})",
            variant.compatible,
            limits.max_pixel_clock_khz,
            limits.max_horizontal,
            limits.max_vertical
        );

        Ok(OutputDevice::new(options, ClockController::new(clock), bus))
    }
}
