//! Configuration for fpga-hdmi transmitters.
//!
//! Each `hdmi` node plays the part of a device-tree node: a compatible string selecting the
//! driver variant, plus optional resources and capability limits. Absent keys are resolved
//! to the variant defaults by the driver, not here.

use std::ffi::OsStr;
use std::path::Path;

use miette::{IntoDiagnostic, WrapErr};
use tracing::debug;

/// Clock name requested when a node does not name one.
pub const DEFAULT_CLOCK_NAME: &str = "clk";

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct Config {
    #[knuffel(children(name = "hdmi"))]
    pub nodes: Vec<HdmiNode>,
}

/// One HDMI transmitter node.
#[derive(knuffel::Decode, Debug, Clone, PartialEq)]
pub struct HdmiNode {
    #[knuffel(argument)]
    pub compatible: String,
    #[knuffel(property)]
    pub name: Option<String>,
    #[knuffel(child, unwrap(argument))]
    pub clock: Option<String>,
    /// Reference to the I2C adapter carrying DDC.
    #[knuffel(child, unwrap(argument))]
    pub edid_i2c: Option<String>,
    /// Maximum pixel clock in kHz.
    #[knuffel(child, unwrap(argument))]
    pub fmax: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub hmax: Option<u16>,
    #[knuffel(child, unwrap(argument))]
    pub vmax: Option<u16>,
    #[knuffel(child, unwrap(argument))]
    pub hpref: Option<u16>,
    #[knuffel(child, unwrap(argument))]
    pub vpref: Option<u16>,
    /// Report the sink as always connected.
    #[knuffel(child)]
    pub force_hot_plug: bool,
    /// Insert a bridge stage between encoder and connector.
    #[knuffel(child)]
    pub bridge: bool,
}

impl HdmiNode {
    pub fn new(compatible: impl Into<String>) -> Self {
        Self {
            compatible: compatible.into(),
            name: None,
            clock: None,
            edid_i2c: None,
            fmax: None,
            hmax: None,
            vmax: None,
            hpref: None,
            vpref: None,
            force_hot_plug: false,
            bridge: false,
        }
    }

    pub fn clock_name(&self) -> &str {
        self.clock.as_deref().unwrap_or(DEFAULT_CLOCK_NAME)
    }

    /// Name used in logs: the explicit name, or the compatible string.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.compatible)
    }
}

impl Config {
    pub fn load(path: &Path) -> miette::Result<Self> {
        let _span = tracy_client::span!("Config::load");

        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("error reading {path:?}"))?;

        let filename = path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("config.kdl");

        let config = Self::parse(filename, &contents).wrap_err("error parsing")?;
        debug!("loaded config from {path:?}: {} hdmi nodes", config.nodes.len());
        Ok(config)
    }

    pub fn parse(filename: &str, text: &str) -> Result<Self, knuffel::Error> {
        let _span = tracy_client::span!("Config::parse");
        knuffel::parse(filename, text)
    }

    pub fn find(&self, name: &str) -> Option<&HdmiNode> {
        self.nodes.iter().find(|node| node.display_name() == name)
    }
}
