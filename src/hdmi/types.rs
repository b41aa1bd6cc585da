//! Type definitions shared across the transmitter roles.

use bitflags::bitflags;

// =============================================================================
// Constants
// =============================================================================

pub const DEFAULT_MAX_PIXEL_CLOCK_KHZ: u32 = 150_000;
pub const DEFAULT_MAX_HORIZONTAL: u16 = 1920;
pub const DEFAULT_MAX_VERTICAL: u16 = 1080;
pub const DEFAULT_PREFERRED_HORIZONTAL: u16 = 1280;
pub const DEFAULT_PREFERRED_VERTICAL: u16 = 720;

/// `DRM_MODE_ENCODER_TMDS`.
pub const ENCODER_TYPE_TMDS: u32 = 2;
/// `DRM_MODE_CONNECTOR_HDMIA`.
pub const CONNECTOR_TYPE_HDMIA: u32 = 11;

// =============================================================================
// Public Structs
// =============================================================================

/// What the transmitter can drive. Fixed for the lifetime of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityLimits {
    pub max_pixel_clock_khz: u32,
    pub max_horizontal: u16,
    pub max_vertical: u16,
    pub preferred_horizontal: u16,
    pub preferred_vertical: u16,
}

impl Default for CapabilityLimits {
    fn default() -> Self {
        Self {
            max_pixel_clock_khz: DEFAULT_MAX_PIXEL_CLOCK_KHZ,
            max_horizontal: DEFAULT_MAX_HORIZONTAL,
            max_vertical: DEFAULT_MAX_VERTICAL,
            preferred_horizontal: DEFAULT_PREFERRED_HORIZONTAL,
            preferred_vertical: DEFAULT_PREFERRED_VERTICAL,
        }
    }
}

impl CapabilityLimits {
    pub fn preferred_size(&self) -> (u16, u16) {
        (self.preferred_horizontal, self.preferred_vertical)
    }

    pub fn preferred_fits(&self) -> bool {
        self.preferred_horizontal <= self.max_horizontal
            && self.preferred_vertical <= self.max_vertical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorStatus {
    Connected,
    Disconnected,
    Unknown,
}

bitflags! {
    /// How the compositor should poll the connector, as `DRM_CONNECTOR_POLL_*`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollFlags: u8 {
        const HPD = 1 << 0;
        const CONNECT = 1 << 1;
        const DISCONNECT = 1 << 2;
    }
}

/// Encoder as handed to the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderDesc {
    pub name: String,
    pub encoder_type: u32,
    /// Bitmask of CRTC indices this encoder can be driven by.
    pub possible_crtcs: u32,
}

/// Connector as handed to the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorDesc {
    pub name: String,
    pub connector_type: u32,
    pub polled: PollFlags,
}
