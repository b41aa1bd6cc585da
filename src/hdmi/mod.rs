//! HDMI transmitter driver.
//!
//! The transmitter is split into two roles:
//! - `ConnectorRole` (connector.rs) - mode discovery from EDID or built-in tables, mode
//!   validation and connection sensing
//! - `EncoderRole` (encoder.rs) - compositor binding and the clock lifecycle
//!
//! `OutputDevice` composes both and serializes lifecycle calls behind a lock. Hardware
//! access goes through the `Clock`, `DdcBus` and `DrmMaster` traits.

mod bus;
mod catalog;
mod clock;
mod connector;
mod device;
mod edid;
mod encoder;
mod error;
mod helpers;
mod master;
mod modes;
mod types;

pub use bus::{BusError, DdcBus, EDID_BLOCK_LEN};
pub use catalog::{dmt_modes_within, find_cea, find_dmt};
pub use clock::{Clock, ClockController};
pub use connector::{validate, ConnectorRole, ModeOrigin, ModeStatus, ProbedModes, Rejection};
pub use device::{DeviceOptions, OutputDevice};
pub use edid::{read_edid, Edid, EdidIdentity, EDID_HEADER, MAX_EXTENSIONS};
pub use encoder::{EncoderRole, LifecycleState};
pub use error::{BindStep, ClockOp, Error, Result};
pub use helpers::{calculate_mode_cvt, pick_mode, refresh_millihertz, ModeRequest};
pub use master::{BridgeId, ConnectorId, DrmMaster, EncoderId};
pub use modes::{mode_name, ModeFlags, ModeTypeFlags, TimingMode};
pub use types::{
    CapabilityLimits, ConnectorDesc, ConnectorStatus, EncoderDesc, PollFlags,
    CONNECTOR_TYPE_HDMIA, DEFAULT_MAX_HORIZONTAL, DEFAULT_MAX_PIXEL_CLOCK_KHZ,
    DEFAULT_MAX_VERTICAL, DEFAULT_PREFERRED_HORIZONTAL, DEFAULT_PREFERRED_VERTICAL,
    ENCODER_TYPE_TMDS,
};
