//! Connector role: mode discovery, validation and connection sensing.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::bus::DdcBus;
use super::catalog;
use super::edid::{read_edid, Edid, EdidIdentity};
use super::helpers::calculate_mode_cvt;
use super::modes::{ModeFlags, ModeTypeFlags, TimingMode};
use super::types::{CapabilityLimits, ConnectorStatus};

/// Why a mode was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No mode was given.
    Malformed,
    /// Interlaced, double-clocked or stereo.
    UnsupportedScanMode,
    /// Pixel clock or active area above the transmitter limits.
    OutOfCapability,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Malformed => "malformed mode",
            Self::UnsupportedScanMode => "unsupported scan mode",
            Self::OutOfCapability => "out of transmitter capability",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeStatus {
    Ok,
    Rejected(Rejection),
}

impl ModeStatus {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// Checks a mode against the limits.
pub fn validate(limits: &CapabilityLimits, mode: Option<&TimingMode>) -> ModeStatus {
    let Some(mode) = mode else {
        return ModeStatus::Rejected(Rejection::Malformed);
    };

    if mode.flags.intersects(ModeFlags::INTERLACE | ModeFlags::DBLCLK) || mode.flags.is_stereo()
    {
        return ModeStatus::Rejected(Rejection::UnsupportedScanMode);
    }

    if mode.clock > limits.max_pixel_clock_khz
        || mode.hdisplay > limits.max_horizontal
        || mode.vdisplay > limits.max_vertical
    {
        return ModeStatus::Rejected(Rejection::OutOfCapability);
    }

    ModeStatus::Ok
}

/// Where a mode list came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeOrigin {
    Edid(EdidIdentity),
    /// A bus is configured but no usable EDID was read.
    EdidUnavailable,
    /// No bus configured, the list is synthesized from the limits.
    NoEdid,
}

#[derive(Debug, Clone)]
pub struct ProbedModes {
    pub modes: Vec<TimingMode>,
    pub origin: ModeOrigin,
}

impl ProbedModes {
    pub fn identity(&self) -> Option<&EdidIdentity> {
        match &self.origin {
            ModeOrigin::Edid(identity) => Some(identity),
            _ => None,
        }
    }
}

pub struct ConnectorRole {
    limits: CapabilityLimits,
    bus: Option<Arc<dyn DdcBus>>,
    force_connected: bool,
}

impl fmt::Debug for ConnectorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorRole")
            .field("limits", &self.limits)
            .field("bus", &self.bus.as_ref().map(|bus| bus.name().to_owned()))
            .field("force_connected", &self.force_connected)
            .finish()
    }
}

impl ConnectorRole {
    pub fn new(
        limits: CapabilityLimits,
        bus: Option<Arc<dyn DdcBus>>,
        force_connected: bool,
    ) -> Self {
        Self {
            limits,
            bus,
            force_connected,
        }
    }

    pub fn limits(&self) -> &CapabilityLimits {
        &self.limits
    }

    pub fn has_bus(&self) -> bool {
        self.bus.is_some()
    }

    /// Drops the bus reference. Further probing behaves as if no bus was configured.
    pub fn release_bus(&mut self) {
        self.bus = None;
    }

    /// Computes the candidate modes from scratch.
    pub fn get_modes(&self) -> ProbedModes {
        let _span = tracy_client::span!("ConnectorRole::get_modes");

        let Some(bus) = &self.bus else {
            let modes = self.modes_without_edid();
            debug!("no DDC bus, offering {} built-in modes", modes.len());
            return ProbedModes {
                modes,
                origin: ModeOrigin::NoEdid,
            };
        };

        let edid = read_edid(bus.as_ref()).and_then(|data| Edid::parse(&data));
        match edid {
            Ok(edid) => {
                let identity = edid.identity().clone();
                let modes = edid.into_modes();
                debug!(
                    "EDID from {:?} {:?} lists {} modes",
                    identity.make,
                    identity.model,
                    modes.len()
                );
                ProbedModes {
                    modes,
                    origin: ModeOrigin::Edid(identity),
                }
            }
            Err(err) => {
                warn!("error reading EDID from {}: {err:?}", bus.name());
                ProbedModes {
                    modes: Vec::new(),
                    origin: ModeOrigin::EdidUnavailable,
                }
            }
        }
    }

    fn modes_without_edid(&self) -> Vec<TimingMode> {
        let limits = &self.limits;
        let preferred = limits.preferred_size();

        let mut modes: Vec<_> =
            catalog::dmt_modes_within(limits.max_horizontal, limits.max_vertical).collect();

        let mut found_preferred = false;
        for mode in &mut modes {
            if mode.size() == preferred {
                mode.set_preferred(true);
                found_preferred = true;
            }
        }

        if !found_preferred && limits.preferred_fits() {
            trace!(
                "no built-in timing for {}x{}, generating one",
                preferred.0,
                preferred.1
            );
            match calculate_mode_cvt(preferred.0, preferred.1, 60.) {
                Some(mut mode) => {
                    mode.mode_type = ModeTypeFlags::DRIVER | ModeTypeFlags::PREFERRED;
                    modes.push(mode);
                }
                None => warn!(
                    "no valid timing exists for preferred size {}x{}",
                    preferred.0, preferred.1
                ),
            }
        }

        modes
    }

    pub fn mode_valid(&self, mode: Option<&TimingMode>) -> ModeStatus {
        let status = validate(&self.limits, mode);
        if let (ModeStatus::Rejected(reason), Some(mode)) = (status, mode) {
            trace!("rejecting {mode}: {reason}");
        }
        status
    }

    /// Keeps the modes that pass validation.
    pub fn retain_valid(&self, modes: &mut Vec<TimingMode>) {
        modes.retain(|mode| self.mode_valid(Some(mode)).is_ok());
    }

    /// Senses whether a sink is present.
    ///
    /// `force` is set when the probe was explicitly requested rather than polled. It does not
    /// change the outcome, as nothing here is cached.
    pub fn detect(&self, force: bool) -> ConnectorStatus {
        if self.force_connected {
            return ConnectorStatus::Connected;
        }

        let Some(bus) = &self.bus else {
            return ConnectorStatus::Unknown;
        };

        let status = if bus.probe() {
            ConnectorStatus::Connected
        } else {
            ConnectorStatus::Disconnected
        };
        trace!("probed {} (force={force}): {status:?}", bus.name());
        status
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use proptest::prelude::*;

    use super::*;
    use crate::test_utils::{edid_base_block, EdidTemplate, FakeBus};

    fn no_bus(limits: CapabilityLimits) -> ConnectorRole {
        ConnectorRole::new(limits, None, false)
    }

    fn mode(clock: u32, h: u16, v: u16, flags: ModeFlags) -> TimingMode {
        TimingMode::from_timings(
            clock,
            (h, h + 16, h + 32, h + 64),
            (v, v + 3, v + 6, v + 30),
            flags,
            ModeTypeFlags::DRIVER,
        )
    }

    fn modes_to_string(modes: &[TimingMode]) -> String {
        modes
            .iter()
            .map(TimingMode::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn validate_order() {
        let limits = CapabilityLimits::default();

        assert_eq!(
            validate(&limits, None),
            ModeStatus::Rejected(Rejection::Malformed)
        );

        // Scan mode is checked before capability.
        let m = mode(400_000, 3840, 2160, ModeFlags::INTERLACE);
        assert_eq!(
            validate(&limits, Some(&m)),
            ModeStatus::Rejected(Rejection::UnsupportedScanMode)
        );

        let m = mode(150_001, 1280, 720, ModeFlags::empty());
        assert_eq!(
            validate(&limits, Some(&m)),
            ModeStatus::Rejected(Rejection::OutOfCapability)
        );

        let m = mode(150_000, 1920, 1080, ModeFlags::PHSYNC | ModeFlags::PVSYNC);
        assert_eq!(validate(&limits, Some(&m)), ModeStatus::Ok);
    }

    #[test]
    fn validate_rejects_dblclk_and_stereo() {
        let limits = CapabilityLimits::default();
        for flags in [
            ModeFlags::DBLCLK,
            ModeFlags::FRAME_PACKING_3D,
            ModeFlags::SIDE_BY_SIDE_HALF_3D,
        ] {
            let m = mode(74250, 1280, 720, flags);
            assert_eq!(
                validate(&limits, Some(&m)),
                ModeStatus::Rejected(Rejection::UnsupportedScanMode),
                "{flags:?}"
            );
        }
    }

    fn arb_limits() -> impl Strategy<Value = CapabilityLimits> {
        (1u32..400_000, 1u16..4096, 1u16..4096).prop_map(|(clock, h, v)| CapabilityLimits {
            max_pixel_clock_khz: clock,
            max_horizontal: h,
            max_vertical: v,
            ..CapabilityLimits::default()
        })
    }

    fn arb_flags() -> impl Strategy<Value = ModeFlags> {
        prop_oneof![
            Just(ModeFlags::PHSYNC | ModeFlags::PVSYNC),
            Just(ModeFlags::NHSYNC | ModeFlags::NVSYNC),
            Just(ModeFlags::INTERLACE),
            Just(ModeFlags::DBLCLK),
            Just(ModeFlags::DBLSCAN),
            (1u32..=0x1f).prop_map(|s| ModeFlags::from_bits_retain(s << 14)),
        ]
    }

    proptest! {
        #[test]
        fn validate_matches_limits(
            limits in arb_limits(),
            clock in 1u32..400_000,
            h in 1u16..4096,
            v in 1u16..4096,
            flags in arb_flags(),
        ) {
            let m = mode(clock, h, v, flags);
            let expected = clock <= limits.max_pixel_clock_khz
                && h <= limits.max_horizontal
                && v <= limits.max_vertical
                && !flags.intersects(ModeFlags::INTERLACE | ModeFlags::DBLCLK)
                && !flags.is_stereo();

            prop_assert_eq!(validate(&limits, Some(&m)).is_ok(), expected);
        }
    }

    #[test]
    fn no_bus_modes_are_bounded_and_contain_preferred() {
        let role = no_bus(CapabilityLimits::default());
        let probed = role.get_modes();

        assert_eq!(probed.origin, ModeOrigin::NoEdid);
        assert!(!probed.modes.is_empty());
        for mode in &probed.modes {
            assert!(mode.hdisplay <= 1920 && mode.vdisplay <= 1080, "{mode}");
        }

        let preferred: Vec<_> = probed.modes.iter().filter(|m| m.is_preferred()).collect();
        assert_eq!(preferred.len(), 1);
        assert_eq!(preferred[0].size(), (1280, 720));
    }

    #[test]
    fn no_bus_small_limits() {
        let role = no_bus(CapabilityLimits {
            max_horizontal: 1024,
            max_vertical: 768,
            preferred_horizontal: 800,
            preferred_vertical: 600,
            ..CapabilityLimits::default()
        });

        assert_snapshot!(modes_to_string(&role.get_modes().modes), @r#"
        "640x480@59.94" 25175 640 656 752 800 480 490 492 525 -hsync -vsync
        "800x600@56.25" 36000 800 824 896 1024 600 601 603 625 +hsync +vsync
        "800x600@60.32" 40000 800 840 968 1056 600 601 605 628 +hsync +vsync preferred
        "848x480@60.00" 33750 848 864 976 1088 480 486 494 517 +hsync +vsync
        "1024x768@60.00" 65000 1024 1048 1184 1344 768 771 777 806 -hsync -vsync
        "#);
    }

    #[test]
    fn no_bus_synthesizes_missing_preferred_size() {
        let role = no_bus(CapabilityLimits {
            preferred_horizontal: 1920,
            preferred_vertical: 1080,
            ..CapabilityLimits::default()
        });
        let modes = role.get_modes().modes;

        // DMT 1080p is listed, so nothing is synthesized.
        assert!(modes.iter().any(|m| m.size() == (1920, 1080) && m.is_preferred()));
        assert!(!modes
            .iter()
            .any(|m| m.mode_type.contains(ModeTypeFlags::USERDEF)));

        let role = no_bus(CapabilityLimits {
            preferred_horizontal: 1000,
            preferred_vertical: 700,
            ..CapabilityLimits::default()
        });
        let modes = role.get_modes().modes;
        let preferred: Vec<_> = modes.iter().filter(|m| m.is_preferred()).collect();
        assert_eq!(preferred.len(), 1);
        assert_eq!(preferred[0].size(), (1000, 700));
        assert_eq!(preferred[0].vrefresh, 60);
    }

    #[test]
    fn no_bus_preferred_out_of_bounds_is_not_added() {
        let role = no_bus(CapabilityLimits {
            max_horizontal: 1280,
            max_vertical: 720,
            preferred_horizontal: 1920,
            preferred_vertical: 1080,
            ..CapabilityLimits::default()
        });
        let modes = role.get_modes().modes;

        assert!(!modes.is_empty());
        assert!(!modes.iter().any(TimingMode::is_preferred));
    }

    #[test]
    fn no_bus_unrepresentable_preferred_is_not_added() {
        let role = no_bus(CapabilityLimits {
            max_horizontal: 65535,
            max_vertical: 65535,
            preferred_horizontal: 65000,
            preferred_vertical: 4000,
            ..CapabilityLimits::default()
        });
        let modes = role.get_modes().modes;

        assert!(!modes.is_empty());
        assert!(!modes.iter().any(TimingMode::is_preferred));
        assert!(!modes.iter().any(|m| m.size() == (65000, 4000)));
    }

    #[test]
    fn edid_modes_and_identity() {
        let bus = FakeBus::with_edid(edid_base_block(&EdidTemplate::monitor()));
        let role = ConnectorRole::new(CapabilityLimits::default(), Some(Arc::new(bus)), false);

        let probed = role.get_modes();
        assert_eq!(probed.modes.len(), 6);
        assert_eq!(
            probed.identity().and_then(|i| i.model.as_deref()),
            Some("FPGA Monitor")
        );
    }

    #[test]
    fn edid_failure_gives_empty_list_and_detect_still_probes() {
        let bus = Arc::new(FakeBus::absent());
        bus.set_present(true);
        let role = ConnectorRole::new(CapabilityLimits::default(), Some(bus.clone()), false);

        let probed = role.get_modes();
        assert!(probed.modes.is_empty());
        assert_eq!(probed.origin, ModeOrigin::EdidUnavailable);

        assert_eq!(role.detect(false), ConnectorStatus::Connected);
        assert_eq!(bus.probes(), 1);
    }

    #[test]
    fn valid_modes_filters_out_of_capability() {
        let bus = FakeBus::with_edid(edid_base_block(&EdidTemplate::monitor()));
        let role = ConnectorRole::new(
            CapabilityLimits {
                max_pixel_clock_khz: 100_000,
                max_horizontal: 1280,
                max_vertical: 1024,
                ..CapabilityLimits::default()
            },
            Some(Arc::new(bus)),
            false,
        );

        let mut modes = role.get_modes().modes;
        role.retain_valid(&mut modes);
        let sizes: Vec<_> = modes.iter().map(TimingMode::size).collect();
        assert_eq!(sizes, vec![(1280, 720), (800, 600), (640, 480), (1024, 768)]);
    }

    #[test]
    fn detect_forced_without_bus() {
        let role = ConnectorRole::new(CapabilityLimits::default(), None, true);
        assert_eq!(role.detect(true), ConnectorStatus::Connected);
        assert_eq!(role.detect(false), ConnectorStatus::Connected);
    }

    #[test]
    fn detect_without_bus_is_unknown() {
        let role = no_bus(CapabilityLimits::default());
        assert_eq!(role.detect(true), ConnectorStatus::Unknown);
    }

    #[test]
    fn detect_probes_every_time() {
        let bus = Arc::new(FakeBus::absent());
        let role = ConnectorRole::new(CapabilityLimits::default(), Some(bus.clone()), false);

        assert_eq!(role.detect(false), ConnectorStatus::Disconnected);
        bus.set_present(true);
        assert_eq!(role.detect(false), ConnectorStatus::Connected);
        assert_eq!(bus.probes(), 2);
    }

    #[test]
    fn forced_connection_skips_probe() {
        let bus = Arc::new(FakeBus::absent());
        let role = ConnectorRole::new(CapabilityLimits::default(), Some(bus.clone()), true);

        assert_eq!(role.detect(false), ConnectorStatus::Connected);
        assert_eq!(bus.probes(), 0);
    }
}
