//! Video timing modes.
//!
//! `TimingMode` mirrors the layout of the kernel `drm_mode_modeinfo` so that a DRM-backed host
//! can pass modes through without translation, while keeping the flags typed on our side.

use std::fmt;
use std::iter::zip;
use std::time::Duration;

use bitflags::bitflags;

bitflags! {
    /// Timing flags, bit-compatible with `DRM_MODE_FLAG_*`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeFlags: u32 {
        const PHSYNC = 1 << 0;
        const NHSYNC = 1 << 1;
        const PVSYNC = 1 << 2;
        const NVSYNC = 1 << 3;
        const INTERLACE = 1 << 4;
        const DBLSCAN = 1 << 5;
        const CSYNC = 1 << 6;
        const PCSYNC = 1 << 7;
        const NCSYNC = 1 << 8;
        const HSKEW = 1 << 9;
        const DBLCLK = 1 << 12;
        const CLKDIV2 = 1 << 13;
        const FRAME_PACKING_3D = 1 << 14;
        const FIELD_ALTERNATIVE_3D = 2 << 14;
        const SIDE_BY_SIDE_FULL_3D = 4 << 14;
        const TOP_AND_BOTTOM_3D = 7 << 14;
        const SIDE_BY_SIDE_HALF_3D = 8 << 14;
        /// The 3D stereo field. Any value in it means a stereo layout.
        const STEREO_3D_MASK = 0x1f << 14;

        const _ = !0;
    }
}

bitflags! {
    /// Mode type flags, bit-compatible with `DRM_MODE_TYPE_*`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeTypeFlags: u32 {
        const PREFERRED = 1 << 3;
        const DEFAULT = 1 << 4;
        const USERDEF = 1 << 5;
        const DRIVER = 1 << 6;

        const _ = !0;
    }
}

impl ModeFlags {
    pub fn is_stereo(self) -> bool {
        self.intersects(Self::STEREO_3D_MASK)
    }
}

/// A candidate video timing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimingMode {
    pub name: String,
    /// Pixel clock in kHz.
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    /// Vertical refresh in Hz, rounded.
    pub vrefresh: u32,
    pub flags: ModeFlags,
    pub mode_type: ModeTypeFlags,
}

impl TimingMode {
    /// Builds a mode from raw timings, deriving the refresh rate and the name.
    ///
    /// `h` and `v` are `(display, sync_start, sync_end, total)`.
    pub fn from_timings(
        clock: u32,
        h: (u16, u16, u16, u16),
        v: (u16, u16, u16, u16),
        flags: ModeFlags,
        mode_type: ModeTypeFlags,
    ) -> Self {
        let mut mode = Self {
            name: String::new(),
            clock,
            hdisplay: h.0,
            hsync_start: h.1,
            hsync_end: h.2,
            htotal: h.3,
            hskew: 0,
            vdisplay: v.0,
            vsync_start: v.1,
            vsync_end: v.2,
            vtotal: v.3,
            vscan: 0,
            vrefresh: 0,
            flags,
            mode_type,
        };
        mode.vrefresh = mode.calculated_vrefresh();
        mode.name = mode_name(mode.hdisplay, mode.vdisplay, mode.exact_refresh());
        mode
    }

    pub fn size(&self) -> (u16, u16) {
        (self.hdisplay, self.vdisplay)
    }

    pub fn is_preferred(&self) -> bool {
        self.mode_type.contains(ModeTypeFlags::PREFERRED)
    }

    pub fn set_preferred(&mut self, preferred: bool) {
        self.mode_type.set(ModeTypeFlags::PREFERRED, preferred);
    }

    /// Target pixel clock rate in Hz.
    pub fn pixel_clock_hz(&self) -> u64 {
        u64::from(self.clock) * 1000
    }

    /// Refresh rate in Hz without rounding, as used in mode names.
    pub fn exact_refresh(&self) -> f64 {
        let total = f64::from(self.htotal) * f64::from(self.vtotal);
        if total == 0. {
            return 0.;
        }
        f64::from(self.clock) * 1000. / total
    }

    /// Rounded vertical refresh the same way the kernel derives `vrefresh`.
    pub fn calculated_vrefresh(&self) -> u32 {
        let mut num = u64::from(self.clock) * 1000;
        let mut den = u64::from(self.htotal) * u64::from(self.vtotal);

        if self.flags.contains(ModeFlags::INTERLACE) {
            num *= 2;
        }
        if self.flags.contains(ModeFlags::DBLSCAN) {
            den *= 2;
        }
        if self.vscan > 1 {
            den *= u64::from(self.vscan);
        }

        if den == 0 {
            return 0;
        }

        ((num + den / 2) / den) as u32
    }

    /// Duration of one frame.
    pub fn refresh_interval(&self) -> Duration {
        let clock = u64::from(self.clock);
        if clock == 0 {
            return Duration::ZERO;
        }

        let mut numerator = u64::from(self.htotal) * u64::from(self.vtotal) * 1_000_000;
        let mut denominator = clock;

        if self.flags.contains(ModeFlags::INTERLACE) {
            denominator *= 2;
        }

        if self.flags.contains(ModeFlags::DBLSCAN) {
            numerator *= 2;
        }

        if self.vscan > 1 {
            numerator *= u64::from(self.vscan);
        }

        let refresh_interval = (numerator + denominator / 2) / denominator;
        Duration::from_nanos(refresh_interval)
    }

    /// Whether two modes describe the same timing, ignoring name and type.
    pub fn same_timing(&self, other: &Self) -> bool {
        self.clock == other.clock
            && self.hdisplay == other.hdisplay
            && self.hsync_start == other.hsync_start
            && self.hsync_end == other.hsync_end
            && self.htotal == other.htotal
            && self.vdisplay == other.vdisplay
            && self.vsync_start == other.vsync_start
            && self.vsync_end == other.vsync_end
            && self.vtotal == other.vtotal
            && self.flags == other.flags
    }
}

impl fmt::Display for TimingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" {} {} {} {} {} {} {} {} {}",
            self.name,
            self.clock,
            self.hdisplay,
            self.hsync_start,
            self.hsync_end,
            self.htotal,
            self.vdisplay,
            self.vsync_start,
            self.vsync_end,
            self.vtotal,
        )?;

        let named = [
            (ModeFlags::PHSYNC, "+hsync"),
            (ModeFlags::NHSYNC, "-hsync"),
            (ModeFlags::PVSYNC, "+vsync"),
            (ModeFlags::NVSYNC, "-vsync"),
            (ModeFlags::INTERLACE, "interlace"),
            (ModeFlags::DBLSCAN, "doublescan"),
            (ModeFlags::DBLCLK, "dblclk"),
        ];
        for (flag, text) in named {
            if self.flags.contains(flag) {
                write!(f, " {text}")?;
            }
        }
        if self.flags.is_stereo() {
            write!(f, " 3d")?;
        }
        if self.is_preferred() {
            write!(f, " preferred")?;
        }

        Ok(())
    }
}

impl From<&TimingMode> for drm_ffi::drm_mode_modeinfo {
    fn from(mode: &TimingMode) -> Self {
        drm_ffi::drm_mode_modeinfo {
            clock: mode.clock,
            hdisplay: mode.hdisplay,
            hsync_start: mode.hsync_start,
            hsync_end: mode.hsync_end,
            htotal: mode.htotal,
            hskew: mode.hskew,
            vdisplay: mode.vdisplay,
            vsync_start: mode.vsync_start,
            vsync_end: mode.vsync_end,
            vtotal: mode.vtotal,
            vscan: mode.vscan,
            vrefresh: mode.vrefresh,
            flags: mode.flags.bits(),
            type_: mode.mode_type.bits(),
            name: modeinfo_name_slice_from_string(&mode.name),
        }
    }
}

impl From<&drm_ffi::drm_mode_modeinfo> for TimingMode {
    fn from(info: &drm_ffi::drm_mode_modeinfo) -> Self {
        let name = info
            .name
            .iter()
            .take_while(|c| **c != 0)
            // Can be u8 on aarch64 and i8 on x86_64.
            .map(|c| *c as u8 as char)
            .collect();

        Self {
            name,
            clock: info.clock,
            hdisplay: info.hdisplay,
            hsync_start: info.hsync_start,
            hsync_end: info.hsync_end,
            htotal: info.htotal,
            hskew: info.hskew,
            vdisplay: info.vdisplay,
            vsync_start: info.vsync_start,
            vsync_end: info.vsync_end,
            vtotal: info.vtotal,
            vscan: info.vscan,
            vrefresh: info.vrefresh,
            flags: ModeFlags::from_bits_retain(info.flags),
            mode_type: ModeTypeFlags::from_bits_retain(info.type_),
        }
    }
}

pub fn mode_name(width: u16, height: u16, refresh: f64) -> String {
    format!("{width}x{height}@{refresh:.2}")
}

/// Convert a string to a mode name slice (max 31 chars + null terminator).
fn modeinfo_name_slice_from_string(mode_name: &str) -> [core::ffi::c_char; 32] {
    let mut name: [core::ffi::c_char; 32] = [0; 32];

    for (a, b) in zip(&mut name[..31], mode_name.as_bytes()) {
        // Can be u8 on aarch64 and i8 on x86_64.
        *a = *b as _;
    }

    name
}
