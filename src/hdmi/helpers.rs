//! Pure helper functions for mode handling.
//!
//! Stateless computations shared by the mode source and the commit path: CVT timing
//! generation, mode requests and mode picking.

use std::str::FromStr;

use anyhow::{bail, ensure, Context};
use tracing::warn;

use super::modes::{ModeFlags, ModeTypeFlags, TimingMode};

// =============================================================================
// CVT
// =============================================================================

const CVT_CELL_GRAN: f64 = 8.;
const CVT_MIN_V_PORCH: u32 = 3;
const CVT_MIN_V_BPORCH: u32 = 6;
/// Minimum vsync + back porch time in microseconds.
const CVT_MIN_VSYNC_BP: f64 = 550.;
const CVT_C_PRIME: f64 = 30.;
const CVT_M_PRIME: f64 = 300.;
const CVT_H_SYNC_PER: f64 = 0.08;
/// Pixel clock granularity in MHz.
const CVT_CLOCK_STEP: f64 = 0.25;

/// Calculate a mode using CVT (Coordinated Video Timings) with normal blanking.
///
/// Returns `None` when the blanking pushes the totals past what a mode can represent.
pub fn calculate_mode_cvt(width: u16, height: u16, refresh: f64) -> Option<TimingMode> {
    // Follows the CVT 1.2 spreadsheet, as libdisplay-info and the kernel do.
    let h_pixels = u32::from(width);
    let v_lines = u32::from(height);
    let h_pixels_rnd = (f64::from(h_pixels) / CVT_CELL_GRAN).floor() * CVT_CELL_GRAN;

    let v_sync = if v_lines * 4 / 3 == h_pixels {
        4
    } else if v_lines * 16 / 9 == h_pixels {
        5
    } else if v_lines * 16 / 10 == h_pixels {
        6
    } else if v_lines % 4 == 0 && v_lines * 5 / 4 == h_pixels {
        7
    } else if v_lines * 15 / 9 == h_pixels {
        7
    } else {
        10
    };

    let h_period_est = ((1. / refresh) - CVT_MIN_VSYNC_BP / 1_000_000.)
        / f64::from(v_lines + CVT_MIN_V_PORCH)
        * 1_000_000.;

    let mut vsync_bp = (CVT_MIN_VSYNC_BP / h_period_est).floor() as u32 + 1;
    if vsync_bp < v_sync + CVT_MIN_V_BPORCH {
        vsync_bp = v_sync + CVT_MIN_V_BPORCH;
    }
    let v_back_porch = vsync_bp - v_sync;

    let ideal_duty_cycle = f64::max(20., CVT_C_PRIME - CVT_M_PRIME * h_period_est / 1000.);
    let h_blank = (h_pixels_rnd * ideal_duty_cycle
        / (100. - ideal_duty_cycle)
        / (2. * CVT_CELL_GRAN))
        .floor()
        * 2.
        * CVT_CELL_GRAN;
    let total_pixels = h_pixels_rnd + h_blank;

    let act_pixel_freq =
        CVT_CLOCK_STEP * (total_pixels / h_period_est / CVT_CLOCK_STEP).floor();

    let h_sync = (CVT_H_SYNC_PER * total_pixels / CVT_CELL_GRAN).floor() * CVT_CELL_GRAN;
    let h_back_porch = h_blank / 2.;
    let h_front_porch = h_blank - h_sync - h_back_porch;

    let hsync_start = h_pixels + h_front_porch as u32;
    let hsync_end = hsync_start + h_sync as u32;
    let htotal = hsync_end + h_back_porch as u32;

    let vsync_start = v_lines + CVT_MIN_V_PORCH;
    let vsync_end = vsync_start + v_sync;
    let vtotal = vsync_end + v_back_porch;

    let clock = (act_pixel_freq * 1000.).round() as u32;

    Some(TimingMode::from_timings(
        clock,
        (
            width,
            u16::try_from(hsync_start).ok()?,
            u16::try_from(hsync_end).ok()?,
            u16::try_from(htotal).ok()?,
        ),
        (
            height,
            u16::try_from(vsync_start).ok()?,
            u16::try_from(vsync_end).ok()?,
            u16::try_from(vtotal).ok()?,
        ),
        ModeFlags::NHSYNC | ModeFlags::PVSYNC,
        ModeTypeFlags::USERDEF,
    ))
}

// =============================================================================
// Mode Requests
// =============================================================================

/// A requested mode such as `1920x1080` or `1280x720@60`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeRequest {
    pub width: u16,
    pub height: u16,
    pub refresh: Option<f64>,
}

impl FromStr for ModeRequest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (size, refresh) = match s.split_once('@') {
            Some((size, refresh)) => (size, Some(refresh)),
            None => (s, None),
        };

        let Some((width, height)) = size.split_once('x') else {
            bail!("no 'x' separator found in {s:?}");
        };

        let width = width.parse().context("error parsing width")?;
        let height = height.parse().context("error parsing height")?;
        ensure!(width > 0 && height > 0, "mode size must be non-zero");

        let refresh = refresh
            .map(str::parse::<f64>)
            .transpose()
            .context("error parsing refresh rate")?;
        if let Some(refresh) = refresh {
            ensure!(
                refresh.is_finite() && refresh > 0.,
                "refresh rate must be positive"
            );
        }

        Ok(Self {
            width,
            height,
            refresh,
        })
    }
}

/// Refresh rate in mHz, rounded the way compositors usually report it.
pub fn refresh_millihertz(mode: &TimingMode) -> i32 {
    let htotal = u64::from(mode.htotal);
    let vtotal = u64::from(mode.vtotal);
    if htotal == 0 || vtotal == 0 {
        return 0;
    }

    let refresh = (u64::from(mode.clock) * 1_000_000 / htotal + vtotal / 2) / vtotal;
    refresh as i32
}

/// Pick the best mode from a list.
///
/// Returns the mode and whether the target could not be honored.
pub fn pick_mode(
    modes: &[TimingMode],
    target: Option<ModeRequest>,
) -> Option<(TimingMode, bool)> {
    let mut mode: Option<&TimingMode> = None;
    let mut fallback = false;

    if let Some(target) = target {
        let refresh = target.refresh.map(|r| (r * 1000.).round() as i32);
        for m in modes {
            if m.size() != (target.width, target.height) {
                continue;
            }

            // The transmitter has no interlaced scan-out.
            if m.flags.contains(ModeFlags::INTERLACE) {
                continue;
            }

            if let Some(refresh) = refresh {
                // If refresh is set, only pick modes with matching refresh.
                if refresh_millihertz(m) == refresh {
                    mode = Some(m);
                }
            } else if let Some(curr) = mode {
                // If refresh isn't set, pick the mode with the highest refresh.
                if curr.vrefresh < m.vrefresh {
                    mode = Some(m);
                }
            } else {
                mode = Some(m);
            }
        }

        if mode.is_none() {
            warn!(
                "requested mode {}x{} not available, falling back",
                target.width, target.height
            );
            fallback = true;
        }
    }

    if mode.is_none() {
        // Pick a preferred mode.
        for m in modes {
            if !m.is_preferred() {
                continue;
            }

            if let Some(curr) = mode {
                if curr.vrefresh < m.vrefresh {
                    mode = Some(m);
                }
            } else {
                mode = Some(m);
            }
        }
    }

    if mode.is_none() {
        // Last attempt.
        mode = modes.first();
    }

    mode.map(|m| (m.clone(), fallback))
}
