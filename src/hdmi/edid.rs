//! EDID reading and decoding.
//!
//! Decodes the parts of EDID 1.3/1.4 and CEA-861 extensions that describe timings: detailed
//! timing descriptors, established and standard timings, and short video descriptors. The
//! vendor, product and serial are extracted for naming. Everything else is ignored.

use anyhow::{bail, ensure, Context};
use tracing::{debug, trace, warn};

use super::bus::{DdcBus, EDID_BLOCK_LEN};
use super::catalog::{self, ESTABLISHED_MODES};
use super::helpers::calculate_mode_cvt;
use super::modes::{ModeFlags, ModeTypeFlags, TimingMode};

pub const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// Extension blocks read beyond the base block.
pub const MAX_EXTENSIONS: u8 = 3;

/// Attempts at reading a valid base block before giving up.
const BASE_BLOCK_ATTEMPTS: usize = 4;

const CEA_EXTENSION_TAG: u8 = 0x02;
const CEA_VIDEO_DATA_BLOCK: u8 = 2;

const DESCRIPTOR_SERIAL: u8 = 0xFF;
const DESCRIPTOR_NAME: u8 = 0xFC;

const FEATURE_PREFERRED_TIMING: u8 = 1 << 1;

/// Who the sink says it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdidIdentity {
    /// Three-letter PNP vendor id.
    pub make: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
}

/// A decoded EDID.
#[derive(Debug, Clone)]
pub struct Edid {
    raw: Vec<u8>,
    version: (u8, u8),
    identity: EdidIdentity,
    modes: Vec<TimingMode>,
}

impl Edid {
    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("Edid::parse");

        ensure!(
            data.len() >= EDID_BLOCK_LEN,
            "EDID too short: {} bytes",
            data.len()
        );

        let base = &data[..EDID_BLOCK_LEN];
        ensure!(base[..8] == EDID_HEADER, "invalid EDID header");
        ensure!(block_checksum_ok(base), "EDID base block checksum mismatch");

        let version = (base[18], base[19]);
        ensure!(version.0 == 1, "unsupported EDID version {}.{}", version.0, version.1);

        let first_detailed_preferred =
            version.1 >= 4 || base[24] & FEATURE_PREFERRED_TIMING != 0;

        let mut modes = Vec::new();
        let mut identity = EdidIdentity {
            make: decode_pnp_id(base[8], base[9]),
            ..EdidIdentity::default()
        };

        for (i, descriptor) in base[54..126].chunks_exact(18).enumerate() {
            match decode_descriptor(descriptor) {
                Descriptor::Timing(Some(mut mode)) => {
                    if i == 0 && first_detailed_preferred {
                        mode.set_preferred(true);
                    }
                    modes.push(mode);
                }
                Descriptor::Timing(None) => (),
                Descriptor::Name(name) => identity.model = Some(name),
                Descriptor::Serial(serial) => identity.serial = Some(serial),
                Descriptor::Other => (),
            }
        }

        modes.extend(base[38..54].chunks_exact(2).filter_map(|t| decode_standard_timing(t, version)));
        modes.extend(established_modes(&base[35..38]));

        if identity.model.is_none() {
            let product = u16::from_le_bytes([base[10], base[11]]);
            identity.model = Some(format!("0x{product:04X}"));
        }
        if identity.serial.is_none() {
            let serial = u32::from_le_bytes([base[12], base[13], base[14], base[15]]);
            if serial != 0 {
                identity.serial = Some(serial.to_string());
            }
        }

        for (i, block) in data[EDID_BLOCK_LEN..].chunks_exact(EDID_BLOCK_LEN).enumerate() {
            if !block_checksum_ok(block) {
                warn!("ignoring extension block {} with bad checksum", i + 1);
                continue;
            }

            match block[0] {
                CEA_EXTENSION_TAG => modes.extend(cea_modes(block)),
                tag => debug!("ignoring extension block {} with tag {tag:#04x}", i + 1),
            }
        }

        let modes = dedup_modes(modes);
        debug!(
            "decoded EDID {}.{} with {} modes",
            version.0,
            version.1,
            modes.len()
        );

        Ok(Self {
            raw: data.to_vec(),
            version,
            identity,
            modes,
        })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    pub fn identity(&self) -> &EdidIdentity {
        &self.identity
    }

    pub fn modes(&self) -> &[TimingMode] {
        &self.modes
    }

    pub fn into_modes(self) -> Vec<TimingMode> {
        self.modes
    }
}

/// Reads the base block and its extensions from the bus.
pub fn read_edid(bus: &dyn DdcBus) -> anyhow::Result<Vec<u8>> {
    let _span = tracy_client::span!("read_edid");

    let mut base = None;
    for attempt in 1..=BASE_BLOCK_ATTEMPTS {
        let block = bus
            .read_block(0)
            .with_context(|| format!("error reading EDID base block from {}", bus.name()))?;

        if block[..8] == EDID_HEADER && block_checksum_ok(&block) {
            base = Some(block);
            break;
        }

        debug!("EDID base block attempt {attempt} was corrupt");
    }

    let Some(base) = base else {
        bail!("EDID base block corrupt after {BASE_BLOCK_ATTEMPTS} attempts");
    };

    let extensions = base[126];
    if extensions > MAX_EXTENSIONS {
        warn!("EDID announces {extensions} extensions, reading only {MAX_EXTENSIONS}");
    }

    let mut data = base.to_vec();
    for index in 1..=extensions.min(MAX_EXTENSIONS) {
        match bus.read_block(index) {
            Ok(block) => data.extend_from_slice(&block),
            Err(err) => {
                warn!("error reading EDID extension block {index}: {err:?}");
                break;
            }
        }
    }

    trace!("read {} EDID bytes", data.len());
    Ok(data)
}

fn block_checksum_ok(block: &[u8]) -> bool {
    block.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0
}

fn decode_pnp_id(hi: u8, lo: u8) -> Option<String> {
    let id = u16::from_be_bytes([hi, lo]);
    let letters = [(id >> 10) & 0x1F, (id >> 5) & 0x1F, id & 0x1F];

    letters
        .iter()
        .map(|l| match *l {
            1..=26 => Some(char::from(b'A' + *l as u8 - 1)),
            _ => None,
        })
        .collect()
}

enum Descriptor {
    Timing(Option<TimingMode>),
    Name(String),
    Serial(String),
    Other,
}

fn decode_descriptor(d: &[u8]) -> Descriptor {
    if d[0] != 0 || d[1] != 0 {
        return Descriptor::Timing(decode_detailed_timing(d));
    }

    match d[3] {
        DESCRIPTOR_NAME => Descriptor::Name(descriptor_text(&d[5..18])),
        DESCRIPTOR_SERIAL => Descriptor::Serial(descriptor_text(&d[5..18])),
        _ => Descriptor::Other,
    }
}

fn descriptor_text(text: &[u8]) -> String {
    let end = text.iter().position(|b| *b == b'\n').unwrap_or(text.len());
    String::from_utf8_lossy(&text[..end]).trim_end().to_owned()
}

/// Decodes an 18-byte detailed timing descriptor.
pub fn decode_detailed_timing(d: &[u8]) -> Option<TimingMode> {
    let clock = u32::from(u16::from_le_bytes([d[0], d[1]])) * 10;

    let hactive = u16::from(d[2]) | (u16::from(d[4] & 0xF0) << 4);
    let hblank = u16::from(d[3]) | (u16::from(d[4] & 0x0F) << 8);
    let vactive = u16::from(d[5]) | (u16::from(d[7] & 0xF0) << 4);
    let vblank = u16::from(d[6]) | (u16::from(d[7] & 0x0F) << 8);

    let hsync_offset = u16::from(d[8]) | (u16::from(d[11] & 0xC0) << 2);
    let hsync_pulse = u16::from(d[9]) | (u16::from(d[11] & 0x30) << 4);
    let vsync_offset = u16::from(d[10] >> 4) | (u16::from(d[11] & 0x0C) << 2);
    let vsync_pulse = u16::from(d[10] & 0x0F) | (u16::from(d[11] & 0x03) << 4);

    let misc = d[17];

    if hactive < 64 || vactive < 64 {
        debug!("ignoring detailed timing smaller than 64x64");
        return None;
    }
    if hsync_pulse == 0 || vsync_pulse == 0 {
        debug!("ignoring detailed timing with zero sync pulse width");
        return None;
    }

    let hsync_start = hactive + hsync_offset;
    let hsync_end = hsync_start + hsync_pulse;
    let mut htotal = hactive + hblank;
    let mut vsync_start = vactive + vsync_offset;
    let mut vsync_end = vsync_start + vsync_pulse;
    let mut vtotal = vactive + vblank;
    let mut vdisplay = vactive;

    // Some sinks put the sync pulse past the blanking interval.
    if hsync_end > htotal {
        htotal = hsync_end + 1;
    }
    if vsync_end > vtotal {
        vtotal = vsync_end + 1;
    }

    let mut flags = ModeFlags::empty();
    flags |= if misc & (1 << 1) != 0 {
        ModeFlags::PHSYNC
    } else {
        ModeFlags::NHSYNC
    };
    flags |= if misc & (1 << 2) != 0 {
        ModeFlags::PVSYNC
    } else {
        ModeFlags::NVSYNC
    };

    // Interlaced timings describe one field.
    if misc & 0x80 != 0 {
        flags |= ModeFlags::INTERLACE;
        vdisplay *= 2;
        vsync_start *= 2;
        vsync_end *= 2;
        vtotal = vtotal * 2 | 1;
    }

    if misc & 0x60 != 0 {
        flags |= if misc & 0x61 == 0x20 {
            ModeFlags::FIELD_ALTERNATIVE_3D
        } else {
            ModeFlags::SIDE_BY_SIDE_HALF_3D
        };
    }

    Some(TimingMode::from_timings(
        clock,
        (hactive, hsync_start, hsync_end, htotal),
        (vdisplay, vsync_start, vsync_end, vtotal),
        flags,
        ModeTypeFlags::DRIVER,
    ))
}

fn decode_standard_timing(t: &[u8], version: (u8, u8)) -> Option<TimingMode> {
    // Unused slots are padded with 01 01, 00 00 or 20 20.
    if (t[0] <= 0x01 && t[1] <= 0x01) || (t[0] == 0x20 && t[1] == 0x20) {
        return None;
    }

    let width = (u16::from(t[0]) + 31) * 8;
    let refresh = u32::from(t[1] & 0x3F) + 60;
    let height = match t[1] >> 6 {
        // 16:10 since EDID 1.3, 1:1 before.
        0 if version.1 < 3 => width,
        0 => width * 10 / 16,
        1 => width * 3 / 4,
        2 => width * 4 / 5,
        _ => width * 9 / 16,
    };

    if let Some(mode) = catalog::find_dmt(width, height, refresh, false) {
        return Some(mode);
    }

    trace!("no DMT mode for {width}x{height}@{refresh}, using CVT");
    let mut mode = calculate_mode_cvt(width, height, f64::from(refresh))?;
    mode.mode_type = ModeTypeFlags::DRIVER;
    Some(mode)
}

fn established_modes(bytes: &[u8]) -> impl Iterator<Item = TimingMode> {
    let bits = u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2] & 0x80) << 9);

    ESTABLISHED_MODES
        .iter()
        .enumerate()
        .filter(move |(i, _)| bits & (1 << i) != 0)
        .map(|(_, timing)| timing.to_mode())
}

fn cea_modes(block: &[u8]) -> Vec<TimingMode> {
    let mut modes = Vec::new();
    let dtd_offset = usize::from(block[2]);

    if (4..=127).contains(&dtd_offset) {
        let mut pos = 4;
        while pos < dtd_offset {
            let header = block[pos];
            let tag = header >> 5;
            let len = usize::from(header & 0x1F);
            let end = (pos + 1 + len).min(dtd_offset);

            if tag == CEA_VIDEO_DATA_BLOCK {
                for svd in &block[pos + 1..end] {
                    let vic = if (1..=64).contains(&(svd & 0x7F)) {
                        svd & 0x7F
                    } else {
                        *svd
                    };

                    match catalog::find_cea(vic) {
                        Some(mode) => modes.push(mode),
                        None => trace!("unknown VIC {vic}"),
                    }
                }
            }

            pos = end;
        }

        let mut pos = dtd_offset;
        while pos + 18 <= 127 {
            let descriptor = &block[pos..pos + 18];
            if descriptor[0] == 0 && descriptor[1] == 0 {
                break;
            }
            if let Some(mode) = decode_detailed_timing(descriptor) {
                modes.push(mode);
            }
            pos += 18;
        }
    }

    modes
}

/// Drops repeated timings, keeping the first and carrying the preferred flag over.
fn dedup_modes(modes: Vec<TimingMode>) -> Vec<TimingMode> {
    let mut out: Vec<TimingMode> = Vec::with_capacity(modes.len());

    for mode in modes {
        if let Some(existing) = out.iter_mut().find(|m| m.same_timing(&mode)) {
            if mode.is_preferred() {
                existing.set_preferred(true);
            }
            continue;
        }
        out.push(mode);
    }

    out
}
