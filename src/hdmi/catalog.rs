//! Built-in timing tables.
//!
//! A subset of the VESA DMT list, the EDID established timings and the CEA-861 VIC table.
//! These back the no-EDID mode list and the lookups done while decoding EDID.

use super::modes::{ModeFlags, ModeTypeFlags, TimingMode};

const PP: ModeFlags = ModeFlags::PHSYNC.union(ModeFlags::PVSYNC);
const PN: ModeFlags = ModeFlags::PHSYNC.union(ModeFlags::NVSYNC);
const NP: ModeFlags = ModeFlags::NHSYNC.union(ModeFlags::PVSYNC);
const NN: ModeFlags = ModeFlags::NHSYNC.union(ModeFlags::NVSYNC);
const PPI: ModeFlags = PP.union(ModeFlags::INTERLACE);

#[derive(Debug, Clone, Copy)]
pub struct StdTiming {
    pub clock: u32,
    pub h: (u16, u16, u16, u16),
    pub v: (u16, u16, u16, u16),
    pub flags: ModeFlags,
    pub reduced_blanking: bool,
}

impl StdTiming {
    const fn new(
        clock: u32,
        h: (u16, u16, u16, u16),
        v: (u16, u16, u16, u16),
        flags: ModeFlags,
    ) -> Self {
        Self {
            clock,
            h,
            v,
            flags,
            reduced_blanking: false,
        }
    }

    const fn rb(self) -> Self {
        Self {
            reduced_blanking: true,
            ..self
        }
    }

    pub fn to_mode(&self) -> TimingMode {
        TimingMode::from_timings(self.clock, self.h, self.v, self.flags, ModeTypeFlags::DRIVER)
    }
}

/// VESA DMT timings, ordered by DMT id.
pub const DMT_MODES: &[StdTiming] = &[
    // 0x01 640x350@85
    StdTiming::new(31500, (640, 672, 736, 832), (350, 382, 385, 445), PN),
    // 0x02 640x400@85
    StdTiming::new(31500, (640, 672, 736, 832), (400, 401, 404, 445), NP),
    // 0x03 720x400@85
    StdTiming::new(35500, (720, 756, 828, 936), (400, 401, 404, 446), NP),
    // 0x04 640x480@60
    StdTiming::new(25175, (640, 656, 752, 800), (480, 490, 492, 525), NN),
    // 0x05 640x480@72
    StdTiming::new(31500, (640, 664, 704, 832), (480, 489, 492, 520), NN),
    // 0x06 640x480@75
    StdTiming::new(31500, (640, 656, 720, 840), (480, 481, 484, 500), NN),
    // 0x07 640x480@85
    StdTiming::new(36000, (640, 696, 752, 832), (480, 481, 484, 509), NN),
    // 0x08 800x600@56
    StdTiming::new(36000, (800, 824, 896, 1024), (600, 601, 603, 625), PP),
    // 0x09 800x600@60
    StdTiming::new(40000, (800, 840, 968, 1056), (600, 601, 605, 628), PP),
    // 0x0a 800x600@72
    StdTiming::new(50000, (800, 856, 976, 1040), (600, 637, 643, 666), PP),
    // 0x0b 800x600@75
    StdTiming::new(49500, (800, 816, 896, 1056), (600, 601, 604, 625), PP),
    // 0x0c 800x600@85
    StdTiming::new(56250, (800, 832, 896, 1048), (600, 601, 604, 631), PP),
    // 0x0e 848x480@60
    StdTiming::new(33750, (848, 864, 976, 1088), (480, 486, 494, 517), PP),
    // 0x0f 1024x768@43 interlaced
    StdTiming::new(44900, (1024, 1032, 1208, 1264), (768, 768, 776, 817), PPI),
    // 0x10 1024x768@60
    StdTiming::new(65000, (1024, 1048, 1184, 1344), (768, 771, 777, 806), NN),
    // 0x11 1024x768@70
    StdTiming::new(75000, (1024, 1048, 1184, 1328), (768, 771, 777, 806), NN),
    // 0x12 1024x768@75
    StdTiming::new(78750, (1024, 1040, 1136, 1312), (768, 769, 772, 800), PP),
    // 0x13 1024x768@85
    StdTiming::new(94500, (1024, 1072, 1168, 1376), (768, 769, 772, 808), PP),
    // 0x15 1152x864@75
    StdTiming::new(108000, (1152, 1216, 1344, 1600), (864, 865, 868, 900), PP),
    // 0x16 1280x768@60 reduced blanking
    StdTiming::new(68250, (1280, 1328, 1360, 1440), (768, 771, 778, 790), PN).rb(),
    // 0x17 1280x768@60
    StdTiming::new(79500, (1280, 1344, 1472, 1664), (768, 771, 778, 798), NP),
    // 0x1b 1280x800@60 reduced blanking
    StdTiming::new(71000, (1280, 1328, 1360, 1440), (800, 803, 809, 823), PN).rb(),
    // 0x1c 1280x800@60
    StdTiming::new(83500, (1280, 1352, 1480, 1680), (800, 803, 809, 831), NP),
    // 0x20 1280x960@60
    StdTiming::new(108000, (1280, 1376, 1488, 1800), (960, 961, 964, 1000), PP),
    // 0x23 1280x1024@60
    StdTiming::new(108000, (1280, 1328, 1440, 1688), (1024, 1025, 1028, 1066), PP),
    // 0x24 1280x1024@75
    StdTiming::new(135000, (1280, 1296, 1440, 1688), (1024, 1025, 1028, 1066), PP),
    // 0x27 1360x768@60
    StdTiming::new(85500, (1360, 1424, 1536, 1792), (768, 771, 777, 795), PP),
    // 0x2a 1400x1050@60
    StdTiming::new(121750, (1400, 1488, 1632, 1864), (1050, 1053, 1057, 1089), NP),
    // 0x2e 1440x900@60 reduced blanking
    StdTiming::new(88750, (1440, 1488, 1520, 1600), (900, 903, 909, 926), PN).rb(),
    // 0x2f 1440x900@60
    StdTiming::new(106500, (1440, 1520, 1672, 1904), (900, 903, 909, 934), NP),
    // 0x33 1600x1200@60
    StdTiming::new(162000, (1600, 1664, 1856, 2160), (1200, 1201, 1204, 1250), PP),
    // 0x39 1680x1050@60 reduced blanking
    StdTiming::new(119000, (1680, 1728, 1760, 1840), (1050, 1053, 1059, 1080), PN).rb(),
    // 0x3a 1680x1050@60
    StdTiming::new(146250, (1680, 1784, 1960, 2240), (1050, 1053, 1059, 1089), NP),
    // 0x44 1920x1200@60 reduced blanking
    StdTiming::new(154000, (1920, 1968, 2000, 2080), (1200, 1203, 1209, 1235), PN).rb(),
    // 0x51 1366x768@60
    StdTiming::new(85500, (1366, 1436, 1579, 1792), (768, 771, 774, 798), PP),
    // 0x52 1920x1080@60
    StdTiming::new(148500, (1920, 2008, 2052, 2200), (1080, 1084, 1089, 1125), PP),
    // 0x53 1600x900@60 reduced blanking
    StdTiming::new(108000, (1600, 1624, 1704, 1800), (900, 901, 904, 1000), PP).rb(),
    // 0x55 1280x720@60
    StdTiming::new(74250, (1280, 1390, 1430, 1650), (720, 725, 730, 750), PP),
];

/// Established timings I and II, indexed by bit position.
///
/// Bits 0..=7 come from EDID byte 35, 8..=15 from byte 36 and bit 16 is the top bit of byte 37.
pub const ESTABLISHED_MODES: [StdTiming; 17] = [
    // 800x600@60
    StdTiming::new(40000, (800, 840, 968, 1056), (600, 601, 605, 628), PP),
    // 800x600@56
    StdTiming::new(36000, (800, 824, 896, 1024), (600, 601, 603, 625), PP),
    // 640x480@75
    StdTiming::new(31500, (640, 656, 720, 840), (480, 481, 484, 500), NN),
    // 640x480@72
    StdTiming::new(31500, (640, 664, 704, 832), (480, 489, 492, 520), NN),
    // 640x480@67
    StdTiming::new(30240, (640, 704, 768, 864), (480, 483, 486, 525), NN),
    // 640x480@60
    StdTiming::new(25175, (640, 656, 752, 800), (480, 490, 492, 525), NN),
    // 720x400@88
    StdTiming::new(35500, (720, 738, 846, 900), (400, 421, 423, 449), NP),
    // 720x400@70
    StdTiming::new(28320, (720, 738, 846, 900), (400, 412, 414, 449), NP),
    // 1280x1024@75
    StdTiming::new(135000, (1280, 1296, 1440, 1688), (1024, 1025, 1028, 1066), PP),
    // 1024x768@75
    StdTiming::new(78750, (1024, 1040, 1136, 1312), (768, 769, 772, 800), PP),
    // 1024x768@70
    StdTiming::new(75000, (1024, 1048, 1184, 1328), (768, 771, 777, 806), NN),
    // 1024x768@60
    StdTiming::new(65000, (1024, 1048, 1184, 1344), (768, 771, 777, 806), NN),
    // 1024x768@87 interlaced
    StdTiming::new(44900, (1024, 1032, 1208, 1264), (768, 768, 776, 817), PPI),
    // 832x624@75
    StdTiming::new(57284, (832, 864, 928, 1152), (624, 625, 628, 667), NN),
    // 800x600@75
    StdTiming::new(49500, (800, 816, 896, 1056), (600, 601, 604, 625), PP),
    // 800x600@72
    StdTiming::new(50000, (800, 856, 976, 1040), (600, 637, 643, 666), PP),
    // 1152x870@75
    StdTiming::new(100000, (1152, 1184, 1280, 1456), (870, 871, 874, 915), PP),
];

/// CEA-861 video identification codes we know about.
const CEA_MODES: &[(u8, StdTiming)] = &[
    (1, StdTiming::new(25175, (640, 656, 752, 800), (480, 490, 492, 525), NN)),
    (2, StdTiming::new(27000, (720, 736, 798, 858), (480, 489, 495, 525), NN)),
    (3, StdTiming::new(27000, (720, 736, 798, 858), (480, 489, 495, 525), NN)),
    (4, StdTiming::new(74250, (1280, 1390, 1430, 1650), (720, 725, 730, 750), PP)),
    (5, StdTiming::new(74250, (1920, 2008, 2052, 2200), (1080, 1084, 1094, 1125), PPI)),
    (16, StdTiming::new(148500, (1920, 2008, 2052, 2200), (1080, 1084, 1089, 1125), PP)),
    (17, StdTiming::new(27000, (720, 732, 796, 864), (576, 581, 586, 625), NN)),
    (18, StdTiming::new(27000, (720, 732, 796, 864), (576, 581, 586, 625), NN)),
    (19, StdTiming::new(74250, (1280, 1720, 1760, 1980), (720, 725, 730, 750), PP)),
    (20, StdTiming::new(74250, (1920, 2448, 2492, 2640), (1080, 1084, 1094, 1125), PPI)),
    (31, StdTiming::new(148500, (1920, 2448, 2492, 2640), (1080, 1084, 1089, 1125), PP)),
    (32, StdTiming::new(74250, (1920, 2558, 2602, 2750), (1080, 1084, 1089, 1125), PP)),
    (33, StdTiming::new(74250, (1920, 2448, 2492, 2640), (1080, 1084, 1089, 1125), PP)),
    (34, StdTiming::new(74250, (1920, 2008, 2052, 2200), (1080, 1084, 1089, 1125), PP)),
];

/// Look up a DMT mode by size and rounded refresh.
pub fn find_dmt(width: u16, height: u16, refresh: u32, reduced_blanking: bool) -> Option<TimingMode> {
    DMT_MODES
        .iter()
        .filter(|t| t.h.0 == width && t.v.0 == height && t.reduced_blanking == reduced_blanking)
        .map(StdTiming::to_mode)
        .find(|mode| mode.vrefresh == refresh)
}

pub fn find_cea(vic: u8) -> Option<TimingMode> {
    CEA_MODES
        .iter()
        .find(|(v, _)| *v == vic)
        .map(|(_, timing)| timing.to_mode())
}

/// DMT modes fitting within the given size at no more than 61 Hz.
pub fn dmt_modes_within(max_width: u16, max_height: u16) -> impl Iterator<Item = TimingMode> {
    DMT_MODES
        .iter()
        .filter(move |t| t.h.0 <= max_width && t.v.0 <= max_height)
        .map(StdTiming::to_mode)
        .filter(|mode| mode.vrefresh <= 61)
}
