//! Fakes for the hardware collaborators and a synthetic EDID builder.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::bail;

use crate::hdmi::{
    BindStep, BridgeId, BusError, Clock, ConnectorDesc, ConnectorId, DdcBus, DrmMaster,
    EncoderDesc, EncoderId, ModeFlags, TimingMode, EDID_BLOCK_LEN, EDID_HEADER,
};

// =============================================================================
// Clock
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockCall {
    SetRate(u64),
    PrepareEnable,
    DisableUnprepare,
}

#[derive(Debug, Default)]
struct ClockState {
    calls: Vec<ClockCall>,
    rate: Option<u64>,
    max_rate: Option<u64>,
    fail_enable: bool,
}

/// Handle for inspecting and steering a `FakeClock` after it was moved into a device.
#[derive(Debug, Clone, Default)]
pub struct ClockLog(Arc<Mutex<ClockState>>);

impl ClockLog {
    /// Every call the provider received, failed ones included.
    pub fn calls(&self) -> Vec<ClockCall> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn fail_enable(&self, fail: bool) {
        self.0.lock().unwrap().fail_enable = fail;
    }

    pub fn set_max_rate(&self, hz: u64) {
        self.0.lock().unwrap().max_rate = Some(hz);
    }
}

pub struct FakeClock(ClockLog);

impl FakeClock {
    pub fn new() -> (Self, ClockLog) {
        let log = ClockLog::default();
        (Self(log.clone()), log)
    }
}

impl Clock for FakeClock {
    fn set_rate(&mut self, hz: u64) -> anyhow::Result<()> {
        let mut state = self.0 .0.lock().unwrap();
        state.calls.push(ClockCall::SetRate(hz));
        if let Some(max) = state.max_rate {
            if hz > max {
                bail!("rate {hz} above {max}");
            }
        }
        state.rate = Some(hz);
        Ok(())
    }

    fn prepare_enable(&mut self) -> anyhow::Result<()> {
        let mut state = self.0 .0.lock().unwrap();
        state.calls.push(ClockCall::PrepareEnable);
        if state.fail_enable {
            bail!("clock gate stuck");
        }
        Ok(())
    }

    fn disable_unprepare(&mut self) {
        self.0 .0.lock().unwrap().calls.push(ClockCall::DisableUnprepare);
    }

    fn rate(&self) -> Option<u64> {
        self.0 .0.lock().unwrap().rate
    }
}

// =============================================================================
// DDC bus
// =============================================================================

#[derive(Debug, Default)]
struct BusState {
    edid: Option<Vec<u8>>,
    present: bool,
    corrupt_reads: usize,
    block_reads: usize,
    probes: usize,
}

#[derive(Debug, Default)]
pub struct FakeBus(Mutex<BusState>);

impl FakeBus {
    /// A connected sink answering with `edid`.
    pub fn with_edid(edid: Vec<u8>) -> Self {
        Self(Mutex::new(BusState {
            edid: Some(edid),
            present: true,
            ..BusState::default()
        }))
    }

    /// Nothing on the other end.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn set_present(&self, present: bool) {
        self.0.lock().unwrap().present = present;
    }

    pub fn set_edid(&self, edid: Option<Vec<u8>>) {
        self.0.lock().unwrap().edid = edid;
    }

    /// Makes the next `count` base block reads return garbage.
    pub fn corrupt_next_reads(&self, count: usize) {
        self.0.lock().unwrap().corrupt_reads = count;
    }

    pub fn block_reads(&self) -> usize {
        self.0.lock().unwrap().block_reads
    }

    pub fn probes(&self) -> usize {
        self.0.lock().unwrap().probes
    }
}

impl DdcBus for FakeBus {
    fn read_block(&self, index: u8) -> Result<[u8; EDID_BLOCK_LEN], BusError> {
        let mut state = self.0.lock().unwrap();
        state.block_reads += 1;

        let start = usize::from(index) * EDID_BLOCK_LEN;
        let Some(data) = state.edid.as_ref().and_then(|e| e.get(start..start + EDID_BLOCK_LEN))
        else {
            return Err(BusError::NotFound);
        };

        let mut block = [0; EDID_BLOCK_LEN];
        block.copy_from_slice(data);

        if index == 0 && state.corrupt_reads > 0 {
            state.corrupt_reads -= 1;
            block[20] ^= 0xFF;
        }

        Ok(block)
    }

    fn probe(&self) -> bool {
        let mut state = self.0.lock().unwrap();
        state.probes += 1;
        state.present
    }

    fn name(&self) -> &str {
        "fake-ddc"
    }
}

// =============================================================================
// Compositor
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterCall {
    EncoderInit,
    EncoderCleanup,
    BridgeAttach,
    BridgeDetach,
    ConnectorInit,
    ConnectorRegister,
    ConnectorUnregister,
    ConnectorCleanup,
    ConnectorAttachEncoder,
}

/// Records every call and tracks which objects are alive.
#[derive(Debug, Default)]
pub struct FakeMaster {
    calls: Vec<MasterCall>,
    fail: Option<BindStep>,
    next_id: u32,
    encoders: Vec<EncoderDesc>,
    connectors: Vec<ConnectorDesc>,
    live_encoders: HashSet<EncoderId>,
    live_bridges: HashSet<BridgeId>,
    live_connectors: HashSet<ConnectorId>,
    registered: HashSet<ConnectorId>,
}

impl FakeMaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next call at `step`, then behaves again.
    pub fn fail_once(&mut self, step: BindStep) {
        self.fail = Some(step);
    }

    pub fn calls(&self) -> &[MasterCall] {
        &self.calls
    }

    /// Every encoder ever created.
    pub fn encoders(&self) -> &[EncoderDesc] {
        &self.encoders
    }

    /// Every connector ever created.
    pub fn connectors(&self) -> &[ConnectorDesc] {
        &self.connectors
    }

    /// Objects and registrations that have not been released.
    pub fn live_objects(&self) -> usize {
        self.live_encoders.len()
            + self.live_bridges.len()
            + self.live_connectors.len()
            + self.registered.len()
    }

    fn record(&mut self, call: MasterCall, step: BindStep) -> anyhow::Result<u32> {
        self.calls.push(call);
        if self.fail == Some(step) {
            self.fail = None;
            bail!("injected failure at {step}");
        }
        self.next_id += 1;
        Ok(self.next_id)
    }
}

impl DrmMaster for FakeMaster {
    fn encoder_init(&mut self, desc: &EncoderDesc) -> anyhow::Result<EncoderId> {
        let id = EncoderId(self.record(MasterCall::EncoderInit, BindStep::EncoderInit)?);
        self.encoders.push(desc.clone());
        self.live_encoders.insert(id);
        Ok(id)
    }

    fn encoder_cleanup(&mut self, encoder: EncoderId) {
        self.calls.push(MasterCall::EncoderCleanup);
        assert!(self.live_encoders.remove(&encoder), "double encoder cleanup");
    }

    fn bridge_attach(&mut self, encoder: EncoderId) -> anyhow::Result<BridgeId> {
        assert!(self.live_encoders.contains(&encoder));
        let id = BridgeId(self.record(MasterCall::BridgeAttach, BindStep::BridgeAttach)?);
        self.live_bridges.insert(id);
        Ok(id)
    }

    fn bridge_detach(&mut self, bridge: BridgeId) {
        self.calls.push(MasterCall::BridgeDetach);
        assert!(self.live_bridges.remove(&bridge), "double bridge detach");
    }

    fn connector_init(&mut self, desc: &ConnectorDesc) -> anyhow::Result<ConnectorId> {
        let id = ConnectorId(self.record(MasterCall::ConnectorInit, BindStep::ConnectorInit)?);
        self.connectors.push(desc.clone());
        self.live_connectors.insert(id);
        Ok(id)
    }

    fn connector_register(&mut self, connector: ConnectorId) -> anyhow::Result<()> {
        self.record(MasterCall::ConnectorRegister, BindStep::ConnectorRegister)?;
        self.registered.insert(connector);
        Ok(())
    }

    fn connector_unregister(&mut self, connector: ConnectorId) {
        self.calls.push(MasterCall::ConnectorUnregister);
        self.registered.remove(&connector);
    }

    fn connector_cleanup(&mut self, connector: ConnectorId) {
        self.calls.push(MasterCall::ConnectorCleanup);
        assert!(
            !self.registered.contains(&connector),
            "connector cleaned up while registered"
        );
        assert!(self.live_connectors.remove(&connector), "double connector cleanup");
    }

    fn connector_attach_encoder(
        &mut self,
        connector: ConnectorId,
        encoder: EncoderId,
    ) -> anyhow::Result<()> {
        assert!(self.live_connectors.contains(&connector));
        assert!(self.live_encoders.contains(&encoder));
        self.record(MasterCall::ConnectorAttachEncoder, BindStep::ConnectorAttach)?;
        Ok(())
    }
}

// =============================================================================
// EDID builder
// =============================================================================

/// Contents of a synthetic EDID base block.
#[derive(Debug, Clone)]
pub struct EdidTemplate {
    pub manufacturer: &'static str,
    pub product: u16,
    pub serial_number: u32,
    pub revision: u8,
    /// Feature bit saying the first detailed timing is the preferred one.
    pub preferred_feature: bool,
    /// Bytes 35..38.
    pub established: [u8; 3],
    /// `(width, height, refresh)`.
    pub standard: Vec<(u16, u16, u8)>,
    pub detailed: Vec<TimingMode>,
    pub name: Option<&'static str>,
    pub serial_text: Option<&'static str>,
    pub extensions: u8,
}

impl EdidTemplate {
    /// A 1080p monitor with a handful of legacy timings.
    pub fn monitor() -> Self {
        Self {
            manufacturer: "DIG",
            product: 0x1234,
            serial_number: 42,
            revision: 4,
            preferred_feature: true,
            // 800x600@60, 640x480@60 and 1024x768@60.
            established: [0x21, 0x08, 0x00],
            standard: vec![(1280, 1024, 60), (1920, 1080, 60)],
            detailed: vec![
                crate::hdmi::find_dmt(1920, 1080, 60, false).unwrap(),
                crate::hdmi::find_dmt(1280, 720, 60, false).unwrap(),
            ],
            name: Some("FPGA Monitor"),
            serial_text: Some("SN0001"),
            extensions: 0,
        }
    }
}

pub fn checksum(block: &mut [u8]) {
    let sum = block[..EDID_BLOCK_LEN - 1]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    block[EDID_BLOCK_LEN - 1] = 0u8.wrapping_sub(sum);
}

pub fn encode_detailed_timing(mode: &TimingMode) -> [u8; 18] {
    let hactive = mode.hdisplay;
    let hblank = mode.htotal - mode.hdisplay;
    let vactive = mode.vdisplay;
    let vblank = mode.vtotal - mode.vdisplay;
    let hso = mode.hsync_start - mode.hdisplay;
    let hspw = mode.hsync_end - mode.hsync_start;
    let vso = mode.vsync_start - mode.vdisplay;
    let vspw = mode.vsync_end - mode.vsync_start;

    let mut d = [0u8; 18];
    d[0..2].copy_from_slice(&((mode.clock / 10) as u16).to_le_bytes());
    d[2] = hactive as u8;
    d[3] = hblank as u8;
    d[4] = (((hactive >> 8) << 4) | (hblank >> 8)) as u8;
    d[5] = vactive as u8;
    d[6] = vblank as u8;
    d[7] = (((vactive >> 8) << 4) | (vblank >> 8)) as u8;
    d[8] = hso as u8;
    d[9] = hspw as u8;
    d[10] = (((vso & 0xF) << 4) | (vspw & 0xF)) as u8;
    d[11] = ((((hso >> 8) & 3) << 6)
        | (((hspw >> 8) & 3) << 4)
        | (((vso >> 4) & 3) << 2)
        | ((vspw >> 4) & 3)) as u8;

    d[17] = 0x18;
    if mode.flags.contains(ModeFlags::PHSYNC) {
        d[17] |= 0x02;
    }
    if mode.flags.contains(ModeFlags::PVSYNC) {
        d[17] |= 0x04;
    }
    d
}

fn text_descriptor(tag: u8, text: &str) -> [u8; 18] {
    assert!(text.len() <= 13);

    let mut d = [0u8; 18];
    d[3] = tag;
    d[5..].fill(b' ');
    d[5..5 + text.len()].copy_from_slice(text.as_bytes());
    if text.len() < 13 {
        d[5 + text.len()] = b'\n';
    }
    d
}

fn standard_timing(width: u16, height: u16, refresh: u8) -> [u8; 2] {
    let aspect = if width * 10 == height * 16 {
        0
    } else if width * 3 == height * 4 {
        1
    } else if width * 4 == height * 5 {
        2
    } else if width * 9 == height * 16 {
        3
    } else {
        panic!("no standard aspect for {width}x{height}");
    };

    [(width / 8 - 31) as u8, (aspect << 6) | (refresh - 60)]
}

/// Builds a valid 128-byte EDID base block.
pub fn edid_base_block(template: &EdidTemplate) -> Vec<u8> {
    let mut block = vec![0u8; EDID_BLOCK_LEN];
    block[..8].copy_from_slice(&EDID_HEADER);

    let m = template.manufacturer.as_bytes();
    let pnp = (u16::from(m[0] - b'A' + 1) << 10)
        | (u16::from(m[1] - b'A' + 1) << 5)
        | u16::from(m[2] - b'A' + 1);
    block[8..10].copy_from_slice(&pnp.to_be_bytes());
    block[10..12].copy_from_slice(&template.product.to_le_bytes());
    block[12..16].copy_from_slice(&template.serial_number.to_le_bytes());
    block[16] = 1;
    block[17] = 33;
    block[18] = 1;
    block[19] = template.revision;
    block[20] = 0x80;
    block[24] = if template.preferred_feature { 0x02 } else { 0 };
    block[35..38].copy_from_slice(&template.established);

    for i in 0..8 {
        let bytes = match template.standard.get(i) {
            Some(&(w, h, r)) => standard_timing(w, h, r),
            None => [0x01, 0x01],
        };
        block[38 + i * 2..40 + i * 2].copy_from_slice(&bytes);
    }

    let mut descriptors: Vec<[u8; 18]> =
        template.detailed.iter().map(encode_detailed_timing).collect();
    if let Some(name) = template.name {
        descriptors.push(text_descriptor(0xFC, name));
    }
    if let Some(serial) = template.serial_text {
        descriptors.push(text_descriptor(0xFF, serial));
    }
    assert!(descriptors.len() <= 4, "too many descriptors");
    while descriptors.len() < 4 {
        let mut dummy = [0u8; 18];
        dummy[3] = 0x10;
        descriptors.push(dummy);
    }
    for (i, d) in descriptors.iter().enumerate() {
        block[54 + i * 18..72 + i * 18].copy_from_slice(d);
    }

    block[126] = template.extensions;
    checksum(&mut block);
    block
}

/// Builds a CEA-861 extension block with one video data block and detailed timings.
pub fn cea_extension(svds: &[u8], detailed: &[TimingMode]) -> Vec<u8> {
    let mut block = vec![0u8; EDID_BLOCK_LEN];
    block[0] = 0x02;
    block[1] = 0x03;

    let mut pos = 4;
    if !svds.is_empty() {
        block[pos] = (2 << 5) | svds.len() as u8;
        block[pos + 1..pos + 1 + svds.len()].copy_from_slice(svds);
        pos += 1 + svds.len();
    }
    block[2] = pos as u8;

    for mode in detailed {
        block[pos..pos + 18].copy_from_slice(&encode_detailed_timing(mode));
        pos += 18;
    }
    assert!(pos < EDID_BLOCK_LEN);

    checksum(&mut block);
    block
}
