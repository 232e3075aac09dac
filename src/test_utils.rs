//! Instrumented stand-ins for the bus, the bus layer and the control surface.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::{
    bus::{BusLayer, ClientInfo, ControlSurface},
    drivers::lm83::{
        channel::ChannelAccessor,
        device_io::{BusAdapter, RegisterIo},
        registers::{Channel, REG_R_MAN_ID},
    },
    error::{BusError, RegistryError, SurfaceError},
    registry::ClientId,
};

#[derive(Debug, Default)]
struct ChipState {
    registers: HashMap<u8, u8>,
    reads: Vec<u8>,
    writes: Vec<(u8, u8)>,
    failing_reads: HashSet<u8>,
    fail_writes: bool,
    read_delay: Duration,
}

/// Register file of a simulated device. Clones share the same state, so a
/// test keeps one clone to inspect what the driver did with the other.
#[derive(Debug, Clone)]
pub struct FakeChip {
    addr: u16,
    state: Arc<Mutex<ChipState>>,
}

impl FakeChip {
    /// A blank device that identifies as a National LM83.
    pub fn lm83(addr: u16) -> Self {
        let chip = Self::blank(addr);
        chip.set_register(REG_R_MAN_ID, 0x01);
        chip
    }

    pub fn blank(addr: u16) -> Self {
        Self {
            addr,
            state: Arc::new(Mutex::new(ChipState::default())),
        }
    }

    pub fn set_register(&self, reg: u8, value: u8) {
        self.state.lock().unwrap().registers.insert(reg, value);
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.state
            .lock()
            .unwrap()
            .registers
            .get(&reg)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_temp(&self, channel: Channel, raw: u8) {
        self.set_register(channel.temp_reg(), raw);
    }

    /// Number of temperature register reads seen so far.
    pub fn temp_reads(&self) -> usize {
        let temp_regs: Vec<u8> = Channel::ALL.iter().map(|c| c.temp_reg()).collect();
        self.state
            .lock()
            .unwrap()
            .reads
            .iter()
            .filter(|r| temp_regs.contains(r))
            .count()
    }

    pub fn reads(&self) -> Vec<u8> {
        self.state.lock().unwrap().reads.clone()
    }

    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn fail_reads_of(&self, reg: u8) {
        self.state.lock().unwrap().failing_reads.insert(reg);
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing_reads.clear();
        state.fail_writes = false;
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().unwrap().read_delay = delay;
    }
}

impl RegisterIo for FakeChip {
    fn address(&self) -> u16 {
        self.addr
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, BusError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.reads.push(reg);
            if state.failing_reads.contains(&reg) {
                return Err(BusError::Read {
                    addr: self.addr,
                    reg,
                    reason: "simulated nack".into(),
                });
            }
            state.read_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(self.register(reg))
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(BusError::Write {
                addr: self.addr,
                reg,
                value,
                reason: "simulated nack".into(),
            });
        }
        state.writes.push((reg, value));
        state.registers.insert(reg, value);
        Ok(())
    }
}

/// Adapter whose devices are `FakeChip`s keyed by address.
#[derive(Debug, Default)]
pub struct FakeAdapter {
    chips: HashMap<u16, FakeChip>,
    opened: Mutex<Vec<u16>>,
}

impl FakeAdapter {
    pub fn with_chip(mut self, chip: FakeChip) -> Self {
        self.chips.insert(chip.addr, chip);
        self
    }

    /// Addresses for which a handle was requested, in order.
    pub fn opened(&self) -> Vec<u16> {
        self.opened.lock().unwrap().clone()
    }
}

impl BusAdapter for FakeAdapter {
    type Io = FakeChip;

    fn name(&self) -> String {
        "fake-0".to_string()
    }

    fn open(&self, addr: u16) -> Result<FakeChip, BusError> {
        self.opened.lock().unwrap().push(addr);
        Ok(self
            .chips
            .get(&addr)
            .cloned()
            .unwrap_or_else(|| FakeChip::blank(addr)))
    }
}

/// One lifecycle call recorded by the stand-ins below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Attach(ClientId),
    Detach(ClientId),
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn stamp(journal: &Mutex<Vec<(u64, Step)>>, step: Step) {
    journal
        .lock()
        .unwrap()
        .push((SEQUENCE.fetch_add(1, Ordering::SeqCst), step));
}

/// Bus layer that records calls and can be told to refuse them.
#[derive(Debug, Default)]
pub struct RecordingBus {
    next_id: AtomicU32,
    journal: Mutex<Vec<(u64, Step)>>,
    attached: Mutex<Vec<ClientId>>,
    refuse_attach: Mutex<Option<RegistryError>>,
    refuse_detach: Mutex<Option<RegistryError>>,
}

impl RecordingBus {
    pub fn refuse_attach(&self, err: RegistryError) {
        *self.refuse_attach.lock().unwrap() = Some(err);
    }

    pub fn refuse_detach(&self, err: RegistryError) {
        *self.refuse_detach.lock().unwrap() = Some(err);
    }

    pub fn steps(&self) -> Vec<Step> {
        self.journal.lock().unwrap().iter().map(|(_, s)| *s).collect()
    }

    pub fn attached(&self) -> Vec<ClientId> {
        self.attached.lock().unwrap().clone()
    }
}

impl BusLayer for RecordingBus {
    fn attach_client(&self, _info: ClientInfo) -> Result<ClientId, RegistryError> {
        if let Some(err) = self.refuse_attach.lock().unwrap().clone() {
            return Err(err);
        }
        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        stamp(&self.journal, Step::Attach(id));
        self.attached.lock().unwrap().push(id);
        Ok(id)
    }

    fn detach_client(&self, id: ClientId) -> Result<(), RegistryError> {
        if let Some(err) = self.refuse_detach.lock().unwrap().clone() {
            return Err(err);
        }
        stamp(&self.journal, Step::Detach(id));
        self.attached.lock().unwrap().retain(|c| *c != id);
        Ok(())
    }
}

/// Control surface that records calls and keeps the exported accessors.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    journal: Mutex<Vec<(u64, Step)>>,
    exported: Mutex<Vec<(ClientId, Vec<ChannelAccessor>)>>,
    refuse_register: Mutex<Option<SurfaceError>>,
    refuse_unregister: Mutex<Option<SurfaceError>>,
}

impl RecordingSurface {
    pub fn refuse_register(&self, err: SurfaceError) {
        *self.refuse_register.lock().unwrap() = Some(err);
    }

    pub fn refuse_unregister(&self, err: SurfaceError) {
        *self.refuse_unregister.lock().unwrap() = Some(err);
    }

    pub fn steps(&self) -> Vec<Step> {
        self.journal.lock().unwrap().iter().map(|(_, s)| *s).collect()
    }

    pub fn exported(&self) -> Vec<ClientId> {
        self.exported.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    pub fn channels_of(&self, id: ClientId) -> Vec<ChannelAccessor> {
        self.exported
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| *c == id)
            .map(|(_, channels)| channels.clone())
            .unwrap_or_default()
    }
}

impl ControlSurface for RecordingSurface {
    fn register(
        &self,
        id: ClientId,
        _type_name: &str,
        channels: &[ChannelAccessor],
    ) -> Result<(), SurfaceError> {
        if let Some(err) = self.refuse_register.lock().unwrap().clone() {
            return Err(err);
        }
        stamp(&self.journal, Step::Attach(id));
        self.exported.lock().unwrap().push((id, channels.to_vec()));
        Ok(())
    }

    fn unregister(&self, id: ClientId) -> Result<(), SurfaceError> {
        if let Some(err) = self.refuse_unregister.lock().unwrap().clone() {
            return Err(err);
        }
        stamp(&self.journal, Step::Detach(id));
        self.exported.lock().unwrap().retain(|(c, _)| *c != id);
        Ok(())
    }
}

/// Interleaves the journals of a bus and a surface in call order.
pub fn merged_steps(bus: &RecordingBus, surface: &RecordingSurface) -> Vec<(&'static str, Step)> {
    let mut all: Vec<(u64, &'static str, Step)> = bus
        .journal
        .lock()
        .unwrap()
        .iter()
        .map(|(seq, s)| (*seq, "bus", *s))
        .chain(
            surface
                .journal
                .lock()
                .unwrap()
                .iter()
                .map(|(seq, s)| (*seq, "surface", *s)),
        )
        .collect();
    all.sort_by_key(|(seq, _, _)| *seq);
    all.into_iter().map(|(_, who, s)| (who, s)).collect()
}
