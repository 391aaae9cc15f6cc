#![allow(dead_code)]

use same5x_can::embedded_can::{Frame as _, Id};
use same5x_can::message_ram::MessageRam;
use same5x_can::pac::Registers;
use same5x_can::pac::message_ram::{FilterConfiguration, FilterType};
use same5x_can::pac::registers::{
    Cccr, Gfc, Ie, Ile, Ir, Rxf0c, Rxf0s, Sidfc, Test, Xidfc, offsets,
};
use same5x_can::{Can, CanConfig, Frame, Instance, Platform, PoweredDownMode, RunningMode, State};
use std::collections::HashMap;
use std::sync::Mutex;

pub const ENDN_VALUE: u32 = 0x8765_4321;
/// Core release 3.2.1, 2018-02-14
pub const CREL_VALUE: u32 = 0x3210_0214;

pub const TX_PIN: u8 = 22;
pub const RX_PIN: u8 = 23;

/// Registers that only take writes while CCCR.INIT and CCCR.CCE are set.
const PROTECTED: [usize; 9] = [
    offsets::NBTP,
    offsets::TEST,
    offsets::GFC,
    offsets::SIDFC,
    offsets::XIDFC,
    offsets::RXF0C,
    offsets::RXESC,
    offsets::TXBC,
    offsets::TXESC,
];

const READ_ONLY: [usize; 7] = [
    offsets::CREL,
    offsets::ENDN,
    offsets::PSR,
    offsets::ECR,
    offsets::RXF0S,
    offsets::TXBRP,
    offsets::TXBTO,
];

/// CCCR bits other than INIT, CCE, CSA and CSR.
const CCCR_PROTECTED_MASK: u32 = 0xFFFF & !0b1_1011;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Acceptance {
    Fifo0(Option<u8>),
    Fifo1,
    Reject,
}

struct Inner {
    regs: HashMap<usize, u32>,
    rx_get: u8,
    rx_fill: u8,
    init_responds: bool,
    init_release_responds: bool,
    clock_stop_responds: bool,
    tx_completes: bool,
    reads: usize,
    txbto_reads: u32,
    writes: Vec<(usize, u32)>,
    protected_violations: Vec<usize>,
    transmitted: Vec<Frame>,
    fifo1_frames: usize,
    lost_frames: usize,
}

/// Register level model of one M_CAN instance working on a [`MessageRam`].
///
/// Handshakes answer immediately unless switched off. Transmission completes on the TXBAR write
/// and, with TEST.LBCK active, the frame goes through the acceptance filters into Rx FIFO 0.
pub struct SimCan {
    ram: &'static MessageRam,
    inner: Mutex<Inner>,
}

impl SimCan {
    pub fn new(ram: &'static MessageRam) -> Self {
        let mut regs = HashMap::new();
        regs.insert(offsets::CREL, CREL_VALUE);
        regs.insert(offsets::ENDN, ENDN_VALUE);
        let cccr = Cccr::new().with_init(true);
        regs.insert(offsets::CCCR, cccr.into_bits());
        Self {
            ram,
            inner: Mutex::new(Inner {
                regs,
                rx_get: 0,
                rx_fill: 0,
                init_responds: true,
                init_release_responds: true,
                clock_stop_responds: true,
                tx_completes: true,
                reads: 0,
                txbto_reads: 0,
                writes: Vec::new(),
                protected_violations: Vec::new(),
                transmitted: Vec::new(),
                fifo1_frames: 0,
                lost_frames: 0,
            }),
        }
    }

    pub fn set_init_responds(&self, responds: bool) {
        self.inner.lock().unwrap().init_responds = responds;
    }

    /// Whether clearing INIT is taken up. Setting it still follows [`SimCan::set_init_responds`].
    pub fn set_init_release_responds(&self, responds: bool) {
        self.inner.lock().unwrap().init_release_responds = responds;
    }

    pub fn set_clock_stop_responds(&self, responds: bool) {
        self.inner.lock().unwrap().clock_stop_responds = responds;
    }

    pub fn set_tx_completes(&self, completes: bool) {
        self.inner.lock().unwrap().tx_completes = completes;
    }

    /// Overrides a register value, bypassing all write semantics.
    pub fn set_reg(&self, offset: usize, value: u32) {
        self.inner.lock().unwrap().regs.insert(offset, value);
    }

    /// Register value without side effects.
    pub fn reg(&self, offset: usize) -> u32 {
        self.inner.lock().unwrap().get(offset)
    }

    pub fn cccr(&self) -> Cccr {
        Cccr::from_bits(self.reg(offsets::CCCR))
    }

    pub fn test_reg(&self) -> Test {
        Test::from_bits(self.reg(offsets::TEST))
    }

    pub fn ie(&self) -> Ie {
        Ie::from_bits(self.reg(offsets::IE))
    }

    pub fn ir(&self) -> Ir {
        Ir::from_bits(self.reg(offsets::IR))
    }

    /// Whether interrupt line 0 is asserted.
    pub fn interrupt_pending(&self) -> bool {
        let ile = Ile::from_bits(self.reg(offsets::ILE));
        ile.eint0() && self.reg(offsets::IR) & self.reg(offsets::IE) != 0
    }

    pub fn accesses(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.reads + inner.writes.len()
    }

    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Offsets written, in order.
    pub fn written_offsets(&self) -> Vec<usize> {
        self.writes()
            .into_iter()
            .map(|(offset, _)| offset)
            .collect()
    }

    pub fn clear_log(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.writes.clear();
        inner.reads = 0;
        inner.txbto_reads = 0;
    }

    pub fn txbto_reads(&self) -> u32 {
        self.inner.lock().unwrap().txbto_reads
    }

    pub fn protected_violations(&self) -> Vec<usize> {
        self.inner.lock().unwrap().protected_violations.clone()
    }

    pub fn transmitted(&self) -> Vec<Frame> {
        self.inner.lock().unwrap().transmitted.clone()
    }

    pub fn rx_fill(&self) -> u8 {
        self.inner.lock().unwrap().rx_fill
    }

    pub fn fifo1_frames(&self) -> usize {
        self.inner.lock().unwrap().fifo1_frames
    }

    pub fn lost_frames(&self) -> usize {
        self.inner.lock().unwrap().lost_frames
    }

    /// A frame sent by another node. Returns whether it was stored in Rx FIFO 0.
    pub fn inject(&self, frame: &Frame) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.cccr().init() {
            return false;
        }
        inner.deliver(self.ram, frame)
    }
}

impl Inner {
    fn get(&self, offset: usize) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn set(&mut self, offset: usize, value: u32) {
        self.regs.insert(offset, value);
    }

    fn cccr(&self) -> Cccr {
        Cccr::from_bits(self.get(offsets::CCCR))
    }

    fn fifo_len(&self) -> u8 {
        Rxf0c::from_bits(self.get(offsets::RXF0C)).f0s()
    }

    fn rxf0s(&self) -> Rxf0s {
        let len = self.fifo_len().max(1);
        Rxf0s::new()
            .with_f0fl(self.rx_fill)
            .with_f0gi(self.rx_get)
            .with_f0pi((self.rx_get + self.rx_fill) % len)
            .with_f0f(self.rx_fill >= self.fifo_len() && self.fifo_len() > 0)
    }

    fn write_cccr(&mut self, new: Cccr) {
        let old = self.cccr();
        let mut next = old;

        if self.init_responds && (new.init() || self.init_release_responds) {
            next.set_init(new.init());
        }
        next.set_csr(new.csr());
        if new.csr() {
            if self.clock_stop_responds {
                next.set_init(true);
                next.set_csa(true);
            }
        } else {
            next.set_csa(false);
        }
        if next.init() {
            if old.init() {
                next.set_cce(new.cce());
            }
        } else {
            next.set_cce(false);
        }

        let protected_new = new.into_bits() & CCCR_PROTECTED_MASK;
        let protected_old = old.into_bits() & CCCR_PROTECTED_MASK;
        if protected_new != protected_old {
            if old.init() && old.cce() {
                next = Cccr::from_bits((next.into_bits() & !CCCR_PROTECTED_MASK) | protected_new);
            } else {
                self.protected_violations.push(offsets::CCCR);
            }
        }

        // Leaving test mode resets the TEST register
        if old.test() && !next.test() {
            self.set(offsets::TEST, 0);
        }
        self.set(offsets::CCCR, next.into_bits());
    }

    fn write_protected(&mut self, offset: usize, value: u32) {
        let cccr = self.cccr();
        let unlocked = cccr.init() && cccr.cce() && (offset != offsets::TEST || cccr.test());
        if unlocked {
            self.set(offset, value);
        } else {
            self.protected_violations.push(offset);
        }
    }

    fn acknowledge(&mut self, index: u8) {
        let len = self.fifo_len();
        if self.rx_fill > 0 && index == self.rx_get {
            self.rx_get = (self.rx_get + 1) % len;
            self.rx_fill -= 1;
        }
    }

    fn request_transmission(&mut self, ram: &MessageRam, request: u32) {
        if request & 1 == 0 {
            return;
        }
        self.set(offsets::TXBTO, self.get(offsets::TXBTO) & !1);
        self.set(offsets::TXBRP, self.get(offsets::TXBRP) | 1);

        let cccr = self.cccr();
        let test = Test::from_bits(self.get(offsets::TEST));
        let loopback = cccr.test() && test.lbck();
        if !self.tx_completes || cccr.init() || (cccr.mon() && !loopback) {
            return;
        }

        let frame = ram.tx_buffers[0].load();
        self.set(offsets::TXBRP, self.get(offsets::TXBRP) & !1);
        self.set(offsets::TXBTO, self.get(offsets::TXBTO) | 1);
        let ir = Ir::from_bits(self.get(offsets::IR)).with_tc(true);
        self.set(offsets::IR, ir.into_bits());
        self.transmitted.push(frame);
        if loopback {
            self.deliver(ram, &frame);
        }
    }

    fn deliver(&mut self, ram: &MessageRam, frame: &Frame) -> bool {
        match self.accept(ram, frame) {
            Acceptance::Fifo0(filter_index) => self.push_fifo0(ram, frame, filter_index),
            Acceptance::Fifo1 => {
                self.fifo1_frames += 1;
                false
            }
            Acceptance::Reject => false,
        }
    }

    fn accept(&self, ram: &MessageRam, frame: &Frame) -> Acceptance {
        let gfc = Gfc::from_bits(self.get(offsets::GFC));
        let (reject_remote, non_matching) = if frame.is_extended() {
            (gfc.rrfe(), gfc.anfe())
        } else {
            (gfc.rrfs(), gfc.anfs())
        };
        if frame.is_remote_frame() && reject_remote {
            return Acceptance::Reject;
        }

        match frame.id() {
            Id::Standard(id) => {
                let count = usize::from(Sidfc::from_bits(self.get(offsets::SIDFC)).lss());
                for (i, filter) in ram.standard_filters.iter().take(count).enumerate() {
                    let s0 = filter.s0.get();
                    if s0.sft() != FilterType::Classic
                        || s0.sfec() == FilterConfiguration::Disable
                    {
                        continue;
                    }
                    if id.as_raw() & s0.sfid2() == s0.sfid1() & s0.sfid2() {
                        return action(s0.sfec(), i);
                    }
                }
            }
            Id::Extended(id) => {
                let count = usize::from(Xidfc::from_bits(self.get(offsets::XIDFC)).lse());
                for (i, filter) in ram.extended_filters.iter().take(count).enumerate() {
                    let (f0, f1) = (filter.f0.get(), filter.f1.get());
                    if f1.eft() != FilterType::Classic
                        || f0.efec() == FilterConfiguration::Disable
                    {
                        continue;
                    }
                    if id.as_raw() & f1.efid2() == f0.efid1() & f1.efid2() {
                        return action(f0.efec(), i);
                    }
                }
            }
        }

        match non_matching {
            0b00 => Acceptance::Fifo0(None),
            0b01 => Acceptance::Fifo1,
            _ => Acceptance::Reject,
        }
    }

    fn push_fifo0(&mut self, ram: &MessageRam, frame: &Frame, filter_index: Option<u8>) -> bool {
        let len = self.fifo_len();
        if len == 0 {
            return false;
        }
        if self.rx_fill >= len {
            self.lost_frames += 1;
            let ir = Ir::from_bits(self.get(offsets::IR)).with_rf0l(true);
            self.set(offsets::IR, ir.into_bits());
            return false;
        }
        let put = (self.rx_get + self.rx_fill) % len;
        ram.rx_fifo0[usize::from(put)].store(frame, filter_index);
        self.rx_fill += 1;
        let ir = Ir::from_bits(self.get(offsets::IR)).with_rf0n(true);
        self.set(offsets::IR, ir.into_bits());
        true
    }
}

fn action(config: FilterConfiguration, index: usize) -> Acceptance {
    match config {
        FilterConfiguration::StoreInFifo0 | FilterConfiguration::SetPriorityAndStoreInFifo0 => {
            Acceptance::Fifo0(Some(index as u8))
        }
        FilterConfiguration::StoreInFifo1 | FilterConfiguration::SetPriorityAndStoreInFifo1 => {
            Acceptance::Fifo1
        }
        _ => Acceptance::Reject,
    }
}

impl Registers for SimCan {
    fn read(&self, offset: usize) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        inner.reads += 1;
        match offset {
            offsets::RXF0S => inner.rxf0s().into_bits(),
            offsets::TXBTO => {
                inner.txbto_reads += 1;
                inner.get(offset)
            }
            _ => inner.get(offset),
        }
    }

    fn write(&self, offset: usize, value: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.writes.push((offset, value));
        match offset {
            offsets::CCCR => inner.write_cccr(Cccr::from_bits(value)),
            // Write 1 to clear
            offsets::IR => {
                let ir = inner.get(offsets::IR) & !value;
                inner.set(offsets::IR, ir);
            }
            offsets::RXF0A => inner.acknowledge((value & 0x3F) as u8),
            offsets::TXBAR => inner.request_transmission(self.ram, value),
            o if READ_ONLY.contains(&o) => {}
            o if PROTECTED.contains(&o) => inner.write_protected(o, value),
            o => inner.set(o, value),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlatformEvent {
    Connect(Instance, u8, u8),
    Release(u8, u8),
    Clock(Instance, bool),
}

/// Records the pin and clock calls the driver makes.
#[derive(Default)]
pub struct RecordingPlatform {
    pub events: Vec<PlatformEvent>,
}

impl RecordingPlatform {
    pub fn clock_enabled(&self) -> bool {
        self.events
            .iter()
            .rev()
            .find_map(|event| match event {
                PlatformEvent::Clock(_, enabled) => Some(*enabled),
                _ => None,
            })
            .unwrap_or(false)
    }
}

impl Platform for RecordingPlatform {
    type Pin = u8;

    fn connect_pins(&mut self, instance: Instance, tx: u8, rx: u8) {
        self.events.push(PlatformEvent::Connect(instance, tx, rx));
    }

    fn release_pins(&mut self, tx: u8, rx: u8) {
        self.events.push(PlatformEvent::Release(tx, rx));
    }

    fn set_clock(&mut self, instance: Instance, enabled: bool) {
        self.events.push(PlatformEvent::Clock(instance, enabled));
    }
}

pub type SimDriver<M> = Can<&'static SimCan, RecordingPlatform, M>;

/// Short handshake and poll budgets so failure paths finish quickly.
pub fn test_config() -> CanConfig {
    CanConfig::new()
        .set_timeout_iterations(100, 200)
        .set_tx_poll_iterations(50)
}

/// A simulated peripheral and a powered down driver with pins assigned.
pub fn setup(instance: Instance) -> (&'static SimCan, SimDriver<PoweredDownMode>) {
    let ram: &'static MessageRam = Box::leak(Box::new(MessageRam::new()));
    let sim: &'static SimCan = Box::leak(Box::new(SimCan::new(ram)));
    let state: &'static State<&'static SimCan> = Box::leak(Box::new(State::new(sim, ram)));
    let mut can = Can::new(instance, state, RecordingPlatform::default());
    can.set_pins(TX_PIN, RX_PIN);
    can.set_config(test_config());
    (sim, can)
}

/// Like [`setup`], brought up at 500 kbit/s.
pub fn running(instance: Instance) -> (&'static SimCan, SimDriver<RunningMode>) {
    let (sim, can) = setup(instance);
    let can = match can.begin(500_000) {
        Ok(can) => can,
        Err((e, _)) => panic!("begin failed: {e:?}"),
    };
    (sim, can)
}

/// Running in internal loopback, so every transmitted frame is received back.
pub fn looped_back(instance: Instance) -> (&'static SimCan, SimDriver<RunningMode>) {
    let (sim, mut can) = running(instance);
    can.internal_loopback().unwrap();
    (sim, can)
}
