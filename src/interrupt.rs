//! Receive state shared with the interrupt handler, and the instance registry the CAN0/CAN1
//! vectors dispatch through.

use crate::Instance;
use crate::frame::RxPacket;
use crate::message_ram::MessageRam;
use crate::pac::Registers;
use crate::pac::registers::Mcan;
use crate::util::memory_barrier;
use core::cell::{Cell, RefCell};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
#[cfg(feature = "asynchronous")]
use embassy_sync::waitqueue::AtomicWaker;

/// Called once per drained frame from interrupt context, with the number of unread payload
/// bytes and the frame itself.
pub type ReceiveCallback = fn(available: usize, packet: &mut RxPacket);

/// Per-instance state: the register block, the message RAM and everything the interrupt
/// handler touches.
///
/// Create it once with [`can_state!`](crate::can_state).
pub struct State<B> {
    pub(crate) regs: Mcan<B>,
    pub(crate) ram: &'static MessageRam,
    rx: Mutex<CriticalSectionRawMutex, RefCell<RxPacket>>,
    callback: Mutex<CriticalSectionRawMutex, Cell<Option<ReceiveCallback>>>,
    #[cfg(feature = "asynchronous")]
    pub(crate) rx_waker: AtomicWaker,
}

impl<B> State<B> {
    pub const fn new(bus: B, ram: &'static MessageRam) -> Self {
        Self {
            regs: Mcan::new(bus),
            ram,
            rx: Mutex::new(RefCell::new(RxPacket::new())),
            callback: Mutex::new(Cell::new(None)),
            #[cfg(feature = "asynchronous")]
            rx_waker: AtomicWaker::new(),
        }
    }

    #[inline]
    pub fn registers(&self) -> &Mcan<B> {
        &self.regs
    }

    #[inline]
    pub fn message_ram(&self) -> &'static MessageRam {
        self.ram
    }

    #[inline]
    pub fn callback(&self) -> Option<ReceiveCallback> {
        self.callback.lock(|cb| cb.get())
    }

    #[inline]
    pub(crate) fn set_callback(&self, callback: Option<ReceiveCallback>) {
        self.callback.lock(|cb| cb.set(callback));
    }

    /// Runs `f` on the receive staging buffer inside a critical section.
    pub fn with_rx<R>(&self, f: impl FnOnce(&mut RxPacket) -> R) -> R {
        self.rx.lock(|rx| f(&mut rx.borrow_mut()))
    }

    pub(crate) fn reset_rx(&self) {
        self.with_rx(|rx| *rx = RxPacket::new());
    }
}

impl<B: Registers> State<B> {
    /// Number of frames waiting in Rx FIFO 0.
    #[inline]
    pub fn rx_fill_level(&self) -> u8 {
        self.regs.rxf0s().read().f0fl()
    }

    /// Moves the oldest frame of Rx FIFO 0 into the staging buffer and frees its slot.
    ///
    /// Returns the frame's DLC, or `None` when the FIFO is empty. A zero-length frame yields
    /// `Some(0)`.
    pub fn parse_packet(&self) -> Option<u8> {
        self.rx.lock(|rx| {
            let status = self.regs.rxf0s().read();
            if status.f0fl() == 0 {
                return None;
            }
            let index = status.f0gi();
            let Some(element) = self.ram.rx_fifo0.get(usize::from(index)) else {
                #[cfg(feature = "defmt")]
                defmt::warn!("rx fifo get index {} out of range", index);
                return None;
            };
            memory_barrier();
            let frame = element.load();
            rx.borrow_mut().load(frame);
            memory_barrier();
            self.regs.rxf0a().write(|w| w.set_f0ai(index));
            Some(frame.raw_dlc())
        })
    }

    /// Services the interrupt line: drains Rx FIFO 0 into the receive callback on a new
    /// message, then clears the flags that were observed.
    pub fn handle_interrupt(&self) {
        let ir = self.regs.ir().read();
        #[cfg(feature = "defmt")]
        defmt::trace!("ir: {:?}", ir);

        if ir.rf0n() {
            #[cfg(feature = "asynchronous")]
            self.rx_waker.wake();

            if let Some(callback) = self.callback() {
                while self.parse_packet().is_some() {
                    self.with_rx(|rx| callback(rx.available(), rx));
                }
            }
        }

        self.regs.ir().write_value(ir);
    }
}

/// Something the CAN vector can be routed to.
pub trait InterruptHandler: Sync {
    fn on_interrupt(&self);
}

impl<B: Registers + Sync> InterruptHandler for State<B> {
    fn on_interrupt(&self) {
        self.handle_interrupt();
    }
}

type Slot = Mutex<CriticalSectionRawMutex, Cell<Option<&'static dyn InterruptHandler>>>;

static REGISTRY: [Slot; Instance::COUNT] = [const { Mutex::new(Cell::new(None)) }; Instance::COUNT];

/// Makes `handler` the owner of `instance`, replacing any previous owner.
pub(crate) fn register(instance: Instance, handler: &'static dyn InterruptHandler) {
    REGISTRY[instance.index()].lock(|slot| slot.set(Some(handler)));
}

/// Clears the slot, but only while `handler` still owns it.
pub(crate) fn unregister(instance: Instance, handler: &'static dyn InterruptHandler) {
    REGISTRY[instance.index()].lock(|slot| {
        if slot
            .get()
            .is_some_and(|current| core::ptr::addr_eq(current, handler))
        {
            slot.set(None);
        }
    });
}

/// Whether a driver instance currently owns `instance`.
pub fn is_registered(instance: Instance) -> bool {
    REGISTRY[instance.index()].lock(|slot| slot.get().is_some())
}

/// Call from the CAN0 / CAN1 interrupt vector.
///
/// ```ignore
/// #[interrupt]
/// fn CAN1() {
///     same5x_can::on_interrupt(Instance::Can1);
/// }
/// ```
pub fn on_interrupt(instance: Instance) {
    critical_section::with(|_| {
        let owner = REGISTRY[instance.index()].lock(|slot| slot.get());
        match owner {
            Some(handler) => handler.on_interrupt(),
            None => {
                #[cfg(feature = "defmt")]
                defmt::trace!("{} interrupt without a registered driver", instance);
            }
        }
    });
}
