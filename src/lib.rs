//! Classic CAN driver for the M_CAN peripheral of SAM D5x/E5x microcontrollers.

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "asynchronous")]
pub mod asynchronous;
pub mod can;
pub mod config;
pub mod frame;
pub mod interrupt;
pub mod message_ram;
pub mod pac;
pub mod tx_rx;
mod util;

pub use can::{Can, OperatingMode, Pins, Platform, PoweredDownMode, RunningMode, SleepMode};
pub use config::{CanConfig, GlobalFilter, NominalBitTiming, NonMatchingFilter};
pub use embedded_can;
pub use frame::{Frame, RxPacket, TxPacket};
pub use interrupt::{InterruptHandler, ReceiveCallback, State, is_registered, on_interrupt};
pub use message_ram::{MessageRam, MessageRamLayout};
pub use pac::{Mmio, Registers};

#[doc(hidden)]
pub use static_cell;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// TX or RX pin was never assigned
    PinsNotAssigned,
    /// No prescaler divisor between 1 and 32 reaches the requested bit rate
    BitRateUnreachable,
    /// ENDN did not read back the endianness test value
    CoreCommunicationFailed,
    /// CREL reports a core release other than 3.x
    UnsupportedCoreVersion,
    /// The core did not acknowledge an INIT or clock stop request in time
    Timeout,
    /// Transmission occurred was not reported within the poll budget
    TransmitTimeout,
    /// `end_packet` without a preceding `begin_packet`
    PacketNotBegun,
    /// DLC above 8
    InvalidDlc,
    /// Filter identifier or mask wider than the identifier format
    InvalidFilter,
}

/// M_CAN peripheral instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instance {
    Can0,
    Can1,
}

impl Instance {
    pub const COUNT: usize = 2;

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Allocates the driver state of one instance in a `static` and returns a `&'static` to it.
///
/// Each expansion owns its own storage, so invoking the same expansion twice panics.
///
/// ```ignore
/// #[unsafe(link_section = ".can")]
/// static CAN_RAM: MessageRam = MessageRam::new();
///
/// let state = can_state!(Mmio, unsafe { Mmio::can1() }, &CAN_RAM);
/// ```
#[macro_export]
macro_rules! can_state {
    ($bus_ty:ty, $bus:expr, $ram:expr) => {{
        static STATE: $crate::static_cell::StaticCell<$crate::State<$bus_ty>> =
            $crate::static_cell::StaticCell::new();
        &*STATE.init($crate::State::new($bus, $ram))
    }};
}
