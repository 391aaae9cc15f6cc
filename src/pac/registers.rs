//! M_CAN register definitions (SAM D5x/E5x, core release 3.2).

use crate::pac::Registers;
use crate::pac::common::Reg;
use bitfield_struct::bitfield;
use paste::paste;

/// Register block of one M_CAN instance on top of a [`Registers`] bank.
pub struct Mcan<B> {
    bus: B,
}

impl<B> Mcan<B> {
    #[inline]
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }

    #[inline]
    pub fn bus(&self) -> &B {
        &self.bus
    }
}

macro_rules! registers {
    ($($(#[$attr:meta])* $name:ident: $ty:ty = $offset:literal;)*) => {
        paste! {
            /// Byte offsets from the peripheral base address.
            pub mod offsets {
                $(pub const [<$name:upper>]: usize = $offset;)*
            }

            impl<B: Registers> Mcan<B> {
                $(
                    $(#[$attr])*
                    #[inline]
                    pub fn $name(&self) -> Reg<'_, B, $ty> {
                        Reg::new(&self.bus, offsets::[<$name:upper>])
                    }
                )*
            }
        }
    };
}

registers! {
    /// Core release
    crel: Crel = 0x00;
    /// Endian, reads 0x8765_4321
    endn: Endn = 0x04;
    /// Test
    test: Test = 0x10;
    /// CC control
    cccr: Cccr = 0x18;
    /// Nominal bit timing and prescaler
    nbtp: Nbtp = 0x1C;
    /// Error counter
    ecr: Ecr = 0x40;
    /// Protocol status
    psr: Psr = 0x44;
    /// Interrupt
    ir: Ir = 0x50;
    /// Interrupt enable
    ie: Ie = 0x54;
    /// Interrupt line enable
    ile: Ile = 0x5C;
    /// Global filter configuration
    gfc: Gfc = 0x80;
    /// Standard ID filter configuration
    sidfc: Sidfc = 0x84;
    /// Extended ID filter configuration
    xidfc: Xidfc = 0x88;
    /// Rx FIFO 0 configuration
    rxf0c: Rxf0c = 0xA0;
    /// Rx FIFO 0 status
    rxf0s: Rxf0s = 0xA4;
    /// Rx FIFO 0 acknowledge
    rxf0a: Rxf0a = 0xA8;
    /// Rx buffer / FIFO element size configuration
    rxesc: Rxesc = 0xBC;
    /// Tx buffer configuration
    txbc: Txbc = 0xC0;
    /// Tx buffer element size configuration
    txesc: Txesc = 0xC8;
    /// Tx buffer request pending
    txbrp: Txbrp = 0xCC;
    /// Tx buffer add request
    txbar: Txbar = 0xD0;
    /// Tx buffer transmission occurred
    txbto: Txbto = 0xD8;
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Crel {
    #[bits(8)]
    pub day: u8,
    #[bits(8)]
    pub mon: u8,
    #[bits(4)]
    pub year: u8,
    #[bits(4)]
    pub substep: u8,
    #[bits(4)]
    pub step: u8,
    #[bits(4)]
    pub rel: u8,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Endn {
    #[bits(32)]
    pub etv: u32,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Test {
    #[bits(4)]
    __reserved0: u8,
    /// Loop back mode enable
    pub lbck: bool,
    /// Control of transmit pin
    #[bits(2)]
    pub tx: u8,
    /// Receive pin, monitors the actual value of pin CANx_RX
    pub rx: bool,
    #[bits(24)]
    __reserved1: u32,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Cccr {
    /// Initialization
    pub init: bool,
    /// Configuration change enable, writable only while INIT is set
    pub cce: bool,
    /// Restricted operation mode
    pub asm: bool,
    /// Clock stop acknowledge
    pub csa: bool,
    /// Clock stop request
    pub csr: bool,
    /// Bus monitoring mode
    pub mon: bool,
    /// Disable automatic retransmission
    pub dar: bool,
    /// Test mode enable
    pub test: bool,
    /// FD operation enable
    pub fdoe: bool,
    /// Bit rate switch enable
    pub brse: bool,
    #[bits(2)]
    __reserved0: u8,
    /// Protocol exception handling disable
    pub pxhd: bool,
    /// Edge filtering during bus integration
    pub efbi: bool,
    /// Transmit pause
    pub txp: bool,
    /// Non ISO operation
    pub niso: bool,
    #[bits(16)]
    __reserved1: u16,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Nbtp {
    /// Time segment after sample point, minus one
    #[bits(7)]
    pub ntseg2: u8,
    __reserved: bool,
    /// Time segment before sample point, minus one
    #[bits(8)]
    pub ntseg1: u8,
    /// Baud rate prescaler, minus one
    #[bits(9)]
    pub nbrp: u16,
    /// Synchronization jump width, minus one
    #[bits(7)]
    pub nsjw: u8,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Ecr {
    /// Transmit error counter
    #[bits(8)]
    pub tec: u8,
    /// Receive error counter
    #[bits(7)]
    pub rec: u8,
    /// Receive error passive
    pub rp: bool,
    /// CAN error logging
    #[bits(8)]
    pub cel: u8,
    #[bits(8)]
    __reserved: u8,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Psr {
    /// Last error code
    #[bits(3)]
    pub lec: u8,
    /// Activity: 0 synchronizing, 1 idle, 2 receiver, 3 transmitter
    #[bits(2)]
    pub act: u8,
    /// Error passive
    pub ep: bool,
    /// Warning status
    pub ew: bool,
    /// Bus off status
    pub bo: bool,
    #[bits(3)]
    pub dlec: u8,
    pub resi: bool,
    pub rbrs: bool,
    pub rfdf: bool,
    /// Protocol exception event
    pub pxe: bool,
    __reserved0: bool,
    #[bits(7)]
    pub tdcv: u8,
    #[bits(9)]
    __reserved1: u16,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Ir {
    /// Rx FIFO 0 new message
    pub rf0n: bool,
    /// Rx FIFO 0 watermark reached
    pub rf0w: bool,
    /// Rx FIFO 0 full
    pub rf0f: bool,
    /// Rx FIFO 0 message lost
    pub rf0l: bool,
    pub rf1n: bool,
    pub rf1w: bool,
    pub rf1f: bool,
    pub rf1l: bool,
    /// High priority message
    pub hpm: bool,
    /// Transmission completed
    pub tc: bool,
    /// Transmission cancellation finished
    pub tcf: bool,
    /// Tx FIFO empty
    pub tfe: bool,
    pub tefn: bool,
    pub tefw: bool,
    pub teff: bool,
    pub tefl: bool,
    /// Timestamp wraparound
    pub tsw: bool,
    /// Message RAM access failure
    pub mraf: bool,
    /// Timeout occurred
    pub too: bool,
    /// Message stored to dedicated Rx buffer
    pub drx: bool,
    pub bec: bool,
    pub beu: bool,
    /// Error logging overflow
    pub elo: bool,
    /// Error passive
    pub ep: bool,
    /// Warning status
    pub ew: bool,
    /// Bus off status
    pub bo: bool,
    /// Watchdog interrupt
    pub wdi: bool,
    /// Protocol error in arbitration phase
    pub pea: bool,
    /// Protocol error in data phase
    pub ped: bool,
    /// Access to reserved address
    pub ara: bool,
    #[bits(2)]
    __reserved: u8,
}

/// Interrupt enable, one bit per [`Ir`] flag.
#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Ie {
    pub rf0ne: bool,
    pub rf0we: bool,
    pub rf0fe: bool,
    pub rf0le: bool,
    pub rf1ne: bool,
    pub rf1we: bool,
    pub rf1fe: bool,
    pub rf1le: bool,
    pub hpme: bool,
    pub tce: bool,
    pub tcfe: bool,
    pub tfee: bool,
    pub tefne: bool,
    pub tefwe: bool,
    pub teffe: bool,
    pub tefle: bool,
    pub tswe: bool,
    pub mrafe: bool,
    pub tooe: bool,
    pub drxe: bool,
    pub bece: bool,
    pub beue: bool,
    pub eloe: bool,
    pub epe: bool,
    pub ewe: bool,
    pub boe: bool,
    pub wdie: bool,
    pub peae: bool,
    pub pede: bool,
    pub arae: bool,
    #[bits(2)]
    __reserved: u8,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Ile {
    /// Enable interrupt line 0
    pub eint0: bool,
    /// Enable interrupt line 1
    pub eint1: bool,
    #[bits(30)]
    __reserved: u32,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Gfc {
    /// Reject remote frames extended
    pub rrfe: bool,
    /// Reject remote frames standard
    pub rrfs: bool,
    /// Accept non-matching frames extended
    #[bits(2)]
    pub anfe: u8,
    /// Accept non-matching frames standard
    #[bits(2)]
    pub anfs: u8,
    #[bits(26)]
    __reserved: u32,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Sidfc {
    /// Filter list standard start address
    #[bits(16)]
    pub flssa: u16,
    /// List size standard
    #[bits(8)]
    pub lss: u8,
    #[bits(8)]
    __reserved: u8,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Xidfc {
    /// Filter list extended start address
    #[bits(16)]
    pub flesa: u16,
    /// List size extended
    #[bits(7)]
    pub lse: u8,
    #[bits(9)]
    __reserved: u16,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Rxf0c {
    /// Rx FIFO 0 start address
    #[bits(16)]
    pub f0sa: u16,
    /// Rx FIFO 0 size
    #[bits(7)]
    pub f0s: u8,
    __reserved: bool,
    /// Rx FIFO 0 watermark
    #[bits(7)]
    pub f0wm: u8,
    /// FIFO 0 operation mode, overwrite instead of blocking
    pub f0om: bool,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Rxf0s {
    /// Rx FIFO 0 fill level
    #[bits(7)]
    pub f0fl: u8,
    __reserved0: bool,
    /// Rx FIFO 0 get index
    #[bits(6)]
    pub f0gi: u8,
    #[bits(2)]
    __reserved1: u8,
    /// Rx FIFO 0 put index
    #[bits(6)]
    pub f0pi: u8,
    #[bits(2)]
    __reserved2: u8,
    /// Rx FIFO 0 full
    pub f0f: bool,
    /// Rx FIFO 0 message lost
    pub rf0l: bool,
    #[bits(6)]
    __reserved3: u8,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Rxf0a {
    /// Rx FIFO 0 acknowledge index
    #[bits(6)]
    pub f0ai: u8,
    #[bits(26)]
    __reserved: u32,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Rxesc {
    /// Rx FIFO 0 data field size
    #[bits(3)]
    pub f0ds: u8,
    __reserved0: bool,
    /// Rx FIFO 1 data field size
    #[bits(3)]
    pub f1ds: u8,
    __reserved1: bool,
    /// Rx buffer data field size
    #[bits(3)]
    pub rbds: u8,
    #[bits(21)]
    __reserved2: u32,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Txbc {
    /// Tx buffers start address
    #[bits(16)]
    pub tbsa: u16,
    /// Number of dedicated transmit buffers
    #[bits(6)]
    pub ndtb: u8,
    #[bits(2)]
    __reserved0: u8,
    /// Transmit FIFO/queue size
    #[bits(6)]
    pub tfqs: u8,
    /// Tx FIFO/queue mode, queue when set
    pub tfqm: bool,
    __reserved1: bool,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Txesc {
    /// Tx buffer data field size
    #[bits(3)]
    pub tbds: u8,
    #[bits(29)]
    __reserved: u32,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Txbrp {
    /// One bit per Tx buffer with a pending transmission request
    #[bits(32)]
    pub trp: u32,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Txbar {
    /// Add request, one bit per Tx buffer
    #[bits(32)]
    pub ar: u32,
}

#[bitfield(u32, defmt = cfg(feature = "defmt"))]
#[derive(PartialEq, Eq)]
pub struct Txbto {
    /// Transmission occurred, one bit per Tx buffer
    #[bits(32)]
    pub to: u32,
}

/// Data field size code for 8 byte elements (TXESC.TBDS, RXESC.F0DS/F1DS/RBDS)
pub const DATA_FIELD_8_BYTES: u8 = 0b000;

/// GFC.ANFS/ANFE code for rejecting frames that match no filter element
pub const NON_MATCHING_REJECT: u8 = 0b10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cccr_bit_positions() {
        assert_eq!(Cccr::new().with_init(true).into_bits(), 1 << 0);
        assert_eq!(Cccr::new().with_cce(true).into_bits(), 1 << 1);
        assert_eq!(Cccr::new().with_csa(true).into_bits(), 1 << 3);
        assert_eq!(Cccr::new().with_csr(true).into_bits(), 1 << 4);
        assert_eq!(Cccr::new().with_mon(true).into_bits(), 1 << 5);
        assert_eq!(Cccr::new().with_test(true).into_bits(), 1 << 7);
        assert_eq!(Cccr::new().with_pxhd(true).into_bits(), 1 << 12);
        assert_eq!(Cccr::new().with_txp(true).into_bits(), 1 << 14);
    }

    #[test]
    fn test_nbtp_layout() {
        let nbtp = Nbtp::new()
            .with_ntseg2(11)
            .with_ntseg1(82)
            .with_nbrp(0)
            .with_nsjw(3);
        assert_eq!(nbtp.into_bits(), 0x0600_520B);
        let nbtp = Nbtp::from_bits(u32::MAX);
        assert_eq!(nbtp.nbrp(), 0x1FF);
        assert_eq!(nbtp.nsjw(), 0x7F);
    }

    #[test]
    fn test_fifo_status_fields() {
        let status = Rxf0s::from_bits(0x0305_0203);
        assert_eq!(status.f0fl(), 3);
        assert_eq!(status.f0gi(), 2);
        assert_eq!(status.f0pi(), 5);
        assert!(status.f0f());
        assert!(status.rf0l());
    }

    #[test]
    fn test_filter_configuration_fields() {
        let gfc = Gfc::new()
            .with_anfs(NON_MATCHING_REJECT)
            .with_anfe(NON_MATCHING_REJECT);
        assert_eq!(gfc.into_bits(), 0b10_10_00);
        let sidfc = Sidfc::new().with_flssa(0x1234).with_lss(1);
        assert_eq!(sidfc.into_bits(), 0x0001_1234);
        let txbc = Txbc::new().with_tbsa(0x0100).with_ndtb(1);
        assert_eq!(txbc.into_bits(), 0x0001_0100);
    }

    #[test]
    fn test_interrupt_flags_share_positions() {
        assert_eq!(Ir::new().with_rf0n(true).into_bits(), 1);
        assert_eq!(Ie::new().with_rf0ne(true).into_bits(), 1);
        assert_eq!(Ir::new().with_tc(true).into_bits(), 1 << 9);
        assert_eq!(Ie::new().with_tce(true).into_bits(), 1 << 9);
        assert_eq!(Ir::new().with_ara(true).into_bits(), 1 << 29);
    }
}
