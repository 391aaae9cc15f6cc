use crate::frame::Frame;
use crate::pac::SYSTEM_RAM;
use crate::pac::message_ram::{
    ExtendedFilterF0, ExtendedFilterF1, FilterConfiguration, FilterType, IdentifierKind, Rtr,
    RxElementR0, RxElementR1, STANDARD_ID_SHIFT, StandardFilterElement, TxElementT0, TxElementT1,
};
use embedded_can::{ExtendedId, Id, StandardId};
use vcell::VolatileCell;

pub const STANDARD_FILTERS_LEN: usize = 1;
pub const EXTENDED_FILTERS_LEN: usize = 1;
pub const RX_FIFO0_LEN: usize = 8;
pub const TX_BUFFERS_LEN: usize = 1;

/// Payload bytes per element. Element size registers are programmed for 8 byte data fields.
pub const DATA_FIELD_LEN: usize = 8;
const DATA_FIELD_WORDS: usize = DATA_FIELD_LEN / 4;

/// Storage shared with the M_CAN DMA: filter lists, Rx FIFO 0 and the dedicated Tx buffer.
///
/// The peripheral addresses message RAM with 16-bit offsets into system RAM, so the whole block
/// must sit in the first 64 KiB of SRAM. Place it there with a `#[link_section]` attribute:
///
/// ```ignore
/// #[unsafe(link_section = ".can")]
/// static CAN_RAM: MessageRam = MessageRam::new();
/// ```
#[repr(C)]
pub struct MessageRam {
    pub standard_filters: [StandardFilter; STANDARD_FILTERS_LEN],
    pub extended_filters: [ExtendedFilter; EXTENDED_FILTERS_LEN],
    pub rx_fifo0: [RxFifoElement; RX_FIFO0_LEN],
    pub tx_buffers: [TxBufferElement; TX_BUFFERS_LEN],
}

// Every word is accessed with single volatile operations. Concurrent use by the CPU and the
// peripheral is sequenced by the FIFO indices and the Tx request bits.
unsafe impl Sync for MessageRam {}

#[repr(C)]
pub struct StandardFilter {
    pub s0: VolatileCell<StandardFilterElement>,
}

#[repr(C)]
pub struct ExtendedFilter {
    pub f0: VolatileCell<ExtendedFilterF0>,
    pub f1: VolatileCell<ExtendedFilterF1>,
}

#[repr(C)]
pub struct RxFifoElement {
    pub r0: VolatileCell<RxElementR0>,
    pub r1: VolatileCell<RxElementR1>,
    pub data: [VolatileCell<u32>; DATA_FIELD_WORDS],
}

#[repr(C)]
pub struct TxBufferElement {
    pub t0: VolatileCell<TxElementT0>,
    pub t1: VolatileCell<TxElementT1>,
    pub data: [VolatileCell<u32>; DATA_FIELD_WORDS],
}

/// Start addresses (low 16 bits of the byte address) and element counts of each section.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageRamLayout {
    pub standard_filters_addr: u16,
    pub standard_filters_len: u8,

    pub extended_filters_addr: u16,
    pub extended_filters_len: u8,

    pub rx_fifo0_addr: u16,
    pub rx_fifo0_len: u8,

    pub tx_buffers_addr: u16,
    /// Number of dedicated transmit buffers
    pub tx_buffers_len: u8,
}

#[inline]
fn ram_offset<T>(ptr: *const T) -> u16 {
    (ptr as usize & 0xFFFF) as u16
}

impl Default for MessageRam {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRam {
    pub const fn new() -> Self {
        Self {
            standard_filters: [const {
                StandardFilter {
                    s0: VolatileCell::new(StandardFilterElement::new()),
                }
            }; STANDARD_FILTERS_LEN],
            extended_filters: [const {
                ExtendedFilter {
                    f0: VolatileCell::new(ExtendedFilterF0::new()),
                    f1: VolatileCell::new(ExtendedFilterF1::new()),
                }
            }; EXTENDED_FILTERS_LEN],
            rx_fifo0: [const {
                RxFifoElement {
                    r0: VolatileCell::new(RxElementR0::new()),
                    r1: VolatileCell::new(RxElementR1::new()),
                    data: [const { VolatileCell::new(0) }; DATA_FIELD_WORDS],
                }
            }; RX_FIFO0_LEN],
            tx_buffers: [const {
                TxBufferElement {
                    t0: VolatileCell::new(TxElementT0::new()),
                    t1: VolatileCell::new(TxElementT1::new()),
                    data: [const { VolatileCell::new(0) }; DATA_FIELD_WORDS],
                }
            }; TX_BUFFERS_LEN],
        }
    }

    pub fn layout(&self) -> MessageRamLayout {
        MessageRamLayout {
            standard_filters_addr: ram_offset(self.standard_filters.as_ptr()),
            standard_filters_len: STANDARD_FILTERS_LEN as u8,
            extended_filters_addr: ram_offset(self.extended_filters.as_ptr()),
            extended_filters_len: EXTENDED_FILTERS_LEN as u8,
            rx_fifo0_addr: ram_offset(self.rx_fifo0.as_ptr()),
            rx_fifo0_len: RX_FIFO0_LEN as u8,
            tx_buffers_addr: ram_offset(self.tx_buffers.as_ptr()),
            tx_buffers_len: TX_BUFFERS_LEN as u8,
        }
    }

    /// Whether the peripheral can reach this block through its 16-bit start addresses.
    pub fn is_addressable(&self) -> bool {
        let start = self as *const Self as usize;
        let end = start + core::mem::size_of::<Self>();
        start >= SYSTEM_RAM && end <= SYSTEM_RAM + 0x1_0000
    }

    /// Writes zero to every word.
    ///
    /// Reading uninitialized words would otherwise report ECC errors on parts that have them.
    pub fn clear(&self) {
        for filter in &self.standard_filters {
            filter.s0.set(StandardFilterElement::new());
        }
        for filter in &self.extended_filters {
            filter.f0.set(ExtendedFilterF0::new());
            filter.f1.set(ExtendedFilterF1::new());
        }
        for element in &self.rx_fifo0 {
            element.r0.set(RxElementR0::new());
            element.r1.set(RxElementR1::new());
            element.data.iter().for_each(|word| word.set(0));
        }
        for element in &self.tx_buffers {
            element.t0.set(TxElementT0::new());
            element.t1.set(TxElementT1::new());
            element.data.iter().for_each(|word| word.set(0));
        }
    }
}

fn encode_id(id: Id) -> (IdentifierKind, u32) {
    match id {
        Id::Standard(id) => (
            IdentifierKind::Standard,
            (id.as_raw() as u32) << STANDARD_ID_SHIFT,
        ),
        Id::Extended(id) => (IdentifierKind::Extended, id.as_raw()),
    }
}

fn decode_id(xtd: IdentifierKind, raw: u32) -> Id {
    match xtd {
        IdentifierKind::Standard => {
            let raw = ((raw >> STANDARD_ID_SHIFT) & 0x7FF) as u16;
            Id::Standard(StandardId::new(raw).unwrap_or(StandardId::ZERO))
        }
        IdentifierKind::Extended => {
            let raw = raw & 0x1FFF_FFFF;
            Id::Extended(ExtendedId::new(raw).unwrap_or(ExtendedId::ZERO))
        }
    }
}

fn pack_data(cells: &[VolatileCell<u32>; DATA_FIELD_WORDS], bytes: &[u8; DATA_FIELD_LEN]) {
    for (cell, chunk) in cells.iter().zip(bytes.chunks_exact(4)) {
        cell.set(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
}

fn unpack_data(cells: &[VolatileCell<u32>; DATA_FIELD_WORDS]) -> [u8; DATA_FIELD_LEN] {
    let mut bytes = [0u8; DATA_FIELD_LEN];
    for (chunk, cell) in bytes.chunks_exact_mut(4).zip(cells.iter()) {
        chunk.copy_from_slice(&cell.get().to_le_bytes());
    }
    bytes
}

impl TxBufferElement {
    /// Copies a frame into the element. Remote frames leave the data field untouched.
    pub fn store(&self, frame: &Frame) {
        let (xtd, id) = encode_id(frame.raw_id());
        let rtr = if frame.raw_rtr() {
            Rtr::RemoteFrame
        } else {
            Rtr::DataFrame
        };
        self.t0.set(
            TxElementT0::new()
                .with_esi(false)
                .with_xtd(xtd)
                .with_rtr(rtr)
                .with_id(id),
        );
        // No message marker and no Tx event
        self.t1.set(TxElementT1::new().with_dlc(frame.raw_dlc()));
        if !frame.raw_rtr() {
            pack_data(&self.data, frame.raw_data());
        }
    }

    pub fn load(&self) -> Frame {
        let t0 = self.t0.get();
        let t1 = self.t1.get();
        let rtr = t0.rtr() == Rtr::RemoteFrame;
        let data = if rtr {
            [0; DATA_FIELD_LEN]
        } else {
            unpack_data(&self.data)
        };
        Frame::from_parts(decode_id(t0.xtd(), t0.id()), rtr, t1.dlc(), data)
    }
}

impl RxFifoElement {
    /// Snapshot of the element. Only the first `min(dlc, 8)` payload bytes are kept.
    pub fn load(&self) -> Frame {
        let r0 = self.r0.get();
        let r1 = self.r1.get();
        let rtr = r0.rtr() == Rtr::RemoteFrame;
        let mut data = [0; DATA_FIELD_LEN];
        if !rtr {
            let len = usize::from(r1.dlc()).min(DATA_FIELD_LEN);
            data[..len].copy_from_slice(&unpack_data(&self.data)[..len]);
        }
        Frame::from_parts(decode_id(r0.xtd(), r0.id()), rtr, r1.dlc(), data)
    }

    /// Writes a received frame, as the peripheral does when a frame passes acceptance filtering.
    pub fn store(&self, frame: &Frame, filter_index: Option<u8>) {
        let (xtd, id) = encode_id(frame.raw_id());
        let rtr = if frame.raw_rtr() {
            Rtr::RemoteFrame
        } else {
            Rtr::DataFrame
        };
        self.r0
            .set(RxElementR0::new().with_xtd(xtd).with_rtr(rtr).with_id(id));
        self.r1.set(
            RxElementR1::new()
                .with_anmf(filter_index.is_none())
                .with_fidx(filter_index.unwrap_or(0))
                .with_dlc(frame.raw_dlc()),
        );
        pack_data(&self.data, frame.raw_data());
    }
}

impl StandardFilter {
    pub fn set(&self, sft: FilterType, sfec: FilterConfiguration, id1: u16, id2: u16) {
        self.s0.set(
            StandardFilterElement::new()
                .with_sft(sft)
                .with_sfec(sfec)
                .with_sfid1(id1)
                .with_sfid2(id2),
        );
    }
}

impl ExtendedFilter {
    pub fn set(&self, eft: FilterType, efec: FilterConfiguration, id1: u32, id2: u32) {
        self.f0
            .set(ExtendedFilterF0::new().with_efec(efec).with_efid1(id1));
        self.f1
            .set(ExtendedFilterF1::new().with_eft(eft).with_efid2(id2));
    }
}
