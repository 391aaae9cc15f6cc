//! Word layouts of the message RAM elements shared between the CPU and the M_CAN DMA.

use bitfield_struct::bitfield;

macro_rules! enum_bit {
    ($name:ident, $zero_name:ident, $one_name:ident) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub enum $name {
            $zero_name,
            $one_name,
        }

        impl $name {
            const fn into_bits(self) -> u8 {
                match self {
                    $name::$zero_name => 0,
                    $name::$one_name => 1,
                }
            }

            const fn from_bits(value: u8) -> Self {
                match value {
                    0 => $name::$zero_name,
                    _ => $name::$one_name,
                }
            }
        }

        impl From<bool> for $name {
            fn from(value: bool) -> Self {
                Self::from_bits(value as u8)
            }
        }

        impl From<$name> for bool {
            fn from(value: $name) -> bool {
                value.into_bits() != 0
            }
        }
    };
}

enum_bit!(IdentifierKind, Standard, Extended);
enum_bit!(Rtr, DataFrame, RemoteFrame);

/// First word of a Tx buffer element.
#[bitfield(u32, order = Msb, default = false, debug = false, defmt = cfg(feature = "defmt"))]
pub struct TxElementT0 {
    /// Error state indicator, only meaningful for FD frames
    pub esi: bool,

    /// Extended identifier
    #[bits(1)]
    pub xtd: IdentifierKind,

    /// Remote transmission request
    #[bits(1)]
    pub rtr: Rtr,

    /// Standard or extended identifier depending on XTD. A standard identifier occupies ID[28:18].
    #[bits(29)]
    pub id: u32,
}

/// Second word of a Tx buffer element.
#[bitfield(u32, order = Msb, default = false, debug = false, defmt = cfg(feature = "defmt"))]
pub struct TxElementT1 {
    /// Message marker, copied into the Tx event FIFO element
    #[bits(8)]
    pub mm: u8,

    /// Store Tx events
    pub efc: bool,

    __reserved0: bool,

    /// FD format
    pub fdf: bool,

    /// Bit rate switch
    pub brs: bool,

    /// Data length code. Classic frames carry 8 data bytes for codes 9 to 15.
    #[bits(4)]
    pub dlc: u8,

    #[bits(16)]
    __reserved1: u16,
}

/// First word of an Rx FIFO element.
#[bitfield(u32, order = Msb, default = false, debug = false, defmt = cfg(feature = "defmt"))]
pub struct RxElementR0 {
    pub esi: bool,

    #[bits(1)]
    pub xtd: IdentifierKind,

    #[bits(1)]
    pub rtr: Rtr,

    #[bits(29)]
    pub id: u32,
}

/// Second word of an Rx FIFO element.
#[bitfield(u32, order = Msb, default = false, debug = false, defmt = cfg(feature = "defmt"))]
pub struct RxElementR1 {
    /// Accepted non-matching frame
    pub anmf: bool,

    /// Index of the matching filter element
    #[bits(7)]
    pub fidx: u8,

    #[bits(2)]
    __reserved: u8,

    pub fdf: bool,

    pub brs: bool,

    #[bits(4)]
    pub dlc: u8,

    /// Rx timestamp
    #[bits(16)]
    pub rxts: u16,
}

/// Standard message ID filter element.
#[bitfield(u32, order = Msb, default = false, debug = false, defmt = cfg(feature = "defmt"))]
pub struct StandardFilterElement {
    /// Standard filter type
    #[bits(2)]
    pub sft: FilterType,

    /// Standard filter element configuration
    #[bits(3)]
    pub sfec: FilterConfiguration,

    /// First ID, the filter value for a classic filter
    #[bits(11)]
    pub sfid1: u16,

    #[bits(5)]
    __reserved: u8,

    /// Second ID, the mask for a classic filter
    #[bits(11)]
    pub sfid2: u16,
}

/// First word of an extended message ID filter element.
#[bitfield(u32, order = Msb, default = false, debug = false, defmt = cfg(feature = "defmt"))]
pub struct ExtendedFilterF0 {
    /// Extended filter element configuration
    #[bits(3)]
    pub efec: FilterConfiguration,

    /// First ID, the filter value for a classic filter
    #[bits(29)]
    pub efid1: u32,
}

/// Second word of an extended message ID filter element.
#[bitfield(u32, order = Msb, default = false, debug = false, defmt = cfg(feature = "defmt"))]
pub struct ExtendedFilterF1 {
    /// Extended filter type
    #[bits(2)]
    pub eft: FilterType,

    __reserved: bool,

    /// Second ID, the mask for a classic filter
    #[bits(29)]
    pub efid2: u32,
}

/// SFT / EFT
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FilterType {
    /// Range filter from ID1 to ID2
    Range = 0b00,
    /// Dual ID filter for ID1 or ID2
    DualId = 0b01,
    /// Classic filter: ID1 = filter, ID2 = mask
    Classic = 0b10,
    /// Standard: element disabled. Extended: range filter without XIDAM mask.
    Disabled = 0b11,
}

impl FilterType {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> FilterType {
        match value & 0b11 {
            0b00 => FilterType::Range,
            0b01 => FilterType::DualId,
            0b10 => FilterType::Classic,
            _ => FilterType::Disabled,
        }
    }
}

/// SFEC / EFEC
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FilterConfiguration {
    /// Disable filter element
    Disable = 0b000,
    /// Store in Rx FIFO 0 if filter matches
    StoreInFifo0 = 0b001,
    /// Store in Rx FIFO 1 if filter matches
    StoreInFifo1 = 0b010,
    /// Reject ID if filter matches
    Reject = 0b011,
    /// Set priority if filter matches, no storage
    SetPriority = 0b100,
    /// Set priority and store in FIFO 0 if filter matches
    SetPriorityAndStoreInFifo0 = 0b101,
    /// Set priority and store in FIFO 1 if filter matches
    SetPriorityAndStoreInFifo1 = 0b110,
    /// Store into Rx buffer or as debug message
    StoreInBuffer = 0b111,
}

impl FilterConfiguration {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> FilterConfiguration {
        match value & 0b111 {
            0b000 => FilterConfiguration::Disable,
            0b001 => FilterConfiguration::StoreInFifo0,
            0b010 => FilterConfiguration::StoreInFifo1,
            0b011 => FilterConfiguration::Reject,
            0b100 => FilterConfiguration::SetPriority,
            0b101 => FilterConfiguration::SetPriorityAndStoreInFifo0,
            0b110 => FilterConfiguration::SetPriorityAndStoreInFifo1,
            _ => FilterConfiguration::StoreInBuffer,
        }
    }
}

/// Shift of an 11-bit identifier inside the 29-bit ID field of T0 / R0.
pub const STANDARD_ID_SHIFT: u32 = 18;
