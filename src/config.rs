use crate::Error;
use crate::pac::registers::{NON_MATCHING_REJECT, Nbtp};
use crate::util::{div_round, div_round_up};

/// Largest prescaler divisor NBTP.NBRP is allowed to carry here.
pub const MAX_PRESCALER: u64 = 32;
/// Prescaled clocks that fit before the sample point (NTSEG1 + 2).
const MAX_CLOCKS_TO_SAMPLE: u64 = 256;
/// Prescaled clocks that fit after the sample point (NTSEG2 + 1).
const MAX_CLOCKS_AFTER_SAMPLE: u64 = 128;

/// Nominal bit timing in NBTP register encoding (every field is the hardware value, one less
/// than the quantity it describes).
///
/// The sample point is fixed at 87.5 % of the bit, the synchronization jump width at a quarter
/// of the phase after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NominalBitTiming {
    pub ntseg1: u8,
    pub ntseg2: u8,
    pub nbrp: u16,
    pub nsjw: u8,
}

impl NominalBitTiming {
    /// Computes the timing for `bitrate` bit/s from a peripheral clock of `clock_hz`.
    ///
    /// Fails when no prescaler divisor between 1 and 32 fits both time segments into their
    /// register fields, or when the rounded segments leave fewer than 2 prescaled clocks before
    /// the sample point or none after it.
    pub const fn compute(clock_hz: u32, bitrate: u32) -> Result<Self, Error> {
        if bitrate == 0 {
            return Err(Error::BitRateUnreachable);
        }
        let clocks_per_bit = div_round(clock_hz as u64, bitrate as u64);
        let clocks_to_sample = div_round(clocks_per_bit * 7, 8);
        let clocks_after_sample = clocks_per_bit - clocks_to_sample;

        let for_seg1 = div_round_up(clocks_to_sample, MAX_CLOCKS_TO_SAMPLE);
        let for_seg2 = div_round_up(clocks_after_sample, MAX_CLOCKS_AFTER_SAMPLE);
        let divisor = if for_seg1 > for_seg2 {
            for_seg1
        } else {
            for_seg2
        };
        if divisor == 0 || divisor > MAX_PRESCALER {
            return Err(Error::BitRateUnreachable);
        }

        let seg1 = div_round(clocks_to_sample, divisor);
        let seg2 = div_round(clocks_after_sample, divisor);
        if seg1 < 2 || seg2 < 1 {
            return Err(Error::BitRateUnreachable);
        }

        Ok(Self {
            ntseg1: (seg1 - 2) as u8,
            ntseg2: (seg2 - 1) as u8,
            nbrp: (divisor - 1) as u16,
            nsjw: div_round(clocks_after_sample, divisor * 4) as u8,
        })
    }

    /// Prescaler divisor, 1 to 32.
    #[inline]
    pub const fn prescaler(&self) -> u16 {
        self.nbrp + 1
    }
}

impl From<NominalBitTiming> for Nbtp {
    fn from(btr: NominalBitTiming) -> Self {
        Nbtp::new()
            .with_ntseg1(btr.ntseg1)
            .with_ntseg2(btr.ntseg2)
            .with_nbrp(btr.nbrp)
            .with_nsjw(btr.nsjw)
    }
}

/// How to handle frames in the global filter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NonMatchingFilter {
    /// Frames will go to Fifo0 when they do no match any specific filter
    IntoRxFifo0 = 0b00,
    /// Frames will go to Fifo1 when they do no match any specific filter
    IntoRxFifo1 = 0b01,
    /// Frames will be rejected when they do not match any specific filter
    Reject = NON_MATCHING_REJECT as isize,
}

/// How to handle frames which do not match a specific filter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GlobalFilter {
    /// How to handle non-matching standard frames
    pub handle_standard_frames: NonMatchingFilter,

    /// How to handle non-matching extended frames
    pub handle_extended_frames: NonMatchingFilter,

    /// How to handle remote standard frames
    pub reject_remote_standard_frames: bool,

    /// How to handle remote extended frames
    pub reject_remote_extended_frames: bool,
}

impl GlobalFilter {
    /// Reject all non-matching and remote frames
    pub const fn reject_all() -> Self {
        Self {
            handle_standard_frames: NonMatchingFilter::Reject,
            handle_extended_frames: NonMatchingFilter::Reject,
            reject_remote_standard_frames: true,
            reject_remote_extended_frames: true,
        }
    }

    /// Only frames matching a filter element are stored, remote frames included.
    pub const fn reject_non_matching() -> Self {
        Self {
            handle_standard_frames: NonMatchingFilter::Reject,
            handle_extended_frames: NonMatchingFilter::Reject,
            reject_remote_standard_frames: false,
            reject_remote_extended_frames: false,
        }
    }

    /// How to handle non-matching standard frames
    pub const fn set_handle_standard_frames(mut self, filter: NonMatchingFilter) -> Self {
        self.handle_standard_frames = filter;
        self
    }
    /// How to handle non-matching extended frames
    pub const fn set_handle_extended_frames(mut self, filter: NonMatchingFilter) -> Self {
        self.handle_extended_frames = filter;
        self
    }
    /// How to handle remote standard frames
    pub const fn set_reject_remote_standard_frames(mut self, filter: bool) -> Self {
        self.reject_remote_standard_frames = filter;
        self
    }
    /// How to handle remote extended frames
    pub const fn set_reject_remote_extended_frames(mut self, filter: bool) -> Self {
        self.reject_remote_extended_frames = filter;
        self
    }
}

impl Default for GlobalFilter {
    #[inline]
    fn default() -> Self {
        Self::reject_non_matching()
    }
}

/// Driver configuration, applied by `begin`.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanConfig {
    /// Frequency of the generic clock feeding the peripheral
    pub clock_hz: u32,
    /// Configures the Global Filter
    pub global_filter: GlobalFilter,
    /// Enables or disables automatic retransmission of messages
    ///
    /// If this is enabled, the CAN peripheral will automatically try to retransmit each frame
    /// until it can be sent. Otherwise, it will try only once to send each frame.
    ///
    /// Automatic retransmission is enabled by default.
    pub automatic_retransmit: bool,
    /// Enables or disables the pausing between transmissions
    ///
    /// This feature loosens up burst transmissions coming from a single node and it protects
    /// against "babbling idiot" scenarios where the application program erroneously requests too
    /// many transmissions.
    pub transmit_pause: bool,
    /// Edge filtering: two consecutive dominant tq required to detect an edge for hard
    /// synchronization
    pub edge_filtering: bool,
    /// Enables protocol exception handling
    pub protocol_exception_handling: bool,
    /// How long to wait for the clock stop acknowledge before returning an error.
    /// Should be longer than the longest frame transmission time, the core only acknowledges
    /// once pending transfers are done and the bus is idle.
    pub timeout_iterations_long: u32,
    /// How long to wait for the INIT handshakes before returning an error.
    pub timeout_iterations_short: u32,
    /// Polls of the transmission occurred flag before a transmission is reported as timed out.
    pub tx_poll_iterations: u32,
}

impl CanConfig {
    pub const fn new() -> Self {
        Self {
            clock_hz: 48_000_000,
            global_filter: GlobalFilter::reject_non_matching(),
            automatic_retransmit: true,
            transmit_pause: false,
            edge_filtering: false,
            protocol_exception_handling: true,
            timeout_iterations_long: 10_000_000,
            timeout_iterations_short: 1_000_000,
            tx_poll_iterations: 8_000,
        }
    }

    /// Frequency of the peripheral clock the bit timing is derived from.
    #[inline]
    pub const fn set_clock_hz(mut self, clock_hz: u32) -> Self {
        self.clock_hz = clock_hz;
        self
    }

    /// Sets the global filter settings
    #[inline]
    pub const fn set_global_filter(mut self, filter: GlobalFilter) -> Self {
        self.global_filter = filter;
        self
    }

    /// Enables or disables automatic retransmission of messages
    #[inline]
    pub const fn set_automatic_retransmit(mut self, enabled: bool) -> Self {
        self.automatic_retransmit = enabled;
        self
    }

    /// Enables or disables the pausing between transmissions
    #[inline]
    pub const fn set_transmit_pause(mut self, enabled: bool) -> Self {
        self.transmit_pause = enabled;
        self
    }

    /// Two consecutive dominant tq required to detect an edge for hard synchronization
    #[inline]
    pub const fn set_edge_filtering(mut self, enabled: bool) -> Self {
        self.edge_filtering = enabled;
        self
    }

    /// Enables protocol exception handling
    #[inline]
    pub const fn set_protocol_exception_handling(mut self, peh: bool) -> Self {
        self.protocol_exception_handling = peh;
        self
    }

    #[inline]
    pub const fn set_timeout_iterations(mut self, short: u32, long: u32) -> Self {
        self.timeout_iterations_short = short;
        self.timeout_iterations_long = long;
        self
    }

    #[inline]
    pub const fn set_tx_poll_iterations(mut self, iterations: u32) -> Self {
        self.tx_poll_iterations = iterations;
        self
    }
}

impl Default for CanConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
