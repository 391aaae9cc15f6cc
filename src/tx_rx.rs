//! Transmit and receive paths of a running driver.

use crate::Error;
use crate::can::{Can, Platform, RunningMode};
use crate::frame::Frame;
use crate::pac::Registers;
use crate::util::memory_barrier;
use embedded_can::Id;

impl<B: Registers + Sync + 'static, P: Platform> Can<B, P, RunningMode> {
    /// Starts staging a frame. `dlc` overrides the number of bytes written, `rtr` requests a
    /// remote frame.
    pub fn begin_packet(
        &mut self,
        id: impl Into<Id>,
        dlc: Option<u8>,
        rtr: bool,
    ) -> Result<(), Error> {
        self.tx.begin(id.into(), dlc, rtr)
    }

    /// Appends payload bytes to the staged frame. Returns how many of them fit.
    #[inline]
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        self.tx.write(bytes)
    }

    /// Transmits the staged frame, spinning between completion polls.
    pub fn end_packet(&mut self) -> Result<(), Error> {
        self.end_packet_with(core::hint::spin_loop)
    }

    /// Transmits the staged frame, calling `yield_now` between completion polls.
    pub fn end_packet_with(&mut self, yield_now: impl FnMut()) -> Result<(), Error> {
        let frame = self.tx.finish()?;
        self.submit(&frame, yield_now)
    }

    /// Stages and transmits `frame` in one go.
    pub fn transmit(&mut self, frame: &Frame) -> Result<(), Error> {
        self.submit(frame, core::hint::spin_loop)
    }

    /// Copies `frame` into the dedicated Tx buffer, requests transmission and waits for the
    /// transmission occurred flag.
    ///
    /// There is a single buffer: a frame submitted while another is still pending replaces it.
    fn submit(&mut self, frame: &Frame, mut yield_now: impl FnMut()) -> Result<(), Error> {
        let regs = &self.state.regs;
        self.state.ram.tx_buffers[0].store(frame);
        memory_barrier();
        regs.txbar().write(|w| w.set_ar(1));

        for _ in 0..self.config.tx_poll_iterations {
            if regs.txbto().read().to() & 1 != 0 {
                return Ok(());
            }
            yield_now();
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("{} transmit timed out: {}", self.instance(), frame);
        Err(Error::TransmitTimeout)
    }

    /// Drains one frame from Rx FIFO 0 into the receive buffer. See [`State::parse_packet`].
    ///
    /// [`State::parse_packet`]: crate::State::parse_packet
    #[inline]
    pub fn parse_packet(&mut self) -> Option<u8> {
        self.state.parse_packet()
    }

    /// Drains one frame from Rx FIFO 0.
    pub fn receive(&mut self) -> Option<Frame> {
        self.state.parse_packet()?;
        self.state.with_rx(|rx| rx.frame().copied())
    }

    /// Unread payload bytes of the last drained frame.
    #[inline]
    pub fn available(&self) -> usize {
        self.state.with_rx(|rx| rx.available())
    }

    #[inline]
    pub fn read(&mut self) -> Option<u8> {
        self.state.with_rx(|rx| rx.read())
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.state.with_rx(|rx| rx.peek())
    }

    #[inline]
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        self.state.with_rx(|rx| rx.read_into(buf))
    }

    #[inline]
    pub fn packet_id(&self) -> Option<Id> {
        self.state.with_rx(|rx| rx.id())
    }

    #[inline]
    pub fn packet_extended(&self) -> bool {
        self.state.with_rx(|rx| rx.is_extended())
    }

    #[inline]
    pub fn packet_rtr(&self) -> bool {
        self.state.with_rx(|rx| rx.is_rtr())
    }

    #[inline]
    pub fn packet_dlc(&self) -> Option<u8> {
        self.state.with_rx(|rx| rx.dlc())
    }
}
