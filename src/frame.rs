//! Classic CAN frames and the staging buffers the driver fills and drains.

use crate::Error;
use crate::message_ram::DATA_FIELD_LEN;
use embedded_can::Id;

/// A classic CAN frame: identifier, remote flag, data length code and up to 8 bytes.
///
/// The DLC of a received frame is kept as sent on the bus, so codes 9 to 15 are possible. The
/// payload is always capped at 8 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    id: Id,
    rtr: bool,
    dlc: u8,
    data: [u8; DATA_FIELD_LEN],
}

impl Frame {
    pub(crate) const fn from_parts(id: Id, rtr: bool, dlc: u8, data: [u8; DATA_FIELD_LEN]) -> Self {
        Self { id, rtr, dlc, data }
    }

    #[inline]
    pub(crate) fn raw_id(&self) -> Id {
        self.id
    }

    #[inline]
    pub(crate) fn raw_rtr(&self) -> bool {
        self.rtr
    }

    #[inline]
    pub(crate) fn raw_dlc(&self) -> u8 {
        self.dlc
    }

    #[inline]
    pub(crate) fn raw_data(&self) -> &[u8; DATA_FIELD_LEN] {
        &self.data
    }

    #[inline]
    fn payload_len(&self) -> usize {
        if self.rtr {
            0
        } else {
            usize::from(self.dlc).min(DATA_FIELD_LEN)
        }
    }
}

impl embedded_can::Frame for Frame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > DATA_FIELD_LEN {
            return None;
        }
        let mut bytes = [0; DATA_FIELD_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Some(Self::from_parts(id.into(), false, data.len() as u8, bytes))
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > DATA_FIELD_LEN {
            return None;
        }
        let bytes = [0; DATA_FIELD_LEN];
        Some(Self::from_parts(id.into(), true, dlc as u8, bytes))
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.rtr
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        usize::from(self.dlc)
    }

    fn data(&self) -> &[u8] {
        &self.data[..self.payload_len()]
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Frame {
    fn format(&self, f: defmt::Formatter) {
        let (id, extended) = match self.id {
            Id::Standard(id) => (u32::from(id.as_raw()), false),
            Id::Extended(id) => (id.as_raw(), true),
        };
        defmt::write!(
            f,
            "Frame {{ id: {=u32:#x}, extended: {=bool}, rtr: {=bool}, dlc: {=u8}, data: {=[u8]} }}",
            id,
            extended,
            self.rtr,
            self.dlc,
            &self.data[..self.payload_len()]
        )
    }
}

/// Outgoing frame being assembled by `begin_packet` / `write`.
#[derive(Clone, Copy, Debug)]
pub struct TxPacket {
    id: Option<Id>,
    rtr: bool,
    dlc: Option<u8>,
    data: [u8; DATA_FIELD_LEN],
    len: usize,
}

impl Default for TxPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl TxPacket {
    pub const fn new() -> Self {
        Self {
            id: None,
            rtr: false,
            dlc: None,
            data: [0; DATA_FIELD_LEN],
            len: 0,
        }
    }

    /// Starts a new packet, dropping anything staged before.
    ///
    /// With `dlc` set the frame carries that length code regardless of how many bytes are
    /// written, otherwise the number of written bytes.
    pub fn begin(&mut self, id: Id, dlc: Option<u8>, rtr: bool) -> Result<(), Error> {
        if dlc.is_some_and(|dlc| usize::from(dlc) > DATA_FIELD_LEN) {
            return Err(Error::InvalidDlc);
        }
        *self = Self {
            id: Some(id),
            rtr,
            dlc,
            ..Self::new()
        };
        Ok(())
    }

    #[inline]
    pub fn is_begun(&self) -> bool {
        self.id.is_some()
    }

    /// Appends payload bytes, returns how many fit.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        if !self.is_begun() {
            return 0;
        }
        let n = bytes.len().min(DATA_FIELD_LEN - self.len);
        self.data[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        n
    }

    /// Takes the staged packet as a frame and returns to the idle state.
    pub fn finish(&mut self) -> Result<Frame, Error> {
        let id = self.id.take().ok_or(Error::PacketNotBegun)?;
        let dlc = self.dlc.unwrap_or(self.len as u8);
        let frame = Frame::from_parts(id, self.rtr, dlc, self.data);
        *self = Self::new();
        Ok(frame)
    }
}

/// The most recently drained frame and the read cursor into its payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct RxPacket {
    frame: Option<Frame>,
    index: usize,
}

impl RxPacket {
    pub const fn new() -> Self {
        Self {
            frame: None,
            index: 0,
        }
    }

    pub(crate) fn load(&mut self, frame: Frame) {
        self.frame = Some(frame);
        self.index = 0;
    }

    #[inline]
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    #[inline]
    fn remaining(&self) -> &[u8] {
        match &self.frame {
            Some(frame) => {
                let data = embedded_can::Frame::data(frame);
                &data[self.index.min(data.len())..]
            }
            None => &[],
        }
    }

    /// Unread payload bytes, always 0 for remote frames.
    #[inline]
    pub fn available(&self) -> usize {
        self.remaining().len()
    }

    pub fn read(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.index += 1;
        Some(byte)
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.remaining().first().copied()
    }

    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let remaining = self.remaining();
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.index += n;
        n
    }

    #[inline]
    pub fn id(&self) -> Option<Id> {
        self.frame.map(|f| f.id)
    }

    #[inline]
    pub fn is_extended(&self) -> bool {
        matches!(self.id(), Some(Id::Extended(_)))
    }

    #[inline]
    pub fn is_rtr(&self) -> bool {
        self.frame.is_some_and(|f| f.rtr)
    }

    #[inline]
    pub fn dlc(&self) -> Option<u8> {
        self.frame.map(|f| f.dlc)
    }
}
