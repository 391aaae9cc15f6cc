use crate::config::{CanConfig, GlobalFilter, NominalBitTiming};
use crate::frame::TxPacket;
use crate::interrupt::{self, ReceiveCallback, State};
use crate::message_ram::MessageRamLayout;
use crate::pac::Registers;
use crate::pac::message_ram::{FilterConfiguration, FilterType};
use crate::pac::registers::{DATA_FIELD_8_BYTES, Ecr, Ie, Ile, Nbtp, Psr};
use crate::util::{checked_wait, clock_domain_sync_delay, memory_barrier};
use crate::{Error, Instance};
use core::marker::PhantomData;

const ENDN_TEST_VALUE: u32 = 0x8765_4321;
const SUPPORTED_CORE_RELEASE: u8 = 3;

const MAX_STANDARD_ID: u16 = 0x7FF;
const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Board glue the driver sequences but does not implement: pin multiplexing and the generic
/// clock channel of the peripheral.
pub trait Platform {
    type Pin: Copy;

    /// Routes both pins to the CAN peripheral function.
    fn connect_pins(&mut self, instance: Instance, tx: Self::Pin, rx: Self::Pin);

    /// Returns both pins to plain inputs.
    fn release_pins(&mut self, tx: Self::Pin, rx: Self::Pin);

    /// Enables or disables the peripheral clock channel.
    fn set_clock(&mut self, instance: Instance, enabled: bool);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pins<T> {
    pub tx: Option<T>,
    pub rx: Option<T>,
}

impl<T> Pins<T> {
    pub const fn new(tx: T, rx: T) -> Self {
        Self {
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    pub const fn unassigned() -> Self {
        Self { tx: None, rx: None }
    }
}

/// Clock off, pins released, nothing registered.
pub struct PoweredDownMode;
/// Initialized and taking part in bus traffic in one of the [`OperatingMode`]s.
pub struct RunningMode;
/// Clock stop acknowledged and the clock channel disabled.
pub struct SleepMode;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingMode {
    Normal,
    /// Listen only, the TX pin stays recessive
    BusMonitoring,
    /// Transmitted frames are received back and also driven onto the TX pin
    ExternalLoopback,
    /// Transmitted frames are received back, the TX pin stays recessive
    InternalLoopback,
}

/// Driver for one M_CAN instance.
///
/// State transitions consume the driver. A failed transition hands it back in its previous
/// state together with the error.
pub struct Can<B: 'static, P: Platform, M> {
    pub(crate) state: &'static State<B>,
    platform: P,
    instance: Instance,
    pins: Pins<P::Pin>,
    pub(crate) config: CanConfig,
    pub(crate) tx: TxPacket,
    operating_mode: OperatingMode,
    _mode: PhantomData<M>,
}

impl<B: Registers + Sync + 'static, P: Platform, M> Can<B, P, M> {
    #[inline]
    pub fn instance(&self) -> Instance {
        self.instance
    }

    #[inline]
    pub fn config(&self) -> &CanConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> &'static State<B> {
        self.state
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn pins(&self) -> Pins<P::Pin> {
        self.pins
    }

    #[inline]
    fn check_core(&self) -> Result<(), Error> {
        let regs = &self.state.regs;
        if regs.endn().read().etv() != ENDN_TEST_VALUE {
            return Err(Error::CoreCommunicationFailed);
        }
        if regs.crel().read().rel() != SUPPORTED_CORE_RELEASE {
            return Err(Error::UnsupportedCoreVersion);
        }
        Ok(())
    }

    #[inline]
    fn set_power_down_mode(&mut self, enabled: bool) -> Result<(), Error> {
        // When clock stop is requested, first INIT and then CSA will be set after all pending
        // transfer requests have been completed and the CAN bus reached idle.
        let regs = &self.state.regs;
        regs.cccr().modify(|w| w.set_csr(enabled));
        checked_wait(
            || regs.cccr().read().csa() != enabled,
            self.config.timeout_iterations_long,
        )
    }

    /// Sets INIT and waits until the core reads it back.
    #[inline]
    fn request_init(&mut self) -> Result<(), Error> {
        // Due to the synchronization mechanism between the two clock domains, there may be a
        // delay until the value written to INIT can be read back.
        let regs = &self.state.regs;
        regs.cccr().modify(|w| w.set_init(true));
        checked_wait(
            || !regs.cccr().read().init(),
            self.config.timeout_iterations_short,
        )
    }

    #[inline]
    fn enter_init_mode(&mut self) -> Result<(), Error> {
        self.request_init()?;
        // Write access to the protected configuration registers while INIT is set
        self.state.regs.cccr().modify(|w| w.set_cce(true));
        Ok(())
    }

    #[inline]
    fn leave_init_mode(&mut self) -> Result<(), Error> {
        let regs = &self.state.regs;
        regs.cccr().modify(|w| w.set_cce(false));
        regs.cccr().modify(|w| w.set_init(false));
        checked_wait(
            || regs.cccr().read().init(),
            self.config.timeout_iterations_short,
        )
    }

    /// Runs `f` between entering and leaving init mode. An INIT request the core never
    /// acknowledged is withdrawn again.
    fn reconfigure(&mut self, f: impl FnOnce(&mut Self)) -> Result<(), Error> {
        if let Err(e) = self.enter_init_mode() {
            self.state.regs.cccr().modify(|w| w.set_init(false));
            return Err(e);
        }
        f(self);
        self.leave_init_mode()
    }

    /// Programs TEST.LBCK, CCCR.TEST and CCCR.MON. Requires init mode.
    ///
    /// Only use external loopback for production tests, as it will destroy ongoing external bus
    /// traffic.
    fn set_loopback_mode(&mut self, mode: OperatingMode) {
        let (test, mon, lbck) = match mode {
            OperatingMode::Normal => (false, false, false),
            OperatingMode::BusMonitoring => (false, true, false),
            OperatingMode::ExternalLoopback => (true, false, true),
            OperatingMode::InternalLoopback => (true, true, true),
        };
        let regs = &self.state.regs;
        // TEST is only writable while CCCR.TEST is set, clearing CCCR.TEST resets it
        if test {
            regs.cccr().modify(|w| w.set_test(true));
            regs.test().modify(|w| w.set_lbck(lbck));
        } else {
            regs.cccr().modify(|w| w.set_test(false));
        }
        regs.cccr().modify(|w| w.set_mon(mon));
    }

    /// Disconnects the driver from the hardware: registry slot, pins and clock.
    fn release(&mut self) {
        interrupt::unregister(self.instance, self.state);
        if let (Some(tx), Some(rx)) = (self.pins.tx, self.pins.rx) {
            self.platform.release_pins(tx, rx);
        }
        self.platform.set_clock(self.instance, false);
    }

    fn into_mode<M2>(self) -> Can<B, P, M2> {
        Can {
            state: self.state,
            platform: self.platform,
            instance: self.instance,
            pins: self.pins,
            config: self.config,
            tx: self.tx,
            operating_mode: self.operating_mode,
            _mode: PhantomData,
        }
    }
}

impl<B: Registers + Sync + 'static, P: Platform> Can<B, P, PoweredDownMode> {
    /// Creates a driver for `instance`. Nothing is touched until [`Can::begin`].
    pub fn new(instance: Instance, state: &'static State<B>, platform: P) -> Self {
        Self {
            state,
            platform,
            instance,
            pins: Pins::unassigned(),
            config: CanConfig::new(),
            tx: TxPacket::new(),
            operating_mode: OperatingMode::Normal,
            _mode: PhantomData,
        }
    }

    #[inline]
    pub fn set_pins(&mut self, tx: P::Pin, rx: P::Pin) {
        self.pins = Pins::new(tx, rx);
    }

    #[inline]
    pub fn set_config(&mut self, config: CanConfig) {
        self.config = config;
    }

    /// Registers or removes the receive callback. Takes effect on [`Can::begin`].
    #[inline]
    pub fn on_receive(&mut self, callback: Option<ReceiveCallback>) {
        self.state.set_callback(callback);
    }

    /// Brings the peripheral up at `bitrate` bit/s in normal operation.
    ///
    /// Nothing is touched when the pins are unassigned or the bit rate is out of reach. If the
    /// core fails to respond afterwards, pins and clock are released again.
    pub fn begin(
        mut self,
        bitrate: u32,
    ) -> Result<Can<B, P, RunningMode>, (Error, Can<B, P, PoweredDownMode>)> {
        match self.try_begin(bitrate) {
            Ok(()) => Ok(self.into_mode()),
            Err(e) => Err((e, self)),
        }
    }

    fn try_begin(&mut self, bitrate: u32) -> Result<(), Error> {
        let (Some(tx), Some(rx)) = (self.pins.tx, self.pins.rx) else {
            return Err(Error::PinsNotAssigned);
        };
        let btr = match NominalBitTiming::compute(self.config.clock_hz, bitrate) {
            Ok(btr) => btr,
            Err(e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "{} bit/s unreachable from {} Hz",
                    bitrate,
                    self.config.clock_hz
                );
                return Err(e);
            }
        };

        self.state.ram.clear();
        self.state.reset_rx();
        self.tx = TxPacket::new();

        self.platform.connect_pins(self.instance, tx, rx);
        self.platform.set_clock(self.instance, true);
        clock_domain_sync_delay();

        if let Err(e) = self.configure(btr) {
            #[cfg(feature = "defmt")]
            defmt::warn!("{} did not come up: {}", self.instance, e);
            self.platform.release_pins(tx, rx);
            self.platform.set_clock(self.instance, false);
            return Err(e);
        }

        interrupt::register(self.instance, self.state);
        #[cfg(feature = "defmt")]
        defmt::debug!("{} running at {} bit/s, {}", self.instance, bitrate, btr);
        Ok(())
    }

    fn configure(&mut self, btr: NominalBitTiming) -> Result<(), Error> {
        self.check_core()?;
        self.set_power_down_mode(false)?;
        self.enter_init_mode()?;

        let config = self.config;
        let layout = self.state.ram.layout();
        self.apply_protocol_options(&config);
        self.set_element_sizes();
        self.set_buffer_layout(&layout);
        self.set_global_filter(config.global_filter);
        // Initially, receive all standard and extended frames into FIFO 0
        self.install_filters(
            (FilterConfiguration::StoreInFifo0, 0, 0),
            (FilterConfiguration::StoreInFifo0, 0, 0),
        );
        self.set_filter_lists(&layout);
        self.set_nominal_bit_timing(btr);
        self.set_loopback_mode(OperatingMode::Normal);

        self.leave_init_mode()?;
        self.operating_mode = OperatingMode::Normal;

        let regs = &self.state.regs;
        regs.ile().write_value(Ile::new().with_eint0(true));
        regs.ie()
            .write_value(Ie::new().with_rf0ne(self.state.callback().is_some()));
        Ok(())
    }

    #[inline]
    fn apply_protocol_options(&mut self, config: &CanConfig) {
        self.state.regs.cccr().modify(|w| {
            w.set_dar(!config.automatic_retransmit);
            w.set_txp(config.transmit_pause);
            w.set_efbi(config.edge_filtering);
            w.set_pxhd(!config.protocol_exception_handling);
            w.set_fdoe(false);
            w.set_brse(false);
        });
    }

    /// All Tx and Rx elements carry 8 byte data fields.
    #[inline]
    fn set_element_sizes(&mut self) {
        let regs = &self.state.regs;
        regs.txesc().write(|w| w.set_tbds(DATA_FIELD_8_BYTES));
        regs.rxesc().write(|w| {
            w.set_f0ds(DATA_FIELD_8_BYTES);
            w.set_f1ds(DATA_FIELD_8_BYTES);
            w.set_rbds(DATA_FIELD_8_BYTES);
        });
    }

    #[inline]
    fn set_buffer_layout(&mut self, layout: &MessageRamLayout) {
        let regs = &self.state.regs;
        // Dedicated buffers only, transmitted in the order submitted
        regs.txbc().write(|w| {
            w.set_tbsa(layout.tx_buffers_addr);
            w.set_ndtb(layout.tx_buffers_len);
            w.set_tfqs(0);
            w.set_tfqm(false);
        });
        regs.rxf0c().write(|w| {
            w.set_f0sa(layout.rx_fifo0_addr);
            w.set_f0s(layout.rx_fifo0_len);
        });
    }

    #[inline]
    fn set_global_filter(&mut self, filter: GlobalFilter) {
        self.state.regs.gfc().write(|w| {
            w.set_anfs(filter.handle_standard_frames as u8);
            w.set_anfe(filter.handle_extended_frames as u8);
            w.set_rrfs(filter.reject_remote_standard_frames);
            w.set_rrfe(filter.reject_remote_extended_frames);
        });
    }

    #[inline]
    fn set_filter_lists(&mut self, layout: &MessageRamLayout) {
        let regs = &self.state.regs;
        regs.sidfc().write(|w| {
            w.set_flssa(layout.standard_filters_addr);
            w.set_lss(layout.standard_filters_len);
        });
        regs.xidfc().write(|w| {
            w.set_flesa(layout.extended_filters_addr);
            w.set_lse(layout.extended_filters_len);
        });
    }

    #[inline]
    fn set_nominal_bit_timing(&mut self, btr: NominalBitTiming) {
        self.state.regs.nbtp().write_value(Nbtp::from(btr));
    }
}

impl<B: Registers + Sync + 'static, P: Platform> Can<B, P, RunningMode> {
    /// Halts the core and returns pins and clock. A core that does not acknowledge the halt is
    /// powered down regardless.
    pub fn end(mut self) -> Can<B, P, PoweredDownMode> {
        interrupt::unregister(self.instance, self.state);
        let regs = &self.state.regs;
        regs.ie().write_value(Ie::new());
        regs.ile().write_value(Ile::new());
        if let Err(_e) = self.request_init() {
            #[cfg(feature = "defmt")]
            defmt::warn!("{} did not halt: {}", self.instance, _e);
        }
        self.release();
        #[cfg(feature = "defmt")]
        defmt::debug!("{} powered down", self.instance);
        self.into_mode()
    }

    /// Requests clock stop, waits for the acknowledge and disables the clock channel.
    pub fn sleep(mut self) -> Result<Can<B, P, SleepMode>, (Error, Can<B, P, RunningMode>)> {
        if let Err(e) = self.set_power_down_mode(true) {
            self.state.regs.cccr().modify(|w| w.set_csr(false));
            return Err((e, self));
        }
        self.platform.set_clock(self.instance, false);
        Ok(self.into_mode())
    }

    /// Registers or removes the receive callback and enables the new message interrupt
    /// accordingly. Without a callback frames stay in the FIFO until polled.
    pub fn on_receive(&mut self, callback: Option<ReceiveCallback>) {
        self.state.set_callback(callback);
        self.state
            .regs
            .ie()
            .modify(|w| w.set_rf0ne(callback.is_some()));
    }

    #[inline]
    pub fn operating_mode(&self) -> OperatingMode {
        self.operating_mode
    }

    /// Bus monitoring: receive only, never drive the bus.
    pub fn observe(&mut self) -> Result<(), Error> {
        self.switch_operating_mode(OperatingMode::BusMonitoring)
    }

    /// External loopback: transmitted frames are received back and still driven on TX.
    pub fn loopback(&mut self) -> Result<(), Error> {
        self.switch_operating_mode(OperatingMode::ExternalLoopback)
    }

    /// Internal loopback: transmitted frames are received back, the bus is left alone.
    pub fn internal_loopback(&mut self) -> Result<(), Error> {
        self.switch_operating_mode(OperatingMode::InternalLoopback)
    }

    /// Leaves any test or monitoring mode.
    pub fn normal(&mut self) -> Result<(), Error> {
        self.switch_operating_mode(OperatingMode::Normal)
    }

    fn switch_operating_mode(&mut self, mode: OperatingMode) -> Result<(), Error> {
        self.reconfigure(|can| can.set_loopback_mode(mode))?;
        self.operating_mode = mode;
        #[cfg(feature = "defmt")]
        defmt::debug!("{} now in {}", self.instance, mode);
        Ok(())
    }

    /// Accepts standard frames whose identifier matches `id` in every bit set in `mask`, and
    /// rejects all extended frames.
    pub fn filter(&mut self, id: u16, mask: u16) -> Result<(), Error> {
        if id > MAX_STANDARD_ID || mask > MAX_STANDARD_ID {
            return Err(Error::InvalidFilter);
        }
        self.install_filters(
            (FilterConfiguration::StoreInFifo0, id, mask),
            (FilterConfiguration::Reject, 0, 0),
        );
        Ok(())
    }

    /// Accepts extended frames whose identifier matches `id` in every bit set in `mask`, and
    /// rejects all standard frames.
    pub fn filter_extended(&mut self, id: u32, mask: u32) -> Result<(), Error> {
        if id > MAX_EXTENDED_ID || mask > MAX_EXTENDED_ID {
            return Err(Error::InvalidFilter);
        }
        self.install_filters(
            (FilterConfiguration::Reject, 0, 0),
            (FilterConfiguration::StoreInFifo0, id, mask),
        );
        Ok(())
    }

    /// Last error code, activity and error state flags.
    #[inline]
    pub fn protocol_status(&self) -> Psr {
        self.state.regs.psr().read()
    }

    /// Transmit and receive error counters.
    #[inline]
    pub fn error_counters(&self) -> Ecr {
        self.state.regs.ecr().read()
    }

    #[inline]
    pub fn is_transmit_pending(&self) -> bool {
        self.state.regs.txbrp().read().trp() & 1 != 0
    }

    #[inline]
    pub fn rx_fill_level(&self) -> u8 {
        self.state.rx_fill_level()
    }
}

impl<B: Registers + Sync + 'static, P: Platform, M> Can<B, P, M> {
    /// Rewrites the single standard and extended filter elements as classic id/mask filters.
    fn install_filters(
        &mut self,
        standard: (FilterConfiguration, u16, u16),
        extended: (FilterConfiguration, u32, u32),
    ) {
        let ram = self.state.ram;
        let (sfec, sfid1, sfid2) = standard;
        ram.standard_filters[0].set(FilterType::Classic, sfec, sfid1, sfid2);
        let (efec, efid1, efid2) = extended;
        ram.extended_filters[0].set(FilterType::Classic, efec, efid1, efid2);
        memory_barrier();
    }
}

impl<B: Registers + Sync + 'static, P: Platform> Can<B, P, SleepMode> {
    /// Re-enables the clock, withdraws the clock stop request and resumes operation.
    pub fn wakeup(mut self) -> Result<Can<B, P, RunningMode>, (Error, Can<B, P, SleepMode>)> {
        self.platform.set_clock(self.instance, true);
        clock_domain_sync_delay();
        let res = self
            .set_power_down_mode(false)
            .and_then(|()| self.leave_init_mode());
        match res {
            Ok(()) => Ok(self.into_mode()),
            Err(e) => {
                self.platform.set_clock(self.instance, false);
                Err((e, self))
            }
        }
    }

    /// Powers down without waking the core first.
    pub fn end(mut self) -> Can<B, P, PoweredDownMode> {
        self.release();
        self.into_mode()
    }
}
