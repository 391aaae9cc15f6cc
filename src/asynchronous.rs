use crate::can::{Can, Platform, RunningMode};
use crate::interrupt::State;
use crate::pac::Registers;
use core::future::poll_fn;
use core::task::Poll;

/// Puts IE.RF0NE back to what the receive callback needs once a waiting receive ends, whether
/// it resolved or was dropped.
struct RestoreNewMessageInterrupt<'a, B: Registers> {
    state: &'a State<B>,
}

impl<B: Registers> Drop for RestoreNewMessageInterrupt<'_, B> {
    fn drop(&mut self) {
        let keep_enabled = self.state.callback().is_some();
        self.state.regs.ie().modify(|w| w.set_rf0ne(keep_enabled));
    }
}

impl<B: Registers + Sync + 'static, P: Platform> Can<B, P, RunningMode> {
    /// Waits for the next frame and drains it into the receive buffer. Resolves to its DLC.
    ///
    /// The new message interrupt is enabled while waiting. A registered receive callback drains
    /// the FIFO from the interrupt first, so use one or the other.
    pub async fn receive_async(&mut self) -> u8 {
        let state = self.state;
        let _restore = RestoreNewMessageInterrupt { state };
        poll_fn(|cx| {
            state.rx_waker.register(cx.waker());
            if let Some(dlc) = state.parse_packet() {
                return Poll::Ready(dlc);
            }
            state.regs.ie().modify(|w| w.set_rf0ne(true));
            Poll::Pending
        })
        .await
    }
}
