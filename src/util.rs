use crate::Error;

/// Spins while `f` returns true, giving up after `timeout_iterations` polls.
#[inline]
pub(crate) fn checked_wait<F: Fn() -> bool>(f: F, timeout_iterations: u32) -> Result<(), Error> {
    let mut elapsed = 0;
    while f() {
        elapsed += 1;
        if elapsed >= timeout_iterations {
            return Err(Error::Timeout);
        }
    }
    Ok(())
}

/// Division rounded to the nearest integer, halves away from zero.
#[inline]
pub(crate) const fn div_round(n: u64, d: u64) -> u64 {
    (n + d / 2) / d
}

#[inline]
pub(crate) const fn div_round_up(n: u64, d: u64) -> u64 {
    n.div_ceil(d)
}

// Peripheral clock domain needs a few cycles before register writes land
const CLOCK_DOMAIN_SYNCHRONIZATION_DELAY: u32 = 100;

#[inline]
pub(crate) fn clock_domain_sync_delay() {
    #[cfg(target_arch = "arm")]
    {
        cortex_m::asm::delay(CLOCK_DOMAIN_SYNCHRONIZATION_DELAY);
        // Drain pending writes to the peripheral bus
        cortex_m::asm::dsb();
    }
    #[cfg(not(target_arch = "arm"))]
    for _ in 0..CLOCK_DOMAIN_SYNCHRONIZATION_DELAY {
        core::hint::spin_loop();
    }
}

/// Orders message RAM accesses against the register access that hands them to the peripheral.
#[inline]
pub(crate) fn memory_barrier() {
    #[cfg(target_arch = "arm")]
    cortex_m::asm::dmb();
    #[cfg(not(target_arch = "arm"))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}
