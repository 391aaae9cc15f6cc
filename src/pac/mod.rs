//! Register-level view of the M_CAN peripheral.
//!
//! The driver never touches peripheral memory directly. Every register access goes through a
//! [`Registers`] implementation: [`Mmio`] on real hardware, or a simulated register bank in tests.

pub mod common;
pub mod message_ram;
pub mod registers;

/// Word-wide access to an M_CAN register block, addressed by byte offset from its base.
pub trait Registers {
    fn read(&self, offset: usize) -> u32;
    fn write(&self, offset: usize, value: u32);
}

impl<T: Registers + ?Sized> Registers for &T {
    #[inline]
    fn read(&self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    #[inline]
    fn write(&self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }
}

/// Memory mapped register block of one CAN peripheral.
#[derive(Copy, Clone)]
pub struct Mmio {
    base: *mut u32,
}

// Register accesses are single volatile word operations.
unsafe impl Send for Mmio {}
unsafe impl Sync for Mmio {}

impl Mmio {
    /// # Safety
    /// `ptr` must point to an M_CAN register block that stays mapped for the lifetime of this
    /// value, and no other driver may use the same block.
    #[inline]
    pub const unsafe fn from_ptr(ptr: *mut ()) -> Self {
        Self {
            base: ptr as *mut u32,
        }
    }

    /// # Safety
    /// See [`Mmio::from_ptr`].
    #[inline]
    pub const unsafe fn can0() -> Self {
        unsafe { Self::from_ptr(CAN0_REGISTER_BLOCK_ADDR) }
    }

    /// # Safety
    /// See [`Mmio::from_ptr`].
    #[inline]
    pub const unsafe fn can1() -> Self {
        unsafe { Self::from_ptr(CAN1_REGISTER_BLOCK_ADDR) }
    }
}

impl Registers for Mmio {
    #[inline]
    fn read(&self, offset: usize) -> u32 {
        unsafe { core::ptr::read_volatile(self.base.byte_add(offset)) }
    }

    #[inline]
    fn write(&self, offset: usize, value: u32) {
        unsafe { core::ptr::write_volatile(self.base.byte_add(offset), value) }
    }
}

pub(crate) mod mapping {
    pub(crate) const CAN0_REGISTER_BLOCK_ADDR: *mut () = 0x4200_0000 as *mut ();
    pub(crate) const CAN1_REGISTER_BLOCK_ADDR: *mut () = 0x4200_0400 as *mut ();
    /// Message RAM start addresses are the low 16 bits of an address in this 64 KiB window.
    pub(crate) const SYSTEM_RAM: usize = 0x2000_0000;
}

pub(crate) use mapping::*;
