use crate::pac::Registers;
use core::marker::PhantomData;

/// Typed handle to one register of a [`Registers`] bank.
pub struct Reg<'a, B, T> {
    bus: &'a B,
    offset: usize,
    _phantom: PhantomData<T>,
}

impl<'a, B: Registers, T> Reg<'a, B, T>
where
    T: Copy + From<u32>,
    u32: From<T>,
{
    #[inline]
    pub(crate) const fn new(bus: &'a B, offset: usize) -> Self {
        Self {
            bus,
            offset,
            _phantom: PhantomData,
        }
    }

    #[inline]
    pub fn read(&self) -> T {
        T::from(self.bus.read(self.offset))
    }

    #[inline]
    pub fn write_value(&self, value: T) {
        self.bus.write(self.offset, u32::from(value))
    }

    /// Writes a value built from all-zero bits.
    #[inline]
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut value = T::from(0);
        let r = f(&mut value);
        self.write_value(value);
        r
    }

    #[inline]
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut value = self.read();
        let r = f(&mut value);
        self.write_value(value);
        r
    }
}
