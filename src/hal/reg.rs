//! Register access
//!
//! [`RegisterBlock`] is the single seam between the drivers and the
//! hardware. A block is addressed by byte offset from its base, and every
//! access is a full 32-bit word, which is what the STM32F4 peripherals
//! require.
//!
//! The field helpers below implement the one write discipline used by all
//! configuration setters: mask off the field, then OR in the new value if
//! it is nonzero. Re-applying the same configuration is therefore
//! idempotent and never leaves stale bits behind.

/// A block of 32-bit memory-mapped registers
///
/// Accesses take `&self` because a hardware register is shared, mutable
/// state by nature; exclusive ownership is expressed one level up by the
/// driver handles, whose mutating methods take `&mut self`.
pub trait RegisterBlock {
    /// Read the register at `offset` bytes from the block base
    fn read(&self, offset: usize) -> u32;

    /// Write the register at `offset` bytes from the block base
    fn write(&self, offset: usize, value: u32);

    /// Read-modify-write
    fn modify<F>(&self, offset: usize, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let value = self.read(offset);
        self.write(offset, f(value));
    }

    /// Set the bits of `mask`
    fn set_bits(&self, offset: usize, mask: u32) {
        self.modify(offset, |v| v | mask);
    }

    /// Clear the bits of `mask`
    fn clear_bits(&self, offset: usize, mask: u32) {
        self.modify(offset, |v| v & !mask);
    }

    /// Whether every bit of `mask` is set
    fn is_set(&self, offset: usize, mask: u32) -> bool {
        self.read(offset) & mask == mask
    }
}

impl<T: RegisterBlock + ?Sized> RegisterBlock for &T {
    fn read(&self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        (**self).write(offset, value);
    }
}

/// Mask covering `width` low bits
#[must_use]
pub const fn field_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// Replace the `width`-bit field at `shift` in `reg` with `value`
///
/// The field is always cleared first; `value` is OR-ed in only if it is
/// nonzero. Bits of `value` above `width` are discarded.
#[must_use]
pub const fn write_field(reg: u32, shift: u32, width: u32, value: u32) -> u32 {
    let mask = field_mask(width);
    let cleared = reg & !(mask << shift);
    let value = value & mask;
    if value == 0 {
        cleared
    } else {
        cleared | (value << shift)
    }
}

/// Extract the `width`-bit field at `shift` from `reg`
#[must_use]
pub const fn read_field(reg: u32, shift: u32, width: u32) -> u32 {
    (reg >> shift) & field_mask(width)
}
