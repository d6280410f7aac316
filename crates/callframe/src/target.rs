//! Interfaces to the live target.
//!
//! The ABI's call-setup and value-extraction paths run against a real (or
//! recorded) thread; this module defines what they need from the
//! process-control layer and from the symbol layer, without depending on
//! either.

use crate::arch::ByteOrder;
use crate::registers::{RegisterInfo, RegisterValue, Scalar};
use crate::{Error, Result};

/// Register and memory access for one thread of the target.
///
/// Implemented by the debugger's process-control layer; the
/// `test-harness` feature ships a mock for tests.
pub trait RegisterContext {
    fn read_register(&mut self, reg: &RegisterInfo) -> Result<RegisterValue>;

    fn write_register(&mut self, reg: &RegisterInfo, value: RegisterValue) -> Result<()>;

    fn read_memory(&mut self, address: u64, buf: &mut [u8]) -> Result<()>;

    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<()>;

    fn address_byte_size(&self) -> usize;

    fn byte_order(&self) -> ByteOrder;

    /// Read an integer of `byte_size` bytes from target memory, applying
    /// the target's byte order and optional sign extension.
    fn read_scalar_from_memory(
        &mut self,
        address: u64,
        byte_size: usize,
        is_signed: bool,
    ) -> Result<Scalar> {
        if byte_size == 0 || byte_size > 8 {
            return Err(Error::MemoryAccess { address });
        }
        let mut buf = [0u8; 8];
        self.read_memory(address, &mut buf[..byte_size])?;
        let mut raw = 0u64;
        match self.byte_order() {
            ByteOrder::Little => {
                for (i, byte) in buf[..byte_size].iter().enumerate() {
                    raw |= u64::from(*byte) << (i * 8);
                }
            }
            ByteOrder::Big => {
                for byte in &buf[..byte_size] {
                    raw = raw << 8 | u64::from(*byte);
                }
            }
        }
        if is_signed {
            let bit_width = u32::try_from(byte_size * 8).unwrap_or(64);
            Ok(Scalar::Signed(
                RegisterValue::new(raw, byte_size).sign_extended(bit_width),
            ))
        } else {
            Ok(Scalar::Unsigned(raw))
        }
    }
}

/// How a value to be marshalled is classified by the symbol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Integer { is_signed: bool },
    Pointer,
    /// Floating-point values are not modelled by the integer ABI paths.
    Float,
    /// Structs, unions, vectors.
    Aggregate,
}

/// Bit width and class of one argument or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueDescriptor {
    pub bit_width: u32,
    pub class: ValueClass,
}

impl ValueDescriptor {
    #[must_use]
    pub const fn signed_integer(bit_width: u32) -> Self {
        Self {
            bit_width,
            class: ValueClass::Integer { is_signed: true },
        }
    }

    #[must_use]
    pub const fn unsigned_integer(bit_width: u32) -> Self {
        Self {
            bit_width,
            class: ValueClass::Integer { is_signed: false },
        }
    }

    /// Byte size, rounded up from the bit width.
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        self.bit_width.div_ceil(8) as usize
    }

    #[must_use]
    pub const fn is_signed(&self) -> bool {
        matches!(self.class, ValueClass::Integer { is_signed: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_rounds_up() {
        assert_eq!(ValueDescriptor::unsigned_integer(1).byte_size(), 1);
        assert_eq!(ValueDescriptor::unsigned_integer(8).byte_size(), 1);
        assert_eq!(ValueDescriptor::unsigned_integer(9).byte_size(), 2);
        assert_eq!(ValueDescriptor::signed_integer(64).byte_size(), 8);
    }
}
