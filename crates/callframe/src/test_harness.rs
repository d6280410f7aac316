//! Test harness for exercising ABI and unwind code without a live target.
//!
//! [`MockThread`] is an in-memory [`RegisterContext`]: registers start at
//! zero, memory starts empty and reads back as zero, and every write is
//! observable afterwards. It is only available when running tests or when
//! the `test-harness` feature is enabled.
//!
//! # Example
//!
//! ```rust
//! use callframe::abi::abi_for_arch;
//! use callframe::arch::ArchSpec;
//! use callframe::registers::arm::ARM_REGISTERS;
//! use callframe::test_harness::MockThread;
//!
//! let arch = ArchSpec::parse("arm-apple-darwin").unwrap();
//! let abi = abi_for_arch(&arch).unwrap();
//! let mut thread = MockThread::new(&ARM_REGISTERS);
//! abi.prepare_trivial_call(&mut thread, 0x8000_0000, 0x4000, 0x3000, &[1, 2])
//!     .unwrap();
//! assert_eq!(thread.register("r0"), 1);
//! assert_eq!(thread.register("pc"), 0x4000);
//! ```

#![allow(clippy::must_use_candidate, clippy::missing_panics_doc)]

use std::collections::HashMap;

use crate::arch::ByteOrder;
use crate::registers::{RegisterInfo, RegisterValue};
use crate::target::RegisterContext;
use crate::{Error, Result};

/// A fake thread backed by hash maps. Little-endian, 4-byte addresses.
pub struct MockThread {
    table: &'static [RegisterInfo],
    registers: HashMap<&'static str, u64>,
    memory: HashMap<u64, u8>,
}

impl MockThread {
    pub fn new(table: &'static [RegisterInfo]) -> Self {
        Self {
            table,
            registers: HashMap::new(),
            memory: HashMap::new(),
        }
    }

    fn lookup(&self, name: &str) -> Result<&'static RegisterInfo> {
        self.table
            .iter()
            .find(|info| info.name == name || info.alt_name == Some(name))
            .ok_or_else(|| Error::RegisterAccess(name.to_string()))
    }

    /// Seed a register by name before the code under test runs.
    pub fn set_register(&mut self, name: &str, value: u64) {
        let info = self.lookup(name).expect("unknown register name");
        self.registers
            .insert(info.name, RegisterValue::new(value, info.byte_size).as_u64());
    }

    /// Current value of a register, zero if never written.
    pub fn register(&self, name: &str) -> u64 {
        let info = self.lookup(name).expect("unknown register name");
        self.registers.get(info.name).copied().unwrap_or(0)
    }

    /// Store a little-endian 32-bit word at `address`.
    pub fn set_memory_word(&mut self, address: u64, value: u32) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.memory.insert(address + i as u64, byte);
        }
    }

    /// Read back a little-endian 32-bit word; unwritten bytes are zero.
    pub fn memory_word(&self, address: u64) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.memory.get(&(address + i as u64)).copied().unwrap_or(0);
        }
        u32::from_le_bytes(bytes)
    }
}

impl RegisterContext for MockThread {
    fn read_register(&mut self, reg: &RegisterInfo) -> Result<RegisterValue> {
        let value = self.registers.get(reg.name).copied().unwrap_or(0);
        Ok(RegisterValue::new(value, reg.byte_size))
    }

    fn write_register(&mut self, reg: &RegisterInfo, value: RegisterValue) -> Result<()> {
        let info = self.lookup(reg.name)?;
        self.registers.insert(info.name, value.as_u64());
        Ok(())
    }

    fn read_memory(&mut self, address: u64, buf: &mut [u8]) -> Result<()> {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.memory.get(&(address + i as u64)).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<()> {
        for (i, byte) in data.iter().enumerate() {
            self.memory.insert(address + i as u64, *byte);
        }
        Ok(())
    }

    fn address_byte_size(&self) -> usize {
        4
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::Little
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::arm::ARM_REGISTERS;

    #[test]
    fn test_registers_default_to_zero() {
        let mut t = MockThread::new(&ARM_REGISTERS);
        let r4 = ARM_REGISTERS.iter().find(|r| r.name == "r4").unwrap();
        assert_eq!(t.read_register(r4).unwrap().as_u64(), 0);
    }

    #[test]
    fn test_alt_name_resolves() {
        let mut t = MockThread::new(&ARM_REGISTERS);
        t.set_register("r13", 0x1000);
        assert_eq!(t.register("sp"), 0x1000);
    }

    #[test]
    fn test_memory_round_trip() {
        let mut t = MockThread::new(&ARM_REGISTERS);
        t.set_memory_word(0x100, 0xDEAD_BEEF);
        assert_eq!(t.memory_word(0x100), 0xDEAD_BEEF);

        let mut buf = [0u8; 2];
        t.read_memory(0x100, &mut buf).unwrap();
        assert_eq!(buf, [0xEF, 0xBE]);
    }

    #[test]
    fn test_scalar_read_sign_extends() {
        let mut t = MockThread::new(&ARM_REGISTERS);
        t.set_memory_word(0x200, 0xFFFF_FFFE);
        let v = t.read_scalar_from_memory(0x200, 4, true).unwrap();
        assert_eq!(v.as_i64(), -2);
    }
}
