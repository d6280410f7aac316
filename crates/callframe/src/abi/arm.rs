//! The 32-bit ARM (Darwin flavour) calling convention.
//!
//! Integer arguments travel in r0-r3 and then on the stack in 4-byte
//! slots; 64-bit integers occupy a register pair. r7 is the frame
//! pointer. The saved return address lives in lr until the prologue
//! spills it.

use tracing::trace;

use super::Abi;
use crate::arch::ByteOrder;
use crate::plan::{RegisterLocation, UnwindPlan, UnwindRow};
use crate::registers::arm::{ARM_REGISTERS, DWARF_LR, DWARF_PC, DWARF_R7, DWARF_SP};
use crate::registers::{
    RegisterInfo, RegisterKind, RegisterRole, RegisterValue, Scalar, register_with_role,
};
use crate::target::{RegisterContext, ValueClass, ValueDescriptor};
use crate::{Error, Result};

/// CPSR T bit: set when executing Thumb instructions.
const CPSR_T: u64 = 1 << 5;
/// CPSR IT state bits; stale IT state corrupts conditional execution.
const CPSR_IT_MASK: u64 = 0x0600_FC00;

/// Number of integer argument registers (r0-r3).
const ARGUMENT_REGISTERS: usize = 4;
const WORD_SIZE: usize = 4;

#[derive(Debug)]
pub struct ArmAbi;

fn role_register(role: RegisterRole) -> Result<&'static RegisterInfo> {
    register_with_role(&ARM_REGISTERS, role)
        .ok_or_else(|| Error::UnresolvedRegister(format!("{role:?}")))
}

fn argument_register(slot: usize) -> Result<&'static RegisterInfo> {
    let slot = u8::try_from(slot).map_err(|_| Error::UnresolvedRegister(format!("arg{slot}")))?;
    role_register(RegisterRole::Argument(slot))
}

fn write_word(thread: &mut dyn RegisterContext, address: u64, value: u32) -> Result<()> {
    let bytes = match thread.byte_order() {
        ByteOrder::Little => value.to_le_bytes(),
        ByteOrder::Big => value.to_be_bytes(),
    };
    thread.write_memory(address, &bytes)
}

/// Mask `raw` to `bit_width` and wrap it as a [`Scalar`], sign-extending
/// when the descriptor is a signed integer.
fn scalar_from_raw(raw: u64, bit_width: u32, is_signed: bool) -> Scalar {
    let byte_size = bit_width.div_ceil(8) as usize;
    let value = RegisterValue::new(raw, byte_size);
    if is_signed {
        Scalar::Signed(value.sign_extended(bit_width))
    } else {
        Scalar::Unsigned(value.as_u64())
    }
}

impl Abi for ArmAbi {
    fn name(&self) -> &'static str {
        "abi.arm"
    }

    fn register_table(&self) -> &'static [RegisterInfo] {
        &ARM_REGISTERS
    }

    // No red zone below sp on ARM.
    fn red_zone_size(&self) -> usize {
        0
    }

    fn is_register_volatile(&self, reg: &RegisterInfo) -> bool {
        match reg.dwarf {
            // r0-r3, r9, r12 and sp.
            0..=3 | 9 | 12 | 13 => true,
            // s0-s15 overlay d0-d7.
            64..=79 => true,
            // d0-d7 and d16-d31; d8-d15 are callee-saved.
            256..=263 | 272..=287 => true,
            _ => false,
        }
    }

    fn function_entry_unwind_plan(&self) -> UnwindPlan {
        let mut row = UnwindRow::new(DWARF_SP, 0);
        row.set_register_location(DWARF_PC, RegisterLocation::InRegister(DWARF_LR), true);

        let mut plan = UnwindPlan::new(RegisterKind::Dwarf);
        plan.append_row(row);
        plan.set_source_name("arm at-func-entry default");
        plan
    }

    fn default_unwind_plan(&self) -> UnwindPlan {
        // Assumes the push {r7, lr}; mov r7, sp prologue already ran.
        let mut row = UnwindRow::new(DWARF_R7, 8);
        row.set_register_location(DWARF_R7, RegisterLocation::AtCfaPlusOffset(-8), true);
        row.set_register_location(DWARF_PC, RegisterLocation::AtCfaPlusOffset(-4), true);

        let mut plan = UnwindPlan::new(RegisterKind::Dwarf);
        plan.append_row(row);
        plan.set_source_name("arm default unwind plan");
        plan
    }

    fn prepare_trivial_call(
        &self,
        thread: &mut dyn RegisterContext,
        stack_pointer: u64,
        function_address: u64,
        return_address: u64,
        args: &[u64],
    ) -> Result<()> {
        trace!(
            function_address,
            return_address,
            args = args.len(),
            "preparing trivial call"
        );
        for (slot, value) in args.iter().take(ARGUMENT_REGISTERS).enumerate() {
            let reg = argument_register(slot)?;
            thread.write_register(reg, RegisterValue::new(*value, WORD_SIZE))?;
        }

        let mut sp = stack_pointer;
        if args.len() > ARGUMENT_REGISTERS {
            let stack_args = &args[ARGUMENT_REGISTERS..];
            sp = sp.wrapping_sub((WORD_SIZE * stack_args.len()) as u64);
            // Keep sp 8-byte aligned at the call boundary.
            sp &= !7;
            for (idx, value) in stack_args.iter().enumerate() {
                let address = sp + (WORD_SIZE * idx) as u64;
                let word = u32::try_from(*value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
                write_word(thread, address, word)?;
            }
        }
        thread.write_register(
            role_register(RegisterRole::StackPointer)?,
            RegisterValue::new(sp, WORD_SIZE),
        )?;
        thread.write_register(
            role_register(RegisterRole::ReturnAddress)?,
            RegisterValue::new(return_address, WORD_SIZE),
        )?;

        // Bit 0 of the target address selects the instruction set.
        let flags_reg = role_register(RegisterRole::Flags)?;
        let cpsr = thread.read_register(flags_reg)?.as_u64();
        let mut new_cpsr = cpsr & !CPSR_IT_MASK;
        if function_address & 1 == 0 {
            new_cpsr &= !CPSR_T;
        } else {
            new_cpsr |= CPSR_T;
        }
        if new_cpsr != cpsr {
            thread.write_register(flags_reg, RegisterValue::new(new_cpsr, WORD_SIZE))?;
        }
        thread.write_register(
            role_register(RegisterRole::ProgramCounter)?,
            RegisterValue::new(function_address & !1, WORD_SIZE),
        )?;
        Ok(())
    }

    fn argument_values(
        &self,
        thread: &mut dyn RegisterContext,
        descriptors: &[ValueDescriptor],
    ) -> Result<Vec<Scalar>> {
        let sp = thread
            .read_register(role_register(RegisterRole::StackPointer)?)?
            .as_u64();

        // Arguments fill r0-r3 first, then memory starting at sp. The
        // stack cursor advances by each value's rounded-up byte size.
        let mut reg_slot = 0usize;
        let mut stack_address = sp;
        let mut values = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let is_signed = match descriptor.class {
                ValueClass::Integer { is_signed } => is_signed,
                ValueClass::Pointer => false,
                ValueClass::Float | ValueClass::Aggregate => {
                    return Err(Error::UnsupportedValueEncoding(
                        "only integer and pointer arguments can be read back".into(),
                    ));
                }
            };
            let bit_width = descriptor.bit_width;
            if bit_width == 0 || bit_width > 64 {
                return Err(Error::UnsupportedValueEncoding(format!(
                    "{bit_width}-bit argument"
                )));
            }
            let byte_size = descriptor.byte_size();
            let slots_needed = if byte_size > WORD_SIZE { 2 } else { 1 };

            if reg_slot + slots_needed <= ARGUMENT_REGISTERS {
                let low = thread.read_register(argument_register(reg_slot)?)?.as_u64();
                let raw = if slots_needed == 2 {
                    let high = thread
                        .read_register(argument_register(reg_slot + 1)?)?
                        .as_u64();
                    (low & 0xFFFF_FFFF) | (high << 32)
                } else {
                    low
                };
                values.push(scalar_from_raw(raw, bit_width, is_signed));
                reg_slot += slots_needed;
            } else if reg_slot >= ARGUMENT_REGISTERS {
                values.push(thread.read_scalar_from_memory(stack_address, byte_size, is_signed)?);
                stack_address += byte_size as u64;
            } else {
                return Err(Error::UnsupportedValueEncoding(
                    "64-bit argument split across registers and the stack".into(),
                ));
            }
        }
        Ok(values)
    }

    fn return_value(
        &self,
        thread: &mut dyn RegisterContext,
        descriptor: &ValueDescriptor,
    ) -> Result<Scalar> {
        let (bit_width, is_signed) = match descriptor.class {
            ValueClass::Integer { is_signed } => (descriptor.bit_width, is_signed),
            ValueClass::Pointer => (32, false),
            ValueClass::Float | ValueClass::Aggregate => {
                return Err(Error::UnsupportedValueEncoding(
                    "only integer and pointer return values can be read back".into(),
                ));
            }
        };

        // r0 doubles as the low return register.
        let low_reg = argument_register(0)?;
        let low = thread.read_register(low_reg)?.as_u64();
        let raw = match bit_width {
            1..=32 => low,
            33..=64 => {
                let high_reg = argument_register(1)?;
                // The 64-bit convention requires an adjacent pair.
                if high_reg.dwarf != low_reg.dwarf + 1 {
                    return Err(Error::UnresolvedRegister(format!(
                        "{}:{} is not an adjacent return pair",
                        high_reg.name, low_reg.name
                    )));
                }
                let high = thread.read_register(high_reg)?.as_u64();
                (low & 0xFFFF_FFFF) | (high << 32)
            }
            _ => {
                return Err(Error::UnsupportedValueEncoding(format!(
                    "{bit_width}-bit return value"
                )));
            }
        };
        Ok(scalar_from_raw(raw, bit_width, is_signed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::MockThread;

    fn thread() -> MockThread {
        MockThread::new(&ARM_REGISTERS)
    }

    #[test]
    fn test_entry_plan_shape() {
        let plan = ArmAbi.function_entry_unwind_plan();
        assert_eq!(plan.register_kind(), RegisterKind::Dwarf);
        let row = plan.row_for_offset(0).unwrap();
        assert_eq!(row.cfa_register(), DWARF_SP);
        assert_eq!(row.cfa_offset(), 0);
        assert_eq!(
            row.register_location(DWARF_PC),
            Some(RegisterLocation::InRegister(DWARF_LR))
        );
        assert!(!plan.is_valid_at_all_instruction_locations());
    }

    #[test]
    fn test_default_plan_shape() {
        let plan = ArmAbi.default_unwind_plan();
        let row = plan.row_for_offset(0).unwrap();
        assert_eq!(row.cfa_register(), DWARF_R7);
        assert_eq!(row.cfa_offset(), 8);
        assert_eq!(
            row.register_location(DWARF_R7),
            Some(RegisterLocation::AtCfaPlusOffset(-8))
        );
        assert_eq!(
            row.register_location(DWARF_PC),
            Some(RegisterLocation::AtCfaPlusOffset(-4))
        );
        assert!(!plan.is_valid_at_all_instruction_locations());
    }

    #[test]
    fn test_volatility() {
        let named = |name: &str| ARM_REGISTERS.iter().find(|r| r.name == name).unwrap();
        for name in ["r0", "r3", "r9", "r12", "sp", "d0", "d7", "d16", "d31", "s15"] {
            assert!(ArmAbi.is_register_volatile(named(name)), "{name}");
        }
        for name in ["r4", "r7", "r8", "r10", "r11", "lr", "pc", "d8", "d15", "s16"] {
            assert!(!ArmAbi.is_register_volatile(named(name)), "{name}");
        }
    }

    #[test]
    fn test_trivial_call_thumb_target() {
        let mut t = thread();
        t.set_register("cpsr", 0x0600_FC00);
        ArmAbi
            .prepare_trivial_call(&mut t, 0x8000_0000, 0x4001, 0x3000, &[7, 8])
            .unwrap();
        assert_eq!(t.register("r0"), 7);
        assert_eq!(t.register("r1"), 8);
        assert_eq!(t.register("lr"), 0x3000);
        assert_eq!(t.register("sp"), 0x8000_0000);
        assert_eq!(t.register("pc"), 0x4000);
        // T bit set, IT state cleared.
        assert_eq!(t.register("cpsr"), CPSR_T);
    }

    #[test]
    fn test_trivial_call_spills_fifth_argument() {
        let mut t = thread();
        ArmAbi
            .prepare_trivial_call(&mut t, 0x8000_0004, 0x4000, 0x3000, &[1, 2, 3, 4, 5, 6])
            .unwrap();
        let sp = t.register("sp");
        // Two stack words, realigned down to 8 bytes.
        assert_eq!(sp, 0x7FFF_FFF8);
        assert_eq!(t.memory_word(sp), 5);
        assert_eq!(t.memory_word(sp + 4), 6);
    }

    #[test]
    fn test_return_value_sign_extension() {
        let mut t = thread();
        t.set_register("r0", 0xFFFF_FF80);
        let v = ArmAbi
            .return_value(&mut t, &ValueDescriptor::signed_integer(8))
            .unwrap();
        assert_eq!(v, Scalar::Signed(-128));

        let v = ArmAbi
            .return_value(&mut t, &ValueDescriptor::unsigned_integer(8))
            .unwrap();
        assert_eq!(v, Scalar::Unsigned(0x80));
    }

    #[test]
    fn test_return_value_pair() {
        let mut t = thread();
        t.set_register("r0", 0x9ABC_DEF0);
        t.set_register("r1", 0x1234_5678);
        let v = ArmAbi
            .return_value(&mut t, &ValueDescriptor::unsigned_integer(64))
            .unwrap();
        assert_eq!(v, Scalar::Unsigned(0x1234_5678_9ABC_DEF0));
    }

    #[test]
    fn test_argument_values_mixed_widths() {
        let mut t = thread();
        t.set_register("r0", 0xF0);
        t.set_register("r1", 0xDEAD_BEEF);
        t.set_register("r2", 0x1111_1111);
        t.set_register("r3", 0x2222_2222);
        t.set_register("sp", 0x7FFF_FFF0);
        t.set_memory_word(0x7FFF_FFF0, 42);

        let descriptors = [
            ValueDescriptor::signed_integer(8),
            ValueDescriptor::unsigned_integer(32),
            ValueDescriptor::unsigned_integer(64),
            ValueDescriptor::unsigned_integer(32),
        ];
        let values = ArmAbi.argument_values(&mut t, &descriptors).unwrap();
        assert_eq!(
            values,
            vec![
                Scalar::Signed(-16),
                Scalar::Unsigned(0xDEAD_BEEF),
                Scalar::Unsigned(0x2222_2222_1111_1111),
                Scalar::Unsigned(42),
            ]
        );
    }

    #[test]
    fn test_argument_pair_straddling_boundary_fails() {
        let mut t = thread();
        let descriptors = [
            ValueDescriptor::unsigned_integer(32),
            ValueDescriptor::unsigned_integer(32),
            ValueDescriptor::unsigned_integer(32),
            ValueDescriptor::unsigned_integer(64),
        ];
        let err = ArmAbi.argument_values(&mut t, &descriptors).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueEncoding(_)));
    }

    #[test]
    fn test_float_return_unsupported() {
        let mut t = thread();
        let descriptor = ValueDescriptor {
            bit_width: 32,
            class: ValueClass::Float,
        };
        let err = ArmAbi.return_value(&mut t, &descriptor).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueEncoding(_)));
    }
}
