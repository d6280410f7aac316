//! Unwind-plan synthesis by instruction emulation.
//!
//! The synthesizer replays a function's prologue through the
//! architecture's [`InstructionEmulator`] against purely synthetic state.
//! It never touches the live target: the stack pointer starts at a
//! recognizable synthetic address, every semantic side effect the emulator
//! reports (push, pop, stack adjust, frame-pointer establishment) updates
//! a working [`UnwindRow`], and a snapshot row is appended whenever an
//! instruction changed the unwind rules. The resulting plan is valid at
//! every instruction boundary, unlike the coarse ABI fallback plans.

// CFA offsets are signed distances between synthetic 32/64-bit addresses.
#![allow(clippy::cast_possible_wrap)]

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::abi::Abi;
use crate::arch::ArchSpec;
use crate::emulate::{
    AccessContext, AddressRange, Disassembler, EmulationDelegate, InstructionEmulator,
    emulator_for_arch,
};
use crate::plan::{RegisterLocation, UnwindPlan, UnwindRow};
use crate::registers::{
    RegisterId, RegisterInfo, RegisterKind, RegisterRole, RegisterValue, register_with_role,
};
use crate::{Error, Result};

/// Synthesizes per-function unwind plans from code bytes.
pub struct InstructionEmulationUnwinder {
    arch: ArchSpec,
    emulator: Box<dyn InstructionEmulator>,
    disassembler: Box<dyn Disassembler>,
}

impl InstructionEmulationUnwinder {
    #[must_use]
    pub fn new(
        arch: ArchSpec,
        emulator: Box<dyn InstructionEmulator>,
        disassembler: Box<dyn Disassembler>,
    ) -> Self {
        Self {
            arch,
            emulator,
            disassembler,
        }
    }

    /// Construct with the emulator and disassembler registered for `arch`.
    pub fn for_arch(arch: &ArchSpec) -> Result<Self> {
        let (emulator, disassembler) = emulator_for_arch(arch)?;
        Ok(Self::new(arch.clone(), emulator, disassembler))
    }

    /// Replay `code` (the bytes of the function covering `range`) and build
    /// an unwind plan in DWARF register numbering.
    ///
    /// An instruction the emulator cannot decode is skipped; the rows
    /// gathered up to that point stay valid.
    pub fn synthesize(
        &mut self,
        range: &AddressRange,
        code: &[u8],
        abi: &dyn Abi,
    ) -> Result<UnwindPlan> {
        let instructions = self.disassembler.disassemble(range, code)?;

        let table = self.emulator.register_table();
        let sp = register_with_role(table, RegisterRole::StackPointer)
            .and_then(|info| info.id(RegisterKind::Dwarf))
            .ok_or_else(|| Error::UnresolvedRegister("stack pointer".into()))?;
        let pc = register_with_role(table, RegisterRole::ProgramCounter)
            .and_then(|info| info.id(RegisterKind::Dwarf))
            .ok_or_else(|| Error::UnresolvedRegister("program counter".into()))?;

        // A power of two no real stack lands on, so stores relative to it
        // are unambiguous.
        let address_bits = self.arch.address_byte_size() * 8;
        let initial_sp = 1u64 << (address_bits - 1);

        // The row in effect before the first instruction comes from the
        // ABI's at-entry rules.
        let entry_plan = abi.function_entry_unwind_plan();
        debug_assert_eq!(entry_plan.register_kind(), RegisterKind::Dwarf);
        let entry_row = entry_plan.row_for_offset(0).cloned().ok_or_else(|| {
            Error::InvalidUnwindPlan("function entry plan has no rows".into())
        })?;

        let mut state = SynthesisState::new(initial_sp, sp, pc, entry_row);
        let mut plan = UnwindPlan::new(RegisterKind::Dwarf);
        plan.append_row(state.curr_row.clone());

        for instruction in &instructions {
            state.row_changed = false;
            if let Err(error) = self.emulator.evaluate(instruction, &mut state) {
                warn!(
                    address = format_args!("{:#x}", instruction.address),
                    %error,
                    "skipping instruction that failed to emulate"
                );
                continue;
            }
            if state.row_changed {
                // The new rules take effect at the next instruction.
                let offset = instruction.address + instruction.byte_size() - range.base;
                state.curr_row.set_offset(offset);
                plan.append_row(state.curr_row.clone());
            }
        }

        debug!(
            base = format_args!("{:#x}", range.base),
            rows = plan.row_count(),
            "synthesized unwind plan"
        );
        plan.set_source_name("unwind plan from instruction emulation");
        plan.set_valid_at_all_instruction_locations(true);
        Ok(plan)
    }

    /// A cheaper plan for the common case. Emulation-based unwinding has
    /// none; the full plan is already per-instruction.
    #[must_use]
    pub fn fast_unwind_plan(&self) -> Option<UnwindPlan> {
        None
    }

    /// Offset of the first instruction past the prologue, when known.
    /// Emulation does not track prologue boundaries.
    #[must_use]
    pub fn first_non_prologue_instruction(&self) -> Option<u64> {
        None
    }
}

/// One key per register, independent of which numbering scheme named it.
fn value_key(reg: &RegisterInfo) -> u64 {
    for kind in [RegisterKind::Dwarf, RegisterKind::Native, RegisterKind::Generic] {
        if let Some(id) = reg.id(kind) {
            return ((kind as u64) << 32) | u64::from(id);
        }
    }
    u64::from(u32::MAX)
}

/// The synthetic machine state one synthesis pass accumulates.
struct SynthesisState {
    initial_sp: u64,
    sp: RegisterId,
    pc: RegisterId,
    /// CFA has been re-anchored from the stack pointer to a frame pointer.
    cfa_is_fp: bool,
    curr_row: UnwindRow,
    row_changed: bool,
    register_values: HashMap<u64, u64>,
    /// Stack addresses holding pushed registers, by DWARF number.
    pushed_regs: HashMap<u64, RegisterId>,
}

impl SynthesisState {
    fn new(initial_sp: u64, sp: RegisterId, pc: RegisterId, entry_row: UnwindRow) -> Self {
        Self {
            initial_sp,
            sp,
            pc,
            cfa_is_fp: false,
            curr_row: entry_row,
            row_changed: false,
            register_values: HashMap::new(),
            pushed_regs: HashMap::new(),
        }
    }

    fn stored_value(&self, reg: &RegisterInfo) -> Option<u64> {
        self.register_values.get(&value_key(reg)).copied()
    }

    fn store_value(&mut self, reg: &RegisterInfo, value: u64) {
        self.register_values.insert(value_key(reg), value);
    }
}

impl EmulationDelegate for SynthesisState {
    fn read_register(&mut self, reg: &'static RegisterInfo) -> RegisterValue {
        if let Some(value) = self.stored_value(reg) {
            return RegisterValue::new(value, reg.byte_size);
        }
        if reg.id(RegisterKind::Dwarf) == Some(self.sp) {
            return RegisterValue::new(self.initial_sp, reg.byte_size);
        }
        // Never-written registers read back as a synthetic marker value;
        // only their identity matters to unwind synthesis.
        RegisterValue::new(value_key(reg), reg.byte_size)
    }

    fn write_register(
        &mut self,
        context: &AccessContext,
        reg: &'static RegisterInfo,
        value: RegisterValue,
    ) {
        self.store_value(reg, value.as_u64());
        let dwarf = reg.id(RegisterKind::Dwarf);
        match context {
            AccessContext::AdjustStackPointer => {
                // While the CFA rides the stack pointer, every move of sp
                // shifts the CFA offset to keep CFA == initial sp.
                if !self.cfa_is_fp && dwarf == Some(self.sp) {
                    let offset = self.initial_sp.wrapping_sub(value.as_u64()) as i64;
                    if self.curr_row.cfa_offset() != offset {
                        self.curr_row.set_cfa_offset(offset);
                        self.row_changed = true;
                    }
                }
            }
            AccessContext::SetFramePointer => {
                // First frame-pointer establishment takes CFA ownership;
                // later rewrites of the same register leave it alone.
                if !self.cfa_is_fp
                    && let Some(fp) = dwarf
                {
                    self.cfa_is_fp = true;
                    let offset = self.initial_sp.wrapping_sub(value.as_u64()) as i64;
                    self.curr_row.set_cfa_register(fp);
                    self.curr_row.set_cfa_offset(offset);
                    self.row_changed = true;
                    trace!(register = reg.name, offset, "CFA re-anchored to frame pointer");
                }
            }
            AccessContext::PopRegisterOffStack => {
                if let Some(id) = dwarf {
                    self.row_changed |= self.curr_row.set_register_location(
                        id,
                        RegisterLocation::SameAsCaller,
                        true,
                    );
                }
            }
            _ => {}
        }
    }

    fn read_memory(
        &mut self,
        _context: &AccessContext,
        address: u64,
        byte_size: usize,
    ) -> RegisterValue {
        let value = self
            .pushed_regs
            .get(&address)
            .and_then(|id| {
                let key = ((RegisterKind::Dwarf as u64) << 32) | u64::from(*id);
                self.register_values.get(&key)
            })
            .copied()
            .unwrap_or(0);
        RegisterValue::new(value, byte_size)
    }

    fn write_memory(&mut self, context: &AccessContext, address: u64, _value: RegisterValue) {
        if let AccessContext::PushRegisterOnStack { data_reg } = context {
            let Some(id) = data_reg.id(RegisterKind::Dwarf) else {
                warn!(register = data_reg.name, "pushed register has no DWARF number");
                return;
            };
            // CFA stays equal to the initial sp, so the slot's CFA-relative
            // offset is its distance below it.
            let offset = address.wrapping_sub(self.initial_sp) as i64;
            self.row_changed |= self.curr_row.set_register_location(
                id,
                RegisterLocation::AtCfaPlusOffset(offset),
                false,
            );
            self.pushed_regs.insert(address, id);
            // A spilled return address is where the caller's pc lives.
            if data_reg.has_role(RegisterRole::ReturnAddress) {
                self.row_changed |= self.curr_row.set_register_location(
                    self.pc,
                    RegisterLocation::AtCfaPlusOffset(offset),
                    true,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ArmAbi;
    use crate::emulate::assemble;
    use crate::registers::arm::{DWARF_LR, DWARF_PC, DWARF_R4, DWARF_R7, DWARF_SP};

    fn synthesize(words: &[u32]) -> UnwindPlan {
        let arch = ArchSpec::parse("arm-apple-darwin").unwrap();
        let mut unwinder = InstructionEmulationUnwinder::for_arch(&arch).unwrap();
        let code = assemble::to_bytes(words);
        let range = AddressRange::new(0x4000, code.len() as u64);
        unwinder.synthesize(&range, &code, &ArmAbi).unwrap()
    }

    #[test]
    fn test_entry_row_seeds_plan() {
        let plan = synthesize(&[assemble::bx_lr()]);
        assert_eq!(plan.row_count(), 1);
        let row = plan.row_for_offset(0).unwrap();
        assert_eq!(row.cfa_register(), DWARF_SP);
        assert_eq!(row.cfa_offset(), 0);
        assert_eq!(
            row.register_location(DWARF_PC),
            Some(RegisterLocation::InRegister(DWARF_LR))
        );
        assert!(plan.is_valid_at_all_instruction_locations());
    }

    #[test]
    fn test_push_records_slots_and_cfa() {
        // push {r4, r7, lr}
        let plan = synthesize(&[assemble::push(1 << 4 | 1 << 7 | 1 << 14)]);
        assert_eq!(plan.row_count(), 2);
        let row = plan.row_for_offset(4).unwrap();
        assert_eq!(row.offset(), 4);
        assert_eq!(row.cfa_register(), DWARF_SP);
        assert_eq!(row.cfa_offset(), 12);
        assert_eq!(
            row.register_location(DWARF_R4),
            Some(RegisterLocation::AtCfaPlusOffset(-12))
        );
        assert_eq!(
            row.register_location(DWARF_R7),
            Some(RegisterLocation::AtCfaPlusOffset(-8))
        );
        assert_eq!(
            row.register_location(DWARF_LR),
            Some(RegisterLocation::AtCfaPlusOffset(-4))
        );
        assert_eq!(
            row.register_location(DWARF_PC),
            Some(RegisterLocation::AtCfaPlusOffset(-4))
        );
    }

    #[test]
    fn test_frame_pointer_takes_cfa_ownership_once() {
        // push {r7, lr}; mov r7, sp; sub sp, #16
        let plan = synthesize(&[
            assemble::push(1 << 7 | 1 << 14),
            assemble::mov_fp_sp(),
            assemble::sub_sp(16),
        ]);
        let row = plan.row_for_offset(8).unwrap();
        assert_eq!(row.cfa_register(), DWARF_R7);
        assert_eq!(row.cfa_offset(), 8);
        // The later sp adjustment must not move the CFA off the frame
        // pointer.
        assert_eq!(plan.row_for_offset(12).unwrap().offset(), 8);
    }

    #[test]
    fn test_pop_restores_caller_values() {
        // push {r4}; pop {r4}
        let plan = synthesize(&[assemble::push(1 << 4), assemble::pop(1 << 4)]);
        let row = plan.last_row().unwrap();
        assert_eq!(row.offset(), 8);
        assert_eq!(
            row.register_location(DWARF_R4),
            Some(RegisterLocation::SameAsCaller)
        );
        assert_eq!(row.cfa_offset(), 0);
    }

    #[test]
    fn test_undecodable_instruction_preserves_rows() {
        let plan = synthesize(&[assemble::push(1 << 7 | 1 << 14), assemble::bx_lr()]);
        assert_eq!(plan.row_count(), 2);
    }
}
