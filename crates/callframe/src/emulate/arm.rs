//! ARM prologue/epilogue instruction emulation.
//!
//! Covers the instruction forms compilers emit in function prologues and
//! epilogues: multi-register push/pop, single-register stores below the
//! stack pointer, immediate stack adjustment, and frame-pointer
//! establishment. Everything else decodes to "no unwind effect".
//!
//! Only the ARM (not Thumb) encoding with the always-execute condition is
//! decoded; a Thumb front end would plug in behind the same traits.

use tracing::{trace, warn};

use super::{AccessContext, AddressRange, Disassembler, EmulationDelegate, Instruction,
            InstructionEmulator};
use crate::registers::arm::{ARM_REGISTERS, core_register};
use crate::registers::{RegisterInfo, RegisterValue};
use crate::{Error, Result};

const SP: u32 = 13;
const FP: u32 = 7;

/// Fixed-width (4-byte, little-endian) ARM disassembler.
pub struct ArmDisassembler;

impl Disassembler for ArmDisassembler {
    fn disassemble(&self, range: &AddressRange, code: &[u8]) -> Result<Vec<Instruction>> {
        if range.is_empty() || code.is_empty() {
            return Err(Error::InvalidRange {
                base: range.base,
                byte_size: range.byte_size,
            });
        }
        let len = code.len().min(usize::try_from(range.byte_size).unwrap_or(usize::MAX));
        if len % 4 != 0 {
            warn!(base = range.base, len, "dropping trailing partial instruction");
        }
        let mut instructions = Vec::with_capacity(len / 4);
        for (idx, word) in code[..len - len % 4].chunks_exact(4).enumerate() {
            instructions.push(Instruction {
                address: range.base + (idx as u64) * 4,
                bytes: word.to_vec(),
            });
        }
        Ok(instructions)
    }
}

/// Prologue-scope ARM instruction emulator.
#[derive(Debug, Default)]
pub struct ArmEmulator;

impl ArmEmulator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn evaluate_word(word: u32, delegate: &mut dyn EmulationDelegate) -> Result<()> {
        // Only the AL (always) condition appears in prologues we model.
        if word >> 28 != 0xE {
            trace!(word = format_args!("{word:#010x}"), "conditional instruction, skipped");
            return Ok(());
        }

        if word & 0xFFFF_0000 == 0xE92D_0000 {
            return Self::push_multiple(word & 0xFFFF, delegate);
        }
        if word & 0xFFFF_0000 == 0xE8BD_0000 {
            return Self::pop_multiple(word & 0xFFFF, delegate);
        }
        // str rt, [sp, #-imm] with or without writeback.
        if word & 0xFFFF_0000 == 0xE52D_0000 {
            return Self::store_below_sp(word, true, delegate);
        }
        if word & 0xFFFF_0000 == 0xE50D_0000 {
            return Self::store_below_sp(word, false, delegate);
        }
        if word & 0xFFFF_F000 == 0xE24D_D000 {
            return Self::adjust_sp(-i64::from(decode_imm12(word)), delegate);
        }
        if word & 0xFFFF_F000 == 0xE28D_D000 {
            return Self::adjust_sp(i64::from(decode_imm12(word)), delegate);
        }
        // add fp, sp, #imm
        if word & 0xFFFF_F000 == 0xE28D_0000 | (FP << 12) {
            return Self::set_frame_pointer(decode_imm12(word), delegate);
        }
        // mov rd, rm
        if word & 0xFFFF_0FF0 == 0xE1A0_0000 {
            return Self::move_register((word >> 12) & 0xF, word & 0xF, delegate);
        }

        trace!(word = format_args!("{word:#010x}"), "no unwind-relevant effect");
        Ok(())
    }

    fn push_multiple(reglist: u32, delegate: &mut dyn EmulationDelegate) -> Result<()> {
        let sp_info = reg(SP)?;
        let sp = delegate.read_register(sp_info).as_u64();
        let count = u64::from(reglist.count_ones());
        let new_sp = sp.wrapping_sub(4 * count);

        // STMDB stores the lowest-numbered register at the lowest address.
        let mut address = new_sp;
        for num in 0..16 {
            if reglist & (1 << num) == 0 {
                continue;
            }
            let info = reg(num)?;
            let value = delegate.read_register(info);
            delegate.write_memory(
                &AccessContext::PushRegisterOnStack { data_reg: info },
                address,
                value,
            );
            address += 4;
        }
        delegate.write_register(
            &AccessContext::AdjustStackPointer,
            sp_info,
            RegisterValue::new(new_sp, 4),
        );
        Ok(())
    }

    fn pop_multiple(reglist: u32, delegate: &mut dyn EmulationDelegate) -> Result<()> {
        let sp_info = reg(SP)?;
        let sp = delegate.read_register(sp_info).as_u64();
        let mut address = sp;
        for num in 0..16 {
            if reglist & (1 << num) == 0 {
                continue;
            }
            let info = reg(num)?;
            let value = delegate.read_memory(&AccessContext::PopRegisterOffStack, address, 4);
            delegate.write_register(&AccessContext::PopRegisterOffStack, info, value);
            address += 4;
        }
        let count = u64::from(reglist.count_ones());
        delegate.write_register(
            &AccessContext::AdjustStackPointer,
            sp_info,
            RegisterValue::new(sp.wrapping_add(4 * count), 4),
        );
        Ok(())
    }

    fn store_below_sp(
        word: u32,
        writeback: bool,
        delegate: &mut dyn EmulationDelegate,
    ) -> Result<()> {
        let sp_info = reg(SP)?;
        let info = reg((word >> 12) & 0xF)?;
        let offset = u64::from(word & 0xFFF);
        let sp = delegate.read_register(sp_info).as_u64();
        let address = sp.wrapping_sub(offset);
        let value = delegate.read_register(info);
        delegate.write_memory(
            &AccessContext::PushRegisterOnStack { data_reg: info },
            address,
            value,
        );
        if writeback {
            delegate.write_register(
                &AccessContext::AdjustStackPointer,
                sp_info,
                RegisterValue::new(address, 4),
            );
        }
        Ok(())
    }

    fn adjust_sp(delta: i64, delegate: &mut dyn EmulationDelegate) -> Result<()> {
        let sp_info = reg(SP)?;
        let sp = delegate.read_register(sp_info).as_u64();
        delegate.write_register(
            &AccessContext::AdjustStackPointer,
            sp_info,
            RegisterValue::new(sp.wrapping_add_signed(delta), 4),
        );
        Ok(())
    }

    fn set_frame_pointer(offset: u32, delegate: &mut dyn EmulationDelegate) -> Result<()> {
        let sp_info = reg(SP)?;
        let fp_info = reg(FP)?;
        let sp = delegate.read_register(sp_info).as_u64();
        delegate.write_register(
            &AccessContext::SetFramePointer,
            fp_info,
            RegisterValue::new(sp.wrapping_add(u64::from(offset)), 4),
        );
        Ok(())
    }

    fn move_register(rd: u32, rm: u32, delegate: &mut dyn EmulationDelegate) -> Result<()> {
        let value = delegate.read_register(reg(rm)?);
        let context = if rd == FP && rm == SP {
            AccessContext::SetFramePointer
        } else if rd == SP {
            AccessContext::AdjustStackPointer
        } else {
            AccessContext::Other
        };
        delegate.write_register(&context, reg(rd)?, value);
        Ok(())
    }
}

impl InstructionEmulator for ArmEmulator {
    fn register_table(&self) -> &'static [RegisterInfo] {
        &ARM_REGISTERS
    }

    fn evaluate(
        &mut self,
        instruction: &Instruction,
        delegate: &mut dyn EmulationDelegate,
    ) -> Result<()> {
        let bytes: [u8; 4] = instruction.bytes.as_slice().try_into().map_err(|_| {
            Error::InvalidRange {
                base: instruction.address,
                byte_size: instruction.byte_size(),
            }
        })?;
        let word = u32::from_le_bytes(bytes);
        trace!(
            address = format_args!("{:#x}", instruction.address),
            word = format_args!("{word:#010x}"),
            "emulating"
        );
        Self::evaluate_word(word, delegate)
    }
}

fn reg(num: u32) -> Result<&'static RegisterInfo> {
    core_register(num).ok_or_else(|| Error::RegisterAccess(format!("arm core register r{num}")))
}

/// Decode an ARM data-processing immediate: an 8-bit value rotated right by
/// twice the 4-bit rotation field.
const fn decode_imm12(word: u32) -> u32 {
    let rotate = (word >> 8) & 0xF;
    let imm8 = word & 0xFF;
    imm8.rotate_right(rotate * 2)
}

/// Assemble the prologue instruction forms the emulator understands.
/// Used by tests and the CLI examples.
pub mod assemble {
    /// `push {reglist}` with a bitmask of r0-r15.
    #[must_use]
    pub const fn push(reglist: u16) -> u32 {
        0xE92D_0000 | reglist as u32
    }

    /// `pop {reglist}`.
    #[must_use]
    pub const fn pop(reglist: u16) -> u32 {
        0xE8BD_0000 | reglist as u32
    }

    /// `str rt, [sp, #-imm]` (no writeback). `imm` must fit in 12 bits.
    #[must_use]
    pub const fn store_below_sp(rt: u32, imm: u32) -> u32 {
        0xE50D_0000 | (rt << 12) | (imm & 0xFFF)
    }

    /// `sub sp, sp, #imm`. `imm` must fit in 8 bits (rotation unused).
    #[must_use]
    pub const fn sub_sp(imm: u32) -> u32 {
        0xE24D_D000 | (imm & 0xFF)
    }

    /// `add sp, sp, #imm`.
    #[must_use]
    pub const fn add_sp(imm: u32) -> u32 {
        0xE28D_D000 | (imm & 0xFF)
    }

    /// `mov r7, sp`.
    #[must_use]
    pub const fn mov_fp_sp() -> u32 {
        0xE1A0_700D
    }

    /// `bx lr`.
    #[must_use]
    pub const fn bx_lr() -> u32 {
        0xE12F_FF1E
    }

    /// Little-endian byte stream for a word sequence.
    #[must_use]
    pub fn to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}
