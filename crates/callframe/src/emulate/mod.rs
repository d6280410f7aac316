//! Pluggable instruction emulation.
//!
//! An [`InstructionEmulator`] decodes one instruction's semantic effects
//! (which registers and memory it reads and writes, and why) without
//! executing it on hardware. Every mutating access carries an
//! [`AccessContext`] tag describing *why* the access happened; consumers
//! switch on the tag instead of pattern-matching opcodes themselves, and
//! must ignore tags they do not recognize.

mod arm;

pub use arm::{ArmDisassembler, ArmEmulator, assemble};

use crate::arch::ArchSpec;
use crate::registers::{RegisterInfo, RegisterValue};
use crate::{Error, Result};

/// A half-open byte range `[base, base + byte_size)` of target code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub base: u64,
    pub byte_size: u64,
}

impl AddressRange {
    #[must_use]
    pub const fn new(base: u64, byte_size: u64) -> Self {
        Self { base, byte_size }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.byte_size == 0
    }
}

/// One disassembled instruction: its address and raw opcode bytes.
/// Operand decoding is left to the per-architecture emulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub bytes: Vec<u8>,
}

impl Instruction {
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Turns a byte range into an ordered instruction sequence. One pass per
/// call; a fresh call re-disassembles.
pub trait Disassembler {
    fn disassemble(&self, range: &AddressRange, code: &[u8]) -> Result<Vec<Instruction>>;
}

/// Why a register or memory access happened, as classified by the
/// emulator. Unrecognized tags must be ignored, never treated as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessContext {
    /// A register's value was stored to the stack (the memory write), with
    /// the register that was pushed.
    PushRegisterOnStack { data_reg: &'static RegisterInfo },
    /// A previously pushed value was restored into its origin register
    /// (the register write).
    PopRegisterOffStack,
    /// This register write establishes the frame pointer for the frame.
    SetFramePointer,
    /// The stack pointer was moved by prologue/epilogue arithmetic.
    AdjustStackPointer,
    /// Anything else; carries no unwind information.
    Other,
}

/// Callbacks through which an emulator reads and writes machine state.
///
/// The unwind synthesizer implements this against purely synthetic state;
/// a live-target implementation would forward to a real thread.
pub trait EmulationDelegate {
    /// Current value of `reg`. Implementations must return a recognizable
    /// synthetic value for registers never written, not fail.
    fn read_register(&mut self, reg: &'static RegisterInfo) -> RegisterValue;

    fn write_register(
        &mut self,
        context: &AccessContext,
        reg: &'static RegisterInfo,
        value: RegisterValue,
    );

    /// Observe a memory read; the returned value may be synthetic.
    fn read_memory(&mut self, context: &AccessContext, address: u64, byte_size: usize)
    -> RegisterValue;

    fn write_memory(&mut self, context: &AccessContext, address: u64, value: RegisterValue);
}

/// Per-architecture instruction semantics.
pub trait InstructionEmulator {
    /// The architecture's register table (static, shared).
    fn register_table(&self) -> &'static [RegisterInfo];

    /// Decode `instruction` and report its effects through `delegate`.
    ///
    /// A failure aborts this instruction only; the delegate's state built
    /// so far stays valid.
    fn evaluate(
        &mut self,
        instruction: &Instruction,
        delegate: &mut dyn EmulationDelegate,
    ) -> Result<()>;
}

/// Instantiate the emulator and disassembler registered for `arch`.
pub fn emulator_for_arch(
    arch: &ArchSpec,
) -> Result<(Box<dyn InstructionEmulator>, Box<dyn Disassembler>)> {
    if arch.is_arm() {
        Ok((Box::new(ArmEmulator::new()), Box::new(ArmDisassembler)))
    } else {
        Err(Error::UnsupportedArchitecture(arch.to_string()))
    }
}
