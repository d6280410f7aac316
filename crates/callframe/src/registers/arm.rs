//! The ARM register table shared by the ARM ABI plugin and the ARM
//! instruction emulator.
//!
//! DWARF numbering: r0-r15 are 0-15, s0-s31 are 64-95, d0-d31 are 256-287.
//! The frame-pointer role is on r7, following the Darwin convention (AAPCS
//! proper uses r11).

use super::{Encoding, INVALID_REGISTER, RegisterId, RegisterInfo, RegisterRole};

pub const DWARF_R0: RegisterId = 0;
pub const DWARF_R1: RegisterId = 1;
pub const DWARF_R4: RegisterId = 4;
pub const DWARF_R7: RegisterId = 7;
pub const DWARF_SP: RegisterId = 13;
pub const DWARF_LR: RegisterId = 14;
pub const DWARF_PC: RegisterId = 15;

const fn gpr(
    name: &'static str,
    alt_name: Option<&'static str>,
    dwarf: RegisterId,
    role: Option<RegisterRole>,
) -> RegisterInfo {
    RegisterInfo {
        name,
        alt_name,
        byte_size: 4,
        encoding: Encoding::Uint,
        dwarf,
        native: dwarf,
        role,
    }
}

const fn sreg(name: &'static str, index: RegisterId) -> RegisterInfo {
    RegisterInfo {
        name,
        alt_name: None,
        byte_size: 4,
        encoding: Encoding::Ieee754,
        dwarf: 64 + index,
        native: 17 + index,
        role: None,
    }
}

const fn dreg(name: &'static str, index: RegisterId) -> RegisterInfo {
    RegisterInfo {
        name,
        alt_name: None,
        byte_size: 8,
        encoding: Encoding::Ieee754,
        dwarf: 256 + index,
        native: 49 + index,
        role: None,
    }
}

#[rustfmt::skip]
pub static ARM_REGISTERS: [RegisterInfo; 81] = [
    gpr("r0",   Some("arg1"), 0,  Some(RegisterRole::Argument(0))),
    gpr("r1",   Some("arg2"), 1,  Some(RegisterRole::Argument(1))),
    gpr("r2",   Some("arg3"), 2,  Some(RegisterRole::Argument(2))),
    gpr("r3",   Some("arg4"), 3,  Some(RegisterRole::Argument(3))),
    gpr("r4",   None,         4,  None),
    gpr("r5",   None,         5,  None),
    gpr("r6",   None,         6,  None),
    gpr("r7",   None,         7,  Some(RegisterRole::FramePointer)),
    gpr("r8",   None,         8,  None),
    gpr("r9",   None,         9,  None),
    gpr("r10",  None,         10, None),
    gpr("r11",  None,         11, None),
    gpr("r12",  None,         12, None),
    gpr("sp",   Some("r13"),  13, Some(RegisterRole::StackPointer)),
    gpr("lr",   Some("r14"),  14, Some(RegisterRole::ReturnAddress)),
    gpr("pc",   Some("r15"),  15, Some(RegisterRole::ProgramCounter)),
    RegisterInfo {
        name: "cpsr",
        alt_name: Some("psr"),
        byte_size: 4,
        encoding: Encoding::Uint,
        dwarf: INVALID_REGISTER,
        native: 16,
        role: Some(RegisterRole::Flags),
    },
    sreg("s0", 0),   sreg("s1", 1),   sreg("s2", 2),   sreg("s3", 3),
    sreg("s4", 4),   sreg("s5", 5),   sreg("s6", 6),   sreg("s7", 7),
    sreg("s8", 8),   sreg("s9", 9),   sreg("s10", 10), sreg("s11", 11),
    sreg("s12", 12), sreg("s13", 13), sreg("s14", 14), sreg("s15", 15),
    sreg("s16", 16), sreg("s17", 17), sreg("s18", 18), sreg("s19", 19),
    sreg("s20", 20), sreg("s21", 21), sreg("s22", 22), sreg("s23", 23),
    sreg("s24", 24), sreg("s25", 25), sreg("s26", 26), sreg("s27", 27),
    sreg("s28", 28), sreg("s29", 29), sreg("s30", 30), sreg("s31", 31),
    dreg("d0", 0),   dreg("d1", 1),   dreg("d2", 2),   dreg("d3", 3),
    dreg("d4", 4),   dreg("d5", 5),   dreg("d6", 6),   dreg("d7", 7),
    dreg("d8", 8),   dreg("d9", 9),   dreg("d10", 10), dreg("d11", 11),
    dreg("d12", 12), dreg("d13", 13), dreg("d14", 14), dreg("d15", 15),
    dreg("d16", 16), dreg("d17", 17), dreg("d18", 18), dreg("d19", 19),
    dreg("d20", 20), dreg("d21", 21), dreg("d22", 22), dreg("d23", 23),
    dreg("d24", 24), dreg("d25", 25), dreg("d26", 26), dreg("d27", 27),
    dreg("d28", 28), dreg("d29", 29), dreg("d30", 30), dreg("d31", 31),
];

/// Look up a core register by its number r0-r15.
#[must_use]
pub fn core_register(num: RegisterId) -> Option<&'static RegisterInfo> {
    if num < 16 {
        Some(&ARM_REGISTERS[num as usize])
    } else {
        None
    }
}
