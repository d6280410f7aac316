//! Static register descriptions.
//!
//! Every architecture plugin exposes an ordered table of [`RegisterInfo`]
//! entries, built once at plugin construction and shared read-only
//! afterwards. A register can be referred to in several numbering schemes
//! ([`RegisterKind`]); the table maps between them.

/// A register number within one [`RegisterKind`] numbering scheme.
pub type RegisterId = u32;

/// Marker for "this register has no number in that scheme".
pub const INVALID_REGISTER: RegisterId = u32::MAX;

/// The numbering scheme a register id is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    /// DWARF register numbers, as used in call-frame information.
    Dwarf,
    /// Architecture-independent role numbers (PC, SP, FP, RA, flags, args).
    Generic,
    /// The platform's native numbering.
    Native,
}

/// Architecture-independent role a register plays in the calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRole {
    /// N-th integer argument slot, zero-based.
    Argument(u8),
    StackPointer,
    FramePointer,
    ReturnAddress,
    ProgramCounter,
    Flags,
}

impl RegisterRole {
    /// Fixed id of this role in the [`RegisterKind::Generic`] scheme.
    #[must_use]
    pub const fn generic_id(self) -> RegisterId {
        match self {
            Self::ProgramCounter => 0,
            Self::StackPointer => 1,
            Self::FramePointer => 2,
            Self::ReturnAddress => 3,
            Self::Flags => 4,
            Self::Argument(n) => 5 + n as RegisterId,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Plain unsigned integer register.
    Uint,
    /// IEEE 754 floating-point register.
    Ieee754,
}

/// One physical register of an architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterInfo {
    pub name: &'static str,
    pub alt_name: Option<&'static str>,
    pub byte_size: usize,
    pub encoding: Encoding,
    /// DWARF number, [`INVALID_REGISTER`] if the scheme has none for it.
    pub dwarf: RegisterId,
    /// Native number, [`INVALID_REGISTER`] if unnumbered.
    pub native: RegisterId,
    pub role: Option<RegisterRole>,
}

impl RegisterInfo {
    /// The register's number in `kind`, if it has one.
    #[must_use]
    pub const fn id(&self, kind: RegisterKind) -> Option<RegisterId> {
        let id = match kind {
            RegisterKind::Dwarf => self.dwarf,
            RegisterKind::Native => self.native,
            RegisterKind::Generic => match self.role {
                Some(role) => role.generic_id(),
                None => INVALID_REGISTER,
            },
        };
        if id == INVALID_REGISTER { None } else { Some(id) }
    }

    #[must_use]
    pub fn has_role(&self, role: RegisterRole) -> bool {
        self.role == Some(role)
    }
}

/// Find the register filling `role` in an architecture's table.
#[must_use]
pub fn register_with_role(
    table: &'static [RegisterInfo],
    role: RegisterRole,
) -> Option<&'static RegisterInfo> {
    table.iter().find(|info| info.role == Some(role))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_REG: RegisterInfo = RegisterInfo {
        name: "sp",
        alt_name: Some("r13"),
        byte_size: 4,
        encoding: Encoding::Uint,
        dwarf: 13,
        native: INVALID_REGISTER,
        role: Some(RegisterRole::StackPointer),
    };

    #[test]
    fn test_id_per_kind() {
        assert_eq!(TEST_REG.id(RegisterKind::Dwarf), Some(13));
        assert_eq!(TEST_REG.id(RegisterKind::Native), None);
        assert_eq!(
            TEST_REG.id(RegisterKind::Generic),
            Some(RegisterRole::StackPointer.generic_id())
        );
    }

    #[test]
    fn test_generic_ids_are_distinct() {
        let roles = [
            RegisterRole::ProgramCounter,
            RegisterRole::StackPointer,
            RegisterRole::FramePointer,
            RegisterRole::ReturnAddress,
            RegisterRole::Flags,
            RegisterRole::Argument(0),
            RegisterRole::Argument(3),
        ];
        let mut ids: Vec<RegisterId> = roles.iter().map(|r| r.generic_id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), roles.len());
    }
}
