use std::collections::BTreeMap;

use super::RegisterLocation;
use crate::registers::RegisterId;

/// One snapshot of unwind rules, active from `offset` bytes into the
/// function until the next row takes over.
///
/// The canonical frame address is `value(cfa_register) + cfa_offset`; every
/// [`RegisterLocation`] in the row is expressed relative to it. Each
/// register has exactly one location per row (the map enforces this).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindRow {
    offset: u64,
    cfa_register: RegisterId,
    cfa_offset: i64,
    registers: BTreeMap<RegisterId, RegisterLocation>,
}

impl UnwindRow {
    #[must_use]
    pub fn new(cfa_register: RegisterId, cfa_offset: i64) -> Self {
        Self {
            offset: 0,
            cfa_register,
            cfa_offset,
            registers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    pub const fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    #[must_use]
    pub const fn cfa_register(&self) -> RegisterId {
        self.cfa_register
    }

    pub const fn set_cfa_register(&mut self, reg: RegisterId) {
        self.cfa_register = reg;
    }

    #[must_use]
    pub const fn cfa_offset(&self) -> i64 {
        self.cfa_offset
    }

    pub const fn set_cfa_offset(&mut self, offset: i64) {
        self.cfa_offset = offset;
    }

    #[must_use]
    pub fn register_location(&self, reg: RegisterId) -> Option<RegisterLocation> {
        self.registers.get(&reg).copied()
    }

    /// Set `reg`'s location. When `can_replace` is false the call only
    /// takes effect if no firm location has been recorded yet; a location
    /// already known stays untouched. Returns whether the row changed.
    pub fn set_register_location(
        &mut self,
        reg: RegisterId,
        location: RegisterLocation,
        can_replace: bool,
    ) -> bool {
        if !can_replace
            && self
                .register_location(reg)
                .is_some_and(RegisterLocation::is_specified)
        {
            return false;
        }
        self.registers.insert(reg, location) != Some(location)
    }

    /// Registers this row has rules for, with their locations.
    pub fn registers(&self) -> impl Iterator<Item = (RegisterId, RegisterLocation)> + '_ {
        self.registers.iter().map(|(reg, loc)| (*reg, *loc))
    }
}
