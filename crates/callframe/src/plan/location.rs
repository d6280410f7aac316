use crate::registers::RegisterId;

/// Where a register's prior-frame value can be recovered from, expressed
/// relative to the canonical frame address (CFA) of the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterLocation {
    /// Nothing is known; the caller's value is unrecoverable.
    Undefined,
    /// The register still holds the caller's value.
    SameAsCaller,
    /// The caller's value is stored in memory at CFA + offset.
    AtCfaPlusOffset(i64),
    /// The caller's value *is* CFA + offset (no memory read needed).
    IsCfaPlusOffset(i64),
    /// The caller's value was copied into another register.
    InRegister(RegisterId),
    /// The caller's value is a known constant.
    Constant(u64),
}

impl RegisterLocation {
    /// True for locations that carry real recovery information and must not
    /// be silently overwritten by weaker ones.
    #[must_use]
    pub const fn is_specified(self) -> bool {
        !matches!(self, Self::Undefined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_undefined_is_unspecified() {
        assert!(!RegisterLocation::Undefined.is_specified());
        assert!(RegisterLocation::SameAsCaller.is_specified());
        assert!(RegisterLocation::AtCfaPlusOffset(-4).is_specified());
        assert!(RegisterLocation::IsCfaPlusOffset(0).is_specified());
        assert!(RegisterLocation::InRegister(14).is_specified());
        assert!(RegisterLocation::Constant(0).is_specified());
    }
}
