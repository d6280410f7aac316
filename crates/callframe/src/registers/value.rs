// Width masking and sign extension intentionally convert between u64/i64.
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

/// The contents of one register, tagged with the register's byte width.
///
/// Values wider than the register are truncated on construction so that
/// equality behaves the same whether a value came from a real read or from
/// arithmetic on synthetic values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterValue {
    value: u64,
    byte_size: usize,
}

impl RegisterValue {
    #[must_use]
    pub const fn new(value: u64, byte_size: usize) -> Self {
        Self {
            value: value & Self::mask(byte_size),
            byte_size,
        }
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.value
    }

    #[must_use]
    pub const fn byte_size(self) -> usize {
        self.byte_size
    }

    /// Sign-extend the low `bit_width` bits to a full i64.
    #[must_use]
    pub const fn sign_extended(self, bit_width: u32) -> i64 {
        debug_assert!(bit_width > 0 && bit_width <= 64);
        let shift = 64 - bit_width;
        ((self.value << shift) as i64) >> shift
    }

    const fn mask(byte_size: usize) -> u64 {
        if byte_size >= 8 {
            u64::MAX
        } else {
            (1u64 << (byte_size * 8)) - 1
        }
    }
}

/// An integer value extracted from registers or target memory, preserving
/// whether sign extension was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Unsigned(u64),
    Signed(i64),
}

impl Scalar {
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        match self {
            Self::Unsigned(v) => v,
            Self::Signed(v) => v as u64,
        }
    }

    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Unsigned(v) => v as i64,
            Self::Signed(v) => v,
        }
    }
}
