//! Architecture identification.
//!
//! An [`ArchSpec`] is parsed from a `machine-vendor-os` triple (for example
//! `arm-apple-darwin`) and is the key used to select ABI and emulator
//! plugins at runtime.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// A parsed architecture triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchSpec {
    machine: String,
    vendor: String,
    os: String,
}

impl ArchSpec {
    /// Parse a `machine-vendor-os` triple. The OS component may itself
    /// contain dashes (`arm-unknown-linux-gnueabi`).
    pub fn parse(triple: &str) -> Result<Self> {
        let mut parts = triple.splitn(3, '-');
        let machine = parts.next().filter(|m| !m.is_empty());
        let vendor = parts.next();
        let os = parts.next();
        match (machine, vendor, os) {
            (Some(machine), Some(vendor), Some(os)) => Ok(Self {
                machine: machine.to_string(),
                vendor: vendor.to_string(),
                os: os.to_string(),
            }),
            _ => Err(Error::InvalidTriple(triple.to_string())),
        }
    }

    #[must_use]
    pub fn machine(&self) -> &str {
        &self.machine
    }

    #[must_use]
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    #[must_use]
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Size of a pointer on this machine, in bytes.
    #[must_use]
    pub fn address_byte_size(&self) -> usize {
        match self.machine.as_str() {
            "x86_64" | "aarch64" | "arm64" | "riscv64" => 8,
            _ => 4,
        }
    }

    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        match self.machine.as_str() {
            "armeb" | "mips" | "sparc" => ByteOrder::Big,
            _ => ByteOrder::Little,
        }
    }

    /// True for the ARM plugin family, which also claims Thumb triples.
    #[must_use]
    pub fn is_arm(&self) -> bool {
        matches!(self.machine.as_str(), "arm" | "armv7" | "thumb" | "thumbv7")
    }
}

impl std::fmt::Display for ArchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.machine, self.vendor, self.os)
    }
}
