//! Architecture abstraction for a native debugger: calling-convention
//! plugins and unwind-plan synthesis by instruction emulation.
//!
//! The [`abi`] module models what a compiler promised about a target's
//! calling convention; the [`unwind`] module recovers what a particular
//! function's prologue actually did, by replaying its instructions against
//! synthetic state. Both speak [`plan::UnwindPlan`], the CFI-style table a
//! stack walker consumes.

#![allow(
    clippy::missing_errors_doc, // error conditions are described on the Error variants
    clippy::module_name_repetitions // UnwindPlan, RegisterInfo etc. read better qualified
)]

pub mod abi;
pub mod arch;
pub mod emulate;
pub mod error;
pub mod plan;
pub mod registers;
pub mod target;
pub mod unwind;

/// Test harness module with a mock thread for ABI and unwind tests.
///
/// Only available when running tests or when the `test-harness` feature is
/// enabled.
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use abi::{Abi, abi_for_arch};
pub use arch::ArchSpec;
pub use error::{Error, Result};
pub use plan::{RegisterLocation, UnwindPlan, UnwindRow};
pub use unwind::InstructionEmulationUnwinder;
