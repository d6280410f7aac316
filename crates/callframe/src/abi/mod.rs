//! Per-architecture calling-convention plugins.
//!
//! An [`Abi`] answers, for one architecture: how outgoing call frames are
//! built, how argument and return values are read back, which registers a
//! callee may clobber, and what unwind rules hold before anything better
//! is known. Implementations are registered in a process-wide, append-only
//! [`AbiRegistry`]; lookups match an architecture triple against each
//! registration in order, first match wins, and the constructed plugin is
//! cached as an immutable singleton for the process lifetime.

mod arm;

pub use arm::ArmAbi;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use tracing::debug;

use crate::arch::ArchSpec;
use crate::plan::UnwindPlan;
use crate::registers::{RegisterInfo, Scalar};
use crate::target::{RegisterContext, ValueDescriptor};
use crate::{Error, Result};

/// The calling-convention contract one architecture implements.
pub trait Abi: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// The architecture's ordered register table (static, read-only).
    fn register_table(&self) -> &'static [RegisterInfo];

    /// Bytes below the stack pointer guaranteed untouched by interrupt and
    /// signal handlers. Zero if the architecture has no red zone.
    fn red_zone_size(&self) -> usize {
        0
    }

    /// Caller-saved ("volatile") registers may be freely overwritten by a
    /// callee without being restored.
    fn is_register_volatile(&self, reg: &RegisterInfo) -> bool;

    /// One-row plan valid only at a function's first instruction, before
    /// any prologue has run: CFA is the incoming stack pointer and the
    /// return address is wherever the call instruction put it.
    fn function_entry_unwind_plan(&self) -> UnwindPlan;

    /// Conservative fallback assuming a textbook frame-pointer prologue
    /// already executed. Not valid at every instruction, only at call
    /// sites.
    fn default_unwind_plan(&self) -> UnwindPlan;

    /// Write an outgoing call frame: `args` into argument registers (and,
    /// beyond the register count, onto the realigned stack), the return
    /// address into the link register, and the program counter to
    /// `function_address` with any instruction-set mode bit resolved.
    fn prepare_trivial_call(
        &self,
        thread: &mut dyn RegisterContext,
        stack_pointer: u64,
        function_address: u64,
        return_address: u64,
        args: &[u64],
    ) -> Result<()>;

    /// Read the values a just-called function received, one per
    /// descriptor, from argument registers and then the stack.
    fn argument_values(
        &self,
        thread: &mut dyn RegisterContext,
        descriptors: &[ValueDescriptor],
    ) -> Result<Vec<Scalar>>;

    /// Read a function's return value from the designated return
    /// register(s), sign-extending as the descriptor requires.
    fn return_value(
        &self,
        thread: &mut dyn RegisterContext,
        descriptor: &ValueDescriptor,
    ) -> Result<Scalar>;
}

type Matcher = fn(&ArchSpec) -> bool;
type Constructor = fn() -> Arc<dyn Abi>;

struct Registration {
    matcher: Matcher,
    construct: Constructor,
}

/// Process-wide ABI plugin table. Append-only after startup; lookups are
/// read-mostly and results are cached per triple.
pub struct AbiRegistry {
    entries: RwLock<Vec<Registration>>,
    cache: Mutex<HashMap<String, Arc<dyn Abi>>>,
}

impl AbiRegistry {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The global registry, with built-in plugins registered on first use.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<AbiRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let registry = Self::new();
            registry.register(ArchSpec::is_arm, || Arc::new(ArmAbi) as Arc<dyn Abi>);
            registry
        })
    }

    /// Append a plugin. Earlier registrations win on overlapping matchers.
    pub fn register(&self, matcher: Matcher, construct: Constructor) {
        self.entries
            .write()
            .expect("abi registry poisoned")
            .push(Registration { matcher, construct });
    }

    /// Resolve the plugin claiming `arch`, constructing and caching its
    /// singleton on first use.
    pub fn lookup(&self, arch: &ArchSpec) -> Result<Arc<dyn Abi>> {
        let key = arch.to_string();
        let mut cache = self.cache.lock().expect("abi cache poisoned");
        if let Some(abi) = cache.get(&key) {
            return Ok(Arc::clone(abi));
        }
        let entries = self.entries.read().expect("abi registry poisoned");
        for registration in entries.iter() {
            if (registration.matcher)(arch) {
                let abi = (registration.construct)();
                debug!(arch = %arch, abi = abi.name(), "selected ABI plugin");
                cache.insert(key, Arc::clone(&abi));
                return Ok(abi);
            }
        }
        Err(Error::UnsupportedArchitecture(key))
    }
}

/// Look up the ABI for an architecture in the global registry.
pub fn abi_for_arch(arch: &ArchSpec) -> Result<Arc<dyn Abi>> {
    AbiRegistry::global().lookup(arch)
}
