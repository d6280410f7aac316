#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No ABI plugin claims architecture '{0}'")]
    UnsupportedArchitecture(String),

    #[error("Invalid architecture triple: {0}")]
    InvalidTriple(String),

    #[error("Register '{0}' cannot be resolved on the current target")]
    UnresolvedRegister(String),

    #[error("Unsupported value encoding: {0}")]
    UnsupportedValueEncoding(String),

    #[error("Invalid instruction range [{base:#x}, +{byte_size})")]
    InvalidRange { base: u64, byte_size: u64 },

    #[error("Unusable unwind plan: {0}")]
    InvalidUnwindPlan(String),

    #[error("Memory access failed at {address:#x}")]
    MemoryAccess { address: u64 },

    #[error("Register access failed: {0}")]
    RegisterAccess(String),
}

pub type Result<T> = std::result::Result<T, Error>;
