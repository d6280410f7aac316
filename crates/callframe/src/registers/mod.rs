pub mod arm;
mod info;
mod value;

pub use info::{
    Encoding, INVALID_REGISTER, RegisterId, RegisterInfo, RegisterKind, RegisterRole,
    register_with_role,
};
pub use value::{RegisterValue, Scalar};
