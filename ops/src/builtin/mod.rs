//! Elementwise ops that can run standalone or be linked into a host kernel.

mod add;
mod add_bias;
mod copy;
mod multiply;
mod relu;

pub use add::AddOp;
pub use add_bias::AddBiasOp;
pub use copy::CopyOp;
pub use multiply::MultiplyOp;
pub use relu::ReluOp;

use core_types::DataType;

/// Element types arithmetic builtins accept.
pub(crate) const FLOAT_TYPES: [DataType; 2] = [DataType::F16, DataType::F32];
