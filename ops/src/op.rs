use crate::error::OpError;
use crate::gpu_operation::GpuOperation;
use crate::types::{OpAttributes, OpSignature, OperationDef};


/// Trait to implement for each Op
pub trait Op: Send + Sync {
    /// Full signature
    fn signature(&self) -> &OpSignature;

    /// Builds the operation for an already validated definition.
    fn create<'a>(&self, definition: &OperationDef, attrs: &OpAttributes) -> Result<GpuOperation<'a>, OpError>;
}

/// Name an op registers under.
pub trait RegistrationInfo {
    const NAME: &'static str;
}


/// Wrapper for op factory functions
pub struct OpFactory {
    pub name: &'static str,
    pub factory: fn() -> Box<dyn Op>,
}

// Collect all registered ops
inventory::collect!(OpFactory);
