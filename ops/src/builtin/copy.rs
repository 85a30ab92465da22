use core_types::DataType;

use crate::error::OpError;
use crate::gpu_operation::GpuOperation;
use crate::op::{Op, RegistrationInfo};
use crate::register_op;
use crate::types::{OpAttributes, OpSignature, OperationDef};


/// Identity; mostly useful as a host for linked ops.
pub struct CopyOp {
    sig: OpSignature,
}

impl CopyOp {
    pub fn new() -> Self {
        Self {
            sig: OpSignature {
                name:         "copy",
                num_inputs:   1,
                input_dtypes: vec![vec![DataType::F16, DataType::F32, DataType::I32, DataType::U32]],
            },
        }
    }
}

impl RegistrationInfo for CopyOp {
    const NAME: &'static str = "copy";
}

impl Op for CopyOp {
    fn signature(&self) -> &OpSignature { &self.sig }

    fn create<'a>(&self, definition: &OperationDef, _attrs: &OpAttributes) -> Result<GpuOperation<'a>, OpError> {
        Ok(GpuOperation::new_elementwise(definition.clone(), String::new()))
    }
}

register_op!(CopyOp);
