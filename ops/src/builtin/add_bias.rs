use core_types::AccessType;
use tensor::{BufferDescriptor, pad_to_slices};

use crate::error::OpError;
use crate::gpu_operation::GpuOperation;
use crate::op::{Op, RegistrationInfo};
use crate::register_op;
use crate::types::{OpAttributes, OpSignature, OperationDef};

use super::FLOAT_TYPES;


/// Adds a per-channel constant, stored one slice per element.
pub struct AddBiasOp {
    sig: OpSignature,
}

impl AddBiasOp {
    pub fn new() -> Self {
        Self {
            sig: OpSignature {
                name:         "add_bias",
                num_inputs:   1,
                input_dtypes: vec![FLOAT_TYPES.to_vec()],
            },
        }
    }
}

impl RegistrationInfo for AddBiasOp {
    const NAME: &'static str = "add_bias";
}

impl Op for AddBiasOp {
    fn signature(&self) -> &OpSignature { &self.sig }

    fn create<'a>(&self, definition: &OperationDef, attrs: &OpAttributes) -> Result<GpuOperation<'a>, OpError> {
        if attrs.bias.is_empty() {
            return Err(OpError::MissingAttribute { op: Self::NAME.to_string(), attribute: "bias" });
        }
        let biases = BufferDescriptor::from_slice(&pad_to_slices(&attrs.bias), 4);

        let mut op = GpuOperation::new_elementwise(
            definition.clone(),
            "  in_out_value += TO_FLT4(args.biases.Read(Z));\n",
        );
        op.args_mut().add_object_ref("biases", AccessType::Read, biases);
        Ok(op)
    }
}

register_op!(AddBiasOp);
