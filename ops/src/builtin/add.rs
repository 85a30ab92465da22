use crate::error::OpError;
use crate::gpu_operation::GpuOperation;
use crate::op::{Op, RegistrationInfo};
use crate::register_op;
use crate::types::{OpAttributes, OpSignature, OperationDef};

use super::FLOAT_TYPES;


/// “add” src + src_data_1 → dst
pub struct AddOp {
    sig: OpSignature,
}

impl AddOp {
    pub fn new() -> Self {
        Self {
            sig: OpSignature {
                name:         "add",
                num_inputs:   2,
                input_dtypes: vec![FLOAT_TYPES.to_vec(), FLOAT_TYPES.to_vec()],
            },
        }
    }
}

impl RegistrationInfo for AddOp {
    const NAME: &'static str = "add";
}

impl Op for AddOp {
    fn signature(&self) -> &OpSignature { &self.sig }

    fn create<'a>(&self, definition: &OperationDef, _attrs: &OpAttributes) -> Result<GpuOperation<'a>, OpError> {
        let mut code = String::new();
        let mut extra = Vec::new();
        for (i, desc) in definition.src_tensors.iter().enumerate().skip(1) {
            let tensor_name = format!("src_data_{i}");
            code += &format!("  in_out_value += args.{tensor_name}.Read(X, Y, Z);\n");
            extra.push((tensor_name, desc.clone()));
        }

        let mut op = GpuOperation::new_elementwise(definition.clone(), code);
        for (tensor_name, desc) in extra {
            op.add_src_tensor(&tensor_name, desc);
        }
        Ok(op)
    }
}

register_op!(AddOp);
