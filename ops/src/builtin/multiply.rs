use crate::error::OpError;
use crate::gpu_operation::GpuOperation;
use crate::op::{Op, RegistrationInfo};
use crate::register_op;
use crate::types::{OpAttributes, OpSignature, OperationDef};

use super::FLOAT_TYPES;


/// Scales every element by a float scalar.
pub struct MultiplyOp {
    sig: OpSignature,
}

impl MultiplyOp {
    pub fn new() -> Self {
        Self {
            sig: OpSignature {
                name:         "multiply",
                num_inputs:   1,
                input_dtypes: vec![FLOAT_TYPES.to_vec()],
            },
        }
    }
}

impl RegistrationInfo for MultiplyOp {
    const NAME: &'static str = "multiply";
}

impl Op for MultiplyOp {
    fn signature(&self) -> &OpSignature { &self.sig }

    fn create<'a>(&self, definition: &OperationDef, attrs: &OpAttributes) -> Result<GpuOperation<'a>, OpError> {
        let scalar = attrs
            .scalar
            .ok_or(OpError::MissingAttribute { op: Self::NAME.to_string(), attribute: "scalar" })?;
        let mut op = GpuOperation::new_elementwise(definition.clone(), "  in_out_value *= args.scalar;\n");
        op.args_mut().add_float("scalar", scalar);
        Ok(op)
    }
}

register_op!(MultiplyOp);


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_is_required() {
        let err = MultiplyOp::new()
            .create(&OperationDef::default(), &OpAttributes::default())
            .unwrap_err();
        assert!(matches!(err, OpError::MissingAttribute { attribute: "scalar", .. }));
    }
}
