use crate::error::OpError;
use crate::gpu_operation::GpuOperation;
use crate::op::{Op, RegistrationInfo};
use crate::register_op;
use crate::types::{OpAttributes, OpSignature, OperationDef};

use super::FLOAT_TYPES;


/// max(x, alpha * x) with an optional upper clip.
pub struct ReluOp {
    sig: OpSignature,
}

impl ReluOp {
    pub fn new() -> Self {
        Self {
            sig: OpSignature {
                name:         "relu",
                num_inputs:   1,
                input_dtypes: vec![FLOAT_TYPES.to_vec()],
            },
        }
    }
}

impl RegistrationInfo for ReluOp {
    const NAME: &'static str = "relu";
}

impl Op for ReluOp {
    fn signature(&self) -> &OpSignature { &self.sig }

    fn create<'a>(&self, definition: &OperationDef, attrs: &OpAttributes) -> Result<GpuOperation<'a>, OpError> {
        let alpha = attrs.alpha.filter(|a| *a != 0.0);
        let clip = attrs.clip.filter(|c| *c != 0.0);

        let min_func = if alpha.is_some() {
            "min(in_out_value * args.alpha, INIT_FLT4(0.0f))"
        } else {
            "INIT_FLT4(0.0f)"
        };
        let code = if clip.is_some() {
            format!("  in_out_value = clamp(in_out_value, {min_func}, INIT_FLT4(args.clip));\n")
        } else {
            format!("  in_out_value = max(in_out_value, {min_func});\n")
        };

        let mut op = GpuOperation::new_elementwise(definition.clone(), code);
        if let Some(alpha) = alpha {
            op.args_mut().add_float("alpha", alpha);
        }
        if let Some(clip) = clip {
            op.args_mut().add_float("clip", clip);
        }
        Ok(op)
    }
}

register_op!(ReluOp);


#[cfg(test)]
mod tests {
    use super::*;

    fn create(alpha: Option<f32>, clip: Option<f32>) -> GpuOperation<'static> {
        let attrs = OpAttributes { alpha, clip, ..OpAttributes::default() };
        ReluOp::new().create(&OperationDef::default(), &attrs).unwrap()
    }

    #[test]
    fn plain_relu_binds_nothing() {
        let op = create(None, Some(0.0));
        assert!(op.args().is_empty());
        assert_eq!(op.code(), "  in_out_value = max(in_out_value, INIT_FLT4(0.0f));\n");
    }

    #[test]
    fn leak_and_clip_become_scalars() {
        let op = create(Some(0.1), Some(6.0));
        assert_eq!(op.args().float("alpha"), Some(0.1));
        assert_eq!(op.args().float("clip"), Some(6.0));
        assert!(op.code().contains("clamp(in_out_value, min(in_out_value * args.alpha, INIT_FLT4(0.0f)), INIT_FLT4(args.clip))"));
    }
}
