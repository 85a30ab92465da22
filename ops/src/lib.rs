pub mod arguments;
pub mod builtin;
pub mod error;
pub mod gpu_operation;
pub mod grid;
pub mod op;
pub mod types;
pub mod work_group_picking;

use std::collections::HashMap;

pub use arguments::{Arguments, GpuObjectRef};
pub use error::OpError;
pub use gpu_operation::GpuOperation;
pub use grid::{get_work_groups_count, grid_from_tensor};
pub use op::{Op, OpFactory, RegistrationInfo};
pub use types::{
    CompilerOptions, DispatchInfo, KernelInfo, OpAttributes, OpSignature, OperationDef, TensorToGrid, TuningType,
};
pub use work_group_picking::get_possible_work_groups;


/// Register an operation with the inventory system
#[macro_export]
macro_rules! register_op {
    ($op_type:ident) => {
        inventory::submit! {
            $crate::OpFactory {
                name: <$op_type as $crate::RegistrationInfo>::NAME,
                factory: || Box::new($op_type::new()),
            }
        }
    };
}


/// Holds all registered ops, validates signature & dtypes, then builds the operation
#[derive(Default)]
pub struct OpRegistry {
    map: HashMap<&'static str, Box<dyn Op>>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Registry holding every op submitted through [`register_op!`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.collect_inventory();
        registry
    }

    pub fn collect_inventory(&mut self) {
        for factory in inventory::iter::<OpFactory> {
            let op = (factory.factory)();
            self.register_boxed(factory.name, op);
        }
        log::debug!("op registry holds {} op(s)", self.map.len());
    }

    /// Register a new Op under its signature name
    pub fn register<O: Op + 'static>(&mut self, op: O) {
        let name = op.signature().name;
        self.map.insert(name, Box::new(op));
    }

    /// Register a boxed Op with an explicit name
    pub fn register_boxed(&mut self, name: &'static str, op: Box<dyn Op>) {
        self.map.insert(name, op);
    }

    /// Lookup + validate arity & dtypes + create in one call
    pub fn check_and_create<'a>(
        &self,
        name:       &str,
        definition: &OperationDef,
        attrs:      &OpAttributes,
    ) -> Result<GpuOperation<'a>, OpError> {
        let op = self.map.get(name)
            .ok_or_else(|| OpError::UnknownOp(name.to_string()))?;
        let sig = op.signature();

        if definition.src_tensors.len() != sig.num_inputs {
            return Err(OpError::ArityMismatch {
                op: name.to_string(),
                expected: sig.num_inputs,
                found: definition.src_tensors.len(),
            });
        }
        for (i, (t, allowed)) in definition.src_tensors.iter().zip(&sig.input_dtypes).enumerate() {
            if !allowed.contains(&t.data_type) {
                return Err(OpError::DtypeMismatch {
                    op: name.to_string(),
                    index: i,
                    expected: allowed.clone(),
                    found: t.data_type,
                });
            }
        }
        if definition.dst_tensors.is_empty() {
            return Err(OpError::MissingDefinition("destination"));
        }

        op.create(definition, attrs)
    }

    /// lookup sans validation
    pub fn get(&self, name: &str) -> Option<&dyn Op> {
        self.map.get(name).map(|b| b.as_ref())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.map.keys().copied().collect();
        names.sort_unstable();
        names
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{CalculationsPrecision, DataType, Layout, TensorStorageType};
    use kgen_core::GpuInfo;
    use tensor::TensorDescriptor;

    fn def(srcs: usize, data_type: DataType) -> OperationDef {
        let desc = TensorDescriptor::new(data_type, TensorStorageType::Buffer, Layout::Hwc);
        OperationDef {
            precision:   CalculationsPrecision::F32,
            src_tensors: vec![desc.clone(); srcs],
            dst_tensors: vec![desc],
        }
    }

    #[test]
    fn builtins_are_collected() {
        let reg = OpRegistry::with_builtins();
        assert_eq!(reg.names(), vec!["add", "add_bias", "copy", "multiply", "relu"]);
        assert_eq!(reg.get("add").map(|op| op.signature().num_inputs), Some(2));
        assert!(reg.get("extremely_strange_op").is_none());
    }

    #[test]
    fn requests_are_validated_before_creation() {
        let reg = OpRegistry::with_builtins();
        let attrs = OpAttributes::default();

        let err = reg.check_and_create("extremely_strange_op", &def(1, DataType::F32), &attrs).unwrap_err();
        assert!(matches!(err, OpError::UnknownOp(ref name) if name == "extremely_strange_op"));

        let err = reg.check_and_create("add", &def(1, DataType::F32), &attrs).unwrap_err();
        assert!(matches!(err, OpError::ArityMismatch { expected: 2, found: 1, .. }));

        let err = reg.check_and_create("relu", &def(1, DataType::I32), &attrs).unwrap_err();
        assert!(matches!(err, OpError::DtypeMismatch { index: 0, found: DataType::I32, .. }));

        let mut no_dst = def(1, DataType::F32);
        no_dst.dst_tensors.clear();
        let err = reg.check_and_create("copy", &no_dst, &attrs).unwrap_err();
        assert!(matches!(err, OpError::MissingDefinition("destination")));

        let err = reg.check_and_create("add_bias", &def(1, DataType::F32), &attrs).unwrap_err();
        assert!(matches!(err, OpError::MissingAttribute { attribute: "bias", .. }));
    }

    #[test]
    fn bias_then_relu_fuse_into_one_copy_kernel() {
        let reg = OpRegistry::with_builtins();
        let definition = def(1, DataType::F32);

        let mut host = reg.check_and_create("copy", &definition, &OpAttributes::default()).unwrap();
        let bias = OpAttributes { bias: vec![1.0, 2.0, 3.0, 4.0, 5.0], ..OpAttributes::default() };
        host.add_operation(reg.check_and_create("add_bias", &definition, &bias).unwrap()).unwrap();
        let leaky = OpAttributes { alpha: Some(0.5), ..OpAttributes::default() };
        host.add_operation(reg.check_and_create("relu", &definition, &leaky).unwrap()).unwrap();
        assert_eq!(host.link_count(), 2);

        host.assemble_code(&GpuInfo::default()).unwrap();
        assert_eq!(host.src_tensors_names(), ["src_tensor"]);
        assert_eq!(host.dst_tensors_names(), ["dst_tensor"]);
        // five channels pad to two slices of four floats
        assert_eq!(host.const_args_size(), 32);

        let code = host.code();
        assert_eq!(code.matches("__kernel void main_function").count(), 1);
        assert!(code.contains("  __global const float4* biases_link1,\n"));
        assert!(code.contains("  float alpha_link2\n) {"));
        let bias_at = code.find("in_out_value += TO_FLT4(biases_link1[Z]);").unwrap();
        let relu_at = code
            .find("in_out_value = max(in_out_value, min(in_out_value * alpha_link2, INIT_FLT4(0.0f)));")
            .unwrap();
        assert!(bias_at < relu_at);
        assert!(code.contains("dst_tensor_buffer[(((Z) * dst_tensor_height + (Y)) * dst_tensor_width + (X))] = in_out_value;"));
    }

    #[test]
    fn custom_registration_overrides_builtin() {
        struct Noop(OpSignature);
        impl Op for Noop {
            fn signature(&self) -> &OpSignature { &self.0 }
            fn create<'a>(&self, d: &OperationDef, _: &OpAttributes) -> Result<GpuOperation<'a>, OpError> {
                Ok(GpuOperation::new(d.clone()))
            }
        }

        let mut reg = OpRegistry::with_builtins();
        reg.register(Noop(OpSignature { name: "copy", num_inputs: 1, input_dtypes: vec![vec![DataType::U32]] }));
        let op = reg.check_and_create("copy", &def(1, DataType::U32), &OpAttributes::default()).unwrap();
        assert!(!op.is_elementwise());
    }
}
