use core_types::{Axis, CalculationsPrecision, DataType, Int3, TensorStorageType};
use serde::{Deserialize, Serialize};
use tensor::TensorDescriptor;

/// The full signature of an operation:
/// - `name`
/// - number of source tensors (the primary input included)
/// - allowed DataTypes per source tensor
#[derive(Debug, Clone)]
pub struct OpSignature {
    pub name:          &'static str,
    pub num_inputs:    usize,
    pub input_dtypes:  Vec<Vec<DataType>>,
}

/// Per-instance parameters of a builtin op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpAttributes {
    /// Leak slope for negative inputs (relu).
    pub alpha:  Option<f32>,
    /// Upper clamp (relu).
    pub clip:   Option<f32>,
    /// Scalar factor (multiply).
    pub scalar: Option<f32>,
    /// Per-channel values (add_bias).
    pub bias:   Vec<f32>,
}

/// Source/destination tensors and precision of one computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationDef {
    pub precision:   CalculationsPrecision,
    pub src_tensors: Vec<TensorDescriptor>,
    pub dst_tensors: Vec<TensorDescriptor>,
}

impl OperationDef {
    /// Element type implied by the precision.
    pub fn data_type(&self) -> DataType {
        self.precision.data_type()
    }

    pub fn primary_data_type(&self) -> Option<DataType> {
        self.src_tensors.first().map(|t| t.data_type)
    }

    pub fn primary_storage_type(&self) -> Option<TensorStorageType> {
        self.src_tensors.first().map(TensorDescriptor::storage_type)
    }

    pub fn is_batch_supported(&self) -> bool {
        self.src_tensors
            .iter()
            .chain(self.dst_tensors.iter())
            .any(|t| t.has_axis(Axis::Batch))
    }
}

/// How the destination tensor's axes map onto the dispatch grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorToGrid {
    /// Use the explicitly configured grid size.
    #[default]
    Custom,
    /// width*batch -> x, height*depth -> y, slices -> z
    WbToXHdToYSToZ,
    /// width*batch -> x, height*depth -> y, z = 1
    WbToXHdToYZIs1,
    /// width*batch -> x, height -> y, depth -> z
    WbToXHToYDToZ,
    /// batch -> x, y = z = 1
    BToXYIs1ZIs1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilerOptions {
    AdrenoFullSimdLine,
    AdrenoMoreWaves,
    ClFastRelaxedMath,
    ClDisableOptimizations,
    Cl20,
    ClReceiveSyncDataWithRealRuntime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TuningType {
    Exhaustive,
    #[default]
    Fast,
}

/// Limits reported for one compiled kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelInfo {
    pub private_memory_size: i32,
    pub max_work_group_size: i32,
}

impl Default for KernelInfo {
    fn default() -> Self {
        Self { private_memory_size: 0, max_work_group_size: 256 }
    }
}

/// One launch candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchInfo {
    pub work_group_size:   Int3,
    pub work_groups_count: Int3,
}
