use core_types::{DataType, Int3, TensorStorageType};
use tensor::SelectorError;
use thiserror::Error;

/// Errors from building, fusing and assembling GPU operations.
#[derive(Debug, Error)]
pub enum OpError {
    /* -------------------------- registry lookup --------------------------- */
    #[error("unknown op '{0}'")]
    UnknownOp(String),

    #[error("op '{op}' expects {expected} source tensor(s), found {found}")]
    ArityMismatch { op: String, expected: usize, found: usize },

    #[error("op '{op}' source {index}: expected one of {expected:?}, found {found:?}")]
    DtypeMismatch { op: String, index: usize, expected: Vec<DataType>, found: DataType },

    #[error("op '{op}' is missing attribute '{attribute}'")]
    MissingAttribute { op: String, attribute: &'static str },

    /* --------------------------- fusion / merge --------------------------- */
    #[error("argument '{name}' is already bound")]
    NameCollision { name: String },

    #[error("operation is not linkable")]
    NotLinkable,

    #[error("linked source {child:?}/{child_storage:?} does not match host output {host:?}/{host_storage:?}")]
    LinkMismatch {
        host:          DataType,
        host_storage:  TensorStorageType,
        child:         DataType,
        child_storage: TensorStorageType,
    },

    /* ---------------------------- compilation ----------------------------- */
    #[error("kernel references unknown argument '{name}'")]
    UnknownArgument { name: String },

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("argument '{name}' uses {data_type:?}, which the device does not support")]
    UnsupportedDataType { name: String, data_type: DataType },

    #[error("malformed kernel code: {0}")]
    MalformedCode(String),

    /* ------------------------- caller contract ---------------------------- */
    #[error("AssembleCode already called on this operation")]
    AlreadyAssembled,

    #[error("launch order {order} is not a permutation of the {dimension} grid axes")]
    InvalidLaunchOrder { dimension: u32, order: Int3 },

    #[error("no tensor bound at {kind} slot {index}")]
    MissingTensor { kind: &'static str, index: usize },

    #[error("operation definition has no {0} tensor")]
    MissingDefinition(&'static str),
}
