//! Generates fused elementwise GPU kernels from a YAML pipeline description.

pub mod config;
pub mod pipeline;

pub use core_types;
pub use kgen_core;
pub use kgen_ops as ops;
pub use tensor;

pub use config::{OpConfig, PipelineConfig};
pub use pipeline::{generate, GeneratedKernel};
