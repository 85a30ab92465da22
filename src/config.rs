use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use core_types::{Axis, CalculationsPrecision, Int3, Layout, TensorStorageType};
use kgen_core::GpuInfo;
use kgen_ops::gpu_operation::DEFAULT_WORK_GROUP_SIZE;
use kgen_ops::grid::is_valid_launch_order;
use kgen_ops::OpAttributes;
use serde::Deserialize;
use tensor::Bhwdc;

/// One step of the chain. The first op hosts the kernel, the rest are linked into it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpConfig {
    pub name:   String,
    #[serde(default)]
    pub alpha:  Option<f32>,
    #[serde(default)]
    pub clip:   Option<f32>,
    #[serde(default)]
    pub scalar: Option<f32>,
    #[serde(default)]
    pub bias:   Vec<f32>,
}

impl OpConfig {
    pub fn attrs(&self) -> OpAttributes {
        OpAttributes {
            alpha:  self.alpha,
            clip:   self.clip,
            scalar: self.scalar,
            bias:   self.bias.clone(),
        }
    }
}

/// Everything needed to generate one fused kernel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub precision:       CalculationsPrecision,
    #[serde(default)]
    pub storage_type:    TensorStorageType,
    /// Inferred from `shape` when absent.
    #[serde(default)]
    pub layout:          Option<Layout>,
    /// Destination tensor shape.
    pub shape:           Bhwdc,
    /// Channels of the primary source, when narrower than the destination.
    #[serde(default)]
    pub src_channels:    Option<i32>,
    #[serde(default = "default_grid_dimension")]
    pub grid_dimension:  u32,
    #[serde(default = "default_work_group_size")]
    pub work_group_size: Int3,
    #[serde(default = "Int3::identity_order")]
    pub launch_order:    Int3,
    #[serde(default)]
    pub device:          Option<GpuInfo>,
    pub ops:             Vec<OpConfig>,
}

fn default_grid_dimension() -> u32 {
    3
}

fn default_work_group_size() -> Int3 {
    DEFAULT_WORK_GROUP_SIZE
}

impl PipelineConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("invalid pipeline config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ops.is_empty() {
            bail!("pipeline has no ops");
        }
        if !(1..=3).contains(&self.grid_dimension) {
            bail!("grid_dimension must be 1, 2 or 3, got {}", self.grid_dimension);
        }
        let Bhwdc { b, h, w, d, c } = self.shape;
        if [b, h, w, d, c].iter().any(|v| *v <= 0) {
            bail!("shape extents must be positive, got {:?}", self.shape);
        }
        if let Some(src_channels) = self.src_channels {
            if src_channels <= 0 || src_channels > c {
                bail!("src_channels must be in 1..={c}, got {src_channels}");
            }
        }
        for axis in 0..3 {
            if self.work_group_size[axis] <= 0 {
                bail!("work_group_size must be positive, got {}", self.work_group_size);
            }
        }
        let mut order = [self.launch_order.x, self.launch_order.y, self.launch_order.z];
        order.sort_unstable();
        if order != [0, 1, 2] {
            bail!("launch_order must be a permutation of 0, 1, 2, got {}", self.launch_order);
        }
        if !is_valid_launch_order(self.grid_dimension, self.launch_order) {
            bail!(
                "launch_order {} reorders axes outside a {}D grid",
                self.launch_order,
                self.grid_dimension,
            );
        }
        let layout = self.layout();
        if b > 1 && !layout.has_axis(Axis::Batch) {
            bail!("layout {layout:?} has no batch axis but shape has b = {b}");
        }
        if d > 1 && !layout.has_axis(Axis::Depth) {
            bail!("layout {layout:?} has no depth axis but shape has d = {d}");
        }
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        self.layout.unwrap_or(match (self.shape.b > 1, self.shape.d > 1) {
            (true, true) => Layout::Bhwdc,
            (true, false) => Layout::Bhwc,
            (false, true) => Layout::Hwdc,
            (false, false) => Layout::Hwc,
        })
    }
}
