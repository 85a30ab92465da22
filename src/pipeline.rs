use anyhow::{Context, Result};
use core_types::Int3;
use kgen_core::GpuInfo;
use kgen_ops::{DispatchInfo, KernelInfo, OpRegistry, OperationDef, TuningType};
use tensor::{Bhwdc, SpatialTensor, Tensor, TensorDescriptor};

use crate::config::{OpConfig, PipelineConfig};

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct GeneratedKernel {
    pub code:              String,
    pub grid_size:         Int3,
    pub work_group_size:   Int3,
    pub work_groups_count: Int3,
    /// Launch candidates for the requested tuning type.
    pub dispatches:        Vec<DispatchInfo>,
    pub const_args_size:   usize,
    pub link_count:        u32,
}

fn definition_for(registry: &OpRegistry, op: &OpConfig, config: &PipelineConfig) -> Result<OperationDef> {
    let num_inputs = registry
        .get(&op.name)
        .map(|o| o.signature().num_inputs)
        .with_context(|| format!("unknown op '{}'", op.name))?;
    let desc = TensorDescriptor::new(config.precision.data_type(), config.storage_type, config.layout());
    Ok(OperationDef {
        precision:   config.precision,
        src_tensors: vec![desc.clone(); num_inputs],
        dst_tensors: vec![desc],
    })
}

/// Builds the first op as host, links every following op into it and
/// assembles the kernel for `gpu_info`.
pub fn generate(
    config: &PipelineConfig,
    registry: &OpRegistry,
    gpu_info: &GpuInfo,
    tuning_type: TuningType,
) -> Result<GeneratedKernel> {
    let Some((first, rest)) = config.ops.split_first() else {
        anyhow::bail!("pipeline has no ops");
    };

    let desc = TensorDescriptor::new(config.precision.data_type(), config.storage_type, config.layout());
    let dst = Tensor::new(config.shape, desc.clone());
    let src_channels = config.src_channels.unwrap_or(config.shape.c);
    let src = Tensor::new(Bhwdc { c: src_channels, ..config.shape }, desc);

    let definition = definition_for(registry, first, config)?;
    let mut host = registry
        .check_and_create(&first.name, &definition, &first.attrs())
        .with_context(|| format!("failed to create host op '{}'", first.name))?;
    host.set_src(&src, 0);
    host.set_dst(&dst, 0);
    if src.slices() < dst.slices() {
        host.set_check_src_slices(true);
    }

    for op in rest {
        let definition = definition_for(registry, op, config)?;
        let child = registry
            .check_and_create(&op.name, &definition, &op.attrs())
            .with_context(|| format!("failed to create op '{}'", op.name))?;
        host.add_operation(child)
            .with_context(|| format!("failed to link op '{}'", op.name))?;
    }

    host.set_grid_dimension(config.grid_dimension);
    host.set_work_group_size(config.work_group_size);
    host.set_work_group_launch_order(config.launch_order);

    host.assemble_code(gpu_info).context("kernel assembly failed")?;
    host.recalculate_grid_size()?;
    host.recalculate_work_groups_count()?;
    let dispatches = host.get_possible_dispatches(tuning_type, gpu_info, &KernelInfo::default())?;

    log::info!(
        "generated '{}' kernel with {} linked op(s): grid {}, {} work group(s) of {}",
        first.name,
        host.link_count(),
        host.grid_size(),
        host.work_groups_count().volume(),
        host.work_group_size(),
    );

    Ok(GeneratedKernel {
        code:              host.code().to_string(),
        grid_size:         host.grid_size(),
        work_group_size:   host.work_group_size(),
        work_groups_count: host.work_groups_count(),
        dispatches,
        const_args_size:   host.const_args_size(),
        link_count:        host.link_count(),
    })
}
