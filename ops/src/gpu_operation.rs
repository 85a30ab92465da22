use std::collections::BTreeMap;

use core_types::{AccessType, DataType, Int3};
use kgen_core::GpuInfo;
use tensor::{BufferDescriptor, SpatialTensor, TensorDescriptor, Texture2DDescriptor};

use crate::arguments::Arguments;
use crate::error::OpError;
use crate::grid::{get_work_groups_count, grid_from_tensor, is_valid_launch_order};
use crate::types::{CompilerOptions, DispatchInfo, KernelInfo, OperationDef, TensorToGrid, TuningType};
use crate::work_group_picking::get_possible_work_groups;

const SRC_TENSOR: &str = "src_tensor";
const DST_TENSOR: &str = "dst_tensor";

pub const DEFAULT_WORK_GROUP_SIZE: Int3 = Int3::new(8, 4, 1);

/// Kernel wrapper shared by every elementwise operation.
fn get_element_wise_code(check_src_slices: bool) -> String {
    let mut c = String::new();
    c += "MAIN_FUNCTION(\n";
    c += "$0) {\n";
    c += "  int X = GLOBAL_ID_0;\n";
    c += "  int Y = GLOBAL_ID_1;\n";
    c += "  int Z = GLOBAL_ID_2;\n";
    c += "  if (X >= args.dst_tensor.Width() || Y >= args.dst_tensor.Height() || \
          Z >= args.dst_tensor.Slices()) return; \n";
    if check_src_slices {
        c += "  args.src_tensor::type src = args.src_tensor::zero_value;\n";
        c += "  if (Z < args.src_tensor.Slices()) {\n";
        c += "    src = args.src_tensor.Read(X, Y, Z);\n";
        c += "  }\n";
    } else {
        c += "  args.src_tensor::type src = args.src_tensor.Read(X, Y, Z);\n";
    }
    c += "  args.dst_tensor.Write(src, X, Y, Z);\n";
    c += "} \n";
    c
}

/// Type macros the op code bodies are written against, plus the samplers
/// texture reads use.
fn kernel_header(data_type: DataType) -> String {
    let scalar = data_type.scalar_name();
    let mut defines = String::new();
    if data_type == DataType::F16 {
        defines += "#pragma OPENCL EXTENSION cl_khr_fp16 : enable\n";
    }
    defines += &format!("#define FLT {scalar}\n");
    defines += &format!("#define FLT4 {scalar}4\n");
    defines += &format!("#define INIT_FLT4(v) ({scalar}4)(v)\n");
    defines += &format!("#define TO_FLT4(v) convert_{scalar}4(v)\n");
    defines += "__constant sampler_t smp_zero = CLK_NORMALIZED_COORDS_FALSE | CLK_ADDRESS_CLAMP | CLK_FILTER_NEAREST;\n";
    defines += "__constant sampler_t smp_none = CLK_NORMALIZED_COORDS_FALSE | CLK_ADDRESS_NONE | CLK_FILTER_NEAREST;\n";
    defines
}

/// A kernel under construction: its code, its arguments, and how it is
/// launched.
///
/// Source and destination tensors are borrowed for shape queries only; the
/// operation never outlives them. Moving out with [`std::mem::take`] leaves
/// a freshly constructed default operation behind.
pub struct GpuOperation<'a> {
    pub(crate) args:          Arguments,
    pub(crate) code:          String,
    work_group_size:          Int3,
    compiler_options:         Vec<CompilerOptions>,
    tensor_to_grid:           TensorToGrid,
    pub(crate) elementwise:   bool,
    pub(crate) linkable:      bool,
    check_src_slices:         bool,
    flops:                    u64,
    const_args_size:          usize,
    pub(crate) definition:    OperationDef,
    src:                      Vec<Option<&'a dyn SpatialTensor>>,
    dst:                      Vec<Option<&'a dyn SpatialTensor>>,
    grid_dimension:           u32,
    work_group_launch_order:  Int3,
    grid_size:                Int3,
    src_tensors_names:        Vec<String>,
    dst_tensors_names:        Vec<String>,
    work_groups_count:        Int3,
    link_count:               u32,
    elementwise_code:         String,
    assembled:                bool,
}

impl std::fmt::Debug for GpuOperation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuOperation")
            .field("definition", &self.definition)
            .field("grid_size", &self.grid_size)
            .field("work_group_size", &self.work_group_size)
            .finish_non_exhaustive()
    }
}

impl Default for GpuOperation<'_> {
    fn default() -> Self {
        Self::new(OperationDef::default())
    }
}

impl<'a> GpuOperation<'a> {
    /* --------------------------------------------------------------------- */
    /* Construction                                                          */
    /* --------------------------------------------------------------------- */

    pub fn new(definition: OperationDef) -> Self {
        Self {
            args: Arguments::new(),
            code: String::new(),
            work_group_size: DEFAULT_WORK_GROUP_SIZE,
            compiler_options: Vec::new(),
            tensor_to_grid: TensorToGrid::Custom,
            elementwise: false,
            linkable: false,
            check_src_slices: false,
            flops: 0,
            const_args_size: 0,
            definition,
            src: Vec::new(),
            dst: Vec::new(),
            grid_dimension: 3,
            work_group_launch_order: Int3::identity_order(),
            grid_size: Int3::new(1, 1, 1),
            src_tensors_names: Vec::new(),
            dst_tensors_names: Vec::new(),
            work_groups_count: Int3::default(),
            link_count: 0,
            elementwise_code: String::new(),
            assembled: false,
        }
    }

    /// Per-element operation whose `code` transforms `in_out_value`.
    pub fn new_elementwise(definition: OperationDef, code: impl Into<String>) -> Self {
        let mut op = Self::new(definition);
        op.code = code.into();
        op.elementwise = true;
        op.linkable = true;
        op.tensor_to_grid = TensorToGrid::WbToXHdToYSToZ;
        op
    }

    /* --------------------------------------------------------------------- */
    /* Tensors                                                               */
    /* --------------------------------------------------------------------- */

    pub fn set_src(&mut self, tensor: &'a dyn SpatialTensor, index: usize) {
        if index >= self.src.len() {
            self.src.resize(index + 1, None);
        }
        self.src[index] = Some(tensor);
    }

    pub fn set_dst(&mut self, tensor: &'a dyn SpatialTensor, index: usize) {
        if index >= self.dst.len() {
            self.dst.resize(index + 1, None);
        }
        self.dst[index] = Some(tensor);
    }

    pub fn src(&self, index: usize) -> Option<&'a dyn SpatialTensor> {
        self.src.get(index).copied().flatten()
    }

    pub fn dst(&self, index: usize) -> Option<&'a dyn SpatialTensor> {
        self.dst.get(index).copied().flatten()
    }

    pub fn add_src_tensor(&mut self, tensor_name: &str, desc: TensorDescriptor) {
        self.src_tensors_names.push(tensor_name.to_string());
        self.args.add_object_ref(tensor_name, AccessType::Read, desc);
    }

    pub fn add_src_buffer(&mut self, buffer_name: &str, desc: BufferDescriptor) {
        self.src_tensors_names.push(buffer_name.to_string());
        self.args.add_object_ref(buffer_name, AccessType::Read, desc);
    }

    pub fn add_src_texture_2d(&mut self, texture_name: &str, desc: Texture2DDescriptor) {
        self.src_tensors_names.push(texture_name.to_string());
        self.args.add_object_ref(texture_name, AccessType::Read, desc);
    }

    pub fn add_dst_tensor(&mut self, tensor_name: &str, desc: TensorDescriptor) {
        self.dst_tensors_names.push(tensor_name.to_string());
        self.args.add_object_ref(tensor_name, AccessType::Write, desc);
    }

    pub fn add_unique_postfix(&mut self, unique_postfix: &str) {
        for name in self.src_tensors_names.iter_mut().chain(self.dst_tensors_names.iter_mut()) {
            name.push_str(unique_postfix);
        }
    }

    /* --------------------------------------------------------------------- */
    /* Fusion                                                                */
    /* --------------------------------------------------------------------- */

    /// Folds a linkable `operation` into this one. Its code runs on this
    /// operation's output value; its arguments are merged under a
    /// `_link<N>` suffix.
    pub fn add_operation(&mut self, operation: GpuOperation<'_>) -> Result<(), OpError> {
        if !operation.linkable {
            return Err(OpError::NotLinkable);
        }
        let Some(child_input) = operation.definition.src_tensors.first() else {
            return Err(OpError::MissingDefinition("source"));
        };
        if operation.definition.src_tensors.len() < operation.src_tensors_names.len() + 1 {
            return Err(OpError::MissingDefinition("source"));
        }
        if let Some(host_output) = self.definition.dst_tensors.first() {
            if (host_output.data_type, host_output.storage_type)
                != (child_input.data_type, child_input.storage_type)
            {
                return Err(OpError::LinkMismatch {
                    host:          host_output.data_type,
                    host_storage:  host_output.storage_type,
                    child:         child_input.data_type,
                    child_storage: child_input.storage_type,
                });
            }
        }

        let link_index = self.link_count + 1;
        let unique_postfix = format!("_link{link_index}");
        let code = operation.args.rename_args(&unique_postfix, &operation.code);

        let GpuOperation { args, definition, src_tensors_names, dst_tensors_names, .. } = operation;
        self.args.merge(args, &unique_postfix)?;

        self.link_count = link_index;
        self.elementwise_code += &format!("{{\n{code}\n}}\n");
        for (name, desc) in src_tensors_names.iter().zip(definition.src_tensors.into_iter().skip(1)) {
            self.definition.src_tensors.push(desc);
            self.src_tensors_names.push(format!("{name}{unique_postfix}"));
        }
        for name in &dst_tensors_names {
            self.dst_tensors_names.push(format!("{name}{unique_postfix}"));
        }
        log::debug!(
            "linked operation as '{}': {} extra source(s), {} destination(s)",
            unique_postfix,
            src_tensors_names.len(),
            dst_tensors_names.len(),
        );
        Ok(())
    }

    /* --------------------------------------------------------------------- */
    /* Assembly                                                              */
    /* --------------------------------------------------------------------- */

    /// Generates the final kernel text. May be called once.
    pub fn assemble_code(&mut self, gpu_info: &GpuInfo) -> Result<(), OpError> {
        if self.assembled {
            return Err(OpError::AlreadyAssembled);
        }

        let kernel = if self.elementwise {
            let batched = self.definition.is_batch_supported();
            let mut src_desc = self
                .definition
                .src_tensors
                .first()
                .cloned()
                .ok_or(OpError::MissingDefinition("source"))?;
            let mut dst_desc = self
                .definition
                .dst_tensors
                .first()
                .cloned()
                .ok_or(OpError::MissingDefinition("destination"))?;
            self.assembled = true;

            if batched {
                src_desc.set_state_var("BatchedWidth", "true");
            }
            self.src_tensors_names.insert(0, SRC_TENSOR.to_string());
            self.args.add_object_ref(SRC_TENSOR, AccessType::Read, src_desc);

            if batched {
                dst_desc.set_state_var("BatchedWidth", "true");
            }
            self.dst_tensors_names.insert(0, DST_TENSOR.to_string());
            self.args.add_object_ref(DST_TENSOR, AccessType::Write, dst_desc);

            self.elementwise_code = format!("{{\n{}\n}}\n{}", self.code, self.elementwise_code);
            get_element_wise_code(self.check_src_slices)
        } else {
            self.assembled = true;
            self.code.clone()
        };

        let primary_dst = self
            .dst_tensors_names
            .first()
            .cloned()
            .ok_or(OpError::MissingDefinition("destination"))?;
        let linkables = BTreeMap::from([(primary_dst, self.elementwise_code.clone())]);
        let compiled = self.args.compile(gpu_info, &linkables, &kernel)?;

        self.code = kernel_header(self.definition.data_type()) + &compiled;
        self.calculate_const_args_size();
        log::debug!(
            "assembled kernel: {} argument(s), {} link(s), {} constant byte(s)",
            self.args.len(),
            self.link_count,
            self.const_args_size,
        );
        log::trace!("kernel text:\n{}", self.code);
        Ok(())
    }

    fn calculate_const_args_size(&mut self) {
        self.const_args_size = self.args.objects().map(|(_, desc)| desc.size_in_bytes()).sum();
    }

    /* --------------------------------------------------------------------- */
    /* Grid                                                                  */
    /* --------------------------------------------------------------------- */

    /// Grid implied by the destination tensor and the mapping policy.
    pub fn compute_grid_size(&self) -> Result<Int3, OpError> {
        let policy = if self.elementwise { TensorToGrid::WbToXHdToYSToZ } else { self.tensor_to_grid };
        if policy == TensorToGrid::Custom {
            return Ok(self.grid_size);
        }
        let dst = self.dst(0).ok_or(OpError::MissingTensor { kind: "destination", index: 0 })?;
        Ok(grid_from_tensor(policy, dst).unwrap_or(self.grid_size))
    }

    pub fn recalculate_grid_size(&mut self) -> Result<(), OpError> {
        self.grid_size = self.compute_grid_size()?;
        Ok(())
    }

    pub fn recalculate_work_groups_count(&mut self) -> Result<(), OpError> {
        self.check_launch_order()?;
        self.work_groups_count = get_work_groups_count(
            self.grid_dimension,
            self.grid_size,
            self.work_group_size,
            self.work_group_launch_order,
        );
        Ok(())
    }

    fn check_launch_order(&self) -> Result<(), OpError> {
        if !is_valid_launch_order(self.grid_dimension, self.work_group_launch_order) {
            return Err(OpError::InvalidLaunchOrder {
                dimension: self.grid_dimension,
                order:     self.work_group_launch_order,
            });
        }
        Ok(())
    }

    pub fn get_possible_kernel_work_groups(
        &self,
        tuning_type: TuningType,
        gpu_info: &GpuInfo,
        kernel_info: &KernelInfo,
    ) -> Vec<Int3> {
        get_possible_work_groups(tuning_type, gpu_info, kernel_info, self.grid_size)
    }

    /// One dispatch per candidate work-group size.
    pub fn get_possible_dispatches(
        &self,
        tuning_type: TuningType,
        gpu_info: &GpuInfo,
        kernel_info: &KernelInfo,
    ) -> Result<Vec<DispatchInfo>, OpError> {
        self.check_launch_order()?;
        let dispatches = self
            .get_possible_kernel_work_groups(tuning_type, gpu_info, kernel_info)
            .into_iter()
            .map(|work_group_size| DispatchInfo {
                work_group_size,
                work_groups_count: get_work_groups_count(
                    self.grid_dimension,
                    self.grid_size,
                    work_group_size,
                    self.work_group_launch_order,
                ),
            })
            .collect();
        Ok(dispatches)
    }

    /* --------------------------------------------------------------------- */
    /* Accessors                                                             */
    /* --------------------------------------------------------------------- */

    pub fn code(&self) -> &str { &self.code }
    pub fn definition(&self) -> &OperationDef { &self.definition }
    pub fn args(&self) -> &Arguments { &self.args }
    pub fn args_mut(&mut self) -> &mut Arguments { &mut self.args }
    pub fn is_elementwise(&self) -> bool { self.elementwise }
    pub fn is_linkable(&self) -> bool { self.linkable }
    pub fn is_assembled(&self) -> bool { self.assembled }
    pub fn check_src_slices(&self) -> bool { self.check_src_slices }
    pub fn tensor_to_grid(&self) -> TensorToGrid { self.tensor_to_grid }
    pub fn grid_dimension(&self) -> u32 { self.grid_dimension }
    pub fn grid_size(&self) -> Int3 { self.grid_size }
    pub fn work_group_size(&self) -> Int3 { self.work_group_size }
    pub fn work_group_launch_order(&self) -> Int3 { self.work_group_launch_order }
    pub fn work_groups_count(&self) -> Int3 { self.work_groups_count }
    pub fn src_tensors_names(&self) -> &[String] { &self.src_tensors_names }
    pub fn dst_tensors_names(&self) -> &[String] { &self.dst_tensors_names }
    pub fn link_count(&self) -> u32 { self.link_count }
    pub fn const_args_size(&self) -> usize { self.const_args_size }
    pub fn flops(&self) -> u64 { self.flops }
    pub fn compiler_options(&self) -> &[CompilerOptions] { &self.compiler_options }

    pub fn set_code(&mut self, code: impl Into<String>) { self.code = code.into(); }
    pub fn set_elementwise(&mut self, elementwise: bool) { self.elementwise = elementwise; }
    pub fn set_linkable(&mut self, linkable: bool) { self.linkable = linkable; }
    pub fn set_check_src_slices(&mut self, check: bool) { self.check_src_slices = check; }
    pub fn set_tensor_to_grid(&mut self, policy: TensorToGrid) { self.tensor_to_grid = policy; }
    pub fn set_grid_size(&mut self, grid_size: Int3) { self.grid_size = grid_size; }
    pub fn set_work_group_size(&mut self, size: Int3) { self.work_group_size = size; }
    pub fn set_work_group_launch_order(&mut self, order: Int3) { self.work_group_launch_order = order; }
    pub fn set_flops(&mut self, flops: u64) { self.flops = flops; }
    pub fn add_compiler_option(&mut self, option: CompilerOptions) { self.compiler_options.push(option); }

    pub fn set_grid_dimension(&mut self, dimension: u32) {
        assert!((1..=3).contains(&dimension), "grid dimension must be 1, 2 or 3, got {dimension}");
        self.grid_dimension = dimension;
    }
}
