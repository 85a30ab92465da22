use std::collections::BTreeMap;

use bytemuck::cast_slice;
use core_types::{AccessType, Axis, DataType, Element, Layout, TensorStorageType};
use derive_more::From;
use thiserror::Error;

/// Errors raised while expanding `args.<object>` references into kernel text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("object '{object}' has no selector '{selector}'")]
    UnknownSelector { object: String, selector: String },

    #[error("selector '{selector}' takes {expected} argument(s), got {found}")]
    ArgumentCount { selector: String, expected: usize, found: usize },

    #[error("object '{object}' has no member '{member}'")]
    UnknownMember { object: String, member: String },
}

fn expect_args(selector: &str, args: &[String], expected: usize) -> Result<(), SelectorError> {
    if args.len() != expected {
        return Err(SelectorError::ArgumentCount {
            selector: selector.to_string(),
            expected,
            found: args.len(),
        });
    }
    Ok(())
}

/// `read_image*` / `write_image*` suffix for an element type.
fn image_suffix(data_type: DataType) -> &'static str {
    match data_type {
        DataType::F16 => "h",
        DataType::F32 => "f",
        DataType::I32 => "i",
        DataType::U32 => "ui",
    }
}

fn vec4_type(data_type: DataType) -> String {
    format!("{}4", data_type.scalar_name())
}

/* ------------------------------------------------------------------------- */
/* Tensor                                                                    */
/* ------------------------------------------------------------------------- */

/// A tensor as seen from inside a kernel: element type, storage and axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
    pub data_type:    DataType,
    pub storage_type: TensorStorageType,
    pub layout:       Layout,
    state_vars:       BTreeMap<String, String>,
    /// Constant contents uploaded with the kernel, empty for plain references.
    pub data:         Vec<u8>,
}

impl Default for TensorDescriptor {
    fn default() -> Self {
        Self::new(DataType::F32, TensorStorageType::Buffer, Layout::Hwc)
    }
}

impl TensorDescriptor {
    pub fn new(data_type: DataType, storage_type: TensorStorageType, layout: Layout) -> Self {
        Self { data_type, storage_type, layout, state_vars: BTreeMap::new(), data: Vec::new() }
    }

    pub fn has_axis(&self, axis: Axis) -> bool {
        self.layout.has_axis(axis)
    }

    pub fn storage_type(&self) -> TensorStorageType {
        self.storage_type
    }

    pub fn set_state_var(&mut self, key: &str, value: &str) {
        self.state_vars.insert(key.to_string(), value.to_string());
    }

    pub fn state_var(&self, key: &str) -> Option<&str> {
        self.state_vars.get(key).map(String::as_str)
    }

    /// Width addressing covers `width * batch` when set.
    pub fn is_batched_width(&self) -> bool {
        self.state_var("BatchedWidth") == Some("true")
    }

    fn declarations(&self, name: &str, access: AccessType) -> Vec<String> {
        let mut decls = Vec::with_capacity(6);
        match self.storage_type {
            TensorStorageType::Buffer => {
                let qualifier = if access == AccessType::Read { "const " } else { "" };
                decls.push(format!("__global {qualifier}{}* {name}_buffer", vec4_type(self.data_type)));
            }
            TensorStorageType::Texture2D => {
                let qualifier = match access {
                    AccessType::Read => "__read_only",
                    AccessType::Write => "__write_only",
                    AccessType::ReadWrite => "__read_write",
                };
                decls.push(format!("{qualifier} image2d_t {name}_image"));
            }
        }
        for dim in ["width", "height", "depth", "slices", "batch"] {
            decls.push(format!("int {name}_{dim}"));
        }
        decls
    }

    fn width_expr(&self, name: &str) -> String {
        if self.is_batched_width() {
            format!("({name}_width * {name}_batch)")
        } else {
            format!("{name}_width")
        }
    }

    /// Depth-bearing layouts stack depth planes along Y.
    fn height_expr(&self, name: &str) -> String {
        if self.has_axis(Axis::Depth) {
            format!("({name}_height * {name}_depth)")
        } else {
            format!("{name}_height")
        }
    }

    fn linear_index(&self, name: &str, x: &str, y: &str, s: &str) -> String {
        format!("((({s}) * {} + ({y})) * {} + ({x}))", self.height_expr(name), self.width_expr(name))
    }

    fn image_coords(name: &str, x: &str, y: &str, s: &str) -> String {
        format!("(int2)(({x}), ({y}) * {name}_slices + ({s}))")
    }

    fn member(&self, name: &str, member: &str) -> Result<String, SelectorError> {
        match member {
            "type" => Ok(vec4_type(self.data_type)),
            "scalar_type" => Ok(self.data_type.scalar_name().to_string()),
            "zero_value" => Ok(format!("({})({})", vec4_type(self.data_type), self.data_type.zero_literal())),
            _ => Err(SelectorError::UnknownMember { object: name.to_string(), member: member.to_string() }),
        }
    }

    fn perform_selector(&self, name: &str, selector: &str, args: &[String]) -> Result<String, SelectorError> {
        match selector {
            "Width" => {
                expect_args(selector, args, 0)?;
                Ok(self.width_expr(name))
            }
            "Height" => {
                expect_args(selector, args, 0)?;
                Ok(self.height_expr(name))
            }
            "Depth" | "Slices" | "Batch" => {
                expect_args(selector, args, 0)?;
                Ok(format!("{name}_{}", selector.to_lowercase()))
            }
            "Read" => {
                expect_args(selector, args, 3)?;
                let (x, y, s) = (&args[0], &args[1], &args[2]);
                Ok(match self.storage_type {
                    TensorStorageType::Buffer => format!("{name}_buffer[{}]", self.linear_index(name, x, y, s)),
                    TensorStorageType::Texture2D => format!(
                        "read_image{}({name}_image, smp_zero, {})",
                        image_suffix(self.data_type),
                        Self::image_coords(name, x, y, s),
                    ),
                })
            }
            "Write" => {
                expect_args(selector, args, 4)?;
                let (value, x, y, s) = (&args[0], &args[1], &args[2], &args[3]);
                Ok(match self.storage_type {
                    TensorStorageType::Buffer => {
                        format!("{name}_buffer[{}] = {value}", self.linear_index(name, x, y, s))
                    }
                    TensorStorageType::Texture2D => format!(
                        "write_image{}({name}_image, {}, {value})",
                        image_suffix(self.data_type),
                        Self::image_coords(name, x, y, s),
                    ),
                })
            }
            _ => Err(SelectorError::UnknownSelector { object: name.to_string(), selector: selector.to_string() }),
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Buffer                                                                    */
/* ------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MemoryType {
    #[default]
    Global,
    Constant,
}

/// A linear array of scalars or 4-vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub element_type: DataType,
    /// Components per element: 1 or 4.
    pub element_size: usize,
    pub memory_type:  MemoryType,
    pub data:         Vec<u8>,
}

impl BufferDescriptor {
    pub fn new(element_type: DataType, element_size: usize) -> Self {
        Self { element_type, element_size, memory_type: MemoryType::Global, data: Vec::new() }
    }

    /// Constant buffer holding `values`, grouped into `element_size`-wide elements.
    pub fn from_slice<T: Element>(values: &[T], element_size: usize) -> Self {
        Self {
            element_type: T::DTYPE,
            element_size,
            memory_type: MemoryType::Global,
            data: cast_slice(values).to_vec(),
        }
    }

    /// Number of elements in the constant payload.
    pub fn len(&self) -> usize {
        self.data.len() / (self.element_type.size_in_bytes() * self.element_size)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn element_type_name(&self) -> String {
        if self.element_size == 1 {
            self.element_type.scalar_name().to_string()
        } else {
            format!("{}{}", self.element_type.scalar_name(), self.element_size)
        }
    }

    fn declarations(&self, name: &str, access: AccessType) -> Vec<String> {
        let ty = self.element_type_name();
        let ptr = match (self.memory_type, access) {
            (MemoryType::Constant, _) => format!("__constant {ty}* {name}"),
            (MemoryType::Global, AccessType::Read) => format!("__global const {ty}* {name}"),
            (MemoryType::Global, _) => format!("__global {ty}* {name}"),
        };
        vec![ptr, format!("int {name}_length")]
    }

    fn member(&self, name: &str, member: &str) -> Result<String, SelectorError> {
        match member {
            "type" => Ok(self.element_type_name()),
            "zero_value" => Ok(format!("({})({})", self.element_type_name(), self.element_type.zero_literal())),
            _ => Err(SelectorError::UnknownMember { object: name.to_string(), member: member.to_string() }),
        }
    }

    fn perform_selector(&self, name: &str, selector: &str, args: &[String]) -> Result<String, SelectorError> {
        match selector {
            "Read" => {
                expect_args(selector, args, 1)?;
                Ok(format!("{name}[{}]", args[0]))
            }
            "GetPtr" => {
                expect_args(selector, args, 0)?;
                Ok(name.to_string())
            }
            "Length" => {
                expect_args(selector, args, 0)?;
                Ok(format!("{name}_length"))
            }
            _ => Err(SelectorError::UnknownSelector { object: name.to_string(), selector: selector.to_string() }),
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Texture 2D                                                                */
/* ------------------------------------------------------------------------- */

/// A read-only 2D image of 4-vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture2DDescriptor {
    pub element_type: DataType,
    pub width:        i32,
    pub height:       i32,
    pub data:         Vec<u8>,
}

impl Texture2DDescriptor {
    pub fn new(element_type: DataType, width: i32, height: i32) -> Self {
        Self { element_type, width, height, data: Vec::new() }
    }

    fn declarations(&self, name: &str) -> Vec<String> {
        vec![
            format!("__read_only image2d_t {name}"),
            format!("int {name}_width"),
            format!("int {name}_height"),
        ]
    }

    fn member(&self, name: &str, member: &str) -> Result<String, SelectorError> {
        match member {
            "type" => Ok(vec4_type(self.element_type)),
            "zero_value" => Ok(format!("({})({})", vec4_type(self.element_type), self.element_type.zero_literal())),
            _ => Err(SelectorError::UnknownMember { object: name.to_string(), member: member.to_string() }),
        }
    }

    fn perform_selector(&self, name: &str, selector: &str, args: &[String]) -> Result<String, SelectorError> {
        match selector {
            "Read" => {
                expect_args(selector, args, 2)?;
                Ok(format!(
                    "read_image{}({name}, smp_none, (int2)(({}), ({})))",
                    image_suffix(self.element_type),
                    args[0],
                    args[1],
                ))
            }
            "Width" | "Height" => {
                expect_args(selector, args, 0)?;
                Ok(format!("{name}_{}", selector.to_lowercase()))
            }
            _ => Err(SelectorError::UnknownSelector { object: name.to_string(), selector: selector.to_string() }),
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Any descriptor                                                            */
/* ------------------------------------------------------------------------- */

/// Any object that can be bound as a kernel argument.
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub enum GpuObjectDescriptor {
    Tensor(TensorDescriptor),
    Buffer(BufferDescriptor),
    Texture2D(Texture2DDescriptor),
}

impl GpuObjectDescriptor {
    /// Bytes of constant data carried with the kernel.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            GpuObjectDescriptor::Tensor(t) => t.data.len(),
            GpuObjectDescriptor::Buffer(b) => b.data.len(),
            GpuObjectDescriptor::Texture2D(t) => t.data.len(),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            GpuObjectDescriptor::Tensor(t) => t.data_type,
            GpuObjectDescriptor::Buffer(b) => b.element_type,
            GpuObjectDescriptor::Texture2D(t) => t.element_type,
        }
    }

    /// Kernel parameters this object expands to.
    pub fn declarations(&self, name: &str, access: AccessType) -> Vec<String> {
        match self {
            GpuObjectDescriptor::Tensor(t) => t.declarations(name, access),
            GpuObjectDescriptor::Buffer(b) => b.declarations(name, access),
            GpuObjectDescriptor::Texture2D(t) => t.declarations(name),
        }
    }

    /// Expands `args.<name>::<member>`.
    pub fn member(&self, name: &str, member: &str) -> Result<String, SelectorError> {
        match self {
            GpuObjectDescriptor::Tensor(t) => t.member(name, member),
            GpuObjectDescriptor::Buffer(b) => b.member(name, member),
            GpuObjectDescriptor::Texture2D(t) => t.member(name, member),
        }
    }

    /// Expands `args.<name>.<selector>(<args>)`.
    pub fn perform_selector(&self, name: &str, selector: &str, args: &[String]) -> Result<String, SelectorError> {
        match self {
            GpuObjectDescriptor::Tensor(t) => t.perform_selector(name, selector, args),
            GpuObjectDescriptor::Buffer(b) => b.perform_selector(name, selector, args),
            GpuObjectDescriptor::Texture2D(t) => t.perform_selector(name, selector, args),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn buffer_tensor_read_and_write_address_slices() {
        let desc = TensorDescriptor::new(DataType::F32, TensorStorageType::Buffer, Layout::Hwc);
        let read = desc.perform_selector("src", "Read", &args(&["X", "Y", "Z"])).unwrap();
        assert_eq!(read, "src_buffer[(((Z) * src_height + (Y)) * src_width + (X))]");

        let write = desc.perform_selector("dst", "Write", &args(&["v", "X", "Y", "Z"])).unwrap();
        assert_eq!(write, "dst_buffer[(((Z) * dst_height + (Y)) * dst_width + (X))] = v");
    }

    #[test]
    fn batched_width_folds_batch_into_x() {
        let mut desc = TensorDescriptor::new(DataType::F32, TensorStorageType::Buffer, Layout::Bhwc);
        assert_eq!(desc.perform_selector("t", "Width", &[]).unwrap(), "t_width");
        desc.set_state_var("BatchedWidth", "true");
        assert!(desc.is_batched_width());
        assert_eq!(desc.perform_selector("t", "Width", &[]).unwrap(), "(t_width * t_batch)");
    }

    #[test]
    fn depth_planes_stack_along_y() {
        let desc = TensorDescriptor::new(DataType::F32, TensorStorageType::Buffer, Layout::Hwdc);
        assert_eq!(desc.perform_selector("t", "Height", &[]).unwrap(), "(t_height * t_depth)");
        assert_eq!(desc.perform_selector("t", "Depth", &[]).unwrap(), "t_depth");
        let read = desc.perform_selector("t", "Read", &args(&["X", "Y", "Z"])).unwrap();
        assert_eq!(read, "t_buffer[(((Z) * (t_height * t_depth) + (Y)) * t_width + (X))]");

        let flat = TensorDescriptor::new(DataType::F32, TensorStorageType::Buffer, Layout::Bhwc);
        assert_eq!(flat.perform_selector("t", "Height", &[]).unwrap(), "t_height");
    }

    #[test]
    fn texture_tensor_uses_image_builtins() {
        let desc = TensorDescriptor::new(DataType::F16, TensorStorageType::Texture2D, Layout::Hwc);
        let read = desc.perform_selector("src", "Read", &args(&["X", "Y", "Z"])).unwrap();
        assert_eq!(read, "read_imageh(src_image, smp_zero, (int2)((X), (Y) * src_slices + (Z)))");
        let decls = desc.declarations("src", AccessType::Read);
        assert_eq!(decls[0], "__read_only image2d_t src_image");
    }

    #[test]
    fn members_follow_element_type() {
        let desc = TensorDescriptor::new(DataType::F16, TensorStorageType::Buffer, Layout::Hwc);
        assert_eq!(desc.member("t", "type").unwrap(), "half4");
        assert_eq!(desc.member("t", "zero_value").unwrap(), "(half4)(0.0h)");
        assert!(matches!(desc.member("t", "bogus"), Err(SelectorError::UnknownMember { .. })));
    }

    #[test]
    fn selector_arity_is_checked() {
        let desc = TensorDescriptor::new(DataType::F32, TensorStorageType::Buffer, Layout::Hwc);
        let err = desc.perform_selector("t", "Read", &args(&["X"])).unwrap_err();
        assert_eq!(err, SelectorError::ArgumentCount { selector: "Read".into(), expected: 3, found: 1 });
        let err = desc.perform_selector("t", "Explode", &[]).unwrap_err();
        assert!(matches!(err, SelectorError::UnknownSelector { .. }));
    }

    #[test]
    fn buffer_payload_sets_size_and_length() {
        let buf = BufferDescriptor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], 4);
        assert_eq!(buf.len(), 2);
        let any: GpuObjectDescriptor = buf.into();
        assert_eq!(any.size_in_bytes(), 32);
        assert_eq!(any.data_type(), DataType::F32);
        assert_eq!(any.perform_selector("b", "Read", &args(&["Z"])).unwrap(), "b[Z]");
        assert_eq!(any.declarations("b", AccessType::Read)[0], "__global const float4* b");
    }

    #[test]
    fn plain_references_carry_no_payload() {
        let any: GpuObjectDescriptor = TensorDescriptor::default().into();
        assert_eq!(any.size_in_bytes(), 0);
        let tex: GpuObjectDescriptor = Texture2DDescriptor::new(DataType::F32, 4, 4).into();
        assert_eq!(tex.size_in_bytes(), 0);
        assert_eq!(tex.perform_selector("w", "Read", &args(&["i", "j"])).unwrap(),
                   "read_imagef(w, smp_none, (int2)((i), (j)))");
    }
}
