use std::collections::BTreeMap;

use core_types::{AccessType, DataType};
use kgen_core::GpuInfo;
use tensor::GpuObjectDescriptor;

use crate::error::OpError;

const ARGS_PREFIX: &str = "args.";

/// A named object bound to a kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuObjectRef {
    pub access:     AccessType,
    pub descriptor: GpuObjectDescriptor,
}

/// Named kernel arguments: object references plus scalar values.
///
/// Kernel code refers to them as `args.<name>`; [`Arguments::compile`]
/// expands those references into plain kernel-language text.
#[derive(Debug, Default)]
pub struct Arguments {
    objects: BTreeMap<String, GpuObjectRef>,
    ints:    BTreeMap<String, i32>,
    floats:  BTreeMap<String, f32>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /* --------------------------------------------------------------------- */
    /* Binding                                                               */
    /* --------------------------------------------------------------------- */

    /// A name holds one binding; rebinding drops the previous one, whatever its kind.
    pub fn add_object_ref(&mut self, name: &str, access: AccessType, descriptor: impl Into<GpuObjectDescriptor>) {
        self.unbind(name);
        self.objects.insert(name.to_string(), GpuObjectRef { access, descriptor: descriptor.into() });
    }

    pub fn add_int(&mut self, name: &str, value: i32) {
        self.unbind(name);
        self.ints.insert(name.to_string(), value);
    }

    pub fn add_float(&mut self, name: &str, value: f32) {
        self.unbind(name);
        self.floats.insert(name.to_string(), value);
    }

    fn unbind(&mut self, name: &str) {
        let removed = self.objects.remove(name).is_some()
            | self.ints.remove(name).is_some()
            | self.floats.remove(name).is_some();
        if removed {
            log::warn!("argument '{}' rebound, previous binding dropped", name);
        }
    }

    /* --------------------------------------------------------------------- */
    /* Accessors                                                             */
    /* --------------------------------------------------------------------- */

    pub fn object(&self, name: &str) -> Option<&GpuObjectRef> {
        self.objects.get(name)
    }

    /// Bound objects in name order.
    pub fn objects(&self) -> impl Iterator<Item = (&str, &GpuObjectDescriptor)> {
        self.objects.iter().map(|(name, obj)| (name.as_str(), &obj.descriptor))
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        self.ints.get(name).copied()
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        self.floats.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name) || self.ints.contains_key(name) || self.floats.contains_key(name)
    }

    /// Every bound name, objects first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects
            .keys()
            .chain(self.ints.keys())
            .chain(self.floats.keys())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.objects.len() + self.ints.len() + self.floats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /* --------------------------------------------------------------------- */
    /* Fusion                                                                */
    /* --------------------------------------------------------------------- */

    /// Appends `postfix` to every `args.<name>` in `code` whose name is bound
    /// here. Only whole identifiers are renamed.
    pub fn rename_args(&self, postfix: &str, code: &str) -> String {
        let mut out = String::with_capacity(code.len());
        let mut pos = 0;
        while let Some(start) = find_args_prefix(code, pos) {
            let name_start = start + ARGS_PREFIX.len();
            let name_end = ident_end(code, name_start);
            out.push_str(&code[pos..name_end]);
            if self.contains(&code[name_start..name_end]) {
                out.push_str(postfix);
            }
            pos = name_end;
        }
        out.push_str(&code[pos..]);
        out
    }

    /// Moves every binding of `other` into `self` as `<name><postfix>`.
    /// Nothing is inserted if any renamed name is already bound.
    pub fn merge(&mut self, other: Arguments, postfix: &str) -> Result<(), OpError> {
        if let Some(name) = other.names().map(|n| format!("{n}{postfix}")).find(|n| self.contains(n)) {
            return Err(OpError::NameCollision { name });
        }
        for (name, obj) in other.objects {
            self.objects.insert(format!("{name}{postfix}"), obj);
        }
        for (name, value) in other.ints {
            self.ints.insert(format!("{name}{postfix}"), value);
        }
        for (name, value) in other.floats {
            self.floats.insert(format!("{name}{postfix}"), value);
        }
        Ok(())
    }

    /* --------------------------------------------------------------------- */
    /* Compilation                                                           */
    /* --------------------------------------------------------------------- */

    /// Produces final kernel text from `code`.
    ///
    /// Each `linkables` entry maps a destination name to code spliced in
    /// front of every `args.<name>.Write(value, coords)`: the value is bound
    /// to `in_out_value`, the fragment runs, and `in_out_value` is written.
    pub fn compile(
        &self,
        gpu_info: &GpuInfo,
        linkables: &BTreeMap<String, String>,
        code: &str,
    ) -> Result<String, OpError> {
        for (name, obj) in &self.objects {
            let data_type = obj.descriptor.data_type();
            if data_type == DataType::F16 && !gpu_info.supports_fp16 {
                return Err(OpError::UnsupportedDataType { name: name.clone(), data_type });
            }
        }

        let mut linked = code.to_string();
        for (dst_name, linkable) in linkables {
            if !linkable.trim().is_empty() {
                linked = resolve_linking(&linked, dst_name, linkable)?;
            }
        }

        let resolved = self.resolve_args(&linked)?;
        let params = self
            .declarations()
            .iter()
            .map(|d| format!("  {d}"))
            .collect::<Vec<_>>()
            .join(",\n");

        let mut text = resolved
            .replace("$0", &format!("{params}\n"))
            .replace("MAIN_FUNCTION", "__kernel void main_function");
        for axis in 0..3 {
            text = text
                .replace(&format!("GLOBAL_ID_{axis}"), &format!("get_global_id({axis})"))
                .replace(&format!("LOCAL_ID_{axis}"), &format!("get_local_id({axis})"))
                .replace(&format!("GROUP_ID_{axis}"), &format!("get_group_id({axis})"));
        }
        Ok(text)
    }

    fn declarations(&self) -> Vec<String> {
        let mut decls: Vec<String> = self
            .objects
            .iter()
            .flat_map(|(name, obj)| obj.descriptor.declarations(name, obj.access))
            .collect();
        decls.extend(self.ints.keys().map(|name| format!("int {name}")));
        decls.extend(self.floats.keys().map(|name| format!("float {name}")));
        decls
    }

    fn resolve_args(&self, code: &str) -> Result<String, OpError> {
        let mut out = String::with_capacity(code.len());
        let mut pos = 0;
        while let Some(start) = find_args_prefix(code, pos) {
            out.push_str(&code[pos..start]);
            let name_start = start + ARGS_PREFIX.len();
            let name_end = ident_end(code, name_start);
            let name = &code[name_start..name_end];
            if name.is_empty() {
                return Err(OpError::MalformedCode(format!("'{ARGS_PREFIX}' without a name at byte {start}")));
            }

            if self.ints.contains_key(name) || self.floats.contains_key(name) {
                out.push_str(name);
                pos = name_end;
                continue;
            }

            let obj = self
                .objects
                .get(name)
                .ok_or_else(|| OpError::UnknownArgument { name: name.to_string() })?;
            let rest = &code[name_end..];

            if rest.starts_with("::") {
                let member_end = ident_end(code, name_end + 2);
                let member = &code[name_end + 2..member_end];
                out.push_str(&obj.descriptor.member(name, member)?);
                pos = member_end;
            } else if rest.starts_with('.') {
                let selector_end = ident_end(code, name_end + 1);
                let selector = &code[name_end + 1..selector_end];
                if !code[selector_end..].starts_with('(') {
                    return Err(OpError::MalformedCode(format!("expected '(' after args.{name}.{selector}")));
                }
                let (call_args, call_end) = parse_call_args(code, selector_end)?;
                let call_args = call_args
                    .iter()
                    .map(|arg| self.resolve_args(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                out.push_str(&obj.descriptor.perform_selector(name, selector, &call_args)?);
                pos = call_end;
            } else {
                return Err(OpError::MalformedCode(format!("object args.{name} used without selector or member")));
            }
        }
        out.push_str(&code[pos..]);
        Ok(out)
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Next `args.` at or after `from` that starts a token.
fn find_args_prefix(code: &str, from: usize) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut search = from;
    while let Some(offset) = code[search..].find(ARGS_PREFIX) {
        let start = search + offset;
        let boundary = start == 0 || !(is_ident_byte(bytes[start - 1]) || bytes[start - 1] == b'.');
        if boundary {
            return Some(start);
        }
        search = start + ARGS_PREFIX.len();
    }
    None
}

fn ident_end(code: &str, start: usize) -> usize {
    let bytes = code.as_bytes();
    let mut end = start;
    while end < bytes.len() && is_ident_byte(bytes[end]) {
        end += 1;
    }
    end
}

/// Splits the call starting at the `(` at `open` into top-level arguments.
/// Returns them with the position just past the closing `)`.
fn parse_call_args(code: &str, open: usize) -> Result<(Vec<String>, usize), OpError> {
    let bytes = code.as_bytes();
    let mut depth = 0usize;
    let mut args = Vec::new();
    let mut arg_start = open + 1;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => {
                depth -= 1;
                if depth == 0 {
                    let last = code[arg_start..i].trim();
                    if !(args.is_empty() && last.is_empty()) {
                        args.push(last.to_string());
                    }
                    return Ok((args, i + 1));
                }
            }
            b',' if depth == 1 => {
                args.push(code[arg_start..i].trim().to_string());
                arg_start = i + 1;
            }
            _ => {}
        }
    }
    Err(OpError::MalformedCode(format!("unbalanced parentheses after byte {open}")))
}

/// Splices `linkable` in front of every `args.<dst_name>.Write(...)`.
fn resolve_linking(code: &str, dst_name: &str, linkable: &str) -> Result<String, OpError> {
    let call = format!("{ARGS_PREFIX}{dst_name}.Write");
    let mut out = String::with_capacity(code.len() + linkable.len());
    let mut pos = 0;
    let mut search = 0;
    while let Some(start) = find_args_prefix(code, search) {
        let call_end = start + call.len();
        if !code[start..].starts_with(&call) || !code[call_end..].starts_with('(') {
            search = start + ARGS_PREFIX.len();
            continue;
        }
        let (call_args, end) = parse_call_args(code, call_end)?;
        let (value, coords) = call_args
            .split_first()
            .ok_or_else(|| OpError::MalformedCode(format!("{call} without a value")))?;
        out.push_str(&code[pos..start]);
        out.push_str(&format!(
            "{{\n  args.{dst_name}::type in_out_value = {value};\n{linkable}  args.{dst_name}.Write(in_out_value, {});\n}}",
            coords.join(", "),
        ));
        pos = end;
        search = end;
    }
    out.push_str(&code[pos..]);
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Layout, TensorStorageType};
    use tensor::{BufferDescriptor, TensorDescriptor};

    fn tensor_desc(data_type: DataType) -> TensorDescriptor {
        TensorDescriptor::new(data_type, TensorStorageType::Buffer, Layout::Hwc)
    }

    fn linkables(dst: &str, code: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(dst.to_string(), code.to_string())])
    }

    #[test]
    fn rename_only_touches_whole_bound_names() {
        let mut args = Arguments::new();
        args.add_float("bias", 1.0);
        let code = "x = args.bias + args.biases + xargs.bias + my.args.bias;";
        assert_eq!(
            args.rename_args("_link1", code),
            "x = args.bias_link1 + args.biases + xargs.bias + my.args.bias;"
        );
    }

    #[test]
    fn rebinding_a_name_replaces_the_old_kind() {
        let mut args = Arguments::new();
        args.add_object_ref("w", AccessType::Read, BufferDescriptor::new(DataType::F32, 4));
        args.add_float("w", 0.5);
        assert_eq!(args.names().collect::<Vec<_>>(), vec!["w"]);
        assert!(args.object("w").is_none());
        assert_eq!(args.float("w"), Some(0.5));

        args.add_int("w", 2);
        assert_eq!(args.len(), 1);
        assert_eq!(args.float("w"), None);
        let text = args.compile(&GpuInfo::default(), &BTreeMap::new(), "$0 args.w").unwrap();
        assert_eq!(text, "  int w\n w");
    }

    #[test]
    fn merge_suffixes_every_binding() {
        let mut host = Arguments::new();
        host.add_object_ref("weights", AccessType::Read, BufferDescriptor::new(DataType::F32, 4));
        let mut child = Arguments::new();
        child.add_object_ref("weights", AccessType::Read, BufferDescriptor::new(DataType::F32, 4));
        child.add_float("alpha", 0.5);
        child.add_int("n", 3);

        host.merge(child, "_link1").unwrap();
        let mut names: Vec<&str> = host.names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["alpha_link1", "n_link1", "weights", "weights_link1"]);
        assert_eq!(host.float("alpha_link1"), Some(0.5));
        assert_eq!(host.int("n_link1"), Some(3));
    }

    #[test]
    fn merge_collision_leaves_host_untouched() {
        let mut host = Arguments::new();
        host.add_float("a_x", 1.0);
        let mut child = Arguments::new();
        child.add_float("b", 2.0);
        child.add_float("a", 3.0);

        let err = host.merge(child, "_x").unwrap_err();
        assert!(matches!(err, OpError::NameCollision { ref name } if name == "a_x"));
        assert_eq!(host.len(), 1);
        assert_eq!(host.float("a_x"), Some(1.0));
    }

    #[test]
    fn compile_expands_selectors_members_and_scalars() {
        let mut args = Arguments::new();
        args.add_object_ref("src", AccessType::Read, tensor_desc(DataType::F32));
        args.add_object_ref("dst", AccessType::Write, tensor_desc(DataType::F32));
        args.add_float("scale", 2.0);
        let code = "MAIN_FUNCTION(\n$0) {\n  int X = GLOBAL_ID_0;\n  args.src::type v = args.src.Read(X, 0, 0) * args.scale;\n  args.dst.Write(v, X, 0, 0);\n}\n";

        let text = args.compile(&GpuInfo::default(), &BTreeMap::new(), code).unwrap();
        assert!(text.starts_with("__kernel void main_function(\n  __global float4* dst_buffer,\n"));
        assert!(text.contains("  __global const float4* src_buffer,\n"));
        assert!(text.contains("  float scale\n) {"));
        assert!(text.contains("int X = get_global_id(0);"));
        assert!(text.contains("float4 v = src_buffer[(((0) * src_height + (0)) * src_width + (X))] * scale;"));
        assert!(!text.contains("args."));
    }

    #[test]
    fn compile_links_code_into_destination_writes() {
        let mut args = Arguments::new();
        args.add_object_ref("dst", AccessType::Write, tensor_desc(DataType::F32));
        let code = "args.dst.Write(v, X, Y, Z);";
        let text = args
            .compile(&GpuInfo::default(), &linkables("dst", "{\nin_out_value *= 2.0f;\n}\n"), code)
            .unwrap();
        assert_eq!(
            text,
            "{\n  float4 in_out_value = v;\n{\nin_out_value *= 2.0f;\n}\n  \
             dst_buffer[(((Z) * dst_height + (Y)) * dst_width + (X))] = in_out_value;\n};"
        );
    }

    #[test]
    fn compile_rejects_unknown_arguments() {
        let args = Arguments::new();
        let err = args.compile(&GpuInfo::default(), &BTreeMap::new(), "x = args.ghost;").unwrap_err();
        assert!(matches!(err, OpError::UnknownArgument { ref name } if name == "ghost"));
    }

    #[test]
    fn compile_rejects_half_on_devices_without_f16() {
        let mut args = Arguments::new();
        args.add_object_ref("t", AccessType::Read, tensor_desc(DataType::F16));
        let err = args.compile(&GpuInfo::default(), &BTreeMap::new(), "").unwrap_err();
        assert!(matches!(err, OpError::UnsupportedDataType { data_type: DataType::F16, .. }));

        let gpu_info = GpuInfo { supports_fp16: true, ..GpuInfo::default() };
        assert!(args.compile(&gpu_info, &BTreeMap::new(), "").is_ok());
    }

    #[test]
    fn compile_reports_selector_and_syntax_errors() {
        let mut args = Arguments::new();
        args.add_object_ref("t", AccessType::Read, tensor_desc(DataType::F32));
        let gpu_info = GpuInfo::default();

        let err = args.compile(&gpu_info, &BTreeMap::new(), "args.t.Read(X, Y").unwrap_err();
        assert!(matches!(err, OpError::MalformedCode(_)));
        let err = args.compile(&gpu_info, &BTreeMap::new(), "args.t.Read(X)").unwrap_err();
        assert!(matches!(err, OpError::Selector(_)));
        let err = args.compile(&gpu_info, &BTreeMap::new(), "args.t + 1").unwrap_err();
        assert!(matches!(err, OpError::MalformedCode(_)));
    }

    #[test]
    fn nested_selector_arguments_are_resolved() {
        let mut args = Arguments::new();
        args.add_object_ref("t", AccessType::Read, tensor_desc(DataType::F32));
        args.add_object_ref("idx", AccessType::Read, BufferDescriptor::new(DataType::I32, 1));
        let text = args
            .compile(&GpuInfo::default(), &BTreeMap::new(), "args.t.Read(args.idx.Read(X), 0, 0)")
            .unwrap();
        assert_eq!(text, "t_buffer[(((0) * t_height + (0)) * t_width + (idx[X]))]");
    }

    #[test]
    fn parse_call_args_handles_nesting_and_empty_lists() {
        let (args, end) = parse_call_args("f(a, g(b, c), d[1, 2])x", 1).unwrap();
        assert_eq!(args, vec!["a", "g(b, c)", "d[1, 2]"]);
        assert_eq!(end, 22);
        let (args, end) = parse_call_args("f()", 1).unwrap();
        assert!(args.is_empty());
        assert_eq!(end, 3);
    }
}
