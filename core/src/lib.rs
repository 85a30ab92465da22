pub mod types;

use anyhow::Result;
use core_types::Int3;
use serde::{Deserialize, Serialize};
use wgpu::{Adapter, Features, Instance, Limits};

use types::GpuVendor;

/// Capabilities of the device kernels are generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuInfo {
    pub name:                      String,
    pub vendor:                    GpuVendor,
    /// Per-axis work-group limits.
    pub max_work_group_size:       Int3,
    /// Limit on `x * y * z` of one work group.
    pub max_work_group_total_size: i32,
    pub supports_fp16:             bool,
}

impl Default for GpuInfo {
    /// Conservative capabilities every WebGPU-class device provides.
    fn default() -> Self {
        Self::from_limits("generic", GpuVendor::Unknown, &Limits::downlevel_defaults(), Features::empty())
    }
}

impl GpuInfo {
    /* ------------------------------------------------------------------ */
    /* Construction                                                       */
    /* ------------------------------------------------------------------ */
    pub fn from_limits(name: &str, vendor: GpuVendor, limits: &Limits, features: Features) -> Self {
        Self {
            name: name.to_string(),
            vendor,
            max_work_group_size: Int3::new(
                clamp_i32(limits.max_compute_workgroup_size_x),
                clamp_i32(limits.max_compute_workgroup_size_y),
                clamp_i32(limits.max_compute_workgroup_size_z),
            ),
            max_work_group_total_size: clamp_i32(limits.max_compute_invocations_per_workgroup),
            supports_fp16: features.contains(Features::SHADER_F16),
        }
    }

    /// Read capabilities from an already requested adapter.
    pub fn from_adapter(adapter: &Adapter) -> Self {
        let info = adapter.get_info();
        let vendor = GpuVendor::from_pci_id(info.vendor);
        Self::from_limits(&info.name, vendor, &adapter.limits(), adapter.features())
    }

    /// Ask the default adapter of this machine for its capabilities.
    pub async fn query() -> Result<Self> {
        let instance = Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .map_err(|e| anyhow::anyhow!("No suitable adapter found: {}", e))?;

        let gpu_info = Self::from_adapter(&adapter);
        log::info!(
            "queried adapter '{}' ({}), max work group {} / {}",
            gpu_info.name,
            gpu_info.vendor,
            gpu_info.max_work_group_size,
            gpu_info.max_work_group_total_size,
        );
        Ok(gpu_info)
    }
}

fn clamp_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollster::block_on;

    #[test]
    fn default_matches_downlevel_limits() {
        let info = GpuInfo::default();
        let limits = Limits::downlevel_defaults();
        assert_eq!(info.max_work_group_size.x as u32, limits.max_compute_workgroup_size_x);
        assert_eq!(info.max_work_group_size.z as u32, limits.max_compute_workgroup_size_z);
        assert_eq!(info.max_work_group_total_size as u32, limits.max_compute_invocations_per_workgroup);
        assert!(!info.supports_fp16);
    }

    #[test]
    fn f16_support_follows_features() {
        let info = GpuInfo::from_limits("x", GpuVendor::Nvidia, &Limits::default(), Features::SHADER_F16);
        assert!(info.supports_fp16);
        assert_eq!(info.vendor, GpuVendor::Nvidia);
    }

    #[test]
    fn vendor_ids_resolve() {
        assert_eq!(GpuVendor::from_pci_id(0x5143), GpuVendor::Qualcomm);
        assert_eq!(GpuVendor::from_pci_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_pci_id(0xFFFF), GpuVendor::Unknown);
        assert!(GpuVendor::Mali.is_mobile());
        assert!(!GpuVendor::Amd.is_mobile());
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn query_reports_nonzero_limits() {
        let info = block_on(GpuInfo::query()).expect("Failed to query adapter");
        assert!(info.max_work_group_total_size > 0);
        println!("Device: {:?}", info);
    }
}
