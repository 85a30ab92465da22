use serde::{Deserialize, Serialize};
use std::fmt;

/// GPU vendor, derived from the adapter's PCI vendor id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Apple,
    Qualcomm,
    Mali,
    PowerVr,
    Nvidia,
    Amd,
    Intel,
    #[default]
    Unknown,
}

impl GpuVendor {
    pub fn from_pci_id(id: u32) -> Self {
        match id {
            0x106B => GpuVendor::Apple,
            0x5143 => GpuVendor::Qualcomm,
            0x13B5 => GpuVendor::Mali,
            0x1010 => GpuVendor::PowerVr,
            0x10DE => GpuVendor::Nvidia,
            0x1002 | 0x1022 => GpuVendor::Amd,
            0x8086 => GpuVendor::Intel,
            _ => GpuVendor::Unknown,
        }
    }

    /// Mobile parts prefer small work groups.
    pub fn is_mobile(self) -> bool {
        matches!(self, GpuVendor::Qualcomm | GpuVendor::Mali | GpuVendor::PowerVr)
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
