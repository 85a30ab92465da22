use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

include!(concat!(env!("OUT_DIR"), "/generated_data_types.rs"));

/// Three signed extents or indices, one per grid axis.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Int3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Int3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Identity permutation `(0, 1, 2)`.
    pub const fn identity_order() -> Self {
        Self::new(0, 1, 2)
    }

    pub fn volume(self) -> i64 {
        self.x as i64 * self.y as i64 * self.z as i64
    }
}

impl Index<usize> for Int3 {
    type Output = i32;

    fn index(&self, i: usize) -> &i32 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Int3 index {i} out of range"),
        }
    }
}

impl IndexMut<usize> for Int3 {
    fn index_mut(&mut self, i: usize) -> &mut i32 {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("Int3 index {i} out of range"),
        }
    }
}

impl fmt::Display for Int3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Integer division rounding up. `b` must be positive.
pub fn divide_round_up(a: i32, b: i32) -> i32 {
    assert!(b > 0, "divide_round_up: divisor must be positive, got {b}");
    (a + b - 1) / b
}

/// Number of channels packed into one slice.
pub const SLICE_CHANNELS: i32 = 4;

/// Numeric precision requested for a computation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationsPrecision {
    #[default]
    F32,
    /// Storage in F16, accumulation in F32.
    F32F16,
    F16,
}

impl CalculationsPrecision {
    /// Element type used for storage at this precision.
    pub fn data_type(self) -> DataType {
        match self {
            CalculationsPrecision::F32 => DataType::F32,
            CalculationsPrecision::F32F16 | CalculationsPrecision::F16 => DataType::F16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Batch,
    Height,
    Width,
    Depth,
    Channels,
}

/// Logical axis order of a tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Layout {
    #[default]
    Hwc,
    Bhwc,
    Hwdc,
    Bhwdc,
}

impl Layout {
    pub fn has_axis(self, axis: Axis) -> bool {
        match axis {
            Axis::Height | Axis::Width | Axis::Channels => true,
            Axis::Batch => matches!(self, Layout::Bhwc | Layout::Bhwdc),
            Axis::Depth => matches!(self, Layout::Hwdc | Layout::Bhwdc),
        }
    }
}

/// How a tensor is laid out in device memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorStorageType {
    #[default]
    Buffer,
    #[serde(rename = "texture_2d")]
    Texture2D,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessType {
    Read,
    Write,
    ReadWrite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divide_round_up_rounds_toward_positive() {
        assert_eq!(divide_round_up(10, 8), 2);
        assert_eq!(divide_round_up(16, 8), 2);
        assert_eq!(divide_round_up(1, 8), 1);
        assert_eq!(divide_round_up(0, 8), 0);
    }

    #[test]
    #[should_panic(expected = "divisor must be positive")]
    fn divide_round_up_rejects_zero_divisor() {
        divide_round_up(4, 0);
    }

    #[test]
    fn int3_indexing_follows_axes() {
        let mut v = Int3::new(3, 5, 7);
        assert_eq!((v[0], v[1], v[2]), (3, 5, 7));
        v[2] = 1;
        assert_eq!(v, Int3::new(3, 5, 1));
        assert_eq!(v.volume(), 15);
    }

    #[test]
    fn precision_maps_to_storage_type() {
        assert_eq!(CalculationsPrecision::F32.data_type(), DataType::F32);
        assert_eq!(CalculationsPrecision::F32F16.data_type(), DataType::F16);
        assert_eq!(CalculationsPrecision::F16.data_type(), DataType::F16);
    }

    #[test]
    fn generated_types_carry_sizes_and_names() {
        assert_eq!(DataType::F16.size_in_bytes(), 2);
        assert_eq!(DataType::F32.size_in_bytes(), 4);
        assert_eq!(DataType::F32.scalar_name(), "float");
        assert_eq!(<f32 as Element>::DTYPE, DataType::F32);
        assert_eq!(<u32 as Element>::DTYPE, DataType::U32);
    }

    #[test]
    fn layouts_report_optional_axes() {
        assert!(Layout::Bhwc.has_axis(Axis::Batch));
        assert!(!Layout::Hwc.has_axis(Axis::Batch));
        assert!(Layout::Hwdc.has_axis(Axis::Depth));
        assert!(Layout::Hwc.has_axis(Axis::Channels));
    }
}
