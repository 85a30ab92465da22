mod descriptor;
mod utils;

use serde::{Deserialize, Serialize};

pub use descriptor::{
    BufferDescriptor, GpuObjectDescriptor, MemoryType, SelectorError, TensorDescriptor, Texture2DDescriptor,
};
pub use utils::{pad_to_slices, slices_for};

/// Read-only shape queries on a tensor living outside the operation.
pub trait SpatialTensor {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    fn depth(&self) -> i32;
    fn batch(&self) -> i32;
    fn channels(&self) -> i32;

    /// Channels grouped into 4-wide slices.
    fn slices(&self) -> i32 {
        slices_for(self.channels())
    }
}

/// Batch, height, width, depth, channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bhwdc {
    #[serde(default = "one")]
    pub b: i32,
    pub h: i32,
    pub w: i32,
    #[serde(default = "one")]
    pub d: i32,
    pub c: i32,
}

fn one() -> i32 {
    1
}

impl Bhwdc {
    pub const fn new(b: i32, h: i32, w: i32, d: i32, c: i32) -> Self {
        Self { b, h, w, d, c }
    }
}

/// Lightweight handle: shape + how the tensor is stored on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    shape:      Bhwdc,
    descriptor: TensorDescriptor,
}

impl Tensor {
    pub fn new(shape: Bhwdc, descriptor: TensorDescriptor) -> Self {
        Tensor { shape, descriptor }
    }

    /* --------------------------------------------------------------------- */
    /* Accessors                                                             */
    /* --------------------------------------------------------------------- */

    pub fn shape(&self) -> Bhwdc {
        self.shape
    }

    pub fn descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }
}

impl SpatialTensor for Tensor {
    fn width(&self) -> i32 { self.shape.w }
    fn height(&self) -> i32 { self.shape.h }
    fn depth(&self) -> i32 { self.shape.d }
    fn batch(&self) -> i32 { self.shape.b }
    fn channels(&self) -> i32 { self.shape.c }
}

/* ------------------------------------------------------------------------- */
/*                                     Tests                                 */
/* ------------------------------------------------------------------------- */
