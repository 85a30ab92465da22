use core_types::{Int3, divide_round_up};
use tensor::SpatialTensor;

use crate::types::TensorToGrid;

/// Work groups needed to cover `grid_size`, with the per-axis counts
/// permuted by `launch_order` for 2D and 3D grids.
///
/// `launch_order` must satisfy [`is_valid_launch_order`] for `grid_dimension`.
pub fn get_work_groups_count(
    grid_dimension:  u32,
    grid_size:       Int3,
    work_group_size: Int3,
    launch_order:    Int3,
) -> Int3 {
    match grid_dimension {
        1 => Int3::new(divide_round_up(grid_size.x, work_group_size.x), 1, 1),
        2 => {
            let wgs = [
                divide_round_up(grid_size.x, work_group_size.x),
                divide_round_up(grid_size.y, work_group_size.y),
            ];
            Int3::new(wgs[launch_order[0] as usize], wgs[launch_order[1] as usize], 1)
        }
        _ => {
            let wgs = [
                divide_round_up(grid_size.x, work_group_size.x),
                divide_round_up(grid_size.y, work_group_size.y),
                divide_round_up(grid_size.z, work_group_size.z),
            ];
            Int3::new(
                wgs[launch_order[0] as usize],
                wgs[launch_order[1] as usize],
                wgs[launch_order[2] as usize],
            )
        }
    }
}

/// Whether `launch_order` permutes the axes a `grid_dimension` grid uses.
pub fn is_valid_launch_order(grid_dimension: u32, launch_order: Int3) -> bool {
    let used = match grid_dimension {
        1 => return true,
        2 => 2,
        _ => 3,
    };
    let mut seen = [false; 3];
    for axis in 0..used {
        match usize::try_from(launch_order[axis]) {
            Ok(i) if i < used && !seen[i] => seen[i] = true,
            _ => return false,
        }
    }
    true
}

/// Grid covering `dst` under `policy`, or `None` for [`TensorToGrid::Custom`].
pub fn grid_from_tensor(policy: TensorToGrid, dst: &dyn SpatialTensor) -> Option<Int3> {
    match policy {
        TensorToGrid::WbToXHdToYSToZ => Some(Int3::new(
            dst.width() * dst.batch(),
            dst.height() * dst.depth(),
            dst.slices(),
        )),
        TensorToGrid::WbToXHdToYZIs1 => Some(Int3::new(dst.width() * dst.batch(), dst.height() * dst.depth(), 1)),
        TensorToGrid::WbToXHToYDToZ => Some(Int3::new(dst.width() * dst.batch(), dst.height(), dst.depth())),
        TensorToGrid::BToXYIs1ZIs1 => Some(Int3::new(dst.batch(), 1, 1)),
        TensorToGrid::Custom => None,
    }
}
