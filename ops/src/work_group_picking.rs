use std::cmp::Reverse;

use core_types::{Int3, divide_round_up};
use kgen_core::GpuInfo;

use crate::types::{KernelInfo, TuningType};

/// Largest work group the fast path picks on mobile parts.
const MOBILE_FAST_TOTAL_LIMIT: i32 = 64;

/// Candidate work-group sizes for a kernel covering `grid`.
///
/// `Exhaustive` lists every power-of-two size allowed by the device and the
/// kernel; `Fast` returns the single size wasting the fewest invocations.
pub fn get_possible_work_groups(
    tuning_type: TuningType,
    gpu_info: &GpuInfo,
    kernel_info: &KernelInfo,
    grid: Int3,
) -> Vec<Int3> {
    let max_total = kernel_info.max_work_group_size.min(gpu_info.max_work_group_total_size);
    match tuning_type {
        TuningType::Exhaustive => power_of_two_sizes(gpu_info.max_work_group_size, max_total, grid),
        TuningType::Fast => {
            let max_total = if gpu_info.vendor.is_mobile() {
                max_total.min(MOBILE_FAST_TOTAL_LIMIT)
            } else {
                max_total
            };
            power_of_two_sizes(gpu_info.max_work_group_size, max_total, grid)
                .into_iter()
                .min_by_key(|wg| (padded_volume(grid, *wg), Reverse(wg.volume())))
                .into_iter()
                .collect()
        }
    }
}

fn power_of_two_sizes(max_size: Int3, max_total: i32, grid: Int3) -> Vec<Int3> {
    let mut limits = Int3::default();
    for axis in 0..3 {
        let covering = (grid[axis].max(1) as u32).next_power_of_two() as i32;
        limits[axis] = max_size[axis].min(covering);
    }

    let mut sizes = Vec::new();
    for z in powers_of_two(limits.z) {
        for y in powers_of_two(limits.y) {
            for x in powers_of_two(limits.x) {
                let wg = Int3::new(x, y, z);
                if wg.volume() <= max_total as i64 {
                    sizes.push(wg);
                }
            }
        }
    }
    sizes
}

fn powers_of_two(limit: i32) -> impl Iterator<Item = i32> {
    std::iter::successors(Some(1i32), |v| v.checked_mul(2)).take_while(move |v| *v <= limit)
}

/// Invocations dispatched when `grid` is covered by `wg`-sized groups.
fn padded_volume(grid: Int3, wg: Int3) -> i64 {
    (0..3)
        .map(|axis| (divide_round_up(grid[axis], wg[axis]) * wg[axis]) as i64)
        .product()
}


#[cfg(test)]
mod tests {
    use super::*;
    use kgen_core::types::GpuVendor;

    fn gpu(max_size: Int3, max_total: i32) -> GpuInfo {
        GpuInfo { max_work_group_size: max_size, max_work_group_total_size: max_total, ..GpuInfo::default() }
    }

    #[test]
    fn exhaustive_respects_every_limit() {
        let info = gpu(Int3::new(64, 64, 4), 128);
        let kernel = KernelInfo { private_memory_size: 0, max_work_group_size: 64 };
        let grid = Int3::new(100, 7, 3);
        let sizes = get_possible_work_groups(TuningType::Exhaustive, &info, &kernel, grid);

        assert!(!sizes.is_empty());
        for wg in &sizes {
            assert!(wg.volume() <= 64);
            assert!(wg.x <= 64 && wg.y <= 8 && wg.z <= 4);
            for axis in 0..3 {
                assert_eq!(wg[axis].count_ones(), 1);
            }
        }
        assert!(sizes.contains(&Int3::new(64, 1, 1)));
        assert!(sizes.contains(&Int3::new(8, 8, 1)));
        assert!(!sizes.contains(&Int3::new(16, 8, 1)));
    }

    #[test]
    fn fast_returns_single_least_padded_size() {
        let info = gpu(Int3::new(256, 256, 64), 256);
        let sizes = get_possible_work_groups(TuningType::Fast, &info, &KernelInfo::default(), Int3::new(64, 64, 1));
        assert_eq!(sizes.len(), 1);
        // 64x64 is covered exactly by any power of two up to 256 invocations
        assert_eq!(sizes[0].volume(), 256);
        assert_eq!(padded_volume(Int3::new(64, 64, 1), sizes[0]), 64 * 64);
    }

    #[test]
    fn fast_keeps_mobile_groups_small() {
        let info = GpuInfo { vendor: GpuVendor::Mali, ..gpu(Int3::new(256, 256, 64), 256) };
        let sizes = get_possible_work_groups(TuningType::Fast, &info, &KernelInfo::default(), Int3::new(64, 64, 1));
        assert_eq!(sizes.len(), 1);
        assert!(sizes[0].volume() <= MOBILE_FAST_TOTAL_LIMIT as i64);
    }

    #[test]
    fn no_candidates_when_kernel_allows_none() {
        let info = gpu(Int3::new(256, 256, 64), 256);
        let kernel = KernelInfo { private_memory_size: 0, max_work_group_size: 0 };
        assert!(get_possible_work_groups(TuningType::Exhaustive, &info, &kernel, Int3::new(8, 8, 1)).is_empty());
        assert!(get_possible_work_groups(TuningType::Fast, &info, &kernel, Int3::new(8, 8, 1)).is_empty());
    }
}
