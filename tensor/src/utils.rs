use core_types::{SLICE_CHANNELS, divide_round_up};

/// Number of slices needed to hold `channels`.
pub fn slices_for(channels: i32) -> i32 {
    divide_round_up(channels, SLICE_CHANNELS)
}

/// Zero-pads per-channel values up to a whole number of slices.
pub fn pad_to_slices(values: &[f32]) -> Vec<f32> {
    let slices = slices_for(values.len() as i32) as usize;
    let mut padded = values.to_vec();
    padded.resize(slices * SLICE_CHANNELS as usize, 0.0);
    padded
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slices_for_channels() {
        assert_eq!(slices_for(1), 1);
        assert_eq!(slices_for(4), 1);
        assert_eq!(slices_for(5), 2);
        assert_eq!(slices_for(8), 2);
    }

    #[test]
    fn test_pad_to_slices() {
        assert_eq!(pad_to_slices(&[]), Vec::<f32>::new());
        assert_eq!(pad_to_slices(&[1.0, 2.0]), vec![1.0, 2.0, 0.0, 0.0]);
        assert_eq!(pad_to_slices(&[1.0; 4]), vec![1.0; 4]);
        assert_eq!(pad_to_slices(&[1.0; 5]).len(), 8);
    }
}
