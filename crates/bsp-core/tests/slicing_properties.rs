//! Property tests for time-range slicing

use bsp_core::{time_to_index, TimeSeriesBuffer};
use proptest::prelude::*;

fn buffer(samples: usize, channels: usize, frequency: f64) -> TimeSeriesBuffer {
    TimeSeriesBuffer::zeros(samples, channels, frequency, None).unwrap()
}

proptest! {
    #[test]
    fn full_slice_keeps_shape(samples in 0usize..500, channels in 1usize..8, frequency in 1u32..5000) {
        let buffer = buffer(samples, channels, frequency as f64);
        let full = buffer.slice(0.0, buffer.duration(), None).unwrap();
        prop_assert_eq!(full.shape(), buffer.shape());
        prop_assert!(full.shares_storage(&buffer));
    }

    #[test]
    fn sub_slice_matches_index_arithmetic(
        samples in 1usize..400,
        frequency in 1u32..2000,
        a in 0.0f64..1.0,
        b in 0.0f64..1.0,
    ) {
        let frequency = frequency as f64;
        let buffer = buffer(samples, 2, frequency);
        let (start, stop) = if a <= b { (a, b) } else { (b, a) };
        let (start, stop) = (start * buffer.duration(), stop * buffer.duration());

        let part = buffer.slice(start, stop, None).unwrap();
        let expected = time_to_index(stop, frequency) - time_to_index(start, frequency);
        prop_assert_eq!(part.samples(), expected);
        prop_assert_eq!(part.channels(), 2);
    }

    #[test]
    fn stop_past_end_is_rejected(samples in 1usize..400, frequency in 1u32..2000) {
        let buffer = buffer(samples, 1, frequency as f64);
        let beyond = buffer.duration() + 1.0 / frequency as f64;
        prop_assert!(buffer.slice(0.0, beyond, None).is_err());
    }
}
