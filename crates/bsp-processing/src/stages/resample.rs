//! Integer-ratio resampling

use crate::config::StageConfig;
use crate::source::{DataProvider, DataSource, ExecutionMode};
use crate::stage::Stage;
use bsp_core::{BspError, BspResult, Selection, TimeSeriesBuffer};
use tracing::{debug, warn};

/// How far a frequency ratio may sit from an integer and still count as one
const RATIO_TOLERANCE: f64 = 1e-6;

/// Change the sampling frequency by an integer factor
///
/// Downsampling by `k` averages every block of `k` samples per channel and
/// drops a trailing partial block. Upsampling by `k` repeats every sample
/// `k` times.
pub struct Resample<P> {
    upstream: P,
    target_frequency: u32,
    mode: ExecutionMode,
}

impl<P: DataProvider> Resample<P> {
    pub fn new(upstream: P, target_frequency: u32, mode: ExecutionMode) -> BspResult<Self> {
        StageConfig::Resample { target_frequency }.validate()?;
        Ok(Self {
            upstream,
            target_frequency,
            mode,
        })
    }
}

/// Integer factor between two frequencies, or `FrequencyRatio`
fn integer_ratio(from: f64, to: f64) -> BspResult<usize> {
    let ratio = if from >= to { from / to } else { to / from };
    let k = ratio.round();
    if (ratio - k).abs() > RATIO_TOLERANCE * ratio {
        return Err(BspError::FrequencyRatio { from, to });
    }
    Ok(k as usize)
}

/// Resample one container to `target` Hz
pub fn resample(container: TimeSeriesBuffer, target: f64) -> BspResult<TimeSeriesBuffer> {
    let from = container.frequency();
    let k = integer_ratio(from, target)?;
    if k == 1 {
        return Ok(container);
    }

    let channels = container.channels();
    let values = if from > target {
        let blocks = container.samples() / k;
        let dropped = container.samples() % k;
        if dropped > 0 {
            warn!(
                samples = container.samples(),
                factor = k,
                dropped,
                "Dropping trailing samples that do not fill a resample block"
            );
        }
        container.with_values(|data| {
            let mut out = Vec::with_capacity(blocks * channels);
            for block in data.chunks_exact(k * channels) {
                for c in 0..channels {
                    let sum: f32 = block.iter().skip(c).step_by(channels).sum();
                    out.push(sum / k as f32);
                }
            }
            out
        })
    } else {
        container.with_values(|data| {
            let mut out = Vec::with_capacity(data.len() * k);
            for row in data.chunks_exact(channels) {
                for _ in 0..k {
                    out.extend_from_slice(row);
                }
            }
            out
        })
    };

    container.rebuild(values, target)
}

impl<P: DataProvider> DataProvider for Resample<P> {
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>> {
        let target = self.target_frequency as f64;
        debug!(target, mode = ?self.mode, "Pulling resample stage");
        self.upstream
            .get_data(selection)?
            .map(self.mode, move |container| resample(container, target))
    }

    fn is_unbounded(&self) -> bool {
        self.upstream.is_unbounded()
    }
}

impl<P: DataProvider> Stage for Resample<P> {
    fn config(&self) -> StageConfig {
        StageConfig::Resample {
            target_frequency: self.target_frequency,
        }
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn ramp(samples: usize, channels: usize, frequency: f64) -> TimeSeriesBuffer {
        let values = (0..samples * channels).map(|i| i as f32).collect();
        TimeSeriesBuffer::from_vec(values, channels, frequency, None).unwrap()
    }

    #[test]
    fn test_downsample_averages_blocks() {
        let out = resample(ramp(10, 1, 10.0), 5.0).unwrap();
        assert_eq!(out.frequency(), 5.0);
        assert_eq!(out.to_vec(), vec![0.5, 2.5, 4.5, 6.5, 8.5]);
    }

    #[test]
    fn test_downsample_drops_remainder() {
        let out = resample(ramp(11, 2, 30.0), 10.0).unwrap();
        assert_eq!(out.shape(), (3, 2));
        // First block: rows 0..3, channel 0 holds 0, 2, 4
        assert_eq!(out.row(0), Some(vec![2.0, 3.0]));
    }

    #[test]
    fn test_upsample_repeats() {
        let out = resample(ramp(2, 2, 10.0), 30.0).unwrap();
        assert_eq!(out.shape(), (6, 2));
        assert_eq!(out.row(2), Some(vec![0.0, 1.0]));
        assert_eq!(out.row(3), Some(vec![2.0, 3.0]));
    }

    #[test]
    fn test_round_trip_restores_sample_count() {
        let original = ramp(40, 3, 20.0);
        let down = resample(original.clone(), 5.0).unwrap();
        let up = resample(down, 20.0).unwrap();
        assert_eq!(up.shape(), original.shape());
        assert_eq!(up.frequency(), 20.0);
    }

    #[test]
    fn test_non_integer_ratio_fails() {
        let result = resample(ramp(10, 1, 10.0), 3.0);
        assert!(matches!(result, Err(BspError::FrequencyRatio { .. })));
        let result = resample(ramp(10, 1, 10.0), 15.0);
        assert!(matches!(result, Err(BspError::FrequencyRatio { .. })));
    }

    #[test]
    fn test_same_frequency_passes_through() {
        let original = ramp(10, 1, 10.0);
        let out = resample(original.clone(), 10.0).unwrap();
        assert!(out.shares_storage(&original));
    }

    #[test]
    fn test_stage_maps_every_container() {
        let source = MemorySource::eager(vec![ramp(20, 1, 20.0), ramp(8, 1, 20.0)]);
        let stage = Resample::new(source, 10, ExecutionMode::Batch).unwrap();
        assert_eq!(stage.name(), "resample");
        let out = stage.get_data(&Selection::default()).unwrap().materialize().unwrap();
        assert_eq!(out.iter().map(|c| c.samples()).collect::<Vec<_>>(), vec![10, 4]);

        assert!(Resample::new(MemorySource::eager(vec![]), 0, ExecutionMode::Batch).is_err());
    }
}
