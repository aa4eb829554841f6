//! Zero padding to a common length

use crate::config::StageConfig;
use crate::source::{DataProvider, DataSource, ExecutionMode};
use crate::stage::Stage;
use bsp_core::{BspError, BspResult, Selection, TimeSeriesBuffer};
use tracing::debug;

/// Pad every container with zero rows up to the longest one
///
/// Always materialises the whole upstream sequence, whatever mode the
/// rest of the pipeline runs in.
pub struct ZeroPad<P> {
    upstream: P,
    align_front: bool,
}

impl<P: DataProvider> ZeroPad<P> {
    pub fn new(upstream: P, align_front: bool) -> BspResult<Self> {
        if upstream.is_unbounded() {
            return Err(BspError::config("ZeroPad cannot run on an unbounded source"));
        }
        Ok(Self { upstream, align_front })
    }
}

/// Pad `containers` to a common length. Containers already at the maximum
/// are returned as they are.
pub fn zero_pad(containers: Vec<TimeSeriesBuffer>, align_front: bool) -> BspResult<Vec<TimeSeriesBuffer>> {
    let longest = containers.iter().map(TimeSeriesBuffer::samples).max().unwrap_or(0);

    containers
        .into_iter()
        .map(|container| {
            let missing = longest - container.samples();
            if missing == 0 {
                return Ok(container);
            }

            let zeros = vec![0.0f32; missing * container.channels()];
            let data = container.to_vec();
            let values = if align_front {
                [zeros, data].concat()
            } else {
                [data, zeros].concat()
            };
            let padded = container.rebuild(values, container.frequency())?;

            if align_front {
                let delta = missing as f64 / container.frequency();
                let events = padded.events().iter().map(|e| e.shifted(delta)).collect();
                Ok(padded.with_events(events))
            } else {
                Ok(padded)
            }
        })
        .collect()
}

impl<P: DataProvider> DataProvider for ZeroPad<P> {
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>> {
        let containers = self.upstream.get_data(selection)?.materialize()?;
        debug!(containers = containers.len(), align_front = self.align_front, "Zero padding");
        Ok(DataSource::Eager(zero_pad(containers, self.align_front)?))
    }
}

impl<P: DataProvider> Stage for ZeroPad<P> {
    fn config(&self) -> StageConfig {
        StageConfig::ZeroPad {
            align_front: self.align_front,
        }
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use bsp_core::Event;

    fn filled(samples: usize, value: f32) -> TimeSeriesBuffer {
        TimeSeriesBuffer::from_vec(vec![value; samples * 3], 3, 10.0, None).unwrap()
    }

    #[test]
    fn test_pad_back() {
        let inputs = vec![filled(2, 1.0), filled(5, 2.0), filled(7, 3.0)];
        let out = zero_pad(inputs.clone(), false).unwrap();

        assert!(out.iter().all(|c| c.shape() == (7, 3)));
        assert_eq!(out[0].row(1), Some(vec![1.0; 3]));
        assert_eq!(out[0].row(2), Some(vec![0.0; 3]));
        assert_eq!(out[1].row(5), Some(vec![0.0; 3]));
        assert_eq!(out[2].value(6, 2), Some(3.0));

        // Inputs are untouched and order is kept
        assert_eq!(inputs[0].samples(), 2);
        assert!(out[2].shares_storage(&inputs[2]));
        assert_eq!(out.iter().map(|c| c.value(0, 0).unwrap()).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_pad_front_shifts_events() {
        let short = filled(2, 1.0).with_events(vec![Event::point("tap", 0.1)]);
        let out = zero_pad(vec![short, filled(5, 2.0)], true).unwrap();
        assert_eq!(out[0].row(0), Some(vec![0.0; 3]));
        assert_eq!(out[0].row(3), Some(vec![1.0; 3]));
        assert!((out[0].events()[0].start - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_stage_is_always_eager() {
        let source = MemorySource::streaming(vec![filled(2, 1.0), filled(4, 1.0)]);
        let stage = ZeroPad::new(source, false).unwrap();
        assert_eq!(stage.mode(), ExecutionMode::Batch);
        let data = stage.get_data(&Selection::default()).unwrap();
        assert!(!data.is_lazy());
        assert!(zero_pad(Vec::new(), false).unwrap().is_empty());
    }
}
