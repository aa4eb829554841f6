//! Rolling root-mean-square envelope

use crate::config::StageConfig;
use crate::source::{DataProvider, DataSource, ExecutionMode};
use crate::stage::Stage;
use bsp_core::{config_error, BspError, BspResult, Selection, TimeSeriesBuffer};
use tracing::debug;

/// Moving RMS over `window_size` seconds per channel
///
/// With `w = round(window_size * frequency)` the output has
/// `samples - w + 1` rows; row `i` covers input rows `i..i + w`.
pub struct RollingRms<P> {
    upstream: P,
    window_size: f64,
    mode: ExecutionMode,
}

impl<P: DataProvider> RollingRms<P> {
    pub fn new(upstream: P, window_size: f64, mode: ExecutionMode) -> BspResult<Self> {
        StageConfig::RollingRms { window_size }.validate()?;
        Ok(Self {
            upstream,
            window_size,
            mode,
        })
    }
}

pub fn rolling_rms(container: TimeSeriesBuffer, window_size: f64) -> BspResult<TimeSeriesBuffer> {
    let samples = container.samples();
    let channels = container.channels();
    let window = (window_size * container.frequency()).round() as usize;
    if window == 0 {
        return Err(config_error!(
            "RMS window of {}s is shorter than one sample at {}Hz",
            window_size,
            container.frequency()
        ));
    }
    if window > samples {
        return Err(BspError::InsufficientLength { window, samples });
    }

    let rows = samples - window + 1;
    let values = container.with_values(|data| {
        let mut out = vec![0.0f32; rows * channels];
        for c in 0..channels {
            let sample = |i: usize| data[i * channels + c] as f64;
            // Running sum in f64; clamp guards against tiny negative drift
            let mut sum_sq: f64 = (0..window).map(|i| sample(i).powi(2)).sum();
            out[c] = (sum_sq.max(0.0) / window as f64).sqrt() as f32;
            for i in 1..rows {
                sum_sq += sample(i + window - 1).powi(2) - sample(i - 1).powi(2);
                out[i * channels + c] = (sum_sq.max(0.0) / window as f64).sqrt() as f32;
            }
        }
        out
    });

    container.rebuild(values, container.frequency())
}

impl<P: DataProvider> DataProvider for RollingRms<P> {
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>> {
        let window_size = self.window_size;
        debug!(window_size, mode = ?self.mode, "Pulling rolling RMS stage");
        self.upstream
            .get_data(selection)?
            .map(self.mode, move |container| rolling_rms(container, window_size))
    }

    fn is_unbounded(&self) -> bool {
        self.upstream.is_unbounded()
    }
}

impl<P: DataProvider> Stage for RollingRms<P> {
    fn config(&self) -> StageConfig {
        StageConfig::RollingRms {
            window_size: self.window_size,
        }
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }
}
