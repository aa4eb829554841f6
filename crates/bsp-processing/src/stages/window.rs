//! Sliding windows

use crate::config::StageConfig;
use crate::source::{DataProvider, DataSource, ExecutionMode};
use crate::stage::Stage;
use bsp_core::{config_error, time_to_index, BspResult, Selection, TimeSeriesBuffer};
use tracing::debug;

/// Cut every container into windows of `window_size` seconds, advancing by
/// `stride` seconds
///
/// Windows are views on the input storage and carry the events that start
/// inside them. An event already in progress when a window begins is not
/// copied into it, so `one_hot` label vectors of such a window miss that
/// event. A trailing partial window is dropped. Without an explicit
/// stride, each pull uses one sample period of the first container it
/// sees.
pub struct Window<P> {
    upstream: P,
    window_size: f64,
    stride: Option<f64>,
    mode: ExecutionMode,
}

impl<P: DataProvider> Window<P> {
    pub fn new(upstream: P, window_size: f64, stride: Option<f64>, mode: ExecutionMode) -> BspResult<Self> {
        StageConfig::Window { window_size, stride }.validate()?;
        Ok(Self {
            upstream,
            window_size,
            stride,
            mode,
        })
    }
}

/// All complete windows of one container
pub fn windows(container: &TimeSeriesBuffer, window_size: f64, stride: f64) -> BspResult<Vec<TimeSeriesBuffer>> {
    let frequency = container.frequency();
    let length = (window_size * frequency).round() as usize;
    if length == 0 {
        return Err(config_error!(
            "Window of {}s is shorter than one sample at {}Hz",
            window_size, frequency
        ));
    }

    let mut out = Vec::new();
    for step in 0usize.. {
        let first = time_to_index(step as f64 * stride, frequency);
        if first + length > container.samples() {
            break;
        }
        out.push(container.view_rows(first, length)?);
    }
    if out.is_empty() {
        debug!(
            samples = container.samples(),
            window = length,
            "Container shorter than one window"
        );
    }
    Ok(out)
}

impl<P: DataProvider> DataProvider for Window<P> {
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>> {
        let window_size = self.window_size;
        let mut stride = self.stride;
        debug!(window_size, ?stride, mode = ?self.mode, "Pulling window stage");

        self.upstream.get_data(selection)?.flat_map(self.mode, move |container| {
            let step = *stride.get_or_insert_with(|| 1.0 / container.frequency());
            windows(&container, window_size, step)
        })
    }

    fn is_unbounded(&self) -> bool {
        self.upstream.is_unbounded()
    }
}

impl<P: DataProvider> Stage for Window<P> {
    fn config(&self) -> StageConfig {
        StageConfig::Window {
            window_size: self.window_size,
            stride: self.stride,
        }
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }
}
