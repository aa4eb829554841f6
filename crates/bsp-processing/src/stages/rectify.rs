//! Full-wave rectification

use crate::config::StageConfig;
use crate::source::{DataProvider, DataSource, ExecutionMode};
use crate::stage::Stage;
use bsp_core::{BspResult, Selection, TimeSeriesBuffer};
use tracing::debug;

/// Elementwise absolute value
pub struct Rectify<P> {
    upstream: P,
    mode: ExecutionMode,
}

impl<P: DataProvider> Rectify<P> {
    pub fn new(upstream: P, mode: ExecutionMode) -> Self {
        Self { upstream, mode }
    }
}

pub fn rectify(container: TimeSeriesBuffer) -> BspResult<TimeSeriesBuffer> {
    let values = container.with_values(|data| data.iter().map(|v| v.abs()).collect());
    container.rebuild(values, container.frequency())
}

impl<P: DataProvider> DataProvider for Rectify<P> {
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>> {
        debug!(mode = ?self.mode, "Pulling rectify stage");
        self.upstream.get_data(selection)?.map(self.mode, rectify)
    }

    fn is_unbounded(&self) -> bool {
        self.upstream.is_unbounded()
    }
}

impl<P: DataProvider> Stage for Rectify<P> {
    fn config(&self) -> StageConfig {
        StageConfig::Rectify
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }
}
