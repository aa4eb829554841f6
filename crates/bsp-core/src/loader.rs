//! Loader strategy for recordings whose data lives in a file

use crate::error::BspResult;
use ndarray::Array2;
use std::path::Path;

/// Reads a file into a `samples × channels` matrix
///
/// Implementations live outside the core (see `bsp-io`); the hierarchy only
/// calls `load` the first time a file-backed recording is accessed.
pub trait MatrixLoader: Send + Sync {
    fn load(&self, path: &Path) -> BspResult<Array2<f32>>;
}
