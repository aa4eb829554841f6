//! Data sources flowing between pipeline stages
//!
//! A pull on any stage yields a [`DataSource`]: either a materialised list
//! of containers or a single-pass lazy sequence that produces one
//! container per pull.

use bsp_core::{BspResult, Experiment, Selection, TimeSeriesBuffer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage hands its output downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One container at a time, computed when pulled
    #[default]
    Streaming,
    /// Everything computed before the stage returns
    Batch,
}

pub type ContainerIter<'a> = Box<dyn Iterator<Item = BspResult<TimeSeriesBuffer>> + 'a>;

pub enum DataSource<'a> {
    Eager(Vec<TimeSeriesBuffer>),
    Lazy(ContainerIter<'a>),
}

impl<'a> DataSource<'a> {
    pub fn lazy<I>(iter: I) -> Self
    where
        I: Iterator<Item = BspResult<TimeSeriesBuffer>> + 'a,
    {
        DataSource::Lazy(Box::new(iter))
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, DataSource::Lazy(_))
    }

    /// Pull everything; the first error aborts
    pub fn materialize(self) -> BspResult<Vec<TimeSeriesBuffer>> {
        match self {
            DataSource::Eager(containers) => Ok(containers),
            DataSource::Lazy(iter) => iter.collect(),
        }
    }

    /// Apply a one-to-one transform, lazily or eagerly depending on `mode`
    pub fn map<F>(self, mode: ExecutionMode, mut f: F) -> BspResult<DataSource<'a>>
    where
        F: FnMut(TimeSeriesBuffer) -> BspResult<TimeSeriesBuffer> + 'a,
    {
        let mapped = self.into_iter().map(move |item| item.and_then(&mut f));
        match mode {
            ExecutionMode::Streaming => Ok(DataSource::lazy(mapped)),
            ExecutionMode::Batch => Ok(DataSource::Eager(mapped.collect::<BspResult<_>>()?)),
        }
    }

    /// Apply a one-to-many transform, flattening the results in order
    pub fn flat_map<F>(self, mode: ExecutionMode, mut f: F) -> BspResult<DataSource<'a>>
    where
        F: FnMut(TimeSeriesBuffer) -> BspResult<Vec<TimeSeriesBuffer>> + 'a,
    {
        let expanded = self.into_iter().flat_map(move |item| match item.and_then(&mut f) {
            Ok(parts) => parts.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        });
        match mode {
            ExecutionMode::Streaming => Ok(DataSource::lazy(expanded)),
            ExecutionMode::Batch => Ok(DataSource::Eager(expanded.collect::<BspResult<_>>()?)),
        }
    }
}

impl<'a> IntoIterator for DataSource<'a> {
    type Item = BspResult<TimeSeriesBuffer>;
    type IntoIter = ContainerIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            DataSource::Eager(containers) => Box::new(containers.into_iter().map(Ok)),
            DataSource::Lazy(iter) => iter,
        }
    }
}

impl fmt::Debug for DataSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Eager(containers) => write!(f, "Eager({} containers)", containers.len()),
            DataSource::Lazy(_) => write!(f, "Lazy"),
        }
    }
}

/// Anything a stage can pull containers from
pub trait DataProvider {
    /// Resolve `selection` into a sequence of containers. Providers that do
    /// not own a key pass the selection upstream unchanged.
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>>;

    /// True for sources that never end, such as a live stream
    fn is_unbounded(&self) -> bool {
        false
    }
}

impl DataProvider for Experiment {
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>> {
        Ok(DataSource::Eager(self.select(selection)?))
    }
}

impl<T: DataProvider + ?Sized> DataProvider for &T {
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>> {
        (**self).get_data(selection)
    }

    fn is_unbounded(&self) -> bool {
        (**self).is_unbounded()
    }
}

impl<T: DataProvider + ?Sized> DataProvider for Box<T> {
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>> {
        (**self).get_data(selection)
    }

    fn is_unbounded(&self) -> bool {
        (**self).is_unbounded()
    }
}

/// Fixed list of containers, ignoring the selection
///
/// Handy as the head of a pipeline over data that did not come from an
/// experiment, and in tests. Every pull hands out views on the same
/// storage.
#[derive(Debug, Clone)]
pub struct MemorySource {
    containers: Vec<TimeSeriesBuffer>,
    mode: ExecutionMode,
}

impl MemorySource {
    pub fn new(containers: Vec<TimeSeriesBuffer>, mode: ExecutionMode) -> Self {
        Self { containers, mode }
    }

    pub fn eager(containers: Vec<TimeSeriesBuffer>) -> Self {
        Self::new(containers, ExecutionMode::Batch)
    }

    pub fn streaming(containers: Vec<TimeSeriesBuffer>) -> Self {
        Self::new(containers, ExecutionMode::Streaming)
    }
}

impl DataProvider for MemorySource {
    fn get_data(&self, _selection: &Selection) -> BspResult<DataSource<'_>> {
        Ok(match self.mode {
            ExecutionMode::Batch => DataSource::Eager(self.containers.clone()),
            ExecutionMode::Streaming => DataSource::lazy(self.containers.iter().cloned().map(Ok)),
        })
    }
}
