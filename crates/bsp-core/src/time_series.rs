//! TimeSeriesBuffer: core container for multi-channel EMG data
//!
//! Data is stored sample-major (one row per sample, one column per
//! channel) in a shared, growable vector. Time-range slices are views onto
//! the same storage, so writing through a slice is visible to every other
//! buffer that covers those rows. Column-subset slices copy and therefore
//! lose that property.

use crate::config_error;
use crate::error::{BspError, BspResult};
use crate::event::Event;
use ndarray::{Array2, ArrayD, ArrayView2};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Added before flooring so that `t * f` landing a hair below an integer
/// still maps to that integer (e.g. `0.3 * 10.0 == 2.9999999999999996`).
pub const INDEX_EPSILON: f64 = 1e-3;

/// Convert a non-negative time in seconds to a sample index
pub fn time_to_index(time: f64, frequency: f64) -> usize {
    (time * frequency + INDEX_EPSILON).floor() as usize
}

/// Column labels used when a matrix is wrapped without names
pub fn default_columns(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("ch{}", i)).collect()
}

pub(crate) fn validate_frequency(frequency: f64) -> BspResult<()> {
    if frequency.is_finite() && frequency > 0.0 {
        Ok(())
    } else {
        Err(config_error!("Sampling frequency must be positive, got {}", frequency))
    }
}

type Storage = Arc<RwLock<Vec<f32>>>;

/// Rectangular `samples × channels` time series with named columns
#[derive(Clone)]
pub struct TimeSeriesBuffer {
    storage: Storage,
    /// First storage row covered by this buffer
    offset: usize,
    samples: usize,
    channels: usize,
    columns: Arc<[String]>,
    frequency: f64,
    events: Vec<Event>,
    label: Option<String>,
}

impl TimeSeriesBuffer {
    /// Wrap a matrix; anything other than a 2-D array is rejected
    pub fn from_matrix(
        data: ArrayD<f32>,
        frequency: f64,
        columns: Option<Vec<String>>,
    ) -> BspResult<Self> {
        if data.ndim() != 2 {
            return Err(BspError::Shape {
                expected: "2-dimensional matrix".to_string(),
                actual: format!("{}-dimensional array of shape {:?}", data.ndim(), data.shape()),
            });
        }
        let channels = data.shape()[1];
        let values: Vec<f32> = data.iter().copied().collect();
        Self::from_vec(values, channels, frequency, columns)
    }

    pub fn from_array(
        data: Array2<f32>,
        frequency: f64,
        columns: Option<Vec<String>>,
    ) -> BspResult<Self> {
        Self::from_matrix(data.into_dyn(), frequency, columns)
    }

    /// Build from row-major values (`[s0c0, s0c1, ..., s1c0, ...]`)
    pub fn from_vec(
        values: Vec<f32>,
        channels: usize,
        frequency: f64,
        columns: Option<Vec<String>>,
    ) -> BspResult<Self> {
        validate_frequency(frequency)?;

        if channels == 0 {
            return Err(BspError::Shape {
                expected: "at least one channel".to_string(),
                actual: "0 channels".to_string(),
            });
        }
        if values.len() % channels != 0 {
            return Err(BspError::Shape {
                expected: format!("a multiple of {} values", channels),
                actual: format!("{} values", values.len()),
            });
        }

        let columns = match columns {
            Some(names) if names.len() != channels => {
                return Err(BspError::Shape {
                    expected: format!("{} column labels", channels),
                    actual: format!("{} column labels", names.len()),
                });
            }
            Some(names) => names,
            None => default_columns(channels),
        };

        let samples = values.len() / channels;
        Ok(Self {
            storage: Arc::new(RwLock::new(values)),
            offset: 0,
            samples,
            channels,
            columns: columns.into(),
            frequency,
            events: Vec::new(),
            label: None,
        })
    }

    pub fn zeros(
        samples: usize,
        channels: usize,
        frequency: f64,
        columns: Option<Vec<String>>,
    ) -> BspResult<Self> {
        Self::from_vec(vec![0.0; samples * channels], channels, frequency, columns)
    }

    /// New buffer with fresh storage that keeps this buffer's columns,
    /// events and label. Used by transforms that compute new values.
    pub fn rebuild(&self, values: Vec<f32>, frequency: f64) -> BspResult<Self> {
        let mut rebuilt = Self::from_vec(values, self.channels, frequency, None)?;
        rebuilt.columns = Arc::clone(&self.columns);
        rebuilt.events = self.events.clone();
        rebuilt.label = self.label.clone();
        Ok(rebuilt)
    }

    /// Replace the column labels; the count must match the channel count
    pub fn with_columns(mut self, names: Vec<String>) -> BspResult<Self> {
        if names.len() != self.channels {
            return Err(BspError::Shape {
                expected: format!("{} column labels", self.channels),
                actual: format!("{} column labels", names.len()),
            });
        }
        self.columns = names.into();
        Ok(self)
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `(samples, channels)`
    pub fn shape(&self) -> (usize, usize) {
        (self.samples, self.channels)
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Duration in seconds, derived from the current sample count
    pub fn duration(&self) -> f64 {
        self.samples as f64 / self.frequency
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    /// Sample index for a time in seconds
    pub fn index_of(&self, time: f64) -> BspResult<usize> {
        if !time.is_finite() || time < 0.0 {
            return Err(BspError::out_of_bounds(format!(
                "time {}s is negative or not finite",
                time
            )));
        }
        Ok(time_to_index(time, self.frequency))
    }

    /// `[first, last)` sample range for a time range, validated against
    /// the buffer length
    pub fn sample_range(&self, start: f64, stop: f64) -> BspResult<(usize, usize)> {
        let first = self.index_of(start)?;
        let last = self.index_of(stop)?;
        if last > self.samples {
            return Err(BspError::out_of_bounds(format!(
                "stop {}s (sample {}) exceeds buffer of {} samples ({:.4}s)",
                stop,
                last,
                self.samples,
                self.duration()
            )));
        }
        if first > last {
            return Err(BspError::out_of_bounds(format!(
                "start {}s lies after stop {}s",
                start, stop
            )));
        }
        Ok((first, last))
    }

    /// Slice `[start, stop)` seconds. Without `columns` the result is a
    /// view sharing storage; with `columns` it is a copy.
    pub fn slice(&self, start: f64, stop: f64, columns: Option<&[String]>) -> BspResult<Self> {
        let (first, last) = self.sample_range(start, stop)?;
        let view = self.view_rows(first, last - first)?;
        match columns {
            Some(names) => view.select_columns(names),
            None => Ok(view),
        }
    }

    /// Single-sample view at `time`
    pub fn slice_at(&self, time: f64) -> BspResult<Self> {
        let index = self.index_of(time)?;
        if index >= self.samples {
            return Err(BspError::out_of_bounds(format!(
                "time {}s (sample {}) outside buffer of {} samples",
                time, index, self.samples
            )));
        }
        self.view_rows(index, 1)
    }

    /// View over `len` rows starting at row `first`, sharing storage.
    /// Events starting inside the range are carried over, re-based to the
    /// start of the view.
    pub fn view_rows(&self, first: usize, len: usize) -> BspResult<Self> {
        if first + len > self.samples {
            return Err(BspError::out_of_bounds(format!(
                "rows [{}, {}) outside buffer of {} samples",
                first,
                first + len,
                self.samples
            )));
        }

        let begin = first as f64 / self.frequency;
        let end = (first + len) as f64 / self.frequency;
        let events = self
            .events
            .iter()
            .filter(|e| e.starts_within(begin, end))
            .map(|e| e.shifted(-begin))
            .collect();

        Ok(Self {
            storage: Arc::clone(&self.storage),
            offset: self.offset + first,
            samples: len,
            channels: self.channels,
            columns: Arc::clone(&self.columns),
            frequency: self.frequency,
            events,
            label: self.label.clone(),
        })
    }

    /// Copy of the named columns, in the requested order
    pub fn select_columns(&self, names: &[String]) -> BspResult<Self> {
        let indices = names
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| BspError::not_found("channel", name.as_str()))
            })
            .collect::<BspResult<Vec<usize>>>()?;

        let mut values = Vec::with_capacity(self.samples * indices.len());
        self.with_values(|data| {
            for row in data.chunks_exact(self.channels) {
                values.extend(indices.iter().map(|&i| row[i]));
            }
        });

        let mut selected = Self::from_vec(values, indices.len(), self.frequency, Some(names.to_vec()))?;
        selected.events = self.events.clone();
        selected.label = self.label.clone();
        Ok(selected)
    }

    /// Write `data` into `[start, stop)` seconds of the backing storage
    pub fn set(&self, start: f64, stop: f64, data: ArrayView2<'_, f32>) -> BspResult<()> {
        let (first, last) = self.sample_range(start, stop)?;
        self.write_rows(first, last - first, data)
    }

    /// Write `data` starting at row `first`; `data` must have exactly
    /// `len` rows and one column per channel
    pub fn write_rows(&self, first: usize, len: usize, data: ArrayView2<'_, f32>) -> BspResult<()> {
        if data.ncols() != self.channels || data.nrows() != len {
            return Err(BspError::Shape {
                expected: format!("({}, {})", len, self.channels),
                actual: format!("({}, {})", data.nrows(), data.ncols()),
            });
        }
        if first + len > self.samples {
            return Err(BspError::out_of_bounds(format!(
                "rows [{}, {}) outside buffer of {} samples",
                first,
                first + len,
                self.samples
            )));
        }

        let mut storage = self.storage.write();
        for (r, row) in data.rows().into_iter().enumerate() {
            let base = (self.offset + first + r) * self.channels;
            for (c, value) in row.iter().enumerate() {
                storage[base + c] = *value;
            }
        }
        Ok(())
    }

    /// Grow the storage with new rows. Only the buffer that covers the
    /// whole storage may do this; views keep their own extent.
    pub fn append(&mut self, data: ArrayView2<'_, f32>) -> BspResult<()> {
        if data.ncols() != self.channels {
            return Err(BspError::Shape {
                expected: format!("{} columns", self.channels),
                actual: format!("{} columns", data.ncols()),
            });
        }

        let mut storage = self.storage.write();
        if self.offset != 0 || storage.len() != self.samples * self.channels {
            return Err(BspError::config("only the buffer owning all storage rows can grow"));
        }
        storage.extend(data.iter().copied());
        self.samples += data.nrows();
        Ok(())
    }

    /// Run `f` over this buffer's row-major values without copying
    pub fn with_values<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        let storage = self.storage.read();
        let begin = self.offset * self.channels;
        let end = begin + self.samples * self.channels;
        f(&storage[begin..end])
    }

    /// Row-major copy of the values
    pub fn to_vec(&self) -> Vec<f32> {
        self.with_values(|data| data.to_vec())
    }

    /// Copy into an owned `samples × channels` array
    pub fn to_array(&self) -> Array2<f32> {
        let channels = self.channels;
        self.with_values(|data| {
            Array2::from_shape_fn((self.samples, channels), |(s, c)| data[s * channels + c])
        })
    }

    pub fn value(&self, sample: usize, channel: usize) -> Option<f32> {
        if sample >= self.samples || channel >= self.channels {
            return None;
        }
        Some(self.with_values(|data| data[sample * self.channels + channel]))
    }

    pub fn row(&self, sample: usize) -> Option<Vec<f32>> {
        if sample >= self.samples {
            return None;
        }
        Some(self.with_values(|data| {
            data[sample * self.channels..(sample + 1) * self.channels].to_vec()
        }))
    }

    /// Get data for a specific channel
    pub fn channel_data(&self, channel: usize) -> BspResult<Vec<f32>> {
        if channel >= self.channels {
            return Err(BspError::out_of_bounds(format!(
                "channel index {} out of bounds (0-{})",
                channel,
                self.channels - 1
            )));
        }
        Ok(self.with_values(|data| {
            data.iter().skip(channel).step_by(self.channels).copied().collect()
        }))
    }

    /// Calculate basic statistics for a channel
    pub fn channel_stats(&self, channel: usize) -> BspResult<ChannelStats> {
        let data = self.channel_data(channel)?;
        Ok(ChannelStats::calculate(&data))
    }

    /// True when both buffers read and write the same storage
    pub fn shares_storage(&self, other: &TimeSeriesBuffer) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Indicator vector over samples: 1.0 where an event named `name` is
    /// active, 0.0 elsewhere
    pub fn one_hot(&self, name: &str) -> BspResult<Vec<f32>> {
        if self.events.is_empty() {
            return Err(BspError::Empty {
                reason: "buffer carries no events".to_string(),
            });
        }

        let matching: Vec<&Event> = self.events.iter().filter(|e| e.name == name).collect();
        if matching.is_empty() {
            return Err(BspError::not_found("event", name));
        }

        let mut vector = vec![0.0; self.samples];
        for event in matching {
            let first = time_to_index(event.start.max(0.0), self.frequency);
            let last = match event.duration {
                Some(duration) => time_to_index((event.start + duration).max(0.0), self.frequency),
                None => first + 1,
            };
            for value in vector.iter_mut().take(last.min(self.samples)).skip(first) {
                *value = 1.0;
            }
        }
        Ok(vector)
    }
}

impl fmt::Debug for TimeSeriesBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSeriesBuffer")
            .field("samples", &self.samples)
            .field("channels", &self.channels)
            .field("frequency", &self.frequency)
            .field("offset", &self.offset)
            .field("columns", &self.columns)
            .field("events", &self.events.len())
            .field("label", &self.label)
            .finish()
    }
}

/// Basic statistics for a signal channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f32,
    pub rms: f32,
    pub std_dev: f32,
    pub min: f32,
    pub max: f32,
}

impl ChannelStats {
    pub fn calculate(data: &[f32]) -> Self {
        if data.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }

        let n = data.len() as f32;
        let mean = data.iter().sum::<f32>() / n;
        let rms = (data.iter().map(|x| x * x).sum::<f32>() / n).sqrt();
        let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;

        Self {
            mean,
            rms,
            std_dev: variance.sqrt(),
            min: data.iter().fold(f32::INFINITY, |a, &b| a.min(b)),
            max: data.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn ramp(samples: usize, channels: usize, frequency: f64) -> TimeSeriesBuffer {
        let values = (0..samples * channels).map(|i| i as f32).collect();
        TimeSeriesBuffer::from_vec(values, channels, frequency, None).unwrap()
    }

    #[test]
    fn test_from_matrix_rejects_non_2d() {
        let cube = Array3::<f32>::zeros((2, 3, 4)).into_dyn();
        let result = TimeSeriesBuffer::from_matrix(cube, 100.0, None);
        assert!(matches!(result, Err(BspError::Shape { .. })));
    }

    #[test]
    fn test_from_matrix_shape_and_labels() {
        let data = array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let buffer = TimeSeriesBuffer::from_array(data, 10.0, None).unwrap();
        assert_eq!(buffer.shape(), (3, 2));
        assert_eq!(buffer.columns(), &["ch0".to_string(), "ch1".to_string()]);
        assert_eq!(buffer.value(1, 1), Some(4.0));
        assert!((buffer.duration() - 0.3).abs() < 1e-12);

        let wrong = TimeSeriesBuffer::from_array(array![[1.0f32, 2.0]], 10.0, Some(vec!["a".into()]));
        assert!(matches!(wrong, Err(BspError::Shape { .. })));
    }

    #[test]
    fn test_index_epsilon() {
        // 0.3 * 10.0 is 2.9999999999999996 in binary floating point
        assert_eq!(time_to_index(0.3, 10.0), 3);
        assert_eq!(time_to_index(0.7, 10.0), 7);
        assert_eq!(time_to_index(0.25, 20.0), 5);
        assert_eq!(time_to_index(0.0, 2000.0), 0);
    }

    #[test]
    fn test_full_slice_keeps_shape() {
        let buffer = ramp(37, 3, 7.0);
        let full = buffer.slice(0.0, buffer.duration(), None).unwrap();
        assert_eq!(full.shape(), buffer.shape());
    }

    #[test]
    fn test_slice_bounds() {
        let buffer = ramp(10, 1, 10.0);
        assert!(matches!(buffer.slice(-0.1, 0.5, None), Err(BspError::OutOfBounds { .. })));
        assert!(matches!(buffer.slice(0.0, 1.1, None), Err(BspError::OutOfBounds { .. })));
        assert!(matches!(buffer.slice(0.6, 0.5, None), Err(BspError::OutOfBounds { .. })));
        assert!(matches!(buffer.slice_at(1.0), Err(BspError::OutOfBounds { .. })));

        let part = buffer.slice(0.2, 0.5, None).unwrap();
        assert_eq!(part.samples(), 3);
        assert_eq!(part.value(0, 0), Some(2.0));
        assert_eq!(buffer.slice_at(0.9).unwrap().value(0, 0), Some(9.0));
    }

    #[test]
    fn test_time_slice_is_a_view() {
        let buffer = ramp(10, 2, 10.0);
        let view = buffer.slice(0.5, 0.8, None).unwrap();
        assert!(view.shares_storage(&buffer));

        view.set(0.0, 0.1, array![[-1.0f32, -2.0]].view()).unwrap();
        assert_eq!(buffer.row(5), Some(vec![-1.0, -2.0]));

        buffer.write_rows(6, 1, array![[42.0f32, 43.0]].view()).unwrap();
        assert_eq!(view.row(1), Some(vec![42.0, 43.0]));
    }

    #[test]
    fn test_column_slice_is_a_copy() {
        let buffer = TimeSeriesBuffer::from_array(
            array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]],
            2.0,
            Some(vec!["a".into(), "b".into(), "c".into()]),
        )
        .unwrap();

        let selected = buffer
            .slice(0.0, 1.0, Some(&["c".to_string(), "a".to_string()]))
            .unwrap();
        assert!(!selected.shares_storage(&buffer));
        assert_eq!(selected.to_vec(), vec![3.0, 1.0, 6.0, 4.0]);
        assert_eq!(selected.columns(), &["c".to_string(), "a".to_string()]);

        let missing = buffer.select_columns(&["z".to_string()]);
        assert!(matches!(missing, Err(BspError::NotFound { kind: "channel", .. })));
    }

    #[test]
    fn test_set_shape_mismatch() {
        let buffer = ramp(10, 2, 10.0);
        let result = buffer.set(0.0, 0.2, array![[1.0f32], [2.0]].view());
        assert!(matches!(result, Err(BspError::Shape { .. })));
        let result = buffer.set(0.0, 0.2, array![[1.0f32, 2.0]].view());
        assert!(matches!(result, Err(BspError::Shape { .. })));
    }

    #[test]
    fn test_view_carries_events() {
        let buffer = ramp(20, 1, 10.0).with_events(vec![
            Event::point("early", 0.3),
            Event::new("late", 1.2, Some(0.2)),
        ]);
        let view = buffer.slice(1.0, 2.0, None).unwrap();
        assert_eq!(view.events().len(), 1);
        assert_eq!(view.events()[0].name, "late");
        assert!((view.events()[0].start - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_one_hot() {
        let buffer = ramp(10, 1, 10.0);
        assert!(matches!(buffer.one_hot("grip"), Err(BspError::Empty { .. })));

        let buffer = buffer.with_events(vec![
            Event::new("grip", 0.2, Some(0.3)),
            Event::point("grip", 0.8),
            Event::point("release", 0.9),
        ]);
        let hot = buffer.one_hot("grip").unwrap();
        assert_eq!(hot, vec![0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert!(matches!(buffer.one_hot("rest"), Err(BspError::NotFound { .. })));
    }

    #[test]
    fn test_append_only_on_owner() {
        let mut buffer = ramp(4, 2, 10.0);
        buffer.append(array![[8.0f32, 9.0]].view()).unwrap();
        assert_eq!(buffer.samples(), 5);
        assert_eq!(buffer.row(4), Some(vec![8.0, 9.0]));

        let mut view = buffer.view_rows(1, 2).unwrap();
        assert!(view.append(array![[0.0f32, 0.0]].view()).is_err());
    }

    #[test]
    fn test_channel_stats() {
        let buffer = TimeSeriesBuffer::from_vec(vec![3.0, -3.0, 3.0, -3.0], 1, 4.0, None).unwrap();
        let stats = buffer.channel_stats(0).unwrap();
        approx::assert_abs_diff_eq!(stats.mean, 0.0);
        approx::assert_abs_diff_eq!(stats.rms, 3.0);
        assert!(buffer.channel_stats(1).is_err());
    }
}
