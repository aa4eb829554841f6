//! Live stream as an unbounded pipeline source

use crate::subscriber::Subscriber;
use crate::wire;
use bsp_core::{BspError, BspResult, Selection, TimeSeriesBuffer};
use bsp_processing::{DataProvider, DataSource};
use std::cell::Cell;
use std::iter;
use tracing::{debug, info};

/// Decodes frames from a [`Subscriber`] into containers, one per pull
///
/// The sequence only ends when the subscriber reports the stream closed,
/// so stages that materialise their input refuse to sit downstream.
pub struct LiveSource {
    subscriber: Box<dyn Subscriber>,
    columns: Option<Vec<String>>,
    label: Option<String>,
    received: Cell<usize>,
}

impl LiveSource {
    pub fn new(subscriber: impl Subscriber + 'static) -> Self {
        Self::boxed(Box::new(subscriber))
    }

    pub fn boxed(subscriber: Box<dyn Subscriber>) -> Self {
        Self {
            subscriber,
            columns: None,
            label: None,
            received: Cell::new(0),
        }
    }

    /// Channel names applied to every decoded frame
    pub fn with_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Frames decoded so far
    pub fn received(&self) -> usize {
        self.received.get()
    }

    fn next_container(&self, selection: &Selection) -> Option<BspResult<TimeSeriesBuffer>> {
        let frame = match self.subscriber.receive() {
            Ok(frame) => frame,
            Err(BspError::StreamClosed { reason }) => {
                info!(frames = self.received.get(), %reason, "Live stream closed");
                return None;
            }
            Err(e) => return Some(Err(e)),
        };
        Some(self.convert(&frame, selection))
    }

    fn convert(&self, frame: &[u8], selection: &Selection) -> BspResult<TimeSeriesBuffer> {
        let (header, mut buffer) = wire::decode_frame(frame)?;
        self.received.set(self.received.get() + 1);
        debug!(
            timestamp = header.timestamp,
            samples = header.samples,
            channels = header.channels,
            "Decoded live frame"
        );

        if let Some(columns) = &self.columns {
            buffer = buffer.with_columns(columns.clone())?;
        }
        buffer = buffer.with_label(self.label.clone());
        match &selection.channels {
            Some(channels) => buffer.select_columns(channels),
            None => Ok(buffer),
        }
    }
}

impl DataProvider for LiveSource {
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>> {
        let selection = selection.clone();
        Ok(DataSource::lazy(iter::from_fn(move || {
            self.next_container(&selection)
        })))
    }

    fn is_unbounded(&self) -> bool {
        true
    }
}
