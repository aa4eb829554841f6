//! Borrowed handles for navigating and querying the experiment tree
//!
//! "Relevant time" of a recording is the back-to-back concatenation of its
//! trials; the gaps between trials in the raw buffer do not count. A
//! session's relevant time concatenates its recordings' relevant time.
//! Data and event queries walk the same [`Span`] accumulation, so a label
//! query over `[begin, end)` always matches the data query over it.

use super::entities::*;
use super::experiment::Experiment;
use crate::error::{BspError, BspResult};
use crate::event::Event;
use crate::time_series::TimeSeriesBuffer;
use ndarray::ArrayView2;
use tracing::debug;

/// Slack allowed when a requested end lands on the total duration
const RANGE_TOLERANCE: f64 = 1e-9;

/// Part of a child overlapping a requested range of relevant time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span<T> {
    pub item: T,
    /// Where the child starts in the parent's relevant time
    pub offset: f64,
    /// Overlap start, relative to the child
    pub begin: f64,
    /// Overlap end (exclusive), relative to the child
    pub end: f64,
}

/// Walk `(child, duration)` pairs in order, accumulating offsets, and keep
/// the children overlapping `[begin, end)`
pub fn overlapping<T: Copy>(items: &[(T, f64)], begin: f64, end: f64) -> Vec<Span<T>> {
    let mut spans = Vec::new();
    let mut offset = 0.0;
    for &(item, duration) in items {
        if offset >= end {
            break;
        }
        let next = offset + duration;
        if next > begin {
            spans.push(Span {
                item,
                offset,
                begin: (begin - offset).max(0.0),
                end: (end - offset).min(duration),
            });
        }
        offset = next;
    }
    spans
}

fn resolve_range(begin: Option<f64>, end: Option<f64>, total: f64) -> BspResult<(f64, f64)> {
    let begin = begin.unwrap_or(0.0);
    let end = end.unwrap_or(total);
    if !(begin >= 0.0) || !(end >= begin) {
        return Err(BspError::out_of_bounds(format!(
            "invalid range [{}, {})",
            begin, end
        )));
    }
    if end > total + RANGE_TOLERANCE {
        return Err(BspError::out_of_bounds(format!(
            "range end {}s exceeds relevant duration {}s",
            end, total
        )));
    }
    Ok((begin, end))
}

#[derive(Clone, Copy)]
pub struct SessionRef<'a> {
    experiment: &'a Experiment,
    id: SessionId,
}

impl<'a> SessionRef<'a> {
    pub(crate) fn new(experiment: &'a Experiment, id: SessionId) -> Self {
        Self { experiment, id }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn entity(&self) -> &'a Session {
        &self.experiment.sessions[self.id.0]
    }

    pub fn name(&self) -> &'a str {
        &self.entity().name
    }

    pub fn setup(&self) -> &'a Setup {
        &self.experiment.setups[self.entity().setup.0]
    }

    pub fn subject(&self) -> &'a Subject {
        &self.experiment.subjects[self.entity().subject.0]
    }

    pub fn recordings(&self) -> impl Iterator<Item = RecordingRef<'a>> + 'a {
        let experiment = self.experiment;
        self.entity()
            .recordings
            .iter()
            .map(move |&id| RecordingRef::new(experiment, id))
    }

    pub fn recording(&self, name: &str) -> BspResult<RecordingRef<'a>> {
        let id = self
            .entity()
            .recording_index
            .get(name)
            .copied()
            .ok_or_else(|| BspError::not_found("recording", name))?;
        Ok(RecordingRef::new(self.experiment, id))
    }

    /// Recordings of one modality, in insertion order
    pub fn recordings_of(&self, modality: &str) -> BspResult<Vec<RecordingRef<'a>>> {
        let modality_id = self
            .setup()
            .modality_id(modality)
            .ok_or_else(|| BspError::not_found("modality", modality))?;
        Ok(self
            .recordings()
            .filter(|r| r.entity().modality == modality_id)
            .collect())
    }

    /// Trial containers of every recording of `modality`
    pub fn get_data(&self, modality: &str, channels: Option<&[String]>) -> BspResult<Vec<TimeSeriesBuffer>> {
        let mut containers = Vec::new();
        for recording in self.recordings_of(modality)? {
            containers.extend(recording.get_data(None, None, channels)?);
        }
        Ok(containers)
    }

    pub fn relevant_duration(&self, modality: &str) -> BspResult<f64> {
        Ok(self
            .recordings_of(modality)?
            .iter()
            .map(RecordingRef::relevant_duration)
            .sum())
    }

    fn recording_spans(&self, modality: &str, begin: Option<f64>, end: Option<f64>) -> BspResult<Vec<Span<RecordingRef<'a>>>> {
        let recordings: Vec<(RecordingRef<'a>, f64)> = self
            .recordings_of(modality)?
            .into_iter()
            .map(|r| (r, r.relevant_duration()))
            .collect();
        let total = recordings.iter().map(|(_, d)| d).sum();
        let (begin, end) = resolve_range(begin, end, total)?;
        Ok(overlapping(&recordings, begin, end))
    }

    /// Data within `[begin, end)` of the session's relevant time
    pub fn get_data_between(
        &self,
        modality: &str,
        begin: Option<f64>,
        end: Option<f64>,
        channels: Option<&[String]>,
    ) -> BspResult<Vec<TimeSeriesBuffer>> {
        let mut containers = Vec::new();
        for span in self.recording_spans(modality, begin, end)? {
            containers.extend(span.item.get_data(Some(span.begin), Some(span.end), channels)?);
        }
        Ok(containers)
    }

    /// Events starting within `[begin, end)`, with starts expressed in the
    /// session's relevant time
    pub fn get_events(&self, modality: &str, begin: Option<f64>, end: Option<f64>) -> BspResult<Vec<Event>> {
        let mut events = Vec::new();
        for span in self.recording_spans(modality, begin, end)? {
            events.extend(
                span.item
                    .get_events(Some(span.begin), Some(span.end))?
                    .into_iter()
                    .map(|e| e.shifted(span.offset)),
            );
        }
        Ok(events)
    }
}

#[derive(Clone, Copy)]
pub struct RecordingRef<'a> {
    experiment: &'a Experiment,
    id: RecordingId,
}

impl<'a> RecordingRef<'a> {
    pub(crate) fn new(experiment: &'a Experiment, id: RecordingId) -> Self {
        Self { experiment, id }
    }

    pub fn id(&self) -> RecordingId {
        self.id
    }

    pub fn entity(&self) -> &'a Recording {
        &self.experiment.recordings[self.id.0]
    }

    pub fn name(&self) -> &'a str {
        &self.entity().name
    }

    pub fn modality(&self) -> &'a Modality {
        &self.experiment.modalities[self.entity().modality.0]
    }

    pub fn session(&self) -> SessionRef<'a> {
        SessionRef::new(self.experiment, self.entity().session)
    }

    /// The recording's complete backing buffer (trials and gaps)
    pub fn buffer(&self) -> BspResult<&'a TimeSeriesBuffer> {
        self.entity().buffer(self.modality())
    }

    pub fn trials(&self) -> impl Iterator<Item = TrialRef<'a>> + 'a {
        let experiment = self.experiment;
        self.entity()
            .trials
            .iter()
            .map(move |&id| TrialRef::new(experiment, id))
    }

    pub fn trial(&self, name: &str) -> BspResult<TrialRef<'a>> {
        let id = self
            .entity()
            .trial_index
            .get(name)
            .copied()
            .ok_or_else(|| BspError::not_found("trial", name))?;
        Ok(TrialRef::new(self.experiment, id))
    }

    /// Sum of trial durations
    pub fn relevant_duration(&self) -> f64 {
        self.trials().map(|t| t.entity().duration).sum()
    }

    /// Trials overlapping `[begin, end)` of relevant time
    pub fn trial_spans(&self, begin: Option<f64>, end: Option<f64>) -> BspResult<Vec<Span<TrialId>>> {
        let trials: Vec<(TrialId, f64)> = self
            .trials()
            .map(|t| (t.id(), t.entity().duration))
            .collect();
        let total = trials.iter().map(|(_, d)| d).sum();
        let (begin, end) = resolve_range(begin, end, total)?;
        Ok(overlapping(&trials, begin, end))
    }

    /// Trial containers overlapping `[begin, end)` of relevant time, each
    /// cut to the overlapping part
    pub fn get_data(
        &self,
        begin: Option<f64>,
        end: Option<f64>,
        channels: Option<&[String]>,
    ) -> BspResult<Vec<TimeSeriesBuffer>> {
        let mut containers = Vec::new();
        for span in self.trial_spans(begin, end)? {
            let trial = TrialRef::new(self.experiment, span.item);
            let container = trial.data_range(span.begin, span.end, channels)?;
            if container.is_empty() {
                debug!(trial = trial.name(), "Overlap shorter than one sample, skipping");
                continue;
            }
            containers.push(container);
        }
        Ok(containers)
    }

    /// Events starting within `[begin, end)`, with starts expressed in the
    /// recording's relevant time
    pub fn get_events(&self, begin: Option<f64>, end: Option<f64>) -> BspResult<Vec<Event>> {
        let mut events = Vec::new();
        for span in self.trial_spans(begin, end)? {
            let trial = &self.experiment.trials[span.item.0];
            events.extend(
                trial
                    .events
                    .iter()
                    .filter(|e| e.starts_within(span.begin, span.end))
                    .map(|e| e.shifted(span.offset)),
            );
        }
        Ok(events)
    }
}

impl PartialEq for RecordingRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.experiment, other.experiment) && self.id == other.id
    }
}

#[derive(Clone, Copy)]
pub struct TrialRef<'a> {
    experiment: &'a Experiment,
    id: TrialId,
}

impl<'a> TrialRef<'a> {
    pub(crate) fn new(experiment: &'a Experiment, id: TrialId) -> Self {
        Self { experiment, id }
    }

    pub fn id(&self) -> TrialId {
        self.id
    }

    pub fn entity(&self) -> &'a Trial {
        &self.experiment.trials[self.id.0]
    }

    pub fn name(&self) -> &'a str {
        &self.entity().name
    }

    pub fn recording(&self) -> RecordingRef<'a> {
        RecordingRef::new(self.experiment, self.entity().recording)
    }

    /// View on the recording buffer covering this trial, carrying the
    /// trial's events and label. With `channels` the result is a copy.
    pub fn data(&self, channels: Option<&[String]>) -> BspResult<TimeSeriesBuffer> {
        let trial = self.entity();
        let view = self
            .recording()
            .buffer()?
            .view_rows(trial.offset, trial.samples)?
            .with_events(trial.events.clone())
            .with_label(trial.label.clone());
        match channels {
            Some(names) => view.select_columns(names),
            None => Ok(view),
        }
    }

    /// `[begin, end)` seconds of the trial, relative to its start
    ///
    /// A range reaching the trial's end takes every registered sample, so
    /// the whole trial comes back the same as [`TrialRef::data`] even when
    /// `duration * frequency` is fractional.
    pub fn data_range(&self, begin: f64, end: f64, channels: Option<&[String]>) -> BspResult<TimeSeriesBuffer> {
        let trial = self.entity();
        if !(begin >= 0.0) || !(end >= begin) || end > trial.duration + RANGE_TOLERANCE {
            return Err(BspError::out_of_bounds(format!(
                "range [{}, {}) outside trial '{}' of {}s",
                begin, end, trial.name, trial.duration
            )));
        }

        let data = self.data(None)?;
        let last = if end >= trial.duration - RANGE_TOLERANCE {
            trial.samples
        } else {
            data.index_of(end)?.min(trial.samples)
        };
        let first = data.index_of(begin)?.min(last);
        let view = data.view_rows(first, last - first)?;
        match channels {
            Some(names) => view.select_columns(names),
            None => Ok(view),
        }
    }

    /// Write into `[start, stop)` seconds of the trial; the recording sees
    /// the change
    pub fn set_data(&self, start: f64, stop: f64, data: ArrayView2<'_, f32>) -> BspResult<()> {
        self.data(None)?.set(start, stop, data)
    }

    pub fn one_hot(&self, event: &str) -> BspResult<Vec<f32>> {
        self.data(None)?.one_hot(event)
    }
}
