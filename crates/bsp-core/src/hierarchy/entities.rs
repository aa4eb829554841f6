//! Entities of the experiment tree
//!
//! Every entity lives in an arena owned by [`Experiment`](super::Experiment)
//! and refers to its parent through a copyable id. Parents list their
//! children in insertion order.

use crate::config_error;
use crate::error::{BspError, BspResult};
use crate::event::Event;
use crate::loader::MatrixLoader;
use crate::time_series::TimeSeriesBuffer;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::info;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Position in the owning arena
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

arena_id!(SubjectId);
arena_id!(SetupId);
arena_id!(ModalityId);
arena_id!(ChannelId);
arena_id!(SessionId);
arena_id!(RecordingId);
arena_id!(TrialId);

#[derive(Debug, Clone)]
pub struct Subject {
    pub(crate) name: String,
}

impl Subject {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A recording rig: an ordered set of modalities
#[derive(Debug, Clone)]
pub struct Setup {
    pub(crate) name: String,
    pub(crate) modalities: Vec<ModalityId>,
    pub(crate) modality_index: HashMap<String, ModalityId>,
    /// Running total of channels over all modalities
    pub(crate) num_features: usize,
}

impl Setup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modalities(&self) -> &[ModalityId] {
        &self.modalities
    }

    pub fn modality_id(&self, name: &str) -> Option<ModalityId> {
        self.modality_index.get(name).copied()
    }

    pub fn has_modality(&self, name: &str) -> bool {
        self.modality_index.contains_key(name)
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }
}

/// Channels sharing one sampling frequency
#[derive(Debug, Clone)]
pub struct Modality {
    pub(crate) name: String,
    pub(crate) setup: SetupId,
    pub(crate) frequency: f64,
    pub(crate) channels: Vec<ChannelId>,
    pub(crate) channel_names: Vec<String>,
    pub(crate) recordings: usize,
}

impl Modality {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setup(&self) -> SetupId {
        self.setup
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// Channel names in column order
    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Column position of a channel in this modality's data
    pub fn column_of(&self, channel: &str) -> Option<usize> {
        self.channel_names.iter().position(|c| c == channel)
    }
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub(crate) name: String,
    pub(crate) modality: ModalityId,
}

impl Channel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modality(&self) -> ModalityId {
        self.modality
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) name: String,
    pub(crate) setup: SetupId,
    pub(crate) subject: SubjectId,
    pub(crate) recordings: Vec<RecordingId>,
    pub(crate) recording_index: HashMap<String, RecordingId>,
}

impl Session {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setup(&self) -> SetupId {
        self.setup
    }

    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    pub fn recordings(&self) -> &[RecordingId] {
        &self.recordings
    }
}

/// Where a recording's samples come from
#[derive(Clone)]
pub enum RecordingSource {
    /// Matrix handed over at registration
    Memory,
    /// File read through `loader` on first access
    File {
        path: PathBuf,
        loader: Arc<dyn MatrixLoader>,
    },
}

impl fmt::Debug for RecordingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingSource::Memory => write!(f, "Memory"),
            RecordingSource::File { path, .. } => write!(f, "File({})", path.display()),
        }
    }
}

#[derive(Debug)]
pub struct Recording {
    pub(crate) name: String,
    pub(crate) session: SessionId,
    pub(crate) modality: ModalityId,
    pub(crate) source: RecordingSource,
    pub(crate) buffer: OnceLock<TimeSeriesBuffer>,
    pub(crate) trials: Vec<TrialId>,
    pub(crate) trial_index: HashMap<String, TrialId>,
}

impl Recording {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn modality(&self) -> ModalityId {
        self.modality
    }

    pub fn trials(&self) -> &[TrialId] {
        &self.trials
    }

    pub fn source(&self) -> &RecordingSource {
        &self.source
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.get().is_some()
    }

    /// Full backing buffer, loading it from file on first use
    pub(crate) fn buffer(&self, modality: &Modality) -> BspResult<&TimeSeriesBuffer> {
        if let Some(buffer) = self.buffer.get() {
            return Ok(buffer);
        }

        let loaded = match &self.source {
            RecordingSource::File { path, loader } => {
                let matrix = loader.load(path)?;
                let buffer = TimeSeriesBuffer::from_array(matrix, modality.frequency, None)?;
                info!(
                    recording = %self.name,
                    path = %path.display(),
                    samples = buffer.samples(),
                    "Loaded recording from file"
                );
                conform(buffer, modality)?
            }
            RecordingSource::Memory => {
                return Err(BspError::Empty {
                    reason: format!("recording '{}' has no data", self.name),
                });
            }
        };

        Ok(self.buffer.get_or_init(|| loaded))
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            RecordingSource::File { path, .. } => Some(path),
            RecordingSource::Memory => None,
        }
    }
}

/// Check a buffer against its modality and label its columns with the
/// modality's channel names
pub(crate) fn conform(buffer: TimeSeriesBuffer, modality: &Modality) -> BspResult<TimeSeriesBuffer> {
    if (buffer.frequency() - modality.frequency).abs() > 1e-9 {
        return Err(config_error!(
            "buffer sampled at {}Hz but modality '{}' runs at {}Hz",
            buffer.frequency(),
            modality.name,
            modality.frequency
        ));
    }
    if buffer.channels() != modality.num_channels() {
        return Err(BspError::Shape {
            expected: format!("{} channels for modality '{}'", modality.num_channels(), modality.name),
            actual: format!("{} channels", buffer.channels()),
        });
    }
    buffer.with_columns(modality.channel_names.clone())
}

/// A labelled stretch of a recording
///
/// A trial holds no samples of its own: `offset` and `samples` locate it
/// inside the recording's buffer.
#[derive(Debug, Clone)]
pub struct Trial {
    pub(crate) name: String,
    pub(crate) recording: RecordingId,
    pub(crate) start: f64,
    pub(crate) duration: f64,
    pub(crate) offset: usize,
    pub(crate) samples: usize,
    pub(crate) label: Option<String>,
    pub(crate) events: Vec<Event>,
}

impl Trial {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recording(&self) -> RecordingId {
        self.recording
    }

    /// Offset from the start of the recording, in seconds
    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// First row of the trial inside the recording buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}
