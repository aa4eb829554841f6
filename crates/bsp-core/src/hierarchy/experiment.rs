//! Experiment: root of the append-only registry tree

use super::access::{RecordingRef, SessionRef, TrialRef};
use super::entities::*;
use crate::config_error;
use crate::error::{BspError, BspResult};
use crate::event::Event;
use crate::loader::MatrixLoader;
use crate::selection::Selection;
use crate::time_series::{time_to_index, validate_frequency, TimeSeriesBuffer};
use ndarray::ArrayView2;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Knowledge base of subjects, setups and sessions
///
/// Built once by a single writer; afterwards only read. Registration
/// (`put_*`) fails on duplicate identifiers and nothing is ever removed.
#[derive(Debug)]
pub struct Experiment {
    id: Uuid,
    name: String,
    pub(crate) subjects: Vec<Subject>,
    subject_index: HashMap<String, SubjectId>,
    pub(crate) setups: Vec<Setup>,
    setup_index: HashMap<String, SetupId>,
    pub(crate) modalities: Vec<Modality>,
    pub(crate) channels: Vec<Channel>,
    /// Arena order doubles as session insertion order
    pub(crate) sessions: Vec<Session>,
    session_index: HashMap<String, SessionId>,
    pub(crate) recordings: Vec<Recording>,
    pub(crate) trials: Vec<Trial>,
}

impl Experiment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            subjects: Vec::new(),
            subject_index: HashMap::new(),
            setups: Vec::new(),
            setup_index: HashMap::new(),
            modalities: Vec::new(),
            channels: Vec::new(),
            sessions: Vec::new(),
            session_index: HashMap::new(),
            recordings: Vec::new(),
            trials: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn put_subject(&mut self, name: &str) -> BspResult<SubjectId> {
        if self.subject_index.contains_key(name) {
            return Err(BspError::duplicate("subject", name));
        }
        let id = SubjectId(self.subjects.len());
        self.subjects.push(Subject { name: name.to_string() });
        self.subject_index.insert(name.to_string(), id);
        debug!(subject = name, "Registered subject");
        Ok(id)
    }

    pub fn put_setup(&mut self, name: &str) -> BspResult<SetupId> {
        if self.setup_index.contains_key(name) {
            return Err(BspError::duplicate("setup", name));
        }
        let id = SetupId(self.setups.len());
        self.setups.push(Setup {
            name: name.to_string(),
            modalities: Vec::new(),
            modality_index: HashMap::new(),
            num_features: 0,
        });
        self.setup_index.insert(name.to_string(), id);
        debug!(setup = name, "Registered setup");
        Ok(id)
    }

    pub fn put_modality(&mut self, setup: SetupId, name: &str, frequency: f64) -> BspResult<ModalityId> {
        validate_frequency(frequency)?;
        let id = ModalityId(self.modalities.len());
        let owner = self.setup_mut(setup)?;
        if owner.modality_index.contains_key(name) {
            return Err(BspError::duplicate("modality", name));
        }

        owner.modalities.push(id);
        owner.modality_index.insert(name.to_string(), id);
        self.modalities.push(Modality {
            name: name.to_string(),
            setup,
            frequency,
            channels: Vec::new(),
            channel_names: Vec::new(),
            recordings: 0,
        });
        debug!(modality = name, frequency, "Registered modality");
        Ok(id)
    }

    /// Add a channel; its column position is its order of registration
    pub fn put_channel(&mut self, modality: ModalityId, name: &str) -> BspResult<ChannelId> {
        let id = ChannelId(self.channels.len());
        let owner = self
            .modalities
            .get_mut(modality.0)
            .ok_or_else(|| BspError::not_found("modality", format!("#{}", modality.0)))?;

        if owner.channel_names.iter().any(|c| c == name) {
            return Err(BspError::duplicate("channel", name));
        }
        if owner.recordings > 0 {
            return Err(config_error!(
                "modality '{}' already has recordings; its channel layout is fixed",
                owner.name
            ));
        }

        owner.channels.push(id);
        owner.channel_names.push(name.to_string());
        let setup = owner.setup;
        self.channels.push(Channel {
            name: name.to_string(),
            modality,
        });
        self.setups[setup.0].num_features += 1;
        Ok(id)
    }

    pub fn put_channels<S: AsRef<str>>(&mut self, modality: ModalityId, names: &[S]) -> BspResult<Vec<ChannelId>> {
        names
            .iter()
            .map(|name| self.put_channel(modality, name.as_ref()))
            .collect()
    }

    pub fn put_session(&mut self, name: &str, setup: SetupId, subject: SubjectId) -> BspResult<SessionId> {
        if self.session_index.contains_key(name) {
            return Err(BspError::duplicate("session", name));
        }
        self.setup_ref(setup)?;
        if subject.0 >= self.subjects.len() {
            return Err(BspError::not_found("subject", format!("#{}", subject.0)));
        }

        let id = SessionId(self.sessions.len());
        self.sessions.push(Session {
            name: name.to_string(),
            setup,
            subject,
            recordings: Vec::new(),
            recording_index: HashMap::new(),
        });
        self.session_index.insert(name.to_string(), id);
        debug!(session = name, "Registered session");
        Ok(id)
    }

    /// Register a recording backed by an in-memory buffer
    pub fn put_recording(
        &mut self,
        session: SessionId,
        name: &str,
        modality: ModalityId,
        buffer: TimeSeriesBuffer,
    ) -> BspResult<RecordingId> {
        self.check_recording(session, name, modality)?;
        let buffer = conform(buffer, &self.modalities[modality.0])?;
        Ok(self.insert_recording(session, name, modality, RecordingSource::Memory, OnceLock::from(buffer)))
    }

    /// Register a recording that is read from `path` on first access
    pub fn put_file_recording(
        &mut self,
        session: SessionId,
        name: &str,
        modality: ModalityId,
        path: impl Into<PathBuf>,
        loader: Arc<dyn MatrixLoader>,
    ) -> BspResult<RecordingId> {
        self.check_recording(session, name, modality)?;
        let source = RecordingSource::File {
            path: path.into(),
            loader,
        };
        Ok(self.insert_recording(session, name, modality, source, OnceLock::new()))
    }

    fn check_recording(&self, session: SessionId, name: &str, modality: ModalityId) -> BspResult<()> {
        let owner = self
            .sessions
            .get(session.0)
            .ok_or_else(|| BspError::not_found("session", format!("#{}", session.0)))?;
        if owner.recording_index.contains_key(name) {
            return Err(BspError::duplicate("recording", name));
        }
        let modality = self
            .modalities
            .get(modality.0)
            .ok_or_else(|| BspError::not_found("modality", format!("#{}", modality.0)))?;
        if modality.setup != owner.setup {
            return Err(BspError::not_found(
                "modality",
                format!("{} in setup '{}'", modality.name, self.setups[owner.setup.0].name),
            ));
        }
        Ok(())
    }

    fn insert_recording(
        &mut self,
        session: SessionId,
        name: &str,
        modality: ModalityId,
        source: RecordingSource,
        buffer: OnceLock<TimeSeriesBuffer>,
    ) -> RecordingId {
        let id = RecordingId(self.recordings.len());
        self.recordings.push(Recording {
            name: name.to_string(),
            session,
            modality,
            source,
            buffer,
            trials: Vec::new(),
            trial_index: HashMap::new(),
        });
        let owner = &mut self.sessions[session.0];
        owner.recordings.push(id);
        owner.recording_index.insert(name.to_string(), id);
        self.modalities[modality.0].recordings += 1;
        debug!(recording = name, "Registered recording");
        id
    }

    /// Register a trial covering `[start, start + duration)` seconds of a
    /// recording
    pub fn put_trial(
        &mut self,
        recording: RecordingId,
        name: &str,
        start: f64,
        duration: f64,
        label: Option<String>,
    ) -> BspResult<TrialId> {
        let owner = self
            .recordings
            .get(recording.0)
            .ok_or_else(|| BspError::not_found("recording", format!("#{}", recording.0)))?;
        if owner.trial_index.contains_key(name) {
            return Err(BspError::duplicate("trial", name));
        }
        if !(start >= 0.0 && start.is_finite()) || !(duration > 0.0 && duration.is_finite()) {
            return Err(BspError::out_of_bounds(format!(
                "trial '{}' needs start >= 0 and duration > 0, got start {} duration {}",
                name, start, duration
            )));
        }

        let modality = &self.modalities[owner.modality.0];
        let available = owner.buffer(modality)?.samples();
        let offset = time_to_index(start, modality.frequency);
        let samples = (duration * modality.frequency).round() as usize;
        if offset + samples > available {
            return Err(BspError::out_of_bounds(format!(
                "trial '{}' spans samples [{}, {}) but recording '{}' has {}",
                name,
                offset,
                offset + samples,
                owner.name,
                available
            )));
        }

        let id = TrialId(self.trials.len());
        self.trials.push(Trial {
            name: name.to_string(),
            recording,
            start,
            duration,
            offset,
            samples,
            label,
            events: Vec::new(),
        });
        let owner = &mut self.recordings[recording.0];
        owner.trials.push(id);
        owner.trial_index.insert(name.to_string(), id);
        Ok(id)
    }

    /// Split a recording into back-to-back trials of `trial_duration`
    /// seconds; a trailing remainder shorter than that is left out
    pub fn put_trials_every(
        &mut self,
        recording: RecordingId,
        trial_duration: f64,
        label: Option<String>,
    ) -> BspResult<Vec<TrialId>> {
        if !(trial_duration > 0.0) {
            return Err(config_error!(
                "trial duration must be positive, got {}",
                trial_duration
            ));
        }
        let total = self.recording_ref(recording)?.buffer()?.duration();
        let count = (total / trial_duration + 1e-9).floor() as usize;
        let prefix = self.recordings[recording.0].name.clone();

        (0..count)
            .map(|i| {
                self.put_trial(
                    recording,
                    &format!("{}-{}", prefix, i),
                    i as f64 * trial_duration,
                    trial_duration,
                    label.clone(),
                )
            })
            .collect()
    }

    /// Attach an event to an existing trial; `event.start` is relative to
    /// the trial start and must fall inside `[0, duration)`
    pub fn put_event(&mut self, trial: TrialId, event: Event) -> BspResult<()> {
        let owner = self
            .trials
            .get_mut(trial.0)
            .ok_or_else(|| BspError::not_found("trial", format!("#{}", trial.0)))?;
        if !event.starts_within(0.0, owner.duration) {
            return Err(BspError::out_of_bounds(format!(
                "event '{}' at {}s outside trial '{}' of {}s",
                event.name, event.start, owner.name, owner.duration
            )));
        }
        owner.events.push(event);
        Ok(())
    }

    /// Append rows to a recording's backing buffer. Existing trials keep
    /// their offsets and stay valid.
    pub fn extend_recording(&mut self, recording: RecordingId, data: ArrayView2<'_, f32>) -> BspResult<()> {
        let owner = self
            .recordings
            .get_mut(recording.0)
            .ok_or_else(|| BspError::not_found("recording", format!("#{}", recording.0)))?;
        let name = owner.name.clone();
        let buffer = owner.buffer.get_mut().ok_or_else(|| BspError::Empty {
            reason: format!("recording '{}' is not loaded", name),
        })?;
        buffer.append(data)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn subject(&self, name: &str) -> BspResult<SubjectId> {
        self.subject_index
            .get(name)
            .copied()
            .ok_or_else(|| BspError::not_found("subject", name))
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn setup(&self, name: &str) -> BspResult<SetupId> {
        self.setup_index
            .get(name)
            .copied()
            .ok_or_else(|| BspError::not_found("setup", name))
    }

    pub fn setup_ref(&self, id: SetupId) -> BspResult<&Setup> {
        self.setups
            .get(id.0)
            .ok_or_else(|| BspError::not_found("setup", format!("#{}", id.0)))
    }

    fn setup_mut(&mut self, id: SetupId) -> BspResult<&mut Setup> {
        self.setups
            .get_mut(id.0)
            .ok_or_else(|| BspError::not_found("setup", format!("#{}", id.0)))
    }

    /// Modality by name within a setup
    pub fn modality(&self, setup: SetupId, name: &str) -> BspResult<&Modality> {
        let id = self
            .setup_ref(setup)?
            .modality_id(name)
            .ok_or_else(|| BspError::not_found("modality", name))?;
        Ok(&self.modalities[id.0])
    }

    pub fn modality_ref(&self, id: ModalityId) -> BspResult<&Modality> {
        self.modalities
            .get(id.0)
            .ok_or_else(|| BspError::not_found("modality", format!("#{}", id.0)))
    }

    pub fn channel_ref(&self, id: ChannelId) -> BspResult<&Channel> {
        self.channels
            .get(id.0)
            .ok_or_else(|| BspError::not_found("channel", format!("#{}", id.0)))
    }

    pub fn session(&self, name: &str) -> BspResult<SessionRef<'_>> {
        let id = self
            .session_index
            .get(name)
            .copied()
            .ok_or_else(|| BspError::not_found("session", name))?;
        Ok(SessionRef::new(self, id))
    }

    pub fn session_ref(&self, id: SessionId) -> BspResult<SessionRef<'_>> {
        if id.0 >= self.sessions.len() {
            return Err(BspError::not_found("session", format!("#{}", id.0)));
        }
        Ok(SessionRef::new(self, id))
    }

    /// All sessions in insertion order
    pub fn sessions(&self) -> impl Iterator<Item = SessionRef<'_>> + '_ {
        (0..self.sessions.len()).map(move |i| SessionRef::new(self, SessionId(i)))
    }

    pub fn recording_ref(&self, id: RecordingId) -> BspResult<RecordingRef<'_>> {
        if id.0 >= self.recordings.len() {
            return Err(BspError::not_found("recording", format!("#{}", id.0)));
        }
        Ok(RecordingRef::new(self, id))
    }

    pub fn trial_ref(&self, id: TrialId) -> BspResult<TrialRef<'_>> {
        if id.0 >= self.trials.len() {
            return Err(BspError::not_found("trial", format!("#{}", id.0)));
        }
        Ok(TrialRef::new(self, id))
    }

    fn knows_modality(&self, name: &str) -> bool {
        self.setups.iter().any(|s| s.has_modality(name))
    }

    // ------------------------------------------------------------------
    // Data retrieval
    // ------------------------------------------------------------------

    /// Trial containers of one modality across sessions
    ///
    /// Sessions are visited in insertion order, or in the order given by
    /// `sessions`. Sessions whose setup lacks the modality are skipped.
    pub fn get_data(
        &self,
        modality: &str,
        sessions: Option<&[String]>,
        channels: Option<&[String]>,
    ) -> BspResult<Vec<TimeSeriesBuffer>> {
        self.collect(modality, sessions, |session| session.get_data(modality, channels))
    }

    /// Resolve a full [`Selection`], including a `[begin, end)` range of
    /// relevant time applied within each session
    pub fn select(&self, selection: &Selection) -> BspResult<Vec<TimeSeriesBuffer>> {
        let modality = selection
            .modality
            .as_deref()
            .ok_or_else(|| BspError::config("selection does not name a modality"))?;
        let channels = selection.channels.as_deref();

        if selection.begin.is_none() && selection.end.is_none() {
            return self.get_data(modality, selection.sessions.as_deref(), channels);
        }
        self.collect(modality, selection.sessions.as_deref(), |session| {
            session.get_data_between(modality, selection.begin, selection.end, channels)
        })
    }

    fn collect<F>(&self, modality: &str, sessions: Option<&[String]>, mut per_session: F) -> BspResult<Vec<TimeSeriesBuffer>>
    where
        F: FnMut(&SessionRef<'_>) -> BspResult<Vec<TimeSeriesBuffer>>,
    {
        if !self.knows_modality(modality) {
            return Err(BspError::not_found("modality", modality));
        }

        let visited: Vec<SessionRef<'_>> = match sessions {
            Some(names) => names
                .iter()
                .map(|name| self.session(name))
                .collect::<BspResult<_>>()?,
            None => self.sessions().collect(),
        };

        let mut containers = Vec::new();
        for session in &visited {
            if !session.setup().has_modality(modality) {
                debug!(session = session.name(), modality, "Session setup lacks modality, skipping");
                continue;
            }
            containers.extend(per_session(session)?);
        }

        info!(
            experiment = %self.name,
            experiment_id = %self.id,
            modality,
            sessions = visited.len(),
            containers = containers.len(),
            "Resolved experiment data"
        );
        Ok(containers)
    }
}
