//! Registering recordings straight from files

use crate::loader::LoaderRegistry;
use bsp_core::{
    config_error, default_columns, BspResult, Experiment, ModalityId, RecordingId, SessionId, TrialId,
};
use std::path::Path;
use tracing::info;

/// Register `path` as a file-backed recording of `session`, named after the
/// file stem, and cut it into trials
///
/// With `trial_duration` the recording is split into back-to-back trials of
/// that length; without it a single trial covers the whole file.
pub fn ingest_file(
    experiment: &mut Experiment,
    registry: &LoaderRegistry,
    session: SessionId,
    modality: ModalityId,
    path: &Path,
    trial_duration: Option<f64>,
    label: Option<String>,
) -> BspResult<(RecordingId, Vec<TrialId>)> {
    let loader = registry.loader_for(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| config_error!("cannot name a recording after {}", path.display()))?;

    let recording = experiment.put_file_recording(session, name, modality, path, loader)?;
    let trials = match trial_duration {
        Some(duration) => experiment.put_trials_every(recording, duration, label)?,
        None => {
            let total = experiment.recording_ref(recording)?.buffer()?.duration();
            vec![experiment.put_trial(recording, &format!("{}-0", name), 0.0, total, label)?]
        }
    };

    info!(
        experiment_id = %experiment.id(),
        recording = name,
        path = %path.display(),
        trials = trials.len(),
        "Ingested file"
    );
    Ok((recording, trials))
}

/// Single-subject experiment around one file
///
/// The file is loaded once to learn its channel count; channels get the
/// default `ch0..chN` names.
pub fn experiment_from_file(
    registry: &LoaderRegistry,
    path: &Path,
    modality: &str,
    frequency: f64,
    trial_duration: Option<f64>,
) -> BspResult<Experiment> {
    let channels = registry.load(path)?.ncols();

    let mut experiment = Experiment::new(path.display().to_string());
    let subject = experiment.put_subject("subject")?;
    let setup = experiment.put_setup("setup")?;
    let modality = experiment.put_modality(setup, modality, frequency)?;
    experiment.put_channels(modality, &default_columns(channels))?;
    let session = experiment.put_session("session", setup, subject)?;
    ingest_file(&mut experiment, registry, session, modality, path, trial_duration, None)?;
    Ok(experiment)
}
