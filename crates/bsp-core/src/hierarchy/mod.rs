//! Experiment hierarchy
//!
//! experiment → subject / setup / modality / channel → session →
//! recording → trial → event. Entities live in arenas inside
//! [`Experiment`] and point at their parents with ids; [`SessionRef`],
//! [`RecordingRef`] and [`TrialRef`] borrow the experiment to answer
//! per-level data queries.

mod access;
mod entities;
mod experiment;

pub use access::{overlapping, RecordingRef, SessionRef, Span, TrialRef};
pub use entities::{
    Channel, ChannelId, Modality, ModalityId, Recording, RecordingId, RecordingSource, Session,
    SessionId, Setup, SetupId, Subject, SubjectId, Trial, TrialId,
};
pub use experiment::Experiment;
