//! Named, time-stamped annotations attached to trials and containers

use serde::{Deserialize, Serialize};

/// A labelled point or interval inside a trial
///
/// `start` is always relative to whatever owns the event: the trial when
/// stored in the hierarchy, the container when carried through a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub start: f64,
    pub duration: Option<f64>,
}

impl Event {
    pub fn new(name: impl Into<String>, start: f64, duration: Option<f64>) -> Self {
        Self {
            name: name.into(),
            start,
            duration,
        }
    }

    /// Instantaneous event with no duration
    pub fn point(name: impl Into<String>, start: f64) -> Self {
        Self::new(name, start, None)
    }

    /// End of the event interval; equal to `start` for point events
    pub fn end(&self) -> f64 {
        self.start + self.duration.unwrap_or(0.0)
    }

    /// Half-open containment test on the event start: `begin <= start < end`
    pub fn starts_within(&self, begin: f64, end: f64) -> bool {
        self.start >= begin && self.start < end
    }

    /// Copy of this event with its start moved by `delta` seconds
    pub fn shifted(&self, delta: f64) -> Self {
        Self {
            name: self.name.clone(),
            start: self.start + delta,
            duration: self.duration,
        }
    }
}
