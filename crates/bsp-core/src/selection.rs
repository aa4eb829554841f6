//! Selection parameters passed from a consumer down a pipeline
//!
//! Stages never interpret a selection; they hand it upstream unchanged
//! until it reaches the hierarchy model. Keys nobody understands end up in
//! `extra` and travel along untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    /// Start of the requested range of relevant time, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<f64>,
    /// End (exclusive) of the requested range of relevant time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Selection {
    /// Selection of every trial of one modality
    pub fn modality(name: impl Into<String>) -> Self {
        Self {
            modality: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn sessions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sessions = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn channels<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn between(mut self, begin: f64, end: f64) -> Self {
        self.begin = Some(begin);
        self.end = Some(end);
        self
    }

    /// Attach an arbitrary key for some stage further upstream
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
