//! Core stage trait and types

use crate::config::StageConfig;
use crate::source::{DataProvider, ExecutionMode};
use serde::{Deserialize, Serialize};

/// Cardinality contract of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// One container in, one container out
    Map,
    /// One container in, zero or more out
    Expand,
    /// Needs every upstream container before producing anything
    Materialize,
}

impl StageKind {
    pub fn materializes(self) -> bool {
        matches!(self, StageKind::Materialize)
    }
}

/// A transform wrapping exactly one upstream provider
///
/// A stage only uses its construction-time configuration; the selection
/// handed to `get_data` is forwarded upstream verbatim.
pub trait Stage: DataProvider {
    /// Configuration that would rebuild this stage
    fn config(&self) -> StageConfig;

    /// Execution mode fixed at construction
    fn mode(&self) -> ExecutionMode;

    fn name(&self) -> &'static str {
        self.config().name()
    }

    fn kind(&self) -> StageKind {
        self.config().kind()
    }
}
