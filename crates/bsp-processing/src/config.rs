//! Configuration management for processing pipelines
//!
//! Pipelines can be described in JSON and rebuilt with
//! [`Pipeline::from_config`](crate::Pipeline::from_config).

use crate::source::ExecutionMode;
use crate::stage::StageKind;
use bsp_core::{config_error, BspError, BspResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One transform in a pipeline description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageConfig {
    Resample {
        target_frequency: u32,
    },
    Window {
        window_size: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stride: Option<f64>,
    },
    RollingRms {
        window_size: f64,
    },
    Rectify,
    ZeroPad {
        #[serde(default)]
        align_front: bool,
    },
}

impl StageConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StageConfig::Resample { .. } => "resample",
            StageConfig::Window { .. } => "window",
            StageConfig::RollingRms { .. } => "rolling_rms",
            StageConfig::Rectify => "rectify",
            StageConfig::ZeroPad { .. } => "zero_pad",
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            StageConfig::Window { .. } => StageKind::Expand,
            StageConfig::ZeroPad { .. } => StageKind::Materialize,
            _ => StageKind::Map,
        }
    }

    /// Validate the stage parameters
    pub fn validate(&self) -> BspResult<()> {
        match *self {
            StageConfig::Resample { target_frequency } if target_frequency == 0 => {
                Err(BspError::config("Resample target frequency must be greater than 0"))
            }
            StageConfig::Window { window_size, stride } => {
                positive("Window size", window_size)?;
                match stride {
                    Some(stride) => positive("Window stride", stride),
                    None => Ok(()),
                }
            }
            StageConfig::RollingRms { window_size } => positive("RMS window size", window_size),
            _ => Ok(()),
        }
    }
}

fn positive(what: &str, value: f64) -> BspResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(config_error!("{} must be positive, got {}", what, value))
    }
}

/// Terminal reduction applied after the last stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collation {
    /// Vertical concatenation into `(Σ samples, channels)`
    TwoD,
    /// Stack into `(containers, samples, channels)`
    ThreeD,
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,
    /// Mode for every stage that does not force materialisation
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Stages in execution order
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    /// Optional terminal collation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collate: Option<Collation>,
}

impl PipelineConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: ExecutionMode::Streaming,
            stages: Vec::new(),
            collate: None,
        }
    }

    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collate = Some(collation);
        self
    }

    /// Preset used for EMG envelopes: rectify, smooth, then cut windows
    pub fn emg_envelope(target_frequency: u32, window_size: f64) -> Self {
        Self::new("EMG envelope")
            .with_stage(StageConfig::Resample { target_frequency })
            .with_stage(StageConfig::Rectify)
            .with_stage(StageConfig::RollingRms { window_size: 0.05 })
            .with_stage(StageConfig::Window {
                window_size,
                stride: Some(window_size / 2.0),
            })
    }

    /// True if any part of the pipeline needs every container up front
    pub fn materializes(&self) -> bool {
        self.collate.is_some() || self.stages.iter().any(|s| s.kind().materializes())
    }

    /// Validate configuration
    pub fn validate(&self) -> BspResult<()> {
        if self.name.trim().is_empty() {
            return Err(BspError::config("Pipeline name cannot be empty"));
        }
        for (position, stage) in self.stages.iter().enumerate() {
            stage.validate().map_err(|e| {
                config_error!("stage {} ({}): {}", position, stage.name(), e)
            })?;
        }
        Ok(())
    }

    /// Validate for use behind a source that never ends
    pub fn validate_unbounded(&self) -> BspResult<()> {
        self.validate()?;
        if self.materializes() {
            return Err(config_error!(
                "Pipeline '{}' materialises its input and cannot run on an unbounded source",
                self.name
            ));
        }
        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> BspResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| config_error!("Failed to serialize configuration: {}", e))
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> BspResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| config_error!("Failed to deserialize configuration: {}", e))
    }

    pub fn from_file(path: &Path) -> BspResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
