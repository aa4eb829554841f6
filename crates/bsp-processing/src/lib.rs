//! BSP-Processing: Transform pipeline for biosignal containers
//!
//! Stages pull containers from an upstream [`DataProvider`] (an
//! experiment, a live stream or another stage) and run either streaming or
//! batch.

pub mod config;
pub mod pipeline;
pub mod source;
pub mod stage;
pub mod stages;

pub use config::{Collation, PipelineConfig, StageConfig};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineOutput};
pub use source::{ContainerIter, DataProvider, DataSource, ExecutionMode, MemorySource};
pub use stage::{Stage, StageKind};
pub use stages::{collate_2d, collate_3d, Rectify, Resample, RollingRms, Window, ZeroPad};
