//! Processing pipeline for chaining stages

use crate::config::{Collation, PipelineConfig, StageConfig};
use crate::source::{DataProvider, DataSource, ExecutionMode};
use crate::stage::{Stage, StageKind};
use crate::stages::{collate_2d, collate_3d, Rectify, Resample, RollingRms, Window, ZeroPad};
use bsp_core::{config_error, BspResult, Selection, TimeSeriesBuffer};
use ndarray::{Array2, Array3};
use tracing::info;

type Upstream<'a> = Box<dyn DataProvider + 'a>;

/// Chain of stages over one source
///
/// The pipeline is itself a [`DataProvider`]: pulling it pulls the last
/// stage, which pulls its upstream, down to the source.
pub struct Pipeline<'a> {
    name: String,
    mode: ExecutionMode,
    tail: Upstream<'a>,
    stages: Vec<StageConfig>,
    collation: Option<Collation>,
}

/// Result of running a pipeline with its terminal collation
#[derive(Debug, Clone)]
pub enum PipelineOutput {
    Containers(Vec<TimeSeriesBuffer>),
    Matrix(Array2<f32>),
    Tensor(Array3<f32>),
}

impl PipelineOutput {
    /// Shape of the result: per-container shapes, or the array dimensions
    pub fn describe(&self) -> String {
        match self {
            PipelineOutput::Containers(containers) => format!(
                "{} containers {:?}",
                containers.len(),
                containers.iter().map(TimeSeriesBuffer::shape).collect::<Vec<_>>()
            ),
            PipelineOutput::Matrix(matrix) => format!("matrix {:?}", matrix.dim()),
            PipelineOutput::Tensor(tensor) => format!("tensor {:?}", tensor.dim()),
        }
    }
}

impl<'a> Pipeline<'a> {
    pub fn builder(name: &str, source: impl DataProvider + 'a) -> PipelineBuilder<'a> {
        PipelineBuilder::new(name, source)
    }

    /// Build a pipeline from its description
    pub fn from_config(config: &PipelineConfig, source: impl DataProvider + 'a) -> BspResult<Self> {
        if source.is_unbounded() {
            config.validate_unbounded()?;
        } else {
            config.validate()?;
        }

        let mut builder = PipelineBuilder::new(&config.name, source).mode(config.mode);
        for stage in &config.stages {
            builder = builder.stage(stage)?;
        }
        if let Some(collation) = config.collate {
            builder = builder.collate(collation);
        }
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(StageConfig::name).collect()
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(StageConfig::kind).collect()
    }

    pub fn collation(&self) -> Option<Collation> {
        self.collation
    }

    /// Export pipeline configuration
    pub fn export_config(&self) -> PipelineConfig {
        PipelineConfig {
            name: self.name.clone(),
            mode: self.mode,
            stages: self.stages.clone(),
            collate: self.collation,
        }
    }

    /// Concatenate everything the pipeline yields into one matrix
    pub fn collate_2d(&self, selection: &Selection) -> BspResult<Array2<f32>> {
        self.ensure_bounded("collate")?;
        collate_2d(self.get_data(selection)?)
    }

    /// Stack everything the pipeline yields into one tensor
    pub fn collate_3d(&self, selection: &Selection) -> BspResult<Array3<f32>> {
        self.ensure_bounded("collate")?;
        collate_3d(self.get_data(selection)?)
    }

    /// Pull once and apply the configured collation, if any
    pub fn run(&self, selection: &Selection) -> BspResult<PipelineOutput> {
        let output = match self.collation {
            None => PipelineOutput::Containers(self.get_data(selection)?.materialize()?),
            Some(Collation::TwoD) => PipelineOutput::Matrix(self.collate_2d(selection)?),
            Some(Collation::ThreeD) => PipelineOutput::Tensor(self.collate_3d(selection)?),
        };
        info!(pipeline = %self.name, output = %output.describe(), "Pipeline run finished");
        Ok(output)
    }

    fn ensure_bounded(&self, operation: &str) -> BspResult<()> {
        if self.tail.is_unbounded() {
            return Err(config_error!(
                "Pipeline '{}' cannot {} an unbounded source",
                self.name, operation
            ));
        }
        Ok(())
    }
}

impl DataProvider for Pipeline<'_> {
    fn get_data(&self, selection: &Selection) -> BspResult<DataSource<'_>> {
        self.tail.get_data(selection)
    }

    fn is_unbounded(&self) -> bool {
        self.tail.is_unbounded()
    }
}

/// Pipeline builder for constructing stage chains
pub struct PipelineBuilder<'a> {
    name: String,
    mode: ExecutionMode,
    tail: Upstream<'a>,
    stages: Vec<StageConfig>,
    collation: Option<Collation>,
}

impl<'a> PipelineBuilder<'a> {
    /// Create new pipeline builder
    pub fn new(name: &str, source: impl DataProvider + 'a) -> Self {
        Self {
            name: name.to_string(),
            mode: ExecutionMode::Streaming,
            tail: Box::new(source),
            stages: Vec::new(),
            collation: None,
        }
    }

    /// Mode used by stages added after this call
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    fn push<S, F>(mut self, build: F) -> BspResult<Self>
    where
        S: Stage + 'a,
        F: FnOnce(Upstream<'a>, ExecutionMode) -> BspResult<S>,
    {
        let placeholder: Upstream<'a> = Box::new(crate::source::MemorySource::eager(Vec::new()));
        let upstream = std::mem::replace(&mut self.tail, placeholder);
        let stage = build(upstream, self.mode)?;
        self.stages.push(stage.config());
        self.tail = Box::new(stage);
        Ok(self)
    }

    pub fn resample(self, target_frequency: u32) -> BspResult<Self> {
        self.push(|up, mode| Resample::new(up, target_frequency, mode))
    }

    pub fn window(self, window_size: f64, stride: Option<f64>) -> BspResult<Self> {
        self.push(|up, mode| Window::new(up, window_size, stride, mode))
    }

    pub fn rolling_rms(self, window_size: f64) -> BspResult<Self> {
        self.push(|up, mode| RollingRms::new(up, window_size, mode))
    }

    pub fn rectify(self) -> BspResult<Self> {
        self.push(|up, mode| Ok(Rectify::new(up, mode)))
    }

    pub fn zero_pad(self, align_front: bool) -> BspResult<Self> {
        self.push(|up, _| ZeroPad::new(up, align_front))
    }

    /// Add a stage from its description
    pub fn stage(self, config: &StageConfig) -> BspResult<Self> {
        match *config {
            StageConfig::Resample { target_frequency } => self.resample(target_frequency),
            StageConfig::Window { window_size, stride } => self.window(window_size, stride),
            StageConfig::RollingRms { window_size } => self.rolling_rms(window_size),
            StageConfig::Rectify => self.rectify(),
            StageConfig::ZeroPad { align_front } => self.zero_pad(align_front),
        }
    }

    /// Terminal collation used by [`Pipeline::run`]
    pub fn collate(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Build the pipeline
    pub fn build(self) -> BspResult<Pipeline<'a>> {
        if self.collation.is_some() && self.tail.is_unbounded() {
            return Err(config_error!(
                "Pipeline '{}' collates but its source is unbounded",
                self.name
            ));
        }
        info!(
            pipeline = %self.name,
            stages = ?self.stages.iter().map(StageConfig::name).collect::<Vec<_>>(),
            mode = ?self.mode,
            "Built pipeline"
        );
        Ok(Pipeline {
            name: self.name,
            mode: self.mode,
            tail: self.tail,
            stages: self.stages,
            collation: self.collation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use bsp_core::{BspError, Experiment};

    /// Source that pretends to never end
    struct Endless;

    impl DataProvider for Endless {
        fn get_data(&self, _selection: &Selection) -> BspResult<DataSource<'_>> {
            let container = TimeSeriesBuffer::zeros(10, 1, 10.0, None)?;
            Ok(DataSource::lazy(std::iter::repeat_with(move || Ok(container.clone()))))
        }

        fn is_unbounded(&self) -> bool {
            true
        }
    }

    fn experiment() -> Experiment {
        let mut experiment = Experiment::new("pipeline");
        let subject = experiment.put_subject("p01").unwrap();
        let setup = experiment.put_setup("arm").unwrap();
        let emg = experiment.put_modality(setup, "emg", 20.0).unwrap();
        experiment.put_channels(emg, &["c0", "c1", "c2"]).unwrap();
        let session = experiment.put_session("s1", setup, subject).unwrap();
        let values = (0..80 * 3).map(|i| (i % 7) as f32 - 3.0).collect();
        let buffer = TimeSeriesBuffer::from_vec(values, 3, 20.0, None).unwrap();
        let recording = experiment.put_recording(session, "r1", emg, buffer).unwrap();
        experiment.put_trials_every(recording, 2.0, Some("rest".into())).unwrap();
        experiment
    }

    #[test]
    fn test_builder_chain_over_experiment() {
        let experiment = experiment();
        let pipeline = Pipeline::builder("envelope", &experiment)
            .resample(10)
            .unwrap()
            .rectify()
            .unwrap()
            .window(0.5, Some(0.5))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(pipeline.stage_names(), vec!["resample", "rectify", "window"]);

        let data = pipeline.get_data(&Selection::modality("emg")).unwrap();
        assert!(data.is_lazy());
        let windows = data.materialize().unwrap();
        // Two trials of 2s, 4 windows each
        assert_eq!(windows.len(), 8);
        assert!(windows.iter().all(|w| w.shape() == (5, 3) && w.label() == Some("rest")));
        assert!(windows.iter().all(|w| w.to_vec().iter().all(|v| *v >= 0.0)));
    }

    #[test]
    fn test_selection_reaches_source() {
        let experiment = experiment();
        let pipeline = Pipeline::builder("channels", &experiment).rectify().unwrap().build().unwrap();
        let selection = Selection::modality("emg").channels(["c2"]).with("gain", serde_json::json!(3));
        let out = pipeline.get_data(&selection).unwrap().materialize().unwrap();
        assert_eq!(out[0].channels(), 1);

        let missing = pipeline.get_data(&Selection::modality("eeg"));
        assert!(matches!(missing, Err(BspError::NotFound { .. })));
    }

    #[test]
    fn test_from_config_and_export() {
        let experiment = experiment();
        let config = PipelineConfig::new("windows")
            .with_mode(ExecutionMode::Batch)
            .with_stage(StageConfig::Window { window_size: 0.5, stride: None })
            .with_collation(Collation::ThreeD);
        let pipeline = Pipeline::from_config(&config, &experiment).unwrap();
        assert_eq!(pipeline.export_config(), config);

        match pipeline.run(&Selection::modality("emg")).unwrap() {
            PipelineOutput::Tensor(tensor) => assert_eq!(tensor.dim(), (2 * 31, 10, 3)),
            other => panic!("unexpected output {}", other.describe()),
        }
    }

    #[test]
    fn test_collate_2d_after_zero_pad() {
        let source = MemorySource::streaming(vec![
            TimeSeriesBuffer::zeros(3, 2, 10.0, None).unwrap(),
            TimeSeriesBuffer::zeros(5, 2, 10.0, None).unwrap(),
        ]);
        let pipeline = Pipeline::builder("padded", source).zero_pad(true).unwrap().build().unwrap();
        assert_eq!(pipeline.stage_kinds(), vec![StageKind::Materialize]);
        assert_eq!(pipeline.collate_2d(&Selection::default()).unwrap().dim(), (10, 2));
    }

    #[test]
    fn test_unbounded_source_guards() {
        assert!(Pipeline::builder("live", Endless).zero_pad(false).is_err());
        assert!(Pipeline::builder("live", Endless).collate(Collation::TwoD).build().is_err());

        let pipeline = Pipeline::builder("live", Endless).rectify().unwrap().build().unwrap();
        assert!(pipeline.is_unbounded());
        assert!(pipeline.collate_3d(&Selection::default()).is_err());

        // Streaming stages pull only what is asked for
        let first: Vec<_> = pipeline
            .get_data(&Selection::default())
            .unwrap()
            .into_iter()
            .take(3)
            .collect::<BspResult<_>>()
            .unwrap();
        assert_eq!(first.len(), 3);

        let config = PipelineConfig::new("live").with_stage(StageConfig::ZeroPad { align_front: false });
        assert!(Pipeline::from_config(&config, Endless).is_err());
    }
}
