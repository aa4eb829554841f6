//! End-to-end behaviour of pipelines pulled from an experiment

use bsp_core::{BspError, Event, Experiment, Selection, TimeSeriesBuffer};
use bsp_processing::{
    Collation, DataProvider, ExecutionMode, MemorySource, Pipeline, PipelineConfig, PipelineOutput,
    StageConfig,
};
use proptest::prelude::*;

/// Two sessions of one 20 Hz, 3-channel modality. Session `s1` holds trials
/// of 2 s, session `s2` trials of 1 s.
fn experiment() -> Experiment {
    let mut experiment = Experiment::new("integration");
    let subject = experiment.put_subject("p01").unwrap();
    let setup = experiment.put_setup("arm").unwrap();
    let emg = experiment.put_modality(setup, "emg", 20.0).unwrap();
    experiment.put_channels(emg, &["c0", "c1", "c2"]).unwrap();

    for (session, samples, trial) in [("s1", 80, 2.0), ("s2", 40, 1.0)] {
        let id = experiment.put_session(session, setup, subject).unwrap();
        let values = (0..samples * 3).map(|i| (i as f32 * 0.5).sin()).collect();
        let buffer = TimeSeriesBuffer::from_vec(values, 3, 20.0, None).unwrap();
        let recording = experiment.put_recording(id, "r", emg, buffer).unwrap();
        let trials = experiment.put_trials_every(recording, trial, Some(session.to_string())).unwrap();
        experiment.put_event(trials[0], Event::new("grip", 0.25, Some(0.5))).unwrap();
    }
    experiment
}

#[test]
fn ten_to_three_hz_fails_on_pull() {
    let source = MemorySource::eager(vec![TimeSeriesBuffer::zeros(10, 1, 10.0, None).unwrap()]);
    let pipeline = Pipeline::builder("bad ratio", source).resample(3).unwrap().build().unwrap();
    let result = pipeline.get_data(&Selection::default()).unwrap().materialize();
    assert!(matches!(result, Err(BspError::FrequencyRatio { .. })));
}

#[test]
fn rolling_rms_first_value() {
    let values = (0..10).map(|i| i as f32).collect();
    let source = MemorySource::eager(vec![TimeSeriesBuffer::from_vec(values, 1, 10.0, None).unwrap()]);
    let pipeline = Pipeline::builder("rms", source).rolling_rms(0.5).unwrap().build().unwrap();
    let out = pipeline.get_data(&Selection::default()).unwrap().materialize().unwrap();
    approx::assert_relative_eq!(out[0].value(0, 0).unwrap(), 6.0f32.sqrt(), epsilon = 1e-6);
}

#[test]
fn streaming_and_batch_agree() {
    let experiment = experiment();
    let selection = Selection::modality("emg");
    let run = |mode| {
        let pipeline = Pipeline::builder("envelope", &experiment)
            .mode(mode)
            .rectify()
            .unwrap()
            .rolling_rms(0.25)
            .unwrap()
            .window(0.5, Some(0.25))
            .unwrap()
            .build()
            .unwrap();
        let data = pipeline.get_data(&selection).unwrap();
        assert_eq!(data.is_lazy(), mode == ExecutionMode::Streaming);
        data.materialize().unwrap()
    };

    let streamed = run(ExecutionMode::Streaming);
    let batched = run(ExecutionMode::Batch);
    assert_eq!(streamed.len(), batched.len());
    for (a, b) in streamed.iter().zip(&batched) {
        assert_eq!(a.to_vec(), b.to_vec());
        assert_eq!(a.label(), b.label());
    }
}

#[test]
fn zero_pad_then_collate_3d_over_sessions() {
    let experiment = experiment();
    let config = PipelineConfig::new("padded")
        .with_stage(StageConfig::ZeroPad { align_front: false })
        .with_collation(Collation::ThreeD);
    let pipeline = Pipeline::from_config(&config, &experiment).unwrap();

    match pipeline.run(&Selection::modality("emg")).unwrap() {
        // Two 40-sample trials from s1, two 20-sample trials padded to 40 from s2
        PipelineOutput::Tensor(tensor) => {
            assert_eq!(tensor.dim(), (4, 40, 3));
            assert_eq!(tensor[[3, 39, 0]], 0.0);
        }
        other => panic!("unexpected output {}", other.describe()),
    }

    let unpadded = Pipeline::builder("raw", &experiment).build().unwrap();
    let result = unpadded.collate_3d(&Selection::modality("emg"));
    assert!(matches!(result, Err(BspError::ShapeMismatch { index: 2, .. })));
    assert_eq!(unpadded.collate_2d(&Selection::modality("emg")).unwrap().dim(), (120, 3));
}

#[test]
fn windows_carry_labels_and_events() {
    let experiment = experiment();
    let pipeline = Pipeline::builder("windows", &experiment).window(0.5, Some(0.5)).unwrap().build().unwrap();
    let windows = pipeline
        .get_data(&Selection::modality("emg").sessions(["s1"]))
        .unwrap()
        .materialize()
        .unwrap();
    assert_eq!(windows.len(), 8);
    assert!(windows.iter().all(|w| w.label() == Some("s1")));
    assert_eq!(windows[0].events().len(), 1);
    assert_eq!(windows[0].one_hot("grip").unwrap().iter().sum::<f32>(), 5.0);
    assert!(windows[1].events().is_empty());
}

#[test]
fn range_selection_flows_through_stages() {
    let experiment = experiment();
    let pipeline = Pipeline::builder("range", &experiment).resample(10).unwrap().build().unwrap();
    let out = pipeline
        .get_data(&Selection::modality("emg").between(0.5, 1.5))
        .unwrap()
        .materialize()
        .unwrap();
    // s1: [0.5, 1.5) of its first 2 s trial. s2: the second half of its
    // first 1 s trial and the first half of its second one
    assert_eq!(out.iter().map(|c| c.samples()).collect::<Vec<_>>(), vec![10, 5, 5]);

    // s2 has only 2 s of relevant time
    let result = pipeline.get_data(&Selection::modality("emg").between(1.0, 2.5));
    assert!(matches!(result, Err(BspError::OutOfBounds { .. })));
}

proptest! {
    #[test]
    fn down_then_up_restores_sample_count(blocks in 1usize..50, factor in 1u32..8, channels in 1usize..4) {
        let target = 10u32;
        let frequency = (target * factor) as f64;
        let container = TimeSeriesBuffer::zeros(blocks * factor as usize, channels, frequency, None).unwrap();
        let source = MemorySource::eager(vec![container]);
        let pipeline = Pipeline::builder("round trip", source)
            .resample(target)
            .unwrap()
            .resample(target * factor)
            .unwrap()
            .build()
            .unwrap();
        let out = pipeline.get_data(&Selection::default()).unwrap().materialize().unwrap();
        prop_assert_eq!(out[0].shape(), (blocks * factor as usize, channels));
    }
}
