//! Basic usage examples for BSP-Framework
//!
//! Builds a small experiment, registers trials and events, and reads data
//! back at the experiment, session, recording and trial level.

use bsp_core::{error::BspResult, Event, Experiment, Selection, TimeSeriesBuffer};

fn main() -> BspResult<()> {
    println!("=== BSP-Framework Basic Usage Examples ===\n");

    let experiment = build_experiment()?;

    // Example 1: Experiment-wide retrieval
    experiment_example(&experiment)?;

    // Example 2: Relevant-time ranges and events
    range_example(&experiment)?;

    // Example 3: Trial views write through to the recording
    aliasing_example(&experiment)?;

    println!("=== All examples completed successfully! ===");
    Ok(())
}

/// Two 2 kHz EMG channels, one session, a 3 s recording split in 1 s trials
fn build_experiment() -> BspResult<Experiment> {
    let mut experiment = Experiment::new("grip-study");
    let subject = experiment.put_subject("p01")?;
    let setup = experiment.put_setup("forearm")?;
    let emg = experiment.put_modality(setup, "emg", 2000.0)?;
    experiment.put_channels(emg, &["flexor", "extensor"])?;
    let session = experiment.put_session("day1", setup, subject)?;

    // Simulate muscle activation with a little high-frequency content
    let values: Vec<f32> = (0..6000)
        .flat_map(|i| {
            let t = i as f32 / 2000.0;
            [0.5 * (20.0 * t).sin() + 0.1 * (200.0 * t).sin(), 0.3 * (15.0 * t).cos()]
        })
        .collect();
    let buffer = TimeSeriesBuffer::from_vec(values, 2, 2000.0, None)?;
    let recording = experiment.put_recording(session, "run1", emg, buffer)?;

    let trials = experiment.put_trials_every(recording, 1.0, Some("grip".to_string()))?;
    experiment.put_event(trials[1], Event::new("onset", 0.25, Some(0.5)))?;
    Ok(experiment)
}

fn experiment_example(experiment: &Experiment) -> BspResult<()> {
    println!("1. Experiment retrieval");
    for container in experiment.get_data("emg", None, None)? {
        let stats = container.channel_stats(0)?;
        println!(
            "   {:?} samples×channels, label {:?}, flexor rms {:.3}",
            container.shape(),
            container.label(),
            stats.rms
        );
    }
    println!();
    Ok(())
}

fn range_example(experiment: &Experiment) -> BspResult<()> {
    println!("2. Relevant-time range [0.5s, 2.0s)");
    let selection = Selection::modality("emg").channels(["flexor"]).between(0.5, 2.0);
    for container in experiment.select(&selection)? {
        println!("   {:?} with {} event(s)", container.shape(), container.events().len());
    }

    let session = experiment.session("day1")?;
    for event in session.get_events("emg", Some(0.5), Some(2.0))? {
        println!("   event '{}' at {:.2}s of relevant time", event.name, event.start);
    }
    println!();
    Ok(())
}

fn aliasing_example(experiment: &Experiment) -> BspResult<()> {
    println!("3. Trial aliasing");
    let recording = experiment.session("day1")?.recording("run1")?;
    let trial = recording.trial("run1-1")?;

    let silence = ndarray::Array2::<f32>::zeros((200, 2));
    trial.set_data(0.0, 0.1, silence.view())?;

    let buffer = recording.buffer()?;
    println!("   recording row 2000 after trial write: {:?}", buffer.row(2000));
    println!("   onset one-hot covers {} samples", trial.one_hot("onset")?.iter().filter(|v| **v > 0.0).count());
    println!();
    Ok(())
}
