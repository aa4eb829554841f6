//! BSP command line front end
//!
//! ```bash
//! # Run a pipeline over a recording file
//! bsp run grip.csv --frequency 1000 --trial-duration 2 --config envelope.json
//!
//! # Print a preset pipeline to start a config from
//! bsp config --target 500 --window 0.2 > envelope.json
//!
//! # Push simulated live EMG through a streaming pipeline
//! bsp stream --containers 20 --pattern bursts
//! ```

use anyhow::{bail, Context, Result};
use bsp_core::{default_columns, Selection, TimeSeriesBuffer};
use bsp_io::{experiment_from_file, LiveSource, LoaderRegistry};
use bsp_processing::{Collation, DataProvider, Pipeline, PipelineConfig};
use bsp_simulation::{spawn_stream, ActivationPattern, SimulatorConfig, StreamCommand, StreamConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bsp")]
#[command(version, about = "Biosignal processing pipelines over recordings and live streams")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a recording file and run a pipeline over its trials
    Run {
        /// Recording file (csv, tsv, txt or npy)
        input: PathBuf,

        /// Sampling frequency of the file in Hz
        #[arg(short, long)]
        frequency: f64,

        #[arg(short, long, default_value = "emg")]
        modality: String,

        /// Split the recording into trials of this many seconds
        #[arg(short, long)]
        trial_duration: Option<f64>,

        /// Pipeline configuration (JSON); defaults to the EMG envelope preset
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Channels to keep, comma separated
        #[arg(long, value_delimiter = ',')]
        channels: Option<Vec<String>>,

        /// Start of the range of relevant time, in seconds
        #[arg(long, requires = "end")]
        begin: Option<f64>,

        #[arg(long, requires = "begin")]
        end: Option<f64>,
    },

    /// Print a preset pipeline configuration as JSON
    Config {
        #[arg(long, default_value = "1000")]
        target: u32,

        /// Window length in seconds
        #[arg(long, default_value_t = FILE_WINDOW)]
        window: f64,

        /// Terminal collation: 2d or 3d
        #[arg(long)]
        collate: Option<String>,
    },

    /// Feed simulated live EMG through a streaming pipeline
    Stream {
        /// Containers to pull from the pipeline before stopping
        #[arg(short = 'n', long, default_value = "10")]
        containers: usize,

        /// Pipeline configuration (JSON); defaults to the EMG envelope preset
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "1000")]
        sampling_rate: u32,

        #[arg(long, default_value = "2")]
        channels: usize,

        /// Activation preset (rest, hold, pulse, warmup, bursts, fatigue)
        #[arg(long, default_value = "hold")]
        pattern: String,

        /// Seconds of signal per frame
        #[arg(long, default_value = "0.5")]
        chunk: f64,

        /// Frames per second
        #[arg(long, default_value = "2")]
        rate: f64,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    match cli.command {
        Commands::Run {
            input,
            frequency,
            modality,
            trial_duration,
            config,
            channels,
            begin,
            end,
        } => {
            let pipeline = load_config(config.as_ref(), frequency.round() as u32, FILE_WINDOW)?;
            let mut selection = Selection::modality(&modality);
            if let Some(channels) = channels {
                selection = selection.channels(channels);
            }
            if let (Some(begin), Some(end)) = (begin, end) {
                selection = selection.between(begin, end);
            }
            run_file(&input, frequency, &modality, trial_duration, &pipeline, &selection)
        }
        Commands::Config { target, window, collate } => {
            let mut config = PipelineConfig::emg_envelope(target, window);
            if let Some(collate) = collate {
                config = config.with_collation(parse_collation(&collate)?);
            }
            config.validate()?;
            println!("{}", config.to_json()?);
            Ok(())
        }
        Commands::Stream {
            containers,
            config,
            sampling_rate,
            channels,
            pattern,
            chunk,
            rate,
            seed,
        } => {
            let pipeline = load_config(config.as_ref(), sampling_rate, STREAM_WINDOW)?;
            let pattern = ActivationPattern::preset(&pattern).with_context(|| {
                format!(
                    "unknown pattern '{}', expected one of {:?}",
                    pattern,
                    ActivationPattern::preset_names()
                )
            })?;
            let stream = StreamConfig {
                simulator: SimulatorConfig {
                    sampling_rate,
                    channels: default_columns(channels),
                    pattern,
                    seed,
                    ..Default::default()
                },
                chunk_duration: chunk,
                update_rate: rate,
                ..Default::default()
            };
            run_stream(stream, pipeline, containers)
        }
    }
}

/// Window lengths of the default envelope pipeline, in seconds
const FILE_WINDOW: f64 = 0.2;
const STREAM_WINDOW: f64 = 0.1;

fn load_config(path: Option<&PathBuf>, frequency: u32, window: f64) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("reading pipeline configuration {}", path.display())),
        None => Ok(PipelineConfig::emg_envelope(frequency, window)),
    }
}

fn parse_collation(value: &str) -> Result<Collation> {
    match value.to_lowercase().as_str() {
        "2d" | "two_d" => Ok(Collation::TwoD),
        "3d" | "three_d" => Ok(Collation::ThreeD),
        other => bail!("unknown collation '{}', expected 2d or 3d", other),
    }
}

fn run_file(
    input: &Path,
    frequency: f64,
    modality: &str,
    trial_duration: Option<f64>,
    config: &PipelineConfig,
    selection: &Selection,
) -> Result<()> {
    let registry = LoaderRegistry::with_defaults();
    let experiment = experiment_from_file(&registry, input, modality, frequency, trial_duration)
        .with_context(|| format!("loading {}", input.display()))?;

    let pipeline = Pipeline::from_config(config, &experiment)?;
    info!(
        pipeline = pipeline.name(),
        stages = ?pipeline.stage_names(),
        "Running pipeline over file"
    );
    let output = pipeline.run(selection)?;
    println!("{}: {}", pipeline.name(), output.describe());
    Ok(())
}

fn run_stream(stream: StreamConfig, config: PipelineConfig, containers: usize) -> Result<()> {
    let columns = stream.simulator.channels.clone();
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;

    runtime.block_on(async move {
        let handle = spawn_stream(stream)?;
        let subscriber = handle.subscriber;

        // Pulling blocks on the frame queue, so keep it off the runtime workers
        let pulled = tokio::task::spawn_blocking(move || -> Result<usize> {
            let source = LiveSource::new(subscriber).with_columns(columns);
            let pipeline = Pipeline::from_config(&config, &source)?;
            let mut pulled = 0;
            for container in pipeline.get_data(&Selection::default())?.into_iter().take(containers) {
                let container = container?;
                println!("{:>4}  {}", pulled, summarize(&container));
                pulled += 1;
            }
            Ok(pulled)
        })
        .await??;

        // The publisher may already be gone if the queue closed
        let _ = handle.control.send(StreamCommand::Stop).await;
        let stats = handle.task.await??;
        println!(
            "pulled {} containers from {} published frames ({} dropped)",
            pulled, stats.chunks_published, stats.chunks_dropped
        );
        Ok::<(), anyhow::Error>(())
    })
}

fn summarize(container: &TimeSeriesBuffer) -> String {
    let rms: Vec<String> = (0..container.channels())
        .filter_map(|channel| container.channel_stats(channel).ok())
        .map(|stats| format!("{:.3}", stats.rms))
        .collect();
    format!(
        "{} samples x {} channels @ {}Hz  rms [{}]",
        container.samples(),
        container.channels(),
        container.frequency(),
        rms.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::try_parse_from([
            "bsp", "run", "grip.csv", "--frequency", "1000", "--channels", "ch0,ch1", "--begin", "0", "--end", "1",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { channels, begin, end, .. } => {
                assert_eq!(channels, Some(vec!["ch0".to_string(), "ch1".to_string()]));
                assert_eq!((begin, end), (Some(0.0), Some(1.0)));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_begin_requires_end() {
        assert!(Cli::try_parse_from(["bsp", "run", "grip.csv", "--frequency", "1000", "--begin", "0"]).is_err());
    }

    #[test]
    fn test_parse_collation() {
        assert_eq!(parse_collation("3D").unwrap(), Collation::ThreeD);
        assert_eq!(parse_collation("2d").unwrap(), Collation::TwoD);
        assert!(parse_collation("4d").is_err());
    }

    #[test]
    fn test_default_config_is_streamable() {
        let config = load_config(None, 500, STREAM_WINDOW).unwrap();
        assert!(config.validate_unbounded().is_ok());
    }
}
