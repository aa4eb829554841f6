//! Real-time publisher feeding a live stream
//!
//! Generates one chunk per tick, encodes it as a wire frame and pushes it
//! into a crossbeam queue read by a [`ChannelSubscriber`]. Stopping the
//! publisher drops its end of the queue, which the subscriber reports as
//! a closed stream.

use crate::emg_simulator::{EmgSimulator, SimulatorConfig};
use crate::signal_patterns::ActivationPattern;
use bsp_core::{config_error, BspResult};
use bsp_io::{wire, ChannelSubscriber};
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub simulator: SimulatorConfig,
    /// Seconds of signal per frame
    pub chunk_duration: f64,
    /// Frames per second of wall-clock time
    pub update_rate: f64,
    /// Frames the queue holds before new ones are dropped; 0 for unbounded
    pub queue_capacity: usize,
    /// Stop on its own after this many frames
    pub max_chunks: Option<u64>,
    /// Publish from the first tick instead of waiting for `Start`
    pub autostart: bool,
}

impl StreamConfig {
    pub fn validate(&self) -> BspResult<()> {
        self.simulator.validate()?;
        if !(self.chunk_duration > 0.0) {
            return Err(config_error!(
                "chunk duration must be positive, got {}",
                self.chunk_duration
            ));
        }
        if !(self.update_rate > 0.0) {
            return Err(config_error!(
                "update rate must be positive, got {}",
                self.update_rate
            ));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            simulator: SimulatorConfig::default(),
            chunk_duration: 0.1,
            update_rate: 10.0,
            queue_capacity: 50,
            max_chunks: None,
            autostart: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamCommand {
    Start,
    Pause,
    Resume,
    /// Finish the run and close the stream
    Stop,
    SetPattern(ActivationPattern),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub chunks_published: u64,
    /// Frames lost because the queue was full
    pub chunks_dropped: u64,
    /// Seconds of signal generated
    pub signal_duration: f64,
    pub average_generation_us: u64,
}

pub struct StreamPublisher {
    config: StreamConfig,
    simulator: EmgSimulator,
    frames: Sender<Vec<u8>>,
    commands: mpsc::Receiver<StreamCommand>,
    control: mpsc::Sender<StreamCommand>,
}

impl StreamPublisher {
    /// Publisher writing into `frames`
    pub fn new(config: StreamConfig, frames: Sender<Vec<u8>>) -> BspResult<Self> {
        config.validate()?;
        let simulator = EmgSimulator::new(config.simulator.clone())?;
        let (control, commands) = mpsc::channel(32);
        Ok(Self {
            config,
            simulator,
            frames,
            commands,
            control,
        })
    }

    pub fn control_handle(&self) -> mpsc::Sender<StreamCommand> {
        self.control.clone()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Publish until stopped, the chunk limit is hit, the subscriber goes
    /// away or every control handle is dropped
    pub async fn run(mut self) -> BspResult<StreamStats> {
        let mut ticker = interval(Duration::from_secs_f64(1.0 / self.config.update_rate));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Keep only the receiving side so dropped handles end the loop
        drop(self.control);

        let mut running = self.config.autostart;
        let mut stats = StreamStats::default();
        let mut generation_us = 0u128;

        info!(
            rate = self.config.update_rate,
            chunk_ms = self.config.chunk_duration * 1000.0,
            channels = self.config.simulator.channels.len(),
            "EMG stream started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick(), if running => {
                    let started = Instant::now();
                    let timestamp = self.simulator.clock();
                    let chunk = self.simulator.generate(self.config.chunk_duration)?;
                    let frame = wire::encode(&chunk, timestamp)?;
                    let elapsed = started.elapsed();
                    generation_us += elapsed.as_micros();

                    if elapsed.as_secs_f64() > self.config.chunk_duration {
                        warn!(
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Chunk generation slower than real time"
                        );
                    }

                    match self.frames.try_send(frame) {
                        Ok(()) => stats.chunks_published += 1,
                        Err(TrySendError::Full(_)) => {
                            stats.chunks_dropped += 1;
                            warn!(timestamp, "Subscriber queue full, dropping frame");
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            info!("Subscriber went away");
                            break;
                        }
                    }
                    stats.signal_duration = self.simulator.clock();

                    let produced = stats.chunks_published + stats.chunks_dropped;
                    if self.config.max_chunks.is_some_and(|limit| produced >= limit) {
                        debug!(produced, "Chunk limit reached");
                        break;
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(StreamCommand::Start) | Some(StreamCommand::Resume) => running = true,
                        Some(StreamCommand::Pause) => running = false,
                        Some(StreamCommand::SetPattern(pattern)) => {
                            info!(?pattern, "Activation pattern changed");
                            self.simulator.set_pattern(pattern);
                        }
                        Some(StreamCommand::Stop) | None => break,
                    }
                }
            }
        }

        let produced = (stats.chunks_published + stats.chunks_dropped).max(1);
        stats.average_generation_us = (generation_us / produced as u128) as u64;
        info!(
            published = stats.chunks_published,
            dropped = stats.chunks_dropped,
            "EMG stream stopped"
        );
        Ok(stats)
    }
}

/// Handles to a publisher running on the tokio runtime
pub struct StreamHandle {
    pub subscriber: ChannelSubscriber,
    pub control: mpsc::Sender<StreamCommand>,
    pub task: JoinHandle<BspResult<StreamStats>>,
}

/// Spawn a publisher and return the subscriber end of its queue
///
/// Must be called from within a tokio runtime.
pub fn spawn_stream(config: StreamConfig) -> BspResult<StreamHandle> {
    let (frames, subscriber) = bsp_io::channel(config.queue_capacity);
    let publisher = StreamPublisher::new(config, frames)?;
    let control = publisher.control_handle();
    let task = tokio::spawn(publisher.run());
    Ok(StreamHandle {
        subscriber,
        control,
        task,
    })
}
