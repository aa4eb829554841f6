//! Synthetic surface EMG
//!
//! Each channel is a sum of motor-unit firing harmonics scaled by the
//! activation pattern, plus recruitment jitter, Gaussian noise, baseline
//! wander, occasional motion artefacts and optional powerline hum.

use crate::signal_patterns::ActivationPattern;
use bsp_core::{
    config_error, default_columns, BspError, BspResult, Experiment, ModalityId, RecordingId, SessionId,
    TimeSeriesBuffer,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Output range of the simulated electrodes, in mV
const CLAMP_MV: f32 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Standard deviation of additive Gaussian noise (0 disables it)
    pub gaussian_std: f32,
    pub baseline_wander: f32,
    /// Chance per sample of a motion artefact
    pub motion_artifact_prob: f32,
    pub motion_artifact_amp: f32,
}

impl NoiseConfig {
    pub fn silent() -> Self {
        Self {
            gaussian_std: 0.0,
            baseline_wander: 0.0,
            motion_artifact_prob: 0.0,
            motion_artifact_amp: 0.0,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            gaussian_std: 0.05,
            baseline_wander: 0.02,
            motion_artifact_prob: 0.01,
            motion_artifact_amp: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Samples per second; integral so frames can carry it
    pub sampling_rate: u32,
    /// Channel names, one column each
    pub channels: Vec<String>,
    pub pattern: ActivationPattern,
    pub noise: NoiseConfig,
    /// Mains frequency to mix in (50 or 60 Hz)
    pub powerline_frequency: Option<f64>,
    /// Seed for reproducible output
    pub seed: Option<u64>,
}

impl SimulatorConfig {
    pub fn validate(&self) -> BspResult<()> {
        if self.sampling_rate == 0 {
            return Err(BspError::config("sampling rate must be positive"));
        }
        if self.channels.is_empty() {
            return Err(BspError::config("simulator needs at least one channel"));
        }
        if !(self.noise.gaussian_std >= 0.0) {
            return Err(config_error!(
                "noise standard deviation must be non-negative, got {}",
                self.noise.gaussian_std
            ));
        }
        Ok(())
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 1000,
            channels: default_columns(2),
            pattern: ActivationPattern::default(),
            noise: NoiseConfig::default(),
            powerline_frequency: Some(50.0),
            seed: None,
        }
    }
}

pub struct EmgSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    noise: Normal<f32>,
    /// Time of the next sample to generate
    clock: f64,
}

impl EmgSimulator {
    pub fn new(config: SimulatorConfig) -> BspResult<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let noise = normal(config.noise.gaussian_std)?;
        Ok(Self {
            config,
            rng,
            noise,
            clock: 0.0,
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Seconds generated since creation or the last reset
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn reset(&mut self) {
        self.clock = 0.0;
    }

    pub fn set_pattern(&mut self, pattern: ActivationPattern) {
        self.config.pattern = pattern;
    }

    /// Swap the configuration; the clock keeps running
    pub fn update_config(&mut self, config: SimulatorConfig) -> BspResult<()> {
        config.validate()?;
        self.noise = normal(config.noise.gaussian_std)?;
        self.config = config;
        Ok(())
    }

    /// Generate the next `duration` seconds, continuing where the previous
    /// call stopped
    pub fn generate(&mut self, duration: f64) -> BspResult<TimeSeriesBuffer> {
        let frequency = self.config.sampling_rate as f64;
        let samples = (duration * frequency + 1e-6).floor() as usize;
        let channels = self.config.channels.len();

        let mut values = Vec::with_capacity(samples * channels);
        for i in 0..samples {
            let time = self.clock + i as f64 / frequency;
            let activation = self.config.pattern.activation(time);
            for channel in 0..channels {
                let value = self.muscle(time, channel, activation) + self.interference(time);
                values.push(value.clamp(-CLAMP_MV, CLAMP_MV));
            }
        }
        self.clock += samples as f64 / frequency;

        debug!(samples, channels, clock = self.clock, "Generated EMG chunk");
        TimeSeriesBuffer::from_vec(values, channels, frequency, Some(self.config.channels.clone()))
    }

    /// Generate `duration` seconds and register them as a recording
    pub fn record(
        &mut self,
        experiment: &mut Experiment,
        session: SessionId,
        name: &str,
        modality: ModalityId,
        duration: f64,
    ) -> BspResult<RecordingId> {
        let buffer = self.generate(duration)?;
        experiment.put_recording(session, name, modality, buffer)
    }

    fn muscle(&mut self, time: f64, channel: usize, activation: f32) -> f32 {
        // Neighbouring electrodes pick up slightly different firing rates
        let firing = 80.0 + channel as f64 * 10.0;
        let amplitude = activation * 2.0;
        let harmonics = (2.0 * PI * firing * time).sin()
            + 0.3 * (4.0 * PI * firing * time).sin()
            + 0.1 * (6.0 * PI * firing * time).sin();
        amplitude * harmonics as f32 + activation * self.rng.gen_range(-0.2..0.2)
    }

    fn interference(&mut self, time: f64) -> f32 {
        let noise = &self.config.noise;
        let mut value = self.noise.sample(&mut self.rng);
        value += noise.baseline_wander * (2.0 * PI * 0.1 * time).sin() as f32;
        if noise.motion_artifact_prob > 0.0 && self.rng.gen::<f32>() < noise.motion_artifact_prob {
            value += noise.motion_artifact_amp * self.rng.gen_range(-1.0..1.0);
        }
        if let Some(mains) = self.config.powerline_frequency {
            value += 0.05 * (2.0 * PI * mains * time).sin() as f32;
        }
        value
    }
}

fn normal(std_dev: f32) -> BspResult<Normal<f32>> {
    Normal::new(0.0, std_dev).map_err(|e| config_error!("noise distribution: {}", e))
}
