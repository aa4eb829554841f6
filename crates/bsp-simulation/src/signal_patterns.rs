//! Muscle activation envelopes driving the simulator

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Activation level over time, in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum ActivationPattern {
    Constant { level: f32 },
    /// Periodic contraction around a baseline
    Sinusoidal { frequency: f64, amplitude: f32, baseline: f32 },
    /// Linear change from `start` to `end` over `duration` seconds, then hold
    Ramp { start: f32, end: f32, duration: f64 },
    /// On/off contraction cycles
    Burst { on: f64, off: f64, level: f32 },
    /// Exponential decay of an initial level
    Fatigue { initial: f32, decay_rate: f64 },
    /// Sustained contraction with physiological tremor
    Tremor { base: f32, frequency: f64, amplitude: f32 },
}

impl ActivationPattern {
    pub fn activation(&self, time: f64) -> f32 {
        let level = match *self {
            ActivationPattern::Constant { level } => level,
            ActivationPattern::Sinusoidal { frequency, amplitude, baseline } => {
                baseline + amplitude * (2.0 * PI * frequency * time).sin() as f32
            }
            ActivationPattern::Ramp { start, end, duration } => {
                if time >= duration {
                    end
                } else {
                    start + (end - start) * (time / duration) as f32
                }
            }
            ActivationPattern::Burst { on, off, level } => {
                if time.rem_euclid(on + off) < on {
                    level
                } else {
                    0.0
                }
            }
            ActivationPattern::Fatigue { initial, decay_rate } => initial * (-decay_rate * time).exp() as f32,
            ActivationPattern::Tremor { base, frequency, amplitude } => {
                base + amplitude * (2.0 * PI * frequency * time).sin() as f32
            }
        };
        level.clamp(0.0, 1.0)
    }

    /// Named patterns for demos and the command line
    pub fn preset(name: &str) -> Option<Self> {
        let pattern = match name {
            "rest" => ActivationPattern::Constant { level: 0.1 },
            "hold" => ActivationPattern::Tremor { base: 0.4, frequency: 8.0, amplitude: 0.05 },
            "pulse" => ActivationPattern::Sinusoidal { frequency: 0.5, amplitude: 0.4, baseline: 0.4 },
            "warmup" => ActivationPattern::Ramp { start: 0.1, end: 0.7, duration: 10.0 },
            "bursts" => ActivationPattern::Burst { on: 2.0, off: 1.0, level: 0.8 },
            "fatigue" => ActivationPattern::Fatigue { initial: 0.9, decay_rate: 0.1 },
            _ => return None,
        };
        Some(pattern)
    }

    pub fn preset_names() -> &'static [&'static str] {
        &["rest", "hold", "pulse", "warmup", "bursts", "fatigue"]
    }
}

impl Default for ActivationPattern {
    fn default() -> Self {
        ActivationPattern::Tremor { base: 0.4, frequency: 8.0, amplitude: 0.05 }
    }
}
