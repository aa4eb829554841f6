//! BSP-Simulation: EMG signal generation and simulation
//!
//! Synthetic recordings for the hierarchy model, and a real-time publisher
//! that feeds wire frames to a live source.

pub mod emg_simulator;
pub mod real_time_stream;
pub mod signal_patterns;

pub use emg_simulator::{EmgSimulator, NoiseConfig, SimulatorConfig};
pub use real_time_stream::{spawn_stream, StreamCommand, StreamConfig, StreamHandle, StreamPublisher, StreamStats};
pub use signal_patterns::ActivationPattern;
