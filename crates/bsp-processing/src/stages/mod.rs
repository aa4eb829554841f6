//! Transform stages

pub mod collate;
pub mod rectify;
pub mod resample;
pub mod rms;
pub mod window;
pub mod zero_pad;

pub use collate::{collate_2d, collate_3d};
pub use rectify::Rectify;
pub use resample::Resample;
pub use rms::RollingRms;
pub use window::Window;
pub use zero_pad::ZeroPad;
