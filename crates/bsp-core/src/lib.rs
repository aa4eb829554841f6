//! BSP-Core: Foundation types for biosignal processing
//!
//! Time-indexed multi-channel containers and the experiment hierarchy
//! that owns them. Processing stages live in `bsp-processing`; file and
//! live-stream adapters in `bsp-io`.

pub mod error;
pub mod event;
pub mod hierarchy;
pub mod loader;
pub mod selection;
pub mod time_series;

pub use error::{BspError, BspResult};
pub use event::Event;
pub use hierarchy::*;
pub use loader::MatrixLoader;
pub use selection::Selection;
pub use time_series::{default_columns, time_to_index, ChannelStats, TimeSeriesBuffer, INDEX_EPSILON};
