//! BSP-IO: Getting data into the framework
//!
//! File loaders for the hierarchy model, and the live-stream side: a
//! binary frame codec, the subscriber strategy and [`LiveSource`], which
//! turns a subscriber into an unbounded pipeline source.

pub mod ingest;
pub mod live;
pub mod loader;
pub mod subscriber;
pub mod wire;

pub use ingest::{experiment_from_file, ingest_file};
pub use live::LiveSource;
pub use loader::{DelimitedLoader, LoaderRegistry, NpyLoader};
pub use subscriber::{channel, ChannelSubscriber, Subscriber};
pub use wire::{decode, decode_frame, encode, FrameHeader, HEADER_LEN};
