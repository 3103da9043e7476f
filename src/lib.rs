//! Instrument time-series store.
//!
//! Ingests multi-channel instrument recordings into a columnar store and
//! serves windowed, optionally downsampled, views of single channels.

pub mod addressing;
pub mod auth;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod downsample;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod loader;
pub mod response;
pub mod storage;
pub mod window;

// Re-export commonly used types
pub use addressing::{Position, Positions, SampleArray, TimeTrack};
pub use catalog::{Catalog, Channel, Dataset, TimeRange};
pub use downsample::Method;
pub use error::{Error, Result};
pub use ingest::{IngestReport, Ingestor};
pub use storage::{DuckDbBackend, StorageBackend};
pub use window::{WindowEngine, WindowRequest, WindowResult};
