pub mod config;
pub mod decode;
pub mod error;
pub mod types;

pub use config::{CheckpointBackend, Config, CounterMode, FileConfig, SyncConfig, WriteUnit};
pub use error::SyncError;
pub use types::*;
