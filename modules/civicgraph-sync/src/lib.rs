pub mod checkpoint;
pub mod deadline;
pub mod extractor;
pub mod mapper;
pub mod orchestrator;
pub mod source;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, PgCheckpointStore};
pub use extractor::{Extractor, KeyedRow};
pub use mapper::{map_row, mapper_for, MapperRole, RowMapper};
pub use orchestrator::{SyncOrchestrator, SyncPhase, SyncReport, TableReport};
pub use source::{BatchRequest, PgRowSource, Position, RowSource};
