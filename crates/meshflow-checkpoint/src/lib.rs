//! Durable step-completion log for workflow runs.
//!
//! A checkpoint is appended after every step attempt that reaches a terminal
//! status and is never mutated afterwards. On restart, the workflow engine
//! asks the store for the latest checkpoint of a workflow id and resumes from
//! there.

pub mod checkpoint;
pub mod config;
pub mod store;

pub use checkpoint::{CheckpointStatus, ExecutionCheckpoint};
pub use config::{CheckpointBackend, CheckpointConfig};
pub use store::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
