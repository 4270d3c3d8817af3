//! Checkpoint persistence for agent graph execution.
//!
//! A checkpoint is a snapshot of a conversation's graph state, keyed by the
//! compound identity `(thread_id, checkpoint_ns, checkpoint_id)`. One
//! conversation thread may hold several independent checkpoint namespaces,
//! one per assistant that has participated; the saver never interprets the
//! namespace beyond using it as part of the key.
//!
//! Two backends are provided:
//!
//! - [`InMemoryCheckpointSaver`] for tests and dev mode
//! - [`SqliteCheckpointSaver`] for durable storage, opened as a dedicated
//!   per-request connection (a shared pool serialized through a lock would
//!   stall concurrent run streams)

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSource, CheckpointTuple,
    StateSnapshot,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use sqlite::SqliteCheckpointSaver;
pub use traits::{CheckpointSaver, HISTORY_LIMIT_MAX};
