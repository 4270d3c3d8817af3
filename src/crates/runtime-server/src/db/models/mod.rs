//! Database row models.
//!
//! All timestamps are RFC3339 strings and JSON attributes are stored as TEXT
//! columns; the `*_value()` helpers parse them leniently (malformed JSON
//! degrades to an empty object rather than failing a read).

pub mod assistant;
pub mod cron;
pub mod run;
pub mod state_snapshot;
pub mod thread;

pub use assistant::Assistant;
pub use cron::Cron;
pub use run::Run;
pub use state_snapshot::StateSnapshotRow;
pub use thread::Thread;

/// Parse a JSON TEXT column, defaulting to `{}` on error.
pub(crate) fn parse_json_object(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
}
