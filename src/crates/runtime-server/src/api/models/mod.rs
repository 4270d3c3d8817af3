//! Wire-format request and response models.

pub mod assistants;
pub mod crons;
pub mod runs;
pub mod store;
pub mod threads;

pub use assistants::{AssistantCreate, AssistantPatchRequest, AssistantSearchRequest, AssistantView};
pub use crons::{CronCreate, CronSearchRequest, CronView};
pub use runs::{RunCreate, RunView};
pub use store::{StoreDeleteQuery, StoreGetQuery, StorePutRequest, StoreSearchRequest};
pub use threads::{HistoryRequest, ThreadCreate, ThreadPatchRequest, ThreadSearchRequest, ThreadView};

/// `true` when every key/value pair of `filter` appears in `target`
/// (subset match, used by metadata and values filters).
pub fn json_subset_matches(filter: &serde_json::Value, target: &serde_json::Value) -> bool {
    match filter.as_object() {
        Some(expected) => expected
            .iter()
            .all(|(key, value)| target.get(key) == Some(value)),
        None => true,
    }
}
