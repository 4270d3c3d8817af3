//! Repository layer: owner-scoped CRUD over the runtime entities.
//!
//! Every write, list or count goes through an owner filter. The one
//! deliberate exception is `StateSnapshotRepository`, whose reads back the
//! unscoped thread state/history endpoints.

pub mod assistant_repo;
pub mod cron_repo;
pub mod run_repo;
pub mod state_repo;
pub mod thread_repo;

pub use assistant_repo::{AssistantPatch, AssistantRepository};
pub use cron_repo::CronRepository;
pub use run_repo::RunRepository;
pub use state_repo::StateSnapshotRepository;
pub use thread_repo::{ThreadPatch, ThreadRepository};

/// Conflict policy on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IfExists {
    /// 409 when a resource with the same id exists.
    #[default]
    Raise,
    /// Return the existing resource unchanged.
    DoNothing,
}
