//! In-process cron scheduler.
//!
//! One timer task per cron. On fire, a run is submitted through the same
//! lifecycle engine the HTTP handlers use, authenticated as the cron's
//! owner. Afterwards the cron either reschedules or deletes itself,
//! depending on `on_run_completed` and `end_time`.

use crate::db::models::cron::on_run_completed;
use crate::db::models::run::MultitaskStrategy;
use crate::db::models::{Cron, Thread};
use crate::db::repositories::{CronRepository, IfExists, ThreadRepository};
use crate::db::DatabaseConnection;
use crate::execution::{RunLifecycle, RunSubmission};
use ::cron::Schedule;
use chrono::Utc;
use dashmap::DashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Parse a cron expression and compute the next fire time.
pub fn next_fire(schedule: &str) -> Result<chrono::DateTime<Utc>, String> {
    let parsed = Schedule::from_str(schedule).map_err(|e| format!("invalid schedule: {}", e))?;
    parsed
        .upcoming(Utc)
        .next()
        .ok_or_else(|| "schedule has no upcoming fire times".to_string())
}

/// Scheduler owning one timer task per cron.
pub struct CronScheduler {
    db: DatabaseConnection,
    lifecycle: Arc<RunLifecycle>,
    timers: DashMap<String, JoinHandle<()>>,
}

impl CronScheduler {
    pub fn new(db: DatabaseConnection, lifecycle: Arc<RunLifecycle>) -> Self {
        Self {
            db,
            lifecycle,
            timers: DashMap::new(),
        }
    }

    /// Restore timers for persisted crons at startup.
    pub async fn restore(self: &Arc<Self>) {
        match CronRepository::list_all(self.db.pool()).await {
            Ok(crons) => {
                let count = crons.len();
                for cron in crons {
                    self.schedule(cron);
                }
                tracing::info!(count, "restored cron timers");
            }
            Err(e) => tracing::error!(error = %e, "failed to restore crons"),
        }
    }

    /// Start (or replace) the timer for a cron.
    pub fn schedule(self: &Arc<Self>, cron: Cron) {
        let cron_id = cron.id.clone();
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            scheduler.run_timer(cron).await;
        });
        if let Some(previous) = self.timers.insert(cron_id, handle) {
            previous.abort();
        }
    }

    /// Stop a cron's timer (explicit delete).
    pub fn cancel(&self, cron_id: &str) {
        if let Some((_, handle)) = self.timers.remove(cron_id) {
            handle.abort();
        }
    }

    async fn run_timer(self: Arc<Self>, cron: Cron) {
        let mut cron = cron;
        loop {
            let next = match next_fire(&cron.schedule) {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(cron_id = %cron.id, error = %e, "unschedulable cron, removing");
                    let _ = CronRepository::delete_by_id(self.db.pool(), &cron.id).await;
                    self.timers.remove(&cron.id);
                    return;
                }
            };

            if cron.is_expired(next) {
                tracing::info!(cron_id = %cron.id, "cron end_time reached, removing");
                let _ = CronRepository::delete_by_id(self.db.pool(), &cron.id).await;
                self.timers.remove(&cron.id);
                return;
            }

            let _ = CronRepository::set_next_run_date(
                self.db.pool(),
                &cron.id,
                Some(&next.to_rfc3339()),
            )
            .await;

            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            // The cron may have been deleted while we slept.
            match CronRepository::get(self.db.pool(), &cron.id, &cron.owner_id).await {
                Ok(Some(current)) => cron = current,
                _ => {
                    self.timers.remove(&cron.id);
                    return;
                }
            }

            self.fire(&cron).await;

            if cron.on_run_completed == on_run_completed::DELETE {
                tracing::info!(cron_id = %cron.id, "cron fired once, removing");
                let _ = CronRepository::delete_by_id(self.db.pool(), &cron.id).await;
                self.timers.remove(&cron.id);
                return;
            }
        }
    }

    /// Submit one run as the cron's owner and wait for it to finish.
    async fn fire(&self, cron: &Cron) {
        let thread_id = match &cron.thread_id {
            Some(thread_id) => thread_id.clone(),
            None => {
                // No fixed thread: each fire runs on a fresh one.
                let thread = Thread::new(Uuid::new_v4().to_string(), cron.owner_id.clone());
                let thread_id = thread.id.clone();
                if let Err(e) =
                    ThreadRepository::create(self.db.pool(), thread, IfExists::Raise).await
                {
                    tracing::error!(cron_id = %cron.id, error = %e, "cron could not create thread");
                    return;
                }
                thread_id
            }
        };

        let submission = RunSubmission {
            thread_id,
            assistant_id: cron.assistant_id.clone(),
            input: Some(cron.payload_value()),
            config: None,
            metadata: Some(serde_json::json!({"cron_id": cron.id})),
            multitask_strategy: MultitaskStrategy::Enqueue,
            owner_id: cron.owner_id.clone(),
            bearer_token: None,
        };

        match self.lifecycle.admit(submission).await {
            Ok(admitted) => {
                let run_id = admitted.run.id.clone();
                if let Err(e) = self.lifecycle.execute_run_wait(admitted).await {
                    tracing::error!(cron_id = %cron.id, run_id = %run_id, error = %e, "cron run failed");
                } else {
                    tracing::info!(cron_id = %cron.id, run_id = %run_id, "cron run completed");
                }
            }
            Err(e) => {
                tracing::error!(cron_id = %cron.id, error = %e, "cron run admission failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_fire_parses_six_field_schedules() {
        // second minute hour day month weekday
        let next = next_fire("0 0 * * * *").unwrap();
        assert!(next > Utc::now());
    }

    #[test]
    fn invalid_schedule_is_an_error() {
        assert!(next_fire("not a schedule").is_err());
        assert!(next_fire("99 99 99 99 99 99").is_err());
    }
}
