//! The run lifecycle engine.
//!
//! Admission resolves the assistant and thread, applies the multitask
//! strategy against the thread's active run, and creates the run record.
//! Execution drives the agent graph, translating its events into the SSE
//! sequence `metadata`, `values` (history + input), `messages`/`updates`,
//! `values` (final), `end` — with `error` replacing the tail on failure —
//! and lands the status transitions on every exit path, including client
//! disconnects and cancellation.

use crate::api::middleware::Metrics;
use crate::config::RuntimeConfig;
use crate::db::models::run::{status as run_status, MultitaskStrategy};
use crate::db::models::thread::status as thread_status;
use crate::db::models::{Assistant, Run};
use crate::db::repositories::{
    AssistantRepository, RunRepository, StateSnapshotRepository, ThreadRepository,
};
use crate::db::DatabaseConnection;
use crate::execution::configurable::{build_runnable_config, checkpoint_namespace};
use crate::execution::streaming::{CancelRegistry, RunBroadcast, SseEvent};
use crate::execution::{CheckpointerProvider, EngineError};
use crate::registry::{FactoryContext, GraphRegistry};
use crate::sync::{self, SYSTEM_OWNER};
use agent_graph::messages::{add_messages, messages_from_values, Message};
use agent_graph::store::AgentStore;
use agent_graph::{AgentEvent, CompiledAgent, RunnableConfig};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Poll interval for enqueue waits, interrupt waits and joins.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `interrupt` and `rollback` wait for the displaced run to
/// observe its cancel flag before proceeding.
const INTERRUPT_WAIT: Duration = Duration::from_secs(2);

/// A run request, after handler-level parsing.
#[derive(Debug, Clone)]
pub struct RunSubmission {
    pub thread_id: String,
    pub assistant_id: String,
    /// `{"messages": [...]}` or a bare message array.
    pub input: Option<Value>,
    pub config: Option<Value>,
    pub metadata: Option<Value>,
    pub multitask_strategy: MultitaskStrategy,
    pub owner_id: String,
    pub bearer_token: Option<String>,
}

/// An admitted run: record created, multitask policy applied.
#[derive(Debug, Clone)]
pub struct AdmittedRun {
    pub run: Run,
    pub assistant: Assistant,
    pub submission: RunSubmission,
}

/// Result of driving a run to its end.
struct RunOutcome {
    status: &'static str,
    final_values: Option<Value>,
    checkpoint_id: Option<String>,
    error_detail: Option<String>,
}

/// Event sink: always feeds the broadcast channel; optionally feeds the
/// originating request's stream. `alive` turns false when that client
/// disconnects.
struct Emitter<'a> {
    tx: Option<&'a mpsc::Sender<SseEvent>>,
    broadcast: &'a RunBroadcast,
    run_id: &'a str,
    alive: bool,
}

impl Emitter<'_> {
    async fn send(&mut self, event: SseEvent) -> bool {
        self.broadcast.publish(self.run_id, &event);
        if let Some(tx) = self.tx {
            if self.alive && tx.send(event).await.is_err() {
                self.alive = false;
            }
        }
        self.alive
    }
}

/// The run lifecycle engine.
pub struct RunLifecycle {
    db: DatabaseConnection,
    runtime_config: Arc<RuntimeConfig>,
    registry: Arc<GraphRegistry>,
    store: Arc<dyn AgentStore>,
    checkpointers: CheckpointerProvider,
    broadcast: Arc<RunBroadcast>,
    cancels: Arc<CancelRegistry>,
    metrics: Arc<Metrics>,
}

impl RunLifecycle {
    pub fn new(
        db: DatabaseConnection,
        runtime_config: Arc<RuntimeConfig>,
        registry: Arc<GraphRegistry>,
        store: Arc<dyn AgentStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let checkpointers = CheckpointerProvider::for_database(&runtime_config.database_url);
        Self {
            db,
            runtime_config,
            registry,
            store,
            checkpointers,
            broadcast: Arc::new(RunBroadcast::new()),
            cancels: Arc::new(CancelRegistry::new()),
            metrics,
        }
    }

    pub fn broadcast(&self) -> &Arc<RunBroadcast> {
        &self.broadcast
    }

    pub fn cancels(&self) -> &Arc<CancelRegistry> {
        &self.cancels
    }

    pub fn checkpointers(&self) -> &CheckpointerProvider {
        &self.checkpointers
    }

    /// Resolve an assistant visible to `owner_id`: their own, a
    /// system-synced one, or (dev mode) one lazily pulled from the catalog.
    pub async fn resolve_assistant(
        &self,
        assistant_id: &str,
        owner_id: &str,
    ) -> Result<Option<Assistant>, EngineError> {
        let pool = self.db.pool();
        if let Some(assistant) = AssistantRepository::get(pool, assistant_id, owner_id).await? {
            return Ok(Some(assistant));
        }
        if let Some(assistant) = AssistantRepository::get_any_owner(pool, assistant_id).await? {
            if assistant.owner_id == SYSTEM_OWNER {
                return Ok(Some(assistant));
            }
            return Ok(None);
        }

        if self.runtime_config.is_dev_mode() && self.runtime_config.catalog_url.is_some() {
            if let Err(e) = sync::sync_assistant(&self.db, &self.runtime_config, assistant_id).await
            {
                tracing::warn!(assistant_id = %assistant_id, error = %e, "lazy catalog sync failed");
            }
            if let Some(assistant) = AssistantRepository::get_any_owner(pool, assistant_id).await? {
                if assistant.owner_id == SYSTEM_OWNER {
                    return Ok(Some(assistant));
                }
            }
        }
        Ok(None)
    }

    /// Request admission: resolve entities, apply the multitask strategy
    /// once (no re-check), create the run record in `pending`.
    pub async fn admit(&self, submission: RunSubmission) -> Result<AdmittedRun, EngineError> {
        let pool = self.db.pool();

        let assistant = self
            .resolve_assistant(&submission.assistant_id, &submission.owner_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Assistant {} not found", submission.assistant_id))
            })?;

        ThreadRepository::get(pool, &submission.thread_id, &submission.owner_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Thread {} not found", submission.thread_id))
            })?;

        if let Some(active) =
            RunRepository::get_active(pool, &submission.thread_id, &submission.owner_id).await?
        {
            match submission.multitask_strategy {
                MultitaskStrategy::Reject => {
                    return Err(EngineError::Conflict("Thread has an active run".to_string()));
                }
                MultitaskStrategy::Interrupt => {
                    self.cancels.cancel(&active.id);
                    self.wait_for_terminal(&active.id, INTERRUPT_WAIT).await;
                }
                MultitaskStrategy::Rollback => {
                    self.cancels.cancel(&active.id);
                    self.wait_for_terminal(&active.id, INTERRUPT_WAIT).await;
                    RunRepository::delete(
                        pool,
                        &submission.thread_id,
                        &active.id,
                        &submission.owner_id,
                    )
                    .await?;
                    self.discard_checkpoints(&submission.thread_id, &active.assistant_id)
                        .await;
                    tracing::info!(run_id = %active.id, "rolled back active run");
                }
                MultitaskStrategy::Enqueue => {
                    while RunRepository::get_active(
                        pool,
                        &submission.thread_id,
                        &submission.owner_id,
                    )
                    .await?
                    .is_some()
                    {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                }
            }
        }

        let run = Run::new(
            Uuid::new_v4().to_string(),
            submission.thread_id.clone(),
            assistant.id.clone(),
            submission.owner_id.clone(),
            submission.multitask_strategy,
        )
        .with_kwargs(json!({
            "input": submission.input,
            "config": submission.config,
            "metadata": submission.metadata,
        }));
        let run = RunRepository::create(pool, run).await?;

        self.broadcast.open(&run.id);
        self.cancels.register(&run.id);

        Ok(AdmittedRun {
            run,
            assistant,
            submission,
        })
    }

    /// Best-effort wait for a cancelled run to reach a terminal status.
    async fn wait_for_terminal(&self, run_id: &str, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match RunRepository::get_by_id(self.db.pool(), run_id).await {
                Ok(Some(run)) if !run.is_terminal() => {}
                _ => return,
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(run_id = %run_id, "displaced run did not stop in time, proceeding");
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Delete the checkpoints a rolled-back run wrote (its whole assistant
    /// namespace within the thread). Best effort.
    async fn discard_checkpoints(&self, thread_id: &str, assistant_id: &str) {
        let namespace = checkpoint_namespace(assistant_id);
        match self.checkpointers.acquire().await {
            Ok(handle) => {
                if let Err(e) = handle.saver().delete_namespace(thread_id, &namespace).await {
                    tracing::warn!(thread_id = %thread_id, namespace = %namespace, error = %e, "rollback checkpoint cleanup failed");
                }
                handle.release().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "rollback could not open a checkpointer connection");
            }
        }
    }

    /// Streaming execution: returns the SSE event receiver; the run drives
    /// in a task that halts shortly after the receiver is dropped.
    pub fn execute_run_stream(self: &Arc<Self>, admitted: AdmittedRun) -> mpsc::Receiver<SseEvent> {
        let (tx, rx) = mpsc::channel(64);
        let lifecycle = self.clone();
        tokio::spawn(async move {
            lifecycle.drive(&admitted, Some(&tx)).await;
        });
        rx
    }

    /// Fire-and-forget execution for `POST /threads/{id}/runs`. Events are
    /// still published to the broadcast channel for late subscribers.
    pub fn execute_background(self: &Arc<Self>, admitted: AdmittedRun) {
        let lifecycle = self.clone();
        tokio::spawn(async move {
            lifecycle.drive(&admitted, None).await;
        });
    }

    /// Blocking execution: returns the final thread state values, or an
    /// `__error__` envelope when the run failed.
    pub async fn execute_run_wait(&self, admitted: AdmittedRun) -> Result<Value, EngineError> {
        let outcome = self.drive(&admitted, None).await;
        if outcome.status == run_status::ERROR {
            return Ok(json!({
                "__error__": {
                    "error": "RunError",
                    "message": outcome.error_detail.unwrap_or_default(),
                }
            }));
        }
        Ok(outcome.final_values.unwrap_or(Value::Null))
    }

    /// Block until a run reaches a terminal status, then return the
    /// thread's final values.
    pub async fn join_run(
        &self,
        thread_id: &str,
        run_id: &str,
        owner_id: &str,
    ) -> Result<Value, EngineError> {
        let pool = self.db.pool();
        loop {
            let run = RunRepository::get(pool, thread_id, run_id, owner_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("Run {} not found", run_id)))?;
            if run.is_terminal() {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        let thread = ThreadRepository::get_unscoped(pool, thread_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Thread {} not found", thread_id)))?;
        Ok(thread.values())
    }

    /// Execute one admitted run to completion and land its status
    /// transitions. The post-execution block runs on every path.
    async fn drive(&self, admitted: &AdmittedRun, tx: Option<&mpsc::Sender<SseEvent>>) -> RunOutcome {
        let run_id = admitted.run.id.clone();
        let thread_id = admitted.run.thread_id.clone();
        let pool = self.db.pool();

        self.metrics.runs_started.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = ThreadRepository::set_status(pool, &thread_id, thread_status::BUSY).await {
            tracing::error!(thread_id = %thread_id, error = %e, "failed to mark thread busy");
        }
        if let Err(e) = RunRepository::set_status(pool, &run_id, run_status::RUNNING).await {
            tracing::error!(run_id = %run_id, error = %e, "failed to mark run running");
        }

        let cancel_flag = self.cancels.register(&run_id);
        let mut emitter = Emitter {
            tx,
            broadcast: &self.broadcast,
            run_id: &run_id,
            alive: true,
        };

        let outcome = match self.stream_inner(admitted, &mut emitter, &cancel_flag).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let detail = e.to_string();
                tracing::error!(run_id = %run_id, error = %detail, "run execution failed");
                emitter.send(SseEvent::error(&detail)).await;
                RunOutcome {
                    status: run_status::ERROR,
                    final_values: None,
                    checkpoint_id: None,
                    error_detail: Some(detail),
                }
            }
        };

        emitter
            .send(SseEvent::end(
                &run_id,
                outcome.checkpoint_id.as_deref(),
                outcome.status,
            ))
            .await;

        // Post-execution block: persists state and statuses even when the
        // stream was cut off by a client disconnect.
        if let Some(values) = &outcome.final_values {
            if let Err(e) = ThreadRepository::set_values(pool, &thread_id, values).await {
                tracing::error!(thread_id = %thread_id, error = %e, "failed to persist thread values");
            }
            if let Err(e) = StateSnapshotRepository::append(
                pool,
                &thread_id,
                &checkpoint_namespace(&admitted.assistant.id),
                outcome.checkpoint_id.as_deref(),
                values,
            )
            .await
            {
                tracing::error!(thread_id = %thread_id, error = %e, "failed to append state snapshot");
            }
        }
        if let Err(e) = RunRepository::set_status(pool, &run_id, outcome.status).await {
            tracing::error!(run_id = %run_id, error = %e, "failed to record run status");
        }
        if let Err(e) = ThreadRepository::set_status(pool, &thread_id, thread_status::IDLE).await {
            tracing::error!(thread_id = %thread_id, error = %e, "failed to mark thread idle");
        }

        self.metrics.record_run_outcome(outcome.status);
        self.broadcast.finish(&run_id);
        self.cancels.remove(&run_id);
        tracing::info!(run_id = %run_id, thread_id = %thread_id, status = %outcome.status, "run finished");

        outcome
    }

    /// Execution body inside the scoped checkpointer acquisition.
    async fn stream_inner(
        &self,
        admitted: &AdmittedRun,
        emitter: &mut Emitter<'_>,
        cancel_flag: &AtomicBool,
    ) -> Result<RunOutcome, EngineError> {
        let submission = &admitted.submission;
        let config = build_runnable_config(
            &admitted.assistant,
            submission.config.as_ref(),
            &admitted.run.id,
            &submission.thread_id,
            &submission.owner_id,
            self.runtime_config.observability.as_ref(),
        );
        let input_messages = parse_input_messages(submission.input.as_ref())?;

        // Scoped acquisition: the handle is released on every exit path.
        let handle = self.checkpointers.acquire().await?;
        let agent = match self
            .build_agent(admitted, &config, handle.saver())
            .await
        {
            Ok(agent) => agent,
            Err(e) => {
                handle.release().await;
                return Err(e);
            }
        };
        let result = self
            .stream_with_agent(admitted, &config, input_messages, emitter, cancel_flag, agent)
            .await;
        handle.release().await;
        result
    }

    /// Resolve the graph factory and build the agent (triggering MCP tool
    /// loading for assistants that configure servers).
    async fn build_agent(
        &self,
        admitted: &AdmittedRun,
        config: &RunnableConfig,
        checkpointer: std::sync::Arc<dyn agent_checkpoint::CheckpointSaver>,
    ) -> Result<CompiledAgent, EngineError> {
        let submission = &admitted.submission;
        let factory = self
            .registry
            .resolve(&admitted.assistant.graph_id)
            .ok_or_else(|| EngineError::Validation("no graph factories registered".to_string()))?;
        let agent = factory(FactoryContext {
            config: config.clone(),
            checkpointer,
            store: self.store.clone(),
            provider_keys: self.runtime_config.provider_keys.clone(),
            bearer_token: submission.bearer_token.clone(),
            owner_id: submission.owner_id.clone(),
        })
        .await?;
        Ok(agent)
    }

    async fn stream_with_agent(
        &self,
        admitted: &AdmittedRun,
        config: &RunnableConfig,
        input_messages: Vec<Message>,
        emitter: &mut Emitter<'_>,
        cancel_flag: &AtomicBool,
        agent: CompiledAgent,
    ) -> Result<RunOutcome, EngineError> {
        let run_id = &admitted.run.id;
        emitter.send(SseEvent::metadata(run_id, 1)).await;

        // Initial values must include pre-existing checkpoint history merged
        // with the new input, not just the input (clients render from
        // values events and would lose history each turn otherwise).
        let pre_messages = match agent.get_state(config).await {
            Ok(Some(snapshot)) => messages_from_values(&snapshot.values),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "pre-stream checkpoint read failed, starting from input only");
                Vec::new()
            }
        };
        let merged = add_messages(pre_messages, input_messages.clone());
        emitter
            .send(SseEvent::values(json!({"messages": merged})))
            .await;

        // Empty input: nothing to run, the stream is just the snapshot.
        if input_messages.is_empty() {
            let checkpoint_id = agent
                .get_state(config)
                .await
                .ok()
                .flatten()
                .and_then(|s| s.config.checkpoint_id);
            return Ok(RunOutcome {
                status: run_status::SUCCESS,
                final_values: Some(json!({"messages": merged})),
                checkpoint_id,
                error_detail: None,
            });
        }

        let mut accumulated = merged;
        let mut checkpoint_id: Option<String> = None;
        let mut failure: Option<String> = None;
        let mut events = agent.stream(input_messages, config.clone());

        while let Some(event) = events.recv().await {
            // Cancellation is polled between events; no exception injection.
            if cancel_flag.load(Ordering::SeqCst) {
                emitter.send(SseEvent::error("Run was cancelled")).await;
                return Ok(RunOutcome {
                    status: run_status::INTERRUPTED,
                    final_values: Some(json!({"messages": accumulated})),
                    checkpoint_id,
                    error_detail: Some("Run was cancelled".to_string()),
                });
            }

            match event {
                AgentEvent::MessageDelta { chunk, metadata } => {
                    let alive = emitter
                        .send(SseEvent::messages(
                            serde_json::to_value(&chunk)?,
                            serde_json::to_value(&metadata)?,
                        ))
                        .await;
                    if !alive {
                        return Ok(self.disconnected_outcome(accumulated, checkpoint_id));
                    }
                }
                AgentEvent::Update { node, values } => {
                    accumulated = add_messages(accumulated, messages_from_values(&values));
                    let alive = emitter.send(SseEvent::updates(&node, values)).await;
                    if !alive {
                        return Ok(self.disconnected_outcome(accumulated, checkpoint_id));
                    }
                }
                AgentEvent::Completed { checkpoint_id: id } => {
                    checkpoint_id = id;
                    break;
                }
                AgentEvent::Failed { error } => {
                    failure = Some(error);
                    break;
                }
            }
        }
        drop(events);

        if let Some(detail) = failure {
            emitter.send(SseEvent::error(&detail)).await;
            return Ok(RunOutcome {
                status: run_status::ERROR,
                final_values: Some(json!({"messages": accumulated})),
                checkpoint_id,
                error_detail: Some(detail),
            });
        }

        // Final state from the checkpointer, degrading to the server-side
        // accumulation when the read fails.
        let final_values = match agent.get_state(config).await {
            Ok(Some(snapshot)) => snapshot.values,
            Ok(None) => json!({"messages": accumulated}),
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "post-stream checkpoint read failed, using accumulated messages");
                json!({"messages": accumulated})
            }
        };
        emitter.send(SseEvent::values(final_values.clone())).await;

        Ok(RunOutcome {
            status: run_status::SUCCESS,
            final_values: Some(final_values),
            checkpoint_id,
            error_detail: None,
        })
    }

    fn disconnected_outcome(
        &self,
        accumulated: Vec<Message>,
        checkpoint_id: Option<String>,
    ) -> RunOutcome {
        RunOutcome {
            status: run_status::INTERRUPTED,
            final_values: Some(json!({"messages": accumulated})),
            checkpoint_id,
            error_detail: Some("client disconnected".to_string()),
        }
    }
}

/// Parse run input into messages. Accepts `{"messages": [...]}`, a bare
/// array, or nothing.
pub fn parse_input_messages(input: Option<&Value>) -> Result<Vec<Message>, EngineError> {
    let array = match input {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => match map.get("messages") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(arr)) => arr.clone(),
            Some(_) => {
                return Err(EngineError::Validation(
                    "input.messages must be an array".to_string(),
                ))
            }
        },
        Some(Value::Array(arr)) => arr.clone(),
        Some(_) => {
            return Err(EngineError::Validation(
                "input must be an object with messages or a message array".to_string(),
            ))
        }
    };
    array
        .into_iter()
        .map(|value| {
            serde_json::from_value::<Message>(value)
                .map_err(|e| EngineError::Validation(format!("invalid message: {}", e)))
        })
        .collect()
}
