//! The compiled tool-calling agent.
//!
//! One invocation loads the checkpoint for `(thread_id, checkpoint_ns)`,
//! merges the input messages, then alternates between the chat model and
//! tool execution until the model stops requesting tools (or the recursion
//! limit trips). A checkpoint is written after every step, so a crashed or
//! cancelled run resumes from the last completed step.

use crate::config::RunnableConfig;
use crate::error::{GraphError, Result};
use crate::event::{AgentEvent, EventMetadata, MessageChunk};
use crate::llm::{ChatModel, ChatRequest, StreamChunk};
use crate::messages::{add_messages, messages_from_values, Message, MessageRole, ToolCall};
use crate::tool::Tool;
use agent_checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointSaver, CheckpointSource, StateSnapshot,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Node names used in update events and delta metadata.
const NODE_MODEL: &str = "model";
const NODE_TOOLS: &str = "tools";

/// Final state of an invocation.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub messages: Vec<Message>,
}

impl AgentState {
    /// Thread-values form: `{"messages": [...]}`.
    pub fn values(&self) -> serde_json::Value {
        serde_json::json!({ "messages": self.messages })
    }
}

/// A ready-to-run agent bound to a model, tools and a checkpointer.
#[derive(Clone)]
pub struct CompiledAgent {
    model: Arc<dyn ChatModel>,
    tools: Arc<Vec<Arc<dyn Tool>>>,
    system_prompt: Option<String>,
    temperature: Option<f64>,
    checkpointer: Arc<dyn CheckpointSaver>,
}

impl CompiledAgent {
    pub fn new(model: Arc<dyn ChatModel>, checkpointer: Arc<dyn CheckpointSaver>) -> Self {
        Self {
            model,
            tools: Arc::new(Vec::new()),
            system_prompt: None,
            temperature: None,
            checkpointer,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Latest checkpointed state for this config's namespace, if any.
    pub async fn get_state(&self, config: &RunnableConfig) -> Result<Option<StateSnapshot>> {
        let tuple = self
            .checkpointer
            .get_tuple(&config.checkpoint_config())
            .await?;
        Ok(tuple.map(StateSnapshot::from))
    }

    /// Checkpoint history for this config's namespace, newest first.
    pub async fn get_history(
        &self,
        config: &RunnableConfig,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<StateSnapshot>> {
        let tuples = self
            .checkpointer
            .list(&config.checkpoint_config(), limit, before)
            .await?;
        Ok(tuples.into_iter().map(StateSnapshot::from).collect())
    }

    async fn load_messages(&self, config: &RunnableConfig) -> Result<Vec<Message>> {
        let tuple = self
            .checkpointer
            .get_tuple(&config.checkpoint_config())
            .await?;
        Ok(tuple
            .map(|t| {
                let values = serde_json::to_value(&t.checkpoint.channel_values)
                    .unwrap_or_else(|_| serde_json::json!({}));
                messages_from_values(&values)
            })
            .unwrap_or_default())
    }

    fn build_request(&self, messages: &[Message]) -> ChatRequest {
        let mut request_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            if !messages.iter().any(|m| m.role == MessageRole::System) {
                request_messages.push(Message::system(prompt.clone()));
            }
        }
        request_messages.extend_from_slice(messages);

        let mut request = ChatRequest::new(request_messages)
            .with_tools(self.tools.iter().map(|t| t.definition()).collect());
        if let Some(t) = self.temperature {
            request = request.with_temperature(t);
        }
        request
    }

    async fn checkpoint(
        &self,
        config: &RunnableConfig,
        messages: &[Message],
        source: CheckpointSource,
        step: i32,
    ) -> Result<Option<String>> {
        let checkpoint = Checkpoint::from_messages(serde_json::to_value(messages)?);
        let stored = self
            .checkpointer
            .put(
                &config.checkpoint_config(),
                checkpoint,
                CheckpointMetadata::new().with_source(source).with_step(step),
            )
            .await?;
        Ok(stored.checkpoint_id)
    }

    async fn execute_tool_calls(&self, tool_calls: &[ToolCall]) -> Vec<Message> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            let content = match self.tools.iter().find(|t| t.name() == call.name) {
                Some(tool) => match tool.call(call.args.clone()).await {
                    Ok(value) => match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    },
                    Err(e) => {
                        tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                        format!("Error: {}", e)
                    }
                },
                None => {
                    tracing::warn!(tool = %call.name, "unknown tool requested");
                    format!("Error: unknown tool '{}'", call.name)
                }
            };
            results.push(Message::tool(content, call.id.clone()));
        }
        results
    }

    /// Run to completion without streaming; returns the final state.
    pub async fn invoke(
        &self,
        input: Vec<Message>,
        config: &RunnableConfig,
    ) -> Result<AgentState> {
        let prior = self.load_messages(config).await?;
        let mut messages = add_messages(prior, input);
        self.checkpoint(config, &messages, CheckpointSource::Input, -1)
            .await?;

        let mut step: i32 = 0;
        loop {
            if step as usize >= config.recursion_limit {
                return Err(GraphError::RecursionLimit(config.recursion_limit));
            }

            let response = self.model.chat(self.build_request(&messages)).await?;
            let mut assistant = response.message;
            assistant.ensure_id();
            let tool_calls = assistant.tool_calls.clone();
            messages.push(assistant);
            self.checkpoint(config, &messages, CheckpointSource::Loop, step)
                .await?;
            step += 1;

            if tool_calls.is_empty() {
                break;
            }

            let results = self.execute_tool_calls(&tool_calls).await;
            messages.extend(results);
            self.checkpoint(config, &messages, CheckpointSource::Loop, step)
                .await?;
            step += 1;
        }

        Ok(AgentState { messages })
    }

    /// Run with streaming. Events arrive on the returned receiver; dropping
    /// it halts execution at the next emission point.
    pub fn stream(&self, input: Vec<Message>, config: RunnableConfig) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(256);
        let agent = self.clone();
        tokio::spawn(async move {
            if let Err(e) = agent.run_streaming(input, &config, &tx).await {
                let _ = tx
                    .send(AgentEvent::Failed {
                        error: e.to_string(),
                    })
                    .await;
            }
        });
        rx
    }

    fn delta_metadata(&self, config: &RunnableConfig) -> EventMetadata {
        EventMetadata {
            langgraph_node: NODE_MODEL.to_string(),
            run_id: config.configurable_str("run_id").map(String::from),
            thread_id: Some(config.thread_id.clone()),
            checkpoint_ns: Some(config.checkpoint_ns.clone()),
            ls_model_name: Some(self.model.model_name().to_string()),
        }
    }

    async fn run_streaming(
        &self,
        input: Vec<Message>,
        config: &RunnableConfig,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        let prior = self.load_messages(config).await?;
        let mut messages = add_messages(prior, input);
        self.checkpoint(config, &messages, CheckpointSource::Input, -1)
            .await?;

        let mut step: i32 = 0;
        loop {
            if step as usize >= config.recursion_limit {
                return Err(GraphError::RecursionLimit(config.recursion_limit));
            }

            let message_id = Uuid::new_v4().to_string();
            let mut content = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();

            let mut chunks = self.model.chat_stream(self.build_request(&messages)).await?;
            while let Some(chunk) = chunks.recv().await {
                let StreamChunk {
                    delta,
                    tool_calls: chunk_calls,
                    finish_reason: _,
                } = chunk?;
                if !chunk_calls.is_empty() {
                    tool_calls = chunk_calls;
                }
                if delta.is_empty() {
                    continue;
                }
                content.push_str(&delta);
                let event = AgentEvent::MessageDelta {
                    chunk: MessageChunk::delta(&message_id, delta),
                    metadata: self.delta_metadata(config),
                };
                if tx.send(event).await.is_err() {
                    // Consumer went away; stop without a final checkpoint for
                    // this partial step.
                    return Ok(());
                }
            }

            let assistant = Message::ai(content)
                .with_id(message_id)
                .with_tool_calls(tool_calls.clone());
            messages.push(assistant.clone());
            self.checkpoint(config, &messages, CheckpointSource::Loop, step)
                .await?;
            step += 1;

            let update = AgentEvent::Update {
                node: NODE_MODEL.to_string(),
                values: serde_json::json!({ "messages": [assistant] }),
            };
            if tx.send(update).await.is_err() {
                return Ok(());
            }

            if tool_calls.is_empty() {
                break;
            }

            let results = self.execute_tool_calls(&tool_calls).await;
            messages.extend(results.iter().cloned());
            self.checkpoint(config, &messages, CheckpointSource::Loop, step)
                .await?;
            step += 1;

            let update = AgentEvent::Update {
                node: NODE_TOOLS.to_string(),
                values: serde_json::json!({ "messages": results }),
            };
            if tx.send(update).await.is_err() {
                return Ok(());
            }
        }

        let final_checkpoint_id = self
            .checkpointer
            .get_tuple(&config.checkpoint_config())
            .await?
            .and_then(|t| t.config.checkpoint_id);
        let _ = tx
            .send(AgentEvent::Completed {
                checkpoint_id: final_checkpoint_id,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, ChatStream};
    use agent_checkpoint::InMemoryCheckpointSaver;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Model that replays scripted responses, streaming them in 3-byte
    /// deltas.
    struct Scripted {
        responses: Mutex<VecDeque<Message>>,
    }

    impl Scripted {
        fn new(responses: Vec<Message>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }

        fn next_response(&self) -> Message {
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Message::ai("out of script"))
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse::new(self.next_response()))
        }

        async fn chat_stream(&self, _request: ChatRequest) -> Result<ChatStream> {
            let message = self.next_response();
            let (tx, rx) = mpsc::channel(64);
            tokio::spawn(async move {
                let bytes = message.content.as_bytes();
                for piece in bytes.chunks(3) {
                    let delta = String::from_utf8_lossy(piece).to_string();
                    if tx.send(Ok(StreamChunk::delta(delta))).await.is_err() {
                        return;
                    }
                }
                let _ = tx
                    .send(Ok(StreamChunk::finish("stop", message.tool_calls)))
                    .await;
            });
            Ok(rx)
        }
    }

    struct Adder;

    #[async_trait]
    impl Tool for Adder {
        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "Adds two numbers"
        }

        fn schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            })
        }

        async fn call(&self, args: serde_json::Value) -> Result<serde_json::Value> {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(serde_json::json!(a + b))
        }
    }

    fn agent_with(responses: Vec<Message>) -> CompiledAgent {
        CompiledAgent::new(
            Arc::new(Scripted::new(responses)),
            Arc::new(InMemoryCheckpointSaver::new()),
        )
    }

    #[tokio::test]
    async fn invoke_appends_assistant_reply() {
        let agent = agent_with(vec![Message::ai("Hello Alice")]);
        let config = RunnableConfig::new("t1", "assistant:a1");

        let state = agent
            .invoke(vec![Message::user("My name is Alice")], &config)
            .await
            .unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, "Hello Alice");
    }

    #[tokio::test]
    async fn second_turn_sees_first_turn_history() {
        let agent = agent_with(vec![Message::ai("Hello Alice"), Message::ai("Alice")]);
        let config = RunnableConfig::new("t1", "assistant:a1");

        agent
            .invoke(vec![Message::user("My name is Alice")], &config)
            .await
            .unwrap();
        let state = agent
            .invoke(vec![Message::user("What's my name?")], &config)
            .await
            .unwrap();

        // two turns: user, ai, user, ai
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.messages[0].content, "My name is Alice");
        assert_eq!(state.messages[3].content, "Alice");
    }

    #[tokio::test]
    async fn namespaces_do_not_contaminate() {
        let checkpointer = Arc::new(InMemoryCheckpointSaver::new());
        let a1 = CompiledAgent::new(
            Arc::new(Scripted::new(vec![Message::ai("noted: 42")])),
            checkpointer.clone(),
        );
        let a2 = CompiledAgent::new(
            Arc::new(Scripted::new(vec![Message::ai("no idea")])),
            checkpointer.clone(),
        );

        let c1 = RunnableConfig::new("t1", "assistant:a1");
        let c2 = RunnableConfig::new("t1", "assistant:a2");

        a1.invoke(vec![Message::user("remember 42")], &c1).await.unwrap();
        let state2 = a2
            .invoke(vec![Message::user("what number?")], &c2)
            .await
            .unwrap();

        // a2's state holds only its own turn
        assert_eq!(state2.messages.len(), 2);

        let snap1 = a1.get_state(&c1).await.unwrap().unwrap();
        let msgs1 = messages_from_values(&snap1.values);
        assert!(msgs1.iter().any(|m| m.content.contains("42")));
    }

    #[tokio::test]
    async fn tool_loop_feeds_results_back() {
        let call = ToolCall::new("call-1", "add", serde_json::json!({"a": 1, "b": 2}));
        let agent = agent_with(vec![
            Message::ai("").with_tool_calls(vec![call]),
            Message::ai("the answer is 3"),
        ])
        .with_tools(vec![Arc::new(Adder)]);
        let config = RunnableConfig::new("t1", "assistant:a1");

        let state = agent
            .invoke(vec![Message::user("add 1 and 2")], &config)
            .await
            .unwrap();

        let tool_msg = state
            .messages
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        assert_eq!(tool_msg.content, "3");
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(state.messages.last().unwrap().content, "the answer is 3");
    }

    #[tokio::test]
    async fn unknown_tool_produces_error_result() {
        let call = ToolCall::new("call-1", "missing", serde_json::json!({}));
        let agent = agent_with(vec![
            Message::ai("").with_tool_calls(vec![call]),
            Message::ai("done"),
        ]);
        let config = RunnableConfig::new("t1", "assistant:a1");

        let state = agent.invoke(vec![Message::user("go")], &config).await.unwrap();
        let tool_msg = state
            .messages
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        assert!(tool_msg.content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn recursion_limit_stops_runaway_loops() {
        // Model that always requests another tool call.
        let looping: Vec<Message> = (0..10)
            .map(|i| {
                Message::ai("").with_tool_calls(vec![ToolCall::new(
                    format!("call-{}", i),
                    "add",
                    serde_json::json!({"a": 0, "b": 0}),
                )])
            })
            .collect();
        let agent = agent_with(looping).with_tools(vec![Arc::new(Adder)]);
        let config = RunnableConfig::new("t1", "assistant:a1").with_recursion_limit(4);

        let err = agent
            .invoke(vec![Message::user("loop")], &config)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::RecursionLimit(4)));
    }

    #[tokio::test]
    async fn stream_deltas_concatenate_to_final_content() {
        let agent = agent_with(vec![Message::ai("Hello Alice")]);
        let config = RunnableConfig::new("t1", "assistant:a1");

        let mut rx = agent.stream(vec![Message::user("hi")], config.clone());
        let mut concatenated = String::new();
        let mut completed = false;
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::MessageDelta { chunk, metadata } => {
                    concatenated.push_str(&chunk.content);
                    assert_eq!(metadata.langgraph_node, "model");
                    assert_eq!(metadata.checkpoint_ns.as_deref(), Some("assistant:a1"));
                }
                AgentEvent::Completed { checkpoint_id } => {
                    assert!(checkpoint_id.is_some());
                    completed = true;
                }
                AgentEvent::Failed { error } => panic!("unexpected failure: {}", error),
                AgentEvent::Update { .. } => {}
            }
        }
        assert!(completed);
        assert_eq!(concatenated, "Hello Alice");

        let snapshot = agent.get_state(&config).await.unwrap().unwrap();
        let messages = messages_from_values(&snapshot.values);
        assert_eq!(messages.last().unwrap().content, "Hello Alice");
    }

    #[tokio::test]
    async fn get_history_returns_snapshots_newest_first() {
        let agent = agent_with(vec![Message::ai("one"), Message::ai("two")]);
        let config = RunnableConfig::new("t1", "assistant:a1");

        agent.invoke(vec![Message::user("a")], &config).await.unwrap();
        agent.invoke(vec![Message::user("b")], &config).await.unwrap();

        let history = agent.get_history(&config, 100, None).await.unwrap();
        assert!(history.len() >= 4);
        let newest = messages_from_values(&history[0].values);
        assert_eq!(newest.last().unwrap().content, "two");
    }
}
