//! Deterministic mock model for tests.

use agent_graph::llm::ChatStream;
use agent_graph::{ChatModel, ChatRequest, ChatResponse, Message, StreamChunk};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// Replays scripted assistant messages in order.
///
/// Streaming splits each reply into fixed-size deltas so tests can assert
/// delta semantics (concatenation, no duplication). When the script runs
/// out, the model answers with a fixed fallback instead of failing, which
/// keeps multi-turn tests independent of exact call counts.
pub struct ScriptedChatModel {
    name: String,
    responses: Mutex<VecDeque<Message>>,
    chunk_size: usize,
}

impl ScriptedChatModel {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            name: "scripted".to_string(),
            responses: Mutex::new(responses.into()),
            chunk_size: 4,
        }
    }

    /// Convenience constructor for plain-text replies.
    pub fn with_replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Message::ai(*r)).collect())
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    fn next_response(&self) -> Message {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Message::ai("(scripted model: out of replies)"))
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, _request: ChatRequest) -> agent_graph::Result<ChatResponse> {
        Ok(ChatResponse::new(self.next_response()))
    }

    async fn chat_stream(&self, _request: ChatRequest) -> agent_graph::Result<ChatStream> {
        let message = self.next_response();
        let chunk_size = self.chunk_size;
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let chars: Vec<char> = message.content.chars().collect();
            for piece in chars.chunks(chunk_size) {
                let delta: String = piece.iter().collect();
                if tx.send(Ok(StreamChunk::delta(delta))).await.is_err() {
                    return;
                }
                // Yield so cancellation checks interleave with deltas.
                tokio::task::yield_now().await;
            }
            let _ = tx
                .send(Ok(StreamChunk::finish("stop", message.tool_calls)))
                .await;
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_in_order() {
        let model = ScriptedChatModel::with_replies(&["one", "two"]);
        let first = model.chat(ChatRequest::default()).await.unwrap();
        let second = model.chat(ChatRequest::default()).await.unwrap();
        assert_eq!(first.message.content, "one");
        assert_eq!(second.message.content, "two");
        assert_eq!(model.remaining(), 0);
    }

    #[tokio::test]
    async fn stream_chunks_concatenate() {
        let model = ScriptedChatModel::with_replies(&["Hello Alice"]).with_chunk_size(3);
        let mut rx = model.chat_stream(ChatRequest::default()).await.unwrap();
        let mut out = String::new();
        let mut finished = false;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            out.push_str(&chunk.delta);
            if chunk.finish_reason.is_some() {
                finished = true;
            }
        }
        assert!(finished);
        assert_eq!(out, "Hello Alice");
    }
}
