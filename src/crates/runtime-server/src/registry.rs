//! Graph registry: `graph_id` to async agent factory.
//!
//! Factories are registered eagerly at startup (built-in graphs) or lazily
//! (a constructor deferred until first resolve). Unknown ids fall back to
//! the default graph with a warning, so stale `graph_id` values in
//! persisted assistants keep working after a graph is removed.

use agent_checkpoint::CheckpointSaver;
use agent_graph::store::AgentStore;
use agent_graph::{CompiledAgent, GraphError, RunnableConfig};
use llm::ProviderKeys;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The graph id every unknown id falls back to.
pub const DEFAULT_GRAPH_ID: &str = "agent";

/// Everything a factory may need to assemble an agent.
pub struct FactoryContext {
    pub config: RunnableConfig,
    pub checkpointer: Arc<dyn CheckpointSaver>,
    pub store: Arc<dyn AgentStore>,
    pub provider_keys: ProviderKeys,
    /// The caller's bearer token, forwarded to MCP token exchanges.
    pub bearer_token: Option<String>,
    /// Owner of the run, scoping the OAuth token cache.
    pub owner_id: String,
}

type GraphFuture = Pin<Box<dyn Future<Output = Result<CompiledAgent, GraphError>> + Send>>;

/// Async constructor producing a compiled agent.
pub type GraphFactory = Arc<dyn Fn(FactoryContext) -> GraphFuture + Send + Sync>;

/// Deferred factory constructor for lazy registration.
pub type LazyFactoryInit = Arc<dyn Fn() -> GraphFactory + Send + Sync>;

enum RegistryEntry {
    Eager(GraphFactory),
    Lazy(LazyFactoryInit),
}

/// Shared, read-mostly registry populated at startup.
pub struct GraphRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the built-in graphs registered.
    pub fn with_builtin_graphs() -> Self {
        let registry = Self::new();
        registry.register(DEFAULT_GRAPH_ID, default_agent_factory());
        registry
    }

    pub fn register(&self, graph_id: &str, factory: GraphFactory) {
        self.entries
            .write()
            .insert(graph_id.to_string(), RegistryEntry::Eager(factory));
    }

    /// Register a factory constructed on first resolve.
    pub fn register_lazy(&self, graph_id: &str, init: LazyFactoryInit) {
        self.entries
            .write()
            .insert(graph_id.to_string(), RegistryEntry::Lazy(init));
    }

    /// Resolve a graph id, falling back to [`DEFAULT_GRAPH_ID`] with a
    /// warning when unknown.
    pub fn resolve(&self, graph_id: &str) -> Option<GraphFactory> {
        if let Some(factory) = self.resolve_exact(graph_id) {
            return Some(factory);
        }
        tracing::warn!(
            graph_id = %graph_id,
            fallback = DEFAULT_GRAPH_ID,
            "unknown graph_id, falling back to default graph"
        );
        self.resolve_exact(DEFAULT_GRAPH_ID)
    }

    fn resolve_exact(&self, graph_id: &str) -> Option<GraphFactory> {
        {
            let entries = self.entries.read();
            match entries.get(graph_id) {
                Some(RegistryEntry::Eager(factory)) => return Some(factory.clone()),
                Some(RegistryEntry::Lazy(_)) => {}
                None => return None,
            }
        }
        // Materialize the lazy entry under the write lock.
        let mut entries = self.entries.write();
        match entries.get(graph_id) {
            Some(RegistryEntry::Lazy(init)) => {
                let factory = init();
                entries.insert(graph_id.to_string(), RegistryEntry::Eager(factory.clone()));
                Some(factory)
            }
            Some(RegistryEntry::Eager(factory)) => Some(factory.clone()),
            None => None,
        }
    }

    /// Registered graph ids, advertised by `/info`.
    pub fn graph_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for GraphRegistry {
    fn default() -> Self {
        Self::with_builtin_graphs()
    }
}

/// The built-in tool-calling agent.
///
/// Model selection comes from `configurable.model` (`provider:model`);
/// `configurable.system_prompt`, `configurable.temperature` and
/// `configurable.mcp_config` round out the assistant surface.
pub fn default_agent_factory() -> GraphFactory {
    Arc::new(|ctx: FactoryContext| {
        Box::pin(async move {
            let model_spec = ctx
                .config
                .configurable_str("model")
                .unwrap_or("openai:gpt-4o-mini")
                .to_string();
            let base_url = ctx.config.configurable_str("base_url").map(String::from);

            let model = llm::resolve_model(&model_spec, &ctx.provider_keys, base_url.as_deref())
                .map_err(|e| GraphError::build(e.to_string()))?;

            let mut agent = CompiledAgent::new(model, ctx.checkpointer.clone());
            if let Some(prompt) = ctx.config.configurable_str("system_prompt") {
                agent = agent.with_system_prompt(prompt);
            }
            if let Some(temperature) = ctx
                .config
                .configurable
                .get("temperature")
                .and_then(|v| v.as_f64())
            {
                agent = agent.with_temperature(temperature);
            }

            if let Some(mcp_config) = ctx.config.configurable.get("mcp_config") {
                let tools = crate::mcp::load_tools(
                    mcp_config,
                    ctx.bearer_token.as_deref(),
                    &ctx.owner_id,
                    ctx.store.clone(),
                )
                .await;
                if !tools.is_empty() {
                    agent = agent.with_tools(tools);
                }
            }

            Ok(agent)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_checkpoint::InMemoryCheckpointSaver;
    use agent_graph::store::InMemoryStore;
    use agent_graph::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scripted_factory() -> GraphFactory {
        Arc::new(|ctx: FactoryContext| {
            Box::pin(async move {
                let model = Arc::new(llm::ScriptedChatModel::with_replies(&["ok"]));
                Ok(CompiledAgent::new(model, ctx.checkpointer.clone()))
            })
        })
    }

    fn context() -> FactoryContext {
        FactoryContext {
            config: RunnableConfig::new("t1", "assistant:a1"),
            checkpointer: Arc::new(InMemoryCheckpointSaver::new()),
            store: Arc::new(InMemoryStore::new()),
            provider_keys: ProviderKeys::default(),
            bearer_token: None,
            owner_id: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn resolve_known_graph() {
        let registry = GraphRegistry::new();
        registry.register("agent", scripted_factory());

        let factory = registry.resolve("agent").unwrap();
        let agent = factory(context()).await.unwrap();
        let state = agent
            .invoke(
                vec![Message::user("hi")],
                &RunnableConfig::new("t1", "assistant:a1"),
            )
            .await
            .unwrap();
        assert_eq!(state.messages.last().unwrap().content, "ok");
    }

    #[tokio::test]
    async fn unknown_graph_falls_back_to_default() {
        let registry = GraphRegistry::new();
        registry.register(DEFAULT_GRAPH_ID, scripted_factory());
        assert!(registry.resolve("deleted-graph").is_some());
    }

    #[tokio::test]
    async fn lazy_factory_initialized_once() {
        static INITS: AtomicUsize = AtomicUsize::new(0);
        let registry = GraphRegistry::new();
        registry.register_lazy(
            "lazy",
            Arc::new(|| {
                INITS.fetch_add(1, Ordering::SeqCst);
                scripted_factory()
            }),
        );

        assert_eq!(INITS.load(Ordering::SeqCst), 0);
        registry.resolve("lazy").unwrap();
        registry.resolve("lazy").unwrap();
        assert_eq!(INITS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn graph_ids_are_sorted() {
        let registry = GraphRegistry::new();
        registry.register("b", scripted_factory());
        registry.register("a", scripted_factory());
        assert_eq!(registry.graph_ids(), vec!["a", "b"]);
    }
}
