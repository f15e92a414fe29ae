//! The orchestrating engine: classify → (optional) tool → finalize.
//!
//! The graph is deliberately acyclic with a single branch point after
//! classification, bounding every query to at most one classification
//! call, one tool call, and one generation call. Sessions are independent;
//! the only cross-query state is the per-session connection registry,
//! conversation memory, and document registry the engine owns.

pub mod answers;
mod classifier;
mod finalize;
mod state;

pub use classifier::{tool_definitions, IntentClassifier, RouteDecision, DB_TOOL, RAG_TOOL};
pub use state::{AgentState, GraphMessage, ToolOutput};

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::config::{AppConfig, ModelsConfig, RetrievalConfig};
use crate::db::executor::run_db_execution;
use crate::db::{inspect_schema, ConnectionRegistry, DbSchema, EngineKind, SqlGenerator};
use crate::error::EngineError;
use crate::memory::MemoryStore;
use crate::providers::OpenAiCompatibleProvider;
use crate::rag::pipeline::run_rag_retrieval;
use crate::rag::{ChunkRetriever, FastembedEmbedder, QdrantRetriever};
use crate::session::{validate_session_id, DocumentRegistry};
use crate::traits::ModelProvider;
use crate::types::FinalAnswer;

pub struct Engine {
    pub(crate) provider: Arc<dyn ModelProvider>,
    pub(crate) models: ModelsConfig,
    pub(crate) memory: MemoryStore,
    documents: DocumentRegistry,
    registry: ConnectionRegistry,
    retriever: Arc<dyn ChunkRetriever>,
    classifier: IntentClassifier,
    sql_generator: SqlGenerator,
    retrieval: RetrievalConfig,
}

impl Engine {
    /// Wire an engine from parts. The provider and retriever are injected
    /// so the whole pipeline can run against scripted collaborators.
    pub fn new(
        config: &AppConfig,
        provider: Arc<dyn ModelProvider>,
        retriever: Arc<dyn ChunkRetriever>,
    ) -> Self {
        let mut models = config.provider.models.clone();
        models.apply_defaults();

        Self {
            classifier: IntentClassifier::new(provider.clone(), models.fast.clone()),
            sql_generator: SqlGenerator::new(provider.clone(), models.fast.clone()),
            provider,
            models,
            memory: MemoryStore::new(),
            documents: DocumentRegistry::new(),
            registry: ConnectionRegistry::new(config.state.data_dir.clone()),
            retriever,
            retrieval: config.retrieval.clone(),
        }
    }

    /// Wire an engine with the production collaborators: an
    /// OpenAI-compatible provider and a Qdrant retriever with local
    /// query embeddings.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let provider = OpenAiCompatibleProvider::new(
            &config.provider.base_url,
            &config.provider.api_key,
        )
        .map_err(|e| anyhow::anyhow!(e))?;
        let retriever = QdrantRetriever::new(
            &config.retrieval.qdrant_url,
            &config.retrieval.collection_prefix,
            Arc::new(FastembedEmbedder::new()),
        )?;
        Ok(Self::new(config, Arc::new(provider), Arc::new(retriever)))
    }

    /// Answer one user query: classify, run the chosen tool (if any),
    /// finalize. Exactly one [`FinalAnswer`] per call.
    pub async fn handle_query(
        &self,
        session_id: &str,
        query: &str,
    ) -> Result<FinalAnswer, EngineError> {
        validate_session_id(session_id)?;
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::validation("query must not be empty"));
        }

        info!(session_id, query, "Query received");
        let docs = self.documents.list(session_id);

        let decision = self.classifier.classify(query, &docs).await?;
        let mut state = AgentState::new(session_id, docs, query);

        match decision {
            RouteDecision::NoToolRequired => {
                state.messages.push(GraphMessage::NoToolRequired);
            }
            RouteDecision::ToolCall { name, top_k } => {
                // Arguments come from the request, not the model; only the
                // result-count hint is taken from the classifier output.
                state.messages.push(GraphMessage::ToolInvocation {
                    name: name.clone(),
                    arguments: json!({ "session_id": session_id, "query": query }),
                });
                let output = self.execute_tool(&name, session_id, query, top_k).await?;
                state
                    .messages
                    .push(GraphMessage::ToolResult { tool: name, output });
            }
        }

        self.finalize(&mut state).await
    }

    /// Run the classified tool. Unknown identities are contract violations.
    async fn execute_tool(
        &self,
        name: &str,
        session_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<ToolOutput, EngineError> {
        match name {
            RAG_TOOL => {
                let payload = run_rag_retrieval(
                    &self.retriever,
                    &self.memory,
                    session_id,
                    query,
                    top_k.unwrap_or(self.retrieval.top_k),
                    &self.retrieval.public_base_url,
                )
                .await?;
                Ok(ToolOutput::Structured(payload))
            }
            DB_TOOL => {
                let payload = run_db_execution(
                    &self.registry,
                    &self.sql_generator,
                    &self.memory,
                    session_id,
                    query,
                )
                .await?;
                Ok(ToolOutput::Structured(payload))
            }
            other => Err(EngineError::contract(format!(
                "classifier selected unknown tool '{}'",
                other
            ))),
        }
    }

    /// Bind a database to the session, validating with a trivial round
    /// trip and persisting the connection record. Re-connecting an
    /// already-bound session is a no-op.
    pub async fn connect_database(
        &self,
        session_id: &str,
        connection_string: &str,
    ) -> Result<EngineKind, EngineError> {
        validate_session_id(session_id)?;
        self.registry.connect(session_id, connection_string).await
    }

    /// Reflect the session's connected database. Requires a binding.
    pub async fn database_schema(&self, session_id: &str) -> Result<DbSchema, EngineError> {
        validate_session_id(session_id)?;
        let binding = self.registry.get(session_id).await?;
        inspect_schema(&binding).await.map_err(EngineError::Database)
    }

    /// Dispose the session's live database handle. The persisted record
    /// survives, so the next database query rehydrates.
    pub async fn disconnect_database(&self, session_id: &str) -> Result<(), EngineError> {
        validate_session_id(session_id)?;
        self.registry.disconnect(session_id).await;
        Ok(())
    }

    /// Record an uploaded document's name as classifier metadata.
    pub fn register_document(&self, session_id: &str, file_name: &str) -> Result<(), EngineError> {
        validate_session_id(session_id)?;
        if file_name.trim().is_empty() {
            return Err(EngineError::validation("file_name must not be empty"));
        }
        self.documents.register(session_id, file_name.trim());
        Ok(())
    }

    pub fn list_documents(&self, session_id: &str) -> Vec<String> {
        self.documents.list(session_id)
    }

    /// Full session teardown: memory, document names, live binding, the
    /// persisted connection record, and the retrieval partition. A failed
    /// partition drop is logged, not fatal; retrieval already degrades to
    /// empty for missing partitions.
    pub async fn reset_session(&self, session_id: &str) -> Result<(), EngineError> {
        validate_session_id(session_id)?;
        info!(session_id, "Resetting session");

        self.memory.clear(session_id);
        self.documents.clear(session_id);
        self.registry.disconnect(session_id).await;
        self.registry.remove_record(session_id).await?;

        if let Err(e) = self.retriever.drop_partition(session_id).await {
            tracing::warn!(session_id, "Failed to drop retrieval partition: {}", e);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}
