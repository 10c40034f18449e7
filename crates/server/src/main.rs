//! Process entry point: load configuration, wire every component, serve.
//!
//! Grounded on the teacher's `main.rs` startup sequence (load config, build
//! collaborators bottom-up, init tracing, bind and serve) — the component
//! graph itself differs (Postgres/pgvector instead of Qdrant+Tantivy, a
//! single OpenAI-compatible LLM backend instead of the teacher's local/cloud
//! backend switch).

use std::sync::Arc;
use std::time::Duration;

use medrag_agent::{EmotionalAgent, InMemorySessionStore, Orchestrator, RagAgent, Supervisor};
use medrag_config::{EmbeddingProviderKind, RetrievalStrategyKind, Settings};
use medrag_core::{AgentLlm, AuthToken, EmbeddingProvider, Reranker, Retriever, VectorStore};
use medrag_llm::backend::{LlmConfig, OpenAiCompatibleBackend};
use medrag_rag::{
    AdvancedRetriever, AliyunEmbeddingProvider, CrossEncoderReranker, LocalEmbeddingProvider,
    OpenAiCompatibleEmbeddingProvider, PostgresVectorStore, QueryExpander, RerankRetriever,
    SimpleRetriever,
};
use medrag_server::http::{create_router, AppState};

const DEFAULT_MIN_POOL_CONNECTIONS: u32 = 2;
const DEFAULT_MAX_POOL_CONNECTIONS: u32 = 10;
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const BIND_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .json()
        .init();

    let settings = medrag_config::load_settings()?;
    tracing::info!(retrieval_strategy = ?settings.retrieval.retrieval_strategy, "configuration loaded");

    let embedder = build_embedding_provider(&settings)?;
    let store: Arc<dyn VectorStore> = Arc::new(
        PostgresVectorStore::connect(
            &settings.postgres.connection_string(),
            DEFAULT_MIN_POOL_CONNECTIONS,
            DEFAULT_MAX_POOL_CONNECTIONS,
            settings.retrieval.enable_keyword_search,
        )
        .await?,
    );

    let llm: Arc<dyn AgentLlm> = Arc::new(OpenAiCompatibleBackend::new(LlmConfig::new(
        settings.llm.model_name.clone(),
        settings.llm.openai_api_base.clone(),
        settings.llm.openai_api_key.clone(),
    ))?);

    let retriever = build_retriever(&settings, embedder, store, llm.clone())?;

    let session_store = InMemorySessionStore::new(settings.server.session_ttl());
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    session_store.start_cleanup_task(SESSION_SWEEP_INTERVAL, shutdown_rx);

    let supervisor = Supervisor::new(llm.clone());
    let emotional_agent = EmotionalAgent::new(llm.clone());
    let rag_agent = RagAgent::new(llm, retriever, settings.retrieval.top_k_documents, settings.retrieval.history_window);

    let orchestrator = Arc::new(Orchestrator::new(
        session_store.clone(),
        supervisor,
        emotional_agent,
        rag_agent,
    ));

    let auth_token = Arc::new(AuthToken::parse(&settings.server.api_bearer_token)?);

    let state = AppState {
        orchestrator,
        session_store,
        auth_token,
    };

    let router = create_router(state, &settings.server.cors_origins, settings.server.cors_enabled);

    tracing::info!(addr = BIND_ADDR, "starting server");
    let listener = tokio::net::TcpListener::bind(BIND_ADDR).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn build_embedding_provider(settings: &Settings) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match settings.embedding.embedding_provider {
        EmbeddingProviderKind::Local => {
            let endpoint = settings
                .embedding
                .embedding_endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("EMBEDDING_ENDPOINT is required when EMBEDDING_PROVIDER=local"))?;
            Arc::new(LocalEmbeddingProvider::new(endpoint, settings.embedding.embedding_model.clone()))
        }
        EmbeddingProviderKind::Openrouter => {
            let api_key = settings
                .embedding
                .embedding_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("EMBEDDING_API_KEY is required for the openrouter provider"))?;
            Arc::new(OpenAiCompatibleEmbeddingProvider::new(
                settings.llm.openai_api_base.clone(),
                api_key,
                settings.embedding.embedding_model.clone(),
            ))
        }
        EmbeddingProviderKind::Aliyun => {
            let api_key = settings
                .embedding
                .embedding_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("EMBEDDING_API_KEY is required for the aliyun provider"))?;
            let api_base = settings
                .embedding
                .embedding_endpoint
                .clone()
                .unwrap_or_else(|| "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string());
            Arc::new(AliyunEmbeddingProvider::new(api_base, api_key, settings.embedding.embedding_model.clone()))
        }
    };
    Ok(provider)
}

fn build_retriever(
    settings: &Settings,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn AgentLlm>,
) -> anyhow::Result<Arc<dyn Retriever>> {
    let retriever: Arc<dyn Retriever> = match settings.retrieval.retrieval_strategy {
        RetrievalStrategyKind::Simple => Arc::new(SimpleRetriever::new(embedder, store)),
        RetrievalStrategyKind::Rerank => {
            let reranker = build_reranker(settings)?;
            Arc::new(RerankRetriever::new(embedder, store, reranker, settings.retrieval.candidate_multiplier))
        }
        RetrievalStrategyKind::Advanced => {
            let reranker = build_reranker(settings)?;
            let expander = QueryExpander::new(
                llm,
                medrag_rag::query_expansion::QueryExpansionConfig { max_queries: settings.retrieval.max_queries },
            );
            Arc::new(AdvancedRetriever::new(
                embedder,
                store,
                reranker,
                expander,
                settings.retrieval.candidate_multiplier,
                settings.retrieval.keyword_similarity_threshold,
            ))
        }
    };
    Ok(retriever)
}

fn build_reranker(settings: &Settings) -> anyhow::Result<Arc<dyn Reranker>> {
    let endpoint = settings
        .retrieval
        .reranker_endpoint
        .clone()
        .ok_or_else(|| anyhow::anyhow!("RERANKER_ENDPOINT is required for the rerank/advanced strategies"))?;
    Ok(Arc::new(CrossEncoderReranker::new(endpoint)))
}
