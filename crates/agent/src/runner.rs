//! AgentRunner (C7) — the two agent shapes run by the Orchestrator, spec §4.7.
//!
//! Grounded in the teacher's `GoldLoanAgent` struct shape (`config`/
//! `conversation`/`llm` fields, a streamed-generation entry point) narrowed
//! to the two flows the RAG/emotional split needs; the teacher's
//! tool-calling, intent/slot detection, and conversation-stage machinery
//! have no counterpart here.

use std::sync::Arc;
use std::time::Instant;

use medrag_core::{AgentLlm, Message, QueryInput, Result as CoreResult, Retriever, ScoredChunk};
use tokio::sync::mpsc;

const EMOTIONAL_TEMPERATURE: f32 = 0.8;
const RAG_CLASSIFY_TEMPERATURE: f32 = 0.1;
const RAG_RESPONSE_TEMPERATURE: f32 = 0.8;

pub const MEDICAL_DISCLAIMER: &str =
    "This information is educational only and is not a substitute for \
     professional medical advice, diagnosis, or treatment. Always consult a \
     qualified clinician about your specific situation.";

const EMOTIONAL_SYSTEM_PROMPT: &str =
    "You are a supportive, empathetic conversational companion. Listen, \
     validate the user's feelings, and respond warmly and conversationally. \
     You are not a clinician: never diagnose, prescribe, or give medical \
     advice — if the user raises a medical question, gently suggest they \
     also ask a qualified professional.";

const RAG_RESPOND_SYSTEM_PROMPT: &str =
    "You are a knowledgeable medical reference assistant. Answer the user's \
     question directly and accurately using your general knowledge. Keep \
     the tone clear and informative.";

const RAG_CONTEXT_SYSTEM_PROMPT: &str =
    "You are a knowledgeable medical reference assistant. Answer the user's \
     question using ONLY the numbered sources provided below; cite sources \
     by number inline where you draw on them. If the sources do not cover \
     the question, say so rather than guessing.";

/// Single-LLM-call agent: empathetic conversation, no retrieval, no tools.
pub struct EmotionalAgent {
    llm: Arc<dyn AgentLlm>,
}

impl EmotionalAgent {
    pub fn new(llm: Arc<dyn AgentLlm>) -> Self {
        Self { llm }
    }

    pub async fn run(&self, transcript: &[Message], tx: mpsc::Sender<String>) -> CoreResult<()> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(Message::system(EMOTIONAL_SYSTEM_PROMPT));
        messages.extend_from_slice(transcript);
        self.llm.generate_stream(&messages, EMOTIONAL_TEMPERATURE, tx).await
    }
}

/// Outcome of `RagAgent::run`, letting the orchestrator attach source
/// citations to the persisted assistant message.
#[derive(Debug, Default)]
pub struct RagRunOutcome {
    pub sources: Vec<String>,
    pub retrieved: bool,
}

/// Two-node pipeline: classify `retrieve` vs `respond`, then either answer
/// directly or ground the answer in retrieved context.
pub struct RagAgent {
    llm: Arc<dyn AgentLlm>,
    retriever: Arc<dyn Retriever>,
    top_k: usize,
    history_window: usize,
}

impl RagAgent {
    pub fn new(llm: Arc<dyn AgentLlm>, retriever: Arc<dyn Retriever>, top_k: usize, history_window: usize) -> Self {
        Self { llm, retriever, top_k, history_window }
    }

    pub async fn run(
        &self,
        transcript: &[Message],
        deadline: Instant,
        on_event: impl Fn(RagStage) + Send + Sync,
        tx: mpsc::Sender<String>,
    ) -> CoreResult<RagRunOutcome> {
        let latest = medrag_core::extract_query(transcript, 1);
        if self.needs_retrieval(&latest).await? {
            self.run_with_retrieval(transcript, deadline, &on_event, tx).await
        } else {
            self.run_direct(transcript, tx).await
        }
    }

    async fn needs_retrieval(&self, latest: &QueryInput) -> CoreResult<bool> {
        let text = latest.primary_text().unwrap_or_default();
        let prompt = format!(
            "Decide whether answering the following message requires looking \
             up reference material, or whether it can be answered directly \
             from the conversation alone. Reply with only the single word \
             \"retrieve\" or \"respond\".\n\nMessage: {text}"
        );
        let response = self
            .llm
            .generate(&[Message::user(prompt)], RAG_CLASSIFY_TEMPERATURE)
            .await?;
        Ok(response.trim().eq_ignore_ascii_case("retrieve"))
    }

    async fn run_direct(&self, transcript: &[Message], tx: mpsc::Sender<String>) -> CoreResult<RagRunOutcome> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(Message::system(format!("{RAG_RESPOND_SYSTEM_PROMPT}\n\n{MEDICAL_DISCLAIMER}")));
        messages.extend_from_slice(transcript);
        self.llm.generate_stream(&messages, RAG_RESPONSE_TEMPERATURE, tx).await?;
        Ok(RagRunOutcome { sources: Vec::new(), retrieved: false })
    }

    async fn run_with_retrieval(
        &self,
        transcript: &[Message],
        deadline: Instant,
        on_event: &(impl Fn(RagStage) + Send + Sync),
        tx: mpsc::Sender<String>,
    ) -> CoreResult<RagRunOutcome> {
        let query = medrag_core::extract_query(transcript, self.history_window);

        // The Retriever trait performs search and reranking as one atomic
        // call, so the reranking sub-phase has no separate hook to fire
        // from; its start/complete events are emitted back-to-back
        // immediately after retrieval_complete, preserving the documented
        // event order (retrieval_start, retrieval_complete, reranking_start,
        // reranking_complete, token...) even though the real rerank work
        // already finished by the time `retrieve` returns.
        on_event(RagStage::RetrievalStart);
        let reranks = self.retriever.name() != "simple";
        let results = self.retriever.retrieve(query, self.top_k, deadline).await?;
        on_event(RagStage::RetrievalComplete(results.len()));
        if reranks {
            on_event(RagStage::RerankingStart);
            on_event(RagStage::RerankingComplete(results.len()));
        }

        let (context, sources) = format_context(&results);
        let mut messages = Vec::with_capacity(transcript.len() + 2);
        messages.push(Message::system(format!(
            "{RAG_CONTEXT_SYSTEM_PROMPT}\n\n{MEDICAL_DISCLAIMER}"
        )));
        messages.push(Message::system(context));
        messages.extend_from_slice(transcript);

        self.llm.generate_stream(&messages, RAG_RESPONSE_TEMPERATURE, tx).await?;
        Ok(RagRunOutcome { sources, retrieved: true })
    }
}

/// Stage callbacks the orchestrator turns into `StreamEvent`s.
pub enum RagStage {
    RetrievalStart,
    RetrievalComplete(usize),
    RerankingStart,
    RerankingComplete(usize),
}

/// Numbered-source context block: "[1] <title>\n<text>" per chunk.
fn format_context(results: &[ScoredChunk]) -> (String, Vec<String>) {
    let mut block = String::new();
    let mut sources = Vec::with_capacity(results.len());
    for (idx, scored) in results.iter().enumerate() {
        let title = scored
            .chunk
            .section_title
            .as_deref()
            .or(scored.chunk.chapter_title.as_deref())
            .unwrap_or(scored.chunk.source_document.as_str());
        block.push_str(&format!("[{}] {}\n{}\n\n", idx + 1, title, scored.chunk.text));
        sources.push(scored.chunk.id.clone());
    }
    (block, sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medrag_core::{Chunk, Result, RetrievalResult, SearchSource};

    struct ScriptedLlm {
        classify: &'static str,
    }

    #[async_trait]
    impl AgentLlm for ScriptedLlm {
        async fn generate(&self, _messages: &[Message], _temperature: f32) -> Result<String> {
            Ok(self.classify.to_string())
        }
        async fn generate_stream(
            &self,
            _messages: &[Message],
            _temperature: f32,
            tx: mpsc::Sender<String>,
        ) -> Result<()> {
            let _ = tx.send("answer".to_string()).await;
            Ok(())
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    struct NoopRetriever;

    #[async_trait]
    impl Retriever for NoopRetriever {
        async fn retrieve(&self, _input: QueryInput, top_k: usize, _deadline: Instant) -> Result<RetrievalResult> {
            let chunk = Chunk::new("c1", "aspirin inhibits platelet aggregation", "pharm.md", vec![0.1]).unwrap();
            Ok(vec![ScoredChunk { chunk, dense_score: Some(0.9), rerank_score: None, rank: 0, source: SearchSource::Dense }]
                .into_iter()
                .take(top_k)
                .collect())
        }
        fn name(&self) -> &str {
            "noop"
        }
    }

    #[tokio::test]
    async fn emotional_agent_streams_a_response() {
        let agent = EmotionalAgent::new(Arc::new(ScriptedLlm { classify: "respond" }));
        let (tx, mut rx) = mpsc::channel(4);
        agent.run(&[Message::user("I had a rough day")], tx).await.unwrap();
        assert_eq!(rx.recv().await, Some("answer".to_string()));
    }

    #[tokio::test]
    async fn rag_agent_responds_directly_when_classified_respond() {
        let agent = RagAgent::new(Arc::new(ScriptedLlm { classify: "respond" }), Arc::new(NoopRetriever), 3, 5);
        let (tx, mut rx) = mpsc::channel(4);
        let outcome = agent
            .run(&[Message::user("thanks")], Instant::now() + std::time::Duration::from_secs(5), |_| {}, tx)
            .await
            .unwrap();
        assert!(!outcome.retrieved);
        assert!(outcome.sources.is_empty());
        assert_eq!(rx.recv().await, Some("answer".to_string()));
    }

    #[tokio::test]
    async fn rag_agent_retrieves_and_cites_sources_when_classified_retrieve() {
        let agent = RagAgent::new(Arc::new(ScriptedLlm { classify: "retrieve" }), Arc::new(NoopRetriever), 3, 5);
        let (tx, mut rx) = mpsc::channel(4);
        let mut seen_retrieval_start = false;
        let outcome = agent
            .run(
                &[Message::user("what does aspirin do")],
                Instant::now() + std::time::Duration::from_secs(5),
                |stage| {
                    if matches!(stage, RagStage::RetrievalStart) {
                        seen_retrieval_start = true;
                    }
                },
                tx,
            )
            .await
            .unwrap();
        assert!(outcome.retrieved);
        assert_eq!(outcome.sources, vec!["c1".to_string()]);
        assert!(seen_retrieval_start);
        assert_eq!(rx.recv().await, Some("answer".to_string()));
    }

    #[test]
    fn format_context_numbers_sources_from_one() {
        let chunk = Chunk::new("c1", "some medical text content", "doc.md", vec![]).unwrap();
        let scored = ScoredChunk { chunk, dense_score: Some(1.0), rerank_score: None, rank: 0, source: SearchSource::Dense };
        let (block, sources) = format_context(&[scored]);
        assert!(block.starts_with("[1] "));
        assert_eq!(sources, vec!["c1".to_string()]);
    }
}
