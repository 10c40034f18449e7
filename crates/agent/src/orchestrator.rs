//! Orchestrator (C8) — the per-request state machine, spec §4.8.
//!
//! Grounded in the general "single coordinating struct holding `Arc`s to
//! its collaborators, one async entry point, explicit session-scoped
//! locking before mutation" shape of
//! `other_examples/.../context_engine/orchest.rs`'s `ContextOrchestrator`;
//! event relaying follows the teacher's `agent.rs`
//! `broadcast::Sender<AgentEvent>` separation of concerns, downgraded to
//! `mpsc` since exactly one subscriber (the HTTP handler) exists per
//! request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use medrag_core::{
    check_ownership, AgentName, Message, Session, SessionError, SessionStore, StreamEvent,
};
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use crate::runner::{EmotionalAgent, RagAgent, RagStage};
use crate::supervisor::Supervisor;
use crate::AgentError;

/// Wall-clock budget for one full turn, spec §4.9 step 6.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

pub struct Orchestrator {
    session_store: Arc<dyn SessionStore>,
    supervisor: Supervisor,
    emotional_agent: EmotionalAgent,
    rag_agent: RagAgent,
    session_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl Orchestrator {
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        supervisor: Supervisor,
        emotional_agent: EmotionalAgent,
        rag_agent: RagAgent,
    ) -> Self {
        Self {
            session_store,
            supervisor,
            emotional_agent,
            rag_agent,
            session_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        self.session_locks.entry(session_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Run one turn: route (Supervisor classification on the first turn),
    /// then the assigned agent, streaming `StreamEvent`s to `events` as
    /// they're produced. Always persists the session before returning,
    /// whether the turn completed, errored, or was cancelled. `cancel`
    /// resolves (or its sender is dropped) when the caller has given up on
    /// the stream; the in-flight generation is abandoned and only the user
    /// message is persisted.
    pub async fn handle_turn(
        &self,
        session_id: Uuid,
        user_id: &str,
        user_message: String,
        events: mpsc::Sender<StreamEvent>,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<(), AgentError> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut session = self.session_store.get(session_id).await.map_err(session_error)?;
        check_ownership(&session, user_id).map_err(session_error)?;

        session.push_message(Message::user(user_message));

        if session.assigned_agent.is_none() {
            let first_message = session.last_user_message().unwrap_or_default().to_string();
            let name = self.supervisor.classify(&first_message).await?;
            session.assign_agent(name).map_err(|e| AgentError::Conversation(e.to_string()))?;
            // Commit the assignment before running the agent so a
            // concurrent second message for this session (once this lock
            // releases) observes it.
            self.session_store.save(session.clone()).await.map_err(session_error)?;
        }

        let deadline = Instant::now() + REQUEST_DEADLINE;
        let (token_tx, mut token_rx) = mpsc::channel::<String>(32);
        let transcript = session.transcript.clone();

        let events_for_forward = events.clone();
        let forward = async move {
            let mut response = String::new();
            while let Some(token) = token_rx.recv().await {
                response.push_str(&token);
                let _ = events_for_forward.send(StreamEvent::token(token)).await;
            }
            response
        };

        // Cloned before `run_and_forward` below borrows `session`, so the
        // cancel branch can persist it without fighting that borrow.
        let session_on_cancel = session.clone();

        let run_and_forward = async { tokio::join!(self.run_agent(&session, transcript, deadline, &events, token_tx), forward) };
        tokio::pin!(run_and_forward);

        tokio::select! {
            biased;
            _ = &mut cancel => {
                // Caller disconnected: release the session with only the
                // user message appended, dropping the in-flight generation.
                self.session_store.save(session_on_cancel).await.map_err(session_error)?;
                Err(AgentError::Cancelled)
            }
            (run, response) = &mut run_and_forward => {
                match run {
                    Ok(outcome) => {
                        if !response.is_empty() {
                            let assistant_message = Message::assistant(response)
                                .with_agent(session.assigned_agent.expect("assigned above"))
                                .with_sources(outcome.sources);
                            session.push_message(assistant_message);
                        }
                        self.session_store.save(session).await.map_err(session_error)?;
                        let _ = events.send(StreamEvent::done()).await;
                        Ok(())
                    }
                    Err(err) => {
                        // Per spec §4.9 step 9 / testable property 3: persist
                        // only the user message, never a partial assistant
                        // message.
                        self.session_store.save(session).await.map_err(session_error)?;
                        Err(err)
                    }
                }
            }
        }
    }

    async fn run_agent(
        &self,
        session: &Session,
        transcript: Vec<Message>,
        deadline: Instant,
        events: &mpsc::Sender<StreamEvent>,
        tx: mpsc::Sender<String>,
    ) -> Result<crate::runner::RagRunOutcome, AgentError> {
        match session.assigned_agent.expect("assigned before run_agent") {
            AgentName::Emotional => {
                self.emotional_agent
                    .run(&transcript, tx)
                    .await
                    .map_err(|e| AgentError::Llm(e.to_string()))?;
                Ok(crate::runner::RagRunOutcome::default())
            }
            AgentName::Rag => {
                let events = events.clone();
                let on_event = move |stage: RagStage| {
                    let events = events.clone();
                    let event = match stage {
                        RagStage::RetrievalStart => StreamEvent::retrieval_start(),
                        RagStage::RetrievalComplete(n) => StreamEvent::retrieval_complete(n),
                        RagStage::RerankingStart => StreamEvent::reranking_start(),
                        RagStage::RerankingComplete(n) => StreamEvent::reranking_complete(n),
                    };
                    // best-effort: a full channel means the client is slow,
                    // never block the generation pipeline on it.
                    let _ = events.try_send(event);
                };
                self.rag_agent
                    .run(&transcript, deadline, on_event, tx)
                    .await
                    .map_err(|e| AgentError::Llm(e.to_string()))
            }
        }
    }
}

fn session_error(err: SessionError) -> AgentError {
    match err {
        SessionError::OwnershipViolation => AgentError::OwnershipViolation,
        SessionError::Missing | SessionError::Expired => AgentError::SessionUnavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medrag_core::{AgentLlm, QueryInput, Result, RetrievalResult, Retriever};
    use std::time::Duration as StdDuration;

    struct EchoLlm;

    #[async_trait]
    impl AgentLlm for EchoLlm {
        async fn generate(&self, _messages: &[Message], _temperature: f32) -> Result<String> {
            Ok("rag".to_string())
        }
        async fn generate_stream(
            &self,
            _messages: &[Message],
            _temperature: f32,
            tx: mpsc::Sender<String>,
        ) -> Result<()> {
            let _ = tx.send("hello there".to_string()).await;
            Ok(())
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    struct NoopRetriever;

    #[async_trait]
    impl Retriever for NoopRetriever {
        async fn retrieve(&self, _input: QueryInput, _top_k: usize, _deadline: Instant) -> Result<RetrievalResult> {
            Ok(Vec::new())
        }
        fn name(&self) -> &str {
            "noop"
        }
    }

    fn build_orchestrator() -> (Orchestrator, Arc<crate::session::InMemorySessionStore>) {
        let store = crate::session::InMemorySessionStore::new(StdDuration::from_secs(3600));
        let llm: Arc<dyn AgentLlm> = Arc::new(EchoLlm);
        let supervisor = Supervisor::new(llm.clone());
        let emotional = EmotionalAgent::new(llm.clone());
        let rag = RagAgent::new(llm, Arc::new(NoopRetriever), 3, 5);
        (Orchestrator::new(store.clone(), supervisor, emotional, rag), store)
    }

    #[tokio::test]
    async fn first_turn_classifies_and_commits_assignment_before_responding() {
        let (orchestrator, store) = build_orchestrator();
        let session = store.create("user-1".to_string()).await;
        let (tx, mut rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();

        orchestrator
            .handle_turn(session.id, "user-1", "what does aspirin do".to_string(), tx, cancel_rx)
            .await
            .unwrap();

        let saved = store.get(session.id).await.unwrap();
        assert_eq!(saved.assigned_agent, Some(AgentName::Rag));

        let mut saw_done = false;
        while let Some(event) = rx.recv().await {
            if event.is_terminal() {
                saw_done = true;
            }
        }
        assert!(saw_done);
    }

    #[tokio::test]
    async fn ownership_violation_is_reported_and_rejected() {
        let (orchestrator, store) = build_orchestrator();
        let session = store.create("user-1".to_string()).await;
        let (tx, _rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();

        let result = orchestrator
            .handle_turn(session.id, "someone-else", "hi".to_string(), tx, cancel_rx)
            .await;
        assert!(matches!(result, Err(AgentError::OwnershipViolation)));
    }

    #[tokio::test]
    async fn missing_session_is_reported_as_unavailable() {
        let (orchestrator, _store) = build_orchestrator();
        let (tx, _rx) = mpsc::channel(16);
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let result = orchestrator
            .handle_turn(Uuid::new_v4(), "user-1", "hi".to_string(), tx, cancel_rx)
            .await;
        assert!(matches!(result, Err(AgentError::SessionUnavailable)));
    }

    #[tokio::test]
    async fn cancellation_persists_only_the_user_message() {
        let (orchestrator, store) = build_orchestrator();
        let session = store.create("user-1".to_string()).await;
        let (tx, _rx) = mpsc::channel(16);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        drop(cancel_tx);

        let result = orchestrator
            .handle_turn(session.id, "user-1", "what does aspirin do".to_string(), tx, cancel_rx)
            .await;
        assert!(matches!(result, Err(AgentError::Cancelled)));

        let saved = store.get(session.id).await.unwrap();
        assert_eq!(saved.transcript.len(), 1);
        assert!(saved.transcript[0].role == medrag_core::Role::User);
    }
}
