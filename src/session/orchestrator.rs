//! Session orchestrator that runs teaching turns.
//!
//! A turn loads the student's decay-corrected understanding, asks the
//! generator for an in-character reply under a timeout, and persists the
//! learning outcome atomically. Generator failures degrade to a fixed
//! fallback reply and never touch knowledge or XP.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::error::SessionError;
use super::events::ProgressEvent;
use crate::ai::{StudentContext, StudentGenerator, StudentReply};
use crate::config::TutorConfig;
use crate::knowledge::{
    canonical_concept, concept_index, days_since, should_decay, ConceptKnowledge,
    MASTERY_THRESHOLD,
};
use crate::store::{Agent, Message, PupilStore, TeachingSession, TurnCommit};

/// Outcome of one teaching turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub reply: StudentReply,
    /// Decay-corrected understanding before the turn.
    pub previous_level: f64,
    /// Understanding after the turn.
    pub new_level: f64,
    pub xp_awarded: u64,
    /// Whether this turn paid the mastery bonus.
    pub mastery_reached: bool,
    /// Agent level after the turn.
    pub level: u32,
    pub total_xp: u64,
    pub leveled_up: bool,
    /// Whether the generator failed and the fixed fallback was used.
    pub fallback: bool,
}

/// Summary returned when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session: TeachingSession,
    pub level: u32,
    pub total_xp: u64,
    /// Decay-corrected understanding of the session's concept at close.
    pub understanding_level: f64,
}

/// Decay-corrected view of one knowledge row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeView {
    pub concept: String,
    /// Understanding after forgetting is applied.
    pub understanding_level: f64,
    /// Understanding as last persisted.
    pub stored_level: f64,
    pub examples_seen: u32,
    pub last_reviewed: DateTime<Utc>,
    pub days_since_review: i64,
    /// Whether the row is past its grace period.
    pub decaying: bool,
    /// Whether the current understanding is at or above mastery.
    pub mastered: bool,
}

impl KnowledgeView {
    /// View `row` as of `now`.
    #[must_use]
    pub fn from_row(row: &ConceptKnowledge, now: DateTime<Utc>) -> Self {
        let understanding_level = row.decayed(now).understanding_level;
        Self {
            concept: row.concept.clone(),
            understanding_level,
            stored_level: row.understanding_level,
            examples_seen: row.examples_seen,
            last_reviewed: row.last_reviewed,
            days_since_review: days_since(row.last_reviewed, now),
            decaying: should_decay(row.last_reviewed, now),
            mastered: understanding_level >= MASTERY_THRESHOLD,
        }
    }
}

/// Coordinates the store, the student generator, and progress events.
pub struct Orchestrator<G: ?Sized> {
    store: PupilStore,
    generator: Arc<G>,
    thresholds: Vec<u64>,
    generation_timeout: Duration,
    history_messages: usize,
    events: Option<broadcast::Sender<ProgressEvent>>,
}

impl<G: ?Sized> Clone for Orchestrator<G> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            generator: Arc::clone(&self.generator),
            thresholds: self.thresholds.clone(),
            generation_timeout: self.generation_timeout,
            history_messages: self.history_messages,
            events: self.events.clone(),
        }
    }
}

impl<G: StudentGenerator + ?Sized> Orchestrator<G> {
    /// Create an orchestrator using the tutor settings.
    #[must_use]
    pub fn new(store: PupilStore, generator: Arc<G>, tutor: &TutorConfig) -> Self {
        Self {
            store,
            generator,
            thresholds: tutor.level_thresholds.clone(),
            generation_timeout: tutor.generation_timeout(),
            history_messages: tutor.history_messages,
            events: None,
        }
    }

    /// Broadcast progress events on `sender`.
    #[must_use]
    pub fn with_events(mut self, sender: broadcast::Sender<ProgressEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Override the generation timeout.
    #[must_use]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &PupilStore {
        &self.store
    }

    /// Level thresholds in use.
    #[must_use]
    pub fn thresholds(&self) -> &[u64] {
        &self.thresholds
    }

    /// Start a session teaching `concept` to an agent.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownConcept` for concepts outside the
    /// curriculum, or a store error if the agent does not exist.
    pub async fn start_session(
        &self,
        agent_id: Uuid,
        concept: &str,
    ) -> Result<TeachingSession, SessionError> {
        let concept = canonical_concept(concept)
            .ok_or_else(|| SessionError::UnknownConcept(concept.trim().to_string()))?;

        let session = TeachingSession::new(agent_id, concept);
        self.store.start_session(&session).await?;

        tracing::info!(
            session_id = %session.id,
            agent_id = %agent_id,
            concept,
            "Teaching session started"
        );
        self.emit(ProgressEvent::new(
            ProgressEvent::SESSION_STARTED,
            serde_json::json!({
                "session_id": session.id,
                "agent_id": agent_id,
                "concept": concept,
            }),
        ));

        Ok(session)
    }

    /// Run one teaching turn.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyMessage` for blank input,
    /// `SessionError::SessionClosed` if the session has ended, or a store
    /// error. Generator failures are not errors; they yield the fallback reply.
    pub async fn teach(
        &self,
        session_id: Uuid,
        teacher_message: &str,
    ) -> Result<TurnOutcome, SessionError> {
        let content = teacher_message.trim();
        if content.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let session = self.store.get_session(session_id).await?;
        if !session.is_open() {
            return Err(SessionError::SessionClosed(session_id));
        }
        let agent = self.store.get_agent(session.agent_id).await?;

        let (understanding_level, examples_seen) = self
            .store
            .get_knowledge(agent.id, &session.concept)
            .await?
            .map_or((0.0, 0), |row| {
                (
                    row.decayed(Utc::now()).understanding_level,
                    row.examples_seen,
                )
            });

        let history = self
            .store
            .list_messages(session_id, self.history_messages)
            .await?;
        self.store
            .append_message(&Message::teacher(session_id, content))
            .await?;

        let context = StudentContext {
            name: agent.name.clone(),
            personality: agent.personality.clone(),
            concept: session.concept.clone(),
            understanding_level,
            examples_seen,
            level: agent.level,
        };

        let generated = tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(content, &context, &history),
        )
        .await;

        match generated {
            Ok(Ok(reply)) => self.commit_reply(&session, reply).await,
            Ok(Err(e)) => {
                tracing::warn!(session_id = %session_id, error = %e, "Student generation failed");
                self.fallback(&session, &agent, understanding_level).await
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %session_id,
                    timeout_secs = self.generation_timeout.as_secs(),
                    "Student generation timed out"
                );
                self.fallback(&session, &agent, understanding_level).await
            }
        }
    }

    async fn commit_reply(
        &self,
        session: &TeachingSession,
        reply: StudentReply,
    ) -> Result<TurnOutcome, SessionError> {
        let student_message = Message::student(
            session.id,
            reply.message.clone(),
            reply.emotion,
            reply.understanding_delta,
        );
        let record = self
            .store
            .commit_turn(
                TurnCommit {
                    session_id: session.id,
                    agent_id: session.agent_id,
                    concept: session.concept.clone(),
                    emotion: reply.emotion,
                    understanding_delta: reply.understanding_delta,
                    student_message,
                    now: Utc::now(),
                },
                &self.thresholds,
            )
            .await?;

        let interaction = &record.interaction;
        let award = record.award;
        tracing::info!(
            session_id = %session.id,
            agent_id = %session.agent_id,
            concept = %session.concept,
            emotion = %reply.emotion,
            previous_level = interaction.previous_level,
            new_level = interaction.new_level,
            xp = award.xp_awarded,
            "Teaching turn recorded"
        );

        let outcome = TurnOutcome {
            previous_level: interaction.previous_level,
            new_level: interaction.new_level,
            xp_awarded: award.xp_awarded,
            mastery_reached: interaction.mastery_bonus > 0,
            level: award.level,
            total_xp: award.total_xp,
            leveled_up: award.leveled_up,
            fallback: false,
            reply,
        };

        self.emit(ProgressEvent::new(
            ProgressEvent::TURN_COMPLETED,
            serde_json::json!({
                "session_id": session.id,
                "agent_id": session.agent_id,
                "concept": session.concept,
                "emotion": outcome.reply.emotion,
                "previous_level": outcome.previous_level,
                "new_level": outcome.new_level,
                "xp_awarded": outcome.xp_awarded,
                "mastery_reached": outcome.mastery_reached,
            }),
        ));
        if outcome.leveled_up {
            self.emit(ProgressEvent::new(
                ProgressEvent::LEVEL_UP,
                serde_json::json!({
                    "agent_id": session.agent_id,
                    "level": outcome.level,
                    "total_xp": outcome.total_xp,
                }),
            ));
        }

        Ok(outcome)
    }

    /// Record the fallback reply without touching knowledge or XP.
    async fn fallback(
        &self,
        session: &TeachingSession,
        agent: &Agent,
        understanding_level: f64,
    ) -> Result<TurnOutcome, SessionError> {
        let reply = StudentReply::fallback();
        self.store
            .append_message(&Message::student(
                session.id,
                reply.message.clone(),
                reply.emotion,
                reply.understanding_delta,
            ))
            .await?;

        Ok(TurnOutcome {
            reply,
            previous_level: understanding_level,
            new_level: understanding_level,
            xp_awarded: 0,
            mastery_reached: false,
            level: agent.level,
            total_xp: agent.total_xp,
            leveled_up: false,
            fallback: true,
        })
    }

    /// End a session. Ending an already ended session returns its summary again.
    ///
    /// # Errors
    ///
    /// Returns a store error if the session or its agent does not exist.
    pub async fn end_session(&self, session_id: Uuid) -> Result<SessionSummary, SessionError> {
        let was_open = self.store.get_session(session_id).await?.is_open();
        let now = Utc::now();
        let session = self.store.end_session(session_id, now).await?;
        let agent = self.store.get_agent(session.agent_id).await?;
        let understanding_level = self
            .store
            .get_knowledge(agent.id, &session.concept)
            .await?
            .map_or(0.0, |row| row.decayed(now).understanding_level);

        if was_open {
            tracing::info!(
                session_id = %session_id,
                turns = session.turns,
                xp_earned = session.xp_earned,
                "Teaching session ended"
            );
            self.emit(ProgressEvent::new(
                ProgressEvent::SESSION_ENDED,
                serde_json::json!({
                    "session_id": session_id,
                    "agent_id": session.agent_id,
                    "turns": session.turns,
                    "xp_earned": session.xp_earned,
                }),
            ));
        }

        Ok(SessionSummary {
            session,
            level: agent.level,
            total_xp: agent.total_xp,
            understanding_level,
        })
    }

    /// Decay-corrected knowledge of an agent as of `now`, in curriculum order.
    /// Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns a store error if the agent does not exist.
    pub async fn knowledge_snapshot(
        &self,
        agent_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<KnowledgeView>, SessionError> {
        self.store.get_agent(agent_id).await?;
        let mut rows = self.store.list_knowledge(agent_id).await?;
        rows.sort_by_key(|row| concept_index(&row.concept).unwrap_or(usize::MAX));
        Ok(rows
            .iter()
            .map(|row| KnowledgeView::from_row(row, now))
            .collect())
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.events {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiError, FALLBACK_MESSAGE};
    use crate::knowledge::Emotion;
    use crate::store::{Role, StoreError};
    use async_trait::async_trait;

    enum Script {
        Reply(Emotion, f64),
        Fail,
        Hang,
    }

    struct FakeGenerator(Script);

    #[async_trait]
    impl StudentGenerator for FakeGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            context: &StudentContext,
            _history: &[Message],
        ) -> Result<StudentReply, AiError> {
            match self.0 {
                Script::Reply(emotion, delta) => Ok(StudentReply::new(
                    format!("I think I get {}", context.concept),
                    emotion,
                    delta,
                )),
                Script::Fail => Err(AiError::RequestFailed("HTTP 503".to_string())),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(AiError::Timeout)
                }
            }
        }
    }

    async fn setup(script: Script) -> (Orchestrator<FakeGenerator>, Agent) {
        let store = PupilStore::open_in_memory().await.unwrap();
        let agent = Agent::new("Pip", "Curious");
        store.create_agent(&agent).await.unwrap();
        let orchestrator = Orchestrator::new(
            store,
            Arc::new(FakeGenerator(script)),
            &TutorConfig::default(),
        )
        .with_generation_timeout(Duration::from_millis(100));
        (orchestrator, agent)
    }

    #[tokio::test]
    async fn test_start_session_canonicalizes_concept() {
        let (orchestrator, agent) = setup(Script::Fail).await;
        let session = orchestrator
            .start_session(agent.id, "  async/await ")
            .await
            .unwrap();
        assert_eq!(session.concept, "Async/Await");
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn test_start_session_unknown_concept() {
        let (orchestrator, agent) = setup(Script::Fail).await;
        let result = orchestrator.start_session(agent.id, "Monads").await;
        assert!(matches!(result, Err(SessionError::UnknownConcept(c)) if c == "Monads"));
    }

    #[tokio::test]
    async fn test_start_session_unknown_agent() {
        let (orchestrator, _) = setup(Script::Fail).await;
        let result = orchestrator.start_session(Uuid::new_v4(), "Loops").await;
        assert!(matches!(
            result,
            Err(SessionError::Store(StoreError::AgentNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_teach_success_updates_knowledge_and_xp() {
        let (orchestrator, agent) = setup(Script::Reply(Emotion::Excited, 0.3)).await;
        let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();

        let outcome = orchestrator
            .teach(session.id, "A for loop repeats a block.")
            .await
            .unwrap();

        assert!(!outcome.fallback);
        assert!(outcome.previous_level.abs() < 1e-9);
        assert!((outcome.new_level - 0.3).abs() < 1e-9);
        assert_eq!(outcome.xp_awarded, 10);
        assert_eq!(outcome.total_xp, 10);
        assert_eq!(outcome.level, 1);

        let stored = orchestrator.store().get_session(session.id).await.unwrap();
        assert_eq!(stored.turns, 1);
        assert_eq!(stored.xp_earned, 10);

        let messages = orchestrator
            .store()
            .list_messages(session.id, 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Teacher);
        assert_eq!(messages[1].emotion, Some(Emotion::Excited));
    }

    #[tokio::test]
    async fn test_teach_pays_mastery_bonus_once() {
        let (orchestrator, agent) = setup(Script::Reply(Emotion::Understanding, 0.4)).await;
        let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();

        let first = orchestrator.teach(session.id, "one").await.unwrap();
        let second = orchestrator.teach(session.id, "two").await.unwrap();
        let third = orchestrator.teach(session.id, "three").await.unwrap();

        assert!(!first.mastery_reached);
        assert!(second.mastery_reached);
        assert_eq!(second.xp_awarded, 55);
        assert!(!third.mastery_reached);
        assert_eq!(third.xp_awarded, 5);
        assert_eq!(third.total_xp, 65);
    }

    #[tokio::test]
    async fn test_teach_failure_falls_back_without_mutation() {
        let (orchestrator, agent) = setup(Script::Fail).await;
        let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();

        let outcome = orchestrator.teach(session.id, "Hello").await.unwrap();

        assert!(outcome.fallback);
        assert_eq!(outcome.reply.message, FALLBACK_MESSAGE);
        assert_eq!(outcome.reply.emotion, Emotion::Neutral);
        assert_eq!(outcome.xp_awarded, 0);

        let store = orchestrator.store();
        assert!(store.get_knowledge(agent.id, "Loops").await.unwrap().is_none());
        assert_eq!(store.get_agent(agent.id).await.unwrap().total_xp, 0);
        assert_eq!(store.get_session(session.id).await.unwrap().turns, 0);
        assert_eq!(store.list_messages(session.id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_teach_timeout_falls_back() {
        let (orchestrator, agent) = setup(Script::Hang).await;
        let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();

        let outcome = orchestrator.teach(session.id, "Hello").await.unwrap();
        assert!(outcome.fallback);
        assert_eq!(
            orchestrator.store().get_agent(agent.id).await.unwrap().total_xp,
            0
        );
    }

    #[tokio::test]
    async fn test_teach_rejects_empty_message() {
        let (orchestrator, agent) = setup(Script::Fail).await;
        let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();
        let result = orchestrator.teach(session.id, "   ").await;
        assert!(matches!(result, Err(SessionError::EmptyMessage)));
    }

    #[tokio::test]
    async fn test_teach_closed_session() {
        let (orchestrator, agent) = setup(Script::Reply(Emotion::Neutral, 0.1)).await;
        let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();
        orchestrator.end_session(session.id).await.unwrap();

        let result = orchestrator.teach(session.id, "Still there?").await;
        assert!(matches!(result, Err(SessionError::SessionClosed(id)) if id == session.id));
    }

    #[tokio::test]
    async fn test_end_session_summary() {
        let (orchestrator, agent) = setup(Script::Reply(Emotion::Understanding, 0.2)).await;
        let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();
        orchestrator.teach(session.id, "Explain").await.unwrap();

        let summary = orchestrator.end_session(session.id).await.unwrap();
        assert!(!summary.session.is_open());
        assert_eq!(summary.session.turns, 1);
        assert_eq!(summary.total_xp, 5);
        assert!((summary.understanding_level - 0.2).abs() < 1e-9);

        let again = orchestrator.end_session(session.id).await.unwrap();
        assert_eq!(again.session.ended_at, summary.session.ended_at);
    }

    #[tokio::test]
    async fn test_teach_emits_events() {
        let (orchestrator, agent) = setup(Script::Reply(Emotion::Excited, 0.1)).await;
        let (tx, mut rx) = broadcast::channel(16);
        let orchestrator = orchestrator.with_events(tx);

        let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();
        orchestrator.teach(session.id, "Hi").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().event_type, ProgressEvent::SESSION_STARTED);
        let turn = rx.recv().await.unwrap();
        assert_eq!(turn.event_type, ProgressEvent::TURN_COMPLETED);
        assert_eq!(turn.data["xp_awarded"], 10);
    }

    #[tokio::test]
    async fn test_knowledge_snapshot_applies_decay() {
        let (orchestrator, agent) = setup(Script::Reply(Emotion::Neutral, 0.8)).await;
        let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();
        orchestrator.teach(session.id, "Loops!").await.unwrap();

        let later = Utc::now() + chrono::Duration::days(4) + chrono::Duration::hours(1);
        let snapshot = orchestrator
            .knowledge_snapshot(agent.id, later)
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 1);
        let view = &snapshot[0];
        assert!((view.stored_level - 0.8).abs() < 1e-9);
        assert!((view.understanding_level - 0.76).abs() < 1e-9);
        assert!(view.decaying);
        assert!(view.mastered);
        assert_eq!(view.days_since_review, 4);

        let stored = orchestrator
            .store()
            .get_knowledge(agent.id, "Loops")
            .await
            .unwrap()
            .unwrap();
        assert!((stored.understanding_level - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_knowledge_snapshot_unknown_agent() {
        let (orchestrator, _) = setup(Script::Fail).await;
        let result = orchestrator
            .knowledge_snapshot(Uuid::new_v4(), Utc::now())
            .await;
        assert!(result.is_err_and(|e| e.is_not_found()));
    }
}
