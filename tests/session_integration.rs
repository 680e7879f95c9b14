//! Integration tests for the session orchestrator over an on-disk store.

use std::sync::{Arc, Mutex};

use ai_pupil::ai::{AiError, StudentContext, StudentGenerator, StudentReply, FALLBACK_MESSAGE};
use ai_pupil::config::TutorConfig;
use ai_pupil::knowledge::Emotion;
use ai_pupil::session::{Orchestrator, SessionError};
use ai_pupil::store::{Agent, Message, PupilStore};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

mod common;

use common::ScriptedGenerator;

async fn open_store(dir: &tempfile::TempDir) -> PupilStore {
    PupilStore::open(dir.path().join("nested").join("pupil.db"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_prompt_sees_decayed_understanding() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let agent = Agent::new("Pip", "Curious");
    store.create_agent(&agent).await.unwrap();

    let reviewed = Utc::now() - Duration::days(10) - Duration::hours(1);
    store
        .record_interaction(agent.id, "Loops", 0.5, reviewed)
        .await
        .unwrap();

    let generator = Arc::new(ScriptedGenerator::new().reply(Emotion::Understanding, 0.1));
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::clone(&generator),
        &TutorConfig::default(),
    );
    let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();
    let outcome = orchestrator.teach(session.id, "Remember loops?").await.unwrap();

    let contexts = generator.contexts();
    assert_eq!(contexts.len(), 1);
    assert!((contexts[0].understanding_level - 0.15).abs() < 1e-9);
    assert_eq!(contexts[0].examples_seen, 1);

    assert!((outcome.previous_level - 0.15).abs() < 1e-9);
    assert!((outcome.new_level - 0.25).abs() < 1e-9);

    let row = store.get_knowledge(agent.id, "Loops").await.unwrap().unwrap();
    assert!((row.understanding_level - 0.25).abs() < 1e-9);
    assert_eq!(row.examples_seen, 2);
}

#[tokio::test]
async fn test_failure_leaves_existing_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let agent = Agent::new("Pip", "Curious");
    store.create_agent(&agent).await.unwrap();

    let generator = Arc::new(
        ScriptedGenerator::new()
            .reply(Emotion::Excited, 0.3)
            .fail(AiError::RequestFailed("HTTP 502".to_string()))
            .fail(AiError::ParseError("no JSON".to_string())),
    );
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::clone(&generator),
        &TutorConfig::default(),
    );
    let session = orchestrator.start_session(agent.id, "Arrays").await.unwrap();
    orchestrator.teach(session.id, "Arrays hold lists.").await.unwrap();

    let before_row = store.get_knowledge(agent.id, "Arrays").await.unwrap().unwrap();
    let before_agent = store.get_agent(agent.id).await.unwrap();

    for prompt in ["Indexes start at zero.", "push adds to the end."] {
        let outcome = orchestrator.teach(session.id, prompt).await.unwrap();
        assert!(outcome.fallback);
        assert_eq!(outcome.reply.message, FALLBACK_MESSAGE);
        assert_eq!(outcome.total_xp, before_agent.total_xp);
    }

    let after_row = store.get_knowledge(agent.id, "Arrays").await.unwrap().unwrap();
    let after_agent = store.get_agent(agent.id).await.unwrap();
    assert_eq!(after_row, before_row);
    assert_eq!(after_agent, before_agent);

    let session = store.get_session(session.id).await.unwrap();
    assert_eq!(session.turns, 1);
    assert_eq!(session.xp_earned, 10);
    assert_eq!(store.list_messages(session.id, 100).await.unwrap().len(), 6);
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn test_level_up_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let agent = Agent::new("Pip", "Curious");
    store.create_agent(&agent).await.unwrap();

    let mut generator = ScriptedGenerator::new();
    for _ in 0..30 {
        generator = generator.reply(Emotion::Excited, 0.0);
    }
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(generator),
        &TutorConfig::default(),
    );
    let session = orchestrator
        .start_session(agent.id, "Functions")
        .await
        .unwrap();

    let mut level_ups = Vec::new();
    for i in 0..30 {
        let outcome = orchestrator
            .teach(session.id, &format!("example {i}"))
            .await
            .unwrap();
        if outcome.leveled_up {
            level_ups.push((i, outcome.level, outcome.total_xp));
        }
    }

    assert_eq!(level_ups, vec![(29, 2, 300)]);
    let agent = store.get_agent(agent.id).await.unwrap();
    assert_eq!(agent.level, 2);
    assert_eq!(agent.total_xp, 300);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Agent::new("Pip", "Curious");
    {
        let store = open_store(&dir).await;
        store.create_agent(&agent).await.unwrap();
        let orchestrator = Orchestrator::new(
            store,
            Arc::new(ScriptedGenerator::new().reply(Emotion::Understanding, 0.2)),
            &TutorConfig::default(),
        );
        let session = orchestrator
            .start_session(agent.id, "Variables")
            .await
            .unwrap();
        orchestrator.teach(session.id, "let x = 1;").await.unwrap();
    }

    let store = open_store(&dir).await;
    let agent = store.get_agent(agent.id).await.unwrap();
    assert_eq!(agent.total_xp, 5);
    let rows = store.list_knowledge(agent.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].concept, "Variables");
}

/// Ends the session while the reply is still being produced.
struct ClosingGenerator {
    store: PupilStore,
    session: Mutex<Option<Uuid>>,
}

#[async_trait]
impl StudentGenerator for ClosingGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _context: &StudentContext,
        _history: &[Message],
    ) -> Result<StudentReply, AiError> {
        let session_id = self.session.lock().unwrap().expect("session set before teaching");
        self.store.end_session(session_id, Utc::now()).await.unwrap();
        Ok(StudentReply::new("Got it!", Emotion::Excited, 0.4))
    }
}

#[tokio::test]
async fn test_session_ended_during_generation_is_not_credited() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let agent = Agent::new("Pip", "Curious");
    store.create_agent(&agent).await.unwrap();

    let generator = Arc::new(ClosingGenerator {
        store: store.clone(),
        session: Mutex::new(None),
    });
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::clone(&generator),
        &TutorConfig::default(),
    );
    let session = orchestrator.start_session(agent.id, "Loops").await.unwrap();
    *generator.session.lock().unwrap() = Some(session.id);

    let result = orchestrator.teach(session.id, "A loop repeats code.").await;
    assert!(matches!(result, Err(SessionError::SessionClosed(id)) if id == session.id));

    assert!(store.get_knowledge(agent.id, "Loops").await.unwrap().is_none());
    assert_eq!(store.get_agent(agent.id).await.unwrap().total_xp, 0);
    let stored = store.get_session(session.id).await.unwrap();
    assert_eq!(stored.turns, 0);
    assert!(stored.ended_at.is_some());
}
