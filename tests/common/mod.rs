//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ai_pupil::ai::{AiError, StudentContext, StudentGenerator, StudentReply};
use ai_pupil::config::{RateLimitConfig, TutorConfig};
use ai_pupil::knowledge::Emotion;
use ai_pupil::server::{AppState, PupilServer};
use ai_pupil::store::{Message, PupilStore};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;

/// Generator that plays back a fixed script, then fails.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<StudentReply, AiError>>>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<StudentContext>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, emotion: Emotion, delta: f64) -> Self {
        self.push(Ok(StudentReply::new(
            format!("({emotion}) I think I follow"),
            emotion,
            delta,
        )))
    }

    pub fn fail(self, error: AiError) -> Self {
        self.push(Err(error))
    }

    fn push(self, item: Result<StudentReply, AiError>) -> Self {
        self.script.lock().unwrap().push_back(item);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<StudentContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StudentGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        context: &StudentContext,
        _history: &[Message],
    ) -> Result<StudentReply, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::RequestFailed("script exhausted".to_string())))
    }
}

/// In-memory app state wired to `generator`.
pub async fn create_test_state(
    generator: Arc<ScriptedGenerator>,
    rate_limit: RateLimitConfig,
) -> AppState {
    let store = PupilStore::open_in_memory().await.unwrap();
    AppState::new(store, generator, &TutorConfig::default(), &rate_limit)
}

/// Router over a fresh in-memory state.
pub async fn create_test_app(generator: Arc<ScriptedGenerator>) -> Router {
    let state = create_test_state(generator, RateLimitConfig::default()).await;
    PupilServer::new(state).build_router()
}

pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
