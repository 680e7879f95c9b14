//! HTTP handlers for the tutoring API.

use std::convert::Infallible;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header::RETRY_AFTER, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures_util::stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::api::{
    AgentResponse, CreateAgentRequest, CurriculumResponse, HealthResponse, StartSessionRequest,
    TeachRequest, TranscriptQuery, MAX_NAME_CHARS,
};
use super::error::ApiError;
use super::state::AppState;
use crate::knowledge::{xp_to_next_level, JAVASCRIPT_CURRICULUM};
use crate::rate_limit::RateLimitCheck;
use crate::session::{KnowledgeView, SessionError, SessionSummary};
use crate::store::{Agent, Message, TeachingSession};

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Attach `ratelimit-*` headers, plus `retry-after` once the window is spent.
pub fn apply_rate_limit_headers(res: &mut Response, check: RateLimitCheck) {
    let headers = res.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(check.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(check.remaining));
    let reset = HeaderValue::from(check.reset_after_seconds);
    if check.remaining == 0 {
        headers.insert(RETRY_AFTER, reset.clone());
    }
    headers.insert(RATE_LIMIT_RESET, reset);
}

fn agent_response(state: &AppState, agent: Agent) -> AgentResponse {
    let xp_to_next_level = xp_to_next_level(
        agent.total_xp,
        agent.level,
        state.orchestrator.thresholds(),
    );
    AgentResponse {
        agent,
        xp_to_next_level,
    }
}

/// GET /api/health - Liveness probe.
pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// GET /api/curriculum - Concepts in teaching order.
pub async fn get_curriculum() -> Json<CurriculumResponse> {
    Json(CurriculumResponse {
        concepts: JAVASCRIPT_CURRICULUM.iter().map(ToString::to_string).collect(),
    })
}

/// POST /api/agents - Create a new level 1 student.
pub async fn create_agent(
    State(state): State<AppState>,
    payload: Result<Json<CreateAgentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AgentResponse>), ApiError> {
    let Json(request) = payload?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Agent name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Agent name must be at most {MAX_NAME_CHARS} characters"
        )));
    }

    let agent = Agent::new(name, request.personality.trim());
    state.orchestrator.store().create_agent(&agent).await?;
    tracing::info!(agent_id = %agent.id, name = %agent.name, "Agent created");

    Ok((StatusCode::CREATED, Json(agent_response(&state, agent))))
}

/// GET /api/agents - All agents.
pub async fn list_agents(State(state): State<AppState>) -> ApiResult<Vec<AgentResponse>> {
    let agents = state.orchestrator.store().list_agents().await?;
    Ok(Json(
        agents
            .into_iter()
            .map(|agent| agent_response(&state, agent))
            .collect(),
    ))
}

/// GET /api/agents/{id} - One agent with progress towards its next level.
pub async fn get_agent(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<AgentResponse> {
    let Path(agent_id) = id?;
    let agent = state.orchestrator.store().get_agent(agent_id).await?;
    Ok(Json(agent_response(&state, agent)))
}

/// GET /api/agents/{id}/knowledge - Decay-corrected knowledge.
pub async fn get_knowledge(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<KnowledgeView>> {
    let Path(agent_id) = id?;
    let snapshot = state
        .orchestrator
        .knowledge_snapshot(agent_id, Utc::now())
        .await?;
    Ok(Json(snapshot))
}

/// POST /api/agents/{id}/sessions - Start teaching a concept.
pub async fn start_session(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<StartSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TeachingSession>), ApiError> {
    let Path(agent_id) = id?;
    let Json(request) = payload?;
    let session = state
        .orchestrator
        .start_session(agent_id, &request.concept)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/sessions/{id} - One session.
pub async fn get_session(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<TeachingSession> {
    let Path(session_id) = id?;
    let session = state.orchestrator.store().get_session(session_id).await?;
    Ok(Json(session))
}

/// GET /api/sessions/{id}/messages - Transcript, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    Query(query): Query<TranscriptQuery>,
) -> ApiResult<Vec<Message>> {
    let Path(session_id) = id?;
    let store = state.orchestrator.store();
    store.get_session(session_id).await?;
    let messages = store
        .list_messages(session_id, query.effective_limit())
        .await?;
    Ok(Json(messages))
}

/// POST /api/sessions/{id}/messages - Teach one turn.
pub async fn teach(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<TeachRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Path(session_id) = id?;
    let Json(request) = payload?;
    if request.message.trim().is_empty() {
        return Err(SessionError::EmptyMessage.into());
    }

    // Only turns that would reach the student count against the quota.
    let check = match &state.limiter {
        Some(limiter) => {
            let session = state.orchestrator.store().get_session(session_id).await?;
            if !session.is_open() {
                return Err(SessionError::SessionClosed(session_id).into());
            }
            let check = limiter.check(&format!("agent:{}", session.agent_id)).await;
            if !check.allowed {
                tracing::warn!(agent_id = %session.agent_id, "Teaching turn rate limited");
                return Err(ApiError::RateLimited(check));
            }
            Some(check)
        }
        None => None,
    };

    let outcome = state
        .orchestrator
        .teach(session_id, &request.message)
        .await?;

    let mut response = Json(outcome).into_response();
    if let Some(check) = check {
        apply_rate_limit_headers(&mut response, check);
    }
    Ok(response)
}

/// POST /api/sessions/{id}/end - Close a session.
pub async fn end_session(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<SessionSummary> {
    let Path(session_id) = id?;
    let summary = state.orchestrator.end_session(session_id).await?;
    Ok(Json(summary))
}

/// GET /api/events - SSE stream of progress events.
pub async fn get_events_sse(
    State(state): State<AppState>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => {
                let data = serde_json::to_string(&event).ok()?;
                Some(Ok(Event::default().event(&event.event_type).data(data)))
            }
            Err(_) => None, // Skip lagged messages
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
