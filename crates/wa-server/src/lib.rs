// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP/JSON and SSE surface over a [`wa_runner::MatchRunner`]: match
//! creation and lookup, live event tailing, derived artifacts, and the
//! judging package.

pub mod artifacts;
pub mod config;

use axum::extract::{Path as AxPath, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;
use wa_contracts::{Canon, Challenge, Match, MatchStatus, PromptPack, TeamId, Tier};
use wa_judging::{BlindJudgingPackage, JudgingScoreRecord, ScoreSubmission};
use wa_runner::MatchRunner;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Owns match creation, phase-barrier orchestration, and the event log.
    pub runner: MatchRunner,
    /// Blind-ID assignment and score persistence.
    pub judging: Arc<wa_judging::JudgingStore>,
}

/// Uniform JSON error body, matching every non-2xx response from this
/// service.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<wa_runner::RunnerError> for ApiError {
    fn from(err: wa_runner::RunnerError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<wa_hub::HubError> for ApiError {
    fn from(err: wa_hub::HubError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<wa_eventlog::EventLogError> for ApiError {
    fn from(err: wa_eventlog::EventLogError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<wa_judging::JudgingError> for ApiError {
    fn from(err: wa_judging::JudgingError) -> Self {
        match err {
            wa_judging::JudgingError::ScoreOutOfRange(_) | wa_judging::JudgingError::UnknownBlindId(_) => {
                ApiError::bad_request(err.to_string())
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<artifacts::FoldError> for ApiError {
    fn from(err: artifacts::FoldError) -> Self {
        ApiError::internal(err.to_string())
    }
}

/// `POST /matches` request body.
#[derive(Debug, Deserialize)]
pub struct CreateMatchRequest {
    /// Explicit seed; derived from system entropy if absent.
    pub seed: Option<u64>,
    /// The match's tier, `1..=3`.
    pub tier: u8,
}

/// A match's list-view summary.
#[derive(Debug, Serialize)]
pub struct MatchSummary {
    /// The match's id.
    pub id: Uuid,
    /// The seed this match was created (or derived) with.
    pub seed: u64,
    /// The match's tier.
    pub tier: Tier,
    /// Current lifecycle status.
    pub status: MatchStatus,
    /// Creation timestamp.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Completion timestamp, if terminal.
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A match's full detail view, including its challenge and any terminal
/// failure reason.
#[derive(Debug, Serialize)]
pub struct MatchDetail {
    #[serde(flatten)]
    summary: MatchSummary,
    /// The match's challenge, once revealed.
    pub challenge: Option<Challenge>,
    /// Team A's final canon hash, once completed.
    pub final_canon_hash_a: Option<String>,
    /// Team B's final canon hash, once completed.
    pub final_canon_hash_b: Option<String>,
    /// Failure reason, set only once `status == failed`.
    pub error: Option<String>,
}

impl From<Match> for MatchDetail {
    fn from(m: Match) -> Self {
        MatchDetail {
            summary: MatchSummary {
                id: m.id,
                seed: m.seed,
                tier: m.tier,
                status: m.status,
                created_at: m.created_at,
                completed_at: m.completed_at,
            },
            challenge: m.challenge,
            final_canon_hash_a: m.final_canon_hash_a,
            final_canon_hash_b: m.final_canon_hash_b,
            error: m.error,
        }
    }
}

impl From<Match> for MatchSummary {
    fn from(m: Match) -> Self {
        MatchSummary {
            id: m.id,
            seed: m.seed,
            tier: m.tier,
            status: m.status,
            created_at: m.created_at,
            completed_at: m.completed_at,
        }
    }
}

/// One team's artifacts, as derived from its event log fold.
#[derive(Debug, Serialize, Default)]
pub struct TeamArtifactsResponse {
    /// The team's canon, if `canon_initialized` has been seen.
    pub canon: Option<Canon>,
    /// The team's prompt pack, if `prompt_pack_generated` has been seen.
    pub prompt_pack: Option<PromptPack>,
}

/// `GET /matches/{id}/artifacts` response body.
#[derive(Debug, Serialize)]
pub struct ArtifactsResponse {
    /// Team A's artifacts.
    pub team_a: TeamArtifactsResponse,
    /// Team B's artifacts.
    pub team_b: TeamArtifactsResponse,
}

/// `GET /matches/{id}/events` query string.
#[derive(Debug, Deserialize, Default)]
pub struct EventsQuery {
    /// Resume point; only events with `seq > after` are delivered.
    #[serde(default)]
    pub after: i64,
}

/// Build the Axum router with every route this surface exposes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/matches", post(cmd_create_match).get(cmd_list_matches))
        .route("/matches/{id}", get(cmd_get_match))
        .route("/matches/{id}/events", get(cmd_match_events))
        .route("/matches/{id}/artifacts", get(cmd_artifacts))
        .route("/matches/{id}/judging/blind", get(cmd_judging_blind))
        .route(
            "/matches/{id}/judging/scores",
            post(cmd_submit_score).get(cmd_list_scores),
        )
        .route("/matches/{id}/judging/reveal", get(cmd_judging_reveal))
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "contract_version": wa_contracts::CONTRACT_VERSION,
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn cmd_create_match(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMatchRequest>,
) -> Result<(StatusCode, Json<MatchSummary>), ApiError> {
    let tier = Tier::try_from(req.tier).map_err(|t| ApiError::bad_request(format!("tier {t} is not in 1..=3")))?;
    let created = state.runner.create(req.seed, tier).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn cmd_list_matches(State(state): State<Arc<AppState>>) -> Result<Json<Vec<MatchSummary>>, ApiError> {
    let matches = state.runner.list_matches().await?;
    Ok(Json(matches.into_iter().map(Into::into).collect()))
}

async fn cmd_get_match(
    AxPath(id): AxPath<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<MatchDetail>, ApiError> {
    let m = state
        .runner
        .get_match(id)
        .await?
        .ok_or_else(|| ApiError::not_found("match not found"))?;
    Ok(Json(m.into()))
}

async fn cmd_match_events(
    AxPath(id): AxPath<Uuid>,
    Query(q): Query<EventsQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if state.runner.get_match(id).await?.is_none() {
        return Err(ApiError::not_found("match not found"));
    }

    let mut subscription = state.runner.subscribe(id, q.after).await?;
    let (tx, rx) = tokio::sync::mpsc::channel(64);

    tokio::spawn(async move {
        loop {
            match subscription.next().await {
                Ok(Some(event)) => {
                    let terminal = matches!(
                        event.kind,
                        wa_contracts::MatchEventKind::MatchCompleted { .. }
                            | wa_contracts::MatchEventKind::MatchFailed { .. }
                    );
                    let payload = match serde_json::to_string(&event) {
                        Ok(p) => p,
                        Err(err) => {
                            tracing::error!(match_id = %id, error = %err, "failed to serialize match event");
                            break;
                        }
                    };
                    if tx.send(Ok(SseEvent::default().data(payload))).await.is_err() {
                        break;
                    }
                    if terminal {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(match_id = %id, error = %err, "event subscription ended");
                    break;
                }
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

async fn cmd_artifacts(
    AxPath(id): AxPath<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ArtifactsResponse>, ApiError> {
    if state.runner.get_match(id).await?.is_none() {
        return Err(ApiError::not_found("match not found"));
    }

    let events = state.runner.list_events(id, 0).await?;

    let team_a = artifacts::fold_team(&events, TeamId::A)?;
    let team_b = artifacts::fold_team(&events, TeamId::B)?;

    if team_a.canon.is_none() || team_b.canon.is_none() {
        return Err(ApiError::not_found("artifacts not yet available"));
    }

    Ok(Json(ArtifactsResponse {
        team_a: TeamArtifactsResponse { canon: team_a.canon, prompt_pack: team_a.prompt_pack },
        team_b: TeamArtifactsResponse { canon: team_b.canon, prompt_pack: team_b.prompt_pack },
    }))
}

async fn cmd_judging_blind(
    AxPath(id): AxPath<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<BlindJudgingPackage>, ApiError> {
    if state.runner.get_match(id).await?.is_none() {
        return Err(ApiError::not_found("match not found"));
    }

    let events = state.runner.list_events(id, 0).await?;

    let team_a = artifacts::fold_team(&events, TeamId::A)?;
    let team_b = artifacts::fold_team(&events, TeamId::B)?;

    let (canon_a, pack_a) = match (team_a.canon, team_a.prompt_pack) {
        (Some(c), Some(p)) => (c, p),
        _ => return Err(ApiError::not_found("judging package not yet available")),
    };
    let (canon_b, pack_b) = match (team_b.canon, team_b.prompt_pack) {
        (Some(c), Some(p)) => (c, p),
        _ => return Err(ApiError::not_found("judging package not yet available")),
    };

    let package = state.judging.blind_package(id, (canon_a, pack_a), (canon_b, pack_b)).await?;
    Ok(Json(package))
}

async fn cmd_submit_score(
    AxPath(id): AxPath<Uuid>,
    State(state): State<Arc<AppState>>,
    Json(submission): Json<ScoreSubmission>,
) -> Result<Json<JudgingScoreRecord>, ApiError> {
    if state.runner.get_match(id).await?.is_none() {
        return Err(ApiError::not_found("match not found"));
    }
    let record = state.judging.submit_score(id, submission).await?;
    Ok(Json(record))
}

async fn cmd_list_scores(
    AxPath(id): AxPath<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<JudgingScoreRecord>>, ApiError> {
    let scores = state.judging.list_scores(id).await?;
    Ok(Json(scores))
}

async fn cmd_judging_reveal(
    AxPath(id): AxPath<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mapping = state
        .judging
        .reveal(id)
        .await?
        .ok_or_else(|| ApiError::not_found("no judging mapping has been assigned yet"))?;
    Ok(Json(json!({
        mapping.team_a_blind_id: "A",
        mapping.team_b_blind_id: "B",
    })))
}
