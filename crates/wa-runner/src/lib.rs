// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Match Runner: the only component that owns phase-barrier sequencing
//! across a match's two independent team engines.
//!
//! [`Engine`] knows how to run a single phase, ratification, or the prompt
//! pack call for one team; it has no notion of the other team or of when a
//! phase starts. The runner supplies both: it emits `phase_started` once per
//! team before running that phase concurrently on both engines via
//! `tokio::try_join!`, and only proceeds to phase `P+1` once both teams'
//! phase `P` futures resolve.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use wa_contracts::{
    Challenge, ErrorCode, Match, MatchEvent, MatchEventKind, MatchStatus, Tier, TeamId, canon_hash,
};
use wa_engine::{Engine, EngineError, EventSink};
use wa_eventlog::{EventLog, EventLogError, PendingEvent};
use wa_hub::MatchHub;
use wa_provider::ProviderAdapter;

/// How many rounds `phase_started` reports for phases the engine doesn't
/// track round-by-round itself: phase 4 is a single ratification round
/// (possibly repeated once internally), phase 5 has none.
fn phase_started_round_count(phase: u8) -> u8 {
    match phase {
        1..=3 => wa_engine::round_count(phase),
        4 => 1,
        _ => 0,
    }
}

/// Everything that can end a match's pipeline before `match_completed`.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A team's engine failed outright.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// A durable write or read failed.
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    /// The completed canon could not be hashed.
    #[error("failed to hash final canon")]
    Hashing,
}

impl RunnerError {
    /// The stable error code this failure maps to, used as the `error`
    /// string recorded on `match_failed` and the match record.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Engine(e) => e.code(),
            Self::EventLog(_) => ErrorCode::InternalError,
            Self::Hashing => ErrorCode::HashingFailed,
        }
    }
}

/// Feeds one team's engine events into the durable log and the live hub,
/// with match and team already closed over.
struct RunnerSink {
    log: EventLog,
    hub: Arc<MatchHub>,
    match_id: Uuid,
    team_id: TeamId,
}

#[async_trait::async_trait]
impl EventSink for RunnerSink {
    async fn emit(&self, kind: MatchEventKind) {
        let pending = PendingEvent {
            match_id: self.match_id,
            team_id: Some(self.team_id),
            kind,
        };
        match self.log.append(pending).await {
            Ok(event) => self.hub.publish(event),
            Err(err) => {
                tracing::error!(match_id = %self.match_id, team_id = %self.team_id, error = %err, "failed to append team event");
            }
        }
    }
}

/// Orchestrates matches: allocates them, derives their challenge, and runs
/// both teams' pipelines to `match_completed` or `match_failed`.
#[derive(Clone)]
pub struct MatchRunner {
    event_log: EventLog,
    hub: Arc<MatchHub>,
    provider: Arc<dyn ProviderAdapter>,
    running: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
}

impl MatchRunner {
    /// Build a runner over an already-connected event log, hub, and
    /// provider adapter.
    #[must_use]
    pub fn new(event_log: EventLog, hub: Arc<MatchHub>, provider: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            event_log,
            hub,
            provider,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Allocate a match, derive its seed if absent, persist the record,
    /// emit `match_created` and `challenge_revealed`, and spawn its pipeline.
    /// Returns once the match record exists; the pipeline itself runs
    /// concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::EventLog`] if the match record cannot be
    /// persisted or the creation events cannot be appended.
    pub async fn create(&self, seed: Option<u64>, tier: Tier) -> Result<Match, RunnerError> {
        let seed = seed.unwrap_or_else(wa_challenge::derive_seed);
        let challenge = wa_challenge::generate(seed, tier);
        let match_id = Uuid::new_v4();

        let record = Match {
            id: match_id,
            seed,
            tier,
            status: MatchStatus::Running,
            created_at: Utc::now(),
            completed_at: None,
            challenge: Some(challenge.clone()),
            final_canon_hash_a: None,
            final_canon_hash_b: None,
            error: None,
        };

        self.event_log.create_match(&record).await?;
        self.append_and_publish(match_id, None, MatchEventKind::MatchCreated { seed, tier }).await?;
        self.append_and_publish(match_id, None, MatchEventKind::ChallengeRevealed(challenge.clone())).await?;

        tracing::info!(match_id = %match_id, seed, tier = ?tier, "match created");

        let runner = self.clone();
        let handle = tokio::spawn(async move {
            runner.run_pipeline(match_id, challenge).await;
        });
        self.running.lock().await.insert(match_id, handle);

        Ok(record)
    }

    /// Cancel a running match: aborts its pipeline task and marks it failed
    /// with reason `cancelled`. A no-op if the match is not currently
    /// tracked as running (already terminal, or unknown).
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::EventLog`] if the failure cannot be recorded.
    pub async fn cancel(&self, match_id: Uuid) -> Result<(), RunnerError> {
        let handle = self.running.lock().await.remove(&match_id);
        if let Some(handle) = handle {
            handle.abort();
            self.fail_match(match_id, ErrorCode::Cancelled, "cancelled").await?;
        }
        Ok(())
    }

    /// Fetch one match by id.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::EventLog`] on a read failure.
    pub async fn get_match(&self, match_id: Uuid) -> Result<Option<Match>, RunnerError> {
        Ok(self.event_log.get_match(match_id).await?)
    }

    /// List every match, most recently created first.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::EventLog`] on a read failure.
    pub async fn list_matches(&self) -> Result<Vec<Match>, RunnerError> {
        Ok(self.event_log.list_matches().await?)
    }

    /// List every persisted event for `match_id` with `seq > after_seq`,
    /// without opening a live subscription.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::EventLog`] on a read failure.
    pub async fn list_events(&self, match_id: Uuid, after_seq: i64) -> Result<Vec<MatchEvent>, RunnerError> {
        Ok(self.event_log.list(match_id, after_seq).await?)
    }

    /// Subscribe to a match's live event stream, replaying persisted history
    /// after `after_seq` first.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::EventLog`] if the replay read fails.
    pub async fn subscribe(
        &self,
        match_id: Uuid,
        after_seq: i64,
    ) -> Result<wa_hub::Subscription, wa_hub::HubError> {
        self.hub.subscribe(&self.event_log, match_id, after_seq).await
    }

    async fn run_pipeline(&self, match_id: Uuid, challenge: Challenge) {
        let result = self.try_run_pipeline(match_id, challenge).await;
        self.running.lock().await.remove(&match_id);

        if let Err(err) = result {
            tracing::warn!(match_id = %match_id, error = %err, "match pipeline failed");
            if let Err(record_err) = self.fail_match(match_id, err.code(), &err.to_string()).await {
                tracing::error!(match_id = %match_id, error = %record_err, "failed to record match_failed");
            }
        }
    }

    async fn try_run_pipeline(&self, match_id: Uuid, challenge: Challenge) -> Result<(), RunnerError> {
        let sink_a = RunnerSink { log: self.event_log.clone(), hub: Arc::clone(&self.hub), match_id, team_id: TeamId::A };
        let sink_b = RunnerSink { log: self.event_log.clone(), hub: Arc::clone(&self.hub), match_id, team_id: TeamId::B };

        let (mut engine_a, mut engine_b) = tokio::try_join!(
            init_team(match_id, TeamId::A, challenge.clone(), Arc::clone(&self.provider), &sink_a),
            init_team(match_id, TeamId::B, challenge, Arc::clone(&self.provider), &sink_b),
        )?;

        for phase in 1..=3u8 {
            self.emit_phase_started(match_id, TeamId::A, phase).await?;
            self.emit_phase_started(match_id, TeamId::B, phase).await?;
            tokio::try_join!(run_phase(&mut engine_a, phase, &sink_a), run_phase(&mut engine_b, phase, &sink_b))?;
        }

        self.emit_phase_started(match_id, TeamId::A, 4).await?;
        self.emit_phase_started(match_id, TeamId::B, 4).await?;
        tokio::try_join!(run_ratification(&mut engine_a, &sink_a), run_ratification(&mut engine_b, &sink_b))?;

        self.emit_phase_started(match_id, TeamId::A, 5).await?;
        self.emit_phase_started(match_id, TeamId::B, 5).await?;
        tokio::try_join!(run_prompt_pack(&mut engine_a, &sink_a), run_prompt_pack(&mut engine_b, &sink_b))?;

        let hash_a = canon_hash(engine_a.canon()).map_err(|_| RunnerError::Hashing)?;
        let hash_b = canon_hash(engine_b.canon()).map_err(|_| RunnerError::Hashing)?;

        self.append_and_publish(
            match_id,
            None,
            MatchEventKind::MatchCompleted { canon_hash_a: hash_a.clone(), canon_hash_b: hash_b.clone() },
        )
        .await?;

        let mut record = self
            .event_log
            .get_match(match_id)
            .await?
            .ok_or(RunnerError::Hashing)?;
        record.status = MatchStatus::Completed;
        record.completed_at = Some(Utc::now());
        record.final_canon_hash_a = Some(hash_a);
        record.final_canon_hash_b = Some(hash_b);
        self.event_log.update_match(&record).await?;

        tracing::info!(match_id = %match_id, "match completed");
        Ok(())
    }

    async fn fail_match(&self, match_id: Uuid, code: ErrorCode, error: &str) -> Result<(), RunnerError> {
        self.append_and_publish(match_id, None, MatchEventKind::MatchFailed { error: error.to_string() }).await?;

        if let Some(mut record) = self.event_log.get_match(match_id).await? {
            record.status = MatchStatus::Failed;
            record.completed_at = Some(Utc::now());
            record.error = Some(format!("{code}: {error}"));
            self.event_log.update_match(&record).await?;
        }
        Ok(())
    }

    async fn emit_phase_started(&self, match_id: Uuid, team_id: TeamId, phase: u8) -> Result<(), RunnerError> {
        self.append_and_publish(
            match_id,
            Some(team_id),
            MatchEventKind::PhaseStarted { phase, round_count: phase_started_round_count(phase) },
        )
        .await
    }

    async fn append_and_publish(
        &self,
        match_id: Uuid,
        team_id: Option<TeamId>,
        kind: MatchEventKind,
    ) -> Result<(), RunnerError> {
        let event = self.event_log.append(PendingEvent { match_id, team_id, kind }).await?;
        self.hub.publish(event);
        Ok(())
    }
}

async fn init_team(
    match_id: Uuid,
    team_id: TeamId,
    challenge: Challenge,
    provider: Arc<dyn ProviderAdapter>,
    sink: &RunnerSink,
) -> Result<Engine, RunnerError> {
    Ok(Engine::init(match_id, team_id, challenge, provider, sink).await?)
}

async fn run_phase(engine: &mut Engine, phase: u8, sink: &RunnerSink) -> Result<(), RunnerError> {
    Ok(engine.run_phase(phase, sink).await?)
}

async fn run_ratification(engine: &mut Engine, sink: &RunnerSink) -> Result<(), RunnerError> {
    Ok(engine.run_ratification(sink).await?)
}

async fn run_prompt_pack(engine: &mut Engine, sink: &RunnerSink) -> Result<(), RunnerError> {
    engine.run_prompt_pack(sink).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wa_provider::mock::MockProvider;

    async fn runner() -> MatchRunner {
        let log = EventLog::connect("sqlite::memory:").await.unwrap();
        let hub = Arc::new(MatchHub::new(256));
        let provider: Arc<dyn ProviderAdapter> = Arc::new(MockProvider::new());
        MatchRunner::new(log, hub, provider)
    }

    async fn wait_for_terminal(runner: &MatchRunner, match_id: Uuid) -> Match {
        for _ in 0..200 {
            if let Some(m) = runner.get_match(match_id).await.unwrap() {
                if m.status != MatchStatus::Running {
                    return m;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("match never reached a terminal state");
    }

    #[tokio::test]
    async fn clean_run_with_default_mock_completes_both_teams() {
        let runner = runner().await;
        let created = runner.create(Some(42), Tier::One).await.unwrap();
        assert_eq!(created.seed, 42);
        assert!(created.challenge.is_some());

        let finished = wait_for_terminal(&runner, created.id).await;
        assert_eq!(finished.status, MatchStatus::Completed);
        assert!(finished.final_canon_hash_a.is_some());
        assert!(finished.final_canon_hash_b.is_some());
    }

    #[tokio::test]
    async fn create_derives_a_seed_when_absent() {
        let runner = runner().await;
        let created = runner.create(None, Tier::Two).await.unwrap();
        assert!(created.challenge.is_some());
        wait_for_terminal(&runner, created.id).await;
    }

    #[tokio::test]
    async fn event_stream_carries_full_lifecycle_in_order() {
        let runner = runner().await;
        let created = runner.create(Some(7), Tier::One).await.unwrap();
        wait_for_terminal(&runner, created.id).await;

        let events = runner.event_log.list(created.id, 0).await.unwrap();
        let tags: Vec<&str> = events.iter().map(|e| e.kind.type_tag()).collect();

        assert_eq!(tags.first(), Some(&"match_created"));
        assert_eq!(tags.get(1), Some(&"challenge_revealed"));
        assert_eq!(tags.last(), Some(&"match_completed"));
        assert_eq!(tags.iter().filter(|t| **t == "canon_initialized").count(), 2);
        assert_eq!(tags.iter().filter(|t| **t == "phase_started").count(), 10);
        assert_eq!(tags.iter().filter(|t| **t == "prompt_pack_generated").count(), 2);

        let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted, "events must already be seq-ordered by append");
    }

    #[tokio::test]
    async fn cancel_after_completion_is_a_no_op() {
        let runner = runner().await;
        let created = runner.create(Some(1), Tier::One).await.unwrap();
        wait_for_terminal(&runner, created.id).await;

        runner.cancel(created.id).await.unwrap();

        let record = runner.get_match(created.id).await.unwrap().unwrap();
        assert_eq!(record.status, MatchStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_of_unknown_match_is_a_no_op() {
        let runner = runner().await;
        runner.cancel(Uuid::new_v4()).await.unwrap();
    }
}
