// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-team Deliberation Engine: a finite-state machine over a phase's
//! rounds, the bounded repair loop on top of [`wa_provider::ProviderAdapter`],
//! and the vote-aggregation and tiebreak rules that decide whether a round's
//! resolution reaches canon.
//!
//! The Engine owns one team's conversation state and canon; it knows nothing
//! about the other team or about phase sequencing across teams — that barrier
//! belongs to the Match Runner, which calls [`Engine::run_phase`],
//! [`Engine::run_ratification`], and [`Engine::run_prompt_pack`] in order and
//! emits `phase_started` itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use wa_canon::{write_prefixes, CanonError, CanonStore};
use wa_contracts::{
    Canon, Challenge, ErrorCode, MatchEventKind, PromptPack, SpeakerRole, TeamId, TurnOutput,
    TurnType, VoteChoice, VoteOutcome, VoteTally,
};
use wa_provider::{ConversationHandle, ProviderAdapter, ProviderError, RepairContext, TurnSpec};
use wa_validator::{validate, ValidationContext};

/// Total calls permitted for one turn: the first attempt plus this many
/// repairs.
const MAX_REPAIR_ATTEMPTS: u8 = 2;

/// Everything that can end a team's run early.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The provider failed on a call the engine cannot retry past (reserved
    /// for future use; today every provider failure is absorbed by the
    /// repair loop and surfaces as `turn_validation_failed` instead).
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// A canon mutation was rejected.
    #[error(transparent)]
    Canon(#[from] CanonError),
    /// Phase 4 failed to reach unanimous ACCEPT twice.
    #[error("phase 4 ratification failed after a retry")]
    RatificationFailed,
}

impl EngineError {
    /// The stable error code this failure maps to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Provider(e) => match e {
                ProviderError::Timeout => ErrorCode::ProviderTimeout,
                ProviderError::RateLimited => ErrorCode::ProviderRateLimited,
                ProviderError::SchemaViolation(_) => ErrorCode::ProviderSchemaViolation,
                ProviderError::Unavailable(_) => ErrorCode::ProviderUnavailable,
            },
            Self::Canon(e) => e.code(),
            Self::RatificationFailed => ErrorCode::RatificationFailed,
        }
    }
}

/// Where the engine reports every event it produces. The Match Runner
/// implements this by wrapping `wa_eventlog::EventLog::append` and
/// `wa_hub::MatchHub::publish` with the match and team already closed over.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Record `kind`, already scoped to this engine's match and team.
    async fn emit(&self, kind: MatchEventKind);
}

/// How many rounds phase `phase` runs, per `spec.md` §4.4's round table.
/// Phase 4 is a single ratification round handled by [`Engine::run_ratification`]
/// rather than this table; phase 5 has no rounds at all.
#[must_use]
pub fn round_count(phase: u8) -> u8 {
    match phase {
        1 => 3,
        2 => 4,
        3 => 2,
        _ => 0,
    }
}

/// The designated proposer for round `round` within a phase: Architect on
/// odd rounds, Lorekeeper on even rounds, restarting at Architect every
/// phase.
#[must_use]
fn proposer_for_round(round: u8) -> SpeakerRole {
    if round % 2 == 1 {
        SpeakerRole::Architect
    } else {
        SpeakerRole::Lorekeeper
    }
}

/// Outcome of one round, fed forward into the next round's proposal.
struct RoundOutcome {
    rejection_hint: Option<String>,
}

/// One team's live deliberation state: its canon, its four standing
/// conversations, and the bookkeeping the discourse rules need.
pub struct Engine {
    match_id: Uuid,
    team_id: TeamId,
    provider: Arc<dyn ProviderAdapter>,
    challenge: Challenge,
    canon: CanonStore,
    conversations: HashMap<SpeakerRole, ConversationHandle>,
    prior_proposer: Option<SpeakerRole>,
    turn_counter: u64,
}

impl Engine {
    /// Start a fresh engine for `team_id` in `match_id`: initializes the
    /// placeholder canon, emits `canon_initialized`, and opens one
    /// conversation per role.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Provider`] if any conversation fails to start,
    /// or [`EngineError::Canon`] if the placeholder cannot be hashed.
    pub async fn init(
        match_id: Uuid,
        team_id: TeamId,
        challenge: Challenge,
        provider: Arc<dyn ProviderAdapter>,
        sink: &dyn EventSink,
    ) -> Result<Self, EngineError> {
        let (canon, canon_hash) = CanonStore::init()?;
        sink.emit(MatchEventKind::CanonInitialized {
            canon: canon.canon().clone(),
            canon_hash,
        })
        .await;

        let mut conversations = HashMap::with_capacity(4);
        for role in SpeakerRole::all() {
            let handle = provider
                .start_conversation(&system_prompt(team_id, role), &challenge, canon.canon())
                .await?;
            conversations.insert(role, handle);
        }

        Ok(Self {
            match_id,
            team_id,
            provider,
            challenge,
            canon,
            conversations,
            prior_proposer: None,
            turn_counter: 0,
        })
    }

    /// This engine's match.
    #[must_use]
    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    /// This engine's team.
    #[must_use]
    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    /// The team's current canon.
    #[must_use]
    pub fn canon(&self) -> &Canon {
        self.canon.canon()
    }

    /// Run every round of `phase` (1, 2, or 3) to completion, threading each
    /// round's rejection hint into the next. Proposer alternation restarts
    /// at Architect for every phase.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Canon`] if an accepted patch is rejected by the
    /// canon store, which would indicate a validator/store disagreement.
    pub async fn run_phase(&mut self, phase: u8, sink: &dyn EventSink) -> Result<(), EngineError> {
        self.prior_proposer = None;
        let mut hint = None;
        for round in 1..=round_count(phase) {
            let outcome = self.run_round(phase, round, hint.take(), sink).await?;
            hint = outcome.rejection_hint;
        }
        Ok(())
    }

    /// Run Phase 4 ratification: a single proposal/objection/response/
    /// resolution round whose vote must be unanimous ACCEPT and whose
    /// resolution must leave the canon complete. One retry is permitted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RatificationFailed`] if both attempts fail.
    pub async fn run_ratification(&mut self, sink: &dyn EventSink) -> Result<(), EngineError> {
        for _ in 0..2 {
            self.prior_proposer = None;
            if self.run_ratification_round(sink).await? {
                return Ok(());
            }
        }
        Err(EngineError::RatificationFailed)
    }

    /// Run Phase 5: a neutral provider call over the final canon only, no
    /// transcript and no conversation handle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Provider`] if the adapter call fails.
    pub async fn run_prompt_pack(&mut self, sink: &dyn EventSink) -> Result<PromptPack, EngineError> {
        let pack = self.provider.generate_prompt_pack(self.canon.canon()).await?;
        sink.emit(MatchEventKind::PromptPackGenerated { prompt_pack: pack.clone() }).await;
        Ok(pack)
    }

    async fn run_round(
        &mut self,
        phase: u8,
        round: u8,
        rejection_hint: Option<String>,
        sink: &dyn EventSink,
    ) -> Result<RoundOutcome, EngineError> {
        let proposer_role = proposer_for_round(round);
        let prefixes = patch_prefixes(phase);

        let proposal_spec = self.spec(proposer_role, TurnType::Proposal, phase, round, &prefixes, 0, rejection_hint, false);
        let _proposal = self.run_turn(&proposal_spec, sink).await?;
        self.prior_proposer = Some(proposer_role);

        self.run_objection_and_responses(proposer_role, phase, round, sink).await?;

        let resolution_spec = self.spec(SpeakerRole::Synthesizer, TurnType::Resolution, phase, round, &prefixes, 1, None, false);
        let resolution = self.run_turn(&resolution_spec, sink).await?;

        let (result, tally, hint) = match resolution {
            None => {
                let outcome = self.run_tiebreak(phase, round, &prefixes, sink).await?;
                (outcome, VoteTally::default(), reject_hint(round, outcome))
            }
            Some((resolution_turn_id, resolution_output)) => {
                let (tally, amend_texts) = self.run_votes(phase, round, sink).await?;
                let outcome = aggregate_votes(&tally, &amend_texts);
                match outcome {
                    VoteOutcome::Accept | VoteOutcome::Amend => {
                        self.apply_resolution_patch(phase, round, resolution_turn_id, resolution_output, sink).await?;
                        (outcome, tally, None)
                    }
                    VoteOutcome::Reject => (outcome, tally, reject_hint(round, outcome)),
                    VoteOutcome::Deadlock => {
                        let tiebreak_outcome = self.run_tiebreak(phase, round, &prefixes, sink).await?;
                        (tiebreak_outcome, tally, reject_hint(round, tiebreak_outcome))
                    }
                }
            }
        };

        sink.emit(MatchEventKind::VoteResult { phase, round, result, tally }).await;
        Ok(RoundOutcome { rejection_hint: hint })
    }

    async fn run_objection_and_responses(
        &mut self,
        proposer_role: SpeakerRole,
        phase: u8,
        round: u8,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        let objection_spec = self.spec(SpeakerRole::Contrarian, TurnType::Objection, phase, round, &[], 0, None, false);
        let _ = self.run_turn(&objection_spec, sink).await?;

        let other_proposer = if proposer_role == SpeakerRole::Architect {
            SpeakerRole::Lorekeeper
        } else {
            SpeakerRole::Architect
        };
        for role in [other_proposer, SpeakerRole::Contrarian, SpeakerRole::Synthesizer] {
            let response_spec = self.spec(role, TurnType::Response, phase, round, &[], 0, None, false);
            let _ = self.run_turn(&response_spec, sink).await?;
        }
        Ok(())
    }

    async fn run_votes(
        &mut self,
        phase: u8,
        round: u8,
        sink: &dyn EventSink,
    ) -> Result<(VoteTally, Vec<String>), EngineError> {
        let mut tally = VoteTally::default();
        let mut amend_texts = Vec::new();
        for role in SpeakerRole::all() {
            let vote_spec = self.spec(role, TurnType::Vote, phase, round, &[], 0, None, false);
            match self.run_turn(&vote_spec, sink).await? {
                Some((_, output)) => {
                    let vote = output.vote.expect("validator guarantees a vote payload on a surviving VOTE turn");
                    match vote.choice {
                        VoteChoice::Accept => tally.accept += 1,
                        VoteChoice::Amend => {
                            tally.amend += 1;
                            if let Some(summary) = vote.amendment_summary {
                                amend_texts.push(summary);
                            }
                        }
                        VoteChoice::Reject => tally.reject += 1,
                    }
                }
                None => tally.abstain += 1,
            }
        }
        Ok((tally, amend_texts))
    }

    async fn apply_resolution_patch(
        &mut self,
        phase: u8,
        round: u8,
        turn_id: String,
        resolution: TurnOutput,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        let Some(patch) = resolution.canon_patch.filter(|p| !p.is_empty()) else {
            return Ok(());
        };
        let applied = self.canon.apply(&patch, phase)?;
        sink.emit(MatchEventKind::CanonPatchApplied {
            phase,
            round,
            turn_id,
            patch,
            canon_before_hash: applied.before_hash,
            canon_after_hash: applied.after_hash,
        })
        .await;
        Ok(())
    }

    /// The synthesizer's binding tiebreak call after a DEADLOCK or a failed
    /// RESOLUTION turn. A non-empty patch is treated as a binding ACCEPT;
    /// anything else (no patch, or the tiebreak call itself failing) is a
    /// binding REJECT.
    async fn run_tiebreak(
        &mut self,
        phase: u8,
        round: u8,
        prefixes: &[String],
        sink: &dyn EventSink,
    ) -> Result<VoteOutcome, EngineError> {
        let spec = self.spec(SpeakerRole::Synthesizer, TurnType::Resolution, phase, round, prefixes, 1, None, true);
        let Some((turn_id, output)) = self.run_turn(&spec, sink).await? else {
            return Ok(VoteOutcome::Reject);
        };
        match output.canon_patch.clone().filter(|p| !p.is_empty()) {
            Some(_) => {
                self.apply_resolution_patch(phase, round, turn_id, output, sink).await?;
                Ok(VoteOutcome::Accept)
            }
            None => Ok(VoteOutcome::Reject),
        }
    }

    async fn run_ratification_round(&mut self, sink: &dyn EventSink) -> Result<bool, EngineError> {
        let phase = 4;
        let round = 1;
        let proposer_role = proposer_for_round(round);
        let prefixes = patch_prefixes(phase);

        let proposal_spec = self.spec(proposer_role, TurnType::Proposal, phase, round, &prefixes, 0, None, false);
        let _ = self.run_turn(&proposal_spec, sink).await?;
        self.prior_proposer = Some(proposer_role);

        self.run_objection_and_responses(proposer_role, phase, round, sink).await?;

        let resolution_spec = self.spec(SpeakerRole::Synthesizer, TurnType::Resolution, phase, round, &prefixes, 1, None, false);
        let Some((resolution_turn_id, resolution_output)) = self.run_turn(&resolution_spec, sink).await? else {
            sink.emit(MatchEventKind::VoteResult {
                phase,
                round,
                result: VoteOutcome::Reject,
                tally: VoteTally::default(),
            })
            .await;
            return Ok(false);
        };

        let (tally, _amend_texts) = self.run_votes(phase, round, sink).await?;
        let unanimous = tally.accept == 4;
        let result = if unanimous { VoteOutcome::Accept } else { VoteOutcome::Reject };
        sink.emit(MatchEventKind::VoteResult { phase, round, result, tally }).await;

        if !unanimous {
            return Ok(false);
        }
        self.apply_resolution_patch(phase, round, resolution_turn_id, resolution_output, sink).await?;
        Ok(self.canon.canon().is_complete())
    }

    #[allow(clippy::too_many_arguments)]
    fn spec(
        &self,
        role: SpeakerRole,
        turn_type: TurnType,
        phase: u8,
        round: u8,
        prefixes: &[String],
        min_references: usize,
        rejection_hint: Option<String>,
        tiebreak: bool,
    ) -> TurnSpec {
        TurnSpec {
            role,
            turn_type,
            phase,
            round,
            allowed_patch_prefixes: prefixes.to_vec(),
            min_references,
            rejection_hint,
            tiebreak,
            repair: None,
        }
    }

    /// Run one turn through the bounded repair loop: the first call plus up
    /// to [`MAX_REPAIR_ATTEMPTS`] repairs, each carrying the prior output and
    /// the validator's errors back to the provider.
    ///
    /// Returns `None` once the budget is exhausted; the caller treats an
    /// abandoned turn as an ABSTAIN (votes), a DEADLOCK trigger (resolution),
    /// or simply absent content (proposal/objection/response).
    async fn run_turn(
        &mut self,
        spec: &TurnSpec,
        sink: &dyn EventSink,
    ) -> Result<Option<(String, TurnOutput)>, EngineError> {
        let mut handle = self
            .conversations
            .get(&spec.role)
            .cloned()
            .expect("every role has a conversation opened in Engine::init");
        let mut repair: Option<RepairContext> = None;

        for _ in 0..=MAX_REPAIR_ATTEMPTS {
            let mut attempt = spec.clone();
            attempt.repair = repair.clone();

            match self.provider.generate_turn(handle.clone(), &attempt).await {
                Ok((output, new_handle, _usage)) => {
                    handle = new_handle;
                    let ctx = ValidationContext {
                        spec: &attempt,
                        canon_before: self.canon.canon(),
                        prior_proposer: self.prior_proposer,
                    };
                    match validate(&output, &ctx) {
                        Ok(()) => {
                            self.conversations.insert(spec.role, handle);
                            self.turn_counter += 1;
                            let turn_id = format!("turn-{}", self.turn_counter);
                            sink.emit(MatchEventKind::TurnEmitted {
                                phase: spec.phase,
                                round: spec.round,
                                turn_id: turn_id.clone(),
                                output: output.clone(),
                            })
                            .await;
                            return Ok(Some((turn_id, output)));
                        }
                        Err(errors) => {
                            repair = Some(RepairContext {
                                prior_output: output,
                                errors: errors.into_iter().map(|e| e.to_string()).collect(),
                            });
                        }
                    }
                }
                Err(provider_err) => {
                    tracing::warn!(role = ?spec.role, turn_type = ?spec.turn_type, error = %provider_err, "provider call failed");
                    repair = None;
                }
            }
        }

        self.conversations.insert(spec.role, handle);
        self.turn_counter += 1;
        let turn_id = format!("turn-{}", self.turn_counter);
        let errors = repair.map(|r| r.errors).unwrap_or_else(|| vec!["provider call failed on every attempt".into()]);
        sink.emit(MatchEventKind::TurnValidationFailed { phase: spec.phase, round: spec.round, turn_id, errors }).await;
        Ok(None)
    }
}

fn patch_prefixes(phase: u8) -> Vec<String> {
    write_prefixes(phase).into_iter().map(String::from).collect()
}

fn reject_hint(round: u8, outcome: VoteOutcome) -> Option<String> {
    match outcome {
        VoteOutcome::Reject => Some(format!(
            "Round {round}'s resolution was rejected; the next proposal must address the Contrarian's outstanding objection before re-proposing."
        )),
        _ => None,
    }
}

/// Decide a round's [`VoteOutcome`] from its raw tally and the free-text
/// amendment summaries of every AMEND vote.
///
/// - `ACCEPT >= 3` wins outright.
/// - Otherwise, `AMEND >= 2` wins if at least two amenders wrote the same
///   (trimmed) amendment text — a real shared amendment, not just two
///   independent nudges in different directions.
/// - Otherwise, `REJECT + ABSTAIN >= 2` rejects the round.
/// - Otherwise the round deadlocks and falls to the synthesizer's tiebreak.
#[must_use]
fn aggregate_votes(tally: &VoteTally, amend_texts: &[String]) -> VoteOutcome {
    if tally.accept >= 3 {
        return VoteOutcome::Accept;
    }
    if tally.amend >= 2 && has_shared_text(amend_texts) {
        return VoteOutcome::Amend;
    }
    if tally.reject + tally.abstain >= 2 {
        return VoteOutcome::Reject;
    }
    VoteOutcome::Deadlock
}

fn has_shared_text(texts: &[String]) -> bool {
    for i in 0..texts.len() {
        for j in (i + 1)..texts.len() {
            if texts[i].trim() == texts[j].trim() {
                return true;
            }
        }
    }
    false
}

fn system_prompt(team_id: TeamId, role: SpeakerRole) -> String {
    let role_framing = match role {
        SpeakerRole::Architect => "You propose structural world elements: geography, landmarks, and governing logic.",
        SpeakerRole::Lorekeeper => "You propose lore: inhabitants, culture, and the world's history.",
        SpeakerRole::Contrarian => "You never propose. You raise the sharpest specific objection to every proposal.",
        SpeakerRole::Synthesizer => "You resolve each round's proposal and objection into a single grounded outcome, and hold tiebreak authority.",
    };
    format!("You are the {role:?} on Team {team_id}. {role_framing}")
}
