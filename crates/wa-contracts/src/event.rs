// SPDX-License-Identifier: MIT OR Apache-2.0
//! The match record and its append-only event log entry type.

use crate::canon::Canon;
use crate::challenge::Challenge;
use crate::patch::Patch;
use crate::promptpack::PromptPack;
use crate::turn::TurnOutput;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which of the two independent teams an event or canon belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TeamId {
    /// Team A.
    A,
    /// Team B.
    B,
}

impl TeamId {
    /// The other team.
    #[must_use]
    pub fn other(self) -> TeamId {
        match self {
            TeamId::A => TeamId::B,
            TeamId::B => TeamId::A,
        }
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamId::A => write!(f, "A"),
            TeamId::B => write!(f, "B"),
        }
    }
}

/// Lifecycle status of a [`Match`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Pipeline is in progress.
    Running,
    /// Both teams reached `match_completed`.
    Completed,
    /// The match ended via `match_failed`.
    Failed,
}

/// Outcome of a round's vote-aggregation step (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteOutcome {
    /// `ACCEPT >= 3`.
    Accept,
    /// A synthesizer amendment was accepted under the `AMEND >= 2` rule.
    Amend,
    /// `REJECT >= 2` with no ACCEPT/AMEND majority.
    Reject,
    /// No rule matched; resolved by synthesizer tiebreak.
    Deadlock,
}

/// Per-choice vote tally for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct VoteTally {
    /// Number of ACCEPT votes.
    pub accept: u8,
    /// Number of AMEND votes.
    pub amend: u8,
    /// Number of REJECT votes.
    pub reject: u8,
    /// Number of ABSTAIN votes (failed turns counted as ABSTAIN, which folds
    /// into REJECT for the `>= 2` rule but is tracked separately here).
    pub abstain: u8,
}

/// A match record. Mutated only by the Match Runner; terminal once
/// [`MatchStatus::Completed`] or [`MatchStatus::Failed`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Match {
    /// Opaque match identifier.
    pub id: Uuid,
    /// The seed this match was created (or derived) with.
    pub seed: u64,
    /// The match's tier.
    pub tier: crate::challenge::Tier,
    /// Current lifecycle status.
    pub status: MatchStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Completion timestamp, set once terminal.
    pub completed_at: Option<DateTime<Utc>>,
    /// The match's challenge, set once generated.
    pub challenge: Option<Challenge>,
    /// Team A's final canon hash, set on completion.
    pub final_canon_hash_a: Option<String>,
    /// Team B's final canon hash, set on completion.
    pub final_canon_hash_b: Option<String>,
    /// Error message, set only when `status == Failed`.
    pub error: Option<String>,
}

/// The payload discriminator for [`MatchEvent`].
///
/// Serialized as `{"type": "...", "data": {...}}`, matching `spec.md` §6's
/// `type`/`data` columns.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MatchEventKind {
    /// A new match was created.
    MatchCreated {
        /// The seed used (or derived) for the match.
        seed: u64,
        /// The match's tier.
        tier: crate::challenge::Tier,
    },
    /// The match's challenge was revealed.
    ChallengeRevealed(Challenge),
    /// A new phase began for one team (emitted once per team per phase).
    PhaseStarted {
        /// The phase number, 1..=5.
        phase: u8,
        /// How many rounds this phase runs.
        round_count: u8,
    },
    /// A team's canon was initialized to the placeholder structure.
    CanonInitialized {
        /// The placeholder canon.
        canon: Canon,
        /// The placeholder's canonical hash.
        canon_hash: String,
    },
    /// A turn was successfully produced and validated.
    TurnEmitted {
        /// The phase this turn occurred in.
        phase: u8,
        /// The round within the phase.
        round: u8,
        /// This turn's unique id.
        turn_id: String,
        /// The turn's structured output.
        output: TurnOutput,
    },
    /// A turn was abandoned after exhausting the repair loop.
    TurnValidationFailed {
        /// The phase this turn occurred in.
        phase: u8,
        /// The round within the phase.
        round: u8,
        /// This turn's unique id.
        turn_id: String,
        /// Every validation error message from the final attempt.
        errors: Vec<String>,
    },
    /// A round's vote aggregation result.
    VoteResult {
        /// The phase this round occurred in.
        phase: u8,
        /// The round within the phase.
        round: u8,
        /// The aggregation outcome.
        result: VoteOutcome,
        /// The raw tally that produced `result`.
        tally: VoteTally,
    },
    /// A patch was accepted and applied to canon.
    CanonPatchApplied {
        /// The phase this patch occurred in.
        phase: u8,
        /// The round within the phase.
        round: u8,
        /// The originating turn's id.
        turn_id: String,
        /// The patch that was applied.
        patch: Patch,
        /// The canon hash before this patch.
        canon_before_hash: String,
        /// The canon hash after this patch.
        canon_after_hash: String,
    },
    /// A team's prompt pack was generated.
    PromptPackGenerated {
        /// The generated prompt pack.
        prompt_pack: PromptPack,
    },
    /// The match completed successfully.
    MatchCompleted {
        /// Team A's final canon hash.
        canon_hash_a: String,
        /// Team B's final canon hash.
        canon_hash_b: String,
    },
    /// The match failed.
    MatchFailed {
        /// Human-readable failure reason.
        error: String,
    },
}

impl MatchEventKind {
    /// The event type's wire tag (e.g. `"turn_emitted"`), matching the
    /// `type` column in `spec.md` §6.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::MatchCreated { .. } => "match_created",
            Self::ChallengeRevealed(_) => "challenge_revealed",
            Self::PhaseStarted { .. } => "phase_started",
            Self::CanonInitialized { .. } => "canon_initialized",
            Self::TurnEmitted { .. } => "turn_emitted",
            Self::TurnValidationFailed { .. } => "turn_validation_failed",
            Self::VoteResult { .. } => "vote_result",
            Self::CanonPatchApplied { .. } => "canon_patch_applied",
            Self::PromptPackGenerated { .. } => "prompt_pack_generated",
            Self::MatchCompleted { .. } => "match_completed",
            Self::MatchFailed { .. } => "match_failed",
        }
    }

    /// Whether this event type is match-scoped (`team_id == None`) by
    /// construction rather than by caller discipline.
    #[must_use]
    pub fn is_match_scoped(&self) -> bool {
        matches!(
            self,
            Self::MatchCreated { .. }
                | Self::ChallengeRevealed(_)
                | Self::MatchCompleted { .. }
                | Self::MatchFailed { .. }
        )
    }
}

/// An immutable entry in a match's append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatchEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// Strictly increasing, gap-free sequence number, unique per match.
    pub seq: i64,
    /// UTC timestamp assigned at append time.
    pub ts: DateTime<Utc>,
    /// The match this event belongs to.
    pub match_id: Uuid,
    /// The team this event concerns, or `None` for match-scoped events.
    pub team_id: Option<TeamId>,
    /// The event payload.
    #[serde(flatten)]
    pub kind: MatchEventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_matches_spec_table() {
        assert_eq!(
            MatchEventKind::MatchCreated { seed: 42, tier: crate::challenge::Tier::One }.type_tag(),
            "match_created"
        );
        assert_eq!(
            MatchEventKind::MatchFailed { error: "x".into() }.type_tag(),
            "match_failed"
        );
    }

    #[test]
    fn match_scoped_events_are_flagged() {
        assert!(MatchEventKind::MatchCompleted {
            canon_hash_a: "a".into(),
            canon_hash_b: "b".into()
        }
        .is_match_scoped());
        assert!(!MatchEventKind::PhaseStarted { phase: 1, round_count: 3 }.is_match_scoped());
    }

    #[test]
    fn serde_tag_and_content_shape() {
        let kind = MatchEventKind::PhaseStarted { phase: 2, round_count: 4 };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "phase_started");
        assert_eq!(value["data"]["phase"], 2);
        assert_eq!(value["data"]["round_count"], 4);
    }

    #[test]
    fn team_other_is_involutive() {
        assert_eq!(TeamId::A.other(), TeamId::B);
        assert_eq!(TeamId::B.other().other(), TeamId::B);
    }
}
