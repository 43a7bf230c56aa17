// SPDX-License-Identifier: MIT OR Apache-2.0
//! Comprehensive error catalog shared across Worldbuild Arena crates.
//!
//! Every error code follows the pattern `WBA-X###` where `X` is the category
//! letter and `###` is a three-digit number:
//!
//! - **C** — Contract errors (schema, hashing, serialization)
//! - **V** — Validation errors (discourse rules)
//! - **N** — Canon errors (patch application, phase restrictions)
//! - **P** — Provider errors (language-model adapter)
//! - **R** — Runtime errors (engine, runner, event log, hub)

use serde::{Deserialize, Serialize};

/// Enumeration of all Worldbuild Arena error codes, organized by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // ── Contract (C) ──────────────────────────────────────────────────
    /// A value failed to parse against its JSON Schema.
    SchemaViolation,
    /// JSON serialization or deserialization failed.
    SerializationError,
    /// The canonical hash could not be computed.
    HashingFailed,

    // ── Validation (V) ───────────────────────────────────────────────
    /// `speaker_role` or `turn_type` did not match the turn spec.
    RoleTurnMismatch,
    /// A RESPONSE carried only a trivial affirmation.
    TrivialAffirmation,
    /// An OBJECTION lacked a specific, actionable concern.
    MissingObjection,
    /// A RESOLUTION lacked required references.
    MissingReferences,
    /// A PROPOSAL violated proposer alternation.
    ProposerAlternationViolated,
    /// A VOTE lacked a `choice`, or `AMEND` lacked an `amendment_summary`.
    VoteMissingChoice,

    // ── Canon (N) ────────────────────────────────────────────────────
    /// A patch touched a path outside the current phase's write scope.
    PatchRejectedPhase,
    /// A patch op failed its own semantics (bad index, failed `test`, etc.).
    PatchRejectedSemantics,
    /// The final canon document failed schema validation.
    CanonSchemaInvalid,

    // ── Provider (P) ─────────────────────────────────────────────────
    /// The provider call exceeded its configured timeout.
    ProviderTimeout,
    /// The provider reported a rate limit.
    ProviderRateLimited,
    /// The provider's output failed to parse as a `TurnOutput`.
    ProviderSchemaViolation,
    /// The provider is unavailable (connection refused, 5xx, etc.).
    ProviderUnavailable,

    // ── Runtime (R) ──────────────────────────────────────────────────
    /// An event was appended out of sequence order.
    EventSequenceGap,
    /// Phase 4 failed ratification twice.
    RatificationFailed,
    /// The match was cancelled.
    Cancelled,
    /// An internal invariant was violated.
    InternalError,
}

impl ErrorCode {
    /// Machine-readable code string (e.g. `"WBA-C001"`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemaViolation => "WBA-C001",
            Self::SerializationError => "WBA-C002",
            Self::HashingFailed => "WBA-C003",

            Self::RoleTurnMismatch => "WBA-V001",
            Self::TrivialAffirmation => "WBA-V002",
            Self::MissingObjection => "WBA-V003",
            Self::MissingReferences => "WBA-V004",
            Self::ProposerAlternationViolated => "WBA-V005",
            Self::VoteMissingChoice => "WBA-V006",

            Self::PatchRejectedPhase => "WBA-N001",
            Self::PatchRejectedSemantics => "WBA-N002",
            Self::CanonSchemaInvalid => "WBA-N003",

            Self::ProviderTimeout => "WBA-P001",
            Self::ProviderRateLimited => "WBA-P002",
            Self::ProviderSchemaViolation => "WBA-P003",
            Self::ProviderUnavailable => "WBA-P004",

            Self::EventSequenceGap => "WBA-R001",
            Self::RatificationFailed => "WBA-R002",
            Self::Cancelled => "WBA-R003",
            Self::InternalError => "WBA-R004",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let all = [
            ErrorCode::SchemaViolation,
            ErrorCode::SerializationError,
            ErrorCode::HashingFailed,
            ErrorCode::RoleTurnMismatch,
            ErrorCode::TrivialAffirmation,
            ErrorCode::MissingObjection,
            ErrorCode::MissingReferences,
            ErrorCode::ProposerAlternationViolated,
            ErrorCode::VoteMissingChoice,
            ErrorCode::PatchRejectedPhase,
            ErrorCode::PatchRejectedSemantics,
            ErrorCode::CanonSchemaInvalid,
            ErrorCode::ProviderTimeout,
            ErrorCode::ProviderRateLimited,
            ErrorCode::ProviderSchemaViolation,
            ErrorCode::ProviderUnavailable,
            ErrorCode::EventSequenceGap,
            ErrorCode::RatificationFailed,
            ErrorCode::Cancelled,
            ErrorCode::InternalError,
        ];
        let mut codes: Vec<&str> = all.iter().map(ErrorCode::code).collect();
        let len_before = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), len_before, "duplicate error codes found");
    }

    #[test]
    fn display_matches_code() {
        assert_eq!(ErrorCode::Cancelled.to_string(), "WBA-R003");
    }
}
