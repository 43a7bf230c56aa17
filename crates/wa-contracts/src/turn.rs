// SPDX-License-Identifier: MIT OR Apache-2.0
//! The structured output of a single agent turn.

use crate::patch::Patch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One of the four fixed roles on a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeakerRole {
    /// Proposes structure; alternates proposing with Lorekeeper.
    Architect,
    /// Proposes lore; alternates proposing with Architect.
    Lorekeeper,
    /// Raises objections; never proposes.
    Contrarian,
    /// Synthesizes resolutions; holds tiebreak authority.
    Synthesizer,
}

impl SpeakerRole {
    /// All four roles, in a fixed canonical order.
    #[must_use]
    pub fn all() -> [SpeakerRole; 4] {
        [
            SpeakerRole::Architect,
            SpeakerRole::Lorekeeper,
            SpeakerRole::Contrarian,
            SpeakerRole::Synthesizer,
        ]
    }
}

/// The kind of contribution a [`TurnOutput`] makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnType {
    /// A proposal for the current round's subject matter.
    Proposal,
    /// A contrarian objection to the current proposal.
    Objection,
    /// A non-proposer's response to the proposal and objection.
    Response,
    /// The synthesizer's resolution for the round.
    Resolution,
    /// A participant's vote on the resolution.
    Vote,
}

/// A participant's choice on a [`TurnOutput`] of type [`TurnType::Vote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteChoice {
    /// Accept the resolution as-is.
    Accept,
    /// Accept with the included amendment summary.
    Amend,
    /// Reject the resolution.
    Reject,
}

/// The vote payload carried by a VOTE [`TurnOutput`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Vote {
    /// The participant's choice.
    pub choice: VoteChoice,
    /// Required when `choice` is [`VoteChoice::Amend`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amendment_summary: Option<String>,
}

/// The structured output of one agent's contribution to a round.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TurnOutput {
    /// Who produced this turn.
    pub speaker_role: SpeakerRole,
    /// What kind of turn this is.
    pub turn_type: TurnType,
    /// The turn's free-text content.
    pub content: String,
    /// Canon mutations proposed by this turn, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canon_patch: Option<Patch>,
    /// Prior-turn ids this turn references (required for RESOLUTION).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<String>>,
    /// The vote payload, required for VOTE turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<Vote>,
}

/// Case-insensitive closed set of trivial affirmations a RESPONSE must not
/// consist solely of (`spec.md` §4.3 rule 3).
pub const TRIVIAL_AFFIRMATIONS: &[&str] = &["+1", "agree", "sounds good", "yes", "lgtm"];

impl TurnOutput {
    /// Returns `true` if `content`, trimmed and lowercased, exactly matches
    /// one of [`TRIVIAL_AFFIRMATIONS`].
    #[must_use]
    pub fn is_trivial_affirmation(&self) -> bool {
        let normalized = self.content.trim().to_lowercase();
        TRIVIAL_AFFIRMATIONS.contains(&normalized.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_affirmation_is_case_insensitive() {
        let out = TurnOutput {
            speaker_role: SpeakerRole::Architect,
            turn_type: TurnType::Response,
            content: "  Sounds Good  ".into(),
            canon_patch: None,
            references: None,
            vote: None,
        };
        assert!(out.is_trivial_affirmation());
    }

    #[test]
    fn substantive_content_is_not_trivial() {
        let out = TurnOutput {
            speaker_role: SpeakerRole::Architect,
            turn_type: TurnType::Response,
            content: "I agree with the general direction, but the causeway's tidal mechanic needs to tie into the governing logic more explicitly before we lock it in.".into(),
            canon_patch: None,
            references: None,
            vote: None,
        };
        assert!(!out.is_trivial_affirmation());
    }

    #[test]
    fn all_roles_distinct() {
        let roles = SpeakerRole::all();
        let mut set = std::collections::HashSet::new();
        for r in roles {
            assert!(set.insert(r));
        }
    }

    #[test]
    fn serde_roundtrip_with_vote() {
        let out = TurnOutput {
            speaker_role: SpeakerRole::Synthesizer,
            turn_type: TurnType::Vote,
            content: "Voting to accept.".into(),
            canon_patch: None,
            references: None,
            vote: Some(Vote {
                choice: VoteChoice::Amend,
                amendment_summary: Some("Tighten the causeway's tidal rule.".into()),
            }),
        };
        let json = serde_json::to_string(&out).unwrap();
        let back: TurnOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(out, back);
    }
}
