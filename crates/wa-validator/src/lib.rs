// SPDX-License-Identifier: MIT OR Apache-2.0
//! Schema and discourse-rule validation of a [`TurnOutput`] in context.
//!
//! Validation never short-circuits: every applicable rule runs and every
//! failure is collected, mirroring the engine's need for a complete error
//! list to hand back to the provider on a repair attempt.

use wa_canon::CanonStore;
use wa_contracts::{Canon, SpeakerRole, TurnOutput, TurnType, VoteChoice};
use wa_provider::TurnSpec;

/// The two roles permitted to make a PROPOSAL.
const PROPOSER_ROLES: [SpeakerRole; 2] = [SpeakerRole::Architect, SpeakerRole::Lorekeeper];

/// A single validation rule failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `speaker_role` did not equal `turnSpec.role`.
    RoleMismatch {
        /// The role the turn spec required.
        expected: SpeakerRole,
    },
    /// `turn_type` did not equal `turnSpec.turnType`.
    TurnTypeMismatch {
        /// The turn type the turn spec required.
        expected: TurnType,
    },
    /// A RESPONSE carried only a trivial affirmation and no canon patch.
    TrivialResponse,
    /// A RESPONSE's `content` was under 120 characters with no canon patch.
    ResponseTooShort,
    /// An OBJECTION's `content` was under 80 characters.
    ObjectionTooShort,
    /// A RESOLUTION's `references` was empty.
    MissingReferences,
    /// A RESOLUTION's `content` never mentioned any of its `references`.
    ReferencesNotMentioned,
    /// A RESOLUTION carried a `canon_patch` field that was present but empty.
    EmptyCanonPatch,
    /// A PROPOSAL repeated the immediately-prior PROPOSAL's `speaker_role`.
    ProposerAlternationViolated,
    /// A PROPOSAL came from a role that may not propose.
    ProposerMembershipViolated,
    /// A VOTE carried no `vote` payload.
    VoteMissingChoice,
    /// A VOTE chose AMEND without an `amendment_summary`.
    AmendMissingSummary,
    /// The turn's `canon_patch` violated the current phase's write scope.
    PatchRejectedPhase {
        /// The offending path.
        path: String,
    },
    /// The turn's `canon_patch` failed its own semantics.
    PatchRejectedSemantics {
        /// Human-readable failure detail.
        detail: String,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoleMismatch { expected } => write!(f, "expected speaker_role {expected:?}"),
            Self::TurnTypeMismatch { expected } => write!(f, "expected turn_type {expected:?}"),
            Self::TrivialResponse => write!(f, "response is a trivial affirmation"),
            Self::ResponseTooShort => write!(f, "response content is under 120 characters"),
            Self::ObjectionTooShort => write!(f, "objection content is under 80 characters"),
            Self::MissingReferences => write!(f, "resolution carries no references"),
            Self::ReferencesNotMentioned => {
                write!(f, "resolution content does not mention any of its references")
            }
            Self::EmptyCanonPatch => write!(f, "canon_patch is present but empty"),
            Self::ProposerAlternationViolated => {
                write!(f, "proposal repeats the immediately-prior proposer's role")
            }
            Self::ProposerMembershipViolated => {
                write!(f, "only ARCHITECT and LOREKEEPER may propose")
            }
            Self::VoteMissingChoice => write!(f, "vote turn carries no vote payload"),
            Self::AmendMissingSummary => write!(f, "AMEND vote carries no amendment_summary"),
            Self::PatchRejectedPhase { path } => {
                write!(f, "canon_patch touches {path}, outside the current phase's write scope")
            }
            Self::PatchRejectedSemantics { detail } => {
                write!(f, "canon_patch rejected: {detail}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Everything validation needs beyond the [`TurnOutput`] itself.
pub struct ValidationContext<'a> {
    /// The turn spec this output is meant to satisfy.
    pub spec: &'a TurnSpec,
    /// The team's canon before this turn is applied.
    pub canon_before: &'a Canon,
    /// The `speaker_role` of the immediately-prior PROPOSAL in this phase,
    /// if any.
    pub prior_proposer: Option<SpeakerRole>,
}

/// Validate `output` against every applicable rule in `ctx`.
///
/// # Errors
///
/// Returns every [`ValidationError`] found; an empty vec is never returned
/// as an error — success is `Ok(())`.
pub fn validate(output: &TurnOutput, ctx: &ValidationContext<'_>) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if output.speaker_role != ctx.spec.role {
        errors.push(ValidationError::RoleMismatch { expected: ctx.spec.role });
    }
    if output.turn_type != ctx.spec.turn_type {
        errors.push(ValidationError::TurnTypeMismatch { expected: ctx.spec.turn_type });
    }

    match output.turn_type {
        TurnType::Response => validate_response(output, &mut errors),
        TurnType::Objection => validate_objection(output, &mut errors),
        TurnType::Resolution => validate_resolution(output, &mut errors),
        TurnType::Proposal => validate_proposal(output, ctx, &mut errors),
        TurnType::Vote => validate_vote(output, &mut errors),
    }

    if let Some(patch) = &output.canon_patch {
        validate_patch(patch, ctx, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_response(output: &TurnOutput, errors: &mut Vec<ValidationError>) {
    let has_patch = output.canon_patch.as_ref().is_some_and(|p| !p.is_empty());
    if has_patch {
        return;
    }
    if output.is_trivial_affirmation() {
        errors.push(ValidationError::TrivialResponse);
    } else if output.content.len() < 120 {
        errors.push(ValidationError::ResponseTooShort);
    }
}

fn validate_objection(output: &TurnOutput, errors: &mut Vec<ValidationError>) {
    if output.content.len() < 80 {
        errors.push(ValidationError::ObjectionTooShort);
    }
}

fn validate_resolution(output: &TurnOutput, errors: &mut Vec<ValidationError>) {
    let references = output.references.as_deref().unwrap_or(&[]);
    if references.is_empty() {
        errors.push(ValidationError::MissingReferences);
        return;
    }
    if !references.iter().any(|r| output.content.contains(r.as_str())) {
        errors.push(ValidationError::ReferencesNotMentioned);
    }
}

fn validate_proposal(output: &TurnOutput, ctx: &ValidationContext<'_>, errors: &mut Vec<ValidationError>) {
    if !PROPOSER_ROLES.contains(&output.speaker_role) {
        errors.push(ValidationError::ProposerMembershipViolated);
    }
    if ctx.prior_proposer == Some(output.speaker_role) {
        errors.push(ValidationError::ProposerAlternationViolated);
    }
}

fn validate_vote(output: &TurnOutput, errors: &mut Vec<ValidationError>) {
    match &output.vote {
        None => errors.push(ValidationError::VoteMissingChoice),
        Some(vote) => {
            if vote.choice == VoteChoice::Amend
                && vote.amendment_summary.as_deref().unwrap_or("").is_empty()
            {
                errors.push(ValidationError::AmendMissingSummary);
            }
        }
    }
}

fn validate_patch(
    patch: &wa_contracts::Patch,
    ctx: &ValidationContext<'_>,
    errors: &mut Vec<ValidationError>,
) {
    if patch.is_empty() {
        errors.push(ValidationError::EmptyCanonPatch);
        return;
    }
    let mut store = CanonStore::seeded(ctx.canon_before.clone());
    match store.apply(patch, ctx.spec.phase) {
        Ok(_) => {}
        Err(wa_canon::CanonError::RejectedPhase { path, .. }) => {
            errors.push(ValidationError::PatchRejectedPhase { path });
        }
        Err(other) => {
            errors.push(ValidationError::PatchRejectedSemantics {
                detail: other.to_string(),
            });
        }
    }
}
