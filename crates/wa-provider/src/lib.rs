// SPDX-License-Identifier: MIT OR Apache-2.0
//! Uniform interface over language-model providers.
//!
//! The engine talks to a provider only through [`ProviderAdapter`]; the
//! contents of a [`ConversationHandle`] are opaque to every caller but the
//! adapter that issued it.

pub mod mock;
pub mod schema;

use async_trait::async_trait;
use thiserror::Error;
use wa_contracts::{Canon, Challenge, PromptPack, SpeakerRole, TurnOutput, TurnType};

/// Opaque per-(match, team) dialogue state. The engine never inspects its
/// contents; it only threads the handle through successive
/// [`ProviderAdapter::generate_turn`] calls.
#[derive(Debug, Clone)]
pub struct ConversationHandle(pub(crate) ConversationHandleInner);

#[derive(Debug, Clone)]
pub(crate) enum ConversationHandleInner {
    /// Scripted/mock providers keep nothing but an opaque id; state lives
    /// in the adapter itself, keyed by this id.
    Opaque(uuid::Uuid),
}

impl ConversationHandle {
    fn opaque() -> Self {
        Self(ConversationHandleInner::Opaque(uuid::Uuid::new_v4()))
    }
}

/// Token/cost accounting for a single `generateTurn` call. The cost model
/// itself is provider-dependent and opaque to the engine; this is the
/// normalized shape every provider reports into.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    /// Input tokens consumed, if the provider reports them.
    pub input_tokens: Option<u64>,
    /// Output tokens produced, if the provider reports them.
    pub output_tokens: Option<u64>,
}

/// Prior-attempt context supplied to a repair call.
#[derive(Debug, Clone)]
pub struct RepairContext {
    /// The turn output that failed validation.
    pub prior_output: TurnOutput,
    /// The validator's error messages for that output.
    pub errors: Vec<String>,
}

/// Names the role, turn type, and context a `generateTurn` call must produce
/// output for.
#[derive(Debug, Clone)]
pub struct TurnSpec {
    /// Which role must produce this turn.
    pub role: SpeakerRole,
    /// What kind of turn this is.
    pub turn_type: TurnType,
    /// The phase this turn occurs in.
    pub phase: u8,
    /// The round within the phase.
    pub round: u8,
    /// JSON-Pointer path prefixes this turn's `canon_patch` (if any) may
    /// write under, per the phase's write restrictions.
    pub allowed_patch_prefixes: Vec<String>,
    /// Minimum `references` length required (RESOLUTION turns).
    pub min_references: usize,
    /// Set when the previous round's vote was REJECT, so the engine can ask
    /// this PROPOSAL to address the recorded gap.
    pub rejection_hint: Option<String>,
    /// Set on the tie-break RESOLUTION call issued after a DEADLOCK.
    pub tiebreak: bool,
    /// Present on a repair attempt; absent on the first attempt for a turn.
    pub repair: Option<RepairContext>,
}

/// Errors a provider call can fail with. All are retriable at the adapter
/// layer up to a small bound before propagating to the engine.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    /// The call exceeded its configured timeout.
    #[error("provider call timed out")]
    Timeout,
    /// The provider reported a rate limit.
    #[error("provider rate limited the request")]
    RateLimited,
    /// The provider's output failed to parse as a `TurnOutput`.
    #[error("provider output failed schema validation: {0}")]
    SchemaViolation(String),
    /// The provider is unavailable (connection refused, 5xx, etc).
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Uniform interface over a language-model provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Begin a per-(match, team) conversation. `system_prompt` establishes
    /// the provider-facing framing; `challenge` and `initial_canon` seed its
    /// context.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the provider cannot be reached or
    /// rejects the request.
    async fn start_conversation(
        &self,
        system_prompt: &str,
        challenge: &Challenge,
        initial_canon: &Canon,
    ) -> Result<ConversationHandle, ProviderError>;

    /// Produce one structured turn. On success, returns the parsed
    /// [`TurnOutput`], the handle to use for the next call (providers using
    /// message-history resending may return a handle carrying updated
    /// history), and usage accounting.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on timeout, rate limit, schema violation,
    /// or unavailability.
    async fn generate_turn(
        &self,
        handle: ConversationHandle,
        spec: &TurnSpec,
    ) -> Result<(TurnOutput, ConversationHandle, Usage), ProviderError>;

    /// Generate a [`PromptPack`] from a completed, validated canon only — no
    /// transcript, no conversation handle. Used once per team in Phase 5.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on timeout, rate limit, schema violation,
    /// or unavailability.
    async fn generate_prompt_pack(&self, canon: &Canon) -> Result<PromptPack, ProviderError>;
}
