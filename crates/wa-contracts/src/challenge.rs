// SPDX-License-Identifier: MIT OR Apache-2.0
//! The match's deterministic seed-derived creative constraints.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A match's tier, controlling the scope of its challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[repr(u8)]
pub enum Tier {
    /// Smallest scope.
    One = 1,
    /// Medium scope.
    Two = 2,
    /// Largest scope.
    Three = 3,
}

impl TryFrom<u8> for Tier {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::One),
            2 => Ok(Tier::Two),
            3 => Ok(Tier::Three),
            other => Err(other),
        }
    }
}

/// A match's creative constraints, derived deterministically from
/// `(seed, tier)` and immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Challenge {
    /// The biome or setting the world must be built in.
    pub biome: String,
    /// The inhabitant archetype the world must accommodate.
    pub inhabitants: String,
    /// A twist constraint the team must reconcile.
    pub twist: String,
    /// The tier this challenge was generated for.
    pub tier: Tier,
    /// The seed this challenge was derived from.
    pub seed: u64,
}
