// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared wire types for Worldbuild Arena: the canon document, turn outputs,
//! patches, challenges, prompt packs, match events, and the error taxonomy.
//!
//! If you only take one dependency from this workspace, take this one.

pub mod canon;
pub mod challenge;
pub mod error;
pub mod event;
pub mod patch;
pub mod promptpack;
pub mod turn;

pub use canon::{Canon, Inhabitants, Landmark, Tension};
pub use challenge::{Challenge, Tier};
pub use error::ErrorCode;
pub use event::{Match, MatchEvent, MatchEventKind, MatchStatus, TeamId, VoteOutcome, VoteTally};
pub use patch::{Patch, PatchOp};
pub use promptpack::{PromptEntry, PromptPack};
pub use turn::{SpeakerRole, TurnOutput, TurnType, Vote, VoteChoice, TRIVIAL_AFFIRMATIONS};

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Version of the wire contracts in this crate. Bump on any breaking change
/// to a serialized shape.
pub const CONTRACT_VERSION: u32 = 1;

/// Serialize `value` through [`serde_json::Value`] and back to a compact
/// string, which fixes key ordering (`Value`'s object map is a `BTreeMap`)
/// and strips all insignificant whitespace.
///
/// # Errors
///
/// Returns [`error::ErrorCode::SerializationError`] if `value` cannot be
/// represented as JSON.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, error::ErrorCode> {
    let v = serde_json::to_value(value).map_err(|_| error::ErrorCode::SerializationError)?;
    serde_json::to_string(&v).map_err(|_| error::ErrorCode::SerializationError)
}

/// Hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compute a [`Canon`]'s canonical hash, the value chained across
/// `canon_patch_applied` events as `canon_before_hash`/`canon_after_hash`.
///
/// The hash is over the canon's canonical JSON alone — it carries no
/// self-reference, unlike a receipt hash, so no field needs to be nulled
/// out first. Landmark order is significant: two canons differing only in
/// landmark order hash differently, matching `spec.md` §3.
///
/// # Errors
///
/// Returns [`error::ErrorCode::HashingFailed`] if `canon` cannot be
/// serialized (never expected to happen for a well-formed [`Canon`]).
pub fn canon_hash(canon: &Canon) -> Result<String, error::ErrorCode> {
    let json = canonical_json(canon).map_err(|_| error::ErrorCode::HashingFailed)?;
    Ok(sha256_hex(json.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_keys() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let out = canonical_json(&a).unwrap();
        assert_eq!(out, r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn canon_hash_is_deterministic() {
        let canon = Canon::placeholder();
        assert_eq!(canon_hash(&canon).unwrap(), canon_hash(&canon).unwrap());
    }

    #[test]
    fn canon_hash_changes_with_landmark_order() {
        let mut a = Canon::placeholder();
        a.landmarks.push(Landmark {
            name: "Spire".into(),
            ..Default::default()
        });
        a.landmarks.push(Landmark {
            name: "Trench".into(),
            ..Default::default()
        });
        let mut b = a.clone();
        b.landmarks.swap(0, 1);
        assert_ne!(canon_hash(&a).unwrap(), canon_hash(&b).unwrap());
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
