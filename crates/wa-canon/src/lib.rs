// SPDX-License-Identifier: MIT OR Apache-2.0
//! The in-memory canon document: patch application, hashing, and
//! phase-scoped write restriction enforcement.

mod pointer;
mod restrictions;

pub use restrictions::{write_prefixes, write_restrictions};

use pointer::{apply_op, PointerError};
use thiserror::Error;
use wa_contracts::{canon_hash, Canon, ErrorCode, Patch};

/// Everything that can go wrong applying a patch to a canon.
#[derive(Debug, Error)]
pub enum CanonError {
    /// A patch op touched a path outside the current phase's write scope.
    #[error("patch touches {path} which phase {phase} does not permit")]
    RejectedPhase {
        /// The phase the patch was attempted under.
        phase: u8,
        /// The offending path.
        path: String,
    },
    /// A patch op failed its own semantics (bad index, failed `test`, etc).
    #[error("patch op failed: {reason}")]
    RejectedSemantics {
        /// Human-readable failure reason.
        reason: String,
    },
    /// The final (Phase 4) canon does not satisfy the completed-canon schema.
    #[error("final canon does not satisfy the canon schema")]
    SchemaInvalid,
    /// The canon could not be hashed (never expected for a well-formed canon).
    #[error("failed to hash canon")]
    HashingFailed,
}

impl CanonError {
    /// The stable error code this failure maps to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RejectedPhase { .. } => ErrorCode::PatchRejectedPhase,
            Self::RejectedSemantics { .. } => ErrorCode::PatchRejectedSemantics,
            Self::SchemaInvalid => ErrorCode::CanonSchemaInvalid,
            Self::HashingFailed => ErrorCode::HashingFailed,
        }
    }
}

impl From<PointerError> for CanonError {
    fn from(e: PointerError) -> Self {
        Self::RejectedSemantics {
            reason: e.to_string(),
        }
    }
}

/// Outcome of a successful [`CanonStore::apply`] call.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// The canon after the patch was applied.
    pub canon: Canon,
    /// The canon's hash before the patch.
    pub before_hash: String,
    /// The canon's hash after the patch.
    pub after_hash: String,
}

/// Holds one team's live canon document and enforces phase write
/// restrictions and hash-chain bookkeeping on every mutation.
#[derive(Debug, Clone)]
pub struct CanonStore {
    canon: Canon,
}

impl CanonStore {
    /// Initialize a store with the default placeholder canon, returning its
    /// hash.
    ///
    /// # Errors
    ///
    /// Returns [`CanonError::HashingFailed`] if the placeholder cannot be
    /// hashed (not expected to happen in practice).
    pub fn init() -> Result<(Self, String), CanonError> {
        let canon = Canon::placeholder();
        let hash = canon_hash(&canon).map_err(|_| CanonError::HashingFailed)?;
        Ok((Self { canon }, hash))
    }

    /// Wrap an already-existing canon, e.g. one rehydrated by folding an
    /// event log, or one borrowed for a dry-run patch-acceptability check.
    #[must_use]
    pub fn seeded(canon: Canon) -> Self {
        Self { canon }
    }

    /// The current canon.
    #[must_use]
    pub fn canon(&self) -> &Canon {
        &self.canon
    }

    /// Apply `patch` under `phase`'s write restrictions.
    ///
    /// On any op's path violating the phase's write scope, or any op
    /// failing its own semantics, the store is left unchanged
    /// (copy-on-write: all ops run against a clone of the document) and an
    /// error describing the failure is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CanonError::RejectedPhase`], [`CanonError::RejectedSemantics`],
    /// or [`CanonError::SchemaInvalid`] (Phase 4 only) on any rejection.
    pub fn apply(&mut self, patch: &Patch, phase: u8) -> Result<ApplyOutcome, CanonError> {
        let allowed = write_restrictions(phase);
        for op in patch {
            for path in op.mutated_paths() {
                if !allowed(path) {
                    return Err(CanonError::RejectedPhase {
                        phase,
                        path: path.to_string(),
                    });
                }
            }
        }

        let before_hash = canon_hash(&self.canon).map_err(|_| CanonError::HashingFailed)?;
        let mut value =
            serde_json::to_value(&self.canon).map_err(|_| CanonError::HashingFailed)?;

        for op in patch {
            apply_op(&mut value, op)?;
        }

        let new_canon: Canon =
            serde_json::from_value(value).map_err(|e| CanonError::RejectedSemantics {
                reason: format!("patched document no longer matches the canon schema: {e}"),
            })?;

        if phase == 4 && !new_canon.is_complete() {
            return Err(CanonError::SchemaInvalid);
        }

        let after_hash = canon_hash(&new_canon).map_err(|_| CanonError::HashingFailed)?;
        self.canon = new_canon.clone();

        Ok(ApplyOutcome {
            canon: new_canon,
            before_hash,
            after_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wa_contracts::PatchOp;

    #[test]
    fn init_produces_hashable_placeholder() {
        let (store, hash) = CanonStore::init().unwrap();
        assert!(!store.canon().is_complete());
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn phase1_accepts_world_name_write() {
        let (mut store, _) = CanonStore::init().unwrap();
        let patch = vec![PatchOp::Replace {
            path: "/world_name".into(),
            value: serde_json::json!("Kaelveth"),
        }];
        let outcome = store.apply(&patch, 1).unwrap();
        assert_eq!(outcome.canon.world_name, "Kaelveth");
        assert_ne!(outcome.before_hash, outcome.after_hash);
    }

    #[test]
    fn phase1_rejects_tension_write() {
        let (mut store, _) = CanonStore::init().unwrap();
        let patch = vec![PatchOp::Replace {
            path: "/tension/conflict".into(),
            value: serde_json::json!("a feud"),
        }];
        let err = store.apply(&patch, 1).unwrap_err();
        assert!(matches!(err, CanonError::RejectedPhase { .. }));
        assert!(!store.canon().tension.conflict.contains("feud"));
    }

    #[test]
    fn failed_op_leaves_document_unchanged() {
        let (mut store, before) = CanonStore::init().unwrap();
        let patch = vec![
            PatchOp::Replace {
                path: "/world_name".into(),
                value: serde_json::json!("Kaelveth"),
            },
            PatchOp::Test {
                path: "/world_name".into(),
                value: serde_json::json!("not-kaelveth"),
            },
        ];
        let err = store.apply(&patch, 1).unwrap_err();
        assert!(matches!(err, CanonError::RejectedSemantics { .. }));
        assert_eq!(store.canon().world_name, "");
        assert_eq!(canon_hash(store.canon()).unwrap(), before);
    }

    #[test]
    fn phase2_rejects_a_move_whose_source_is_out_of_phase() {
        let (mut store, before) = CanonStore::init().unwrap();
        let patch = vec![PatchOp::Move {
            from: "/tension/conflict".into(),
            path: "/landmarks/0/name".into(),
        }];
        let err = store.apply(&patch, 2).unwrap_err();
        assert!(matches!(err, CanonError::RejectedPhase { .. }));
        assert_eq!(canon_hash(store.canon()).unwrap(), before);
    }

    #[test]
    fn phase4_requires_completed_canon() {
        let (mut store, _) = CanonStore::init().unwrap();
        let patch = vec![PatchOp::Replace {
            path: "/world_name".into(),
            value: serde_json::json!("Kaelveth"),
        }];
        let err = store.apply(&patch, 4).unwrap_err();
        assert!(matches!(err, CanonError::SchemaInvalid));
    }
}
