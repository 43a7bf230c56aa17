// SPDX-License-Identifier: MIT OR Apache-2.0
//! RFC-6902 subset used to mutate a [`crate::canon::Canon`] by patch.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single patch operation. Paths are JSON-Pointer-style (`/landmarks/0/name`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// Insert `value` at `path`. `-` as the final array segment appends.
    Add {
        /// JSON-Pointer path to insert at.
        path: String,
        /// Value to insert.
        value: serde_json::Value,
    },
    /// Remove the value at `path`.
    Remove {
        /// JSON-Pointer path to remove.
        path: String,
    },
    /// Replace the value at `path` with `value`.
    Replace {
        /// JSON-Pointer path to replace.
        path: String,
        /// Replacement value.
        value: serde_json::Value,
    },
    /// Move the value at `from` to `path`, removing it from `from`.
    Move {
        /// Source JSON-Pointer path.
        from: String,
        /// Destination JSON-Pointer path.
        path: String,
    },
    /// Copy the value at `from` to `path`, leaving `from` intact.
    Copy {
        /// Source JSON-Pointer path.
        from: String,
        /// Destination JSON-Pointer path.
        path: String,
    },
    /// Assert that the value at `path` deep-equals `value`; fails the whole
    /// patch otherwise.
    Test {
        /// JSON-Pointer path to check.
        path: String,
        /// Expected value.
        value: serde_json::Value,
    },
}

impl PatchOp {
    /// Every JSON-Pointer path this op touches (read or write).
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::Add { path, .. } | Self::Remove { path } | Self::Replace { path, .. } => {
                vec![path]
            }
            Self::Move { from, path } | Self::Copy { from, path } => vec![from, path],
            Self::Test { path, .. } => vec![path],
        }
    }

    /// The op's written path, for ops that mutate the document.
    #[must_use]
    pub fn write_path(&self) -> Option<&str> {
        match self {
            Self::Add { path, .. } | Self::Replace { path, .. } => Some(path),
            Self::Remove { path } => Some(path),
            Self::Move { path, .. } | Self::Copy { path, .. } => Some(path),
            Self::Test { .. } => None,
        }
    }

    /// Every path this op mutates. For `Move`, this is both `from` (the
    /// value is removed there) and `path` (where it lands); every other op
    /// mutates at most `write_path`.
    #[must_use]
    pub fn mutated_paths(&self) -> Vec<&str> {
        match self {
            Self::Move { from, path } => vec![from, path],
            other => other.write_path().into_iter().collect(),
        }
    }
}

/// An ordered sequence of [`PatchOp`]s applied atomically.
pub type Patch = Vec<PatchOp>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_paths_is_single() {
        let op = PatchOp::Add {
            path: "/world_name".into(),
            value: serde_json::json!("Kaelveth"),
        };
        assert_eq!(op.paths(), vec!["/world_name"]);
        assert_eq!(op.write_path(), Some("/world_name"));
    }

    #[test]
    fn move_paths_includes_both() {
        let op = PatchOp::Move {
            from: "/landmarks/0".into(),
            path: "/landmarks/1".into(),
        };
        assert_eq!(op.paths(), vec!["/landmarks/0", "/landmarks/1"]);
        assert_eq!(op.write_path(), Some("/landmarks/1"));
    }

    #[test]
    fn move_mutated_paths_includes_the_source() {
        let op = PatchOp::Move {
            from: "/tension/conflict".into(),
            path: "/landmarks/0/name".into(),
        };
        assert_eq!(op.mutated_paths(), vec!["/tension/conflict", "/landmarks/0/name"]);
    }

    #[test]
    fn replace_mutated_paths_is_just_write_path() {
        let op = PatchOp::Replace {
            path: "/world_name".into(),
            value: serde_json::json!("Kaelveth"),
        };
        assert_eq!(op.mutated_paths(), vec!["/world_name"]);
    }

    #[test]
    fn test_op_has_no_write_path() {
        let op = PatchOp::Test {
            path: "/world_name".into(),
            value: serde_json::json!("Kaelveth"),
        };
        assert_eq!(op.write_path(), None);
    }

    #[test]
    fn serde_roundtrip() {
        let op = PatchOp::Replace {
            path: "/aesthetic_mood".into(),
            value: serde_json::json!("bioluminescent dusk"),
        };
        let json = serde_json::to_string(&op).unwrap();
        let back: PatchOp = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}
