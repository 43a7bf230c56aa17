// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-phase write-scope predicates.

/// Returns a predicate over JSON-Pointer paths describing which paths
/// `phase` permits a patch to write.
///
/// - Phase 1: `/world_name`, `/governing_logic`, `/aesthetic_mood`, plus the
///   placeholder `/inhabitants` and `/hero_image_description` subtrees —
///   neither is bound to a phase of its own, so they are filled in early
///   alongside the phase's other writes.
/// - Phase 2: `/landmarks` only.
/// - Phase 3: `/tension` only.
/// - Phase 4: any path (the resulting document must still satisfy the
///   completed-canon schema, checked separately by the caller).
/// - Phase 5: read-only — no path is permitted.
#[must_use]
pub fn write_restrictions(phase: u8) -> Box<dyn Fn(&str) -> bool> {
    match phase {
        4 => Box::new(|_path: &str| true),
        _ => {
            let roots = write_prefixes(phase);
            Box::new(move |path: &str| roots.iter().any(|root| starts_with_root(path, root)))
        }
    }
}

/// The fixed JSON-Pointer roots `phase` permits a patch to write under.
/// Phase 4 returns `["/"]`, standing for "any path" (see
/// [`write_restrictions`]); phase 5 and beyond return an empty list.
#[must_use]
pub fn write_prefixes(phase: u8) -> Vec<&'static str> {
    match phase {
        1 => vec![
            "/world_name",
            "/governing_logic",
            "/aesthetic_mood",
            "/inhabitants",
            "/hero_image_description",
        ],
        2 => vec!["/landmarks"],
        3 => vec!["/tension"],
        4 => vec!["/"],
        _ => vec![],
    }
}

fn starts_with_root(path: &str, root: &str) -> bool {
    path == root || path.starts_with(&format!("{root}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase1_permits_its_own_roots_only() {
        let allowed = write_restrictions(1);
        assert!(allowed("/world_name"));
        assert!(allowed("/governing_logic"));
        assert!(allowed("/inhabitants/appearance"));
        assert!(!allowed("/landmarks/0/name"));
        assert!(!allowed("/tension/conflict"));
    }

    #[test]
    fn phase2_permits_landmarks_only() {
        let allowed = write_restrictions(2);
        assert!(allowed("/landmarks"));
        assert!(allowed("/landmarks/0/name"));
        assert!(!allowed("/world_name"));
    }

    #[test]
    fn phase5_is_read_only() {
        let allowed = write_restrictions(5);
        assert!(!allowed("/world_name"));
        assert!(!allowed("/landmarks/0/name"));
    }

    #[test]
    fn phase4_permits_everything() {
        let allowed = write_restrictions(4);
        assert!(allowed("/world_name"));
        assert!(allowed("/inhabitants/appearance"));
    }

    #[test]
    fn write_prefixes_matches_restrictions() {
        for phase in 1..=3u8 {
            let allowed = write_restrictions(phase);
            for prefix in write_prefixes(phase) {
                assert!(allowed(prefix), "phase {phase} prefix {prefix} should be allowed");
            }
        }
    }
}
