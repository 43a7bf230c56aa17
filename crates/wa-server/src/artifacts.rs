//! Derives a team's current canon and prompt pack by folding its match
//! event log, per the event-sourced read model described for the artifacts
//! and judging routes: nothing is persisted but the events themselves.

use wa_contracts::{Canon, MatchEvent, MatchEventKind, PromptPack, TeamId};

/// Everything that can go wrong folding a team's event log into its
/// artifacts.
#[derive(Debug, thiserror::Error)]
pub enum FoldError {
    /// A `canon_patch_applied` event's patch could not be reapplied.
    #[error("replaying canon_patch_applied failed: {0}")]
    Canon(#[from] wa_canon::CanonError),
}

/// A team's derived artifacts as of the latest event fold.
#[derive(Debug, Clone, Default)]
pub struct TeamArtifacts {
    /// The team's canon, once `canon_initialized` has been seen.
    pub canon: Option<Canon>,
    /// The team's prompt pack, once `prompt_pack_generated` has been seen.
    pub prompt_pack: Option<PromptPack>,
}

/// Fold every event belonging to `team` out of `events` into that team's
/// current artifacts.
///
/// # Errors
///
/// Returns [`FoldError`] if a `canon_patch_applied` event's patch cannot be
/// reapplied to the canon reconstructed so far.
pub fn fold_team(events: &[MatchEvent], team: TeamId) -> Result<TeamArtifacts, FoldError> {
    let mut artifacts = TeamArtifacts::default();
    let mut store = None;

    for event in events {
        if event.team_id != Some(team) {
            continue;
        }

        match &event.kind {
            MatchEventKind::CanonInitialized { canon, .. } => {
                store = Some(wa_canon::CanonStore::seeded(canon.clone()));
            }
            MatchEventKind::CanonPatchApplied { patch, phase, .. } => {
                if let Some(store) = store.as_mut() {
                    store.apply(patch, *phase)?;
                }
            }
            MatchEventKind::PromptPackGenerated { prompt_pack } => {
                artifacts.prompt_pack = Some(prompt_pack.clone());
            }
            _ => {}
        }
    }

    artifacts.canon = store.map(|s| s.canon().clone());
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;
    use wa_contracts::PatchOp;

    fn event(team: TeamId, kind: MatchEventKind, seq: i64) -> MatchEvent {
        MatchEvent {
            id: Uuid::new_v4(),
            seq,
            ts: Utc::now(),
            match_id: Uuid::new_v4(),
            team_id: Some(team),
            kind,
        }
    }

    #[test]
    fn fold_returns_defaults_before_any_events() {
        let artifacts = fold_team(&[], TeamId::A).unwrap();
        assert!(artifacts.canon.is_none());
        assert!(artifacts.prompt_pack.is_none());
    }

    #[test]
    fn fold_ignores_the_other_teams_events() {
        let (_, hash) = wa_canon::CanonStore::init().unwrap();
        let canon = Canon::placeholder();
        let events = vec![event(
            TeamId::B,
            MatchEventKind::CanonInitialized { canon, canon_hash: hash },
            1,
        )];
        let artifacts = fold_team(&events, TeamId::A).unwrap();
        assert!(artifacts.canon.is_none());
    }

    #[test]
    fn fold_replays_patches_in_seq_order() {
        let (store, hash) = wa_canon::CanonStore::init().unwrap();
        let mut events = vec![event(
            TeamId::A,
            MatchEventKind::CanonInitialized { canon: store.canon().clone(), canon_hash: hash },
            1,
        )];

        let patch = vec![PatchOp::Replace {
            path: "/world_name".into(),
            value: serde_json::json!("Glass Reef"),
        }];
        events.push(event(
            TeamId::A,
            MatchEventKind::CanonPatchApplied {
                phase: 1,
                round: 1,
                turn_id: "t1".into(),
                patch,
                canon_before_hash: "before".into(),
                canon_after_hash: "after".into(),
            },
            2,
        ));

        let artifacts = fold_team(&events, TeamId::A).unwrap();
        assert_eq!(artifacts.canon.unwrap().world_name, "Glass Reef");
    }
}
