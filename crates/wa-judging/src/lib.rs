// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Judging Store: blind-ID assignment for a completed match, score
//! submission, and the private `blind_id -> team_id` mapping a reveal
//! discloses.
//!
//! Mirrors `wa-eventlog`'s SQLite-backed, single-pool, migrate-on-connect
//! shape, but owns its own two tables (`blind_mapping`, `judging_scores`)
//! rather than sharing `wa-eventlog`'s connection, keeping the judging
//! concern testable without the event log.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;
use wa_contracts::{Canon, PromptPack, TeamId};

/// The two labels a match's teams are blinded behind during judging.
pub const WORLD_1: &str = "WORLD-1";
/// See [`WORLD_1`].
pub const WORLD_2: &str = "WORLD-2";

/// The fixed weights (summing to 100) applied to a score submission's five
/// entries, per `spec.md` §4.9.
pub const SCORE_WEIGHTS: [u32; 5] = [25, 20, 20, 20, 15];

/// Everything that can go wrong persisting or reading judging state.
#[derive(Debug, Error)]
pub enum JudgingError {
    /// The underlying database call failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored row could not be decoded back into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// A submitted score fell outside `[1, 5]`.
    #[error("score {0} is outside the permitted [1, 5] range")]
    ScoreOutOfRange(u8),
    /// A submission named a `blind_id` this match has no mapping for.
    #[error("unknown blind_id {0} for this match")]
    UnknownBlindId(String),
}

/// The private `blind_id -> team_id` assignment for one match, persisted the
/// first time it is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlindMapping {
    /// The match this mapping belongs to.
    pub match_id: Uuid,
    /// Team A's blind id: either [`WORLD_1`] or [`WORLD_2`].
    pub team_a_blind_id: &'static str,
    /// Team B's blind id: the other of [`WORLD_1`]/[`WORLD_2`].
    pub team_b_blind_id: &'static str,
}

impl BlindMapping {
    /// The blind id assigned to `team`.
    #[must_use]
    pub fn blind_id_for(&self, team: TeamId) -> &'static str {
        match team {
            TeamId::A => self.team_a_blind_id,
            TeamId::B => self.team_b_blind_id,
        }
    }

    /// The team behind `blind_id`, if it belongs to this mapping.
    #[must_use]
    pub fn team_for(&self, blind_id: &str) -> Option<TeamId> {
        if blind_id == self.team_a_blind_id {
            Some(TeamId::A)
        } else if blind_id == self.team_b_blind_id {
            Some(TeamId::B)
        } else {
            None
        }
    }
}

/// One team's artifacts under its blind label.
#[derive(Debug, Clone, Serialize)]
pub struct BlindEntry {
    /// This entry's blind id.
    pub blind_id: &'static str,
    /// The team's canon.
    pub canon: Canon,
    /// The team's prompt pack.
    pub prompt_pack: PromptPack,
}

/// The full package a judge sees: both teams' artifacts, unlabeled by real
/// team identity.
#[derive(Debug, Clone, Serialize)]
pub struct BlindJudgingPackage {
    /// Whichever team was assigned [`WORLD_1`].
    pub world_1: BlindEntry,
    /// Whichever team was assigned [`WORLD_2`].
    pub world_2: BlindEntry,
}

/// A caller-supplied score for one blind entry. Five scores, each `[1, 5]`,
/// ordered to match [`SCORE_WEIGHTS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSubmission {
    /// Free-text judge identifier.
    pub judge: String,
    /// Which blind entry this score is for.
    pub blind_id: String,
    /// Five scores in `[1, 5]`.
    pub scores: [u8; 5],
    /// Optional free-text justification.
    pub notes: Option<String>,
}

/// A persisted score, as returned by [`JudgingStore::list_scores`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgingScoreRecord {
    /// The judge who submitted this score.
    pub judge: String,
    /// Which blind entry this score is for.
    pub blind_id: String,
    /// The five raw scores.
    pub scores: [u8; 5],
    /// Optional free-text justification.
    pub notes: Option<String>,
    /// When this score was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl JudgingScoreRecord {
    /// The weighted total over [`SCORE_WEIGHTS`], on a `[1, 5]` scale.
    #[must_use]
    pub fn weighted_total(&self) -> f64 {
        weighted_total(&self.scores)
    }
}

/// Compute the `25/20/20/20/15`-weighted total of five `[1, 5]` scores.
#[must_use]
pub fn weighted_total(scores: &[u8; 5]) -> f64 {
    let sum: u32 = scores.iter().zip(SCORE_WEIGHTS).map(|(s, w)| u32::from(*s) * w).sum();
    f64::from(sum) / 100.0
}

/// SQLite-backed store for the `blind_mapping` and `judging_scores` tables.
#[derive(Debug, Clone)]
pub struct JudgingStore {
    pool: SqlitePool,
}

impl JudgingStore {
    /// Connect to (and, if needed, create) the database at `url` and ensure
    /// its schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`JudgingError::Database`] if the connection or schema
    /// migration fails.
    pub async fn connect(url: &str) -> Result<Self, JudgingError> {
        let pool = SqlitePoolOptions::new().max_connections(1).connect(url).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), JudgingError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS blind_mapping (
                match_id TEXT PRIMARY KEY,
                team_a_blind_id TEXT NOT NULL,
                team_b_blind_id TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS judging_scores (
                match_id TEXT NOT NULL,
                judge TEXT NOT NULL,
                blind_id TEXT NOT NULL,
                scores TEXT NOT NULL,
                notes TEXT,
                submitted_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch `match_id`'s blind mapping, assigning one deterministically
    /// from `match_id` on first call. Subsequent calls, concurrent or not,
    /// always return the mapping persisted by whichever call won the race
    /// to insert first.
    ///
    /// # Errors
    ///
    /// Returns [`JudgingError::Database`] on a storage failure, or
    /// [`JudgingError::Corrupt`] if a stored row cannot be decoded.
    pub async fn get_or_assign_mapping(&self, match_id: Uuid) -> Result<BlindMapping, JudgingError> {
        if let Some(existing) = self.load_mapping(match_id).await? {
            return Ok(existing);
        }

        let swapped = ChaCha8Rng::seed_from_u64(seed_from_uuid(match_id)).gen_bool(0.5);
        let (team_a_blind_id, team_b_blind_id) =
            if swapped { (WORLD_2, WORLD_1) } else { (WORLD_1, WORLD_2) };

        sqlx::query(
            "INSERT INTO blind_mapping (match_id, team_a_blind_id, team_b_blind_id) VALUES (?, ?, ?)
             ON CONFLICT(match_id) DO NOTHING",
        )
        .bind(match_id.to_string())
        .bind(team_a_blind_id)
        .bind(team_b_blind_id)
        .execute(&self.pool)
        .await?;

        self.load_mapping(match_id)
            .await?
            .ok_or_else(|| JudgingError::Corrupt("mapping vanished immediately after insert".into()))
    }

    async fn load_mapping(&self, match_id: Uuid) -> Result<Option<BlindMapping>, JudgingError> {
        let row = sqlx::query("SELECT * FROM blind_mapping WHERE match_id = ?")
            .bind(match_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_mapping(match_id, &r)).transpose()
    }

    /// Assemble the blind package for `match_id` from each team's already-
    /// retrieved canon and prompt pack, assigning the mapping if needed.
    ///
    /// # Errors
    ///
    /// Returns [`JudgingError`] if the mapping cannot be loaded or assigned.
    pub async fn blind_package(
        &self,
        match_id: Uuid,
        team_a: (Canon, PromptPack),
        team_b: (Canon, PromptPack),
    ) -> Result<BlindJudgingPackage, JudgingError> {
        let mapping = self.get_or_assign_mapping(match_id).await?;
        let (canon_a, pack_a) = team_a;
        let (canon_b, pack_b) = team_b;
        let entries: HashMapEntries = [
            (mapping.team_a_blind_id, canon_a, pack_a),
            (mapping.team_b_blind_id, canon_b, pack_b),
        ];
        let world_1 = entries
            .iter()
            .find(|(blind_id, ..)| *blind_id == WORLD_1)
            .map(|(blind_id, canon, pack)| BlindEntry { blind_id, canon: canon.clone(), prompt_pack: pack.clone() })
            .expect("WORLD_1 is always assigned to exactly one team");
        let world_2 = entries
            .iter()
            .find(|(blind_id, ..)| *blind_id == WORLD_2)
            .map(|(blind_id, canon, pack)| BlindEntry { blind_id, canon: canon.clone(), prompt_pack: pack.clone() })
            .expect("WORLD_2 is always assigned to exactly one team");
        Ok(BlindJudgingPackage { world_1, world_2 })
    }

    /// Record a judge's score submission after validating every score falls
    /// in `[1, 5]` and `blind_id` belongs to this match's mapping.
    ///
    /// # Errors
    ///
    /// Returns [`JudgingError::ScoreOutOfRange`], [`JudgingError::UnknownBlindId`],
    /// or [`JudgingError::Database`].
    pub async fn submit_score(
        &self,
        match_id: Uuid,
        submission: ScoreSubmission,
    ) -> Result<JudgingScoreRecord, JudgingError> {
        for score in submission.scores {
            if !(1..=5).contains(&score) {
                return Err(JudgingError::ScoreOutOfRange(score));
            }
        }

        let mapping = self.get_or_assign_mapping(match_id).await?;
        if mapping.team_for(&submission.blind_id).is_none() {
            return Err(JudgingError::UnknownBlindId(submission.blind_id));
        }

        let submitted_at = Utc::now();
        let scores_json = serde_json::to_string(&submission.scores).map_err(|e| JudgingError::Corrupt(e.to_string()))?;

        sqlx::query(
            "INSERT INTO judging_scores (match_id, judge, blind_id, scores, notes, submitted_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(match_id.to_string())
        .bind(&submission.judge)
        .bind(&submission.blind_id)
        .bind(&scores_json)
        .bind(&submission.notes)
        .bind(submitted_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!(match_id = %match_id, judge = %submission.judge, blind_id = %submission.blind_id, "judging score recorded");

        Ok(JudgingScoreRecord {
            judge: submission.judge,
            blind_id: submission.blind_id,
            scores: submission.scores,
            notes: submission.notes,
            submitted_at,
        })
    }

    /// List every score recorded for `match_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`JudgingError::Database`] on a read failure, or
    /// [`JudgingError::Corrupt`] if a stored row cannot be decoded.
    pub async fn list_scores(&self, match_id: Uuid) -> Result<Vec<JudgingScoreRecord>, JudgingError> {
        let rows = sqlx::query("SELECT * FROM judging_scores WHERE match_id = ? ORDER BY submitted_at ASC")
            .bind(match_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| decode_score(&r)).collect()
    }

    /// Reveal `match_id`'s blind mapping, if one has been assigned.
    ///
    /// # Errors
    ///
    /// Returns [`JudgingError::Database`] on a read failure.
    pub async fn reveal(&self, match_id: Uuid) -> Result<Option<BlindMapping>, JudgingError> {
        self.load_mapping(match_id).await
    }
}

type HashMapEntries = [(&'static str, Canon, PromptPack); 2];

/// Fold a [`Uuid`] into a `u64` RNG seed, mirroring `wa_challenge`'s
/// `(seed, tier)` folding so both crates share the "derive a seeded RNG from
/// caller-stable input" idiom.
fn seed_from_uuid(match_id: Uuid) -> u64 {
    let bytes = match_id.as_bytes();
    let high = u64::from_be_bytes(bytes[0..8].try_into().expect("8 bytes"));
    let low = u64::from_be_bytes(bytes[8..16].try_into().expect("8 bytes"));
    high ^ low
}

fn decode_mapping(match_id: Uuid, row: &SqliteRow) -> Result<BlindMapping, JudgingError> {
    let team_a: String = row.try_get("team_a_blind_id")?;
    let team_b: String = row.try_get("team_b_blind_id")?;
    Ok(BlindMapping {
        match_id,
        team_a_blind_id: static_label(&team_a)?,
        team_b_blind_id: static_label(&team_b)?,
    })
}

fn static_label(value: &str) -> Result<&'static str, JudgingError> {
    match value {
        WORLD_1 => Ok(WORLD_1),
        WORLD_2 => Ok(WORLD_2),
        other => Err(JudgingError::Corrupt(format!("invalid blind id {other}"))),
    }
}

fn decode_score(row: &SqliteRow) -> Result<JudgingScoreRecord, JudgingError> {
    let judge: String = row.try_get("judge")?;
    let blind_id: String = row.try_get("blind_id")?;
    let scores_json: String = row.try_get("scores")?;
    let notes: Option<String> = row.try_get("notes")?;
    let submitted_at: String = row.try_get("submitted_at")?;

    let scores: [u8; 5] =
        serde_json::from_str(&scores_json).map_err(|e| JudgingError::Corrupt(e.to_string()))?;

    Ok(JudgingScoreRecord {
        judge,
        blind_id,
        scores,
        notes,
        submitted_at: DateTime::parse_from_rfc3339(&submitted_at)
            .map_err(|e| JudgingError::Corrupt(e.to_string()))?
            .with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wa_contracts::{Inhabitants, Landmark, PromptEntry, Tension};

    fn sample_canon() -> Canon {
        Canon {
            world_name: "Kaelveth".into(),
            governing_logic: "Tides obey grief.".into(),
            aesthetic_mood: "bioluminescent dusk".into(),
            landmarks: vec![
                Landmark { name: "n".into(), description: "d".into(), significance: "s".into(), visual_key: "v".into() };
                3
            ],
            inhabitants: Inhabitants { appearance: "a".into(), culture_snapshot: "c".into(), relationship_to_place: "r".into() },
            tension: Tension { conflict: "c".into(), stakes: "s".into(), visual_manifestation: "v".into() },
            hero_image_description: "h".into(),
        }
    }

    fn sample_pack() -> PromptPack {
        let entry = |t: &str| PromptEntry { title: t.into(), prompt: format!("{t} prompt"), negative_prompt: None, aspect_ratio: None };
        PromptPack {
            hero_image: entry("hero"),
            landmark_triptych: vec![entry("l1"), entry("l2"), entry("l3")],
            inhabitant_portrait: entry("portrait"),
            tension_snapshot: entry("tension"),
        }
    }

    #[tokio::test]
    async fn mapping_is_assigned_once_and_stable() {
        let store = JudgingStore::connect("sqlite::memory:").await.unwrap();
        let match_id = Uuid::new_v4();

        let first = store.get_or_assign_mapping(match_id).await.unwrap();
        let second = store.get_or_assign_mapping(match_id).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first.team_a_blind_id, first.team_b_blind_id);
    }

    #[tokio::test]
    async fn mapping_is_deterministic_for_the_same_match_id() {
        let store_a = JudgingStore::connect("sqlite::memory:").await.unwrap();
        let store_b = JudgingStore::connect("sqlite::memory:").await.unwrap();
        let match_id = Uuid::new_v4();

        let a = store_a.get_or_assign_mapping(match_id).await.unwrap();
        let b = store_b.get_or_assign_mapping(match_id).await.unwrap();

        assert_eq!(a.team_a_blind_id, b.team_a_blind_id);
    }

    #[tokio::test]
    async fn blind_package_labels_both_worlds() {
        let store = JudgingStore::connect("sqlite::memory:").await.unwrap();
        let match_id = Uuid::new_v4();

        let package = store
            .blind_package(match_id, (sample_canon(), sample_pack()), (sample_canon(), sample_pack()))
            .await
            .unwrap();

        assert_eq!(package.world_1.blind_id, WORLD_1);
        assert_eq!(package.world_2.blind_id, WORLD_2);
    }

    #[tokio::test]
    async fn score_out_of_range_is_rejected() {
        let store = JudgingStore::connect("sqlite::memory:").await.unwrap();
        let match_id = Uuid::new_v4();
        store.get_or_assign_mapping(match_id).await.unwrap();

        let err = store
            .submit_score(
                match_id,
                ScoreSubmission { judge: "j1".into(), blind_id: WORLD_1.into(), scores: [6, 1, 1, 1, 1], notes: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JudgingError::ScoreOutOfRange(6)));
    }

    #[tokio::test]
    async fn unknown_blind_id_is_rejected() {
        let store = JudgingStore::connect("sqlite::memory:").await.unwrap();
        let match_id = Uuid::new_v4();

        let err = store
            .submit_score(
                match_id,
                ScoreSubmission { judge: "j1".into(), blind_id: "WORLD-3".into(), scores: [3, 3, 3, 3, 3], notes: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JudgingError::UnknownBlindId(_)));
    }

    #[tokio::test]
    async fn weighted_total_matches_fixed_weights() {
        let scores = [5, 5, 5, 5, 5];
        assert!((weighted_total(&scores) - 5.0).abs() < f64::EPSILON);

        let mixed = [4, 3, 5, 2, 1];
        let expected = (4.0 * 25.0 + 3.0 * 20.0 + 5.0 * 20.0 + 2.0 * 20.0 + 1.0 * 15.0) / 100.0;
        assert!((weighted_total(&mixed) - expected).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn reveal_returns_none_before_first_request() {
        let store = JudgingStore::connect("sqlite::memory:").await.unwrap();
        let match_id = Uuid::new_v4();
        assert!(store.reveal(match_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_scores_returns_submitted_scores_in_order() {
        let store = JudgingStore::connect("sqlite::memory:").await.unwrap();
        let match_id = Uuid::new_v4();
        store.get_or_assign_mapping(match_id).await.unwrap();

        store
            .submit_score(
                match_id,
                ScoreSubmission { judge: "j1".into(), blind_id: WORLD_1.into(), scores: [4, 4, 4, 4, 4], notes: None },
            )
            .await
            .unwrap();
        store
            .submit_score(
                match_id,
                ScoreSubmission { judge: "j2".into(), blind_id: WORLD_2.into(), scores: [3, 3, 3, 3, 3], notes: Some("solid".into()) },
            )
            .await
            .unwrap();

        let scores = store.list_scores(match_id).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].judge, "j1");
        assert_eq!(scores[1].notes.as_deref(), Some("solid"));
    }
}
