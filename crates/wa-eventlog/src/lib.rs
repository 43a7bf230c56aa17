// SPDX-License-Identifier: MIT OR Apache-2.0
//! Durable, monotonic, gap-free per-match event log, backed by SQLite.
//!
//! `seq` assignment happens inside the same transaction as the insert, so
//! append is atomic: an event becomes visible to readers only once it and
//! its `seq` are both committed. Appends for a given match are expected to
//! be serialized by the caller (the Match Runner holds a single-writer
//! discipline per match); the pool itself is capped at one writer
//! connection so two concurrent appends to different matches still cannot
//! race each other's `seq` assignment inside SQLite.

use chrono::Utc;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;
use wa_contracts::{Match, MatchEvent, MatchEventKind, MatchStatus, TeamId};

/// Everything that can go wrong persisting or reading events.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// The underlying database call failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored row could not be decoded back into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// An event not yet assigned an `id`, `seq`, or `ts` — the shape a caller
/// builds before handing it to [`EventLog::append`].
#[derive(Debug, Clone)]
pub struct PendingEvent {
    /// The match this event belongs to.
    pub match_id: Uuid,
    /// The team this event concerns, if any.
    pub team_id: Option<TeamId>,
    /// The event payload.
    pub kind: MatchEventKind,
}

/// SQLite-backed store for the `matches` and `events` tables.
#[derive(Debug, Clone)]
pub struct EventLog {
    pool: SqlitePool,
}

impl EventLog {
    /// Connect to (and, if needed, create) the database at `url` and ensure
    /// its schema exists.
    ///
    /// `url` is an sqlx SQLite connection string, e.g. `sqlite://wba.db` or
    /// `sqlite::memory:`.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Database`] if the connection or schema
    /// migration fails.
    pub async fn connect(url: &str) -> Result<Self, EventLogError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        let log = Self { pool };
        log.migrate().await?;
        Ok(log)
    }

    async fn migrate(&self) -> Result<(), EventLogError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS matches (
                id TEXT PRIMARY KEY,
                seed INTEGER NOT NULL,
                tier INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                challenge TEXT,
                final_canon_hash_a TEXT,
                final_canon_hash_b TEXT,
                error TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS events (
                match_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                id TEXT NOT NULL,
                ts TEXT NOT NULL,
                team_id TEXT,
                data TEXT NOT NULL,
                PRIMARY KEY (match_id, seq)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a new match record.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Database`] on a write failure, including a
    /// primary-key collision on an already-existing `match_id`.
    pub async fn create_match(&self, m: &Match) -> Result<(), EventLogError> {
        let challenge_json = m
            .challenge
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| EventLogError::Corrupt(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO matches (id, seed, tier, status, created_at, completed_at, challenge, final_canon_hash_a, final_canon_hash_b, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(m.id.to_string())
        .bind(m.seed as i64)
        .bind(m.tier as i64)
        .bind(status_tag(m.status))
        .bind(m.created_at.to_rfc3339())
        .bind(m.completed_at.map(|t| t.to_rfc3339()))
        .bind(challenge_json)
        .bind(&m.final_canon_hash_a)
        .bind(&m.final_canon_hash_b)
        .bind(&m.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update a match's terminal fields (status, completion time, final
    /// hashes, error).
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Database`] on a write failure.
    pub async fn update_match(&self, m: &Match) -> Result<(), EventLogError> {
        sqlx::query(
            r"
            UPDATE matches
            SET status = ?, completed_at = ?, final_canon_hash_a = ?, final_canon_hash_b = ?, error = ?
            WHERE id = ?
            ",
        )
        .bind(status_tag(m.status))
        .bind(m.completed_at.map(|t| t.to_rfc3339()))
        .bind(&m.final_canon_hash_a)
        .bind(&m.final_canon_hash_b)
        .bind(&m.error)
        .bind(m.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch one match by id.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Database`] on a read failure, or
    /// [`EventLogError::Corrupt`] if the stored row cannot be decoded.
    pub async fn get_match(&self, match_id: Uuid) -> Result<Option<Match>, EventLogError> {
        let row = sqlx::query("SELECT * FROM matches WHERE id = ?")
            .bind(match_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(decode_match).transpose()
    }

    /// List every match, most recently created first.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Database`] on a read failure, or
    /// [`EventLogError::Corrupt`] if a stored row cannot be decoded.
    pub async fn list_matches(&self) -> Result<Vec<Match>, EventLogError> {
        let rows = sqlx::query("SELECT * FROM matches ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(decode_match).collect()
    }

    /// Append `pending` to its match's log, assigning the next `seq` in the
    /// same transaction as the insert.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Database`] on a write failure.
    pub async fn append(&self, pending: PendingEvent) -> Result<MatchEvent, EventLogError> {
        let mut tx = self.pool.begin().await?;

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE match_id = ?",
        )
        .bind(pending.match_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let event = MatchEvent {
            id: Uuid::new_v4(),
            seq: next_seq,
            ts: Utc::now(),
            match_id: pending.match_id,
            team_id: pending.team_id,
            kind: pending.kind,
        };

        let data = serde_json::to_string(&event.kind).map_err(|e| EventLogError::Corrupt(e.to_string()))?;

        sqlx::query(
            "INSERT INTO events (match_id, seq, id, ts, team_id, data) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(event.match_id.to_string())
        .bind(event.seq)
        .bind(event.id.to_string())
        .bind(event.ts.to_rfc3339())
        .bind(event.team_id.map(|t| t.to_string()))
        .bind(data)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(match_id = %event.match_id, seq = event.seq, "event appended");

        Ok(event)
    }

    /// List every event for `match_id` with `seq > after_seq`, ordered by
    /// `seq` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Database`] on a read failure, or
    /// [`EventLogError::Corrupt`] if a stored row cannot be decoded.
    pub async fn list(&self, match_id: Uuid, after_seq: i64) -> Result<Vec<MatchEvent>, EventLogError> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE match_id = ? AND seq > ? ORDER BY seq ASC",
        )
        .bind(match_id.to_string())
        .bind(after_seq)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_event).collect()
    }
}

fn status_tag(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Running => "running",
        MatchStatus::Completed => "completed",
        MatchStatus::Failed => "failed",
    }
}

fn decode_match(row: SqliteRow) -> Result<Match, EventLogError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    let challenge: Option<String> = row.try_get("challenge")?;
    let tier: i64 = row.try_get("tier")?;

    Ok(Match {
        id: Uuid::parse_str(&id).map_err(|e| EventLogError::Corrupt(e.to_string()))?,
        seed: row.try_get::<i64, _>("seed")? as u64,
        tier: wa_contracts::Tier::try_from(tier as u8)
            .map_err(|t| EventLogError::Corrupt(format!("invalid tier {t}")))?,
        status: match status.as_str() {
            "running" => MatchStatus::Running,
            "completed" => MatchStatus::Completed,
            "failed" => MatchStatus::Failed,
            other => return Err(EventLogError::Corrupt(format!("invalid status {other}"))),
        },
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| EventLogError::Corrupt(e.to_string()))?
            .with_timezone(&Utc),
        completed_at: completed_at
            .map(|t| chrono::DateTime::parse_from_rfc3339(&t).map(|d| d.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| EventLogError::Corrupt(e.to_string()))?,
        challenge: challenge
            .map(|c| serde_json::from_str(&c))
            .transpose()
            .map_err(|e| EventLogError::Corrupt(e.to_string()))?,
        final_canon_hash_a: row.try_get("final_canon_hash_a")?,
        final_canon_hash_b: row.try_get("final_canon_hash_b")?,
        error: row.try_get("error")?,
    })
}

fn decode_event(row: SqliteRow) -> Result<MatchEvent, EventLogError> {
    let id: String = row.try_get("id")?;
    let match_id: String = row.try_get("match_id")?;
    let ts: String = row.try_get("ts")?;
    let team_id: Option<String> = row.try_get("team_id")?;
    let data: String = row.try_get("data")?;

    Ok(MatchEvent {
        id: Uuid::parse_str(&id).map_err(|e| EventLogError::Corrupt(e.to_string()))?,
        seq: row.try_get("seq")?,
        ts: chrono::DateTime::parse_from_rfc3339(&ts)
            .map_err(|e| EventLogError::Corrupt(e.to_string()))?
            .with_timezone(&Utc),
        match_id: Uuid::parse_str(&match_id).map_err(|e| EventLogError::Corrupt(e.to_string()))?,
        team_id: team_id
            .map(|t| match t.as_str() {
                "A" => Ok(TeamId::A),
                "B" => Ok(TeamId::B),
                other => Err(EventLogError::Corrupt(format!("invalid team_id {other}"))),
            })
            .transpose()?,
        kind: serde_json::from_str(&data).map_err(|e| EventLogError::Corrupt(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_match() -> Match {
        Match {
            id: Uuid::new_v4(),
            seed: 42,
            tier: wa_contracts::Tier::One,
            status: MatchStatus::Running,
            created_at: Utc::now(),
            completed_at: None,
            challenge: None,
            final_canon_hash_a: None,
            final_canon_hash_b: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn append_assigns_gap_free_sequence() {
        let log = EventLog::connect("sqlite::memory:").await.unwrap();
        let m = sample_match();
        log.create_match(&m).await.unwrap();

        for _ in 0..3 {
            log.append(PendingEvent {
                match_id: m.id,
                team_id: None,
                kind: MatchEventKind::PhaseStarted { phase: 1, round_count: 3 },
            })
            .await
            .unwrap();
        }

        let events = log.list(m.id, 0).await.unwrap();
        let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn list_after_seq_excludes_earlier_events() {
        let log = EventLog::connect("sqlite::memory:").await.unwrap();
        let m = sample_match();
        log.create_match(&m).await.unwrap();

        for _ in 0..5 {
            log.append(PendingEvent {
                match_id: m.id,
                team_id: None,
                kind: MatchEventKind::PhaseStarted { phase: 1, round_count: 3 },
            })
            .await
            .unwrap();
        }

        let events = log.list(m.id, 3).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 4);
    }

    #[tokio::test]
    async fn match_round_trips_through_storage() {
        let log = EventLog::connect("sqlite::memory:").await.unwrap();
        let mut m = sample_match();
        log.create_match(&m).await.unwrap();

        m.status = MatchStatus::Completed;
        m.completed_at = Some(Utc::now());
        m.final_canon_hash_a = Some("aaa".into());
        m.final_canon_hash_b = Some("bbb".into());
        log.update_match(&m).await.unwrap();

        let fetched = log.get_match(m.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, MatchStatus::Completed);
        assert_eq!(fetched.final_canon_hash_a.as_deref(), Some("aaa"));
    }
}
