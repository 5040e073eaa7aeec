//! Store methods for the reputation ledger and its audit trail.

use super::{bad_column, WorldStore};
use crate::{
    error::{WorldError, WorldResult},
    reputation_subsystem::{ReputationEvent, ReputationRecord, ReputationTarget, TargetType},
    standing::{ReputationDimension, ReputationScore, Standing},
    types::{from_millis, to_millis},
};
use rusqlite::{params, OptionalExtension, Row};

const RECORD_COLUMNS: &str = "record_id, player_id, target_type, target_id,
    respect, fear, trust, heat, combined_score, standing, last_updated";

fn parse_target_type(idx: usize, s: &str) -> rusqlite::Result<TargetType> {
    s.parse().map_err(|e: WorldError| bad_column(idx, e.to_string()))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ReputationRecord> {
    let target_type: String = row.get(2)?;
    let standing: String = row.get(9)?;
    Ok(ReputationRecord {
        record_id: row.get(0)?,
        player_id: row.get(1)?,
        target: ReputationTarget {
            target_type: parse_target_type(2, &target_type)?,
            target_id:   row.get(3)?,
        },
        score: ReputationScore {
            respect: row.get(4)?,
            fear:    row.get(5)?,
            trust:   row.get(6)?,
            heat:    row.get(7)?,
        },
        combined_score: row.get(8)?,
        standing: Standing::parse(&standing)
            .ok_or_else(|| bad_column(9, format!("unknown standing '{standing}'")))?,
        last_updated: from_millis(row.get(10)?),
    })
}

/// `propagated_from` is stored as "type:id".
fn encode_target(t: &ReputationTarget) -> String {
    format!("{}:{}", t.target_type, t.target_id)
}

fn decode_target(idx: usize, s: &str) -> rusqlite::Result<ReputationTarget> {
    let (ty, id) = s
        .split_once(':')
        .ok_or_else(|| bad_column(idx, format!("malformed target '{s}'")))?;
    Ok(ReputationTarget { target_type: parse_target_type(idx, ty)?, target_id: id.to_string() })
}

fn dimension_from_str(idx: usize, s: &str) -> rusqlite::Result<ReputationDimension> {
    ReputationDimension::ALL
        .into_iter()
        .find(|d| d.as_str() == s)
        .ok_or_else(|| bad_column(idx, format!("unknown dimension '{s}'")))
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ReputationEvent> {
    let target_type: String = row.get(1)?;
    let dimension: String = row.get(3)?;
    let metadata: String = row.get(8)?;
    let propagated_from: Option<String> = row.get(9)?;
    Ok(ReputationEvent {
        player_id: row.get(0)?,
        target: ReputationTarget {
            target_type: parse_target_type(1, &target_type)?,
            target_id:   row.get(2)?,
        },
        dimension:         dimension_from_str(3, &dimension)?,
        old_value:         row.get(4)?,
        new_value:         row.get(5)?,
        reason:            row.get(6)?,
        related_player_id: row.get(7)?,
        metadata: serde_json::from_str(&metadata).map_err(|e| bad_column(8, e.to_string()))?,
        propagated_from: propagated_from
            .as_deref()
            .map(|s| decode_target(9, s))
            .transpose()?,
        created_at: from_millis(row.get(10)?),
    })
}

impl WorldStore {
    pub fn reputation_record(
        &self,
        player_id: &str,
        target:    &ReputationTarget,
    ) -> WorldResult<Option<ReputationRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM reputation_records
                          WHERE player_id = ?1 AND target_type = ?2 AND target_id = ?3"),
                params![player_id, target.target_type.as_str(), target.target_id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Insert the record, or overwrite the score columns of the existing
    /// row for the same player × target.
    pub fn upsert_reputation_record(&self, r: &ReputationRecord) -> WorldResult<()> {
        self.conn.execute(
            &format!("INSERT INTO reputation_records ({RECORD_COLUMNS})
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                      ON CONFLICT(player_id, target_type, target_id) DO UPDATE SET
                          respect = excluded.respect,
                          fear = excluded.fear,
                          trust = excluded.trust,
                          heat = excluded.heat,
                          combined_score = excluded.combined_score,
                          standing = excluded.standing,
                          last_updated = excluded.last_updated"),
            params![
                r.record_id,
                r.player_id,
                r.target.target_type.as_str(),
                r.target.target_id,
                r.score.respect,
                r.score.fear,
                r.score.trust,
                r.score.heat,
                r.combined_score,
                r.standing.as_str(),
                to_millis(r.last_updated),
            ],
        )?;
        Ok(())
    }

    pub fn insert_reputation_event(&self, e: &ReputationEvent) -> WorldResult<()> {
        self.conn.execute(
            "INSERT INTO reputation_events (
                player_id, target_type, target_id, dimension, old_value, new_value,
                reason, related_player_id, metadata, propagated_from, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                e.player_id,
                e.target.target_type.as_str(),
                e.target.target_id,
                e.dimension.as_str(),
                e.old_value,
                e.new_value,
                e.reason,
                e.related_player_id,
                serde_json::to_string(&e.metadata)?,
                e.propagated_from.as_ref().map(encode_target),
                to_millis(e.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn reputation_records_for_player(&self, player_id: &str) -> WorldResult<Vec<ReputationRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM reputation_records
             WHERE player_id = ?1
             ORDER BY target_type ASC, target_id ASC"
        ))?;
        let records = stmt
            .query_map(params![player_id], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Audit rows for one relationship, newest first.
    pub fn reputation_history(
        &self,
        player_id: &str,
        target:    &ReputationTarget,
        limit:     usize,
    ) -> WorldResult<Vec<ReputationEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT player_id, target_type, target_id, dimension, old_value, new_value,
                    reason, related_player_id, metadata, propagated_from, created_at
             FROM reputation_events
             WHERE player_id = ?1 AND target_type = ?2 AND target_id = ?3
             ORDER BY id DESC
             LIMIT ?4",
        )?;
        let events = stmt
            .query_map(
                params![player_id, target.target_type.as_str(), target.target_id, limit as i64],
                event_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // ── Test / summary helpers ─────────────────────────────────

    /// Number of audit rows written for a player (for tests).
    pub fn reputation_event_count(&self, player_id: &str) -> WorldResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM reputation_events WHERE player_id = ?1",
            params![player_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Number of reputation records held for a player (for tests).
    pub fn reputation_record_count(&self, player_id: &str) -> WorldResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM reputation_records WHERE player_id = ?1",
            params![player_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
