//! Store methods for district state, district events and trend samples.

use super::{bad_column, WorldStore};
use crate::{
    district_subsystem::{DistrictState, DistrictStatus},
    error::{WorldError, WorldResult},
    event::{DistrictEvent, DistrictEventType, ImpactDeltas},
    types::{from_millis, to_millis, Timestamp},
};
use rusqlite::{params, OptionalExtension, Row};

const EVENT_COLUMNS: &str = "event_id, district_id, event_type, severity,
    actor_player_id, target_player_id, crew_id,
    crime_impact, police_impact, property_impact, business_impact, activity_impact,
    heat_impact, tension_impact, metadata, processed, occurred_at";

const STATE_COLUMNS: &str = "district_id, crime_index, police_presence, property_values,
    business_health, street_activity, heat_level, crew_tension,
    daily_crime_count, daily_transaction_volume, active_businesses,
    status, last_calculated, last_status_change";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<DistrictEvent> {
    let event_type: String = row.get(2)?;
    let event_type: DistrictEventType = event_type
        .parse()
        .map_err(|e: WorldError| bad_column(2, e.to_string()))?;
    let metadata: String = row.get(14)?;
    let metadata = serde_json::from_str(&metadata).map_err(|e| bad_column(14, e.to_string()))?;
    Ok(DistrictEvent {
        event_id:         row.get(0)?,
        district_id:      row.get(1)?,
        event_type,
        severity:         row.get::<_, i64>(3)? as u8,
        actor_player_id:  row.get(4)?,
        target_player_id: row.get(5)?,
        crew_id:          row.get(6)?,
        impacts: ImpactDeltas {
            crime:    row.get(7)?,
            police:   row.get(8)?,
            property: row.get(9)?,
            business: row.get(10)?,
            activity: row.get(11)?,
            heat:     row.get(12)?,
            tension:  row.get(13)?,
        },
        metadata,
        processed:   row.get::<_, i64>(15)? != 0,
        occurred_at: from_millis(row.get(16)?),
    })
}

fn state_from_row(row: &Row<'_>) -> rusqlite::Result<DistrictState> {
    let status: String = row.get(11)?;
    let status = DistrictStatus::parse(&status)
        .ok_or_else(|| bad_column(11, format!("unknown district status '{status}'")))?;
    Ok(DistrictState {
        district_id:              row.get(0)?,
        crime_index:              row.get(1)?,
        police_presence:          row.get(2)?,
        property_values:          row.get(3)?,
        business_health:          row.get(4)?,
        street_activity:          row.get(5)?,
        heat_level:               row.get(6)?,
        crew_tension:             row.get(7)?,
        daily_crime_count:        row.get(8)?,
        daily_transaction_volume: row.get(9)?,
        active_businesses:        row.get(10)?,
        status,
        last_calculated:          from_millis(row.get(12)?),
        last_status_change:       row.get::<_, Option<i64>>(13)?.map(from_millis),
    })
}

impl WorldStore {
    // ── District state ─────────────────────────────────────────

    /// Insert the initial row for a district. No-op if one exists.
    pub fn seed_district_state(&self, s: &DistrictState) -> WorldResult<bool> {
        let inserted = self.conn.execute(
            &format!("INSERT OR IGNORE INTO district_states ({STATE_COLUMNS})
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"),
            params![
                s.district_id,
                s.crime_index,
                s.police_presence,
                s.property_values,
                s.business_health,
                s.street_activity,
                s.heat_level,
                s.crew_tension,
                s.daily_crime_count,
                s.daily_transaction_volume,
                s.active_businesses,
                s.status.as_str(),
                to_millis(s.last_calculated),
                s.last_status_change.map(to_millis),
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn district_state(&self, district_id: &str) -> WorldResult<Option<DistrictState>> {
        let state = self
            .conn
            .query_row(
                &format!("SELECT {STATE_COLUMNS} FROM district_states WHERE district_id = ?1"),
                params![district_id],
                state_from_row,
            )
            .optional()?;
        Ok(state)
    }

    fn write_district_state(&self, s: &DistrictState) -> WorldResult<()> {
        self.conn.execute(
            "UPDATE district_states SET
                crime_index = ?2, police_presence = ?3, property_values = ?4,
                business_health = ?5, street_activity = ?6, heat_level = ?7,
                crew_tension = ?8, daily_crime_count = ?9,
                daily_transaction_volume = ?10, active_businesses = ?11,
                status = ?12, last_calculated = ?13, last_status_change = ?14
             WHERE district_id = ?1",
            params![
                s.district_id,
                s.crime_index,
                s.police_presence,
                s.property_values,
                s.business_health,
                s.street_activity,
                s.heat_level,
                s.crew_tension,
                s.daily_crime_count,
                s.daily_transaction_volume,
                s.active_businesses,
                s.status.as_str(),
                to_millis(s.last_calculated),
                s.last_status_change.map(to_millis),
            ],
        )?;
        Ok(())
    }

    // ── District events ────────────────────────────────────────

    pub fn insert_district_event(&self, e: &DistrictEvent) -> WorldResult<()> {
        self.conn.execute(
            &format!("INSERT INTO district_events ({EVENT_COLUMNS})
                      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"),
            params![
                e.event_id,
                e.district_id,
                e.event_type.as_str(),
                i64::from(e.severity),
                e.actor_player_id,
                e.target_player_id,
                e.crew_id,
                e.impacts.crime,
                e.impacts.police,
                e.impacts.property,
                e.impacts.business,
                e.impacts.activity,
                e.impacts.heat,
                e.impacts.tension,
                serde_json::to_string(&e.metadata)?,
                e.processed as i64,
                to_millis(e.occurred_at),
            ],
        )?;
        Ok(())
    }

    /// Oldest-first unprocessed events that occurred at or before `as_of`.
    pub fn pending_district_events(
        &self,
        district_id: &str,
        as_of:       Timestamp,
        limit:       usize,
    ) -> WorldResult<Vec<DistrictEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM district_events
             WHERE district_id = ?1 AND processed = 0 AND occurred_at <= ?2
             ORDER BY occurred_at ASC, seq ASC
             LIMIT ?3"
        ))?;
        let events = stmt
            .query_map(params![district_id, to_millis(as_of), limit as i64], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn pending_event_count(&self, district_id: &str, as_of: Timestamp) -> WorldResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM district_events
             WHERE district_id = ?1 AND processed = 0 AND occurred_at <= ?2",
            params![district_id, to_millis(as_of)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Newest first, processed or not.
    pub fn recent_district_events(
        &self,
        district_id: &str,
        limit:       usize,
    ) -> WorldResult<Vec<DistrictEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM district_events
             WHERE district_id = ?1
             ORDER BY occurred_at DESC, seq DESC
             LIMIT ?2"
        ))?;
        let events = stmt
            .query_map(params![district_id, limit as i64], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // ── Trend samples ──────────────────────────────────────────

    /// Property value of the earliest sample recorded at or after `since`.
    pub fn earliest_property_sample_since(
        &self,
        district_id: &str,
        since:       Timestamp,
    ) -> WorldResult<Option<f64>> {
        let value = self
            .conn
            .query_row(
                "SELECT property_values FROM district_metric_history
                 WHERE district_id = ?1 AND recorded_at >= ?2
                 ORDER BY recorded_at ASC LIMIT 1",
                params![district_id, to_millis(since)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    // ── Chunk commit ───────────────────────────────────────────

    /// Atomically write the folded state, flag the consumed events as
    /// processed, append a trend sample and prune samples older than
    /// `prune_before`. If any consumed event is missing or was already
    /// processed the whole chunk rolls back.
    pub fn commit_district_chunk(
        &self,
        state:        &DistrictState,
        event_ids:    &[String],
        prune_before: Timestamp,
    ) -> WorldResult<()> {
        let tx = self.begin()?;

        self.write_district_state(state)?;

        {
            let mut mark = self.conn.prepare_cached(
                "UPDATE district_events SET processed = 1
                 WHERE event_id = ?1 AND processed = 0",
            )?;
            for id in event_ids {
                if mark.execute(params![id])? != 1 {
                    return Err(WorldError::Other(anyhow::anyhow!(
                        "district {}: event {id} is missing or already processed",
                        state.district_id
                    )));
                }
            }
        }

        self.conn.execute(
            "INSERT OR REPLACE INTO district_metric_history
                (district_id, recorded_at, property_values, business_health, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                state.district_id,
                to_millis(state.last_calculated),
                state.property_values,
                state.business_health,
                state.status.as_str(),
            ],
        )?;
        self.conn.execute(
            "DELETE FROM district_metric_history WHERE district_id = ?1 AND recorded_at < ?2",
            params![state.district_id, to_millis(prune_before)],
        )?;

        tx.commit()?;
        Ok(())
    }

    // ── Test / summary helpers ─────────────────────────────────

    /// Number of events for a district, optionally filtered by processed flag.
    pub fn district_event_count(&self, district_id: &str, processed: Option<bool>) -> WorldResult<i64> {
        let count: i64 = match processed {
            Some(p) => self.conn.query_row(
                "SELECT COUNT(*) FROM district_events WHERE district_id = ?1 AND processed = ?2",
                params![district_id, p as i64],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM district_events WHERE district_id = ?1",
                params![district_id],
                |row| row.get(0),
            )?,
        };
        Ok(count)
    }
}
