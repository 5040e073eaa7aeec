//! Event ingestion: turns a collaborator's action report into a typed,
//! immutable `DistrictEvent` with its impact deltas precomputed.
//!
//! Ingestion never touches district state. Folding is the aggregator's job,
//! so write latency stays independent of simulation cost.

use crate::{
    error::{WorldError, WorldResult},
    event::{DistrictEvent, DistrictEventType, ImpactTable, NewDistrictEvent},
    registry::WorldRegistry,
    types::Timestamp,
};

pub const MIN_SEVERITY: i64 = 1;
pub const MAX_SEVERITY: i64 = 10;

/// Validate `request` and build the event that `log_event` will persist.
/// Nothing here writes; a returned error means nothing may be written.
pub fn prepare_event(
    impacts:  &ImpactTable,
    registry: &WorldRegistry,
    request:  NewDistrictEvent,
    now:      Timestamp,
) -> WorldResult<DistrictEvent> {
    if registry.district(&request.district_id).is_none() {
        return Err(WorldError::UnknownDistrict { district_id: request.district_id });
    }

    let event_type: DistrictEventType = request.event_type.parse()?;

    if !(MIN_SEVERITY..=MAX_SEVERITY).contains(&request.severity) {
        return Err(WorldError::InvalidSeverity { severity: request.severity });
    }
    let severity = request.severity as u8;

    let deltas = impacts.impacts_for(event_type, severity)?;

    Ok(DistrictEvent {
        event_id:         uuid::Uuid::new_v4().to_string(),
        district_id:      request.district_id,
        event_type,
        severity,
        actor_player_id:  request.player_id,
        target_player_id: request.target_player_id,
        crew_id:          request.crew_id,
        impacts:          deltas,
        metadata:         request.metadata.unwrap_or(serde_json::Value::Null),
        processed:        false,
        occurred_at:      request.occurred_at.unwrap_or(now),
    })
}
