//! The world-dynamics engine: the single entry point collaborators use.
//!
//! Write paths:
//!   - `log_event`          ingestion only; never folds synchronously.
//!   - `modify_reputation`  primary change + one-hop propagation, one transaction.
//!
//! Read / maintenance paths:
//!   - `get_district_state`  lazily recomputes stale or dirty districts.
//!   - `recompute_district`  explicit fold up to a given instant.
//!   - `run_aggregation`     scheduled fold of every district, in parallel.
//!   - `get_reputation_web`  all of a player's relationships, summarised.
//!
//! RULES:
//!   - At most one fold per district at a time (per-district mutex).
//!     Different districts fold concurrently.
//!   - The store mutex is held only around individual store calls and
//!     transactions, never across a fold.
//!   - Registries and config are immutable after construction.

use crate::{
    clock::WorldClock,
    config::WorldConfig,
    district_subsystem::{DistrictAggregator, DistrictState},
    error::{WorldError, WorldResult},
    event::{DistrictEvent, NewDistrictEvent},
    ingest::prepare_event,
    propagation::PropagationEngine,
    registry::WorldRegistry,
    reputation_subsystem::{
        ModifyReputationRequest, ModifyReputationResponse, ReputationChanges, ReputationEvent,
        ReputationLedger, ReputationModification, ReputationRecord, ReputationTarget,
        ReputationWeb, TargetType,
    },
    store::WorldStore,
    types::{DistrictId, Timestamp},
};
use chrono::Duration;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

/// Result of one scheduled aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct AggregationReport {
    pub recomputed: Vec<DistrictState>,
    /// Districts whose fold failed; their events stay pending for next time.
    pub failed:     Vec<(DistrictId, String)>,
}

pub struct WorldEngine {
    config:         WorldConfig,
    registry:       WorldRegistry,
    store:          Mutex<WorldStore>,
    clock:          Arc<dyn WorldClock>,
    district_locks: HashMap<DistrictId, Mutex<()>>,
}

impl WorldEngine {
    /// Wire an engine over a migrated store and seed a state row for every
    /// registered district that does not have one yet.
    pub fn new(
        config:   WorldConfig,
        registry: WorldRegistry,
        store:    WorldStore,
        clock:    Arc<dyn WorldClock>,
    ) -> WorldResult<Self> {
        let now = clock.now();
        let mut seeded = 0usize;
        for d in registry.districts() {
            if store.seed_district_state(&DistrictState::initial(d, now))? {
                seeded += 1;
            }
        }
        log::debug!(
            "world engine ready: {} districts ({seeded} newly seeded), {} factions",
            registry.districts().len(),
            registry.factions().len()
        );

        let district_locks = registry
            .districts()
            .iter()
            .map(|d| (d.id.clone(), Mutex::new(())))
            .collect();

        Ok(Self {
            config,
            registry,
            store: Mutex::new(store),
            clock,
            district_locks,
        })
    }

    /// In-memory store, test config. Used by integration tests.
    pub fn build_test(registry: WorldRegistry, clock: Arc<dyn WorldClock>) -> WorldResult<Self> {
        let store = WorldStore::in_memory()?;
        store.migrate()?;
        Self::new(WorldConfig::default_test(), registry, store, clock)
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn registry(&self) -> &WorldRegistry {
        &self.registry
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn store(&self) -> WorldResult<MutexGuard<'_, WorldStore>> {
        self.store
            .lock()
            .map_err(|_| WorldError::LockPoisoned { what: "world store".into() })
    }

    // ── Directory ──────────────────────────────────────────────

    pub fn register_player(&self, player_id: &str) -> WorldResult<()> {
        self.store()?.register_player(player_id, self.clock.now())
    }

    pub fn register_crew(&self, crew_id: &str) -> WorldResult<()> {
        self.store()?.register_crew(crew_id, self.clock.now())
    }

    // ── Event ingestion ────────────────────────────────────────

    /// Validate and persist a district event. District state is untouched
    /// until the next fold.
    pub fn log_event(&self, request: NewDistrictEvent) -> WorldResult<DistrictEvent> {
        let event = prepare_event(&self.config.impacts, &self.registry, request, self.clock.now())?;
        self.store()?.insert_district_event(&event)?;
        log::debug!(
            "district={} logged {} (severity {})",
            event.district_id,
            event.event_type,
            event.severity
        );
        Ok(event)
    }

    // ── District aggregation ───────────────────────────────────

    /// Fold every pending event for `district_id` that occurred at or before
    /// `as_of`, in chunks of at most `chunk_size`. Each chunk commits on its
    /// own, so an interrupted run leaves only fully-applied chunks behind.
    pub fn recompute_district(&self, district_id: &str, as_of: Timestamp) -> WorldResult<DistrictState> {
        let district = self
            .registry
            .district(district_id)
            .ok_or_else(|| WorldError::UnknownDistrict { district_id: district_id.to_string() })?;
        let lock = self
            .district_locks
            .get(district_id)
            .ok_or_else(|| WorldError::UnknownDistrict { district_id: district_id.to_string() })?;
        let _guard = lock
            .lock()
            .map_err(|_| WorldError::LockPoisoned { what: format!("district {district_id}") })?;

        let cfg = &self.config.aggregator;
        let aggregator = DistrictAggregator::new(cfg, &self.config.status_thresholds, &self.config.impacts);
        let chunk_size = cfg.chunk_size.max(1);

        loop {
            let (prior, events, baseline, as_of) = {
                let store = self.store()?;
                let prior = match store.district_state(district_id)? {
                    Some(s) => s,
                    None => {
                        let s = DistrictState::initial(district, as_of);
                        store.seed_district_state(&s)?;
                        s
                    }
                };
                // Time never runs backwards for a district.
                let as_of = as_of.max(prior.last_calculated);
                let window_start = as_of - Duration::days(cfg.trend_window_days);
                let events = store.pending_district_events(district_id, as_of, chunk_size)?;
                let baseline = store.earliest_property_sample_since(district_id, window_start)?;
                (prior, events, baseline, as_of)
            };

            // Only the last chunk of a run settles status; earlier chunks
            // carry the run's starting status and cooldown through unchanged.
            let last_chunk = events.len() < chunk_size;
            let outcome = aggregator.fold(&prior, &events, as_of, baseline, last_chunk);
            let event_ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();
            let prune_before = as_of - Duration::days(cfg.trend_window_days + 1);
            self.store()?
                .commit_district_chunk(&outcome.state, &event_ids, prune_before)?;

            if outcome.status_changed {
                log::info!(
                    "district={district_id} status {} -> {}",
                    prior.status,
                    outcome.state.status
                );
            } else if let Some(held) = outcome.suppressed {
                log::debug!(
                    "district={district_id} {held} suppressed by cooldown (staying {})",
                    outcome.state.status
                );
            }
            log::debug!(
                "district={district_id} folded {} events: crime={:.1} police={:.1} heat={:.1} tension={:.1}",
                events.len(),
                outcome.state.crime_index,
                outcome.state.police_presence,
                outcome.state.heat_level,
                outcome.state.crew_tension
            );

            if last_chunk {
                return Ok(outcome.state);
            }
        }
    }

    /// Current state, recomputed first when events are pending or the last
    /// fold is older than one aggregation interval.
    pub fn get_district_state(&self, district_id: &str) -> WorldResult<DistrictState> {
        if self.registry.district(district_id).is_none() {
            return Err(WorldError::UnknownDistrict { district_id: district_id.to_string() });
        }
        let now = self.clock.now();
        let interval = Duration::minutes(self.config.aggregator.aggregation_interval_minutes);

        let cached = {
            let store = self.store()?;
            let state = store.district_state(district_id)?;
            let pending = store.pending_event_count(district_id, now)?;
            state.filter(|s| pending == 0 && now - s.last_calculated < interval)
        };
        match cached {
            Some(s) => Ok(s),
            None => self.recompute_district(district_id, now),
        }
    }

    /// Fold every registered district as of `as_of`. A failing district is
    /// logged and reported; the others are unaffected.
    pub fn run_aggregation(&self, as_of: Timestamp) -> AggregationReport {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let ids: Vec<&DistrictId> = self.registry.districts().iter().map(|d| &d.id).collect();

        let mut report = AggregationReport::default();
        for batch in ids.chunks(workers) {
            let results: Vec<(DistrictId, WorldResult<DistrictState>)> = std::thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|&id| (id.clone(), scope.spawn(move || self.recompute_district(id, as_of))))
                    .collect();
                handles
                    .into_iter()
                    .map(|(id, h)| {
                        let result = h.join().unwrap_or_else(|_| {
                            Err(WorldError::Other(anyhow::anyhow!("aggregation worker panicked")))
                        });
                        (id, result)
                    })
                    .collect()
            });

            for (id, result) in results {
                match result {
                    Ok(state) => report.recomputed.push(state),
                    Err(e) => {
                        log::warn!("district={id} aggregation failed, will retry next tick: {e}");
                        report.failed.push((id, e.to_string()));
                    }
                }
            }
        }
        report
    }

    pub fn recent_district_events(&self, district_id: &str, limit: usize) -> WorldResult<Vec<DistrictEvent>> {
        if self.registry.district(district_id).is_none() {
            return Err(WorldError::UnknownDistrict { district_id: district_id.to_string() });
        }
        self.store()?.recent_district_events(district_id, limit)
    }

    // ── Reputation ─────────────────────────────────────────────

    fn check_target(&self, store: &WorldStore, target: &ReputationTarget) -> WorldResult<()> {
        let known = match target.target_type {
            TargetType::District => self.registry.district(&target.target_id).is_some(),
            TargetType::Faction  => self.registry.faction(&target.target_id).is_some(),
            TargetType::Crew     => store.crew_exists(&target.target_id)?,
            TargetType::Player   => store.player_exists(&target.target_id)?,
        };
        if known {
            Ok(())
        } else {
            Err(WorldError::UnknownTarget {
                target_type: target.target_type.as_str().to_string(),
                target_id:   target.target_id.clone(),
            })
        }
    }

    /// Apply a reputation change and its one-hop propagation as a single
    /// atomic unit.
    pub fn modify_reputation(&self, request: ModifyReputationRequest) -> WorldResult<ModifyReputationResponse> {
        request.changes.validate()?;
        let now = self.clock.now();
        let store = self.store()?;

        if !store.player_exists(&request.player_id)? {
            return Err(WorldError::UnknownPlayer { player_id: request.player_id });
        }
        self.check_target(&store, &request.target)?;

        let plan = PropagationEngine::new(&self.config.propagation, &self.registry)
            .plan(&request.target, &request.changes);
        let ledger = ReputationLedger::new(&self.config.reputation);

        let tx = store.begin()?;
        let mut modifications = Vec::with_capacity(1 + plan.len());
        modifications.push(apply_to_target(
            &store, &ledger, &request, &request.target, &request.changes, 1.0, false, now,
        )?);
        for p in &plan {
            modifications.push(apply_to_target(
                &store, &ledger, &request, &p.target, &p.changes, p.multiplier, true, now,
            )?);
        }
        tx.commit()?;

        log::debug!(
            "player={} {} ({}) -> {} targets",
            request.player_id,
            request.target,
            request.reason,
            modifications.len()
        );
        Ok(ModifyReputationResponse { player_id: request.player_id, modifications })
    }

    pub fn get_reputation_web(&self, player_id: &str) -> WorldResult<ReputationWeb> {
        let records = {
            let store = self.store()?;
            if !store.player_exists(player_id)? {
                return Err(WorldError::UnknownPlayer { player_id: player_id.to_string() });
            }
            store.reputation_records_for_player(player_id)?
        };
        Ok(ReputationLedger::new(&self.config.reputation).web(player_id, records))
    }

    pub fn reputation_record(
        &self,
        player_id: &str,
        target:    &ReputationTarget,
    ) -> WorldResult<Option<ReputationRecord>> {
        self.store()?.reputation_record(player_id, target)
    }

    pub fn reputation_history(
        &self,
        player_id: &str,
        target:    &ReputationTarget,
        limit:     usize,
    ) -> WorldResult<Vec<ReputationEvent>> {
        self.store()?.reputation_history(player_id, target, limit)
    }

    // ── Test / summary helpers ─────────────────────────────────

    pub fn store_district_event_count(&self, district_id: &str, processed: Option<bool>) -> WorldResult<i64> {
        self.store()?.district_event_count(district_id, processed)
    }

    pub fn store_reputation_event_count(&self, player_id: &str) -> WorldResult<i64> {
        self.store()?.reputation_event_count(player_id)
    }

    pub fn store_reputation_record_count(&self, player_id: &str) -> WorldResult<i64> {
        self.store()?.reputation_record_count(player_id)
    }
}

/// Load (or lazily create) one record, apply `changes`, persist the record
/// and one audit row per dimension that moved. Never propagates.
#[allow(clippy::too_many_arguments)]
fn apply_to_target(
    store:      &WorldStore,
    ledger:     &ReputationLedger<'_>,
    request:    &ModifyReputationRequest,
    target:     &ReputationTarget,
    changes:    &ReputationChanges,
    multiplier: f64,
    propagated: bool,
    now:        Timestamp,
) -> WorldResult<ReputationModification> {
    let mut record = match store.reputation_record(&request.player_id, target)? {
        Some(r) => r,
        None => ReputationRecord::blank(&request.player_id, target.clone(), now),
    };
    let old_score = record.score;
    let old_standing = record.standing;

    let dims = ledger.apply(&mut record, changes, now);
    store.upsert_reputation_record(&record)?;

    let metadata = request.metadata.clone().unwrap_or(serde_json::Value::Null);
    for d in dims.iter().filter(|d| d.new_value != d.old_value) {
        store.insert_reputation_event(&ReputationEvent {
            player_id:         request.player_id.clone(),
            target:            target.clone(),
            dimension:         d.dimension,
            old_value:         d.old_value,
            new_value:         d.new_value,
            reason:            request.reason.clone(),
            related_player_id: request.related_player_id.clone(),
            metadata:          metadata.clone(),
            propagated_from:   propagated.then(|| request.target.clone()),
            created_at:        now,
        })?;
    }

    if old_standing != record.standing {
        log::info!(
            "player={} standing with {target}: {old_standing} -> {}",
            request.player_id,
            record.standing
        );
    }

    Ok(ReputationModification {
        target: target.clone(),
        multiplier,
        propagated,
        changes: dims,
        old_score,
        new_score: record.score,
        old_standing,
        new_standing: record.standing,
        combined_score: record.combined_score,
    })
}
