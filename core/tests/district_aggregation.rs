//! District ecosystem tests.
//!
//! Tests cover: ingestion validation, impact folding with recency decay,
//! idle decay, idempotence, bounds, status rules, hysteresis, chunked
//! commits, rolling counters, lazy reads and concurrent recomputes.

use chrono::{Duration, TimeZone, Utc};
use std::{collections::HashMap, sync::Arc};
use underworld_core::{
    clock::ManualClock,
    config::WorldConfig,
    district_subsystem::{DistrictState, DistrictStatus},
    engine::WorldEngine,
    error::WorldError,
    event::NewDistrictEvent,
    registry::{District, DistrictBaseline, WorldRegistry},
    store::WorldStore,
    types::Timestamp,
};

fn t0() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn district(id: &str, baseline: DistrictBaseline) -> District {
    District { id: id.into(), name: id.to_uppercase(), faction: None, baseline }
}

fn registry() -> WorldRegistry {
    let hot = DistrictBaseline {
        crime_index: 55.0,
        police_presence: 30.0,
        ..DistrictBaseline::default()
    };
    let rising = DistrictBaseline {
        business_health: 70.0,
        ..DistrictBaseline::default()
    };
    let edge = DistrictBaseline {
        crime_index: 59.0,
        police_presence: 35.0,
        ..DistrictBaseline::default()
    };
    let slump = DistrictBaseline {
        crime_index: 59.0,
        police_presence: 35.0,
        business_health: 20.0,
        street_activity: 20.0,
        ..DistrictBaseline::default()
    };
    WorldRegistry::from_parts(
        vec![],
        vec![
            district("plain", DistrictBaseline::default()),
            district("hot", hot),
            district("rising", rising),
            district("edge", edge),
            district("slump", slump),
        ],
        HashMap::new(),
    )
}

fn build() -> (WorldEngine, Arc<ManualClock>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new(t0()));
    let engine = WorldEngine::build_test(registry(), clock.clone()).expect("build test engine");
    (engine, clock)
}

fn build_with_chunk_size(chunk_size: usize) -> WorldEngine {
    let mut config = WorldConfig::default_test();
    config.aggregator.chunk_size = chunk_size;
    let store = WorldStore::in_memory().unwrap();
    store.migrate().unwrap();
    WorldEngine::new(config, registry(), store, Arc::new(ManualClock::new(t0()))).unwrap()
}

/// A migrated, file-backed store plus its path. Tests that need to break
/// the database from outside open a second connection on the same file.
fn file_store() -> (WorldStore, String) {
    let path = std::env::temp_dir().join(format!("districts-{}.db", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();
    let store = WorldStore::open(&path).unwrap();
    store.migrate().unwrap();
    (store, path)
}

fn remove_db(path: &str) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn log(engine: &WorldEngine, district_id: &str, event_type: &str, severity: i64) {
    engine
        .log_event(NewDistrictEvent::new(district_id, event_type, severity))
        .expect("log event");
}

#[test]
fn logged_event_is_pending_until_folded() {
    let (engine, _clock) = build();

    let event = engine
        .log_event(NewDistrictEvent::new("plain", "crime_committed", 5).by_player("p1"))
        .unwrap();
    assert!(!event.processed);
    assert_eq!(event.severity, 5);
    assert!(approx(event.impacts.crime, 10.0));
    assert!(approx(event.impacts.police, 5.0));
    assert!(approx(event.impacts.activity, 5.0));
    assert_eq!(event.actor_player_id.as_deref(), Some("p1"));

    assert_eq!(engine.store_district_event_count("plain", Some(false)).unwrap(), 1);

    let state = engine.recompute_district("plain", t0()).unwrap();
    assert!(approx(state.crime_index, 30.0));
    assert!(approx(state.police_presence, 55.0));
    assert!(approx(state.street_activity, 55.0));
    assert!(approx(state.heat_level, 5.0));
    assert_eq!(state.daily_crime_count, 1);
    assert_eq!(state.status, DistrictStatus::Stable);

    assert_eq!(engine.store_district_event_count("plain", Some(false)).unwrap(), 0);
    assert_eq!(engine.store_district_event_count("plain", Some(true)).unwrap(), 1);
}

#[test]
fn invalid_input_writes_nothing() {
    let (engine, _clock) = build();

    let err = engine
        .log_event(NewDistrictEvent::new("plain", "alien_invasion", 3))
        .unwrap_err();
    assert!(matches!(err, WorldError::UnknownEventType { .. }), "got {err:?}");

    let err = engine
        .log_event(NewDistrictEvent::new("atlantis", "crime_committed", 3))
        .unwrap_err();
    assert!(matches!(err, WorldError::UnknownDistrict { .. }), "got {err:?}");

    for bad in [0, 11, -4] {
        let err = engine
            .log_event(NewDistrictEvent::new("plain", "crime_committed", bad))
            .unwrap_err();
        assert!(matches!(err, WorldError::InvalidSeverity { .. }), "got {err:?}");
    }

    assert_eq!(engine.store_district_event_count("plain", None).unwrap(), 0);

    let err = engine.recompute_district("atlantis", t0()).unwrap_err();
    assert!(matches!(err, WorldError::UnknownDistrict { .. }));
}

#[test]
fn older_events_count_for_less() {
    let (engine, _clock) = build();
    // Reported late: happened one crime half-life ago.
    let event = engine
        .log_event(
            NewDistrictEvent::new("plain", "crime_committed", 5)
                .by_player("p1")
                .against("p2")
                .at(t0() - Duration::hours(6)),
        )
        .unwrap();
    assert_eq!(event.target_player_id.as_deref(), Some("p2"));

    let state = engine.recompute_district("plain", t0()).unwrap();
    assert!(approx(state.crime_index, 25.0), "crime={}", state.crime_index);
    assert!(approx(state.street_activity, 52.5));
    // Police half-life is 12h.
    assert!(approx(state.police_presence, 50.0 + 5.0 * 0.5f64.sqrt()));
    // Heat is not age-weighted.
    assert!(approx(state.heat_level, 5.0));
}

#[test]
fn recompute_is_idempotent_and_decays_on_empty_ticks() {
    let (engine, _clock) = build();
    log(&engine, "plain", "crime_committed", 5);
    log(&engine, "plain", "crew_battle", 4);

    let at = t0() + Duration::minutes(30);
    let first = engine.recompute_district("plain", at).unwrap();
    let second = engine.recompute_district("plain", at).unwrap();
    assert!(first.same_simulated_state(&second), "{first:?}\n{second:?}");

    // No new events, three idle hours: heat -6, tension -3.
    let later = engine.recompute_district("plain", at + Duration::hours(3)).unwrap();
    assert!(approx(later.heat_level, first.heat_level - 6.0));
    assert!(approx(later.crew_tension, first.crew_tension - 3.0));
    assert!(approx(later.crime_index, first.crime_index));
    assert_eq!(later.last_calculated, at + Duration::hours(3));
}

#[test]
fn metrics_stay_in_bounds() {
    let (engine, _clock) = build();
    for _ in 0..30 {
        log(&engine, "plain", "murder", 10);
        log(&engine, "plain", "crew_battle", 10);
        log(&engine, "plain", "business_closed", 10);
    }
    for _ in 0..40 {
        log(&engine, "plain", "police_raid", 10);
    }

    let state = engine.recompute_district("plain", t0()).unwrap();
    for (name, v) in [
        ("crime", state.crime_index),
        ("police", state.police_presence),
        ("property", state.property_values),
        ("business", state.business_health),
        ("activity", state.street_activity),
        ("heat", state.heat_level),
        ("tension", state.crew_tension),
    ] {
        assert!((0.0..=100.0).contains(&v), "{name} out of bounds: {v}");
    }
    assert_eq!(state.police_presence, 100.0);
    assert_eq!(state.crew_tension, 100.0);
    assert_eq!(state.business_health, 0.0);
}

#[test]
fn volatile_threshold_boundary() {
    let (engine, _clock) = build();

    // crime 59 / police 35: one short of volatile.
    let state = engine.recompute_district("edge", t0()).unwrap();
    assert_eq!(state.status, DistrictStatus::Stable);

    // A drug deal adds exactly one point of crime and no police.
    log(&engine, "edge", "drug_deal", 1);
    let state = engine.recompute_district("edge", t0()).unwrap();
    assert!(approx(state.crime_index, 60.0));
    assert!(approx(state.police_presence, 35.0));
    assert_eq!(state.status, DistrictStatus::Volatile);
}

#[test]
fn weak_trigger_inside_cooldown_does_not_flip_status() {
    let (engine, clock) = build();

    // crime 55 -> 61, police 30 -> 33: volatile.
    log(&engine, "hot", "crime_committed", 3);
    let state = engine.recompute_district("hot", t0()).unwrap();
    assert_eq!(state.status, DistrictStatus::Volatile);
    assert_eq!(state.last_status_change, Some(t0()));

    // Ten minutes later crew tension reaches 78 (~111% of the warzone
    // threshold). Inside the cooldown that is not enough to flip.
    let soon = clock.advance(Duration::minutes(10));
    for severity in [10, 10, 10, 9] {
        log(&engine, "hot", "crew_battle", severity);
    }
    let state = engine.recompute_district("hot", soon).unwrap();
    assert!(approx(state.crew_tension, 78.0));
    assert_eq!(state.status, DistrictStatus::Volatile);
    assert_eq!(state.last_status_change, Some(t0()));

    // Tension pinned at 100 is still only ~143% of 70, and heat can never
    // reach 150% of 85, so warzone cannot override a fresh change.
    let pinned = clock.advance(Duration::minutes(5));
    log(&engine, "hot", "crew_battle", 10);
    log(&engine, "hot", "crew_battle", 10);
    let state = engine.recompute_district("hot", pinned).unwrap();
    assert_eq!(state.crew_tension, 100.0);
    assert!(state.heat_level < 85.0 * 1.5);
    assert_eq!(state.status, DistrictStatus::Volatile);
    assert_eq!(state.last_status_change, Some(t0()));

    // After the cooldown the same trigger is honoured.
    let later = t0() + Duration::hours(2);
    clock.set(later);
    let state = engine.recompute_district("hot", later).unwrap();
    assert!(state.crew_tension >= 70.0);
    assert_eq!(state.status, DistrictStatus::Warzone);
    assert_eq!(state.last_status_change, Some(later));
}

#[test]
fn strong_trigger_inside_cooldown_flips_status() {
    let (engine, clock) = build();

    // crime 59 -> 60 with police 35: volatile, cooldown starts.
    log(&engine, "slump", "drug_deal", 1);
    let state = engine.recompute_district("slump", t0()).unwrap();
    assert_eq!(state.status, DistrictStatus::Volatile);
    assert_eq!(state.last_status_change, Some(t0()));

    // A raid ends the volatility. Business 20 and activity 21 make a
    // declining trigger of only ~143%, so it is held back.
    let weak_at = clock.advance(Duration::minutes(10));
    log(&engine, "slump", "police_raid", 2);
    let state = engine.recompute_district("slump", weak_at).unwrap();
    assert!(approx(state.police_presence, 41.0));
    assert!(approx(state.crime_index, 58.0));
    assert_eq!(state.status, DistrictStatus::Volatile);
    assert_eq!(state.last_status_change, Some(t0()));

    // Closures drive business to 10 and activity to 16: 300% and ~188% of
    // the declining thresholds. That overrides the cooldown.
    let strong_at = clock.advance(Duration::minutes(10));
    log(&engine, "slump", "business_closed", 5);
    let state = engine.recompute_district("slump", strong_at).unwrap();
    assert!(approx(state.business_health, 10.0));
    assert!(approx(state.street_activity, 16.0));
    assert_eq!(state.status, DistrictStatus::Declining);
    assert_eq!(state.last_status_change, Some(strong_at));
    assert!(strong_at - t0() < Duration::hours(1));
}

#[test]
fn property_growth_over_trailing_window_gentrifies() {
    let (engine, clock) = build();

    // Seeds the trend baseline at property 50.
    let state = engine.recompute_district("rising", t0()).unwrap();
    assert_eq!(state.status, DistrictStatus::Stable);

    let next_day = clock.advance(Duration::days(1));
    log(&engine, "rising", "gentrification", 3);
    let state = engine.recompute_district("rising", next_day).unwrap();
    assert!(approx(state.property_values, 59.0));
    assert!(approx(state.business_health, 76.0));
    assert_eq!(state.status, DistrictStatus::Gentrifying);
}

#[test]
fn chunked_fold_matches_single_pass() {
    let engine = build_with_chunk_size(2);

    for _ in 0..5 {
        log(&engine, "plain", "crime_committed", 1);
    }
    let state = engine.recompute_district("plain", t0()).unwrap();
    assert!(approx(state.crime_index, 30.0));
    assert_eq!(state.daily_crime_count, 5);
    assert_eq!(engine.store_district_event_count("plain", Some(true)).unwrap(), 5);
    assert_eq!(engine.store_district_event_count("plain", Some(false)).unwrap(), 0);
}

#[test]
fn status_does_not_depend_on_chunk_size() {
    let fold_all = |chunk_size: usize| {
        let engine = build_with_chunk_size(chunk_size);
        // The drug deals alone make "hot" volatile; the battles then make
        // it a warzone. Split into chunks, the first chunk must not start
        // a cooldown that holds back the second.
        log(&engine, "hot", "drug_deal", 5);
        log(&engine, "hot", "drug_deal", 5);
        for _ in 0..4 {
            log(&engine, "hot", "crew_battle", 10);
        }
        engine.recompute_district("hot", t0()).unwrap()
    };

    let single = fold_all(500);
    assert_eq!(single.status, DistrictStatus::Warzone);
    assert!(approx(single.crime_index, 65.0));
    assert!(approx(single.crew_tension, 80.0));

    for chunk_size in [1, 2, 4] {
        let chunked = fold_all(chunk_size);
        assert_eq!(chunked, single, "chunk_size={chunk_size}");
    }
}

#[test]
fn failing_district_is_isolated_and_retried() {
    let (store, path) = file_store();
    let engine = WorldEngine::new(
        WorldConfig::default_test(),
        registry(),
        store,
        Arc::new(ManualClock::new(t0())),
    )
    .unwrap();
    for _ in 0..3 {
        log(&engine, "hot", "crime_committed", 2);
    }
    log(&engine, "plain", "crime_committed", 1);

    // Marking "hot" events as processed fails after its state row has
    // already been written inside the chunk transaction.
    let admin = rusqlite::Connection::open(&path).unwrap();
    admin
        .execute_batch(
            "CREATE TRIGGER block_hot BEFORE UPDATE OF processed ON district_events
             WHEN NEW.district_id = 'hot'
             BEGIN SELECT RAISE(ABORT, 'hot is jammed'); END;",
        )
        .unwrap();
    let reader = WorldStore::open(&path).unwrap();
    let before = reader.district_state("hot").unwrap().unwrap();

    let report = engine.run_aggregation(t0());
    let failed: Vec<&str> = report.failed.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(failed, vec!["hot"]);
    assert_eq!(report.recomputed.len(), 4);
    assert!(report.recomputed.iter().all(|s| s.district_id != "hot"));
    let plain = report.recomputed.iter().find(|s| s.district_id == "plain").unwrap();
    assert!(approx(plain.crime_index, 22.0));

    assert_eq!(engine.store_district_event_count("hot", Some(false)).unwrap(), 3);
    assert_eq!(engine.store_district_event_count("hot", Some(true)).unwrap(), 0);
    assert_eq!(reader.district_state("hot").unwrap().unwrap(), before);

    admin.execute_batch("DROP TRIGGER block_hot;").unwrap();
    let report = engine.run_aggregation(t0());
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    let hot = engine.recompute_district("hot", t0()).unwrap();
    // 55 + 3 * 4, once.
    assert!(approx(hot.crime_index, 67.0), "crime={}", hot.crime_index);
    assert_eq!(hot.daily_crime_count, 3);
    assert_eq!(engine.store_district_event_count("hot", Some(true)).unwrap(), 3);

    drop(engine);
    drop(reader);
    drop(admin);
    remove_db(&path);
}

#[test]
fn chunk_commit_rolls_back_on_unknown_event() {
    let store = WorldStore::in_memory().unwrap();
    store.migrate().unwrap();
    let registry = registry();
    let initial = DistrictState::initial(registry.district("plain").unwrap(), t0());
    assert!(store.seed_district_state(&initial).unwrap());

    let mut folded = initial.clone();
    folded.crime_index = 99.0;
    folded.status = DistrictStatus::Volatile;
    let err = store
        .commit_district_chunk(&folded, &["no-such-event".to_string()], t0())
        .unwrap_err();
    assert!(err.to_string().contains("no-such-event"), "{err}");
    assert_eq!(store.district_state("plain").unwrap().unwrap(), initial);
    assert_eq!(store.earliest_property_sample_since("plain", t0()).unwrap(), None);
}

#[test]
fn rolling_counters_track_the_day() {
    let (engine, clock) = build();

    log(&engine, "plain", "business_opened", 1);
    log(&engine, "plain", "business_opened", 1);
    log(&engine, "plain", "business_closed", 1);
    engine
        .log_event(
            NewDistrictEvent::new("plain", "property_purchased", 2)
                .with_metadata(serde_json::json!({ "amount": 2500.0 })),
        )
        .unwrap();
    engine
        .log_event(
            NewDistrictEvent::new("plain", "business_transaction", 1)
                .with_metadata(serde_json::json!({ "amount": 100.0 })),
        )
        .unwrap();

    let state = engine.recompute_district("plain", t0()).unwrap();
    assert_eq!(state.active_businesses, 1);
    assert!(approx(state.daily_transaction_volume, 2600.0));
    assert_eq!(state.daily_crime_count, 0);

    let tomorrow = clock.advance(Duration::days(1));
    let state = engine.recompute_district("plain", tomorrow).unwrap();
    assert_eq!(state.active_businesses, 1);
    assert_eq!(state.daily_transaction_volume, 0.0);
}

#[test]
fn lazy_read_folds_pending_events() {
    let (engine, _clock) = build();

    let before = engine.get_district_state("plain").unwrap();
    assert!(approx(before.crime_index, 20.0));

    log(&engine, "plain", "crime_committed", 5);
    let after = engine.get_district_state("plain").unwrap();
    assert!(approx(after.crime_index, 30.0));
    assert_eq!(engine.store_district_event_count("plain", Some(false)).unwrap(), 0);

    assert!(matches!(
        engine.get_district_state("atlantis"),
        Err(WorldError::UnknownDistrict { .. })
    ));
}

#[test]
fn concurrent_recomputes_count_each_event_once() {
    let (engine, _clock) = build();
    for _ in 0..10 {
        log(&engine, "plain", "crime_committed", 1);
    }

    let results: Vec<DistrictState> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| engine.recompute_district("plain", t0()).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for state in &results {
        assert!(approx(state.crime_index, 40.0), "crime={}", state.crime_index);
    }
    assert_eq!(engine.store_district_event_count("plain", Some(true)).unwrap(), 10);
}

#[test]
fn scheduled_aggregation_covers_every_district() {
    let (engine, _clock) = build();
    log(&engine, "plain", "crime_committed", 2);
    log(&engine, "hot", "police_raid", 2);

    let report = engine.run_aggregation(t0() + Duration::minutes(5));
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert_eq!(report.recomputed.len(), 5);

    let hot = report.recomputed.iter().find(|s| s.district_id == "hot").unwrap();
    // Five minutes of police decay on a +6 raid.
    assert!(hot.police_presence > 35.9 && hot.police_presence < 36.0);
    assert_eq!(engine.store_district_event_count("hot", Some(false)).unwrap(), 0);

    let recent = engine.recent_district_events("plain", 10).unwrap();
    assert_eq!(recent.len(), 1);
    assert!(recent[0].processed);
}
