//! Shipped data files and on-disk persistence.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use underworld_core::{
    clock::ManualClock,
    config::WorldConfig,
    engine::WorldEngine,
    event::NewDistrictEvent,
    registry::WorldRegistry,
    reputation_subsystem::{ModifyReputationRequest, ReputationChanges, ReputationTarget},
    store::WorldStore,
};

const DATA_DIR: &str = "../data";

#[test]
fn shipped_tuning_matches_defaults() {
    let loaded = WorldConfig::load(DATA_DIR).expect("load shipped config");
    assert_eq!(loaded, WorldConfig::default_test());
}

#[test]
fn shipped_world_is_consistent() {
    let registry = WorldRegistry::load(DATA_DIR).expect("load shipped registry");
    assert_eq!(registry.districts().len(), 5);
    assert_eq!(registry.factions().len(), 4);

    for f in registry.factions() {
        for other in f.allies.iter().chain(&f.enemies) {
            assert!(registry.faction(other).is_some(), "{} -> {other}", f.id);
        }
        if let Some(home) = &f.home_district {
            assert!(registry.district(home).is_some());
            assert_eq!(registry.faction_for_district(home), Some(&f.id));
        }
    }
    for d in registry.districts() {
        for n in registry.adjacent(&d.id) {
            assert!(registry.district(n).is_some(), "{} -> {n}", d.id);
        }
    }
    assert_eq!(registry.faction_for_district("midtown"), None);
}

#[test]
fn missing_data_dir_is_reported() {
    let err = WorldConfig::load("/nonexistent/world-data").unwrap_err();
    assert!(err.to_string().contains("Cannot read"), "{err}");
}

#[test]
fn state_survives_reopen() {
    let path = std::env::temp_dir().join(format!("world-{}.db", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let registry = WorldRegistry::load(DATA_DIR).unwrap();

    {
        let store = WorldStore::open(&path).unwrap();
        store.migrate().unwrap();
        let clock = Arc::new(ManualClock::new(t0));
        let engine = WorldEngine::new(WorldConfig::default_test(), registry.clone(), store, clock).unwrap();
        engine.register_player("p1").unwrap();
        engine
            .log_event(NewDistrictEvent::new("eastside", "murder", 4).by_player("p1"))
            .unwrap();
        engine.recompute_district("eastside", t0).unwrap();
        engine
            .modify_reputation(ModifyReputationRequest::new(
                "p1",
                ReputationTarget::faction("cartel"),
                ReputationChanges { fear: Some(30.0), ..Default::default() },
                "murder",
            ))
            .unwrap();
    }

    let store = WorldStore::open(&path).unwrap();
    store.migrate().unwrap();
    let clock = Arc::new(ManualClock::new(t0));
    let engine = WorldEngine::new(WorldConfig::default_test(), registry, store, clock).unwrap();

    let state = engine.get_district_state("eastside").unwrap();
    // Baseline 55 plus 3 * 4.
    assert!((state.crime_index - 67.0).abs() < 1e-9);
    assert_eq!(engine.store_district_event_count("eastside", Some(true)).unwrap(), 1);

    let record = engine
        .reputation_record("p1", &ReputationTarget::faction("cartel"))
        .unwrap()
        .expect("record persisted");
    assert_eq!(record.score.fear, 30.0);

    drop(engine);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path}{suffix}"));
    }
}
