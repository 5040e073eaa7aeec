//! world-runner: headless host for the underworld world-dynamics engine.
//!
//! Usage:
//!   world-runner --data-dir ./data --db world.db
//!   world-runner --data-dir ./data --db world.db --demo --ticks 8
//!   world-runner --data-dir ./data --db world.db --ipc-mode
//!
//! Without a mode flag the runner folds every district once at wall-clock
//! time and exits. Demo and IPC modes drive a manual clock instead: `tick`
//! advances it and runs one aggregation pass, so the host controls time.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use underworld_core::{
    clock::{ManualClock, SystemClock},
    config::WorldConfig,
    engine::WorldEngine,
    event::NewDistrictEvent,
    registry::WorldRegistry,
    reputation_subsystem::{ModifyReputationRequest, ReputationChanges, ReputationTarget, TargetType},
    store::WorldStore,
};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    LogEvent {
        event: NewDistrictEvent,
    },
    ModifyReputation {
        request: ModifyReputationRequest,
    },
    RegisterPlayer {
        player_id: String,
    },
    RegisterCrew {
        crew_id: String,
    },
    GetDistrict {
        district_id: String,
    },
    GetWeb {
        player_id: String,
    },
    Tick {
        #[serde(default = "default_tick_minutes")]
        minutes: i64,
    },
    Quit,
}

fn default_tick_minutes() -> i64 {
    15
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let demo = args.iter().any(|a| a == "--demo");
    let ticks = parse_arg(&args, "--ticks", 8u32);
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    if !ipc_mode {
        println!("Underworld: world-runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = WorldConfig::load(data_dir)?;
    let registry = WorldRegistry::load(data_dir)?;

    // Shared-cache URI so a reopened connection sees the same :memory: data.
    let db_effective: String = if db == ":memory:" {
        format!("file:world_{}?mode=memory&cache=shared", Utc::now().timestamp())
    } else {
        db.to_string()
    };
    let store = WorldStore::open(&db_effective)?;
    store.migrate()?;

    if !ipc_mode && !demo {
        // One scheduled pass at wall-clock time, e.g. from cron.
        let engine = WorldEngine::new(config, registry, store, Arc::new(SystemClock))?;
        let report = engine.run_aggregation(engine.now());
        println!(
            "aggregated {} districts ({} failed)",
            report.recomputed.len(),
            report.failed.len()
        );
        return Ok(());
    }

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = WorldEngine::new(config, registry, store, clock.clone())?;
    if ipc_mode {
        run_ipc_loop(&engine, &clock)?;
    } else {
        run_demo(&engine, &clock, ticks)?;
    }

    Ok(())
}

fn run_ipc_loop(engine: &WorldEngine, clock: &ManualClock) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        // Domain errors go back to the caller; the loop keeps serving.
        let reply = match handle_command(engine, clock, cmd) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("ipc command failed: {e}");
                serde_json::json!({ "error": e.to_string() })
            }
        };
        writeln!(stdout, "{}", serde_json::to_string(&reply)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(engine: &WorldEngine, clock: &ManualClock, cmd: IpcCommand) -> Result<serde_json::Value> {
    let reply = match cmd {
        IpcCommand::LogEvent { event } => serde_json::to_value(engine.log_event(event)?)?,
        IpcCommand::ModifyReputation { request } => {
            serde_json::to_value(engine.modify_reputation(request)?)?
        }
        IpcCommand::RegisterPlayer { player_id } => {
            engine.register_player(&player_id)?;
            serde_json::json!({ "ok": true })
        }
        IpcCommand::RegisterCrew { crew_id } => {
            engine.register_crew(&crew_id)?;
            serde_json::json!({ "ok": true })
        }
        IpcCommand::GetDistrict { district_id } => {
            serde_json::to_value(engine.get_district_state(&district_id)?)?
        }
        IpcCommand::GetWeb { player_id } => serde_json::to_value(engine.get_reputation_web(&player_id)?)?,
        IpcCommand::Tick { minutes } => {
            let now = clock.advance(Duration::minutes(minutes.max(0)));
            let report = engine.run_aggregation(now);
            serde_json::json!({
                "now": now,
                "recomputed": report.recomputed,
                "failed": report.failed,
            })
        }
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(reply)
}

/// A scripted evening in the docks: a turf war, a raid, and the fallout
/// on one player's standing.
fn run_demo(engine: &WorldEngine, clock: &ManualClock, ticks: u32) -> Result<()> {
    engine.register_player("demo_player")?;
    engine.register_crew("red_dragons")?;

    let player = "demo_player";
    engine.log_event(NewDistrictEvent::new("docks", "drug_deal", 4).by_player(player))?;
    engine.log_event(
        NewDistrictEvent::new("docks", "crew_battle", 8)
            .by_player(player)
            .with_crew("red_dragons"),
    )?;
    engine.log_event(NewDistrictEvent::new("docks", "murder", 6).by_player(player))?;
    engine.log_event(NewDistrictEvent::new("docks", "police_raid", 5))?;
    engine.log_event(
        NewDistrictEvent::new("financial", "property_purchased", 3)
            .by_player(player)
            .with_metadata(serde_json::json!({ "amount": 250000.0 })),
    )?;

    engine.modify_reputation(ModifyReputationRequest::new(
        player,
        ReputationTarget::faction("bratva"),
        ReputationChanges { fear: Some(45.0), respect: Some(-20.0), heat: Some(25.0), ..Default::default() },
        "murder in the docks",
    ))?;
    engine.modify_reputation(ModifyReputationRequest::new(
        player,
        ReputationTarget::new(TargetType::Crew, "red_dragons"),
        ReputationChanges { trust: Some(30.0), ..Default::default() },
        "fought alongside",
    ))?;

    for _ in 0..ticks {
        let now = clock.advance(Duration::minutes(engine.config().aggregator.aggregation_interval_minutes));
        let report = engine.run_aggregation(now);
        for (id, err) in &report.failed {
            println!("  ! {id}: {err}");
        }
    }

    print_summary(engine, player)
}

fn print_summary(engine: &WorldEngine, player: &str) -> Result<()> {
    println!("=== DISTRICTS ===");
    for d in engine.registry().districts() {
        let s = engine.get_district_state(&d.id)?;
        println!(
            "  {:<20} {:<11} crime {:>5.1} | police {:>5.1} | property {:>5.1} | heat {:>5.1} | tension {:>5.1}",
            d.name, s.status.as_str(), s.crime_index, s.police_presence, s.property_values, s.heat_level, s.crew_tension
        );
    }

    let web = engine.get_reputation_web(player)?;
    println!();
    println!("=== REPUTATION: {player} ===");
    for (target_type, records) in &web.by_type {
        for r in records {
            println!(
                "  {:<9} {:<12} {:<10} R {:>6.1} F {:>6.1} T {:>6.1} H {:>5.1}",
                target_type.as_str(),
                r.target.target_id,
                r.standing.as_str(),
                r.score.respect,
                r.score.fear,
                r.score.trust,
                r.score.heat
            );
        }
    }
    println!(
        "  overall: {} (average {:.1} over {} relationships)",
        web.summary.overall_standing, web.summary.average_reputation, web.summary.record_count
    );
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
