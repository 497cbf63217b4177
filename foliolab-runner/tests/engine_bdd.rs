//! BDD tests for the engine facade: files on disk in, plans and analyses out.
//!
//! Each scenario writes its inputs into a fresh temp dir, loads them through
//! the runner's loaders and drives the `Engine` the way the CLI does.

use chrono::{TimeZone, Utc};
use std::path::PathBuf;
use tempfile::TempDir;

use foliolab_core::domain::Side;
use foliolab_core::plan::PlanStatus;
use foliolab_core::TradeCategory;
use foliolab_runner::{
    load_changes, load_operations, load_positions, load_target, ConfigError, Engine, EngineConfig,
    InMemorySnapshotStore, RunError, SnapshotStore,
};

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

const POSITIONS: &str = r#"[
  {"instrumentId": "A", "quantity": 10, "currentPrice": 100, "averagePrice": 90,
   "currency": "usd", "sector": "tech"},
  {"instrumentId": "B", "quantity": 5, "currentPrice": 200, "averagePrice": 210,
   "currency": "usd", "sector": "energy"}
]"#;

const FRICTIONLESS: &str = r#"
[costs]
flat_fee = 0.0
commission_pct = 0.0

[cache]
capacity = 4

[store]
max_snapshots = 2
"#;

// ── 1. Config ──

#[test]
fn bdd_engine_loads_config_from_file() {
    // GIVEN a TOML config that disables trading costs
    let dir = TempDir::new().unwrap();
    let config_path = write(&dir, "engine.toml", FRICTIONLESS);

    // WHEN the engine is built from it
    let engine = Engine::from_config_file(Some(&config_path)).unwrap();

    // THEN the sections are applied and the rest keep their defaults
    assert_eq!(engine.config().costs.flat_fee, 0.0);
    assert_eq!(engine.config().cache.capacity, 4);
    assert_eq!(engine.config().store.max_snapshots, 2);
    assert_eq!(engine.config().rebalance, EngineConfig::default().rebalance);
}

#[test]
fn bdd_invalid_config_names_its_section() {
    // GIVEN a config with a negative short-term tax rate
    let dir = TempDir::new().unwrap();
    let config_path = write(&dir, "bad.toml", "[taxes]\nshort_term_rate = -5.0\n");

    // WHEN the engine is built from it
    let err = Engine::from_config_file(Some(&config_path)).unwrap_err();

    // THEN the failure points at the taxes section
    match err {
        RunError::Config(ConfigError::Invalid { section, .. }) => assert_eq!(section, "taxes"),
        other => panic!("expected invalid taxes section, got {other:?}"),
    }
}

// ── 2. Rebalancing ──

#[test]
fn bdd_rebalance_from_files_and_hit_the_cache() {
    // GIVEN positions and a 30/70 instrument target on disk
    let dir = TempDir::new().unwrap();
    let positions = load_positions(&write(&dir, "positions.json", POSITIONS)).unwrap();
    let target = load_target(&write(
        &dir,
        "target.json",
        r#"{"dimension": "instrument", "weights": {"A": 30, "B": 70}}"#,
    ))
    .unwrap();
    let mut engine = Engine::from_config_file(Some(&write(&dir, "engine.toml", FRICTIONLESS))).unwrap();

    // WHEN a plan is requested twice with identical inputs
    let first = engine.rebalance(&positions, &target).unwrap();
    let second = engine.rebalance(&positions, &target).unwrap();

    // THEN A is sold before B is bought
    let orders = first.orders();
    assert_eq!(orders.len(), 2);
    assert_eq!((orders[0].side, orders[0].instrument_id.as_str()), (Side::Sell, "A"));
    assert_eq!(orders[0].quantity, 4.0);
    assert_eq!((orders[1].side, orders[1].instrument_id.as_str()), (Side::Buy, "B"));
    assert_eq!(orders[1].quantity, 2.0);
    assert_eq!(first.summary().transaction_cost, 0.0);

    // AND the second request is served from the cache
    assert_eq!(first.id(), second.id());
    assert_eq!(first.created_at(), second.created_at());
    let stats = engine.cache_stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[test]
fn bdd_cached_plan_can_be_approved_independently() {
    // GIVEN a memoized plan
    let dir = TempDir::new().unwrap();
    let positions = load_positions(&write(&dir, "positions.json", POSITIONS)).unwrap();
    let target = load_target(&write(
        &dir,
        "target.json",
        r#"{"dimension": "sector", "weights": {"tech": 40, "energy": 60}}"#,
    ))
    .unwrap();
    let mut engine = Engine::new(EngineConfig::default());
    let mut plan = engine.rebalance(&positions, &target).unwrap();

    // WHEN the caller approves its copy
    plan.approve().unwrap();

    // THEN the cached copy is still a draft
    let again = engine.rebalance(&positions, &target).unwrap();
    assert_eq!(plan.status(), PlanStatus::Approved);
    assert_eq!(again.status(), PlanStatus::Draft);
    assert_eq!(again.id(), plan.id());
}

// ── 3. Scenario and patterns ──

#[test]
fn bdd_scenario_from_file_does_not_touch_positions() {
    // GIVEN positions and a price shock on A
    let dir = TempDir::new().unwrap();
    let positions = load_positions(&write(&dir, "positions.json", POSITIONS)).unwrap();
    let changes = load_changes(&write(
        &dir,
        "changes.json",
        r#"[{"type": "price_change", "instrument_id": "A", "pct": -50}]"#,
    ))
    .unwrap();
    let engine = Engine::new(EngineConfig::default());

    // WHEN the scenario is applied
    let result = engine.scenario(&positions, &changes, 0.0);

    // THEN the hypothetical total drops by 500 and the input is unchanged
    assert_eq!(result.base.total_value, 2000.0);
    assert_eq!(result.scenario.total_value, 1500.0);
    assert_eq!(result.value_delta, -500.0);
    assert_eq!(positions.get("A").unwrap().current_price, 100.0);
}

#[test]
fn bdd_patterns_from_csv() {
    // GIVEN a quick 20% loss recorded in a CSV export
    let dir = TempDir::new().unwrap();
    let ops = load_operations(&write(
        &dir,
        "ops.csv",
        "instrument_id,side,date,quantity,price\nA,buy,2024-01-02,10,100\nA,sell,2024-01-05,10,80\n",
    ))
    .unwrap();
    let engine = Engine::new(EngineConfig::default());

    // WHEN patterns are analyzed
    let analysis = engine.patterns(&ops);

    // THEN the round trip is a panic sell
    assert_eq!(analysis.pair_count, 1);
    assert_eq!(analysis.count_of(TradeCategory::PanicSell), 1);
}

// ── 4. Snapshots ──

#[test]
fn bdd_snapshot_history_respects_configured_window() {
    // GIVEN an engine whose store keeps two snapshots
    let dir = TempDir::new().unwrap();
    let engine = Engine::from_config_file(Some(&write(&dir, "engine.toml", FRICTIONLESS))).unwrap();
    let positions = load_positions(&write(&dir, "positions.json", POSITIONS)).unwrap();
    let mut store = InMemorySnapshotStore::new(engine.config().store);

    // WHEN three daily snapshots are recorded
    let mut evicted = 0;
    for (day, cash) in [(1, 0.0), (2, 100.0), (3, 200.0)] {
        let at = Utc.with_ymd_and_hms(2024, 3, day, 16, 0, 0).unwrap();
        evicted += engine.record_snapshot(&mut store, "acct", &positions, cash, at);
    }

    // THEN only the newest two remain
    assert_eq!(evicted, 1);
    let history = store.history("acct");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].snapshot.cash, 100.0);
    assert_eq!(store.latest("acct").unwrap().snapshot.total_value, 2200.0);
}
