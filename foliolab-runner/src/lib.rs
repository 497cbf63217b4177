//! FolioLab Runner — configuration, input loading and caller-owned state.
//!
//! This crate builds on `foliolab-core` to provide:
//! - TOML engine configuration with per-section validation
//! - JSON/CSV loaders that classify records on the way in
//! - A snapshot store interface with windowed, age-based eviction
//! - Plan memoization keyed by input fingerprint
//! - An `Engine` facade tying config, cache and core together

pub mod cache;
pub mod config;
pub mod input;
pub mod runner;
pub mod store;

pub use cache::{CacheStats, PlanCache};
pub use config::{CacheConfig, ConfigError, EngineConfig, StoreConfig};
pub use input::{load_changes, load_operations, load_positions, load_target, LoadError, OperationsFormat};
pub use runner::{Engine, RunError};
pub use store::{InMemorySnapshotStore, SnapshotRecord, SnapshotStore};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<EngineConfig>();
        assert_sync::<EngineConfig>();
        assert_send::<StoreConfig>();
        assert_sync::<StoreConfig>();
    }

    #[test]
    fn engine_is_send_sync() {
        assert_send::<Engine>();
        assert_sync::<Engine>();
        assert_send::<PlanCache>();
        assert_sync::<PlanCache>();
    }

    #[test]
    fn store_is_send_sync() {
        assert_send::<InMemorySnapshotStore>();
        assert_sync::<InMemorySnapshotStore>();
        assert_send::<Box<dyn SnapshotStore>>();
        assert_sync::<Box<dyn SnapshotStore>>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
