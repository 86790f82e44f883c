// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling per-task watch globs and the reload-only bindings.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Debouncing bursts of events per binding.
//! - (Optionally) content hashing to avoid re-running tasks when watched
//!   files haven't actually changed.
//!
//! It only turns filesystem changes into runtime events; deciding what runs
//! is up to the engine.

pub mod cache;
pub mod debounce;
pub mod event_handler;
pub mod hash;
pub mod patterns;
pub mod watcher;

pub use debounce::Debouncer;
pub use event_handler::{match_path, WatchTrigger};
pub use hash::{HashStore, MemoryHashStore};
pub use patterns::{build_profiles_from_config, GlobFilter, TaskWatchProfile, WatchProfiles};
pub use watcher::{spawn_watcher, WatcherHandle, WatcherOptions};
