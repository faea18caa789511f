//! Facility defaults
//!
//! Default values used when a facility is created without an explicit
//! configuration, or when a configuration file omits a setting.

/// Initial capacity of each per-destination send buffer
pub const INITIAL_BUFFER_SIZE: usize = 16;

/// Initial capacity of an inbox's local (bound-thread) queue
pub const INITIAL_LOCAL_QUEUE_SIZE: usize = 16;

/// Prefix for worker thread names
pub const THREAD_NAME_PREFIX: &str = "actors-worker";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "ACTORS";

/// Default configuration file location
pub const CONFIG_PATH: &str = "config/facility.toml";

/// Worker thread count: one per available core, at least one
pub fn thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
