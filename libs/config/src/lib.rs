//! # Actors Facility Configuration
//!
//! This crate holds the configuration of a facility (the process-wide
//! context of the actors runtime) and the defaults it falls back to.
//!
//! ## Features
//!
//! - **Defaults**: Thread pool size, send buffer and local queue capacities
//! - **Facility Configuration**: TOML files with `ACTORS_` environment overrides
//!
//! ## Usage
//!
//! ```rust
//! use actors_config::{defaults, FacilityConfig};
//!
//! let config = FacilityConfig::default().with_thread_count(4);
//! assert_eq!(config.initial_buffer_size, defaults::INITIAL_BUFFER_SIZE);
//! assert!(config.validate().is_ok());
//! ```

pub mod defaults;
pub mod facility_config;

// Re-export commonly used types
pub use facility_config::FacilityConfig;
