//! Configuration module for the MQL compiler.
//!
//! Handles compiler limits and rollup settings loaded from TOML.

mod settings;

pub use settings::{LimitSettings, RollupSettings, Settings, SettingsError};
