//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. User config (~/.config/annotator/config.toml)
//! 3. Explicit config file (--config)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{
    BackoffSettings, ConfigError, ConfigOrigin, ConfigSource, ControllerSettings,
    EffectiveConfig, Settings,
};
pub use merge::{deep_merge, merge_layers};
