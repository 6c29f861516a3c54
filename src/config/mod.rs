//! Configuration merge system
//!
//! Settings are merged from three layers, later layers winning:
//! 1. Built-in defaults
//! 2. User config (`--config`, `$POLICY_RECO_CONFIG`, or
//!    `~/.config/policy-reco/config.toml`)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::{
    builtin_value, DEFAULT_NAMESPACE, DEFAULT_POLL_INTERVAL_SECONDS, DEFAULT_POLL_TIMEOUT_SECONDS,
};
pub use effective::{
    default_user_config_path, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig,
    CONFIG_ENV_VAR,
};
pub use merge::{deep_merge, merge_layers};
pub use settings::{JobSettings, PollSettings, PrecheckSettings, Settings, StoreSettings};
