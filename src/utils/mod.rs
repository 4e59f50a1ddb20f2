/// TOML configuration with hot reload.
pub mod toml_config;

pub use toml_config::{
    ClassifierKind, CompletionConfig, ConfigError, IndexConfig, LogFormat, MemoryConfig,
    ServerConfig, SmritiConfig, SmritiConfigManager, WriteMode,
};
