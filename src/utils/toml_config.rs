//! TOML-based configuration for Smriti
//!
//! Declarative configuration for the HTTP server, the completion provider,
//! the memory index and the memory policy, read from `smriti.toml`.
//! Secrets never live in the file: `*_env` fields name the environment
//! variables holding them.
//!
//! # Hot Reloading
//!
//! Configuration changes are automatically detected and applied at runtime.
//! Use `SmritiConfigManager` for thread-safe access to the current configuration.
//! Only `[memory]` settings take effect without a restart; clients for the
//! upstream services are built once at startup.

use crate::db::VectorStoreProvider;
use crate::llm::Provider;
use crate::memory::model::is_valid_category;
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from smriti.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmritiConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

// ============= Completion Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CompletionConfig {
    OpenAI {
        /// Environment variable containing API key
        #[serde(default = "default_completion_key_env")]
        api_key_env: String,
        #[serde(default = "default_completion_base")]
        api_base: String,
        #[serde(default = "default_completion_model")]
        model: String,
        #[serde(default = "default_temperature")]
        temperature: f32,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        model: String,
        #[serde(default = "default_temperature")]
        temperature: f32,
    },
}

fn default_completion_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_completion_base() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_completion_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

impl Default for CompletionConfig {
    fn default() -> Self {
        CompletionConfig::OpenAI {
            api_key_env: default_completion_key_env(),
            api_base: default_completion_base(),
            model: default_completion_model(),
            temperature: default_temperature(),
            timeout_secs: None,
        }
    }
}

// ============= Index Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexConfig {
    Pinecone {
        /// Environment variable containing API key
        #[serde(default = "default_index_key_env")]
        api_key_env: String,
        #[serde(default = "default_control_url")]
        control_url: String,
        #[serde(default = "default_cloud")]
        cloud: String,
        #[serde(default = "default_region")]
        region: String,
        #[serde(default = "default_embed_model")]
        embed_model: String,
        #[serde(default = "default_api_version")]
        api_version: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
        #[serde(default = "default_ready_timeout_secs")]
        ready_timeout_secs: u64,
    },
    /// In-process index for local development. Nothing is persisted.
    Memory,
}

fn default_index_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}

fn default_control_url() -> String {
    "https://api.pinecone.io".to_string()
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_embed_model() -> String {
    "llama-text-embed-v2".to_string()
}

fn default_api_version() -> String {
    "2025-01".to_string()
}

fn default_ready_timeout_secs() -> u64 {
    60
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig::Pinecone {
            api_key_env: default_index_key_env(),
            control_url: default_control_url(),
            cloud: default_cloud(),
            region: default_region(),
            embed_model: default_embed_model(),
            api_version: default_api_version(),
            timeout_secs: None,
            ready_timeout_secs: default_ready_timeout_secs(),
        }
    }
}

// ============= Memory Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Candidates retrieved before each memory decision and each chat answer
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Categories searched for candidates
    #[serde(default = "default_retrieval_categories")]
    pub retrieval_categories: Vec<String>,

    #[serde(default)]
    pub classifier: ClassifierKind,

    #[serde(default)]
    pub write_mode: WriteMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// Ask the completion model for a NEW / UPDATE / IGNORE decision
    #[default]
    Llm,
    /// Deterministic token-overlap policy, no model calls
    Rules,
}

/// How the post-chat memory write runs relative to the chat response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Spawned as a task; the response does not wait for it
    #[default]
    Background,
    /// Awaited before responding; failures are still only logged
    Inline,
}

fn default_top_k() -> usize {
    10
}

fn default_retrieval_categories() -> Vec<String> {
    vec![crate::memory::DEFAULT_CATEGORY.to_string()]
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            retrieval_categories: default_retrieval_categories(),
            classifier: ClassifierKind::default(),
            write_mode: WriteMode::default(),
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl SmritiConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: SmritiConfig = toml::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate value ranges and check that referenced env vars are set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "memory.top_k must be at least 1".into(),
            ));
        }

        if self.memory.retrieval_categories.is_empty()
            || !self
                .memory
                .retrieval_categories
                .iter()
                .all(|c| is_valid_category(c))
        {
            return Err(ConfigError::ValidationError(
                "memory.retrieval_categories must list at least one category of [A-Za-z0-9_-]"
                    .into(),
            ));
        }

        match &self.completion {
            CompletionConfig::OpenAI {
                api_key_env,
                temperature,
                ..
            } => {
                Self::validate_temperature(*temperature)?;
                Self::validate_env_var(api_key_env)?;
            }
            CompletionConfig::Ollama { temperature, .. } => {
                Self::validate_temperature(*temperature)?;
            }
        }

        if let IndexConfig::Pinecone { api_key_env, .. } = &self.index {
            Self::validate_env_var(api_key_env)?;
        }

        Ok(())
    }

    fn validate_temperature(temperature: f32) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::ValidationError(format!(
                "completion.temperature must be within 0.0..=2.0, got {}",
                temperature
            )));
        }
        Ok(())
    }

    fn validate_env_var(name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    fn resolve_env(name: &str) -> Result<String, ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
    }

    /// Resolve the completion section into a provider with secrets filled in.
    pub fn completion_provider(&self) -> Result<Provider, ConfigError> {
        match &self.completion {
            CompletionConfig::OpenAI {
                api_key_env,
                api_base,
                model,
                temperature,
                timeout_secs,
            } => Ok(Provider::OpenAI {
                api_key: Self::resolve_env(api_key_env)?,
                api_base: api_base.clone(),
                model: model.clone(),
                temperature: *temperature,
                timeout: timeout_secs.map(Duration::from_secs),
            }),
            CompletionConfig::Ollama {
                base_url,
                model,
                temperature,
            } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
                model: model.clone(),
                temperature: *temperature,
            }),
        }
    }

    /// Resolve the index section into a vector store provider with secrets filled in.
    pub fn vector_store_provider(&self) -> Result<VectorStoreProvider, ConfigError> {
        match &self.index {
            IndexConfig::Pinecone {
                api_key_env,
                control_url,
                cloud,
                region,
                embed_model,
                api_version,
                timeout_secs,
                ready_timeout_secs,
            } => Ok(VectorStoreProvider::Pinecone {
                api_key: Self::resolve_env(api_key_env)?,
                control_url: control_url.clone(),
                cloud: cloud.clone(),
                region: region.clone(),
                embed_model: embed_model.clone(),
                api_version: api_version.clone(),
                timeout: timeout_secs.map(Duration::from_secs),
                ready_timeout: Duration::from_secs(*ready_timeout_secs),
            }),
            IndexConfig::Memory => Ok(VectorStoreProvider::InMemory),
        }
    }

    /// Render the configuration back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct SmritiConfigManager {
    config: Arc<ArcSwap<SmritiConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
}

impl SmritiConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = SmritiConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
        })
    }

    /// Create a config manager directly from a config, without file watching.
    pub fn from_config(config: SmritiConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("smriti.toml"),
            watcher: RwLock::new(None),
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<SmritiConfig> {
        self.config.load_full()
    }

    /// File the configuration was loaded from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Manually reload the configuration from disk
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!(path = ?self.config_path, "Reloading configuration");

        let new_config = SmritiConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching the config file; must be called inside a tokio runtime.
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);
        let file_name = self.config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        // Watch the parent directory so editors that replace the file are seen
        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let debounce = Duration::from_millis(500);
            let mut last_reload: Option<std::time::Instant> = None;

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|at| at.elapsed() < debounce) {
                    continue;
                }

                // Let the writer finish
                tokio::time::sleep(Duration::from_millis(100)).await;

                match SmritiConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = Some(std::time::Instant::now());
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}
