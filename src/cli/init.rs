//! `smriti-server init`: scaffold a configuration file and an env template.

use super::output::Output;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of the init operation
#[derive(Debug, PartialEq, Eq)]
pub enum InitResult {
    Success,
    /// smriti.toml exists and `--force` was not given
    AlreadyExists,
    Error(String),
}

/// Configuration for the init command
pub struct InitConfig {
    /// Directory to initialize
    pub path: PathBuf,
    /// Overwrite existing files
    pub force: bool,
    /// Use the in-process index and rule classifier (no API keys needed)
    pub offline: bool,
    pub host: String,
    pub port: u16,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing Smriti");

    let config_path = config.path.join("smriti.toml");
    if config_path.exists() && !config.force {
        output.warning("smriti.toml already exists (use --force to overwrite)");
        return InitResult::AlreadyExists;
    }

    if let Err(e) = fs::create_dir_all(&config.path) {
        return InitResult::Error(format!(
            "Failed to create {}: {}",
            config.path.display(),
            e
        ));
    }

    let files = [
        ("smriti.toml", generate_smriti_toml(&config), true),
        (".env.example", generate_env_example(), false),
    ];

    for (name, content, overwrite) in &files {
        let path = config.path.join(name);
        if path.exists() && !(config.force && *overwrite) {
            output.skipped(name, "exists");
            continue;
        }
        if let Err(e) = write_file(&path, content) {
            return InitResult::Error(format!("Failed to write {}: {}", name, e));
        }
        output.created(name);
    }

    output.hint("Next steps:");
    if !config.offline {
        output.command("cp .env.example .env   # then fill in GROQ_API_KEY and PINECONE_API_KEY");
    }
    output.command("smriti-server");

    InitResult::Success
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    fs::write(path, content)
}

fn generate_smriti_toml(config: &InitConfig) -> String {
    let (completion, index, classifier) = if config.offline {
        (
            r#"[completion]
type = "ollama"
base_url = "http://localhost:11434"
model = "llama3.2"
temperature = 0.3"#,
            r#"[index]
type = "memory""#,
            "rules",
        )
    } else {
        (
            r#"[completion]
type = "openai"
api_key_env = "GROQ_API_KEY"
api_base = "https://api.groq.com/openai/v1"
model = "llama-3.1-8b-instant"
temperature = 0.3
timeout_secs = 60"#,
            r#"[index]
type = "pinecone"
api_key_env = "PINECONE_API_KEY"
control_url = "https://api.pinecone.io"
cloud = "aws"
region = "us-east-1"
embed_model = "llama-text-embed-v2"
api_version = "2025-01"
timeout_secs = 30
ready_timeout_secs = 60"#,
            "llm",
        )
    };

    format!(
        r#"# Smriti configuration

[server]
host = "{host}"
port = {port}
log_level = "info"
# "pretty" or "json"
log_format = "pretty"

{completion}

{index}

# Changes in this section apply without a restart.
[memory]
top_k = 10
retrieval_categories = ["user_understanding"]
# "llm" or "rules"
classifier = "{classifier}"
# "background" or "inline"
write_mode = "background"
"#,
        host = config.host,
        port = config.port,
    )
}

fn generate_env_example() -> String {
    r#"# Smriti environment variables
# Copy this file to .env and fill in the values.

# Completion provider (OpenAI-compatible, Groq by default)
GROQ_API_KEY=gsk_...

# Pinecone index
PINECONE_API_KEY=pcsk_...

# Optional: log filter, overrides server.log_level
RUST_LOG=info,smriti=debug
"#
    .to_string()
}
