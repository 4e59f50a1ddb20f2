use anyhow::Context;
use smriti::cli::{
    init::{self, InitConfig, InitResult},
    output::Output,
    Cli, Commands,
};
use smriti::db::Namespace;
use smriti::utils::{LogFormat, SmritiConfig};
use smriti::{AppState, SmritiConfigManager};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    let result = match cli.command {
        Some(Commands::Init {
            ref path,
            force,
            offline,
            ref host,
            port,
        }) => run_init(
            InitConfig {
                path: path.clone(),
                force,
                offline,
                host: host.clone(),
                port,
            },
            &output,
        ),
        Some(Commands::Config { validate }) => show_config(&cli.config, validate, &output),
        Some(Commands::Forget { ref user_id, yes }) => {
            forget(&cli.config, user_id, yes, cli.verbose, &output).await
        }
        None => serve(&cli.config, cli.verbose).await,
    };

    if let Err(e) = result {
        output.error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

/// RUST_LOG wins; otherwise `server.log_level`, or debug with `--verbose`.
fn init_tracing(config: &SmritiConfig, verbose: bool) {
    let fallback = if verbose {
        "debug".to_string()
    } else {
        config.server.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    match config.server.log_format {
        LogFormat::Json => fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => fmt().with_env_filter(filter).with_target(false).init(),
    }
}

fn run_init(config: InitConfig, output: &Output) -> anyhow::Result<()> {
    match init::run(config, output) {
        InitResult::Success | InitResult::AlreadyExists => Ok(()),
        InitResult::Error(message) => anyhow::bail!(message),
    }
}

fn show_config(path: &Path, validate_only: bool, output: &Output) -> anyhow::Result<()> {
    let config = SmritiConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    config.validate().context("configuration is invalid")?;

    if validate_only {
        output.success(&format!("{} is valid", path.display()));
        return Ok(());
    }

    output.header("Configuration");
    output.kv("file", &path.display().to_string());
    output.kv(
        "listen",
        &format!("{}:{}", config.server.host, config.server.port),
    );
    let provider = config.completion_provider()?;
    output.kv("completion", &format!("{} ({})", provider.name(), provider.model()));
    output.kv("index", config.vector_store_provider()?.name());
    output.kv("classifier", &format!("{:?}", config.memory.classifier).to_lowercase());
    output.kv("write mode", &format!("{:?}", config.memory.write_mode).to_lowercase());
    output.kv("top_k", &config.memory.top_k.to_string());
    output.kv("categories", &config.memory.retrieval_categories.join(", "));
    Ok(())
}

async fn forget(
    path: &Path,
    user_id: &str,
    yes: bool,
    verbose: bool,
    output: &Output,
) -> anyhow::Result<()> {
    let config = SmritiConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    init_tracing(&config, verbose);

    if !yes && !output.confirm(&format!("Delete all memory for '{user_id}'?")) {
        output.info("Aborted");
        return Ok(());
    }

    let store = config.vector_store_provider()?.create_store()?;
    let namespace = Namespace::for_user(user_id);
    if store.delete_namespace(&namespace).await? {
        output.success(&format!("Deleted namespace {namespace}"));
    } else {
        output.warning(&format!("No memory stored for '{user_id}'"));
    }
    Ok(())
}

async fn serve(path: &Path, verbose: bool) -> anyhow::Result<()> {
    let config_manager = Arc::new(
        SmritiConfigManager::new(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
    );
    let config = config_manager.config();
    init_tracing(&config, verbose);
    tracing::info!(path = %config_manager.path().display(), "configuration loaded");

    if let Err(e) = config_manager.start_watching() {
        tracing::warn!(error = %e, "config hot reload disabled");
    }

    let state = AppState::from_config(Arc::clone(&config_manager))?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    smriti::api::routes::serve(state, &addr)
        .await
        .with_context(|| format!("server on {addr} failed"))?;

    config_manager.stop_watching();
    Ok(())
}
