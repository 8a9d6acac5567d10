//! Headless entry point: loads config, a project plan, and drives the
//! wave pump to completion (§1A/§4.1).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use wavekeep_agents::ProjectConfig;
use wavekeep_core::config::Config;
use wavekeep_core::persistence::SqliteCheckpointStore;
use wavekeep_core::types::AgentType;
use wavekeep_daemon::Daemon;
use wavekeep_harness::provider::StubProvider;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "wavekeep-daemon", version, about = "Runs a wavekeep project plan to completion")]
struct Cli {
    /// Path to a JSON project plan ({"project_id": "...", "tasks": [...]})
    plan: PathBuf,

    /// Path to config.toml; defaults to ~/.wavekeep/config.toml if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of coder agents to spawn.
    #[arg(long, default_value_t = 2)]
    coders: usize,

    /// Number of tester agents to spawn.
    #[arg(long, default_value_t = 1)]
    testers: usize,

    /// Number of reviewer agents to spawn.
    #[arg(long, default_value_t = 1)]
    reviewers: usize,

    /// Number of merger agents to spawn.
    #[arg(long, default_value_t = 1)]
    mergers: usize,

    /// Emit JSON-formatted log lines instead of human-readable ones.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path.clone()).context("failed to load config")?,
        None => Config::load().context("failed to load config")?,
    };

    if cli.json_logs {
        wavekeep_telemetry::init_tracing_json("wavekeep-daemon", &config.general.log_level);
    } else {
        wavekeep_telemetry::init_tracing("wavekeep-daemon", &config.general.log_level);
    }

    let plan_text = std::fs::read_to_string(&cli.plan)
        .with_context(|| format!("failed to read plan file {}", cli.plan.display()))?;
    let plan: ProjectConfig =
        serde_json::from_str(&plan_text).context("failed to parse project plan")?;

    info!(
        project_id = %plan.project_id,
        tasks = plan.tasks.len(),
        "loaded project plan"
    );

    let db_path = shellexpand_home(&config.daemon.db_path);
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let checkpoint_store = Arc::new(
        SqliteCheckpointStore::new(&db_path)
            .await
            .context("failed to open checkpoint store")?,
    );

    // The LLM transport is an external, thinly-interfaced collaborator (§1);
    // this binary wires in the stub until a concrete provider is injected.
    let provider = Arc::new(StubProvider::new("none"));

    let daemon = Daemon::new(config, "default", provider, checkpoint_store);

    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received");
            shutdown.notify_one();
        }
    });

    let agent_counts = [
        (AgentType::Coder, cli.coders),
        (AgentType::Tester, cli.testers),
        (AgentType::Reviewer, cli.reviewers),
        (AgentType::Merger, cli.mergers),
    ];
    daemon.run(plan, &agent_counts).await?;

    info!("daemon stopped");
    Ok(())
}

fn shellexpand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/{rest}")
    } else {
        path.to_string()
    }
}
