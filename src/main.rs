use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use ai_guardrail::analytics;
use ai_guardrail::cache::VerdictCache;
use ai_guardrail::config::GuardConfig;
use ai_guardrail::hook;
use ai_guardrail::storage::backup::BackupManager;
use ai_guardrail::storage::path_utils;

#[derive(Parser)]
#[command(name = "ai-guardrail", version, about = "AI Guardrail — policy enforcement for AI coding agents")]
struct App {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one event (JSON on stdin). Exit 0 = allowed, 2 = blocked.
    Check {
        /// Project root (defaults to current directory)
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Print analytics aggregates (block/allow counts per policy and
    /// fingerprint)
    Report {
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Prune old backups and expired cache entries
    Cleanup {
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON
    ConfigShow {
        #[arg(long)]
        project: Option<PathBuf>,
    },
}

fn project_root(arg: Option<PathBuf>) -> PathBuf {
    arg.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn main() {
    let app = App::parse();

    match app.command {
        Commands::Check { project } => {
            let root = project_root(project);
            let hash = path_utils::project_hash(&root);
            ai_guardrail::tracing_init::init_file_tracing(&hash);
            let code = hook::run_check(&root);
            std::process::exit(code);
        }
        Commands::Report { project } => {
            ai_guardrail::tracing_init::init_stderr_tracing();
            if let Err(e) = report(project) {
                eprintln!("report failed: {e}");
                std::process::exit(1);
            }
        }
        Commands::Cleanup { project } => {
            ai_guardrail::tracing_init::init_stderr_tracing();
            if let Err(e) = cleanup(project) {
                eprintln!("cleanup failed: {e}");
                std::process::exit(1);
            }
        }
        Commands::ConfigShow { project } => {
            ai_guardrail::tracing_init::init_stderr_tracing();
            if let Err(e) = config_show(project) {
                eprintln!("config-show failed: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn report(project: Option<PathBuf>) -> Result<()> {
    let root = project_root(project);
    let project_dir = path_utils::project_dir(&path_utils::project_hash(&root));
    let report = analytics::report(&path_utils::analytics_db_path(&project_dir))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cleanup(project: Option<PathBuf>) -> Result<()> {
    let root = project_root(project);
    let project_dir = path_utils::project_dir(&path_utils::project_hash(&root));
    let config = GuardConfig::load(&project_dir);

    let backup = BackupManager::open(&project_dir, &config.backup);
    backup.cleanup_old_backups();

    let cache = VerdictCache::open(&project_dir, &config.cache);
    let pruned = cache.prune_expired();
    println!("pruned {pruned} expired cache entries");
    Ok(())
}

fn config_show(project: Option<PathBuf>) -> Result<()> {
    let root = project_root(project);
    let project_dir = path_utils::project_dir(&path_utils::project_hash(&root));
    let config = GuardConfig::load(&project_dir);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
