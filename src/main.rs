use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use review_migrate::config::{LOGGED_ENV, REQUIRED_ENV};
use review_migrate::logging::init_tracing;
use review_migrate::sink::SupabaseSink;
use review_migrate::source::LegacyApiClient;
use review_migrate::util::env;
use review_migrate::{MigrationConfig, Orchestrator, ScopePolicy};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "review-migrate",
    version,
    about = "Copy a video-review workspace from the legacy backend into Supabase"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Run every stage: users, projects, videos, versions, notes, approvals
    Run {
        /// Override LEGACY_API_URL
        #[arg(long)]
        legacy_url: Option<String>,
        /// Override SUPABASE_URL
        #[arg(long)]
        supabase_url: Option<String>,
        /// Send a password-reset email to every provisioned user
        #[arg(long, default_value_t = false)]
        notify_users: bool,
        /// How non-video approval scopes are handled (default: env or resolve)
        #[arg(long, value_enum)]
        scope_policy: Option<ScopePolicy>,
        /// Print the run report as JSON on stdout (logs go to stderr)
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Also write the JSON run report to this file
        #[arg(long)]
        report_json: Option<PathBuf>,
    },
    /// Check configuration and print a redacted snapshot without touching either backend
    Preflight,
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    let cli = Cli::parse();
    let json = matches!(cli.command, Commands::Run { json: true, .. });
    init_tracing("info", json)?;

    match cli.command {
        Commands::Preflight => {
            env::preflight_check("review-migrate", &REQUIRED_ENV, &LOGGED_ENV)?;
            let cfg = MigrationConfig::from_env()?;
            cfg.validate()?;
            info!(
                scope_policy = ?cfg.pipeline.scope_policy,
                notify_users = cfg.pipeline.notify_users,
                "configuration ok"
            );
            Ok(())
        }
        Commands::Run {
            legacy_url,
            supabase_url,
            notify_users,
            scope_policy,
            json,
            report_json,
        } => {
            env::preflight_check("review-migrate", &REQUIRED_ENV, &LOGGED_ENV)?;
            let mut cfg = MigrationConfig::from_env()?;
            if let Some(url) = legacy_url {
                cfg.legacy_api_url = url;
            }
            if let Some(url) = supabase_url {
                cfg.supabase_url = url;
            }
            if notify_users {
                cfg.pipeline.notify_users = true;
            }
            if let Some(policy) = scope_policy {
                cfg.pipeline.scope_policy = policy;
            }
            cfg.validate()?;
            run(cfg, json, report_json).await
        }
    }
}

async fn run(cfg: MigrationConfig, json: bool, report_json: Option<PathBuf>) -> Result<()> {
    let source = LegacyApiClient::new(
        &cfg.legacy_api_url,
        &cfg.legacy_api_token,
        cfg.legacy_timeout_secs,
    )
    .context("failed to build legacy API client")?;
    let sink = SupabaseSink::new(
        &cfg.supabase_url,
        &cfg.service_role_key,
        cfg.supabase_timeout_secs,
    )
    .context("failed to build Supabase client")?;

    if !cfg.pipeline.notify_users {
        warn!("password reset emails disabled; migrated users only hold a random temporary password");
    }

    let mut orchestrator = Orchestrator::new(Arc::new(source), Arc::new(sink), cfg.pipeline);
    let report = orchestrator.run().await;
    report.emit_summary();

    if let Some(path) = report_json {
        let body = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if let Some(reason) = &report.aborted {
        anyhow::bail!("migration aborted: {reason}");
    }
    Ok(())
}
