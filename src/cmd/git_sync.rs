use crate::audit;
use crate::cmd::progress;
use crate::config::ConfigManager;
use crate::error::{M365Error, Result};
use crate::ops::git_sync::{self, GitSyncOptions, SyncOutcome};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct GitSyncArgs {
    /// Repository to sync (defaults to [git_sync] repo_path, then the report directory)
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Remote name
    #[arg(long)]
    remote: Option<String>,

    /// Branch to pull and push
    #[arg(long)]
    branch: Option<String>,

    /// Commit message prefix
    #[arg(long, default_value = "m365ops report sync")]
    message: String,

    /// Keep syncing on an interval until interrupted
    #[arg(long)]
    watch: bool,

    /// Minutes between passes in watch mode
    #[arg(long)]
    interval_minutes: Option<u64>,
}

fn describe(outcome: &SyncOutcome) -> String {
    let mut steps = Vec::new();
    if outcome.committed {
        steps.push("committed");
    }
    if outcome.pulled {
        steps.push("pulled");
    }
    if outcome.pushed {
        steps.push("pushed");
    }
    if steps.is_empty() {
        "nothing to do".into()
    } else {
        steps.join(", ")
    }
}

pub async fn run(args: GitSyncArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;
    let settings = &config.git_sync;
    let retry = config.retry.executor()?;

    let opts = GitSyncOptions {
        repo: args
            .repo
            .clone()
            .or_else(|| settings.repo_path.clone())
            .or_else(|| config.reports.output_dir.clone())
            .unwrap_or_else(|| config_manager.default_report_dir()),
        remote: args.remote.clone().unwrap_or_else(|| settings.remote.clone()),
        branch: args.branch.clone().unwrap_or_else(|| settings.branch.clone()),
        message: args.message.clone(),
    };

    if args.watch {
        let minutes = args.interval_minutes.unwrap_or(settings.interval_minutes);
        if minutes == 0 {
            return Err(M365Error::InvalidConfig("interval must be at least one minute".into()));
        }
        println!(
            "{} Syncing {} every {} min (Ctrl-C to stop)",
            "→".cyan(),
            opts.repo.display(),
            minutes
        );
        return git_sync::watch(&opts, &retry, Duration::from_secs(minutes * 60), |result| {
            let stamp = chrono::Local::now().format("%H:%M:%S");
            match result {
                Ok(outcome) => {
                    if outcome.committed || outcome.pushed {
                        audit::record_repository_synced(&opts.repo, &describe(outcome));
                    }
                    println!("{} [{}] {}", "✓".green(), stamp, describe(outcome));
                }
                Err(e) => println!("{} [{}] {}", "✗".red(), stamp, e),
            }
        })
        .await;
    }

    let spinner = progress::create_spinner(&format!("Syncing {}...", opts.repo.display()));
    match git_sync::sync_once(&opts, &retry).await {
        Ok(outcome) => {
            progress::finish_spinner_success(&spinner, &describe(&outcome));
            audit::record_repository_synced(&opts.repo, &describe(&outcome));
            Ok(())
        }
        Err(e) => {
            progress::finish_spinner_error(&spinner, "Git sync failed");
            audit::record_error("GitSync", &opts.repo.display().to_string(), &e.to_string(), "");
            Err(e)
        }
    }
}
