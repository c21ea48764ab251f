use crate::audit;
use crate::config::ConfigManager;
use crate::error::{M365Error, Result};
use crate::ops::drive::{DriveAction, DriveClient};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct DriveSyncArgs {
    /// Local directory to publish (defaults to the report directory)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Google Drive folder ID (defaults to [drive] folder_id)
    #[arg(long)]
    folder_id: Option<String>,

    /// List planned uploads without sending anything
    #[arg(long)]
    dry_run: bool,
}

pub async fn sync(args: DriveSyncArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;

    let folder_id = args
        .folder_id
        .clone()
        .or_else(|| config.drive.folder_id.clone())
        .ok_or_else(|| {
            M365Error::ConfigError(
                "No Drive folder. Pass --folder-id or set [drive] folder_id in config.toml".into(),
            )
        })?;
    let dir = args
        .dir
        .clone()
        .or_else(|| config.reports.output_dir.clone())
        .unwrap_or_else(|| config_manager.default_report_dir());

    let client =
        DriveClient::from_env(&config.drive.token_env)?.with_retry(config.retry.executor()?);

    println!(
        "{} {} → Drive folder {}",
        "→".cyan().bold(),
        dir.display(),
        folder_id.bold()
    );

    let summary = client
        .sync_dir(&dir, &folder_id, args.dry_run, |action| match action {
            DriveAction::Upload(file) => println!("  {} {}", "+".green(), file.name),
            DriveAction::Update { file, .. } => println!("  {} {}", "~".yellow(), file.name),
            DriveAction::Skip(file) => println!("  {} {}", "=".dimmed(), file.name.dimmed()),
        })
        .await?;

    if args.dry_run {
        println!(
            "\n{} Dry run: {} to upload, {} to update, {} unchanged",
            "→".cyan(),
            summary.uploaded,
            summary.updated,
            summary.skipped
        );
        return Ok(());
    }

    audit::record_files_uploaded(&folder_id, summary.uploaded, summary.updated);
    println!(
        "\n{} {} uploaded, {} updated, {} unchanged",
        "✓".green(),
        summary.uploaded,
        summary.updated,
        summary.skipped
    );
    Ok(())
}
