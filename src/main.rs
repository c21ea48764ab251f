use clap::{Parser, Subcommand};
use colored::Colorize;
use m365ops::{audit, cmd, config, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "m365ops",
    about = "Microsoft 365 tenant reports and operations",
    version,
    long_about = "Daily, weekly, monthly and yearly Microsoft 365 tenant reports\n\n\
                  Pulls users, licenses, mailboxes, sign-ins, MFA and alerts from Microsoft Graph,\n\
                  falling back to sample data when a section can't be fetched.\n\
                  Includes scheduling, Git sync, secret migration, certificates and Google Drive publishing."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate to Microsoft Graph API
    Login(cmd::login::LoginArgs),

    /// Logout and clear cached credentials
    Logout(cmd::login::LogoutArgs),

    /// Manage tenant configurations
    #[command(subcommand)]
    Tenant(TenantCommands),

    /// Show token state (and optionally verify it against Graph)
    Status(cmd::status::StatusArgs),

    /// Generate tenant reports
    #[command(subcommand)]
    Report(ReportCommands),

    /// Register report runs with cron or Task Scheduler
    #[command(subcommand)]
    Schedule(ScheduleCommands),

    /// Commit, pull and push a report repository
    GitSync(cmd::git_sync::GitSyncArgs),

    /// Manage stored client secrets
    #[command(subcommand)]
    Secrets(SecretsCommands),

    /// Certificates for app-only authentication
    #[command(subcommand)]
    Cert(CertCommands),

    /// Publish reports to Google Drive
    #[command(subcommand)]
    Drive(DriveCommands),

    /// Show recorded activity
    History(cmd::history::HistoryArgs),
}

#[derive(Subcommand, Debug)]
enum TenantCommands {
    /// Add a new tenant configuration
    Add(cmd::tenant::TenantAddArgs),

    /// List configured tenants
    List(cmd::tenant::TenantListArgs),

    /// Switch active tenant
    Switch(cmd::tenant::TenantSwitchArgs),

    /// Remove tenant configuration
    Remove(cmd::tenant::TenantRemoveArgs),
}

#[derive(Subcommand, Debug)]
enum ReportCommands {
    /// Collect and render a report
    Run(cmd::report::ReportRunArgs),
}

#[derive(Subcommand, Debug)]
enum ScheduleCommands {
    /// Install (or replace) a scheduled report run
    Install(cmd::schedule::ScheduleArgs),

    /// Remove a scheduled report run
    Remove(cmd::schedule::ScheduleArgs),

    /// Print the scheduler entries without installing
    Show(cmd::schedule::ScheduleArgs),
}

#[derive(Subcommand, Debug)]
enum SecretsCommands {
    /// Move inline client secrets into secrets.env
    Migrate(cmd::secrets::SecretsMigrateArgs),
}

#[derive(Subcommand, Debug)]
enum CertCommands {
    /// Create a self-signed certificate with openssl
    Create(cmd::cert::CertCreateArgs),
}

#[derive(Subcommand, Debug)]
enum DriveCommands {
    /// Upload new and changed report files to a Drive folder
    Sync(cmd::drive::DriveSyncArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// RUST_LOG wins, then --verbose, then log_level from config.toml
fn init_logging(verbose: bool, config_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = if verbose {
            "m365ops=debug".to_string()
        } else if !config_level.trim().is_empty() {
            format!("m365ops={}", config_level.trim())
        } else {
            "m365ops=warn".to_string()
        };
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("m365ops=warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();

    let manager = config::ConfigManager::new()?;
    // A broken config.toml should still let --verbose show why
    let log_level = manager
        .load_config()
        .map(|c| c.log_level)
        .unwrap_or_default();
    init_logging(cli.verbose, &log_level);
    audit::init(manager.audit_dir());

    match cli.command {
        Commands::Login(args) => cmd::login::login(args).await?,
        Commands::Logout(args) => cmd::login::logout(args).await?,
        Commands::Tenant(tenant_cmd) => match tenant_cmd {
            TenantCommands::Add(args) => cmd::tenant::add(args).await?,
            TenantCommands::List(args) => cmd::tenant::list(args).await?,
            TenantCommands::Switch(args) => cmd::tenant::switch(args).await?,
            TenantCommands::Remove(args) => cmd::tenant::remove(args).await?,
        },
        Commands::Status(args) => cmd::status::status(args).await?,
        Commands::Report(report_cmd) => match report_cmd {
            ReportCommands::Run(args) => cmd::report::run(args).await?,
        },
        Commands::Schedule(schedule_cmd) => match schedule_cmd {
            ScheduleCommands::Install(args) => cmd::schedule::install(args).await?,
            ScheduleCommands::Remove(args) => cmd::schedule::remove(args).await?,
            ScheduleCommands::Show(args) => cmd::schedule::show(args).await?,
        },
        Commands::GitSync(args) => cmd::git_sync::run(args).await?,
        Commands::Secrets(secrets_cmd) => match secrets_cmd {
            SecretsCommands::Migrate(args) => cmd::secrets::migrate(args).await?,
        },
        Commands::Cert(cert_cmd) => match cert_cmd {
            CertCommands::Create(args) => cmd::cert::create(args).await?,
        },
        Commands::Drive(drive_cmd) => match drive_cmd {
            DriveCommands::Sync(args) => cmd::drive::sync(args).await?,
        },
        Commands::History(args) => cmd::history::show(args).await?,
    }

    Ok(())
}
