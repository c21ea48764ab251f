use crate::audit;
use crate::config::ConfigManager;
use crate::error::Result;
use crate::ops::schedule::{self, ScheduleSpec};
use crate::report::Cadence;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Report cadence to schedule
    #[arg(short, long, value_enum)]
    cadence: Cadence,

    /// Tenant name (defaults to the active tenant)
    #[arg(short, long)]
    tenant: Option<String>,

    /// Time of day to run (24h HH:MM, local time)
    #[arg(long, default_value = "06:00")]
    time: String,

    /// Print what would change without touching the scheduler
    #[arg(long)]
    dry_run: bool,
}

fn build_spec(args: &ScheduleArgs) -> Result<ScheduleSpec> {
    let tenant = ConfigManager::new()?.resolve_tenant(args.tenant.as_deref())?;
    let (hour, minute) = schedule::parse_time(&args.time)?;
    Ok(ScheduleSpec {
        cadence: args.cadence,
        tenant: tenant.name,
        hour,
        minute,
        executable: std::env::current_exe()?,
    })
}

pub async fn install(args: ScheduleArgs) -> Result<()> {
    let spec = build_spec(&args)?;
    let entry = schedule::install(&spec, args.dry_run).await?;

    if args.dry_run {
        println!("{} Dry run, would install:", "→".cyan());
        println!("  {}", entry);
        return Ok(());
    }

    audit::record_schedule(true, spec.cadence.as_str(), &spec.tenant, &entry);
    println!(
        "{} Scheduled {} report for {}",
        "✓".green(),
        spec.cadence.as_str(),
        spec.tenant.bold()
    );
    println!("  {}", entry.dimmed());
    Ok(())
}

pub async fn remove(args: ScheduleArgs) -> Result<()> {
    let tenant = ConfigManager::new()?.resolve_tenant(args.tenant.as_deref())?;
    let removed = schedule::remove(&tenant.name, args.cadence, args.dry_run).await?;

    match (removed, args.dry_run) {
        (false, _) => println!(
            "{} No {} schedule registered for {}",
            "!".yellow(),
            args.cadence.as_str(),
            tenant.name
        ),
        (true, true) => println!(
            "{} Dry run, would remove {}",
            "→".cyan(),
            schedule::tag(&tenant.name, args.cadence)
        ),
        (true, false) => {
            audit::record_schedule(false, args.cadence.as_str(), &tenant.name, "");
            println!(
                "{} Removed {} schedule for {}",
                "✓".green(),
                args.cadence.as_str(),
                tenant.name.bold()
            );
        }
    }
    Ok(())
}

/// Print the entry for both schedulers without installing anything
pub async fn show(args: ScheduleArgs) -> Result<()> {
    let spec = build_spec(&args)?;

    println!("{}", "crontab:".bold());
    println!("  {}", spec.crontab_line());
    println!("\n{}", "Windows Task Scheduler:".bold());
    println!("  schtasks {}", spec.schtasks_create_args().join(" "));
    Ok(())
}
