use crate::audit::{self, AuditEntry};
use crate::config::ConfigManager;
use crate::error::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// How many days back to show
    #[arg(short, long, default_value_t = 7)]
    days: u32,

    /// Only entries for this tenant
    #[arg(short, long)]
    tenant: Option<String>,

    /// Only failed operations
    #[arg(long)]
    errors: bool,
}

fn print_entry(entry: &AuditEntry) {
    let status = if entry.success {
        "✓".green()
    } else {
        "✗".red()
    };
    let tenant = if entry.tenant.is_empty() {
        String::new()
    } else {
        format!(" [{}]", entry.tenant)
    };

    println!(
        "{} {} {} {}: {}{}",
        entry.timestamp.dimmed(),
        status,
        entry.action.icon(),
        entry.action.as_str().bold(),
        entry.target,
        tenant.cyan()
    );
    if let Some(details) = &entry.details {
        println!("    {}", details.dimmed());
    }
    if let Some(error) = &entry.error_message {
        println!("    {}", error.red());
    }
}

pub async fn show(args: HistoryArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let audit_dir = config_manager.audit_dir();
    let entries: Vec<AuditEntry> = audit::load_recent_entries(&audit_dir, args.days)?
        .into_iter()
        .filter(|e| {
            args.tenant
                .as_deref()
                .is_none_or(|t| e.tenant.eq_ignore_ascii_case(t))
        })
        .filter(|e| !args.errors || !e.success)
        .collect();

    if entries.is_empty() {
        println!(
            "{} No activity recorded in the last {} day(s)",
            "!".yellow(),
            args.days
        );
        return Ok(());
    }

    println!("{}", format!("Activity, last {} day(s)", args.days).bold());
    println!("{}", "─".repeat(60));
    for entry in &entries {
        print_entry(entry);
    }
    println!("{}", "─".repeat(60));

    let failures = entries.iter().filter(|e| !e.success).count();
    println!(
        "{} {} entr{}, {} failed",
        "→".cyan(),
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" },
        failures
    );
    Ok(())
}
