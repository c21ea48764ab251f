use crate::audit;
use crate::config::ConfigManager;
use crate::error::Result;
use crate::ops::secrets;
use clap::Args;
use colored::Colorize;
use dialoguer::Confirm;

#[derive(Args, Debug)]
pub struct SecretsMigrateArgs {
    /// Show what would move without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Skip confirmation
    #[arg(short, long)]
    yes: bool,
}

pub async fn migrate(args: SecretsMigrateArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let planned = secrets::plan(&config_manager)?;

    if planned.is_empty() {
        println!("{} No inline client secrets in tenants.toml", "✓".green());
        return Ok(());
    }

    println!("{}", "Secrets to migrate:".bold());
    for m in &planned {
        println!("  {} {} → ${}", "•".cyan(), m.tenant.bold(), m.env_name);
    }
    println!(
        "  {} {}",
        "into".dimmed(),
        config_manager.secrets_file().display()
    );

    if args.dry_run {
        println!("\n{} Dry run, nothing written", "→".cyan());
        return Ok(());
    }

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt("Move these secrets out of tenants.toml?")
            .default(true)
            .interact()?;
        if !confirmed {
            println!("{} Cancelled", "!".yellow());
            return Ok(());
        }
    }

    let migrated = secrets::migrate(&config_manager, false)?;
    if !secrets::verify(&config_manager, &migrated)? {
        println!(
            "{} Some secrets could not be read back from {}",
            "!".yellow(),
            config_manager.secrets_file().display()
        );
    }

    let tenants: Vec<String> = migrated.iter().map(|m| m.tenant.clone()).collect();
    audit::record_secrets_migrated(&tenants);

    println!(
        "{} Migrated {} secret(s). Export the variables in your scheduler's environment or keep secrets.env private.",
        "✓".green(),
        migrated.len()
    );
    Ok(())
}
