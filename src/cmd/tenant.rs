use crate::audit;
use crate::config::{AuthType, ConfigManager, TenantConfig};
use crate::error::Result;
use crate::graph::auth::{ConnectionStatus, GraphAuth};
use clap::Args;
use colored::Colorize;
use dialoguer::Confirm;

#[derive(Args, Debug)]
pub struct TenantAddArgs {
    /// Tenant name
    name: String,

    /// Tenant ID (Entra ID directory ID)
    #[arg(long)]
    tenant_id: String,

    /// Client ID (Application ID)
    #[arg(long)]
    client_id: String,

    /// Name of the environment variable holding the client secret
    #[arg(long, conflicts_with = "client_secret")]
    client_secret_env: Option<String>,

    /// Client secret (stored inline; see `m365ops secrets migrate`)
    #[arg(long)]
    client_secret: Option<String>,

    /// Use client credentials flow
    #[arg(long)]
    client_credentials: bool,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
pub struct TenantListArgs {
    /// Show detailed information
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
pub struct TenantSwitchArgs {
    /// Tenant name to switch to
    name: String,
}

#[derive(Args, Debug)]
pub struct TenantRemoveArgs {
    /// Tenant name to remove
    name: String,

    /// Skip confirmation
    #[arg(short, long)]
    yes: bool,
}

pub async fn add(args: TenantAddArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    let mut tenant = TenantConfig::new(&args.name, &args.tenant_id, &args.client_id);
    tenant.client_secret = args.client_secret;
    tenant.client_secret_env = args.client_secret_env;
    tenant.description = args.description;
    tenant.auth_type = if args.client_credentials || tenant.has_secret() {
        AuthType::ClientCredentials
    } else {
        AuthType::DeviceCode
    };

    let auth_type = tenant.auth_type;
    config_manager.add_tenant(tenant)?;
    audit::record_tenant_added(&args.name, auth_type.as_str());

    println!("{} Tenant '{}' added successfully", "✓".green(), args.name);
    println!(
        "\n{} Run {} to authenticate",
        "→".cyan(),
        format!("m365ops login --tenant {}", args.name).bold()
    );

    Ok(())
}

fn secret_source(tenant: &TenantConfig) -> String {
    match (tenant.auth_type, &tenant.client_secret, &tenant.client_secret_env) {
        (AuthType::DeviceCode, _, _) => "-".into(),
        (AuthType::Certificate, _, _) => "certificate".into(),
        (_, Some(_), _) => "inline".into(),
        (_, None, Some(var)) => format!("${}", var),
        (_, None, None) => format!("${} (default)", tenant.secret_env_name()),
    }
}

pub async fn list(args: TenantListArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let tenants = config_manager.load_tenants()?;
    let active = config_manager.load_config()?.current_tenant;
    let auth = GraphAuth::new(config_manager.clone());

    if tenants.is_empty() {
        println!(
            "{} No tenants configured. Add one with {}",
            "!".yellow(),
            "m365ops tenant add".bold()
        );
        return Ok(());
    }

    println!(
        "  {:<20} {:<18} {:<28} {}",
        "TENANT".bold(),
        "AUTH".bold(),
        "SECRET".bold(),
        "TOKEN".bold()
    );
    for tenant in &tenants {
        let marker = if active.as_deref() == Some(tenant.name.as_str()) {
            "*".green()
        } else {
            " ".normal()
        };
        let token = match auth.connection_status(&tenant.name)? {
            ConnectionStatus::Connected { expires_at } => {
                format!("valid until {}", expires_at.format("%H:%M UTC")).green()
            }
            ConnectionStatus::Expired => "expired".yellow(),
            ConnectionStatus::NotAuthenticated => "none".dimmed(),
        };
        let secret = secret_source(tenant);
        let secret = if secret == "inline" {
            "inline (run secrets migrate)".yellow()
        } else {
            secret.normal()
        };

        println!(
            "{} {:<20} {:<18} {:<28} {}",
            marker,
            tenant.name,
            tenant.auth_type.as_str(),
            secret,
            token
        );

        if args.verbose {
            println!(
                "    tenant {}  client {}",
                tenant.tenant_id.dimmed(),
                tenant.client_id.dimmed()
            );
            if let Some(desc) = &tenant.description {
                println!("    {}", desc.dimmed());
            }
        }
    }

    Ok(())
}

pub async fn switch(args: TenantSwitchArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    let previous = config_manager.set_active_tenant(&args.name)?;
    audit::record_tenant_switch(previous.as_deref(), &args.name);

    println!("{} Switched to tenant '{}'", "✓".green(), args.name);

    Ok(())
}

pub async fn remove(args: TenantRemoveArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Remove tenant '{}' and its cached token?",
                args.name
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{} Cancelled", "!".yellow());
            return Ok(());
        }
    }

    config_manager.remove_tenant(&args.name)?;
    audit::record_tenant_removed(&args.name);

    println!("{} Tenant '{}' removed", "✓".green(), args.name);

    Ok(())
}
