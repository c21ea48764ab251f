use crate::cmd::progress;
use crate::config::{ConfigManager, TenantConfig};
use crate::error::Result;
use crate::graph::GraphClient;
use crate::graph::auth::{ConnectionStatus, GraphAuth};
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Tenant name (defaults to the active tenant)
    #[arg(short, long)]
    tenant: Option<String>,

    /// Show every configured tenant
    #[arg(long, conflicts_with = "tenant")]
    all: bool,

    /// Call Graph to confirm the token actually works
    #[arg(long)]
    check: bool,
}

async fn show_tenant(
    config_manager: &ConfigManager,
    auth: &GraphAuth,
    tenant: &TenantConfig,
    active: bool,
    check: bool,
) -> Result<()> {
    let marker = if active { "●".green() } else { "○".dimmed() };
    println!("\n{} {} ({})", marker, tenant.name.bold(), tenant.auth_type.as_str());

    let status = auth.connection_status(&tenant.name)?;
    match &status {
        ConnectionStatus::Connected { expires_at } => {
            let remaining = *expires_at - chrono::Utc::now();
            println!(
                "  Token:   {} ({} min remaining)",
                "valid".green(),
                remaining.num_minutes()
            );
        }
        ConnectionStatus::Expired => println!("  Token:   {}", "expired".yellow()),
        ConnectionStatus::NotAuthenticated => {
            println!("  Token:   {}", "not authenticated".yellow())
        }
    }

    if !check {
        return Ok(());
    }

    // App-only tenants can re-authenticate silently, so check even without a valid token
    let spinner = progress::create_spinner("Contacting Microsoft Graph...");
    let result = match GraphClient::from_config(config_manager, &tenant.name).await {
        Ok(client) => client.test_connection().await,
        Err(e) => Err(e),
    };
    match result {
        Ok(org) => progress::finish_spinner_success(
            &spinner,
            &format!(
                "Connected to {} ({})",
                org.display_name.as_deref().unwrap_or("organization"),
                org.id
            ),
        ),
        Err(e) => progress::finish_spinner_error(&spinner, &format!("Graph check failed: {}", e)),
    }

    Ok(())
}

pub async fn status(args: StatusArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;
    let auth = GraphAuth::new(config_manager.clone())
        .with_retry(config.retry.executor()?);

    let tenants = if args.all {
        config_manager.load_tenants()?
    } else {
        vec![config_manager.resolve_tenant(args.tenant.as_deref())?]
    };

    if tenants.is_empty() {
        println!("{} No tenants configured", "!".yellow());
        return Ok(());
    }

    println!("{}", "Connection Status".bold());
    println!("{}", "─".repeat(60));
    for tenant in &tenants {
        let active = config.current_tenant.as_deref() == Some(tenant.name.as_str());
        show_tenant(&config_manager, &auth, tenant, active, args.check).await?;
    }
    println!("\n{}", "─".repeat(60));
    println!(
        "{} Config: {}",
        "→".cyan(),
        config_manager.config_dir().display()
    );

    Ok(())
}
