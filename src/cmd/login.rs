use crate::audit;
use crate::config::{AuthType, ConfigManager, TenantConfig};
use crate::error::{M365Error, Result};
use crate::graph::auth::GraphAuth;
use clap::Args;
use colored::Colorize;

/// First n characters, for showing IDs without printing them whole
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Tenant name or abbreviation (e.g., CONTOSO)
    /// Checks tenants.toml, then tenants.env, then {name}.env
    #[arg(index = 1)]
    name: Option<String>,

    /// Tenant name (if already configured) - alias for positional
    #[arg(short, long)]
    tenant: Option<String>,

    /// Tenant ID (Entra ID directory ID)
    #[arg(long)]
    tenant_id: Option<String>,

    /// Client ID (Application ID)
    #[arg(long)]
    client_id: Option<String>,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    client_secret: Option<String>,

    /// Use client credentials flow instead of device code
    #[arg(long)]
    client_credentials: bool,

    /// Authenticate with the certificate at this PEM path (key alongside as .key)
    #[arg(long, value_name = "PEM")]
    certificate: Option<std::path::PathBuf>,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,

    /// Import from .env file only (don't authenticate)
    #[arg(long)]
    import_only: bool,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Tenant name
    #[arg(short, long)]
    tenant: Option<String>,

    /// Logout from all tenants
    #[arg(long)]
    all: bool,
}

fn not_found_help(name: &str, manager: &ConfigManager) -> M365Error {
    M365Error::ConfigError(format!(
        "Tenant '{}' not found.\n\n\
        Options:\n\
        1. Add to {}:\n   \
           [{}]\n   \
           NAME=Your Client Name\n   \
           TENANT_ID=your-tenant-id\n   \
           CLIENT_ID=your-client-id\n   \
           CLIENT_SECRET=your-secret\n\n\
        2. Create {} with:\n   \
           TENANT_ID=your-tenant-id\n   \
           CLIENT_ID=your-client-id\n\n\
        3. Quick setup: m365ops login --tenant-id ID --client-id ID",
        name,
        manager.config_dir().join("tenants.env").display(),
        name.to_uppercase(),
        manager
            .config_dir()
            .join(format!("{}.env", name.to_lowercase()))
            .display()
    ))
}

pub async fn login(args: LoginArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let retry = config_manager.load_config()?.retry.executor()?;
    let auth = GraphAuth::new(config_manager.clone()).with_retry(retry);

    let tenant_name = args.name.as_ref().or(args.tenant.as_ref());

    let tenant_config = if let (Some(tenant_id), Some(client_id)) =
        (&args.tenant_id, &args.client_id)
    {
        println!(
            "\n{} Quick setup mode: Creating tenant configuration...",
            "→".cyan()
        );

        let name = tenant_name.cloned().unwrap_or_else(|| {
            let auto_name = tenant_id
                .split('-')
                .next()
                .unwrap_or("my-tenant")
                .to_string();
            println!(
                "\n{} Auto-generated tenant name: {}",
                "→".cyan(),
                auto_name.bold()
            );
            auto_name
        });

        let mut tenant = TenantConfig::new(&name, tenant_id, client_id);
        tenant.client_secret = args.client_secret.clone();
        tenant.description = args.description.clone();
        tenant.auth_type = if let Some(pem) = &args.certificate {
            tenant.certificate_path = Some(pem.clone());
            tenant.certificate_key_path = Some(pem.with_extension("key"));
            println!("{} Using certificate authentication", "🔐".cyan());
            AuthType::Certificate
        } else if args.client_credentials || args.client_secret.is_some() {
            println!(
                "{} Using client credentials flow (automation mode)",
                "🔐".cyan()
            );
            AuthType::ClientCredentials
        } else {
            println!("{} Using device code flow (interactive mode)", "🔐".cyan());
            AuthType::DeviceCode
        };

        config_manager.add_tenant(tenant.clone())?;
        audit::record_tenant_added(&tenant.name, tenant.auth_type.as_str());
        println!("{} Tenant '{}' configuration saved", "✓".green(), name);

        if tenant.client_secret.is_some() {
            println!(
                "{} Client secret stored inline. Run {} to move it out of tenants.toml",
                "!".yellow(),
                "m365ops secrets migrate".bold()
            );
        }

        if args.import_only {
            return Ok(());
        }
        tenant
    } else if let Some(name) = tenant_name {
        let tenant = config_manager
            .get_tenant_or_env(name)
            .map_err(|_| not_found_help(name, &config_manager))?;

        println!(
            "{} Loaded tenant: {} ({})",
            "✓".green(),
            name.bold(),
            tenant.description.as_deref().unwrap_or("")
        );
        println!("  Tenant ID: {}...", truncate_chars(&tenant.tenant_id, 8));
        println!("  Client ID: {}...", truncate_chars(&tenant.client_id, 8));
        println!("  Auth: {}", tenant.auth_type.as_str());

        if args.import_only {
            println!(
                "\n{} Import complete. Run 'm365ops login {}' to authenticate.",
                "→".cyan(),
                name
            );
            return Ok(());
        }

        tenant
    } else {
        return Err(M365Error::InvalidConfig(
            "Usage:\n  \
            m365ops login CONTOSO           # Load from tenants.toml or contoso.env\n  \
            m365ops login --tenant NAME     # Use existing config\n  \
            m365ops login --tenant-id ID --client-id ID  # Quick setup"
                .into(),
        ));
    };

    let method = tenant_config.auth_type.as_str();
    match auth.login(&tenant_config).await {
        Ok(token) => {
            audit::record_auth(&tenant_config.name, method, Ok(()));

            let previous = config_manager.set_active_tenant(&tenant_config.name)?;
            if previous.as_deref() != Some(tenant_config.name.as_str()) {
                audit::record_tenant_switch(previous.as_deref(), &tenant_config.name);
            }

            println!(
                "{} Authenticated (token valid until {})",
                "✓".green(),
                token.expires_at.format("%Y-%m-%d %H:%M UTC")
            );
            println!(
                "\n{} Active tenant: {}",
                "→".cyan(),
                tenant_config.name.bold()
            );
            Ok(())
        }
        Err(e) => {
            audit::record_auth(&tenant_config.name, method, Err(&e.to_string()));
            Err(e)
        }
    }
}

pub async fn logout(args: LogoutArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let auth = GraphAuth::new(config_manager.clone());

    if args.all {
        let tenants = config_manager.load_tenants()?;

        for tenant in &tenants {
            auth.logout(&tenant.name)?;
            audit::record_logout(&tenant.name);
        }

        println!("{} Logged out from all tenants", "✓".green());
    } else {
        let tenant = match &args.tenant {
            Some(name) => Some(name.clone()),
            None => config_manager.load_config()?.current_tenant,
        };

        match tenant {
            Some(name) => {
                auth.logout(&name)?;
                audit::record_logout(&name);
                println!("{} Logged out from '{}'", "✓".green(), name);
            }
            None => println!("{} No active tenant", "!".yellow()),
        }
    }

    Ok(())
}
