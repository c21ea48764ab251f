use crate::audit;
use crate::cmd::progress;
use crate::config::ConfigManager;
use crate::error::Result;
use crate::ops::cert;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CertCreateArgs {
    /// Certificate name (used as CN and file stem)
    #[arg(short, long)]
    name: String,

    /// Validity in days
    #[arg(long, default_value_t = 365)]
    days: u32,

    /// Output directory (defaults to <config_dir>/certs)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Switch this tenant to certificate authentication
    #[arg(short, long)]
    tenant: Option<String>,
}

pub async fn create(args: CertCreateArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let out_dir = args
        .out
        .clone()
        .unwrap_or_else(|| config_manager.config_dir().join("certs"));

    let spinner = progress::create_spinner("Generating RSA key and certificate...");
    let files = match cert::create_certificate(&args.name, args.days, &out_dir).await {
        Ok(files) => {
            progress::finish_spinner_success(&spinner, "Certificate created");
            files
        }
        Err(e) => {
            progress::finish_spinner_error(&spinner, "Certificate creation failed");
            return Err(e);
        }
    };

    println!("  Private key: {}", files.key.display());
    println!("  PEM:         {}", files.pem.display());
    println!("  CER (DER):   {}", files.cer.display());
    println!("  Thumbprint:  {}", files.thumbprint.hex.bold());

    if let Some(tenant) = &args.tenant {
        cert::attach_to_tenant(&config_manager, tenant, &files)?;
        println!(
            "{} Tenant '{}' now uses certificate authentication",
            "✓".green(),
            tenant
        );
    }

    audit::record_certificate_created(&args.name, &files.thumbprint.hex, args.tenant.as_deref());

    println!(
        "\n{} Upload {} to the app registration (Certificates & secrets), then run {}",
        "→".cyan(),
        files.cer.display(),
        format!(
            "m365ops login {}",
            args.tenant.as_deref().unwrap_or("<tenant>")
        )
        .bold()
    );
    Ok(())
}
