use crate::audit;
use crate::cmd::progress;
use crate::config::ConfigManager;
use crate::error::{M365Error, Result};
use crate::graph::GraphClient;
use crate::report::{self, Cadence, DataMode, DataOrigin, ReportCollector, ReportFormat, pdf};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::warn;

#[derive(Args, Debug)]
pub struct ReportRunArgs {
    /// Report cadence
    #[arg(short, long, value_enum)]
    cadence: Cadence,

    /// Tenant name (defaults to the active tenant)
    #[arg(short, long)]
    tenant: Option<String>,

    /// Output formats (defaults to [reports] formats in config)
    #[arg(short, long, value_enum, value_delimiter = ',')]
    format: Vec<ReportFormat>,

    /// Base output directory; the report lands in <DIR>/<tenant>/<cadence>/<date>
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also print the HTML report to PDF with a headless browser
    #[arg(long)]
    pdf: bool,

    /// Use generated sample data only (no Graph calls)
    #[arg(long)]
    sample: bool,

    /// Fail instead of substituting sample data when a section can't be fetched
    #[arg(long, conflicts_with = "sample")]
    no_fallback: bool,

    /// Seed for reproducible sample data
    #[arg(long)]
    seed: Option<u64>,
}

pub async fn run(args: ReportRunArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;
    let settings = &config.reports;

    let mode = DataMode::from_flags(args.sample, settings.fallback_to_sample && !args.no_fallback);

    // Sample runs don't need a configured tenant
    let (tenant_name, tenant_id) = match config_manager.resolve_tenant(args.tenant.as_deref()) {
        Ok(tenant) => (tenant.name, tenant.tenant_id),
        Err(e) if mode == DataMode::Sample => {
            let name = args.tenant.clone().unwrap_or_else(|| "Contoso".into());
            warn!("Using unconfigured tenant name for sample report: {}", e);
            (name, String::from("00000000-0000-0000-0000-000000000000"))
        }
        Err(e) => return Err(e),
    };

    println!(
        "{} {} for {}",
        "→".cyan().bold(),
        args.cadence.title().bold(),
        tenant_name.bold()
    );

    let graph = if mode == DataMode::Sample {
        None
    } else {
        match GraphClient::from_config(&config_manager, &tenant_name).await {
            Ok(client) => Some(client),
            Err(e) if mode == DataMode::LiveWithFallback => {
                println!(
                    "{} Could not connect to Graph ({}); sections will use sample data",
                    "!".yellow(),
                    e
                );
                None
            }
            Err(e) => return Err(e),
        }
    };

    let mut collector = ReportCollector::new(&tenant_name, &tenant_id, mode)
        .with_seed(args.seed.or(settings.sample_seed));
    if let Some(client) = &graph {
        collector = collector.with_graph(client);
    }

    let spinner = progress::create_spinner("Collecting report data...");
    let dataset = match collector.collect(args.cadence).await {
        Ok(dataset) => {
            progress::finish_spinner_success(
                &spinner,
                &format!("Collected {} section(s)", dataset.sections.len()),
            );
            dataset
        }
        Err(e) => {
            progress::finish_spinner_error(&spinner, "Data collection failed");
            audit::record_error("Reports", args.cadence.as_str(), &e.to_string(), &tenant_name);
            return Err(e);
        }
    };

    let formats = if args.format.is_empty() {
        settings.formats.clone()
    } else {
        args.format.clone()
    };
    if formats.is_empty() && !(args.pdf || settings.pdf) {
        return Err(M365Error::InvalidConfig("No output formats selected".into()));
    }

    let browser = if args.pdf || settings.pdf {
        Some(pdf::find_browser(settings.browser_path.as_deref())?)
    } else {
        None
    };

    let base = args
        .output
        .clone()
        .or_else(|| settings.output_dir.clone())
        .unwrap_or_else(|| config_manager.default_report_dir());
    let dir = report::report_dir(&base, &tenant_name, args.cadence, dataset.generated_at);

    let files = report::write_report(&dataset, &dir, &formats, browser.as_deref()).await?;

    let sample_count = dataset.sample_sections().count();
    audit::record_report_generated(args.cadence.as_str(), &dir, sample_count, &tenant_name);

    println!("\n{}", "Sections:".bold());
    for section in &dataset.sections {
        match &section.origin {
            DataOrigin::Live => println!(
                "  {} {} ({} rows)",
                "✓".green(),
                section.section.title(),
                section.data.len()
            ),
            DataOrigin::Sample(reason) => println!(
                "  {} {} ({} rows, sample data: {})",
                "!".yellow(),
                section.section.title(),
                section.data.len(),
                reason.dimmed()
            ),
        }
    }

    println!("\n{}", "Files:".bold());
    for file in &files {
        println!("  {}", file.display());
    }

    if sample_count > 0 && mode != DataMode::Sample {
        println!(
            "\n{} {} of {} section(s) contain sample data, not live tenant data",
            "!".yellow().bold(),
            sample_count,
            dataset.sections.len()
        );
    }

    Ok(())
}
