//! Tenant reports
//!
//! A report run picks the sections for its [`Cadence`], collects each one
//! (live from Graph, generated, or live with a generated fallback), and
//! renders the resulting [`ReportDataset`] to HTML, CSV, JSON and PDF.

pub mod collect;
pub mod csv_export;
pub mod html;
pub mod pdf;
pub mod records;
pub mod sample;

pub use collect::{DataMode, ReportCollector};
pub use records::{
    AlertRecord, LicenseRecord, MailboxRecord, MfaRecord, SignInRecord, Tabular, UserRecord,
};

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::Yearly => "yearly",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Cadence::Daily => "Daily Operations Report",
            Cadence::Weekly => "Weekly Security & Usage Report",
            Cadence::Monthly => "Monthly License & Capacity Report",
            Cadence::Yearly => "Annual Tenant Review",
        }
    }

    pub fn sections(&self) -> &'static [ReportSection] {
        use ReportSection::*;
        match self {
            Cadence::Daily => &[SignIns, SecurityAlerts, Users],
            Cadence::Weekly => &[Users, MfaStatus, SignIns, Licenses],
            Cadence::Monthly => &[Licenses, Mailboxes, MfaStatus, SecurityAlerts],
            Cadence::Yearly => &[Licenses, Users, Mailboxes, SecurityAlerts],
        }
    }

    /// How far back activity-based sections look
    pub fn lookback(&self) -> chrono::Duration {
        match self {
            Cadence::Daily => chrono::Duration::days(1),
            Cadence::Weekly => chrono::Duration::days(7),
            Cadence::Monthly => chrono::Duration::days(30),
            Cadence::Yearly => chrono::Duration::days(365),
        }
    }

    /// Period parameter for Graph usage reports (D7, D30, D90, D180)
    pub fn usage_period(&self) -> &'static str {
        match self {
            Cadence::Daily | Cadence::Weekly => "D7",
            Cadence::Monthly => "D30",
            Cadence::Yearly => "D180",
        }
    }

    /// Upper bound on sign-in log pages pulled per run
    pub fn sign_in_page_limit(&self) -> usize {
        match self {
            Cadence::Daily => 5,
            Cadence::Weekly => 10,
            Cadence::Monthly | Cadence::Yearly => 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    Users,
    Licenses,
    Mailboxes,
    SignIns,
    MfaStatus,
    SecurityAlerts,
}

impl ReportSection {
    pub fn title(&self) -> &'static str {
        match self {
            ReportSection::Users => "Users",
            ReportSection::Licenses => "Licenses",
            ReportSection::Mailboxes => "Mailbox Usage",
            ReportSection::SignIns => "Sign-In Activity",
            ReportSection::MfaStatus => "MFA Registration",
            ReportSection::SecurityAlerts => "Security Alerts",
        }
    }

    /// File stem for per-section outputs
    pub fn slug(&self) -> &'static str {
        match self {
            ReportSection::Users => "users",
            ReportSection::Licenses => "licenses",
            ReportSection::Mailboxes => "mailboxes",
            ReportSection::SignIns => "sign-ins",
            ReportSection::MfaStatus => "mfa-status",
            ReportSection::SecurityAlerts => "security-alerts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Csv,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "origin", content = "reason")]
pub enum DataOrigin {
    Live,
    /// Generated data; carries why live data wasn't used
    Sample(String),
}

impl DataOrigin {
    pub fn is_sample(&self) -> bool {
        matches!(self, DataOrigin::Sample(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum SectionRows {
    Users(Vec<UserRecord>),
    Licenses(Vec<LicenseRecord>),
    Mailboxes(Vec<MailboxRecord>),
    SignIns(Vec<SignInRecord>),
    MfaStatus(Vec<MfaRecord>),
    SecurityAlerts(Vec<AlertRecord>),
}

fn table_of<T: Tabular>(rows: &[T]) -> (Vec<String>, Vec<Vec<String>>) {
    (
        T::HEADERS.iter().map(|h| h.to_string()).collect(),
        rows.iter().map(Tabular::cells).collect(),
    )
}

fn percent(part: usize, total: usize) -> String {
    if total == 0 {
        "0.0%".into()
    } else {
        format!("{:.1}%", part as f64 / total as f64 * 100.0)
    }
}

impl SectionRows {
    pub fn len(&self) -> usize {
        match self {
            SectionRows::Users(r) => r.len(),
            SectionRows::Licenses(r) => r.len(),
            SectionRows::Mailboxes(r) => r.len(),
            SectionRows::SignIns(r) => r.len(),
            SectionRows::MfaStatus(r) => r.len(),
            SectionRows::SecurityAlerts(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Header row and stringified cells
    pub fn table(&self) -> (Vec<String>, Vec<Vec<String>>) {
        match self {
            SectionRows::Users(r) => table_of(r),
            SectionRows::Licenses(r) => table_of(r),
            SectionRows::Mailboxes(r) => table_of(r),
            SectionRows::SignIns(r) => table_of(r),
            SectionRows::MfaStatus(r) => table_of(r),
            SectionRows::SecurityAlerts(r) => table_of(r),
        }
    }

    /// Headline metrics for summary cards
    pub fn highlights(&self, now: DateTime<Utc>) -> Vec<(String, String)> {
        match self {
            SectionRows::Users(users) => {
                let disabled = users.iter().filter(|u| !u.account_enabled).count();
                let inactive = users
                    .iter()
                    .filter(|u| u.account_enabled && u.is_inactive(now, 30))
                    .count();
                let unlicensed = users.iter().filter(|u| u.license_count == 0).count();
                vec![
                    ("Total users".into(), users.len().to_string()),
                    ("Disabled accounts".into(), disabled.to_string()),
                    ("Inactive 30+ days".into(), inactive.to_string()),
                    ("Unlicensed".into(), unlicensed.to_string()),
                ]
            }
            SectionRows::Licenses(licenses) => {
                let purchased: i64 = licenses.iter().map(|l| l.enabled_units).sum();
                let assigned: i64 = licenses.iter().map(|l| l.consumed_units).sum();
                let utilization = if purchased > 0 {
                    assigned as f64 / purchased as f64 * 100.0
                } else {
                    0.0
                };
                vec![
                    ("License SKUs".into(), licenses.len().to_string()),
                    ("Seats purchased".into(), purchased.to_string()),
                    ("Seats assigned".into(), assigned.to_string()),
                    ("Utilization".into(), format!("{:.1}%", utilization)),
                ]
            }
            SectionRows::Mailboxes(mailboxes) => {
                let used: u64 = mailboxes.iter().map(|m| m.storage_used_bytes).sum();
                let near_quota = mailboxes
                    .iter()
                    .filter(|m| m.quota_percent().is_some_and(|p| p >= 90.0))
                    .count();
                vec![
                    ("Mailboxes".into(), mailboxes.len().to_string()),
                    ("Storage used (GB)".into(), records::format_gib(used)),
                    ("Over 90% of quota".into(), near_quota.to_string()),
                ]
            }
            SectionRows::SignIns(sign_ins) => {
                let failures = sign_ins.iter().filter(|s| !s.succeeded()).count();
                let risky = sign_ins.iter().filter(|s| s.is_risky()).count();
                vec![
                    ("Sign-ins".into(), sign_ins.len().to_string()),
                    ("Failed sign-ins".into(), failures.to_string()),
                    ("Failure rate".into(), percent(failures, sign_ins.len())),
                    ("Medium/high risk".into(), risky.to_string()),
                ]
            }
            SectionRows::MfaStatus(mfa) => {
                let registered = mfa.iter().filter(|m| m.is_mfa_registered).count();
                let exposed_admins = mfa
                    .iter()
                    .filter(|m| m.is_admin && !m.is_mfa_registered)
                    .count();
                vec![
                    ("Users evaluated".into(), mfa.len().to_string()),
                    ("MFA coverage".into(), percent(registered, mfa.len())),
                    ("Admins without MFA".into(), exposed_admins.to_string()),
                ]
            }
            SectionRows::SecurityAlerts(alerts) => {
                let active = alerts.iter().filter(|a| a.is_active()).count();
                let high_active = alerts
                    .iter()
                    .filter(|a| a.is_active() && a.is_high_severity())
                    .count();
                vec![
                    ("Alerts".into(), alerts.len().to_string()),
                    ("Active".into(), active.to_string()),
                    ("Active high severity".into(), high_active.to_string()),
                ]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionReport {
    pub section: ReportSection,
    pub origin: DataOrigin,
    pub data: SectionRows,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDataset {
    pub tenant: String,
    pub tenant_id: String,
    pub cadence: Cadence,
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub sections: Vec<SectionReport>,
}

impl ReportDataset {
    pub fn sample_sections(&self) -> impl Iterator<Item = &SectionReport> {
        self.sections.iter().filter(|s| s.origin.is_sample())
    }

    pub fn is_fully_live(&self) -> bool {
        self.sample_sections().next().is_none()
    }
}

/// `<base>/<tenant>/<cadence>/<YYYY-MM-DD>`
pub fn report_dir(base: &Path, tenant: &str, cadence: Cadence, date: DateTime<Utc>) -> PathBuf {
    base.join(sanitize_filename(tenant))
        .join(cadence.as_str())
        .join(date.format("%Y-%m-%d").to_string())
}

/// Replace characters that are invalid in file names on any platform
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Write the requested formats into `dir`, returning every file produced
pub async fn write_report(
    dataset: &ReportDataset,
    dir: &Path,
    formats: &[ReportFormat],
    pdf_browser: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let wants_html = formats.contains(&ReportFormat::Html) || pdf_browser.is_some();
    let html_path = dir.join("report.html");
    if wants_html {
        fs::write(&html_path, html::render_html(dataset))?;
        written.push(html_path.clone());
    }

    if formats.contains(&ReportFormat::Csv) {
        for section in &dataset.sections {
            let path = dir.join(format!("{}.csv", section.section.slug()));
            fs::write(&path, csv_export::render_section_csv(section)?)?;
            written.push(path);
        }
        let summary_path = dir.join("summary.csv");
        fs::write(&summary_path, csv_export::render_summary_csv(dataset)?)?;
        written.push(summary_path);
    }

    if formats.contains(&ReportFormat::Json) {
        let path = dir.join("report.json");
        fs::write(&path, serde_json::to_string_pretty(dataset)?)?;
        written.push(path);
    }

    if let Some(browser) = pdf_browser {
        let pdf_path = dir.join("report.pdf");
        pdf::html_to_pdf(browser, &html_path, &pdf_path).await?;
        written.push(pdf_path);
    }

    Ok(written)
}
