//! Audit trail for m365ops
//!
//! Records authentication, report runs (including every fallback to
//! sample data) and ops actions. Entries are kept for the session and,
//! once [`init`] has named a directory, persisted as one JSON file per day.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

lazy_static::lazy_static! {
    /// Global session changes tracker
    static ref SESSION_ENTRIES: Mutex<Vec<AuditEntry>> = Mutex::new(Vec::new());
    /// Current session ID
    static ref SESSION_ID: String = generate_session_id();
    /// Where entries are persisted; unset means session-only
    static ref AUDIT_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

/// Long-running watch loops record every pass; older entries are still on disk
const MAX_SESSION_ENTRIES: usize = 1000;

fn generate_session_id() -> String {
    format!("session-{}", chrono::Local::now().format("%Y%m%d-%H%M%S"))
}

/// Persist entries under `dir` from now on
pub fn init(dir: PathBuf) {
    if let Ok(mut current) = AUDIT_DIR.lock() {
        *current = Some(dir);
    }
}

fn audit_dir() -> Option<PathBuf> {
    AUDIT_DIR.lock().ok().and_then(|d| d.clone())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    UserAuthenticated,
    UserLoggedOut,
    ReportGenerated,
    /// A report section was built from generated data
    SampleDataUsed,
    TenantAdded,
    TenantRemoved,
    TenantSwitched,
    SecretsMigrated,
    ScheduleInstalled,
    ScheduleRemoved,
    CertificateCreated,
    RepositorySynced,
    FilesUploaded,
    Error,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserAuthenticated => "Authenticated",
            AuditAction::UserLoggedOut => "Logged Out",
            AuditAction::ReportGenerated => "Report Generated",
            AuditAction::SampleDataUsed => "Sample Data Used",
            AuditAction::TenantAdded => "Tenant Added",
            AuditAction::TenantRemoved => "Tenant Removed",
            AuditAction::TenantSwitched => "Tenant Switched",
            AuditAction::SecretsMigrated => "Secrets Migrated",
            AuditAction::ScheduleInstalled => "Schedule Installed",
            AuditAction::ScheduleRemoved => "Schedule Removed",
            AuditAction::CertificateCreated => "Certificate Created",
            AuditAction::RepositorySynced => "Repository Synced",
            AuditAction::FilesUploaded => "Files Uploaded",
            AuditAction::Error => "Error",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            AuditAction::UserAuthenticated => "🔑",
            AuditAction::UserLoggedOut => "🚪",
            AuditAction::ReportGenerated => "📄",
            AuditAction::SampleDataUsed => "🧪",
            AuditAction::TenantAdded => "🏢",
            AuditAction::TenantRemoved => "❌",
            AuditAction::TenantSwitched => "🔄",
            AuditAction::SecretsMigrated => "🔒",
            AuditAction::ScheduleInstalled => "⏰",
            AuditAction::ScheduleRemoved => "🗑",
            AuditAction::CertificateCreated => "📜",
            AuditAction::RepositorySynced => "🔃",
            AuditAction::FilesUploaded => "☁",
            AuditAction::Error => "⚠",
        }
    }
}

/// Severity level for audit entries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Success,
    Error,
}

/// A single audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub session_id: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub timestamp: String,
    /// Date only (for file grouping)
    pub date: String,
    pub action: AuditAction,
    pub severity: AuditSeverity,
    /// Area of the tool (Auth, Reports, Schedule, ...)
    pub category: String,
    /// What was acted on (cadence, section, file, tenant)
    pub target: String,
    pub tenant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, category: &str, target: &str, tenant: &str) -> Self {
        let now = chrono::Local::now();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: SESSION_ID.clone(),
            timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            date: now.format("%Y-%m-%d").to_string(),
            action,
            severity: AuditSeverity::Info,
            category: category.to_string(),
            target: target.to_string(),
            tenant: tenant.to_string(),
            old_value: None,
            new_value: None,
            details: None,
            success: true,
            error_message: None,
        }
    }

    pub fn with_values(mut self, old: Option<&str>, new: Option<&str>) -> Self {
        self.old_value = old.map(|s| s.to_string());
        self.new_value = new.map(|s| s.to_string());
        self
    }

    pub fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }

    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.success = false;
        self.error_message = Some(error.to_string());
        self.severity = AuditSeverity::Error;
        self
    }

    pub fn success(mut self) -> Self {
        self.success = true;
        self.severity = AuditSeverity::Success;
        self
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Record an audit entry. Persistence failures are logged, never fatal.
pub fn record(entry: AuditEntry) {
    if let Some(dir) = audit_dir() {
        if let Err(e) = persist_entry(&dir, &entry) {
            warn!(error = %e, "Failed to persist audit entry");
        }
    }

    if let Ok(mut entries) = SESSION_ENTRIES.lock() {
        push_bounded(&mut entries, entry, MAX_SESSION_ENTRIES);
    }
}

fn push_bounded(entries: &mut Vec<AuditEntry>, entry: AuditEntry, max: usize) {
    entries.push(entry);
    if entries.len() > max {
        let excess = entries.len() - max;
        entries.drain(..excess);
    }
}

pub fn record_auth(tenant: &str, method: &str, result: std::result::Result<(), &str>) {
    let entry = AuditEntry::new(AuditAction::UserAuthenticated, "Auth", method, tenant);
    record(match result {
        Ok(()) => entry.success(),
        Err(err) => entry.with_error(err),
    });
}

pub fn record_logout(tenant: &str) {
    record(AuditEntry::new(AuditAction::UserLoggedOut, "Auth", "Logout", tenant).success());
}

pub fn record_report_generated(
    cadence: &str,
    output_dir: &Path,
    sample_sections: usize,
    tenant: &str,
) {
    let mut entry = AuditEntry::new(AuditAction::ReportGenerated, "Reports", cadence, tenant)
        .with_details(&format!("Saved to: {}", output_dir.display()))
        .success();
    if sample_sections > 0 {
        entry = entry.with_severity(AuditSeverity::Warning).with_details(&format!(
            "Saved to: {} ({} section(s) from sample data)",
            output_dir.display(),
            sample_sections
        ));
    }
    record(entry);
}

pub fn record_sample_data_used(section: &str, reason: &str, tenant: &str) {
    record(
        AuditEntry::new(AuditAction::SampleDataUsed, "Reports", section, tenant)
            .with_details(reason)
            .with_severity(AuditSeverity::Warning),
    );
}

pub fn record_tenant_added(tenant: &str, auth_type: &str) {
    record(
        AuditEntry::new(AuditAction::TenantAdded, "Tenant", tenant, tenant)
            .with_details(auth_type)
            .success(),
    );
}

pub fn record_tenant_removed(tenant: &str) {
    record(
        AuditEntry::new(AuditAction::TenantRemoved, "Tenant", tenant, tenant)
            .with_severity(AuditSeverity::Warning),
    );
}

pub fn record_tenant_switch(from: Option<&str>, to: &str) {
    record(
        AuditEntry::new(AuditAction::TenantSwitched, "Tenant", to, to).with_values(from, Some(to)),
    );
}

pub fn record_secrets_migrated(tenants: &[String]) {
    record(
        AuditEntry::new(AuditAction::SecretsMigrated, "Secrets", "secrets.env", "")
            .with_details(&tenants.join(", "))
            .success(),
    );
}

pub fn record_schedule(installed: bool, cadence: &str, tenant: &str, entry_text: &str) {
    let action = if installed {
        AuditAction::ScheduleInstalled
    } else {
        AuditAction::ScheduleRemoved
    };
    record(
        AuditEntry::new(action, "Schedule", cadence, tenant)
            .with_details(entry_text)
            .success(),
    );
}

pub fn record_certificate_created(name: &str, thumbprint: &str, tenant: Option<&str>) {
    record(
        AuditEntry::new(AuditAction::CertificateCreated, "Certificates", name, tenant.unwrap_or(""))
            .with_details(&format!("Thumbprint: {}", thumbprint))
            .success(),
    );
}

pub fn record_repository_synced(repo: &Path, details: &str) {
    record(
        AuditEntry::new(
            AuditAction::RepositorySynced,
            "GitSync",
            &repo.display().to_string(),
            "",
        )
        .with_details(details)
        .success(),
    );
}

pub fn record_files_uploaded(folder_id: &str, uploaded: usize, updated: usize) {
    record(
        AuditEntry::new(AuditAction::FilesUploaded, "Drive", folder_id, "")
            .with_details(&format!("{} uploaded, {} updated", uploaded, updated))
            .success(),
    );
}

pub fn record_error(category: &str, target: &str, error: &str, tenant: &str) {
    record(AuditEntry::new(AuditAction::Error, category, target, tenant).with_error(error));
}

/// Entries recorded by this process
pub fn get_session_entries() -> Vec<AuditEntry> {
    SESSION_ENTRIES
        .lock()
        .map(|e| e.clone())
        .unwrap_or_default()
}

// =============================================================================
// Persistence
// =============================================================================

fn audit_file(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("audit-{}.json", date))
}

fn persist_entry(dir: &Path, entry: &AuditEntry) -> Result<()> {
    fs::create_dir_all(dir)?;
    let filepath = audit_file(dir, &entry.date);

    // Load existing entries for this day
    let mut entries = if filepath.exists() {
        let content = fs::read_to_string(&filepath)?;
        serde_json::from_str::<Vec<AuditEntry>>(&content).unwrap_or_default()
    } else {
        Vec::new()
    };

    entries.push(entry.clone());
    fs::write(&filepath, serde_json::to_string_pretty(&entries)?)?;
    Ok(())
}

/// Entries between two `YYYY-MM-DD` dates (inclusive), most recent first
pub fn load_entries_range(dir: &Path, start: &str, end: &str) -> Result<Vec<AuditEntry>> {
    let mut all_entries = Vec::new();

    if !dir.exists() {
        return Ok(all_entries);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_none_or(|e| e != "json") {
            continue;
        }

        let date = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix("audit-"));
        if let Some(date) = date {
            if date >= start && date <= end {
                let content = fs::read_to_string(&path)?;
                if let Ok(entries) = serde_json::from_str::<Vec<AuditEntry>>(&content) {
                    all_entries.extend(entries);
                }
            }
        }
    }

    all_entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(all_entries)
}

/// Entries from the last `days` days
pub fn load_recent_entries(dir: &Path, days: u32) -> Result<Vec<AuditEntry>> {
    let now = chrono::Local::now();
    let end = now.format("%Y-%m-%d").to_string();
    let start = (now - chrono::Duration::days(days as i64))
        .format("%Y-%m-%d")
        .to_string();

    load_entries_range(dir, &start, &end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_entry_creation() {
        let entry = AuditEntry::new(AuditAction::SampleDataUsed, "Reports", "Users", "CONTOSO")
            .with_details("HTTP 403")
            .with_severity(AuditSeverity::Warning);

        assert_eq!(entry.category, "Reports");
        assert_eq!(entry.target, "Users");
        assert_eq!(entry.tenant, "CONTOSO");
        assert!(entry.success);
        assert_eq!(entry.severity, AuditSeverity::Warning);

        let failed = AuditEntry::new(AuditAction::UserAuthenticated, "Auth", "Login", "CONTOSO")
            .with_error("AADSTS7000215");
        assert!(!failed.success);
        assert_eq!(failed.severity, AuditSeverity::Error);
    }

    #[test]
    fn test_session_tracking() {
        let marker = uuid::Uuid::new_v4().to_string();
        record_sample_data_used(&marker, "HTTP 503", "TEST");

        let entries: Vec<_> = get_session_entries()
            .into_iter()
            .filter(|e| e.target == marker)
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::SampleDataUsed);
    }

    #[test]
    fn test_session_keeps_most_recent_entries() {
        let mut entries = Vec::new();
        for pass in 0..25 {
            let target = format!("pass-{pass}");
            let entry = AuditEntry::new(AuditAction::RepositorySynced, "Ops", &target, "TEST");
            push_bounded(&mut entries, entry, 10);
        }

        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0].target, "pass-15");
        assert_eq!(entries[9].target, "pass-24");
    }

    #[test]
    fn test_persist_and_load_range() {
        let dir = tempfile::tempdir().unwrap();

        let mut older = AuditEntry::new(AuditAction::TenantAdded, "Tenant", "a", "a");
        older.date = "2026-10-01".into();
        older.timestamp = "2026-10-01 08:00:00".into();
        let mut newer = AuditEntry::new(AuditAction::ReportGenerated, "Reports", "daily", "a");
        newer.date = "2026-10-19".into();
        newer.timestamp = "2026-10-19 06:00:00".into();

        persist_entry(dir.path(), &older).unwrap();
        persist_entry(dir.path(), &newer).unwrap();
        persist_entry(dir.path(), &newer).unwrap();

        let all = load_entries_range(dir.path(), "2026-01-01", "2026-12-31").unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].action, AuditAction::ReportGenerated);

        let recent = load_entries_range(dir.path(), "2026-10-10", "2026-10-19").unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_missing_dir_loads_empty() {
        let missing = Path::new("/nonexistent/m365ops/audit");
        let entries = load_entries_range(missing, "2000-01-01", "2099-12-31").unwrap();
        assert!(entries.is_empty());
    }
}
