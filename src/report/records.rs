//! Flat report records
//!
//! Live Graph data and generated sample data both normalize into these
//! shapes, so rendering never needs to know where a row came from.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A record that renders as one table row
pub trait Tabular {
    const HEADERS: &'static [&'static str];

    fn cells(&self) -> Vec<String>;
}

fn fmt_datetime(value: &Option<DateTime<Utc>>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn fmt_bool(value: bool) -> String {
    if value { "Yes".into() } else { "No".into() }
}

/// Bytes as GiB with two decimals
pub fn format_gib(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / 1024.0 / 1024.0 / 1024.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub display_name: String,
    pub user_principal_name: String,
    pub department: Option<String>,
    pub account_enabled: bool,
    pub created: Option<DateTime<Utc>>,
    pub last_sign_in: Option<DateTime<Utc>>,
    pub license_count: usize,
}

impl UserRecord {
    /// No sign-in within `days` of `now` (never signed in counts as inactive)
    pub fn is_inactive(&self, now: DateTime<Utc>, days: i64) -> bool {
        match self.last_sign_in {
            Some(last) => now - last > chrono::Duration::days(days),
            None => true,
        }
    }
}

impl Tabular for UserRecord {
    const HEADERS: &'static [&'static str] = &[
        "Display Name",
        "User Principal Name",
        "Department",
        "Enabled",
        "Created",
        "Last Sign-In",
        "Licenses",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.display_name.clone(),
            self.user_principal_name.clone(),
            self.department.clone().unwrap_or_default(),
            fmt_bool(self.account_enabled),
            fmt_datetime(&self.created),
            fmt_datetime(&self.last_sign_in),
            self.license_count.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub sku_part_number: String,
    pub sku_id: String,
    pub enabled_units: i64,
    pub consumed_units: i64,
}

impl LicenseRecord {
    pub fn available_units(&self) -> i64 {
        (self.enabled_units - self.consumed_units).max(0)
    }

    pub fn utilization_percent(&self) -> f64 {
        if self.enabled_units <= 0 {
            return 0.0;
        }
        self.consumed_units as f64 / self.enabled_units as f64 * 100.0
    }
}

impl Tabular for LicenseRecord {
    const HEADERS: &'static [&'static str] = &[
        "SKU",
        "SKU ID",
        "Purchased",
        "Assigned",
        "Available",
        "Utilization %",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.sku_part_number.clone(),
            self.sku_id.clone(),
            self.enabled_units.to_string(),
            self.consumed_units.to_string(),
            self.available_units().to_string(),
            format!("{:.1}", self.utilization_percent()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxRecord {
    pub user_principal_name: String,
    pub display_name: String,
    pub item_count: u64,
    pub storage_used_bytes: u64,
    pub prohibit_send_quota_bytes: Option<u64>,
    pub last_activity_date: Option<NaiveDate>,
}

impl MailboxRecord {
    pub fn quota_percent(&self) -> Option<f64> {
        self.prohibit_send_quota_bytes
            .filter(|quota| *quota > 0)
            .map(|quota| self.storage_used_bytes as f64 / quota as f64 * 100.0)
    }
}

impl Tabular for MailboxRecord {
    const HEADERS: &'static [&'static str] = &[
        "User Principal Name",
        "Display Name",
        "Items",
        "Used (GB)",
        "Quota (GB)",
        "Quota Used %",
        "Last Activity",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.user_principal_name.clone(),
            self.display_name.clone(),
            self.item_count.to_string(),
            format_gib(self.storage_used_bytes),
            self.prohibit_send_quota_bytes.map(format_gib).unwrap_or_default(),
            self.quota_percent()
                .map(|p| format!("{:.1}", p))
                .unwrap_or_default(),
            self.last_activity_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignInRecord {
    pub created: DateTime<Utc>,
    pub user_principal_name: String,
    pub app_display_name: String,
    pub ip_address: String,
    pub location: String,
    /// 0 means success
    pub error_code: i64,
    pub failure_reason: Option<String>,
    pub risk_level: String,
}

impl SignInRecord {
    pub fn succeeded(&self) -> bool {
        self.error_code == 0
    }

    pub fn is_risky(&self) -> bool {
        matches!(self.risk_level.as_str(), "medium" | "high")
    }
}

impl Tabular for SignInRecord {
    const HEADERS: &'static [&'static str] = &[
        "Time (UTC)",
        "User",
        "Application",
        "IP Address",
        "Location",
        "Result",
        "Failure Reason",
        "Risk",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.created.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.user_principal_name.clone(),
            self.app_display_name.clone(),
            self.ip_address.clone(),
            self.location.clone(),
            if self.succeeded() {
                "Success".into()
            } else {
                format!("Failure ({})", self.error_code)
            },
            self.failure_reason.clone().unwrap_or_default(),
            self.risk_level.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfaRecord {
    pub user_principal_name: String,
    pub display_name: String,
    pub is_mfa_registered: bool,
    pub is_admin: bool,
    pub methods: Vec<String>,
    pub default_method: Option<String>,
}

impl Tabular for MfaRecord {
    const HEADERS: &'static [&'static str] = &[
        "User Principal Name",
        "Display Name",
        "MFA Registered",
        "Admin",
        "Methods",
        "Default Method",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.user_principal_name.clone(),
            self.display_name.clone(),
            fmt_bool(self.is_mfa_registered),
            fmt_bool(self.is_admin),
            self.methods.join("; "),
            self.default_method.clone().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub title: String,
    pub severity: String,
    pub status: String,
    pub category: String,
    pub created: DateTime<Utc>,
    pub service_source: String,
}

impl AlertRecord {
    pub fn is_active(&self) -> bool {
        !self.status.eq_ignore_ascii_case("resolved")
    }

    pub fn is_high_severity(&self) -> bool {
        self.severity.eq_ignore_ascii_case("high")
    }
}

impl Tabular for AlertRecord {
    const HEADERS: &'static [&'static str] = &[
        "Created (UTC)",
        "Title",
        "Severity",
        "Status",
        "Category",
        "Source",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.created.format("%Y-%m-%d %H:%M").to_string(),
            self.title.clone(),
            self.severity.clone(),
            self.status.clone(),
            self.category.clone(),
            self.service_source.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_license_math() {
        let license = LicenseRecord {
            sku_part_number: "ENTERPRISEPACK".into(),
            sku_id: "6fd2c87f".into(),
            enabled_units: 50,
            consumed_units: 45,
        };
        assert_eq!(license.available_units(), 5);
        assert_eq!(license.cells()[5], "90.0");

        let overallocated = LicenseRecord {
            consumed_units: 60,
            ..license
        };
        assert_eq!(overallocated.available_units(), 0);
    }

    #[test]
    fn test_mailbox_quota() {
        let mailbox = MailboxRecord {
            user_principal_name: "a@contoso.com".into(),
            display_name: "A".into(),
            item_count: 10,
            storage_used_bytes: 45 * 1024 * 1024 * 1024,
            prohibit_send_quota_bytes: Some(50 * 1024 * 1024 * 1024),
            last_activity_date: None,
        };
        assert_eq!(mailbox.quota_percent(), Some(90.0));
        assert_eq!(mailbox.cells()[3], "45.00");

        let no_quota = MailboxRecord {
            prohibit_send_quota_bytes: None,
            ..mailbox
        };
        assert_eq!(no_quota.quota_percent(), None);
        assert_eq!(no_quota.cells()[5], "");
    }

    #[test]
    fn test_user_inactivity() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let mut user = UserRecord {
            display_name: "Adele Vance".into(),
            user_principal_name: "adelev@contoso.com".into(),
            department: None,
            account_enabled: true,
            created: None,
            last_sign_in: Some(now - chrono::Duration::days(45)),
            license_count: 1,
        };
        assert!(user.is_inactive(now, 30));
        user.last_sign_in = Some(now - chrono::Duration::days(3));
        assert!(!user.is_inactive(now, 30));
        user.last_sign_in = None;
        assert!(user.is_inactive(now, 30));
        assert_eq!(user.cells().len(), UserRecord::HEADERS.len());
    }

    #[test]
    fn test_sign_in_cells() {
        let sign_in = SignInRecord {
            created: Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap(),
            user_principal_name: "u@contoso.com".into(),
            app_display_name: "Office 365 Exchange Online".into(),
            ip_address: "203.0.113.7".into(),
            location: "Seattle, US".into(),
            error_code: 50126,
            failure_reason: Some("Invalid username or password".into()),
            risk_level: "medium".into(),
        };
        assert!(!sign_in.succeeded());
        assert!(sign_in.is_risky());
        assert_eq!(sign_in.cells()[5], "Failure (50126)");
    }
}
