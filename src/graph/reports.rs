//! Graph data retrieval for reports
//!
//! Each function fetches one dataset and normalizes it into the flat
//! records under [`crate::report::records`].

use super::GraphClient;
use crate::error::Result;
use crate::report::records::{
    AlertRecord, LicenseRecord, MailboxRecord, MfaRecord, SignInRecord, UserRecord,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;

/// Page size for list endpoints that accept `$top`
const PAGE_SIZE: u32 = 999;

fn since_filter(since: DateTime<Utc>) -> String {
    let filter = format!(
        "createdDateTime ge {}",
        since.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    urlencoding::encode(&filter).into_owned()
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUser {
    #[serde(default)]
    pub display_name: Option<String>,
    pub user_principal_name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub account_enabled: Option<bool>,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sign_in_activity: Option<SignInActivity>,
    #[serde(default)]
    pub assigned_licenses: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInActivity {
    #[serde(default)]
    pub last_sign_in_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_non_interactive_sign_in_date_time: Option<DateTime<Utc>>,
}

impl From<GraphUser> for UserRecord {
    fn from(user: GraphUser) -> Self {
        // Either kind of sign-in counts as activity
        let last_sign_in = user.sign_in_activity.and_then(|a| {
            match (a.last_sign_in_date_time, a.last_non_interactive_sign_in_date_time) {
                (Some(x), Some(y)) => Some(x.max(y)),
                (x, y) => x.or(y),
            }
        });
        UserRecord {
            display_name: user.display_name.unwrap_or_default(),
            user_principal_name: user.user_principal_name,
            department: user.department,
            account_enabled: user.account_enabled.unwrap_or(false),
            created: user.created_date_time,
            last_sign_in,
            license_count: user.assigned_licenses.len(),
        }
    }
}

pub async fn users(client: &GraphClient) -> Result<Vec<UserRecord>> {
    let endpoint = format!(
        "users?$select=displayName,userPrincipalName,department,accountEnabled,createdDateTime,signInActivity,assignedLicenses&$top={}",
        PAGE_SIZE
    );
    let users: Vec<GraphUser> = client.get_all_pages(&endpoint).await?;
    Ok(users.into_iter().map(UserRecord::from).collect())
}

// ============================================================================
// Licenses
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedSku {
    pub sku_id: String,
    pub sku_part_number: String,
    #[serde(default)]
    pub consumed_units: i64,
    #[serde(default)]
    pub prepaid_units: PrepaidUnits,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepaidUnits {
    #[serde(default)]
    pub enabled: i64,
}

impl From<SubscribedSku> for LicenseRecord {
    fn from(sku: SubscribedSku) -> Self {
        LicenseRecord {
            sku_part_number: sku.sku_part_number,
            sku_id: sku.sku_id,
            enabled_units: sku.prepaid_units.enabled,
            consumed_units: sku.consumed_units,
        }
    }
}

pub async fn licenses(client: &GraphClient) -> Result<Vec<LicenseRecord>> {
    let skus: Vec<SubscribedSku> = client.get_all_pages("subscribedSkus").await?;
    Ok(skus.into_iter().map(LicenseRecord::from).collect())
}

// ============================================================================
// Mailbox usage (CSV report)
// ============================================================================

#[derive(Debug, Deserialize)]
struct MailboxUsageRow {
    #[serde(rename = "User Principal Name")]
    user_principal_name: String,
    #[serde(rename = "Display Name", default)]
    display_name: String,
    #[serde(rename = "Is Deleted", default)]
    is_deleted: String,
    #[serde(rename = "Last Activity Date", default)]
    last_activity_date: String,
    #[serde(rename = "Item Count", default)]
    item_count: String,
    #[serde(rename = "Storage Used (Byte)", default)]
    storage_used: String,
    #[serde(rename = "Prohibit Send Quota (Byte)", default)]
    prohibit_send_quota: String,
}

/// Parse the `getMailboxUsageDetail` CSV, dropping deleted mailboxes
pub fn parse_mailbox_usage(csv_text: &str) -> Result<Vec<MailboxRecord>> {
    let body = csv_text.trim_start_matches('\u{feff}');
    let mut reader = csv::Reader::from_reader(body.as_bytes());

    let mut mailboxes = Vec::new();
    for row in reader.deserialize::<MailboxUsageRow>() {
        let row = row?;
        if row.is_deleted.eq_ignore_ascii_case("true") {
            continue;
        }
        mailboxes.push(MailboxRecord {
            user_principal_name: row.user_principal_name,
            display_name: row.display_name,
            item_count: row.item_count.trim().parse().unwrap_or(0),
            storage_used_bytes: row.storage_used.trim().parse().unwrap_or(0),
            prohibit_send_quota_bytes: row.prohibit_send_quota.trim().parse().ok(),
            last_activity_date: NaiveDate::parse_from_str(row.last_activity_date.trim(), "%Y-%m-%d")
                .ok(),
        });
    }
    Ok(mailboxes)
}

/// `period` is one of D7, D30, D90, D180
pub async fn mailbox_usage(client: &GraphClient, period: &str) -> Result<Vec<MailboxRecord>> {
    let csv_text = client
        .get_text(&format!("reports/getMailboxUsageDetail(period='{}')", period))
        .await?;
    parse_mailbox_usage(&csv_text)
}

// ============================================================================
// Sign-ins
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSignIn {
    pub created_date_time: DateTime<Utc>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub app_display_name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub location: Option<SignInLocation>,
    #[serde(default)]
    pub status: Option<SignInStatus>,
    #[serde(default)]
    pub risk_level_during_sign_in: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country_or_region: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInStatus {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl From<GraphSignIn> for SignInRecord {
    fn from(sign_in: GraphSignIn) -> Self {
        let location = sign_in
            .location
            .map(|l| {
                [l.city, l.country_or_region]
                    .into_iter()
                    .flatten()
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        let (error_code, failure_reason) = match sign_in.status {
            Some(status) if status.error_code != 0 => (status.error_code, status.failure_reason),
            _ => (0, None),
        };
        SignInRecord {
            created: sign_in.created_date_time,
            user_principal_name: sign_in.user_principal_name.unwrap_or_default(),
            app_display_name: sign_in.app_display_name.unwrap_or_default(),
            ip_address: sign_in.ip_address.unwrap_or_default(),
            location,
            error_code,
            failure_reason,
            risk_level: sign_in
                .risk_level_during_sign_in
                .unwrap_or_else(|| "none".into()),
        }
    }
}

/// Sign-ins since `since`, newest first, reading at most `max_pages` pages
pub async fn sign_ins(
    client: &GraphClient,
    since: DateTime<Utc>,
    max_pages: usize,
) -> Result<Vec<SignInRecord>> {
    let endpoint = format!("auditLogs/signIns?$filter={}&$top=500", since_filter(since));
    let sign_ins: Vec<GraphSignIn> = client.get_pages_limited(&endpoint, max_pages).await?;
    Ok(sign_ins.into_iter().map(SignInRecord::from).collect())
}

// ============================================================================
// MFA registration
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistrationDetails {
    pub user_principal_name: String,
    #[serde(default)]
    pub user_display_name: Option<String>,
    #[serde(default)]
    pub is_mfa_registered: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub methods_registered: Vec<String>,
    #[serde(default)]
    pub default_mfa_method: Option<String>,
}

impl From<UserRegistrationDetails> for MfaRecord {
    fn from(details: UserRegistrationDetails) -> Self {
        MfaRecord {
            user_principal_name: details.user_principal_name,
            display_name: details.user_display_name.unwrap_or_default(),
            is_mfa_registered: details.is_mfa_registered,
            is_admin: details.is_admin,
            methods: details.methods_registered,
            default_method: details
                .default_mfa_method
                .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case("none")),
        }
    }
}

pub async fn mfa_registration(client: &GraphClient) -> Result<Vec<MfaRecord>> {
    let details: Vec<UserRegistrationDetails> = client
        .get_all_pages("reports/authenticationMethods/userRegistrationDetails")
        .await?;
    Ok(details.into_iter().map(MfaRecord::from).collect())
}

// ============================================================================
// Security alerts
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub created_date_time: DateTime<Utc>,
    #[serde(default)]
    pub service_source: Option<String>,
}

impl From<SecurityAlert> for AlertRecord {
    fn from(alert: SecurityAlert) -> Self {
        AlertRecord {
            title: alert.title.unwrap_or_default(),
            severity: alert.severity.unwrap_or_else(|| "unknown".into()),
            status: alert.status.unwrap_or_else(|| "unknown".into()),
            category: alert.category.unwrap_or_default(),
            created: alert.created_date_time,
            service_source: alert.service_source.unwrap_or_default(),
        }
    }
}

pub async fn security_alerts(
    client: &GraphClient,
    since: DateTime<Utc>,
) -> Result<Vec<AlertRecord>> {
    let endpoint = format!("security/alerts_v2?$filter={}", since_filter(since));
    let alerts: Vec<SecurityAlert> = client.get_all_pages(&endpoint).await?;
    Ok(alerts.into_iter().map(AlertRecord::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mailbox_csv_with_bom() {
        let csv_text = "\u{feff}Report Refresh Date,User Principal Name,Display Name,Is Deleted,Deleted Date,Created Date,Last Activity Date,Item Count,Storage Used (Byte),Issue Warning Quota (Byte),Prohibit Send Quota (Byte),Prohibit Send/Receive Quota (Byte),Report Period\n\
2026-10-18,adelev@contoso.com,Adele Vance,False,,2021-03-01,2026-10-17,5120,1073741824,52613349376,53687091200,107374182400,30\n\
2026-10-18,gone@contoso.com,Gone User,True,2026-09-01,2020-01-01,,0,0,,,,30\n\
2026-10-18,shared@contoso.com,Shared Box,False,,2022-01-01,,12,2048,,,,30\n";

        let mailboxes = parse_mailbox_usage(csv_text).unwrap();
        assert_eq!(mailboxes.len(), 2);
        assert_eq!(mailboxes[0].user_principal_name, "adelev@contoso.com");
        assert_eq!(mailboxes[0].storage_used_bytes, 1_073_741_824);
        assert_eq!(mailboxes[0].prohibit_send_quota_bytes, Some(53_687_091_200));
        assert_eq!(
            mailboxes[0].last_activity_date,
            NaiveDate::from_ymd_opt(2026, 10, 17)
        );
        assert_eq!(mailboxes[1].prohibit_send_quota_bytes, None);
        assert_eq!(mailboxes[1].last_activity_date, None);
    }

    #[test]
    fn test_sign_in_normalization() {
        let json = serde_json::json!({
            "createdDateTime": "2026-10-19T05:10:00Z",
            "userPrincipalName": "adelev@contoso.com",
            "appDisplayName": "Microsoft Teams",
            "ipAddress": "203.0.113.7",
            "location": { "city": "Oslo", "countryOrRegion": "NO" },
            "status": { "errorCode": 50126, "failureReason": "Invalid username or password" },
            "riskLevelDuringSignIn": "low"
        });
        let record: SignInRecord = serde_json::from_value::<GraphSignIn>(json).unwrap().into();
        assert_eq!(record.location, "Oslo, NO");
        assert_eq!(record.error_code, 50126);
        assert!(!record.succeeded());

        let ok = serde_json::json!({
            "createdDateTime": "2026-10-19T05:10:00Z",
            "status": { "errorCode": 0, "failureReason": "Other." }
        });
        let record: SignInRecord = serde_json::from_value::<GraphSignIn>(ok).unwrap().into();
        assert!(record.succeeded());
        assert_eq!(record.failure_reason, None);
        assert_eq!(record.risk_level, "none");
    }

    #[test]
    fn test_user_last_sign_in_takes_latest() {
        let json = serde_json::json!({
            "displayName": "Adele Vance",
            "userPrincipalName": "adelev@contoso.com",
            "accountEnabled": true,
            "signInActivity": {
                "lastSignInDateTime": "2026-10-01T00:00:00Z",
                "lastNonInteractiveSignInDateTime": "2026-10-18T00:00:00Z"
            },
            "assignedLicenses": [{ "skuId": "a" }, { "skuId": "b" }]
        });
        let user: UserRecord = serde_json::from_value::<GraphUser>(json).unwrap().into();
        assert_eq!(
            user.last_sign_in,
            Some(Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap())
        );
        assert_eq!(user.license_count, 2);
    }

    #[test]
    fn test_mfa_default_method_none_is_dropped() {
        let json = serde_json::json!({
            "userPrincipalName": "a@contoso.com",
            "isMfaRegistered": false,
            "defaultMfaMethod": "none"
        });
        let record: MfaRecord = serde_json::from_value::<UserRegistrationDetails>(json)
            .unwrap()
            .into();
        assert_eq!(record.default_method, None);
    }

    #[test]
    fn test_since_filter_is_encoded() {
        let since = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap();
        assert_eq!(
            since_filter(since),
            "createdDateTime%20ge%202026-10-18T06%3A00%3A00Z"
        );
    }
}
