//! Synthetic tenant data
//!
//! Used when a run asks for sample data or when a live section fails and
//! falls back. Records have the same shape as the normalized Graph data.
//! Given a seed and a reference time, output is fully deterministic.

use super::records::{
    AlertRecord, LicenseRecord, MailboxRecord, MfaRecord, SignInRecord, UserRecord,
};
use super::{Cadence, ReportSection, SectionRows};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FIRST_NAMES: &[&str] = &[
    "Adele", "Alex", "Diego", "Grady", "Isaiah", "Johanna", "Joni", "Lee", "Lidia", "Lynne",
    "Megan", "Miriam", "Nestor", "Patti", "Pradeep", "Henrietta",
];
const LAST_NAMES: &[&str] = &[
    "Vance", "Wilber", "Siciliani", "Archie", "Langer", "Lorenz", "Sherman", "Gu", "Holloway",
    "Robbins", "Bowen", "Graham", "Wilke", "Fernandez", "Gupta", "Mueller",
];
const DEPARTMENTS: &[&str] = &["Finance", "Sales", "Marketing", "IT", "Operations", "Legal", "HR"];
const APPS: &[&str] = &[
    "Office 365 Exchange Online",
    "Microsoft Teams",
    "SharePoint Online",
    "Azure Portal",
    "Microsoft 365 Admin Center",
    "OneDrive",
];
const LOCATIONS: &[&str] = &[
    "Seattle, US",
    "London, GB",
    "Oslo, NO",
    "Sydney, AU",
    "Toronto, CA",
    "Frankfurt, DE",
];
const FAILURES: &[(i64, &str)] = &[
    (50126, "Invalid username or password"),
    (50074, "Strong authentication is required"),
    (50053, "Account is locked"),
    (53003, "Access has been blocked by Conditional Access policies"),
];
const MFA_METHODS: &[&str] = &[
    "microsoftAuthenticatorPush",
    "softwareOneTimePasscode",
    "mobilePhone",
    "fido2SecurityKey",
    "windowsHelloForBusiness",
];
const ALERT_TITLES: &[(&str, &str)] = &[
    ("Suspicious inbox forwarding rule", "exfiltration"),
    ("Atypical travel", "initialAccess"),
    ("Password spray attack", "credentialAccess"),
    ("Malware campaign detected after delivery", "execution"),
    ("Mass download by a single user", "collection"),
    ("Unusual volume of file deletion", "impact"),
];
const SERVICE_SOURCES: &[&str] = &[
    "microsoftDefenderForOffice365",
    "azureAdIdentityProtection",
    "microsoftDefenderForCloudApps",
    "microsoftDefenderForEndpoint",
];
const SKUS: &[(&str, &str)] = &[
    ("SPE_E3", "05e9a617-0261-4cee-bb44-138d3ef5d965"),
    ("SPE_E5", "06ebc4ee-1bb5-47dd-8120-11324bc54e06"),
    ("O365_BUSINESS_PREMIUM", "f245ecc8-75af-4f8e-b61f-27d8114de5f3"),
    ("EMS", "efccb6f7-5641-4e0e-bd10-b4976e1bf68e"),
    ("POWER_BI_PRO", "f8a1db68-be16-40ed-86d5-cb42ce701560"),
];

const GIB: u64 = 1024 * 1024 * 1024;

/// Seeded generator for every record type
pub struct SampleData {
    rng: StdRng,
    domain: String,
    now: DateTime<Utc>,
}

impl SampleData {
    /// Generator for `tenant` anchored at `now`. Without a seed, output varies per run.
    pub fn new(tenant: &str, seed: Option<u64>, now: DateTime<Utc>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            domain: tenant_domain(tenant),
            now,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.rng.random_range(0..items.len())]
    }

    fn person(&mut self, index: usize) -> (String, String) {
        let first = self.pick(FIRST_NAMES);
        let last = self.pick(LAST_NAMES);
        let upn = format!(
            "{}.{}{}@{}",
            first.to_lowercase(),
            last.to_lowercase(),
            index,
            self.domain
        );
        (format!("{} {}", first, last), upn)
    }

    fn recent(&mut self, window: Duration) -> DateTime<Utc> {
        let seconds = window.num_seconds().max(1);
        self.now - Duration::seconds(self.rng.random_range(0..seconds))
    }

    pub fn users(&mut self, count: usize) -> Vec<UserRecord> {
        (0..count)
            .map(|i| {
                let (display_name, upn) = self.person(i);
                let account_enabled = !self.rng.random_bool(0.08);
                let created = self.now - Duration::days(self.rng.random_range(30..1500));
                let last_sign_in = if self.rng.random_bool(0.05) {
                    None
                } else {
                    Some(self.now - Duration::hours(self.rng.random_range(1..24 * 90)))
                };
                let department = if self.rng.random_bool(0.9) {
                    Some(self.pick(DEPARTMENTS).to_string())
                } else {
                    None
                };
                UserRecord {
                    display_name,
                    user_principal_name: upn,
                    department,
                    account_enabled,
                    created: Some(created),
                    last_sign_in,
                    license_count: self.rng.random_range(0..=2),
                }
            })
            .collect()
    }

    pub fn licenses(&mut self) -> Vec<LicenseRecord> {
        let count = self.rng.random_range(2..=SKUS.len());
        SKUS.iter()
            .take(count)
            .map(|(part, id)| {
                let enabled = self.rng.random_range(5..=250i64);
                let consumed = self.rng.random_range(0..=enabled);
                LicenseRecord {
                    sku_part_number: part.to_string(),
                    sku_id: id.to_string(),
                    enabled_units: enabled,
                    consumed_units: consumed,
                }
            })
            .collect()
    }

    /// One mailbox per enabled user
    pub fn mailboxes(&mut self, users: &[UserRecord]) -> Vec<MailboxRecord> {
        users
            .iter()
            .filter(|u| u.account_enabled)
            .map(|u| {
                let quota_gib: u64 = if self.rng.random_bool(0.5) { 50 } else { 100 };
                let quota = quota_gib * GIB;
                let used = self.rng.random_range(0..quota);
                MailboxRecord {
                    user_principal_name: u.user_principal_name.clone(),
                    display_name: u.display_name.clone(),
                    item_count: self.rng.random_range(100..250_000),
                    storage_used_bytes: used,
                    prohibit_send_quota_bytes: Some(quota),
                    last_activity_date: u.last_sign_in.map(|d| d.date_naive()),
                }
            })
            .collect()
    }

    /// Sign-ins inside `[now - window, now]`, newest first
    pub fn sign_ins(
        &mut self,
        users: &[UserRecord],
        window: Duration,
        count: usize,
    ) -> Vec<SignInRecord> {
        if users.is_empty() {
            return Vec::new();
        }
        let mut sign_ins: Vec<SignInRecord> = (0..count)
            .map(|_| {
                let user = &users[self.rng.random_range(0..users.len())];
                let (error_code, failure_reason) = if self.rng.random_bool(0.12) {
                    let (code, reason) = FAILURES[self.rng.random_range(0..FAILURES.len())];
                    (code, Some(reason.to_string()))
                } else {
                    (0, None)
                };
                let risk_level = match self.rng.random_range(0..100) {
                    0..=2 => "high",
                    3..=9 => "medium",
                    10..=19 => "low",
                    _ => "none",
                };
                SignInRecord {
                    created: self.recent(window),
                    user_principal_name: user.user_principal_name.clone(),
                    app_display_name: self.pick(APPS).to_string(),
                    ip_address: format!(
                        "203.0.113.{}",
                        self.rng.random_range(1..=254u8)
                    ),
                    location: self.pick(LOCATIONS).to_string(),
                    error_code,
                    failure_reason,
                    risk_level: risk_level.to_string(),
                }
            })
            .collect();
        sign_ins.sort_by(|a, b| b.created.cmp(&a.created));
        sign_ins
    }

    pub fn mfa(&mut self, users: &[UserRecord]) -> Vec<MfaRecord> {
        users
            .iter()
            .map(|u| {
                let is_admin = self.rng.random_bool(0.1);
                let is_mfa_registered = self.rng.random_bool(if is_admin { 0.9 } else { 0.75 });
                let methods: Vec<String> = if is_mfa_registered {
                    let n = self.rng.random_range(1..=3);
                    let mut methods = Vec::with_capacity(n);
                    while methods.len() < n {
                        let method = self.pick(MFA_METHODS).to_string();
                        if !methods.contains(&method) {
                            methods.push(method);
                        }
                    }
                    methods
                } else {
                    Vec::new()
                };
                MfaRecord {
                    user_principal_name: u.user_principal_name.clone(),
                    display_name: u.display_name.clone(),
                    is_mfa_registered,
                    is_admin,
                    default_method: methods.first().cloned(),
                    methods,
                }
            })
            .collect()
    }

    pub fn alerts(&mut self, window: Duration) -> Vec<AlertRecord> {
        let count = self.rng.random_range(0..=8);
        let mut alerts: Vec<AlertRecord> = (0..count)
            .map(|_| {
                let (title, category) = ALERT_TITLES[self.rng.random_range(0..ALERT_TITLES.len())];
                let severity = match self.rng.random_range(0..10) {
                    0..=1 => "high",
                    2..=5 => "medium",
                    _ => "low",
                };
                let status = match self.rng.random_range(0..10) {
                    0..=3 => "new",
                    4..=5 => "inProgress",
                    _ => "resolved",
                };
                AlertRecord {
                    title: title.to_string(),
                    severity: severity.to_string(),
                    status: status.to_string(),
                    category: category.to_string(),
                    created: self.recent(window),
                    service_source: self.pick(SERVICE_SOURCES).to_string(),
                }
            })
            .collect();
        alerts.sort_by(|a, b| b.created.cmp(&a.created));
        alerts
    }

    /// Rows for one report section, sized for the cadence
    pub fn section(&mut self, section: ReportSection, cadence: Cadence) -> SectionRows {
        let window = cadence.lookback();
        match section {
            ReportSection::Users => SectionRows::Users(self.users(25)),
            ReportSection::Licenses => SectionRows::Licenses(self.licenses()),
            ReportSection::Mailboxes => {
                let users = self.users(25);
                SectionRows::Mailboxes(self.mailboxes(&users))
            }
            ReportSection::SignIns => {
                let users = self.users(15);
                let count = 20 * cadence.sign_in_page_limit();
                SectionRows::SignIns(self.sign_ins(&users, window, count))
            }
            ReportSection::MfaStatus => {
                let users = self.users(25);
                SectionRows::MfaStatus(self.mfa(&users))
            }
            ReportSection::SecurityAlerts => SectionRows::SecurityAlerts(self.alerts(window)),
        }
    }
}

/// `Contoso EU` -> `contosoeu.onmicrosoft.com`
pub fn tenant_domain(tenant: &str) -> String {
    let slug: String = tenant
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let slug = if slug.is_empty() { "contoso".into() } else { slug };
    format!("{}.onmicrosoft.com", slug)
}
