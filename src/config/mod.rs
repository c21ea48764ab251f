use crate::error::{M365Error, Result};
use crate::report::ReportFormat;
use crate::retry::{
    BackoffKind, ClassificationRule, Classifier, ErrorCategory, RetryExecutor, RetryPolicy,
};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides the platform config directory
pub const CONFIG_DIR_ENV: &str = "M365OPS_CONFIG_DIR";

/// File holding secrets moved out of tenants.toml
pub const SECRETS_FILE: &str = "secrets.env";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub default_tenant: Option<String>,

    #[serde(default)]
    pub log_level: String,

    #[serde(default)]
    pub current_tenant: Option<String>,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub reports: ReportSettings,

    #[serde(default)]
    pub git_sync: GitSyncSettings,

    #[serde(default)]
    pub drive: DriveSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub network_cap_secs: u64,
    pub max_delay_secs: u64,
    /// Checked before the built-in classification rules
    pub rules: Vec<RuleSettings>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 2,
            network_cap_secs: 10,
            max_delay_secs: 300,
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RuleSettings {
    pub category: ErrorCategory,
    pub pattern: String,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default = "default_rule_backoff")]
    pub backoff: BackoffKind,
}

fn default_rule_backoff() -> BackoffKind {
    BackoffKind::None
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.base_delay_secs))
            .with_network_cap(Duration::from_secs(self.network_cap_secs))
            .with_max_delay(Duration::from_secs(self.max_delay_secs))
    }

    pub fn classifier(&self) -> Result<Classifier> {
        let custom = self
            .rules
            .iter()
            .map(|r| ClassificationRule::new(r.category, &r.pattern, r.retryable, r.backoff))
            .collect::<Result<Vec<_>>>()?;
        Ok(Classifier::with_custom_rules(custom))
    }

    pub fn executor(&self) -> Result<RetryExecutor> {
        Ok(RetryExecutor::new(self.policy(), self.classifier()?))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReportSettings {
    pub output_dir: Option<PathBuf>,
    pub formats: Vec<ReportFormat>,
    pub fallback_to_sample: bool,
    pub pdf: bool,
    pub browser_path: Option<PathBuf>,
    pub sample_seed: Option<u64>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            formats: vec![ReportFormat::Html, ReportFormat::Csv],
            fallback_to_sample: true,
            pdf: false,
            browser_path: None,
            sample_seed: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GitSyncSettings {
    pub repo_path: Option<PathBuf>,
    pub remote: String,
    pub branch: String,
    pub interval_minutes: u64,
}

impl Default for GitSyncSettings {
    fn default() -> Self {
        Self {
            repo_path: None,
            remote: "origin".into(),
            branch: "main".into(),
            interval_minutes: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DriveSettings {
    pub folder_id: Option<String>,
    pub token_env: String,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            folder_id: None,
            token_env: "GOOGLE_DRIVE_TOKEN".into(),
        }
    }
}

/// Tenant-specific configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TenantConfig {
    pub name: String,
    pub tenant_id: String,
    pub client_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Environment variable holding the client secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_key_path: Option<PathBuf>,

    /// Hex SHA-1 thumbprint of the DER certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_thumbprint: Option<String>,

    #[serde(default)]
    pub auth_type: AuthType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TenantConfig {
    pub fn new(name: &str, tenant_id: &str, client_id: &str) -> Self {
        Self {
            name: name.to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: None,
            client_secret_env: None,
            certificate_path: None,
            certificate_key_path: None,
            certificate_thumbprint: None,
            auth_type: AuthType::DeviceCode,
            description: None,
        }
    }

    /// Name used for this tenant's secret once migrated out of tenants.toml
    pub fn secret_env_name(&self) -> String {
        let sanitized: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("M365OPS_{}_CLIENT_SECRET", sanitized)
    }

    pub fn has_secret(&self) -> bool {
        self.client_secret.is_some() || self.client_secret_env.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    DeviceCode,
    ClientCredentials,
    Certificate,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::DeviceCode => "Device Code Flow",
            AuthType::ClientCredentials => "Client Credentials",
            AuthType::Certificate => "Certificate",
        }
    }
}

/// Token cache structure
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub tenant_id: String,
}

/// Platform config directory, or `M365OPS_CONFIG_DIR` when set
pub fn default_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    let project_dirs = ProjectDirs::from("com", "m365ops", "m365ops").ok_or_else(|| {
        M365Error::ConfigError("Failed to determine config directory".into())
    })?;

    Ok(project_dirs.config_dir().to_path_buf())
}

/// Configuration manager
#[derive(Clone, Debug)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::with_dir(default_config_dir()?)
    }

    /// Alias for new()
    pub fn load() -> Result<Self> {
        Self::new()
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.into();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn tenants_file(&self) -> PathBuf {
        self.config_dir.join("tenants.toml")
    }

    pub fn secrets_file(&self) -> PathBuf {
        self.config_dir.join(SECRETS_FILE)
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.config_dir.join("audit")
    }

    pub fn token_cache_file(&self, tenant_name: &str) -> PathBuf {
        self.config_dir
            .join("cache")
            .join(format!("{}.token", tenant_name))
    }

    /// Where reports land when neither the CLI nor config names a directory
    pub fn default_report_dir(&self) -> PathBuf {
        self.config_dir.join("reports")
    }

    /// Load main config
    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.config_file();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save main config
    pub fn save_config(&self, config: &Config) -> Result<()> {
        let contents = toml::to_string_pretty(config)
            .map_err(|e| M365Error::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    /// Load all tenants
    pub fn load_tenants(&self) -> Result<Vec<TenantConfig>> {
        let tenants_path = self.tenants_file();

        if !tenants_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(tenants_path)?;

        #[derive(Deserialize)]
        struct TenantsFile {
            #[serde(default)]
            tenants: Vec<TenantConfig>,
        }

        let file: TenantsFile = toml::from_str(&contents)?;
        Ok(file.tenants)
    }

    /// Save all tenants
    pub fn save_tenants(&self, tenants: &[TenantConfig]) -> Result<()> {
        #[derive(Serialize)]
        struct TenantsFile<'a> {
            tenants: &'a [TenantConfig],
        }

        let file = TenantsFile { tenants };
        let contents = toml::to_string_pretty(&file)
            .map_err(|e| M365Error::ConfigError(format!("Failed to serialize tenants: {}", e)))?;
        fs::write(self.tenants_file(), contents)?;
        Ok(())
    }

    /// Add or update tenant
    pub fn add_tenant(&self, tenant: TenantConfig) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        tenants.retain(|t| t.name != tenant.name);
        tenants.push(tenant);
        self.save_tenants(&tenants)
    }

    /// Get tenant by name
    pub fn get_tenant(&self, name: &str) -> Result<TenantConfig> {
        self.load_tenants()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| M365Error::TenantNotFound(name.to_string()))
    }

    /// Get active tenant
    pub fn get_active_tenant(&self) -> Result<Option<TenantConfig>> {
        let config = self.load_config()?;

        match config.current_tenant.or(config.default_tenant) {
            Some(tenant_name) => Ok(Some(self.get_tenant(&tenant_name)?)),
            None => Ok(None),
        }
    }

    /// Explicit tenant name, falling back to the active tenant
    pub fn resolve_tenant(&self, name: Option<&str>) -> Result<TenantConfig> {
        match name {
            Some(name) => self.get_tenant_or_env(name),
            None => self.get_active_tenant()?.ok_or_else(|| {
                M365Error::ConfigError(
                    "No active tenant. Run 'm365ops login <NAME>' or pass --tenant.".into(),
                )
            }),
        }
    }

    /// Save token cache
    pub fn save_token(&self, tenant_name: &str, token: &TokenCache) -> Result<()> {
        let cache_dir = self.config_dir.join("cache");
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }

        let contents = serde_json::to_string_pretty(token)?;
        fs::write(self.token_cache_file(tenant_name), contents)?;
        Ok(())
    }

    /// Load token cache
    pub fn load_token(&self, tenant_name: &str) -> Result<TokenCache> {
        let token = self.read_token(tenant_name)?;

        if token.expires_at < chrono::Utc::now() {
            return Err(M365Error::AuthError("Token expired".into()));
        }

        Ok(token)
    }

    /// Load token cache without checking expiry
    pub fn read_token(&self, tenant_name: &str) -> Result<TokenCache> {
        let token_path = self.token_cache_file(tenant_name);

        if !token_path.exists() {
            return Err(M365Error::TokenNotFound);
        }

        let contents = fs::read_to_string(token_path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Delete token cache
    pub fn delete_token(&self, tenant_name: &str) -> Result<()> {
        let token_path = self.token_cache_file(tenant_name);

        if token_path.exists() {
            fs::remove_file(token_path)?;
        }

        Ok(())
    }

    /// Set the active tenant, returning the previous one
    pub fn set_active_tenant(&self, tenant_name: &str) -> Result<Option<String>> {
        self.get_tenant(tenant_name)?;

        let mut config = self.load_config()?;
        let previous = config.current_tenant.replace(tenant_name.to_string());
        self.save_config(&config)?;

        Ok(previous)
    }

    /// Remove a tenant by name
    pub fn remove_tenant(&self, tenant_name: &str) -> Result<()> {
        let mut tenants = self.load_tenants()?;
        let original_len = tenants.len();
        tenants.retain(|t| !t.name.eq_ignore_ascii_case(tenant_name));

        if tenants.len() == original_len {
            return Err(M365Error::TenantNotFound(tenant_name.to_string()));
        }

        self.save_tenants(&tenants)?;
        let _ = self.delete_token(tenant_name);

        let mut config = self.load_config()?;
        if config.current_tenant.as_deref() == Some(tenant_name) {
            config.current_tenant = None;
            self.save_config(&config)?;
        }

        Ok(())
    }

    /// Client secret for a tenant: inline value, then environment, then secrets.env
    pub fn resolve_client_secret(&self, tenant: &TenantConfig) -> Result<Option<String>> {
        if let Some(secret) = &tenant.client_secret {
            return Ok(Some(secret.clone()));
        }

        let Some(var) = &tenant.client_secret_env else {
            return Ok(None);
        };

        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return Ok(Some(value));
            }
        }

        let secrets_path = self.secrets_file();
        if secrets_path.exists() {
            let vars = parse_env_file(&fs::read_to_string(secrets_path)?);
            if let Some(value) = vars.get(var) {
                return Ok(Some(value.clone()));
            }
        }

        Err(M365Error::ConfigError(format!(
            "Tenant '{}' expects its client secret in ${}, which is not set",
            tenant.name, var
        )))
    }

    /// Load tenant from .env file in config directory
    ///
    /// Supports format:
    /// ```text
    /// # Client: Contoso
    /// TENANT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_ID=xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx
    /// CLIENT_SECRET=your-secret-here
    /// ```
    pub fn load_env_file(&self, name: &str) -> Result<Option<TenantConfig>> {
        let env_path = self.config_dir.join(format!("{}.env", name.to_lowercase()));
        let fallback_path = self.config_dir.join(".env");

        let path = if env_path.exists() {
            env_path
        } else if fallback_path.exists() {
            fallback_path
        } else {
            return Ok(None);
        };

        let vars = parse_env_file(&fs::read_to_string(&path)?);
        let upper: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();

        Ok(vars_to_tenant(name, &upper).map(|mut tenant| {
            tenant.name = name.to_string();
            tenant
        }))
    }

    /// Load all tenants from a multi-tenant tenants.env file
    ///
    /// ```text
    /// [CONTOSO]
    /// NAME=Contoso Ltd
    /// TENANT_ID=...
    /// CLIENT_ID=...
    /// CLIENT_SECRET=...
    /// ```
    pub fn load_tenants_env(&self) -> Result<Vec<TenantConfig>> {
        let env_path = self.config_dir.join("tenants.env");

        if !env_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&env_path)?;
        let mut tenants = Vec::new();
        let mut current_section: Option<String> = None;
        let mut current_vars: HashMap<String, String> = HashMap::new();

        for line in contents.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                if let Some(abbrev) = current_section.take() {
                    if let Some(tenant) = vars_to_tenant(&abbrev, &current_vars) {
                        tenants.push(tenant);
                    }
                }

                current_section = Some(line[1..line.len() - 1].to_string());
                current_vars.clear();
                continue;
            }

            if let Some((key, value)) = parse_env_line(line) {
                current_vars.insert(key.to_uppercase(), value);
            }
        }

        if let Some(abbrev) = current_section {
            if let Some(tenant) = vars_to_tenant(&abbrev, &current_vars) {
                tenants.push(tenant);
            }
        }

        Ok(tenants)
    }

    /// Get tenant by name, checking env files after tenants.toml
    pub fn get_tenant_or_env(&self, name: &str) -> Result<TenantConfig> {
        if let Ok(tenant) = self.get_tenant(name) {
            return Ok(tenant);
        }

        if let Some(tenant) = self
            .load_tenants_env()?
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
        {
            self.add_tenant(tenant.clone())?;
            return Ok(tenant);
        }

        if let Some(tenant) = self.load_env_file(name)? {
            self.add_tenant(tenant.clone())?;
            return Ok(tenant);
        }

        Err(M365Error::TenantNotFound(name.to_string()))
    }
}

fn vars_to_tenant(abbrev: &str, vars: &HashMap<String, String>) -> Option<TenantConfig> {
    let tenant_id = vars.get("TENANT_ID")?;
    let client_id = vars.get("CLIENT_ID")?;

    let mut tenant = TenantConfig::new(&abbrev.to_uppercase(), tenant_id, client_id);
    tenant.client_secret = vars.get("CLIENT_SECRET").cloned();
    tenant.auth_type = if tenant.client_secret.is_some() {
        AuthType::ClientCredentials
    } else {
        AuthType::DeviceCode
    };
    tenant.description = Some(
        vars.get("NAME")
            .or_else(|| vars.get("DESCRIPTION"))
            .cloned()
            .unwrap_or_else(|| abbrev.to_string()),
    );
    Some(tenant)
}

/// Parse simple KEY=VALUE files, ignoring comments and `export ` prefixes
pub fn parse_env_file(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_env_line)
        .collect()
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let value = value.trim();

    let value = if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    };

    Some((key.trim().to_string(), value.to_string()))
}
