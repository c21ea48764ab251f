use crate::config::{AuthType, ConfigManager, TenantConfig, TokenCache};
use crate::error::{M365Error, Result};
use crate::ops::{cert, run_command_bytes};
use crate::retry::{RetryExecutor, RetryableError};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, DeviceAuthorizationUrl, EmptyExtraDeviceAuthorizationFields,
    ErrorResponseType, RefreshToken, RequestTokenError, Scope, StandardErrorResponse,
    TokenResponse, TokenUrl,
};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

pub const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Application permissions the reports read with
pub const REQUIRED_SCOPES: &[&str] = &[
    "User.Read.All",
    "Organization.Read.All",
    "Reports.Read.All",
    "AuditLog.Read.All",
    "UserAuthenticationMethod.Read.All",
    "SecurityAlert.Read.All",
];

/// Token endpoint failure, described so the retry classifier can tell
/// transport trouble from a rejected credential
#[derive(Debug)]
struct TokenRequestError(String);

impl fmt::Display for TokenRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl RetryableError for TokenRequestError {}

fn describe_token_error<RE, TE>(
    err: &RequestTokenError<RE, StandardErrorResponse<TE>>,
) -> TokenRequestError
where
    RE: std::error::Error + 'static,
    TE: ErrorResponseType + fmt::Display,
{
    let message = match err {
        RequestTokenError::ServerResponse(response) => match response.error_description() {
            Some(description) => format!("{}: {}", response.error(), description),
            None => response.error().to_string(),
        },
        RequestTokenError::Request(e) => format!("network error requesting token: {}", e),
        RequestTokenError::Parse(e, _) => format!("unexpected token response: {}", e),
        RequestTokenError::Other(e) => e.clone(),
    };
    TokenRequestError(message)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected { expires_at: DateTime<Utc> },
    Expired,
    NotAuthenticated,
}

#[derive(Debug, Deserialize)]
struct AssertionTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

pub struct GraphAuth {
    config_manager: ConfigManager,
    authority: String,
    retry: RetryExecutor,
}

impl GraphAuth {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self {
            config_manager,
            authority: MICROSOFT_AUTHORITY.to_string(),
            retry: RetryExecutor::default(),
        }
    }

    /// Use another identity endpoint (tests use a mock server)
    pub fn with_authority(mut self, authority: &str) -> Self {
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, tenant_id: &str, path: &str) -> String {
        format!("{}/{}/oauth2/v2.0/{}", self.authority, tenant_id, path)
    }

    fn token_url(&self, tenant_id: &str) -> Result<TokenUrl> {
        TokenUrl::new(self.endpoint(tenant_id, "token"))
            .map_err(|e| M365Error::AuthError(format!("Invalid token URL: {}", e)))
    }

    fn oauth_client(&self, tenant: &TenantConfig, secret: Option<String>) -> Result<BasicClient> {
        let auth_url = AuthUrl::new(self.endpoint(&tenant.tenant_id, "authorize"))
            .map_err(|e| M365Error::AuthError(format!("Invalid auth URL: {}", e)))?;

        Ok(BasicClient::new(
            ClientId::new(tenant.client_id.clone()),
            secret.map(ClientSecret::new),
            auth_url,
            Some(self.token_url(&tenant.tenant_id)?),
        ))
    }

    fn cache_token(
        &self,
        tenant: &TenantConfig,
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<Duration>,
    ) -> Result<TokenCache> {
        let lifetime = chrono::Duration::from_std(expires_in.unwrap_or(Duration::from_secs(3600)))
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let token_cache = TokenCache {
            access_token,
            refresh_token,
            expires_at: Utc::now() + lifetime,
            tenant_id: tenant.tenant_id.clone(),
        };

        self.config_manager.save_token(&tenant.name, &token_cache)?;
        debug!(
            tenant = %tenant.name,
            path = %self.config_manager.token_cache_file(&tenant.name).display(),
            "Token cached"
        );

        Ok(token_cache)
    }

    /// Log in with whatever flow the tenant is configured for
    pub async fn login(&self, tenant: &TenantConfig) -> Result<TokenCache> {
        match tenant.auth_type {
            AuthType::DeviceCode => self.login_device_code(tenant).await,
            AuthType::ClientCredentials => self.login_client_credentials(tenant).await,
            AuthType::Certificate => self.login_certificate(tenant).await,
        }
    }

    /// Authenticate using device code flow (interactive)
    pub async fn login_device_code(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        println!(
            "🔐 Starting device code authentication for tenant '{}'...",
            tenant_config.name
        );

        let device_auth_url =
            DeviceAuthorizationUrl::new(self.endpoint(&tenant_config.tenant_id, "devicecode"))
                .map_err(|e| M365Error::AuthError(format!("Invalid device auth URL: {}", e)))?;

        let client = self
            .oauth_client(tenant_config, None)?
            .set_device_authorization_url(device_auth_url);

        let details: oauth2::DeviceAuthorizationResponse<EmptyExtraDeviceAuthorizationFields> =
            client
                .exchange_device_code()
                .map_err(|e| M365Error::AuthError(format!("Device code exchange failed: {}", e)))?
                .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
                .add_scope(Scope::new("offline_access".to_string()))
                .request_async(async_http_client)
                .await
                .map_err(|e| {
                    M365Error::AuthError(format!(
                        "Device authorization request failed: {}",
                        describe_token_error(&e)
                    ))
                })?;

        println!("\n📱 Please visit: {}", details.verification_uri().as_str());
        println!("🔑 Enter code: {}\n", details.user_code().secret());

        // Poll for token
        let token = client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| {
                M365Error::AuthError(format!("Token exchange failed: {}", describe_token_error(&e)))
            })?;

        self.cache_token(
            tenant_config,
            token.access_token().secret().clone(),
            token.refresh_token().map(|t| t.secret().clone()),
            token.expires_in(),
        )
    }

    /// Authenticate using client credentials flow (non-interactive)
    pub async fn login_client_credentials(
        &self,
        tenant_config: &TenantConfig,
    ) -> Result<TokenCache> {
        let client_secret = self
            .config_manager
            .resolve_client_secret(tenant_config)?
            .ok_or_else(|| {
                M365Error::AuthError(format!(
                    "Client secret required for client credentials flow. Set {} or add it to {}",
                    tenant_config
                        .client_secret_env
                        .clone()
                        .unwrap_or_else(|| tenant_config.secret_env_name()),
                    self.config_manager.secrets_file().display()
                ))
            })?;

        info!(tenant = %tenant_config.name, "Authenticating with client credentials");
        let client = self.oauth_client(tenant_config, Some(client_secret))?;
        let client = &client;

        let token = self
            .retry
            .run("client credentials token", move |_| async move {
                client
                    .exchange_client_credentials()
                    .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
                    .request_async(async_http_client)
                    .await
                    .map_err(|e| describe_token_error(&e))
            })
            .await
            .into_result()
            .map_err(|e| {
                M365Error::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        self.cache_token(
            tenant_config,
            token.access_token().secret().clone(),
            None, // Client credentials don't use refresh tokens
            token.expires_in(),
        )
    }

    /// Authenticate with a certificate-signed client assertion (non-interactive)
    pub async fn login_certificate(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        let key_path = tenant_config.certificate_key_path.as_ref().ok_or_else(|| {
            M365Error::AuthError("certificate_key_path is required for certificate auth".into())
        })?;
        let key_path = key_path.to_string_lossy().to_string();

        let x5t = match (&tenant_config.certificate_thumbprint, &tenant_config.certificate_path) {
            (Some(hex), _) => cert::x5t_from_hex(hex)?,
            (None, Some(path)) => cert::thumbprint_from_pem_file(path)?.x5t,
            (None, None) => {
                return Err(M365Error::AuthError(
                    "certificate_thumbprint or certificate_path is required for certificate auth"
                        .into(),
                ));
            }
        };

        info!(tenant = %tenant_config.name, "Authenticating with certificate");
        let token_url = self.endpoint(&tenant_config.tenant_id, "token");
        let http = reqwest::Client::new();

        let response = self
            .retry
            .run("certificate token", |_| {
                let http = http.clone();
                let token_url = token_url.clone();
                let key_path = key_path.clone();
                let x5t = x5t.clone();
                let client_id = tenant_config.client_id.clone();
                async move {
                    // A fresh assertion per attempt keeps jti unique
                    let assertion = client_assertion(&client_id, &token_url, &x5t, &key_path)
                        .await
                        .map_err(|e| TokenRequestError(e.to_string()))?;
                    let response = http
                        .post(&token_url)
                        .form(&[
                            ("client_id", client_id.as_str()),
                            ("scope", GRAPH_SCOPE),
                            ("grant_type", "client_credentials"),
                            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                            ("client_assertion", assertion.as_str()),
                        ])
                        .send()
                        .await
                        .map_err(|e| TokenRequestError(M365Error::from(e).to_string()))?;

                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if !status.is_success() {
                        return Err(TokenRequestError(format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            describe_identity_error(&body)
                        )));
                    }
                    serde_json::from_str::<AssertionTokenResponse>(&body)
                        .map_err(|e| TokenRequestError(format!("unexpected token response: {}", e)))
                }
            })
            .await
            .into_result()
            .map_err(|e| M365Error::AuthError(format!("Certificate token request failed: {}", e)))?;

        self.cache_token(
            tenant_config,
            response.access_token,
            None,
            response.expires_in.map(Duration::from_secs),
        )
    }

    async fn refresh(&self, tenant: &TenantConfig, refresh_token: String) -> Result<TokenCache> {
        let client = self.oauth_client(tenant, None)?;
        let refresh_token = RefreshToken::new(refresh_token);
        let (client_ref, refresh_ref) = (&client, &refresh_token);

        let token = self
            .retry
            .run("refresh token", move |_| async move {
                client_ref
                    .exchange_refresh_token(refresh_ref)
                    .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
                    .request_async(async_http_client)
                    .await
                    .map_err(|e| describe_token_error(&e))
            })
            .await
            .into_result()
            .map_err(|e| M365Error::AuthError(format!("Token refresh failed: {}", e)))?;

        self.cache_token(
            tenant,
            token.access_token().secret().clone(),
            token
                .refresh_token()
                .map(|t| t.secret().clone())
                .or(Some(refresh_token.secret().clone())),
            token.expires_in(),
        )
    }

    /// Get valid access token.
    ///
    /// Uses the cache while it is valid. App-only tenants re-authenticate
    /// silently and device-code tenants use their refresh token; anything
    /// else needs an interactive `login`.
    pub async fn get_access_token(&self, tenant_name: &str) -> Result<String> {
        match self.config_manager.load_token(tenant_name) {
            Ok(token) => return Ok(token.access_token),
            Err(M365Error::AuthError(_)) | Err(M365Error::TokenNotFound) => {}
            Err(e) => return Err(e),
        }

        let tenant = self.config_manager.get_tenant_or_env(tenant_name)?;
        match tenant.auth_type {
            AuthType::ClientCredentials | AuthType::Certificate => {
                debug!(tenant = tenant_name, "Cached token missing or expired, re-authenticating");
                Ok(self.login(&tenant).await?.access_token)
            }
            AuthType::DeviceCode => {
                let refresh_token = self
                    .config_manager
                    .read_token(tenant_name)
                    .ok()
                    .and_then(|t| t.refresh_token)
                    .ok_or(M365Error::TokenNotFound)?;
                Ok(self.refresh(&tenant, refresh_token).await?.access_token)
            }
        }
    }

    /// Cached token state for a tenant, without touching the network
    pub fn connection_status(&self, tenant_name: &str) -> Result<ConnectionStatus> {
        match self.config_manager.read_token(tenant_name) {
            Ok(token) if token.expires_at > Utc::now() => Ok(ConnectionStatus::Connected {
                expires_at: token.expires_at,
            }),
            Ok(_) => Ok(ConnectionStatus::Expired),
            Err(M365Error::TokenNotFound) => Ok(ConnectionStatus::NotAuthenticated),
            Err(e) => Err(e),
        }
    }

    /// Logout (delete token cache)
    pub fn logout(&self, tenant_name: &str) -> Result<()> {
        self.config_manager.delete_token(tenant_name)?;
        info!(tenant = tenant_name, "Token cache removed");
        Ok(())
    }
}

/// `error: description` from an identity platform error body
fn describe_identity_error(body: &str) -> String {
    #[derive(Deserialize)]
    struct IdentityError {
        error: String,
        #[serde(default)]
        error_description: Option<String>,
    }

    match serde_json::from_str::<IdentityError>(body) {
        Ok(e) => match e.error_description {
            Some(description) => format!("{}: {}", e.error, description),
            None => e.error,
        },
        Err(_) => body.trim().to_string(),
    }
}

/// Unsigned JWT header and claims for a client assertion, base64url-joined
pub fn assertion_signing_input(
    client_id: &str,
    audience: &str,
    x5t: &str,
    now: DateTime<Utc>,
    jti: &str,
) -> Result<String> {
    let header = serde_json::json!({
        "alg": "RS256",
        "typ": "JWT",
        "x5t": x5t,
    });
    let issued = now.timestamp();
    let claims = serde_json::json!({
        "aud": audience,
        "iss": client_id,
        "sub": client_id,
        "jti": jti,
        "nbf": issued,
        "iat": issued,
        "exp": issued + 600,
    });

    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
    ))
}

/// Signed client assertion; RS256 via `openssl dgst`
async fn client_assertion(
    client_id: &str,
    audience: &str,
    x5t: &str,
    key_path: &str,
) -> Result<String> {
    let jti = uuid::Uuid::new_v4().to_string();
    let signing_input = assertion_signing_input(client_id, audience, x5t, Utc::now(), &jti)?;
    let signature = run_command_bytes(
        "openssl",
        &["dgst", "-sha256", "-sign", key_path],
        Some(signing_input.as_bytes()),
    )
    .await?;

    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
}
