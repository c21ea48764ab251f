pub mod auth;
pub mod reports;

use crate::config::ConfigManager;
use crate::error::{M365Error, Result};
use crate::retry::RetryExecutor;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
pub const GRAPH_API_BETA: &str = "https://graph.microsoft.com/beta";

/// Per-request timeout; report downloads can be slow on large tenants
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Graph API client. Every request goes through the retry executor.
pub struct GraphClient {
    client: Client,
    access_token: String,
    base_url: String,
    beta_url: String,
    retry: RetryExecutor,
}

impl GraphClient {
    pub fn new(access_token: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            access_token,
            base_url: GRAPH_API_BASE.to_string(),
            beta_url: GRAPH_API_BETA.to_string(),
            retry: RetryExecutor::default(),
        }
    }

    /// Point the client at another host (tests use a mock server)
    pub fn with_base_urls(mut self, base_url: &str, beta_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.beta_url = beta_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Create a GraphClient from ConfigManager and tenant name
    /// This will load or acquire a token for the specified tenant
    pub async fn from_config(config: &ConfigManager, tenant_name: &str) -> Result<Self> {
        let retry = config.load_config()?.retry.executor()?;
        let graph_auth = auth::GraphAuth::new(config.clone()).with_retry(retry.clone());
        let access_token = graph_auth.get_access_token(tenant_name).await?;

        Ok(Self::new(access_token).with_retry(retry))
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    fn url(&self, base: &str, endpoint: &str) -> String {
        if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
            return endpoint.to_string();
        }
        format!("{}/{}", base, endpoint.trim_start_matches('/'))
    }

    /// GET a v1.0 endpoint
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(&self.base_url, endpoint);
        self.request_json(Method::GET, &url, None).await
    }

    /// GET a beta endpoint
    pub async fn get_beta<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let url = self.url(&self.beta_url, endpoint);
        self.request_json(Method::GET, &url, None).await
    }

    /// GET a v1.0 endpoint as text (usage reports come back as CSV)
    pub async fn get_text(&self, endpoint: &str) -> Result<String> {
        let url = self.url(&self.base_url, endpoint);
        let url = url.as_str();
        self.retry
            .run(&format!("GET {}", endpoint), move |_| async move {
                let response = self.send_once(Method::GET, url, None).await?;
                Ok::<_, M365Error>(response.text().await?)
            })
            .await
            .into_result()
    }

    /// POST JSON to a v1.0 endpoint
    pub async fn post<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R> {
        let url = self.url(&self.base_url, endpoint);
        let body = serde_json::to_value(body)?;
        self.request_json(Method::POST, &url, Some(&body)).await
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let operation = format!("{} {}", method, url);
        let method = &method;
        self.retry
            .run(&operation, move |_| async move {
                let response = self.send_once(method.clone(), url, body).await?;
                Ok::<_, M365Error>(response.json::<T>().await?)
            })
            .await
            .into_result()
    }

    /// One HTTP exchange. Non-success statuses become `GraphApiError` with
    /// the server's `Retry-After`, so the executor can classify them.
    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        debug!(%method, url, "Graph request");
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(&response);
        let error_text = response.text().await.unwrap_or_default();
        Err(M365Error::GraphApiError {
            status: status.as_u16(),
            message: crate::error::enhance_graph_error(&error_text),
            retry_after,
        })
    }

    /// Verify the token works by reading the organization object
    pub async fn test_connection(&self) -> Result<Organization> {
        let orgs: PaginatedResponse<Organization> = self.get("organization").await?;
        orgs.value
            .into_iter()
            .next()
            .ok_or_else(|| {
                M365Error::AuthError("Token is valid but no organization was returned".into())
            })
    }
}

/// `Retry-After` in seconds. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// ============================================================================
// Pagination Helpers
// ============================================================================

/// Generic paginated response from Graph API
///
/// Use this for standard OData paginated responses with `value` array and `@odata.nextLink`
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.count")]
    pub count: Option<i64>,
}

impl GraphClient {
    /// Fetch all pages of a paginated Graph API endpoint
    ///
    /// Automatically follows `@odata.nextLink` until all pages are retrieved.
    ///
    /// # Example
    /// ```ignore
    /// let all_users: Vec<User> = client.get_all_pages("users").await?;
    /// ```
    pub async fn get_all_pages<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>> {
        self.get_pages_limited(endpoint, 0).await
    }

    /// Fetch paginated results with a maximum page limit
    ///
    /// * `max_pages` - Maximum number of pages to fetch (0 = unlimited)
    pub async fn get_pages_limited<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        max_pages: usize,
    ) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let mut current_url = self.url(&self.base_url, endpoint);
        let mut page_count = 0;

        loop {
            let response: PaginatedResponse<T> =
                self.request_json(Method::GET, &current_url, None).await?;
            all_items.extend(response.value);
            page_count += 1;

            if max_pages > 0 && page_count >= max_pages {
                debug!(endpoint, page_count, "Stopped at page limit");
                break;
            }

            match response.next_link {
                Some(next) => current_url = next,
                None => break,
            }
        }

        Ok(all_items)
    }
}
