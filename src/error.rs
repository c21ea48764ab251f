use crate::retry::RetryableError;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum M365Error {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph API error: HTTP {status}: {message}")]
    GraphApiError {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Google Drive API error: HTTP {status}: {message}")]
    DriveApiError {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Stored without its URL; see the `From` impl below
    #[error("HTTP request failed: {}", describe_reqwest_error(.0))]
    HttpError(reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Interactive prompt error: {0}")]
    DialoguerError(#[from] dialoguer::Error),

    #[error("'{program}' exited with {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: String,
        stderr: String,
    },

    #[error("Token not found. Please run 'm365ops login' first")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, M365Error>;

pub use M365Error as Error;

impl RetryableError for M365Error {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            M365Error::GraphApiError { retry_after, .. }
            | M365Error::DriveApiError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

// reqwest prints the request URL in its Display text. Query strings such as
// `$top=500` would then match status-code patterns in the classifier, so the
// URL is logged here and dropped from the error.
impl From<reqwest::Error> for M365Error {
    fn from(error: reqwest::Error) -> Self {
        if let Some(url) = error.url() {
            debug!(url = %url, "HTTP request failed");
        }
        M365Error::HttpError(error.without_url())
    }
}

/// reqwest's Display hides the cause, so surface what kind of failure it was
/// for the retry classifier.
fn describe_reqwest_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("{} (timed out)", error)
    } else if error.is_connect() {
        format!("{} (connection failed)", error)
    } else {
        error.to_string()
    }
}

/// Parse Graph API error response and provide helpful context
pub fn enhance_graph_error(error_response: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) {
        if let Some(error_obj) = error_json.get("error") {
            let code = error_obj
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown");
            let message = error_obj
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("No message");

            let hint = match code {
                "Unauthorized" | "InvalidAuthenticationToken" => {
                    "\nHint: Your access token may have expired. Run 'm365ops login' again."
                }
                "Forbidden" | "Authorization_RequestDenied" | "InsufficientPrivileges" => {
                    "\nHint: The app registration needs report permissions (Reports.Read.All, AuditLog.Read.All, User.Read.All) with admin consent."
                }
                "Request_ResourceNotFound" | "NotFound" => {
                    "\nHint: The requested resource doesn't exist. Check IDs and resource names."
                }
                "TooManyRequests" => {
                    "\nHint: Graph is throttling this tenant. Requests will back off."
                }
                "BadRequest" if message.contains("Resource not found for the segment") => {
                    "\nHint: This endpoint may only be available on the beta API."
                }
                _ => "",
            };

            return format!("{}: {}{}", code, message, hint);
        }
    }

    error_response.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_failure_drops_url_before_classification() {
        // Nothing listens on port 1; the query carries a 5xx-looking number
        let err: M365Error = reqwest::get("http://127.0.0.1:1/v1.0/auditLogs/signIns?$top=500")
            .await
            .unwrap_err()
            .into();

        let message = err.to_string();
        assert!(!message.contains("$top=500"), "{}", message);
        assert!(!message.contains("127.0.0.1"), "{}", message);
        assert!(message.contains("connection failed"), "{}", message);
        assert_eq!(
            crate::retry::Classifier::default().classify(&message).category,
            crate::retry::ErrorCategory::NetworkError
        );
    }

    #[test]
    fn test_enhance_graph_error_with_hint() {
        let body = r#"{"error":{"code":"Authorization_RequestDenied","message":"Insufficient privileges to complete the operation."}}"#;
        let enhanced = enhance_graph_error(body);
        assert!(enhanced.starts_with("Authorization_RequestDenied: Insufficient privileges"));
        assert!(enhanced.contains("Reports.Read.All"));
    }

    #[test]
    fn test_enhance_graph_error_raw_passthrough() {
        assert_eq!(enhance_graph_error("upstream connect error"), "upstream connect error");
    }

    #[test]
    fn test_graph_error_display_carries_status() {
        let err = M365Error::GraphApiError {
            status: 429,
            message: "TooManyRequests: slow down".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.to_string(), "Graph API error: HTTP 429: TooManyRequests: slow down");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(M365Error::TokenNotFound.retry_after(), None);
    }
}
