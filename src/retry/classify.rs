//! Error classification
//!
//! Maps an error message onto an [`ErrorCategory`] using an ordered list of
//! case-insensitive patterns. The first matching rule wins; anything that
//! matches nothing is `Unknown` and is never retried.

use super::backoff::BackoffKind;
use crate::error::{M365Error, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    ServiceUnavailable,
    Timeout,
    NotFound,
    Permission,
    NetworkError,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "Authentication",
            ErrorCategory::RateLimit => "RateLimit",
            ErrorCategory::ServiceUnavailable => "ServiceUnavailable",
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::NotFound => "NotFound",
            ErrorCategory::Permission => "Permission",
            ErrorCategory::NetworkError => "NetworkError",
            ErrorCategory::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single pattern → category mapping
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub category: ErrorCategory,
    pub pattern: Regex,
    pub retryable: bool,
    pub backoff: BackoffKind,
}

impl ClassificationRule {
    pub fn new(
        category: ErrorCategory,
        pattern: &str,
        retryable: bool,
        backoff: BackoffKind,
    ) -> Result<Self> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| {
                M365Error::InvalidConfig(format!(
                    "Invalid classification pattern '{}': {}",
                    pattern, e
                ))
            })?;

        Ok(Self {
            category,
            pattern,
            retryable,
            backoff,
        })
    }

    pub fn matches(&self, message: &str) -> bool {
        self.pattern.is_match(message)
    }
}

/// Outcome of classifying one error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub retryable: bool,
    pub backoff: BackoffKind,
}

impl Classification {
    pub const UNKNOWN: Classification = Classification {
        category: ErrorCategory::Unknown,
        retryable: false,
        backoff: BackoffKind::None,
    };
}

/// Ordered rule set
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
}

impl Classifier {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Rules tuned for Graph, Entra ID token endpoints and the CLIs we shell out to
    pub fn with_default_rules() -> Self {
        Self::new(default_rules())
    }

    /// Custom rules are consulted before the built-in ones
    pub fn with_custom_rules(custom: Vec<ClassificationRule>) -> Self {
        let mut rules = custom;
        rules.extend(default_rules());
        Self::new(rules)
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn classify(&self, message: &str) -> Classification {
        self.rules
            .iter()
            .find(|rule| rule.matches(message))
            .map(|rule| Classification {
                category: rule.category,
                retryable: rule.retryable,
                backoff: rule.backoff,
            })
            .unwrap_or(Classification::UNKNOWN)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

const DEFAULT_PATTERNS: &[(ErrorCategory, &str, bool, BackoffKind)] = &[
    (
        ErrorCategory::RateLimit,
        r"\b429\b|too ?many ?requests|throttl|rate.?limit",
        true,
        BackoffKind::Exponential,
    ),
    (
        ErrorCategory::Authentication,
        concat!(
            r"\b401\b|unauthori[sz]ed|invalidauthenticationtoken|authentication failed",
            r"|token (has )?expired|AADSTS\d+",
        ),
        false,
        BackoffKind::None,
    ),
    (
        ErrorCategory::Permission,
        concat!(
            r"\b403\b|forbidden|insufficient privileges|authorization_requestdenied",
            r"|access (is )?denied|permission denied",
        ),
        false,
        BackoffKind::None,
    ),
    (
        ErrorCategory::NotFound,
        r"\b404\b|not ?found|does not exist|resourcenotfound",
        false,
        BackoffKind::None,
    ),
    (
        ErrorCategory::ServiceUnavailable,
        r"\b50[023]\b|service ?unavailable|internal ?server ?error|bad ?gateway",
        true,
        BackoffKind::Extended,
    ),
    (
        ErrorCategory::Timeout,
        r"\b40[8]\b|\b504\b|timed? ?out|timeout|deadline exceeded",
        true,
        BackoffKind::Linear,
    ),
    (
        ErrorCategory::NetworkError,
        concat!(
            r"network|connection (refused|reset|closed|failed)|error sending request",
            r"|\bdns\b|could not resolve|unreachable|broken pipe",
        ),
        true,
        BackoffKind::NetworkShort,
    ),
];

fn default_rules() -> Vec<ClassificationRule> {
    DEFAULT_PATTERNS
        .iter()
        .filter_map(|(category, pattern, retryable, backoff)| {
            ClassificationRule::new(*category, pattern, *retryable, *backoff).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_all_compile() {
        assert_eq!(
            Classifier::with_default_rules().rules().len(),
            DEFAULT_PATTERNS.len()
        );
    }

    #[test]
    fn test_classify_graph_messages() {
        let classifier = Classifier::default();

        let cases = [
            ("Graph API error: HTTP 429: TooManyRequests: slow down", ErrorCategory::RateLimit),
            (
                "Graph API error: HTTP 401: InvalidAuthenticationToken: Access token is empty.",
                ErrorCategory::Authentication,
            ),
            ("403 Forbidden", ErrorCategory::Permission),
            (
                "Graph API error: HTTP 404: Request_ResourceNotFound: Resource not found.",
                ErrorCategory::NotFound,
            ),
            ("Graph API error: HTTP 503: ServiceUnavailable", ErrorCategory::ServiceUnavailable),
            ("Graph API error: HTTP 504: GatewayTimeout", ErrorCategory::Timeout),
            ("HTTP request failed: error sending request (timed out)", ErrorCategory::Timeout),
            (
                "HTTP request failed: error sending request (connection failed)",
                ErrorCategory::NetworkError,
            ),
            (
                "fatal: unable to access 'https://github.com/x/y.git/': Could not resolve host",
                ErrorCategory::NetworkError,
            ),
            ("something odd happened", ErrorCategory::Unknown),
        ];

        for (message, expected) in cases {
            assert_eq!(classifier.classify(message).category, expected, "{}", message);
        }
    }

    #[test]
    fn test_status_codes_need_word_boundaries() {
        let classifier = Classifier::default();
        // 15000 contains "500" but is not an HTTP status
        assert_eq!(
            classifier.classify("waited 15000 ms").category,
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // "429 ... unauthorized" matches both rate-limit and auth; order decides
        let message = "HTTP 429 after unauthorized retry";
        assert_eq!(
            Classifier::default().classify(message).category,
            ErrorCategory::RateLimit
        );

        let auth_first = Classifier::new(vec![
            ClassificationRule::new(
                ErrorCategory::Authentication,
                "unauthorized",
                false,
                BackoffKind::None,
            )
            .unwrap(),
            ClassificationRule::new(ErrorCategory::RateLimit, "429", true, BackoffKind::Exponential)
                .unwrap(),
        ]);
        let classification = auth_first.classify(message);
        assert_eq!(classification.category, ErrorCategory::Authentication);
        assert!(!classification.retryable);
    }

    #[test]
    fn test_custom_rules_take_precedence() {
        let custom = ClassificationRule::new(
            ErrorCategory::ServiceUnavailable,
            "mailbox database is offline",
            true,
            BackoffKind::Linear,
        )
        .unwrap();
        let classifier = Classifier::with_custom_rules(vec![custom]);

        let classification = classifier.classify("The mailbox database is offline (404)");
        assert_eq!(classification.category, ErrorCategory::ServiceUnavailable);
        assert_eq!(classification.backoff, BackoffKind::Linear);
        assert_eq!(classifier.rules().len(), DEFAULT_PATTERNS.len() + 1);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let pattern = "(unclosed";
        let err = ClassificationRule::new(ErrorCategory::Unknown, pattern, false, BackoffKind::None)
            .unwrap_err();
        assert!(matches!(err, M365Error::InvalidConfig(_)));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = Classifier::default();
        let message = "Graph API error: HTTP 502: Bad Gateway";
        let first = classifier.classify(message);
        for _ in 0..10 {
            assert_eq!(classifier.classify(message), first);
        }
    }
}
