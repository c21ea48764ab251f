//! Integration tests for Graph client retry logic
//!
//! Uses wiremock to simulate Graph responses and verify retry behavior,
//! rate limit handling, pagination and error propagation.

use m365ops::M365Error;
use m365ops::graph::{GraphClient, PaginatedResponse, reports};
use m365ops::retry::{Classifier, ErrorCategory, RetryExecutor};
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path, path_regex, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, attempts: u32) -> GraphClient {
    GraphClient::new("test-token".into())
        .with_base_urls(
            &format!("{}/v1.0", server.uri()),
            &format!("{}/beta", server.uri()),
        )
        .with_retry(RetryExecutor::immediate(attempts))
}

#[tokio::test]
async fn test_get_sends_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/organization"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{ "id": "org-1", "displayName": "Contoso" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let org = client(&server, 3).test_connection().await.unwrap();
    assert_eq!(org.id, "org-1");
    assert_eq!(org.display_name.as_deref(), Some("Contoso"));
}

#[tokio::test]
async fn test_service_unavailable_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/subscribedSkus"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/subscribedSkus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{
                "skuId": "sku-1",
                "skuPartNumber": "ENTERPRISEPACK",
                "consumedUnits": 40,
                "prepaidUnits": { "enabled": 50 }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let licenses = reports::licenses(&client(&server, 3)).await.unwrap();
    assert_eq!(licenses.len(), 1);
    assert_eq!(licenses[0].sku_part_number, "ENTERPRISEPACK");
    assert_eq!(licenses[0].enabled_units, 50);
}

#[tokio::test]
async fn test_forbidden_fails_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/auditLogs/signIns"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": {
                "code": "Authorization_RequestDenied",
                "message": "Insufficient privileges to complete the operation."
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = reports::sign_ins(&client(&server, 5), chrono::Utc::now(), 5)
        .await
        .unwrap_err();

    match err {
        M365Error::GraphApiError { status, message, .. } => {
            assert_eq!(status, 403);
            assert!(message.starts_with("Authorization_RequestDenied"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server, 2)
        .get::<serde_json::Value>("users")
        .await
        .unwrap_err();
    assert!(matches!(err, M365Error::GraphApiError { status: 500, .. }));
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/security/alerts_v2"))
        .respond_with(
            ResponseTemplate::new(429)
                .append_header("Retry-After", "1")
                .set_body_string("Rate limited"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/security/alerts_v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": [] })))
        .expect(1)
        .mount(&server)
        .await;

    // The immediate executor computes zero delays; the wait comes from Retry-After
    let started = Instant::now();
    let alerts = reports::security_alerts(&client(&server, 3), chrono::Utc::now())
        .await
        .unwrap();
    assert!(alerts.is_empty());
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_pagination_follows_next_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/reports/authenticationMethods/userRegistrationDetails"))
        .and(query_param_is_missing("page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                { "userPrincipalName": "a@contoso.com", "isMfaRegistered": true },
                { "userPrincipalName": "b@contoso.com", "isMfaRegistered": false }
            ],
            "@odata.nextLink": format!(
                "{}/v1.0/reports/authenticationMethods/userRegistrationDetails?page=2",
                server.uri()
            )
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/reports/authenticationMethods/userRegistrationDetails"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{ "userPrincipalName": "c@contoso.com", "isMfaRegistered": true }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = reports::mfa_registration(&client(&server, 1)).await.unwrap();
    let upns: Vec<&str> = records.iter().map(|r| r.user_principal_name.as_str()).collect();
    assert_eq!(upns, vec!["a@contoso.com", "b@contoso.com", "c@contoso.com"]);
}

#[tokio::test]
async fn test_page_limit_stops_early() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{ "id": "g" }],
            "@odata.nextLink": format!("{}/v1.0/groups?next=1", server.uri())
        })))
        .expect(3)
        .mount(&server)
        .await;

    let items: Vec<serde_json::Value> = client(&server, 1)
        .get_pages_limited("groups", 3)
        .await
        .unwrap();
    assert_eq!(items.len(), 3);
}

#[tokio::test]
async fn test_mailbox_usage_csv_report() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v1\.0/reports/getMailboxUsageDetail"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "\u{feff}Report Refresh Date,User Principal Name,Display Name,Is Deleted,Last Activity Date,Item Count,Storage Used (Byte),Prohibit Send Quota (Byte)\n\
             2026-10-18,adelev@contoso.com,Adele Vance,False,2026-10-17,5120,1073741824,53687091200\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mailboxes = reports::mailbox_usage(&client(&server, 1), "D7").await.unwrap();
    assert_eq!(mailboxes.len(), 1);
    assert_eq!(mailboxes[0].display_name, "Adele Vance");
    assert_eq!(mailboxes[0].item_count, 5120);
}

#[tokio::test]
async fn test_paginated_response_shape() {
    let page: PaginatedResponse<serde_json::Value> = serde_json::from_value(serde_json::json!({
        "value": [],
        "@odata.count": 0
    }))
    .unwrap();
    assert!(page.next_link.is_none());
    assert_eq!(page.count, Some(0));
}

#[tokio::test]
async fn test_connection_failures_classify_as_network_for_every_report() {
    // Nothing listens on port 1; endpoints carry `$top=500`, `$top=999` and OData filters
    let client = GraphClient::new("test-token".into())
        .with_base_urls("http://127.0.0.1:1/v1.0", "http://127.0.0.1:1/beta")
        .with_retry(RetryExecutor::immediate(1));
    let since = chrono::Utc::now() - chrono::Duration::days(1);
    let classifier = Classifier::default();

    let failures: Vec<(&str, M365Error)> = vec![
        ("users", reports::users(&client).await.unwrap_err()),
        ("licenses", reports::licenses(&client).await.unwrap_err()),
        ("mailboxes", reports::mailbox_usage(&client, "D30").await.unwrap_err()),
        ("sign-ins", reports::sign_ins(&client, since, 5).await.unwrap_err()),
        ("mfa", reports::mfa_registration(&client).await.unwrap_err()),
        ("alerts", reports::security_alerts(&client, since).await.unwrap_err()),
    ];

    for (name, err) in failures {
        assert!(matches!(err, M365Error::HttpError(_)), "{name}: {err}");
        let message = err.to_string();
        assert!(!message.contains("$top"), "{name}: {message}");
        assert_eq!(
            classifier.classify(&message).category,
            ErrorCategory::NetworkError,
            "{name}: {message}"
        );
    }
}
