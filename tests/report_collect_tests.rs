//! End-to-end report collection against a mock Graph
//!
//! Sections whose endpoint fails are replaced with sample data in fallback
//! mode, and fail the run in live mode.

use chrono::{TimeZone, Utc};
use m365ops::M365Error;
use m365ops::graph::GraphClient;
use m365ops::report::{
    Cadence, DataMode, DataOrigin, ReportCollector, ReportFormat, ReportSection, SectionRows,
    write_report,
};
use m365ops::retry::RetryExecutor;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn graph_with_forbidden_sign_ins() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/auditLogs/signIns"))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": {
                "code": "Authorization_RequestDenied",
                "message": "Insufficient privileges to complete the operation."
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/security/alerts_v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": [] })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{
                "displayName": "Adele Vance",
                "userPrincipalName": "adelev@contoso.com",
                "accountEnabled": true,
                "assignedLicenses": [{ "skuId": "a" }]
            }]
        })))
        .mount(&server)
        .await;

    server
}

fn graph(server: &MockServer) -> GraphClient {
    GraphClient::new("test-token".into())
        .with_base_urls(
            &format!("{}/v1.0", server.uri()),
            &format!("{}/beta", server.uri()),
        )
        .with_retry(RetryExecutor::immediate(2))
}

#[tokio::test]
async fn test_fallback_replaces_only_failed_sections() {
    let server = graph_with_forbidden_sign_ins().await;
    let client = graph(&server);
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap();

    let dataset = ReportCollector::new("Contoso", "tid", DataMode::LiveWithFallback)
        .with_graph(&client)
        .with_seed(Some(7))
        .at(now)
        .collect(Cadence::Daily)
        .await
        .unwrap();

    assert_eq!(dataset.sections.len(), 3);
    assert_eq!(dataset.sample_sections().count(), 1);

    for section in &dataset.sections {
        match (section.section, &section.origin) {
            (ReportSection::SignIns, DataOrigin::Sample(reason)) => {
                assert!(reason.contains("403"), "{}", reason);
                assert!(!section.data.is_empty());
            }
            (ReportSection::Users, DataOrigin::Live) => match &section.data {
                SectionRows::Users(users) => {
                    assert_eq!(users.len(), 1);
                    assert_eq!(users[0].user_principal_name, "adelev@contoso.com");
                }
                other => panic!("unexpected rows: {other:?}"),
            },
            (ReportSection::SecurityAlerts, DataOrigin::Live) => assert!(section.data.is_empty()),
            (s, origin) => panic!("unexpected {s:?} / {origin:?}"),
        }
    }
}

#[tokio::test]
async fn test_live_mode_surfaces_section_failure() {
    let server = graph_with_forbidden_sign_ins().await;
    let client = graph(&server);

    let err = ReportCollector::new("Contoso", "tid", DataMode::Live)
        .with_graph(&client)
        .collect(Cadence::Daily)
        .await
        .unwrap_err();

    assert!(matches!(err, M365Error::GraphApiError { status: 403, .. }));
}

#[tokio::test]
async fn test_written_report_flags_sample_sections() {
    let server = graph_with_forbidden_sign_ins().await;
    let client = graph(&server);
    let out = tempfile::tempdir().unwrap();

    let dataset = ReportCollector::new("Contoso", "tid", DataMode::LiveWithFallback)
        .with_graph(&client)
        .with_seed(Some(1))
        .collect(Cadence::Daily)
        .await
        .unwrap();

    let files = write_report(
        &dataset,
        out.path(),
        &[ReportFormat::Html, ReportFormat::Csv, ReportFormat::Json],
        None,
    )
    .await
    .unwrap();

    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();
    for expected in ["report.html", "sign-ins.csv", "users.csv", "summary.csv", "report.json"] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}: {names:?}");
    }

    let html = std::fs::read_to_string(out.path().join("report.html")).unwrap();
    assert!(html.contains("adelev@contoso.com"));
    assert!(html.contains("badge-sample"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.path().join("report.json")).unwrap())
            .unwrap();
    assert_eq!(json["tenant"], "Contoso");
}
