//! Integration tests for the remote collector against a mock hub
//!
//! These tests verify that:
//! - The agent fetches its service list with its token
//! - Probe results are posted as one batch report
//! - A failed first fetch falls back to the configured services

use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use service_sentinel::{
    agent::{AgentConfig, Collector, HubClient, LocalProbe},
    remote::{CommandRunner, ExecError},
};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Every unit is active with pid 77
struct AllActive;

#[async_trait]
impl CommandRunner for AllActive {
    async fn run(&self, command: &str) -> Result<String, ExecError> {
        if command.contains("is-active") {
            Ok("active\n".to_string())
        } else if command.contains("MainPID") {
            Ok("77\n".to_string())
        } else {
            Ok(String::new())
        }
    }
}

fn config(server_url: &str, services: &[&str]) -> AgentConfig {
    AgentConfig::parse(&format!(
        r#"
server_url = "{server_url}/"
token = "tok-agent"
services = [{}]
"#,
        services
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(", ")
    ))
    .unwrap()
}

fn collector(config: AgentConfig) -> Collector<AllActive> {
    let client = HubClient::new(&config.server_url, &config.token, Duration::from_secs(5)).unwrap();
    Collector::new(config, client, LocalProbe::with_runner(AllActive, "linux"))
}

#[tokio::test]
async fn test_fetches_enabled_services_with_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/agent/services"))
        .and(query_param("token", "tok-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "server_id": 3,
            "services": [
                { "id": 1, "server_id": 3, "name": "nginx", "enabled": true },
                { "id": 2, "server_id": 3, "name": "old", "enabled": false },
                { "id": 3, "server_id": 3, "name": "sshd" }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client =
        HubClient::new(mock_server.uri(), "tok-agent", Duration::from_secs(5)).unwrap();

    let services = client.fetch_services().await.unwrap();

    assert_eq!(services, vec!["nginx".to_string(), "sshd".to_string()]);
}

#[tokio::test]
async fn test_reports_probed_services() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/agent/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "server_id": 3,
            "services": [{ "name": "nginx", "enabled": true }]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/agent/report"))
        .and(body_partial_json(json!({
            "token": "tok-agent",
            "services": [{ "name": "nginx", "status": "running", "pid": 77 }]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "Report received" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut collector = collector(config(&mock_server.uri(), &[]));
    collector.initial_refresh().await;
    assert_eq!(collector.services(), ["nginx".to_string()]);

    let reported = collector.check_and_report().await.unwrap();
    assert_eq!(reported, 1);
}

#[tokio::test]
async fn test_falls_back_to_configured_services() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/agent/services"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let mut collector = collector(config(&mock_server.uri(), &["postgresql", "redis"]));
    collector.initial_refresh().await;

    assert_eq!(
        collector.services(),
        ["postgresql".to_string(), "redis".to_string()]
    );
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_list() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/agent/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "server_id": 3,
            "services": [{ "name": "nginx" }]
        })))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/agent/services"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mut collector = collector(config(&mock_server.uri(), &[]));
    collector.refresh_services().await.unwrap();
    assert!(collector.refresh_services().await.is_err());

    assert_eq!(collector.services(), ["nginx".to_string()]);
}

#[tokio::test]
async fn test_rejected_report_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/agent/report"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid token" })),
        )
        .mount(&mock_server)
        .await;

    let mut collector = collector(config(&mock_server.uri(), &["nginx"]));
    collector.initial_refresh().await;

    assert!(collector.check_and_report().await.is_err());
}
