//! Wire-level checks: headers, envelope shape, and signature verification
//! exactly as a receiving service would perform them.

mod common;

use std::time::Duration;

use chrono::Utc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use brandops_webhooks::{
    verify_signature, verify_webhook_request, EventStatus, EventType, ProjectId, TenantId,
    EVENT_TYPE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use common::*;

async fn deliver_one(responder: &CaptureResponder) -> (TestPipeline, CapturedRequest) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(responder.clone())
        .mount(&server)
        .await;

    let pipeline = pipeline();
    pipeline
        .endpoint(
            TENANT_A,
            &format!("{}/hook", server.uri()),
            vec![EventType::ApprovalRequested],
        )
        .await;

    let event = pipeline
        .events
        .create_event(
            EventType::ApprovalRequested,
            TenantId(TENANT_A.into()),
            Some(ProjectId("proj_7".into())),
            serde_json::json!({"approvalId": "ap_1", "requestedBy": "user_3"}),
        )
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || async {
            pipeline
                .storage
                .get_event(&event.id)
                .await
                .is_some_and(|e| e.status == EventStatus::Delivered)
        })
        .await,
        "event never delivered"
    );

    let mut requests = responder.requests();
    assert_eq!(requests.len(), 1);
    (pipeline, requests.remove(0))
}

#[tokio::test]
async fn delivery_carries_protocol_headers() {
    let responder = CaptureResponder::new();
    let (_pipeline, request) = deliver_one(&responder).await;

    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header(EVENT_TYPE_HEADER), Some("approval.requested"));
    assert_eq!(
        request.header("user-agent"),
        Some("brandops-webhooks/1.0")
    );

    let signature = request.header(SIGNATURE_HEADER).expect("missing signature");
    assert!(signature.starts_with("sha256="));

    let timestamp = request.header(TIMESTAMP_HEADER).expect("missing timestamp");
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn envelope_body_matches_event() {
    let responder = CaptureResponder::new();
    let (_pipeline, request) = deliver_one(&responder).await;

    let body = request.body_json();
    assert_eq!(body["type"], "approval.requested");
    assert_eq!(body["organizationId"], TENANT_A);
    assert_eq!(body["projectId"], "proj_7");
    assert_eq!(body["data"]["approvalId"], "ap_1");
    assert!(body["id"].as_str().is_some());
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn signature_verifies_against_exact_body_bytes() {
    let responder = CaptureResponder::new();
    let (_pipeline, request) = deliver_one(&responder).await;

    let signature = request.header(SIGNATURE_HEADER).unwrap();
    assert!(verify_signature(&request.body, signature, SECRET));
    assert!(!verify_signature(&request.body, signature, "wrong-secret"));
    assert!(!verify_signature(b"tampered body", signature, SECRET));
}

#[tokio::test]
async fn receiver_side_one_call_verification() {
    let responder = CaptureResponder::new();
    let (_pipeline, request) = deliver_one(&responder).await;

    let headers: Vec<(&str, &str)> = request
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    assert_eq!(
        verify_webhook_request(headers.iter().copied(), &request.body, SECRET, 300, Utc::now()),
        Ok(())
    );
}
