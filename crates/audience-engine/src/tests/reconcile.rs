//! Server responses, analytics forwarding, identity and reset.

use super::harness::{event, wait_until, Harness, MockTransport};
use crate::EventKind;
use audience_database::{MemoryHitQueue, MemoryProfileStore, ProfileStore};
use serde_json::json;
use std::sync::Arc;

const EXAMPLE_RESPONSE: &str =
    r#"{"uuid":"u1","dests":["https://d1"],"stuff":[{"cookieKey":"k","cookieValue":"v"}]}"#;

#[tokio::test]
async fn response_updates_profile_and_shared_state() {
    let profiles = Arc::new(MemoryProfileStore::new());
    let harness = Harness::start_with(
        Arc::new(MemoryHitQueue::new()),
        profiles.clone(),
        MockTransport::new(),
    );
    harness.transport.respond(200, EXAMPLE_RESPONSE);

    harness.configure("optedin").await;
    let request = harness.request_content(json!({ "k": "v" })).await;
    assert!(harness.wait_for_response(&request).await);

    let state = harness.extension.profile().await.unwrap();
    assert_eq!(state.uuid(), "u1");
    assert_eq!(state.visitor_profile()["k"], "v");

    let (version, shared) = harness.host.shared_states().last().cloned().unwrap();
    assert_eq!(version, request);
    assert_eq!(shared["uuid"], "u1");
    assert_eq!(shared["aamprofile"]["k"], "v");

    let stored = profiles.load().unwrap();
    assert_eq!(stored.uuid, "u1");

    assert!(
        wait_until(|| harness
            .transport
            .requests()
            .iter()
            .any(|url| url.starts_with("https://d1")))
        .await
    );

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn later_hits_carry_the_server_uuid() {
    let harness = Harness::start();
    harness.transport.respond(200, EXAMPLE_RESPONSE);

    harness.configure("optedin").await;
    let first = harness.request_content(json!({})).await;
    assert!(harness.wait_for_response(&first).await);

    let second = harness.request_content(json!({})).await;
    assert!(harness.wait_for_response(&second).await);

    let hits = harness.transport.hits();
    assert!(!hits[0].contains("d_uuid="));
    assert!(hits[1].contains("d_uuid=u1"));

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn response_replaces_profile_wholesale() {
    let harness = Harness::start();
    harness.transport.respond(200, EXAMPLE_RESPONSE);
    harness.transport.respond(
        200,
        r#"{"uuid":"u1","stuff":[{"cookieKey":"other","cookieValue":"x"},{"cookieKey":"partial"}]}"#,
    );

    harness.configure("optedin").await;
    let first = harness.request_content(json!({})).await;
    assert!(harness.wait_for_response(&first).await);
    let second = harness.request_content(json!({})).await;
    assert!(harness.wait_for_response(&second).await);

    let state = harness.extension.profile().await.unwrap();
    assert_eq!(state.visitor_profile().len(), 1);
    assert_eq!(state.visitor_profile()["other"], "x");

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn unreadable_response_keeps_profile() {
    let harness = Harness::start();
    harness.transport.respond(200, EXAMPLE_RESPONSE);
    harness.transport.respond(200, "<html>oops</html>");

    harness.configure("optedin").await;
    let first = harness.request_content(json!({})).await;
    assert!(harness.wait_for_response(&first).await);
    let second = harness.request_content(json!({})).await;
    assert!(harness.wait_for_response(&second).await);

    assert!(harness.host.responses_to(&second)[0]
        .visitor_profile()
        .is_none());
    let state = harness.extension.profile().await.unwrap();
    assert_eq!(state.uuid(), "u1");
    assert_eq!(state.visitor_profile()["k"], "v");

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn visitor_identity_is_folded_into_hits() {
    let harness = Harness::start();
    harness.configure("optedin").await;
    harness
        .send(event(
            EventKind::IdentityResponse,
            json!({
                "mid": "ecid-1",
                "blob": "blob-1",
                "locationhint": "9",
                "visitoridslist": [{ "id_type": "crm", "id": "c1", "authentication_state": 1 }],
            }),
        ))
        .await;

    let request = harness.request_content(json!({})).await;
    assert!(harness.wait_for_response(&request).await);

    let hit = &harness.transport.hits()[0];
    assert!(hit.contains("d_mid=ecid-1"));
    assert!(hit.contains("d_blob=blob-1"));
    assert!(hit.contains("dcs_region=9"));
    assert!(hit.contains("d_cid_ic=crm%01c1%011"));
    assert!(hit.contains("d_orgid=ORG%40AdobeOrg"));
    assert!(hit.ends_with("d_ptfm=rust&d_dst=1&d_rtbd=json"));

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn lifecycle_keys_are_remapped() {
    let harness = Harness::start();
    harness.configure("optedin").await;
    harness
        .send(event(
            EventKind::LifecycleResponse,
            json!({ "lifecyclecontextdata": { "appid": "app", "launches": "2", "custom": "x" } }),
        ))
        .await;

    assert!(wait_until(|| harness.transport.hits().len() == 1).await);
    let hit = &harness.transport.hits()[0];
    assert!(hit.contains("c_a_AppID=app"));
    assert!(hit.contains("c_a_Launches=2"));
    assert!(!hit.contains("custom"));

    // Nobody waits on a lifecycle hit.
    assert!(harness.host.dispatched().is_empty());

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn analytics_forwarding_reconciles_without_a_hit() {
    let harness = Harness::start();
    harness
        .send(event(
            EventKind::ConfigurationResponse,
            json!({
                "global.privacy": "optedin",
                "audience.server": "dpm.demdex.net",
                "analytics.aamForwardingEnabled": true,
            }),
        ))
        .await;

    harness
        .send(event(
            EventKind::LifecycleResponse,
            json!({ "lifecyclecontextdata": { "launches": "1" } }),
        ))
        .await;
    let analytics = harness
        .send(event(
            EventKind::AnalyticsResponse,
            json!({ "analyticsserverresponse": EXAMPLE_RESPONSE }),
        ))
        .await;
    harness.settle().await;

    let state = harness.extension.profile().await.unwrap();
    assert_eq!(state.uuid(), "u1");

    let (version, _) = harness.host.shared_states().last().cloned().unwrap();
    assert_eq!(version, analytics);
    assert_eq!(harness.pending(), 0);
    assert!(harness.transport.hits().is_empty());

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn analytics_response_ignored_without_forwarding() {
    let harness = Harness::start();
    harness.configure("optedin").await;

    harness
        .send(event(
            EventKind::AnalyticsResponse,
            json!({ "analyticsserverresponse": EXAMPLE_RESPONSE }),
        ))
        .await;
    harness.settle().await;

    assert_eq!(harness.extension.profile().await.unwrap().uuid(), "");
    assert!(harness.host.shared_states().is_empty());

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn identity_request_returns_current_profile() {
    let harness = Harness::start();
    harness.transport.respond(200, EXAMPLE_RESPONSE);
    harness.configure("optedin").await;
    let content = harness.request_content(json!({})).await;
    assert!(harness.wait_for_response(&content).await);

    let request = harness
        .send(event(EventKind::AudienceRequestIdentity, json!({})))
        .await;
    harness.settle().await;

    let responses = harness.host.responses_to(&request);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].kind, crate::OutboundKind::AudienceResponseIdentity);
    assert_eq!(responses[0].visitor_profile().unwrap()["k"], "v");

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn reset_clears_identity() {
    let harness = Harness::start();
    harness.transport.respond(200, EXAMPLE_RESPONSE);
    harness.configure("optedin").await;
    let content = harness.request_content(json!({})).await;
    assert!(harness.wait_for_response(&content).await);

    let reset = harness
        .send(event(EventKind::AudienceRequestReset, json!({})))
        .await;
    harness.settle().await;

    let state = harness.extension.profile().await.unwrap();
    assert_eq!(state.uuid(), "");
    assert!(state.visitor_profile().is_empty());

    let (version, shared) = harness.host.shared_states().last().cloned().unwrap();
    assert_eq!(version, reset);
    assert_eq!(shared["uuid"], "");
    assert_eq!(harness.profiles.load().unwrap().uuid, "");

    harness.extension.shutdown().await;
}
