//! Behavioral tests for the audience extension.
//!
//! - `ordering.rs`   - FIFO drain, single hit in flight, retry and drop
//! - `privacy.rs`    - Opt-in gating, opt-out purge and clearing
//! - `reconcile.rs`  - Server responses, analytics forwarding, identity
//! - `recovery.rs`   - Unreadable records, restart over a persisted queue

mod reconcile;
mod recovery;

use harness::{event, wait_until, Harness, SERVER};
use serde_json::json;

/// Basic workflow: opt in, request segments, receive a profile.
#[tokio::test]
async fn basic_workflow() {
    let harness = Harness::start();
    harness.transport.respond(
        200,
        r#"{"uuid":"u1","dests":[],"stuff":[{"cookieKey":"k","cookieValue":"v"}]}"#,
    );

    harness.configure("optedin").await;
    let request = harness.request_content(json!({ "trait": "a" })).await;

    assert!(harness.wait_for_response(&request).await);

    let responses = harness.host.responses_to(&request);
    assert_eq!(responses.len(), 1);
    let profile = responses[0].visitor_profile().unwrap();
    assert_eq!(profile["k"], "v");

    let hits = harness.transport.hits();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].starts_with("https://dpm.demdex.net/event?c_trait=a"));

    assert!(wait_until(|| harness.pending() == 0).await);
    assert_eq!(harness.extension.profile().await.unwrap().uuid(), "u1");

    harness.extension.shutdown().await;
}

/// An out-of-range timeout falls back to the default; the extension keeps
/// handling events.
#[tokio::test]
async fn oversized_timeout_keeps_extension_running() {
    let harness = Harness::start();
    harness
        .send(event(
            crate::EventKind::ConfigurationResponse,
            json!({
                "global.privacy": "optedin",
                "audience.server": SERVER,
                "audience.timeout": 1e30,
            }),
        ))
        .await;

    let request = harness.request_content(json!({ "k": "v" })).await;
    assert!(harness.wait_for_response(&request).await);
    assert_eq!(harness.transport.hits().len(), 1);

    harness.extension.shutdown().await;
}
