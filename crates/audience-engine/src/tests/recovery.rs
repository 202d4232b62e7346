//! Unreadable records and restarts over a persisted queue.

use super::harness::{wait_until, Harness, MockTransport};
use crate::{EventId, Hit, HitOrigin};
use audience_database::{
    AudienceDatabase, DurableQueue, MemoryHitQueue, MemoryProfileStore, ProfileStore,
    StoredProfile,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn encoded_hit(url: &str) -> Vec<u8> {
    Hit::new(
        url.to_string(),
        Duration::from_secs(2),
        EventId::from_string("evt"),
        HitOrigin::Lifecycle,
    )
    .encode()
    .unwrap()
}

#[tokio::test]
async fn unreadable_record_is_removed_and_draining_continues() {
    let queue = Arc::new(MemoryHitQueue::new());
    queue.enqueue(b"not a hit").unwrap();
    queue
        .enqueue(&encoded_hit("https://dpm.demdex.net/event?c_n=1&d_dst=1"))
        .unwrap();

    let harness = Harness::start_with(
        queue.clone(),
        Arc::new(MemoryProfileStore::new()),
        MockTransport::new(),
    );
    harness.configure("optedin").await;

    assert!(wait_until(|| harness.transport.hits().len() == 1).await);
    assert!(wait_until(|| queue.is_empty().unwrap()).await);
    assert!(harness.transport.hits()[0].contains("c_n=1"));

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn queued_hits_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audience.sqlite");

    {
        let db = AudienceDatabase::open(&path).unwrap();
        let harness = Harness::start_with(
            Arc::new(db.hit_queue()),
            Arc::new(db.profile_store()),
            MockTransport::new(),
        );
        harness.transport.hold();
        harness.configure("optedin").await;
        harness.request_content(json!({ "n": "1" })).await;
        harness.request_content(json!({ "n": "2" })).await;

        // Stop while the first hit is in flight.
        assert!(wait_until(|| harness.transport.hits().len() == 1).await);
        assert_eq!(harness.pending(), 2);
        harness.extension.shutdown().await;
    }

    let db = AudienceDatabase::open(&path).unwrap();
    let harness = Harness::start_with(
        Arc::new(db.hit_queue()),
        Arc::new(db.profile_store()),
        MockTransport::new(),
    );
    assert_eq!(harness.pending(), 2);

    // Nothing drains until privacy is declared again.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.transport.hits().is_empty());

    harness.configure("optedin").await;
    assert!(wait_until(|| harness.transport.hits().len() == 2).await);
    let hits = harness.transport.hits();
    assert!(hits[0].contains("c_n=1"));
    assert!(hits[1].contains("c_n=2"));
    assert!(wait_until(|| harness.pending() == 0).await);

    harness.extension.shutdown().await;
}

#[tokio::test]
async fn stored_profile_is_loaded_at_startup() {
    let dir = TempDir::new().unwrap();
    let db = AudienceDatabase::open(&dir.path().join("audience.sqlite")).unwrap();
    db.profile_store()
        .save(&StoredProfile {
            uuid: "u7".to_string(),
            visitor_profile: [("seg".to_string(), "1".to_string())].into(),
        })
        .unwrap();

    let harness = Harness::start_with(
        Arc::new(db.hit_queue()),
        Arc::new(db.profile_store()),
        MockTransport::new(),
    );

    let state = harness.extension.profile().await.unwrap();
    assert_eq!(state.uuid(), "u7");
    assert_eq!(state.visitor_profile()["seg"], "1");

    harness.configure("optedin").await;
    let request = harness.request_content(json!({})).await;
    assert!(harness.wait_for_response(&request).await);
    assert!(harness.transport.hits()[0].contains("d_uuid=u7"));

    harness.extension.shutdown().await;
}
