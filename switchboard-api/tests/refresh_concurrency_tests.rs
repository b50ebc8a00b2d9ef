//! Concurrent requests against a store whose refresh is due.

use std::sync::Arc;
use std::time::Duration;

use switchboard_api::{RequestRouter, RouterSettings, FALLBACK_VARIANT};
use switchboard_config::{ConfigStore, StoreOptions};
use switchboard_core::{CallerContext, ChatRequest};
use switchboard_test_utils::fixtures::{agent_snapshot, DEFAULT_AGENT_ID, TEST_ENDPOINT};
use switchboard_test_utils::{mock_registry, RecordingSink, ScriptedConfigSource, Step};

fn settings() -> RouterSettings {
    RouterSettings {
        default_agent_id: Some(DEFAULT_AGENT_ID.to_string()),
        agent_defaults: switchboard_core::AgentDefaults {
            endpoint: Some(TEST_ENDPOINT.to_string()),
            ..Default::default()
        },
        ..RouterSettings::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_share_one_fetch() {
    let source = Arc::new(
        ScriptedConfigSource::new([Step::Snapshot(agent_snapshot(2, false))])
            .with_delay(Duration::from_millis(30)),
    );
    let options = StoreOptions::new().with_refresh_interval(Duration::from_millis(100));
    let store = ConfigStore::with_snapshot(source.clone(), agent_snapshot(1, true), options);
    let (registry, connector) = mock_registry();
    let router = Arc::new(RequestRouter::new(
        store,
        registry,
        RecordingSink::new(),
        settings(),
    ));
    tokio::time::sleep(Duration::from_millis(110)).await;

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let caller = CallerContext::authenticated(format!("user-{}", i));
                router.handle_chat(&caller, ChatRequest::new("hi")).await
            })
        })
        .collect();

    for task in tasks {
        let outcome = task.await.expect("task completes").expect("chat succeeds");
        assert_eq!(outcome.variant, FALLBACK_VARIANT);
    }

    assert_eq!(source.fetch_count(), 1);
    assert_eq!(router.store().current().version(), 2);
    assert_eq!(connector.connections(), 1);
}
