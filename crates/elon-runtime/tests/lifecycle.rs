//! Lifecycle properties exercised through the public API.
//!
//! Most tests use the scripted engine so no sockets are involved; the
//! direct engine tests at the end run over loopback.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use elon_runtime::engine::scripted::{Script, ScriptedFactory};
use elon_runtime::{DirectFactory, LifecycleController, LifecycleError, Registry};

const VALID: &str = r#"{"log":{"level":"info"},"inbounds":[],"outbounds":[{"type":"direct"}]}"#;

fn controller(factory: ScriptedFactory) -> Arc<LifecycleController> {
    Arc::new(LifecycleController::new(
        Arc::new(Registry::new()),
        Arc::new(factory),
    ))
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_start_stop_scenario() {
    let controller = controller(ScriptedFactory::healthy());

    assert_eq!(controller.start_json(VALID).await.unwrap(), 1);
    assert_eq!(controller.start_json(VALID).await.unwrap(), 2);

    controller.stop(1).await.unwrap();
    assert!(controller.instance(1).await.is_none());
    assert!(controller.instance(2).await.is_some());
}

#[tokio::test]
async fn invalid_json_consumes_no_handle() {
    let controller = controller(ScriptedFactory::healthy());

    let err = controller.start_json("not valid json").await.unwrap_err();
    assert!(matches!(err, LifecycleError::Decode(_)));

    assert_eq!(controller.start_json(VALID).await.unwrap(), 1);
}

#[tokio::test]
async fn stop_on_empty_registry_is_not_found() {
    let controller = controller(ScriptedFactory::healthy());
    let err = controller.stop(999).await.unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(999)));
}

// ── Properties ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_get_distinct_handles() {
    let controller = controller(ScriptedFactory::new(Script {
        start_delay: Some(Duration::from_millis(5)),
        ..Script::default()
    }));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.start_json(VALID).await.unwrap() })
        })
        .collect();

    let mut handles = HashSet::new();
    for task in tasks {
        assert!(handles.insert(task.await.unwrap()), "duplicate handle issued");
    }

    assert_eq!(handles.len(), 32);
    assert_eq!(handles, (1..=32).collect::<HashSet<u64>>());
    assert_eq!(controller.registry().len().await, 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stops_succeed_exactly_once() {
    let factory = ScriptedFactory::healthy();
    let recorder = factory.recorder();
    let controller = controller(factory);
    let handle = controller.start_json(VALID).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.stop(handle).await })
        })
        .collect();

    let mut successes = 0;
    let mut not_found = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => successes += 1,
            Err(LifecycleError::NotFound(h)) => {
                assert_eq!(h, handle);
                not_found += 1;
            }
            Err(other) => panic!("unexpected stop error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(not_found, 7);
    assert_eq!(recorder.closed(), 1);
}

#[tokio::test]
async fn stopped_handles_stay_gone() {
    let controller = controller(ScriptedFactory::healthy());
    let first = controller.start_json(VALID).await.unwrap();
    controller.stop(first).await.unwrap();

    assert!(controller.instance(first).await.is_none());
    assert!(controller.stop(first).await.unwrap_err().is_not_found());

    let second = controller.start_json(VALID).await.unwrap();
    assert!(second > first);
}

#[tokio::test]
async fn failed_start_allocates_nothing() {
    let factory = ScriptedFactory::new(Script {
        fail_start: true,
        ..Script::default()
    });
    let recorder = factory.recorder();
    let controller = controller(factory);

    for _ in 0..3 {
        let err = controller.start_json(VALID).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Start(_)));
    }

    assert!(recorder.tokens().iter().all(|token| token.is_cancelled()));
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
    assert_eq!(recorder.cancelled(), 3);
    assert_eq!(recorder.started(), 0);
    assert_eq!(recorder.closed(), 3);
    assert!(controller.registry().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn start_abandoned_by_timeout_cancels_and_consumes_no_handle() {
    let registry = Arc::new(Registry::new());
    let slow = ScriptedFactory::new(Script {
        start_delay: Some(Duration::from_secs(5)),
        ..Script::default()
    });
    let recorder = slow.recorder();
    let slow = LifecycleController::new(Arc::clone(&registry), Arc::new(slow));

    let timed_out = tokio::time::timeout(Duration::from_millis(50), slow.start_json(VALID)).await;
    assert!(timed_out.is_err());
    assert!(recorder.tokens()[0].is_cancelled());
    assert_eq!(recorder.started(), 0);

    let healthy = LifecycleController::new(registry, Arc::new(ScriptedFactory::healthy()));
    assert_eq!(healthy.start_json(VALID).await.unwrap(), 1);
}

#[tokio::test]
async fn raw_config_round_trips_byte_for_byte() {
    let controller = controller(ScriptedFactory::healthy());
    let text = "{\n  \"inbounds\" : [ ],\n  \"unknown_field\": \"kept\"\n}\n";

    let handle = controller.start_json(text).await.unwrap();
    let info = controller.instance(handle).await.unwrap();
    assert_eq!(info.raw_config.as_bytes(), text.as_bytes());
    assert_eq!(info.handle, handle);
}

#[tokio::test]
async fn cancelling_one_instance_leaves_others_alone() {
    let factory = ScriptedFactory::healthy();
    let recorder = factory.recorder();
    let controller = controller(factory);

    let a = controller.start_json(VALID).await.unwrap();
    let _b = controller.start_json(VALID).await.unwrap();
    controller.stop(a).await.unwrap();

    let tokens = recorder.tokens();
    assert!(tokens[0].is_cancelled());
    assert!(!tokens[1].is_cancelled());
}

// ── Direct engine end to end ─────────────────────────────────────────────────

#[tokio::test]
async fn direct_engine_rejects_unknown_inbound_type() {
    let controller = LifecycleController::new(Arc::new(Registry::new()), Arc::new(DirectFactory));
    let err = controller
        .start_json(r#"{"inbounds":[{"type":"socks","listen_port":0}]}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Construction(_)));
}

#[tokio::test]
async fn direct_engine_bind_conflict_is_a_start_error() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let controller = LifecycleController::new(Arc::new(Registry::new()), Arc::new(DirectFactory));
    let config = serde_json::json!({
        "inbounds": [{
            "type": "direct",
            "listen": "127.0.0.1",
            "listen_port": port,
            "override_address": "127.0.0.1",
            "override_port": 9
        }]
    })
    .to_string();

    let err = controller.start_json(config).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Start(_)));
    assert!(controller.registry().is_empty().await);
}

#[tokio::test]
async fn direct_engine_start_and_stop() {
    let controller = LifecycleController::new(Arc::new(Registry::new()), Arc::new(DirectFactory));
    let config = r#"{
        "inbounds": [{
            "type": "direct",
            "tag": "fwd",
            "listen": "127.0.0.1",
            "listen_port": 0,
            "override_address": "127.0.0.1",
            "override_port": 9
        }]
    }"#;

    let handle = controller.start_json(config).await.unwrap();
    assert_eq!(handle, 1);
    assert_eq!(controller.version_info().engine, "direct");

    tokio::time::timeout(Duration::from_secs(5), controller.stop(handle))
        .await
        .unwrap()
        .unwrap();
    assert!(controller.registry().is_empty().await);
}
