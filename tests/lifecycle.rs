//! Lifecycle scenarios: focus, subscriber draining, persistence across
//! service restarts, and command idempotence.

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use activisor::{
    ActivityDefinition, ActivityService, BusId, Command, ConnectivityProvider, ErrorCode,
    ManagerConfig, ServiceHandle,
};

fn definition(name: &str, extra: Value) -> ActivityDefinition {
    let mut base = json!({
        "name": name,
        "creator": {"type": "named", "id": "com.example.tests"}
    });
    if let (Some(base_map), Some(extra_map)) = (base.as_object_mut(), extra.as_object()) {
        for (key, value) in extra_map {
            base_map.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(base).expect("definition")
}

fn spawn_service(
    config: ManagerConfig,
) -> (
    ServiceHandle,
    CancellationToken,
    tokio::task::JoinHandle<anyhow::Result<()>>,
) {
    let (service, handle) = ActivityService::new(
        config,
        vec![Box::new(ConnectivityProvider::new())],
        Vec::new(),
    );
    let token = CancellationToken::new();
    let join = tokio::spawn(service.run(token.clone()));
    (handle, token, join)
}

fn queue_members(listing: &Value, queue: &str) -> Vec<u64> {
    listing["queues"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|entry| entry["name"] == queue)
        .flat_map(|entry| entry["activities"].as_array().cloned().unwrap_or_default())
        .filter_map(|activity| activity["activityId"].as_u64())
        .collect()
}

#[tokio::test]
async fn s6_focus_is_exclusive_and_add_focus_is_additive() {
    let (handle, token, join) = spawn_service(ManagerConfig::default());

    let a = handle.create(definition("a", json!({}))).await.expect("a");
    let b = handle.create(definition("b", json!({}))).await.expect("b");
    let c = handle.create(definition("c", json!({}))).await.expect("c");

    handle.focus(a).await.expect("focus a");
    handle.focus(b).await.expect("focus b");

    let a_detail = handle.details(a).await.expect("details");
    let b_detail = handle.details(b).await.expect("details");
    assert_eq!(a_detail["focused"], json!(false));
    assert_eq!(b_detail["focused"], json!(true));

    handle.add_focus(b, c).await.expect("add focus");
    let c_detail = handle.details(c).await.expect("details");
    assert_eq!(c_detail["focused"], json!(true));

    // Additive focus from an unfocused source is rejected.
    let outcome = handle
        .outcome(Command::AddFocus {
            source: a,
            target: b,
        })
        .await;
    assert!(!outcome.ok);
    assert_eq!(outcome.error_code, Some(ErrorCode::InvalidArg));

    token.cancel();
    join.await.expect("join").expect("run");
}

#[tokio::test]
async fn persistent_definitions_survive_a_service_restart() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("activities.json");

    let mut config = ManagerConfig::default();
    config.persist_path = Some(path.clone());

    let (handle, token, join) = spawn_service(config.clone());
    let saved = handle
        .create(definition(
            "backup",
            json!({
                "requirements": {"internet": true},
                "trigger": {
                    "method": "luna://com.example/powerd/charging",
                    "where": {"prop": "charging", "op": "=", "val": true}
                },
                "schedule": {"interval": "1d"},
                "flags": {"persistent": true, "continuous": true}
            }),
        ))
        .await
        .expect("create");
    // Non-persistent activities do not survive.
    handle
        .create(definition("ephemeral", json!({})))
        .await
        .expect("create");

    token.cancel();
    join.await.expect("join").expect("run");

    // A new service over the same path restores the definition into
    // `initialized` under its prior id, trigger re-armed.
    let (handle, token, join) = spawn_service(config);

    let listing = handle.list().await.expect("list");
    let initialized = queue_members(&listing, "initialized");
    assert_eq!(initialized, vec![saved]);

    let detail = handle.details(initialized[0]).await.expect("details");
    assert_eq!(detail["name"], json!("backup"));
    assert_eq!(detail["state"], json!("initialized"));
    assert_eq!(detail["trigger"]["fired"], json!(false));
    assert_eq!(detail["requirements"][0]["name"], json!("internet"));

    token.cancel();
    join.await.expect("join").expect("run");
}

#[tokio::test]
async fn cancel_is_idempotent_over_the_wire() {
    let (handle, token, join) = spawn_service(ManagerConfig::default());

    let id = handle.create(definition("doomed", json!({}))).await.expect("create");
    handle.start(id).await.expect("start");

    let first = handle.outcome(Command::Cancel { id }).await;
    let second = handle.outcome(Command::Cancel { id }).await;
    assert!(first.ok);
    assert!(second.ok);

    let detail = handle.details(id).await.expect("details");
    assert_eq!(detail["state"], json!("ended"));

    token.cancel();
    join.await.expect("join").expect("run");
}

#[tokio::test]
async fn subscriber_draining_finishes_the_end() {
    let (handle, token, join) = spawn_service(ManagerConfig::default());

    let id = handle.create(definition("watched", json!({}))).await.expect("create");
    handle.start(id).await.expect("start");

    let watcher = BusId::named("com.example.watcher");
    handle.adopt(id, watcher.clone()).await.expect("adopt");

    handle.stop(id).await.expect("stop");
    let detail = handle.details(id).await.expect("details");
    assert_eq!(detail["state"], json!("ending"));

    handle.unsubscribe(id, watcher).await.expect("unsubscribe");
    let detail = handle.details(id).await.expect("details");
    assert_eq!(detail["state"], json!("ended"));

    token.cancel();
    join.await.expect("join").expect("run");
}

#[tokio::test]
async fn command_errors_carry_the_expected_codes() {
    let (handle, token, join) = spawn_service(ManagerConfig::default());

    // Not found.
    let outcome = handle.outcome(Command::Start { id: 4096 }).await;
    assert_eq!(outcome.error_code, Some(ErrorCode::NotFound));

    // Already registered.
    handle.create(definition("twin", json!({}))).await.expect("create");
    let outcome = handle
        .outcome(Command::Create {
            definition: definition("twin", json!({})),
        })
        .await;
    assert_eq!(outcome.error_code, Some(ErrorCode::AlreadyRegistered));

    // Invalid argument.
    let outcome = handle
        .outcome(Command::Create {
            definition: definition("", json!({})),
        })
        .await;
    assert_eq!(outcome.error_code, Some(ErrorCode::InvalidArg));

    token.cancel();
    join.await.expect("join").expect("run");
}
