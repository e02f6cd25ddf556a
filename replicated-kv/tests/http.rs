//! Exercises the HTTP surface of a single node without opening sockets.
//!
//! Background loops are not started, so the node stays a leaderless follower
//! unless a test tells it otherwise through the internal endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use replicated_kv::{
    config::{NodeConfig, Timing},
    node::Node,
    server,
    topology::ClusterTopology,
};

fn test_node(id: u64) -> Result<Arc<Node>> {
    let addresses: BTreeMap<_, _> = (1..=5)
        .map(|peer| (peer, format!("http://127.0.0.1:{}", 9000 + peer)))
        .collect();
    let timing = Timing {
        heartbeat_interval: Duration::from_millis(50),
        election_jitter: Duration::from_millis(10),
        rpc_timeout: Duration::from_millis(100),
    };
    let config = NodeConfig::new(id, ClusterTopology::new(addresses)?, timing)?;
    Ok(Arc::new(Node::new(config)?))
}

async fn call(
    node: &Arc<Node>,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Option<String>, Value)> {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = server::router(Arc::clone(node))
        .oneshot(request.body(body)?)
        .await?;

    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, location, json))
}

#[tokio::test]
async fn write_without_leader_is_locked() -> Result<()> {
    let node = test_node(2)?;
    let (status, _, body) = call(
        &node,
        "POST",
        "/values",
        Some(json!({"key": "a", "value": 1})),
    )
    .await?;
    assert_eq!(status, StatusCode::LOCKED);
    assert!(body["error"].is_string());
    Ok(())
}

#[tokio::test]
async fn follower_redirects_writes_to_leader_address() -> Result<()> {
    let node = test_node(2)?;
    let (status, _, _) = call(
        &node,
        "POST",
        "/internal/heartbeat",
        Some(json!({"leader": 4, "term": 1})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, location, _) = call(
        &node,
        "PUT",
        "/values/a",
        Some(json!({"value": 2})),
    )
    .await?;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location.as_deref(), Some("http://127.0.0.1:9004/values/a"));

    let (_, _, state) = call(&node, "GET", "/state", None).await?;
    assert_eq!(state["leader"], json!(4));
    assert_eq!(state["master"], json!("http://127.0.0.1"));
    assert_eq!(state["leader_address"], json!("http://127.0.0.1:9004"));
    assert_eq!(state["term"], json!(1));
    Ok(())
}

#[tokio::test]
async fn stale_heartbeat_is_forbidden() -> Result<()> {
    let node = test_node(3)?;
    call(
        &node,
        "POST",
        "/internal/heartbeat",
        Some(json!({"leader": 5, "term": 4})),
    )
    .await?;

    let (status, _, _) = call(
        &node,
        "POST",
        "/internal/heartbeat",
        Some(json!({"leader": 1, "term": 3})),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, _, state) = call(&node, "GET", "/state", None).await?;
    assert_eq!(state["leader"], json!(5));
    Ok(())
}

#[tokio::test]
async fn mirrored_events_become_readable() -> Result<()> {
    let node = test_node(3)?;
    let (status, _, ack) = call(
        &node,
        "POST",
        "/internal/values",
        Some(json!({"sequence": 1, "kind": "CREATE", "key": "color", "value": "red"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["applied"], json!(true));

    call(
        &node,
        "PUT",
        "/internal/values",
        Some(json!({"sequence": 2, "kind": "UPDATE", "key": "color", "value": "blue"})),
    )
    .await?;

    // A redelivery of an older event is acknowledged but not applied.
    let (status, _, ack) = call(
        &node,
        "POST",
        "/internal/values",
        Some(json!({"sequence": 1, "kind": "CREATE", "key": "color", "value": "red"})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["applied"], json!(false));

    let (status, _, body) = call(&node, "GET", "/values/color", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"key": "color", "value": "blue"}));

    call(
        &node,
        "DELETE",
        "/internal/values",
        Some(json!({"sequence": 3, "kind": "DELETE", "key": "color"})),
    )
    .await?;
    let (status, _, _) = call(&node, "GET", "/values/color", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, _, state) = call(&node, "GET", "/state", None).await?;
    assert_eq!(state["events"].as_array().map(Vec::len), Some(3));
    assert_eq!(state["storage"], json!({}));
    Ok(())
}

#[tokio::test]
async fn one_vote_per_term() -> Result<()> {
    let node = test_node(5)?;
    let (_, _, first) = call(
        &node,
        "POST",
        "/internal/vote",
        Some(json!({"term": 2, "candidate": 1})),
    )
    .await?;
    assert_eq!(first, json!({"result": "approve"}));

    let (_, _, rival) = call(
        &node,
        "POST",
        "/internal/vote",
        Some(json!({"term": 2, "candidate": 3})),
    )
    .await?;
    assert_eq!(rival, json!({"result": "disapprove"}));

    let (_, _, repeat) = call(
        &node,
        "POST",
        "/internal/vote",
        Some(json!({"term": 2, "candidate": 1})),
    )
    .await?;
    assert_eq!(repeat, json!({"result": "disapprove"}));

    let (_, _, later) = call(
        &node,
        "POST",
        "/internal/vote",
        Some(json!({"term": 3, "candidate": 3})),
    )
    .await?;
    assert_eq!(later, json!({"result": "approve"}));
    Ok(())
}

#[tokio::test]
async fn leaderless_node_serves_catch_up() -> Result<()> {
    let node = test_node(1)?;
    for (sequence, key) in [(1, "a"), (2, "b"), (3, "c")] {
        call(
            &node,
            "POST",
            "/internal/values",
            Some(json!({"sequence": sequence, "kind": "CREATE", "key": key, "value": sequence})),
        )
        .await?;
    }

    let (status, _, body) = call(&node, "GET", "/internal/recovery/2", None).await?;
    assert_eq!(status, StatusCode::OK);
    let sequences: Vec<_> = body["events"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|event| event["sequence"].clone())
        .collect();
    assert_eq!(sequences, vec![json!(2), json!(3)]);
    assert_eq!(body["leader"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn killed_node_only_answers_state() -> Result<()> {
    let node = test_node(4)?;
    let (status, _, _) = call(&node, "POST", "/kill", None).await?;
    assert_eq!(status, StatusCode::OK);

    for (method, uri, body) in [
        ("GET", "/values/a", None),
        ("POST", "/values", Some(json!({"key": "a", "value": 1}))),
        ("DELETE", "/values/a", None),
        ("POST", "/internal/vote", Some(json!({"term": 1, "candidate": 2}))),
        ("POST", "/internal/heartbeat", Some(json!({"leader": 2, "term": 1}))),
        ("GET", "/internal/recovery/1", None),
    ] {
        let (status, _, _) = call(&node, method, uri, body).await?;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{method} {uri}");
    }

    let (status, _, state) = call(&node, "GET", "/state", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["health"], json!("DEAD"));
    assert_eq!(state["role"], json!("FOLLOWER"));
    assert_eq!(state["node_id"], json!(4));
    Ok(())
}
