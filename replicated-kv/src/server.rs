//! HTTP surface of a node.
//!
//! Handlers are thin: they extract the request, call into [`Node`] and turn
//! the outcome into a response. `Reply::Redirect` becomes a
//! `307 Temporary Redirect` to the same path on the target node, which keeps
//! the method and body for writes.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::Uri,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::error::KvError;
use crate::event::Event;
use crate::message::{
    Ack, CatchUp, CreateValue, Heartbeat, KeyValue, MirrorAck, NodeSnapshot, UpdateValue,
    VoteRequest, VoteResponse,
};
use crate::node::{Node, Reply};

type SharedNode = Arc<Node>;

pub fn router(node: SharedNode) -> Router {
    Router::new()
        .route("/values", post(create_value))
        .route(
            "/values/:key",
            get(read_value).put(update_value).delete(delete_value),
        )
        .route(
            "/internal/values",
            post(mirror_event).put(mirror_event).delete(mirror_event),
        )
        .route("/internal/vote", post(vote))
        .route("/internal/heartbeat", post(heartbeat))
        .route("/internal/recovery/:sequence", get(catch_up))
        .route("/kill", post(kill))
        .route("/recovery", post(recover))
        .route("/state", get(state))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

/// Serves `node` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, node: SharedNode, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(node))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")
}

fn respond<T: Serialize>(node: &Node, uri: &Uri, reply: Reply<T>) -> Response {
    match reply {
        Reply::Done(body) => Json(body).into_response(),
        Reply::Redirect(target) => match node.address_of(target) {
            Some(base) => {
                let path = uri.path_and_query().map_or(uri.path(), |p| p.as_str());
                Redirect::temporary(&format!("{base}{path}")).into_response()
            }
            None => KvError::Locked.into_response(),
        },
    }
}

fn key_value(event: Event) -> KeyValue {
    KeyValue {
        key: event.key,
        value: event.value.unwrap_or_default(),
    }
}

async fn read_value(
    State(node): State<SharedNode>,
    Path(key): Path<String>,
    uri: Uri,
) -> Result<Response, KvError> {
    let reply = node.get(&key).await?;
    Ok(respond(&node, &uri, reply))
}

async fn create_value(
    State(node): State<SharedNode>,
    uri: Uri,
    Json(body): Json<CreateValue>,
) -> Result<Response, KvError> {
    let reply = node.create(body.key, body.value).await?;
    Ok(respond(&node, &uri, reply.map(key_value)))
}

async fn update_value(
    State(node): State<SharedNode>,
    Path(key): Path<String>,
    uri: Uri,
    Json(body): Json<UpdateValue>,
) -> Result<Response, KvError> {
    let reply = node.update(key, body.value).await?;
    Ok(respond(&node, &uri, reply.map(key_value)))
}

async fn delete_value(
    State(node): State<SharedNode>,
    Path(key): Path<String>,
    uri: Uri,
) -> Result<Response, KvError> {
    let reply = node.delete(key).await?;
    Ok(respond(&node, &uri, reply.map(|_| Ack::ok())))
}

async fn mirror_event(
    State(node): State<SharedNode>,
    Json(event): Json<Event>,
) -> Result<Json<MirrorAck>, KvError> {
    let applied = node.apply_replicated(event).await?;
    Ok(Json(MirrorAck {
        result: "ok".to_string(),
        applied,
    }))
}

async fn vote(
    State(node): State<SharedNode>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, KvError> {
    let result = node.receive_vote_request(request).await?;
    Ok(Json(VoteResponse { result }))
}

async fn heartbeat(
    State(node): State<SharedNode>,
    Json(heartbeat): Json<Heartbeat>,
) -> Result<Json<Ack>, KvError> {
    node.receive_heartbeat(heartbeat).await?;
    Ok(Json(Ack::ok()))
}

async fn catch_up(
    State(node): State<SharedNode>,
    Path(sequence): Path<u64>,
) -> Result<Json<CatchUp>, KvError> {
    Ok(Json(node.catch_up_from(sequence).await?))
}

async fn kill(State(node): State<SharedNode>) -> Json<Ack> {
    node.kill().await;
    Json(Ack::ok())
}

async fn recover(State(node): State<SharedNode>) -> Result<Json<Ack>, KvError> {
    node.recover().await?;
    Ok(Json(Ack::ok()))
}

async fn state(State(node): State<SharedNode>) -> Json<NodeSnapshot> {
    Json(node.snapshot().await)
}
