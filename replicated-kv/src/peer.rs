//! Outbound calls from one node to the others.
//!
//! Every call is bounded by the client-wide timeout, so a hung peer only
//! costs one timeout and never stalls calls to the rest of the cluster.
//! Any non-success status is reported as an error; protocol code treats
//! errors as "no answer".

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Method, redirect::Policy};
use serde::{Serialize, de::DeserializeOwned};

use crate::event::{Event, EventKind};
use crate::message::{CatchUp, Heartbeat, MirrorAck, VoteRequest, VoteResponse, VoteResult};
use crate::topology::{ClusterTopology, NodeId};

#[derive(Debug, Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    topology: ClusterTopology,
}

impl PeerClient {
    pub fn new(topology: ClusterTopology, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::none())
            .build()
            .context("failed to build peer http client")?;
        Ok(Self { http, topology })
    }

    pub async fn heartbeat(&self, peer: NodeId, heartbeat: &Heartbeat) -> Result<()> {
        self.send(peer, Method::POST, "/internal/heartbeat", Some(heartbeat))
            .await
            .map(|_| ())
    }

    pub async fn request_vote(&self, peer: NodeId, request: &VoteRequest) -> Result<VoteResult> {
        let response = self
            .send(peer, Method::POST, "/internal/vote", Some(request))
            .await?;
        Ok(decode::<VoteResponse>(response, peer).await?.result)
    }

    /// Pushes one event to the mirror endpoint matching its kind.
    pub async fn replicate(&self, peer: NodeId, event: &Event) -> Result<MirrorAck> {
        let method = match event.kind {
            EventKind::Create => Method::POST,
            EventKind::Update => Method::PUT,
            EventKind::Delete => Method::DELETE,
        };
        let response = self
            .send(peer, method, "/internal/values", Some(event))
            .await?;
        decode(response, peer).await
    }

    /// Asks `peer` for every event starting at sequence `from`.
    pub async fn catch_up(&self, peer: NodeId, from: u64) -> Result<CatchUp> {
        let path = format!("/internal/recovery/{from}");
        let response = self.send::<()>(peer, Method::GET, &path, None).await?;
        decode(response, peer).await
    }

    async fn send<B: Serialize>(
        &self,
        peer: NodeId,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let base = self
            .topology
            .address(peer)
            .ok_or_else(|| anyhow!("unknown peer {peer}"))?;
        let mut request = self.http.request(method.clone(), format!("{base}{path}"));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("{method} {path} to node {peer} failed"))?;
        response
            .error_for_status()
            .with_context(|| format!("{method} {path} rejected by node {peer}"))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, peer: NodeId) -> Result<T> {
    response
        .json()
        .await
        .with_context(|| format!("malformed response from node {peer}"))
}
