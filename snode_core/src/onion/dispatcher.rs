//! Sending onion requests and turning transport trouble into path repair.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::directory::SnodeDirectory;
use crate::error::Error;
use crate::onion::codec::{codec_for, encode_v4_payload, OnionResponse};
use crate::onion::encryption::{build_onion, encode_onion_frame};
use crate::onion::path_manager::PathManager;
use crate::snode::{Destination, Snode, Version};
use crate::store::NetworkTopologyStore;
use crate::time::set_clock_offset_ms;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A request to an external server reached over an onion path.
#[derive(Clone, Debug)]
pub struct ServerRequest {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Hex encoded x25519 key of the server.
    pub x25519_public_key: String,
    /// Endpoint on the server, e.g. `/room/main/messages/recent`.
    pub endpoint: String,
    pub method: String,
    /// Extra request headers as a JSON object.
    pub headers: Value,
    pub body: Option<Vec<u8>>,
}

/// Sends payloads through onion paths. Success and failure both feed back
/// into the [`PathManager`] so the path set heals itself over time.
pub struct OnionRequester {
    store: Arc<NetworkTopologyStore>,
    directory: Arc<SnodeDirectory>,
    paths: Arc<PathManager>,
    http: reqwest::Client,
}

impl OnionRequester {
    pub fn new(
        store: Arc<NetworkTopologyStore>,
        directory: Arc<SnodeDirectory>,
        paths: Arc<PathManager>,
        http: reqwest::Client,
    ) -> Self {
        OnionRequester { store, directory, paths, http }
    }

    /// Send a storage RPC to `snode` over an onion path. Destination-level
    /// errors get classified against the snode before they are returned.
    pub async fn send_to_snode(
        &self,
        snode: &Snode,
        payload: &Value,
        public_key: Option<&str>,
    ) -> Result<OnionResponse, Error> {
        let payload = serde_json::to_vec(payload)
            .map_err(|error| Error::InvalidResponse(error.to_string()))?;
        let destination = Destination::Snode(snode.clone());
        let result = self
            .send_onion_request(destination, payload, Version::V3, Some(snode))
            .await;
        match result {
            Err(Error::HttpRequestFailedAtDestination { code, info, destination }) => {
                let handled = self
                    .directory
                    .handle_snode_error(code, Some(&info), snode, public_key)
                    .await;
                Err(handled.unwrap_or(Error::HttpRequestFailedAtDestination {
                    code,
                    info,
                    destination,
                }))
            }
            other => other,
        }
    }

    /// Send an HTTP request to an external server over an onion path.
    pub async fn send_to_server(&self, request: &ServerRequest) -> Result<OnionResponse, Error> {
        let destination = Destination::Server {
            host: request.host.clone(),
            target: Version::V4.path().to_owned(),
            x25519_public_key: request.x25519_public_key.clone(),
            scheme: request.scheme.clone(),
            port: request.port,
        };
        let metadata = json!({
            "method": request.method,
            "endpoint": request.endpoint,
            "headers": request.headers,
        });
        let payload = encode_v4_payload(&metadata, request.body.as_deref())?;
        self.send_onion_request(destination, payload, Version::V4, None)
            .await
    }

    async fn send_onion_request(
        &self,
        destination: Destination,
        payload: Vec<u8>,
        version: Version,
        excluding: Option<&Snode>,
    ) -> Result<OnionResponse, Error> {
        let path = self.paths.path_excluding(excluding).await?;
        let built = build_onion(&payload, &path, &destination, version)?;
        let body = encode_onion_frame(
            &built.guard_layer.ciphertext,
            &json!({ "ephemeral_key": hex::encode(built.guard_layer.ephemeral_public_key) }),
        )?;
        let url = format!("{}/onion_req/v2", path.guard().base_url());

        let response = match self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!("Couldn't reach guard snode {}: {}.", path.guard(), error);
                self.paths.register_failure(&path, None).await;
                return Err(Error::Transport { status: 0, info: None });
            }
        };

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| Error::InvalidResponse(error.to_string()))?;

        if status != 200 {
            // Guard-level failure. The body may name the hop that couldn't
            // be reached.
            let info: Option<Value> = serde_json::from_slice(&bytes).ok();
            let message = info
                .as_ref()
                .and_then(|info| info.get("result").and_then(Value::as_str))
                .map(str::to_owned)
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());
            debug!("Onion request failed at a hop with status {}: {}.", status, message);
            self.paths.register_failure(&path, Some(&message)).await;
            return Err(Error::Transport { status, info });
        }

        match codec_for(version).decode(&bytes, &built.destination_symmetric_key, &destination) {
            Ok(decoded) => {
                self.paths.register_success(&path).await;
                if let Some(fork_info) = decoded.fork_info {
                    self.store.update_fork_info(fork_info).await;
                }
                if let Some(offset) = decoded.clock_offset_ms {
                    set_clock_offset_ms(offset);
                }
                Ok(decoded.response)
            }
            Err(error) => {
                // Errors produced by the destination made it through the
                // path fine, so the path isn't to blame.
                match &error {
                    Error::HttpRequestFailedAtDestination { .. }
                    | Error::ClockOutOfSync
                    | Error::BlindingRequired { .. } => {
                        self.paths.register_success(&path).await;
                    }
                    _ => self.paths.register_failure(&path, None).await,
                }
                Err(error)
            }
        }
    }
}
