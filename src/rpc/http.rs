use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

use super::error::RpcError;
use super::error::RpcResult;
use super::transport::Transport;

#[derive(Debug, Serialize)]
struct JsonRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonError {
    code: i64,
    message: String,
}

/// JSON-RPC 1.0 over HTTP with basic authentication, as spoken by bitcoind.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    url: String,
    user: String,
    password: String,
    client: Client,
    last_id: Arc<AtomicU64>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
            client: Client::new(),
            last_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn for_node(host: &str, port: u16, user: &str, password: &str) -> Self {
        Self::new(format!("http://{host}:{port}/"), user, password)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: &str, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let request = JsonRequest {
            jsonrpc: "1.0",
            id: self.last_id.fetch_add(1, Ordering::SeqCst),
            method,
            params,
        };
        trace!("rpc -> {} {}", self.url, request.method);

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(RpcError::Unauthorized);
        }

        // bitcoind reports method errors with a 4xx/5xx status *and* a JSON
        // body; only a body-less failure is a transport problem.
        let value: serde_json::Value = response.json().await.map_err(|e| {
            if status.is_success() {
                RpcError::InvalidResponse(e.to_string())
            } else {
                RpcError::Transport(format!("HTTP {status}"))
            }
        })?;

        parse_envelope(value)
    }
}

/// Splits a JSON-RPC response into its result or its error.
pub(crate) fn parse_envelope(mut value: serde_json::Value) -> RpcResult<serde_json::Value> {
    match value.get_mut("error").map(serde_json::Value::take) {
        None | Some(serde_json::Value::Null) => {}
        Some(error) => {
            let error: JsonError = serde_json::from_value(error.clone())
                .map_err(|_| RpcError::InvalidResponse(error.to_string()))?;
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }
    }

    value
        .get_mut("result")
        .map(serde_json::Value::take)
        .ok_or(RpcError::MissingResult)
}
