use async_trait::async_trait;

use super::error::RpcResult;

/// Moves one JSON-RPC call to the node and back.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn call(&self, method: &str, params: serde_json::Value) -> RpcResult<serde_json::Value>;
}
