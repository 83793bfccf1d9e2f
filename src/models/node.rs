use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumIs,
)]
pub enum NodeStatus {
    Connected,
    Disconnected,
}

/// A node as registered with the system under test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub index: usize,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub remarks: String,
    pub status: NodeStatus,
}

impl Node {
    /// Nodes are identified by `host:port`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum NodeRepositoryError {
    #[error("node {0} already exists")]
    AlreadyExists(String),
}

/// Node registration, as provided by the system under test.
#[async_trait]
pub trait NodeRepository: Send + Sync + std::fmt::Debug {
    async fn create_node(&self, node: Node) -> Result<Node, NodeRepositoryError>;

    async fn get_nodes(&self) -> Vec<Node>;
}

#[derive(Debug, Default)]
pub struct InMemoryNodeRepository {
    nodes: Mutex<BTreeMap<String, Node>>,
}

impl InMemoryNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn create_node(&self, node: Node) -> Result<Node, NodeRepositoryError> {
        let mut nodes = self.nodes.lock().await;
        let id = node.id();
        if nodes.contains_key(&id) {
            return Err(NodeRepositoryError::AlreadyExists(id));
        }
        nodes.insert(id, node.clone());
        Ok(node)
    }

    async fn get_nodes(&self) -> Vec<Node> {
        self.nodes.lock().await.values().cloned().collect()
    }
}
