use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoind_harness::config_models::cli_args::Args;
use bitcoind_harness::config_models::test_context::TestContext;
use bitcoind_harness::event_bus::EventBus;
use bitcoind_harness::models::events::ZmqSubscribedEvent;
use bitcoind_harness::models::node::InMemoryNodeRepository;
use bitcoind_harness::models::node::Node;
use bitcoind_harness::models::node::NodeRepository;
use bitcoind_harness::models::node::NodeRepositoryError;
use rand::distr::Alphanumeric;
use rand::distr::SampleString;

/// Randomly named run directory, so filesystem-bound tests can run in
/// parallel.
pub fn integration_test_run_dir() -> PathBuf {
    let mut rng = rand::rng();
    let user = std::env::var("USER").unwrap_or_else(|_| "default".to_string());
    std::env::temp_dir()
        .join(format!("bitcoind-harness-integration-tests-{}", user))
        .join(Path::new(&Alphanumeric.sample_string(&mut rng, 16)))
}

/// Configuration from the environment, pointed at a fresh run directory.
///
/// Node ports are shifted by `port_offset` so test binaries running at the
/// same time do not fight over them.
pub fn default_args(port_offset: u16) -> Args {
    let mut args = Args::from_env();
    args.test_run_dir = Some(integration_test_run_dir());
    args.rpc_port += port_offset;
    args.p2p_port += port_offset;
    args.zmq_port += port_offset;
    args
}

/// `None` unless a bitcoind binary is configured; tests needing a real node
/// return early then.
pub fn bitcoind_configured() -> Option<PathBuf> {
    Args::from_env().bitcoind_full_path
}

pub async fn remove_run_dir(context: &TestContext) {
    let _ = tokio::fs::remove_dir_all(&context.test_run_dir).await;
}

/// Stands in for the ZMQ bridge of the system under test: a node counts as
/// subscribed as soon as it is registered.
#[derive(Debug)]
pub struct SubscribingNodeRepository {
    inner: InMemoryNodeRepository,
    bus: EventBus,
}

impl SubscribingNodeRepository {
    pub fn new(bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryNodeRepository::new(),
            bus,
        })
    }
}

#[async_trait]
impl NodeRepository for SubscribingNodeRepository {
    async fn create_node(&self, node: Node) -> Result<Node, NodeRepositoryError> {
        let node = self.inner.create_node(node).await?;
        self.bus.publish(ZmqSubscribedEvent {
            topic: "hashblock".to_string(),
            endpoint: format!("tcp://{}:{}", node.host, node.port),
        });
        Ok(node)
    }

    async fn get_nodes(&self) -> Vec<Node> {
        self.inner.get_nodes().await
    }
}
