//! Per-test lifecycle around one or more regtest nodes.
//!
//! ```text
//! initialize ─► start node 0 ─► register it ─► wait for ZMQ subscription ─► setup chain
//!      … test body: mine blocks, take coins, wait for events …
//! cleanup ─► quiesce consumers ─► stop all nodes
//! ```

use std::future::Future;
use std::sync::Arc;

use bitcoin::Block;
use bitcoin::BlockHash;
use bitcoin::Transaction;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bootstrap::BootstrapError;
use crate::bootstrap::ChainBootstrapper;
use crate::config_models::cli_args::Args;
use crate::config_models::test_context::TestContext;
use crate::error::HarnessError;
use crate::event_bus::synchronizer::EventSynchronizer;
use crate::event_bus::EventBus;
use crate::mine::BlockMiner;
use crate::mine::MinedBlock;
use crate::mine::RejectionPolicy;
use crate::models::blockchain::regtest_address;
use crate::models::coin::Coin;
use crate::models::coin::CoinQueue;
use crate::models::events::NewBlockAvailableInDb;
use crate::models::events::ZmqSubscribedEvent;
use crate::models::node::Node;
use crate::models::node::NodeRepository;
use crate::models::node::NodeStatus;
use crate::process::bitcoind::BitcoindLauncher;
use crate::process::launcher::ProcessLauncher;
use crate::process::orchestrator::NodeHandle;
use crate::process::orchestrator::ProcessOrchestrator;
use crate::rpc::error::RpcError;
use crate::rpc::RpcClient;

#[derive(Debug)]
pub struct BitcoindFixture<L: ProcessLauncher = BitcoindLauncher> {
    context: TestContext,
    orchestrator: ProcessOrchestrator<L>,
    synchronizer: EventSynchronizer,
    nodes: Arc<dyn NodeRepository>,
    bootstrapper: ChainBootstrapper,
    miner: BlockMiner,
    coins: CoinQueue,
    node0: Option<NodeHandle>,
    rpc_client0: Option<Arc<dyn RpcClient>>,
}

impl<L: ProcessLauncher> BitcoindFixture<L> {
    /// Prepares the fixture for one test.
    ///
    /// Unless the context asks to skip it, node 0 is started and
    /// registered, the ZMQ subscription to it is awaited and the chain is
    /// set up with coins. A failure on the way stops whatever was started.
    #[instrument(skip_all, fields(test = %context.test_name))]
    pub async fn initialize(
        args: Args,
        mut context: TestContext,
        launcher: L,
        event_bus: EventBus,
        nodes: Arc<dyn NodeRepository>,
    ) -> Result<Self, HarnessError> {
        launcher.check_configuration()?;

        let test_address = regtest_address(crate::TEST_ADDRESS)?;
        if let Some(test_run_dir) = &args.test_run_dir {
            context.test_run_dir = test_run_dir.clone();
        }

        let mut fixture = Self {
            synchronizer: EventSynchronizer::new(event_bus, args.event_timeout),
            miner: BlockMiner::new(test_address.script_pubkey()),
            bootstrapper: ChainBootstrapper::from_args(&args, test_address),
            orchestrator: ProcessOrchestrator::new(args, launcher),
            context,
            nodes,
            coins: CoinQueue::new(),
            node0: None,
            rpc_client0: None,
        };

        if fixture.context.skip_node_start {
            info!("skipping start of node 0");
            return Ok(fixture);
        }

        if let Err(e) = fixture.start_node0().await {
            warn!("fixture initialization failed: {e}");
            fixture.orchestrator.stop_all().await;
            return Err(e);
        }
        Ok(fixture)
    }

    async fn start_node0(&mut self) -> Result<(), HarnessError> {
        let mut zmq_subscribed = self.synchronizer.subscribe::<ZmqSubscribedEvent>();
        let node0 = self.create_and_start_node(0).await?;
        self.synchronizer
            .wait_for(
                &mut zmq_subscribed,
                "ZMQ subscription to node 0",
                |_| true,
                None,
            )
            .await?;
        self.synchronizer.unsubscribe(zmq_subscribed);

        let rpc_client0 = self.orchestrator.rpc_client(&node0)?;
        self.node0 = Some(node0);
        self.rpc_client0 = Some(Arc::clone(&rpc_client0));

        self.bootstrapper
            .setup_chain(rpc_client0.as_ref(), &mut self.coins)
            .await?;
        Ok(())
    }

    /// Starts node `index` and registers it with the system under test.
    pub async fn create_and_start_node(&mut self, index: usize) -> Result<NodeHandle, HarnessError> {
        let handle = self.orchestrator.start(index, &self.context).await?;
        let params = handle.params();

        let node = Node {
            index,
            host: params.host.clone(),
            port: params.rpc_port,
            username: params.rpc_user.clone(),
            password: params.rpc_password.clone(),
            remarks: format!("This is a mock node #{index}"),
            status: NodeStatus::Connected,
        };
        self.nodes.create_node(node).await?;

        Ok(handle)
    }

    pub async fn stop_node(&mut self, handle: &NodeHandle) -> Result<(), HarnessError> {
        if self.node0.as_ref() == Some(handle) {
            self.node0 = None;
            self.rpc_client0 = None;
        }
        Ok(self.orchestrator.stop(handle).await?)
    }

    /// Mines one block on node 0 and returns once the system under test
    /// has stored it.
    pub async fn generate_block_and_wait_for_it_to_be_inserted_in_db(
        &self,
    ) -> Result<BlockHash, HarnessError> {
        let rpc = self.rpc_client0()?;

        // old events, like the ZMQ subscription becoming active, must not
        // be mistaken for the reaction to this block
        self.synchronizer.drain_idle().await;
        let mut subscription = self.synchronizer.subscribe::<NewBlockAvailableInDb>();

        info!("Generating a block and waiting for it to be inserted in DB");
        let block_to_wait_for = rpc
            .generate(1)
            .await?
            .first()
            .copied()
            .ok_or_else(|| RpcError::InvalidResponse("generate returned no block".into()))?;

        self.synchronizer
            .wait_for(
                &mut subscription,
                &format!("block {block_to_wait_for} to be inserted in DB"),
                |event| event.block_hash == block_to_wait_for,
                None,
            )
            .await?;
        self.synchronizer.unsubscribe(subscription);

        Ok(block_to_wait_for)
    }

    pub async fn mine_next_block(
        &self,
        transactions: Vec<Transaction>,
        policy: RejectionPolicy,
        parent_hash: Option<BlockHash>,
    ) -> Result<MinedBlock, HarnessError> {
        let rpc = self.rpc_client0()?;
        Ok(self
            .miner
            .mine_next_block(rpc.as_ref(), transactions, policy, parent_hash)
            .await?)
    }

    pub async fn mine_next_block_on(
        &self,
        transactions: Vec<Transaction>,
        policy: RejectionPolicy,
        parent: &Block,
        parent_height: u64,
    ) -> Result<MinedBlock, HarnessError> {
        let rpc = self.rpc_client0()?;
        Ok(self
            .miner
            .mine_next_block_on(rpc.as_ref(), transactions, policy, parent, parent_height)
            .await?)
    }

    /// Next coin, first harvested first.
    pub fn take_coin(&mut self) -> Result<Coin, HarnessError> {
        self.coins.dequeue().ok_or(HarnessError::OutOfCoins)
    }

    pub fn available_coins(&self) -> &CoinQueue {
        &self.coins
    }

    /// Harvests `count` more coins into the queue. If any of them was
    /// harvested before, none are added.
    pub async fn add_coins(&mut self, count: usize) -> Result<(), HarnessError> {
        let rpc = self.rpc_client0()?;
        let harvested = self.bootstrapper.get_coins(rpc.as_ref(), count).await?;
        self.coins
            .enqueue_all(harvested)
            .map_err(BootstrapError::DuplicateCoin)?;
        Ok(())
    }

    pub fn rpc_client0(&self) -> Result<Arc<dyn RpcClient>, HarnessError> {
        self.rpc_client0
            .clone()
            .ok_or(HarnessError::NodeNotStarted(0))
    }

    pub fn node0(&self) -> Option<&NodeHandle> {
        self.node0.as_ref()
    }

    pub fn context(&self) -> &TestContext {
        &self.context
    }

    pub fn event_bus(&self) -> &EventBus {
        self.synchronizer.bus()
    }

    pub fn synchronizer(&self) -> &EventSynchronizer {
        &self.synchronizer
    }

    pub fn orchestrator(&mut self) -> &mut ProcessOrchestrator<L> {
        &mut self.orchestrator
    }

    pub fn nodes(&self) -> &Arc<dyn NodeRepository> {
        &self.nodes
    }

    /// Tears the fixture down. `quiesce` must stop everything that still
    /// talks to the nodes (background workers, event listeners); the nodes
    /// are stopped only after it completes. Returns how many nodes stopped
    /// cleanly.
    pub async fn cleanup<F>(mut self, quiesce: F) -> usize
    where
        F: Future<Output = ()>,
    {
        quiesce.await;
        self.rpc_client0 = None;
        self.orchestrator.stop_all().await
    }
}
