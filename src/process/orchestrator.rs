use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::instrument;

use super::bitcoind::BitcoindLauncher;
use super::error::ProcessError;
use super::launcher::ManagedProcess;
use super::launcher::NodeLaunchParams;
use super::launcher::ProcessLauncher;
use crate::config_models::cli_args::Args;
use crate::config_models::data_directory::DataDirectory;
use crate::config_models::test_context::TestContext;
use crate::rpc::RpcClient;

static NEXT_ORCHESTRATOR_ID: AtomicU64 = AtomicU64::new(0);

/// Refers to a node started by a [`ProcessOrchestrator`]. Only that
/// orchestrator accepts it back, and only until the node is stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    orchestrator_id: u64,
    key: u64,
    params: Arc<NodeLaunchParams>,
}

impl NodeHandle {
    pub fn params(&self) -> &NodeLaunchParams {
        &self.params
    }

    pub fn index(&self) -> usize {
        self.params.index
    }

    pub fn description(&self) -> String {
        self.params.description()
    }
}

#[derive(Debug)]
struct Tracked<P> {
    handle: NodeHandle,
    process: P,
}

/// Owns the node processes of one fixture.
///
/// Not meant to be shared: fixtures running in parallel each get their own.
#[derive(Debug)]
pub struct ProcessOrchestrator<L: ProcessLauncher = BitcoindLauncher> {
    id: u64,
    args: Args,
    launcher: L,
    tracked: BTreeMap<u64, Tracked<L::Process>>,
    next_key: u64,
}

impl ProcessOrchestrator<BitcoindLauncher> {
    pub fn from_args(args: Args) -> Self {
        let launcher = BitcoindLauncher::from_args(&args);
        Self::new(args, launcher)
    }
}

impl<L: ProcessLauncher> ProcessOrchestrator<L> {
    pub fn new(args: Args, launcher: L) -> Self {
        Self {
            id: NEXT_ORCHESTRATOR_ID.fetch_add(1, Ordering::Relaxed),
            args,
            launcher,
            tracked: BTreeMap::new(),
            next_key: 0,
        }
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn handles(&self) -> Vec<NodeHandle> {
        self.tracked.values().map(|t| t.handle.clone()).collect()
    }

    /// Starts node `index` for the test identified by `context`.
    ///
    /// Nothing is created on disk and nothing is launched unless the
    /// configuration and the data directory path pass their checks.
    #[instrument(skip(self, context), fields(test = %context.test_name))]
    pub async fn start(
        &mut self,
        index: usize,
        context: &TestContext,
    ) -> Result<NodeHandle, ProcessError> {
        self.launcher.check_configuration()?;

        let data_dir = DataDirectory::for_node(context, index);
        if let Some(ceiling) = self.args.path_length_ceiling() {
            if data_dir.exceeds(ceiling) {
                return Err(ProcessError::PathTooLong {
                    path: data_dir.root_dir_path(),
                    length: data_dir.full_path_length(),
                    ceiling,
                });
            }
        }
        let params = NodeLaunchParams::from_args(&self.args, index, data_dir)?;

        if self
            .tracked
            .values()
            .any(|t| t.handle.params.data_dir == params.data_dir)
        {
            return Err(ProcessError::DataDirectoryInUse(
                params.data_dir.root_dir_path(),
            ));
        }

        params
            .data_dir
            .recreate()
            .await
            .map_err(|source| ProcessError::Io {
                context: format!("preparing data directory {}", params.data_dir),
                source,
            })?;

        let process = self.launcher.launch(params.clone()).await?;

        let key = self.next_key;
        self.next_key += 1;
        let handle = NodeHandle {
            orchestrator_id: self.id,
            key,
            params: Arc::new(params),
        };
        self.tracked.insert(
            key,
            Tracked {
                handle: handle.clone(),
                process,
            },
        );
        info!("started node #{index} at {}", handle.description());

        Ok(handle)
    }

    fn lookup(&self, handle: &NodeHandle) -> Result<&Tracked<L::Process>, ProcessError> {
        self.tracked
            .get(&handle.key)
            .filter(|_| handle.orchestrator_id == self.id)
            .ok_or_else(|| ProcessError::UntrackedResource(handle.description()))
    }

    /// Stops a node started by this orchestrator. The node is forgotten
    /// even if shutting it down fails, so a second stop is always an error.
    pub async fn stop(&mut self, handle: &NodeHandle) -> Result<(), ProcessError> {
        self.lookup(handle)?;
        let Some(mut tracked) = self.tracked.remove(&handle.key) else {
            return Err(ProcessError::UntrackedResource(handle.description()));
        };

        debug!("stopping node {}", handle.description());
        tracked.process.shutdown().await
    }

    /// Stops every tracked node, carrying on past failures. Returns how
    /// many stopped cleanly.
    ///
    /// Only call this once nothing uses the nodes any more.
    pub async fn stop_all(&mut self) -> usize {
        let tracked = std::mem::take(&mut self.tracked);
        let total = tracked.len();
        let mut stopped = 0;

        for (_, mut t) in tracked {
            let description = t.handle.description();
            match t.process.shutdown().await {
                Ok(()) => stopped += 1,
                Err(e) => info!(
                    "Error while stopping node {description}. This can occur if the node has been \
                     explicitly stopped or if it crashed. Will proceed anyway. {e}"
                ),
            }
        }

        info!("Successfully stopped {stopped} out of {total} node processes");
        stopped
    }

    pub fn is_alive(&mut self, handle: &NodeHandle) -> Result<bool, ProcessError> {
        self.lookup(handle)?;
        Ok(self
            .tracked
            .get_mut(&handle.key)
            .is_some_and(|t| t.process.is_alive()))
    }

    pub fn rpc_client(&self, handle: &NodeHandle) -> Result<Arc<dyn RpcClient>, ProcessError> {
        Ok(self.lookup(handle)?.process.rpc_client())
    }
}
