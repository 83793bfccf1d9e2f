use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use super::mock_node::MockNode;
use crate::process::error::ProcessError;
use crate::process::launcher::ManagedProcess;
use crate::process::launcher::NodeLaunchParams;
use crate::process::launcher::ProcessLauncher;
use crate::rpc::error::RpcError;
use crate::rpc::RpcClient;

#[derive(Debug, Default)]
struct LauncherState {
    misconfigured: bool,
    rpc: Option<Arc<dyn RpcClient>>,
    launches: AtomicUsize,
    failing_shutdowns: Mutex<HashSet<usize>>,
    crashed: Mutex<HashSet<usize>>,
    shutdown_attempts: Mutex<Vec<usize>>,
}

/// Launches pretend processes. Each one answers RPC with a fresh
/// [`MockNode`], or with the shared client given to [`Self::serving`].
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    state: Arc<LauncherState>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the configuration check, like a missing bitcoind binary.
    pub fn misconfigured() -> Self {
        Self {
            state: Arc::new(LauncherState {
                misconfigured: true,
                ..Default::default()
            }),
        }
    }

    pub fn serving(rpc: Arc<dyn RpcClient>) -> Self {
        Self {
            state: Arc::new(LauncherState {
                rpc: Some(rpc),
                ..Default::default()
            }),
        }
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    /// Shutting down node `index` will fail.
    pub fn fail_shutdown_of(&self, index: usize) {
        self.state.failing_shutdowns.lock().unwrap().insert(index);
    }

    /// Node `index` exits on its own, as if bitcoind had crashed.
    pub fn crash(&self, index: usize) {
        self.state.crashed.lock().unwrap().insert(index);
    }

    /// Node indices, in the order their shutdown was attempted.
    pub fn shutdown_attempts(&self) -> Vec<usize> {
        self.state.shutdown_attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    type Process = FakeProcess;

    fn check_configuration(&self) -> Result<(), ProcessError> {
        if self.state.misconfigured {
            return Err(ProcessError::Configuration(
                "bitcoind binary is not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn launch(&self, params: NodeLaunchParams) -> Result<FakeProcess, ProcessError> {
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        let rpc = self
            .state
            .rpc
            .clone()
            .unwrap_or_else(|| Arc::new(MockNode::new()));

        Ok(FakeProcess {
            params,
            alive: true,
            rpc,
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct FakeProcess {
    params: NodeLaunchParams,
    alive: bool,
    rpc: Arc<dyn RpcClient>,
    state: Arc<LauncherState>,
}

#[async_trait]
impl ManagedProcess for FakeProcess {
    fn params(&self) -> &NodeLaunchParams {
        &self.params
    }

    fn is_alive(&mut self) -> bool {
        self.alive && !self.state.crashed.lock().unwrap().contains(&self.params.index)
    }

    fn rpc_client(&self) -> Arc<dyn RpcClient> {
        Arc::clone(&self.rpc)
    }

    async fn shutdown(&mut self) -> Result<(), ProcessError> {
        let index = self.params.index;
        self.state.shutdown_attempts.lock().unwrap().push(index);
        if !self.is_alive() {
            return Err(ProcessError::AlreadyExited {
                node: self.params.description(),
                status: "exit status: 1".to_string(),
            });
        }
        self.alive = false;

        if self.state.failing_shutdowns.lock().unwrap().contains(&index) {
            return Err(ProcessError::Rpc(RpcError::Transport(
                "connection refused".to_string(),
            )));
        }
        Ok(())
    }
}
