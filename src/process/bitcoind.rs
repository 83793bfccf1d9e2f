use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;
use tokio::process::Command;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::error::ProcessError;
use super::launcher::ManagedProcess;
use super::launcher::NodeLaunchParams;
use super::launcher::ProcessLauncher;
use crate::config_models::cli_args::Args;
use crate::rpc::client::BitcoindRpcClient;
use crate::rpc::http::HttpTransport;
use crate::rpc::RpcClient;

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(15);

/// Launches real `bitcoind` processes.
#[derive(Debug, Clone)]
pub struct BitcoindLauncher {
    binary: Option<PathBuf>,
    start_timeout: Duration,
}

impl BitcoindLauncher {
    pub fn new(binary: Option<PathBuf>, start_timeout: Duration) -> Self {
        Self {
            binary,
            start_timeout,
        }
    }

    pub fn from_args(args: &Args) -> Self {
        Self::new(args.bitcoind_full_path.clone(), args.start_timeout)
    }

    fn command_args(params: &NodeLaunchParams) -> Vec<String> {
        let zmq = params.zmq_endpoint();
        vec![
            "-regtest".to_string(),
            "-server=1".to_string(),
            format!("-datadir={}", params.data_dir),
            format!("-port={}", params.p2p_port),
            format!("-rpcport={}", params.rpc_port),
            format!("-rpcbind={}", params.host),
            format!("-rpcuser={}", params.rpc_user),
            format!("-rpcpassword={}", params.rpc_password),
            "-rpcallowip=0.0.0.0/0".to_string(),
            "-txindex=1".to_string(),
            format!("-zmqpubhashblock={zmq}"),
            format!("-zmqpubinvalidtx={zmq}"),
            format!("-zmqpubdiscardedfrommempool={zmq}"),
            "-printtoconsole=0".to_string(),
        ]
    }

    /// Polls `getblockcount` until the node answers, it dies, or the
    /// deadline passes.
    async fn wait_until_ready(
        &self,
        child: &mut Child,
        rpc: &dyn RpcClient,
        node: &str,
    ) -> Result<(), ProcessError> {
        let deadline = Instant::now() + self.start_timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(|source| ProcessError::Io {
                context: format!("polling node {node}"),
                source,
            })? {
                return Err(ProcessError::ExitedEarly {
                    node: node.to_string(),
                    status: status.to_string(),
                });
            }

            match rpc.get_block_count().await {
                Ok(height) => {
                    debug!("node {node} is ready at height {height}");
                    return Ok(());
                }
                Err(e) => debug!("node {node} not ready yet: {e}"),
            }

            if Instant::now() >= deadline {
                return Err(ProcessError::StartTimeout {
                    node: node.to_string(),
                    timeout: self.start_timeout,
                });
            }
            sleep(READINESS_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ProcessLauncher for BitcoindLauncher {
    type Process = BitcoindProcess;

    fn check_configuration(&self) -> Result<(), ProcessError> {
        match &self.binary {
            Some(_) => Ok(()),
            None => Err(ProcessError::Configuration(
                "path to bitcoind is not set; set BITCOIND_FULL_PATH".to_string(),
            )),
        }
    }

    #[instrument(skip_all, fields(node = %params.description()))]
    async fn launch(&self, params: NodeLaunchParams) -> Result<BitcoindProcess, ProcessError> {
        self.check_configuration()?;
        let Some(binary) = self.binary.clone() else {
            return Err(ProcessError::Configuration("path to bitcoind is not set".into()));
        };

        let mut child = Command::new(&binary)
            .args(Self::command_args(&params))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // no orphaned nodes if the test process goes away first
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                binary: binary.clone(),
                source,
            })?;
        info!(
            "launched bitcoind (pid {:?}) in {}",
            child.id(),
            params.data_dir
        );

        let rpc: Arc<dyn RpcClient> = Arc::new(BitcoindRpcClient::new(HttpTransport::for_node(
            &params.host,
            params.rpc_port,
            &params.rpc_user,
            &params.rpc_password,
        )));

        if let Err(e) = self
            .wait_until_ready(&mut child, rpc.as_ref(), &params.description())
            .await
        {
            if let Err(kill_error) = child.kill().await {
                debug!("could not kill failed node: {kill_error}");
            }
            return Err(e);
        }

        Ok(BitcoindProcess { params, child, rpc })
    }
}

#[derive(Debug)]
pub struct BitcoindProcess {
    params: NodeLaunchParams,
    child: Child,
    rpc: Arc<dyn RpcClient>,
}

#[async_trait]
impl ManagedProcess for BitcoindProcess {
    fn params(&self) -> &NodeLaunchParams {
        &self.params
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn rpc_client(&self) -> Arc<dyn RpcClient> {
        Arc::clone(&self.rpc)
    }

    /// Asks the node to stop over RPC and kills it if it has not exited
    /// within the grace period. A node that exited on its own before this
    /// call is reported as [`ProcessError::AlreadyExited`].
    async fn shutdown(&mut self) -> Result<(), ProcessError> {
        let node = self.params.description();
        if let Ok(Some(status)) = self.child.try_wait() {
            return Err(ProcessError::AlreadyExited {
                node,
                status: status.to_string(),
            });
        }

        if let Err(e) = self.rpc.stop().await {
            warn!("RPC stop of node {node} failed: {e}; killing it");
        }

        match timeout(SHUTDOWN_GRACE_PERIOD, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("node {node} exited with {status}");
                Ok(())
            }
            Ok(Err(source)) => Err(ProcessError::Io {
                context: format!("waiting for node {node} to exit"),
                source,
            }),
            Err(_) => {
                warn!("node {node} did not exit within {SHUTDOWN_GRACE_PERIOD:?}; killing it");
                self.child.kill().await.map_err(|source| ProcessError::Io {
                    context: format!("killing node {node}"),
                    source,
                })
            }
        }
    }
}
