use std::sync::Arc;

use async_trait::async_trait;

use super::error::ProcessError;
use crate::config_models::cli_args::Args;
use crate::config_models::data_directory::DataDirectory;
use crate::rpc::RpcClient;

/// Everything needed to launch one node and to talk to it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLaunchParams {
    pub index: usize,
    pub host: String,
    pub zmq_ip: String,
    pub rpc_port: u16,
    pub p2p_port: u16,
    pub zmq_port: u16,
    pub rpc_user: String,
    pub rpc_password: String,
    pub data_dir: DataDirectory,
}

impl NodeLaunchParams {
    /// Node `index` uses the configured base ports offset by `index`.
    pub fn from_args(
        args: &Args,
        index: usize,
        data_dir: DataDirectory,
    ) -> Result<Self, ProcessError> {
        let port = |base: u16, name: &str| {
            u16::try_from(index)
                .ok()
                .and_then(|offset| base.checked_add(offset))
                .ok_or_else(|| {
                    ProcessError::Configuration(format!(
                        "{name} port {base} + node index {index} is out of range"
                    ))
                })
        };

        Ok(Self {
            index,
            host: args.host_ip.clone(),
            zmq_ip: args.zmq_ip.clone(),
            rpc_port: port(args.rpc_port, "RPC")?,
            p2p_port: port(args.p2p_port, "P2P")?,
            zmq_port: port(args.zmq_port, "ZMQ")?,
            rpc_user: args.rpc_user.clone(),
            rpc_password: args.rpc_password.clone(),
            data_dir,
        })
    }

    pub fn zmq_endpoint(&self) -> String {
        format!("tcp://{}:{}", self.zmq_ip, self.zmq_port)
    }

    /// `host:rpc_port`, for log lines.
    pub fn description(&self) -> String {
        format!("{}:{}", self.host, self.rpc_port)
    }
}

/// Starts node processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync + std::fmt::Debug {
    type Process: ManagedProcess;

    /// Checked before anything touches the filesystem.
    fn check_configuration(&self) -> Result<(), ProcessError> {
        Ok(())
    }

    /// Launches a node and returns once it is ready to serve RPC.
    async fn launch(&self, params: NodeLaunchParams) -> Result<Self::Process, ProcessError>;
}

/// A running node.
#[async_trait]
pub trait ManagedProcess: Send + Sync + std::fmt::Debug {
    fn params(&self) -> &NodeLaunchParams;

    fn is_alive(&mut self) -> bool;

    fn rpc_client(&self) -> Arc<dyn RpcClient>;

    /// Terminates the node and releases its resources.
    async fn shutdown(&mut self) -> Result<(), ProcessError>;
}
