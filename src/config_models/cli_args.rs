use std::path::PathBuf;
use std::time::Duration;

use bitcoin::Amount;
use bitcoin::Denomination;
use clap::Parser;

/// Harness configuration.
///
/// Every option can be given on the command line of the test binary's
/// wrapper or, more commonly, through the listed environment variable.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// Full path to the `bitcoind` executable. Starting a node fails when
    /// this is not set.
    #[clap(long, env = "BITCOIND_FULL_PATH")]
    pub bitcoind_full_path: Option<PathBuf>,

    /// Host the nodes' RPC and P2P interfaces bind to.
    #[clap(long, env = "HOST_IP", default_value = "localhost")]
    pub host_ip: String,

    /// IP the nodes publish ZMQ notifications on.
    #[clap(long, env = "ZMQ_IP", default_value = "127.0.0.1")]
    pub zmq_ip: String,

    #[clap(long, env = "BITCOIND_RPC_USER", default_value = "user")]
    pub rpc_user: String,

    #[clap(long, env = "BITCOIND_RPC_PASSWORD", default_value = "pass")]
    pub rpc_password: String,

    /// RPC port of node 0. Node `i` listens on `rpc_port + i`.
    #[clap(long, env = "BITCOIND_RPC_PORT", default_value = "18332")]
    pub rpc_port: u16,

    /// P2P port of node 0. Node `i` listens on `p2p_port + i`.
    #[clap(long, env = "BITCOIND_P2P_PORT", default_value = "18444")]
    pub p2p_port: u16,

    /// ZMQ port of node 0. Node `i` publishes on `zmq_port + i`.
    #[clap(long, env = "BITCOIND_ZMQ_PORT", default_value = "28332")]
    pub zmq_port: u16,

    /// Root under which every test gets its own data directories.
    /// Defaults to `bitcoind-harness` in the system temp dir.
    #[clap(long, env = "BITCOIND_TEST_RUN_DIR")]
    pub test_run_dir: Option<PathBuf>,

    /// Seconds to wait for a freshly launched node to answer RPC.
    #[clap(long, env = "BITCOIND_START_TIMEOUT", default_value = "30", value_parser = duration_from_seconds_str)]
    pub start_timeout: Duration,

    /// Seconds to wait for an awaited event before giving up.
    #[clap(long, env = "BITCOIND_EVENT_TIMEOUT", default_value = "30", value_parser = duration_from_seconds_str)]
    pub event_timeout: Duration,

    /// Longest data directory path (including the node's own internal
    /// layout) accepted before launching. Only enforced on Windows unless
    /// set explicitly.
    #[clap(long, env = "BITCOIND_MAX_PATH_LENGTH")]
    pub max_path_length: Option<usize>,

    /// Empty blocks mined before harvesting coins, so that coinbase
    /// outputs mature.
    #[clap(long, env = "BITCOIND_INITIAL_BLOCKS", default_value = "150")]
    pub initial_blocks: u32,

    /// Number of coins harvested for the test wallet.
    #[clap(long, env = "BITCOIND_COIN_COUNT", default_value = "10")]
    pub coin_count: usize,

    /// Value of each harvested coin, in coins.
    #[clap(long, env = "BITCOIND_FUNDING_AMOUNT", default_value = "0.1", value_parser = amount_from_btc_str)]
    pub funding_amount: Amount,
}

impl Args {
    /// Configuration from the environment only, ignoring the process's
    /// command line (which belongs to the test runner).
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn test_run_dir(&self) -> PathBuf {
        self.test_run_dir
            .clone()
            .unwrap_or_else(default_test_run_dir)
    }

    /// Path-length ceiling to enforce, if any.
    pub fn path_length_ceiling(&self) -> Option<usize> {
        self.max_path_length
            .or_else(crate::config_models::data_directory::platform_path_length_ceiling)
    }
}

impl Default for Args {
    fn default() -> Self {
        let empty: Vec<String> = vec![];
        Self::parse_from(empty)
    }
}

pub fn default_test_run_dir() -> PathBuf {
    std::env::temp_dir().join("bitcoind-harness")
}

fn duration_from_seconds_str(s: &str) -> Result<Duration, std::num::ParseIntError> {
    Ok(Duration::from_secs(s.parse()?))
}

fn amount_from_btc_str(s: &str) -> Result<Amount, String> {
    let amount = Amount::from_str_in(s, Denomination::Bitcoin)
        .map_err(|e| format!("`{s}` isn't a valid amount: {e}"))?;
    if amount == Amount::ZERO {
        return Err(format!("Amount must be positive, got {s}"));
    }
    Ok(amount)
}
