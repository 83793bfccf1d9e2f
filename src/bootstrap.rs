//! Bringing a fresh regtest chain to a state tests can spend from.

use bitcoin::Address;
use bitcoin::Amount;
use bitcoin::OutPoint;
use bitcoin::Txid;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use crate::config_models::cli_args::Args;
use crate::models::coin::Coin;
use crate::models::coin::CoinQueue;
use crate::rpc::error::RpcError;
use crate::rpc::RpcClient;

/// Enough blocks for the first coinbase outputs to mature.
pub const DEFAULT_INITIAL_BLOCKS: u32 = 150;
pub const DEFAULT_COIN_COUNT: usize = 10;
pub const DEFAULT_FUNDING_AMOUNT: Amount = Amount::from_sat(10_000_000);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BootstrapError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("funding transaction {txid} has no output paying {address}")]
    FundingNotFound { txid: Txid, address: Address },

    #[error("coin {0} was harvested twice")]
    DuplicateCoin(OutPoint),
}

#[derive(Debug, Clone)]
pub struct ChainBootstrapper {
    test_address: Address,
    initial_blocks: u32,
    coin_count: usize,
    funding_amount: Amount,
}

impl ChainBootstrapper {
    pub fn new(test_address: Address) -> Self {
        Self {
            test_address,
            initial_blocks: DEFAULT_INITIAL_BLOCKS,
            coin_count: DEFAULT_COIN_COUNT,
            funding_amount: DEFAULT_FUNDING_AMOUNT,
        }
    }

    pub fn from_args(args: &Args, test_address: Address) -> Self {
        Self {
            test_address,
            initial_blocks: args.initial_blocks,
            coin_count: args.coin_count,
            funding_amount: args.funding_amount,
        }
    }

    pub fn with_initial_blocks(mut self, initial_blocks: u32) -> Self {
        self.initial_blocks = initial_blocks;
        self
    }

    pub fn with_coin_count(mut self, coin_count: usize) -> Self {
        self.coin_count = coin_count;
        self
    }

    pub fn with_funding_amount(mut self, funding_amount: Amount) -> Self {
        self.funding_amount = funding_amount;
        self
    }

    pub fn test_address(&self) -> &Address {
        &self.test_address
    }

    /// Mines the initial run of blocks, then harvests the configured number
    /// of coins into `coins`. A batch holding a known coin is rejected whole,
    /// leaving `coins` as it was.
    #[instrument(skip_all)]
    pub async fn setup_chain(
        &self,
        rpc: &dyn RpcClient,
        coins: &mut CoinQueue,
    ) -> Result<(), BootstrapError> {
        info!("Setting up test chain");
        rpc.generate(self.initial_blocks).await?;

        let harvested = self.get_coins(rpc, self.coin_count).await?;
        coins
            .enqueue_all(harvested)
            .map_err(BootstrapError::DuplicateCoin)?;
        info!("test chain ready with {} coins", coins.len());
        Ok(())
    }

    /// Funds `count` coins and mines one block confirming all of them.
    pub async fn get_coins(
        &self,
        rpc: &dyn RpcClient,
        count: usize,
    ) -> Result<Vec<Coin>, BootstrapError> {
        let mut coins = Vec::with_capacity(count);
        for _ in 0..count {
            coins.push(self.get_coin(rpc).await?);
        }

        rpc.generate(1).await?;
        Ok(coins)
    }

    /// Sends the funding amount to the test address and returns the output
    /// that received it. Unconfirmed.
    pub async fn get_coin(&self, rpc: &dyn RpcClient) -> Result<Coin, BootstrapError> {
        let txid = rpc
            .send_to_address(&self.test_address, self.funding_amount)
            .await?;
        let transaction = rpc.get_raw_transaction(&txid).await?;

        let mut paying = transaction
            .output
            .iter()
            .enumerate()
            .filter(|(_, output)| self.test_address.matches_script_pubkey(&output.script_pubkey))
            .map(|(vout, _)| vout);

        let Some(vout) = paying.next() else {
            return Err(BootstrapError::FundingNotFound {
                txid,
                address: self.test_address.clone(),
            });
        };
        let extra_matches = paying.count();
        if extra_matches > 0 {
            debug!("{txid} pays the test address {extra_matches} more times; using output {vout}");
        }

        u32::try_from(vout)
            .ok()
            .and_then(|vout| Coin::new(transaction, vout))
            .ok_or_else(|| BootstrapError::FundingNotFound {
                txid,
                address: self.test_address.clone(),
            })
    }
}
