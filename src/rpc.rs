//! The node's RPC surface, as far as the harness uses it.

pub mod client;
pub mod error;
pub mod http;
pub mod transport;

use async_trait::async_trait;
use bitcoin::consensus::deserialize;
use bitcoin::Address;
use bitcoin::Amount;
use bitcoin::Block;
use bitcoin::BlockHash;
use bitcoin::CompactTarget;
use bitcoin::Transaction;
use bitcoin::Txid;
use error::RpcResult;

/// Header fields reported by `getblockheader <hash> true`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeaderInfo {
    pub hash: BlockHash,
    pub height: u64,
    pub time: u32,
    pub bits: CompactTarget,
    pub previous_block_hash: Option<BlockHash>,
    pub confirmations: i64,
}

#[async_trait]
pub trait RpcClient: Send + Sync + std::fmt::Debug {
    /// Pays `amount` from the node's wallet to `address`; returns the txid.
    async fn send_to_address(&self, address: &Address, amount: Amount) -> RpcResult<Txid>;

    async fn get_raw_transaction_as_bytes(&self, txid: &Txid) -> RpcResult<Vec<u8>>;

    async fn get_best_block_hash(&self) -> RpcResult<BlockHash>;

    async fn get_block_header(&self, hash: &BlockHash) -> RpcResult<BlockHeaderInfo>;

    async fn get_block_as_bytes(&self, hash: &BlockHash) -> RpcResult<Vec<u8>>;

    /// Mines `blocks` blocks to the node's wallet.
    async fn generate(&self, blocks: u32) -> RpcResult<Vec<BlockHash>>;

    /// `None` when the node accepted the block, otherwise its reason.
    async fn submit_block(&self, block: &[u8]) -> RpcResult<Option<String>>;

    async fn get_block_count(&self) -> RpcResult<u64>;

    /// Asks the node to shut down.
    async fn stop(&self) -> RpcResult<()>;

    async fn get_raw_transaction(&self, txid: &Txid) -> RpcResult<Transaction> {
        let bytes = self.get_raw_transaction_as_bytes(txid).await?;
        Ok(deserialize(&bytes)?)
    }

    async fn get_block(&self, hash: &BlockHash) -> RpcResult<Block> {
        let bytes = self.get_block_as_bytes(hash).await?;
        Ok(deserialize(&bytes)?)
    }
}
