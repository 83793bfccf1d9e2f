//! Building, solving and submitting the next block.
//!
//! Regtest difficulty is low enough that a bounded nonce search succeeds
//! in practice; the bound only guards against a misconfigured target.

use bitcoin::block::Header;
use bitcoin::consensus::serialize;
use bitcoin::Block;
use bitcoin::BlockHash;
use bitcoin::CompactTarget;
use bitcoin::ScriptBuf;
use bitcoin::Transaction;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use crate::macros::fn_name;
use crate::models::blockchain::check_proof_of_work;
use crate::models::blockchain::is_valid_compact_target;
use crate::models::blockchain::next_block_with_coinbase;
use crate::models::blockchain::update_merkle_root;
use crate::rpc::error::RpcError;
use crate::rpc::RpcClient;

pub const DEFAULT_MAX_NONCE_ATTEMPTS: u32 = 10_000;

/// What to do when the node refuses a mined block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::EnumIs)]
pub enum RejectionPolicy {
    /// Fail with [`MineError::BlockRejected`].
    #[default]
    Fail,

    /// Hand the node's reason back in [`MinedBlock::rejection`].
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum MineError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("bad luck - no nonce below {attempts} meets target {:08x}", .bits.to_consensus())]
    ProofOfWorkExhausted { attempts: u32, bits: CompactTarget },

    #[error("difficulty bits {:08x} do not encode a valid target", .bits.to_consensus())]
    InvalidTarget { bits: CompactTarget },

    #[error("node rejected block {hash}: {reason}")]
    BlockRejected { hash: BlockHash, reason: String },

    #[error("nonce search aborted: {0}")]
    SearchAborted(String),
}

/// A block under construction on top of a known parent.
///
/// The merkle root is kept consistent lazily: appending transactions marks
/// it stale and [`BlockDraft::solve`] recomputes it before searching.
#[derive(Debug, Clone)]
pub struct BlockDraft {
    block: Block,
    parent_height: u64,
    merkle_root_stale: bool,
}

impl BlockDraft {
    /// Coinbase-only block extending `parent`, with the parent's difficulty
    /// bits and a timestamp one second after the parent's.
    pub fn extending(
        parent: &Block,
        parent_height: u64,
        coinbase_recipient: ScriptBuf,
        extra_nonce: u32,
    ) -> Self {
        Self {
            block: next_block_with_coinbase(parent, parent_height, coinbase_recipient, extra_nonce),
            parent_height,
            merkle_root_stale: false,
        }
    }

    pub fn header(&self) -> &Header {
        &self.block.header
    }

    pub fn parent_hash(&self) -> BlockHash {
        self.block.header.prev_blockhash
    }

    pub fn height(&self) -> u64 {
        self.parent_height + 1
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.block.txdata
    }

    pub fn is_merkle_root_stale(&self) -> bool {
        self.merkle_root_stale
    }

    /// Appends after the coinbase, in order.
    pub fn append_transactions(&mut self, transactions: impl IntoIterator<Item = Transaction>) {
        let before = self.block.txdata.len();
        self.block.txdata.extend(transactions);
        self.merkle_root_stale |= self.block.txdata.len() != before;
    }

    /// Tries nonces `0..max_attempts` and returns the block with the first
    /// one that meets the target.
    pub fn solve(mut self, max_attempts: u32) -> Result<Block, MineError> {
        if self.merkle_root_stale {
            update_merkle_root(&mut self.block);
            self.merkle_root_stale = false;
        }

        let bits = self.block.header.bits;
        if !is_valid_compact_target(bits) {
            return Err(MineError::InvalidTarget { bits });
        }

        for nonce in 0..max_attempts {
            self.block.header.nonce = nonce;
            if check_proof_of_work(&self.block.header) {
                return Ok(self.block);
            }
        }

        Err(MineError::ProofOfWorkExhausted {
            attempts: max_attempts,
            bits,
        })
    }
}

/// A solved block together with the node's verdict on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedBlock {
    pub block: Block,

    /// `None` when the node accepted the block.
    pub rejection: Option<String>,
}

impl MinedBlock {
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct BlockMiner {
    coinbase_recipient: ScriptBuf,
    max_attempts: u32,
}

impl BlockMiner {
    pub fn new(coinbase_recipient: ScriptBuf) -> Self {
        Self {
            coinbase_recipient,
            max_attempts: DEFAULT_MAX_NONCE_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Mines a block containing `transactions` on top of `parent_hash`, or
    /// on top of the node's best block when no parent is given, and submits
    /// it.
    #[instrument(skip_all)]
    pub async fn mine_next_block(
        &self,
        rpc: &dyn RpcClient,
        transactions: Vec<Transaction>,
        policy: RejectionPolicy,
        parent_hash: Option<BlockHash>,
    ) -> Result<MinedBlock, MineError> {
        let parent_hash = match parent_hash {
            Some(hash) => hash,
            None => rpc.get_best_block_hash().await?,
        };

        let parent = rpc.get_block(&parent_hash).await?;
        let parent_height = rpc.get_block_header(&parent_hash).await?.height;

        self.mine_next_block_on(rpc, transactions, policy, &parent, parent_height)
            .await
    }

    /// Like [`Self::mine_next_block`], for a parent the caller already has.
    pub async fn mine_next_block_on(
        &self,
        rpc: &dyn RpcClient,
        transactions: Vec<Transaction>,
        policy: RejectionPolicy,
        parent: &Block,
        parent_height: u64,
    ) -> Result<MinedBlock, MineError> {
        debug!(
            "{}: {} transaction(s) on top of {} at height {parent_height}",
            fn_name!(),
            transactions.len(),
            parent.block_hash()
        );

        let mut draft = BlockDraft::extending(
            parent,
            parent_height,
            self.coinbase_recipient.clone(),
            rand::random(),
        );
        draft.append_transactions(transactions);

        let max_attempts = self.max_attempts;
        let block = tokio::task::spawn_blocking(move || draft.solve(max_attempts))
            .await
            .map_err(|e| MineError::SearchAborted(e.to_string()))??;

        let hash = block.block_hash();
        let rejection = rpc.submit_block(&serialize(&block)).await?;
        if let Some(reason) = &rejection {
            if policy.is_fail() {
                return Err(MineError::BlockRejected {
                    hash,
                    reason: reason.clone(),
                });
            }
            info!("node rejected block {hash}: {reason}");
        } else {
            info!("mined block {hash} at height {}", parent_height + 1);
        }

        Ok(MinedBlock { block, rejection })
    }
}
