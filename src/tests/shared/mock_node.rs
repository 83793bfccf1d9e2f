use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::consensus::deserialize;
use bitcoin::consensus::serialize;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::Address;
use bitcoin::Amount;
use bitcoin::Block;
use bitcoin::BlockHash;
use bitcoin::OutPoint;
use bitcoin::PubkeyHash;
use bitcoin::ScriptBuf;
use bitcoin::Sequence;
use bitcoin::Transaction;
use bitcoin::TxIn;
use bitcoin::TxOut;
use bitcoin::Txid;
use bitcoin::Witness;

use crate::event_bus::EventBus;
use crate::mine::BlockDraft;
use crate::mine::DEFAULT_MAX_NONCE_ATTEMPTS;
use crate::models::blockchain::blockchain_tests::regtest_genesis_block;
use crate::models::blockchain::check_proof_of_work;
use crate::models::events::NewBlockAvailableInDb;
use crate::rpc::error::RpcError;
use crate::rpc::error::RpcResult;
use crate::rpc::BlockHeaderInfo;
use crate::rpc::RpcClient;

const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
const RPC_DESERIALIZATION_ERROR: i64 = -22;

#[derive(Debug, Clone)]
struct StoredBlock {
    block: Block,
    height: u64,
}

#[derive(Debug)]
struct MockChain {
    blocks: HashMap<BlockHash, StoredBlock>,
    tip: BlockHash,
    tip_height: u64,
    mempool: Vec<Transaction>,
    transactions: HashMap<Txid, Transaction>,
    wallet_script: ScriptBuf,
    counter: u32,
    last_payment: Option<Txid>,
    misdirect_payments: bool,
    duplicate_payments: bool,
    replay_payments: bool,
    forced_rejection: Option<String>,
    announce_blocks: bool,
}

/// In-memory regtest node answering the RPC calls the harness makes.
///
/// Blocks are really solved and validated for parent, merkle root and
/// proof of work; transactions are not validated at all. With an event bus
/// attached, every block it connects is announced as stored in the
/// database, standing in for the persistence pipeline of the system under
/// test.
#[derive(Debug)]
pub struct MockNode {
    chain: Mutex<MockChain>,
    event_bus: Option<EventBus>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNode {
    pub fn new() -> Self {
        let genesis = regtest_genesis_block();
        let genesis_hash = genesis.block_hash();

        let mut blocks = HashMap::new();
        blocks.insert(
            genesis_hash,
            StoredBlock {
                block: genesis,
                height: 0,
            },
        );

        Self {
            chain: Mutex::new(MockChain {
                blocks,
                tip: genesis_hash,
                tip_height: 0,
                mempool: vec![],
                transactions: HashMap::new(),
                wallet_script: ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([0x11; 20])),
                counter: 0,
                last_payment: None,
                misdirect_payments: false,
                duplicate_payments: false,
                replay_payments: false,
                forced_rejection: None,
                announce_blocks: true,
            }),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn height(&self) -> u64 {
        self.chain.lock().unwrap().tip_height
    }

    pub fn tip(&self) -> BlockHash {
        self.chain.lock().unwrap().tip
    }

    pub fn mempool_len(&self) -> usize {
        self.chain.lock().unwrap().mempool.len()
    }

    /// Wallet payments go to some other script instead of the requested
    /// address.
    pub fn misdirect_payments(&self, misdirect: bool) {
        self.chain.lock().unwrap().misdirect_payments = misdirect;
    }

    /// Wallet payments carry a second, identical output to the requested
    /// address.
    pub fn duplicate_payments(&self, duplicate: bool) {
        self.chain.lock().unwrap().duplicate_payments = duplicate;
    }

    /// Wallet payments after the first answer with the first payment's
    /// txid again, like a wallet resubmitting an old transaction.
    pub fn replay_payments(&self, replay: bool) {
        self.chain.lock().unwrap().replay_payments = replay;
    }

    /// Every submitted block is refused with `reason` while set.
    pub fn reject_blocks_with(&self, reason: Option<&str>) {
        self.chain.lock().unwrap().forced_rejection = reason.map(str::to_owned);
    }

    /// Whether connected blocks are announced on the event bus.
    pub fn announce_blocks(&self, announce: bool) {
        self.chain.lock().unwrap().announce_blocks = announce;
    }

    fn announce(&self, stored: Vec<NewBlockAvailableInDb>) {
        if let Some(bus) = &self.event_bus {
            for event in stored {
                bus.publish(event);
            }
        }
    }

    fn block_not_found() -> RpcError {
        RpcError::Node {
            code: RPC_INVALID_ADDRESS_OR_KEY,
            message: "Block not found".to_string(),
        }
    }
}

impl MockChain {
    fn stored(&self, hash: &BlockHash) -> RpcResult<&StoredBlock> {
        self.blocks.get(hash).ok_or_else(MockNode::block_not_found)
    }

    fn next_counter(&mut self) -> u32 {
        self.counter += 1;
        self.counter
    }

    fn mine_on_tip(&mut self) -> RpcResult<Block> {
        let extra_nonce = self.next_counter();
        let parent = self.stored(&self.tip)?.clone();

        let mut draft = BlockDraft::extending(
            &parent.block,
            parent.height,
            self.wallet_script.clone(),
            extra_nonce,
        );
        draft.append_transactions(self.mempool.clone());
        draft
            .solve(DEFAULT_MAX_NONCE_ATTEMPTS)
            .map_err(|e| RpcError::Transport(e.to_string()))
    }

    /// Returns the announcement for the block, if announcing is enabled.
    fn connect(&mut self, block: Block, height: u64) -> Option<NewBlockAvailableInDb> {
        let hash = block.block_hash();
        for tx in &block.txdata {
            let txid = tx.compute_txid();
            self.mempool.retain(|pending| pending.compute_txid() != txid);
            self.transactions.insert(txid, tx.clone());
        }
        self.blocks.insert(hash, StoredBlock { block, height });

        if height > self.tip_height {
            self.tip = hash;
            self.tip_height = height;
        }

        self.announce_blocks.then_some(NewBlockAvailableInDb {
            block_hash: hash,
            height,
        })
    }

    fn rejection_reason(&self, block: &Block) -> Option<String> {
        if let Some(reason) = &self.forced_rejection {
            return Some(reason.clone());
        }
        if self.blocks.contains_key(&block.block_hash()) {
            return Some("duplicate".to_string());
        }
        if !self.blocks.contains_key(&block.header.prev_blockhash) {
            return Some("prev-blk-not-found".to_string());
        }
        if !block.check_merkle_root() {
            return Some("bad-txnmrklroot".to_string());
        }
        if !check_proof_of_work(&block.header) {
            return Some("high-hash".to_string());
        }
        None
    }
}

#[async_trait]
impl RpcClient for MockNode {
    async fn send_to_address(&self, address: &Address, amount: Amount) -> RpcResult<Txid> {
        let mut chain = self.chain.lock().unwrap();
        if let (true, Some(txid)) = (chain.replay_payments, chain.last_payment) {
            return Ok(txid);
        }
        let funding = chain.next_counter();

        let payee = if chain.misdirect_payments {
            ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([0xab; 20]))
        } else {
            address.script_pubkey()
        };
        let mut outputs = vec![
            TxOut {
                value: Amount::ONE_BTC,
                script_pubkey: chain.wallet_script.clone(),
            },
            TxOut {
                value: amount,
                script_pubkey: payee.clone(),
            },
        ];
        if chain.duplicate_payments {
            outputs.push(TxOut {
                value: amount,
                script_pubkey: payee,
            });
        }

        let transaction = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::hash(&funding.to_le_bytes()), 0),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
                witness: Witness::new(),
            }],
            output: outputs,
        };

        let txid = transaction.compute_txid();
        chain.last_payment = Some(txid);
        chain.transactions.insert(txid, transaction.clone());
        chain.mempool.push(transaction);
        Ok(txid)
    }

    async fn get_raw_transaction_as_bytes(&self, txid: &Txid) -> RpcResult<Vec<u8>> {
        self.chain
            .lock()
            .unwrap()
            .transactions
            .get(txid)
            .map(serialize)
            .ok_or_else(|| RpcError::Node {
                code: RPC_INVALID_ADDRESS_OR_KEY,
                message: "No such mempool or blockchain transaction".to_string(),
            })
    }

    async fn get_best_block_hash(&self) -> RpcResult<BlockHash> {
        Ok(self.tip())
    }

    async fn get_block_header(&self, hash: &BlockHash) -> RpcResult<BlockHeaderInfo> {
        let chain = self.chain.lock().unwrap();
        let stored = chain.stored(hash)?;
        let header = stored.block.header;

        Ok(BlockHeaderInfo {
            hash: *hash,
            height: stored.height,
            time: header.time,
            bits: header.bits,
            previous_block_hash: (stored.height > 0).then_some(header.prev_blockhash),
            confirmations: chain.tip_height as i64 - stored.height as i64 + 1,
        })
    }

    async fn get_block_as_bytes(&self, hash: &BlockHash) -> RpcResult<Vec<u8>> {
        let chain = self.chain.lock().unwrap();
        Ok(serialize(&chain.stored(hash)?.block))
    }

    async fn generate(&self, blocks: u32) -> RpcResult<Vec<BlockHash>> {
        let mut hashes = Vec::with_capacity(blocks as usize);
        let mut stored = vec![];
        {
            let mut chain = self.chain.lock().unwrap();
            for _ in 0..blocks {
                let block = chain.mine_on_tip()?;
                let height = chain.tip_height + 1;
                hashes.push(block.block_hash());
                stored.extend(chain.connect(block, height));
            }
        }

        self.announce(stored);
        Ok(hashes)
    }

    async fn submit_block(&self, block: &[u8]) -> RpcResult<Option<String>> {
        let block: Block = deserialize(block).map_err(|_| RpcError::Node {
            code: RPC_DESERIALIZATION_ERROR,
            message: "Block decode failed".to_string(),
        })?;

        let announcement = {
            let mut chain = self.chain.lock().unwrap();
            if let Some(reason) = chain.rejection_reason(&block) {
                return Ok(Some(reason));
            }
            let height = chain.stored(&block.header.prev_blockhash)?.height + 1;
            chain.connect(block, height)
        };

        self.announce(announcement.into_iter().collect());
        Ok(None)
    }

    async fn get_block_count(&self) -> RpcResult<u64> {
        Ok(self.height())
    }

    async fn stop(&self) -> RpcResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod mock_node_tests {
    use assert2::assert;
    use assert2::let_assert;

    use super::*;

    #[tokio::test]
    async fn generated_blocks_extend_the_tip_and_confirm_the_mempool() {
        let node = MockNode::new();
        let address = crate::tests::shared::test_address();
        let txid = node
            .send_to_address(&address, Amount::from_sat(50_000_000))
            .await
            .unwrap();
        assert!(node.mempool_len() == 1);

        let hashes = node.generate(2).await.unwrap();

        assert!(node.height() == 2);
        assert!(node.tip() == hashes[1]);
        assert!(node.mempool_len() == 0);
        let block = node.get_block(&hashes[0]).await.unwrap();
        assert!(block.txdata[1].compute_txid() == txid);

        let header = node.get_block_header(&hashes[0]).await.unwrap();
        assert!(header.height == 1);
        assert!(header.confirmations == 2);
    }

    #[tokio::test]
    async fn submitted_block_on_unknown_parent_is_refused() {
        let node = MockNode::new();
        let mut orphan = BlockDraft::extending(&regtest_genesis_block(), 0, ScriptBuf::new(), 1)
            .solve(DEFAULT_MAX_NONCE_ATTEMPTS)
            .unwrap();
        orphan.header.prev_blockhash = BlockHash::hash(b"elsewhere");

        let reason = node.submit_block(&serialize(&orphan)).await.unwrap();
        assert!(reason.as_deref() == Some("prev-blk-not-found"));
    }

    #[tokio::test]
    async fn garbage_block_is_a_node_error() {
        let node = MockNode::new();
        let_assert!(Err(RpcError::Node { code, .. }) = node.submit_block(&[1, 2, 3]).await);
        assert!(code == RPC_DESERIALIZATION_ERROR);
    }

    #[tokio::test]
    async fn replayed_payment_answers_with_the_first_txid() {
        let node = MockNode::new();
        node.replay_payments(true);
        let address = crate::tests::shared::test_address();

        let first = node.send_to_address(&address, Amount::ONE_BTC).await.unwrap();
        let second = node.send_to_address(&address, Amount::ONE_BTC).await.unwrap();

        assert!(first == second);
        assert!(node.mempool_len() == 1);
    }
}
