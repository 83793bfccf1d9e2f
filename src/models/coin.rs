use std::collections::HashSet;
use std::collections::VecDeque;

use bitcoin::Amount;
use bitcoin::OutPoint;
use bitcoin::Script;
use bitcoin::Transaction;
use serde::Deserialize;
use serde::Serialize;

/// An unspent output earmarked for test spending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    transaction: Transaction,
    outpoint: OutPoint,
}

impl Coin {
    /// Returns `None` if `vout` is out of range for `transaction`.
    pub fn new(transaction: Transaction, vout: u32) -> Option<Self> {
        if vout as usize >= transaction.output.len() {
            return None;
        }
        let outpoint = OutPoint::new(transaction.compute_txid(), vout);
        Some(Self {
            transaction,
            outpoint,
        })
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn outpoint(&self) -> OutPoint {
        self.outpoint
    }

    pub fn vout(&self) -> u32 {
        self.outpoint.vout
    }

    pub fn value(&self) -> Amount {
        self.transaction.output[self.outpoint.vout as usize].value
    }

    pub fn script_pubkey(&self) -> &Script {
        &self.transaction.output[self.outpoint.vout as usize].script_pubkey
    }
}

/// First-in first-out queue of coins available to a test.
///
/// An outpoint can enter the queue at most once over the queue's lifetime,
/// even after it has been dequeued.
#[derive(Debug, Default)]
pub struct CoinQueue {
    coins: VecDeque<Coin>,
    seen: HashSet<OutPoint>,
}

impl CoinQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false`, leaving the queue untouched, if the coin's outpoint
    /// was enqueued before.
    pub fn enqueue(&mut self, coin: Coin) -> bool {
        if !self.seen.insert(coin.outpoint()) {
            return false;
        }
        self.coins.push_back(coin);
        true
    }

    /// Enqueues every coin of `batch` in order, or none of them.
    ///
    /// Fails with the first outpoint that was enqueued before or occurs
    /// twice within the batch.
    pub fn enqueue_all(&mut self, batch: Vec<Coin>) -> Result<(), OutPoint> {
        let mut in_batch = HashSet::with_capacity(batch.len());
        if let Some(duplicate) = batch
            .iter()
            .map(Coin::outpoint)
            .find(|outpoint| self.seen.contains(outpoint) || !in_batch.insert(*outpoint))
        {
            return Err(duplicate);
        }

        self.seen.extend(in_batch);
        self.coins.extend(batch);
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<Coin> {
        self.coins.pop_front()
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.coins.iter()
    }
}
