use crate::chain::{ChainClient, ChainError, Receipt};
use alloy::primitives::B256;

/// A single broadcast variant of a settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Hash of the signed transaction.
    pub tx_hash: B256,
    /// Gas price the transaction was signed with, unknown for restored records.
    pub gas_price: Option<u128>,
    /// Block number observed when the transaction was handed to the monitor.
    pub sent_block: Option<u64>,
    /// Whether the transaction stayed unexecuted for too long and must be replaced.
    pub long_unexecuted: bool,
}

impl Record {
    fn new(tx_hash: B256, gas_price: Option<u128>) -> Self {
        Self { tx_hash, gas_price, sent_block: None, long_unexecuted: false }
    }
}

/// Records every transaction sent for one settlement.
///
/// Replacements reuse the nonce of the first transaction, and any of them may end up executed,
/// so all of them are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecorder {
    nonce: u64,
    /// Earlier records, oldest first.
    history: Vec<Record>,
    last: Record,
}

impl TransactionRecorder {
    /// Creates a recorder for a freshly sent transaction.
    pub fn new(tx_hash: B256, nonce: u64, gas_price: Option<u128>) -> Self {
        Self { nonce, history: Vec::new(), last: Record::new(tx_hash, gas_price) }
    }

    /// Appends a new attempt.
    ///
    /// The recorder nonce never decreases. Broadcasting the latest attempt again keeps a single
    /// record of it.
    pub fn record(&mut self, tx_hash: B256, nonce: u64, gas_price: Option<u128>) {
        self.nonce = self.nonce.max(nonce);
        if self.last.tx_hash == tx_hash {
            self.last.long_unexecuted = false;
            return;
        }
        let previous = std::mem::replace(&mut self.last, Record::new(tx_hash, gas_price));
        self.history.push(previous);
    }

    /// Nonce shared by all recorded transactions.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The latest attempt.
    pub fn last(&self) -> &Record {
        &self.last
    }

    /// Number of attempts.
    pub fn len(&self) -> usize {
        self.history.len() + 1
    }

    /// Always `false`, a recorder holds at least one attempt.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All attempts, oldest first.
    pub fn records(&self) -> impl DoubleEndedIterator<Item = &Record> {
        self.history.iter().chain(std::iter::once(&self.last))
    }

    /// Flags the latest attempt for replacement.
    pub fn mark_last_long_unexecuted(&mut self) {
        self.last.long_unexecuted = true;
    }

    /// Sets the block number of the latest attempt unless already known.
    pub fn set_sent_block_if_missing(&mut self, block_number: u64) {
        self.last.sent_block.get_or_insert(block_number);
    }

    /// Returns the first receipt found, probing attempts oldest first.
    pub async fn receipt(&self, chain: &dyn ChainClient) -> Result<Option<Receipt>, ChainError> {
        for record in self.records() {
            if let Some(receipt) = chain.get_receipt(record.tx_hash).await? {
                return Ok(Some(receipt));
            }
        }
        Ok(None)
    }

    /// Whether any recorded transaction is known to the chain, probing newest first.
    pub async fn is_tx_exists(&self, chain: &dyn ChainClient) -> Result<bool, ChainError> {
        for record in self.records().rev() {
            if chain.get_transaction(record.tx_hash).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
