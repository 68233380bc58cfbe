use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::Address;
use super::transaction::Transaction;

/// Errors that can occur while sealing a block
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Nonce search exhausted after {max_nonce} iterations at difficulty {difficulty}")]
    NonceSearchExhausted { difficulty: usize, max_nonce: u64 },
}

/// An ordered batch of transactions sealed with proof-of-work
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Address of the block producer (the broker)
    pub producer: Address,

    /// Position of the block in the chain
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2024-01-01T10:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block, empty for genesis
    pub previous_hash: String,

    /// Hash of this block once sealed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hash: String,

    /// Proof-of-work counter
    pub nonce: u64,
}

impl Block {
    /// Creates an unsealed block; `mine` must be called before it can be
    /// appended to a chain
    pub fn new(
        producer: Address,
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
    ) -> Self {
        let mut block = Block {
            producer,
            index,
            timestamp,
            transactions,
            previous_hash,
            hash: String::new(),
            nonce: 0,
        };

        block.hash = block.calculate_hash();
        block
    }

    /// Creates the trusted genesis block, with no producer and an empty
    /// previous hash
    pub fn genesis(timestamp: DateTime<Utc>) -> Self {
        Block::new(
            Address(String::new()),
            0,
            timestamp,
            Vec::new(),
            String::new(),
        )
    }

    /// Computes the SHA-256 hash over (producer, index, timestamp,
    /// transactions, previous_hash, nonce)
    pub fn calculate_hash(&self) -> String {
        let block_data = serde_json::json!({
            "producer": self.producer,
            "index": self.index,
            "timestamp": self.timestamp,
            "transactions": self.transactions,
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
        });

        let mut hasher = Sha256::new();
        hasher.update(block_data.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Whether a hash satisfies the difficulty predicate (leading zero hex
    /// digits)
    pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
        hash.starts_with(&"0".repeat(difficulty))
    }

    /// Seals the block: searches increasing nonces until the hash satisfies
    /// the difficulty predicate. The search is CPU-bound and bounded by
    /// `max_nonce` so unreasonable difficulties fail instead of spinning
    /// forever.
    pub fn mine(&mut self, difficulty: usize, max_nonce: u64) -> Result<(), BlockError> {
        for nonce in 0..=max_nonce {
            self.nonce = nonce;
            let hash = self.calculate_hash();

            if Self::meets_difficulty(&hash, difficulty) {
                self.hash = hash;
                return Ok(());
            }
        }

        Err(BlockError::NonceSearchExhausted {
            difficulty,
            max_nonce,
        })
    }

    /// Whether every transaction in the block passes signature verification
    pub fn has_valid_transactions(&self) -> bool {
        self.transactions.iter().all(|tx| tx.verify())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;

    fn buy(to: &Address) -> Transaction {
        Transaction::new(None, to.clone(), 10.0, "AAPL", 100.0)
    }

    #[test]
    fn test_new_block() {
        let producer = Address("broker".to_string());
        let to = Address("investor".to_string());
        let block = Block::new(
            producer.clone(),
            1,
            Utc::now(),
            vec![buy(&to)],
            "prev".to_string(),
        );

        assert_eq!(block.producer, producer);
        assert_eq!(block.index, 1);
        assert_eq!(block.previous_hash, "prev");
        assert_eq!(block.hash.len(), 64);
    }

    #[test]
    fn test_genesis() {
        let block = Block::genesis(Utc::now());

        assert_eq!(block.index, 0);
        assert!(block.previous_hash.is_empty());
        assert!(block.transactions.is_empty());
    }

    #[test]
    fn test_hash_changes_with_nonce() {
        let mut block = Block::genesis(Utc::now());
        let before = block.calculate_hash();

        block.nonce += 1;
        assert_ne!(block.calculate_hash(), before);
    }

    #[test]
    fn test_mine_meets_difficulty() {
        let to = Address("investor".to_string());
        let mut block = Block::new(
            Address("broker".to_string()),
            1,
            Utc::now(),
            vec![buy(&to)],
            "prev".to_string(),
        );

        block.mine(2, u64::MAX).unwrap();

        assert!(Block::meets_difficulty(&block.hash, 2));
        assert_eq!(block.hash, block.calculate_hash());
    }

    #[test]
    fn test_mine_exhaustion() {
        let mut block = Block::genesis(Utc::now());
        let result = block.mine(64, 10);

        assert!(matches!(
            result,
            Err(BlockError::NonceSearchExhausted { .. })
        ));
    }

    #[test]
    fn test_valid_transactions() {
        let wallet = Wallet::new();
        let mut sale = Transaction::new(
            Some(wallet.address().clone()),
            wallet.address().clone(),
            5.0,
            "AAPL",
            175.0,
        );
        sale.sign(&wallet).unwrap();

        let block = Block::new(
            Address("broker".to_string()),
            1,
            Utc::now(),
            vec![buy(wallet.address()), sale],
            "prev".to_string(),
        );

        assert!(block.has_valid_transactions());
    }

    #[test]
    fn test_unsigned_sale_invalidates_block() {
        let wallet = Wallet::new();
        let sale = Transaction::new(
            Some(wallet.address().clone()),
            wallet.address().clone(),
            5.0,
            "AAPL",
            175.0,
        );

        let block = Block::new(
            Address("broker".to_string()),
            1,
            Utc::now(),
            vec![sale],
            "prev".to_string(),
        );

        assert!(!block.has_valid_transactions());
    }
}
