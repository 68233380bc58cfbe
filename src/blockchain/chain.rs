use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::{Block, BlockError};
use super::crypto::Address;
use super::transaction::{Transaction, TransactionError};
use super::utxo::Utxo;

/// Default proof-of-work difficulty (leading zero hex digits)
pub const DEFAULT_DIFFICULTY: usize = 2;

/// Default bound on the nonce search, so a misconfigured difficulty fails
/// instead of pinning a core indefinitely
pub const DEFAULT_MAX_NONCE: u64 = 50_000_000;

/// Errors that can occur during ledger operations.
///
/// All of these reject a single requested operation; none are fatal and
/// none leave the ledger partially mutated.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Missing required transaction fields (toAddress, amount, asset, price)")]
    MissingField,

    #[error(transparent)]
    TransactionError(#[from] TransactionError),

    #[error("Insufficient quantity of {asset} to sell. Needs: {required}, Has: {available}")]
    InsufficientBalance {
        asset: String,
        required: f64,
        available: f64,
    },

    #[error("Only 'Buy' (from=null) or 'Sell' (from=to) transactions are supported for portfolio tracking")]
    UnsupportedTransfer,

    #[error("Asset {0} not initialized")]
    AssetNotInitialized(String),

    #[error("Mempool is empty. No transactions to mine")]
    EmptyMempool,

    #[error("Price must be greater than zero for a purchase (got {0})")]
    NonPositivePrice(f64),

    #[error("Amount must be greater than zero (got {0})")]
    NonPositiveAmount(f64),

    #[error(transparent)]
    BlockError(#[from] BlockError),
}

/// An address's position in one asset, derived from its live UTXOs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Portfolio {
    /// Total shares held
    pub quantity: f64,

    /// Weighted-average cost per share, 0 when quantity is 0
    pub average_cost: f64,

    /// Total cost basis, exactly 0 when quantity is 0
    pub total_cost: f64,
}

impl Portfolio {
    fn empty() -> Self {
        Portfolio {
            quantity: 0.0,
            average_cost: 0.0,
            total_cost: 0.0,
        }
    }
}

/// Chain, mempool and UTXO sets, guarded together so every mutating
/// operation is a single critical section
#[derive(Debug)]
struct LedgerInner {
    chain: Vec<Block>,
    mempool: Vec<Transaction>,
    utxos: HashMap<String, Vec<Utxo>>,
}

/// The append-only portfolio ledger.
///
/// Owns the block chain, the pending-transaction pool and the per-asset
/// live UTXO sets, and is the sole mutator of all three. Everything is
/// process-lifetime, in-memory state.
#[derive(Debug, Clone)]
pub struct Ledger {
    inner: Arc<RwLock<LedgerInner>>,

    /// Proof-of-work difficulty, fixed at construction
    difficulty: usize,

    /// Upper bound for the nonce search
    max_nonce: u64,
}

impl Ledger {
    /// Creates a ledger containing only the genesis block
    pub fn new(difficulty: usize) -> Self {
        Self::with_max_nonce(difficulty, DEFAULT_MAX_NONCE)
    }

    /// Creates a ledger with an explicit nonce-search bound
    pub fn with_max_nonce(difficulty: usize, max_nonce: u64) -> Self {
        let inner = LedgerInner {
            chain: vec![Block::genesis(Utc::now())],
            mempool: Vec::new(),
            utxos: HashMap::new(),
        };

        Ledger {
            inner: Arc::new(RwLock::new(inner)),
            difficulty,
            max_nonce,
        }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Validates and admits a transaction into the mempool, assigning its
    /// inputs and outputs.
    ///
    /// Buys (`from = None`) mint one new UTXO at the purchase price. Sells
    /// (`from == to`) consume every live UTXO of the seller for the asset
    /// and re-emit a single remainder lot priced at the old average cost,
    /// which keeps the average cost stable across partial sells. Transfers
    /// between distinct addresses are rejected.
    ///
    /// Validation happens before any mutation, so a rejected transaction
    /// leaves the mempool and UTXO sets untouched.
    pub fn submit_transaction(
        &self,
        mut transaction: Transaction,
    ) -> Result<Transaction, LedgerError> {
        if transaction.to.0.trim().is_empty() || transaction.asset.trim().is_empty() {
            return Err(LedgerError::MissingField);
        }

        // Zero-amount lots must never reach the live set, and a negative
        // or NaN amount would slip past the balance check on a sell.
        if !transaction.amount.is_finite() || transaction.amount <= 0.0 {
            return Err(LedgerError::NonPositiveAmount(transaction.amount));
        }

        transaction.asset = transaction.asset.to_uppercase();
        let asset = transaction.asset.clone();

        let mut inner = self.inner.write().unwrap();

        let owner = match transaction.from.clone() {
            // Buy: mint a new lot at the purchase price.
            None => {
                if transaction.price.is_nan() || transaction.price <= 0.0 {
                    return Err(LedgerError::NonPositivePrice(transaction.price));
                }

                let utxo = Utxo::new(
                    transaction.to.clone(),
                    transaction.amount,
                    asset.clone(),
                    transaction.price,
                );
                transaction.outputs.push(utxo.clone());
                inner.utxos.entry(asset.clone()).or_default().push(utxo);
                inner.mempool.push(transaction.clone());

                info!(
                    "Admitted buy of {} {} @ {} for {}",
                    transaction.amount, asset, transaction.price, transaction.to
                );
                return Ok(transaction);
            }
            Some(from) => from,
        };

        // Anything with a from-address must carry a verifying signature.
        if let Err(err) = transaction.check_signature() {
            warn!("Rejected transaction for {}: {}", asset, err);
            return Err(err.into());
        }

        if owner != transaction.to {
            return Err(LedgerError::UnsupportedTransfer);
        }

        // Sell: consume all of the owner's lots, re-emit one remainder.
        let old = portfolio_of(&inner, &owner, &asset);

        if old.quantity < transaction.amount {
            return Err(LedgerError::InsufficientBalance {
                asset,
                required: transaction.amount,
                available: old.quantity,
            });
        }

        let amount_sold = transaction.amount;
        let new_quantity = old.quantity - amount_sold;

        let asset_utxos = inner.utxos.entry(asset.clone()).or_default();
        let consumed: Vec<Utxo> = asset_utxos
            .iter()
            .filter(|utxo| utxo.owner == owner)
            .cloned()
            .collect();
        asset_utxos.retain(|utxo| utxo.owner != owner);
        transaction.inputs.extend(consumed);

        // The remainder lot is priced at the old average cost, never the
        // sale price, so a sale cannot move the remaining average. Total
        // cost is re-derived from the live set, which makes it exactly
        // zero on full liquidation with no rounding residue.
        if new_quantity > 0.0 {
            let remainder = Utxo::new(owner.clone(), new_quantity, asset.clone(), old.average_cost);
            asset_utxos.push(remainder.clone());
            transaction.outputs.push(remainder);
        }

        inner.mempool.push(transaction.clone());

        info!(
            "Admitted sale of {} {} by {}, {} remaining",
            amount_sold, asset, owner, new_quantity
        );
        Ok(transaction)
    }

    /// Drains the entire mempool into a new proof-of-work-sealed block and
    /// appends it to the chain.
    ///
    /// The asset names which market the block is being produced for; it
    /// must have at least one admitted transaction behind it, but the block
    /// carries the whole mempool across all assets and the mempool is
    /// cleared completely.
    pub fn mine(&self, producer: &Address, asset: &str) -> Result<Block, LedgerError> {
        let ticker = asset.to_uppercase();

        let mut inner = self.inner.write().unwrap();

        if inner.mempool.is_empty() {
            return Err(LedgerError::EmptyMempool);
        }
        if !inner.utxos.contains_key(&ticker) {
            return Err(LedgerError::AssetNotInitialized(ticker));
        }

        let previous_hash = inner
            .chain
            .last()
            .map(|block| block.hash.clone())
            .unwrap_or_default();

        let mut block = Block::new(
            producer.clone(),
            inner.chain.len() as u64,
            Utc::now(),
            inner.mempool.clone(),
            previous_hash,
        );
        block.mine(self.difficulty, self.max_nonce)?;

        // Stamp the sealing block onto the live lots the mined transactions
        // produced. The block's own transaction copies stay as hashed.
        for tx in &block.transactions {
            for output in &tx.outputs {
                if let Some(live) = inner
                    .utxos
                    .get_mut(&tx.asset)
                    .and_then(|set| set.iter_mut().find(|u| u.id == output.id))
                {
                    live.block_hash = Some(block.hash.clone());
                }
            }
        }

        inner.chain.push(block.clone());
        inner.mempool.clear();

        info!(
            "Mined block {} for {} with {} transaction(s), hash {}",
            block.index,
            ticker,
            block.transactions.len(),
            block.hash
        );
        Ok(block)
    }

    /// Derives the quantity, average cost and total cost an address holds
    /// in one asset. Unknown pairs yield zeros; this never fails.
    pub fn portfolio(&self, address: &Address, asset: &str) -> Portfolio {
        let ticker = asset.to_uppercase();
        let inner = self.inner.read().unwrap();
        portfolio_of(&inner, address, &ticker)
    }

    /// Snapshot of the full chain
    pub fn chain(&self) -> Vec<Block> {
        self.inner.read().unwrap().chain.clone()
    }

    /// Snapshot of the pending transactions
    pub fn mempool(&self) -> Vec<Transaction> {
        self.inner.read().unwrap().mempool.clone()
    }

    /// The current chain tip
    pub fn last_block(&self) -> Block {
        self.inner
            .read()
            .unwrap()
            .chain
            .last()
            .expect("chain always holds genesis")
            .clone()
    }

    /// Recomputes chain integrity from scratch: every block's stored hash,
    /// its link to its predecessor, and every included transaction's
    /// signature. Genesis is trusted implicitly. Read-only.
    pub fn is_valid(&self) -> bool {
        let inner = self.inner.read().unwrap();

        for i in 1..inner.chain.len() {
            let block = &inner.chain[i];
            let previous = &inner.chain[i - 1];

            if !block.has_valid_transactions() {
                return false;
            }
            if block.hash != block.calculate_hash() {
                return false;
            }
            if block.previous_hash != previous.hash {
                return false;
            }
        }

        true
    }

    #[cfg(test)]
    pub(crate) fn tamper_chain<F: FnOnce(&mut Vec<Block>)>(&self, f: F) {
        f(&mut self.inner.write().unwrap().chain);
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY)
    }
}

/// Sums an owner's live lots for one asset. The average is always derived,
/// never stored, so successive buys weight-average automatically.
fn portfolio_of(inner: &LedgerInner, address: &Address, asset: &str) -> Portfolio {
    let utxos = match inner.utxos.get(asset) {
        Some(utxos) => utxos,
        None => return Portfolio::empty(),
    };

    let mut quantity = 0.0;
    let mut total_cost = 0.0;
    for utxo in utxos.iter().filter(|utxo| utxo.owner == *address) {
        quantity += utxo.amount;
        total_cost += utxo.cost();
    }

    if quantity > 0.0 {
        Portfolio {
            quantity,
            average_cost: total_cost / quantity,
            total_cost,
        }
    } else {
        Portfolio::empty()
    }
}
