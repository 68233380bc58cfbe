// Ledger module
//
// The core of the system: the UTXO/transaction/block data model, the
// weighted-average-cost accounting, proof-of-work mining and chain
// validation.

pub mod block;
pub mod chain;
pub mod crypto;
pub mod transaction;
pub mod utxo;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Ledger, LedgerError, Portfolio};
pub use crypto::{Address, DigitalSignature, Wallet};
pub use transaction::Transaction;
pub use utxo::Utxo;
