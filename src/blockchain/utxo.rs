use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::crypto::Address;

/// An unspent output: a discrete lot of shares held by one address.
///
/// A UTXO is immutable after creation. It is created when a buy is admitted
/// (or as the remainder of a sell) and destroyed when a later sell consumes
/// it. The live set never contains a zero-amount UTXO.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Utxo {
    /// Unique identifier for this output
    pub id: String,

    /// Address that owns the shares
    pub owner: Address,

    /// Number of shares in this lot
    pub amount: f64,

    /// Ticker of the asset (e.g. AAPL)
    pub asset: String,

    /// Price per share when this lot was created (its cost basis)
    pub price: f64,

    /// Hash of the block that sealed the creating transaction, once mined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
}

impl Utxo {
    /// Creates a new output lot
    pub fn new(owner: Address, amount: f64, asset: impl Into<String>, price: f64) -> Self {
        Utxo {
            id: Uuid::new_v4().to_string(),
            owner,
            amount,
            asset: asset.into(),
            price,
            block_hash: None,
        }
    }

    /// The cost basis carried by this lot (amount x unit price)
    pub fn cost(&self) -> f64 {
        self.amount * self.price
    }
}
