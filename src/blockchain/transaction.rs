use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature, Wallet};
use super::utxo::Utxo;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction requires a signature (for sales/registrations)")]
    MissingSignature,

    #[error("Invalid transaction signature")]
    InvalidSignature,

    #[error("Transaction already signed")]
    AlreadySigned,

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// A signed or unsigned intent to move ownership of shares.
///
/// `from = None` denotes an issuance ("buy"); `from == to` a self-sale.
/// The ledger attaches consumed inputs and produced outputs during
/// admission; both are excluded from the content hash so callers can sign
/// before submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Seller address, or None for a buy/issuance
    pub from: Option<Address>,

    /// Receiving address
    pub to: Address,

    /// Number of shares
    pub amount: f64,

    /// Asset ticker
    pub asset: String,

    /// Price per share for this transaction
    pub price: f64,

    /// Signature over the content hash, required when `from` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<DigitalSignature>,

    /// UTXOs consumed by this transaction (assigned by the ledger)
    pub inputs: Vec<Utxo>,

    /// UTXOs produced by this transaction (assigned by the ledger)
    pub outputs: Vec<Utxo>,
}

impl Transaction {
    /// Creates a new unsigned transaction with no inputs or outputs
    pub fn new(
        from: Option<Address>,
        to: Address,
        amount: f64,
        asset: impl Into<String>,
        price: f64,
    ) -> Self {
        Transaction {
            from,
            to,
            amount,
            asset: asset.into(),
            price,
            signature: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Computes the content hash: a SHA-256 digest over (from, to, amount,
    /// asset, price). Signature, inputs and outputs are deliberately left
    /// out so the hash is stable from signing through admission.
    pub fn content_hash(&self) -> String {
        let from = self.from.as_ref().map(|a| a.0.as_str()).unwrap_or("");

        let mut hasher = Sha256::new();
        hasher.update(from.as_bytes());
        hasher.update(self.to.0.as_bytes());
        hasher.update(self.amount.to_string().as_bytes());
        hasher.update(self.asset.as_bytes());
        hasher.update(self.price.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Signs the transaction with the seller's wallet
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if self.signature.is_some() {
            return Err(TransactionError::AlreadySigned);
        }

        self.signature = Some(wallet.sign(self.content_hash().as_bytes()));
        Ok(())
    }

    /// Attaches a signature produced offline by the caller
    pub fn attach_signature(&mut self, signature: DigitalSignature) {
        self.signature = Some(signature);
    }

    /// Whether this transaction is an issuance (buy)
    pub fn is_buy(&self) -> bool {
        self.from.is_none()
    }

    /// Checks structural validity per the signature contract: buys need no
    /// signature; anything with a from-address must carry a signature that
    /// verifies against the from-address used as a public key.
    pub fn verify(&self) -> bool {
        let from = match &self.from {
            Some(from) => from,
            None => return true,
        };

        let signature = match &self.signature {
            Some(signature) if !signature.0.is_empty() => signature,
            _ => return false,
        };

        let public_key = match from.to_public_key() {
            Ok(key) => key,
            Err(_) => return false,
        };

        verify_signature(self.content_hash().as_bytes(), signature, &public_key)
            .unwrap_or(false)
    }

    /// Like [`verify`](Self::verify), but distinguishing a missing signature
    /// from a failed verification
    pub fn check_signature(&self) -> Result<(), TransactionError> {
        if self.from.is_none() {
            return Ok(());
        }

        match &self.signature {
            None => Err(TransactionError::MissingSignature),
            Some(signature) if signature.0.is_empty() => Err(TransactionError::MissingSignature),
            Some(_) if self.verify() => Ok(()),
            Some(_) => Err(TransactionError::InvalidSignature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_needs_no_signature() {
        let tx = Transaction::new(None, Address("investor".to_string()), 10.0, "AAPL", 100.0);

        assert!(tx.is_buy());
        assert!(tx.verify());
        assert!(tx.check_signature().is_ok());
    }

    #[test]
    fn test_content_hash_ignores_inputs_outputs() {
        let wallet = Wallet::new();
        let mut tx = Transaction::new(
            Some(wallet.address().clone()),
            wallet.address().clone(),
            5.0,
            "AAPL",
            175.0,
        );

        let before = tx.content_hash();
        tx.outputs
            .push(Utxo::new(wallet.address().clone(), 5.0, "AAPL", 150.0));
        assert_eq!(tx.content_hash(), before);
    }

    #[test]
    fn test_sign_and_verify() {
        let wallet = Wallet::new();
        let mut tx = Transaction::new(
            Some(wallet.address().clone()),
            wallet.address().clone(),
            5.0,
            "AAPL",
            175.0,
        );

        tx.sign(&wallet).unwrap();
        assert!(tx.verify());
        assert!(tx.check_signature().is_ok());
    }

    #[test]
    fn test_double_sign_rejected() {
        let wallet = Wallet::new();
        let mut tx = Transaction::new(
            Some(wallet.address().clone()),
            wallet.address().clone(),
            1.0,
            "AAPL",
            100.0,
        );

        tx.sign(&wallet).unwrap();
        assert!(matches!(
            tx.sign(&wallet),
            Err(TransactionError::AlreadySigned)
        ));
    }

    #[test]
    fn test_missing_signature() {
        let wallet = Wallet::new();
        let tx = Transaction::new(
            Some(wallet.address().clone()),
            wallet.address().clone(),
            5.0,
            "AAPL",
            175.0,
        );

        assert!(!tx.verify());
        assert!(matches!(
            tx.check_signature(),
            Err(TransactionError::MissingSignature)
        ));
    }

    #[test]
    fn test_wrong_signer_rejected() {
        let seller = Wallet::new();
        let intruder = Wallet::new();
        let mut tx = Transaction::new(
            Some(seller.address().clone()),
            seller.address().clone(),
            5.0,
            "AAPL",
            175.0,
        );

        tx.attach_signature(intruder.sign(tx.content_hash().as_bytes()));
        assert!(!tx.verify());
        assert!(matches!(
            tx.check_signature(),
            Err(TransactionError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_fields_break_signature() {
        let wallet = Wallet::new();
        let mut tx = Transaction::new(
            Some(wallet.address().clone()),
            wallet.address().clone(),
            5.0,
            "AAPL",
            175.0,
        );

        tx.sign(&wallet).unwrap();
        tx.amount = 50.0;
        assert!(!tx.verify());
    }
}
