use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;
use std::str::FromStr;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// An investor or broker address.
///
/// Addresses are ed25519 public keys in base58, so a transaction's
/// from-address is directly usable as the verification key for its
/// signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Derives an address from a verifying key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        Address(bs58::encode(public_key.as_bytes()).into_string())
    }

    /// Decodes the address back into a verifying key
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let key_bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey("wrong key length".to_string()))?;

        VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        bs58::decode(s)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        Ok(Address(s.to_string()))
    }
}

/// An ed25519 signature in base58
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(bs58::encode(signature.to_bytes()).into_string())
    }

    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature("wrong signature length".to_string()))?;

        Ok(Signature::from_bytes(&signature_bytes))
    }
}

/// A keypair used by investors to sign sell transactions.
///
/// The ledger itself never holds wallets; callers sign offline and submit
/// only the signature. The server creates wallets solely through the wallet
/// endpoint, handing the secret key back to the caller.
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Generates a wallet with a fresh random keypair
    pub fn new() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let address = Address::from_public_key(&signing_key.verifying_key());

        Wallet {
            signing_key,
            address,
        }
    }

    /// Restores a wallet from a previously exported secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let key_bytes: [u8; 32] = secret_key_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSecretKey("wrong secret key length".to_string()))?;

        let signing_key = SigningKey::from_bytes(&key_bytes);
        let address = Address::from_public_key(&signing_key.verifying_key());

        Ok(Wallet {
            signing_key,
            address,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Signs an arbitrary message, typically a transaction content hash
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        DigitalSignature::from_signature(&self.signing_key.sign(message))
    }

    /// Exports the secret key so the caller can store it
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies a signature over a message against a public key
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key: &VerifyingKey,
) -> Result<bool, CryptoError> {
    let signature = signature.to_signature()?;

    Ok(public_key.verify(message, &signature).is_ok())
}
