use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
};
use tracing::error;

use crate::error::{Result, TraderbotError};

/// Freshly generated custodial wallet. `private_key` is the base58 keypair
/// (64 bytes), the format users import into Phantom/Solflare.
pub struct GeneratedWallet {
    pub address: Pubkey,
    pub private_key: String,
}

pub fn generate_wallet() -> GeneratedWallet {
    let keypair = Keypair::new();
    GeneratedWallet {
        address: keypair.pubkey(),
        private_key: bs58::encode(keypair.to_bytes()).into_string(),
    }
}

pub fn keypair_from_base58(private_key_bs58: &str) -> Result<Keypair> {
    let bytes = bs58::decode(private_key_bs58.trim())
        .into_vec()
        .map_err(|e| {
            error!("Failed to decode base58 private key: {}", e);
            TraderbotError::InvalidInput(format!("Invalid private key format: {}", e))
        })?;

    Keypair::from_bytes(&bytes).map_err(|e| {
        error!("Failed to create keypair from bytes: {}", e);
        TraderbotError::InvalidInput(format!("Invalid private key data: {}", e))
    })
}

/// Whether `private_key_bs58` really controls `address`.
pub fn key_matches_address(private_key_bs58: &str, address: &str) -> bool {
    keypair_from_base58(private_key_bs58)
        .map(|keypair| keypair.pubkey().to_string() == address)
        .unwrap_or(false)
}
