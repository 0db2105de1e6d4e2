//! Key material and the key-management collaborator boundary
//!
//! The private key only ever lives inside a [`SourceKey`]. It is parsed or
//! reconstructed immediately before signing, lent by reference to the
//! [`KeyManager`], and zeroized when dropped.

use std::fmt;

use bitcoin::secp256k1::{rand::Rng, All, Secp256k1, SecretKey};
use bitcoin::{Address, NetworkKind, PrivateKey, PublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::builder::TransactionDraft;
use crate::error::TransferError;
use crate::network::Network;
use crate::signer::{sign_draft, SignedTransaction};
use crate::Result;

/// A reconstructed private key. Not `Clone`; zeroized on drop; never printed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SourceKey {
    secret: [u8; 32],
    #[zeroize(skip)]
    compressed: bool,
    #[zeroize(skip)]
    network: NetworkKind,
}

impl SourceKey {
    /// Take the scalar out of `key` and erase the original
    pub fn from_private_key(mut key: PrivateKey) -> Self {
        let source = Self {
            secret: key.inner.secret_bytes(),
            compressed: key.compressed,
            network: key.network,
        };
        key.inner.non_secure_erase();
        source
    }

    /// Parse a WIF string (51/52 chars) or a 64-char hex scalar
    pub fn parse(secret: &str, network: Network) -> Result<Self> {
        let secret = secret.trim();
        match secret.len() {
            51 | 52 => PrivateKey::from_wif(secret)
                .map(Self::from_private_key)
                .map_err(|e| TransferError::InvalidKey(format!("Invalid WIF: {}", e))),
            64 => {
                let bytes = Zeroizing::new(
                    hex::decode(secret)
                        .map_err(|e| TransferError::InvalidKey(format!("Invalid hex key: {}", e)))?,
                );
                let inner = SecretKey::from_slice(&bytes)
                    .map_err(|e| TransferError::InvalidKey(format!("Invalid secret: {}", e)))?;
                Ok(Self::from_private_key(PrivateKey::new(
                    inner,
                    network.bitcoin_network(),
                )))
            }
            len => Err(TransferError::InvalidKey(format!(
                "Expected WIF or 64-char hex, got {} characters",
                len
            ))),
        }
    }

    /// Short-lived signing key. Callers erase it once done.
    pub(crate) fn private_key(&self) -> Result<PrivateKey> {
        let inner = SecretKey::from_slice(&self.secret)
            .map_err(|_| TransferError::InvalidKey("Key material has been erased".to_string()))?;
        Ok(PrivateKey {
            compressed: self.compressed,
            network: self.network,
            inner,
        })
    }
}

impl fmt::Debug for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SourceKey(<redacted>)")
    }
}

/// Key-management capabilities the transfer engine consumes
pub trait KeyManager: Send + Sync {
    /// P2PKH address of `key` on `network`
    fn derive_address(&self, key: &SourceKey, network: Network) -> Result<String>;

    /// Public key as hex (compressed unless the WIF said otherwise)
    fn derive_public_key(&self, key: &SourceKey) -> Result<String>;

    /// Sign every input of `draft`. Fails with `Signing` if any input cannot be unlocked.
    fn sign(&self, key: &SourceKey, draft: &TransactionDraft) -> Result<SignedTransaction>;
}

/// secp256k1-backed key manager.
///
/// Owns its own context, blinded from an injected randomness source.
pub struct Secp256k1KeyManager {
    secp: Secp256k1<All>,
}

impl Secp256k1KeyManager {
    pub fn with_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut secp = Secp256k1::new();
        secp.randomize(rng);
        Self { secp }
    }

    fn public_key(&self, key: &SourceKey) -> Result<PublicKey> {
        let mut private_key = key.private_key()?;
        let public_key = PublicKey::from_private_key(&self.secp, &private_key);
        private_key.inner.non_secure_erase();
        Ok(public_key)
    }
}

impl KeyManager for Secp256k1KeyManager {
    fn derive_address(&self, key: &SourceKey, network: Network) -> Result<String> {
        let public_key = self.public_key(key)?;
        Ok(Address::p2pkh(public_key.pubkey_hash(), network.bitcoin_network()).to_string())
    }

    fn derive_public_key(&self, key: &SourceKey) -> Result<String> {
        Ok(self.public_key(key)?.to_string())
    }

    fn sign(&self, key: &SourceKey, draft: &TransactionDraft) -> Result<SignedTransaction> {
        sign_draft(&self.secp, draft, key)
    }
}

/// Threshold share combination, provided by an external key library.
///
/// Implementors supply [`ShareReconstructor::combine`]; callers go through
/// [`ShareReconstructor::reconstruct`], which enforces the threshold.
pub trait ShareReconstructor: Send + Sync {
    /// Combine exactly `threshold` well-formed shares into a key
    fn combine(&self, shares: &[String], network: Network) -> Result<SourceKey>;

    fn reconstruct(&self, shares: &[String], threshold: usize, network: Network) -> Result<SourceKey> {
        if threshold == 0 {
            return Err(TransferError::Reconstruction(
                "Threshold must be at least 1".to_string(),
            ));
        }

        let mut usable: Vec<String> = Vec::with_capacity(shares.len());
        for share in shares {
            let share = share.trim();
            if !share.is_empty() && !usable.iter().any(|s| s == share) {
                usable.push(share.to_string());
            }
        }

        if usable.len() < threshold {
            return Err(TransferError::Reconstruction(format!(
                "Need {} distinct shares, got {}",
                threshold,
                usable.len()
            )));
        }

        usable.truncate(threshold);
        self.combine(&usable, network)
    }
}
