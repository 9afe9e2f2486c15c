//! Ed25519 key management and transaction signing.
//!
//! The 32-byte public key doubles as the on-chain address; keys are stored
//! as the hex-encoded secret seed in an owner-only file.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;

use types::tx::Transaction;
use types::{Address, Hash};

pub fn generate_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

pub fn address_of(key: &SigningKey) -> Address {
    Hash::from(key.verifying_key().to_bytes())
}

pub fn save_key<P: AsRef<Path>>(path: P, key: &SigningKey) -> Result<()> {
    let encoded = hex::encode(key.to_bytes());
    fs::write(&path, encoded).context("failed to write key file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .context("failed to restrict key file permissions")?;
    }

    Ok(())
}

pub fn load_key<P: AsRef<Path>>(path: P) -> Result<SigningKey> {
    let data = fs::read_to_string(path).context("failed to read key file")?;
    let bytes = hex::decode(data.trim()).context("key file is not valid hex")?;
    let seed: [u8; SECRET_KEY_LENGTH] = match bytes.try_into() {
        Ok(seed) => seed,
        Err(bytes) => bail!(
            "key file must hold {SECRET_KEY_LENGTH} bytes, got {}",
            bytes.len()
        ),
    };
    Ok(SigningKey::from_bytes(&seed))
}

/// Signs the canonical bytes and stores the signature on the transaction.
/// The caller is responsible for `from` matching the signing key.
pub fn sign_transaction(tx: &mut Transaction, key: &SigningKey) {
    let signature = key.sign(&tx.canonical_bytes());
    tx.signature = signature.to_bytes().to_vec();
}
