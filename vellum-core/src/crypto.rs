//! Hashing and signing capability.
//!
//! Stores and validators receive a [`CryptoDriver`] value at construction
//! instead of looking one up globally. Any two compliant drivers are
//! interchangeable: a signature made by one verifies under the other for the
//! same keypair and message.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt::Debug;

use crate::{
    document::AuthorKeypair,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Raw ed25519 key material.
#[derive(Clone, PartialEq, Eq)]
pub struct KeypairBytes {
    pub pubkey: [u8; 32],
    pub secret: [u8; 32],
}

impl Debug for KeypairBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeypairBytes({}, <redacted>)", hex::encode(self.pubkey))
    }
}

/// The low-level crypto operations the store depends on.
pub trait CryptoDriver: Send + Sync + Debug {
    /// SHA-256 digest of `input`.
    fn sha256(&self, input: &[u8]) -> [u8; 32];

    /// Derives a keypair from `seed`, or a random one when no seed is given.
    fn generate_keypair_bytes(&self, seed: Option<[u8; 32]>) -> KeypairBytes;

    /// Signs `message`. Deterministic for a given keypair and message.
    fn sign(&self, keypair: &KeypairBytes, message: &[u8]) -> [u8; 64];

    /// Checks a signature. Returns `false` for malformed keys or signatures
    /// instead of failing.
    fn verify(&self, pubkey: &[u8], signature: &[u8], message: &[u8]) -> bool;
}

/// [`CryptoDriver`] backed by `sha2` and `ed25519-dalek`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519CryptoDriver;

impl CryptoDriver for Ed25519CryptoDriver {
    fn sha256(&self, input: &[u8]) -> [u8; 32] {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(input));
        digest
    }

    fn generate_keypair_bytes(&self, seed: Option<[u8; 32]>) -> KeypairBytes {
        let signing_key = match seed {
            Some(seed) => SigningKey::from_bytes(&seed),
            None => SigningKey::generate(&mut OsRng),
        };

        KeypairBytes {
            pubkey: signing_key.verifying_key().to_bytes(),
            secret: signing_key.to_bytes(),
        }
    }

    fn sign(&self, keypair: &KeypairBytes, message: &[u8]) -> [u8; 64] {
        SigningKey::from_bytes(&keypair.secret)
            .sign(message)
            .to_bytes()
    }

    fn verify(&self, pubkey: &[u8], signature: &[u8], message: &[u8]) -> bool {
        let Ok(pubkey) = <[u8; 32]>::try_from(pubkey) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&pubkey) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };

        verifying_key.verify(message, &signature).is_ok()
    }
}

/// Builds an author address of the form `@<shortname>.<hex pubkey>`.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Validation`] unless the shortname is exactly
/// four lowercase ASCII letters or digits, starting with a letter.
pub fn encode_author_address(shortname: &str, pubkey: &[u8; 32]) -> DocumentStoreResult<String> {
    let valid = shortname.len() == 4
        && shortname.starts_with(|c: char| c.is_ascii_lowercase())
        && shortname
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !valid {
        return Err(DocumentStoreError::validation(format!(
            "invalid author shortname: {shortname:?}"
        )));
    }

    Ok(format!("@{shortname}.{}", hex::encode(pubkey)))
}

/// Splits an author address into its shortname and public key.
pub fn decode_author_address(address: &str) -> DocumentStoreResult<(String, [u8; 32])> {
    let invalid = || DocumentStoreError::Crypto(format!("invalid author address: {address:?}"));

    let (shortname, pubkey_hex) = address
        .strip_prefix('@')
        .and_then(|rest| rest.split_once('.'))
        .ok_or_else(invalid)?;
    let pubkey = hex::decode(pubkey_hex)
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or_else(invalid)?;

    Ok((shortname.to_string(), pubkey))
}

/// Generates a fresh author identity with the given shortname.
pub fn generate_author_keypair(
    crypto: &dyn CryptoDriver,
    shortname: &str,
) -> DocumentStoreResult<AuthorKeypair> {
    let bytes = crypto.generate_keypair_bytes(None);

    Ok(AuthorKeypair {
        address: encode_author_address(shortname, &bytes.pubkey)?,
        secret: hex::encode(bytes.secret),
    })
}

/// Recovers raw key material from an [`AuthorKeypair`].
///
/// # Errors
///
/// Returns [`DocumentStoreError::Crypto`] when the address or secret cannot be
/// decoded, or when the secret does not belong to the address.
pub fn decode_author_keypair(
    crypto: &dyn CryptoDriver,
    keypair: &AuthorKeypair,
) -> DocumentStoreResult<KeypairBytes> {
    let (_, pubkey) = decode_author_address(&keypair.address)?;
    let secret = hex::decode(&keypair.secret)
        .ok()
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or_else(|| DocumentStoreError::Crypto("invalid author secret".to_string()))?;

    let derived = crypto.generate_keypair_bytes(Some(secret));
    if derived.pubkey != pubkey {
        return Err(DocumentStoreError::Crypto(
            "author secret does not match address".to_string(),
        ));
    }

    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_vectors() {
        let driver = Ed25519CryptoDriver;

        assert_eq!(
            hex::encode(driver.sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hex::encode(driver.sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        // snowman, 3 bytes of UTF-8
        assert_eq!(driver.sha256("\u{2603}".as_bytes()), driver.sha256(&[0xe2, 0x98, 0x83]));
    }

    #[test]
    fn seeded_keypairs_are_deterministic() {
        let driver = Ed25519CryptoDriver;
        let seed = [7u8; 32];

        assert_eq!(
            driver.generate_keypair_bytes(Some(seed)),
            driver.generate_keypair_bytes(Some(seed))
        );
        assert_ne!(
            driver.generate_keypair_bytes(None),
            driver.generate_keypair_bytes(None)
        );
    }

    #[test]
    fn sign_and_verify() {
        let driver = Ed25519CryptoDriver;
        let keypair = driver.generate_keypair_bytes(None);

        let signature = driver.sign(&keypair, b"hello");

        assert_eq!(signature, driver.sign(&keypair, b"hello"));
        assert!(driver.verify(&keypair.pubkey, &signature, b"hello"));
        assert!(!driver.verify(&keypair.pubkey, &signature, b"hellO"));
    }

    #[test]
    fn verify_returns_false_on_garbage() {
        let driver = Ed25519CryptoDriver;
        let keypair = driver.generate_keypair_bytes(None);
        let signature = driver.sign(&keypair, b"hello");

        assert!(!driver.verify(&[1, 2, 3], &signature, b"hello"));
        assert!(!driver.verify(&keypair.pubkey, &signature[..10], b"hello"));
        assert!(!driver.verify(&keypair.pubkey, &[], b""));
    }

    #[test]
    fn author_keypair_round_trip() {
        let driver = Ed25519CryptoDriver;
        let keypair = generate_author_keypair(&driver, "suzy").unwrap();

        assert!(keypair.address.starts_with("@suzy."));
        let bytes = decode_author_keypair(&driver, &keypair).unwrap();
        assert_eq!(decode_author_address(&keypair.address).unwrap().1, bytes.pubkey);

        assert!(generate_author_keypair(&driver, "Suzy").is_err());
        assert!(generate_author_keypair(&driver, "toolong").is_err());
        assert!(decode_author_address("suzy.abcd").is_err());
    }

    #[test]
    fn mismatched_secret_is_rejected() {
        let driver = Ed25519CryptoDriver;
        let a = generate_author_keypair(&driver, "aaaa").unwrap();
        let b = generate_author_keypair(&driver, "bbbb").unwrap();

        let franken = AuthorKeypair {
            address: a.address,
            secret: b.secret,
        };
        assert!(matches!(
            decode_author_keypair(&driver, &franken),
            Err(DocumentStoreError::Crypto(_))
        ));
    }
}
