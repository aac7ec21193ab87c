//! Signing and encryption collaborator for the mesh engine.
//!
//! The protocol engine consumes cryptography as opaque operations: sign,
//! verify, encrypt, decrypt. This module defines that contract and a
//! default implementation combining Ed25519 signatures with an
//! X25519 + ChaCha20-Poly1305 sealed box for direct-message payloads.
//!
//! # Security Model
//!
//! - Private key material never leaves this module
//! - Signatures are deterministic for the same input
//! - Encrypted payloads are `eph_pub(32) || nonce(12) || ciphertext`,
//!   so each message uses a fresh ephemeral exchange key

use crate::error::{CoreError, CoreResult};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey as ExchangePublicKey, StaticSecret};
use zeroize::Zeroize;

/// Nonce size for ChaCha20-Poly1305 (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Exchange public key size (X25519).
const EXCHANGE_KEY_SIZE: usize = 32;

/// Cryptographic operations consumed by the protocol engine.
///
/// Verification takes the claimed public key explicitly so that content
/// authenticity is always checked against the key embedded in the content,
/// never against transport-level state.
pub trait CryptoProvider: Send + Sync {
    /// Sign a canonical payload with the local identity key.
    fn sign(&self, payload: &[u8]) -> Vec<u8>;

    /// Verify a signature over a canonical payload against a public key.
    fn verify(&self, payload: &[u8], signature: &[u8], public_key: &[u8]) -> bool;

    /// Encrypt a payload for the holder of the given exchange public key.
    fn encrypt(&self, plaintext: &[u8], their_exchange_key: &[u8]) -> CoreResult<Vec<u8>>;

    /// Decrypt a payload sealed to the local exchange key.
    fn decrypt(&self, sealed: &[u8]) -> CoreResult<Vec<u8>>;

    /// Public signing key of the local identity.
    fn public_key(&self) -> Vec<u8>;

    /// Public exchange key of the local identity.
    fn exchange_key(&self) -> Vec<u8>;
}

/// Default crypto provider: Ed25519 + X25519/ChaCha20-Poly1305.
pub struct MeshCrypto {
    signing_key: SigningKey,
    exchange_secret: StaticSecret,
}

impl MeshCrypto {
    /// Generate a fresh identity key pair.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let crypto = Self::from_seed(&seed);
        seed.zeroize();
        crypto
    }

    /// Deterministically derive an identity from a 32-byte seed.
    ///
    /// The exchange secret is derived from the seed's hash so that a
    /// stored seed restores both keys.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);

        let mut exchange_seed = *blake3::hash(seed).as_bytes();
        let exchange_secret = StaticSecret::from(exchange_seed);
        exchange_seed.zeroize();

        Self {
            signing_key,
            exchange_secret,
        }
    }

    /// Restore an identity from stored key bytes.
    pub fn from_key(key_bytes: &[u8]) -> CoreResult<Self> {
        if key_bytes.len() != 32 {
            return Err(CoreError::Crypto(format!(
                "invalid key length: {} (expected 32)",
                key_bytes.len()
            )));
        }

        let mut seed = [0u8; 32];
        seed.copy_from_slice(key_bytes);
        let crypto = Self::from_seed(&seed);
        seed.zeroize();
        Ok(crypto)
    }
}

impl CryptoProvider for MeshCrypto {
    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.signing_key.sign(payload).to_bytes().to_vec()
    }

    fn verify(&self, payload: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let key_bytes: [u8; 32] = match public_key.try_into() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let verifying_key = match VerifyingKey::from_bytes(&key_bytes) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let sig_bytes: [u8; 64] = match signature.try_into() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let signature = Signature::from_bytes(&sig_bytes);
        verifying_key.verify(payload, &signature).is_ok()
    }

    fn encrypt(&self, plaintext: &[u8], their_exchange_key: &[u8]) -> CoreResult<Vec<u8>> {
        let key_bytes: [u8; 32] = their_exchange_key
            .try_into()
            .map_err(|_| CoreError::Crypto("invalid exchange key length".to_string()))?;
        let their_public = ExchangePublicKey::from(key_bytes);

        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = ExchangePublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&their_public);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(shared.as_bytes()));
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| CoreError::Crypto(format!("encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(EXCHANGE_KEY_SIZE + NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(ephemeral_public.as_bytes());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, sealed: &[u8]) -> CoreResult<Vec<u8>> {
        if sealed.len() < EXCHANGE_KEY_SIZE + NONCE_SIZE {
            return Err(CoreError::Crypto("sealed payload too short".to_string()));
        }

        let mut eph_bytes = [0u8; EXCHANGE_KEY_SIZE];
        eph_bytes.copy_from_slice(&sealed[..EXCHANGE_KEY_SIZE]);
        let ephemeral_public = ExchangePublicKey::from(eph_bytes);

        let shared = self.exchange_secret.diffie_hellman(&ephemeral_public);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(shared.as_bytes()));

        let nonce = &sealed[EXCHANGE_KEY_SIZE..EXCHANGE_KEY_SIZE + NONCE_SIZE];
        let ciphertext = &sealed[EXCHANGE_KEY_SIZE + NONCE_SIZE..];

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CoreError::Crypto(format!("decryption failed: {e}")))
    }

    fn public_key(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_bytes().to_vec()
    }

    fn exchange_key(&self) -> Vec<u8> {
        ExchangePublicKey::from(&self.exchange_secret).as_bytes().to_vec()
    }
}
