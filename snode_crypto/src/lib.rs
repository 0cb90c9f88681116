//! Cryptography used by the onion request layer.
//!
//! Every onion layer is an AES-GCM encryption keyed by an X25519 key
//! agreement between a fresh ephemeral key pair and the hop's static key.
//! The shared secret is run through HMAC-SHA256 with the fixed key `LOKI`
//! before use, which is what the storage server network expects.

use aes_gcm::aead::{Aead, AeadCore};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::thread_rng;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

/// Size of the IV prepended to every AES-GCM ciphertext.
pub const IV_SIZE: usize = 12;
/// Size of a symmetric key.
pub const KEY_SIZE: usize = 32;
/// Size of X25519 and ed25519 public keys.
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Size of a detached ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// The HMAC key the network uses to harden the raw ECDH output.
const KEY_DERIVATION_SALT: &[u8] = b"LOKI";

/// Error that can happen during an encryption or decryption.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CryptoError {
    /// Key material has a wrong length or is otherwise malformed.
    #[error("Invalid key material")]
    InvalidKey,
    /// AEAD encryption failed.
    #[error("Encryption failed")]
    Encrypt,
    /// AEAD decryption or authentication failed.
    #[error("Decryption failed")]
    Decrypt,
}

/// Result of encrypting one onion layer. The symmetric key has to be kept
/// around to decrypt the response coming back through the same layer.
#[derive(Clone)]
pub struct EncryptionResult {
    /// `iv || ciphertext` of the layer payload.
    pub ciphertext: Vec<u8>,
    /// Symmetric key the layer was encrypted with.
    pub symmetric_key: [u8; KEY_SIZE],
    /// Public half of the ephemeral key pair used for the key agreement.
    pub ephemeral_public_key: [u8; PUBLIC_KEY_SIZE],
}

/// Derive the symmetric key the network expects from a raw X25519 shared
/// secret.
pub fn derive_symmetric_key(shared_secret: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    // `new_from_slice` exists on both `Mac` and the AES-GCM `KeyInit` in
    // scope here, so the trait has to be named.
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(KEY_DERIVATION_SALT)
        .expect("HMAC accepts any key length");
    mac.update(shared_secret);
    mac.finalize().into_bytes().into()
}

/// Encrypt `plaintext` with AES-GCM under `key`, prepending the random IV.
pub fn encrypt_with_key(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let iv = Aes256Gcm::generate_nonce(&mut thread_rng());
    let ciphertext = cipher.encrypt(&iv, plaintext).map_err(|_| CryptoError::Encrypt)?;
    let mut result = Vec::with_capacity(IV_SIZE + ciphertext.len());
    result.extend_from_slice(&iv);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt an `iv || ciphertext` blob produced by `encrypt_with_key`.
pub fn decrypt_with_key(
    iv_and_ciphertext: &[u8],
    key: &[u8; KEY_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    if iv_and_ciphertext.len() <= IV_SIZE {
        return Err(CryptoError::Decrypt);
    }
    let (iv, ciphertext) = iv_and_ciphertext.split_at(IV_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Encrypt `plaintext` for the holder of `recipient_x25519` using a fresh
/// ephemeral key pair. Key material is never reused across calls.
pub fn encrypt_for_recipient(
    plaintext: &[u8],
    recipient_x25519: &[u8; PUBLIC_KEY_SIZE],
) -> Result<EncryptionResult, CryptoError> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(thread_rng());
    let ephemeral_public_key = X25519PublicKey::from(&ephemeral_secret);
    let shared_secret = ephemeral_secret.diffie_hellman(&X25519PublicKey::from(*recipient_x25519));
    let symmetric_key = derive_symmetric_key(shared_secret.as_bytes());
    let ciphertext = encrypt_with_key(plaintext, &symmetric_key)?;
    Ok(EncryptionResult {
        ciphertext,
        symmetric_key,
        ephemeral_public_key: ephemeral_public_key.to_bytes(),
    })
}

/// Long-term user identity: an ed25519 signing key plus the X25519 key the
/// account id is derived from.
#[derive(Clone)]
pub struct IdentityKeys {
    signing_key: SigningKey,
}

impl IdentityKeys {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        IdentityKeys {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore an identity from a 32-byte ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        IdentityKeys {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Hex encoded ed25519 public key, as sent in `pubkey_ed25519`
    /// parameters.
    pub fn ed25519_public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// The account id the network stores data under: `05` followed by the
    /// hex of the X25519 conversion of the ed25519 public key.
    pub fn account_id(&self) -> String {
        let montgomery = self.signing_key.verifying_key().to_montgomery();
        format!("05{}", hex::encode(montgomery.to_bytes()))
    }

    /// Detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify a detached ed25519 signature. Malformed keys or signatures verify
/// as false rather than erroring, since they come straight off the wire.
pub fn verify_detached(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    message: &[u8],
    signature: &[u8],
) -> bool {
    let verifying_key = match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let signature = match Signature::from_slice(signature) {
        Ok(signature) => signature,
        Err(_) => return false,
    };
    verifying_key.verify(message, &signature).is_ok()
}
