/// Symmetric payload encryption for the vault.
///
/// AES-256-CBC with PKCS#7 padding. Every call to [`encrypt`] draws a
/// fresh 16-byte IV from the thread-local CSPRNG and prepends it:
/// the wire form is `iv || ciphertext`.
///
/// CBC is not authenticated. Decrypting with the wrong key either fails
/// on padding or yields garbage; it never reports "wrong key" as such.
use std::fmt;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// CBC initialization vector length in bytes.
pub const IV_LEN: usize = 16;

/// Fixed fallback key (64 hex chars). Public knowledge, not a secret.
///
/// Exists so the vault can be constructed without configuration. Any
/// networked deployment running on it is misconfigured; the embedding
/// binary must warn when [`EncryptionKey::is_placeholder`] is true.
pub const PLACEHOLDER_KEY_HEX: &str =
    "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

const PLACEHOLDER_KEY: [u8; KEY_LEN] = [0xaa; KEY_LEN];

/// A validated 32-byte AES-256 key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Accept exactly [`KEY_LEN`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                got: bytes.len(),
            })?;
        Ok(Self(key))
    }

    /// Decode a hex string that must yield exactly [`KEY_LEN`] bytes.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// The fixed fallback key. See [`PLACEHOLDER_KEY_HEX`].
    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_KEY)
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_KEY
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            f.write_str("EncryptionKey(placeholder)")
        } else {
            f.write_str("EncryptionKey(..)")
        }
    }
}

/// Encrypt `plaintext` under `key`, returning `iv || ciphertext`.
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CryptoError::Cipher(format!("encryption setup failed: {e}")))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt an `iv || ciphertext` blob produced by [`encrypt`].
///
/// Blobs shorter than [`IV_LEN`] fail with `InvalidCiphertext`; padding
/// or block-alignment failures surface as `Cipher`.
pub fn decrypt(blob: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < IV_LEN {
        return Err(CryptoError::InvalidCiphertext { len: blob.len() });
    }
    let (iv, ciphertext) = blob.split_at(IV_LEN);

    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| CryptoError::Cipher(format!("decryption setup failed: {e}")))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Cipher("decryption failed: bad padding or block size".into()))
}

/// Encryption codec bound to one key.
///
/// Constructed once from configuration and shared by reference; the key
/// is validated at construction so no cryptographic call ever sees a
/// malformed key.
#[derive(Clone, Debug)]
pub struct CryptoCodec {
    key: EncryptionKey,
}

impl CryptoCodec {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Build from a hex-encoded key (fails fast on bad hex or length).
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        EncryptionKey::from_hex(hex_key).map(Self::new)
    }

    /// Codec on the fixed fallback key.
    pub fn with_placeholder_key() -> Self {
        Self::new(EncryptionKey::placeholder())
    }

    pub fn uses_placeholder_key(&self) -> bool {
        self.key.is_placeholder()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        encrypt(plaintext, &self.key)
    }

    /// Decrypt with the codec's own key.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        decrypt(blob, &self.key)
    }

    /// Decrypt with a caller-supplied key instead of the codec's.
    pub fn decrypt_with(&self, blob: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, CryptoError> {
        decrypt(blob, key)
    }
}

impl Default for CryptoCodec {
    fn default() -> Self {
        Self::with_placeholder_key()
    }
}
