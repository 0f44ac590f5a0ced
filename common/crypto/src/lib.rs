use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;

/// Errors produced by the common-crypto helpers.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("ciphertext missing nonce")]
    MissingNonce,
    #[error("encryption failure")]
    EncryptFailure,
    #[error("decryption failure")]
    DecryptFailure,
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    #[error("invalid HMAC key length")]
    InvalidMacKey,
}

/// Platform master key used to seal provider credential blobs at rest.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; KEY_LENGTH]>);

impl MasterKey {
    /// Construct a master key from a base64-encoded string.
    pub fn from_base64(value: &str) -> Result<Self, CryptoError> {
        let decoded = BASE64_STANDARD.decode(value.trim())?;
        Self::from_bytes(decoded)
    }

    /// Construct a master key from raw bytes.
    pub fn from_bytes<B>(bytes: B) -> Result<Self, CryptoError>
    where
        B: AsRef<[u8]>,
    {
        let slice = bytes.as_ref();
        if slice.len() != KEY_LENGTH {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: slice.len(),
            });
        }
        let mut array = [0u8; KEY_LENGTH];
        array.copy_from_slice(slice);
        Ok(Self(Zeroizing::new(array)))
    }

    /// Encrypt a plaintext blob using AES-256-GCM. Output is nonce || ciphertext.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher =
            Aes256Gcm::new_from_slice(&*self.0).map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: self.0.len(),
            })?;
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptFailure)?;
        let mut output = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.append(&mut ciphertext);
        Ok(output)
    }

    /// Decrypt a blob previously produced by [`MasterKey::seal`].
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() <= NONCE_LENGTH {
            return Err(CryptoError::MissingNonce);
        }
        let (nonce_bytes, encrypted) = blob.split_at(NONCE_LENGTH);
        let cipher =
            Aes256Gcm::new_from_slice(&*self.0).map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LENGTH,
                actual: self.0.len(),
            })?;
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|_| CryptoError::DecryptFailure)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"***redacted***")
            .finish()
    }
}

/// Generate `n_bytes` of random material from the OS RNG, hex encoded.
pub fn random_hex(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// HMAC-SHA256 over `message`, hex encoded.
pub fn hmac_hex(secret: &[u8], message: &[u8]) -> Result<String, CryptoError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| CryptoError::InvalidMacKey)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time equality for secrets and signatures.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let key = MasterKey::from_bytes([1u8; KEY_LENGTH]).expect("master");
        let blob = key.seal(b"{\"secretKey\":\"sk_test\"}").expect("seal");
        assert_ne!(blob.as_slice(), b"{\"secretKey\":\"sk_test\"}".as_slice());
        let plain = key.open(&blob).expect("open");
        assert_eq!(plain, b"{\"secretKey\":\"sk_test\"}");
    }

    #[test]
    fn open_rejects_truncated_blob() {
        let key = MasterKey::from_bytes([2u8; KEY_LENGTH]).expect("master");
        assert!(key.open(&[0u8; NONCE_LENGTH]).is_err());
    }

    #[test]
    fn base64_master_key_parsing() {
        let raw = [9u8; KEY_LENGTH];
        let encoded = BASE64_STANDARD.encode(raw);
        let parsed = MasterKey::from_base64(&encoded).expect("parse");
        let blob = parsed.seal(b"payload").expect("seal");
        assert_eq!(parsed.open(&blob).expect("open"), b"payload");
    }

    #[test]
    fn random_hex_length_and_charset() {
        let value = random_hex(24);
        assert_eq!(value.len(), 48);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(value, random_hex(24));
    }

    #[test]
    fn hmac_hex_is_deterministic() {
        let a = hmac_hex(b"secret", b"app:org:random").expect("hmac");
        let b = hmac_hex(b"secret", b"app:org:random").expect("hmac");
        let c = hmac_hex(b"secret", b"app:org:other").expect("hmac");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
