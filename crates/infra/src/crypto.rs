//! Field-level encryption for OAuth tokens at rest.
//!
//! AES-256-CBC with PKCS#7 padding and a fresh random IV per call. The stored form
//! is `base64(IV || ciphertext)`, standard alphabet with padding. The key is the
//! SHA-256 digest of the configured secret, derived once in [`TokenCipher::new`].
//!
//! Decryption failures are fatal: they mean either the wrong key is configured or the
//! stored value is corrupt. Callers propagate them and never retry.

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

use crate::config::EncryptionConfig;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption secret must not be empty")]
    EmptySecret,

    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("ciphertext is not valid base64: {0}")]
    Encoding(String),

    #[error("ciphertext is malformed: {0}")]
    Malformed(String),

    /// Bad padding after decryption; almost always a key mismatch.
    #[error("decryption failed")]
    Decrypt,

    #[error("decrypted value is not valid UTF-8")]
    Utf8,
}

/// Symmetric cipher for token columns. Sole owner of the key material.
///
/// Build once at process start and share it (`Arc<TokenCipher>`); it is immutable.
pub struct TokenCipher {
    key: [u8; KEY_LEN],
}

impl TokenCipher {
    /// Derive the key from the configured secret.
    pub fn new(config: &EncryptionConfig) -> Result<Self, CryptoError> {
        if config.secret().is_empty() {
            return Err(CryptoError::EmptySecret);
        }
        let key: [u8; KEY_LEN] = Sha256::digest(config.secret().as_bytes()).into();
        Ok(Self { key })
    }

    /// Use raw key bytes as-is (must be exactly 32 bytes).
    pub fn from_key(key: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
        Ok(Self { key })
    }

    /// Encrypt an optional value; `None` passes through.
    pub fn encrypt(&self, plaintext: Option<&str>) -> Result<Option<String>, CryptoError> {
        plaintext.map(|p| self.encrypt_str(p)).transpose()
    }

    /// Decrypt an optional value; `None` passes through.
    pub fn decrypt(&self, ciphertext: Option<&str>) -> Result<Option<String>, CryptoError> {
        ciphertext.map(|c| self.decrypt_str(c)).transpose()
    }

    pub fn encrypt_str(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let encryptor = Aes256CbcEnc::new_from_slices(&self.key, &iv)
            .map_err(|_| CryptoError::InvalidKeyLength(self.key.len()))?;
        let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut combined = Vec::with_capacity(IV_LEN + ciphertext.len());
        combined.extend_from_slice(&iv);
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    pub fn decrypt_str(&self, encoded: &str) -> Result<String, CryptoError> {
        let combined = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;

        if combined.len() < IV_LEN + BLOCK_LEN {
            return Err(CryptoError::Malformed(format!(
                "expected at least {} bytes, got {}",
                IV_LEN + BLOCK_LEN,
                combined.len()
            )));
        }
        let (iv, body) = combined.split_at(IV_LEN);
        if body.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::Malformed(format!(
                "ciphertext length {} is not a multiple of {BLOCK_LEN}",
                body.len()
            )));
        }

        let decryptor = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| CryptoError::InvalidKeyLength(self.key.len()))?;
        let plaintext = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Utf8)
    }
}

impl Drop for TokenCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl core::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCipher").field("key", &"<redacted>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> TokenCipher {
        TokenCipher::new(&EncryptionConfig::new("unit-test-secret")).unwrap()
    }

    #[test]
    fn roundtrip() {
        let c = cipher();
        let encrypted = c.encrypt_str("AT1").unwrap();
        assert_ne!(encrypted, "AT1");
        assert_eq!(c.decrypt_str(&encrypted).unwrap(), "AT1");
    }

    #[test]
    fn none_passes_through() {
        let c = cipher();
        assert_eq!(c.encrypt(None).unwrap(), None);
        assert_eq!(c.decrypt(None).unwrap(), None);
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let c = cipher();
        let a = c.encrypt_str("RT1").unwrap();
        let b = c.encrypt_str("RT1").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.decrypt_str(&a).unwrap(), "RT1");
        assert_eq!(c.decrypt_str(&b).unwrap(), "RT1");
    }

    #[test]
    fn stored_form_is_iv_then_whole_blocks() {
        let c = cipher();
        let encoded = c.encrypt_str("").unwrap();
        let raw = STANDARD.decode(encoded).unwrap();
        // Empty plaintext still pads to one full block.
        assert_eq!(raw.len(), IV_LEN + BLOCK_LEN);

        let encoded = c.encrypt_str("0123456789abcdef").unwrap();
        let raw = STANDARD.decode(encoded).unwrap();
        assert_eq!(raw.len(), IV_LEN + 2 * BLOCK_LEN);
    }

    #[test]
    fn same_secret_derives_same_key() {
        let a = cipher();
        let b = cipher();
        let encrypted = a.encrypt_str("shared").unwrap();
        assert_eq!(b.decrypt_str(&encrypted).unwrap(), "shared");
    }

    #[test]
    fn wrong_key_fails() {
        let a = cipher();
        let b = TokenCipher::new(&EncryptionConfig::new("another-secret")).unwrap();
        let encrypted = a.encrypt_str("a fairly long access token value").unwrap();
        // A wrong key yields garbage that (almost always) fails padding or UTF-8 checks.
        match b.decrypt_str(&encrypted) {
            Err(CryptoError::Decrypt) | Err(CryptoError::Utf8) => {}
            Ok(garbage) => assert_ne!(garbage, "a fairly long access token value"),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_input_fails() {
        let c = cipher();
        assert!(matches!(
            c.decrypt_str("not base64 !!"),
            Err(CryptoError::Encoding(_))
        ));
        assert!(matches!(
            c.decrypt_str(&STANDARD.encode([0u8; 20])),
            Err(CryptoError::Malformed(_))
        ));
        assert!(matches!(
            c.decrypt_str(&STANDARD.encode([0u8; IV_LEN + BLOCK_LEN + 3])),
            Err(CryptoError::Malformed(_))
        ));
    }

    #[test]
    fn key_length_is_checked() {
        assert_eq!(
            TokenCipher::from_key(&[0u8; 16]).unwrap_err(),
            CryptoError::InvalidKeyLength(16)
        );
        assert!(TokenCipher::from_key(&[7u8; KEY_LEN]).is_ok());
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(
            TokenCipher::new(&EncryptionConfig::new("")).unwrap_err(),
            CryptoError::EmptySecret
        );
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: decrypt(encrypt(x)) == x for any string, and two encryptions differ.
            #[test]
            fn decrypt_inverts_encrypt(plaintext in ".{0,200}") {
                let c = cipher();
                let first = c.encrypt_str(&plaintext).unwrap();
                let second = c.encrypt_str(&plaintext).unwrap();

                prop_assert_ne!(&first, &second);
                prop_assert_eq!(c.decrypt_str(&first).unwrap(), plaintext.clone());
                prop_assert_eq!(c.decrypt_str(&second).unwrap(), plaintext);
            }
        }
    }
}
