//! AES-256-CBC payload cipher.
//!
//! The AES key is derived from the user-supplied cipher key: the lowercase
//! hex digest of its SHA-256 hash, truncated to 32 ASCII characters, is used
//! byte-for-byte as the key. The IV is either the fixed legacy value or a
//! per-message random IV prepended to the ciphertext. Wire form is base64.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

use crate::error::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const STATIC_IV: [u8; 16] = *b"0123456789012345";

#[derive(Clone)]
pub struct Cipher {
    key: [u8; 32],
    random_iv: bool,
}

impl Cipher {
    pub fn new(cipher_key: &str, random_iv: bool) -> Self {
        let digest = Sha256::digest(cipher_key.as_bytes());
        let hex = format!("{digest:x}");
        let mut key = [0u8; 32];
        key.copy_from_slice(&hex.as_bytes()[..32]);
        Self { key, random_iv }
    }

    /// Encrypt `plaintext` and return the base64 wire form (IV-prefixed when
    /// random IVs are enabled).
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let iv: [u8; 16] = if self.random_iv {
            rand::random()
        } else {
            STATIC_IV
        };
        let ciphertext =
            Aes256CbcEnc::new(&self.key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        if self.random_iv {
            let mut out = Vec::with_capacity(iv.len() + ciphertext.len());
            out.extend_from_slice(&iv);
            out.extend_from_slice(&ciphertext);
            BASE64.encode(out)
        } else {
            BASE64.encode(ciphertext)
        }
    }

    /// Decrypt a base64 wire string back to plaintext bytes.
    pub fn decrypt(&self, data: &str) -> Result<Vec<u8>, Error> {
        let raw = BASE64.decode(data.trim()).map_err(|_| Error::Decryption)?;
        let (iv, ciphertext): (&[u8], &[u8]) = if self.random_iv {
            if raw.len() < 16 {
                return Err(Error::Decryption);
            }
            raw.split_at(16)
        } else {
            (&STATIC_IV, &raw)
        };
        let mut iv_arr = [0u8; 16];
        iv_arr.copy_from_slice(iv);
        Aes256CbcDec::new(&self.key.into(), &iv_arr.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::Decryption)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("random_iv", &self.random_iv)
            .finish_non_exhaustive()
    }
}
