//! Manifest decryption
//!
//! Encrypted manifests are AES-CBC with PKCS#7 padding. The key length
//! selects AES-128, AES-192 or AES-256. The IV is either fixed or carried
//! in the first block of the payload.
//!
//! Payloads downloaded from the server may carry stray leading bytes; any
//! excess that keeps the ciphertext from aligning to the block size is
//! trimmed from the front before decrypting.

use crate::error::DecryptError;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;

/// Cipher block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Where the IV comes from
#[derive(Clone, PartialEq, Eq)]
enum IvSource {
    Fixed([u8; BLOCK_SIZE]),
    Embedded,
}

/// Stateless AES-CBC unwrap step
#[derive(Clone, PartialEq, Eq)]
pub struct Decryptor {
    key: Vec<u8>,
    iv: IvSource,
}

// key material stays out of logs
impl fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decryptor")
            .field("key_bits", &(self.key.len() * 8))
            .field("embedded_iv", &matches!(self.iv, IvSource::Embedded))
            .finish()
    }
}

impl Decryptor {
    /// Decryptor with a fixed IV
    ///
    /// # Errors
    /// Returns `DecryptError::InvalidKeyLength` unless the key is 16, 24 or
    /// 32 bytes and the IV is 16 bytes
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, DecryptError> {
        let invalid = || DecryptError::InvalidKeyLength {
            key: key.len(),
            iv: iv.len(),
        };
        check_key(key).map_err(|()| invalid())?;
        let iv: [u8; BLOCK_SIZE] = iv.try_into().map_err(|_| invalid())?;
        Ok(Self {
            key: key.to_vec(),
            iv: IvSource::Fixed(iv),
        })
    }

    /// Decryptor that reads the IV from the first block of each payload
    ///
    /// # Errors
    /// Returns `DecryptError::InvalidKeyLength` for an unsupported key length
    pub fn with_embedded_iv(key: &[u8]) -> Result<Self, DecryptError> {
        check_key(key).map_err(|()| DecryptError::InvalidKeyLength {
            key: key.len(),
            iv: BLOCK_SIZE,
        })?;
        Ok(Self {
            key: key.to_vec(),
            iv: IvSource::Embedded,
        })
    }

    /// Decryptor from hex-encoded key and optional IV (`None` = embedded)
    ///
    /// # Errors
    /// Returns `DecryptError::InvalidHex` or `DecryptError::InvalidKeyLength`
    pub fn from_hex(key: &str, iv: Option<&str>) -> Result<Self, DecryptError> {
        let key = hex::decode(key)?;
        match iv {
            Some(iv) => Self::new(&key, &hex::decode(iv)?),
            None => Self::with_embedded_iv(&key),
        }
    }

    /// Decrypt a payload and strip its padding
    ///
    /// # Errors
    /// Returns `DecryptError::TooShort` if no full block remains after
    /// alignment, or `DecryptError::Padding` if the padding is malformed
    pub fn process(&self, payload: &[u8]) -> Result<Vec<u8>, DecryptError> {
        let (iv, ciphertext) = match &self.iv {
            IvSource::Fixed(iv) => (*iv, payload),
            IvSource::Embedded => {
                if payload.len() < BLOCK_SIZE {
                    return Err(DecryptError::TooShort { len: payload.len() });
                }
                let (head, rest) = payload.split_at(BLOCK_SIZE);
                let mut iv = [0u8; BLOCK_SIZE];
                iv.copy_from_slice(head);
                (iv, rest)
            }
        };

        let aligned = &ciphertext[ciphertext.len() % BLOCK_SIZE..];
        if aligned.is_empty() {
            return Err(DecryptError::TooShort { len: ciphertext.len() });
        }

        let invalid = |_| DecryptError::InvalidKeyLength {
            key: self.key.len(),
            iv: BLOCK_SIZE,
        };
        let plain = match self.key.len() {
            16 => cbc::Decryptor::<Aes128>::new_from_slices(&self.key, &iv)
                .map_err(invalid)?
                .decrypt_padded_vec_mut::<Pkcs7>(aligned),
            24 => cbc::Decryptor::<Aes192>::new_from_slices(&self.key, &iv)
                .map_err(invalid)?
                .decrypt_padded_vec_mut::<Pkcs7>(aligned),
            _ => cbc::Decryptor::<Aes256>::new_from_slices(&self.key, &iv)
                .map_err(invalid)?
                .decrypt_padded_vec_mut::<Pkcs7>(aligned),
        };
        plain.map_err(|_| DecryptError::Padding)
    }
}

fn check_key(key: &[u8]) -> Result<(), ()> {
    match key.len() {
        16 | 24 | 32 => Ok(()),
        _ => Err(()),
    }
}

/// Passphrase-to-key derivations used by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyDerivation {
    /// 32-byte SHA-256 digest (AES-256 keys)
    Sha256,
    /// 16-byte MD5 digest (AES-128 keys and IVs)
    Md5,
}

impl KeyDerivation {
    #[must_use]
    pub fn derive(self, passphrase: &str) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(passphrase.as_bytes()).to_vec(),
            Self::Md5 => Md5::digest(passphrase.as_bytes()).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    fn encrypt(key: &[u8], iv: &[u8], plain: &[u8]) -> Vec<u8> {
        match key.len() {
            16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
                .unwrap()
                .encrypt_padded_vec_mut::<Pkcs7>(plain),
            _ => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
                .unwrap()
                .encrypt_padded_vec_mut::<Pkcs7>(plain),
        }
    }

    const IV: [u8; 16] = *b"0123456789abcdef";

    #[test]
    fn round_trip_single_block() {
        let key = KeyDerivation::Md5.derive("passphrase");
        let plain = b"short";
        let dec = Decryptor::new(&key, &IV).unwrap();
        assert_eq!(dec.process(&encrypt(&key, &IV, plain)).unwrap(), plain);
    }

    #[test]
    fn round_trip_multi_block() {
        let key = KeyDerivation::Sha256.derive("passphrase");
        let plain: Vec<u8> = (0..=200u8).collect();
        let dec = Decryptor::new(&key, &IV).unwrap();
        assert_eq!(dec.process(&encrypt(&key, &IV, &plain)).unwrap(), plain);
    }

    #[test]
    fn leading_excess_bytes_are_trimmed() {
        let key = KeyDerivation::Md5.derive("k");
        let mut payload = vec![0x01];
        payload.extend(encrypt(&key, &IV, b"manifest body that spans blocks"));
        let dec = Decryptor::new(&key, &IV).unwrap();
        assert_eq!(dec.process(&payload).unwrap(), b"manifest body that spans blocks");
    }

    #[test]
    fn embedded_iv_is_read_from_first_block() {
        let key = KeyDerivation::Sha256.derive("k");
        let mut payload = IV.to_vec();
        payload.extend(encrypt(&key, &IV, b"hello"));
        let dec = Decryptor::with_embedded_iv(&key).unwrap();
        assert_eq!(dec.process(&payload).unwrap(), b"hello");
    }

    #[test]
    fn wrong_key_fails_loudly() {
        let key = KeyDerivation::Md5.derive("right");
        let wrong = KeyDerivation::Md5.derive("wrong");
        let payload = encrypt(&key, &IV, b"some plaintext");
        let result = Decryptor::new(&wrong, &IV).unwrap().process(&payload);
        // a wrong key almost always breaks the padding
        assert!(matches!(result, Err(DecryptError::Padding)) || result.unwrap() != b"some plaintext");
    }

    #[test]
    fn rejects_bad_lengths() {
        assert_eq!(
            Decryptor::new(&[0u8; 15], &IV).unwrap_err(),
            DecryptError::InvalidKeyLength { key: 15, iv: 16 }
        );
        assert!(Decryptor::new(&[0u8; 16], &[0u8; 8]).is_err());
        let dec = Decryptor::new(&[0u8; 16], &IV).unwrap();
        assert_eq!(dec.process(&[1, 2, 3]).unwrap_err(), DecryptError::TooShort { len: 3 });
    }

    #[test]
    fn from_hex_parses_material() {
        let dec = Decryptor::from_hex("00112233445566778899aabbccddeeff", Some("000102030405060708090a0b0c0d0e0f"));
        assert!(dec.is_ok());
        assert!(matches!(
            Decryptor::from_hex("zz", None),
            Err(DecryptError::InvalidHex(_))
        ));
    }

    #[test]
    fn debug_hides_key() {
        let dec = Decryptor::new(&[7u8; 16], &IV).unwrap();
        let text = format!("{dec:?}");
        assert!(text.contains("key_bits: 128"));
        assert!(!text.contains("[7, 7"));
    }
}
