// title/crypto.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements the common crypto functions required to handle Wii content and
// disc partition encryption.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::cipher::block_padding::{NoPadding, ZeroPadding};
use crate::title::commonkeys::common_key_for;
use crate::title::CryptoType;

pub type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
pub type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

// Convert a Title ID into the format required for use as the Title Key decryption IV.
fn title_id_to_iv(title_id: [u8; 8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&title_id);
    iv
}

/// Decrypts a Title Key wrapped with the common key of the given domain, using
/// the corresponding Title ID as the IV.
pub fn decrypt_title_key(title_key_enc: [u8; 16], crypto: CryptoType, title_id: [u8; 8]) -> [u8; 16] {
    let iv = title_id_to_iv(title_id);
    let decryptor = Aes128CbcDec::new(&common_key_for(crypto).into(), &iv.into());
    let mut title_key = title_key_enc;
    decryptor.decrypt_padded_mut::<ZeroPadding>(&mut title_key).unwrap();
    title_key
}

/// Encrypts a Title Key with the common key of the given domain, using the
/// corresponding Title ID as the IV.
pub fn encrypt_title_key(title_key_dec: [u8; 16], crypto: CryptoType, title_id: [u8; 8]) -> [u8; 16] {
    let iv = title_id_to_iv(title_id);
    let encryptor = Aes128CbcEnc::new(&common_key_for(crypto).into(), &iv.into());
    let mut title_key = title_key_dec;
    encryptor.encrypt_padded_mut::<ZeroPadding>(&mut title_key, 16).unwrap();
    title_key
}

/// Builds the IV for WAD content crypto: the big-endian content index followed
/// by zeroes.
pub fn content_iv(index: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..2].copy_from_slice(&index.to_be_bytes());
    iv
}

/// Decrypt content using the corresponding Title Key and content index.
pub fn decrypt_content(data: &[u8], title_key: [u8; 16], index: u16) -> Vec<u8> {
    let iv = content_iv(index);
    let decryptor = Aes128CbcDec::new(&title_key.into(), &iv.into());
    let mut buf = data.to_owned();
    decryptor.decrypt_padded_mut::<ZeroPadding>(&mut buf).unwrap();
    buf
}

/// Encrypt content using the corresponding Title Key and content index.
pub fn encrypt_content(data: &[u8], title_key: [u8; 16], index: u16, size: u64) -> Vec<u8> {
    let iv = content_iv(index);
    let encryptor = Aes128CbcEnc::new(&title_key.into(), &iv.into());
    let mut buf = data.to_owned();
    let size = (size + 15) & !15;
    buf.resize(size as usize, 0);
    encryptor.encrypt_padded_mut::<ZeroPadding>(&mut buf, size as usize).unwrap();
    buf
}

/// AES-128-CBC encrypts a buffer in place. The buffer length must be a
/// multiple of 16.
pub fn cbc_encrypt_in_place(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let len = data.len();
    let encryptor = Aes128CbcEnc::new(key.into(), iv.into());
    encryptor.encrypt_padded_mut::<NoPadding>(data, len).unwrap();
}

/// AES-128-CBC decrypts a buffer in place. The buffer length must be a
/// multiple of 16.
pub fn cbc_decrypt_in_place(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let decryptor = Aes128CbcDec::new(key.into(), iv.into());
    decryptor.decrypt_padded_mut::<NoPadding>(data).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_key_round_trip() {
        let title_id = [0x00, 0x01, 0x00, 0x00, 0x52, 0x5A, 0x44, 0x45];
        let key = [0x42u8; 16];
        for crypto in [CryptoType::Retail, CryptoType::Korean, CryptoType::Vwii, CryptoType::Debug] {
            let enc = encrypt_title_key(key, crypto, title_id);
            assert_ne!(enc, key);
            assert_eq!(decrypt_title_key(enc, crypto, title_id), key);
        }
    }

    #[test]
    fn test_content_round_trip() {
        let title_key = [0x13u8; 16];
        let data = vec![0xA5u8; 4096];
        let enc = encrypt_content(&data, title_key, 2, 4096);
        let dec = decrypt_content(&enc, title_key, 2);
        assert_eq!(dec, data);
    }

    #[test]
    fn test_cbc_in_place_round_trip() {
        let key = [0x77u8; 16];
        let iv = [0x01u8; 16];
        let mut data = (0u8..=255).collect::<Vec<u8>>();
        let orig = data.clone();
        cbc_encrypt_in_place(&key, &iv, &mut data);
        assert_ne!(data, orig);
        cbc_decrypt_in_place(&key, &iv, &mut data);
        assert_eq!(data, orig);
    }
}
