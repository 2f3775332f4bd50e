// title/commonkeys.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth

use crate::title::CryptoType;

const COMMON_KEY: &str = "ebe42a225e8593e448d9c5457381aaf7";
const KOREAN_KEY: &str = "63b82bb4f4614e2e13f2fefbba4c9b7e";
const VWII_KEY: &str = "30bfc76e7c19afbb23163330ced7c28d";
const DEV_COMMON_KEY: &str = "a1604a6a7123b529ae8bec32c816fcaa";

/// Returns the common key for the specified index. Providing true for is_dev
/// will make index 0 return the development common key instead of the retail
/// common key.
pub fn get_common_key(index: u8, is_dev: bool) -> [u8; 16] {
    let selected_key = match index {
        1 => KOREAN_KEY,
        2 => VWII_KEY,
        _ => {
            if is_dev {
                DEV_COMMON_KEY
            } else {
                COMMON_KEY
            }
        }
    };
    hex::decode(selected_key).unwrap().try_into().unwrap()
}

/// Returns the common key that wraps title keys in the given encryption
/// domain. Unknown/unencrypted domains fall back on the retail common key.
pub fn common_key_for(crypto: CryptoType) -> [u8; 16] {
    get_common_key(crypto.common_key_index(), crypto.is_dev())
}
