// title/mod.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Root for the title-security modules: tickets, TMDs, certificates, WADs,
// and the crypto shared between disc images and WAD files.

pub mod cert;
pub mod commonkeys;
pub mod crypto;
pub mod ticket;
pub mod tmd;
pub mod wad;

use std::fmt;

/// The encryption domain of a disc image or WAD. This selects the common key
/// used to wrap the title key and the certificate chain expected to have
/// signed the ticket and TMD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptoType {
    Unknown,
    /// Unencrypted image (RVT-H native storage).
    None,
    Debug,
    Retail,
    Korean,
    Vwii,
    /// Debug-encrypted with valid RSA signatures rather than fakesigning.
    DebugRealSigned,
}

impl CryptoType {
    /// Gets the ticket `common_key_index` value for this domain.
    pub fn common_key_index(&self) -> u8 {
        match self {
            CryptoType::Korean => 1,
            CryptoType::Vwii => 2,
            _ => 0,
        }
    }

    /// Gets whether this domain uses the development common key.
    pub fn is_dev(&self) -> bool {
        matches!(self, CryptoType::Debug | CryptoType::DebugRealSigned)
    }

    /// Gets whether images in this domain are encrypted at all.
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, CryptoType::Unknown | CryptoType::None)
    }
}

impl fmt::Display for CryptoType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CryptoType::Unknown => write!(f, "Unknown"),
            CryptoType::None => write!(f, "None"),
            CryptoType::Debug => write!(f, "Debug"),
            CryptoType::Retail => write!(f, "Retail"),
            CryptoType::Korean => write!(f, "Korean"),
            CryptoType::Vwii => write!(f, "vWii"),
            CryptoType::DebugRealSigned => write!(f, "Debug (realsigned)"),
        }
    }
}
