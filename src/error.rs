// error.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Crate-level error type covering both POSIX-style I/O failures and the
// semantic errors produced while working with RVT-H bank tables and disc images.

use std::io;
use thiserror::Error;

/// Errors that can occur while operating on an RVT-H disk image, a standalone
/// disc image, or a WAD file. Semantic errors carry stable positive codes and
/// I/O errors are reported as negative POSIX codes, matching the historical
/// convention used by external tools.
#[derive(Debug, Error)]
pub enum RvtHError {
    #[error("Unrecognized file format")]
    UnrecognizedFile,
    #[error("Bank table magic is incorrect")]
    NhcdTableMagic,
    #[error("No banks found")]
    NoBanks,
    #[error("Bank status is unknown")]
    BankUnknown,
    #[error("Bank is empty")]
    BankEmpty,
    #[error("Bank is second bank of a dual-layer image")]
    BankDl2,
    #[error("Operation can only be performed on a device, not an image file")]
    NotADevice,
    #[error("Bank is deleted")]
    BankIsDeleted,
    #[error("Bank is not deleted")]
    BankNotDeleted,
    #[error("RVT-H object is not an HDD image")]
    NotHddImage,
    #[error("Wii game partition not found")]
    NoGamePartition,
    #[error("RVT-H bank count field is invalid")]
    InvalidBankCount,
    #[error("Operation cannot be performed on devices or HDD images")]
    IsHddImage,
    #[error("Cannot import a retail-encrypted Wii game")]
    IsRetailCrypto,
    #[error("Source image does not fit in an RVT-H bank")]
    ImageTooBig,
    #[error("Destination bank is not empty or deleted")]
    BankNotEmptyOrDeleted,
    #[error("Wii-specific operation was requested on a non-Wii image")]
    NotWiiImage,
    #[error("Image is unencrypted")]
    IsUnencrypted,
    #[error("Image is encrypted")]
    IsEncrypted,
    #[error("Wii partition table is corrupted")]
    PartitionTableCorrupted,
    #[error("At least one Wii partition header is corrupted")]
    PartitionHeaderCorrupted,
    #[error("Certificate has an unknown issuer")]
    IssuerUnknown,
    #[error("Extended Bank Table: Cannot use Bank 1 for a Dual-Layer image.")]
    ImportDlExtNoBank1,
    #[error("Cannot use the last bank for a Dual-Layer image")]
    ImportDlLastBank,
    #[error("The second bank for the Dual-Layer image is not empty or deleted")]
    Bank2DlNotEmptyOrDeleted,
    #[error("The two banks are not contiguous")]
    ImportDlNotContiguous,
    #[error("NDEV headers for GCN are currently unsupported.")]
    NdevGcnNotSupported,
    #[error("Bank number is out of range")]
    BankOutOfRange,
    #[error("Operation canceled")]
    Canceled,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, RvtHError>;

impl RvtHError {
    /// Reprojects the error onto the historical numeric convention: positive
    /// codes for semantic errors and negative POSIX errno values for I/O
    /// failures. Success is 0 by definition and never produced here.
    pub fn code(&self) -> i32 {
        match self {
            RvtHError::UnrecognizedFile => 1,
            RvtHError::NhcdTableMagic => 2,
            RvtHError::NoBanks => 3,
            RvtHError::BankUnknown => 4,
            RvtHError::BankEmpty => 5,
            RvtHError::BankDl2 => 6,
            RvtHError::NotADevice => 7,
            RvtHError::BankIsDeleted => 8,
            RvtHError::BankNotDeleted => 9,
            RvtHError::NotHddImage => 10,
            RvtHError::NoGamePartition => 11,
            RvtHError::InvalidBankCount => 12,
            RvtHError::IsHddImage => 13,
            RvtHError::IsRetailCrypto => 14,
            RvtHError::ImageTooBig => 15,
            RvtHError::BankNotEmptyOrDeleted => 16,
            RvtHError::NotWiiImage => 17,
            RvtHError::IsUnencrypted => 18,
            RvtHError::IsEncrypted => 19,
            RvtHError::PartitionTableCorrupted => 20,
            RvtHError::PartitionHeaderCorrupted => 21,
            RvtHError::IssuerUnknown => 22,
            RvtHError::ImportDlExtNoBank1 => 23,
            RvtHError::ImportDlLastBank => 24,
            RvtHError::Bank2DlNotEmptyOrDeleted => 25,
            RvtHError::ImportDlNotContiguous => 26,
            RvtHError::NdevGcnNotSupported => 27,
            // POSIX errors are negative. ERANGE and ECANCELED are fixed by
            // the wire convention; everything else comes from the OS.
            RvtHError::BankOutOfRange => -34,
            RvtHError::Canceled => -125,
            RvtHError::Io(e) => -e.raw_os_error().unwrap_or(5),
        }
    }

    /// Builds an EIO-flavored error for short reads/writes and other cases
    /// where the OS did not supply a specific errno.
    pub fn eio() -> RvtHError {
        RvtHError::Io(io::Error::from_raw_os_error(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_codes_are_stable() {
        assert_eq!(RvtHError::UnrecognizedFile.code(), 1);
        assert_eq!(RvtHError::NhcdTableMagic.code(), 2);
        assert_eq!(RvtHError::InvalidBankCount.code(), 12);
        assert_eq!(RvtHError::ImportDlLastBank.code(), 24);
        assert_eq!(RvtHError::NdevGcnNotSupported.code(), 27);
    }

    #[test]
    fn test_io_codes_are_negative() {
        assert!(RvtHError::eio().code() < 0);
        assert_eq!(RvtHError::BankOutOfRange.code(), -34);
        assert_eq!(RvtHError::Canceled.code(), -125);
    }

    #[test]
    fn test_error_strings_match_table() {
        assert_eq!(RvtHError::NhcdTableMagic.to_string(), "Bank table magic is incorrect");
        assert_eq!(RvtHError::BankDl2.to_string(), "Bank is second bank of a dual-layer image");
        assert_eq!(
            RvtHError::Bank2DlNotEmptyOrDeleted.to_string(),
            "The second bank for the Dual-Layer image is not empty or deleted"
        );
    }
}
