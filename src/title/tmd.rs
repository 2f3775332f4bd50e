// title/tmd.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements the structures and methods required for TMD parsing and
// re-signing.

use std::io::{Cursor, Read, Write};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rsa::RsaPrivateKey;
use sha1::{Digest, Sha1};
use thiserror::Error;
use crate::title::cert::{self, CertIssuer, SIG_TYPE_RSA2048};

/// Size of the TMD header on disc, up to the content records.
pub const TMD_HEADER_SIZE: usize = 0x1E4;
/// Size of one content record.
pub const CONTENT_RECORD_SIZE: usize = 0x24;

#[derive(Debug, Error)]
pub enum TmdError {
    #[error("TMD data could not be fakesigned")]
    CannotFakesign,
    #[error("TMD could not be signed with the provided key")]
    SigningFailed,
    #[error("TMD data is not in a valid format")]
    IO(#[from] std::io::Error),
}

/// A structure that represents the metadata of one content in a Wii title.
#[derive(Debug, Clone)]
pub struct ContentRecord {
    pub content_id: u32,
    pub index: u16,
    pub content_type: u16,
    pub content_size: u64,
    pub content_hash: [u8; 20],
}

/// A structure that represents a Wii TMD (Title Metadata).
#[derive(Debug, Clone)]
pub struct Tmd {
    signature_type: u32,
    signature: [u8; 256],
    padding1: [u8; 60],
    signature_issuer: [u8; 64],
    tmd_version: u8,
    ca_crl_version: u8,
    signer_crl_version: u8,
    is_vwii: u8,
    sys_version: u64,
    title_id: [u8; 8],
    title_type: [u8; 4],
    group_id: u16,
    padding2: [u8; 2],
    region: u16,
    ratings: [u8; 16],
    reserved1: [u8; 12],
    ipc_mask: [u8; 12],
    reserved2: [u8; 18],
    access_rights: u32,
    title_version: u16,
    num_contents: u16,
    boot_index: u16,
    minor_version: u16, // Normally unused, but useful when fakesigning.
    content_records: Vec<ContentRecord>,
}

impl Tmd {
    /// Creates a new Tmd instance from the binary data of a TMD.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TmdError> {
        let mut buf = Cursor::new(data);
        let signature_type = buf.read_u32::<BigEndian>()?;
        let mut signature = [0u8; 256];
        buf.read_exact(&mut signature)?;
        let mut padding1 = [0u8; 60];
        buf.read_exact(&mut padding1)?;
        let mut signature_issuer = [0u8; 64];
        buf.read_exact(&mut signature_issuer)?;
        let tmd_version = buf.read_u8()?;
        let ca_crl_version = buf.read_u8()?;
        let signer_crl_version = buf.read_u8()?;
        let is_vwii = buf.read_u8()?;
        let sys_version = buf.read_u64::<BigEndian>()?;
        let mut title_id = [0u8; 8];
        buf.read_exact(&mut title_id)?;
        let mut title_type = [0u8; 4];
        buf.read_exact(&mut title_type)?;
        let group_id = buf.read_u16::<BigEndian>()?;
        let mut padding2 = [0u8; 2];
        buf.read_exact(&mut padding2)?;
        let region = buf.read_u16::<BigEndian>()?;
        let mut ratings = [0u8; 16];
        buf.read_exact(&mut ratings)?;
        let mut reserved1 = [0u8; 12];
        buf.read_exact(&mut reserved1)?;
        let mut ipc_mask = [0u8; 12];
        buf.read_exact(&mut ipc_mask)?;
        let mut reserved2 = [0u8; 18];
        buf.read_exact(&mut reserved2)?;
        let access_rights = buf.read_u32::<BigEndian>()?;
        let title_version = buf.read_u16::<BigEndian>()?;
        let num_contents = buf.read_u16::<BigEndian>()?;
        let boot_index = buf.read_u16::<BigEndian>()?;
        let minor_version = buf.read_u16::<BigEndian>()?;
        // The stored count wins, but never read past the data we were given.
        let available = (data.len().saturating_sub(TMD_HEADER_SIZE)) / CONTENT_RECORD_SIZE;
        let record_count = (num_contents as usize).min(available);
        let mut content_records = Vec::with_capacity(record_count);
        for _ in 0..record_count {
            let content_id = buf.read_u32::<BigEndian>()?;
            let index = buf.read_u16::<BigEndian>()?;
            let content_type = buf.read_u16::<BigEndian>()?;
            let content_size = buf.read_u64::<BigEndian>()?;
            let mut content_hash = [0u8; 20];
            buf.read_exact(&mut content_hash)?;
            content_records.push(ContentRecord {
                content_id,
                index,
                content_type,
                content_size,
                content_hash,
            });
        }
        Ok(Tmd {
            signature_type,
            signature,
            padding1,
            signature_issuer,
            tmd_version,
            ca_crl_version,
            signer_crl_version,
            is_vwii,
            sys_version,
            title_id,
            title_type,
            group_id,
            padding2,
            region,
            ratings,
            reserved1,
            ipc_mask,
            reserved2,
            access_rights,
            title_version,
            num_contents,
            boot_index,
            minor_version,
            content_records,
        })
    }

    /// Dumps the data in a Tmd back into binary data.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_u32::<BigEndian>(self.signature_type)?;
        buf.write_all(&self.signature)?;
        buf.write_all(&self.padding1)?;
        buf.write_all(&self.signature_issuer)?;
        buf.write_u8(self.tmd_version)?;
        buf.write_u8(self.ca_crl_version)?;
        buf.write_u8(self.signer_crl_version)?;
        buf.write_u8(self.is_vwii)?;
        buf.write_u64::<BigEndian>(self.sys_version)?;
        buf.write_all(&self.title_id)?;
        buf.write_all(&self.title_type)?;
        buf.write_u16::<BigEndian>(self.group_id)?;
        buf.write_all(&self.padding2)?;
        buf.write_u16::<BigEndian>(self.region)?;
        buf.write_all(&self.ratings)?;
        buf.write_all(&self.reserved1)?;
        buf.write_all(&self.ipc_mask)?;
        buf.write_all(&self.reserved2)?;
        buf.write_u32::<BigEndian>(self.access_rights)?;
        buf.write_u16::<BigEndian>(self.title_version)?;
        buf.write_u16::<BigEndian>(self.content_records.len() as u16)?;
        buf.write_u16::<BigEndian>(self.boot_index)?;
        buf.write_u16::<BigEndian>(self.minor_version)?;
        for content in self.content_records.iter() {
            buf.write_u32::<BigEndian>(content.content_id)?;
            buf.write_u16::<BigEndian>(content.index)?;
            buf.write_u16::<BigEndian>(content.content_type)?;
            buf.write_u64::<BigEndian>(content.content_size)?;
            buf.write_all(&content.content_hash)?;
        }
        Ok(buf)
    }

    /// Gets the Title ID of the TMD.
    pub fn title_id(&self) -> [u8; 8] {
        self.title_id
    }

    /// Gets the version of the title listed in the TMD.
    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    /// Gets the system version (required IOS title ID) listed in the TMD.
    pub fn sys_version(&self) -> u64 {
        self.sys_version
    }

    /// Gets the IOS version the title requires, when the system version
    /// refers to an IOS (high word 1, low word below 256).
    pub fn ios_version(&self) -> u8 {
        let hi = (self.sys_version >> 32) as u32;
        let lo = self.sys_version as u32;
        if hi == 1 && lo < 256 {
            lo as u8
        } else {
            0
        }
    }

    /// Gets the 3-letter code of the region the TMD was created for.
    pub fn region(&self) -> &str {
        match self.region {
            0 => "JPN",
            1 => "USA",
            2 => "EUR",
            3 => "None",
            4 => "KOR",
            _ => "Unknown",
        }
    }

    /// Gets the number of contents the TMD claims.
    pub fn num_contents(&self) -> u16 {
        self.num_contents
    }

    /// Gets the index of the title's boot content.
    pub fn boot_index(&self) -> u16 {
        self.boot_index
    }

    /// Gets a reference to the content records from the TMD.
    pub fn content_records(&self) -> &[ContentRecord] {
        &self.content_records
    }

    /// Replaces the hash in a content record. Used when rebuilding a disc
    /// partition's hash tree, whose H4 level lives in record 0.
    pub fn set_content_hash(&mut self, index: usize, hash: [u8; 20]) {
        if let Some(record) = self.content_records.get_mut(index) {
            record.content_hash = hash;
        }
    }

    /// Gets the name of the certificate used to sign the TMD as a string.
    pub fn signature_issuer(&self) -> String {
        String::from_utf8_lossy(&self.signature_issuer).trim_end_matches('\0').to_owned()
    }

    /// Gets the known authority that issued the TMD.
    pub fn issuer(&self) -> CertIssuer {
        CertIssuer::from_name(&self.signature_issuer())
    }

    /// Sets the issuer to a known authority's canonical name.
    pub fn set_issuer(&mut self, issuer: CertIssuer) {
        let name = issuer.name().as_bytes();
        self.signature_issuer = [0u8; 64];
        self.signature_issuer[..name.len()].copy_from_slice(name);
    }

    /// Gets whether the TMD is fakesigned using the strncmp (trucha) bug.
    pub fn is_fakesigned(&self) -> bool {
        if self.signature != [0; 256] {
            return false;
        }
        let mut hasher = Sha1::new();
        let tmd_body = self.to_bytes().unwrap();
        hasher.update(&tmd_body[320..]);
        hasher.finalize()[0] == 0
    }

    /// Fakesigns the TMD: zeroes the signature and brute-forces the unused
    /// minor version until the body's SHA-1 hash starts with 0x00.
    pub fn fakesign(&mut self) -> Result<(), TmdError> {
        self.signature = [0; 256];
        let mut current_int: u16 = 0;
        let mut test_hash: [u8; 20] = [255; 20];
        while test_hash[0] != 0 {
            if current_int == 65535 {
                return Err(TmdError::CannotFakesign);
            }
            current_int += 1;
            self.minor_version = current_int;
            let mut hasher = Sha1::new();
            let tmd_body = self.to_bytes()?;
            hasher.update(&tmd_body[320..]);
            test_hash = <[u8; 20]>::from(hasher.finalize());
        }
        Ok(())
    }

    /// Signs the TMD body with an RSA-2048 private key.
    pub fn realsign(&mut self, key: &RsaPrivateKey) -> Result<(), TmdError> {
        self.signature_type = SIG_TYPE_RSA2048;
        let body = self.to_bytes()?;
        let sig = cert::sign_payload(&body[320..], key).map_err(|_| TmdError::SigningFailed)?;
        self.signature = sig;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tmd(num_contents: u16) -> Tmd {
        let mut data = vec![0u8; TMD_HEADER_SIZE + num_contents as usize * CONTENT_RECORD_SIZE];
        data[..4].copy_from_slice(&SIG_TYPE_RSA2048.to_be_bytes());
        let issuer = CertIssuer::DebugTmd.name();
        data[0x140..0x140 + issuer.len()].copy_from_slice(issuer.as_bytes());
        // sys_version: IOS57.
        data[0x184..0x18C].copy_from_slice(&0x0000000100000039u64.to_be_bytes());
        data[0x1E0..0x1E2].copy_from_slice(&num_contents.to_be_bytes());
        let mut tmd = Tmd::from_bytes(&data).unwrap();
        for (i, record) in tmd.content_records.iter_mut().enumerate() {
            record.index = i as u16;
            record.content_id = i as u32;
            record.content_type = 1;
        }
        tmd
    }

    #[test]
    fn test_round_trip() {
        let tmd = sample_tmd(3);
        let bytes = tmd.to_bytes().unwrap();
        assert_eq!(bytes.len(), TMD_HEADER_SIZE + 3 * CONTENT_RECORD_SIZE);
        let again = Tmd::from_bytes(&bytes).unwrap();
        assert_eq!(again.to_bytes().unwrap(), bytes);
        assert_eq!(again.num_contents(), 3);
    }

    #[test]
    fn test_ios_version() {
        let tmd = sample_tmd(1);
        assert_eq!(tmd.ios_version(), 57);
    }

    #[test]
    fn test_issuer() {
        let mut tmd = sample_tmd(1);
        assert_eq!(tmd.issuer(), CertIssuer::DebugTmd);
        tmd.set_issuer(CertIssuer::RetailTmd);
        assert_eq!(tmd.signature_issuer(), "Root-CA00000001-CP00000004");
    }

    #[test]
    fn test_fakesign() {
        let mut tmd = sample_tmd(2);
        assert!(!tmd.is_fakesigned());
        tmd.fakesign().unwrap();
        assert!(tmd.is_fakesigned());
        let body = tmd.to_bytes().unwrap();
        assert_eq!(Sha1::digest(&body[320..])[0], 0);
    }
}
