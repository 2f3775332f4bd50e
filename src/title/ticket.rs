// title/ticket.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements the structures and methods required for Ticket parsing, domain
// detection, and re-signing.

use std::io::{Cursor, Read, Write};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rsa::RsaPrivateKey;
use sha1::{Digest, Sha1};
use thiserror::Error;
use crate::title::cert::{self, CertIssuer, SIG_TYPE_RSA2048};
use crate::title::{crypto, CryptoType};

/// Size of a ticket on disc, in bytes.
pub const TICKET_SIZE: usize = 0x2A4;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket is version `{0}` but only v0 is supported")]
    UnsupportedVersion(u8),
    #[error("Ticket data could not be fakesigned")]
    CannotFakesign,
    #[error("Ticket could not be signed with the provided key")]
    SigningFailed,
    #[error("Ticket data is not in a valid format")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Copy, Clone)]
pub struct TitleLimit {
    pub limit_type: u32,
    pub limit_max: u32,
}

/// A structure that represents a Wii Ticket.
#[derive(Debug, Clone)]
pub struct Ticket {
    signature_type: u32,
    signature: [u8; 256],
    padding1: [u8; 60],
    signature_issuer: [u8; 64],
    ecdh_data: [u8; 60],
    ticket_version: u8,
    reserved1: [u8; 2],
    title_key: [u8; 16],
    unknown1: [u8; 1],
    ticket_id: [u8; 8],
    console_id: [u8; 4],
    title_id: [u8; 8],
    unknown2: [u8; 2],
    title_version: u16,
    permitted_titles_mask: [u8; 4],
    permit_mask: [u8; 4],
    title_export_allowed: u8,
    common_key_index: u8,
    unknown3: [u8; 48],
    content_access_permission: [u8; 64],
    padding2: [u8; 2],
    title_limits: [TitleLimit; 8],
}

impl Ticket {
    /// Creates a new Ticket instance from the binary data of a Ticket.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TicketError> {
        let mut buf = Cursor::new(data);
        let signature_type = buf.read_u32::<BigEndian>()?;
        let mut signature = [0u8; 256];
        buf.read_exact(&mut signature)?;
        let mut padding1 = [0u8; 60];
        buf.read_exact(&mut padding1)?;
        let mut signature_issuer = [0u8; 64];
        buf.read_exact(&mut signature_issuer)?;
        let mut ecdh_data = [0u8; 60];
        buf.read_exact(&mut ecdh_data)?;
        let ticket_version = buf.read_u8()?;
        // v1 tickets carry extra sections this crate does not manage.
        if ticket_version != 0 {
            return Err(TicketError::UnsupportedVersion(ticket_version));
        }
        let mut reserved1 = [0u8; 2];
        buf.read_exact(&mut reserved1)?;
        let mut title_key = [0u8; 16];
        buf.read_exact(&mut title_key)?;
        let mut unknown1 = [0u8; 1];
        buf.read_exact(&mut unknown1)?;
        let mut ticket_id = [0u8; 8];
        buf.read_exact(&mut ticket_id)?;
        let mut console_id = [0u8; 4];
        buf.read_exact(&mut console_id)?;
        let mut title_id = [0u8; 8];
        buf.read_exact(&mut title_id)?;
        let mut unknown2 = [0u8; 2];
        buf.read_exact(&mut unknown2)?;
        let title_version = buf.read_u16::<BigEndian>()?;
        let mut permitted_titles_mask = [0u8; 4];
        buf.read_exact(&mut permitted_titles_mask)?;
        let mut permit_mask = [0u8; 4];
        buf.read_exact(&mut permit_mask)?;
        let title_export_allowed = buf.read_u8()?;
        let common_key_index = buf.read_u8()?;
        let mut unknown3 = [0u8; 48];
        buf.read_exact(&mut unknown3)?;
        let mut content_access_permission = [0u8; 64];
        buf.read_exact(&mut content_access_permission)?;
        let mut padding2 = [0u8; 2];
        buf.read_exact(&mut padding2)?;
        let mut title_limits: Vec<TitleLimit> = Vec::new();
        for _ in 0..8 {
            let limit_type = buf.read_u32::<BigEndian>()?;
            let limit_max = buf.read_u32::<BigEndian>()?;
            title_limits.push(TitleLimit { limit_type, limit_max });
        }
        let title_limits = title_limits.try_into().unwrap();
        Ok(Ticket {
            signature_type,
            signature,
            padding1,
            signature_issuer,
            ecdh_data,
            ticket_version,
            reserved1,
            title_key,
            unknown1,
            ticket_id,
            console_id,
            title_id,
            unknown2,
            title_version,
            permitted_titles_mask,
            permit_mask,
            title_export_allowed,
            common_key_index,
            unknown3,
            content_access_permission,
            padding2,
            title_limits,
        })
    }

    /// Dumps the data in a Ticket instance back into binary data.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_u32::<BigEndian>(self.signature_type)?;
        buf.write_all(&self.signature)?;
        buf.write_all(&self.padding1)?;
        buf.write_all(&self.signature_issuer)?;
        buf.write_all(&self.ecdh_data)?;
        buf.write_u8(self.ticket_version)?;
        buf.write_all(&self.reserved1)?;
        buf.write_all(&self.title_key)?;
        buf.write_all(&self.unknown1)?;
        buf.write_all(&self.ticket_id)?;
        buf.write_all(&self.console_id)?;
        buf.write_all(&self.title_id)?;
        buf.write_all(&self.unknown2)?;
        buf.write_u16::<BigEndian>(self.title_version)?;
        buf.write_all(&self.permitted_titles_mask)?;
        buf.write_all(&self.permit_mask)?;
        buf.write_u8(self.title_export_allowed)?;
        buf.write_u8(self.common_key_index)?;
        buf.write_all(&self.unknown3)?;
        buf.write_all(&self.content_access_permission)?;
        buf.write_all(&self.padding2)?;
        for limit in &self.title_limits {
            buf.write_u32::<BigEndian>(limit.limit_type)?;
            buf.write_u32::<BigEndian>(limit.limit_max)?;
        }
        Ok(buf)
    }

    /// Gets the raw encrypted Title Key from the Ticket.
    pub fn title_key(&self) -> [u8; 16] {
        self.title_key
    }

    pub fn set_title_key(&mut self, title_key: [u8; 16]) {
        self.title_key = title_key;
    }

    /// Gets the Title ID of the Ticket.
    pub fn title_id(&self) -> [u8; 8] {
        self.title_id
    }

    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    /// Gets the index of the common key used by the Ticket.
    pub fn common_key_index(&self) -> u8 {
        self.common_key_index
    }

    pub fn set_common_key_index(&mut self, index: u8) {
        self.common_key_index = index;
    }

    /// Gets the name of the certificate used to sign the Ticket as a string.
    pub fn signature_issuer(&self) -> String {
        String::from_utf8_lossy(&self.signature_issuer).trim_end_matches('\0').to_owned()
    }

    /// Gets the known authority that issued the Ticket.
    pub fn issuer(&self) -> CertIssuer {
        CertIssuer::from_name(&self.signature_issuer())
    }

    /// Sets the issuer to a known authority's canonical name.
    pub fn set_issuer(&mut self, issuer: CertIssuer) {
        let name = issuer.name().as_bytes();
        self.signature_issuer = [0u8; 64];
        self.signature_issuer[..name.len()].copy_from_slice(name);
    }

    /// Derives the encryption domain from the issuer and the common key
    /// index. Some retail tickets carry an out-of-range index; Korean titles
    /// (game IDs ending in 'K') fall back on the Korean key, everything else
    /// on the retail key.
    pub fn crypto_type(&self) -> CryptoType {
        if self.issuer().is_debug() {
            return CryptoType::Debug;
        }
        match self.common_key_index {
            0 => CryptoType::Retail,
            1 => CryptoType::Korean,
            2 => CryptoType::Vwii,
            _ => {
                if self.title_id[7] == b'K' {
                    CryptoType::Korean
                } else {
                    CryptoType::Retail
                }
            }
        }
    }

    /// Gets the decrypted Title Key, unwrapping with the common key of the
    /// Ticket's own domain.
    pub fn title_key_dec(&self) -> [u8; 16] {
        crypto::decrypt_title_key(self.title_key, self.crypto_type(), self.title_id)
    }

    /// Moves the Ticket into a new encryption domain: the Title Key is
    /// unwrapped with the current common key and re-wrapped with the target
    /// key, and the issuer and common key index are rewritten. The signature
    /// is left stale; callers re-sign afterwards.
    pub fn change_domain(&mut self, target: CryptoType) {
        let title_key = self.title_key_dec();
        self.set_issuer(CertIssuer::ticket_issuer_for(target.is_dev()));
        self.common_key_index = target.common_key_index();
        self.title_key = crypto::encrypt_title_key(title_key, target, self.title_id);
    }

    /// Gets whether the Ticket is fakesigned using the strncmp (trucha) bug.
    pub fn is_fakesigned(&self) -> bool {
        if self.signature != [0; 256] {
            return false;
        }
        let mut hasher = Sha1::new();
        let ticket_body = self.to_bytes().unwrap();
        hasher.update(&ticket_body[320..]);
        hasher.finalize()[0] == 0
    }

    /// Fakesigns the Ticket: zeroes the signature and brute-forces a filler
    /// value until the body's SHA-1 hash starts with 0x00.
    pub fn fakesign(&mut self) -> Result<(), TicketError> {
        self.signature = [0; 256];
        let mut current_int: u16 = 0;
        let mut test_hash: [u8; 20] = [255; 20];
        while test_hash[0] != 0 {
            if current_int == 65535 {
                return Err(TicketError::CannotFakesign);
            }
            current_int += 1;
            self.unknown2 = current_int.to_be_bytes();
            let mut hasher = Sha1::new();
            let ticket_body = self.to_bytes()?;
            hasher.update(&ticket_body[320..]);
            test_hash = <[u8; 20]>::from(hasher.finalize());
        }
        Ok(())
    }

    /// Signs the Ticket body with an RSA-2048 private key.
    pub fn realsign(&mut self, key: &RsaPrivateKey) -> Result<(), TicketError> {
        self.signature_type = SIG_TYPE_RSA2048;
        let body = self.to_bytes()?;
        let sig = cert::sign_payload(&body[320..], key).map_err(|_| TicketError::SigningFailed)?;
        self.signature = sig;
        Ok(())
    }
}
