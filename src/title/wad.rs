// title/wad.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements parsing, verification, and re-signing of WAD files, including
// the early devkit layout that stores its sections unaligned with the
// certificate chain after the ticket.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{info, warn};
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use thiserror::Error;
use crate::title::cert::{CertificateChain, CertificateError, SigStatus, SigningKeys, sig_verify};
use crate::title::crypto;
use crate::title::ticket::{Ticket, TicketError, TICKET_SIZE};
use crate::title::tmd::{Tmd, TmdError};
use crate::title::CryptoType;

/// Chunk size for streaming content verification.
const VERIFY_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum WadError {
    #[error("WAD is invalid type `{0}`")]
    BadType(String),
    #[error("WAD ticket size {0:#x} is not valid")]
    BadTicketSize(u32),
    #[error("TMD processing error")]
    Tmd(#[from] TmdError),
    #[error("Ticket processing error")]
    Ticket(#[from] TicketError),
    #[error("certificate processing error")]
    Certificate(#[from] CertificateError),
    #[error("WAD data is not in a valid format")]
    IO(#[from] std::io::Error),
}

/// The recognized WAD container types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WadType {
    Installable,
    ImportBoot,
    Backup,
    /// Early devkit WADs predate the standard header and store their
    /// sections without alignment.
    EarlyDevkit,
}

impl std::fmt::Display for WadType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            WadType::Installable => write!(f, "Is"),
            WadType::ImportBoot => write!(f, "ib"),
            WadType::Backup => write!(f, "Bk"),
            WadType::EarlyDevkit => write!(f, "Early Devkit"),
        }
    }
}

/// Identifies a WAD from its first 0x20 bytes. The header size field must be
/// 0x20; files with an unknown type field are probed for the early devkit
/// layout by checking whether its ticket size field matches a real ticket.
pub fn identify(buf: &[u8]) -> Option<WadType> {
    if buf.len() < 0x20 {
        return None;
    }
    let header_size = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    if header_size != 0x20 {
        return None;
    }
    match &buf[4..6] {
        b"Is" => Some(WadType::Installable),
        b"ib" => Some(WadType::ImportBoot),
        b"Bk" => Some(WadType::Backup),
        _ => {
            let ticket_size = u32::from_be_bytes(buf[0x0C..0x10].try_into().unwrap());
            if ticket_size == TICKET_SIZE as u32 {
                Some(WadType::EarlyDevkit)
            } else {
                None
            }
        }
    }
}

fn align64(value: usize) -> usize {
    (value + 63) & !63
}

/// A structure that represents an entire WAD file held in memory.
#[derive(Debug)]
pub struct Wad {
    wad_type: WadType,
    wad_version: u16,
    cert_chain: Vec<u8>,
    crl: Vec<u8>,
    ticket: Vec<u8>,
    tmd: Vec<u8>,
    data: Vec<u8>,
    footer: Vec<u8>,
    /// Whether contents inside `data` are 64-byte aligned (standard layout)
    /// or packed back to back (early devkit layout).
    data_align64: bool,
}

impl Wad {
    /// Creates a new Wad instance from the binary data of a WAD file.
    pub fn from_bytes(data: &[u8]) -> Result<Wad, WadError> {
        let wad_type = identify(data).ok_or_else(|| {
            let type_bytes = data.get(4..6).unwrap_or(&[]);
            WadError::BadType(String::from_utf8_lossy(type_bytes).to_string())
        })?;
        match wad_type {
            WadType::EarlyDevkit => Wad::from_bytes_early(data),
            _ => Wad::from_bytes_standard(data, wad_type),
        }
    }

    fn from_bytes_standard(data: &[u8], wad_type: WadType) -> Result<Wad, WadError> {
        let mut buf = Cursor::new(data);
        buf.seek(SeekFrom::Start(6))?;
        let wad_version = buf.read_u16::<BigEndian>()?;
        let cert_chain_size = buf.read_u32::<BigEndian>()?;
        let crl_size = buf.read_u32::<BigEndian>()?;
        let ticket_size = buf.read_u32::<BigEndian>()?;
        let tmd_size = buf.read_u32::<BigEndian>()?;
        // Round the content size to the nearest 16 for whole-block crypto.
        let data_size = (buf.read_u32::<BigEndian>()? + 15) & !15;
        let footer_size = buf.read_u32::<BigEndian>()?;
        if ticket_size != TICKET_SIZE as u32 {
            return Err(WadError::BadTicketSize(ticket_size));
        }

        // Each section starts on the next 64-byte boundary after the last.
        let cert_chain_offset = align64(0x20);
        let crl_offset = align64(cert_chain_offset + cert_chain_size as usize);
        let ticket_offset = align64(crl_offset + crl_size as usize);
        let tmd_offset = align64(ticket_offset + ticket_size as usize);
        let data_offset = align64(tmd_offset + tmd_size as usize);
        let footer_offset = align64(data_offset + data_size as usize);

        let read_section = |offset: usize, size: usize| -> Result<Vec<u8>, WadError> {
            let mut buf = Cursor::new(data);
            buf.seek(SeekFrom::Start(offset as u64))?;
            let mut section = vec![0u8; size];
            buf.read_exact(&mut section)?;
            Ok(section)
        };
        Ok(Wad {
            wad_type,
            wad_version,
            cert_chain: read_section(cert_chain_offset, cert_chain_size as usize)?,
            crl: read_section(crl_offset, crl_size as usize)?,
            ticket: read_section(ticket_offset, ticket_size as usize)?,
            tmd: read_section(tmd_offset, tmd_size as usize)?,
            data: read_section(data_offset, data_size as usize)?,
            footer: read_section(footer_offset, footer_size as usize)?,
            data_align64: true,
        })
    }

    fn from_bytes_early(data: &[u8]) -> Result<Wad, WadError> {
        let mut buf = Cursor::new(data);
        buf.seek(SeekFrom::Start(4))?;
        let data_offset = buf.read_u32::<BigEndian>()? as usize;
        let cert_chain_size = buf.read_u32::<BigEndian>()? as usize;
        let ticket_size = buf.read_u32::<BigEndian>()? as usize;
        let tmd_size = buf.read_u32::<BigEndian>()? as usize;
        // The name section that follows the TMD is dropped on
        // re-serialization.
        let _name_size = buf.read_u32::<BigEndian>()? as usize;
        if ticket_size != TICKET_SIZE {
            return Err(WadError::BadTicketSize(ticket_size as u32));
        }
        // Early layout: ticket directly after the header, then the
        // certificate chain, the TMD, and the name; contents at data_offset
        // with no alignment anywhere.
        let ticket_offset = 0x20;
        let cert_chain_offset = ticket_offset + ticket_size;
        let tmd_offset = cert_chain_offset + cert_chain_size;
        if tmd_offset + tmd_size > data.len() || data_offset > data.len() {
            return Err(WadError::BadType("Early Devkit".to_string()));
        }
        Ok(Wad {
            wad_type: WadType::EarlyDevkit,
            wad_version: 0,
            cert_chain: data[cert_chain_offset..cert_chain_offset + cert_chain_size].to_vec(),
            crl: Vec::new(),
            ticket: data[ticket_offset..ticket_offset + ticket_size].to_vec(),
            tmd: data[tmd_offset..tmd_offset + tmd_size].to_vec(),
            data: data[data_offset..].to_vec(),
            footer: Vec::new(),
            data_align64: false,
        })
    }

    /// Reads a WAD from a file.
    pub fn open(path: &Path) -> Result<Wad, WadError> {
        let data = std::fs::read(path)?;
        Wad::from_bytes(&data)
    }

    /// Dumps the WAD back into binary data, always in the canonical layout:
    /// standard header, sections in certificate/CRL/ticket/TMD/data/footer
    /// order, each aligned to 64 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WadError> {
        let data = self.repack_data()?;
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(0x20)?;
        match self.wad_type {
            WadType::ImportBoot => buf.write_all(b"ib")?,
            WadType::Backup => buf.write_all(b"Bk")?,
            // Early devkit WADs are normalized to installable.
            _ => buf.write_all(b"Is")?,
        }
        buf.write_u16::<BigEndian>(self.wad_version)?;
        buf.write_u32::<BigEndian>(self.cert_chain.len() as u32)?;
        buf.write_u32::<BigEndian>(self.crl.len() as u32)?;
        buf.write_u32::<BigEndian>(self.ticket.len() as u32)?;
        buf.write_u32::<BigEndian>(self.tmd.len() as u32)?;
        buf.write_u32::<BigEndian>(data.len() as u32)?;
        buf.write_u32::<BigEndian>(self.footer.len() as u32)?;
        // Pad up to the nearest multiple of 64 after the header and after
        // every section.
        buf.resize(align64(buf.len()), 0);
        buf.write_all(&self.cert_chain)?;
        buf.resize(align64(buf.len()), 0);
        buf.write_all(&self.crl)?;
        buf.resize(align64(buf.len()), 0);
        buf.write_all(&self.ticket)?;
        buf.resize(align64(buf.len()), 0);
        buf.write_all(&self.tmd)?;
        buf.resize(align64(buf.len()), 0);
        buf.write_all(&data)?;
        buf.resize(align64(buf.len()), 0);
        buf.write_all(&self.footer)?;
        buf.resize(align64(buf.len()), 0);
        Ok(buf)
    }

    /// Rebuilds the data section with canonical 64-byte alignment between
    /// contents.
    fn repack_data(&self) -> Result<Vec<u8>, WadError> {
        if self.data_align64 {
            return Ok(self.data.clone());
        }
        let tmd = self.parse_tmd()?;
        let mut out = Vec::new();
        for (i, record) in tmd.content_records().iter().enumerate() {
            let blob = self.content_enc(&tmd, i)?;
            out.write_all(&blob)?;
            if i + 1 < tmd.content_records().len() {
                out.resize(align64(out.len()), 0);
            }
        }
        Ok(out)
    }

    pub fn wad_type(&self) -> WadType {
        self.wad_type
    }

    pub fn cert_chain(&self) -> &[u8] {
        &self.cert_chain
    }

    pub fn ticket(&self) -> &[u8] {
        &self.ticket
    }

    pub fn tmd(&self) -> &[u8] {
        &self.tmd
    }

    pub fn parse_ticket(&self) -> Result<Ticket, WadError> {
        Ok(Ticket::from_bytes(&self.ticket)?)
    }

    pub fn parse_tmd(&self) -> Result<Tmd, WadError> {
        Ok(Tmd::from_bytes(&self.tmd)?)
    }

    pub fn parse_cert_chain(&self) -> Result<CertificateChain, WadError> {
        Ok(CertificateChain::from_bytes(&self.cert_chain)?)
    }

    /// Gets the encrypted blob for the content at the given record position,
    /// padded to the 16-byte AES block size.
    fn content_enc(&self, tmd: &Tmd, position: usize) -> Result<Vec<u8>, WadError> {
        let records = tmd.content_records();
        let mut offset = 0usize;
        for record in records.iter().take(position) {
            offset += record.content_size as usize;
            if self.data_align64 {
                offset = align64(offset);
            }
        }
        let record = &records[position];
        let enc_size = (record.content_size as usize + 15) & !15;
        if offset + enc_size > self.data.len() {
            return Err(WadError::BadType("content out of range".to_string()));
        }
        Ok(self.data[offset..offset + enc_size].to_vec())
    }

    /// Decrypts every content and checks its SHA-1 against the TMD record,
    /// streaming in 1 MiB chunks. Returns one flag per content, in record
    /// order; true means the hash matched.
    pub fn verify_contents(&self) -> Result<Vec<bool>, WadError> {
        let ticket = self.parse_ticket()?;
        let tmd = self.parse_tmd()?;
        let title_key = ticket.title_key_dec();
        let mut results = Vec::with_capacity(tmd.content_records().len());
        for (i, record) in tmd.content_records().iter().enumerate() {
            let enc = self.content_enc(&tmd, i)?;
            let mut hasher = Sha1::new();
            let mut iv = crypto::content_iv(record.index);
            let mut remaining = record.content_size as usize;
            for chunk in enc.chunks(VERIFY_CHUNK_SIZE) {
                // CBC chains across chunks: the next IV is this chunk's last
                // ciphertext block.
                let next_iv: [u8; 16] = chunk[chunk.len() - 16..].try_into().unwrap();
                let mut dec = chunk.to_vec();
                crypto::cbc_decrypt_in_place(&title_key, &iv, &mut dec);
                iv = next_iv;
                let used = remaining.min(dec.len());
                hasher.update(&dec[..used]);
                remaining -= used;
            }
            let digest: [u8; 20] = hasher.finalize().into();
            results.push(bool::from(digest[..].ct_eq(&record.content_hash[..])));
        }
        Ok(results)
    }

    /// Re-signs the WAD for a new encryption domain: swaps the title key
    /// between common keys, rewrites the ticket/TMD/certificate issuers,
    /// resets the common key index, and regenerates both signatures — with
    /// real RSA keys when the signing key store has them, by fakesigning
    /// otherwise. The output always serializes in the canonical layout.
    pub fn resign(&mut self, target: CryptoType, keys: &SigningKeys) -> Result<(), WadError> {
        let mut ticket = self.parse_ticket()?;
        let mut tmd = self.parse_tmd()?;
        let source = ticket.crypto_type();
        info!("re-signing WAD: {source} -> {target}");

        ticket.change_domain(target);
        tmd.set_issuer(crate::title::cert::CertIssuer::tmd_issuer_for(target.is_dev()));
        if let Ok(mut chain) = self.parse_cert_chain() {
            chain.relabel_for(target.is_dev());
            self.cert_chain = chain.to_bytes().map_err(WadError::IO)?;
        } else {
            warn!("certificate chain could not be parsed; leaving it untouched");
        }

        match keys.get(ticket.issuer()) {
            Some(key) => ticket.realsign(key)?,
            None => ticket.fakesign()?,
        }
        match keys.get(tmd.issuer()) {
            Some(key) => tmd.realsign(key)?,
            None => tmd.fakesign()?,
        }

        // Normalize early devkit WADs while the data section is still
        // addressable with the old alignment.
        self.data = self.repack_data()?;
        self.data_align64 = true;
        if self.wad_type == WadType::EarlyDevkit {
            self.wad_type = WadType::Installable;
        }
        self.ticket = ticket.to_bytes().map_err(TicketError::IO)?;
        self.tmd = tmd.to_bytes().map_err(TmdError::IO)?;
        Ok(())
    }

    /// Gets the ticket and TMD signature statuses, verified against the
    /// WAD's own certificate chain.
    pub fn sig_statuses(&self) -> (SigStatus, SigStatus) {
        let chain = self.parse_cert_chain().ok();
        (
            sig_verify(&self.ticket, chain.as_ref()),
            sig_verify(&self.tmd, chain.as_ref()),
        )
    }
}

/// Re-signs a WAD file on disk into a new file. This is the whole-file
/// operation behind the CLI's `wad resign` command.
pub fn resign_file(
    src: &Path,
    dest: &Path,
    target: CryptoType,
    keys: &SigningKeys,
) -> Result<(), WadError> {
    let mut wad = Wad::open(src)?;
    wad.resign(target, keys)?;
    std::fs::write(dest, wad.to_bytes()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::title::cert::CertIssuer;
    use crate::title::tmd::{CONTENT_RECORD_SIZE, TMD_HEADER_SIZE};
    use crate::title::crypto::encrypt_title_key;

    const TITLE_ID: [u8; 8] = [0x00, 0x01, 0x00, 0x00, 0x52, 0x54, 0x53, 0x54];
    const TITLE_KEY: [u8; 16] = [0x5A; 16];

    fn sample_ticket_bytes(crypto: CryptoType) -> Vec<u8> {
        let mut data = vec![0u8; TICKET_SIZE];
        data[..4].copy_from_slice(&0x00010001u32.to_be_bytes());
        let issuer = CertIssuer::ticket_issuer_for(crypto.is_dev()).name();
        data[0x140..0x140 + issuer.len()].copy_from_slice(issuer.as_bytes());
        let mut ticket = Ticket::from_bytes(&data).unwrap();
        ticket.set_common_key_index(crypto.common_key_index());
        let mut raw = ticket.to_bytes().unwrap();
        // Title ID and wrapped title key.
        raw[0x1DC..0x1E4].copy_from_slice(&TITLE_ID);
        raw[0x1BF..0x1CF].copy_from_slice(&encrypt_title_key(TITLE_KEY, crypto, TITLE_ID));
        raw
    }

    fn sample_contents() -> Vec<Vec<u8>> {
        vec![vec![0x10u8; 4000], vec![0x22u8; 96], vec![0x33u8; 1024 * 1024 + 100]]
    }

    fn sample_tmd_bytes(contents: &[Vec<u8>]) -> Vec<u8> {
        let mut data = vec![0u8; TMD_HEADER_SIZE + contents.len() * CONTENT_RECORD_SIZE];
        data[..4].copy_from_slice(&0x00010001u32.to_be_bytes());
        let issuer = CertIssuer::DebugTmd.name();
        data[0x140..0x140 + issuer.len()].copy_from_slice(issuer.as_bytes());
        data[0x18C..0x194].copy_from_slice(&TITLE_ID);
        data[0x1E0..0x1E2].copy_from_slice(&(contents.len() as u16).to_be_bytes());
        for (i, content) in contents.iter().enumerate() {
            let base = TMD_HEADER_SIZE + i * CONTENT_RECORD_SIZE;
            data[base..base + 4].copy_from_slice(&(i as u32).to_be_bytes());
            data[base + 4..base + 6].copy_from_slice(&(i as u16).to_be_bytes());
            data[base + 6..base + 8].copy_from_slice(&1u16.to_be_bytes());
            data[base + 8..base + 16].copy_from_slice(&(content.len() as u64).to_be_bytes());
            let digest: [u8; 20] = Sha1::digest(content).into();
            data[base + 16..base + 36].copy_from_slice(&digest);
        }
        data
    }

    fn sample_wad_bytes() -> Vec<u8> {
        let contents = sample_contents();
        let ticket = sample_ticket_bytes(CryptoType::Debug);
        let tmd = sample_tmd_bytes(&contents);
        let mut data = Vec::new();
        for (i, content) in contents.iter().enumerate() {
            let enc = crypto::encrypt_content(content, TITLE_KEY, i as u16, content.len() as u64);
            data.extend_from_slice(&enc);
            data.resize(align64(data.len()), 0);
        }
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x20u32.to_be_bytes());
        buf.extend_from_slice(b"Is");
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes()); // no cert chain
        buf.extend_from_slice(&0u32.to_be_bytes()); // no CRL
        buf.extend_from_slice(&(TICKET_SIZE as u32).to_be_bytes());
        buf.extend_from_slice(&(tmd.len() as u32).to_be_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes()); // no footer
        buf.resize(align64(buf.len()), 0);
        buf.extend_from_slice(&ticket);
        buf.resize(align64(buf.len()), 0);
        buf.extend_from_slice(&tmd);
        buf.resize(align64(buf.len()), 0);
        buf.extend_from_slice(&data);
        buf.resize(align64(buf.len()), 0);
        buf
    }

    #[test]
    fn test_identify() {
        let wad = sample_wad_bytes();
        assert_eq!(identify(&wad), Some(WadType::Installable));
        let mut bad = wad.clone();
        bad[0..4].copy_from_slice(&0x40u32.to_be_bytes());
        assert_eq!(identify(&bad), None);
    }

    #[test]
    fn test_identify_early() {
        let mut header = vec![0u8; 0x40];
        header[..4].copy_from_slice(&0x20u32.to_be_bytes());
        header[0x0C..0x10].copy_from_slice(&(TICKET_SIZE as u32).to_be_bytes());
        assert_eq!(identify(&header), Some(WadType::EarlyDevkit));
    }

    #[test]
    fn test_verify_contents() {
        let wad = Wad::from_bytes(&sample_wad_bytes()).unwrap();
        assert_eq!(wad.verify_contents().unwrap(), vec![true, true, true]);
    }

    #[test]
    fn test_verify_detects_corruption() {
        let mut raw = sample_wad_bytes();
        // The cert chain and CRL are empty, so the ticket lands on the first
        // boundary after the header and everything follows from there.
        let ticket_offset = align64(0x20);
        let tmd_len = TMD_HEADER_SIZE + 3 * CONTENT_RECORD_SIZE;
        let data_offset = align64(align64(ticket_offset + TICKET_SIZE) + tmd_len);
        let content2_offset = data_offset + align64(align64(4000) + 96);
        // Flip the first byte of the last content.
        raw[content2_offset] ^= 0xFF;
        let wad = Wad::from_bytes(&raw).unwrap();
        assert_eq!(wad.verify_contents().unwrap(), vec![true, true, false]);
    }

    #[test]
    fn test_resign_swaps_domain() {
        let mut wad = Wad::from_bytes(&sample_wad_bytes()).unwrap();
        wad.resign(CryptoType::Retail, &SigningKeys::new()).unwrap();
        let ticket = wad.parse_ticket().unwrap();
        assert_eq!(ticket.signature_issuer(), "Root-CA00000001-XS00000003");
        assert_eq!(ticket.common_key_index(), 0);
        assert_eq!(ticket.title_key_dec(), TITLE_KEY);
        assert!(ticket.is_fakesigned());
        let tmd = wad.parse_tmd().unwrap();
        assert_eq!(tmd.signature_issuer(), "Root-CA00000001-CP00000004");
        assert!(tmd.is_fakesigned());
        // Contents decrypt unchanged in the new domain.
        assert_eq!(wad.verify_contents().unwrap(), vec![true, true, true]);
    }

    #[test]
    fn test_early_devkit_parse_and_normalize() {
        let contents = sample_contents();
        let ticket = sample_ticket_bytes(CryptoType::Debug);
        let tmd = sample_tmd_bytes(&contents);
        // Early layout: header | ticket | certs | TMD | data, nothing aligned.
        let data_offset = 0x20 + TICKET_SIZE + tmd.len();
        let mut raw = vec![0u8; 0x20];
        raw[..4].copy_from_slice(&0x20u32.to_be_bytes());
        raw[4..8].copy_from_slice(&(data_offset as u32).to_be_bytes());
        raw[0x0C..0x10].copy_from_slice(&(TICKET_SIZE as u32).to_be_bytes());
        raw[0x10..0x14].copy_from_slice(&(tmd.len() as u32).to_be_bytes());
        raw.extend_from_slice(&ticket);
        raw.extend_from_slice(&tmd);
        for (i, content) in contents.iter().enumerate() {
            let enc = crypto::encrypt_content(content, TITLE_KEY, i as u16, content.len() as u64);
            raw.extend_from_slice(&enc);
        }

        let mut wad = Wad::from_bytes(&raw).unwrap();
        assert_eq!(wad.wad_type(), WadType::EarlyDevkit);
        assert_eq!(wad.verify_contents().unwrap(), vec![true, true, true]);

        // Re-signing normalizes to the canonical installable layout.
        wad.resign(CryptoType::Debug, &SigningKeys::new()).unwrap();
        let canonical = wad.to_bytes().unwrap();
        let reparsed = Wad::from_bytes(&canonical).unwrap();
        assert_eq!(reparsed.wad_type(), WadType::Installable);
        assert_eq!(reparsed.verify_contents().unwrap(), vec![true, true, true]);
    }

    #[test]
    fn test_resign_is_idempotent() {
        let mut mid = Wad::from_bytes(&sample_wad_bytes()).unwrap();
        mid.resign(CryptoType::Korean, &SigningKeys::new()).unwrap();
        let mid_bytes = mid.to_bytes().unwrap();
        let mut dst = Wad::from_bytes(&mid_bytes).unwrap();
        dst.resign(CryptoType::Korean, &SigningKeys::new()).unwrap();
        assert_eq!(dst.to_bytes().unwrap(), mid_bytes);
    }
}
