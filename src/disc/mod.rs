// disc/mod.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Root for the disc-level modules: header identification, partition tables,
// and the partition recryption engines.

pub mod crypt;
pub mod header;
pub mod ptbl;
pub mod recrypt;

use std::io::Cursor;
use byteorder::{BigEndian, ReadBytesExt};
use crate::error::{Result, RvtHError};
use crate::reader::{Reader, LBA_SIZE};
use crate::title::cert::CertificateChain;
use crate::title::ticket::{Ticket, TICKET_SIZE};
use crate::title::tmd::Tmd;

/// Offset of the "hashes disabled" flag in the disc header.
pub const DISC_FLAG_NO_HASHES: usize = 0x60;
/// Offset of the "encryption disabled" flag in the disc header.
pub const DISC_FLAG_NO_CRYPTO: usize = 0x61;

/// LBAs read to cover a partition header: ticket, TMD, and certificate
/// chain all live in the first 0x8000 bytes of the partition.
pub const PARTITION_HEADER_LBA_COUNT: u32 = 0x8000 / LBA_SIZE;

/// The decoded header of one Wii partition: the ticket, the location of the
/// TMD, certificate chain, H3 table, and data area.
pub struct PartitionHeader {
    pub ticket: Ticket,
    pub tmd_size: u32,
    /// Byte offset from the partition start.
    pub tmd_offset: u64,
    pub cert_chain_size: u32,
    pub cert_chain_offset: u64,
    pub h3_offset: u64,
    pub data_offset: u64,
    pub data_size: u64,
    /// The raw first 0x8000 bytes of the partition, for writing back edits.
    pub raw: Vec<u8>,
}

impl PartitionHeader {
    /// Reads and decodes a partition header through a reader. `part_lba` is
    /// the partition's starting LBA within the reader's window.
    pub fn load(reader: &mut Reader, part_lba: u32) -> Result<PartitionHeader> {
        let mut raw = vec![0u8; 0x8000];
        reader.read(&mut raw, part_lba, PARTITION_HEADER_LBA_COUNT)?;
        let ticket =
            Ticket::from_bytes(&raw[..TICKET_SIZE]).map_err(|_| RvtHError::PartitionHeaderCorrupted)?;
        let mut buf = Cursor::new(&raw[TICKET_SIZE..TICKET_SIZE + 0x1C]);
        let tmd_size = buf.read_u32::<BigEndian>()?;
        let tmd_offset = (buf.read_u32::<BigEndian>()? as u64) << 2;
        let cert_chain_size = buf.read_u32::<BigEndian>()?;
        let cert_chain_offset = (buf.read_u32::<BigEndian>()? as u64) << 2;
        let h3_offset = (buf.read_u32::<BigEndian>()? as u64) << 2;
        let data_offset = (buf.read_u32::<BigEndian>()? as u64) << 2;
        let data_size = (buf.read_u32::<BigEndian>()? as u64) << 2;
        // The sections this engine edits must fit in the header block.
        if tmd_size as u64 > 0x8000
            || tmd_offset + tmd_size as u64 > 0x8000
            || cert_chain_offset + cert_chain_size as u64 > 0x8000
        {
            return Err(RvtHError::PartitionHeaderCorrupted);
        }
        Ok(PartitionHeader {
            ticket,
            tmd_size,
            tmd_offset,
            cert_chain_size,
            cert_chain_offset,
            h3_offset,
            data_offset,
            data_size,
            raw,
        })
    }

    /// Gets the TMD bytes out of the raw header block.
    pub fn tmd_bytes(&self) -> &[u8] {
        &self.raw[self.tmd_offset as usize..(self.tmd_offset + self.tmd_size as u64) as usize]
    }

    pub fn parse_tmd(&self) -> Result<Tmd> {
        Tmd::from_bytes(self.tmd_bytes()).map_err(|_| RvtHError::PartitionHeaderCorrupted)
    }

    /// Gets the certificate chain stored in the partition, if parsable.
    pub fn cert_chain(&self) -> Option<CertificateChain> {
        if self.cert_chain_size == 0 {
            return None;
        }
        let start = self.cert_chain_offset as usize;
        let end = start + self.cert_chain_size as usize;
        CertificateChain::from_bytes(&self.raw[start..end]).ok()
    }

    /// Replaces the ticket inside the raw header block.
    pub fn store_ticket(&mut self, ticket: &Ticket) -> Result<()> {
        let bytes = ticket.to_bytes()?;
        self.raw[..TICKET_SIZE].copy_from_slice(&bytes);
        self.ticket = Ticket::from_bytes(&bytes).map_err(|_| RvtHError::PartitionHeaderCorrupted)?;
        Ok(())
    }

    /// Replaces the TMD inside the raw header block. The new TMD must not be
    /// larger than the recorded size.
    pub fn store_tmd(&mut self, tmd: &Tmd) -> Result<()> {
        let bytes = tmd.to_bytes()?;
        if bytes.len() > self.tmd_size as usize {
            return Err(RvtHError::PartitionHeaderCorrupted);
        }
        let start = self.tmd_offset as usize;
        self.raw[start..start + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    /// Replaces the certificate chain inside the raw header block. The new
    /// chain must not be larger than the recorded size.
    pub fn store_cert_chain(&mut self, chain: &CertificateChain) -> Result<()> {
        let bytes = chain.to_bytes()?;
        if bytes.len() > self.cert_chain_size as usize {
            return Err(RvtHError::PartitionHeaderCorrupted);
        }
        let start = self.cert_chain_offset as usize;
        self.raw[start..start + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    /// Writes the raw header block back through the reader.
    pub fn persist(&self, reader: &mut Reader, part_lba: u32) -> Result<()> {
        reader.write(&self.raw, part_lba, PARTITION_HEADER_LBA_COUNT)?;
        Ok(())
    }
}
