// hdd/table.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements the NHCD bank table: the directory block at LBA 0x300 of an
// RVT-H HDD that describes where each bank lives and what it holds.

use std::io::{Cursor, Read, Write};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use crate::error::{Result, RvtHError};
use crate::hdd::{BankEntry, BankType};
use crate::reader::{lba_to_bytes, LBA_SIZE};
use crate::refio::RefFile;

/// "NHCD", the bank table magic.
pub const NHCD_BANKTABLE_MAGIC: u32 = 0x4E484344;
/// LBA of the bank table header block.
pub const NHCD_BANKTABLE_ADDRESS_LBA: u32 = 0x300;
/// LBA where bank 1 starts on a standard table.
pub const NHCD_BANK_1_START_LBA: u32 = 0x340;
/// Size of one bank: 10,000,000 LBAs (5,000,000 KiB).
pub const NHCD_BANK_SIZE_LBA: u32 = 0x0098_9680;
/// Bank 1 size when the table is extended past 8 banks; the first slot is
/// shrunk to make room for the extra banks.
pub const NHCD_EXTBANKTABLE_BANK_1_SIZE_LBA: u32 = 0x008C_4A00;
/// Size of a single-layer Wii image mastered for RVT-R. Anything longer is
/// a dual-layer image.
pub const NHCD_BANK_WII_SL_SIZE_RVTR_LBA: u32 = 0x008D_2BC8;

pub const NHCD_BANK_COUNT_MIN: u32 = 8;
pub const NHCD_BANK_COUNT_MAX: u32 = 32;

// On-disc bank types. ('GC1L', 'NN1L', 'NN2L')
const NHCD_BANKTYPE_EMPTY: u32 = 0x0000_0000;
const NHCD_BANKTYPE_GCN: u32 = 0x4743_314C;
const NHCD_BANKTYPE_WII_SL: u32 = 0x4E4E_314C;
const NHCD_BANKTYPE_WII_DL: u32 = 0x4E4E_324C;

/// Tag written into the entry of a bank that was imported without recryption.
pub const IMPORT_TAG: [u8; 8] = *b"rvtrwimp";

/// Gets the default starting LBA of a bank slot. Extended tables keep bank 1
/// at the standard address but shrink it, with the remaining banks packed
/// contiguously after it.
pub fn bank_start_lba(bank: u32, bank_count: u32) -> u32 {
    if bank_count <= 8 || bank == 0 {
        NHCD_BANK_1_START_LBA + bank * NHCD_BANK_SIZE_LBA
    } else {
        NHCD_BANK_1_START_LBA + NHCD_EXTBANKTABLE_BANK_1_SIZE_LBA + (bank - 1) * NHCD_BANK_SIZE_LBA
    }
}

/// Gets the default size of a bank slot in LBAs.
pub fn bank_size_lba(bank: u32, bank_count: u32) -> u32 {
    if bank == 0 && bank_count > 8 {
        NHCD_EXTBANKTABLE_BANK_1_SIZE_LBA
    } else {
        NHCD_BANK_SIZE_LBA
    }
}

/// A bank table entry as stored on disc, before interpretation against the
/// disc header in the bank itself.
#[derive(Debug, Clone)]
pub struct RawBankEntry {
    pub bank_type: BankType,
    pub timestamp: i64,
    pub lba_start: u32,
    pub lba_len: u32,
    pub import_tag: [u8; 8],
}

fn entry_offset(index: u32) -> u64 {
    lba_to_bytes(NHCD_BANKTABLE_ADDRESS_LBA) + LBA_SIZE as u64 * (1 + index as u64)
}

/// Loads and validates the bank table header, returning the bank count.
pub fn load_header(file: &RefFile) -> Result<u32> {
    let mut block = [0u8; LBA_SIZE as usize];
    file.read_exact_at(lba_to_bytes(NHCD_BANKTABLE_ADDRESS_LBA), &mut block)?;
    let mut buf = Cursor::new(&block[..]);
    let magic = buf.read_u32::<BigEndian>()?;
    if magic != NHCD_BANKTABLE_MAGIC {
        return Err(RvtHError::NhcdTableMagic);
    }
    let bank_count = buf.read_u32::<BigEndian>()?;
    if !(NHCD_BANK_COUNT_MIN..=NHCD_BANK_COUNT_MAX).contains(&bank_count) {
        return Err(RvtHError::InvalidBankCount);
    }
    Ok(bank_count)
}

/// Loads one raw bank entry. Zero LBAs fall back on the default slot
/// geometry for the bank's position.
pub fn load_entry(file: &RefFile, index: u32, bank_count: u32) -> Result<RawBankEntry> {
    let mut block = [0u8; LBA_SIZE as usize];
    file.read_exact_at(entry_offset(index), &mut block)?;
    let mut buf = Cursor::new(&block[..]);
    let type_fourcc = buf.read_u32::<BigEndian>()?;
    let bank_type = match type_fourcc {
        NHCD_BANKTYPE_EMPTY => BankType::Empty,
        NHCD_BANKTYPE_GCN => BankType::Gcn,
        NHCD_BANKTYPE_WII_SL => BankType::WiiSL,
        NHCD_BANKTYPE_WII_DL => BankType::WiiDL,
        _ => BankType::Unknown,
    };
    let mut ts_raw = [0u8; 14];
    buf.read_exact(&mut ts_raw)?;
    let timestamp = decode_timestamp(&ts_raw);
    let mut reserved = [0u8; 2];
    buf.read_exact(&mut reserved)?;
    let mut lba_start = buf.read_u32::<BigEndian>()?;
    let mut lba_len = buf.read_u32::<BigEndian>()?;
    // Only trust the stored LBAs on recognizable banks.
    if !matches!(bank_type, BankType::Gcn | BankType::WiiSL | BankType::WiiDL) {
        lba_start = 0;
        lba_len = 0;
    }
    if lba_start == 0 || lba_len == 0 {
        lba_start = bank_start_lba(index, bank_count);
        lba_len = 0;
    }
    let mut title = [0u8; 64];
    buf.read_exact(&mut title)?;
    let mut import_tag = [0u8; 8];
    buf.read_exact(&mut import_tag)?;
    Ok(RawBankEntry {
        bank_type,
        timestamp,
        lba_start,
        lba_len,
        import_tag,
    })
}

/// Writes one bank entry back to the table. Deleted banks and the second
/// bank of a dual-layer pair are stored with the empty type so the unit
/// treats them as free, but the rest of the metadata is kept so an undelete
/// can restore the bank untouched.
pub fn write_entry(file: &RefFile, index: u32, entry: &BankEntry) -> Result<()> {
    let mut block = vec![0u8; LBA_SIZE as usize];
    {
        let mut buf = Cursor::new(&mut block[..]);
        let type_fourcc = if entry.is_deleted {
            NHCD_BANKTYPE_EMPTY
        } else {
            match entry.bank_type {
                BankType::Gcn => NHCD_BANKTYPE_GCN,
                BankType::WiiSL => NHCD_BANKTYPE_WII_SL,
                BankType::WiiDL => NHCD_BANKTYPE_WII_DL,
                BankType::Empty | BankType::Unknown | BankType::WiiDLBank2 => NHCD_BANKTYPE_EMPTY,
            }
        };
        buf.write_u32::<BigEndian>(type_fourcc)?;
        buf.write_all(&encode_timestamp(entry.timestamp))?;
        buf.write_all(&[0u8; 2])?;
        buf.write_u32::<BigEndian>(entry.lba_start)?;
        buf.write_u32::<BigEndian>(entry.lba_len)?;
        let mut title = [b' '; 64];
        let name = entry.game_title();
        let name = name.as_bytes();
        title[..name.len().min(64)].copy_from_slice(&name[..name.len().min(64)]);
        buf.write_all(&title)?;
        buf.write_all(&entry.import_tag)?;
    }
    file.write_all_at(entry_offset(index), &block)?;
    Ok(())
}

/// Encodes a unix timestamp as the table's 14-byte UTC `YYYYMMDDhhmmss`
/// form. Negative timestamps (no timestamp) encode as all zero bytes.
pub fn encode_timestamp(timestamp: i64) -> [u8; 14] {
    if timestamp < 0 {
        return [0u8; 14];
    }
    match DateTime::<Utc>::from_timestamp(timestamp, 0) {
        Some(dt) => {
            let s = dt.format("%Y%m%d%H%M%S").to_string();
            // Years outside 1000-9999 do not fit the fixed-width field.
            s.into_bytes().try_into().unwrap_or([0u8; 14])
        }
        None => [0u8; 14],
    }
}

/// Decodes a 14-byte table timestamp. Zeroed or unparsable fields yield -1.
pub fn decode_timestamp(raw: &[u8; 14]) -> i64 {
    if raw.iter().all(|&b| b == 0) {
        return -1;
    }
    let Ok(s) = std::str::from_utf8(raw) else {
        return -1;
    };
    match NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S") {
        Ok(dt) => dt.and_utc().timestamp(),
        Err(e) => {
            warn!("unparsable bank timestamp {s:?}: {e}");
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slot_geometry() {
        // Standard 8-bank table.
        assert_eq!(bank_start_lba(0, 8), NHCD_BANK_1_START_LBA);
        assert_eq!(bank_start_lba(1, 8), NHCD_BANK_1_START_LBA + NHCD_BANK_SIZE_LBA);
        assert_eq!(bank_size_lba(0, 8), NHCD_BANK_SIZE_LBA);
        // Extended table: bank 1 shrinks, the rest pack behind it.
        assert_eq!(bank_size_lba(0, 16), NHCD_EXTBANKTABLE_BANK_1_SIZE_LBA);
        assert_eq!(
            bank_start_lba(1, 16),
            NHCD_BANK_1_START_LBA + NHCD_EXTBANKTABLE_BANK_1_SIZE_LBA
        );
        assert_eq!(
            bank_start_lba(2, 16),
            bank_start_lba(1, 16) + NHCD_BANK_SIZE_LBA
        );
    }

    #[test]
    fn test_timestamp_round_trip() {
        // 2018-06-15 12:34:56 UTC.
        let ts = 1_529_066_096;
        let encoded = encode_timestamp(ts);
        assert_eq!(&encoded, b"20180615123456");
        assert_eq!(decode_timestamp(&encoded), ts);
    }

    #[test]
    fn test_timestamp_none() {
        assert_eq!(encode_timestamp(-1), [0u8; 14]);
        assert_eq!(decode_timestamp(&[0u8; 14]), -1);
        assert_eq!(decode_timestamp(b"xxxxxxxxxxxxxx"), -1);
    }
}
