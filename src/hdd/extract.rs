// hdd/extract.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements bank extract and import: the sparse copy engine used when
// writing standalone disc images, the plain copy used when writing into a
// bank, SDK header prepending, and the post-import recryption policy.

use std::path::Path;
use chrono::Utc;
use log::{debug, info};
use crate::disc::{crypt, recrypt};
use crate::error::{Result, RvtHError};
use crate::hdd::table::{
    self, IMPORT_TAG, NHCD_BANK_SIZE_LBA, NHCD_EXTBANKTABLE_BANK_1_SIZE_LBA,
};
use crate::hdd::{BankEntry, BankType, ProgressFn, ProgressPhase, ProgressState, RvtH};
use crate::reader::{lba_to_bytes, Reader, LBA_SIZE};
use crate::title::cert::{SigStatus, SigningKeys};
use crate::title::CryptoType;

/// Extract flag: prepend a 32 KiB SDK header so the image loads on an NDEV
/// devkit.
pub const EXTRACT_PREPEND_SDK_HEADER: u32 = 1 << 0;

/// SDK header size, in LBAs.
pub const SDK_HEADER_SIZE_LBA: u32 = 32768 / LBA_SIZE;

// Copies process 1 MiB at a time.
const BUF_SIZE: usize = 1 << 20;
const LBA_COUNT_BUF: u32 = (BUF_SIZE as u32) / LBA_SIZE;

pub(crate) fn is_block_empty(buf: &[u8]) -> bool {
    buf.iter().all(|&b| b == 0)
}

/// Restores the cached disc header into the first block of a copy buffer
/// when both magic numbers are missing. The RVT-H's "Flush" function zeroes
/// the header in place, so the cached copy is the only one left.
fn restore_disc_header(buf: &mut [u8], disc_header: &[u8; 512]) {
    let magic_wii = u32::from_be_bytes(buf[0x18..0x1C].try_into().unwrap());
    let magic_gcn = u32::from_be_bytes(buf[0x1C..0x20].try_into().unwrap());
    if magic_wii != crate::disc::header::WII_MAGIC && magic_gcn != crate::disc::header::GCN_MAGIC {
        buf[..512].copy_from_slice(disc_header);
    }
}

pub(crate) fn check_progress(
    progress: &mut Option<&mut ProgressFn>,
    state: &ProgressState,
) -> Result<()> {
    if let Some(cb) = progress {
        if !cb(state) {
            return Err(RvtHError::Canceled);
        }
    }
    Ok(())
}

impl RvtH {
    /// Extracts a bank to a standalone disc image.
    ///
    /// `recrypt_key` selects the target encryption domain (None keeps the
    /// source's). With [`EXTRACT_PREPEND_SDK_HEADER`] the output starts with
    /// the 32 KiB devkit loader header; this is not supported for GameCube
    /// banks.
    pub fn extract(
        &mut self,
        bank: usize,
        dest: &Path,
        recrypt_key: Option<CryptoType>,
        flags: u32,
        mut progress: Option<&mut ProgressFn>,
    ) -> Result<()> {
        let entry = self.entries.get(bank).ok_or(RvtHError::BankOutOfRange)?;
        entry.check_extractable()?;

        let unenc_to_enc = matches!(entry.bank_type, BankType::WiiSL | BankType::WiiDL)
            && entry.crypto_type == CryptoType::None
            && recrypt_key.is_some_and(|k| k.is_encrypted());

        let mut gcm_lba_len = if unenc_to_enc {
            // Unencrypted banks store 31 KiB per 32 KiB hash group, so the
            // encrypted image is larger than the source bank.
            let game = entry
                .ptbl
                .as_ref()
                .and_then(|p| p.find_game().copied())
                .ok_or(RvtHError::NoGamePartition)?;
            let data_lbas = game.lba_len - 0x8000 / LBA_SIZE;
            let mut len = data_lbas / 3968 * 4096;
            if data_lbas % 3968 != 0 {
                len += 4096;
            }
            len + 0x20000 / LBA_SIZE + game.lba_start
        } else {
            entry.lba_len
        };

        if flags & EXTRACT_PREPEND_SDK_HEADER != 0 {
            if entry.bank_type == BankType::Gcn {
                return Err(RvtHError::NdevGcnNotSupported);
            }
            gcm_lba_len += SDK_HEADER_SIZE_LBA;
        }

        info!(
            "extracting bank {} ({}) to {}",
            bank + 1,
            self.entries[bank].bank_type,
            dest.display()
        );
        let mut dest_rvth = RvtH::create_gcm(dest, gcm_lba_len)?;
        dest_rvth.file.make_sparse(lba_to_bytes(gcm_lba_len))?;

        if flags & EXTRACT_PREPEND_SDK_HEADER != 0 {
            // Wii SDK header pattern; the checksum field can stay zero.
            let mut sdk_header = vec![0u8; (SDK_HEADER_SIZE_LBA * LBA_SIZE) as usize];
            sdk_header[0x0000] = 0xFF;
            sdk_header[0x0001] = 0xFF;
            sdk_header[0x082E] = 0xE0;
            sdk_header[0x082F] = 0x06;
            sdk_header[0x0844] = 0x01;
            let dst_entry = &mut dest_rvth.entries[0];
            let reader = dst_entry.reader.as_mut().ok_or_else(RvtHError::eio)?;
            reader.write(&sdk_header, 0, SDK_HEADER_SIZE_LBA)?;
            // Image I/O from here on lands past the header.
            reader.lba_adjust(SDK_HEADER_SIZE_LBA);
            dst_entry.lba_len = reader.lba_len();
        }

        if unenc_to_enc {
            crypt::copy_to_gcm_crypt(&mut dest_rvth, self, bank, &mut progress)?;
        } else {
            copy_to_gcm(&mut dest_rvth, self, bank, &mut progress)?;
        }

        if let Some(key) = recrypt_key {
            let dest_entry = &dest_rvth.entries[0];
            if key.is_encrypted()
                && matches!(dest_entry.bank_type, BankType::WiiSL | BankType::WiiDL)
                && dest_entry.crypto_type != key
            {
                recrypt::recrypt_partitions(
                    &mut dest_rvth,
                    0,
                    key,
                    &SigningKeys::from_env(),
                    &mut progress,
                )?;
            }
        }
        Ok(())
    }

    /// Imports a standalone disc image into a bank.
    pub fn import(
        &mut self,
        bank: usize,
        src_path: &Path,
        mut progress: Option<&mut ProgressFn>,
    ) -> Result<()> {
        if bank >= self.entries.len() {
            return Err(RvtHError::BankOutOfRange);
        }
        let mut src = RvtH::open(src_path)?;
        if src.is_hdd() || src.bank_count() > 1 {
            return Err(RvtHError::IsHddImage);
        }
        if src.bank_count() == 0 {
            return Err(RvtHError::NoBanks);
        }
        info!("importing {} into bank {}", src_path.display(), bank + 1);
        copy_to_hdd(self, bank, &mut src, 0, &mut progress)?;

        // Retail-crypto or badly-signed Wii images will not boot on the
        // unit; convert them to Debug. Clean debug images just get tagged.
        let needs_debug = {
            let entry = &self.entries[bank];
            matches!(entry.bank_type, BankType::WiiSL | BankType::WiiDL)
                && (matches!(entry.crypto_type, CryptoType::Retail | CryptoType::Korean)
                    || entry.sig_ticket != Some(SigStatus::Ok)
                    || entry.sig_tmd != Some(SigStatus::Ok))
        };
        if needs_debug {
            recrypt::recrypt_partitions(
                self,
                bank,
                CryptoType::Debug,
                &SigningKeys::from_env(),
                &mut progress,
            )?;
        } else {
            self.entries[bank].import_tag = IMPORT_TAG;
            self.write_bank_entry(bank)?;
        }
        Ok(())
    }
}

/// Copies a bank into a writable standalone disc image, skipping empty 4 KiB
/// blocks so the destination stays sparse.
pub(crate) fn copy_to_gcm(
    dest: &mut RvtH,
    src: &mut RvtH,
    bank_src: usize,
    progress: &mut Option<&mut ProgressFn>,
) -> Result<()> {
    if dest.is_hdd() || dest.bank_count() != 1 {
        return Err(RvtHError::IsHddImage);
    }
    let src_entry = src.entries.get_mut(bank_src).ok_or(RvtHError::BankOutOfRange)?;
    src_entry.check_extractable()?;
    let disc_header = src_entry.disc_header;

    let dst_entry = &mut dest.entries[0];
    copy_bank_metadata(dst_entry, src_entry);
    let lba_copy_len = src_entry.lba_len;

    let src_reader = src_entry.reader.as_mut().ok_or_else(RvtHError::eio)?;
    let dst_reader = dst_entry.reader.as_mut().ok_or_else(RvtHError::eio)?;

    let mut buf = vec![0u8; BUF_SIZE];
    let lba_buf_max = lba_copy_len & !(LBA_COUNT_BUF - 1);
    let mut lba_nonsparse: u32 = 0;
    let mut state = ProgressState {
        phase: ProgressPhase::Extract,
        src_bank: bank_src as u32,
        dst_bank: 0,
        lba_processed: 0,
        lba_total: lba_copy_len,
    };

    let mut lba_count: u32 = 0;
    while lba_count < lba_buf_max {
        state.lba_processed = lba_count;
        check_progress(progress, &state)?;

        src_reader.read(&mut buf, lba_count, LBA_COUNT_BUF)?;
        if lba_count == 0 {
            restore_disc_header(&mut buf, &disc_header);
        }

        // Skip empty 4 KiB blocks; the file was made sparse up front.
        let mut sprs = 0usize;
        while sprs < BUF_SIZE {
            if !is_block_empty(&buf[sprs..sprs + 4096]) {
                lba_nonsparse = lba_count + (sprs as u32 / LBA_SIZE);
                dst_reader.write(&buf[sprs..sprs + 4096], lba_nonsparse, 8)?;
                lba_nonsparse += 7;
            }
            sprs += 4096;
        }
        lba_count += LBA_COUNT_BUF;
    }

    // The tail is processed with single-LBA granularity.
    if lba_count < lba_copy_len {
        let lba_left = lba_copy_len - lba_count;
        state.lba_processed = lba_count;
        check_progress(progress, &state)?;

        src_reader.read(&mut buf, lba_count, lba_left)?;
        if lba_count == 0 {
            restore_disc_header(&mut buf, &disc_header);
        }
        let mut sprs = 0usize;
        while sprs < (lba_left * LBA_SIZE) as usize {
            if !is_block_empty(&buf[sprs..sprs + LBA_SIZE as usize]) {
                lba_nonsparse = lba_count + (sprs as u32 / LBA_SIZE);
                dst_reader.write(&buf[sprs..sprs + LBA_SIZE as usize], lba_nonsparse, 1)?;
            }
            sprs += LBA_SIZE as usize;
        }
    }

    state.lba_processed = lba_copy_len;
    check_progress(progress, &state)?;

    // If the image ended sparse, force a zero block at the last LBA so the
    // file reaches its full size.
    if lba_copy_len > 0 && lba_nonsparse != lba_copy_len - 1 {
        debug!("forcing tail write at LBA {:#x}", lba_copy_len - 1);
        let zero = [0u8; LBA_SIZE as usize];
        dst_reader.write(&zero, lba_copy_len - 1, 1)?;
    }
    dst_reader.flush()?;
    Ok(())
}

/// Copies a standalone disc image into an HDD bank with a plain 1 MiB copy.
pub(crate) fn copy_to_hdd(
    dest: &mut RvtH,
    bank_dest: usize,
    src: &mut RvtH,
    bank_src: usize,
    progress: &mut Option<&mut ProgressFn>,
) -> Result<()> {
    if !dest.is_hdd() {
        return Err(RvtHError::NotHddImage);
    }
    if bank_dest >= dest.entries.len() || bank_src >= src.entries.len() {
        return Err(RvtHError::BankOutOfRange);
    }
    src.entries[bank_src].check_extractable()?;

    let bank_count_dest = dest.bank_count;
    let src_type = src.entries[bank_src].bank_type;
    let src_len = src.entries[bank_src].lba_len;

    if src_type == BankType::WiiDL {
        // Dual-layer placement rules.
        if bank_count_dest > 8 && bank_dest == 0 {
            return Err(RvtHError::ImportDlExtNoBank1);
        }
        if bank_dest as u32 == bank_count_dest - 1 {
            return Err(RvtHError::ImportDlLastBank);
        }
        let first = &dest.entries[bank_dest];
        if first.bank_type != BankType::Empty && !first.is_deleted {
            return Err(RvtHError::BankNotEmptyOrDeleted);
        }
        let second = &dest.entries[bank_dest + 1];
        if second.bank_type != BankType::Empty && !second.is_deleted {
            return Err(RvtHError::Bank2DlNotEmptyOrDeleted);
        }
        // NOTE: the bank-contiguity check (ImportDlNotContiguous) stays
        // reserved; default slot geometry keeps pairs contiguous.
        if src_len > NHCD_BANK_SIZE_LBA * 2 {
            return Err(RvtHError::ImageTooBig);
        }
    } else if src_len > NHCD_BANK_SIZE_LBA {
        return Err(RvtHError::ImageTooBig);
    } else if bank_dest == 0
        && bank_count_dest > 8
        && src_len > NHCD_EXTBANKTABLE_BANK_1_SIZE_LBA
    {
        // Bank 1 of an extended table is a smaller slot.
        return Err(RvtHError::ImageTooBig);
    }

    {
        let entry = &dest.entries[bank_dest];
        if entry.bank_type != BankType::Empty && !entry.is_deleted {
            return Err(RvtHError::BankNotEmptyOrDeleted);
        }
    }

    dest.make_writable()?;

    // Attach a reader to the destination bank if none exists yet, windowed
    // wide enough for a dual-layer image spanning into the next bank.
    let window = if src_type == BankType::WiiDL {
        NHCD_BANK_SIZE_LBA * 2
    } else {
        dest.entries[bank_dest].lba_len
    };
    let needs_reader = match &dest.entries[bank_dest].reader {
        Some(reader) => reader.lba_len() < src_len,
        None => true,
    };
    if needs_reader {
        let lba_start = dest.entries[bank_dest].lba_start;
        dest.entries[bank_dest].reader = Some(Reader::open(&dest.file, lba_start, window)?);
    }

    let src_entry = &mut src.entries[bank_src];
    let dst_entry = &mut dest.entries[bank_dest];
    copy_bank_metadata(dst_entry, src_entry);
    dst_entry.lba_len = src_len;
    dst_entry.import_tag = [0u8; 8];

    let src_reader = src_entry.reader.as_mut().ok_or_else(RvtHError::eio)?;
    let dst_reader = dst_entry.reader.as_mut().ok_or_else(RvtHError::eio)?;

    let mut buf = vec![0u8; BUF_SIZE];
    let lba_buf_max = src_len & !(LBA_COUNT_BUF - 1);
    let mut state = ProgressState {
        phase: ProgressPhase::Import,
        src_bank: bank_src as u32,
        dst_bank: bank_dest as u32,
        lba_processed: 0,
        lba_total: src_len,
    };

    let mut lba_count: u32 = 0;
    while lba_count < lba_buf_max {
        state.lba_processed = lba_count;
        check_progress(progress, &state)?;
        src_reader.read(&mut buf, lba_count, LBA_COUNT_BUF)?;
        dst_reader.write(&buf, lba_count, LBA_COUNT_BUF)?;
        lba_count += LBA_COUNT_BUF;
    }
    if lba_count < src_len {
        let lba_left = src_len - lba_count;
        src_reader.read(&mut buf, lba_count, lba_left)?;
        dst_reader.write(&buf[..(lba_left * LBA_SIZE) as usize], lba_count, lba_left)?;
    }
    state.lba_processed = src_len;
    check_progress(progress, &state)?;
    dst_reader.flush()?;

    dest.write_bank_entry(bank_dest)?;
    if src_type == BankType::WiiDL {
        let second = BankEntry::dl_bank2(bank_dest as u32 + 1);
        dest.entries[bank_dest + 1] = second;
        dest.write_bank_entry(bank_dest + 1)?;
    }
    Ok(())
}

/// Copies the descriptive fields of a bank entry to an extract/import
/// destination. The timestamp falls back on the current time when the source
/// has none.
pub(crate) fn copy_bank_metadata(dst: &mut BankEntry, src: &BankEntry) {
    dst.bank_type = src.bank_type;
    dst.region_code = src.region_code;
    dst.is_deleted = false;
    dst.crypto_type = src.crypto_type;
    dst.sig_ticket = src.sig_ticket;
    dst.sig_tmd = src.sig_tmd;
    dst.ios_version = src.ios_version;
    dst.ticket = src.ticket.clone();
    dst.tmd = src.tmd.clone();
    dst.ptbl = src.ptbl.clone();
    dst.disc_header = src.disc_header;
    dst.timestamp = if src.timestamp >= 0 {
        src.timestamp
    } else {
        Utc::now().timestamp()
    };
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::disc::header::{GCN_MAGIC, WII_MAGIC};
    use crate::refio::RefFile;
    use crate::reader::bytes_to_lba;

    /// Stored image length used for test banks: 4 MiB.
    pub(crate) const TEST_BANK_LEN: u32 = 8192;

    pub(crate) fn hdd_file_size(bank_count: u32) -> u64 {
        let last = bank_count - 1;
        lba_to_bytes(table::bank_start_lba(last, bank_count) + table::bank_size_lba(last, bank_count))
    }

    /// Creates a sparse HDD image with a valid bank table and all banks
    /// empty.
    pub(crate) fn create_hdd(path: &Path, bank_count: u32) -> RefFile {
        let file = RefFile::create(path).unwrap();
        file.write_all_at(hdd_file_size(bank_count) - 1, &[0]).unwrap();
        let mut header = [0u8; 512];
        header[..4].copy_from_slice(b"NHCD");
        header[4..8].copy_from_slice(&bank_count.to_be_bytes());
        file.write_all_at(lba_to_bytes(table::NHCD_BANKTABLE_ADDRESS_LBA), &header)
            .unwrap();
        file
    }

    /// Writes a bank table entry by hand, in the same layout the engine
    /// persists.
    pub(crate) fn write_raw_entry(
        file: &RefFile,
        index: u32,
        fourcc: &[u8; 4],
        lba_start: u32,
        lba_len: u32,
        timestamp: &[u8; 14],
        title: &[u8],
    ) {
        let mut block = [0u8; 512];
        block[..4].copy_from_slice(fourcc);
        block[4..18].copy_from_slice(timestamp);
        block[0x14..0x18].copy_from_slice(&lba_start.to_be_bytes());
        block[0x18..0x1C].copy_from_slice(&lba_len.to_be_bytes());
        block[0x1C..0x5C].fill(b' ');
        block[0x1C..0x1C + title.len()].copy_from_slice(title);
        let offset = lba_to_bytes(table::NHCD_BANKTABLE_ADDRESS_LBA) + 512 * (1 + index as u64);
        file.write_all_at(offset, &block).unwrap();
    }

    /// Installs a small GameCube image into a bank: table entry plus a disc
    /// header and one payload cluster inside the bank.
    pub(crate) fn install_gcn(file: &RefFile, index: u32, bank_count: u32) {
        let lba_start = table::bank_start_lba(index, bank_count);
        write_raw_entry(
            file,
            index,
            b"GC1L",
            lba_start,
            TEST_BANK_LEN,
            b"20180615123456",
            b"TEST SAMPLE",
        );
        let mut header = [0u8; 512];
        header[..6].copy_from_slice(b"GALE01");
        header[0x1C..0x20].copy_from_slice(&GCN_MAGIC.to_be_bytes());
        header[0x20..0x2B].copy_from_slice(b"TEST SAMPLE");
        file.write_all_at(lba_to_bytes(lba_start), &header).unwrap();
        // One non-zero cluster at +0x1000 so sparse copies have something
        // to preserve.
        file.write_all_at(lba_to_bytes(lba_start) + 0x1000, &[0xC3u8; 512]).unwrap();
    }

    /// Builds a small standalone GameCube image file.
    pub(crate) fn create_gcn_gcm(path: &Path, lba_len: u32) -> RefFile {
        let file = RefFile::create(path).unwrap();
        let mut header = [0u8; 512];
        header[..6].copy_from_slice(b"GALE01");
        header[0x1C..0x20].copy_from_slice(&GCN_MAGIC.to_be_bytes());
        file.write_all_at(0, &header).unwrap();
        file.write_all_at(0x2000, &[0x7Eu8; 512]).unwrap();
        file.write_all_at(lba_to_bytes(lba_len) - 1, &[0]).unwrap();
        file
    }

    /// Builds a sparse standalone image with a Wii header and the given
    /// length; long enough lengths classify as dual-layer.
    pub(crate) fn create_wii_gcm(path: &Path, lba_len: u32) -> RefFile {
        let file = RefFile::create(path).unwrap();
        let mut header = [0u8; 512];
        header[..6].copy_from_slice(b"RTSE01");
        header[0x18..0x1C].copy_from_slice(&WII_MAGIC.to_be_bytes());
        file.write_all_at(0, &header).unwrap();
        file.write_all_at(lba_to_bytes(lba_len) - 1, &[0]).unwrap();
        assert_eq!(bytes_to_lba(file.size().unwrap()), lba_len);
        file
    }
}
