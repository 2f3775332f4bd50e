// disc/recrypt.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements partition recryption between encrypted domains: the title key
// is re-wrapped under the target common key and the ticket, TMD, and
// certificate chain are re-issued and re-signed. The bulk data never needs
// re-encryption since its AES key is the (unchanged) title key itself.

use std::io;
use log::info;
use crate::disc::PartitionHeader;
use crate::error::{Result, RvtHError};
use crate::hdd::extract::check_progress;
use crate::hdd::{BankType, ProgressFn, ProgressPhase, ProgressState, RvtH};
use crate::title::cert::{CertIssuer, SigningKeys};
use crate::title::CryptoType;

/// Recrypts every partition of a Wii bank (or standalone image) into the
/// target encryption domain.
///
/// The operation is not transactional: a failure mid-way leaves some
/// partitions converted on disc.
pub fn recrypt_partitions(
    rvth: &mut RvtH,
    bank: usize,
    target: CryptoType,
    keys: &SigningKeys,
    progress: &mut Option<&mut ProgressFn>,
) -> Result<()> {
    if !target.is_encrypted() {
        return Err(RvtHError::Io(io::Error::from_raw_os_error(22)));
    }
    let is_hdd = rvth.is_hdd;
    let entry = rvth.entries.get_mut(bank).ok_or(RvtHError::BankOutOfRange)?;
    if !matches!(entry.bank_type, BankType::WiiSL | BankType::WiiDL) {
        return Err(RvtHError::NotWiiImage);
    }
    if !entry.crypto_type.is_encrypted() {
        return Err(RvtHError::IsUnencrypted);
    }
    if entry.crypto_type == target {
        return Ok(());
    }
    info!(
        "recrypting bank {}: {} -> {target}",
        bank + 1,
        entry.crypto_type
    );
    rvth.file.make_writable()?;

    let ptbl = entry.ptbl.clone().ok_or(RvtHError::PartitionTableCorrupted)?;
    let parts: Vec<_> = ptbl.entries().to_vec();
    let reader = entry.reader.as_mut().ok_or_else(RvtHError::eio)?;
    let mut state = ProgressState {
        phase: ProgressPhase::Recrypt,
        src_bank: bank as u32,
        dst_bank: bank as u32,
        lba_processed: 0,
        lba_total: parts.len() as u32,
    };

    for (i, part) in parts.iter().enumerate() {
        state.lba_processed = i as u32;
        check_progress(progress, &state)?;

        let mut ph = PartitionHeader::load(reader, part.lba_start)?;

        let mut ticket = ph.ticket.clone();
        ticket.change_domain(target);
        match keys.get(ticket.issuer()) {
            Some(key) => ticket.realsign(key).map_err(|_| RvtHError::eio())?,
            None => ticket.fakesign().map_err(|_| RvtHError::eio())?,
        }
        ph.store_ticket(&ticket)?;

        let mut tmd = ph.parse_tmd()?;
        tmd.set_issuer(CertIssuer::tmd_issuer_for(target.is_dev()));
        match keys.get(tmd.issuer()) {
            Some(key) => tmd.realsign(key).map_err(|_| RvtHError::eio())?,
            None => tmd.fakesign().map_err(|_| RvtHError::eio())?,
        }
        ph.store_tmd(&tmd)?;

        if let Some(mut chain) = ph.cert_chain() {
            chain.relabel_for(target.is_dev());
            ph.store_cert_chain(&chain)?;
        }

        ph.persist(reader, part.lba_start)?;
    }

    state.lba_processed = parts.len() as u32;
    check_progress(progress, &state)?;
    reader.flush()?;

    // Refresh the cached security state from what is now on disc.
    RvtH::init_wii_crypto(entry);
    if is_hdd {
        rvth.write_bank_entry(bank)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refio::RefFile;
    use crate::reader::lba_to_bytes;
    use crate::title::cert::SigStatus;
    use crate::title::crypto::encrypt_title_key;
    use crate::title::ticket::{Ticket, TICKET_SIZE};
    use crate::title::tmd::{CONTENT_RECORD_SIZE, TMD_HEADER_SIZE};

    const TITLE_ID: [u8; 8] = [0x00, 0x01, 0x00, 0x00, 0x52, 0x54, 0x53, 0x54];
    const TITLE_KEY: [u8; 16] = [0x77; 16];
    /// Game partition location within the test image.
    const GAME_LBA: u32 = 0x280;

    fn debug_ticket_bytes() -> Vec<u8> {
        let mut data = vec![0u8; TICKET_SIZE];
        data[..4].copy_from_slice(&0x00010001u32.to_be_bytes());
        let issuer = CertIssuer::DebugTicket.name();
        data[0x140..0x140 + issuer.len()].copy_from_slice(issuer.as_bytes());
        data[0x1DC..0x1E4].copy_from_slice(&TITLE_ID);
        data[0x1BF..0x1CF]
            .copy_from_slice(&encrypt_title_key(TITLE_KEY, CryptoType::Debug, TITLE_ID));
        data
    }

    fn debug_tmd_bytes() -> Vec<u8> {
        let mut data = vec![0u8; TMD_HEADER_SIZE + CONTENT_RECORD_SIZE];
        data[..4].copy_from_slice(&0x00010001u32.to_be_bytes());
        let issuer = CertIssuer::DebugTmd.name();
        data[0x140..0x140 + issuer.len()].copy_from_slice(issuer.as_bytes());
        data[0x18C..0x194].copy_from_slice(&TITLE_ID);
        data[0x1E0..0x1E2].copy_from_slice(&1u16.to_be_bytes());
        data
    }

    /// Builds an encrypted (debug) Wii image: disc header, partition table,
    /// and a game partition header. Data areas are left zeroed; recryption
    /// never touches them.
    pub(crate) fn build_debug_wii_image(path: &std::path::Path) -> RefFile {
        let file = RefFile::create(path).unwrap();
        // Disc header.
        let mut header = [0u8; 512];
        header[..6].copy_from_slice(b"RTSE01");
        header[0x18..0x1C].copy_from_slice(&crate::disc::header::WII_MAGIC.to_be_bytes());
        header[0x20..0x2C].copy_from_slice(b"RECRYPT TEST");
        file.write_all_at(0, &header).unwrap();
        // Volume group table with one game partition.
        let mut vg = Vec::new();
        vg.extend_from_slice(&1u32.to_be_bytes());
        vg.extend_from_slice(&(0x40020u32 >> 2).to_be_bytes());
        file.write_all_at(0x40000, &vg).unwrap();
        let mut entry = Vec::new();
        entry.extend_from_slice(&(lba_to_bytes(GAME_LBA) as u32 >> 2).to_be_bytes());
        entry.extend_from_slice(&0u32.to_be_bytes());
        file.write_all_at(0x40020, &entry).unwrap();
        // Game partition header: ticket, then section offsets, then the TMD.
        let tmd = debug_tmd_bytes();
        let base = lba_to_bytes(GAME_LBA);
        file.write_all_at(base, &debug_ticket_bytes()).unwrap();
        let mut fields = Vec::new();
        fields.extend_from_slice(&(tmd.len() as u32).to_be_bytes());
        fields.extend_from_slice(&(0x2C0u32 >> 2).to_be_bytes());
        fields.extend_from_slice(&0u32.to_be_bytes()); // no cert chain
        fields.extend_from_slice(&0u32.to_be_bytes());
        fields.extend_from_slice(&(0x8000u32 >> 2).to_be_bytes()); // h3
        fields.extend_from_slice(&(0x20000u32 >> 2).to_be_bytes()); // data
        fields.extend_from_slice(&(0x200000u32 >> 2).to_be_bytes());
        file.write_all_at(base + TICKET_SIZE as u64, &fields).unwrap();
        file.write_all_at(base + 0x2C0, &tmd).unwrap();
        // Pad the image out past the partition header and a little data.
        file.write_all_at(lba_to_bytes(GAME_LBA + 0x1200) - 1, &[0]).unwrap();
        file
    }

    #[test]
    fn test_extract_with_recrypt_debug_to_retail() {
        let dir = tempfile::tempdir().unwrap();
        let img_path = dir.path().join("debug.gcm");
        build_debug_wii_image(&img_path);

        let mut rvth = crate::hdd::RvtH::open(&img_path).unwrap();
        assert_eq!(rvth.bank(0).unwrap().crypto_type(), CryptoType::Debug);

        let out_path = dir.path().join("retail.gcm");
        rvth.extract(0, &out_path, Some(CryptoType::Retail), 0, None).unwrap();

        let out = crate::hdd::RvtH::open(&out_path).unwrap();
        let entry = out.bank(0).unwrap();
        assert_eq!(entry.crypto_type(), CryptoType::Retail);
        assert_eq!(entry.sig_status_ticket(), Some(SigStatus::Fakesigned));
        assert_eq!(entry.sig_status_tmd(), Some(SigStatus::Fakesigned));

        // Check the rewritten ticket directly.
        let file = RefFile::open(&out_path).unwrap();
        let mut raw = vec![0u8; TICKET_SIZE];
        file.read_exact_at(lba_to_bytes(GAME_LBA), &mut raw).unwrap();
        let ticket = Ticket::from_bytes(&raw).unwrap();
        assert_eq!(ticket.signature_issuer(), "Root-CA00000001-XS00000003");
        assert_eq!(ticket.common_key_index(), 0);
        // The unwrapped title key survived the domain change.
        assert_eq!(ticket.title_key_dec(), TITLE_KEY);
    }

    #[test]
    fn test_recrypt_rejects_non_wii() {
        let dir = tempfile::tempdir().unwrap();
        let gcm_path = dir.path().join("gcn.gcm");
        crate::hdd::extract::testutil::create_gcn_gcm(&gcm_path, 4096);
        let mut rvth = crate::hdd::RvtH::open(&gcm_path).unwrap();
        rvth.make_writable().unwrap();
        let err = recrypt_partitions(
            &mut rvth,
            0,
            CryptoType::Debug,
            &SigningKeys::new(),
            &mut None,
        )
        .unwrap_err();
        assert!(matches!(err, RvtHError::NotWiiImage));
    }

    #[test]
    fn test_recrypt_same_domain_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let img_path = dir.path().join("debug.gcm");
        build_debug_wii_image(&img_path);
        let mut rvth = crate::hdd::RvtH::open(&img_path).unwrap();
        let before = std::fs::read(&img_path).unwrap();
        recrypt_partitions(
            &mut rvth,
            0,
            CryptoType::Debug,
            &SigningKeys::new(),
            &mut None,
        )
        .unwrap();
        assert_eq!(std::fs::read(&img_path).unwrap(), before);
    }
}
