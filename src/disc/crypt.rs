// disc/crypt.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements the unencrypted-to-encrypted conversion used when extracting a
// bank that the unit stores without sector crypto. The source stores 31 KiB
// of plain data per 32 KiB sector; this engine rebuilds the H0-H4 hash tree,
// encrypts each sector with the partition's title key, and rewrites the
// partition header for the encrypted layout.

use log::info;
use sha1::{Digest, Sha1};
use crate::disc::ptbl::PTBL_ADDRESS_LBA;
use crate::disc::{PartitionHeader, DISC_FLAG_NO_CRYPTO, DISC_FLAG_NO_HASHES, PARTITION_HEADER_LBA_COUNT};
use crate::error::{Result, RvtHError};
use crate::hdd::extract::{check_progress, copy_bank_metadata};
use crate::hdd::{BankType, ProgressFn, ProgressPhase, ProgressState, RvtH};
use crate::reader::{lba_to_bytes, LBA_SIZE};
use crate::title::cert::sig_verify;
use crate::title::crypto::cbc_encrypt_in_place;
use crate::title::ticket::TICKET_SIZE;
use crate::title::CryptoType;

const SECTOR_SIZE: usize = 0x8000;
const SECTOR_DATA_SIZE: usize = 0x7C00;
const SECTOR_HASH_SIZE: usize = 0x400;
const SECTORS_PER_GROUP: usize = 64;
/// Plaintext LBAs per hash group.
pub(crate) const GROUP_DATA_LBAS: u32 = (SECTORS_PER_GROUP * SECTOR_DATA_SIZE) as u32 / LBA_SIZE;
/// Ciphertext LBAs per hash group.
pub(crate) const GROUP_ENC_LBAS: u32 = (SECTORS_PER_GROUP * SECTOR_SIZE) as u32 / LBA_SIZE;

/// H3 table: one SHA-1 per group, padded to 0x18000 bytes at partition
/// offset 0x8000. Data starts at 0x20000.
const H3_TABLE_SIZE: usize = 0x18000;
const H3_OFFSET: u32 = 0x8000;
const DATA_OFFSET: u32 = 0x20000;

// Hash tree regions within a sector's hash area.
const H0_LEN: usize = 31 * 20;
const H1_START: usize = 0x280;
const H1_LEN: usize = 8 * 20;
const H2_START: usize = 0x340;
const H2_LEN: usize = 8 * 20;

/// Converts an unencrypted Wii bank into an encrypted standalone image.
/// The destination must have been sized for the 32 KiB-per-group layout.
pub(crate) fn copy_to_gcm_crypt(
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
    if !matches!(src_entry.bank_type, BankType::WiiSL | BankType::WiiDL) {
        return Err(RvtHError::NotWiiImage);
    }
    if src_entry.crypto_type != CryptoType::None {
        return Err(RvtHError::IsEncrypted);
    }
    let game = src_entry
        .ptbl
        .as_ref()
        .and_then(|p| p.find_game().copied())
        .ok_or(RvtHError::NoGamePartition)?;
    let mut disc_header = src_entry.disc_header;

    let dst_entry = &mut dest.entries[0];
    copy_bank_metadata(dst_entry, src_entry);

    let src_reader = src_entry.reader.as_mut().ok_or_else(RvtHError::eio)?;
    let dst_reader = dst_entry.reader.as_mut().ok_or_else(RvtHError::eio)?;

    let ph = PartitionHeader::load(src_reader, game.lba_start)?;
    let title_key = ph.ticket.title_key_dec();
    let data_lbas = game.lba_len - PARTITION_HEADER_LBA_COUNT;
    let groups = data_lbas.div_ceil(GROUP_DATA_LBAS);
    info!(
        "encrypting {} data LBAs into {groups} hash group(s)",
        data_lbas
    );

    // The output claims real sector crypto, so the header flags that
    // disabled hashing and encryption must be cleared.
    disc_header[DISC_FLAG_NO_HASHES] = 0;
    disc_header[DISC_FLAG_NO_CRYPTO] = 0;
    dst_reader.write(&disc_header, 0, 1)?;

    // Everything between the disc header and the partition table is copied
    // verbatim.
    let head_lbas = PTBL_ADDRESS_LBA - 1;
    let mut head = vec![0u8; (head_lbas * LBA_SIZE) as usize];
    src_reader.read(&mut head, 1, head_lbas)?;
    dst_reader.write(&head, 1, head_lbas)?;

    // A fresh volume group table listing only the game partition; the
    // source's other partitions are not carried into the encrypted image.
    let mut vg_block = [0u8; LBA_SIZE as usize];
    vg_block[0..4].copy_from_slice(&1u32.to_be_bytes());
    vg_block[4..8].copy_from_slice(&(0x40020u32 >> 2).to_be_bytes());
    vg_block[0x20..0x24].copy_from_slice(&((lba_to_bytes(game.lba_start) >> 2) as u32).to_be_bytes());
    vg_block[0x24..0x28].copy_from_slice(&0u32.to_be_bytes());
    dst_reader.write(&vg_block, PTBL_ADDRESS_LBA, 1)?;

    let src_data_lba = game.lba_start + PARTITION_HEADER_LBA_COUNT;
    let dst_data_lba = game.lba_start + DATA_OFFSET / LBA_SIZE;
    let mut h3 = vec![0u8; H3_TABLE_SIZE];
    let mut plain = vec![0u8; SECTORS_PER_GROUP * SECTOR_DATA_SIZE];
    let mut group = vec![0u8; SECTORS_PER_GROUP * SECTOR_SIZE];
    let mut state = ProgressState {
        phase: ProgressPhase::Extract,
        src_bank: bank_src as u32,
        dst_bank: 0,
        lba_processed: 0,
        lba_total: data_lbas,
    };

    for g in 0..groups {
        state.lba_processed = g * GROUP_DATA_LBAS;
        check_progress(progress, &state)?;

        // Short tail groups are zero-padded.
        plain.fill(0);
        let start = g * GROUP_DATA_LBAS;
        let count = GROUP_DATA_LBAS.min(data_lbas - start);
        src_reader.read(
            &mut plain[..(count * LBA_SIZE) as usize],
            src_data_lba + start,
            count,
        )?;

        let h3_offset = g as usize * 20;
        build_group(&mut group, &plain, &title_key, &mut h3[h3_offset..h3_offset + 20]);
        dst_reader.write(&group, dst_data_lba + g * GROUP_ENC_LBAS, GROUP_ENC_LBAS)?;
    }

    dst_reader.write(&h3, game.lba_start + H3_OFFSET / LBA_SIZE, (H3_TABLE_SIZE as u32) / LBA_SIZE)?;
    let h4: [u8; 20] = Sha1::digest(&h3).into();

    // Rebuild the partition header: new H4 in the TMD, re-signed, and the
    // offsets moved to the encrypted layout.
    let mut raw = ph.raw.clone();
    let mut tmd = ph.parse_tmd()?;
    tmd.set_content_hash(0, h4);
    tmd.fakesign().map_err(|_| RvtHError::eio())?;
    let tmd_bytes = tmd.to_bytes()?;
    let tmd_start = ph.tmd_offset as usize;
    raw[tmd_start..tmd_start + tmd_bytes.len()].copy_from_slice(&tmd_bytes);
    raw[TICKET_SIZE + 0x10..TICKET_SIZE + 0x14].copy_from_slice(&(H3_OFFSET >> 2).to_be_bytes());
    raw[TICKET_SIZE + 0x14..TICKET_SIZE + 0x18].copy_from_slice(&(DATA_OFFSET >> 2).to_be_bytes());
    let data_size_shifted = groups * (GROUP_ENC_LBAS * LBA_SIZE / 4);
    raw[TICKET_SIZE + 0x18..TICKET_SIZE + 0x1C].copy_from_slice(&data_size_shifted.to_be_bytes());
    dst_reader.write(&raw, game.lba_start, PARTITION_HEADER_LBA_COUNT)?;

    state.lba_processed = data_lbas;
    check_progress(progress, &state)?;
    dst_reader.flush()?;

    // The destination is now encrypted in the ticket's own domain.
    let chain = ph.cert_chain();
    dst_entry.crypto_type = ph.ticket.crypto_type();
    dst_entry.disc_header = disc_header;
    dst_entry.sig_ticket = Some(sig_verify(&raw[..TICKET_SIZE], chain.as_ref()));
    dst_entry.sig_tmd = Some(sig_verify(&tmd_bytes, chain.as_ref()));
    Ok(())
}

/// Builds one encrypted 2 MiB hash group from 0x1F0000 bytes of plain data:
/// fills the sector data areas, computes the H0/H1/H2 tree, records the H3
/// entry, and encrypts every sector.
fn build_group(group: &mut [u8], plain: &[u8], title_key: &[u8; 16], h3_entry: &mut [u8]) {
    // Data clusters and their H0 hashes.
    for s in 0..SECTORS_PER_GROUP {
        let sector = &mut group[s * SECTOR_SIZE..(s + 1) * SECTOR_SIZE];
        sector[..SECTOR_HASH_SIZE].fill(0);
        sector[SECTOR_HASH_SIZE..]
            .copy_from_slice(&plain[s * SECTOR_DATA_SIZE..(s + 1) * SECTOR_DATA_SIZE]);
        for c in 0..31 {
            let cluster_start = SECTOR_HASH_SIZE + c * 0x400;
            let digest: [u8; 20] = Sha1::digest(&sector[cluster_start..cluster_start + 0x400]).into();
            sector[c * 20..(c + 1) * 20].copy_from_slice(&digest);
        }
    }
    // H1: one hash per sector's H0 table, shared across its subgroup of 8.
    for sg in 0..8 {
        let mut h1 = [0u8; H1_LEN];
        for k in 0..8 {
            let s = (sg * 8 + k) * SECTOR_SIZE;
            let digest: [u8; 20] = Sha1::digest(&group[s..s + H0_LEN]).into();
            h1[k * 20..(k + 1) * 20].copy_from_slice(&digest);
        }
        for k in 0..8 {
            let s = (sg * 8 + k) * SECTOR_SIZE;
            group[s + H1_START..s + H1_START + H1_LEN].copy_from_slice(&h1);
        }
    }
    // H2: one hash per subgroup's H1 table, shared across the group.
    let mut h2 = [0u8; H2_LEN];
    for sg in 0..8 {
        let s = (sg * 8) * SECTOR_SIZE;
        let digest: [u8; 20] = Sha1::digest(&group[s + H1_START..s + H1_START + H1_LEN]).into();
        h2[sg * 20..(sg + 1) * 20].copy_from_slice(&digest);
    }
    for s in 0..SECTORS_PER_GROUP {
        let base = s * SECTOR_SIZE;
        group[base + H2_START..base + H2_START + H2_LEN].copy_from_slice(&h2);
    }
    h3_entry.copy_from_slice(&Sha1::digest(h2));

    // Encrypt: the hash area with a zero IV, then the data area with the
    // last ciphertext block of the hash area as its IV.
    for s in 0..SECTORS_PER_GROUP {
        let sector = &mut group[s * SECTOR_SIZE..(s + 1) * SECTOR_SIZE];
        let (hash_area, data_area) = sector.split_at_mut(SECTOR_HASH_SIZE);
        cbc_encrypt_in_place(title_key, &[0u8; 16], hash_area);
        let iv: [u8; 16] = hash_area[SECTOR_HASH_SIZE - 16..].try_into().unwrap();
        cbc_encrypt_in_place(title_key, &iv, data_area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refio::RefFile;
    use crate::title::cert::CertIssuer;
    use crate::title::crypto::{cbc_decrypt_in_place, encrypt_title_key};
    use crate::title::ticket::Ticket;
    use crate::title::tmd::{Tmd, CONTENT_RECORD_SIZE, TMD_HEADER_SIZE};

    const TITLE_ID: [u8; 8] = [0x00, 0x01, 0x00, 0x00, 0x52, 0x54, 0x53, 0x54];
    const TITLE_KEY: [u8; 16] = [0x99; 16];
    const GAME_LBA: u32 = 0x280;
    /// Data LBAs in the test partition: a full group plus a partial tail.
    const DATA_LBAS: u32 = 5000;

    /// Builds an unencrypted Wii image: crypto-disabled flags in the disc
    /// header, one game partition, 31 KiB-per-sector plain data.
    fn build_unencrypted_image(path: &std::path::Path) -> RefFile {
        let file = RefFile::create(path).unwrap();
        let mut header = [0u8; 512];
        header[..6].copy_from_slice(b"RTSE01");
        header[0x18..0x1C].copy_from_slice(&crate::disc::header::WII_MAGIC.to_be_bytes());
        header[DISC_FLAG_NO_HASHES] = 1;
        header[DISC_FLAG_NO_CRYPTO] = 1;
        file.write_all_at(0, &header).unwrap();
        // Partition table with just the game partition.
        let mut vg = Vec::new();
        vg.extend_from_slice(&1u32.to_be_bytes());
        vg.extend_from_slice(&(0x40020u32 >> 2).to_be_bytes());
        file.write_all_at(0x40000, &vg).unwrap();
        let mut entry = Vec::new();
        entry.extend_from_slice(&((lba_to_bytes(GAME_LBA) >> 2) as u32).to_be_bytes());
        entry.extend_from_slice(&0u32.to_be_bytes());
        file.write_all_at(0x40020, &entry).unwrap();
        // Partition header: debug ticket + TMD with one content record.
        let base = lba_to_bytes(GAME_LBA);
        let mut ticket = vec![0u8; TICKET_SIZE];
        ticket[..4].copy_from_slice(&0x00010001u32.to_be_bytes());
        let issuer = CertIssuer::DebugTicket.name();
        ticket[0x140..0x140 + issuer.len()].copy_from_slice(issuer.as_bytes());
        ticket[0x1DC..0x1E4].copy_from_slice(&TITLE_ID);
        ticket[0x1BF..0x1CF]
            .copy_from_slice(&encrypt_title_key(TITLE_KEY, CryptoType::Debug, TITLE_ID));
        file.write_all_at(base, &ticket).unwrap();
        let mut tmd = vec![0u8; TMD_HEADER_SIZE + CONTENT_RECORD_SIZE];
        tmd[..4].copy_from_slice(&0x00010001u32.to_be_bytes());
        let issuer = CertIssuer::DebugTmd.name();
        tmd[0x140..0x140 + issuer.len()].copy_from_slice(issuer.as_bytes());
        tmd[0x18C..0x194].copy_from_slice(&TITLE_ID);
        tmd[0x1E0..0x1E2].copy_from_slice(&1u16.to_be_bytes());
        let mut fields = Vec::new();
        fields.extend_from_slice(&(tmd.len() as u32).to_be_bytes());
        fields.extend_from_slice(&(0x2C0u32 >> 2).to_be_bytes());
        fields.extend_from_slice(&[0u8; 8]); // no cert chain
        fields.extend_from_slice(&(0x8000u32 >> 2).to_be_bytes());
        fields.extend_from_slice(&(0x8000u32 >> 2).to_be_bytes()); // plain data at 0x8000
        fields.extend_from_slice(&((DATA_LBAS * 512 / 4) as u32).to_be_bytes());
        file.write_all_at(base + TICKET_SIZE as u64, &fields).unwrap();
        file.write_all_at(base + 0x2C0, &tmd).unwrap();
        // Plain data: a known first cluster, then sparse zeroes.
        let data_base = base + 0x8000;
        file.write_all_at(data_base, &[0x11u8; 0x400]).unwrap();
        file.write_all_at(data_base + 0x100000, &[0x47u8; 0x200]).unwrap();
        // Size the image so the game partition has exactly DATA_LBAS of data.
        let total = GAME_LBA + PARTITION_HEADER_LBA_COUNT + DATA_LBAS;
        file.write_all_at(lba_to_bytes(total) - 1, &[0]).unwrap();
        file
    }

    #[test]
    fn test_extract_crypt_builds_valid_hash_tree() {
        let dir = tempfile::tempdir().unwrap();
        let img_path = dir.path().join("unenc.gcm");
        build_unencrypted_image(&img_path);

        let mut rvth = crate::hdd::RvtH::open(&img_path).unwrap();
        assert_eq!(rvth.bank(0).unwrap().crypto_type(), CryptoType::None);

        let out_path = dir.path().join("enc.gcm");
        rvth.extract(0, &out_path, Some(CryptoType::Debug), 0, None).unwrap();

        let groups = DATA_LBAS.div_ceil(GROUP_DATA_LBAS);
        assert_eq!(groups, 2);
        let expected_lbas = groups * GROUP_ENC_LBAS + DATA_OFFSET / 512 + GAME_LBA;
        let out_file = RefFile::open(&out_path).unwrap();
        assert_eq!(out_file.size().unwrap(), lba_to_bytes(expected_lbas));

        // Decrypt sector 0 of group 0 and check the data and its H0 entry.
        let sector_base = lba_to_bytes(GAME_LBA + DATA_OFFSET / 512);
        let mut sector = vec![0u8; SECTOR_SIZE];
        out_file.read_exact_at(sector_base, &mut sector).unwrap();
        let (hash_area, data_area) = sector.split_at_mut(SECTOR_HASH_SIZE);
        let data_iv: [u8; 16] = hash_area[SECTOR_HASH_SIZE - 16..].try_into().unwrap();
        cbc_decrypt_in_place(&TITLE_KEY, &[0u8; 16], hash_area);
        cbc_decrypt_in_place(&TITLE_KEY, &data_iv, data_area);
        assert_eq!(&data_area[..0x400], &[0x11u8; 0x400][..]);
        let h0: [u8; 20] = Sha1::digest(&data_area[..0x400]).into();
        assert_eq!(&hash_area[..20], &h0[..]);

        // The H4 hash in the TMD covers the H3 table that was written.
        let mut h3 = vec![0u8; H3_TABLE_SIZE];
        out_file
            .read_exact_at(lba_to_bytes(GAME_LBA + H3_OFFSET / 512), &mut h3)
            .unwrap();
        let h4: [u8; 20] = Sha1::digest(&h3).into();
        let mut tmd_raw = vec![0u8; TMD_HEADER_SIZE + CONTENT_RECORD_SIZE];
        out_file
            .read_exact_at(lba_to_bytes(GAME_LBA) + 0x2C0, &mut tmd_raw)
            .unwrap();
        let tmd = Tmd::from_bytes(&tmd_raw).unwrap();
        assert_eq!(tmd.content_records()[0].content_hash, h4);
        assert!(tmd.is_fakesigned());

        // The converted image opens as an encrypted debug image.
        let out_rvth = crate::hdd::RvtH::open(&out_path).unwrap();
        let entry = out_rvth.bank(0).unwrap();
        assert_eq!(entry.crypto_type(), CryptoType::Debug);

        // And its ticket still unwraps to the same title key.
        let mut ticket_raw = vec![0u8; TICKET_SIZE];
        out_file
            .read_exact_at(lba_to_bytes(GAME_LBA), &mut ticket_raw)
            .unwrap();
        let ticket = Ticket::from_bytes(&ticket_raw).unwrap();
        assert_eq!(ticket.title_key_dec(), TITLE_KEY);
    }
}
