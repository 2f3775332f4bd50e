// disc/ptbl.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Implements the Wii volume group / partition table scanner.

use std::io::Cursor;
use byteorder::{BigEndian, ReadBytesExt};
use log::debug;
use crate::error::{Result, RvtHError};
use crate::reader::{Reader, LBA_SIZE};

/// LBA of the volume group table within a Wii disc image.
pub const PTBL_ADDRESS_LBA: u32 = 0x40000 / LBA_SIZE;
/// Partition type of the game partition.
pub const PARTITION_TYPE_GAME: u32 = 0;
/// Sanity cap on partitions per volume group.
const MAX_PARTITIONS_PER_VG: u32 = 96;

/// One partition located through the volume group table.
#[derive(Debug, Clone, Copy)]
pub struct PartitionEntry {
    /// Volume group number (0-3).
    pub vg: u8,
    /// Position within the volume group.
    pub index: u8,
    pub part_type: u32,
    /// Starting LBA within the image.
    pub lba_start: u32,
    /// Length in LBAs, measured to the next partition or the end of the
    /// image.
    pub lba_len: u32,
}

/// The decoded partition table of a Wii disc image.
#[derive(Debug, Clone)]
pub struct PartitionTable {
    entries: Vec<PartitionEntry>,
}

impl PartitionTable {
    /// Reads the volume group table and every partition entry from a disc
    /// image reader.
    pub fn load(reader: &mut Reader) -> Result<PartitionTable> {
        if reader.lba_len() <= PTBL_ADDRESS_LBA {
            return Err(RvtHError::PartitionTableCorrupted);
        }
        let mut block = vec![0u8; LBA_SIZE as usize];
        reader.read(&mut block, PTBL_ADDRESS_LBA, 1)?;
        let mut vg_table = Cursor::new(&block[..]);

        let mut entries = Vec::new();
        for vg in 0..4u8 {
            let count = vg_table.read_u32::<BigEndian>()?;
            let table_offset = (vg_table.read_u32::<BigEndian>()? as u64) << 2;
            if count == 0 {
                continue;
            }
            if count > MAX_PARTITIONS_PER_VG {
                return Err(RvtHError::PartitionTableCorrupted);
            }
            // Entry tables normally sit right after the volume group table;
            // read the containing blocks.
            let first_lba = (table_offset / LBA_SIZE as u64) as u32;
            let end = table_offset + count as u64 * 8;
            let last_lba = end.div_ceil(LBA_SIZE as u64) as u32;
            if last_lba > reader.lba_len() {
                return Err(RvtHError::PartitionTableCorrupted);
            }
            let mut raw = vec![0u8; ((last_lba - first_lba) * LBA_SIZE) as usize];
            reader.read(&mut raw, first_lba, last_lba - first_lba)?;
            let skip = (table_offset - first_lba as u64 * LBA_SIZE as u64) as usize;
            let mut table = Cursor::new(&raw[skip..]);
            for index in 0..count {
                let addr = (table.read_u32::<BigEndian>()? as u64) << 2;
                let part_type = table.read_u32::<BigEndian>()?;
                let lba_start = (addr / LBA_SIZE as u64) as u32;
                if lba_start >= reader.lba_len() {
                    return Err(RvtHError::PartitionTableCorrupted);
                }
                entries.push(PartitionEntry {
                    vg,
                    index: index as u8,
                    part_type,
                    lba_start,
                    lba_len: 0,
                });
            }
        }
        if entries.is_empty() {
            return Err(RvtHError::PartitionTableCorrupted);
        }

        // Lengths run to the next partition by address, or the end of the
        // image for the last one.
        let mut starts: Vec<u32> = entries.iter().map(|e| e.lba_start).collect();
        starts.sort_unstable();
        let image_len = reader.lba_len();
        for entry in &mut entries {
            let next = starts
                .iter()
                .copied()
                .filter(|&s| s > entry.lba_start)
                .min()
                .unwrap_or(image_len);
            entry.lba_len = next - entry.lba_start;
        }
        debug!("partition table: {} partition(s)", entries.len());
        Ok(PartitionTable { entries })
    }

    pub fn entries(&self) -> &[PartitionEntry] {
        &self.entries
    }

    /// Finds the game partition.
    pub fn find_game(&self) -> Option<&PartitionEntry> {
        self.entries.iter().find(|e| e.part_type == PARTITION_TYPE_GAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refio::RefFile;

    /// Builds a 1 GiB-scale sparse image with an update partition and a game
    /// partition listed in volume group 0.
    fn build_image(path: &std::path::Path) -> RefFile {
        let file = RefFile::create(path).unwrap();
        let image_lbas = 0x60000u32;
        file.write_all_at(image_lbas as u64 * 512 - 1, &[0]).unwrap();
        // Volume group table: VG0 has two partitions, table at 0x40020.
        let mut vg = Vec::new();
        vg.extend_from_slice(&2u32.to_be_bytes());
        vg.extend_from_slice(&(0x40020u32 >> 2).to_be_bytes());
        file.write_all_at(0x40000, &vg).unwrap();
        // Entries: update partition at byte 0x50000, game at byte 0x8000000.
        let mut entries = Vec::new();
        entries.extend_from_slice(&(0x50000u32 >> 2).to_be_bytes());
        entries.extend_from_slice(&1u32.to_be_bytes());
        entries.extend_from_slice(&(0x8000000u32 >> 2).to_be_bytes());
        entries.extend_from_slice(&0u32.to_be_bytes());
        file.write_all_at(0x40020, &entries).unwrap();
        file
    }

    #[test]
    fn test_load_and_find_game() {
        let dir = tempfile::tempdir().unwrap();
        let file = build_image(&dir.path().join("wii.gcm"));
        let mut reader = crate::reader::Reader::open(&file, 0, 0).unwrap();
        let ptbl = PartitionTable::load(&mut reader).unwrap();
        assert_eq!(ptbl.entries().len(), 2);
        let game = ptbl.find_game().unwrap();
        assert_eq!(game.lba_start, 0x8000000 / 512);
        assert_eq!(game.lba_len, 0x60000 - 0x8000000 / 512);
        // The update partition runs up to the game partition.
        let update = &ptbl.entries()[0];
        assert_eq!(update.part_type, 1);
        assert_eq!(update.lba_len, (0x8000000 - 0x50000) / 512);
    }

    #[test]
    fn test_corrupt_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = build_image(&dir.path().join("bad.gcm"));
        file.write_all_at(0x40000, &10_000u32.to_be_bytes()).unwrap();
        let mut reader = crate::reader::Reader::open(&file, 0, 0).unwrap();
        assert!(matches!(
            PartitionTable::load(&mut reader),
            Err(RvtHError::PartitionTableCorrupted)
        ));
    }
}
