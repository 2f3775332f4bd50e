// reader/wbfs.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// WBFS disc image access. Only single-game WBFS files are supported: the
// game occupies disc slot 0 and its data is scattered across WBFS sectors
// through a per-disc translation table. The disc info block carries a copy
// of the first 0x100 bytes of the disc header, which is presented at the
// front of the virtual image.

use std::io::{Cursor, Read};
use byteorder::{BigEndian, ReadBytesExt};
use log::warn;
use crate::error::{Result, RvtHError};
use crate::reader::{lba_to_bytes, LBA_SIZE};
use crate::refio::RefFile;

pub const WBFS_MAGIC: &[u8; 4] = b"WBFS";

/// log2 of the Wii sector size (0x8000 bytes).
const WII_SEC_SZ_S: u8 = 15;
/// Wii sectors on a dual-layer disc; fixes the per-disc table length.
const WII_SEC_PER_DISC: u32 = 143_432 * 2;
/// Bytes of disc header copied into the disc info block.
const DISC_HEADER_COPY_SIZE: usize = 0x100;

pub(super) struct WbfsState {
    hd_sec_sz: u32,
    wbfs_sec_sz: u32,
    /// Virtual WBFS sector -> absolute WBFS sector in the file; 0 = unmapped.
    wlba_table: Vec<u16>,
    disc_header: [u8; DISC_HEADER_COPY_SIZE],
    lba_len: u32,
}

impl WbfsState {
    pub(super) fn open(file: &RefFile, window_start: u32) -> Result<WbfsState> {
        let base = lba_to_bytes(window_start);
        let mut head = [0u8; 12];
        file.read_exact_at(base, &mut head)?;
        let mut buf = Cursor::new(&head[..]);
        let mut magic = [0u8; 4];
        buf.read_exact(&mut magic)?;
        if &magic != WBFS_MAGIC {
            return Err(RvtHError::UnrecognizedFile);
        }
        let _n_hd_sec = buf.read_u32::<BigEndian>()?;
        let hd_sec_sz_s = buf.read_u8()?;
        let wbfs_sec_sz_s = buf.read_u8()?;
        if !(9..=12).contains(&hd_sec_sz_s) || !(WII_SEC_SZ_S..=25).contains(&wbfs_sec_sz_s) {
            return Err(RvtHError::UnrecognizedFile);
        }
        let hd_sec_sz = 1u32 << hd_sec_sz_s;
        let wbfs_sec_sz = 1u32 << wbfs_sec_sz_s;

        // Disc slot table: one byte per slot, following the fixed header.
        let mut slots = vec![0u8; hd_sec_sz as usize - 12];
        file.read_exact_at(base + 12, &mut slots)?;
        if slots[0] == 0 {
            return Err(RvtHError::UnrecognizedFile);
        }
        if slots[1..].iter().any(|&s| s != 0) {
            warn!("WBFS file contains more than one game; only slot 0 is used");
        }

        // Disc info for slot 0: disc header copy, then the sector table.
        let n_wbfs_sec_per_disc = WII_SEC_PER_DISC >> (wbfs_sec_sz_s - WII_SEC_SZ_S);
        let mut disc_header = [0u8; DISC_HEADER_COPY_SIZE];
        file.read_exact_at(base + hd_sec_sz as u64, &mut disc_header)?;
        let mut table_raw = vec![0u8; n_wbfs_sec_per_disc as usize * 2];
        file.read_exact_at(
            base + hd_sec_sz as u64 + DISC_HEADER_COPY_SIZE as u64,
            &mut table_raw,
        )?;
        let mut table = Cursor::new(&table_raw[..]);
        let mut wlba_table = Vec::with_capacity(n_wbfs_sec_per_disc as usize);
        let mut last_mapped: Option<u32> = None;
        for i in 0..n_wbfs_sec_per_disc {
            let wlba = table.read_u16::<BigEndian>()?;
            if wlba != 0 {
                last_mapped = Some(i);
            }
            wlba_table.push(wlba);
        }
        let lba_per_wsec = wbfs_sec_sz / LBA_SIZE;
        let lba_len = match last_mapped {
            Some(i) => (i + 1) * lba_per_wsec,
            None => return Err(RvtHError::NoBanks),
        };
        Ok(WbfsState {
            hd_sec_sz,
            wbfs_sec_sz,
            wlba_table,
            disc_header,
            lba_len,
        })
    }

    pub(super) fn lba_len(&self) -> u32 {
        self.lba_len
    }

    pub(super) fn read(
        &mut self,
        file: &RefFile,
        window_start: u32,
        buf: &mut [u8],
        lba: u32,
        lba_count: u32,
    ) -> Result<u32> {
        let base = lba_to_bytes(window_start);
        let lba_per_wsec = self.wbfs_sec_sz / LBA_SIZE;
        let mut done: u32 = 0;
        while done < lba_count {
            let cur = lba + done;
            let wsec = (cur / lba_per_wsec) as usize;
            let within = cur % lba_per_wsec;
            let run = (lba_per_wsec - within).min(lba_count - done);
            let dst = &mut buf[done as usize * LBA_SIZE as usize
                ..(done + run) as usize * LBA_SIZE as usize];
            match self.wlba_table[wsec] {
                0 => dst.fill(0),
                phys => {
                    let offset = base
                        + phys as u64 * self.wbfs_sec_sz as u64
                        + lba_to_bytes(within);
                    file.read_exact_at(offset, dst)?;
                }
            }
            done += run;
        }
        // The disc header lives in the disc info block; promote it to the
        // front of the image in case sector 0 was scrubbed.
        if lba == 0 {
            buf[..DISC_HEADER_COPY_SIZE].copy_from_slice(&self.disc_header);
        }
        Ok(lba_count)
    }

    pub(super) fn write(
        &mut self,
        file: &RefFile,
        window_start: u32,
        buf: &[u8],
        lba: u32,
        lba_count: u32,
    ) -> Result<u32> {
        let base = lba_to_bytes(window_start);
        let lba_per_wsec = self.wbfs_sec_sz / LBA_SIZE;
        let mut done: u32 = 0;
        while done < lba_count {
            let cur = lba + done;
            let wsec = (cur / lba_per_wsec) as usize;
            let within = cur % lba_per_wsec;
            let run = (lba_per_wsec - within).min(lba_count - done);
            let src = &buf[done as usize * LBA_SIZE as usize
                ..(done + run) as usize * LBA_SIZE as usize];
            match self.wlba_table[wsec] {
                // Writes into holes would require allocating WBFS sectors
                // through the free table, which single-game images from this
                // tool never need. EROFS, like a read-only mapping.
                0 => return Err(RvtHError::Io(std::io::Error::from_raw_os_error(30))),
                phys => {
                    let offset = base
                        + phys as u64 * self.wbfs_sec_sz as u64
                        + lba_to_bytes(within);
                    file.write_all_at(offset, src)?;
                }
            }
            done += run;
        }
        if lba == 0 {
            // Keep the promoted header copy in sync.
            self.disc_header.copy_from_slice(&buf[..DISC_HEADER_COPY_SIZE]);
            file.write_all_at(base + self.hd_sec_sz as u64, &self.disc_header)?;
        }
        Ok(lba_count)
    }
}

#[cfg(test)]
mod tests {
    use crate::reader::Reader;
    use crate::refio::RefFile;

    const HD_SEC_SZ_S: u8 = 9; // 512
    const WBFS_SEC_SZ_S: u8 = 21; // 2 MiB
    const WBFS_SEC_SZ: u64 = 1 << 21;

    /// Builds a single-game WBFS whose first two virtual sectors map to
    /// physical sectors 1 and 2.
    fn build_wbfs(path: &std::path::Path) -> RefFile {
        let file = RefFile::create(path).unwrap();
        let mut head = Vec::new();
        head.extend_from_slice(b"WBFS");
        head.extend_from_slice(&0u32.to_be_bytes());
        head.push(HD_SEC_SZ_S);
        head.push(WBFS_SEC_SZ_S);
        head.extend_from_slice(&[0, 0]);
        file.write_all_at(0, &head).unwrap();
        // Slot 0 occupied.
        file.write_all_at(12, &[1]).unwrap();
        // Disc info: header copy + translation table.
        let mut disc_header = [0u8; 0x100];
        disc_header[..6].copy_from_slice(b"RSPE01");
        disc_header[0x18..0x1C].copy_from_slice(&crate::disc::header::WII_MAGIC.to_be_bytes());
        file.write_all_at(512, &disc_header).unwrap();
        file.write_all_at(512 + 0x100, &1u16.to_be_bytes()).unwrap();
        file.write_all_at(512 + 0x102, &2u16.to_be_bytes()).unwrap();
        // Physical sectors 1 and 2.
        file.write_all_at(WBFS_SEC_SZ, &[0xAAu8; 512]).unwrap();
        file.write_all_at(2 * WBFS_SEC_SZ, &[0xBBu8; 512]).unwrap();
        file.write_all_at(3 * WBFS_SEC_SZ - 1, &[0]).unwrap();
        file
    }

    #[test]
    fn test_read_translates_sectors() {
        let dir = tempfile::tempdir().unwrap();
        let file = build_wbfs(&dir.path().join("game.wbfs"));
        let mut reader = Reader::open(&file, 0, 0).unwrap();
        assert_eq!(reader.lba_len(), 2 * (WBFS_SEC_SZ as u32 / 512));

        // LBA 0 carries the promoted disc header over sector data.
        let mut buf = [0u8; 512];
        reader.read(&mut buf, 0, 1).unwrap();
        assert_eq!(&buf[..6], b"RSPE01");
        assert!(buf[0x100..].iter().all(|&b| b == 0xAA));

        // First LBA of the second virtual sector comes from physical sector 2.
        let lba_per_wsec = WBFS_SEC_SZ as u32 / 512;
        reader.read(&mut buf, lba_per_wsec, 1).unwrap();
        assert_eq!(buf, [0xBBu8; 512]);
    }

    #[test]
    fn test_write_through_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let file = build_wbfs(&dir.path().join("game.wbfs"));
        let mut reader = Reader::open(&file, 0, 0).unwrap();
        let block = [0x42u8; 512];
        reader.write(&block, 8, 1).unwrap();
        let mut check = [0u8; 512];
        file.read_exact_at(WBFS_SEC_SZ + 8 * 512, &mut check).unwrap();
        assert_eq!(check, block);
    }
}
