// reader/ciso.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Compact ISO (CISO) disc image access. The format stores only the blocks
// that contain data: a block-presence map at the head of the file, then the
// present blocks back to back. Absent blocks read as zeroes.

use std::io::{Cursor, Read};
use byteorder::{LittleEndian, ReadBytesExt};
use crate::error::{Result, RvtHError};
use crate::reader::{lba_to_bytes, LBA_SIZE};
use crate::refio::RefFile;

pub const CISO_MAGIC: &[u8; 4] = b"CISO";
/// Fixed header: magic, block size (little-endian), reserved padding.
pub const CISO_HEADER_SIZE: u32 = 32;
/// Number of entries in the block-presence map.
pub const CISO_MAP_SIZE: usize = 32768;
/// Map value for a block with no backing data.
const CISO_BLOCK_UNUSED: u16 = 0xFFFF;

pub(super) struct CisoState {
    /// Map index -> physical block number, [`CISO_BLOCK_UNUSED`] if absent.
    index: Vec<u16>,
    block_size: u32,
    blocks_used: u16,
    lba_len: u32,
}

impl CisoState {
    pub(super) fn open(file: &RefFile, window_start: u32) -> Result<CisoState> {
        let base = lba_to_bytes(window_start);
        let mut header = [0u8; CISO_HEADER_SIZE as usize];
        file.read_exact_at(base, &mut header)?;
        let mut buf = Cursor::new(&header[..]);
        let mut magic = [0u8; 4];
        buf.read_exact(&mut magic)?;
        if &magic != CISO_MAGIC {
            return Err(RvtHError::UnrecognizedFile);
        }
        let block_size = buf.read_u32::<LittleEndian>()?;
        if !block_size.is_power_of_two()
            || block_size < LBA_SIZE * 2
            || block_size > 16 * 1024 * 1024
        {
            return Err(RvtHError::UnrecognizedFile);
        }

        let mut map = vec![0u8; CISO_MAP_SIZE];
        file.read_exact_at(base + CISO_HEADER_SIZE as u64, &mut map)?;

        // Present blocks are stored in map order; turn the presence flags
        // into physical block numbers.
        let mut index = vec![CISO_BLOCK_UNUSED; CISO_MAP_SIZE];
        let mut blocks_used: u16 = 0;
        let mut last_block: Option<usize> = None;
        for (i, &flag) in map.iter().enumerate() {
            if flag != 0 {
                index[i] = blocks_used;
                blocks_used += 1;
                last_block = Some(i);
            }
        }
        let lba_per_block = block_size / LBA_SIZE;
        let lba_len = match last_block {
            Some(i) => (i as u32 + 1) * lba_per_block,
            None => 0,
        };
        Ok(CisoState {
            index,
            block_size,
            blocks_used,
            lba_len,
        })
    }

    /// The virtual image length implied by the highest mapped block.
    pub(super) fn lba_len(&self) -> u32 {
        self.lba_len
    }

    fn data_base(&self, window_start: u32) -> u64 {
        lba_to_bytes(window_start) + CISO_HEADER_SIZE as u64 + CISO_MAP_SIZE as u64
    }

    pub(super) fn read(
        &mut self,
        file: &RefFile,
        window_start: u32,
        buf: &mut [u8],
        lba: u32,
        lba_count: u32,
    ) -> Result<u32> {
        let lba_per_block = self.block_size / LBA_SIZE;
        let data_base = self.data_base(window_start);
        let mut done: u32 = 0;
        while done < lba_count {
            let cur = lba + done;
            let block = (cur / lba_per_block) as usize;
            let within = cur % lba_per_block;
            // Stay inside one block per pass.
            let run = (lba_per_block - within).min(lba_count - done);
            let dst = &mut buf[done as usize * LBA_SIZE as usize
                ..(done + run) as usize * LBA_SIZE as usize];
            match self.index[block] {
                CISO_BLOCK_UNUSED => dst.fill(0),
                phys => {
                    let offset = data_base
                        + phys as u64 * self.block_size as u64
                        + lba_to_bytes(within);
                    file.read_exact_at(offset, dst)?;
                }
            }
            done += run;
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
        let lba_per_block = self.block_size / LBA_SIZE;
        let base = lba_to_bytes(window_start);
        let data_base = self.data_base(window_start);
        let mut done: u32 = 0;
        while done < lba_count {
            let cur = lba + done;
            let block = (cur / lba_per_block) as usize;
            let within = cur % lba_per_block;
            let run = (lba_per_block - within).min(lba_count - done);
            let src = &buf[done as usize * LBA_SIZE as usize
                ..(done + run) as usize * LBA_SIZE as usize];
            let phys = match self.index[block] {
                CISO_BLOCK_UNUSED => {
                    // Allocate a fresh block at the tail and flag it in the
                    // on-disk map. Unwritten parts of the block stay zero.
                    // The in-memory index stays authoritative for this
                    // session; images built by the copy engine are written
                    // in ascending order, which keeps map order intact.
                    let phys = self.blocks_used;
                    self.blocks_used += 1;
                    self.index[block] = phys;
                    file.write_all_at(base + CISO_HEADER_SIZE as u64 + block as u64, &[1])?;
                    let end = data_base + (phys as u64 + 1) * self.block_size as u64;
                    // Extend the file so the whole block exists.
                    if file.size()? < end {
                        file.write_all_at(end - 1, &[0])?;
                    }
                    if (block as u32 + 1) * lba_per_block > self.lba_len {
                        self.lba_len = (block as u32 + 1) * lba_per_block;
                    }
                    phys
                }
                phys => phys,
            };
            let offset = data_base + phys as u64 * self.block_size as u64 + lba_to_bytes(within);
            file.write_all_at(offset, src)?;
            done += run;
        }
        Ok(lba_count)
    }
}
