// reader/plain.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Plain disc image access: a linear mapping from LBAs to file bytes. Used for
// .gcm files and RVT-H HDD images/devices.

use crate::error::Result;
use crate::reader::{lba_to_bytes, LBA_SIZE};
use crate::refio::RefFile;

pub(super) fn read(
    file: &RefFile,
    window_start: u32,
    buf: &mut [u8],
    lba: u32,
    lba_count: u32,
) -> Result<u32> {
    let offset = lba_to_bytes(window_start + lba);
    let len = lba_count as usize * LBA_SIZE as usize;
    file.read_exact_at(offset, &mut buf[..len])?;
    Ok(lba_count)
}

pub(super) fn write(
    file: &RefFile,
    window_start: u32,
    buf: &[u8],
    lba: u32,
    lba_count: u32,
) -> Result<u32> {
    let offset = lba_to_bytes(window_start + lba);
    let len = lba_count as usize * LBA_SIZE as usize;
    file.write_all_at(offset, &buf[..len])?;
    Ok(lba_count)
}
