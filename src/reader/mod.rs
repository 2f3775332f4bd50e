// reader/mod.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Root for the disc image reader variants. A Reader presents any supported
// backing format (plain, CISO, WBFS) as an LBA-addressable window over a
// shared file handle; variant dispatch is a match over a tagged enum.

pub mod ciso;
pub mod plain;
pub mod wbfs;

use std::io;
use log::debug;
use crate::error::{Result, RvtHError};
use crate::refio::RefFile;

/// Logical block size, in bytes. Every on-disc address in this crate is in
/// units of this constant.
pub const LBA_SIZE: u32 = 512;

/// Converts an LBA count to a byte count.
pub fn lba_to_bytes(lba: u32) -> u64 {
    lba as u64 * LBA_SIZE as u64
}

/// Converts a byte count to an LBA count. Partial blocks are discarded.
pub fn bytes_to_lba(bytes: u64) -> u32 {
    (bytes / LBA_SIZE as u64) as u32
}

/// The kind of backing storage a Reader was opened over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    /// An actual RVT-H Reader device.
    HddReader,
    /// An RVT-H HDD image file (larger than 10 GiB).
    HddImage,
    /// A standalone disc image starting at LBA 0.
    Gcm,
    /// A standalone disc image with an SDK header in front of it.
    GcmSdk,
}

enum Variant {
    Plain,
    Ciso(ciso::CisoState),
    Wbfs(wbfs::WbfsState),
}

/// An LBA-addressable window over a disc image file.
pub struct Reader {
    file: RefFile,
    lba_start: u32,
    lba_len: u32,
    image_type: ImageType,
    variant: Variant,
}

impl Reader {
    /// Opens a reader over a window of the given file, sniffing the format
    /// from the first block. If `lba_start` and `lba_len` are both zero the
    /// window covers the whole file, with any partial trailing LBA discarded.
    pub fn open(file: &RefFile, lba_start: u32, lba_len: u32) -> Result<Reader> {
        if lba_start > 0 && lba_len == 0 {
            return Err(RvtHError::Io(io::Error::from_raw_os_error(22)));
        }
        let filesize = file.size()?;
        let (lba_start, lba_len) = if lba_start == 0 && lba_len == 0 {
            (0, bytes_to_lba(filesize))
        } else {
            (lba_start, lba_len)
        };
        let image_type = infer_image_type(file, filesize, lba_start);

        // Sniff the backing format from the first block of the window. A
        // brand-new (empty) destination file is always plain.
        let mut magic = [0u8; 4];
        if filesize >= lba_to_bytes(lba_start) + 4 {
            file.read_exact_at(lba_to_bytes(lba_start), &mut magic)?;
        }
        let mut reader = Reader {
            file: file.clone(),
            lba_start,
            lba_len,
            image_type,
            variant: Variant::Plain,
        };
        match &magic {
            ciso::CISO_MAGIC => {
                debug!("CISO image detected at LBA {lba_start:#x}");
                let state = ciso::CisoState::open(file, lba_start)?;
                reader.lba_len = state.lba_len();
                reader.variant = Variant::Ciso(state);
            }
            wbfs::WBFS_MAGIC => {
                debug!("WBFS image detected at LBA {lba_start:#x}");
                let state = wbfs::WbfsState::open(file, lba_start)?;
                reader.lba_len = state.lba_len();
                reader.variant = Variant::Wbfs(state);
            }
            _ => {}
        }
        Ok(reader)
    }

    /// Reads `lba_count` blocks starting at window-relative `lba` into `buf`.
    /// Returns the number of LBAs read.
    pub fn read(&mut self, buf: &mut [u8], lba: u32, lba_count: u32) -> Result<u32> {
        self.check_range(lba, lba_count, buf.len())?;
        match &mut self.variant {
            Variant::Plain => plain::read(&self.file, self.lba_start, buf, lba, lba_count),
            Variant::Ciso(state) => state.read(&self.file, self.lba_start, buf, lba, lba_count),
            Variant::Wbfs(state) => state.read(&self.file, self.lba_start, buf, lba, lba_count),
        }
    }

    /// Writes `lba_count` blocks starting at window-relative `lba` from `buf`.
    /// Returns the number of LBAs written.
    pub fn write(&mut self, buf: &[u8], lba: u32, lba_count: u32) -> Result<u32> {
        self.check_range(lba, lba_count, buf.len())?;
        match &mut self.variant {
            Variant::Plain => plain::write(&self.file, self.lba_start, buf, lba, lba_count),
            Variant::Ciso(state) => state.write(&self.file, self.lba_start, buf, lba, lba_count),
            Variant::Wbfs(state) => state.write(&self.file, self.lba_start, buf, lba, lba_count),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Shrinks the window by `delta` LBAs from the front. Used after writing
    /// an SDK header so that subsequent image I/O lands past it.
    pub fn lba_adjust(&mut self, delta: u32) {
        if delta > self.lba_len {
            return;
        }
        self.lba_start += delta;
        self.lba_len -= delta;
        if self.image_type == ImageType::Gcm && self.lba_start > 0 {
            self.image_type = ImageType::GcmSdk;
        }
    }

    pub fn lba_start(&self) -> u32 {
        self.lba_start
    }

    pub fn lba_len(&self) -> u32 {
        self.lba_len
    }

    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    pub(crate) fn file(&self) -> &RefFile {
        &self.file
    }

    fn check_range(&self, lba: u32, lba_count: u32, buf_len: usize) -> Result<()> {
        if lba as u64 + lba_count as u64 > self.lba_len as u64
            || buf_len < lba_count as usize * LBA_SIZE as usize
        {
            return Err(RvtHError::eio());
        }
        Ok(())
    }
}

fn infer_image_type(file: &RefFile, filesize: u64, lba_start: u32) -> ImageType {
    if file.is_device() {
        ImageType::HddReader
    } else if filesize > 10 * 1024 * 1024 * 1024 {
        ImageType::HddImage
    } else if lba_start == 0 {
        ImageType::Gcm
    } else {
        ImageType::GcmSdk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_image(len: usize) -> (tempfile::TempDir, RefFile) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.gcm");
        let file = RefFile::create(&path).unwrap();
        file.write_all_at(0, &vec![0u8; len]).unwrap();
        (dir, file)
    }

    #[test]
    fn test_open_whole_file() {
        let (_dir, file) = temp_image(4096 + 100);
        let reader = Reader::open(&file, 0, 0).unwrap();
        // Partial trailing LBA is discarded.
        assert_eq!(reader.lba_len(), 8);
        assert_eq!(reader.image_type(), ImageType::Gcm);
    }

    #[test]
    fn test_read_out_of_range() {
        let (_dir, file) = temp_image(4096);
        let mut reader = Reader::open(&file, 0, 0).unwrap();
        let mut buf = vec![0u8; 512];
        assert!(reader.read(&mut buf, 8, 1).is_err());
        assert_eq!(reader.read(&mut buf, 7, 1).unwrap(), 1);
    }

    #[test]
    fn test_lba_adjust() {
        let (_dir, file) = temp_image(64 * 512);
        let mut reader = Reader::open(&file, 0, 0).unwrap();
        file.write_all_at(10 * 512, b"payload").unwrap();
        reader.lba_adjust(10);
        assert_eq!(reader.lba_start(), 10);
        assert_eq!(reader.lba_len(), 54);
        assert_eq!(reader.image_type(), ImageType::GcmSdk);
        let mut buf = vec![0u8; 512];
        reader.read(&mut buf, 0, 1).unwrap();
        assert_eq!(&buf[..7], b"payload");
    }
}
