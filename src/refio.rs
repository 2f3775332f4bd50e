// refio.rs from rustrvth (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/rustrvth
//
// Shared, reference-counted file handle used by the bank engine and its disc
// image readers. The engine is single-threaded, so Rc/RefCell sharing is all
// that is needed; the file closes when the last holder goes away.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

struct Inner {
    file: File,
    path: PathBuf,
    writable: bool,
}

/// A cloneable handle to a backing file. Cloning increments the reference
/// count; the underlying file descriptor is shared by every clone, including
/// the writable/read-only state after a call to [`RefFile::make_writable`].
#[derive(Clone)]
pub struct RefFile {
    inner: Rc<RefCell<Inner>>,
}

impl RefFile {
    /// Opens a file read-only.
    pub fn open(path: &Path) -> io::Result<RefFile> {
        let file = File::open(path)?;
        Ok(RefFile::wrap(file, path, false))
    }

    /// Opens a file read-write.
    pub fn open_rw(path: &Path) -> io::Result<RefFile> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(RefFile::wrap(file, path, true))
    }

    /// Creates a new file (truncating any existing one) and opens it
    /// read-write. Used when extracting a bank to a new disc image.
    pub fn create(path: &Path) -> io::Result<RefFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(RefFile::wrap(file, path, true))
    }

    fn wrap(file: File, path: &Path, writable: bool) -> RefFile {
        RefFile {
            inner: Rc::new(RefCell::new(Inner {
                file,
                path: path.to_path_buf(),
                writable,
            })),
        }
    }

    /// Gets the number of live references to this file.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    pub fn is_writable(&self) -> bool {
        self.inner.borrow().writable
    }

    /// Re-opens the file read-write in place. Every clone of this handle sees
    /// the promoted descriptor.
    pub fn make_writable(&self) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.writable {
            return Ok(());
        }
        let file = OpenOptions::new().read(true).write(true).open(&inner.path)?;
        inner.file = file;
        inner.writable = true;
        Ok(())
    }

    /// Reads exactly `buf.len()` bytes at the given byte offset.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.read_exact(buf)
    }

    /// Writes all of `buf` at the given byte offset.
    pub fn write_all_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.writable {
            // EBADF, matching what the OS would report for a read-only fd.
            return Err(io::Error::from_raw_os_error(9));
        }
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(buf)
    }

    pub fn size(&self) -> io::Result<u64> {
        let inner = self.inner.borrow();
        Ok(inner.file.metadata()?.len())
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.file.flush()?;
        inner.file.sync_data()
    }

    /// Gets whether the handle refers to a block or character device rather
    /// than a regular file.
    pub fn is_device(&self) -> bool {
        let inner = self.inner.borrow();
        match inner.file.metadata() {
            Ok(meta) => {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::FileTypeExt;
                    let ft = meta.file_type();
                    ft.is_block_device() || ft.is_char_device()
                }
                #[cfg(not(unix))]
                {
                    let _ = meta;
                    false
                }
            }
            Err(_) => false,
        }
    }

    /// Truncates the file to zero and re-extends it to `len` bytes so that
    /// unwritten regions become filesystem holes. Devices are left alone.
    pub fn make_sparse(&self, len: u64) -> io::Result<()> {
        if self.is_device() {
            return Ok(());
        }
        let mut inner = self.inner.borrow_mut();
        if !inner.writable {
            return Err(io::Error::from_raw_os_error(9));
        }
        inner.file.set_len(0)?;
        inner.file.set_len(len)?;
        inner.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    pub fn path(&self) -> PathBuf {
        self.inner.borrow().path.clone()
    }
}
