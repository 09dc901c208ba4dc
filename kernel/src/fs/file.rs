use crate::error::{DevError, Result};
use crate::fs::dev::devnum::DeviceNumber;
use alloc::sync::Arc;
use core::fmt;

bitflags::bitflags! {
    /// Access requested at open time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const RDWR = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Seek whence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    /// Seek from start of file
    Start,
    /// Seek from current position
    Current,
    /// Seek from end of file
    End,
}

/// Per-open state handed to every handler call.
///
/// A fresh `OpenFile` starts at position zero. It is owned by whoever opened
/// the device and never shared between opens.
#[derive(Debug)]
pub struct OpenFile {
    dev: DeviceNumber,
    flags: OpenFlags,
    /// File position, advanced by handlers.
    pub pos: u64,
}

impl OpenFile {
    pub fn new(dev: DeviceNumber, flags: OpenFlags) -> Self {
        Self { dev, flags, pos: 0 }
    }

    pub fn dev(&self) -> DeviceNumber {
        self.dev
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }
}

/// File operations of a character device.
///
/// One value serves every open of the device; anything per-open lives in the
/// [`OpenFile`] passed in.
pub trait FileOperations: Send + Sync {
    /// Called once per open, before the file is handed out.
    fn open(&self, _file: &mut OpenFile) -> Result<()> {
        Ok(())
    }

    /// Read into `buf` at `file.pos`.
    fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize>;

    /// Write from `buf`.
    fn write(&self, file: &mut OpenFile, buf: &[u8]) -> Result<usize>;

    fn ioctl(&self, _file: &mut OpenFile, _cmd: u32, _arg: usize) -> Result<usize> {
        Err(DevError::NotSupported)
    }

    /// Seek (optional, default not supported)
    fn llseek(&self, _file: &mut OpenFile, _whence: SeekWhence, _offset: i64) -> Result<u64> {
        Err(DevError::NotSupported)
    }

    /// Called once when the open file goes away.
    fn release(&self, _file: &mut OpenFile) -> Result<()> {
        Ok(())
    }
}

/// An open character device.
///
/// Holds the handler itself rather than its dispatch entry, so the device can
/// be unregistered while the file is still open.
pub struct File {
    ops: Arc<dyn FileOperations>,
    file: OpenFile,
    released: bool,
}

impl File {
    /// Run the handler's `open` for a new session on `dev`.
    pub fn open(ops: Arc<dyn FileOperations>, dev: DeviceNumber, flags: OpenFlags) -> Result<Self> {
        let mut file = OpenFile::new(dev, flags);
        ops.open(&mut file)?;
        Ok(Self {
            ops,
            file,
            released: false,
        })
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.file.flags.contains(OpenFlags::READ) {
            return Err(DevError::BadFile);
        }
        self.ops.read(&mut self.file, buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.file.flags.contains(OpenFlags::WRITE) {
            return Err(DevError::BadFile);
        }
        self.ops.write(&mut self.file, buf)
    }

    pub fn ioctl(&mut self, cmd: u32, arg: usize) -> Result<usize> {
        self.ops.ioctl(&mut self.file, cmd, arg)
    }

    pub fn seek(&mut self, whence: SeekWhence, offset: i64) -> Result<u64> {
        self.ops.llseek(&mut self.file, whence, offset)
    }

    pub fn position(&self) -> u64 {
        self.file.pos
    }

    pub fn dev(&self) -> DeviceNumber {
        self.file.dev
    }

    /// Release the file and report the handler's verdict.
    pub fn close(mut self) -> Result<()> {
        self.released = true;
        self.ops.release(&mut self.file)
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(err) = self.ops.release(&mut self.file) {
                log::warn!("chrdev: release of {} failed: {}", self.file.dev, err);
            }
        }
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("dev", &self.file.dev)
            .field("pos", &self.file.pos)
            .field("flags", &self.file.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::dev::devnum::Major;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        opens: AtomicUsize,
        releases: AtomicUsize,
    }

    impl FileOperations for Counting {
        fn open(&self, _file: &mut OpenFile) -> Result<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn read(&self, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize> {
            file.pos += buf.len() as u64;
            Ok(buf.len())
        }

        fn write(&self, _file: &mut OpenFile, buf: &[u8]) -> Result<usize> {
            Ok(buf.len())
        }

        fn release(&self, _file: &mut OpenFile) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn dev() -> DeviceNumber {
        DeviceNumber::new(Major::MISC, 3)
    }

    #[test]
    fn close_releases_once() {
        let ops = Arc::new(Counting::default());
        let file = File::open(ops.clone(), dev(), OpenFlags::RDWR).unwrap();
        file.close().unwrap();
        assert_eq!(ops.opens.load(Ordering::SeqCst), 1);
        assert_eq!(ops.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_unclosed_file() {
        let ops = Arc::new(Counting::default());
        {
            let mut file = File::open(ops.clone(), dev(), OpenFlags::READ).unwrap();
            let mut buf = [0u8; 4];
            assert_eq!(file.read(&mut buf).unwrap(), 4);
            assert_eq!(file.position(), 4);
        }
        assert_eq!(ops.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn access_mode_is_enforced() {
        let ops = Arc::new(Counting::default());
        let mut file = File::open(ops, dev(), OpenFlags::READ).unwrap();
        assert_eq!(file.write(b"1"), Err(DevError::BadFile));
        assert_eq!(file.seek(SeekWhence::Start, 0), Err(DevError::NotSupported));
        assert_eq!(file.ioctl(0, 0), Err(DevError::NotSupported));
    }
}
