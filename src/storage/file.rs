//! File-backed device

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StoreError};

use super::Storage;

/// A device backed by one preallocated data file
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    file: Arc<Mutex<File>>,
    size: u64,
}

impl FileStorage {
    /// Create (or extend) the data file to `size` bytes
    pub fn create(path: &Path, size: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() < size {
            file.set_len(size)?;
            file.sync_all()?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
            size,
        })
    }

    /// Open an existing data file; it must hold at least `size` bytes
    pub fn open(path: &Path, size: u64) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let actual = file.metadata()?.len();
        if actual < size {
            return Err(StoreError::Config(format!(
                "data file {} is {} bytes, layout needs {}",
                path.display(),
                actual,
                size
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_bounds(&self, offset: u64, len: usize) -> Result<()> {
        if offset + len as u64 > self.size {
            return Err(StoreError::Corruption(format!(
                "access [{}, {}) past device end {}",
                offset,
                offset + len as u64,
                self.size
            )));
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_bounds(offset, buf.len())?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_bounds(offset, data.len())?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}
