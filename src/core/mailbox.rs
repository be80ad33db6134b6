use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::core::record::{Record, RecordLayout};
use crate::core::{Error, Result};

/// Handle to one mailbox record on shared storage.
///
/// Every access seeks to offset 0 and moves the whole fixed-size record;
/// writes are followed by `sync_data`.
#[derive(Debug)]
pub struct Mailbox {
    path: PathBuf,
    file: File,
    layout: RecordLayout,
}

impl Mailbox {
    /// Opens an existing mailbox read-write.
    pub fn open(path: impl AsRef<Path>, layout: RecordLayout) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self { path, file, layout })
    }

    /// Opens the mailbox, creating it if needed, and initialises a record that
    /// is shorter than the layout size.
    pub fn create(path: impl AsRef<Path>, layout: RecordLayout) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let mailbox = Self { path, file, layout };
        mailbox.ensure_initialized()?;
        Ok(mailbox)
    }

    /// Creates the mailbox exclusively. If the file already exists (a racing
    /// creator or a stale file), falls back to opening it.
    ///
    /// Returns the handle and whether this call created the file.
    pub fn create_exclusive(path: impl AsRef<Path>, layout: RecordLayout) -> Result<(Self, bool)> {
        let path = path.as_ref().to_path_buf();
        let (file, created) = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => (file, true),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!("mailbox {} already exists, reusing", path.display());
                (OpenOptions::new().read(true).write(true).open(&path)?, false)
            }
            Err(err) => return Err(Error::Io(err)),
        };
        let mailbox = Self { path, file, layout };
        mailbox.ensure_initialized()?;
        Ok((mailbox, created))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// Reads the full record.
    ///
    /// An empty file reads as a zero record. Any other short read is
    /// `Error::Corrupt`.
    pub fn read(&self) -> Result<Record> {
        let size = self.layout.size();
        let mut buf = vec![0u8; size];
        let mut handle = &self.file;
        handle.seek(SeekFrom::Start(0))?;
        let mut filled = 0;
        while filled < size {
            match handle.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::Io(err)),
            }
        }
        match filled {
            0 => Ok(Record::default()),
            n if n == size => Record::decode(self.layout, &buf),
            _ => Err(Error::Corrupt("partial record read")),
        }
    }

    /// Writes the full record and flushes it to the medium.
    ///
    /// A failed flush is logged and ignored; some media do not support it.
    pub fn write(&self, record: &Record) -> Result<()> {
        let bytes = record.to_bytes(self.layout)?;
        let mut handle = &self.file;
        handle.seek(SeekFrom::Start(0))?;
        handle.write_all(&bytes)?;
        if let Err(err) = self.file.sync_data() {
            warn!("mailbox {}: flush failed: {err}", self.path.display());
        }
        Ok(())
    }

    /// Deletes the backing file. The handle stays usable until dropped.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Io(err)),
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        let len = self.file.metadata()?.len();
        if len < self.layout.size() as u64 {
            self.write(&Record::default())?;
        }
        Ok(())
    }
}
