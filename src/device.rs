// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

use crate::error::Error;

use std::fs::{File, OpenOptions};
use std::io::{Result, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use log::{info, warn};

/// `_IO(0x12, 95)`: ask the kernel to re-read the partition table
#[cfg(target_os = "linux")]
const BLKRRPART: libc::c_ulong = 0x125f;

#[cfg(target_os = "linux")]
fn reread_partitions(file: &File) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKRRPART as _, 0) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn reread_partitions(_file: &File) -> Result<()> {
    Err(std::io::ErrorKind::Unsupported.into())
}

/// The destination block device, held open for the whole run
#[derive(Debug)]
pub struct Device {
    file: File,
    path: PathBuf,
}

impl Device {
    /// Opens `path` for writing, creating it if it does not exist
    ///
    /// Existing contents are not truncated.
    pub fn open(path: impl AsRef<Path>) -> std::result::Result<Self, Error> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .mode(0o644)
            .open(path)
            .map_err(|source| Error::DeviceOpen {
                device: path.into(),
                source,
            })?;

        Ok(Self {
            file,
            path: path.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the device and has the kernel re-read its partition table
    ///
    /// Neither step is fatal: the data is already queued and a caller can
    /// re-probe on its own.
    pub fn finalize(self) {
        if let Err(e) = self.file.sync_all() {
            warn!("Failed to sync the block device {}: {}", self.path.display(), e);
        }

        match reread_partitions(&self.file) {
            Ok(()) => info!("Re-read partition table of {}", self.path.display()),
            Err(e) => warn!(
                "Error re-probing the partitions for {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Write for Device {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()
    }
}
