// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

use std::io::{ErrorKind, Read, Result, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A reader or writer which counts the bytes passing through it
///
/// The count is shared, so it can be observed from another thread while
/// the stream is in use.
#[derive(Debug)]
pub struct Counted<T> {
    inner: T,
    count: Arc<AtomicU64>,
}

impl<T> Counted<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            count: Arc::default(),
        }
    }

    #[cfg(test)]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Read for Counted<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let size = self.inner.read(buf)?;
        self.count.fetch_add(size as u64, Ordering::Relaxed);
        Ok(size)
    }
}

impl<T: Write> Write for Counted<T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let size = self.inner.write(buf)?;
        self.count.fetch_add(size as u64, Ordering::Relaxed);
        Ok(size)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

/// A read-only view of the counters of a [`Tracked`] stream
#[derive(Clone, Debug)]
pub struct Progress {
    read: Arc<AtomicU64>,
    written: Arc<AtomicU64>,
}

impl Progress {
    /// Bytes read from the source so far
    pub fn read_count(&self) -> u64 {
        self.read.load(Ordering::Relaxed)
    }

    /// Bytes accepted by the sink so far
    pub fn write_count(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

/// A source and a sink, each counted, joined by a copy
#[derive(Debug)]
pub struct Tracked<R: Read, W: Write> {
    reader: Counted<R>,
    writer: Counted<W>,
}

impl<R: Read, W: Write> Tracked<R, W> {
    const BUFFER: usize = 1 << 20;

    pub fn new(writer: W, reader: R) -> Self {
        Self {
            reader: Counted::new(reader),
            writer: Counted::new(writer),
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            read: self.reader.count.clone(),
            written: self.writer.count.clone(),
        }
    }

    /// Copies the source into the sink until the source is exhausted
    ///
    /// Stops at the first read or write error. Returns the number of bytes
    /// written.
    pub fn copy(&mut self) -> Result<u64> {
        let mut buffer = vec![0u8; Self::BUFFER];
        let mut total = 0u64;

        loop {
            let size = match self.reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            self.writer.write_all(&buffer[..size])?;
            total += size as u64;
        }

        self.writer.flush()?;
        Ok(total)
    }

    #[cfg(test)]
    pub fn into_inner(self) -> (R, W) {
        (self.reader.into_inner(), self.writer.into_inner())
    }
}
