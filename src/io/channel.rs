// src/io/channel.rs
//! Thread-safe seekable byte channel
//!
//! Every primitive operation takes the channel lock for its own duration only,
//! so readers and writers sharing one channel are serialized, never deadlocked.

use crate::utils::errors::{ContinuumError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Any stream a channel can wrap
pub trait SeekableStream: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> SeekableStream for T {}

/// Byte sink/source with a single physical cursor
pub struct ByteChannel {
    inner: Mutex<Option<Box<dyn SeekableStream>>>,
}

impl ByteChannel {
    /// Wrap an arbitrary stream
    pub fn new<S: SeekableStream + 'static>(stream: S) -> Self {
        Self {
            inner: Mutex::new(Some(Box::new(stream))),
        }
    }

    /// Empty growable in-memory channel
    pub fn in_memory() -> Self {
        Self::new(Cursor::new(Vec::new()))
    }

    /// In-memory channel over existing bytes, cursor at 0
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Cursor::new(bytes))
    }

    /// Create (or truncate) a file for reading and writing
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;

        debug!("Created capture file {:?}", path.as_ref());
        Ok(Self::new(file))
    }

    /// Open an existing file for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        Ok(Self::new(file))
    }

    /// Open an existing file read-only (writes will fail)
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(file))
    }

    fn with_stream<R>(
        &self,
        op: impl FnOnce(&mut dyn SeekableStream) -> io::Result<R>,
    ) -> Result<R> {
        let mut guard = self.inner.lock();
        let stream = guard.as_mut().ok_or(ContinuumError::ChannelClosed)?;
        Ok(op(stream.as_mut())?)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.with_stream(|s| s.read(buf))
    }

    pub fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        self.with_stream(|s| s.read_exact(buf))
    }

    pub fn write_all(&self, buf: &[u8]) -> Result<()> {
        self.with_stream(|s| s.write_all(buf))
    }

    pub fn flush(&self) -> Result<()> {
        self.with_stream(|s| s.flush())
    }

    /// Move the cursor to an absolute offset
    pub fn seek(&self, position: u64) -> Result<u64> {
        self.with_stream(|s| s.seek(SeekFrom::Start(position)))
    }

    /// Move the cursor to the end, returning the new offset
    pub fn seek_end(&self) -> Result<u64> {
        self.with_stream(|s| s.seek(SeekFrom::End(0)))
    }

    pub fn position(&self) -> Result<u64> {
        self.with_stream(|s| s.stream_position())
    }

    /// Current length in bytes; the cursor is left untouched
    pub fn len(&self) -> Result<u64> {
        self.with_stream(|s| {
            let current = s.stream_position()?;
            let end = s.seek(SeekFrom::End(0))?;
            if current != end {
                s.seek(SeekFrom::Start(current))?;
            }
            Ok(end)
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Bytes between the cursor and the end
    pub fn remaining(&self) -> Result<u64> {
        self.with_stream(|s| {
            let current = s.stream_position()?;
            let end = s.seek(SeekFrom::End(0))?;
            s.seek(SeekFrom::Start(current))?;
            Ok(end.saturating_sub(current))
        })
    }

    /// Copy the whole channel contents; the cursor is left untouched
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        self.with_stream(|s| {
            let current = s.stream_position()?;
            s.seek(SeekFrom::Start(0))?;
            let mut bytes = Vec::new();
            s.read_to_end(&mut bytes)?;
            s.seek(SeekFrom::Start(current))?;
            Ok(bytes)
        })
    }

    /// Drop the underlying stream. Later operations fail with `ChannelClosed`.
    pub fn close(&self) {
        let mut guard = self.inner.lock();
        if let Some(mut stream) = guard.take() {
            let _ = stream.flush();
            debug!("Byte channel closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl std::fmt::Debug for ByteChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteChannel")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::NamedTempFile;

    #[test]
    fn test_memory_channel() {
        let channel = ByteChannel::in_memory();
        assert!(channel.is_empty().unwrap());

        channel.write_all(b"Hello, World!").unwrap();
        assert_eq!(channel.len().unwrap(), 13);
        assert_eq!(channel.position().unwrap(), 13);

        channel.seek(7).unwrap();
        let mut buf = [0u8; 5];
        channel.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"World");
        assert_eq!(channel.remaining().unwrap(), 1);
    }

    #[test]
    fn test_len_preserves_cursor() {
        let channel = ByteChannel::from_bytes(vec![1, 2, 3, 4]);
        channel.seek(2).unwrap();
        assert_eq!(channel.len().unwrap(), 4);
        assert_eq!(channel.position().unwrap(), 2);
        assert_eq!(channel.snapshot().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(channel.position().unwrap(), 2);
    }

    #[test]
    fn test_close() {
        let channel = ByteChannel::in_memory();
        channel.close();
        assert!(channel.is_closed());

        let result = channel.write_all(b"data");
        assert!(matches!(result, Err(ContinuumError::ChannelClosed)));
    }

    #[test]
    fn test_file_channel() {
        let file = NamedTempFile::new().unwrap();
        let channel = ByteChannel::create(file.path()).unwrap();
        channel.write_all(b"capture").unwrap();
        channel.flush().unwrap();
        drop(channel);

        let channel = ByteChannel::open_read_only(file.path()).unwrap();
        assert_eq!(channel.len().unwrap(), 7);
        assert!(channel.write_all(b"x").is_err());
    }

    #[test]
    fn test_concurrent_appends() {
        let channel = Arc::new(ByteChannel::in_memory());
        let mut handles = vec![];

        for _ in 0..8 {
            let c = Arc::clone(&channel);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    c.write_all(&[0xAB; 4]).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(channel.len().unwrap(), 8 * 100 * 4);
    }
}
