use std::io::{ErrorKind, Read};

use bytes::{Buf, Bytes, BytesMut};

use crate::codec::find_subslice;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads terminator-delimited records from any `Read` stream.
///
/// Handles partial reads internally. Bytes of an unterminated record stay
/// buffered across end-of-file, because on a FIFO the next writer to open the
/// pipe may deliver the rest.
pub struct RecordReader<T> {
    inner: T,
    buf: BytesMut,
    terminator: Vec<u8>,
}

impl<T: Read> RecordReader<T> {
    /// Create a record reader splitting on `terminator`.
    pub fn new(inner: T, terminator: impl Into<Vec<u8>>) -> Result<Self> {
        let terminator = terminator.into();
        if terminator.is_empty() {
            return Err(FrameError::EmptyTerminator);
        }
        Ok(Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            terminator,
        })
    }

    /// Read the next record, terminator stripped.
    ///
    /// Returns `Ok(None)` when the stream reports end-of-file before a complete
    /// record is available. On a FIFO that means no writer currently has the
    /// pipe open; reading again later may yield more data.
    pub fn read_record(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(pos) = find_subslice(&self.buf, &self.terminator) {
                let record = self.buf.split_to(pos).freeze();
                self.buf.advance(self.terminator.len());
                return Ok(Some(record));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Ok(None);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes buffered but not yet returned as a record.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// The record terminator.
    pub fn terminator(&self) -> &[u8] {
        &self.terminator
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
