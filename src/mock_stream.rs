use std::cmp::min;
use std::io::{Error, ErrorKind, Read, Result, Write};

/// A scripted stream double: reads are served from a canned buffer, writes
/// are recorded for inspection.
pub struct MockStream {
    read_buf: Vec<u8>,
    read_pos: usize,
    pub written_buf: Vec<u8>,
    err_on_read: bool,
    chunk: usize,
}

impl MockStream {
    pub fn new(read_buf: Vec<u8>) -> MockStream {
        MockStream::chunked(read_buf, usize::MAX)
    }

    /// Serve at most `chunk` bytes per read call, to exercise partial reads
    /// across line and literal boundaries.
    pub fn chunked(read_buf: Vec<u8>, chunk: usize) -> MockStream {
        MockStream {
            read_buf,
            read_pos: 0,
            written_buf: Vec::new(),
            err_on_read: false,
            chunk,
        }
    }

    pub fn new_err() -> MockStream {
        MockStream {
            read_buf: Vec::new(),
            read_pos: 0,
            written_buf: Vec::new(),
            err_on_read: true,
            chunk: usize::MAX,
        }
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.err_on_read {
            return Err(Error::new(ErrorKind::Other, "MockStream error"));
        }
        if self.read_pos >= self.read_buf.len() {
            // end of script: report EOF rather than blocking
            return Ok(0);
        }
        let len = min(
            min(buf.len(), self.chunk),
            self.read_buf.len() - self.read_pos,
        );
        buf[..len].copy_from_slice(&self.read_buf[self.read_pos..self.read_pos + len]);
        self.read_pos += len;
        Ok(len)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.written_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
