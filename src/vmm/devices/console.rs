//! Line-buffered console sink on port 0x42.
//!
//! The guest writes one byte at a time. Bytes collect in a bounded
//! [`LineBuffer`] and are written to the host when the guest sends `\n`.

use std::io::Write;
use std::thread;
use std::time::Duration;

use log::warn;

use super::{PortDevice, CONSOLE_PORT};
use crate::config::ConsoleConfig;
use crate::error::{Result, VmmError};
use crate::types::Direction;


/// ANSI "cursor position" with no arguments: move to row 1, column 1.
pub const CURSOR_HOME: &[u8] = b"\x1b[H";


/// Returned by [`LineBuffer::push`] when the buffer already holds `capacity` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;


/// Byte buffer that refuses to grow past a fixed capacity.
#[derive(Debug)]
pub struct LineBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}


impl LineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { bytes: Vec::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, byte: u8) -> std::result::Result<(), BufferFull> {
        if self.bytes.len() >= self.capacity {
            return Err(BufferFull);
        }
        self.bytes.push(byte);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}


/// Printable ASCII passes through, everything else becomes `placeholder`.
pub fn sanitize(line: &[u8], placeholder: u8) -> Vec<u8> {
    line.iter()
        .map(|&b| if b == b' ' || b.is_ascii_graphic() { b } else { placeholder })
        .collect()
}


pub struct Console<W: Write> {
    buffer: LineBuffer,
    out: W,
    pacing: Duration,
    placeholder: u8,
    home_cursor: bool,
    lines: u64,
}


impl<W: Write> Console<W> {
    pub fn new(out: W, config: &ConsoleConfig) -> Self {
        Self {
            // A zero-sized buffer could never accept the byte that follows a forced flush.
            buffer: LineBuffer::with_capacity(config.capacity.max(1)),
            out,
            pacing: config.pacing,
            placeholder: config.placeholder,
            home_cursor: config.home_cursor,
            lines: 0,
        }
    }

    pub fn append(&mut self, byte: u8) -> Result<()> {
        if byte == b'\n' {
            return self.flush_line();
        }
        if self.buffer.push(byte) == Err(BufferFull) {
            warn!(
                "console line exceeds {} bytes, flushing early",
                self.buffer.capacity()
            );
            self.flush_line()?;
            // Just emptied, so this cannot fail.
            let _ = self.buffer.push(byte);
        }
        Ok(())
    }

    fn flush_line(&mut self) -> Result<()> {
        let line = sanitize(self.buffer.as_slice(), self.placeholder);
        self.buffer.clear();
        self.lines += 1;

        self.out.write_all(&line).map_err(VmmError::Console)?;
        self.out.flush().map_err(VmmError::Console)?;
        if !self.pacing.is_zero() {
            thread::sleep(self.pacing);
        }
        if self.home_cursor {
            self.out.write_all(CURSOR_HOME).map_err(VmmError::Console)?;
            self.out.flush().map_err(VmmError::Console)?;
        }
        Ok(())
    }

    pub fn pending(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn lines_flushed(&self) -> u64 {
        self.lines
    }

    pub fn sink(&self) -> &W {
        &self.out
    }
}


impl<W: Write> PortDevice for Console<W> {
    fn read(&mut self, port: u16) -> Result<u8> {
        Err(VmmError::UnhandledPortIo { direction: Direction::In, port, size: 1 })
    }

    fn write(&mut self, port: u16, value: u8) -> Result<()> {
        match port {
            CONSOLE_PORT => self.append(value),
            _ => Err(VmmError::UnhandledPortIo { direction: Direction::Out, port, size: 1 }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(capacity: usize) -> ConsoleConfig {
        ConsoleConfig {
            capacity,
            pacing: Duration::ZERO,
            placeholder: b' ',
            home_cursor: false,
        }
    }

    fn feed<W: Write>(console: &mut Console<W>, bytes: &[u8]) {
        for &b in bytes {
            console.append(b).unwrap();
        }
    }

    #[test]
    fn newline_flushes_the_line_without_the_newline() {
        let mut console = Console::new(Vec::new(), &quiet(500));
        feed(&mut console, b"AB\n");
        assert_eq!(console.sink().as_slice(), b"AB");
        assert!(console.pending().is_empty());
        assert_eq!(console.lines_flushed(), 1);
    }

    #[test]
    fn nothing_is_written_before_newline() {
        let mut console = Console::new(Vec::new(), &quiet(500));
        feed(&mut console, b"hello");
        assert!(console.sink().is_empty());
        assert_eq!(console.pending(), b"hello");
    }

    #[test]
    fn control_bytes_become_placeholder() {
        let mut console = Console::new(Vec::new(), &quiet(500));
        feed(&mut console, &[b'A', 0x07, b'B', 0xff, b'\t', b'\n']);
        assert_eq!(console.sink().as_slice(), b"A B  ");
    }

    #[test]
    fn placeholder_is_configurable() {
        let cfg = ConsoleConfig { placeholder: b'?', ..quiet(8) };
        let mut console = Console::new(Vec::new(), &cfg);
        feed(&mut console, &[0x01, b'x', b'\n']);
        assert_eq!(console.sink().as_slice(), b"?x");
    }

    #[test]
    fn cursor_returns_home_after_each_line() {
        let cfg = ConsoleConfig { home_cursor: true, ..quiet(16) };
        let mut console = Console::new(Vec::new(), &cfg);
        feed(&mut console, b"hi\nyo\n");
        assert_eq!(console.sink().as_slice(), b"hi\x1b[Hyo\x1b[H");
    }

    #[test]
    fn full_buffer_flushes_before_overflowing() {
        let mut console = Console::new(Vec::new(), &quiet(4));
        feed(&mut console, b"abcdef");
        assert_eq!(console.sink().as_slice(), b"abcd");
        assert_eq!(console.pending(), b"ef");

        feed(&mut console, b"\n");
        assert_eq!(console.sink().as_slice(), b"abcdef");
        assert_eq!(console.lines_flushed(), 2);
    }

    #[test]
    fn line_buffer_rejects_past_capacity() {
        let mut buf = LineBuffer::with_capacity(2);
        assert_eq!(buf.push(1), Ok(()));
        assert_eq!(buf.push(2), Ok(()));
        assert_eq!(buf.push(3), Err(BufferFull));
        assert_eq!(buf.as_slice(), &[1, 2]);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.push(3), Ok(()));
    }

    #[test]
    fn console_port_is_write_only() {
        let mut console = Console::new(Vec::new(), &quiet(4));
        let err = console.read(CONSOLE_PORT).unwrap_err();
        assert!(matches!(err, VmmError::UnhandledPortIo { direction: Direction::In, port: 0x42, .. }));
    }
}
