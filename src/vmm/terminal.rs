use std::io::{self, IsTerminal, StdinLock, Write};
use std::os::fd::{AsRawFd, RawFd};

use log::{debug, warn};
use vmm_sys_util::terminal::Terminal;

use super::event_loop::KeyInput;
use crate::error::{Result, VmmError};


/// Clear the screen and home the cursor.
pub const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[H";


fn os_error(e: vmm_sys_util::errno::Error) -> VmmError {
    VmmError::Terminal(io::Error::from_raw_os_error(e.errno()))
}


fn get_termios(fd: RawFd) -> Result<libc::termios> {
    // SAFETY: termios is plain data; tcgetattr fills it or fails.
    let mut termios: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: `termios` is a valid, writable termios.
    if unsafe { libc::tcgetattr(fd, &mut termios) } < 0 {
        return Err(VmmError::Terminal(io::Error::last_os_error()));
    }
    Ok(termios)
}


fn set_termios(fd: RawFd, termios: &libc::termios) -> Result<()> {
    // SAFETY: `termios` is a valid termios read back from the same kind of fd.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) } < 0 {
        return Err(VmmError::Terminal(io::Error::last_os_error()));
    }
    Ok(())
}


/// Turns signal generation back on, so Ctrl-C still raises SIGINT while echo
/// and line buffering stay off.
pub fn with_signals(mut termios: libc::termios) -> libc::termios {
    termios.c_lflag |= libc::ISIG;
    termios
}


/// Host stdin as the guest keyboard. While alive, a tty stdin is in raw,
/// no-echo mode with signal keys active; dropping it restores the settings
/// found at acquire time.
pub struct HostTerminal {
    stdin: StdinLock<'static>,
    saved: Option<libc::termios>,
    eof: bool,
}


impl HostTerminal {
    pub fn acquire() -> Result<Self> {
        let stdin = io::stdin().lock();
        if !stdin.is_terminal() {
            debug!("stdin is not a terminal, reading it as-is");
            return Ok(Self { stdin, saved: None, eof: false });
        }

        let fd = stdin.as_raw_fd();
        let original = get_termios(fd)?;
        stdin.set_raw_mode().map_err(os_error)?;
        // From here on, dropping `term` puts the original settings back.
        let term = Self { stdin, saved: Some(original), eof: false };
        set_termios(fd, &with_signals(get_termios(fd)?))?;

        let mut out = io::stdout();
        out.write_all(CLEAR_SCREEN).map_err(VmmError::Terminal)?;
        out.flush().map_err(VmmError::Terminal)?;
        Ok(term)
    }

    fn input_ready(&self) -> Result<bool> {
        let mut pfd = libc::pollfd { fd: self.stdin.as_raw_fd(), events: libc::POLLIN, revents: 0 };
        // SAFETY: one valid pollfd, zero timeout.
        let n = unsafe { libc::poll(&mut pfd, 1, 0) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(VmmError::Terminal(err));
        }
        Ok(pfd.revents & (libc::POLLIN | libc::POLLHUP) != 0)
    }
}


impl KeyInput for HostTerminal {
    fn poll_key(&mut self) -> Result<Option<u8>> {
        if self.eof || !self.input_ready()? {
            return Ok(None);
        }
        let mut buf = [0u8; 1];
        match self.stdin.read_raw(&mut buf) {
            Ok(0) => {
                debug!("stdin closed, no further keyboard input");
                self.eof = true;
                Ok(None)
            }
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.errno() == libc::EINTR || e.errno() == libc::EAGAIN => Ok(None),
            Err(e) => Err(os_error(e)),
        }
    }
}


impl Drop for HostTerminal {
    fn drop(&mut self) {
        if let Some(original) = self.saved.take() {
            if let Err(e) = set_termios(self.stdin.as_raw_fd(), &original) {
                warn!("failed to restore terminal mode: {:?}", e);
            }
        }
    }
}
