//! `Transport` over a real RS-232 device, configured per the wire
//! boundary in spec §4.2/§6: raw mode, 9600 8N1, no flow control.

use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};

use onetouch_link::transport::ReadByteError;
use onetouch_link::Transport;

/// 9600 baud, as the meter's link protocol requires; not
/// configurable, since nothing else about this protocol is either.
pub const BAUD_RATE: u32 = 9600;

pub struct SerialTransport {
    port: SerialPort,
}

impl SerialTransport {
    pub fn open(path: &str) -> std::io::Result<Self> {
        let port = SerialPort::open(path, |mut settings: Settings| {
            settings.set_raw();
            settings.set_baud_rate(BAUD_RATE)?;
            settings.set_char_size(CharSize::Bits8);
            settings.set_parity(Parity::None);
            settings.set_stop_bits(StopBits::One);
            settings.set_flow_control(FlowControl::None);
            Ok(settings)
        })?;
        Ok(SerialTransport { port })
    }

    fn poll_readable(&self, timeout: Duration) -> std::io::Result<bool> {
        let mut fds = [PollFd::new(self.port.as_fd(), PollFlags::POLLIN)];
        let timeout_ms = timeout.as_millis().min(u16::MAX as u128) as u16;
        let n = poll(&mut fds, PollTimeout::from(timeout_ms)).map_err(|errno| {
            let e = std::io::Error::from_raw_os_error(errno as i32);
            log::trace!("error handling meter device driver ({e})");
            e
        })?;
        Ok(n > 0)
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.port.write(&buf[written..]) {
                Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero)),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<u8, ReadByteError> {
        if !self.poll_readable(timeout)? {
            return Err(ReadByteError::Timeout);
        }
        let mut byte = [0u8; 1];
        self.port.read_exact(&mut byte).map_err(|e| {
            log::trace!("error reading from meter device driver ({e})");
            e
        })?;
        Ok(byte[0])
    }

    fn poll_idle(&mut self, timeout: Duration) {
        std::thread::sleep(timeout);
    }

    fn drain(&mut self) {
        let mut byte = [0u8; 1];
        while matches!(self.poll_readable(Duration::ZERO), Ok(true)) {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }
}
