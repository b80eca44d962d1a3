//! Single-wire UART transport (TMC2209).
//!
//! Datagrams:
//!
//! ```text
//! write request  [0x05, node, reg | 0x80, d3, d2, d1, d0, crc]
//! read request   [0x05, node, reg, crc]
//! read reply     [0x05, 0xFF, reg, d3, d2, d1, d0, crc]
//! ```
//!
//! TX and RX share one wire, so every transmitted byte is received back
//! before the chip's reply. Bytes left over from an earlier exchange are
//! discarded before each request, and an echo that differs from the frame
//! is treated as a framing error.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use tracing::{error, trace, warn};

use crate::config::UartConfig;
use crate::error::{ComError, DriverFault, Error, Result};
use crate::reg::tables::{GSTAT, IFCNT};

use super::crc::crc8;
use super::{RegisterBus, Response};

const SYNC: u8 = 0x05;
const MASTER_ADDR: u8 = 0xFF;
const WRITE_BIT: u8 = 0x80;

const READ_REQUEST_LEN: usize = 4;
const WRITE_REQUEST_LEN: usize = 8;
const REPLY_LEN: usize = 8;

/// UART register bus for a TMC2209 node.
///
/// Generic over an `embedded-io` serial port and an `embedded-hal` delay
/// used for the optional pause between request and reply.
pub struct TmcUart<S, D> {
    serial: S,
    delay: D,
    node: u8,
    read_tries: u32,
    local_echo: bool,
    pause_us: u32,
    fault: Option<DriverFault>,
    handling_error: bool,
}

impl<S, D> TmcUart<S, D>
where
    S: Read + ReadReady + Write,
    D: DelayNs,
{
    /// Create a transport for the node at `node` (0-3).
    pub fn new(serial: S, delay: D, node: u8) -> Self {
        let defaults = UartConfig::default();
        Self {
            serial,
            delay,
            node,
            read_tries: defaults.read_tries,
            local_echo: defaults.local_echo,
            pause_us: defaults.communication_pause_us,
            fault: None,
            handling_error: false,
        }
    }

    /// Apply UART settings from configuration.
    pub fn with_config(mut self, config: &UartConfig) -> Self {
        self.read_tries = config.read_tries;
        self.local_echo = config.local_echo;
        self.pause_us = config.communication_pause_us;
        self
    }

    /// Set the number of attempts per register read.
    pub fn set_read_tries(&mut self, tries: u32) {
        self.read_tries = tries;
    }

    /// Declare whether the adapter echoes transmitted bytes.
    pub fn set_local_echo(&mut self, echo: bool) {
        self.local_echo = echo;
    }

    /// Node address of the driver.
    #[inline]
    pub fn node(&self) -> u8 {
        self.node
    }

    /// Release the serial port and delay.
    pub fn release(self) -> (S, D) {
        (self.serial, self.delay)
    }

    fn check_fault(&self) -> Result<()> {
        match self.fault {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    /// Throw away whatever is still waiting in the receive buffer.
    fn drain(&mut self) -> Result<()> {
        let mut scratch = [0u8; REPLY_LEN];
        let mut dropped = 0;
        while self.serial.read_ready().map_err(|_| ComError::Io)? {
            match self.serial.read(&mut scratch) {
                Ok(0) => break,
                Ok(count) => dropped += count,
                Err(_) => return Err(ComError::Io.into()),
            }
        }
        if dropped > 0 {
            warn!(dropped, "discarded stale uart bytes");
        }
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.drain()?;
        trace!(frame = ?frame, "uart tx");
        self.serial.write_all(frame).map_err(|_| ComError::Io)?;
        self.serial.flush().map_err(|_| ComError::Io)?;

        if self.local_echo {
            let mut echo = [0u8; WRITE_REQUEST_LEN];
            let echo = &mut echo[..frame.len()];
            let n = self.receive(echo)?;
            if n < frame.len() {
                return Err(ComError::ShortResponse {
                    expected: frame.len(),
                    received: n,
                }
                .into());
            }
            if echo != frame {
                trace!(echo = ?echo, "uart echo mismatch");
                return Err(ComError::EchoMismatch { register: frame[2] & 0x7F }.into());
            }
        }
        Ok(())
    }

    /// Fill `buf` from the serial port, stopping early if the port runs dry.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.serial.read(&mut buf[n..]) {
                Ok(0) => break,
                Ok(count) => n += count,
                Err(_) => return Err(ComError::Io.into()),
            }
        }
        Ok(n)
    }

    fn read_once(&mut self, addr: u8) -> Result<Response> {
        let mut request = [SYNC, self.node, addr & 0x7F, 0];
        request[READ_REQUEST_LEN - 1] = crc8(&request[..READ_REQUEST_LEN - 1]);
        self.send(&request)?;

        if self.pause_us > 0 {
            self.delay.delay_us(self.pause_us);
        }

        let mut reply = [0u8; REPLY_LEN];
        let n = self.receive(&mut reply)?;
        trace!(frame = ?&reply[..n], "uart rx");
        if n < REPLY_LEN {
            return Err(ComError::ShortResponse {
                expected: REPLY_LEN,
                received: n,
            }
            .into());
        }

        if reply[0] != SYNC || reply[1] != MASTER_ADDR || reply[2] != addr & 0x7F {
            return Err(ComError::UnexpectedReply { register: addr }.into());
        }

        let crc = crc8(&reply[..REPLY_LEN - 1]);
        if crc != reply[REPLY_LEN - 1] {
            return Err(ComError::CrcMismatch {
                expected: crc,
                received: reply[REPLY_LEN - 1],
            }
            .into());
        }

        Ok(Response {
            data: [reply[3], reply[4], reply[5], reply[6]],
            status: None,
        })
    }

    fn read_retrying(&mut self, addr: u8) -> Result<Response> {
        let tries = self.read_tries.max(1);
        for attempt in 1..=tries {
            match self.read_once(addr) {
                Ok(response) => return Ok(response),
                Err(Error::Com(
                    e @ (ComError::CrcMismatch { .. }
                    | ComError::ShortResponse { .. }
                    | ComError::UnexpectedReply { .. }
                    | ComError::EchoMismatch { .. }),
                )) => {
                    warn!(register = addr, attempt, "invalid reply: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        error!(register = addr, tries, "register read failed");
        Err(ComError::ReadFailed {
            register: addr,
            tries,
        }
        .into())
    }

    fn read_ifcnt(&mut self) -> Result<u8> {
        Ok(self.read(IFCNT)?.data[3])
    }
}

impl<S, D> RegisterBus for TmcUart<S, D>
where
    S: Read + ReadReady + Write,
    D: DelayNs,
{
    fn read(&mut self, addr: u8) -> Result<Response> {
        self.check_fault()?;
        self.read_retrying(addr)
    }

    fn write(&mut self, addr: u8, value: u32) -> Result<()> {
        self.check_fault()?;

        let d = value.to_be_bytes();
        let mut frame = [
            SYNC,
            self.node,
            (addr & 0x7F) | WRITE_BIT,
            d[0],
            d[1],
            d[2],
            d[3],
            0,
        ];
        frame[WRITE_REQUEST_LEN - 1] = crc8(&frame[..WRITE_REQUEST_LEN - 1]);
        self.send(&frame)
    }

    fn write_checked(&mut self, addr: u8, value: u32, max_tries: u32) -> Result<()> {
        let before = self.read_ifcnt()?;
        let tries = max_tries.max(1);

        for attempt in 1..=tries {
            match self.write(addr, value) {
                Ok(()) => {}
                Err(Error::Com(e @ ComError::EchoMismatch { .. })) => {
                    warn!(register = addr, attempt, "{}", e);
                }
                Err(e) => return Err(e),
            }
            let after = self.read_ifcnt()?;
            if after != before {
                return Ok(());
            }
            warn!(register = addr, attempt, "write not acknowledged by IFCNT");
        }

        error!(register = addr, tries, "write failed");
        let fault = self.handle_error();
        error!("{}", fault);
        Err(ComError::WriteNotAcknowledged {
            register: addr,
            tries,
        }
        .into())
    }

    fn handle_error(&mut self) -> Error {
        if let Some(fault) = self.fault {
            return fault.into();
        }
        if self.handling_error {
            return DriverFault { gstat: 0 }.into();
        }
        self.handling_error = true;

        let gstat = match self.read_retrying(GSTAT) {
            Ok(response) => response.value(),
            Err(e) => {
                warn!("could not read GSTAT: {}", e);
                0
            }
        };
        error!("driver fault (GSTAT {:#05x}), no further bus access", gstat);

        let fault = DriverFault { gstat };
        self.fault = Some(fault);
        self.handling_error = false;
        fault.into()
    }

    fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }
}
