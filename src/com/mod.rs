//! Register bus transports.
//!
//! A [`RegisterBus`] moves raw 32-bit register values between the host and
//! the chip. Two transports are provided:
//!
//! - [`TmcUart`]: single-wire UART (TMC2209), CRC protected, writes checked
//!   against the IFCNT transaction counter
//! - [`TmcSpi`]: 5-byte SPI exchanges (TMC2240) with a status byte on
//!   every reply
//!
//! Both latch a [`DriverFault`](crate::error::DriverFault) once the chip
//! reports itself unsafe; after that every call fails without bus traffic.

mod crc;
mod spi;
mod uart;

pub use crc::crc8;
pub use spi::TmcSpi;
pub use uart::TmcUart;

use crate::error::{Error, Result};
use crate::reg::SpiStatus;

/// Raw reply of a register read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Response {
    /// Register value, big-endian.
    pub data: [u8; 4],
    /// Status flags (SPI only).
    pub status: Option<SpiStatus>,
}

impl Response {
    /// Register value as an integer.
    #[inline]
    pub fn value(&self) -> u32 {
        u32::from_be_bytes(self.data)
    }
}

/// Transport for register reads and writes.
pub trait RegisterBus {
    /// Read a register.
    fn read(&mut self, addr: u8) -> Result<Response>;

    /// Write a register without verification.
    fn write(&mut self, addr: u8, value: u32) -> Result<()>;

    /// Write a register and verify that the chip accepted it.
    ///
    /// Transports without a way to verify writes fall back to [`write`](Self::write).
    fn write_checked(&mut self, addr: u8, value: u32, max_tries: u32) -> Result<()>;

    /// Escalate a fatal chip condition.
    ///
    /// Reads GSTAT for diagnostics, latches the transport as faulted and
    /// returns the error the caller must propagate.
    fn handle_error(&mut self) -> Error;

    /// The transport has latched a driver fault.
    fn is_faulted(&self) -> bool;
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    fn read(&mut self, addr: u8) -> Result<Response> {
        (**self).read(addr)
    }

    fn write(&mut self, addr: u8, value: u32) -> Result<()> {
        (**self).write(addr, value)
    }

    fn write_checked(&mut self, addr: u8, value: u32, max_tries: u32) -> Result<()> {
        (**self).write_checked(addr, value, max_tries)
    }

    fn handle_error(&mut self) -> Error {
        (**self).handle_error()
    }

    fn is_faulted(&self) -> bool {
        (**self).is_faulted()
    }
}

/// Placeholder bus type for drivers without register access.
///
/// Has no values, so a driver built with it never holds a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoBus {}

impl RegisterBus for NoBus {
    fn read(&mut self, _addr: u8) -> Result<Response> {
        match *self {}
    }

    fn write(&mut self, _addr: u8, _value: u32) -> Result<()> {
        match *self {}
    }

    fn write_checked(&mut self, _addr: u8, _value: u32, _max_tries: u32) -> Result<()> {
        match *self {}
    }

    fn handle_error(&mut self) -> Error {
        match *self {}
    }

    fn is_faulted(&self) -> bool {
        match *self {}
    }
}
