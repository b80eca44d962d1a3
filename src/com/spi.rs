//! SPI transport (TMC2240).
//!
//! Every exchange is 5 bytes: an address byte (bit 7 set for writes) and a
//! big-endian 32-bit value. The chip answers each exchange with its status
//! byte followed by the data requested in the *previous* exchange, so reads
//! take two exchanges.

use embedded_hal::spi::SpiDevice;
use tracing::{error, trace, warn};

use crate::error::{ComError, DriverFault, Error, Result};
use crate::reg::tables::GSTAT;
use crate::reg::SpiStatus;

use super::{RegisterBus, Response};

const WRITE_BIT: u8 = 0x80;

/// SPI register bus.
pub struct TmcSpi<SPI> {
    spi: SPI,
    last_status: Option<SpiStatus>,
    fault: Option<DriverFault>,
    handling_error: bool,
}

impl<SPI: SpiDevice> TmcSpi<SPI> {
    /// Create a transport over an SPI device (mode 3, MSB first).
    pub fn new(spi: SPI) -> Self {
        Self {
            spi,
            last_status: None,
            fault: None,
            handling_error: false,
        }
    }

    /// Status flags of the most recent exchange.
    pub fn last_status(&self) -> Option<SpiStatus> {
        self.last_status
    }

    /// Release the SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }

    fn check_fault(&self) -> Result<()> {
        match self.fault {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    fn raw_exchange(&mut self, frame: [u8; 5]) -> Result<[u8; 5]> {
        let mut buf = frame;
        self.spi
            .transfer_in_place(&mut buf)
            .map_err(|_| ComError::Io)?;
        trace!(tx = ?frame, rx = ?buf, "spi");
        Ok(buf)
    }

    /// Exchange one frame and act on the returned status byte.
    fn exchange(&mut self, frame: [u8; 5]) -> Result<[u8; 5]> {
        let reply = self.raw_exchange(frame)?;
        let status = SpiStatus::from_byte(reply[0]);
        self.last_status = Some(status);

        if status.reset_flag {
            error!("TMC reset flag is set");
        }
        if status.driver_error {
            error!("TMC driver error flag is set");
            return Err(self.handle_error());
        }
        if status.sg2 {
            trace!("stallguard2 flag set");
        }
        Ok(reply)
    }
}

impl<SPI: SpiDevice> RegisterBus for TmcSpi<SPI> {
    fn read(&mut self, addr: u8) -> Result<Response> {
        self.check_fault()?;
        self.exchange([addr & 0x7F, 0, 0, 0, 0])?;
        let reply = self.exchange([0; 5])?;

        Ok(Response {
            data: [reply[1], reply[2], reply[3], reply[4]],
            status: self.last_status,
        })
    }

    fn write(&mut self, addr: u8, value: u32) -> Result<()> {
        self.check_fault()?;
        let d = value.to_be_bytes();
        self.exchange([(addr & 0x7F) | WRITE_BIT, d[0], d[1], d[2], d[3]])?;
        Ok(())
    }

    fn write_checked(&mut self, addr: u8, value: u32, _max_tries: u32) -> Result<()> {
        // no IFCNT in SPI mode
        self.write(addr, value)
    }

    fn handle_error(&mut self) -> Error {
        if let Some(fault) = self.fault {
            return fault.into();
        }
        if self.handling_error {
            return DriverFault { gstat: 0 }.into();
        }
        self.handling_error = true;

        let gstat = self
            .raw_exchange([GSTAT, 0, 0, 0, 0])
            .and_then(|_| self.raw_exchange([0; 5]))
            .map(|reply| u32::from_be_bytes([reply[1], reply[2], reply[3], reply[4]]));
        let gstat = match gstat {
            Ok(value) => value,
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

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    fn exchange(tx: [u8; 5], rx: [u8; 5]) -> Vec<SpiTransaction<u8>> {
        vec![
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer_in_place(tx.to_vec(), rx.to_vec()),
            SpiTransaction::transaction_end(),
        ]
    }

    #[test]
    fn test_pipelined_read() {
        let mut expectations = exchange([0x04, 0, 0, 0, 0], [0x08, 0, 0, 0, 0]);
        expectations.extend(exchange([0; 5], [0x08, 0x40, 0x00, 0x00, 0x20]));
        let mut mock = SpiMock::new(&expectations);

        let mut bus = TmcSpi::new(mock.clone());
        let response = bus.read(0x04).unwrap();
        assert_eq!(response.value(), 0x4000_0020);
        assert_eq!(response.status.map(|s| s.standstill), Some(true));

        mock.done();
    }

    #[test]
    fn test_write_sets_write_bit() {
        let expectations = exchange([0x8B, 0, 0, 0, 0x80], [0, 0, 0, 0, 0]);
        let mut mock = SpiMock::new(&expectations);

        let mut bus = TmcSpi::new(mock.clone());
        bus.write_checked(0x0B, 0x80, 10).unwrap();

        mock.done();
    }

    #[test]
    fn test_driver_error_latches() {
        let mut expectations = exchange([0x80, 0, 0, 0, 0x04], [0x02, 0, 0, 0, 0]);
        // GSTAT diagnostics read
        expectations.extend(exchange([GSTAT, 0, 0, 0, 0], [0x02, 0, 0, 0, 0]));
        expectations.extend(exchange([0; 5], [0x02, 0, 0, 0, 0x02]));
        let mut mock = SpiMock::new(&expectations);

        let mut bus = TmcSpi::new(mock.clone());
        let result = bus.write(0x00, 0x04);
        assert_eq!(result, Err(Error::Driver(DriverFault { gstat: 0x02 })));
        assert!(bus.is_faulted());

        // no further exchanges reach the mock
        assert!(bus.read(0x6F).is_err());
        assert!(bus.write(0x00, 0).is_err());

        mock.done();
    }

    #[test]
    fn test_reset_flag_is_not_fatal() {
        let mut expectations = exchange([0x6F, 0, 0, 0, 0], [0x01, 0, 0, 0, 0]);
        expectations.extend(exchange([0; 5], [0x01, 0x80, 0, 0, 0]));
        let mut mock = SpiMock::new(&expectations);

        let mut bus = TmcSpi::new(mock.clone());
        let response = bus.read(0x6F).unwrap();
        assert_eq!(response.value(), 0x8000_0000);
        assert_eq!(bus.last_status().map(|s| s.reset_flag), Some(true));
        assert!(!bus.is_faulted());

        mock.done();
    }
}
