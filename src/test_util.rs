//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use embedded_hal::delay::DelayNs;

use crate::com::{RegisterBus, Response};
use crate::error::{DriverFault, Error, Result};
use crate::gpio::{DiagHandler, DiagInterrupt};

/// Register bus backed by a map. Reads of unset addresses return 0.
///
/// Setting `fault` latches it like a transport would: every transaction
/// then fails with that fault.
#[derive(Debug, Default)]
pub struct MapBus {
    pub values: HashMap<u8, u32>,
    pub writes: Vec<(u8, u32)>,
    pub reads: Vec<u8>,
    pub fault: Option<DriverFault>,
}

impl RegisterBus for MapBus {
    fn read(&mut self, addr: u8) -> Result<Response> {
        if let Some(fault) = self.fault {
            return Err(fault.into());
        }
        self.reads.push(addr);
        let value = self.values.get(&addr).copied().unwrap_or(0);
        Ok(Response {
            data: value.to_be_bytes(),
            status: None,
        })
    }

    fn write(&mut self, addr: u8, value: u32) -> Result<()> {
        if let Some(fault) = self.fault {
            return Err(fault.into());
        }
        self.writes.push((addr, value));
        self.values.insert(addr, value);
        Ok(())
    }

    fn write_checked(&mut self, addr: u8, value: u32, _max_tries: u32) -> Result<()> {
        self.write(addr, value)
    }

    fn handle_error(&mut self) -> Error {
        let gstat = self.values.get(&0x01).copied().unwrap_or(0);
        (*self.fault.get_or_insert(DriverFault { gstat })).into()
    }

    fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }
}

/// Delay that returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastDelay;

impl DelayNs for FastDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// DIAG pin keeping the handler so tests can fire it.
#[derive(Clone, Default)]
pub struct FakeDiag {
    pub handler: Arc<Mutex<Option<DiagHandler>>>,
}

impl FakeDiag {
    pub fn fire(&self) {
        if let Some(handler) = self.handler.lock().unwrap().as_mut() {
            handler();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }
}

impl DiagInterrupt for FakeDiag {
    fn subscribe(&mut self, handler: DiagHandler) -> Result<()> {
        *self.handler.lock().unwrap() = Some(handler);
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<()> {
        *self.handler.lock().unwrap() = None;
        Ok(())
    }
}
