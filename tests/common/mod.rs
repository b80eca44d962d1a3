//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::delay::DelayNs;
use embedded_io::{ErrorType, Read, ReadReady, Write};
use tmc_driver::com::crc8;
use tmc_driver::gpio::{DiagHandler, DiagInterrupt};

const SYNC: u8 = 0x05;
const MASTER_ADDR: u8 = 0xFF;
const WRITE_BIT: u8 = 0x80;

pub const GSTAT: u8 = 0x01;
pub const IFCNT: u8 = 0x02;
pub const IOIN: u8 = 0x06;
pub const IHOLD_IRUN: u8 = 0x10;
pub const VACTUAL: u8 = 0x22;
pub const SGTHRS: u8 = 0x40;
pub const SG_RESULT: u8 = 0x41;
pub const CHOPCONF: u8 = 0x6C;

/// Register file and bus state of the simulated chip.
#[derive(Debug, Default)]
pub struct ChipState {
    pub registers: HashMap<u8, u32>,
    pub ifcnt: u8,
    /// Accepted writes in order.
    pub writes: Vec<(u8, u32)>,
    /// Number of upcoming replies sent with a broken CRC.
    pub corrupt_replies: usize,
    /// Number of upcoming writes the chip ignores.
    pub dropped_writes: usize,
    /// Values returned by the next SG_RESULT reads. The last one repeats.
    pub sg_results: VecDeque<u16>,
    rx: VecDeque<u8>,
}

impl ChipState {
    fn reply(&mut self, reg: u8) {
        let value = match reg {
            IFCNT => self.ifcnt as u32,
            SG_RESULT => {
                if self.sg_results.len() > 1 {
                    self.sg_results.pop_front().map(u32::from).unwrap_or(0)
                } else {
                    self.sg_results.front().copied().map(u32::from).unwrap_or(0)
                }
            }
            _ => self.registers.get(&reg).copied().unwrap_or(0),
        };

        let d = value.to_be_bytes();
        let mut frame = [SYNC, MASTER_ADDR, reg, d[0], d[1], d[2], d[3], 0];
        frame[7] = crc8(&frame[..7]);
        if self.corrupt_replies > 0 {
            self.corrupt_replies -= 1;
            frame[7] ^= 0xFF;
        }
        self.rx.extend(frame);
    }

    fn accept_write(&mut self, reg: u8, value: u32) {
        if self.dropped_writes > 0 {
            self.dropped_writes -= 1;
            return;
        }
        self.ifcnt = self.ifcnt.wrapping_add(1);
        self.writes.push((reg, value));
        if reg == GSTAT {
            let flags = self.registers.entry(GSTAT).or_insert(0);
            *flags &= !value;
        } else {
            self.registers.insert(reg, value);
        }
    }

    /// Put bytes on the line as if left over from an earlier exchange.
    pub fn push_stray_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Values written to `reg`, oldest first.
    pub fn written(&self, reg: u8) -> Vec<u32> {
        self.writes
            .iter()
            .filter(|(addr, _)| *addr == reg)
            .map(|(_, v)| *v)
            .collect()
    }
}

/// TMC2209 on a single-wire UART with local echo.
#[derive(Clone, Default)]
pub struct SimTmc2209 {
    state: Arc<Mutex<ChipState>>,
}

impl SimTmc2209 {
    /// A chip reporting IOIN version 0x21.
    pub fn new() -> Self {
        let sim = Self::default();
        sim.state().registers.insert(IOIN, 0x2100_0040);
        sim
    }

    pub fn state(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().unwrap()
    }
}

impl ErrorType for SimTmc2209 {
    type Error = Infallible;
}

impl Read for SimTmc2209 {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.state();
        let mut n = 0;
        while n < buf.len() {
            match state.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl ReadReady for SimTmc2209 {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.state().rx.is_empty())
    }
}

impl Write for SimTmc2209 {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.state();
        state.rx.extend(buf.iter().copied());

        let valid = buf.len() >= 4
            && buf[0] == SYNC
            && crc8(&buf[..buf.len() - 1]) == buf[buf.len() - 1];
        if valid {
            match buf.len() {
                4 if buf[2] & WRITE_BIT == 0 => state.reply(buf[2]),
                8 if buf[2] & WRITE_BIT != 0 => {
                    let value = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]);
                    state.accept_write(buf[2] & !WRITE_BIT, value);
                }
                _ => {}
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// DIAG pin the test can trigger by hand.
#[derive(Clone, Default)]
pub struct SimDiag {
    handler: Arc<Mutex<Option<DiagHandler>>>,
}

impl SimDiag {
    pub fn fire(&self) {
        if let Some(handler) = self.handler.lock().unwrap().as_mut() {
            handler();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }
}

impl DiagInterrupt for SimDiag {
    fn subscribe(&mut self, handler: DiagHandler) -> tmc_driver::Result<()> {
        *self.handler.lock().unwrap() = Some(handler);
        Ok(())
    }

    fn unsubscribe(&mut self) -> tmc_driver::Result<()> {
        *self.handler.lock().unwrap() = None;
        Ok(())
    }
}

/// Delay that only counts time and fires DIAG once enough of it passed.
#[derive(Clone)]
pub struct SimClock {
    diag: SimDiag,
    stall_after_ms: u64,
    elapsed_ms: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new(diag: SimDiag, stall_after_ms: u64) -> Self {
        Self {
            diag,
            stall_after_ms,
            elapsed_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A clock that never stalls.
    pub fn free_running() -> Self {
        Self::new(SimDiag::default(), u64::MAX)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms.load(Ordering::SeqCst)
    }
}

impl DelayNs for SimClock {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_ms(&mut self, ms: u32) {
        let elapsed = self.elapsed_ms.fetch_add(ms as u64, Ordering::SeqCst) + ms as u64;
        if elapsed >= self.stall_after_ms {
            self.diag.fire();
        }
    }
}

/// Cloneable no-op delay (embedded-hal-mock's `NoopDelay` is not `Clone`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelay;

impl NoopDelay {
    pub fn new() -> Self {
        NoopDelay
    }
}

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
