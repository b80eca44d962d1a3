//! StallGuard homing example.
//!
//! Talks UART to a virtual TMC2209 that answers register reads, counts
//! writes in IFCNT and raises DIAG a while after VACTUAL starts the motor.
//! The driver homes against that "stop" with VACTUAL and the DIAG pin.
//!
//! Run with `RUST_LOG=tmc_driver=info` to follow the driver.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tmc_driver::com::crc8;
use tmc_driver::gpio::{DiagHandler, DiagInterrupt};
use tmc_driver::{Chip, NoPin, StdDelay, TmcBuilder, TmcUart};
use tracing_subscriber::EnvFilter;

const VACTUAL: u8 = 0x22;

/// DIAG line shared between the virtual chip and the driver.
#[derive(Clone, Default)]
struct DiagLine {
    handler: Arc<Mutex<Option<DiagHandler>>>,
}

impl DiagLine {
    fn raise(&self) {
        if let Ok(mut handler) = self.handler.lock() {
            if let Some(handler) = handler.as_mut() {
                handler();
            }
        }
    }
}

impl DiagInterrupt for DiagLine {
    fn subscribe(&mut self, handler: DiagHandler) -> tmc_driver::Result<()> {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = Some(handler);
        }
        Ok(())
    }

    fn unsubscribe(&mut self) -> tmc_driver::Result<()> {
        if let Ok(mut slot) = self.handler.lock() {
            *slot = None;
        }
        Ok(())
    }
}

/// Single-wire UART endpoint of the virtual chip.
struct VirtualChip {
    registers: HashMap<u8, u32>,
    ifcnt: u8,
    rx: VecDeque<u8>,
    diag: DiagLine,
    stall_after: Duration,
}

impl VirtualChip {
    fn new(diag: DiagLine, stall_after: Duration) -> Self {
        let mut registers = HashMap::new();
        // IOIN version 0x21
        registers.insert(0x06, 0x2100_0000);
        Self {
            registers,
            ifcnt: 0,
            rx: VecDeque::new(),
            diag,
            stall_after,
        }
    }

    fn handle_write(&mut self, reg: u8, value: u32) {
        self.ifcnt = self.ifcnt.wrapping_add(1);
        self.registers.insert(reg, value);
        if reg == VACTUAL && value != 0 {
            let diag = self.diag.clone();
            let stall_after = self.stall_after;
            thread::spawn(move || {
                thread::sleep(stall_after);
                println!("  [chip] load spike, DIAG raised");
                diag.raise();
            });
        }
    }

    fn reply(&mut self, reg: u8) {
        let value = match reg {
            0x02 => self.ifcnt as u32,
            _ => self.registers.get(&reg).copied().unwrap_or(0),
        };
        let d = value.to_be_bytes();
        let mut frame = [0x05, 0xFF, reg, d[0], d[1], d[2], d[3], 0];
        frame[7] = crc8(&frame[..7]);
        self.rx.extend(frame);
    }
}

impl embedded_io::ErrorType for VirtualChip {
    type Error = Infallible;
}

impl embedded_io::Read for VirtualChip {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.rx.len());
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for VirtualChip {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl embedded_io::Write for VirtualChip {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        // local echo
        self.rx.extend(buf.iter().copied());
        match buf.len() {
            4 => self.reply(buf[2]),
            8 => {
                let value = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]);
                self.handle_write(buf[2] & 0x7F, value);
            }
            _ => {}
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

fn main() -> tmc_driver::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== StallGuard Homing Example ===\n");

    let diag = DiagLine::default();
    let chip = VirtualChip::new(diag.clone(), Duration::from_millis(800));

    let mut tmc = TmcBuilder::new(Chip::Tmc2209)
        .bus(TmcUart::new(chip, StdDelay, 0))
        .step_pin(NoPin)
        .dir_pin(NoPin)
        .delay(StdDelay)
        .build()?;

    if !tmc.test_com()? {
        println!("No answer from the driver");
        return Ok(());
    }

    tmc.apply_config()?;
    tmc.set_motor_enabled(true)?;
    tmc.set_current_pos(12_345)?;

    println!("Homing at 60 rpm for at most 2 revolutions...");
    let homed = tmc.do_homing(diag, 2.0, 80, Some(60.0))?;
    println!(
        "Homed: {}, position {}, stall flag {}",
        homed,
        tmc.current_pos()?,
        tmc.stallguard().map_or(false, |sg| sg.is_triggered())
    );

    tmc.shutdown()?;
    println!("\n=== Example Complete ===");
    Ok(())
}
