//! StallGuard stall detection and CoolStep current control.
//!
//! Two strategies are offered: the chip raising its DIAG output
//! ([`interrupt`]) and the host reading the StallGuard result after every
//! step ([`polling`]). Both end in a stop request on a
//! [`MotionHandle`](crate::motion::MotionHandle).

mod interrupt;
mod polling;

pub use interrupt::{StallCallback, StallFlag};
pub use polling::{StallGuardPoller, StallWindow};

use libm::round;
use tracing::{info, warn};

use crate::com::RegisterBus;
use crate::config::{Chip, Microsteps, StallGuardConfig};
use crate::error::Result;
use crate::gpio::DiagInterrupt;
use crate::math::steps_to_tstep;
use crate::reg::Registers;

/// Capacity of the polling sample history.
pub const HISTORY_CAPACITY: usize = 64;

/// CoolStep parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoolStepConfig {
    /// Current is increased when the StallGuard result drops below this.
    pub semin_sg: u16,
    /// Current is decreased when the StallGuard result rises above this.
    pub semax_sg: u16,
    /// Current increment step (0..=3).
    pub seup: u8,
    /// StallGuard readings per current decrement (0..=3).
    pub sedn: u8,
    /// Speed in µsteps/s above which CoolStep is active.
    pub min_speed: f64,
}

impl Default for CoolStepConfig {
    fn default() -> Self {
        Self {
            semin_sg: 150,
            semax_sg: 200,
            seup: 1,
            sedn: 3,
            min_speed: 100.0,
        }
    }
}

/// Register and field holding the StallGuard threshold.
fn threshold_field(chip: Chip) -> (&'static str, &'static str) {
    match chip {
        Chip::Tmc2209 => ("SGTHRS", "sgthrs"),
        Chip::Tmc2240 => ("SG4_THRS", "sg4_thrs"),
    }
}

/// Read the StallGuard result (SG_RESULT, SG4_RESULT on the TMC2240).
///
/// Higher values mean lower motor load.
pub fn read_stallguard_result<B: RegisterBus>(regs: &mut Registers<B>) -> Result<u16> {
    let value = match regs.chip() {
        Chip::Tmc2209 => regs.read_field("SG_RESULT", "sg_result")?,
        Chip::Tmc2240 => regs.read_field("SG4_RESULT", "sg4_result")?,
    };
    Ok(value as u16)
}

/// Microstep resolution currently configured in CHOPCONF.
pub(crate) fn read_microsteps<B: RegisterBus>(regs: &mut Registers<B>) -> Result<Microsteps> {
    let mres = regs.read_field("CHOPCONF", "mres")?;
    Ok(Microsteps::from_mres(mres as u8))
}

/// StallGuard state of one driver.
pub struct StallGuard {
    config: StallGuardConfig,
    flag: StallFlag,
    diag: Option<Box<dyn DiagInterrupt + Send>>,
}

impl StallGuard {
    /// Create StallGuard state without an armed DIAG pin.
    pub fn new(config: StallGuardConfig) -> Self {
        Self {
            config,
            flag: StallFlag::new(),
            diag: None,
        }
    }

    /// Detection parameters.
    pub fn config(&self) -> &StallGuardConfig {
        &self.config
    }

    /// Replace the detection parameters.
    pub fn set_config(&mut self, config: StallGuardConfig) {
        self.config = config;
    }

    /// Flag latched by the DIAG handler.
    pub fn flag(&self) -> &StallFlag {
        &self.flag
    }

    /// Whether the DIAG pin reported a stall since the last clear.
    pub fn is_triggered(&self) -> bool {
        self.flag.is_triggered()
    }

    /// Whether a DIAG handler is subscribed.
    pub fn is_armed(&self) -> bool {
        self.diag.is_some()
    }

    /// Write the stall threshold.
    ///
    /// The TMC2209 signals a stall when `SG_RESULT <= 2 * SGTHRS`.
    pub fn set_stallguard_threshold<B: RegisterBus>(
        &self,
        regs: &mut Registers<B>,
        threshold: u16,
    ) -> Result<()> {
        let (reg, field) = threshold_field(regs.chip());
        regs.set_field(reg, field, threshold as i32)
    }

    /// Write TCOOLTHRS for a speed in µsteps/s. StallGuard and CoolStep are
    /// only active above it.
    pub fn set_coolstep_threshold<B: RegisterBus>(
        &self,
        regs: &mut Registers<B>,
        min_speed: f64,
    ) -> Result<()> {
        let microsteps = read_microsteps(regs)?;
        let tstep = steps_to_tstep(min_speed, microsteps.value());
        regs.set_field("TCOOLTHRS", "tcoolthrs", tstep.min(0xF_FFFF) as i32)
    }

    /// Arm stall detection on the DIAG pin.
    ///
    /// Writes the threshold and TCOOLTHRS, then subscribes a handler that
    /// latches the stall flag and runs `callback`. Any previously armed
    /// pin is released first.
    pub fn set_stallguard_callback<B, I>(
        &mut self,
        regs: &mut Registers<B>,
        mut diag: I,
        threshold: u16,
        callback: Option<StallCallback>,
        min_speed: f64,
    ) -> Result<()>
    where
        B: RegisterBus,
        I: DiagInterrupt + Send + 'static,
    {
        info!(threshold, min_speed, "arming StallGuard on DIAG");
        self.remove_stallguard_callback()?;

        self.set_stallguard_threshold(regs, threshold)?;
        self.set_coolstep_threshold(regs, min_speed)?;
        if regs.chip() == Chip::Tmc2240 {
            // route the stall signal to DIAG0
            regs.read("GCONF")?;
            regs.modify("GCONF", "diag0_stall", 1)?;
            regs.modify("GCONF", "diag0_pushpull", 1)?;
            regs.write_check("GCONF")?;
        }

        self.flag.clear();
        diag.subscribe(self.flag.handler(callback))?;
        self.diag = Some(Box::new(diag));
        Ok(())
    }

    /// Unsubscribe the DIAG handler, if any.
    pub fn remove_stallguard_callback(&mut self) -> Result<()> {
        if let Some(mut diag) = self.diag.take() {
            diag.unsubscribe()?;
            info!("StallGuard DIAG handler removed");
        }
        Ok(())
    }

    /// Read the StallGuard result.
    pub fn get_stallguard_result<B: RegisterBus>(&self, regs: &mut Registers<B>) -> Result<u16> {
        read_stallguard_result(regs)
    }

    /// Enable CoolStep.
    ///
    /// `semin = clamp(round(semin_sg / 32), 0, 15)` and
    /// `semax = clamp(round((semax_sg - semin_sg) / 32), 0, 15)`.
    pub fn enable_coolstep<B: RegisterBus>(
        &self,
        regs: &mut Registers<B>,
        coolstep: &CoolStepConfig,
    ) -> Result<()> {
        let semin = round(coolstep.semin_sg as f64 / 32.0).clamp(0.0, 15.0) as i32;
        let semax = round((coolstep.semax_sg as f64 - coolstep.semin_sg as f64) / 32.0)
            .clamp(0.0, 15.0) as i32;
        if semin == 0 {
            warn!("semin of 0 disables CoolStep");
        }

        if regs.get("COOLCONF")?.access().readable() {
            regs.read("COOLCONF")?;
        }
        regs.modify("COOLCONF", "semin", semin)?;
        regs.modify("COOLCONF", "semax", semax)?;
        regs.modify("COOLCONF", "seimin", 1)?;
        regs.modify("COOLCONF", "seup", coolstep.seup as i32)?;
        regs.modify("COOLCONF", "sedn", coolstep.sedn as i32)?;
        regs.write_check("COOLCONF")?;
        info!(semin, semax, "CoolStep enabled");

        self.set_coolstep_threshold(regs, coolstep.min_speed)
    }

    /// Polling window with the configured size.
    pub fn window(&self, threshold: u16) -> StallWindow {
        StallWindow::from_config(&self.config, threshold)
    }
}
