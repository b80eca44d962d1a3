//! TMC driver facade.
//!
//! Composes the optional parts of one driver: register access, STEP/DIR
//! motion, EN pin and StallGuard. Operations needing a part that was not
//! configured fail with a [`ConfigError`] before anything is touched.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use libm::round;
use tracing::{debug, error, info, warn};

use crate::com::RegisterBus;
use crate::config::{Chip, Microsteps, MotorConfig};
use crate::enable::{EnableControl, EnablePin};
use crate::error::{ConfigError, Error, MotionError, Result};
use crate::gpio::{DiagInterrupt, PwmStep};
use crate::math::{
    tmc2209_cs_to_current, tmc2209_current, tmc2240_current, tmc2240_temperature,
    tmc2240_vsupply,
};
use crate::motion::{
    Direction, MotionControl, MotionHandle, MotionWorker, MovementAbsRel, MovementPhase, StepDir,
    StopMode, DEFAULT_POLL_INTERVAL_MS,
};
use crate::reg::{lock, Register, Registers, SharedRegisters};
use crate::stallguard::{read_microsteps, CoolStepConfig, StallCallback, StallGuard};

/// TOFF written when the outputs are enabled through CHOPCONF.
pub const DEFAULT_TOFF: u8 = 3;

/// Minimum IOIN version reported by each chip.
fn expected_version(chip: Chip) -> u8 {
    match chip {
        Chip::Tmc2209 => 0x21,
        Chip::Tmc2240 => 0x40,
    }
}

/// Write-1-to-clear mask of all GSTAT flags.
fn gstat_mask(chip: Chip) -> u32 {
    match chip {
        Chip::Tmc2209 => 0b111,
        Chip::Tmc2240 => 0b1_1111,
    }
}

/// Parts returned by [`Tmc::into_parts`].
pub struct TmcParts<B, STEP, DIR, EN, D>
where
    STEP: OutputPin,
    DIR: OutputPin,
    D: DelayNs,
{
    /// Register cache and bus.
    pub registers: Option<SharedRegisters<B>>,
    /// STEP/DIR engine, idle.
    pub motion: Option<StepDir<STEP, DIR, D>>,
    /// EN pin.
    pub enable_pin: Option<EN>,
    /// Delay provider.
    pub delay: D,
}

/// One TMC2209 or TMC2240 driver.
///
/// Generic over:
/// - `B`: register bus transport ([`NoBus`](crate::com::NoBus) when not wired)
/// - `STEP`, `DIR`: STEP/DIR pins ([`NoPin`](crate::gpio::NoPin) when not wired)
/// - `EN`: EN pin ([`NoPin`](crate::gpio::NoPin) when not wired)
/// - `D`: delay provider, cloned into each motion engine
///
/// Built with [`TmcBuilder`](super::TmcBuilder).
pub struct Tmc<B, STEP, DIR, EN, D>
where
    B: RegisterBus,
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
    D: DelayNs,
{
    chip: Chip,

    /// Register cache and bus, shared with pollers and VACTUAL engines.
    regs: Option<SharedRegisters<B>>,

    /// STEP/DIR engine, runnable in the background.
    motion: Option<MotionWorker<StepDir<STEP, DIR, D>>>,

    enable: Option<EnablePin<EN>>,

    /// Present whenever a register bus is.
    stallguard: Option<StallGuard>,

    delay: D,
    motor: MotorConfig,

    /// TOFF restored when enabling through CHOPCONF.
    toff: u8,

    vactual_poll_ms: u32,
    deinit_finished: bool,
}

impl<B, STEP, DIR, EN, D> Tmc<B, STEP, DIR, EN, D>
where
    B: RegisterBus,
    STEP: OutputPin + Send + 'static,
    DIR: OutputPin + Send + 'static,
    EN: OutputPin,
    D: DelayNs + Clone + Send + 'static,
{
    pub(super) fn new(
        chip: Chip,
        regs: Option<SharedRegisters<B>>,
        motion: Option<MotionWorker<StepDir<STEP, DIR, D>>>,
        enable: Option<EnablePin<EN>>,
        stallguard: Option<StallGuard>,
        delay: D,
        motor: MotorConfig,
    ) -> Self {
        Self {
            chip,
            regs,
            motion,
            enable,
            stallguard,
            delay,
            motor,
            toff: DEFAULT_TOFF,
            vactual_poll_ms: DEFAULT_POLL_INTERVAL_MS,
            deinit_finished: false,
        }
    }

    // ----------------------------------------------------------------------
    // Parts
    // ----------------------------------------------------------------------

    /// Chip family.
    #[inline]
    pub fn chip(&self) -> Chip {
        self.chip
    }

    /// Motor settings as currently applied.
    pub fn motor_config(&self) -> &MotorConfig {
        &self.motor
    }

    /// Shared registers, if a bus is configured.
    pub fn registers(&self) -> Option<&SharedRegisters<B>> {
        self.regs.as_ref()
    }

    /// StallGuard state, if a bus is configured.
    pub fn stallguard(&self) -> Option<&StallGuard> {
        self.stallguard.as_ref()
    }

    /// Status and stop handle of the STEP/DIR engine.
    pub fn handle(&self) -> Option<&MotionHandle> {
        self.motion.as_ref().map(|m| m.handle())
    }

    /// Interval between stop checks of VACTUAL movements.
    pub fn set_vactual_poll_interval_ms(&mut self, ms: u32) {
        self.vactual_poll_ms = ms.max(1);
    }

    pub(super) fn vactual_poll_interval_ms(&self) -> u32 {
        self.vactual_poll_ms
    }

    pub(super) fn delay_provider(&self) -> D {
        self.delay.clone()
    }

    pub(super) fn regs(&self) -> Result<&SharedRegisters<B>> {
        self.regs
            .as_ref()
            .ok_or_else(|| ConfigError::NoRegisterBus.into())
    }

    fn with_registers<R>(&self, f: impl FnOnce(&mut Registers<B>) -> Result<R>) -> Result<R> {
        let mut regs = lock(self.regs()?)?;
        f(&mut *regs)
    }

    pub(super) fn worker(&self) -> Result<&MotionWorker<StepDir<STEP, DIR, D>>> {
        self.motion
            .as_ref()
            .ok_or_else(|| ConfigError::NoMotionControl.into())
    }

    pub(super) fn worker_mut(&mut self) -> Result<&mut MotionWorker<StepDir<STEP, DIR, D>>> {
        self.motion
            .as_mut()
            .ok_or_else(|| ConfigError::NoMotionControl.into())
    }

    pub(super) fn has_motion(&self) -> bool {
        self.motion.is_some()
    }

    pub(super) fn stallguard_mut(&mut self) -> Result<&mut StallGuard> {
        self.stallguard
            .as_mut()
            .ok_or_else(|| ConfigError::NoRegisterBus.into())
    }

    /// Fail while a background movement runs.
    pub(super) fn ensure_idle(&self) -> Result<()> {
        match &self.motion {
            Some(worker) if worker.is_running() => Err(MotionError::AlreadyRunning.into()),
            _ => Ok(()),
        }
    }

    /// Refuse motion once the bus has latched a driver fault.
    ///
    /// The EN pin, when wired, is driven to disabled before the latched
    /// [`Error::Driver`] is returned. CHOPCONF cannot be used for that since
    /// the bus no longer carries traffic.
    pub(super) fn ensure_not_faulted(&mut self) -> Result<()> {
        let fault = match self.regs.as_ref() {
            Some(regs) => {
                let mut regs = lock(regs)?;
                if !regs.bus().is_faulted() {
                    return Ok(());
                }
                regs.bus_mut().handle_error()
            }
            None => return Ok(()),
        };

        error!("{}, motion refused", fault);
        if let Some(pin) = self.enable.as_mut() {
            if let Err(e) = pin.set_motor_enabled(false) {
                warn!("could not disable the outputs: {}", e);
            }
        }
        Err(fault)
    }

    // ----------------------------------------------------------------------
    // Enable and chopper
    // ----------------------------------------------------------------------

    /// Enable or disable the motor outputs.
    ///
    /// Uses the EN pin when wired, otherwise CHOPCONF.toff (0 disables the
    /// power stage). Without either this only logs.
    pub fn set_motor_enabled(&mut self, enabled: bool) -> Result<()> {
        if let Some(pin) = self.enable.as_mut() {
            return pin.set_motor_enabled(enabled);
        }
        if self.regs.is_some() {
            let toff = if enabled { self.toff } else { 0 };
            info!(enabled, toff, "motor output via CHOPCONF");
            return self.with_registers(|regs| regs.set_field("CHOPCONF", "toff", toff as i32));
        }
        debug!(enabled, "no enable control configured");
        Ok(())
    }

    /// Set the chopper off time (CHOPCONF.toff, 1..=15).
    pub fn set_toff(&mut self, toff: u8) -> Result<()> {
        self.with_registers(|regs| regs.set_field("CHOPCONF", "toff", toff as i32))?;
        if toff > 0 {
            self.toff = toff;
        }
        Ok(())
    }

    /// Set the run current in mA RMS, the hold current as a fraction of it
    /// and the hold delay (IHOLDDELAY).
    pub fn set_current(
        &mut self,
        run_current_ma: u16,
        hold_current_multiplier: f64,
        hold_current_delay: u8,
    ) -> Result<()> {
        let rref_kohm = self.motor.rref_kohm;
        self.with_registers(|regs| {
            let (irun, ihold) = match regs.chip() {
                Chip::Tmc2209 => {
                    let cs = tmc2209_current(run_current_ma, hold_current_multiplier);
                    regs.set_field("CHOPCONF", "vsense", cs.vsense as i32)?;
                    // current is taken from IHOLD_IRUN, not from VREF
                    regs.set_field("GCONF", "pdn_disable", 1)?;
                    info!(
                        run_current_ma,
                        actual_ma = tmc2209_cs_to_current(cs.irun, cs.vsense),
                        vsense = cs.vsense,
                        "current"
                    );
                    (cs.irun, cs.ihold)
                }
                Chip::Tmc2240 => {
                    let range = regs.read_field("DRV_CONF", "current_range")? as u8;
                    let cs =
                        tmc2240_current(run_current_ma, hold_current_multiplier, range, rref_kohm);
                    regs.set_field("GLOBAL_SCALER", "global_scaler", cs.global_scaler as i32)?;
                    info!(
                        run_current_ma,
                        current_range = range,
                        global_scaler = cs.global_scaler,
                        "current"
                    );
                    (cs.irun, cs.ihold)
                }
            };

            regs.modify("IHOLD_IRUN", "ihold", ihold as i32)?;
            regs.modify("IHOLD_IRUN", "irun", irun as i32)?;
            regs.modify("IHOLD_IRUN", "iholddelay", hold_current_delay as i32)?;
            debug!(irun, ihold, hold_current_delay, "IHOLD_IRUN");
            regs.write_check("IHOLD_IRUN")
        })?;

        self.motor.run_current_ma = run_current_ma;
        self.motor.hold_current_multiplier = hold_current_multiplier;
        self.motor.hold_current_delay = hold_current_delay;
        Ok(())
    }

    /// Set the microstep resolution.
    ///
    /// Written to CHOPCONF.mres when a bus is configured (the TMC2209 is also
    /// switched to register-selected resolution). Speeds stay in µsteps/s.
    pub fn set_microstepping_resolution(&mut self, microsteps: Microsteps) -> Result<()> {
        self.ensure_idle()?;
        if self.regs.is_some() {
            let chip = self.chip;
            self.with_registers(|regs| {
                regs.set_field("CHOPCONF", "mres", microsteps.to_mres() as i32)?;
                if chip == Chip::Tmc2209 {
                    regs.set_field("GCONF", "mstep_reg_select", 1)?;
                }
                Ok(())
            })?;
        }
        info!(microsteps = microsteps.value(), "microstepping");
        self.apply_microsteps(microsteps)
    }

    /// Microstep resolution, read from CHOPCONF when a bus is configured.
    pub fn get_microstepping_resolution(&mut self) -> Result<Microsteps> {
        if self.regs.is_none() {
            return Ok(self.motor.microsteps);
        }
        let microsteps = self.with_registers(read_microsteps)?;
        if microsteps != self.motor.microsteps {
            debug!(microsteps = microsteps.value(), "microstepping changed on chip");
            self.ensure_idle()?;
            self.apply_microsteps(microsteps)?;
        }
        Ok(microsteps)
    }

    fn apply_microsteps(&mut self, microsteps: Microsteps) -> Result<()> {
        self.motor.microsteps = microsteps;
        if let Some(worker) = self.motion.as_mut() {
            worker.engine_mut()?.set_microsteps(microsteps.value());
        }
        Ok(())
    }

    /// Select SpreadCycle (`true`) or StealthChop (`false`).
    pub fn set_spreadcycle(&mut self, enabled: bool) -> Result<()> {
        self.with_registers(|regs| match regs.chip() {
            Chip::Tmc2209 => regs.set_field("GCONF", "en_spreadcycle", enabled as i32),
            Chip::Tmc2240 => regs.set_field("GCONF", "en_pwm_mode", !enabled as i32),
        })?;
        info!(spreadcycle = enabled, "chopper mode");
        self.motor.spreadcycle = enabled;
        Ok(())
    }

    /// Enable interpolation of the step input to 256 µsteps.
    pub fn set_interpolation(&mut self, enabled: bool) -> Result<()> {
        self.with_registers(|regs| regs.set_field("CHOPCONF", "intpol", enabled as i32))?;
        self.motor.interpolation = enabled;
        Ok(())
    }

    /// Invert the motor direction in the chip (GCONF.shaft).
    pub fn set_direction_reg(&mut self, inverted: bool) -> Result<()> {
        self.with_registers(|regs| regs.set_field("GCONF", "shaft", inverted as i32))
    }

    /// Use the internal sense resistors (TMC2209 only).
    pub fn set_internal_rsense(&mut self, internal: bool) -> Result<()> {
        self.with_registers(|regs| {
            if regs.chip() != Chip::Tmc2209 {
                return Err(ConfigError::Unsupported("internal_rsense").into());
            }
            if internal {
                warn!("internal sense resistors selected, check the board wiring");
            }
            regs.set_field("GCONF", "internal_rsense", internal as i32)
        })
    }

    // ----------------------------------------------------------------------
    // Diagnostics
    // ----------------------------------------------------------------------

    /// Read a register, log its fields and return a copy.
    pub fn read_register(&mut self, name: &str) -> Result<Register> {
        self.with_registers(|regs| {
            regs.read(name)?;
            let reg = regs.get(name)?;
            reg.log();
            Ok(reg.clone())
        })
    }

    /// Read IOIN (pin states and chip version).
    pub fn read_ioin(&mut self) -> Result<Register> {
        self.read_register("IOIN")
    }

    /// Read CHOPCONF.
    pub fn read_chopconf(&mut self) -> Result<Register> {
        self.read_register("CHOPCONF")
    }

    /// Read DRV_STATUS.
    pub fn read_drv_status(&mut self) -> Result<Register> {
        self.read_register("DRV_STATUS")
    }

    /// Read GCONF.
    pub fn read_gconf(&mut self) -> Result<Register> {
        self.read_register("GCONF")
    }

    /// Read GSTAT.
    pub fn read_gstat(&mut self) -> Result<Register> {
        self.read_register("GSTAT")
    }

    /// Clear all GSTAT flags.
    pub fn clear_gstat(&mut self) -> Result<()> {
        let mask = gstat_mask(self.chip);
        self.with_registers(|regs| regs.write_raw("GSTAT", mask))?;
        info!("GSTAT cleared");
        Ok(())
    }

    /// Check that the chip answers with a plausible IOIN version.
    ///
    /// Communication failures are reported as `false`; a latched driver
    /// fault is still an error.
    pub fn test_com(&mut self) -> Result<bool> {
        let raw = match self.with_registers(|regs| regs.read("IOIN")) {
            Ok(raw) => raw,
            Err(Error::Com(e)) => {
                warn!("communication test failed: {}", e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let version = (raw >> 24) as u8;
        if raw == 0 || version < expected_version(self.chip) {
            warn!(ioin = raw, version, chip = self.chip.name(), "unexpected IOIN");
            return Ok(false);
        }
        info!(version, chip = self.chip.name(), "communication ok");
        Ok(true)
    }

    /// Chip temperature in °C (TMC2240 only).
    pub fn get_temperature(&mut self) -> Result<f64> {
        self.with_registers(|regs| {
            if !regs.contains("ADC_TEMP") {
                return Err(ConfigError::Unsupported("temperature ADC").into());
            }
            let adc = regs.read_field("ADC_TEMP", "adc_temp")?;
            Ok(tmc2240_temperature(adc))
        })
    }

    /// Supply voltage in V (TMC2240 only).
    pub fn get_vsupply(&mut self) -> Result<f64> {
        self.with_registers(|regs| {
            if !regs.contains("ADC_VSUPPLY_AIN") {
                return Err(ConfigError::Unsupported("supply voltage ADC").into());
            }
            let adc = regs.read_field("ADC_VSUPPLY_AIN", "adc_vsupply")?;
            Ok(tmc2240_vsupply(adc))
        })
    }

    // ----------------------------------------------------------------------
    // StallGuard and CoolStep
    // ----------------------------------------------------------------------

    /// Arm stall detection on the DIAG pin. See
    /// [`StallGuard::set_stallguard_callback`].
    pub fn set_stallguard_callback<I>(
        &mut self,
        diag: I,
        threshold: u16,
        callback: Option<StallCallback>,
        min_speed: f64,
    ) -> Result<()>
    where
        I: DiagInterrupt + Send + 'static,
    {
        let regs = self.regs()?.clone();
        let sg = self.stallguard_mut()?;
        let mut guard = lock(&regs)?;
        sg.set_stallguard_callback(&mut *guard, diag, threshold, callback, min_speed)
    }

    /// Disarm the DIAG pin.
    pub fn remove_stallguard_callback(&mut self) -> Result<()> {
        match self.stallguard.as_mut() {
            Some(sg) => sg.remove_stallguard_callback(),
            None => Ok(()),
        }
    }

    /// Write the StallGuard threshold without touching the DIAG pin.
    pub fn set_stallguard_threshold(&mut self, threshold: u16) -> Result<()> {
        let regs = self.regs()?.clone();
        let sg = self.stallguard_mut()?;
        let mut guard = lock(&regs)?;
        sg.set_stallguard_threshold(&mut *guard, threshold)
    }

    /// Read the StallGuard result. Lower means more load.
    pub fn get_stallguard_result(&self) -> Result<u16> {
        let sg = self
            .stallguard
            .as_ref()
            .ok_or(ConfigError::NoRegisterBus)?;
        self.with_registers(|regs| sg.get_stallguard_result(regs))
    }

    /// Enable CoolStep current regulation.
    pub fn enable_coolstep(&mut self, coolstep: &CoolStepConfig) -> Result<()> {
        let regs = self.regs()?.clone();
        let sg = self.stallguard_mut()?;
        let mut guard = lock(&regs)?;
        sg.enable_coolstep(&mut *guard, coolstep)
    }

    // ----------------------------------------------------------------------
    // Motion parameters
    // ----------------------------------------------------------------------

    fn microsteps_f64(&self) -> f64 {
        self.motor.microsteps.value() as f64
    }

    /// Current position in µsteps. Valid while a background movement runs.
    pub fn current_pos(&self) -> Result<i64> {
        Ok(self.worker()?.handle().current_pos())
    }

    /// Redefine the current position.
    pub fn set_current_pos(&mut self, pos: i64) -> Result<()> {
        self.worker_mut()?.engine_mut()?.set_current_pos(pos);
        Ok(())
    }

    /// Current position in full steps.
    pub fn current_pos_fullstep(&self) -> Result<i64> {
        Ok(self.current_pos()? / self.motor.microsteps.value() as i64)
    }

    /// Default interpretation of move targets.
    pub fn movement_abs_rel(&self) -> Result<MovementAbsRel> {
        Ok(self.worker()?.engine()?.movement_abs_rel())
    }

    /// Set the default interpretation of move targets.
    pub fn set_movement_abs_rel(&mut self, mode: MovementAbsRel) -> Result<()> {
        self.worker_mut()?.engine_mut()?.set_movement_abs_rel(mode);
        Ok(())
    }

    /// Ramp phase of the current movement.
    pub fn movement_phase(&self) -> Result<MovementPhase> {
        Ok(self.worker()?.handle().phase())
    }

    /// Signed speed in µsteps/s.
    pub fn speed(&self) -> Result<f64> {
        Ok(self.worker()?.handle().speed())
    }

    /// Max speed in µsteps/s.
    pub fn max_speed(&self) -> Result<f64> {
        Ok(self.worker()?.engine()?.max_speed())
    }

    /// Set max speed in µsteps/s.
    pub fn set_max_speed(&mut self, speed: f64) -> Result<()> {
        self.worker_mut()?.engine_mut()?.set_max_speed(speed);
        Ok(())
    }

    /// Max speed in full steps/s.
    pub fn max_speed_fullstep(&self) -> Result<f64> {
        Ok(self.max_speed()? / self.microsteps_f64())
    }

    /// Set max speed in full steps/s.
    pub fn set_max_speed_fullstep(&mut self, speed: f64) -> Result<()> {
        let speed = speed * self.microsteps_f64();
        self.set_max_speed(speed)
    }

    /// Acceleration in µsteps/s².
    pub fn acceleration(&self) -> Result<f64> {
        Ok(self.worker()?.engine()?.acceleration())
    }

    /// Set acceleration in µsteps/s².
    pub fn set_acceleration(&mut self, acceleration: f64) -> Result<()> {
        self.worker_mut()?.engine_mut()?.set_acceleration(acceleration);
        Ok(())
    }

    /// Acceleration in full steps/s².
    pub fn acceleration_fullstep(&self) -> Result<f64> {
        Ok(self.acceleration()? / self.microsteps_f64())
    }

    /// Set acceleration in full steps/s².
    pub fn set_acceleration_fullstep(&mut self, acceleration: f64) -> Result<()> {
        let acceleration = acceleration * self.microsteps_f64();
        self.set_acceleration(acceleration)
    }

    /// Homing speed in µsteps/s.
    pub fn max_speed_homing(&self) -> f64 {
        self.motor.max_speed_homing_fullstep * self.microsteps_f64()
    }

    /// Set the homing speed in µsteps/s.
    pub fn set_max_speed_homing(&mut self, speed: f64) {
        self.motor.max_speed_homing_fullstep = speed.abs() / self.microsteps_f64();
    }

    /// µsteps per revolution.
    pub fn steps_per_rev(&self) -> i64 {
        self.motor.steps_per_rev()
    }

    /// Full steps per revolution.
    pub fn fullsteps_per_rev(&self) -> u16 {
        self.motor.fullsteps_per_rev
    }

    /// Set full steps per revolution.
    pub fn set_fullsteps_per_rev(&mut self, fullsteps: u16) {
        self.motor.fullsteps_per_rev = fullsteps.max(1);
    }

    // ----------------------------------------------------------------------
    // Movement
    // ----------------------------------------------------------------------

    fn fullsteps_to_steps(&self, fullsteps: i64) -> i64 {
        fullsteps.saturating_mul(self.motor.microsteps.value() as i64)
    }

    fn revolutions_to_steps(&self, revolutions: f64) -> i64 {
        round(revolutions * self.steps_per_rev() as f64) as i64
    }

    /// Move `steps` µsteps and block until the movement ends.
    ///
    /// `None` uses the default set with
    /// [`set_movement_abs_rel`](Self::set_movement_abs_rel).
    pub fn run_to_position_steps(
        &mut self,
        steps: i64,
        abs_rel: Option<MovementAbsRel>,
    ) -> Result<StopMode> {
        self.ensure_not_faulted()?;
        self.worker_mut()?.run_to_position_steps(steps, abs_rel)
    }

    /// Move in full steps and block.
    pub fn run_to_position_fullsteps(
        &mut self,
        fullsteps: i64,
        abs_rel: Option<MovementAbsRel>,
    ) -> Result<StopMode> {
        let steps = self.fullsteps_to_steps(fullsteps);
        self.run_to_position_steps(steps, abs_rel)
    }

    /// Move in revolutions and block.
    pub fn run_to_position_revolutions(
        &mut self,
        revolutions: f64,
        abs_rel: Option<MovementAbsRel>,
    ) -> Result<StopMode> {
        let steps = self.revolutions_to_steps(revolutions);
        self.run_to_position_steps(steps, abs_rel)
    }

    /// Start a movement of `steps` µsteps in the background.
    pub fn run_to_position_steps_threaded(
        &mut self,
        steps: i64,
        abs_rel: Option<MovementAbsRel>,
    ) -> Result<()> {
        self.ensure_not_faulted()?;
        self.worker_mut()?.start(steps, abs_rel)
    }

    /// Start a movement in full steps in the background.
    pub fn run_to_position_fullsteps_threaded(
        &mut self,
        fullsteps: i64,
        abs_rel: Option<MovementAbsRel>,
    ) -> Result<()> {
        let steps = self.fullsteps_to_steps(fullsteps);
        self.run_to_position_steps_threaded(steps, abs_rel)
    }

    /// Start a movement in revolutions in the background.
    pub fn run_to_position_revolutions_threaded(
        &mut self,
        revolutions: f64,
        abs_rel: Option<MovementAbsRel>,
    ) -> Result<()> {
        let steps = self.revolutions_to_steps(revolutions);
        self.run_to_position_steps_threaded(steps, abs_rel)
    }

    /// Block until the background movement ends.
    pub fn wait_for_movement_finished(&mut self) -> Result<StopMode> {
        self.worker_mut()?.wait_for_movement_finished()
    }

    /// Request a stop of the running movement.
    pub fn stop(&self, mode: StopMode) -> Result<()> {
        self.worker()?.stop(mode);
        Ok(())
    }

    /// Emit 100 clockwise pulses without a ramp, for wiring checks.
    pub fn test_step(&mut self) -> Result<()> {
        self.ensure_not_faulted()?;
        let engine = self.worker_mut()?.engine_mut()?;
        for _ in 0..100 {
            engine.set_direction(Direction::Clockwise)?;
            engine.make_a_step()?;
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Lifecycle
    // ----------------------------------------------------------------------

    /// Apply the stored motor settings to the chip: clear GSTAT, current,
    /// microstepping, chopper mode and interpolation.
    pub fn apply_config(&mut self) -> Result<()> {
        let motor = self.motor.clone();
        self.clear_gstat()?;
        self.set_current(
            motor.run_current_ma,
            motor.hold_current_multiplier,
            motor.hold_current_delay,
        )?;
        self.set_microstepping_resolution(motor.microsteps)?;
        self.set_spreadcycle(motor.spreadcycle)?;
        self.set_interpolation(motor.interpolation)?;
        info!(chip = self.chip.name(), "configuration applied");
        Ok(())
    }

    /// Take the driver apart without shutting it down.
    ///
    /// A background movement is stopped and joined first.
    pub fn into_parts(self) -> TmcParts<B, STEP, DIR, EN, D> {
        let motion = self.motion.and_then(|worker| match worker.into_engine() {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!("motion engine lost: {}", e);
                None
            }
        });
        TmcParts {
            registers: self.regs,
            motion,
            enable_pin: self.enable.map(EnablePin::release),
            delay: self.delay,
        }
    }

    /// Whether [`shutdown`](Self::shutdown) already ran.
    pub fn is_shut_down(&self) -> bool {
        self.deinit_finished
    }

    /// Stop any movement, disarm StallGuard and disable the outputs.
    ///
    /// Every step is attempted; the first error is returned. Calling it
    /// again does nothing.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.deinit_finished {
            debug!("deinit already finished");
            return Ok(());
        }
        info!("deinit");

        let mut first_err = None;
        if let Some(worker) = self.motion.as_mut() {
            if worker.is_running() {
                worker.stop(StopMode::HardStop);
                if let Err(e) = worker.wait_for_movement_finished() {
                    first_err.get_or_insert(e);
                }
            }
        }
        if let Err(e) = self.remove_stallguard_callback() {
            first_err.get_or_insert(e);
        }
        if let Err(e) = self.set_motor_enabled(false) {
            first_err.get_or_insert(e);
        }

        self.deinit_finished = true;
        info!("deinit finished");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run `f` with the driver and shut it down afterwards, also when `f`
    /// fails. An error from `f` takes precedence over one from shutdown.
    pub fn run_scoped<R, F>(mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let result = f(&mut self);
        let shutdown = self.shutdown();
        let value = result?;
        shutdown?;
        Ok(value)
    }
}

impl<B, STEP, DIR, EN, D> Tmc<B, STEP, DIR, EN, D>
where
    B: RegisterBus,
    STEP: OutputPin + PwmStep + Send + 'static,
    DIR: OutputPin + Send + 'static,
    EN: OutputPin,
    D: DelayNs + Clone + Send + 'static,
{
    /// Run continuously at `speed` µsteps/s with hardware PWM on STEP.
    /// A speed of 0 stops the output, also after a driver fault.
    pub fn run_speed_pwm(&mut self, speed: f64) -> Result<()> {
        if speed != 0.0 {
            self.ensure_not_faulted()?;
        }
        self.worker_mut()?.engine_mut()?.run_speed_pwm(speed)
    }

    /// Run continuously at `speed` full steps/s with hardware PWM on STEP.
    pub fn run_speed_pwm_fullstep(&mut self, speed: f64) -> Result<()> {
        if speed != 0.0 {
            self.ensure_not_faulted()?;
        }
        self.worker_mut()?.engine_mut()?.run_speed_pwm_fullstep(speed)
    }
}

impl<B, STEP, DIR, EN, D> EnableControl for Tmc<B, STEP, DIR, EN, D>
where
    B: RegisterBus,
    STEP: OutputPin + Send + 'static,
    DIR: OutputPin + Send + 'static,
    EN: OutputPin,
    D: DelayNs + Clone + Send + 'static,
{
    fn set_motor_enabled(&mut self, enabled: bool) -> Result<()> {
        Tmc::set_motor_enabled(self, enabled)
    }
}
