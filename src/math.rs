//! Unit conversions between motion quantities and chip register values.
//!
//! The TMC chips run from a 12 MHz internal clock. TSTEP counts clock ticks
//! between 1/256 microsteps, VACTUAL is expressed in units of
//! `fCLK / 2^24` microsteps per second.

use libm::round;

/// Internal chip clock in Hz.
pub const FCLK: f64 = 12_000_000.0;

/// One VACTUAL unit in microsteps/s (`fCLK / 2^24`).
const VACTUAL_UNIT: f64 = FCLK / (1u32 << 24) as f64;

/// Convert a speed in µsteps/s to a TSTEP threshold value (TPWMTHRS, TCOOLTHRS).
///
/// Returns 0 for a speed of 0, which disables the threshold.
pub fn steps_to_tstep(steps_per_sec: f64, microsteps: u16) -> u32 {
    if steps_per_sec == 0.0 || microsteps == 0 {
        return 0;
    }
    let tstep = FCLK / (steps_per_sec.abs() * 256.0 / microsteps as f64);
    round(tstep).min(u32::MAX as f64) as u32
}

/// Convert a TSTEP reading back into µsteps/s.
pub fn tstep_to_steps(tstep: u32, microsteps: u16) -> f64 {
    if tstep == 0 {
        return 0.0;
    }
    FCLK / tstep as f64 * microsteps as f64 / 256.0
}

/// Convert revolutions per second into a signed VACTUAL register value.
pub fn rps_to_vactual(rps: f64, steps_per_rev: i64) -> i32 {
    round(rps / VACTUAL_UNIT * steps_per_rev as f64) as i32
}

/// Convert a VACTUAL register value into revolutions per second.
pub fn vactual_to_rps(vactual: i32, steps_per_rev: i64) -> f64 {
    if steps_per_rev == 0 {
        return 0.0;
    }
    vactual as f64 * VACTUAL_UNIT / steps_per_rev as f64
}

/// Revolutions per second to µsteps/s.
pub fn rps_to_steps(rps: f64, steps_per_rev: i64) -> f64 {
    rps * steps_per_rev as f64
}

/// µsteps/s to revolutions per second.
pub fn steps_to_rps(steps: f64, steps_per_rev: i64) -> f64 {
    if steps_per_rev == 0 {
        return 0.0;
    }
    steps / steps_per_rev as f64
}

/// Sense resistor plus internal switch resistance of the TMC2209 in Ω.
const TMC2209_RSENSE: f64 = 0.11 + 0.02;

/// Full-scale sense voltage with VSENSE = 0.
const VFS_HIGH: f64 = 0.325;

/// Full-scale sense voltage with VSENSE = 1.
const VFS_LOW: f64 = 0.180;

/// Current scale settings for the TMC2209.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tmc2209Current {
    /// High sensitivity, low sense resistor voltage.
    pub vsense: bool,
    /// Run current scale (IRUN, 0-31).
    pub irun: u8,
    /// Hold current scale (IHOLD, 0-31).
    pub ihold: u8,
}

/// Compute CS values for a requested RMS run current on the TMC2209.
///
/// Switches to high sensitivity (VSENSE) when the low-sensitivity scale
/// would drop below 16.
pub fn tmc2209_current(run_current_ma: u16, hold_multiplier: f64) -> Tmc2209Current {
    let cs_for = |vfs: f64| {
        32.0 * core::f64::consts::SQRT_2 * (run_current_ma as f64 / 1000.0) * TMC2209_RSENSE
            / vfs
            - 1.0
    };

    let mut vsense = false;
    let mut cs = cs_for(VFS_HIGH);
    if cs < 16.0 {
        vsense = true;
        cs = cs_for(VFS_LOW);
    }

    let irun = round(cs).clamp(0.0, 31.0);
    let ihold = round(cs * hold_multiplier).clamp(0.0, 31.0);

    Tmc2209Current {
        vsense,
        irun: irun as u8,
        ihold: ihold as u8,
    }
}

/// Actual RMS current in mA produced by a CS value on the TMC2209.
pub fn tmc2209_cs_to_current(cs: u8, vsense: bool) -> f64 {
    let vfs = if vsense { VFS_LOW } else { VFS_HIGH };
    (cs as f64 + 1.0) / 32.0 * vfs / TMC2209_RSENSE / core::f64::consts::SQRT_2 * 1000.0
}

/// Full-scale constant K_IFS in mA·kΩ per DRV_CONF.current_range.
const TMC2240_KIFS: [f64; 4] = [11_750.0, 24_000.0, 36_000.0, 36_000.0];

/// Current scale settings for the TMC2240.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tmc2240Current {
    /// GLOBAL_SCALER register value (0 encodes full scale 256).
    pub global_scaler: u8,
    /// Run current scale (IRUN, 0-31).
    pub irun: u8,
    /// Hold current scale (IHOLD, 0-31).
    pub ihold: u8,
}

/// Compute GLOBAL_SCALER and CS values for a requested run current on the TMC2240.
pub fn tmc2240_current(
    run_current_ma: u16,
    hold_multiplier: f64,
    current_range: u8,
    rref_kohm: f64,
) -> Tmc2240Current {
    let kifs = TMC2240_KIFS[(current_range & 0x3) as usize];
    let ifs_ma = kifs / rref_kohm;

    let scaler = round(256.0 * run_current_ma as f64 / ifs_ma).clamp(32.0, 256.0) as u16;
    let global_scaler = if scaler >= 256 { 0 } else { scaler as u8 };

    let irun = 31u8;
    let ihold = round(31.0 * hold_multiplier).clamp(0.0, 31.0) as u8;

    Tmc2240Current {
        global_scaler,
        irun,
        ihold,
    }
}

/// ADC_TEMP raw value to °C on the TMC2240.
pub fn tmc2240_temperature(adc_temp: i32) -> f64 {
    (adc_temp as f64 - 2038.0) / 7.7
}

/// ADC_VSUPPLY raw value to volts on the TMC2240.
pub fn tmc2240_vsupply(adc_vsupply: i32) -> f64 {
    adc_vsupply as f64 * 0.009732
}
