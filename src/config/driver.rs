//! Driver configuration from TOML.

use serde::Deserialize;

use super::units::Microsteps;

/// Supported TMC chip families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chip {
    /// TMC2209, single-wire UART, VACTUAL and SGTHRS StallGuard.
    #[default]
    Tmc2209,
    /// TMC2240, SPI, StallGuard4 via SG4_THRS and on-chip ADC.
    Tmc2240,
}

impl Chip {
    /// Human-readable chip name.
    pub fn name(self) -> &'static str {
        match self {
            Chip::Tmc2209 => "TMC2209",
            Chip::Tmc2240 => "TMC2240",
        }
    }
}

/// Complete driver configuration from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Chip family.
    #[serde(default)]
    pub chip: Chip,

    /// UART node address (0-3, set by MS1/MS2 pins).
    #[serde(default)]
    pub driver_address: u8,

    /// Motor and current settings.
    #[serde(default)]
    pub motor: MotorConfig,

    /// EN pin settings.
    #[serde(default)]
    pub enable: EnableConfig,

    /// StallGuard settings.
    #[serde(default)]
    pub stallguard: StallGuardConfig,

    /// UART transport settings.
    #[serde(default)]
    pub uart: UartConfig,

    /// Pulse and polling timing.
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            chip: Chip::default(),
            driver_address: 0,
            motor: MotorConfig::default(),
            enable: EnableConfig::default(),
            stallguard: StallGuardConfig::default(),
            uart: UartConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

/// Motor geometry, current and ramp settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Full steps per revolution (typically 200 for 1.8° motors).
    pub fullsteps_per_rev: u16,

    /// Microstep resolution.
    pub microsteps: Microsteps,

    /// RMS run current in milliamps.
    pub run_current_ma: u16,

    /// Hold current as a fraction of run current.
    pub hold_current_multiplier: f64,

    /// Hold current delay (IHOLDDELAY, 0-15).
    pub hold_current_delay: u8,

    /// Maximum speed in full steps per second.
    pub max_speed_fullstep: f64,

    /// Acceleration in full steps per second squared.
    pub acceleration_fullstep: f64,

    /// Homing speed in full steps per second.
    pub max_speed_homing_fullstep: f64,

    /// Use SpreadCycle instead of StealthChop.
    pub spreadcycle: bool,

    /// Interpolate to 256 microsteps.
    pub interpolation: bool,

    /// Invert direction pin logic.
    pub invert_direction: bool,

    /// Reference resistor in kΩ (TMC2240 current scaling).
    pub rref_kohm: f64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            fullsteps_per_rev: 200,
            microsteps: Microsteps::default(),
            run_current_ma: 800,
            hold_current_multiplier: 0.5,
            hold_current_delay: 10,
            max_speed_fullstep: 100.0,
            acceleration_fullstep: 100.0,
            max_speed_homing_fullstep: 50.0,
            spreadcycle: false,
            interpolation: true,
            invert_direction: false,
            rref_kohm: 12.0,
        }
    }
}

impl MotorConfig {
    /// Microsteps per output shaft revolution.
    pub fn steps_per_rev(&self) -> i64 {
        self.fullsteps_per_rev as i64 * self.microsteps.value() as i64
    }

    /// Max speed in µsteps/s.
    pub fn max_speed(&self) -> f64 {
        self.max_speed_fullstep * self.microsteps.value() as f64
    }

    /// Acceleration in µsteps/s².
    pub fn acceleration(&self) -> f64 {
        self.acceleration_fullstep * self.microsteps.value() as f64
    }
}

/// EN pin configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnableConfig {
    /// Motor output is enabled while EN is low.
    pub active_low: bool,
}

impl Default for EnableConfig {
    fn default() -> Self {
        Self { active_low: true }
    }
}

/// StallGuard detection parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StallGuardConfig {
    /// Stall threshold (SGTHRS / polling mean threshold).
    pub threshold: u16,

    /// Minimum speed in µsteps/s below which StallGuard is suppressed.
    pub min_speed: f64,

    /// Number of recent samples averaged by the polling detector.
    pub window: usize,

    /// Samples collected before the polling detector starts comparing.
    pub min_samples: u32,
}

impl Default for StallGuardConfig {
    fn default() -> Self {
        Self {
            threshold: 100,
            min_speed: 100.0,
            window: 6,
            min_samples: 20,
        }
    }
}

/// UART transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UartConfig {
    /// Attempts per register read.
    pub read_tries: u32,

    /// Attempts per checked register write.
    pub write_tries: u32,

    /// The single-wire bus echoes every transmitted byte.
    pub local_echo: bool,

    /// Pause between request and reply in microseconds.
    pub communication_pause_us: u32,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            read_tries: 10,
            write_tries: 10,
            local_echo: true,
            communication_pause_us: 0,
        }
    }
}

/// Pulse and polling timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// STEP high time in nanoseconds.
    pub step_pulse_ns: u32,

    /// VACTUAL stop-flag polling interval in milliseconds.
    pub vactual_poll_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            step_pulse_ns: 1_000,
            vactual_poll_ms: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_per_rev() {
        let motor = MotorConfig {
            microsteps: Microsteps::EIGHTH,
            ..MotorConfig::default()
        };

        // 200 * 8 = 1600
        assert_eq!(motor.steps_per_rev(), 1600);
    }

    #[test]
    fn test_fullstep_scaling() {
        let motor = MotorConfig {
            microsteps: Microsteps::HALF,
            max_speed_fullstep: 250.0,
            acceleration_fullstep: 1000.0,
            ..MotorConfig::default()
        };

        assert_eq!(motor.max_speed(), 500.0);
        assert_eq!(motor.acceleration(), 2000.0);
    }
}
