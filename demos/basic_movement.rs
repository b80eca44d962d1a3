//! Basic movement example.
//!
//! Builds a STEP/DIR-only driver from TOML, runs a blocking move, a
//! background move that gets soft-stopped, and shuts the driver down.
//!
//! The pins only count pulses, so no hardware is needed. Run with
//! `RUST_LOG=tmc_driver=debug` for the driver's log output.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tmc_driver::{parse_config, Chip, MovementAbsRel, StdDelay, StopMode, TmcBuilder};
use tracing_subscriber::EnvFilter;

/// Output pin counting rising edges.
#[derive(Clone, Default)]
struct CountingPin {
    rising_edges: Arc<AtomicU32>,
}

impl embedded_hal::digital::ErrorType for CountingPin {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for CountingPin {
    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.rising_edges.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

const CONFIG: &str = r#"
chip = "tmc2209"

[motor]
fullsteps_per_rev = 200
microsteps = 8
max_speed_fullstep = 250.0
acceleration_fullstep = 1000.0
"#;

fn main() -> tmc_driver::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Basic Movement Example ===\n");

    let config = parse_config(CONFIG)?;
    let step_pin = CountingPin::default();
    let pulses = step_pin.rising_edges.clone();

    let mut tmc = TmcBuilder::new(Chip::Tmc2209)
        .from_config(&config)?
        .step_pin(step_pin)
        .dir_pin(CountingPin::default())
        .delay(StdDelay)
        .build()?;

    println!(
        "{} µsteps/rev, max speed {} µsteps/s",
        tmc.steps_per_rev(),
        tmc.max_speed()?
    );

    let outcome = tmc.run_to_position_fullsteps(200, None)?;
    println!(
        "Blocking move: {:?}, position {} fullsteps, {} pulses",
        outcome,
        tmc.current_pos_fullstep()?,
        pulses.load(Ordering::Relaxed)
    );

    tmc.run_to_position_revolutions_threaded(-5.0, Some(MovementAbsRel::Relative))?;
    thread::sleep(Duration::from_millis(500));
    println!(
        "Background move: {:?} at {:.0} µsteps/s, position {}",
        tmc.movement_phase()?,
        tmc.speed()?,
        tmc.current_pos()?
    );

    tmc.stop(StopMode::SoftStop)?;
    let outcome = tmc.wait_for_movement_finished()?;
    println!(
        "Stopped with {:?} at position {}",
        outcome,
        tmc.current_pos()?
    );

    tmc.shutdown()?;
    println!("\n=== Example Complete ===");
    Ok(())
}
