//! Integration tests for tmc-driver.
//!
//! These tests drive a complete `Tmc` through the UART transport against a
//! simulated TMC2209, and the STEP/DIR engine against mocked pins.

mod common;
mod unit;

use common::{NoopDelay, SimClock, SimDiag, SimTmc2209, CHOPCONF, GSTAT, IHOLD_IRUN, SGTHRS, VACTUAL};
use embedded_hal::delay::DelayNs;
use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tmc_driver::error::{ComError, DriverFault};
use tmc_driver::{
    Chip, Error, Microsteps, MovementAbsRel, MovementPhase, NoBus, NoPin, StopMode, Tmc,
    TmcBuilder, TmcUart,
};

type UartTmc<D> = Tmc<TmcUart<SimTmc2209, NoopDelay>, NoPin, NoPin, NoPin, D>;

fn uart_driver<D>(sim: &SimTmc2209, delay: D) -> UartTmc<D>
where
    D: DelayNs + Clone + Send + 'static,
{
    TmcBuilder::new(Chip::Tmc2209)
        .bus(TmcUart::new(sim.clone(), NoopDelay::new(), 0))
        .step_pin(NoPin)
        .dir_pin(NoPin)
        .delay(delay)
        .build()
        .unwrap()
}

// =============================================================================
// Register access over UART
// =============================================================================

#[test]
fn test_uart_bring_up() {
    let sim = SimTmc2209::new();
    sim.state().registers.insert(GSTAT, 0b001);
    let mut tmc = uart_driver(&sim, NoopDelay::new());

    assert!(tmc.test_com().unwrap());
    tmc.apply_config().unwrap();

    let state = sim.state();
    assert_eq!(state.written(GSTAT), vec![0b111]);
    assert_eq!(state.registers[&GSTAT], 0);
    assert_eq!(state.written(IHOLD_IRUN).len(), 1);
    // 16 µsteps
    assert_eq!((state.registers[&CHOPCONF] >> 24) & 0xF, 4);
    assert!(state.ifcnt > 0);
    drop(state);

    let gconf = tmc.read_gconf().unwrap();
    assert_eq!(gconf.field("pdn_disable").unwrap(), 1);
    assert_eq!(gconf.field("mstep_reg_select").unwrap(), 1);
    assert_eq!(
        tmc.get_microstepping_resolution().unwrap(),
        Microsteps::SIXTEENTH
    );
}

#[test]
fn test_silent_chip_fails_com_test() {
    let sim = SimTmc2209::default();
    let mut tmc = uart_driver(&sim, NoopDelay::new());

    assert!(!tmc.test_com().unwrap());
}

#[test]
fn test_corrupt_reply_is_retried() {
    let sim = SimTmc2209::new();
    {
        let mut state = sim.state();
        state.sg_results.push_back(42);
        state.corrupt_replies = 2;
    }
    let tmc = uart_driver(&sim, NoopDelay::new());

    assert_eq!(tmc.get_stallguard_result().unwrap(), 42);
}

#[test]
fn test_unacknowledged_write_latches_fault() {
    let sim = SimTmc2209::new();
    {
        let mut state = sim.state();
        state.registers.insert(GSTAT, 0b010);
        state.dropped_writes = 10;
    }
    let mut tmc = uart_driver(&sim, NoopDelay::new());

    assert_eq!(
        tmc.set_spreadcycle(true),
        Err(Error::Com(ComError::WriteNotAcknowledged {
            register: 0x00,
            tries: 10
        }))
    );
    assert_eq!(
        tmc.test_com(),
        Err(Error::Driver(DriverFault { gstat: 0b010 }))
    );
}

#[test]
fn test_stray_bytes_are_discarded() {
    let sim = SimTmc2209::new();
    {
        let mut state = sim.state();
        state.sg_results.push_back(42);
        // a late reply from an earlier exchange
        let mut stale = [0x05, 0xFF, GSTAT, 0, 0, 0, 1, 0];
        stale[7] = tmc_driver::com::crc8(&stale[..7]);
        state.push_stray_rx(&stale);
    }
    let tmc = uart_driver(&sim, NoopDelay::new());

    assert_eq!(tmc.get_stallguard_result().unwrap(), 42);

    sim.state().push_stray_rx(&[0x00, 0x05, 0xFF]);
    assert_eq!(tmc.get_stallguard_result().unwrap(), 42);
}

#[test]
fn test_fault_latch_stops_step_dir_motion() {
    let sim = SimTmc2209::new();
    {
        let mut state = sim.state();
        state.registers.insert(GSTAT, 0b010);
        state.dropped_writes = 10;
    }
    let step = PinMock::new(&[]);
    let dir = PinMock::new(&[]);
    // active low EN: high disables the outputs
    let en = PinMock::new(&[
        PinTransaction::set(State::High),
        PinTransaction::set(State::High),
    ]);
    let mut tmc = TmcBuilder::new(Chip::Tmc2209)
        .bus(TmcUart::new(sim.clone(), NoopDelay::new(), 0))
        .step_pin(step)
        .dir_pin(dir)
        .enable_pin(en)
        .delay(NoopDelay::new())
        .build()
        .unwrap();

    assert!(matches!(
        tmc.set_spreadcycle(true),
        Err(Error::Com(ComError::WriteNotAcknowledged { .. }))
    ));

    let fault = Error::Driver(DriverFault { gstat: 0b010 });
    assert_eq!(tmc.run_to_position_steps(100, None), Err(fault.clone()));
    assert_eq!(tmc.run_to_position_steps_threaded(100, None), Err(fault));
    assert_eq!(tmc.current_pos().unwrap(), 0);

    let parts = tmc.into_parts();
    let (mut step, mut dir, _) = parts.motion.unwrap().release();
    step.done();
    dir.done();
    parts.enable_pin.unwrap().done();
}

// =============================================================================
// StallGuard homing
// =============================================================================

#[test]
fn test_homing_against_stop() {
    let sim = SimTmc2209::new();
    let diag = SimDiag::default();
    let clock = SimClock::new(diag.clone(), 500);
    let mut tmc = uart_driver(&sim, clock.clone());
    tmc.set_current_pos(-4_000).unwrap();

    // 1 revolution at 30 rpm takes 2 s unless the stop is hit
    let homed = tmc.do_homing(diag.clone(), 1.0, 70, Some(30.0)).unwrap();

    assert!(homed);
    assert_eq!(tmc.current_pos().unwrap(), 0);
    assert!(!diag.is_subscribed());
    assert!(clock.elapsed_ms() < 2_000);

    let state = sim.state();
    assert_eq!(state.written(SGTHRS), vec![70]);
    let vactual = state.written(VACTUAL);
    assert_eq!(vactual.len(), 2);
    assert_ne!(vactual[0], 0);
    assert_eq!(vactual[1], 0);
}

#[test]
fn test_homing_without_stop() {
    let sim = SimTmc2209::new();
    let diag = SimDiag::default();
    let clock = SimClock::free_running();
    let mut tmc = uart_driver(&sim, clock.clone());
    tmc.set_current_pos(-4_000).unwrap();

    let homed = tmc.do_homing(diag.clone(), 1.0, 70, Some(30.0)).unwrap();

    assert!(!homed);
    assert_eq!(tmc.current_pos().unwrap(), -4_000);
    assert_eq!(clock.elapsed_ms(), 2_000);
    assert_eq!(sim.state().written(VACTUAL).last(), Some(&0));
}

#[test]
fn test_polling_homing_detects_stall() {
    let sim = SimTmc2209::new();
    {
        let mut state = sim.state();
        state.sg_results.extend(std::iter::repeat(400).take(40));
        state.sg_results.push_back(5);
    }
    let mut tmc = uart_driver(&sim, NoopDelay::new());
    tmc.set_current_pos(777).unwrap();

    assert!(tmc.do_homing_polling(1.0, 50).unwrap());
    assert_eq!(tmc.current_pos().unwrap(), 0);
}

// =============================================================================
// STEP/DIR motion
// =============================================================================

/// Delay that adds up the requested waiting time.
#[derive(Clone, Default)]
struct Stopwatch {
    elapsed_us: Arc<AtomicU64>,
}

impl DelayNs for Stopwatch {
    fn delay_ns(&mut self, _ns: u32) {}

    fn delay_us(&mut self, us: u32) {
        self.elapsed_us.fetch_add(us as u64, Ordering::SeqCst);
    }
}

#[test]
fn test_two_hundred_fullsteps() {
    let mut step_expectations = Vec::new();
    for _ in 0..200 {
        step_expectations.push(PinTransaction::set(State::High));
        step_expectations.push(PinTransaction::set(State::Low));
    }
    let step = PinMock::new(&step_expectations);
    let dir = PinMock::new(&[PinTransaction::set(State::High)]);
    let stopwatch = Stopwatch::default();

    let mut tmc = TmcBuilder::new(Chip::Tmc2209)
        .microsteps(Microsteps::FULL)
        .max_speed_fullstep(250.0)
        .acceleration_fullstep(1_000.0)
        .step_pin(step)
        .dir_pin(dir)
        .delay(stopwatch.clone())
        .build()
        .unwrap();

    let outcome = tmc.run_to_position_steps(200, None).unwrap();
    assert_eq!(outcome, StopMode::NoStop);
    assert_eq!(tmc.current_pos().unwrap(), 200);
    assert_eq!(tmc.movement_phase().unwrap(), MovementPhase::Standstill);

    // 0.25 s up, 0.55 s at 250 steps/s, 0.25 s down
    let elapsed_s = stopwatch.elapsed_us.load(Ordering::SeqCst) as f64 / 1e6;
    assert!(elapsed_s > 0.9 && elapsed_s < 1.4, "took {elapsed_s} s");

    let parts = tmc.into_parts();
    let (mut step, mut dir, _) = parts.motion.unwrap().release();
    step.done();
    dir.done();
}

#[test]
fn test_threaded_move_and_relative_return() {
    let mut tmc = TmcBuilder::new(Chip::Tmc2209)
        .step_pin(NoPin)
        .dir_pin(NoPin)
        .delay(NoopDelay::new())
        .build()
        .unwrap();

    tmc.run_to_position_fullsteps_threaded(50, None).unwrap();
    assert_eq!(tmc.wait_for_movement_finished().unwrap(), StopMode::NoStop);
    assert_eq!(tmc.current_pos_fullstep().unwrap(), 50);

    tmc.run_to_position_revolutions(-0.25, Some(MovementAbsRel::Relative))
        .unwrap();
    assert_eq!(tmc.current_pos_fullstep().unwrap(), 0);
}

#[test]
fn test_scoped_driver_is_shut_down() {
    let tmc: Tmc<NoBus, NoPin, NoPin, NoPin, NoopDelay> = TmcBuilder::new(Chip::Tmc2209)
        .step_pin(NoPin)
        .dir_pin(NoPin)
        .delay(NoopDelay::new())
        .build()
        .unwrap();

    let pos = tmc
        .run_scoped(|tmc| {
            tmc.run_to_position_steps(320, None)?;
            tmc.current_pos()
        })
        .unwrap();
    assert_eq!(pos, 320);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_moves_end_on_target(start in -2_000i64..2_000, target in -2_000i64..2_000) {
        let mut tmc = TmcBuilder::new(Chip::Tmc2209)
            .step_pin(NoPin)
            .dir_pin(NoPin)
            .delay(NoopDelay::new())
            .build()
            .unwrap();
        tmc.set_current_pos(start).unwrap();

        let outcome = tmc.run_to_position_steps(target, Some(MovementAbsRel::Absolute)).unwrap();

        prop_assert_eq!(outcome, StopMode::NoStop);
        prop_assert_eq!(tmc.current_pos().unwrap(), target);
        prop_assert_eq!(tmc.speed().unwrap(), 0.0);
    }
}
