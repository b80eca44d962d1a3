//! Chip registers.
//!
//! [`Field`] and [`Register`] describe bit layouts, [`tables`] holds the
//! static per-chip definitions and [`Registers`] is the cache that commits
//! values through a [`RegisterBus`](crate::com::RegisterBus).

mod accessor;
mod field;
mod register;
mod status;
pub mod tables;

pub use accessor::{lock, Registers, SharedRegisters, DEFAULT_WRITE_TRIES};
pub use field::Field;
pub use register::{Access, Register, RegisterDef};
pub use status::SpiStatus;
