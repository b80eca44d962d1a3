//! Unit test harness for tmc-driver.
//!
//! Configuration tests run against the public API only.

mod config_parsing;
mod config_validation;
