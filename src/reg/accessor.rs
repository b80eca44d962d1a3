//! Register cache with bus access.

use std::sync::{Arc, Mutex, MutexGuard};

use heapless::FnvIndexMap;
use tracing::{debug, warn};

use crate::com::RegisterBus;
use crate::config::Chip;
use crate::error::{name, ComError, ConfigError, Result};

use super::register::Register;
use super::status::SpiStatus;
use super::tables;

/// Maximum number of registers per chip table.
const MAX_REGISTERS: usize = 32;

/// Default attempts for checked writes.
pub const DEFAULT_WRITE_TRIES: u32 = 10;

/// All registers of one chip, cached, together with the bus that reaches them.
///
/// Field modifications only touch the cache. They reach the chip through
/// [`write`](Self::write) or [`write_check`](Self::write_check).
pub struct Registers<B> {
    bus: B,
    chip: Chip,
    regs: FnvIndexMap<&'static str, Register, MAX_REGISTERS>,
    write_tries: u32,
    last_status: Option<SpiStatus>,
}

/// Registers shared between the facade, a motion worker and StallGuard polling.
pub type SharedRegisters<B> = Arc<Mutex<Registers<B>>>;

/// Lock shared registers for one logical operation.
///
/// # Errors
///
/// Returns `ComError::BusPoisoned` if a thread panicked while holding the lock.
pub fn lock<B>(regs: &SharedRegisters<B>) -> Result<MutexGuard<'_, Registers<B>>> {
    regs.lock().map_err(|_| ComError::BusPoisoned.into())
}

impl<B: RegisterBus> Registers<B> {
    /// Build the register cache for `chip` on top of `bus`.
    pub fn new(bus: B, chip: Chip) -> Self {
        let mut regs = FnvIndexMap::new();
        for def in tables::table(chip) {
            if regs.insert(def.name, Register::new(def)).is_err() {
                warn!(register = def.name, "register table exceeds cache capacity");
            }
        }

        Self {
            bus,
            chip,
            regs,
            write_tries: DEFAULT_WRITE_TRIES,
            last_status: None,
        }
    }

    /// Wrap into the shared form.
    pub fn into_shared(self) -> SharedRegisters<B> {
        Arc::new(Mutex::new(self))
    }

    /// Set the attempts used by [`write_check`](Self::write_check).
    pub fn set_write_tries(&mut self, tries: u32) {
        self.write_tries = tries;
    }

    /// Chip these registers belong to.
    #[inline]
    pub fn chip(&self) -> Chip {
        self.chip
    }

    /// Whether the chip has a register with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.regs.contains_key(name)
    }

    /// Cached register by name.
    pub fn get(&self, reg: &str) -> Result<&Register> {
        self.regs
            .get(reg)
            .ok_or_else(|| ConfigError::UnknownRegister(name(reg)).into())
    }

    fn get_mut(&mut self, reg: &str) -> Result<&mut Register> {
        self.regs
            .get_mut(reg)
            .ok_or_else(|| ConfigError::UnknownRegister(name(reg)).into())
    }

    /// Field value from the cache.
    pub fn field(&self, reg: &str, field: &str) -> Result<i32> {
        Ok(self.get(reg)?.field(field)?)
    }

    /// Modify a field in the cache. No bus traffic.
    pub fn modify(&mut self, reg: &str, field: &str, value: i32) -> Result<()> {
        self.get_mut(reg)?.modify(field, value)?;
        Ok(())
    }

    /// Read a register from the chip and refresh the cache.
    pub fn read(&mut self, reg: &str) -> Result<u32> {
        let (addr, readable) = {
            let r = self.get(reg)?;
            (r.addr(), r.access().readable())
        };
        if !readable {
            return Err(ConfigError::WriteOnly(name(reg)).into());
        }

        let response = self.bus.read(addr)?;
        if response.status.is_some() {
            self.last_status = response.status;
        }
        let raw = response.value();
        self.get_mut(reg)?.set_raw(raw);
        debug!(register = reg, "read {:#010x}", raw);
        Ok(raw)
    }

    fn writable(&self, reg: &str) -> Result<(u8, u32)> {
        let r = self.get(reg)?;
        if !r.access().writable() {
            return Err(ConfigError::ReadOnly(name(reg)).into());
        }
        Ok((r.addr(), r.raw()))
    }

    /// Write the cached value to the chip.
    pub fn write(&mut self, reg: &str) -> Result<()> {
        let (addr, raw) = self.writable(reg)?;
        debug!(register = reg, "write {:#010x}", raw);
        self.bus.write(addr, raw)
    }

    /// Write the cached value to the chip and verify it was accepted.
    pub fn write_check(&mut self, reg: &str) -> Result<()> {
        let (addr, raw) = self.writable(reg)?;
        debug!(register = reg, "write checked {:#010x}", raw);
        self.bus.write_checked(addr, raw, self.write_tries)
    }

    /// Read a register from the chip and return one field.
    pub fn read_field(&mut self, reg: &str, field: &str) -> Result<i32> {
        self.read(reg)?;
        self.field(reg, field)
    }

    /// Modify one field and commit it with a checked write.
    ///
    /// Readable registers are refreshed first so bits changed on the chip
    /// since the last read are preserved.
    pub fn set_field(&mut self, reg: &str, field: &str, value: i32) -> Result<()> {
        if self.get(reg)?.access().readable() {
            self.read(reg)?;
        }
        self.modify(reg, field, value)?;
        self.write_check(reg)
    }

    /// Replace the cached raw value and commit it with a checked write.
    pub fn write_raw(&mut self, reg: &str, raw: u32) -> Result<()> {
        self.get_mut(reg)?.set_raw(raw);
        self.write_check(reg)
    }

    /// Status flags from the latest SPI reply.
    pub fn last_status(&self) -> Option<SpiStatus> {
        self.last_status
    }

    /// Direct access to the transport.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Shared access to the transport.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Iterate over all cached registers.
    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.regs.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_util::MapBus;

    #[test]
    fn test_modify_does_not_touch_bus() {
        let mut regs = Registers::new(MapBus::default(), Chip::Tmc2209);
        regs.modify("CHOPCONF", "mres", 4).unwrap();
        assert!(regs.bus().writes.is_empty());
        assert!(regs.bus().reads.is_empty());
        assert_eq!(regs.field("CHOPCONF", "mres").unwrap(), 4);
    }

    #[test]
    fn test_read_refreshes_cache() {
        let mut bus = MapBus::default();
        bus.values.insert(0x6C, 0x1000_0053);
        let mut regs = Registers::new(bus, Chip::Tmc2209);

        assert_eq!(regs.read("CHOPCONF").unwrap(), 0x1000_0053);
        assert_eq!(regs.field("CHOPCONF", "toff").unwrap(), 3);
        assert_eq!(regs.field("CHOPCONF", "intpol").unwrap(), 1);
    }

    #[test]
    fn test_set_field_preserves_chip_bits() {
        let mut bus = MapBus::default();
        bus.values.insert(0x00, 0x0000_00C0);
        let mut regs = Registers::new(bus, Chip::Tmc2209);

        regs.set_field("GCONF", "en_spreadcycle", 1).unwrap();
        assert_eq!(regs.bus().writes, vec![(0x00, 0x0000_00C4)]);
    }

    #[test]
    fn test_access_violations() {
        let mut regs = Registers::new(MapBus::default(), Chip::Tmc2209);
        assert!(matches!(
            regs.read("IHOLD_IRUN"),
            Err(Error::Config(ConfigError::WriteOnly(_)))
        ));
        assert!(matches!(
            regs.write("DRV_STATUS"),
            Err(Error::Config(ConfigError::ReadOnly(_)))
        ));
        assert!(matches!(
            regs.get("SG4_THRS"),
            Err(Error::Config(ConfigError::UnknownRegister(_)))
        ));
        assert!(regs.bus().writes.is_empty());
    }

    #[test]
    fn test_set_field_on_write_only_register() {
        let mut regs = Registers::new(MapBus::default(), Chip::Tmc2209);
        regs.modify("IHOLD_IRUN", "ihold", 8).unwrap();
        regs.set_field("IHOLD_IRUN", "irun", 16).unwrap();
        assert_eq!(regs.bus().writes, vec![(0x10, 0x0000_1008)]);
        assert!(regs.bus().reads.is_empty());
    }

    #[test]
    fn test_shared_lock() {
        let shared = Registers::new(MapBus::default(), Chip::Tmc2240).into_shared();
        let guard = lock(&shared).unwrap();
        assert_eq!(guard.chip(), Chip::Tmc2240);
        assert!(guard.contains("SG4_RESULT"));
    }
}
