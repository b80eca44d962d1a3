//! Register definitions and cached register values.

use tracing::debug;

use crate::error::{name, ConfigError};

use super::field::Field;

/// Bus direction a register supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read-only.
    Read,
    /// Write-only.
    Write,
    /// Read and write.
    ReadWrite,
}

impl Access {
    /// Register can be read from the bus.
    #[inline]
    pub fn readable(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    /// Register can be written to the bus.
    #[inline]
    pub fn writable(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// Static description of one chip register.
#[derive(Debug)]
pub struct RegisterDef {
    /// Datasheet name (uppercase).
    pub name: &'static str,
    /// 7-bit register address.
    pub addr: u8,
    /// Supported bus direction.
    pub access: Access,
    /// Bit-field layout.
    pub fields: &'static [Field],
}

impl RegisterDef {
    /// Look up a field by name.
    pub fn field(&self, field: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == field)
    }
}

/// A register definition together with its cached raw value.
///
/// Field writes only touch the cache; committing to the chip is done
/// through [`Registers`](super::Registers).
#[derive(Debug, Clone)]
pub struct Register {
    def: &'static RegisterDef,
    raw: u32,
}

impl Register {
    /// Create a register with a zeroed cache.
    pub fn new(def: &'static RegisterDef) -> Self {
        Self { def, raw: 0 }
    }

    /// Register name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// Register address.
    #[inline]
    pub fn addr(&self) -> u8 {
        self.def.addr
    }

    /// Register access.
    #[inline]
    pub fn access(&self) -> Access {
        self.def.access
    }

    /// Cached raw value.
    #[inline]
    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Replace the cached raw value.
    #[inline]
    pub fn set_raw(&mut self, raw: u32) {
        self.raw = raw;
    }

    /// Static definition backing this register.
    pub fn def(&self) -> &'static RegisterDef {
        self.def
    }

    fn lookup(&self, field: &str) -> Result<&'static Field, ConfigError> {
        self.def.field(field).ok_or_else(|| ConfigError::UnknownField {
            register: name(self.def.name),
            field: name(field),
        })
    }

    /// Read a field from the cached value.
    pub fn field(&self, field: &str) -> Result<i32, ConfigError> {
        Ok(self.lookup(field)?.extract(self.raw))
    }

    /// Read a single-bit field as a flag.
    pub fn flag(&self, field: &str) -> Result<bool, ConfigError> {
        Ok(self.field(field)? != 0)
    }

    /// Modify a field in the cached value.
    pub fn modify(&mut self, field: &str, value: i32) -> Result<(), ConfigError> {
        let f = self.lookup(field)?;
        self.raw = f.insert(self.raw, value)?;
        Ok(())
    }

    /// Iterate over `(field name, value)` pairs of the cached value.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, i32)> + '_ {
        self.def.fields.iter().map(move |f| (f.name, f.extract(self.raw)))
    }

    /// Log every field of the cached value at debug level.
    pub fn log(&self) {
        debug!(register = self.def.name, "raw {:#010x}", self.raw);
        for (field, value) in self.fields() {
            debug!(register = self.def.name, field, value);
        }
    }
}
