//! Cycle-accurate stepping core with periodic interrupt injection and
//! CPU-load accounting.

use crate::error::CpuError;
use crate::execute::{execute_one, HALT_OPCODE};
use crate::memory::{IoBus, MemoryBus};
use crate::registers::{InterruptMode, RegisterFile};

/// Interrupt vector for mode 1 delivery.
pub const IM1_VECTOR: u16 = 0x0038;

/// Default interrupt period: 20 ms at a 3.5 MHz clock.
pub const DEFAULT_INTERRUPT_PERIOD_TSTATES: u32 = 70_000;

/// Default number of interrupts per load-accounting window.
pub const DEFAULT_CPU_LOAD_RANGE: u32 = 1;

/// Timing parameters resolved once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuTimingConfig {
    /// T-states between periodic maskable interrupts.
    pub interrupt_period_tstates: u32,
    /// Interrupts per load-accounting window; the load ratio is published
    /// and the counters reset once per window.
    pub cpu_load_range: u32,
}

impl Default for CpuTimingConfig {
    fn default() -> Self {
        Self {
            interrupt_period_tstates: DEFAULT_INTERRUPT_PERIOD_TSTATES,
            cpu_load_range: DEFAULT_CPU_LOAD_RANGE,
        }
    }
}

/// One Z80 execution core.
///
/// Owns its register file exclusively; memory and ports are injected per
/// call so the caller keeps ownership of the address space.
#[derive(Debug, Clone)]
pub struct Cpu {
    pub(crate) regs: RegisterFile,
    interrupt_period: u32,
    pub(crate) remaining_interrupt_tstates: i64,
    load_tstates: u64,
    total_tstates: u64,
    load: f64,
    load_range: u32,
    load_range_counter: u32,
    ei_defer: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(CpuTimingConfig::default())
    }
}

impl Cpu {
    /// Creates a core in the power-on state.
    #[must_use]
    pub fn new(config: CpuTimingConfig) -> Self {
        let period = config.interrupt_period_tstates.max(1);
        Self {
            regs: RegisterFile::new(),
            interrupt_period: period,
            remaining_interrupt_tstates: i64::from(period),
            load_tstates: 0,
            total_tstates: 0,
            load: 1.0,
            load_range: config.cpu_load_range.max(1),
            load_range_counter: 0,
            ei_defer: false,
        }
    }

    /// Borrows the register file.
    #[must_use]
    pub const fn regs(&self) -> &RegisterFile {
        &self.regs
    }

    /// Mutably borrows the register file (debugger register writes).
    pub const fn regs_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    /// Most recently published CPU load ratio, always in `[0, 1]`.
    ///
    /// Accounts active T-states (everything except `HALT`) against total
    /// T-states over the configured interrupt window. Starts at full load
    /// and is reset to full load when state is restored.
    #[must_use]
    pub const fn load(&self) -> f64 {
        self.load
    }

    /// Executes exactly one instruction.
    ///
    /// Returns `true` when the periodic interrupt countdown expired during
    /// this call (whether or not delivery was masked).
    ///
    /// # Errors
    ///
    /// Propagates [`CpuError`] from interrupt delivery; the register file
    /// is left exactly as of the completed instruction.
    pub fn execute(
        &mut self,
        bus: &mut dyn MemoryBus,
        io: &mut dyn IoBus,
    ) -> Result<bool, CpuError> {
        // Peeked, not fetched: HALT burns cycles that must not count as
        // active load, and interrupt return positioning depends on it.
        let opcode = bus.read8(self.regs.pc);

        let effect = execute_one(&mut self.regs, bus, io);
        self.ei_defer = effect.interrupts_enabled;

        let consumed = u64::from(effect.tstates);
        if opcode != HALT_OPCODE {
            self.load_tstates += consumed;
        }
        self.total_tstates += consumed;

        self.remaining_interrupt_tstates -= i64::from(effect.tstates);
        if self.remaining_interrupt_tstates <= 0 {
            self.remaining_interrupt_tstates = i64::from(self.interrupt_period);
            self.inject_interrupt(bus)?;
            self.load_range_counter += 1;
            if self.load_range_counter >= self.load_range {
                if self.total_tstates > 0 {
                    #[allow(clippy::cast_precision_loss)]
                    {
                        self.load = self.load_tstates as f64 / self.total_tstates as f64;
                    }
                    self.load_tstates = 0;
                    self.total_tstates = 0;
                    self.load_range_counter = 0;
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Delivers one maskable interrupt.
    ///
    /// A no-op while IFF1 is clear or for the one instruction following
    /// `EI`. Otherwise the current PC (stepped past a `HALT` opcode when it
    /// addresses one) is pushed and execution vectors by interrupt mode.
    ///
    /// # Errors
    ///
    /// Returns [`CpuError::UnsupportedInterruptMode`] for mode 0. The
    /// vector is resolved before any state is mutated, so a failed
    /// delivery leaves PC, SP, and both flip-flops untouched.
    pub fn inject_interrupt(&mut self, bus: &mut dyn MemoryBus) -> Result<(), CpuError> {
        if !self.regs.iff1 || self.ei_defer {
            return Ok(());
        }

        let target = match self.regs.im {
            InterruptMode::Im1 => IM1_VECTOR,
            InterruptMode::Im2 => bus.read16(u16::from(self.regs.i) << 8),
            InterruptMode::Im0 => return Err(CpuError::UnsupportedInterruptMode(0)),
        };

        let mut return_addr = self.regs.pc;
        if bus.read8(return_addr) == HALT_OPCODE {
            return_addr = return_addr.wrapping_add(1);
        }
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        bus.write16(self.regs.sp, return_addr);
        self.regs.pc = target;
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        Ok(())
    }

    /// T-states remaining until the next periodic interrupt.
    #[must_use]
    pub const fn remaining_interrupt_tstates(&self) -> i64 {
        self.remaining_interrupt_tstates
    }

    /// Resets load accounting to the full-load baseline.
    ///
    /// Load is undefined across a restore boundary, so deserialization
    /// starts a fresh window.
    pub(crate) const fn reset_load_baseline(&mut self) {
        self.load_tstates = 0;
        self.total_tstates = 0;
        self.load = 1.0;
        self.load_range_counter = 0;
    }
}
