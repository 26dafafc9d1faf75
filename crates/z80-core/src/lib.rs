//! Cycle-accurate Z80 execution core for remote debugging.
//!
//! The core executes one instruction at a time with exact T-state costs,
//! injects periodic maskable interrupts, tracks a CPU-load statistic, and
//! saves/restores its register state bit-exactly. Memory and ports are
//! injected interfaces: the caller owns the address space.

/// Architectural register model and flag bits.
pub mod registers;
pub use registers::{
    InterruptMode, RegisterFile, FLAG_3, FLAG_5, FLAG_C, FLAG_H, FLAG_N, FLAG_PV, FLAG_S, FLAG_Z,
    WIRE_REGISTER_SLOTS,
};

/// Memory and port interfaces plus the flat test/simulator image.
pub mod memory;
pub use memory::{
    FlatMemory, IoBus, MemoryBus, ADDRESS_SPACE_BYTES, ATTR_READ_WATCH, ATTR_WRITE_WATCH,
};

/// Total instruction decode/execute pipeline.
pub mod execute;
pub use execute::{execute_one, StepEffect, HALT_OPCODE};

/// Stepping core with interrupt injection and load accounting.
pub mod cpu;
pub use cpu::{
    Cpu, CpuTimingConfig, DEFAULT_CPU_LOAD_RANGE, DEFAULT_INTERRUPT_PERIOD_TSTATES, IM1_VECTOR,
};

/// Bit-exact register state serialization.
pub mod serialize;
pub use serialize::{
    deserialize, serialize, serialize_into, serialized_size, SERIALIZED_STATE_BYTES,
};

/// Error taxonomy.
pub mod error;
pub use error::{CpuError, SnapshotLayoutError};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
