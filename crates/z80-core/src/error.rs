//! Error taxonomy for the execution core.

use thiserror::Error;

/// Fatal execution errors.
///
/// Decode paths are total, so the only execution failure is interrupt
/// vectoring under a mode this core does not support. The failure is
/// detected before any architectural state changes, leaving the register
/// file exactly as of the last fully executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuError {
    /// Interrupt delivery was attempted under an unsupported acknowledge
    /// mode (mode 0 requires a peripheral placing an opcode on the bus,
    /// which is not modeled).
    #[error("interrupt mode {0} is not supported for interrupt delivery")]
    UnsupportedInterruptMode(u8),
}

/// Errors raised while restoring serialized register state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SnapshotLayoutError {
    /// The input is shorter than the fixed serialized layout.
    #[error("serialized state truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Exact byte length the layout requires.
        expected: usize,
        /// Byte length actually supplied.
        actual: usize,
    },
    /// The interrupt-mode slot holds a value outside `{0, 1, 2}`.
    #[error("invalid interrupt mode byte {0:#04x} in serialized state")]
    InvalidInterruptMode(u8),
    /// A flip-flop slot holds a value outside `{0, 1}`.
    #[error("invalid flip-flop byte {0:#04x} in serialized state")]
    InvalidFlipFlop(u8),
}
