//! Bit-exact save and restore of CPU register state.
//!
//! Fixed little-endian layout: the twelve 16-bit register slots
//! `PC SP AF BC DE HL IX IY AF' BC' DE' HL'`, then `I R IM IFF1 IFF2` each
//! widened to a full 16-bit slot for layout uniformity, then the 32-bit
//! interrupt countdown. The layout never varies, so callers can size an
//! enclosing snapshot buffer up front from [`serialized_size`].

use crate::cpu::Cpu;
use crate::error::SnapshotLayoutError;
use crate::registers::InterruptMode;

const PAIR_SLOTS: usize = 12;
const WIDE_BYTE_SLOTS: usize = 5;
const COUNTDOWN_BYTES: usize = 4;

/// Exact byte length produced by [`serialize`].
pub const SERIALIZED_STATE_BYTES: usize = (PAIR_SLOTS + WIDE_BYTE_SLOTS) * 2 + COUNTDOWN_BYTES;

/// Returns the exact byte length [`serialize`] produces.
#[must_use]
pub const fn serialized_size() -> usize {
    SERIALIZED_STATE_BYTES
}

/// Serializes the register state and interrupt countdown of `cpu`.
#[must_use]
pub fn serialize(cpu: &Cpu) -> Vec<u8> {
    let mut out = Vec::with_capacity(SERIALIZED_STATE_BYTES);
    serialize_into(cpu, &mut out);
    out
}

/// Appends the serialized state of `cpu` to `out`.
pub fn serialize_into(cpu: &Cpu, out: &mut Vec<u8>) {
    let regs = cpu.regs();
    for value in [
        regs.pc(),
        regs.sp(),
        regs.af(),
        regs.bc(),
        regs.de(),
        regs.hl(),
        regs.ix(),
        regs.iy(),
        regs.af_shadow(),
        regs.bc_shadow(),
        regs.de_shadow(),
        regs.hl_shadow(),
        u16::from(regs.i()),
        u16::from(regs.r()),
        u16::from(regs.im().as_u8()),
        u16::from(regs.iff1()),
        u16::from(regs.iff2()),
    ] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    let countdown = u32::try_from(cpu.remaining_interrupt_tstates().max(0)).unwrap_or(u32::MAX);
    out.extend_from_slice(&countdown.to_le_bytes());
}

/// Restores register state and interrupt countdown from `input`.
///
/// Exactly inverts [`serialize`]. Load accounting is reset to the
/// full-load baseline: the ratio is undefined across a restore boundary.
/// Trailing bytes beyond the fixed layout are ignored so the state can be
/// read in place from the head of an enclosing snapshot buffer.
///
/// # Errors
///
/// Returns [`SnapshotLayoutError`] when `input` is shorter than the fixed
/// layout or a widened byte slot holds an out-of-domain value. The CPU is
/// left unmodified on error.
pub fn deserialize(cpu: &mut Cpu, input: &[u8]) -> Result<(), SnapshotLayoutError> {
    if input.len() < SERIALIZED_STATE_BYTES {
        return Err(SnapshotLayoutError::Truncated {
            expected: SERIALIZED_STATE_BYTES,
            actual: input.len(),
        });
    }

    let mut slots = [0_u16; PAIR_SLOTS + WIDE_BYTE_SLOTS];
    for (index, slot) in slots.iter_mut().enumerate() {
        let offset = index * 2;
        *slot = u16::from_le_bytes([input[offset], input[offset + 1]]);
    }

    let im_slot = slots[14];
    let Some(im) = u8::try_from(im_slot)
        .ok()
        .and_then(InterruptMode::from_u8)
    else {
        return Err(SnapshotLayoutError::InvalidInterruptMode((im_slot & 0xFF) as u8));
    };
    let iff1 = flip_flop(slots[15])?;
    let iff2 = flip_flop(slots[16])?;

    let countdown_offset = (PAIR_SLOTS + WIDE_BYTE_SLOTS) * 2;
    let countdown = u32::from_le_bytes([
        input[countdown_offset],
        input[countdown_offset + 1],
        input[countdown_offset + 2],
        input[countdown_offset + 3],
    ]);

    let regs = cpu.regs_mut();
    regs.set_pc(slots[0]);
    regs.set_sp(slots[1]);
    regs.set_af(slots[2]);
    regs.set_bc(slots[3]);
    regs.set_de(slots[4]);
    regs.set_hl(slots[5]);
    regs.set_ix(slots[6]);
    regs.set_iy(slots[7]);
    regs.set_af_shadow(slots[8]);
    regs.set_bc_shadow(slots[9]);
    regs.set_de_shadow(slots[10]);
    regs.set_hl_shadow(slots[11]);
    regs.set_i((slots[12] & 0xFF) as u8);
    regs.set_r((slots[13] & 0xFF) as u8);
    regs.set_im(im);
    regs.set_iff1(iff1);
    regs.set_iff2(iff2);

    cpu.remaining_interrupt_tstates = i64::from(countdown);
    cpu.reset_load_baseline();
    Ok(())
}

fn flip_flop(slot: u16) -> Result<bool, SnapshotLayoutError> {
    match slot {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(SnapshotLayoutError::InvalidFlipFlop((slot & 0xFF) as u8)),
    }
}
