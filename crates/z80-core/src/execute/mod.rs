//! Total Z80 instruction decode and execute pipeline.
//!
//! Every byte value maps to defined behavior: the full unprefixed set, the
//! `CB` bit-operation set, the `ED` set (undefined entries behave as
//! 8-T-state no-ops, as on hardware), `DD`/`FD` indexed forms with
//! `HL`→`IX`/`IY` substitution, and the `DD CB`/`FD CB` indexed bit
//! operations with their extra displacement byte. Costs come from the
//! tables in [`tables`] plus additive corrections applied by the handlers.

#![allow(
    clippy::pedantic,
    clippy::nursery,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]

mod alu;
mod tables;

use crate::memory::{IoBus, MemoryBus};
use crate::registers::{InterruptMode, RegisterFile, FLAG_3, FLAG_5, FLAG_C, FLAG_H, FLAG_N, FLAG_PV, FLAG_S, FLAG_Z};
use tables::{BASE_CYCLES, CB_CYCLES};

/// Opcode of the `HALT` instruction, peeked for load accounting and
/// interrupt-return positioning.
pub const HALT_OPCODE: u8 = 0x76;

/// Observable effect of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEffect {
    /// T-states consumed by the instruction, prefixes included.
    pub tstates: u32,
    /// True when the instruction was `EI`; interrupt delivery is deferred
    /// for exactly one instruction after enabling.
    pub interrupts_enabled: bool,
}

/// Executes exactly one instruction at PC and returns its effect.
///
/// Decoding is total; this function cannot fail. Interrupt delivery is the
/// caller's concern ([`crate::Cpu::execute`]).
pub fn execute_one(
    regs: &mut RegisterFile,
    bus: &mut dyn MemoryBus,
    io: &mut dyn IoBus,
) -> StepEffect {
    let mut exec = Exec {
        r: regs,
        bus,
        io,
        t: 0,
        ei: false,
    };
    exec.step();
    StepEffect {
        tstates: exec.t,
        interrupts_enabled: exec.ei,
    }
}

/// Effective index register selected by a `DD`/`FD` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Index {
    Hl,
    Ix,
    Iy,
}

struct Exec<'a> {
    r: &'a mut RegisterFile,
    bus: &'a mut dyn MemoryBus,
    io: &'a mut dyn IoBus,
    t: u32,
    ei: bool,
}

impl Exec<'_> {
    fn step(&mut self) {
        let op = self.fetch_op();
        match op {
            0xED => self.exec_ed(),
            0xDD | 0xFD => {
                let idx = if op == 0xDD { Index::Ix } else { Index::Iy };
                match self.bus.read8(self.r.pc) {
                    // A prefix followed by another prefix acts as a
                    // 4-T-state no-op; the next call resumes at the
                    // follower. Keeps degenerate prefix chains bounded.
                    0xDD | 0xFD | 0xED => self.t += 4,
                    _ => {
                        let follow = self.fetch_op();
                        self.exec_main(follow, idx);
                    }
                }
            }
            _ => self.exec_main(op, Index::Hl),
        }
    }

    // ---- fetch/memory primitives -------------------------------------

    fn fetch_op(&mut self) -> u8 {
        self.r.bump_refresh();
        let op = self.bus.read8(self.r.pc);
        self.r.pc = self.r.pc.wrapping_add(1);
        op
    }

    fn fetch8(&mut self) -> u8 {
        let value = self.bus.read8(self.r.pc);
        self.r.pc = self.r.pc.wrapping_add(1);
        value
    }

    fn fetch16(&mut self) -> u16 {
        let lo = u16::from(self.fetch8());
        let hi = u16::from(self.fetch8());
        (hi << 8) | lo
    }

    fn push16(&mut self, value: u16) {
        self.r.sp = self.r.sp.wrapping_sub(2);
        self.bus.write16(self.r.sp, value);
    }

    fn pop16(&mut self) -> u16 {
        let value = self.bus.read16(self.r.sp);
        self.r.sp = self.r.sp.wrapping_add(2);
        value
    }

    /// Effective address of a `(HL)`-shaped operand. Under an index prefix
    /// this fetches the signed displacement byte and charges
    /// `indexed_extra` T-states on top of the base-plus-prefix cost.
    fn operand_addr(&mut self, idx: Index, indexed_extra: u32) -> u16 {
        let base = match idx {
            Index::Hl => return self.r.hl(),
            Index::Ix => self.r.ix,
            Index::Iy => self.r.iy,
        };
        let displacement = self.fetch8() as i8;
        self.t += indexed_extra;
        base.wrapping_add(displacement as u16)
    }

    // ---- register helpers --------------------------------------------

    fn reg8(&self, code: u8, idx: Index) -> u8 {
        match code {
            0 => self.r.b,
            1 => self.r.c,
            2 => self.r.d,
            3 => self.r.e,
            4 => match idx {
                Index::Hl => self.r.h,
                Index::Ix => (self.r.ix >> 8) as u8,
                Index::Iy => (self.r.iy >> 8) as u8,
            },
            5 => match idx {
                Index::Hl => self.r.l,
                Index::Ix => self.r.ix as u8,
                Index::Iy => self.r.iy as u8,
            },
            7 => self.r.a,
            // Code 6 is a memory operand; callers route it before here.
            _ => 0,
        }
    }

    fn set_reg8(&mut self, code: u8, idx: Index, value: u8) {
        match code {
            0 => self.r.b = value,
            1 => self.r.c = value,
            2 => self.r.d = value,
            3 => self.r.e = value,
            4 => match idx {
                Index::Hl => self.r.h = value,
                Index::Ix => self.r.ix = (self.r.ix & 0x00FF) | (u16::from(value) << 8),
                Index::Iy => self.r.iy = (self.r.iy & 0x00FF) | (u16::from(value) << 8),
            },
            5 => match idx {
                Index::Hl => self.r.l = value,
                Index::Ix => self.r.ix = (self.r.ix & 0xFF00) | u16::from(value),
                Index::Iy => self.r.iy = (self.r.iy & 0xFF00) | u16::from(value),
            },
            7 => self.r.a = value,
            _ => {}
        }
    }

    fn rp(&self, p: u8, idx: Index) -> u16 {
        match p {
            0 => self.r.bc(),
            1 => self.r.de(),
            2 => match idx {
                Index::Hl => self.r.hl(),
                Index::Ix => self.r.ix,
                Index::Iy => self.r.iy,
            },
            _ => self.r.sp,
        }
    }

    fn set_rp(&mut self, p: u8, idx: Index, value: u16) {
        match p {
            0 => self.r.set_bc(value),
            1 => self.r.set_de(value),
            2 => match idx {
                Index::Hl => self.r.set_hl(value),
                Index::Ix => self.r.ix = value,
                Index::Iy => self.r.iy = value,
            },
            _ => self.r.sp = value,
        }
    }

    fn condition(&self, code: u8) -> bool {
        match code {
            0 => !self.r.flag(FLAG_Z),
            1 => self.r.flag(FLAG_Z),
            2 => !self.r.flag(FLAG_C),
            3 => self.r.flag(FLAG_C),
            4 => !self.r.flag(FLAG_PV),
            5 => self.r.flag(FLAG_PV),
            6 => !self.r.flag(FLAG_S),
            _ => self.r.flag(FLAG_S),
        }
    }

    fn alu_apply(&mut self, operation: u8, value: u8) {
        let mut f = self.r.f;
        let a = self.r.a;
        let carry = f & FLAG_C != 0;
        match operation {
            0 => self.r.a = alu::add8(&mut f, a, value, false),
            1 => self.r.a = alu::add8(&mut f, a, value, carry),
            2 => self.r.a = alu::sub8(&mut f, a, value, false),
            3 => self.r.a = alu::sub8(&mut f, a, value, carry),
            4 => self.r.a = alu::and8(&mut f, a, value),
            5 => self.r.a = alu::xor8(&mut f, a, value),
            6 => self.r.a = alu::or8(&mut f, a, value),
            _ => alu::cp8(&mut f, a, value),
        }
        self.r.f = f;
    }

    fn rotate_apply(&mut self, operation: u8, value: u8) -> u8 {
        let mut f = self.r.f;
        let result = match operation {
            0 => alu::rlc(&mut f, value),
            1 => alu::rrc(&mut f, value),
            2 => alu::rl(&mut f, value),
            3 => alu::rr(&mut f, value),
            4 => alu::sla(&mut f, value),
            5 => alu::sra(&mut f, value),
            6 => alu::sll(&mut f, value),
            _ => alu::srl(&mut f, value),
        };
        self.r.f = f;
        result
    }

    // ---- main dispatch ------------------------------------------------

    fn exec_main(&mut self, op: u8, idx: Index) {
        if op == 0xCB {
            if idx == Index::Hl {
                self.exec_cb();
            } else {
                self.exec_indexed_cb(idx);
            }
            return;
        }

        self.t += u32::from(BASE_CYCLES[usize::from(op)]);
        if idx != Index::Hl {
            self.t += 4;
        }

        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;
        match x {
            0 => self.exec_x0(y, z, idx),
            1 => self.exec_x1(op, y, z, idx),
            2 => {
                let value = if z == 6 {
                    let addr = self.operand_addr(idx, 8);
                    self.bus.read8(addr)
                } else {
                    self.reg8(z, idx)
                };
                self.alu_apply(y, value);
            }
            _ => self.exec_x3(y, z, idx),
        }
    }

    fn exec_x0(&mut self, y: u8, z: u8, idx: Index) {
        let p = y >> 1;
        let q = y & 1;
        match z {
            0 => match y {
                0 => {} // NOP
                1 => self.r.exchange_af(),
                2 => {
                    let displacement = self.fetch8() as i8;
                    self.r.b = self.r.b.wrapping_sub(1);
                    if self.r.b != 0 {
                        self.r.pc = self.r.pc.wrapping_add(displacement as u16);
                        self.t += 5;
                    }
                }
                3 => {
                    let displacement = self.fetch8() as i8;
                    self.r.pc = self.r.pc.wrapping_add(displacement as u16);
                }
                _ => {
                    let displacement = self.fetch8() as i8;
                    if self.condition(y - 4) {
                        self.r.pc = self.r.pc.wrapping_add(displacement as u16);
                        self.t += 5;
                    }
                }
            },
            1 => {
                if q == 0 {
                    let value = self.fetch16();
                    self.set_rp(p, idx, value);
                } else {
                    let mut f = self.r.f;
                    let result = alu::add16(&mut f, self.rp(2, idx), self.rp(p, idx));
                    self.r.f = f;
                    self.set_rp(2, idx, result);
                }
            }
            2 => match (p, q) {
                (0, 0) => self.bus.write8(self.r.bc(), self.r.a),
                (0, 1) => self.r.a = self.bus.read8(self.r.bc()),
                (1, 0) => self.bus.write8(self.r.de(), self.r.a),
                (1, 1) => self.r.a = self.bus.read8(self.r.de()),
                (2, 0) => {
                    let addr = self.fetch16();
                    let value = self.rp(2, idx);
                    self.bus.write16(addr, value);
                }
                (2, 1) => {
                    let addr = self.fetch16();
                    let value = self.bus.read16(addr);
                    self.set_rp(2, idx, value);
                }
                (3, 0) => {
                    let addr = self.fetch16();
                    self.bus.write8(addr, self.r.a);
                }
                _ => {
                    let addr = self.fetch16();
                    self.r.a = self.bus.read8(addr);
                }
            },
            3 => {
                let value = self.rp(p, idx);
                let next = if q == 0 {
                    value.wrapping_add(1)
                } else {
                    value.wrapping_sub(1)
                };
                self.set_rp(p, idx, next);
            }
            4 | 5 => {
                let step = |f: &mut u8, v: u8| {
                    if z == 4 {
                        alu::inc8(f, v)
                    } else {
                        alu::dec8(f, v)
                    }
                };
                if y == 6 {
                    let addr = self.operand_addr(idx, 8);
                    let value = self.bus.read8(addr);
                    let mut f = self.r.f;
                    let result = step(&mut f, value);
                    self.r.f = f;
                    self.bus.write8(addr, result);
                } else {
                    let value = self.reg8(y, idx);
                    let mut f = self.r.f;
                    let result = step(&mut f, value);
                    self.r.f = f;
                    self.set_reg8(y, idx, result);
                }
            }
            6 => {
                if y == 6 {
                    // LD (IX/IY+d),n: displacement precedes the immediate;
                    // total cost is 19 T-states under an index prefix.
                    let addr = self.operand_addr(idx, 5);
                    let value = self.fetch8();
                    self.bus.write8(addr, value);
                } else {
                    let value = self.fetch8();
                    self.set_reg8(y, idx, value);
                }
            }
            _ => self.exec_accumulator_group(y),
        }
    }

    fn exec_accumulator_group(&mut self, y: u8) {
        match y {
            0 => {
                let carry = self.r.a & 0x80 != 0;
                self.r.a = self.r.a.rotate_left(1);
                let mut f = self.r.f;
                alu::accumulator_rotate_flags(&mut f, self.r.a, carry);
                self.r.f = f;
            }
            1 => {
                let carry = self.r.a & 0x01 != 0;
                self.r.a = self.r.a.rotate_right(1);
                let mut f = self.r.f;
                alu::accumulator_rotate_flags(&mut f, self.r.a, carry);
                self.r.f = f;
            }
            2 => {
                let carry = self.r.a & 0x80 != 0;
                self.r.a = (self.r.a << 1) | u8::from(self.r.f & FLAG_C != 0);
                let mut f = self.r.f;
                alu::accumulator_rotate_flags(&mut f, self.r.a, carry);
                self.r.f = f;
            }
            3 => {
                let carry = self.r.a & 0x01 != 0;
                self.r.a = (self.r.a >> 1) | ((self.r.f & FLAG_C) << 7);
                let mut f = self.r.f;
                alu::accumulator_rotate_flags(&mut f, self.r.a, carry);
                self.r.f = f;
            }
            4 => {
                let mut f = self.r.f;
                self.r.a = alu::daa(&mut f, self.r.a);
                self.r.f = f;
            }
            5 => {
                self.r.a = !self.r.a;
                self.r.f = (self.r.f & (FLAG_S | FLAG_Z | FLAG_PV | FLAG_C))
                    | FLAG_H
                    | FLAG_N
                    | (self.r.a & (FLAG_3 | FLAG_5));
            }
            6 => {
                self.r.f = (self.r.f & (FLAG_S | FLAG_Z | FLAG_PV))
                    | FLAG_C
                    | (self.r.a & (FLAG_3 | FLAG_5));
            }
            _ => {
                let carry = self.r.f & FLAG_C != 0;
                let mut f = (self.r.f & (FLAG_S | FLAG_Z | FLAG_PV)) | (self.r.a & (FLAG_3 | FLAG_5));
                if carry {
                    f |= FLAG_H;
                } else {
                    f |= FLAG_C;
                }
                self.r.f = f;
            }
        }
    }

    fn exec_x1(&mut self, op: u8, y: u8, z: u8, idx: Index) {
        if op == HALT_OPCODE {
            // HALT repeats until an interrupt arrives: leave PC on the
            // opcode so the periodic injection can step past it.
            self.r.pc = self.r.pc.wrapping_sub(1);
            return;
        }
        if y == 6 {
            // The register side of an indexed store uses the unprefixed
            // set: LD (IX+d),H stores H, not IXH.
            let addr = self.operand_addr(idx, 8);
            let value = self.reg8(z, Index::Hl);
            self.bus.write8(addr, value);
        } else if z == 6 {
            let addr = self.operand_addr(idx, 8);
            let value = self.bus.read8(addr);
            self.set_reg8(y, Index::Hl, value);
        } else {
            let value = self.reg8(z, idx);
            self.set_reg8(y, idx, value);
        }
    }

    fn exec_x3(&mut self, y: u8, z: u8, idx: Index) {
        let p = y >> 1;
        let q = y & 1;
        match z {
            0 => {
                if self.condition(y) {
                    self.r.pc = self.pop16();
                    self.t += 6;
                }
            }
            1 => {
                if q == 0 {
                    let value = self.pop16();
                    if p == 3 {
                        self.r.set_af(value);
                    } else {
                        self.set_rp(p, idx, value);
                    }
                } else {
                    match p {
                        0 => self.r.pc = self.pop16(),
                        1 => self.r.exchange_main(),
                        2 => self.r.pc = self.rp(2, idx),
                        _ => self.r.sp = self.rp(2, idx),
                    }
                }
            }
            2 => {
                let target = self.fetch16();
                if self.condition(y) {
                    self.r.pc = target;
                }
            }
            3 => match y {
                0 => self.r.pc = self.fetch16(),
                2 => {
                    let port_low = self.fetch8();
                    let port = (u16::from(self.r.a) << 8) | u16::from(port_low);
                    self.io.port_write(port, self.r.a);
                }
                3 => {
                    let port_low = self.fetch8();
                    let port = (u16::from(self.r.a) << 8) | u16::from(port_low);
                    self.r.a = self.io.port_read(port);
                }
                4 => {
                    let stacked = self.bus.read16(self.r.sp);
                    let value = self.rp(2, idx);
                    self.bus.write16(self.r.sp, value);
                    self.set_rp(2, idx, stacked);
                }
                5 => {
                    let de = self.r.de();
                    let hl = self.r.hl();
                    self.r.set_de(hl);
                    self.r.set_hl(de);
                }
                6 => {
                    self.r.iff1 = false;
                    self.r.iff2 = false;
                }
                _ => {
                    self.r.iff1 = true;
                    self.r.iff2 = true;
                    self.ei = true;
                }
            },
            4 => {
                let target = self.fetch16();
                if self.condition(y) {
                    let return_addr = self.r.pc;
                    self.push16(return_addr);
                    self.r.pc = target;
                    self.t += 7;
                }
            }
            5 => {
                if q == 0 {
                    let value = if p == 3 { self.r.af() } else { self.rp(p, idx) };
                    self.push16(value);
                } else {
                    // p == 0 is CALL nn; 1..=3 are the DD/ED/FD prefixes,
                    // routed before dispatch ever reaches here.
                    let target = self.fetch16();
                    let return_addr = self.r.pc;
                    self.push16(return_addr);
                    self.r.pc = target;
                }
            }
            6 => {
                let value = self.fetch8();
                self.alu_apply(y, value);
            }
            _ => {
                let return_addr = self.r.pc;
                self.push16(return_addr);
                self.r.pc = u16::from(y) * 8;
            }
        }
    }

    // ---- CB prefix ----------------------------------------------------

    fn exec_cb(&mut self) {
        let op = self.fetch_op();
        self.t += u32::from(CB_CYCLES[usize::from(op)]);
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;

        if x == 1 {
            let value = if z == 6 {
                self.bus.read8(self.r.hl())
            } else {
                self.reg8(z, Index::Hl)
            };
            let mut f = self.r.f;
            alu::bit_test(&mut f, y, value);
            self.r.f = f;
            return;
        }

        let value = if z == 6 {
            self.bus.read8(self.r.hl())
        } else {
            self.reg8(z, Index::Hl)
        };
        let result = match x {
            0 => self.rotate_apply(y, value),
            2 => value & !(1 << y),
            _ => value | (1 << y),
        };
        if z == 6 {
            self.bus.write8(self.r.hl(), result);
        } else {
            self.set_reg8(z, Index::Hl, result);
        }
    }

    /// `DD CB d op` / `FD CB d op`: the displacement byte sits between the
    /// prefix pair and the final opcode, one PC byte beyond the unprefixed
    /// encoding. All forms address `(IX/IY+d)`.
    fn exec_indexed_cb(&mut self, idx: Index) {
        let base = match idx {
            Index::Ix => self.r.ix,
            _ => self.r.iy,
        };
        let displacement = self.fetch8() as i8;
        let op = self.fetch8();
        let addr = base.wrapping_add(displacement as u16);
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;

        if x == 1 {
            self.t += 20;
            let value = self.bus.read8(addr);
            let mut f = self.r.f;
            alu::bit_test(&mut f, y, value);
            self.r.f = f;
            return;
        }

        self.t += 23;
        let value = self.bus.read8(addr);
        let result = match x {
            0 => self.rotate_apply(y, value),
            2 => value & !(1 << y),
            _ => value | (1 << y),
        };
        self.bus.write8(addr, result);
        if z != 6 {
            // Undocumented: the result is mirrored into the named register.
            self.set_reg8(z, Index::Hl, result);
        }
    }

    // ---- ED prefix ----------------------------------------------------

    fn exec_ed(&mut self) {
        let op = self.fetch_op();
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;
        let p = y >> 1;
        let q = y & 1;

        if x == 1 {
            match z {
                0 => {
                    self.t += 12;
                    let value = self.io.port_read(self.r.bc());
                    if y != 6 {
                        self.set_reg8(y, Index::Hl, value);
                    }
                    let mut f = self.r.f;
                    alu::io_in_flags(&mut f, value);
                    self.r.f = f;
                }
                1 => {
                    self.t += 12;
                    let value = if y == 6 { 0 } else { self.reg8(y, Index::Hl) };
                    self.io.port_write(self.r.bc(), value);
                }
                2 => {
                    self.t += 15;
                    let mut f = self.r.f;
                    let hl = self.r.hl();
                    let operand = self.rp(p, Index::Hl);
                    let result = if q == 0 {
                        alu::sbc16(&mut f, hl, operand)
                    } else {
                        alu::adc16(&mut f, hl, operand)
                    };
                    self.r.f = f;
                    self.r.set_hl(result);
                }
                3 => {
                    self.t += 20;
                    let addr = self.fetch16();
                    if q == 0 {
                        let value = self.rp(p, Index::Hl);
                        self.bus.write16(addr, value);
                    } else {
                        let value = self.bus.read16(addr);
                        self.set_rp(p, Index::Hl, value);
                    }
                }
                4 => {
                    self.t += 8;
                    let mut f = self.r.f;
                    self.r.a = alu::sub8(&mut f, 0, self.r.a, false);
                    self.r.f = f;
                }
                5 => {
                    // RETN and RETI: both restore IFF1 from IFF2.
                    self.t += 14;
                    self.r.pc = self.pop16();
                    self.r.iff1 = self.r.iff2;
                }
                6 => {
                    self.t += 8;
                    self.r.im = match y & 0x03 {
                        2 => InterruptMode::Im1,
                        3 => InterruptMode::Im2,
                        _ => InterruptMode::Im0,
                    };
                }
                _ => self.exec_ed_z7(y),
            }
            return;
        }

        if x == 2 && z <= 3 && y >= 4 {
            self.exec_block(y, z);
            return;
        }

        // Undefined ED opcode: behaves as two no-op fetches.
        self.t += 8;
    }

    fn exec_ed_z7(&mut self, y: u8) {
        match y {
            0 => {
                self.t += 9;
                self.r.i = self.r.a;
            }
            1 => {
                self.t += 9;
                self.r.r = self.r.a;
            }
            2 => {
                self.t += 9;
                self.r.a = self.r.i;
                self.special_register_flags();
            }
            3 => {
                self.t += 9;
                self.r.a = self.r.r;
                self.special_register_flags();
            }
            4 => {
                // RRD: low nibble of A exchanged through (HL).
                self.t += 18;
                let addr = self.r.hl();
                let memory = self.bus.read8(addr);
                let rotated = (self.r.a << 4) | (memory >> 4);
                self.r.a = (self.r.a & 0xF0) | (memory & 0x0F);
                self.bus.write8(addr, rotated);
                self.digit_rotate_flags();
            }
            5 => {
                // RLD.
                self.t += 18;
                let addr = self.r.hl();
                let memory = self.bus.read8(addr);
                let rotated = (memory << 4) | (self.r.a & 0x0F);
                self.r.a = (self.r.a & 0xF0) | (memory >> 4);
                self.bus.write8(addr, rotated);
                self.digit_rotate_flags();
            }
            _ => self.t += 8,
        }
    }

    /// `LD A,I` / `LD A,R`: P/V reports IFF2 so a debugger can observe the
    /// interrupt-enable state.
    fn special_register_flags(&mut self) {
        let mut f = (self.r.f & FLAG_C) | alu::sz53(self.r.a);
        if self.r.iff2 {
            f |= FLAG_PV;
        }
        self.r.f = f;
    }

    fn digit_rotate_flags(&mut self) {
        let mut f = (self.r.f & FLAG_C) | alu::sz53(self.r.a);
        if alu::parity(self.r.a) {
            f |= FLAG_PV;
        }
        self.r.f = f;
    }

    fn exec_block(&mut self, y: u8, z: u8) {
        self.t += 16;
        let step = if y & 1 == 0 { 1_u16 } else { 0xFFFF };
        let repeat = y >= 6;
        match z {
            0 => {
                let value = self.bus.read8(self.r.hl());
                self.bus.write8(self.r.de(), value);
                self.r.set_hl(self.r.hl().wrapping_add(step));
                self.r.set_de(self.r.de().wrapping_add(step));
                let bc = self.r.bc().wrapping_sub(1);
                self.r.set_bc(bc);
                let copied = value.wrapping_add(self.r.a);
                let mut f = self.r.f & (FLAG_S | FLAG_Z | FLAG_C);
                f |= copied & FLAG_3;
                if copied & 0x02 != 0 {
                    f |= FLAG_5;
                }
                if bc != 0 {
                    f |= FLAG_PV;
                }
                self.r.f = f;
                if repeat && bc != 0 {
                    self.r.pc = self.r.pc.wrapping_sub(2);
                    self.t += 5;
                }
            }
            1 => {
                let value = self.bus.read8(self.r.hl());
                let mut scratch = self.r.f;
                let result = alu::sub8(&mut scratch, self.r.a, value, false);
                self.r.set_hl(self.r.hl().wrapping_add(step));
                let bc = self.r.bc().wrapping_sub(1);
                self.r.set_bc(bc);
                let narrowed = result.wrapping_sub(u8::from(scratch & FLAG_H != 0));
                let mut f = (self.r.f & FLAG_C) | (scratch & (FLAG_S | FLAG_Z | FLAG_H)) | FLAG_N;
                f |= narrowed & FLAG_3;
                if narrowed & 0x02 != 0 {
                    f |= FLAG_5;
                }
                if bc != 0 {
                    f |= FLAG_PV;
                }
                self.r.f = f;
                if repeat && bc != 0 && scratch & FLAG_Z == 0 {
                    self.r.pc = self.r.pc.wrapping_sub(2);
                    self.t += 5;
                }
            }
            2 => {
                let value = self.io.port_read(self.r.bc());
                self.bus.write8(self.r.hl(), value);
                self.r.b = self.r.b.wrapping_sub(1);
                self.r.set_hl(self.r.hl().wrapping_add(step));
                self.block_io_flags();
                if repeat && self.r.b != 0 {
                    self.r.pc = self.r.pc.wrapping_sub(2);
                    self.t += 5;
                }
            }
            _ => {
                let value = self.bus.read8(self.r.hl());
                // B is decremented before it appears on the port address.
                self.r.b = self.r.b.wrapping_sub(1);
                self.io.port_write(self.r.bc(), value);
                self.r.set_hl(self.r.hl().wrapping_add(step));
                self.block_io_flags();
                if repeat && self.r.b != 0 {
                    self.r.pc = self.r.pc.wrapping_sub(2);
                    self.t += 5;
                }
            }
        }
    }

    fn block_io_flags(&mut self) {
        self.r.f = (self.r.f & FLAG_C) | alu::sz53(self.r.b) | FLAG_N;
    }
}

#[cfg(test)]
mod tests {
    use super::{execute_one, HALT_OPCODE};
    use crate::memory::{FlatMemory, MemoryBus};
    use crate::registers::{RegisterFile, FLAG_C, FLAG_Z};

    fn run(program: &[u8], prepare: impl FnOnce(&mut RegisterFile, &mut FlatMemory)) -> (RegisterFile, FlatMemory, u32) {
        let mut regs = RegisterFile::new();
        let mut mem = FlatMemory::new();
        mem.load(0, program);
        prepare(&mut regs, &mut mem);
        let effect = execute_one(&mut regs, &mut mem, &mut ());
        (regs, mem, effect.tstates)
    }

    #[test]
    fn nop_costs_four_and_advances_pc() {
        let (regs, _, t) = run(&[0x00], |_, _| {});
        assert_eq!(t, 4);
        assert_eq!(regs.pc(), 1);
    }

    #[test]
    fn ld_immediate_pair() {
        let (regs, _, t) = run(&[0x01, 0x34, 0x12], |_, _| {});
        assert_eq!(t, 10);
        assert_eq!(regs.bc(), 0x1234);
        assert_eq!(regs.pc(), 3);
    }

    #[test]
    fn halt_does_not_advance_pc() {
        let (regs, _, t) = run(&[HALT_OPCODE], |_, _| {});
        assert_eq!(t, 4);
        assert_eq!(regs.pc(), 0);
    }

    #[test]
    fn jr_not_taken_and_taken_costs_differ() {
        let (regs, _, t) = run(&[0x20, 0x10], |regs, _| {
            regs.set_f(FLAG_Z);
        });
        assert_eq!(t, 7);
        assert_eq!(regs.pc(), 2);

        let (regs, _, t) = run(&[0x20, 0x10], |_, _| {});
        assert_eq!(t, 12);
        assert_eq!(regs.pc(), 0x12);
    }

    #[test]
    fn jr_displacement_is_signed() {
        let (regs, _, _) = run(&[0x18, 0xFE], |_, _| {});
        // JR -2 loops back onto itself.
        assert_eq!(regs.pc(), 0);
    }

    #[test]
    fn call_and_ret_use_little_endian_stack_words() {
        let (regs, mem, t) = run(&[0xCD, 0x00, 0x80], |regs, _| {
            regs.set_sp(0xFFFE);
        });
        assert_eq!(t, 17);
        assert_eq!(regs.pc(), 0x8000);
        assert_eq!(regs.sp(), 0xFFFC);
        assert_eq!(mem.read16(0xFFFC), 0x0003);
    }

    #[test]
    fn indexed_load_store_costs_nineteen() {
        // LD (IX+2),B
        let (_, mem, t) = run(&[0xDD, 0x70, 0x02], |regs, _| {
            regs.set_ix(0x9000);
            regs.set_bc(0xAB00);
        });
        assert_eq!(t, 19);
        assert_eq!(mem.read8(0x9002), 0xAB);

        // LD B,(IY+d) with a negative displacement.
        let (regs, _, t) = run(&[0xFD, 0x46, 0xFE], |regs, mem| {
            regs.set_iy(0x9000);
            mem.write8(0x8FFE, 0x5A);
        });
        assert_eq!(t, 19);
        assert_eq!(regs.bc() >> 8, 0x5A);
    }

    #[test]
    fn indexed_immediate_store_costs_nineteen() {
        // LD (IX-1),n
        let (_, mem, t) = run(&[0xDD, 0x36, 0xFF, 0x77], |regs, _| {
            regs.set_ix(0x4000);
        });
        assert_eq!(t, 19);
        assert_eq!(mem.read8(0x3FFF), 0x77);
    }

    #[test]
    fn indexed_bit_op_consumes_the_displacement_byte() {
        // DD CB 03 C6 = SET 0,(IX+3): four bytes, PC must land past all of them.
        let (regs, mem, t) = run(&[0xDD, 0xCB, 0x03, 0xC6], |regs, _| {
            regs.set_ix(0x5000);
        });
        assert_eq!(regs.pc(), 4);
        assert_eq!(t, 23);
        assert_eq!(mem.read8(0x5003), 0x01);
    }

    #[test]
    fn indexed_bit_test_costs_twenty() {
        let (regs, _, t) = run(&[0xFD, 0xCB, 0x00, 0x46], |regs, mem| {
            regs.set_iy(0x5000);
            mem.write8(0x5000, 0x00);
        });
        assert_eq!(t, 20);
        assert!(regs.flag(FLAG_Z));
        assert_eq!(regs.pc(), 4);
    }

    #[test]
    fn ei_reports_interrupt_enable_for_deferral() {
        let mut regs = RegisterFile::new();
        let mut mem = FlatMemory::new();
        mem.load(0, &[0xFB]);
        let effect = execute_one(&mut regs, &mut mem, &mut ());
        assert!(effect.interrupts_enabled);
        assert!(regs.iff1());
        assert!(regs.iff2());

        mem.load(1, &[0xF3]);
        let effect = execute_one(&mut regs, &mut mem, &mut ());
        assert!(!effect.interrupts_enabled);
        assert!(!regs.iff1());
    }

    #[test]
    fn add_updates_carry_across_boundary() {
        let (regs, _, _) = run(&[0xC6, 0x01], |regs, _| {
            regs.set_a(0xFF);
        });
        assert_eq!(regs.a(), 0x00);
        assert!(regs.flag(FLAG_C));
        assert!(regs.flag(FLAG_Z));
    }

    #[test]
    fn ldir_repeats_until_bc_exhausted() {
        let mut regs = RegisterFile::new();
        let mut mem = FlatMemory::new();
        mem.load(0, &[0xED, 0xB0]);
        mem.load(0x1000, &[0xAA, 0xBB, 0xCC]);
        regs.set_hl(0x1000);
        regs.set_de(0x2000);
        regs.set_bc(3);

        let mut total = 0;
        while regs.bc() != 0 {
            total += execute_one(&mut regs, &mut mem, &mut ()).tstates;
        }
        assert_eq!(total, 21 + 21 + 16);
        assert_eq!(mem.read8(0x2000), 0xAA);
        assert_eq!(mem.read8(0x2002), 0xCC);
        assert_eq!(regs.pc(), 2);
    }

    #[test]
    fn undefined_ed_opcode_is_an_eight_tstate_noop() {
        let (regs, _, t) = run(&[0xED, 0x00], |_, _| {});
        assert_eq!(t, 8);
        assert_eq!(regs.pc(), 2);
    }

    #[test]
    fn every_opcode_byte_decodes_without_panicking() {
        for op in 0_u8..=0xFF {
            let mut regs = RegisterFile::new();
            let mut mem = FlatMemory::new();
            mem.load(0, &[op, 0x00, 0x00, 0x00]);
            regs.set_pc(0);
            regs.set_sp(0x8000);
            let effect = execute_one(&mut regs, &mut mem, &mut ());
            assert!(effect.tstates >= 4, "opcode {op:#04X} reported no cost");
        }
    }

    #[test]
    fn every_prefixed_opcode_byte_decodes_without_panicking() {
        for prefix in [0xCB_u8, 0xED, 0xDD, 0xFD] {
            for op in 0_u8..=0xFF {
                let mut regs = RegisterFile::new();
                let mut mem = FlatMemory::new();
                mem.load(0, &[prefix, op, 0x00, 0x00, 0x00]);
                regs.set_sp(0x8000);
                let effect = execute_one(&mut regs, &mut mem, &mut ());
                assert!(
                    effect.tstates >= 4,
                    "prefixed opcode {prefix:#04X} {op:#04X} reported no cost"
                );
            }
        }
    }

    #[test]
    fn refresh_register_advances_once_per_fetch() {
        let (regs, _, _) = run(&[0x00], |_, _| {});
        assert_eq!(regs.r(), 1);

        let (regs, _, _) = run(&[0xDD, 0x21, 0x00, 0x10], |_, _| {});
        assert_eq!(regs.r(), 2);
    }
}
