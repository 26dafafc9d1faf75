//! T-state cost verification for the documented timing corrections.

#![allow(clippy::cast_possible_truncation)]

use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use z80_core::{execute_one, FlatMemory, MemoryBus, RegisterFile};

fn cost_of(program: &[u8]) -> (u32, RegisterFile) {
    let mut regs = RegisterFile::new();
    regs.set_sp(0x8000);
    regs.set_ix(0x4000);
    regs.set_iy(0x4000);
    let mut mem = FlatMemory::new();
    mem.load(0x0000, program);
    let effect = execute_one(&mut regs, &mut mem, &mut ());
    (effect.tstates, regs)
}

#[rstest]
#[case::ld_ixd_b(&[0xDD, 0x70, 0x01], 19)]
#[case::ld_ixd_c(&[0xDD, 0x71, 0x01], 19)]
#[case::ld_ixd_d(&[0xDD, 0x72, 0x01], 19)]
#[case::ld_ixd_e(&[0xDD, 0x73, 0x01], 19)]
#[case::ld_ixd_h(&[0xDD, 0x74, 0x01], 19)]
#[case::ld_ixd_l(&[0xDD, 0x75, 0x01], 19)]
#[case::ld_ixd_a(&[0xDD, 0x77, 0x01], 19)]
#[case::ld_iyd_b(&[0xFD, 0x70, 0x01], 19)]
#[case::ld_iyd_a(&[0xFD, 0x77, 0x01], 19)]
#[case::ld_b_ixd(&[0xDD, 0x46, 0x01], 19)]
#[case::ld_a_iyd(&[0xFD, 0x7E, 0x01], 19)]
#[case::ld_ixd_n(&[0xDD, 0x36, 0x01, 0x55], 19)]
#[case::ld_iyd_n(&[0xFD, 0x36, 0x01, 0x55], 19)]
fn indexed_load_forms_cost_nineteen(#[case] program: &[u8], #[case] expected: u32) {
    let (cost, _) = cost_of(program);
    assert_eq!(cost, expected);
}

#[rstest]
#[case::add_a_ixd(&[0xDD, 0x86, 0x01], 19)]
#[case::inc_ixd(&[0xDD, 0x34, 0x01], 23)]
#[case::dec_iyd(&[0xFD, 0x35, 0x01], 23)]
#[case::add_ix_bc(&[0xDD, 0x09], 15)]
#[case::ld_ix_nn(&[0xDD, 0x21, 0x00, 0x10], 14)]
#[case::inc_ix(&[0xDD, 0x23], 10)]
#[case::push_ix(&[0xDD, 0xE5], 15)]
#[case::pop_iy(&[0xFD, 0xE1], 14)]
#[case::jp_ix(&[0xDD, 0xE9], 8)]
#[case::ex_sp_ix(&[0xDD, 0xE3], 23)]
#[case::ld_sp_iy(&[0xFD, 0xF9], 10)]
fn other_indexed_forms_match_hardware(#[case] program: &[u8], #[case] expected: u32) {
    let (cost, _) = cost_of(program);
    assert_eq!(cost, expected);
}

#[rstest]
#[case::set_on_ixd(&[0xDD, 0xCB, 0x01, 0xC6], 23)]
#[case::res_on_iyd(&[0xFD, 0xCB, 0x01, 0x86], 23)]
#[case::rlc_on_ixd(&[0xDD, 0xCB, 0x01, 0x06], 23)]
#[case::bit_on_ixd(&[0xDD, 0xCB, 0x01, 0x46], 20)]
fn indexed_bit_forms_match_hardware(#[case] program: &[u8], #[case] expected: u32) {
    let (cost, regs) = cost_of(program);
    assert_eq!(cost, expected);
    // All four encodings span prefix, CB, displacement, and opcode.
    assert_eq!(regs.pc(), 4);
}

#[test]
fn indexed_displacement_is_signed_twos_complement() {
    // LD A,(IX-128) reaches the lowest displacement.
    let mut regs = RegisterFile::new();
    regs.set_ix(0x4080);
    let mut mem = FlatMemory::new();
    mem.load(0x0000, &[0xDD, 0x7E, 0x80]);
    mem.write8(0x4000, 0x99);
    let _ = execute_one(&mut regs, &mut mem, &mut ());
    assert_eq!(regs.a(), 0x99);

    // LD A,(IX+127) reaches the highest displacement.
    let mut regs = RegisterFile::new();
    regs.set_ix(0x4000);
    let mut mem = FlatMemory::new();
    mem.load(0x0000, &[0xDD, 0x7E, 0x7F]);
    mem.write8(0x407F, 0x66);
    let _ = execute_one(&mut regs, &mut mem, &mut ());
    assert_eq!(regs.a(), 0x66);
}

#[rstest]
#[case::nop(&[0x00], 4)]
#[case::ld_bc_nn(&[0x01, 0x00, 0x10], 10)]
#[case::djnz_taken(&[0x10, 0x02], 13)] // B wraps to 0xFF: loop taken
#[case::jp(&[0xC3, 0x00, 0x10], 10)]
#[case::call(&[0xCD, 0x00, 0x10], 17)]
#[case::ret(&[0xC9], 10)]
#[case::rst_38(&[0xFF], 11)]
#[case::out_n_a(&[0xD3, 0xFE], 11)]
#[case::in_a_n(&[0xDB, 0xFE], 11)]
#[case::ex_sp_hl(&[0xE3], 19)]
#[case::halt(&[0x76], 4)]
fn unprefixed_spot_checks(#[case] program: &[u8], #[case] expected: u32) {
    let (cost, _) = cost_of(program);
    assert_eq!(cost, expected);
}

#[rstest]
#[case::in_b_c(&[0xED, 0x40], 12)]
#[case::sbc_hl_bc(&[0xED, 0x42], 15)]
#[case::ld_nn_bc(&[0xED, 0x43, 0x00, 0x20], 20)]
#[case::neg(&[0xED, 0x44], 8)]
#[case::reti(&[0xED, 0x4D], 14)]
#[case::im1(&[0xED, 0x56], 8)]
#[case::ld_i_a(&[0xED, 0x47], 9)]
#[case::ld_a_r(&[0xED, 0x5F], 9)]
#[case::rrd(&[0xED, 0x67], 18)]
#[case::ldi(&[0xED, 0xA0], 16)]
#[case::undefined_ed(&[0xED, 0x20], 8)]
fn ed_spot_checks(#[case] program: &[u8], #[case] expected: u32) {
    let (cost, _) = cost_of(program);
    assert_eq!(cost, expected);
}

#[test]
fn conditional_costs_split_on_the_condition() {
    // RET NZ with Z clear: taken, 11 T-states.
    let (cost, _) = cost_of(&[0xC0]);
    assert_eq!(cost, 11);

    // CALL Z,nn with Z clear: not taken, 10 T-states.
    let (cost, regs) = cost_of(&[0xCC, 0x00, 0x10]);
    assert_eq!(cost, 10);
    assert_eq!(regs.pc(), 3);
}
