//! Property-based round-trip verification of the state serializer.

use proptest::prelude::*;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use z80_core::{deserialize, serialize, serialized_size, Cpu, InterruptMode};

fn build_cpu(
    pairs: [u16; 12],
    i: u8,
    r: u8,
    im: InterruptMode,
    iff1: bool,
    iff2: bool,
) -> Cpu {
    let mut cpu = Cpu::default();
    let regs = cpu.regs_mut();
    regs.set_pc(pairs[0]);
    regs.set_sp(pairs[1]);
    regs.set_af(pairs[2]);
    regs.set_bc(pairs[3]);
    regs.set_de(pairs[4]);
    regs.set_hl(pairs[5]);
    regs.set_ix(pairs[6]);
    regs.set_iy(pairs[7]);
    regs.set_af_shadow(pairs[8]);
    regs.set_bc_shadow(pairs[9]);
    regs.set_de_shadow(pairs[10]);
    regs.set_hl_shadow(pairs[11]);
    regs.set_i(i);
    regs.set_r(r);
    regs.set_im(im);
    regs.set_iff1(iff1);
    regs.set_iff2(iff2);
    cpu
}

fn interrupt_mode() -> impl Strategy<Value = InterruptMode> {
    prop_oneof![
        Just(InterruptMode::Im0),
        Just(InterruptMode::Im1),
        Just(InterruptMode::Im2),
    ]
}

proptest! {
    #[test]
    fn roundtrip_is_bit_exact_for_any_register_state(
        pairs in any::<[u16; 12]>(),
        i in any::<u8>(),
        r in any::<u8>(),
        im in interrupt_mode(),
        iff1 in any::<bool>(),
        iff2 in any::<bool>(),
    ) {
        let cpu = build_cpu(pairs, i, r, im, iff1, iff2);
        let image = serialize(&cpu);
        prop_assert_eq!(image.len(), serialized_size());

        let mut restored = Cpu::default();
        deserialize(&mut restored, &image).expect("serializer output is always valid");
        prop_assert_eq!(restored.regs(), cpu.regs());
        prop_assert_eq!(serialize(&restored), image);
    }

    #[test]
    fn serialization_is_deterministic(
        pairs in any::<[u16; 12]>(),
        i in any::<u8>(),
        r in any::<u8>(),
        im in interrupt_mode(),
    ) {
        let cpu = build_cpu(pairs, i, r, im, true, false);
        prop_assert_eq!(serialize(&cpu), serialize(&cpu));
    }
}

#[test]
fn fresh_core_roundtrips_through_a_sized_buffer() {
    let cpu = Cpu::default();
    let mut buffer = Vec::with_capacity(serialized_size());
    z80_core::serialize_into(&cpu, &mut buffer);
    assert_eq!(buffer.len(), serialized_size());

    let mut restored = Cpu::default();
    deserialize(&mut restored, &buffer).expect("valid layout");
    assert_eq!(restored.regs(), cpu.regs());
}
