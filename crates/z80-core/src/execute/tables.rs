//! Single source-of-truth T-state cost tables for the opcode decoder.
//!
//! Values are the minimum (condition-not-met) costs; handlers add the
//! documented extras for taken branches, repeating block forms, and indexed
//! addressing. The four prefix slots (`CB`/`DD`/`ED`/`FD`) are never read
//! from this table; their cost is computed by the prefix handlers.

/// Base T-state cost per unprefixed opcode.
pub(crate) const BASE_CYCLES: [u8; 256] = [
    // 0x00
    4, 10, 7, 6, 4, 4, 7, 4, 4, 11, 7, 6, 4, 4, 7, 4,
    // 0x10
    8, 10, 7, 6, 4, 4, 7, 4, 12, 11, 7, 6, 4, 4, 7, 4,
    // 0x20
    7, 10, 16, 6, 4, 4, 7, 4, 7, 11, 16, 6, 4, 4, 7, 4,
    // 0x30
    7, 10, 13, 6, 11, 11, 10, 4, 7, 11, 13, 6, 4, 4, 7, 4,
    // 0x40
    4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
    // 0x50
    4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
    // 0x60
    4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
    // 0x70
    7, 7, 7, 7, 7, 7, 4, 7, 4, 4, 4, 4, 4, 4, 7, 4,
    // 0x80
    4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
    // 0x90
    4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
    // 0xA0
    4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
    // 0xB0
    4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
    // 0xC0
    5, 10, 10, 10, 10, 11, 7, 11, 5, 10, 10, 4, 10, 17, 7, 11,
    // 0xD0
    5, 10, 10, 11, 10, 11, 7, 11, 5, 4, 10, 11, 10, 4, 7, 11,
    // 0xE0
    5, 10, 10, 19, 10, 11, 7, 11, 5, 4, 10, 4, 10, 4, 7, 11,
    // 0xF0
    5, 10, 10, 4, 10, 11, 7, 11, 5, 6, 10, 4, 10, 4, 7, 11,
];

const fn build_cb_cycles() -> [u8; 256] {
    let mut table = [8_u8; 256];
    let mut op = 0;
    while op < 256 {
        if op & 0x07 == 6 {
            // (HL) operand: BIT reads only, the rest read-modify-write.
            table[op] = if op >> 6 == 1 { 12 } else { 15 };
        }
        op += 1;
    }
    table
}

/// Total T-state cost per `CB`-prefixed opcode (both fetches included).
pub(crate) const CB_CYCLES: [u8; 256] = build_cb_cycles();
