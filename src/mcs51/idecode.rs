/*!
MCS-51 instruction descriptors and decoder construction.

One row per encoding family, straight off the instruction-set manual:
first-byte mask/icode (multi-byte instructions left-align the first byte
into the most significant unit), length in bytes and machine-cycle count.
Register families use partial masks (0xf8 covers the eight `Rn` encodings,
0xfe the two `@Ri` ones). The whole map dispatches off the first byte, so
the build installs no second-level tables.

0xa5 is the single unassigned opcode; it falls through to `und`.
*/

use super::exec::{arith, bits, flow, logic, moves};
use super::ExecProc;
use crate::decoder::{Decoder, DecoderBuilder, DecoderError, InstrDesc, KeySpec};

type Desc = InstrDesc<ExecProc>;

#[rustfmt::skip]
pub static INSTR_LIST: [Desc; 111] = [
    // Arithmetic
    Desc::new(0xf8,     0x28,     "add",         arith::add_r,      1, 1),
    Desc::new(0xff00,   0x2500,   "adddir",      arith::add_dir,    2, 1),
    Desc::new(0xfe,     0x26,     "addari",      arith::add_ari,    1, 1),
    Desc::new(0xff00,   0x2400,   "addadata",    arith::add_data,   2, 1),
    Desc::new(0xf8,     0x38,     "addc",        arith::addc_r,     1, 1),
    Desc::new(0xff00,   0x3500,   "addcdir",     arith::addc_dir,   2, 1),
    Desc::new(0xfe,     0x36,     "addcari",     arith::addc_ari,   1, 1),
    Desc::new(0xff00,   0x3400,   "addcadata",   arith::addc_data,  2, 1),
    Desc::new(0xf8,     0x98,     "subbar",      arith::subb_r,     1, 1),
    Desc::new(0xff00,   0x9500,   "subbadir",    arith::subb_dir,   2, 1),
    Desc::new(0xfe,     0x96,     "subbaari",    arith::subb_ari,   1, 1),
    Desc::new(0xff00,   0x9400,   "subbadata",   arith::subb_data,  2, 1),
    Desc::new(0xff,     0x04,     "inca",        arith::inc_a,      1, 1),
    Desc::new(0xf8,     0x08,     "incr",        arith::inc_r,      1, 1),
    Desc::new(0xff00,   0x0500,   "incdir",      arith::inc_dir,    2, 1),
    Desc::new(0xfe,     0x06,     "incari",      arith::inc_ari,    1, 1),
    Desc::new(0xff,     0xa3,     "incdptr",     arith::inc_dptr,   1, 2),
    Desc::new(0xff,     0x14,     "deca",        arith::dec_a,      1, 1),
    Desc::new(0xf8,     0x18,     "decr",        arith::dec_r,      1, 1),
    Desc::new(0xff00,   0x1500,   "decdir",      arith::dec_dir,    2, 1),
    Desc::new(0xfe,     0x16,     "decari",      arith::dec_ari,    1, 1),
    Desc::new(0xff,     0xa4,     "mulab",       arith::mul_ab,     1, 4),
    Desc::new(0xff,     0x84,     "divab",       arith::div_ab,     1, 4),
    Desc::new(0xff,     0xd4,     "da",          arith::da_a,       1, 1),
    // Logic
    Desc::new(0xf8,     0x58,     "anlrn",       logic::anl_r,      1, 1),
    Desc::new(0xff00,   0x5500,   "anldir",      logic::anl_dir,    2, 1),
    Desc::new(0xfe,     0x56,     "anlari",      logic::anl_ari,    1, 1),
    Desc::new(0xff00,   0x5400,   "anladata",    logic::anl_data,   2, 1),
    Desc::new(0xff00,   0x5200,   "anldira",     logic::anl_dir_a,  2, 1),
    Desc::new(0xff0000, 0x530000, "anldirdata",  logic::anl_dir_data, 3, 2),
    Desc::new(0xf8,     0x48,     "orlar",       logic::orl_r,      1, 1),
    Desc::new(0xff00,   0x4500,   "orladir",     logic::orl_dir,    2, 1),
    Desc::new(0xfe,     0x46,     "orlaari",     logic::orl_ari,    1, 1),
    Desc::new(0xff00,   0x4400,   "orladata",    logic::orl_data,   2, 1),
    Desc::new(0xff00,   0x4200,   "orldira",     logic::orl_dir_a,  2, 1),
    Desc::new(0xff0000, 0x430000, "orldirdata",  logic::orl_dir_data, 3, 2),
    Desc::new(0xf8,     0x68,     "xrlar",       logic::xrl_r,      1, 1),
    Desc::new(0xff00,   0x6500,   "xrladir",     logic::xrl_dir,    2, 1),
    Desc::new(0xfe,     0x66,     "xrlaari",     logic::xrl_ari,    1, 1),
    Desc::new(0xff00,   0x6400,   "xrladata",    logic::xrl_data,   2, 1),
    Desc::new(0xff00,   0x6200,   "xrldira",     logic::xrl_dir_a,  2, 1),
    Desc::new(0xff0000, 0x630000, "xrldirdata",  logic::xrl_dir_data, 3, 2),
    Desc::new(0xff,     0xe4,     "clra",        logic::clr_a,      1, 1),
    Desc::new(0xff,     0xf4,     "cpla",        logic::cpl_a,      1, 1),
    Desc::new(0xff,     0x23,     "rla",         logic::rl_a,       1, 1),
    Desc::new(0xff,     0x33,     "rlca",        logic::rlc_a,      1, 1),
    Desc::new(0xff,     0x03,     "rra",         logic::rr_a,       1, 1),
    Desc::new(0xff,     0x13,     "rrca",        logic::rrc_a,      1, 1),
    Desc::new(0xff,     0xc4,     "swapa",       logic::swap_a,     1, 1),
    // Data movement
    Desc::new(0xf8,     0xe8,     "movarn",      moves::mov_a_r,    1, 1),
    Desc::new(0xff00,   0xe500,   "movadir",     moves::mov_a_dir,  2, 1),
    Desc::new(0xfe,     0xe6,     "movaari",     moves::mov_a_ari,  1, 1),
    Desc::new(0xff00,   0x7400,   "movadata",    moves::mov_a_data, 2, 1),
    Desc::new(0xf8,     0xf8,     "movra",       moves::mov_r_a,    1, 1),
    Desc::new(0xf800,   0xa800,   "movrdir",     moves::mov_r_dir,  2, 2),
    Desc::new(0xf800,   0x7800,   "movrdata",    moves::mov_r_data, 2, 1),
    Desc::new(0xff00,   0xf500,   "movdira",     moves::mov_dir_a,  2, 1),
    Desc::new(0xf800,   0x8800,   "movdirr",     moves::mov_dir_r,  2, 2),
    Desc::new(0xff0000, 0x850000, "movdirdir",   moves::mov_dir_dir, 3, 2),
    Desc::new(0xfe00,   0x8600,   "movdirari",   moves::mov_dir_ari, 2, 2),
    Desc::new(0xff0000, 0x750000, "movdirdata",  moves::mov_dir_data, 3, 2),
    Desc::new(0xfe,     0xf6,     "movaria",     moves::mov_ari_a,  1, 1),
    Desc::new(0xfe00,   0xa600,   "movaridir",   moves::mov_ari_dir, 2, 2),
    Desc::new(0xfe00,   0x7600,   "movaridata",  moves::mov_ari_data, 2, 1),
    Desc::new(0xff0000, 0x900000, "movdptrdata", moves::mov_dptr_data, 3, 2),
    Desc::new(0xff,     0x93,     "movcaadptr",  moves::movc_dptr,  1, 2),
    Desc::new(0xff,     0x83,     "movaapc",     moves::movc_pc,    1, 2),
    Desc::new(0xfe,     0xe2,     "movxaari",    moves::movx_a_ari, 1, 2),
    Desc::new(0xff,     0xe0,     "movxaadptr",  moves::movx_a_dptr, 1, 2),
    Desc::new(0xfe,     0xf2,     "movxara",     moves::movx_ari_a, 1, 2),
    Desc::new(0xff,     0xf0,     "movxadptra",  moves::movx_dptr_a, 1, 2),
    Desc::new(0xf8,     0xc8,     "xchar",       moves::xch_r,      1, 1),
    Desc::new(0xff00,   0xc500,   "xchadir",     moves::xch_dir,    2, 1),
    Desc::new(0xfe,     0xc6,     "xchaari",     moves::xch_ari,    1, 1),
    Desc::new(0xfe,     0xd6,     "xchdaari",    moves::xchd_ari,   1, 1),
    Desc::new(0xff00,   0xc000,   "pushdir",     moves::push_dir,   2, 2),
    Desc::new(0xff00,   0xd000,   "popdir",      moves::pop_dir,    2, 2),
    // Bit operations
    Desc::new(0xff,     0xc3,     "clrc",        bits::clr_c,       1, 1),
    Desc::new(0xff00,   0xc200,   "clrbit",      bits::clr_bit,     2, 1),
    Desc::new(0xff,     0xd3,     "setbc",       bits::setb_c,      1, 1),
    Desc::new(0xff00,   0xd200,   "setbbit",     bits::setb_bit,    2, 1),
    Desc::new(0xff,     0xb3,     "cplc",        bits::cpl_c,       1, 1),
    Desc::new(0xff00,   0xb200,   "cplbit",      bits::cpl_bit,     2, 1),
    Desc::new(0xff00,   0x8200,   "anlcbit",     bits::anl_c_bit,   2, 2),
    Desc::new(0xff00,   0xb000,   "anlcnbit",    bits::anl_c_nbit,  2, 2),
    Desc::new(0xff00,   0x7200,   "orlcbit",     bits::orl_c_bit,   2, 2),
    Desc::new(0xff00,   0xa000,   "orlcnbit",    bits::orl_c_nbit,  2, 2),
    Desc::new(0xff00,   0xa200,   "movcbit",     bits::mov_c_bit,   2, 1),
    Desc::new(0xff00,   0x9200,   "movbitc",     bits::mov_bit_c,   2, 2),
    // Control flow
    Desc::new(0xff,     0x00,     "nop",         flow::nop,         1, 1),
    Desc::new(0x1f00,   0x0100,   "ajmp",        flow::ajmp,        2, 2),
    Desc::new(0x1f00,   0x1100,   "acall",       flow::acall,       2, 2),
    Desc::new(0xff0000, 0x020000, "ljmp",        flow::ljmp,        3, 2),
    Desc::new(0xff0000, 0x120000, "lcall",       flow::lcall,       3, 2),
    Desc::new(0xff00,   0x8000,   "sjmprel",     flow::sjmp,        2, 2),
    Desc::new(0xff,     0x73,     "jmpaadptr",   flow::jmp_a_dptr,  1, 2),
    Desc::new(0xff00,   0x6000,   "jzrel",       flow::jz,          2, 2),
    Desc::new(0xff00,   0x7000,   "jnzrel",      flow::jnz,         2, 2),
    Desc::new(0xff00,   0x4000,   "jcrel",       flow::jc,          2, 2),
    Desc::new(0xff00,   0x5000,   "jncrel",      flow::jnc,         2, 2),
    Desc::new(0xff0000, 0x200000, "jbbitrel",    flow::jb,          3, 2),
    Desc::new(0xff0000, 0x300000, "jnbbitrel",   flow::jnb,         3, 2),
    Desc::new(0xff0000, 0x100000, "jbcbitrel",   flow::jbc,         3, 2),
    Desc::new(0xff0000, 0xb50000, "cjneadirrel", flow::cjne_a_dir,  3, 2),
    Desc::new(0xff0000, 0xb40000, "cjneadatarel", flow::cjne_a_data, 3, 2),
    Desc::new(0xf80000, 0xb80000, "cjnerdatarel", flow::cjne_r_data, 3, 2),
    Desc::new(0xfe0000, 0xb60000, "cjneardatarel", flow::cjne_ari_data, 3, 2),
    Desc::new(0xf800,   0xd800,   "djnzrrel",    flow::djnz_r,      2, 2),
    Desc::new(0xff0000, 0xd50000, "djnzdirrel",  flow::djnz_dir,    3, 2),
    Desc::new(0xff,     0x22,     "ret",         flow::ret,         1, 2),
    Desc::new(0xff,     0x32,     "reti",        flow::reti,        1, 2),
];

/// Fallback for the unassigned opcode space.
pub static INSTR_UND: Desc = Desc {
    mask: 0,
    icode: 0,
    name: "und",
    handler: flow::und,
    len: 1,
    cycles: 1,
    exists: None,
};

/// Build the dispatch table: full first byte as the key over the 3-byte
/// left-aligned opcode space.
pub fn new_decoder(cycle_multiplier: u32) -> Result<Decoder<ExecProc>, DecoderError> {
    DecoderBuilder::new(KeySpec::top_bits(8, 3, 8), &INSTR_LIST, INSTR_UND)
        .cycle_multiplier(cycle_multiplier)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_builds_without_conflicts() {
        let dec = new_decoder(1).expect("instruction list is conflict-free");
        // Everything dispatches off the first byte.
        assert_eq!(dec.nr_sub_tables(), 0);
    }

    #[test]
    fn every_first_byte_resolves() {
        let dec = new_decoder(1).unwrap();
        for byte in 0u32..=0xff {
            let instr = dec.lookup(byte << 16);
            assert!(!instr.name.is_empty());
        }
        assert_eq!(dec.lookup(0xa5 << 16).name, "und");
        assert_eq!(dec.lookup(0x00 << 16).name, "nop");
    }

    #[test]
    fn register_families_cover_their_range() {
        let dec = new_decoder(1).unwrap();
        for r in 0u32..8 {
            assert_eq!(dec.lookup((0x28 + r) << 16).name, "add");
            assert_eq!(dec.lookup((0xd8 + r) << 16).name, "djnzrrel");
        }
        for i in 0u32..2 {
            assert_eq!(dec.lookup((0xe2 + i) << 16).name, "movxaari");
        }
        // ajmp/acall repeat every 0x20 opcodes.
        for page in 0u32..8 {
            assert_eq!(dec.lookup((page << 5 | 0x01) << 16).name, "ajmp");
            assert_eq!(dec.lookup((page << 5 | 0x11) << 16).name, "acall");
        }
    }

    #[test]
    fn table_agrees_with_linear_scan_on_first_level() {
        let dec = new_decoder(1).unwrap();
        for byte in 0u32..=0xff {
            let opcode = byte << 16;
            assert_eq!(
                *dec.lookup(opcode),
                dec.lookup_linear(opcode),
                "opcode byte {byte:#04x}"
            );
        }
    }
}
