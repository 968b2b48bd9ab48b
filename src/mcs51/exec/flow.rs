/*!
Control flow: absolute and long jumps/calls, relative branches, the
compare-and-jump and decrement-and-jump families, returns and NOP.

PC was advanced past the instruction before the handler runs, so relative
displacements apply to the following instruction and the 11-bit AJMP/ACALL
page is taken from the updated PC.
*/

use super::{b1, b2, op};
use crate::mcs51::{Mcs51, PSW_CY};

fn rel_jump(cpu: &mut Mcs51, rel: u8) {
    let pc = cpu.pc().wrapping_add(rel as i8 as u16);
    cpu.set_pc(pc);
}

pub fn nop(_cpu: &mut Mcs51, _icode: u32) {}

/// Opcodes no descriptor claims. The 8051 has no undefined-instruction
/// trap; log and carry on.
pub fn und(cpu: &mut Mcs51, icode: u32) {
    log::warn!(
        "undefined instruction {:#04x} near {:#06x}",
        icode >> 16,
        cpu.pc()
    );
}

fn addr11(cpu: &Mcs51, icode: u32) -> u16 {
    let page = ((op(icode) as u16) >> 5) << 8;
    (cpu.pc() & 0xf800) | page | b1(icode) as u16
}

pub fn ajmp(cpu: &mut Mcs51, icode: u32) {
    let target = addr11(cpu, icode);
    cpu.set_pc(target);
}

pub fn acall(cpu: &mut Mcs51, icode: u32) {
    let target = addr11(cpu, icode);
    cpu.push_pc();
    cpu.set_pc(target);
}

pub fn ljmp(cpu: &mut Mcs51, icode: u32) {
    cpu.set_pc((b1(icode) as u16) << 8 | b2(icode) as u16);
}

pub fn lcall(cpu: &mut Mcs51, icode: u32) {
    cpu.push_pc();
    cpu.set_pc((b1(icode) as u16) << 8 | b2(icode) as u16);
}

pub fn sjmp(cpu: &mut Mcs51, icode: u32) {
    rel_jump(cpu, b1(icode));
}

pub fn jmp_a_dptr(cpu: &mut Mcs51, _icode: u32) {
    let target = cpu.dptr().wrapping_add(cpu.acc() as u16);
    cpu.set_pc(target);
}

pub fn jz(cpu: &mut Mcs51, icode: u32) {
    if cpu.acc() == 0 {
        rel_jump(cpu, b1(icode));
    }
}

pub fn jnz(cpu: &mut Mcs51, icode: u32) {
    if cpu.acc() != 0 {
        rel_jump(cpu, b1(icode));
    }
}

pub fn jc(cpu: &mut Mcs51, icode: u32) {
    if cpu.get_flag(PSW_CY) {
        rel_jump(cpu, b1(icode));
    }
}

pub fn jnc(cpu: &mut Mcs51, icode: u32) {
    if !cpu.get_flag(PSW_CY) {
        rel_jump(cpu, b1(icode));
    }
}

pub fn jb(cpu: &mut Mcs51, icode: u32) {
    if cpu.read_bit(b1(icode)) {
        rel_jump(cpu, b2(icode));
    }
}

pub fn jnb(cpu: &mut Mcs51, icode: u32) {
    if !cpu.read_bit(b1(icode)) {
        rel_jump(cpu, b2(icode));
    }
}

/// Jump if bit set, clearing the bit on the way.
pub fn jbc(cpu: &mut Mcs51, icode: u32) {
    if cpu.read_bit(b1(icode)) {
        cpu.write_bit(b1(icode), false);
        rel_jump(cpu, b2(icode));
    }
}

fn cjne(cpu: &mut Mcs51, left: u8, right: u8, rel: u8) {
    cpu.set_flag(PSW_CY, left < right);
    if left != right {
        rel_jump(cpu, rel);
    }
}

pub fn cjne_a_dir(cpu: &mut Mcs51, icode: u32) {
    let right = cpu.read_direct(b1(icode));
    let left = cpu.acc();
    cjne(cpu, left, right, b2(icode));
}

pub fn cjne_a_data(cpu: &mut Mcs51, icode: u32) {
    let left = cpu.acc();
    cjne(cpu, left, b1(icode), b2(icode));
}

pub fn cjne_r_data(cpu: &mut Mcs51, icode: u32) {
    let left = cpu.reg(op(icode) & 7);
    cjne(cpu, left, b1(icode), b2(icode));
}

pub fn cjne_ari_data(cpu: &mut Mcs51, icode: u32) {
    let left = cpu.read_indirect(cpu.reg(op(icode) & 1));
    cjne(cpu, left, b1(icode), b2(icode));
}

pub fn djnz_r(cpu: &mut Mcs51, icode: u32) {
    let r = op(icode) & 7;
    let val = cpu.reg(r).wrapping_sub(1);
    cpu.set_reg(r, val);
    if val != 0 {
        rel_jump(cpu, b1(icode));
    }
}

pub fn djnz_dir(cpu: &mut Mcs51, icode: u32) {
    let addr = b1(icode);
    let val = cpu.read_direct(addr).wrapping_sub(1);
    cpu.write_direct(addr, val);
    if val != 0 {
        rel_jump(cpu, b2(icode));
    }
}

pub fn ret(cpu: &mut Mcs51, _icode: u32) {
    cpu.pop_pc();
}

pub fn reti(cpu: &mut Mcs51, _icode: u32) {
    cpu.pop_ipl();
    cpu.pop_pc();
}
