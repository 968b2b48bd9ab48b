/*!
Data movement: the MOV family, code-memory reads (MOVC), external-memory
accesses (MOVX) through the bus, exchanges and the stack pair.

Encoding note: `MOV dir,dir` carries the *source* address in the first
operand byte and the destination in the second.
*/

use super::{b1, b2, op};
use crate::mcs51::Mcs51;

pub fn mov_a_r(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.reg(op(icode) & 7);
    cpu.set_acc(val);
}

pub fn mov_a_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_direct(b1(icode));
    cpu.set_acc(val);
}

pub fn mov_a_ari(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_indirect(cpu.reg(op(icode) & 1));
    cpu.set_acc(val);
}

pub fn mov_a_data(cpu: &mut Mcs51, icode: u32) {
    cpu.set_acc(b1(icode));
}

pub fn mov_r_a(cpu: &mut Mcs51, icode: u32) {
    cpu.set_reg(op(icode) & 7, cpu.acc());
}

pub fn mov_r_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_direct(b1(icode));
    cpu.set_reg(op(icode) & 7, val);
}

pub fn mov_r_data(cpu: &mut Mcs51, icode: u32) {
    cpu.set_reg(op(icode) & 7, b1(icode));
}

pub fn mov_dir_a(cpu: &mut Mcs51, icode: u32) {
    cpu.write_direct(b1(icode), cpu.acc());
}

pub fn mov_dir_r(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.reg(op(icode) & 7);
    cpu.write_direct(b1(icode), val);
}

pub fn mov_dir_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_direct(b1(icode));
    cpu.write_direct(b2(icode), val);
}

pub fn mov_dir_ari(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_indirect(cpu.reg(op(icode) & 1));
    cpu.write_direct(b1(icode), val);
}

pub fn mov_dir_data(cpu: &mut Mcs51, icode: u32) {
    cpu.write_direct(b1(icode), b2(icode));
}

pub fn mov_ari_a(cpu: &mut Mcs51, icode: u32) {
    cpu.write_indirect(cpu.reg(op(icode) & 1), cpu.acc());
}

pub fn mov_ari_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_direct(b1(icode));
    cpu.write_indirect(cpu.reg(op(icode) & 1), val);
}

pub fn mov_ari_data(cpu: &mut Mcs51, icode: u32) {
    cpu.write_indirect(cpu.reg(op(icode) & 1), b1(icode));
}

pub fn mov_dptr_data(cpu: &mut Mcs51, icode: u32) {
    cpu.set_dptr((b1(icode) as u16) << 8 | b2(icode) as u16);
}

pub fn movc_dptr(cpu: &mut Mcs51, _icode: u32) {
    let addr = cpu.dptr().wrapping_add(cpu.acc() as u16);
    let val = cpu.read_pgm(addr);
    cpu.set_acc(val);
}

pub fn movc_pc(cpu: &mut Mcs51, _icode: u32) {
    // PC already points past the instruction, as the encoding expects.
    let addr = cpu.pc().wrapping_add(cpu.acc() as u16);
    let val = cpu.read_pgm(addr);
    cpu.set_acc(val);
}

pub fn movx_a_ari(cpu: &mut Mcs51, icode: u32) {
    let addr = cpu.reg(op(icode) & 1) as u32;
    let val = cpu.bus.read(addr);
    cpu.set_acc(val);
}

pub fn movx_a_dptr(cpu: &mut Mcs51, _icode: u32) {
    let addr = cpu.dptr() as u32;
    let val = cpu.bus.read(addr);
    cpu.set_acc(val);
}

pub fn movx_ari_a(cpu: &mut Mcs51, icode: u32) {
    let addr = cpu.reg(op(icode) & 1) as u32;
    cpu.bus.write(addr, cpu.acc());
}

pub fn movx_dptr_a(cpu: &mut Mcs51, _icode: u32) {
    let addr = cpu.dptr() as u32;
    cpu.bus.write(addr, cpu.acc());
}

pub fn xch_r(cpu: &mut Mcs51, icode: u32) {
    let r = op(icode) & 7;
    let tmp = cpu.reg(r);
    cpu.set_reg(r, cpu.acc());
    cpu.set_acc(tmp);
}

pub fn xch_dir(cpu: &mut Mcs51, icode: u32) {
    let addr = b1(icode);
    let tmp = cpu.read_direct(addr);
    cpu.write_direct(addr, cpu.acc());
    cpu.set_acc(tmp);
}

pub fn xch_ari(cpu: &mut Mcs51, icode: u32) {
    let addr = cpu.reg(op(icode) & 1);
    let tmp = cpu.read_indirect(addr);
    cpu.write_indirect(addr, cpu.acc());
    cpu.set_acc(tmp);
}

/// Exchange the low nibbles of A and @Ri.
pub fn xchd_ari(cpu: &mut Mcs51, icode: u32) {
    let addr = cpu.reg(op(icode) & 1);
    let mem = cpu.read_indirect(addr);
    let a = cpu.acc();
    cpu.write_indirect(addr, (mem & 0xf0) | (a & 0x0f));
    cpu.set_acc((a & 0xf0) | (mem & 0x0f));
}

pub fn push_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_direct(b1(icode));
    cpu.push8(val);
}

pub fn pop_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.pop8();
    cpu.write_direct(b1(icode), val);
}
