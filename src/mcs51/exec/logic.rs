/*!
Boolean byte operations: ANL/ORL/XRL in the accumulator and direct-
destination forms, accumulator complement/clear, rotates and the nibble
swap. None of these touch CY/AC/OV; accumulator writes refresh parity.
*/

use super::{b1, b2, op};
use crate::mcs51::{Mcs51, PSW_CY};

pub fn anl_r(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() & cpu.reg(op(icode) & 7);
    cpu.set_acc(val);
}

pub fn anl_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() & cpu.read_direct(b1(icode));
    cpu.set_acc(val);
}

pub fn anl_ari(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() & cpu.read_indirect(cpu.reg(op(icode) & 1));
    cpu.set_acc(val);
}

pub fn anl_data(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() & b1(icode);
    cpu.set_acc(val);
}

pub fn anl_dir_a(cpu: &mut Mcs51, icode: u32) {
    let addr = b1(icode);
    let val = cpu.read_direct(addr) & cpu.acc();
    cpu.write_direct(addr, val);
}

pub fn anl_dir_data(cpu: &mut Mcs51, icode: u32) {
    let addr = b1(icode);
    let val = cpu.read_direct(addr) & b2(icode);
    cpu.write_direct(addr, val);
}

pub fn orl_r(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() | cpu.reg(op(icode) & 7);
    cpu.set_acc(val);
}

pub fn orl_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() | cpu.read_direct(b1(icode));
    cpu.set_acc(val);
}

pub fn orl_ari(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() | cpu.read_indirect(cpu.reg(op(icode) & 1));
    cpu.set_acc(val);
}

pub fn orl_data(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() | b1(icode);
    cpu.set_acc(val);
}

pub fn orl_dir_a(cpu: &mut Mcs51, icode: u32) {
    let addr = b1(icode);
    let val = cpu.read_direct(addr) | cpu.acc();
    cpu.write_direct(addr, val);
}

pub fn orl_dir_data(cpu: &mut Mcs51, icode: u32) {
    let addr = b1(icode);
    let val = cpu.read_direct(addr) | b2(icode);
    cpu.write_direct(addr, val);
}

pub fn xrl_r(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() ^ cpu.reg(op(icode) & 7);
    cpu.set_acc(val);
}

pub fn xrl_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() ^ cpu.read_direct(b1(icode));
    cpu.set_acc(val);
}

pub fn xrl_ari(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() ^ cpu.read_indirect(cpu.reg(op(icode) & 1));
    cpu.set_acc(val);
}

pub fn xrl_data(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.acc() ^ b1(icode);
    cpu.set_acc(val);
}

pub fn xrl_dir_a(cpu: &mut Mcs51, icode: u32) {
    let addr = b1(icode);
    let val = cpu.read_direct(addr) ^ cpu.acc();
    cpu.write_direct(addr, val);
}

pub fn xrl_dir_data(cpu: &mut Mcs51, icode: u32) {
    let addr = b1(icode);
    let val = cpu.read_direct(addr) ^ b2(icode);
    cpu.write_direct(addr, val);
}

pub fn clr_a(cpu: &mut Mcs51, _icode: u32) {
    cpu.set_acc(0);
}

pub fn cpl_a(cpu: &mut Mcs51, _icode: u32) {
    let val = !cpu.acc();
    cpu.set_acc(val);
}

pub fn rl_a(cpu: &mut Mcs51, _icode: u32) {
    let val = cpu.acc().rotate_left(1);
    cpu.set_acc(val);
}

pub fn rlc_a(cpu: &mut Mcs51, _icode: u32) {
    let a = cpu.acc();
    let carry_in = cpu.get_flag(PSW_CY) as u8;
    cpu.set_flag(PSW_CY, a & 0x80 != 0);
    cpu.set_acc(a << 1 | carry_in);
}

pub fn rr_a(cpu: &mut Mcs51, _icode: u32) {
    let val = cpu.acc().rotate_right(1);
    cpu.set_acc(val);
}

pub fn rrc_a(cpu: &mut Mcs51, _icode: u32) {
    let a = cpu.acc();
    let carry_in = cpu.get_flag(PSW_CY) as u8;
    cpu.set_flag(PSW_CY, a & 0x01 != 0);
    cpu.set_acc(a >> 1 | carry_in << 7);
}

pub fn swap_a(cpu: &mut Mcs51, _icode: u32) {
    let val = cpu.acc().rotate_left(4);
    cpu.set_acc(val);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(prog: &[u8], steps: usize) -> Mcs51 {
        let mut cpu = Mcs51::new(0x1000, 1).unwrap();
        cpu.load_image(0, prog);
        cpu.run(steps);
        cpu
    }

    #[test]
    fn anl_orl_xrl_immediate() {
        // MOV A,#0xf0; ANL A,#0x3c; ORL A,#0x01; XRL A,#0xff
        let cpu = run(&[0x74, 0xf0, 0x54, 0x3c, 0x44, 0x01, 0x64, 0xff], 4);
        assert_eq!(cpu.acc(), !(0x30 | 0x01));
    }

    #[test]
    fn direct_destination_forms() {
        // MOV 0x40,#0x0f; MOV A,#0xf1; ORL 0x40,A; ANL 0x40,#0x1e
        let mut cpu = run(&[0x75, 0x40, 0x0f, 0x74, 0xf1, 0x42, 0x40, 0x53, 0x40, 0x1e], 4);
        assert_eq!(cpu.read_direct(0x40), 0x1e);
    }

    #[test]
    fn xrl_direct_destination() {
        // MOV 0x41,#0xaa; XRL 0x41,#0xff
        let mut cpu = run(&[0x75, 0x41, 0xaa, 0x63, 0x41, 0xff], 2);
        assert_eq!(cpu.read_direct(0x41), 0x55);
    }

    #[test]
    fn rotates_through_carry() {
        // CLR C; MOV A,#0x81; RLC A
        let cpu = run(&[0xc3, 0x74, 0x81, 0x33], 3);
        assert_eq!(cpu.acc(), 0x02);
        assert!(cpu.get_flag(PSW_CY));
    }

    #[test]
    fn rrc_shifts_carry_into_msb() {
        // SETB C; MOV A,#0x02; RRC A
        let cpu = run(&[0xd3, 0x74, 0x02, 0x13], 3);
        assert_eq!(cpu.acc(), 0x81);
        assert!(!cpu.get_flag(PSW_CY));
    }

    #[test]
    fn plain_rotates_and_swap() {
        // MOV A,#0x81; RL A
        let cpu = run(&[0x74, 0x81, 0x23], 2);
        assert_eq!(cpu.acc(), 0x03);
        let cpu = run(&[0x74, 0x12, 0xc4], 2);
        assert_eq!(cpu.acc(), 0x21);
    }

    #[test]
    fn clr_and_cpl() {
        let cpu = run(&[0x74, 0x55, 0xf4], 2);
        assert_eq!(cpu.acc(), 0xaa);
        let cpu = run(&[0x74, 0x55, 0xe4], 2);
        assert_eq!(cpu.acc(), 0x00);
    }
}
