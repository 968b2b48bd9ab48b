/*!
Arithmetic: ADD/ADDC/SUBB in all four addressing forms, INC/DEC, the
DPTR increment, MUL, DIV and decimal adjust.

Flag behavior follows the instruction-set manual: CY/AC/OV on the
three-operand adds and subtracts, CY cleared by MUL/DIV, OV flagging a
MUL overflow or a DIV by zero.
*/

use super::{b1, op};
use crate::mcs51::{Mcs51, PSW_AC, PSW_CY, PSW_OV};

fn add(cpu: &mut Mcs51, val: u8, carry_in: bool) {
    let a = cpu.acc();
    let c = carry_in as u16;
    let sum = a as u16 + val as u16 + c;
    let half = (a & 0x0f) as u16 + (val & 0x0f) as u16 + c;
    let low7 = (a & 0x7f) as u16 + (val & 0x7f) as u16 + c;
    cpu.set_flag(PSW_CY, sum > 0xff);
    cpu.set_flag(PSW_AC, half > 0x0f);
    // Overflow: carry into bit 7 differs from carry out of bit 7.
    cpu.set_flag(PSW_OV, ((low7 >> 7) ^ (sum >> 8)) & 1 != 0);
    cpu.set_acc(sum as u8);
}

fn subb(cpu: &mut Mcs51, val: u8) {
    let a = cpu.acc();
    let c = cpu.get_flag(PSW_CY) as i16;
    let diff = a as i16 - val as i16 - c;
    let half = (a & 0x0f) as i16 - (val & 0x0f) as i16 - c;
    let low7 = (a & 0x7f) as i16 - (val & 0x7f) as i16 - c;
    cpu.set_flag(PSW_CY, diff < 0);
    cpu.set_flag(PSW_AC, half < 0);
    cpu.set_flag(PSW_OV, (low7 < 0) != (diff < 0));
    cpu.set_acc(diff as u8);
}

pub fn add_r(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.reg(op(icode) & 7);
    add(cpu, val, false);
}

pub fn add_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_direct(b1(icode));
    add(cpu, val, false);
}

pub fn add_ari(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_indirect(cpu.reg(op(icode) & 1));
    add(cpu, val, false);
}

pub fn add_data(cpu: &mut Mcs51, icode: u32) {
    add(cpu, b1(icode), false);
}

pub fn addc_r(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.reg(op(icode) & 7);
    let c = cpu.get_flag(PSW_CY);
    add(cpu, val, c);
}

pub fn addc_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_direct(b1(icode));
    let c = cpu.get_flag(PSW_CY);
    add(cpu, val, c);
}

pub fn addc_ari(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_indirect(cpu.reg(op(icode) & 1));
    let c = cpu.get_flag(PSW_CY);
    add(cpu, val, c);
}

pub fn addc_data(cpu: &mut Mcs51, icode: u32) {
    let c = cpu.get_flag(PSW_CY);
    add(cpu, b1(icode), c);
}

pub fn subb_r(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.reg(op(icode) & 7);
    subb(cpu, val);
}

pub fn subb_dir(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_direct(b1(icode));
    subb(cpu, val);
}

pub fn subb_ari(cpu: &mut Mcs51, icode: u32) {
    let val = cpu.read_indirect(cpu.reg(op(icode) & 1));
    subb(cpu, val);
}

pub fn subb_data(cpu: &mut Mcs51, icode: u32) {
    subb(cpu, b1(icode));
}

pub fn inc_a(cpu: &mut Mcs51, _icode: u32) {
    let val = cpu.acc().wrapping_add(1);
    cpu.set_acc(val);
}

pub fn inc_r(cpu: &mut Mcs51, icode: u32) {
    let r = op(icode) & 7;
    cpu.set_reg(r, cpu.reg(r).wrapping_add(1));
}

pub fn inc_dir(cpu: &mut Mcs51, icode: u32) {
    let addr = b1(icode);
    let val = cpu.read_direct(addr).wrapping_add(1);
    cpu.write_direct(addr, val);
}

pub fn inc_ari(cpu: &mut Mcs51, icode: u32) {
    let addr = cpu.reg(op(icode) & 1);
    let val = cpu.read_indirect(addr).wrapping_add(1);
    cpu.write_indirect(addr, val);
}

pub fn inc_dptr(cpu: &mut Mcs51, _icode: u32) {
    let val = cpu.dptr().wrapping_add(1);
    cpu.set_dptr(val);
}

pub fn dec_a(cpu: &mut Mcs51, _icode: u32) {
    let val = cpu.acc().wrapping_sub(1);
    cpu.set_acc(val);
}

pub fn dec_r(cpu: &mut Mcs51, icode: u32) {
    let r = op(icode) & 7;
    cpu.set_reg(r, cpu.reg(r).wrapping_sub(1));
}

pub fn dec_dir(cpu: &mut Mcs51, icode: u32) {
    let addr = b1(icode);
    let val = cpu.read_direct(addr).wrapping_sub(1);
    cpu.write_direct(addr, val);
}

pub fn dec_ari(cpu: &mut Mcs51, icode: u32) {
    let addr = cpu.reg(op(icode) & 1);
    let val = cpu.read_indirect(addr).wrapping_sub(1);
    cpu.write_indirect(addr, val);
}

pub fn mul_ab(cpu: &mut Mcs51, _icode: u32) {
    let product = cpu.acc() as u16 * cpu.b() as u16;
    cpu.set_acc(product as u8);
    cpu.set_b((product >> 8) as u8);
    cpu.set_flag(PSW_CY, false);
    cpu.set_flag(PSW_OV, product > 0xff);
}

pub fn div_ab(cpu: &mut Mcs51, _icode: u32) {
    let b = cpu.b();
    cpu.set_flag(PSW_CY, false);
    if b == 0 {
        // Quotient and remainder are undefined; only OV is specified.
        cpu.set_flag(PSW_OV, true);
        return;
    }
    let a = cpu.acc();
    cpu.set_acc(a / b);
    cpu.set_b(a % b);
    cpu.set_flag(PSW_OV, false);
}

pub fn da_a(cpu: &mut Mcs51, _icode: u32) {
    let mut a = cpu.acc() as u16;
    if a & 0x0f > 9 || cpu.get_flag(PSW_AC) {
        a += 0x06;
    }
    if a & 0x1f0 > 0x90 || cpu.get_flag(PSW_CY) {
        a += 0x60;
    }
    if a > 0xff {
        cpu.set_flag(PSW_CY, true);
    }
    cpu.set_acc(a as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcs51::PSW_P;

    fn run(prog: &[u8], steps: usize) -> Mcs51 {
        let mut cpu = Mcs51::new(0x1000, 1).unwrap();
        cpu.load_image(0, prog);
        cpu.run(steps);
        cpu
    }

    #[test]
    fn add_sets_carry_and_overflow() {
        // MOV A,#0x7f; ADD A,#0x01
        let cpu = run(&[0x74, 0x7f, 0x24, 0x01], 2);
        assert_eq!(cpu.acc(), 0x80);
        assert!(!cpu.get_flag(PSW_CY));
        assert!(cpu.get_flag(PSW_OV));
        assert!(cpu.get_flag(PSW_AC));
    }

    #[test]
    fn add_carry_wraps() {
        // MOV A,#0xff; ADD A,#0x02
        let cpu = run(&[0x74, 0xff, 0x24, 0x02], 2);
        assert_eq!(cpu.acc(), 0x01);
        assert!(cpu.get_flag(PSW_CY));
        assert!(!cpu.get_flag(PSW_OV));
    }

    #[test]
    fn addc_uses_carry_in() {
        // SETB C; MOV A,#0x10; ADDC A,#0x01
        let cpu = run(&[0xd3, 0x74, 0x10, 0x34, 0x01], 3);
        assert_eq!(cpu.acc(), 0x12);
    }

    #[test]
    fn subb_borrows() {
        // CLR C; MOV A,#0x03; SUBB A,#0x05
        let cpu = run(&[0xc3, 0x74, 0x03, 0x94, 0x05], 3);
        assert_eq!(cpu.acc(), 0xfe);
        assert!(cpu.get_flag(PSW_CY));
    }

    #[test]
    fn add_register_form() {
        // MOV R2,#0x20; MOV A,#0x05; ADD A,R2
        let cpu = run(&[0x7a, 0x20, 0x74, 0x05, 0x2a], 3);
        assert_eq!(cpu.acc(), 0x25);
    }

    #[test]
    fn add_indirect_form() {
        // MOV R0,#0x40; MOV @R0,#0x11; MOV A,#0x2; ADD A,@R0
        let cpu = run(&[0x78, 0x40, 0x76, 0x11, 0x74, 0x02, 0x26], 4);
        assert_eq!(cpu.acc(), 0x13);
    }

    #[test]
    fn inc_dec_roundtrip() {
        // INC A; INC A; DEC A
        let cpu = run(&[0x04, 0x04, 0x14], 3);
        assert_eq!(cpu.acc(), 1);
        assert!(!cpu.get_flag(PSW_P));
    }

    #[test]
    fn inc_dptr_carries_into_high_byte() {
        // MOV DPTR,#0x12ff; INC DPTR
        let cpu = run(&[0x90, 0x12, 0xff, 0xa3], 2);
        assert_eq!(cpu.dptr(), 0x1300);
    }

    #[test]
    fn mul_and_div() {
        // MOV A,#200; MOV B,#3; MUL AB
        let mut cpu = run(&[0x74, 200, 0x75, 0xf0, 3, 0xa4], 3);
        assert_eq!(cpu.acc(), (600u16 & 0xff) as u8);
        assert_eq!(cpu.b(), 2);
        assert!(cpu.get_flag(PSW_OV));
        assert!(!cpu.get_flag(PSW_CY));
        // DIV: 17 / 5
        cpu.set_acc(17);
        cpu.set_b(5);
        div_ab(&mut cpu, 0);
        assert_eq!(cpu.acc(), 3);
        assert_eq!(cpu.b(), 2);
        assert!(!cpu.get_flag(PSW_OV));
    }

    #[test]
    fn div_by_zero_sets_ov() {
        let mut cpu = Mcs51::new(0x100, 1).unwrap();
        cpu.set_acc(10);
        cpu.set_b(0);
        div_ab(&mut cpu, 0);
        assert!(cpu.get_flag(PSW_OV));
        assert!(!cpu.get_flag(PSW_CY));
    }

    #[test]
    fn decimal_adjust_after_bcd_add() {
        // MOV A,#0x19; ADD A,#0x27; DA A  => BCD 19 + 27 = 46
        let cpu = run(&[0x74, 0x19, 0x24, 0x27, 0xd4], 3);
        assert_eq!(cpu.acc(), 0x46);
    }
}
