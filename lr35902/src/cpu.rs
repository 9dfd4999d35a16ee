//! The Gameboy and all its variants have the same CPU at their heart: an 8-bit Z80-like processor produced by Sharp and
//! codenamed LR35902. This processor has 8 8-bit registers (1 is reserved for ALU flags) and a 16-bit memory bus.
//! The CPU is mostly 8-bit, but does sport a handful of 16-bit instructions. For example, pairs of the 8-bit registers
//! can be viewed and manipulated.
//! This module contains everything needed to decode and execute instructions for this CPU.
//!
//! Every memory access the CPU makes takes 4 clock ticks, as does each internal delay some instructions have. The
//! interpreter counts those as it goes, so the cost of an instruction falls out of what it actually does rather than
//! coming from a lookup table.

use crate::bus::Bus;
use crate::error::Fault;
use crate::hardware::{Flags, HardwareState, Register, Register16};
use crate::interrupt::InterruptController;
use crate::timer::Timer;
use crate::util::{join16, split16};
use log::{debug, warn};

use Register::*;
use Register16::*;

/// The 4 conditions available to branching instructions (CALL/JP/JR/RET).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagCondition {
    NZ, // CPU flag Z is clear
    Z,  // CPU flag Z is set
    NC, // CPU flag C is clear
    C,  // CPU flag C is set
}

/// An enum of the available instructions for the Gameboy CPU. Many instructions do the same thing but just on different
/// operands. i.e LD A, B and LD A, C are similar - the former copies the B register into A, and the latter copies C.
/// We don't specialize these two different instructions, instead we have a single "LD" enum variant that accepts the
/// appropriate operand.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    ADC(Operand),
    ADD(Operand),
    ADD16(Register16),
    ADD_SP_r8(i8),
    AND(Operand),
    BIT(u8, Operand),
    CALL(Option<FlagCondition>, u16),
    CCF,
    CP(Operand),
    CPL,
    DAA,
    DEC(Operand),
    DEC16(Register16),
    DI,
    EI,
    HALT,
    INC(Operand),
    INC16(Register16),
    JP(Option<FlagCondition>, Operand16),
    JR(Option<FlagCondition>, u8),
    LD(Operand, Operand),
    LD16(Operand16, Operand16),
    LD_HL_SP(i8),
    NOP,
    OR(Operand),
    POP(Register16),
    PUSH(Register16),
    RES(u8, Operand),
    RET(Option<FlagCondition>),
    RETI,
    RL(Operand),
    RLA,
    RLC(Operand),
    RLCA,
    RR(Operand),
    RRA,
    RRC(Operand),
    RRCA,
    RST(u8),
    SBC(Operand),
    SCF,
    SET(u8, Operand),
    SLA(Operand),
    SRA(Operand),
    SRL(Operand),
    STOP,
    SUB(Operand),
    SWAP(Operand),
    XOR(Operand),
    Invalid(u8),
}
use Instruction::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(Register),       // Get/set an 8-bit register.
    Immediate(u8),            // An immediate 8-bit value embedded alongside the opcode.
    Address(Register16),      // Value at memory address specified by 16-bit register.
    AddressInc(Register16),   // Memory address pointed to by a 16-bit register. Increment register after use.
    AddressDec(Register16),   // Memory address pointed to by a 16-bit register. Decrement register after use.
    ImmediateAddress(u16),    // Immediate 16-bit value interpreted as memory address.
    ImmediateAddressHigh(u8), // Immediate 8-bit value interpreted as memory address offset from $FF00.
    AddressHigh(Register),    // 8-bit register value interpreted as memory address offset from $FF00.
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand16 {
    Register(Register16),  // Get/set a 16-bit register.
    Immediate(u16),        // An immediate 16-bit value embedded alongside the opcode.
    ImmediateAddress(u16), // Immediate 16-bit value interpreted as memory address.
}

enum BitwiseOp {
    XOR,
    OR,
    AND,
}

/// Execution context for a single instruction. Borrows the machine state and the bus for the duration of the step and
/// tallies up the clock ticks spent.
struct Cpu<'a> {
    hw: &'a mut HardwareState,
    bus: &'a mut Bus,
    cycles: u32,
}

/// Runs the CPU for a single fetch-decode-execute step and returns how many clock ticks it took. A halted CPU just
/// idles for 4 ticks.
pub fn step(hw: &mut HardwareState, bus: &mut Bus) -> u32 {
    let mut cpu = Cpu { hw, bus, cycles: 0 };
    cpu.step();
    cpu.cycles
}

impl<'a> Cpu<'a> {
    fn clock(&mut self) {
        self.cycles += 4;
    }

    fn memory_read(&mut self, addr: u16) -> u8 {
        self.clock();
        self.bus.read(self.hw, addr)
    }

    fn memory_write(&mut self, addr: u16, v: u8) {
        self.clock();
        self.bus.write(self.hw, addr, v);
    }

    fn memory_read16(&mut self, addr: u16) -> u16 {
        let lo = self.memory_read(addr);
        let hi = self.memory_read(addr.wrapping_add(1));
        join16(hi, lo)
    }

    /// Little-endian store, low byte first. Only LD (a16),SP does this; pushes go high byte first.
    fn memory_write16(&mut self, addr: u16, v: u16) {
        let (hi, lo) = split16(v);
        self.memory_write(addr, lo);
        self.memory_write(addr.wrapping_add(1), hi);
    }

    /// Reads the byte at PC and bumps it.
    fn fetch(&mut self) -> u8 {
        let pc = self.hw.cpu.pc;
        self.hw.cpu.pc = pc.wrapping_add(1);
        self.memory_read(pc)
    }

    /// Resolves this Operand into a concrete 8-bit value.
    fn operand_get(&mut self, o: Operand) -> u8 {
        match o {
            Operand::Register(r) => self.hw.cpu.register_get(r),
            Operand::Immediate(d) => d,
            Operand::Address(rr) => {
                let addr = self.hw.cpu.register16_get(rr);
                self.memory_read(addr)
            }
            Operand::AddressInc(rr) => {
                let addr = self.hw.cpu.register16_get(rr);
                self.hw.cpu.register16_set(rr, addr.wrapping_add(1));
                self.memory_read(addr)
            }
            Operand::AddressDec(rr) => {
                let addr = self.hw.cpu.register16_get(rr);
                self.hw.cpu.register16_set(rr, addr.wrapping_sub(1));
                self.memory_read(addr)
            }
            Operand::ImmediateAddress(addr) => self.memory_read(addr),
            Operand::ImmediateAddressHigh(addr) => self.memory_read(0xFF00 | u16::from(addr)),
            Operand::AddressHigh(r) => {
                let addr = 0xFF00 | u16::from(self.hw.cpu.register_get(r));
                self.memory_read(addr)
            }
        }
    }

    /// Saves provided 8-bit value into Operand destination.
    fn operand_set(&mut self, o: Operand, v: u8) {
        match o {
            Operand::Register(r) => self.hw.cpu.register_set(r, v),
            Operand::Immediate(_) => unreachable!("decoder never produces an immediate destination"),
            Operand::Address(rr) => {
                let addr = self.hw.cpu.register16_get(rr);
                self.memory_write(addr, v)
            }
            Operand::AddressInc(rr) => {
                let addr = self.hw.cpu.register16_get(rr);
                self.hw.cpu.register16_set(rr, addr.wrapping_add(1));
                self.memory_write(addr, v)
            }
            Operand::AddressDec(rr) => {
                let addr = self.hw.cpu.register16_get(rr);
                self.hw.cpu.register16_set(rr, addr.wrapping_sub(1));
                self.memory_write(addr, v)
            }
            Operand::ImmediateAddress(addr) => self.memory_write(addr, v),
            Operand::ImmediateAddressHigh(addr) => self.memory_write(0xFF00 | u16::from(addr), v),
            Operand::AddressHigh(r) => {
                let addr = 0xFF00 | u16::from(self.hw.cpu.register_get(r));
                self.memory_write(addr, v)
            }
        }
    }

    /// Resolves the value for a given 16-bit instruction operand.
    fn operand_get16(&mut self, o: Operand16) -> u16 {
        match o {
            Operand16::Register(r) => self.hw.cpu.register16_get(r),
            Operand16::Immediate(d) => d,
            Operand16::ImmediateAddress(addr) => self.memory_read16(addr),
        }
    }

    /// Writes a new value to the target of a 16-bit instruction operand.
    fn operand_set16(&mut self, o: Operand16, v: u16) {
        match o {
            Operand16::Register(r) => self.hw.cpu.register16_set(r, v),
            Operand16::Immediate(_) => unreachable!("decoder never produces an immediate destination"),
            Operand16::ImmediateAddress(addr) => self.memory_write16(addr, v),
        }
    }

    fn step(&mut self) {
        if self.hw.cpu.halted {
            // Nothing to do until the interrupt controller wakes us up.
            self.clock();
            return;
        }

        // A pending EI is applied once the instruction after it has run. Capture it before this instruction can change
        // it (DI cancels it, a second EI re-arms it).
        let enable_ime = self.hw.cpu.ime_pending;
        let pc = self.hw.cpu.pc;

        let instruction = decode_instruction(|| self.fetch());
        self.execute(pc, instruction);

        if enable_ime && self.hw.cpu.ime_pending {
            self.hw.cpu.ime = true;
            self.hw.cpu.ime_pending = false;
        }
    }

    fn execute(&mut self, pc: u16, instruction: Instruction) {
        match instruction {
            ADC(o) => self.add(o, true),
            ADD(o) => self.add(o, false),
            ADD16(rr) => self.add16(rr),
            ADD_SP_r8(r8) => self.add_sp_r8(r8),
            AND(o) => self.bitwise(BitwiseOp::AND, o),
            BIT(b, o) => self.bit(b, o),
            CALL(cc, addr) => self.call(cc, addr),
            CCF => self.ccf(),
            CP(o) => self.sub(o, false, false),
            CPL => self.cpl(),
            DAA => self.daa(),
            DEC(o) => self.dec(o),
            DEC16(rr) => self.dec16(rr),
            DI => self.set_ime(false),
            EI => self.set_ime(true),
            HALT => self.halt(),
            INC(o) => self.inc(o),
            INC16(rr) => self.inc16(rr),
            JP(cc, o) => self.jp(cc, o),
            JR(cc, r8) => self.jr(cc, r8),
            LD(lhs, rhs) => self.ld(lhs, rhs),
            LD16(lhs @ Operand16::Register(SP), rhs @ Operand16::Register(HL)) => self.ld16(lhs, rhs, true),
            LD16(lhs, rhs) => self.ld16(lhs, rhs, false),
            LD_HL_SP(d) => self.ld_hl_sp(d),
            NOP => {}
            OR(o) => self.bitwise(BitwiseOp::OR, o),
            POP(rr) => self.pop(rr),
            PUSH(rr) => self.push(rr),
            RES(b, o) => self.setbit(b, o, false),
            RET(cc) => self.ret(cc, false),
            RETI => self.ret(None, true),
            RL(o) => self.rl(o, true, true),
            RLA => self.rl(Operand::Register(A), false, true),
            RLC(o) => self.rlc(o, true),
            RLCA => self.rlc(Operand::Register(A), false),
            RR(o) => self.rr(o, true),
            RRA => self.rr(Operand::Register(A), false),
            RRC(o) => self.rrc(o, true),
            RRCA => self.rrc(Operand::Register(A), false),
            RST(vec) => self.rst(vec),
            SBC(o) => self.sub(o, true, true),
            SCF => self.scf(),
            SET(b, o) => self.setbit(b, o, true),
            SLA(o) => self.rl(o, true, false),
            SRA(o) => self.shift_right(o, true),
            SRL(o) => self.shift_right(o, false),
            STOP => self.stop(),
            SUB(o) => self.sub(o, false, true),
            SWAP(o) => self.swap(o),
            XOR(o) => self.bitwise(BitwiseOp::XOR, o),
            Invalid(opcode) => {
                // The real CPU hangs forever. Park PC on the opcode and let the scheduler stop.
                warn!("Illegal opcode {:#04x} at {:#06x}, CPU locked up", opcode, pc);
                self.hw.cpu.pc = pc;
                self.hw.raise(Fault::IllegalOpcode { opcode, pc });
            }
        }
    }

    fn set_ime(&mut self, v: bool) {
        if v {
            // Enabling interrupts happens after the next instruction ...
            self.hw.cpu.ime_pending = true;
        } else {
            // ... However, disabling interrupts is immediate.
            self.hw.cpu.ime = false;
            self.hw.cpu.ime_pending = false;
        }
    }

    fn halt(&mut self) {
        // With IME off and an interrupt already pending, HALT would be exited on the spot.
        if !self.hw.cpu.ime && InterruptController::next_interrupt(self.hw).is_some() {
            return;
        }
        self.hw.cpu.halted = true;
    }

    fn stop(&mut self) {
        // STOP is encoded with a trailing byte that's ignored.
        self.fetch();

        if self.hw.cgb() && self.hw.io[0x4D] & 1 != 0 {
            self.hw.double_speed = !self.hw.double_speed;
            self.hw.io[0x4D] &= !1;
            Timer::reg_div_write(self.hw);
            debug!("Speed switch, double speed now {}", self.hw.double_speed);
        }
    }

    fn inc(&mut self, o: Operand) {
        let v = self.operand_get(o).wrapping_add(1);
        let f = &mut self.hw.cpu.f;
        f.z = v == 0;
        f.n = false;
        f.h = v.trailing_zeros() >= 4;
        self.operand_set(o, v);
    }

    fn inc16(&mut self, rr: Register16) {
        let v = self.hw.cpu.register16_get(rr);
        self.hw.cpu.register16_set(rr, v.wrapping_add(1));
        self.clock();
    }

    fn dec(&mut self, o: Operand) {
        let v = self.operand_get(o).wrapping_sub(1);
        let f = &mut self.hw.cpu.f;
        f.z = v == 0;
        f.n = true;
        f.h = v & 0x0F == 0x0F;
        self.operand_set(o, v);
    }

    fn dec16(&mut self, rr: Register16) {
        let v = self.hw.cpu.register16_get(rr);
        self.hw.cpu.register16_set(rr, v.wrapping_sub(1));
        self.clock();
    }

    fn add(&mut self, o: Operand, carry: bool) {
        let carry = if carry && self.hw.cpu.f.c { 1 } else { 0 };

        let old = self.hw.cpu.a;
        let v = self.operand_get(o);
        let new = old.wrapping_add(v).wrapping_add(carry);

        let cpu = &mut self.hw.cpu;
        cpu.a = new;
        cpu.f.z = new == 0;
        cpu.f.n = false;
        cpu.f.h = (old & 0xF) + (v & 0xF) + carry > 0xF;
        cpu.f.c = u16::from(old) + u16::from(v) + u16::from(carry) > 0xFF;
    }

    fn add16(&mut self, rr: Register16) {
        let hl = self.hw.cpu.register16_get(HL);
        let v = self.hw.cpu.register16_get(rr);
        let (new_hl, overflow) = hl.overflowing_add(v);
        self.hw.cpu.register16_set(HL, new_hl);

        self.clock();

        let f = &mut self.hw.cpu.f;
        f.n = false;
        f.h = (hl & 0xFFF) + (v & 0xFFF) > 0xFFF;
        f.c = overflow;
    }

    /// SP plus a signed offset. The flags come from the unsigned add of the low byte, like an 8-bit ADD would set them.
    fn sp_offset(&mut self, d: i8) -> u16 {
        let sp = self.hw.cpu.sp;
        let d = i16::from(d) as u16;

        let f = &mut self.hw.cpu.f;
        f.reset();
        f.h = (sp & 0xF) + (d & 0xF) > 0xF;
        f.c = (sp & 0xFF) + (d & 0xFF) > 0xFF;

        sp.wrapping_add(d)
    }

    fn add_sp_r8(&mut self, d: i8) {
        self.hw.cpu.sp = self.sp_offset(d);
        self.clock();
        self.clock();
    }

    fn ld_hl_sp(&mut self, d: i8) {
        let v = self.sp_offset(d);
        self.hw.cpu.register16_set(HL, v);
        self.clock();
    }

    fn sub(&mut self, o: Operand, carry: bool, store: bool) {
        let carry = if carry && self.hw.cpu.f.c { 1 } else { 0 };

        let a = self.hw.cpu.a;
        let v = self.operand_get(o);
        let new_a = a.wrapping_sub(v).wrapping_sub(carry);

        let cpu = &mut self.hw.cpu;
        if store {
            cpu.a = new_a;
        }
        cpu.f.z = new_a == 0;
        cpu.f.n = true;
        cpu.f.h = u16::from(a & 0xF) < u16::from(v & 0xF) + u16::from(carry);
        cpu.f.c = u16::from(a) < u16::from(v) + u16::from(carry);
    }

    fn ld(&mut self, lhs: Operand, rhs: Operand) {
        let v = self.operand_get(rhs);
        self.operand_set(lhs, v);
    }

    fn ld16(&mut self, lhs: Operand16, rhs: Operand16, extra_clock: bool) {
        let v = self.operand_get16(rhs);
        self.operand_set16(lhs, v);

        // LD SP,HL spends a cycle moving the value across.
        if extra_clock {
            self.clock();
        }
    }

    /// Adjusts A back into packed BCD after an addition or subtraction of two BCD values.
    fn daa(&mut self) {
        let cpu = &mut self.hw.cpu;
        let mut a = cpu.a;
        let mut carry = cpu.f.c;

        if cpu.f.n {
            if cpu.f.c {
                a = a.wrapping_sub(0x60);
            }
            if cpu.f.h {
                a = a.wrapping_sub(0x06);
            }
        } else {
            if cpu.f.c || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if cpu.f.h || a & 0x0F > 0x09 {
                a = a.wrapping_add(0x06);
            }
        }

        cpu.a = a;
        cpu.f.z = a == 0;
        cpu.f.h = false;
        cpu.f.c = carry;
    }

    fn cpl(&mut self) {
        let cpu = &mut self.hw.cpu;
        cpu.a = !cpu.a;
        cpu.f.n = true;
        cpu.f.h = true;
    }

    fn ccf(&mut self) {
        let f = &mut self.hw.cpu.f;
        f.n = false;
        f.h = false;
        f.c = !f.c;
    }

    fn scf(&mut self) {
        let f = &mut self.hw.cpu.f;
        f.n = false;
        f.h = false;
        f.c = true;
    }

    fn bitwise(&mut self, op: BitwiseOp, o: Operand) {
        let v = self.operand_get(o);
        let cpu = &mut self.hw.cpu;
        let a = cpu.a;
        let mut hc = false;
        cpu.a = match op {
            BitwiseOp::AND => {
                hc = true;
                a & v
            }
            BitwiseOp::OR => a | v,
            BitwiseOp::XOR => a ^ v,
        };

        cpu.f.reset();
        cpu.f.z = cpu.a == 0;
        cpu.f.h = hc;
    }

    fn bit(&mut self, b: u8, o: Operand) {
        let v = self.operand_get(o) & (1 << b);
        let f = &mut self.hw.cpu.f;
        f.z = v == 0;
        f.n = false;
        f.h = true;
    }

    fn setbit(&mut self, b: u8, o: Operand, on: bool) {
        let v = self.operand_get(o);
        self.operand_set(o, if on { v | 1 << b } else { v & !(1 << b) });
    }

    /// Writes back the result of a rotate/shift and sets flags. The accumulator-only rotates (RLCA etc) always clear Z.
    fn rotated(&mut self, o: Operand, v: u8, carry: bool, set_zero: bool) {
        self.operand_set(o, v);
        let f = &mut self.hw.cpu.f;
        f.reset();
        f.z = set_zero && v == 0;
        f.c = carry;
    }

    fn rl(&mut self, o: Operand, set_zero: bool, preserve_lsb: bool) {
        let v = self.operand_get(o);
        let lsb = if preserve_lsb && self.hw.cpu.f.c { 1 } else { 0 };
        let carry = v & 0x80 > 0;
        self.rotated(o, v << 1 | lsb, carry, set_zero);
    }

    fn rlc(&mut self, o: Operand, extended: bool) {
        let v = self.operand_get(o);
        self.rotated(o, v.rotate_left(1), v & 0x80 > 0, extended);
    }

    fn rr(&mut self, o: Operand, extended: bool) {
        let v = self.operand_get(o);
        let msb = if self.hw.cpu.f.c { 0x80 } else { 0 };
        self.rotated(o, v >> 1 | msb, v & 0x1 > 0, extended);
    }

    fn rrc(&mut self, o: Operand, extended: bool) {
        let v = self.operand_get(o);
        self.rotated(o, v.rotate_right(1), v & 0x1 > 0, extended);
    }

    fn shift_right(&mut self, o: Operand, preserve_msb: bool) {
        let v = self.operand_get(o);
        let preserve = if preserve_msb { v & 0x80 } else { 0 };
        self.rotated(o, v >> 1 | preserve, v & 0x01 > 0, true);
    }

    fn swap(&mut self, o: Operand) {
        let v = self.operand_get(o).rotate_left(4);
        self.operand_set(o, v);
        let f = &mut self.hw.cpu.f;
        f.reset();
        f.z = v == 0;
    }

    fn stack_push(&mut self, v: u16) {
        self.hw.cpu.sp = self.hw.cpu.sp.wrapping_sub(2);
        let sp = self.hw.cpu.sp;
        let (hi, lo) = split16(v);
        self.memory_write(sp.wrapping_add(1), hi);
        self.memory_write(sp, lo);
    }

    fn stack_pop(&mut self) -> u16 {
        let addr = self.hw.cpu.sp;
        let v = self.memory_read16(addr);
        self.hw.cpu.sp = addr.wrapping_add(2);
        v
    }

    fn push(&mut self, rr: Register16) {
        let v = self.hw.cpu.register16_get(rr);
        self.clock();
        self.stack_push(v);
    }

    fn pop(&mut self, rr: Register16) {
        let v = self.stack_pop();
        // Writes to AF go through Flags::unpack, which drops the low nibble of F.
        self.hw.cpu.register16_set(rr, v);
    }

    fn push_and_jump(&mut self, addr: u16) {
        let pc = self.hw.cpu.pc;
        self.stack_push(pc);
        self.hw.cpu.pc = addr;
    }

    fn call(&mut self, cc: Option<FlagCondition>, addr: u16) {
        if !self.hw.cpu.f.check_jmp_condition(cc) {
            return;
        }
        self.clock();
        self.push_and_jump(addr);
    }

    fn jp(&mut self, cc: Option<FlagCondition>, o: Operand16) {
        if !self.hw.cpu.f.check_jmp_condition(cc) {
            return;
        }

        let addr = self.operand_get16(o);
        self.hw.cpu.pc = addr;

        // JP (HL) doesn't need the extra cycle to load PC.
        if o != Operand16::Register(HL) {
            self.clock();
        }
    }

    fn jr(&mut self, cc: Option<FlagCondition>, n: u8) {
        if !self.hw.cpu.f.check_jmp_condition(cc) {
            return;
        }
        self.clock();
        self.hw.cpu.pc = self.hw.cpu.pc.wrapping_add(i16::from(n as i8) as u16);
    }

    fn ret(&mut self, cc: Option<FlagCondition>, ei: bool) {
        // Conditional returns spend a cycle evaluating the condition.
        if cc.is_some() {
            self.clock();
        }
        if !self.hw.cpu.f.check_jmp_condition(cc) {
            return;
        }
        if ei {
            // RETI immediately enables IME, it's not deferred like an EI call.
            self.hw.cpu.ime = true;
        }
        let pc = self.stack_pop();
        self.clock();
        self.hw.cpu.pc = pc;
    }

    fn rst(&mut self, a: u8) {
        self.clock();
        self.push_and_jump(u16::from(a));
    }
}

impl Flags {
    /// Checks if current state of CPU flags satisfies a particular FlagCondition.
    fn check_jmp_condition(&self, cc: Option<FlagCondition>) -> bool {
        match cc {
            None => true,
            Some(FlagCondition::NZ) => !self.z,
            Some(FlagCondition::Z) => self.z,
            Some(FlagCondition::NC) => !self.c,
            Some(FlagCondition::C) => self.c,
        }
    }
}

/// The instruction decoder. Fetches the next 8-bit opcode from an arbitrary source, decodes it into an instruction, and
/// then possibly fetches another 1-2 bytes used by that instruction. The "arbitrary source" in the main case will be
/// the CPU fetching the next byte from the memory address pointed to by the PC register (and then bumping it), but this
/// decode logic is also appropriate for a disassembler.
///
/// Rather than a 256 entry table, opcodes are decoded by the bit patterns they're built from. One-off opcodes are
/// matched first, since several of them sit inside the bit patterns of a family (HALT is where LD (HL),(HL) would be).
pub fn decode_instruction<T: FnMut() -> u8>(mut fetch: T) -> Instruction {
    macro_rules! fetch16 {
        () => {{
            let lo = fetch();
            let hi = fetch();
            join16(hi, lo)
        }};
    }

    let op = fetch();
    match op {
        0x00 => return NOP,
        0x07 => return RLCA,
        0x08 => return LD16(Operand16::ImmediateAddress(fetch16!()), Operand16::Register(SP)),
        0x0F => return RRCA,
        0x10 => return STOP,
        0x17 => return RLA,
        0x18 => return JR(None, fetch()),
        0x1F => return RRA,
        0x27 => return DAA,
        0x2F => return CPL,
        0x37 => return SCF,
        0x3F => return CCF,
        0x76 => return HALT,
        0xC3 => return JP(None, Operand16::Immediate(fetch16!())),
        0xC9 => return RET(None),
        0xCB => return decode_cb(fetch()),
        0xCD => return CALL(None, fetch16!()),
        0xD9 => return RETI,
        0xE0 => return LD(Operand::ImmediateAddressHigh(fetch()), Operand::Register(A)),
        0xE2 => return LD(Operand::AddressHigh(C), Operand::Register(A)),
        0xE8 => return ADD_SP_r8(fetch() as i8),
        0xE9 => return JP(None, Operand16::Register(HL)),
        0xEA => return LD(Operand::ImmediateAddress(fetch16!()), Operand::Register(A)),
        0xF0 => return LD(Operand::Register(A), Operand::ImmediateAddressHigh(fetch())),
        0xF2 => return LD(Operand::Register(A), Operand::AddressHigh(C)),
        0xF3 => return DI,
        0xF8 => return LD_HL_SP(fetch() as i8),
        0xF9 => return LD16(Operand16::Register(SP), Operand16::Register(HL)),
        0xFA => return LD(Operand::Register(A), Operand::ImmediateAddress(fetch16!())),
        0xFB => return EI,
        0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => return Invalid(op),
        _ => {}
    }

    // Bits 3-5 usually pick a register, condition or ALU operation. Bits 4-5 pick a register pair.
    let y = (op >> 3) & 0b111;
    let p = (op >> 4) & 0b11;

    if op & 0xC0 == 0x40 {
        LD(r8(y), r8(op))
    } else if op & 0xC0 == 0x80 {
        alu(y, r8(op))
    } else if op & 0xC7 == 0xC6 {
        alu(y, Operand::Immediate(fetch()))
    } else if op & 0xC7 == 0x06 {
        LD(r8(y), Operand::Immediate(fetch()))
    } else if op & 0xC7 == 0x04 {
        INC(r8(y))
    } else if op & 0xC7 == 0x05 {
        DEC(r8(y))
    } else if op & 0xCF == 0x01 {
        LD16(Operand16::Register(r16(p)), Operand16::Immediate(fetch16!()))
    } else if op & 0xCF == 0x02 {
        LD(indirect(p), Operand::Register(A))
    } else if op & 0xCF == 0x0A {
        LD(Operand::Register(A), indirect(p))
    } else if op & 0xCF == 0x03 {
        INC16(r16(p))
    } else if op & 0xCF == 0x0B {
        DEC16(r16(p))
    } else if op & 0xCF == 0x09 {
        ADD16(r16(p))
    } else if op & 0xCF == 0xC5 {
        PUSH(r16_stack(p))
    } else if op & 0xCF == 0xC1 {
        POP(r16_stack(p))
    } else if op & 0xC7 == 0xC7 {
        RST(op & 0x38)
    } else if op & 0xE7 == 0x20 {
        JR(Some(condition(y)), fetch())
    } else if op & 0xE7 == 0xC0 {
        RET(Some(condition(y)))
    } else if op & 0xE7 == 0xC2 {
        JP(Some(condition(y)), Operand16::Immediate(fetch16!()))
    } else if op & 0xE7 == 0xC4 {
        CALL(Some(condition(y)), fetch16!())
    } else {
        Invalid(op)
    }
}

/// Decodes the opcode following a $CB prefix. These all operate on a single register (or (HL)) picked by the low 3
/// bits, the rest of the opcode selects the operation and, for BIT/RES/SET, the bit number.
fn decode_cb(op: u8) -> Instruction {
    let o = r8(op);
    let b = (op >> 3) & 0b111;
    match op >> 6 {
        0 => match b {
            0 => RLC(o),
            1 => RRC(o),
            2 => RL(o),
            3 => RR(o),
            4 => SLA(o),
            5 => SRA(o),
            6 => SWAP(o),
            _ => SRL(o),
        },
        1 => BIT(b, o),
        2 => RES(b, o),
        _ => SET(b, o),
    }
}

/// The 8-bit operand encoded in a 3 bit register field.
fn r8(idx: u8) -> Operand {
    match idx & 0b111 {
        0 => Operand::Register(B),
        1 => Operand::Register(C),
        2 => Operand::Register(D),
        3 => Operand::Register(E),
        4 => Operand::Register(H),
        5 => Operand::Register(L),
        6 => Operand::Address(HL),
        _ => Operand::Register(A),
    }
}

fn r16(idx: u8) -> Register16 {
    match idx & 0b11 {
        0 => BC,
        1 => DE,
        2 => HL,
        _ => SP,
    }
}

/// PUSH/POP use AF where the other 16-bit instructions use SP.
fn r16_stack(idx: u8) -> Register16 {
    match r16(idx) {
        SP => AF,
        rr => rr,
    }
}

/// The memory operands of LD (rr),A and LD A,(rr).
fn indirect(idx: u8) -> Operand {
    match idx & 0b11 {
        0 => Operand::Address(BC),
        1 => Operand::Address(DE),
        2 => Operand::AddressInc(HL),
        _ => Operand::AddressDec(HL),
    }
}

fn condition(idx: u8) -> FlagCondition {
    match idx & 0b11 {
        0 => FlagCondition::NZ,
        1 => FlagCondition::Z,
        2 => FlagCondition::NC,
        _ => FlagCondition::C,
    }
}

fn alu(idx: u8, o: Operand) -> Instruction {
    match idx & 0b111 {
        0 => ADD(o),
        1 => ADC(o),
        2 => SUB(o),
        3 => SBC(o),
        4 => AND(o),
        5 => XOR(o),
        6 => OR(o),
        _ => CP(o),
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            A => write!(f, "a"),
            B => write!(f, "b"),
            C => write!(f, "c"),
            D => write!(f, "d"),
            E => write!(f, "e"),
            H => write!(f, "h"),
            L => write!(f, "l"),
        }
    }
}

impl std::fmt::Display for Register16 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AF => write!(f, "af"),
            BC => write!(f, "bc"),
            DE => write!(f, "de"),
            HL => write!(f, "hl"),
            SP => write!(f, "sp"),
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{}", r),
            Operand::Immediate(n8) => write!(f, "${:02x}", n8),
            Operand::Address(rr) => write!(f, "[{}]", rr),
            Operand::AddressInc(rr) => write!(f, "[{}+]", rr),
            Operand::AddressDec(rr) => write!(f, "[{}-]", rr),
            Operand::ImmediateAddress(n16) => write!(f, "[${:04x}]", n16),
            Operand::ImmediateAddressHigh(n8) => write!(f, "[$ff00+${:02x}]", n8),
            Operand::AddressHigh(r) => write!(f, "[$ff00+{}]", r),
        }
    }
}

impl std::fmt::Display for Operand16 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Operand16::Register(r) => write!(f, "{}", r),
            Operand16::Immediate(n16) => write!(f, "${:04x}", n16),
            Operand16::ImmediateAddress(addr) => write!(f, "[${:04x}]", addr),
        }
    }
}

impl std::fmt::Display for FlagCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FlagCondition::NZ => write!(f, "nz"),
            FlagCondition::Z => write!(f, "z"),
            FlagCondition::NC => write!(f, "nc"),
            FlagCondition::C => write!(f, "c"),
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ADC(o) => write!(f, "adc a, {}", o),
            ADD(o) => write!(f, "add a, {}", o),
            ADD16(rr) => write!(f, "add hl, {}", rr),
            ADD_SP_r8(r8) => write!(f, "add sp, {}", r8),
            AND(o) => write!(f, "and {}", o),
            BIT(b, o) => write!(f, "bit {}, {}", b, o),
            CALL(None, addr) => write!(f, "call ${:04x}", addr),
            CALL(Some(cc), addr) => write!(f, "call {}, ${:04x}", cc, addr),
            CCF => write!(f, "ccf"),
            CP(o) => write!(f, "cp {}", o),
            CPL => write!(f, "cpl"),
            DAA => write!(f, "daa"),
            DEC(o) => write!(f, "dec {}", o),
            DEC16(rr) => write!(f, "dec {}", rr),
            DI => write!(f, "di"),
            EI => write!(f, "ei"),
            HALT => write!(f, "halt"),
            INC(o) => write!(f, "inc {}", o),
            INC16(rr) => write!(f, "inc {}", rr),
            JP(None, o) => write!(f, "jp {}", o),
            JP(Some(cc), o) => write!(f, "jp {}, {}", cc, o),
            JR(None, r8) => write!(f, "jr {}", *r8 as i8),
            JR(Some(cc), r8) => write!(f, "jr {}, {}", cc, *r8 as i8),
            LD(lhs, rhs) => write!(f, "ld {}, {}", lhs, rhs),
            LD16(lhs, rhs) => write!(f, "ld {}, {}", lhs, rhs),
            LD_HL_SP(e8) => write!(f, "ld hl, sp{:+}", e8),
            NOP => write!(f, "nop"),
            OR(o) => write!(f, "or {}", o),
            POP(rr) => write!(f, "pop {}", rr),
            PUSH(rr) => write!(f, "push {}", rr),
            RES(b, o) => write!(f, "res {}, {}", b, o),
            RET(None) => write!(f, "ret"),
            RET(Some(cc)) => write!(f, "ret {}", cc),
            RETI => write!(f, "reti"),
            RL(o) => write!(f, "rl {}", o),
            RLA => write!(f, "rla"),
            RLC(o) => write!(f, "rlc {}", o),
            RLCA => write!(f, "rlca"),
            RR(o) => write!(f, "rr {}", o),
            RRA => write!(f, "rra"),
            RRC(o) => write!(f, "rrc {}", o),
            RRCA => write!(f, "rrca"),
            RST(vec) => write!(f, "rst ${:02x}", vec),
            SBC(o) => write!(f, "sbc a, {}", o),
            SCF => write!(f, "scf"),
            SET(b, o) => write!(f, "set {}, {}", b, o),
            SLA(o) => write!(f, "sla {}", o),
            SRA(o) => write!(f, "sra {}", o),
            SRL(o) => write!(f, "srl {}", o),
            STOP => write!(f, "stop"),
            SUB(o) => write!(f, "sub a, {}", o),
            SWAP(o) => write!(f, "swap {}", o),
            XOR(o) => write!(f, "xor a, {}", o),
            Invalid(op) => write!(f, "illegal ${:02x}", op),
        }
    }
}

impl Operand {
    /// Returns how many bytes this operand is encoded in, between 0 and 2.
    pub fn size(self) -> u8 {
        match self {
            Operand::Immediate(_) | Operand::ImmediateAddressHigh(_) => 1,
            Operand::ImmediateAddress(_) => 2,
            _ => 0,
        }
    }
}

impl Operand16 {
    /// Returns how many bytes this operand is encoded in, between 0 and 2.
    pub fn size(self) -> u8 {
        match self {
            Operand16::Register(_) => 0,
            Operand16::Immediate(_) | Operand16::ImmediateAddress(_) => 2,
        }
    }
}

impl Instruction {
    /// Returns how many bytes of memory this instruction is encoded in.
    pub fn size(&self) -> u8 {
        1 + // all instructions are at least 1 byte for the opcode.
            match self {
                // Beyond that, some instruction sizes depend on the operand.
                ADC(o) | ADD(o) | AND(o) | CP(o) | OR(o) | SBC(o) | SUB(o) | XOR(o) => o.size(),
                JP(_, o) => o.size(),
                LD(lhs, rhs) => lhs.size() + rhs.size(),
                LD16(lhs, rhs) => lhs.size() + rhs.size(),

                // Some instructions are implicitly bigger.
                ADD_SP_r8(_) | JR(_, _) | LD_HL_SP(_) | STOP => 1,
                CALL(_, _) => 2,

                // And all the PREFIX CB commands are one byte larger for the $CB prefix opcode.
                BIT(_, _) | RES(_, _) | SET(_, _) => 1,
                RL(_) | RLC(_) | RR(_) | RRC(_) | SLA(_) | SRA(_) | SRL(_) | SWAP(_) => 1,

                // Everything else is just the 1 byte.
                _ => 0,
            }
    }
}
