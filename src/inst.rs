use num_enum::TryFromPrimitive;
use std::fmt;
use std::str::FromStr;
use strum::IntoEnumIterator;

use crate::bus::Broadcast;
use crate::mem::{MemDir, MemWidth};

/// Instruction index into the program, not a byte address.
pub type Pc = u32;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Imm(pub u32);

/// `[base + offset]` memory operand.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemRef {
    pub base: ArchReg,
    pub offset: Imm,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub String);

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    TryFromPrimitive,
    strum::Display,
    strum::EnumCount,
    strum::EnumIter,
)]
#[repr(u8)]
#[strum(serialize_all = "lowercase")]
pub enum ArchReg {
    Zero,
    Ra,
    Sp,
    Gp,
    Tp,
    T0,
    T1,
    T2,
    S0,
    S1,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
    T3,
    T4,
    T5,
    T6,
}

impl ArchReg {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Identifies an in-flight instruction: the index of its reorder buffer slot.
/// Unique among live entries; ordering between tags is only meaningful
/// through a wraparound-aware [`TagOrder`](crate::rob::TagOrder).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Tag(usize);

impl Tag {
    pub fn new(index: usize) -> Self {
        Tag(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A renamed source slot: either a known value or the tag of the producer
/// that will broadcast it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operand {
    Value(u32),
    Pending(Tag),
}

impl Operand {
    pub fn value(self) -> Option<u32> {
        match self {
            Operand::Value(v) => Some(v),
            Operand::Pending(_) => None,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, Operand::Value(_))
    }

    /// Resolves this slot against a delivered broadcast set.
    pub fn snoop(&mut self, bus: &[Broadcast]) {
        if let Operand::Pending(tag) = *self {
            if let Some(b) = bus.iter().find(|b| b.tag == tag) {
                *self = Operand::Value(b.value);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    // register-register
    Add(ArchReg, ArchReg, ArchReg),
    Sub(ArchReg, ArchReg, ArchReg),
    And(ArchReg, ArchReg, ArchReg),
    Or(ArchReg, ArchReg, ArchReg),
    Xor(ArchReg, ArchReg, ArchReg),
    ShiftLeftLogical(ArchReg, ArchReg, ArchReg),
    ShiftRightLogical(ArchReg, ArchReg, ArchReg),
    ShiftRightArith(ArchReg, ArchReg, ArchReg),
    SetLessThan(ArchReg, ArchReg, ArchReg),
    SetLessThanU(ArchReg, ArchReg, ArchReg),
    Mul(ArchReg, ArchReg, ArchReg),
    Div(ArchReg, ArchReg, ArchReg),
    DivU(ArchReg, ArchReg, ArchReg),
    Rem(ArchReg, ArchReg, ArchReg),
    RemU(ArchReg, ArchReg, ArchReg),
    // register-immediate
    AddImm(ArchReg, ArchReg, Imm),
    AndImm(ArchReg, ArchReg, Imm),
    OrImm(ArchReg, ArchReg, Imm),
    XorImm(ArchReg, ArchReg, Imm),
    ShiftLeftLogicalImm(ArchReg, ArchReg, Imm),
    ShiftRightLogicalImm(ArchReg, ArchReg, Imm),
    ShiftRightArithImm(ArchReg, ArchReg, Imm),
    SetLessThanImm(ArchReg, ArchReg, Imm),
    SetLessThanImmU(ArchReg, ArchReg, Imm),
    LoadImm(ArchReg, Imm),
    LoadUpperImm(ArchReg, Imm),
    // memory
    LoadByte(ArchReg, MemRef),
    LoadByteU(ArchReg, MemRef),
    LoadHalf(ArchReg, MemRef),
    LoadHalfU(ArchReg, MemRef),
    LoadWord(ArchReg, MemRef),
    StoreByte(ArchReg, MemRef),
    StoreHalf(ArchReg, MemRef),
    StoreWord(ArchReg, MemRef),
    // control flow; targets are resolved instruction indices
    BranchIfEqual(ArchReg, ArchReg, Pc),
    BranchIfNotEqual(ArchReg, ArchReg, Pc),
    BranchIfLess(ArchReg, ArchReg, Pc),
    BranchIfGreaterEqual(ArchReg, ArchReg, Pc),
    BranchIfLessU(ArchReg, ArchReg, Pc),
    BranchIfGreaterEqualU(ArchReg, ArchReg, Pc),
    Jump(Pc),
    JumpAndLink(ArchReg, Pc),
    JumpAndLinkRegister(ArchReg, ArchReg, Imm),
    Halt,
}

/// A fetched and decoded instruction record as handed to the issue stage.
/// Immutable once issued.
#[derive(Debug, Clone)]
pub struct DecodedInst {
    pub inst: Inst,
    pub pc: Pc,
    pub predicted_next: Pc,
}

/// Where an instruction goes at issue.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IssueClass {
    /// Outcome fully known at decode; completes in its reorder buffer slot.
    Direct,
    /// Goes to the reservation station and executes on the ALU.
    Compute,
    /// Goes to the load/store buffer.
    Memory,
}

/// One renamed source position of a compute-class instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SrcSlot {
    Reg(ArchReg),
    Imm(u32),
    None,
}

/// A memory operation's static shape, extracted at issue.
#[derive(Debug, Copy, Clone)]
pub struct MemAccess {
    pub dir: MemDir,
    pub width: MemWidth,
    pub sign_extend: bool,
    /// Destination register for loads, data source register for stores.
    pub reg: ArchReg,
    pub mem: MemRef,
}

impl Inst {
    pub fn class(&self) -> IssueClass {
        use Inst::*;
        match self {
            LoadImm(..) | LoadUpperImm(..) | Jump(..) | JumpAndLink(..) | Halt => {
                IssueClass::Direct
            }
            LoadByte(..) | LoadByteU(..) | LoadHalf(..) | LoadHalfU(..) | LoadWord(..)
            | StoreByte(..) | StoreHalf(..) | StoreWord(..) => IssueClass::Memory,
            _ => IssueClass::Compute,
        }
    }

    pub fn dest(&self) -> Option<ArchReg> {
        use Inst::*;
        match *self {
            Add(d, ..) | Sub(d, ..) | And(d, ..) | Or(d, ..) | Xor(d, ..)
            | ShiftLeftLogical(d, ..) | ShiftRightLogical(d, ..) | ShiftRightArith(d, ..)
            | SetLessThan(d, ..) | SetLessThanU(d, ..) | Mul(d, ..) | Div(d, ..)
            | DivU(d, ..) | Rem(d, ..) | RemU(d, ..) | AddImm(d, ..) | AndImm(d, ..)
            | OrImm(d, ..) | XorImm(d, ..) | ShiftLeftLogicalImm(d, ..)
            | ShiftRightLogicalImm(d, ..) | ShiftRightArithImm(d, ..) | SetLessThanImm(d, ..)
            | SetLessThanImmU(d, ..) | LoadImm(d, ..) | LoadUpperImm(d, ..) | LoadByte(d, ..)
            | LoadByteU(d, ..) | LoadHalf(d, ..) | LoadHalfU(d, ..) | LoadWord(d, ..)
            | JumpAndLink(d, ..) | JumpAndLinkRegister(d, ..) => Some(d),
            _ => None,
        }
    }

    /// Conditional branches and indirect jumps resolve in execution and may
    /// disagree with the fetch-time prediction.
    pub fn may_mispredict(&self) -> bool {
        use Inst::*;
        matches!(
            self,
            BranchIfEqual(..)
                | BranchIfNotEqual(..)
                | BranchIfLess(..)
                | BranchIfGreaterEqual(..)
                | BranchIfLessU(..)
                | BranchIfGreaterEqualU(..)
                | JumpAndLinkRegister(..)
        )
    }

    /// Source positions of a compute-class instruction, in the order the ALU
    /// consumes them. The same packing drives renaming and the reference
    /// interpreter so the two can never disagree.
    pub fn src_slots(&self) -> (SrcSlot, SrcSlot) {
        use Inst::*;
        match *self {
            Add(_, a, b) | Sub(_, a, b) | And(_, a, b) | Or(_, a, b) | Xor(_, a, b)
            | ShiftLeftLogical(_, a, b) | ShiftRightLogical(_, a, b)
            | ShiftRightArith(_, a, b) | SetLessThan(_, a, b) | SetLessThanU(_, a, b)
            | Mul(_, a, b) | Div(_, a, b) | DivU(_, a, b) | Rem(_, a, b) | RemU(_, a, b) => {
                (SrcSlot::Reg(a), SrcSlot::Reg(b))
            }
            AddImm(_, a, imm) | AndImm(_, a, imm) | OrImm(_, a, imm) | XorImm(_, a, imm)
            | ShiftLeftLogicalImm(_, a, imm) | ShiftRightLogicalImm(_, a, imm)
            | ShiftRightArithImm(_, a, imm) | SetLessThanImm(_, a, imm)
            | SetLessThanImmU(_, a, imm) | JumpAndLinkRegister(_, a, imm) => {
                (SrcSlot::Reg(a), SrcSlot::Imm(imm.0))
            }
            BranchIfEqual(a, b, _) | BranchIfNotEqual(a, b, _) | BranchIfLess(a, b, _)
            | BranchIfGreaterEqual(a, b, _) | BranchIfLessU(a, b, _)
            | BranchIfGreaterEqualU(a, b, _) => (SrcSlot::Reg(a), SrcSlot::Reg(b)),
            _ => (SrcSlot::None, SrcSlot::None),
        }
    }

    pub fn mem_access(&self) -> Option<MemAccess> {
        use Inst::*;
        let (dir, width, sign_extend, reg, mem) = match *self {
            LoadByte(d, m) => (MemDir::Load, MemWidth::Byte, true, d, m),
            LoadByteU(d, m) => (MemDir::Load, MemWidth::Byte, false, d, m),
            LoadHalf(d, m) => (MemDir::Load, MemWidth::Half, true, d, m),
            LoadHalfU(d, m) => (MemDir::Load, MemWidth::Half, false, d, m),
            LoadWord(d, m) => (MemDir::Load, MemWidth::Word, false, d, m),
            StoreByte(s, m) => (MemDir::Store, MemWidth::Byte, false, s, m),
            StoreHalf(s, m) => (MemDir::Store, MemWidth::Half, false, s, m),
            StoreWord(s, m) => (MemDir::Store, MemWidth::Word, false, s, m),
            _ => return None,
        };
        Some(MemAccess {
            dir,
            width,
            sign_extend,
            reg,
            mem,
        })
    }

    /// Parses one instruction line. Branch targets are resolved against the
    /// already-collected label table.
    pub fn parse(s: &str, labels: &hashbrown::HashMap<Label, Pc>) -> Result<Self, String> {
        let (op, args) = s.split_once(' ').unwrap_or((s, ""));
        let args = args.split(',').collect::<Vec<_>>();

        let nth_arg = |n: usize| -> Result<&str, String> {
            args.get(n)
                .map(|s| s.trim())
                .and_then(|s| if s.is_empty() { None } else { Some(s) })
                .ok_or_else(|| format!("cannot fetch argument {n}"))
        };
        let reg_arg = |n: usize| -> Result<ArchReg, String> { ArchReg::from_str(nth_arg(n)?) };
        let mem_arg = |n: usize| -> Result<MemRef, String> { MemRef::from_str(nth_arg(n)?) };
        let imm_arg = |n: usize| -> Result<Imm, String> { Imm::from_str(nth_arg(n)?) };
        let target_arg = |n: usize| -> Result<Pc, String> {
            let label = Label::from_str(nth_arg(n)?)?;
            labels
                .get(&label)
                .copied()
                .ok_or_else(|| format!("unknown label: '{}'", label.0))
        };

        let inst = match op.to_lowercase().as_str() {
            "nop" => Inst::AddImm(ArchReg::Zero, ArchReg::Zero, Imm(0)),
            "add" => Inst::Add(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "sub" => Inst::Sub(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "and" => Inst::And(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "or" => Inst::Or(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "xor" => Inst::Xor(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "sll" => Inst::ShiftLeftLogical(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "srl" => Inst::ShiftRightLogical(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "sra" => Inst::ShiftRightArith(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "slt" => Inst::SetLessThan(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "sltu" => Inst::SetLessThanU(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "mul" => Inst::Mul(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "div" => Inst::Div(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "divu" => Inst::DivU(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "rem" => Inst::Rem(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "remu" => Inst::RemU(reg_arg(0)?, reg_arg(1)?, reg_arg(2)?),
            "addi" => Inst::AddImm(reg_arg(0)?, reg_arg(1)?, imm_arg(2)?),
            "andi" => Inst::AndImm(reg_arg(0)?, reg_arg(1)?, imm_arg(2)?),
            "ori" => Inst::OrImm(reg_arg(0)?, reg_arg(1)?, imm_arg(2)?),
            "xori" => Inst::XorImm(reg_arg(0)?, reg_arg(1)?, imm_arg(2)?),
            "slli" => Inst::ShiftLeftLogicalImm(reg_arg(0)?, reg_arg(1)?, imm_arg(2)?),
            "srli" => Inst::ShiftRightLogicalImm(reg_arg(0)?, reg_arg(1)?, imm_arg(2)?),
            "srai" => Inst::ShiftRightArithImm(reg_arg(0)?, reg_arg(1)?, imm_arg(2)?),
            "slti" => Inst::SetLessThanImm(reg_arg(0)?, reg_arg(1)?, imm_arg(2)?),
            "sltiu" => Inst::SetLessThanImmU(reg_arg(0)?, reg_arg(1)?, imm_arg(2)?),
            "li" => Inst::LoadImm(reg_arg(0)?, imm_arg(1)?),
            "lui" => Inst::LoadUpperImm(reg_arg(0)?, imm_arg(1)?),
            "lb" => Inst::LoadByte(reg_arg(0)?, mem_arg(1)?),
            "lbu" => Inst::LoadByteU(reg_arg(0)?, mem_arg(1)?),
            "lh" => Inst::LoadHalf(reg_arg(0)?, mem_arg(1)?),
            "lhu" => Inst::LoadHalfU(reg_arg(0)?, mem_arg(1)?),
            "lw" => Inst::LoadWord(reg_arg(0)?, mem_arg(1)?),
            "sb" => Inst::StoreByte(reg_arg(0)?, mem_arg(1)?),
            "sh" => Inst::StoreHalf(reg_arg(0)?, mem_arg(1)?),
            "sw" => Inst::StoreWord(reg_arg(0)?, mem_arg(1)?),
            "beq" => Inst::BranchIfEqual(reg_arg(0)?, reg_arg(1)?, target_arg(2)?),
            "bne" => Inst::BranchIfNotEqual(reg_arg(0)?, reg_arg(1)?, target_arg(2)?),
            "blt" => Inst::BranchIfLess(reg_arg(0)?, reg_arg(1)?, target_arg(2)?),
            "bge" => Inst::BranchIfGreaterEqual(reg_arg(0)?, reg_arg(1)?, target_arg(2)?),
            "bltu" => Inst::BranchIfLessU(reg_arg(0)?, reg_arg(1)?, target_arg(2)?),
            "bgeu" => Inst::BranchIfGreaterEqualU(reg_arg(0)?, reg_arg(1)?, target_arg(2)?),
            "j" => Inst::Jump(target_arg(0)?),
            "jal" => Inst::JumpAndLink(reg_arg(0)?, target_arg(1)?),
            "jalr" => Inst::JumpAndLinkRegister(reg_arg(0)?, reg_arg(1)?, imm_arg(2)?),
            "halt" => Inst::Halt,
            _ => return Err(format!("unknown instruction: '{}'", op)),
        };

        Ok(inst)
    }
}

impl FromStr for Imm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = if let Some(hex) = s.strip_prefix("0x") {
            i64::from_str_radix(hex, 16)
        } else if let Some(hex) = s.strip_prefix("-0x") {
            i64::from_str_radix(hex, 16).map(|v| -v)
        } else {
            i64::from_str(s)
        };

        let val = val.map_err(|_| format!("invalid immediate: '{s}'"))?;

        // Two's-complement truncation: anything representable in 32 bits,
        // signed or unsigned, is accepted.
        if val < -(1 << 31) || val >= (1 << 32) {
            return Err(format!("immediate out of range: '{s}'"));
        }

        Ok(Imm(val as u32))
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || "_.".contains(c)) {
            true => Ok(Label(s.to_owned())),
            false => Err(format!("invalid label name: '{s}'")),
        }
    }
}

impl FromStr for MemRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .map(|s| s.trim())
            .ok_or_else(|| format!("invalid memory reference (no []): '{s}'"))?;

        if let Ok(reg) = inner.parse::<ArchReg>() {
            return Ok(MemRef {
                base: reg,
                offset: Imm(0),
            });
        }

        if inner.matches(&['+', '-']).count() > 1 {
            return Err(format!("invalid memory reference (too many +-): '{s}'"));
        }

        let negated = inner.contains('-');
        let (fst, snd) = inner
            .split_once(&['+', '-'])
            .ok_or_else(|| format!("invalid memory reference (no +-): '{s}'"))?;

        let base = ArchReg::from_str(fst.trim())?;
        let offset = Imm::from_str(snd.trim())?;
        let offset = if negated {
            Imm(offset.0.wrapping_neg())
        } else {
            offset
        };

        Ok(MemRef { base, offset })
    }
}

impl FromStr for ArchReg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "fp" {
            return Ok(ArchReg::S0);
        }

        if let Some(idx) = s.strip_prefix('x') {
            if let Ok(i) = idx.parse::<u8>() {
                return ArchReg::try_from(i).map_err(|e| e.to_string());
            }
        }

        ArchReg::iter()
            .find(|r| r.to_string() == s)
            .ok_or_else(|| format!("unknown register: '{s}'"))
    }
}
