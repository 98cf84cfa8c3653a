//! Component A: the opcode/operand data model (spec §3, §4.A).
//!
//! `Opcode` is one flat enumeration covering every addressing-mode variant
//! plus the helper opcodes that only ever live in the IR. `correct_op`
//! dispatches on operand shape with an explicit, exhaustively-checked match
//! per family rather than offset arithmetic on the discriminant — the
//! offset trick is tidy on paper but the compiler can't verify it stays in
//! bounds as variants are added, so a flat table wins here.

use crate::error::{Error, Result};
use crate::jump::LabelId;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::ToPrimitive;
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, FromPrimitive, ToPrimitive)]
pub enum Opcode {
    Nop,
    Halt,
    Rtrn,

    // Jump block: contiguous Jmp..=Call. Jmp sits at an odd discriminant so
    // each conditional pair starts on an even one (Jeq=4/Jne=5, Jg=6/Jle=7,
    // Jl=8/Jge=9) — negation is exactly `value ^ 1` within a pair.
    Jmp,
    Jeq,
    Jne,
    Jg,
    Jle,
    Jl,
    Jge,
    Call,

    Push,

    // Video/graphics: base (IMM) + Reg (+1) + Ram (+2).
    Vid,
    VidRed,
    VidRedReg,
    VidRedRam,
    VidGreen,
    VidGreenReg,
    VidGreenRam,
    VidBlue,
    VidBlueReg,
    VidBlueRam,
    VidX,
    VidXReg,
    VidXRam,
    VidY,
    VidYReg,
    VidYRam,

    // Runtime unary ops (supplement, see SPEC_FULL.md §4.2): same 3-variant
    // shape as video ops, dispatched on the single operand.
    Not,
    NotReg,
    NotRam,
    Neg,
    NegReg,
    NegRam,

    // Six-variant arithmetic/move/compare families:
    // base(Reg,Reg), +1(Ram,Reg), +2(Reg,Imm), +3(Reg,Ram), +4(Ram,Imm), +5(Ram,Ram)
    Mov,
    MovRamReg,
    MovRegImm,
    MovRegRam,
    MovRamImm,
    MovRamRam,

    Cmp,
    CmpRamReg,
    CmpRegImm,
    CmpRegRam,
    CmpRamImm,
    CmpRamRam,

    Add,
    AddRamReg,
    AddRegImm,
    AddRegRam,
    AddRamImm,
    AddRamRam,

    Sub,
    SubRamReg,
    SubRegImm,
    SubRegRam,
    SubRamImm,
    SubRamRam,

    Mult,
    MultRamReg,
    MultRegImm,
    MultRegRam,
    MultRamImm,
    MultRamRam,

    Div,
    DivRamReg,
    DivRegImm,
    DivRegRam,
    DivRamImm,
    DivRamRam,

    Quot,
    QuotRamReg,
    QuotRegImm,
    QuotRegRam,
    QuotRamImm,
    QuotRamRam,

    And,
    AndRamReg,
    AndRegImm,
    AndRegRam,
    AndRamImm,
    AndRamRam,

    Or,
    OrRamReg,
    OrRegImm,
    OrRegRam,
    OrRamImm,
    OrRamRam,

    Xor,
    XorRamReg,
    XorRegImm,
    XorRegRam,
    XorRamImm,
    XorRamRam,

    Shl,
    ShlRamReg,
    ShlRegImm,
    ShlRegRam,
    ShlRamImm,
    ShlRamRam,

    Shr,
    ShrRamReg,
    ShrRegImm,
    ShrRegRam,
    ShrRamImm,
    ShrRamRam,

    // Helper opcodes: exist only in the IR, never reach the encoder.
    Label,
    InnerStart,
    InnerEnd,
    ReturnHelper,
    CallHelper,
}

impl Opcode {
    /// Name as printed in the assembly listing, e.g. `ADD`, `JEQ`.
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "NOP",
            Halt => "HALT",
            Push => "PUSH",
            Rtrn => "RTRN",
            Jmp => "JMP",
            Jeq => "JEQ",
            Jne => "JNE",
            Jg => "JG",
            Jle => "JLE",
            Jl => "JL",
            Jge => "JGE",
            Call => "CALL",
            Vid => "VID",
            VidRed | VidRedReg | VidRedRam => "VID_RED",
            VidGreen | VidGreenReg | VidGreenRam => "VID_GREEN",
            VidBlue | VidBlueReg | VidBlueRam => "VID_BLUE",
            VidX | VidXReg | VidXRam => "VID_X",
            VidY | VidYReg | VidYRam => "VID_Y",
            Not | NotReg | NotRam => "NOT",
            Neg | NegReg | NegRam => "NEG",
            Mov | MovRamReg | MovRegImm | MovRegRam | MovRamImm | MovRamRam => "MOV",
            Cmp | CmpRamReg | CmpRegImm | CmpRegRam | CmpRamImm | CmpRamRam => "CMP",
            Add | AddRamReg | AddRegImm | AddRegRam | AddRamImm | AddRamRam => "ADD",
            Sub | SubRamReg | SubRegImm | SubRegRam | SubRamImm | SubRamRam => "SUB",
            Mult | MultRamReg | MultRegImm | MultRegRam | MultRamImm | MultRamRam => "MULT",
            Div | DivRamReg | DivRegImm | DivRegRam | DivRamImm | DivRamRam => "DIV",
            Quot | QuotRamReg | QuotRegImm | QuotRegRam | QuotRamImm | QuotRamRam => "QUOT",
            And | AndRamReg | AndRegImm | AndRegRam | AndRamImm | AndRamRam => "AND",
            Or | OrRamReg | OrRegImm | OrRegRam | OrRamImm | OrRamRam => "OR",
            Xor | XorRamReg | XorRegImm | XorRegRam | XorRamImm | XorRamRam => "XOR",
            Shl | ShlRamReg | ShlRegImm | ShlRegRam | ShlRamImm | ShlRamRam => "SHL",
            Shr | ShrRamReg | ShrRegImm | ShrRegRam | ShrRamImm | ShrRamRam => "SHR",
            Label => "LABEL",
            InnerStart => "INNER_START",
            InnerEnd => "INNER_END",
            ReturnHelper => "RETURN_HELPER",
            CallHelper => "CALL_HELPER",
        }
    }

    /// True for the contiguous `Jmp..=Call` block (unconditional jump,
    /// conditional jumps, and `CALL`).
    pub fn is_jump(self) -> bool {
        use Opcode::*;
        matches!(self, Jmp | Jeq | Jne | Jg | Jle | Jl | Jge | Call)
    }

    /// Returns the complementary conditional jump, e.g. `JEQ` <-> `JNE`.
    /// Fails for every opcode outside the three negatable pairs.
    pub fn negate(self) -> Result<Opcode> {
        use Opcode::*;
        Ok(match self {
            Jeq => Jne,
            Jne => Jeq,
            Jg => Jle,
            Jle => Jg,
            Jl => Jge,
            Jge => Jl,
            other => return Err(Error::NonNegatableJump(other)),
        })
    }

    fn two_operand_family(self) -> Option<[Opcode; 6]> {
        use Opcode::*;
        Some(match self {
            Mov => [Mov, MovRamReg, MovRegImm, MovRegRam, MovRamImm, MovRamRam],
            Cmp => [Cmp, CmpRamReg, CmpRegImm, CmpRegRam, CmpRamImm, CmpRamRam],
            Add => [Add, AddRamReg, AddRegImm, AddRegRam, AddRamImm, AddRamRam],
            Sub => [Sub, SubRamReg, SubRegImm, SubRegRam, SubRamImm, SubRamRam],
            Mult => [
                Mult,
                MultRamReg,
                MultRegImm,
                MultRegRam,
                MultRamImm,
                MultRamRam,
            ],
            Div => [Div, DivRamReg, DivRegImm, DivRegRam, DivRamImm, DivRamRam],
            Quot => [
                Quot,
                QuotRamReg,
                QuotRegImm,
                QuotRegRam,
                QuotRamImm,
                QuotRamRam,
            ],
            And => [And, AndRamReg, AndRegImm, AndRegRam, AndRamImm, AndRamRam],
            Or => [Or, OrRamReg, OrRegImm, OrRegRam, OrRamImm, OrRamRam],
            Xor => [Xor, XorRamReg, XorRegImm, XorRegRam, XorRamImm, XorRamRam],
            Shl => [Shl, ShlRamReg, ShlRegImm, ShlRegRam, ShlRamImm, ShlRamRam],
            Shr => [Shr, ShrRamReg, ShrRegImm, ShrRegRam, ShrRamImm, ShrRamRam],
            _ => return None,
        })
    }

    fn single_operand_family(self) -> Option<[Opcode; 3]> {
        use Opcode::*;
        Some(match self {
            VidRed => [VidRed, VidRedReg, VidRedRam],
            VidGreen => [VidGreen, VidGreenReg, VidGreenRam],
            VidBlue => [VidBlue, VidBlueReg, VidBlueRam],
            VidX => [VidX, VidXReg, VidXRam],
            VidY => [VidY, VidYReg, VidYRam],
            Not => [Not, NotReg, NotRam],
            Neg => [Neg, NegReg, NegRam],
            _ => return None,
        })
    }

    /// Selects the addressing-mode variant matching `destination`/`source`.
    /// Identity for opcodes outside the arithmetic/move/compare/video/unary
    /// families.
    pub fn correct_op(self, destination: &Operand, source: &Operand) -> Result<Opcode> {
        if let Some(variants) = self.two_operand_family() {
            let idx = match (destination.shape(), source.shape()) {
                (Shape::Reg, Shape::Reg) => 0,
                (Shape::Ram, Shape::Reg) => 1,
                (Shape::Reg, Shape::Imm) => 2,
                (Shape::Reg, Shape::Ram) => 3,
                (Shape::Ram, Shape::Imm) => 4,
                (Shape::Ram, Shape::Ram) => 5,
                (d, s) => {
                    return Err(Error::UnsupportedOperand {
                        op: self,
                        shape: format!("{:?},{:?}", d, s),
                    })
                }
            };
            return Ok(variants[idx]);
        }

        if let Some(variants) = self.single_operand_family() {
            let idx = match destination.shape() {
                Shape::Imm => 0,
                Shape::Reg => 1,
                Shape::Ram => 2,
                s => {
                    return Err(Error::UnsupportedOperand {
                        op: self,
                        shape: format!("{:?}", s),
                    })
                }
            };
            return Ok(variants[idx]);
        }

        Ok(self)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Shape {
    Reg,
    Ram,
    Imm,
    Other,
}

/// An operand: either fully allocated (`Reg`/`Ram`/`Int`) or still a
/// source-level name awaiting allocation (spec §3 "Operand variants").
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Int(i32),
    /// `u` in `[0..15]`; `14` is `bp`, `15` is `sp`.
    Reg(u8),
    Ram(i32),
    /// An unassigned source variable, or a placeholder (`#n` register,
    /// `-n-call temp` temp-memory) that allocation will resolve.
    Name(String),
    None,
}

pub const BASE_POINTER: u8 = 14;
pub const STACK_POINTER: u8 = 15;

pub fn base_pointer() -> Operand {
    Operand::Reg(BASE_POINTER)
}

pub fn stack_pointer() -> Operand {
    Operand::Reg(STACK_POINTER)
}

impl Operand {
    pub fn shape(&self) -> Shape {
        match self {
            Operand::Reg(_) => Shape::Reg,
            Operand::Ram(_) => Shape::Ram,
            Operand::Int(_) => Shape::Imm,
            Operand::Name(_) | Operand::None => Shape::Other,
        }
    }

    pub fn is_register_placeholder(&self) -> bool {
        matches!(self, Operand::Name(n) if n.starts_with('#'))
    }

    pub fn is_temp_memory(&self) -> bool {
        matches!(self, Operand::Name(n) if n.starts_with('-'))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(n) => write!(f, "{}", n),
            Operand::Reg(BASE_POINTER) => write!(f, "bp"),
            Operand::Reg(STACK_POINTER) => write!(f, "sp"),
            Operand::Reg(n) => write!(f, "R{}", n),
            Operand::Ram(n) => write!(f, "[bp + {}]", n),
            Operand::Name(n) => write!(f, "{}", n),
            Operand::None => Ok(()),
        }
    }
}

/// The three shapes a short-circuited comparison can carry (spec glossary).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Compare {
    Simple,
    LogicalAnd,
    LogicalOr,
}

/// A raw, not-yet-allocated expression result: either a compile-time
/// constant, a bare name/placeholder with no preceding side effects, or a
/// name paired with the (non-empty) commands that compute it. This is the
/// Rust shape of the three forms the lowering walk returns per spec §4.F.
#[derive(Clone, Debug, PartialEq)]
pub enum RawExpr {
    Int(i32),
    Bare(Operand),
    Computed(Operand, Vec<Command>),
}

impl RawExpr {
    pub fn name(name: impl Into<String>) -> RawExpr {
        RawExpr::Bare(Operand::Name(name.into()))
    }
}

/// The polymorphic payload of a [`Command`]'s `destination`/`source` field.
/// Most commands carry a single [`Operand`]; `RETURN_HELPER` and
/// `CALL_HELPER` carry lists (spec §3 "Command record").
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOperand {
    None,
    Operand(Operand),
    /// Raw (unexpanded) expressions: `RETURN_HELPER.destination`,
    /// `CALL_HELPER.source`.
    Exprs(Vec<RawExpr>),
    /// Plain receiving variable names: `CALL_HELPER.destination`.
    Names(Vec<String>),
}

impl CommandOperand {
    pub fn as_operand(&self) -> &Operand {
        match self {
            CommandOperand::Operand(op) => op,
            _ => &Operand::None,
        }
    }
}

impl From<Operand> for CommandOperand {
    fn from(op: Operand) -> CommandOperand {
        CommandOperand::Operand(op)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub operand: Opcode,
    pub destination: CommandOperand,
    pub source: CommandOperand,
    pub jump_label: Option<LabelId>,
    pub call_label: Option<String>,
}

impl Command {
    pub fn new(operand: Opcode) -> Command {
        Command {
            operand,
            destination: CommandOperand::None,
            source: CommandOperand::None,
            jump_label: None,
            call_label: None,
        }
    }

    pub fn with_dest(operand: Opcode, destination: impl Into<CommandOperand>) -> Command {
        Command {
            operand,
            destination: destination.into(),
            source: CommandOperand::None,
            jump_label: None,
            call_label: None,
        }
    }

    pub fn with_operands(
        operand: Opcode,
        destination: impl Into<CommandOperand>,
        source: impl Into<CommandOperand>,
    ) -> Command {
        Command {
            operand,
            destination: destination.into(),
            source: source.into(),
            jump_label: None,
            call_label: None,
        }
    }

    pub fn jump(operand: Opcode, jump_label: LabelId) -> Command {
        Command {
            operand,
            destination: CommandOperand::None,
            source: CommandOperand::None,
            jump_label: Some(jump_label),
            call_label: None,
        }
    }

    pub fn label(jump_label: LabelId) -> Command {
        Command::jump(Opcode::Label, jump_label)
    }

    pub fn negate_jump(&mut self) -> Result<()> {
        self.operand = self.operand.negate()?;
        Ok(())
    }

    pub fn compute_op(&mut self) -> Result<()> {
        self.operand = self
            .operand
            .correct_op(self.destination.as_operand(), self.source.as_operand())?;
        Ok(())
    }

    /// The instruction-word count this command occupies in the output
    /// stream (spec §4.A).
    pub fn num_instruct(&self) -> usize {
        if self.operand == Opcode::Label {
            return 0;
        }
        if self.jump_label.is_some() {
            return 2;
        }
        let mut n = 1;
        if matches!(
            self.destination,
            CommandOperand::Operand(Operand::Ram(_)) | CommandOperand::Operand(Operand::Int(_))
        ) {
            n += 1;
        }
        if matches!(
            self.source,
            CommandOperand::Operand(Operand::Ram(_)) | CommandOperand::Operand(Operand::Int(_))
        ) {
            n += 1;
        }
        n
    }

    /// Encodes a signed 16-bit value as its two's-complement `u16`,
    /// failing if it doesn't fit (spec §4.G, `ImmediateOutOfRange`).
    pub fn encode_signed_16(value: i32) -> Result<u16> {
        if !(-32768..=32767).contains(&value) {
            return Err(Error::ImmediateOutOfRange {
                value: value as i64,
            });
        }
        Ok(value as i16 as u16)
    }

    /// Emits the fixed-width hex machine code for this command, given the
    /// already-resolved jump position (if any). Must be called after
    /// [`Command::compute_op`].
    pub fn get_binary(&self, jump_position: Option<u32>) -> Result<String> {
        if self.operand == Opcode::Label {
            return Ok(String::new());
        }

        let opcode_value = self.operand.to_u16().expect("Opcode fits in u16");
        let mut word1: u16 = opcode_value << 8;
        if let CommandOperand::Operand(Operand::Reg(n)) = &self.destination {
            word1 += (*n as u16) << 4;
        }
        if let CommandOperand::Operand(Operand::Reg(n)) = &self.source {
            word1 += *n as u16;
        }

        let mut out = format!("{:04X}", word1);

        match &self.destination {
            CommandOperand::Operand(Operand::Ram(n)) => {
                out.push_str(&format!("{:04X}", Self::encode_signed_16(*n)?));
            }
            CommandOperand::Operand(Operand::Int(n)) => {
                out.push_str(&format!("{:04X}", Self::encode_signed_16(*n)?));
            }
            _ => {}
        }

        match &self.source {
            CommandOperand::Operand(Operand::Ram(n)) => {
                out.push_str(&format!("{:04X}", Self::encode_signed_16(*n)?));
            }
            CommandOperand::Operand(Operand::Int(n)) => {
                out.push_str(&format!("{:04X}", Self::encode_signed_16(*n)?));
            }
            _ => {}
        }

        if self.jump_label.is_some() {
            let pos = jump_position.unwrap_or(0);
            out.push_str(&format!("{:04X}", pos as u16));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn negation_is_involutive() {
        for op in [Opcode::Jeq, Opcode::Jne, Opcode::Jg, Opcode::Jle, Opcode::Jl, Opcode::Jge] {
            assert_eq!(op.negate().unwrap().negate().unwrap(), op);
        }
    }

    #[test]
    fn conditional_pairs_are_encoded_as_low_bit_flips() {
        for (a, b) in [
            (Opcode::Jeq, Opcode::Jne),
            (Opcode::Jg, Opcode::Jle),
            (Opcode::Jl, Opcode::Jge),
        ] {
            let va = a.to_u16().unwrap();
            let vb = b.to_u16().unwrap();
            assert_eq!(va % 2, 0, "{:?} should sit on an even discriminant", a);
            assert_eq!(va ^ 1, vb, "{:?}/{:?} should differ by exactly the low bit", a, b);
            assert_eq!(a.negate().unwrap(), b);
            assert_eq!(b.negate().unwrap(), a);
        }
    }
}
