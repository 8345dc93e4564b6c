//! Relocation operation tables.
//!
//! Each supported relocation type is described by two packed 16-bit words,
//! exactly as the target toolchains document them:
//!
//! * action word: `posn (4) | width << 4 (6) | action << 10`
//! * info word: `access (2) | sign << 2 (2) | sym << 4 (2) | stack << 6 (2)
//!   | bigoff << 8 (3) | scale << 11 (5)`
//!
//! Tables are kept sorted by relocation code and searched with a binary
//! search. [`RelocOp::decode`] unpacks the words into an [`OpSpec`].

use crate::error::{LoadError, Result};

/// Whether the relocated field is read from, or written back to, the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    None = 0,
    Read = 1,
    Write = 2,
    ReadWrite = 3,
}

impl Access {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

/// Signedness of the field and the overflow policy applied on write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Keep the low bits, never report.
    Truncate = 0,
    /// Signed field: `[-2^(w-1), 2^(w-1) - 1]`.
    Signed = 1,
    /// Unsigned field: `[0, 2^w - 1]`.
    Unsigned = 2,
    /// Either interpretation fits: `[-2^(w-1), 2^w - 1]`.
    Either = 3,
}

/// How the operand word is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolUse {
    /// The operand is a literal, a PC or a field descriptor.
    Literal = 0,
    /// The operand is a symbol index; use the symbol's value.
    Value = 1,
    /// The operand is a symbol index; use the symbol's relocation delta.
    Delta = 2,
}

/// Interaction with the expression stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackUse {
    None = 0,
    /// Pop the top; binary operators combine it with the new top.
    Pop = 1,
    /// Operate on the top in place.
    Unary = 2,
    /// Push the result.
    Push = 3,
}

/// What the relocation computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Val = 0,
    Asgn,
    Add,
    Pcr,
    AddDisp,
    AsgPc,
    Plus,
    Sub,
    Neg,
    Mpy,
    Div,
    Mod,
    Sr,
    Asr,
    Sl,
    And,
    Or,
    Xor,
    Not,
    C6Sect,
    C6Base,
    C6Dspl,
    Pcr23T,
}

impl Action {
    const ALL: [Action; 23] = [
        Self::Val,
        Self::Asgn,
        Self::Add,
        Self::Pcr,
        Self::AddDisp,
        Self::AsgPc,
        Self::Plus,
        Self::Sub,
        Self::Neg,
        Self::Mpy,
        Self::Div,
        Self::Mod,
        Self::Sr,
        Self::Asr,
        Self::Sl,
        Self::And,
        Self::Or,
        Self::Xor,
        Self::Not,
        Self::C6Sect,
        Self::C6Base,
        Self::C6Dspl,
        Self::Pcr23T,
    ];

    fn from_code(code: u16) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Operators that combine the popped value with the new stack top.
    pub const fn is_binary(self) -> bool {
        matches!(
            self,
            Self::Plus
                | Self::Sub
                | Self::Mpy
                | Self::Div
                | Self::Mod
                | Self::Sr
                | Self::Asr
                | Self::Sl
                | Self::And
                | Self::Or
                | Self::Xor
        )
    }
}

/// One packed table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocOp {
    pub code: u16,
    pub action: u16,
    pub info: u16,
}

impl RelocOp {
    /// Pack a table entry. Geometry of zero width means "taken from the
    /// relocation record".
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        code: u16,
        action: Action,
        posn: u8,
        width: u8,
        access: Access,
        sign: Overflow,
        sym: SymbolUse,
        stack: StackUse,
    ) -> Self {
        Self {
            code,
            action: (posn as u16 & 0xF) | (width as u16 & 0x3F) << 4 | (action as u16) << 10,
            info: access as u16 | (sign as u16) << 2 | (sym as u16) << 4 | (stack as u16) << 6,
        }
    }

    /// Target AUs to skip on a big-endian target to reach the AU holding
    /// the field's least significant bits.
    pub const fn big_offset(mut self, aus: u8) -> Self {
        self.info |= (aus as u16 & 0x7) << 8;
        self
    }

    /// Left shift applied after extraction and undone before insertion.
    pub const fn scale(mut self, bits: u8) -> Self {
        self.info |= (bits as u16 & 0x1F) << 11;
        self
    }

    pub fn decode(&self) -> Result<OpSpec> {
        let bad = || LoadError::BadRelocationType(self.code);
        let action = Action::from_code(self.action >> 10).ok_or_else(bad)?;
        let access = match self.info & 0x3 {
            0 => Access::None,
            1 => Access::Read,
            2 => Access::Write,
            _ => Access::ReadWrite,
        };
        let overflow = match (self.info >> 2) & 0x3 {
            0 => Overflow::Truncate,
            1 => Overflow::Signed,
            2 => Overflow::Unsigned,
            _ => Overflow::Either,
        };
        let symbol = match (self.info >> 4) & 0x3 {
            0 => SymbolUse::Literal,
            1 => SymbolUse::Value,
            2 => SymbolUse::Delta,
            _ => return Err(bad()),
        };
        let stack = match (self.info >> 6) & 0x3 {
            0 => StackUse::None,
            1 => StackUse::Pop,
            2 => StackUse::Unary,
            _ => StackUse::Push,
        };
        Ok(OpSpec {
            code: self.code,
            action,
            posn: u32::from(self.action & 0xF),
            width: u32::from((self.action >> 4) & 0x3F),
            access,
            overflow,
            symbol,
            stack,
            big_offset: u32::from((self.info >> 8) & 0x7),
            scale: u32::from(self.info >> 11),
        })
    }
}

/// A decoded table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSpec {
    pub code: u16,
    pub action: Action,
    pub posn: u32,
    /// Zero when the field geometry comes from the relocation record.
    pub width: u32,
    pub access: Access,
    pub overflow: Overflow,
    pub symbol: SymbolUse,
    pub stack: StackUse,
    pub big_offset: u32,
    pub scale: u32,
}

impl OpSpec {
    /// Whether the operand word carries a field descriptor.
    pub const fn field_from_record(&self) -> bool {
        self.width == 0 && !matches!(self.access, Access::None)
    }
}

/// Relocation table for one target family.
#[derive(Debug)]
pub struct RelocTable {
    pub ops: &'static [RelocOp],
    /// Codes that are recognised and deliberately skipped.
    pub ignored: &'static [u16],
}

impl RelocTable {
    /// Find the entry for `code`. `Ok(None)` means the code is ignorable.
    pub fn lookup(&self, code: u16) -> Result<Option<OpSpec>> {
        match self.ops.binary_search_by_key(&code, |op| op.code) {
            Ok(i) => self.ops[i].decode().map(Some),
            Err(_) if self.ignored.contains(&code) => Ok(None),
            Err(_) => Err(LoadError::BadRelocationType(code)),
        }
    }

    pub fn is_sorted(&self) -> bool {
        self.ops.windows(2).all(|w| w[0].code < w[1].code)
    }
}

// Expression operators shared by every TI COFF family.
pub const RE_ADD: u16 = 0x4000;
pub const RE_SUB: u16 = 0x4001;
pub const RE_NEG: u16 = 0x4002;
pub const RE_MPY: u16 = 0x4003;
pub const RE_DIV: u16 = 0x4004;
pub const RE_MOD: u16 = 0x4005;
pub const RE_SR: u16 = 0x4006;
pub const RE_ASR: u16 = 0x4007;
pub const RE_SL: u16 = 0x4008;
pub const RE_AND: u16 = 0x4009;
pub const RE_OR: u16 = 0x400a;
pub const RE_XOR: u16 = 0x400b;
pub const RE_NOTB: u16 = 0x400c;
pub const RE_ULDFLD: u16 = 0x400d;
pub const RE_SLDFLD: u16 = 0x400e;
pub const RE_USTFLD: u16 = 0x400f;
pub const RE_SSTFLD: u16 = 0x4010;
pub const RE_PUSH: u16 = 0x4011;
pub const RE_PUSHSK: u16 = 0x4012;
pub const RE_PUSHUK: u16 = 0x4013;
pub const RE_PUSHPC: u16 = 0x4014;
pub const RE_DUP: u16 = 0x4015;
pub const RE_XSTFLD: u16 = 0x4016;

// Absolute relocations common to the families.
pub const R_ABS: u16 = 0x00;
pub const R_RELBYTE: u16 = 0x0f;
pub const R_RELWORD: u16 = 0x10;
pub const R_RELLONG: u16 = 0x11;

const fn binop(code: u16, action: Action) -> RelocOp {
    RelocOp::new(
        code,
        action,
        0,
        0,
        Access::None,
        Overflow::Truncate,
        SymbolUse::Literal,
        StackUse::Pop,
    )
}

const fn unop(code: u16, action: Action) -> RelocOp {
    RelocOp::new(
        code,
        action,
        0,
        0,
        Access::None,
        Overflow::Truncate,
        SymbolUse::Literal,
        StackUse::Unary,
    )
}

const fn load_field(code: u16, sign: Overflow) -> RelocOp {
    RelocOp::new(code, Action::Val, 0, 0, Access::Read, sign, SymbolUse::Literal, StackUse::Push)
}

const fn store_field(code: u16, sign: Overflow) -> RelocOp {
    RelocOp::new(code, Action::Val, 0, 0, Access::Write, sign, SymbolUse::Literal, StackUse::Pop)
}

const fn push(code: u16, action: Action, sym: SymbolUse) -> RelocOp {
    RelocOp::new(code, action, 0, 0, Access::None, Overflow::Truncate, sym, StackUse::Push)
}

/// The expression operators, in code order.
pub const EXPRESSION_OPS: [RelocOp; 23] = [
    binop(RE_ADD, Action::Plus),
    binop(RE_SUB, Action::Sub),
    unop(RE_NEG, Action::Neg),
    binop(RE_MPY, Action::Mpy),
    binop(RE_DIV, Action::Div),
    binop(RE_MOD, Action::Mod),
    binop(RE_SR, Action::Sr),
    binop(RE_ASR, Action::Asr),
    binop(RE_SL, Action::Sl),
    binop(RE_AND, Action::And),
    binop(RE_OR, Action::Or),
    binop(RE_XOR, Action::Xor),
    unop(RE_NOTB, Action::Not),
    load_field(RE_ULDFLD, Overflow::Unsigned),
    load_field(RE_SLDFLD, Overflow::Signed),
    store_field(RE_USTFLD, Overflow::Unsigned),
    store_field(RE_SSTFLD, Overflow::Signed),
    push(RE_PUSH, Action::Asgn, SymbolUse::Value),
    push(RE_PUSHSK, Action::Asgn, SymbolUse::Literal),
    push(RE_PUSHUK, Action::Asgn, SymbolUse::Literal),
    push(RE_PUSHPC, Action::AsgPc, SymbolUse::Literal),
    push(RE_DUP, Action::Val, SymbolUse::Literal),
    store_field(RE_XSTFLD, Overflow::Either),
];

/// Concatenate a family's own entries with [`EXPRESSION_OPS`].
///
/// Every family code is below `RE_ADD`, so the result stays sorted when the
/// family entries are.
pub const fn with_expressions<const F: usize, const N: usize>(
    family: [RelocOp; F],
) -> [RelocOp; N] {
    assert!(N == F + EXPRESSION_OPS.len());
    let mut out = [EXPRESSION_OPS[0]; N];
    let mut i = 0;
    while i < F {
        out[i] = family[i];
        i += 1;
    }
    let mut j = 0;
    while j < EXPRESSION_OPS.len() {
        out[F + j] = EXPRESSION_OPS[j];
        j += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_matches_documented_layout() {
        let op = RelocOp::new(
            0x52,
            Action::Pcr,
            7,
            21,
            Access::ReadWrite,
            Overflow::Signed,
            SymbolUse::Delta,
            StackUse::None,
        )
        .scale(2);
        assert_eq!(op.action, 7 | 21 << 4 | 3 << 10);
        assert_eq!(op.info, 3 | 1 << 2 | 2 << 4 | 2 << 11);

        let spec = op.decode().unwrap();
        assert_eq!(spec.action, Action::Pcr);
        assert_eq!((spec.posn, spec.width, spec.scale), (7, 21, 2));
        assert_eq!(spec.overflow, Overflow::Signed);
        assert_eq!(spec.symbol, SymbolUse::Delta);
    }

    #[test]
    fn every_action_survives_packing() {
        for (i, action) in Action::ALL.iter().enumerate() {
            let op = RelocOp::new(
                i as u16,
                *action,
                0,
                0,
                Access::None,
                Overflow::Truncate,
                SymbolUse::Literal,
                StackUse::None,
            );
            assert_eq!(op.decode().unwrap().action, *action);
        }
    }

    #[test]
    fn expression_ops_are_sorted() {
        let table = RelocTable {
            ops: &EXPRESSION_OPS,
            ignored: &[],
        };
        assert!(table.is_sorted());
        assert_eq!(EXPRESSION_OPS.last().unwrap().code, RE_XSTFLD);
    }

    #[test]
    fn lookup_distinguishes_ignored_from_unknown() {
        let table = RelocTable {
            ops: &EXPRESSION_OPS,
            ignored: &[0x76],
        };
        assert_eq!(table.lookup(RE_DIV).unwrap().unwrap().action, Action::Div);
        assert_eq!(table.lookup(0x76).unwrap(), None);
        assert_eq!(
            table.lookup(0x1234).unwrap_err(),
            LoadError::BadRelocationType(0x1234)
        );
    }

    #[test]
    fn field_ops_take_geometry_from_record() {
        let table = RelocTable {
            ops: &EXPRESSION_OPS,
            ignored: &[],
        };
        assert!(table.lookup(RE_ULDFLD).unwrap().unwrap().field_from_record());
        assert!(!table.lookup(RE_ADD).unwrap().unwrap().field_from_record());
    }
}
