//! TMS320C6000 backend.
//!
//! Byte-addressed, either byte order. Instructions are 32-bit words whose
//! relocatable fields sit at fixed bit positions; on a big-endian target the
//! table's big offset skips to the AU holding the field's low bits.

use super::Architecture;
use crate::cinit::CinitLayout;
use crate::doff::TMS32060_ID;
use crate::reloc::table::{
    with_expressions, Access, Action, Overflow, RelocOp, RelocTable, StackUse, SymbolUse,
    R_ABS, R_RELBYTE, R_RELLONG, R_RELWORD,
};
use crate::units::AuWidth;

pub const R_C60BASE: u16 = 0x50;
pub const R_C60DIR15: u16 = 0x51;
pub const R_C60PCR21: u16 = 0x52;
pub const R_C60PCR10: u16 = 0x53;
pub const R_C60LO16: u16 = 0x54;
pub const R_C60HI16: u16 = 0x55;
pub const R_C60SECT: u16 = 0x56;
pub const R_C60S16: u16 = 0x57;
pub const R_C60ALIGN: u16 = 0x76;
pub const R_C60FPHEAD: u16 = 0x77;
pub const R_C60NOCMP: u16 = 0x78;

const fn rw(
    code: u16,
    action: Action,
    posn: u8,
    width: u8,
    sign: Overflow,
    sym: SymbolUse,
) -> RelocOp {
    RelocOp::new(code, action, posn, width, Access::ReadWrite, sign, sym, StackUse::None)
        .big_offset((32 - posn - width) / 8)
}

const FAMILY: [RelocOp; 12] = [
    RelocOp::new(
        R_ABS,
        Action::Val,
        0,
        0,
        Access::None,
        Overflow::Truncate,
        SymbolUse::Literal,
        StackUse::None,
    ),
    RelocOp::new(
        R_RELBYTE,
        Action::Add,
        0,
        8,
        Access::ReadWrite,
        Overflow::Either,
        SymbolUse::Delta,
        StackUse::None,
    ),
    RelocOp::new(
        R_RELWORD,
        Action::Add,
        0,
        16,
        Access::ReadWrite,
        Overflow::Either,
        SymbolUse::Delta,
        StackUse::None,
    ),
    rw(R_RELLONG, Action::Add, 0, 32, Overflow::Truncate, SymbolUse::Delta),
    rw(R_C60BASE, Action::C6Base, 4, 19, Overflow::Unsigned, SymbolUse::Value),
    rw(R_C60DIR15, Action::C6Dspl, 4, 19, Overflow::Unsigned, SymbolUse::Value),
    rw(R_C60PCR21, Action::Pcr, 7, 21, Overflow::Signed, SymbolUse::Delta).scale(2),
    rw(R_C60PCR10, Action::Pcr, 13, 10, Overflow::Signed, SymbolUse::Delta).scale(2),
    rw(R_C60LO16, Action::Add, 7, 16, Overflow::Truncate, SymbolUse::Delta),
    rw(R_C60HI16, Action::AddDisp, 7, 16, Overflow::Truncate, SymbolUse::Delta).scale(16),
    rw(R_C60SECT, Action::C6Sect, 4, 19, Overflow::Unsigned, SymbolUse::Value),
    rw(R_C60S16, Action::Add, 7, 16, Overflow::Signed, SymbolUse::Delta),
];

static OPS: [RelocOp; 35] = with_expressions(FAMILY);

pub static RELOCATIONS: RelocTable = RelocTable {
    ops: &OPS,
    ignored: &[R_C60ALIGN, R_C60FPHEAD, R_C60NOCMP],
};

pub struct C6000;

impl Architecture for C6000 {
    fn name(&self) -> &'static str {
        "c6000"
    }

    fn target_id(&self) -> u16 {
        TMS32060_ID
    }

    fn target_au(&self) -> AuWidth {
        AuWidth::Bits8
    }

    fn cinit(&self) -> CinitLayout {
        CinitLayout {
            align: 8,
            count: 4,
            address: 4,
            page_bits: 0,
        }
    }

    fn relocations(&self) -> &'static RelocTable {
        &RELOCATIONS
    }
}
