//! TMS470 (ARM) backend.

use super::Architecture;
use crate::cinit::CinitLayout;
use crate::doff::TMS470_ID;
use crate::reloc::table::{
    with_expressions, Access, Action, Overflow, RelocOp, RelocTable, StackUse, SymbolUse,
    R_ABS, R_RELBYTE, R_RELLONG, R_RELWORD,
};
use crate::units::AuWidth;

/// ARM `B`/`BL`: 24-bit word displacement.
pub const R_TMS470_PCR24: u16 = 0x16;
/// Thumb `BL` pair: two halfwords carrying 11 bits each.
pub const R_TMS470_PCR23T: u16 = 0x17;

const fn abs(code: u16, width: u8, sign: Overflow) -> RelocOp {
    RelocOp::new(
        code,
        Action::Add,
        0,
        width,
        Access::ReadWrite,
        sign,
        SymbolUse::Delta,
        StackUse::None,
    )
}

const FAMILY: [RelocOp; 6] = [
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
    abs(R_RELBYTE, 8, Overflow::Either),
    abs(R_RELWORD, 16, Overflow::Either),
    abs(R_RELLONG, 32, Overflow::Truncate),
    RelocOp::new(
        R_TMS470_PCR24,
        Action::Pcr,
        0,
        24,
        Access::ReadWrite,
        Overflow::Signed,
        SymbolUse::Delta,
        StackUse::None,
    )
    .big_offset(1)
    .scale(2),
    RelocOp::new(
        R_TMS470_PCR23T,
        Action::Pcr23T,
        0,
        32,
        Access::ReadWrite,
        Overflow::Truncate,
        SymbolUse::Delta,
        StackUse::None,
    ),
];

static OPS: [RelocOp; 29] = with_expressions(FAMILY);

pub static RELOCATIONS: RelocTable = RelocTable {
    ops: &OPS,
    ignored: &[],
};

pub struct Tms470;

impl Architecture for Tms470 {
    fn name(&self) -> &'static str {
        "tms470"
    }

    fn target_id(&self) -> u16 {
        TMS470_ID
    }

    fn target_au(&self) -> AuWidth {
        AuWidth::Bits8
    }

    fn cinit(&self) -> CinitLayout {
        CinitLayout {
            align: 4,
            count: 4,
            address: 4,
            page_bits: 0,
        }
    }

    fn relocations(&self) -> &'static RelocTable {
        &RELOCATIONS
    }
}
