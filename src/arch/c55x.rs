//! TMS320C55x backend: byte-addressed code, word-addressed data, big-endian.

use object::Endianness;

use super::Architecture;
use crate::cinit::CinitLayout;
use crate::doff::LEAD3_ID;
use crate::reloc::table::{
    with_expressions, Access, Action, Overflow, RelocOp, RelocTable, StackUse, SymbolUse,
    R_ABS, R_RELBYTE, R_RELLONG, R_RELWORD,
};
use crate::units::AuWidth;

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

const FAMILY: [RelocOp; 4] = [
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
];

static OPS: [RelocOp; 27] = with_expressions(FAMILY);

pub static RELOCATIONS: RelocTable = RelocTable {
    ops: &OPS,
    ignored: &[],
};

pub struct C55x;

impl Architecture for C55x {
    fn name(&self) -> &'static str {
        "c55x"
    }

    fn target_id(&self) -> u16 {
        LEAD3_ID
    }

    fn target_au(&self) -> AuWidth {
        AuWidth::Bits8
    }

    fn tdata_au(&self) -> AuWidth {
        AuWidth::Bits16
    }

    fn endianness(&self) -> Option<Endianness> {
        Some(Endianness::Big)
    }

    // Addresses are two data words with the page in the top eight bits.
    fn cinit(&self) -> CinitLayout {
        CinitLayout {
            align: 1,
            count: 1,
            address: 2,
            page_bits: 8,
        }
    }

    fn relocations(&self) -> &'static RelocTable {
        &RELOCATIONS
    }
}
