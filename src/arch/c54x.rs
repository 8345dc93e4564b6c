//! TMS320C54x backend: 16-bit word addressing, big-endian.

use object::Endianness;

use super::Architecture;
use crate::cinit::CinitLayout;
use crate::doff::LEAD_ID;
use crate::reloc::table::{
    with_expressions, Access, Action, Overflow, RelocOp, RelocTable, StackUse, SymbolUse,
    R_ABS, R_RELBYTE, R_RELLONG, R_RELWORD,
};
use crate::units::AuWidth;

/// Low seven bits of a data address (direct addressing).
pub const R_PARTLS7: u16 = 0x28;
/// High nine bits of a data address (data page pointer).
pub const R_PARTMS9: u16 = 0x29;

const fn add(code: u16, width: u8, sign: Overflow) -> RelocOp {
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
    add(R_RELBYTE, 8, Overflow::Either),
    add(R_RELWORD, 16, Overflow::Either),
    add(R_RELLONG, 32, Overflow::Truncate),
    add(R_PARTLS7, 7, Overflow::Truncate),
    add(R_PARTMS9, 9, Overflow::Truncate).scale(7),
];

static OPS: [RelocOp; 29] = with_expressions(FAMILY);

pub static RELOCATIONS: RelocTable = RelocTable {
    ops: &OPS,
    ignored: &[],
};

pub struct C54x;

impl Architecture for C54x {
    fn name(&self) -> &'static str {
        "c54x"
    }

    fn target_id(&self) -> u16 {
        LEAD_ID
    }

    fn target_au(&self) -> AuWidth {
        AuWidth::Bits16
    }

    fn endianness(&self) -> Option<Endianness> {
        Some(Endianness::Big)
    }

    fn cinit(&self) -> CinitLayout {
        CinitLayout {
            align: 1,
            count: 1,
            address: 1,
            page_bits: 0,
        }
    }

    fn relocations(&self) -> &'static RelocTable {
        &RELOCATIONS
    }
}
