//! Relocation evaluation.
//!
//! Each relocation record names an entry in the target's table. The entry
//! decides where the operand comes from, whether a bit-field of the image is
//! read and written, which arithmetic is performed, and how the expression
//! stack is used. Records are applied in order against one image packet.

pub mod field;
pub mod stack;
pub mod table;

use crate::doff::{RelocRecord, SYMNDX_CURRENT_SECTION};
use crate::error::{FieldError, LoadError, Result};
use crate::symbol::BoundSymbol;
use crate::units::AuWidth;

use field::{AuView, Field};
use stack::ValueStack;
use table::{Access, Action, OpSpec, RelocTable, StackUse, SymbolUse};

/// C6000 load/store scale by the opcode's size bits.
const C60_SCALE: [u32; 8] = [1, 0, 0, 0, 1, 1, 2, 2];
/// Bits below the 15-bit displacement of a C6000 load/store.
const C60_SCALE_BITS: u32 = 4;
const C60_SCALE_MASK: i32 = 0x7;

/// Range of a Thumb long branch displacement.
const THUMB_BL_MIN: i32 = -(1 << 22);
const THUMB_BL_MAX: i32 = (1 << 22) - 1;

/// The operand word of a relocation record, as its table entry reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocOperand {
    /// Field geometry for the field load/store operators.
    Field { offset: u8, fieldsz: u8, wordsz: u8 },
    /// Image-packet relative PC.
    Pc(u32),
    Literal(i32),
    /// Symbol table index, or `-1` for the section being relocated.
    Symbol(i32),
}

impl RelocOperand {
    pub fn decode(rec: &RelocRecord, spec: &OpSpec) -> Self {
        if spec.field_from_record() {
            RelocOperand::Field {
                offset: rec.operand as u8,
                fieldsz: (rec.operand >> 8) as u8,
                wordsz: (rec.operand >> 16) as u8,
            }
        } else if spec.symbol != SymbolUse::Literal {
            RelocOperand::Symbol(rec.operand as i32)
        } else if spec.action == Action::AsgPc {
            RelocOperand::Pc(rec.operand)
        } else {
            RelocOperand::Literal(rec.operand as i32)
        }
    }
}

/// Where the relocations being applied live.
#[derive(Debug, Clone, Copy)]
pub struct RelocContext<'a> {
    pub section_name: &'a str,
    /// Run address of the section being relocated.
    pub run_addr: u32,
    /// Target AUs of the section that precede the current packet.
    pub image_offset: u32,
    /// How far the section moved from its link-time run address.
    pub delta_runaddr: i32,
    /// Target byte order.
    pub big_endian: bool,
    pub symbols: &'a [BoundSymbol],
    /// Run address of the global `.bss`, for C6000 base-relative addressing.
    pub bss_base: Option<i32>,
}

/// Applies relocation records using one target's table.
#[derive(Debug)]
pub struct Relocator {
    table: &'static RelocTable,
    target_au: AuWidth,
    stack: ValueStack,
}

impl Relocator {
    pub fn new(table: &'static RelocTable, target_au: AuWidth) -> Self {
        Self {
            table,
            target_au,
            stack: ValueStack::new(),
        }
    }

    /// Forget any expression state; called at each section boundary.
    pub fn reset(&mut self) {
        self.stack.clear();
    }

    pub fn stack(&self) -> &ValueStack {
        &self.stack
    }

    /// Apply one record to `image`, the current packet viewed as target AUs.
    pub fn apply(
        &mut self,
        rec: &RelocRecord,
        image: &mut AuView<'_>,
        ctx: &RelocContext<'_>,
    ) -> Result<()> {
        let Some(spec) = self.table.lookup(rec.reloc_type)? else {
            tracing::trace!("ignoring relocation type {:#x}", rec.reloc_type);
            return Ok(());
        };
        let operand = RelocOperand::decode(rec, &spec);
        tracing::trace!(
            "reloc {:#x} at {:#x}: {:?} {:?}",
            rec.reloc_type,
            rec.vaddr,
            spec.action,
            operand
        );

        let field_err = |source: FieldError| LoadError::Field {
            section: ctx.section_name.to_string(),
            offset: rec.vaddr,
            source,
        };

        // Base amount.
        let mut amt = rec.operand as i32;
        let mut symbol = None;
        if let RelocOperand::Symbol(ndx) = operand {
            let delta = spec.symbol == SymbolUse::Delta;
            if ndx == SYMNDX_CURRENT_SECTION {
                amt = if delta {
                    ctx.delta_runaddr
                } else {
                    ctx.run_addr as i32
                };
            } else {
                let sym = usize::try_from(ndx)
                    .ok()
                    .and_then(|i| ctx.symbols.get(i))
                    .ok_or(LoadError::BadSymbolIndex(ndx))?;
                amt = if delta { sym.delta } else { sym.value };
                symbol = Some(sym);
            }
        }

        // Current value from the stack.
        let mut val = match spec.stack {
            StackUse::None => 0,
            StackUse::Push => {
                self.stack.ensure_room()?;
                self.stack.top().unwrap_or(0)
            }
            StackUse::Unary => self.stack.top()?,
            StackUse::Pop => self.stack.pop()?,
        };

        // Field geometry.
        let mut field = None;
        if spec.access != Access::None {
            let vaddr = rec.vaddr as usize;
            let f = if spec.width != 0 {
                let skip = if ctx.big_endian { spec.big_offset as usize } else { 0 };
                Field {
                    au: vaddr + skip,
                    offset: spec.posn,
                    width: spec.width,
                }
            } else if let RelocOperand::Field {
                offset,
                fieldsz,
                wordsz,
            } = operand
            {
                let (offset, width, word) =
                    (u32::from(offset), u32::from(fieldsz), u32::from(wordsz));
                let mut au = vaddr;
                if ctx.big_endian {
                    let spare = word
                        .checked_sub(offset + width)
                        .ok_or(field_err(FieldError::BadGeometry { width, offset }))?;
                    au += (spare >> self.target_au.log2_bits()) as usize;
                }
                Field { au, offset, width }
            } else {
                return Err(LoadError::BadRelocationType(rec.reloc_type));
            };
            if spec.access.reads() {
                val = field::unpack(image, f, ctx.big_endian, spec.overflow).map_err(field_err)?;
                val = val.wrapping_shl(spec.scale);
            }
            field = Some(f);
        }

        let mut scale = spec.scale;
        let mut overflow = None;
        match spec.action {
            Action::Val => {}
            Action::Asgn => val = amt,
            Action::Add => val = val.wrapping_add(amt),
            Action::Pcr => val = val.wrapping_add(amt.wrapping_sub(ctx.delta_runaddr)),
            Action::AddDisp => {
                if operand == RelocOperand::Symbol(SYMNDX_CURRENT_SECTION) {
                    amt = 0;
                }
                val = val.wrapping_add(amt).wrapping_add(i32::from(rec.disp));
            }
            Action::AsgPc => {
                val = ctx
                    .run_addr
                    .wrapping_add(ctx.image_offset)
                    .wrapping_add(amt as u32) as i32
            }
            Action::Neg => val = val.wrapping_neg(),
            Action::Not => val = !val,
            action if action.is_binary() => {
                let lhs = self.stack.top()?;
                val = binary(action, lhs, val)?;
            }
            Action::C6Sect | Action::C6Base | Action::C6Dspl => {
                if spec.action == Action::C6Sect {
                    let sym = symbol.ok_or(LoadError::BadSymbolIndex(rec.operand as i32))?;
                    amt = sym.section_run_addr.ok_or_else(|| LoadError::BadSymbolSection {
                        symbol: sym.name.clone(),
                        section: sym.section,
                    })? as i32;
                }
                if spec.action != Action::C6Dspl {
                    let base = ctx
                        .bss_base
                        .ok_or_else(|| LoadError::MissingBssBase(ctx.section_name.to_string()))?;
                    amt = amt.wrapping_sub(base);
                }
                scale = C60_SCALE[(val & C60_SCALE_MASK) as usize];
                if let Some(f) = field.as_mut() {
                    f.offset += C60_SCALE_BITS;
                    f.width -= C60_SCALE_BITS;
                }
                val = (val >> C60_SCALE_BITS).wrapping_shl(scale).wrapping_add(amt);
                if val & ((1 << scale) - 1) != 0 {
                    return Err(LoadError::UnalignedReference {
                        section: ctx.section_name.to_string(),
                        offset: rec.vaddr,
                    });
                }
            }
            Action::Pcr23T => {
                let (v, disp) = thumb_branch(val as u32, ctx.big_endian, amt, ctx.delta_runaddr);
                if !(THUMB_BL_MIN..=THUMB_BL_MAX).contains(&disp) {
                    overflow = Some(FieldError::Overflow {
                        value: disp,
                        width: 23,
                    });
                }
                val = v as i32;
            }
            _ => return Err(LoadError::BadRelocationType(rec.reloc_type)),
        }

        match field {
            Some(f) if spec.access.writes() => {
                val >>= scale;
                field::repack(image, f, ctx.big_endian, spec.overflow, val).map_err(field_err)?;
            }
            _ => match spec.stack {
                StackUse::None => {}
                StackUse::Push => self.stack.push(val)?,
                StackUse::Unary | StackUse::Pop => {
                    if !self.stack.is_empty() {
                        self.stack.replace_top(val)?;
                    }
                }
            },
        }

        match overflow {
            Some(e) => Err(field_err(e)),
            None => Ok(()),
        }
    }
}

fn binary(action: Action, lhs: i32, rhs: i32) -> Result<i32> {
    let shift = rhs as u32;
    Ok(match action {
        Action::Plus => lhs.wrapping_add(rhs),
        Action::Sub => lhs.wrapping_sub(rhs),
        Action::Mpy => lhs.wrapping_mul(rhs),
        Action::Div if rhs == 0 => return Err(LoadError::DivideByZero),
        Action::Div => lhs.wrapping_div(rhs),
        Action::Mod if rhs == 0 => return Err(LoadError::DivideByZero),
        Action::Mod => lhs.wrapping_rem(rhs),
        Action::Sr if shift >= 32 => 0,
        Action::Sr => ((lhs as u32) >> shift) as i32,
        Action::Asr => lhs >> shift.min(31),
        Action::Sl if shift >= 32 => 0,
        Action::Sl => lhs << shift,
        Action::And => lhs & rhs,
        Action::Or => lhs | rhs,
        Action::Xor => lhs ^ rhs,
        _ => lhs,
    })
}

/// Relocate a Thumb `BL` pair held in `word` and return the new pair and
/// the new displacement.
fn thumb_branch(word: u32, big_endian: bool, amt: i32, delta_runaddr: i32) -> (u32, i32) {
    let (first, second) = if big_endian {
        (word >> 16, word & 0xFFFF)
    } else {
        (word & 0xFFFF, word >> 16)
    };
    let raw = ((first & 0x7FF) << 12) | ((second & 0x7FF) << 1);
    let disp = ((raw << 9) as i32) >> 9;
    let disp = disp.wrapping_add(amt).wrapping_sub(delta_runaddr);

    let first = (first & !0x7FF) | ((disp as u32 >> 12) & 0x7FF);
    let second = (second & !0x7FF) | ((disp as u32 >> 1) & 0x7FF);
    let word = if big_endian {
        (first << 16) | second
    } else {
        (second << 16) | first
    };
    (word, disp)
}
