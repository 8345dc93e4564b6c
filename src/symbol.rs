//! Symbol binding.
//!
//! Turns the module's symbol table into the values relocations use, once
//! every allocated section has been placed. Undefined symbols are resolved
//! against the host's global table, and external definitions are published
//! back to it.

use crate::arch::HostProfile;
use crate::doff::{SymbolEntry, DN_EXT, DN_EXTLAB, DN_UNDEF};
use crate::error::{LoadError, Result};
use crate::host::HostSyms;
use crate::strings::StringTable;

/// Where a section ended up, relative to where it was linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Run address recorded in the file.
    pub linked_run_addr: u32,
    /// Run address after allocation.
    pub run_addr: u32,
    /// Load address after allocation.
    pub load_addr: u32,
}

impl Placement {
    /// A section left where it was linked.
    pub fn unmoved(run_addr: u32, load_addr: u32) -> Self {
        Self {
            linked_run_addr: run_addr,
            run_addr,
            load_addr,
        }
    }

    pub fn delta(&self) -> i32 {
        self.run_addr.wrapping_sub(self.linked_run_addr) as i32
    }
}

/// A symbol with its final value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSymbol {
    pub name: String,
    /// Final value.
    pub value: i32,
    /// Final value minus the value recorded in the file.
    pub delta: i32,
    /// 1-based section number, or `DN_UNDEF` / `DN_ABS`.
    pub section: i16,
    /// Run address of the defining section, when there is one.
    pub section_run_addr: Option<u32>,
}

impl BoundSymbol {
    pub fn is_absolute(&self) -> bool {
        self.section_run_addr.is_none()
    }
}

/// Bind every entry of `entries`.
///
/// `placements` is indexed by section number minus one. Names are read the
/// way `host` sees the string table.
pub fn bind_symbols<H: HostSyms + ?Sized>(
    entries: &[SymbolEntry],
    strings: &StringTable,
    placements: &[Placement],
    host: &HostProfile,
    syms: &mut H,
) -> Result<Vec<BoundSymbol>> {
    let mut bound = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = String::from_utf8_lossy(&strings.name(entry.name_offset, host)?).into_owned();
        let sym = match entry.section {
            DN_UNDEF => {
                let value = syms
                    .find_symbol(&name)
                    .ok_or_else(|| LoadError::UndefinedSymbol(name.clone()))?;
                BoundSymbol {
                    delta: value.wrapping_sub(entry.value),
                    value,
                    section: entry.section,
                    section_run_addr: None,
                    name,
                }
            }
            n if n > 0 => {
                let placed = placements
                    .get(n as usize - 1)
                    .ok_or_else(|| LoadError::BadSymbolSection {
                        symbol: name.clone(),
                        section: n,
                    })?;
                BoundSymbol {
                    value: entry.value.wrapping_add(placed.delta()),
                    delta: placed.delta(),
                    section: n,
                    section_run_addr: Some(placed.run_addr),
                    name,
                }
            }
            // DN_ABS and the debugger-only negative section numbers.
            _ => BoundSymbol {
                value: entry.value,
                delta: 0,
                section: entry.section,
                section_run_addr: None,
                name,
            },
        };

        let external = matches!(entry.storage_class, DN_EXT | DN_EXTLAB);
        if external && entry.section != DN_UNDEF {
            syms.define_symbol(&sym.name, sym.value);
        }
        tracing::trace!("bound {} = {:#x}", sym.name, sym.value);
        bound.push(sym);
    }
    Ok(bound)
}

/// Whether `section` is a real section number rather than a sentinel.
pub fn is_section_relative(section: i16) -> bool {
    section > 0
}
