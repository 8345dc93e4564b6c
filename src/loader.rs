//! Loading a module into target memory.
//!
//! This is the dynamic-load path proper: place every allocated section,
//! bind symbols against the placement, stream each downloaded section with
//! its relocations applied, expand `.cinit` tables, clear `.bss` and
//! relocate the entry point.

use crate::cinit::CinitMachine;
use crate::doff::{RelocRecord, IMAGE_PACKET_SIZE};
use crate::error::{LoadError, Result};
use crate::host::HostSyms;
use crate::module::Module;
use crate::reloc::field::AuView;
use crate::reloc::{RelocContext, Relocator};
use crate::section::{SectionInfo, SectionType};
use crate::stream::Stream;
use crate::symbol::{bind_symbols, is_section_relative, BoundSymbol, Placement};
use crate::target::{TargetAllocator, TargetInitializer};
use crate::utils::doff_align;

/// Name of the symbol C6000 base-relative addressing is measured from.
const BSS_BASE_SYMBOL: &str = ".bss";

/// What a successful load leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImage {
    /// Every section, with allocated ones at their placed addresses.
    pub sections: Vec<SectionInfo>,
    /// Section count shifted left once, low bit set for big-endian targets.
    pub secn_count: u32,
    pub entry_point: u32,
    pub timestamp: u32,
    pub symbols: Vec<BoundSymbol>,
}

impl ModuleImage {
    pub fn section_count(&self) -> usize {
        (self.secn_count >> 1) as usize
    }

    pub fn is_big_endian(&self) -> bool {
        self.secn_count & 1 != 0
    }

    pub fn section(&self, name: &str) -> Option<&SectionInfo> {
        self.sections.iter().find(|s| s.name == name)
    }
}

impl<S: Stream, H: HostSyms> Module<S, H> {
    /// Load the module through `alloc` and `init`.
    ///
    /// On failure every placement made so far is handed back to `alloc`.
    pub fn load<A, I>(&mut self, alloc: &mut A, init: &mut I) -> Result<ModuleImage>
    where
        A: TargetAllocator + ?Sized,
        I: TargetInitializer + ?Sized,
    {
        let mut sections: Vec<SectionInfo> = self.sections().collect();
        let mut placed = Vec::new();
        let result = self.load_sections(&mut sections, &mut placed, alloc, init);
        if result.is_err() {
            for &i in placed.iter().rev() {
                alloc.deallocate(&sections[i]);
            }
        }
        match result {
            Ok((entry_point, symbols)) => {
                tracing::debug!(
                    "loaded {} sections, entry point {:#x}",
                    placed.len(),
                    entry_point
                );
                Ok(ModuleImage {
                    secn_count: ((sections.len() as u32) << 1) | u32::from(self.big_endian),
                    sections,
                    entry_point,
                    timestamp: self.timestamp(),
                    symbols,
                })
            }
            Err(e) => Err(self.record(e)),
        }
    }

    fn load_sections<A, I>(
        &mut self,
        sections: &mut [SectionInfo],
        placed: &mut Vec<usize>,
        alloc: &mut A,
        init: &mut I,
    ) -> Result<(u32, Vec<BoundSymbol>)>
    where
        A: TargetAllocator + ?Sized,
        I: TargetInitializer + ?Sized,
    {
        let mut placements = Vec::with_capacity(sections.len());
        for (i, info) in sections.iter_mut().enumerate() {
            let linked = Placement::unmoved(info.run_addr, info.load_addr);
            if !info.flags.is_allocated() {
                placements.push(linked);
                continue;
            }
            let align = info.flags.alignment();
            if !alloc.allocate(info, align) {
                return Err(LoadError::TargetAllocationFailed(info.name.clone()));
            }
            placed.push(i);
            tracing::debug!(
                "placed {} at {:#x} (linked at {:#x})",
                info.name,
                info.run_addr,
                linked.run_addr
            );
            placements.push(Placement {
                run_addr: info.run_addr,
                load_addr: info.load_addr,
                ..linked
            });
        }

        let strings = self
            .strings
            .as_ref()
            .ok_or(LoadError::BadStringTableOffset(0))?;
        let symbols = bind_symbols(
            &self.symbols,
            strings,
            &placements,
            &self.profile.host,
            &mut self.syms,
        )?;
        let bss_base = symbols
            .iter()
            .find(|s| s.name == BSS_BASE_SYMBOL)
            .map(|s| s.value)
            .or_else(|| self.syms.find_symbol(BSS_BASE_SYMBOL));

        let reserved = self.reserve(IMAGE_PACKET_SIZE as usize)?;
        let mut relocator = Relocator::new(self.profile.relocations, self.profile.units.target());
        let mut result = Ok(());
        for (info, placement) in sections.iter().zip(&placements) {
            if info.flags.is_downloaded() {
                result = self.download(info, placement, &symbols, bss_base, &mut relocator, init);
            } else if info.section_type() == SectionType::Bss && info.flags.is_allocated() {
                result = clear(info, init);
            }
            if result.is_err() {
                break;
            }
        }
        self.syms.deallocate(reserved);
        result?;

        let header = *self.header();
        let entry_point = if is_section_relative(header.entry_secn) {
            let delta = placements
                .get(header.entry_secn as usize - 1)
                .map(Placement::delta)
                .ok_or_else(|| LoadError::BadSymbolSection {
                    symbol: "entry point".to_string(),
                    section: header.entry_secn,
                })?;
            header.entry_point.wrapping_add(delta as u32)
        } else {
            header.entry_point
        };
        Ok((entry_point, symbols))
    }

    fn download<I: TargetInitializer + ?Sized>(
        &mut self,
        info: &SectionInfo,
        placement: &Placement,
        symbols: &[BoundSymbol],
        bss_base: Option<i32>,
        relocator: &mut Relocator,
        init: &mut I,
    ) -> Result<()> {
        let units = self.profile.units;
        let host = self.profile.host_order();
        let mut cinit = (info.section_type() == SectionType::Cinit)
            .then(|| CinitMachine::new(self.profile.cinit, units, self.big_endian, host));

        self.seek(doff_align(info.context))?;
        relocator.reset();
        let mut data = vec![0u8; IMAGE_PACKET_SIZE as usize];
        let mut relocs: Vec<RelocRecord> = Vec::new();
        let mut image_offset = 0u32;
        for n in 0..info.packet_count.max(0) {
            let (header, size) = self.read_packet(&mut data, &mut relocs)?;
            let packet = &mut data[..size];
            if !relocs.is_empty() {
                let ctx = RelocContext {
                    section_name: &info.name,
                    run_addr: placement.run_addr,
                    image_offset,
                    delta_runaddr: placement.delta(),
                    big_endian: self.big_endian,
                    symbols,
                    bss_base,
                };
                let mut view = AuView::new(packet, units.target(), host);
                for rec in &relocs {
                    relocator.apply(rec, &mut view, &ctx)?;
                }
            }
            tracing::trace!(
                "{}: packet {} ({} bytes, {} relocations)",
                info.name,
                n,
                header.packet_size,
                relocs.len()
            );

            let used = &data[..header.packet_size as usize];
            match cinit.as_mut() {
                Some(machine) => machine.feed(used, init)?,
                None => {
                    let addr = placement.load_addr.wrapping_add(image_offset);
                    if !init.write_memory(addr, info.page, used) {
                        return Err(LoadError::TargetWriteFailed {
                            addr,
                            len: used.len(),
                        });
                    }
                }
            }
            image_offset += units.byte_to_taddr(header.packet_size as u32);
        }
        Ok(())
    }
}

fn clear<I: TargetInitializer + ?Sized>(info: &SectionInfo, init: &mut I) -> Result<()> {
    tracing::debug!("clearing {} ({} AUs)", info.name, info.size);
    if init.fill_memory(info.load_addr, info.page, info.size, 0) {
        Ok(())
    } else {
        Err(LoadError::TargetWriteFailed {
            addr: info.load_addr,
            len: info.size as usize,
        })
    }
}
