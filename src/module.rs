//! Opening a DOFF module.
//!
//! [`Loader`] gathers the collaborators and options, and [`Loader::open`]
//! reads and validates everything up to the image packets: file header,
//! verify record, string table, section records and symbol table. The
//! resulting [`Module`] owns those buffers until it is closed or dropped.
//!
//! A failed open never returns a handle. Every buffer reserved along the way
//! is handed back to the host before the error is returned.

use std::borrow::Cow;
use std::mem::size_of;
use std::ops::Range;

use crate::arch::{LoadOptions, TargetProfile};
use crate::checksum::{checksum, checksum_reordered, is_intact, ReorderMap};
use crate::doff::{
    FileHeader, SectionRecord, SymbolEntry, VerifyRecord, BYTE_RESHUFFLE_VALUE, DOFF0,
    MAX_REASONABLE_SECTIONS, MAX_REASONABLE_STRINGTAB, MAX_REASONABLE_SYMBOLS,
};
use crate::error::{LoadError, Result};
use crate::host::HostSyms;
use crate::section::SectionInfo;
use crate::stream::Stream;
use crate::strings::{ExpandedNames, StringTable};
use crate::units::AuWidth;
use crate::utils::doff_align;

/// Builder for [`Module`].
#[derive(Debug)]
pub struct Loader<S, H> {
    profile: TargetProfile,
    options: LoadOptions,
    stream: Option<S>,
    syms: Option<H>,
}

impl<S: Stream, H: HostSyms> Loader<S, H> {
    pub fn new(profile: TargetProfile) -> Self {
        Self {
            profile,
            options: LoadOptions::default(),
            stream: None,
            syms: None,
        }
    }

    pub fn stream(mut self, stream: S) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn syms(mut self, syms: H) -> Self {
        self.syms = Some(syms);
        self
    }

    pub fn options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Read and validate the module headers.
    pub fn open(self) -> Result<Module<S, H>> {
        let Some(mut syms) = self.syms else {
            return Err(LoadError::MissingCollaborator("host symbol services"));
        };
        let Some(stream) = self.stream else {
            let e = LoadError::MissingCollaborator("input stream");
            syms.report_error(&e);
            return Err(e);
        };

        let handle = size_of::<Module<S, H>>();
        if !syms.allocate(handle) {
            let e = LoadError::AllocationFailure(handle);
            syms.report_error(&e);
            return Err(e);
        }

        let mut module = Module {
            stream,
            syms,
            profile: self.profile,
            options: self.options,
            header: FileHeader::default(),
            verify: VerifyRecord::default(),
            reorder: None,
            big_endian: false,
            strings: None,
            records: Vec::new(),
            names: SectionNames::Borrowed(Vec::new()),
            symbols: Vec::new(),
            reserved: Reservations {
                handle: Some(handle),
                ..Reservations::default()
            },
            errors: 0,
        };

        match module.read_headers() {
            Ok(()) => {
                tracing::debug!(
                    "opened {:?}: {} sections, {} symbols, {} endian",
                    String::from_utf8_lossy(&module.file_name()),
                    module.records.len(),
                    module.symbols.len(),
                    if module.big_endian { "big" } else { "little" }
                );
                Ok(module)
            }
            Err(e) => Err(module.record(e)),
        }
    }
}

/// Host reservations held by an open module, in release order.
#[derive(Debug, Default)]
struct Reservations {
    strings: Option<usize>,
    sections: Option<usize>,
    names: Option<usize>,
    symbols: Option<usize>,
    handle: Option<usize>,
}

/// Section names, either ranges into the string table or expanded copies.
#[derive(Debug)]
enum SectionNames {
    Borrowed(Vec<Range<usize>>),
    Expanded(ExpandedNames),
}

/// An open DOFF module.
#[derive(Debug)]
pub struct Module<S: Stream, H: HostSyms> {
    pub(crate) stream: S,
    pub(crate) syms: H,
    pub(crate) profile: TargetProfile,
    options: LoadOptions,
    header: FileHeader,
    verify: VerifyRecord,
    pub(crate) reorder: Option<ReorderMap>,
    pub(crate) big_endian: bool,
    pub(crate) strings: Option<StringTable>,
    pub(crate) records: Vec<SectionRecord>,
    names: SectionNames,
    pub(crate) symbols: Vec<SymbolEntry>,
    reserved: Reservations,
    errors: usize,
}

impl<S: Stream, H: HostSyms> Module<S, H> {
    /// Count `e`, hand it to the host, and pass it back for propagation.
    pub(crate) fn record(&mut self, e: LoadError) -> LoadError {
        self.errors += 1;
        self.syms.report_error(&e);
        e
    }

    /// Reserve `bytes` of host memory.
    pub(crate) fn reserve(&mut self, bytes: usize) -> Result<usize> {
        if self.syms.allocate(bytes) {
            Ok(bytes)
        } else {
            Err(LoadError::AllocationFailure(bytes))
        }
    }

    pub(crate) fn seek(&mut self, pos: u32) -> Result<()> {
        if self.stream.set_file_position(pos) {
            Ok(())
        } else {
            Err(LoadError::SeekFailure(pos))
        }
    }

    pub(crate) fn read_exact(&mut self, buf: &mut [u8], what: &'static str) -> Result<()> {
        let got = self.stream.read_buffer(buf);
        if got == buf.len() {
            Ok(())
        } else {
            Err(LoadError::ShortRead {
                what,
                wanted: buf.len(),
                got,
            })
        }
    }

    fn read_headers(&mut self) -> Result<()> {
        let host = self.profile.host_order();

        let mut raw = [0u8; FileHeader::SIZE];
        self.read_exact(&mut raw, "file header")?;
        let marker = FileHeader::parse(&raw, host).byte_reshuffle;
        let map = ReorderMap::from_marker(marker);
        if !map.is_identity() {
            if !map.is_plausible() {
                return Err(LoadError::BadByteOrder(marker));
            }
            map.apply(&mut raw, host);
            self.reorder = Some(map);
        }
        let header = FileHeader::parse(&raw, host);
        if header.byte_reshuffle != BYTE_RESHUFFLE_VALUE {
            return Err(LoadError::BadByteOrder(marker));
        }
        if !is_intact(checksum(&raw, host)) {
            return Err(LoadError::ChecksumFailure("file header"));
        }
        self.header = header;

        let mut raw = [0u8; VerifyRecord::SIZE];
        self.read_exact(&mut raw, "verify record")?;
        self.reorder_in_place(&mut raw);
        if !is_intact(checksum(&raw, host)) {
            return Err(LoadError::ChecksumFailure("verify record"));
        }
        self.verify = VerifyRecord::parse(&raw, host);

        self.check_header()?;
        self.read_strings()?;
        self.seek(self.section_table_offset())?;
        self.read_sections()?;
        self.read_symbols()?;
        self.resolve_names()
    }

    fn check_header(&mut self) -> Result<()> {
        let h = self.header;
        if h.doff_version != DOFF0 {
            return Err(LoadError::UnsupportedVersion(h.doff_version));
        }
        if h.target_id != self.profile.target_id {
            return Err(LoadError::BadTargetId {
                found: h.target_id,
                expected: self.profile.target_id,
            });
        }
        let limits = [
            ("section count", u32::from(h.no_scns), MAX_REASONABLE_SECTIONS),
            ("string table size", h.strtab_size, MAX_REASONABLE_STRINGTAB),
            ("symbol count", u32::from(h.no_syms), MAX_REASONABLE_SYMBOLS),
        ];
        for (what, value, limit) in limits {
            if value > limit {
                return Err(LoadError::Implausible { what, value, limit });
            }
        }

        let declared = h.big_endian_target();
        let required = self.profile.big_endian.or(self.options.big_endian);
        if let (Some(fixed), Some(asked)) = (self.profile.big_endian, self.options.big_endian) {
            if fixed != asked {
                return Err(LoadError::EndiannessMismatch);
            }
        }
        self.big_endian = match (required, declared) {
            (Some(r), Some(d)) if r != d => return Err(LoadError::EndiannessMismatch),
            (Some(r), _) => r,
            (None, Some(d)) => d,
            (None, None) => false,
        };
        Ok(())
    }

    fn read_strings(&mut self) -> Result<()> {
        let size = doff_align(self.header.strtab_size) as usize;
        self.reserved.strings = Some(self.reserve(size)?);
        let mut data = vec![0u8; size];
        self.read_exact(&mut data, "string table")?;
        let sum = checksum_reordered(&data, self.profile.host_order(), self.reorder)
            .wrapping_add(self.verify.str_tab_checksum);
        if !is_intact(sum) {
            return Err(LoadError::ChecksumFailure("string table"));
        }
        self.strings = Some(StringTable::new(data, self.header.scn_name_size));
        Ok(())
    }

    fn read_sections(&mut self) -> Result<()> {
        let count = usize::from(self.header.no_scns);
        self.reserved.sections = Some(self.reserve(count * size_of::<SectionRecord>())?);
        let raw = self.read_table(count * SectionRecord::SIZE, "section headers")?;
        let host = self.profile.host_order();
        if !is_intact(checksum(&raw, host).wrapping_add(self.verify.scn_rec_checksum)) {
            return Err(LoadError::ChecksumFailure("section headers"));
        }
        self.records = raw
            .chunks_exact(SectionRecord::SIZE)
            .map(|c| SectionRecord::parse(c, host))
            .collect();
        Ok(())
    }

    fn read_symbols(&mut self) -> Result<()> {
        let count = usize::from(self.header.no_syms);
        self.reserved.symbols = Some(self.reserve(count * size_of::<SymbolEntry>())?);
        let raw = self.read_table(count * SymbolEntry::SIZE, "symbol table")?;
        let host = self.profile.host_order();
        if !is_intact(checksum(&raw, host).wrapping_add(self.verify.sym_tab_checksum)) {
            return Err(LoadError::ChecksumFailure("symbol table"));
        }
        self.symbols = raw
            .chunks_exact(SymbolEntry::SIZE)
            .map(|c| SymbolEntry::parse(c, host))
            .collect();
        Ok(())
    }

    /// Read `len` bytes of a record table and reorder them.
    fn read_table(&mut self, len: usize, what: &'static str) -> Result<Vec<u8>> {
        let mut raw = vec![0u8; len];
        self.read_exact(&mut raw, what)?;
        self.reorder_in_place(&mut raw);
        Ok(raw)
    }

    pub(crate) fn reorder_in_place(&self, data: &mut [u8]) {
        if let Some(map) = self.reorder {
            map.apply(data, self.profile.host_order());
        }
    }

    fn resolve_names(&mut self) -> Result<()> {
        let strings = self
            .strings
            .as_ref()
            .ok_or(LoadError::BadStringTableOffset(0))?;
        self.names = match self.profile.units.host() {
            AuWidth::Bits8 => SectionNames::Borrowed(
                self.records
                    .iter()
                    .map(|r| strings.section_name(r.name_offset))
                    .collect::<Result<_>>()?,
            ),
            _ => {
                let size =
                    ExpandedNames::buffer_size(self.header.max_str_len, self.header.no_scns);
                if !self.syms.allocate(size) {
                    return Err(LoadError::AllocationFailure(size));
                }
                self.reserved.names = Some(size);
                SectionNames::Expanded(ExpandedNames::build(
                    strings,
                    self.records.iter().map(|r| r.name_offset),
                    self.header.max_str_len,
                    self.profile.host_order(),
                )?)
            }
        };
        Ok(())
    }

    /// Byte offset of the first section record.
    fn section_table_offset(&self) -> u32 {
        (FileHeader::SIZE + VerifyRecord::SIZE) as u32 + doff_align(self.header.strtab_size)
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn verify_record(&self) -> &VerifyRecord {
        &self.verify
    }

    pub fn timestamp(&self) -> u32 {
        self.verify.timestamp
    }

    pub fn profile(&self) -> &TargetProfile {
        &self.profile
    }

    pub fn reorder_map(&self) -> Option<ReorderMap> {
        self.reorder
    }

    /// Target byte order in effect for this module.
    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Number of errors recorded against this handle.
    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn file_name(&self) -> Cow<'_, [u8]> {
        self.strings
            .as_ref()
            .map(|s| s.file_name(&self.profile.host))
            .unwrap_or_default()
    }

    pub fn section_count(&self) -> usize {
        self.records.len()
    }

    /// Raw name bytes of section `index`.
    pub fn section_name(&self, index: usize) -> Option<&[u8]> {
        match &self.names {
            SectionNames::Borrowed(ranges) => {
                let r = ranges.get(index)?.clone();
                self.strings.as_ref().map(|s| &s.as_bytes()[r])
            }
            SectionNames::Expanded(names) => names.get(index),
        }
    }

    /// First section whose name is exactly `name`.
    pub fn get_section_info(&self, name: &str) -> Option<SectionInfo> {
        (0..self.records.len())
            .find(|&i| self.section_name(i) == Some(name.as_bytes()))
            .and_then(|i| self.get_section_by_index(i))
    }

    pub fn get_section_by_index(&self, index: usize) -> Option<SectionInfo> {
        let rec = self.records.get(index)?;
        Some(SectionInfo::from_record(self.section_name(index)?, rec))
    }

    pub fn sections(&self) -> impl Iterator<Item = SectionInfo> + '_ {
        (0..self.records.len()).filter_map(move |i| self.get_section_by_index(i))
    }

    /// Host buffer size, in host AUs, that holds a section of `size` target
    /// AUs once padded to whole 32-bit words.
    pub fn round_up_section_size(&self, size: u32) -> u32 {
        let units = &self.profile.units;
        let pad = 32 / units.target().bits() - 1;
        units.taddr_to_host(size.wrapping_add(pad)) & !3
    }

    pub fn symbols(&self) -> &[SymbolEntry] {
        &self.symbols
    }

    /// Name of a symbol table entry.
    pub fn symbol_name(&self, entry: &SymbolEntry) -> Result<Cow<'_, [u8]>> {
        self.strings
            .as_ref()
            .ok_or(LoadError::BadStringTableOffset(entry.name_offset))?
            .name(entry.name_offset, &self.profile.host)
    }

    /// Release the module and every host reservation it holds.
    pub fn close(self) {
        tracing::debug!("closing module with {} recorded errors", self.errors);
        drop(self);
    }
}

impl<S: Stream, H: HostSyms> Drop for Module<S, H> {
    fn drop(&mut self) {
        self.strings = None;
        self.records = Vec::new();
        self.names = SectionNames::Borrowed(Vec::new());
        self.symbols = Vec::new();
        let r = std::mem::take(&mut self.reserved);
        for bytes in [r.strings, r.sections, r.names, r.symbols, r.handle]
            .into_iter()
            .flatten()
        {
            self.syms.deallocate(bytes);
        }
    }
}
