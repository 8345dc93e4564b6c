//! Synthetic DOFF modules for the integration tests.
#![allow(dead_code)]

use doffld::checksum::complement;
use doffld::doff::{
    FileHeader, PacketHeader, RelocRecord, SectionRecord, SymbolEntry, VerifyRecord,
    BYTE_RESHUFFLE_VALUE, DF_BIG, DF_LITTLE, DOFF0, IMAGE_PACKET_SIZE, TMS32060_ID,
};
use doffld::section::SectionFlags;
use doffld::utils::doff_align;
use object::Endianness;

const LOADED: u16 = SectionFlags::ALLOCATE.bits() | SectionFlags::DOWNLOAD.bits();

// Section type in the low nibble of the flags.
pub const TEXT: u16 = LOADED;
pub const DATA: u16 = 0x1 | LOADED;
pub const BSS: u16 = 0x2 | SectionFlags::ALLOCATE.bits();
pub const CINIT: u16 = 0x3 | SectionFlags::DOWNLOAD.bits();

#[derive(Debug, Clone)]
pub struct TestSection {
    pub name: String,
    pub run_addr: u32,
    pub load_addr: u32,
    /// Size in target AUs; defaults to the data length.
    pub size: Option<u32>,
    pub page: u16,
    pub flags: u16,
    pub data: Vec<u8>,
    /// Relocations with section-relative `vaddr`.
    pub relocs: Vec<RelocRecord>,
}

impl TestSection {
    pub fn new(name: &str, flags: u16, run_addr: u32, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            run_addr,
            load_addr: run_addr,
            size: None,
            page: 0,
            flags,
            data,
            relocs: Vec::new(),
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_reloc(mut self, reloc: RelocRecord) -> Self {
        self.relocs.push(reloc);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TestSymbol {
    pub name: String,
    pub value: i32,
    pub section: i16,
    pub storage_class: i16,
}

/// Where the pieces of a built module ended up.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub strtab_offset: usize,
    pub section_table_offset: usize,
    pub symbol_table_offset: usize,
    pub records: Vec<SectionRecord>,
}

/// Builds a DOFF module word by word, checksums included.
#[derive(Debug, Clone)]
pub struct DoffBuilder {
    /// Byte order the file's words are written in.
    pub order: Endianness,
    pub target_id: u16,
    pub version: u16,
    pub big_endian_target: bool,
    pub file_name: String,
    pub timestamp: u32,
    pub entry_point: u32,
    pub entry_secn: i16,
    /// Largest payload per packet.
    pub packet_limit: usize,
    /// Pack the string table for a 16-bit host with this byte order.
    pub packed_strings: Option<Endianness>,
    pub sections: Vec<TestSection>,
    pub symbols: Vec<TestSymbol>,
    /// Overrides the declared section count.
    pub declared_sections: Option<u16>,
    pub declared_symbols: Option<u16>,
    pub declared_strtab: Option<u32>,
}

impl Default for DoffBuilder {
    fn default() -> Self {
        Self {
            order: Endianness::Little,
            target_id: TMS32060_ID,
            version: DOFF0,
            big_endian_target: false,
            file_name: "a.out".to_string(),
            timestamp: 0x5F5E_1000,
            entry_point: 0,
            entry_secn: 0,
            packet_limit: IMAGE_PACKET_SIZE as usize,
            packed_strings: None,
            sections: Vec::new(),
            symbols: Vec::new(),
            declared_sections: None,
            declared_symbols: None,
            declared_strtab: None,
        }
    }
}

impl DoffBuilder {
    pub fn section(mut self, section: TestSection) -> Self {
        self.sections.push(section);
        self
    }

    pub fn symbol(mut self, name: &str, value: i32, section: i16, storage_class: i16) -> Self {
        self.symbols.push(TestSymbol {
            name: name.to_string(),
            value,
            section,
            storage_class,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    pub fn build_with_layout(&self) -> (Vec<u8>, Layout) {
        let order = self.order;

        // String table: file name, section names, then symbol names.
        let mut strings = Vec::new();
        push_str(&mut strings, &self.file_name);
        let mut max_str_len = 0u16;
        let mut section_names = Vec::new();
        for s in &self.sections {
            section_names.push(strings.len() as u32);
            push_str(&mut strings, &s.name);
            max_str_len = max_str_len.max(s.name.len() as u16 + 1);
        }
        let scn_name_size = strings.len() as u32;
        let mut symbol_names = Vec::new();
        for s in &self.symbols {
            symbol_names.push(strings.len() as u32);
            push_str(&mut strings, &s.name);
            max_str_len = max_str_len.max(s.name.len() as u16 + 1);
        }
        let strtab_size = strings.len() as u32;
        strings.resize(doff_align(strtab_size) as usize, 0);
        if let Some(host) = self.packed_strings {
            strings = pack_strings(&strings, host);
        }

        let strtab_offset = FileHeader::SIZE + VerifyRecord::SIZE;
        let section_table_offset = strtab_offset + strings.len();
        let symbol_table_offset =
            section_table_offset + self.sections.len() * SectionRecord::SIZE;
        let mut packets_offset = symbol_table_offset + self.symbols.len() * SymbolEntry::SIZE;

        // Packets.
        let mut records = Vec::new();
        let mut packets = Vec::new();
        for (s, &name_offset) in self.sections.iter().zip(&section_names) {
            let first = packets_offset;
            let mut count = 0;
            let mut start = 0;
            while start < s.data.len() {
                let end = (start + self.packet_limit).min(s.data.len());
                let relocs: Vec<RelocRecord> = s
                    .relocs
                    .iter()
                    .filter(|r| (start..end).contains(&(r.vaddr as usize)))
                    .map(|r| RelocRecord {
                        vaddr: r.vaddr - start as u32,
                        ..*r
                    })
                    .collect();
                let bytes = packet(&s.data[start..end], &relocs, order);
                packets_offset += bytes.len();
                packets.extend(bytes);
                count += 1;
                start = end;
            }
            records.push(SectionRecord {
                name_offset,
                run_addr: s.run_addr,
                load_addr: s.load_addr,
                size: s.size.unwrap_or(s.data.len() as u32),
                page: s.page,
                flags: s.flags,
                first_pkt_offset: if count > 0 { first as u32 } else { 0 },
                packet_count: count,
            });
        }

        let section_bytes: Vec<u8> = records.iter().flat_map(|r| r.to_bytes(order)).collect();
        let symbol_bytes: Vec<u8> = self
            .symbols
            .iter()
            .zip(&symbol_names)
            .flat_map(|(s, &name_offset)| {
                SymbolEntry {
                    name_offset,
                    value: s.value,
                    section: s.section,
                    storage_class: s.storage_class,
                }
                .to_bytes(order)
            })
            .collect();

        let mut verify = VerifyRecord {
            timestamp: self.timestamp,
            scn_rec_checksum: complement(sum(&section_bytes, order)),
            str_tab_checksum: complement(sum(&strings, order)),
            sym_tab_checksum: complement(sum(&symbol_bytes, order)),
            verify_rec_checksum: 0,
        };
        verify.verify_rec_checksum = complement(sum(&verify.to_bytes(order), order));

        let mut header = FileHeader {
            strtab_size: self.declared_strtab.unwrap_or(strtab_size),
            entry_point: self.entry_point,
            byte_reshuffle: BYTE_RESHUFFLE_VALUE,
            scn_name_size,
            no_syms: self.declared_symbols.unwrap_or(self.symbols.len() as u16),
            max_str_len,
            no_scns: self.declared_sections.unwrap_or(self.sections.len() as u16),
            target_scns: self.sections.len() as u16,
            doff_version: self.version,
            target_id: self.target_id,
            flags: if self.big_endian_target { DF_BIG } else { DF_LITTLE },
            entry_secn: self.entry_secn,
            checksum: 0,
        };
        header.checksum = complement(sum(&header.to_bytes(order), order));

        let mut out = header.to_bytes(order);
        out.extend(verify.to_bytes(order));
        out.extend(strings);
        out.extend(section_bytes);
        out.extend(symbol_bytes);
        out.extend(packets);
        let layout = Layout {
            strtab_offset,
            section_table_offset,
            symbol_table_offset,
            records,
        };
        (out, layout)
    }
}

fn push_str(table: &mut Vec<u8>, s: &str) {
    table.extend_from_slice(s.as_bytes());
    table.push(0);
}

/// Two characters per 16-bit host word, the first in the high byte.
pub fn pack_strings(table: &[u8], host: Endianness) -> Vec<u8> {
    table
        .chunks_exact(2)
        .flat_map(|pair| {
            let word = u16::from(pair[0]) << 8 | u16::from(pair[1]);
            match host {
                Endianness::Little => word.to_le_bytes(),
                Endianness::Big => word.to_be_bytes(),
            }
        })
        .collect()
}

/// Wrapping sum of `data` as words in `order`.
pub fn sum(data: &[u8], order: Endianness) -> u32 {
    doffld::checksum::checksum(data, order)
}

/// One packet: header, padded payload, relocations.
pub fn packet(data: &[u8], relocs: &[RelocRecord], order: Endianness) -> Vec<u8> {
    let mut payload = data.to_vec();
    payload.resize(doff_align(data.len() as u32) as usize, 0);
    let reloc_bytes: Vec<u8> = relocs.iter().flat_map(|r| r.to_bytes(order)).collect();
    let mut header = PacketHeader {
        num_relocs: relocs.len() as i32,
        packet_size: data.len() as i32,
        checksum: 0,
    };
    let partial = sum(&header.to_bytes(order), order)
        .wrapping_add(sum(&payload, order))
        .wrapping_add(sum(&reloc_bytes, order));
    header.checksum = complement(partial);

    let mut out = header.to_bytes(order);
    out.extend(payload);
    out.extend(reloc_bytes);
    out
}

/// Overwrite the word at byte `offset`.
pub fn patch_word(bytes: &mut [u8], offset: usize, value: u32, order: Endianness) {
    let word = match order {
        Endianness::Little => value.to_le_bytes(),
        Endianness::Big => value.to_be_bytes(),
    };
    bytes[offset..offset + 4].copy_from_slice(&word);
}

/// Payload with a recognizable pattern.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// The two-section module used by the open and copy tests.
pub fn two_sections(order: Endianness) -> DoffBuilder {
    DoffBuilder {
        order,
        ..DoffBuilder::default()
    }
    .section(TestSection::new(".text", TEXT, 0x100, pattern(64, 0x10)))
    .section(TestSection::new(".data", DATA, 0x200, pattern(64, 0x80)))
}

/// Words of `data` as a host with byte order `host` reads them.
pub fn words(data: &[u8], host: Endianness) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|c| {
            let b = [c[0], c[1], c[2], c[3]];
            match host {
                Endianness::Little => u32::from_le_bytes(b),
                Endianness::Big => u32::from_be_bytes(b),
            }
        })
        .collect()
}
