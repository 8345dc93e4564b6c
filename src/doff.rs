//! DOFF wire records and constants.
//!
//! Every record is a sequence of 32-bit words. Pairs of 16-bit fields share
//! one word, the first field in the low half, so that a record decodes the
//! same way on any host once the buffer has been reordered.

use object::endian::{Endian, Endianness};

/// Byte-order marker stored in every file header.
pub const BYTE_RESHUFFLE_VALUE: u32 = 0x0001_0203;

/// The only DOFF format version.
pub const DOFF0: u16 = 0;

/// Default maximum image packet payload, in bytes.
pub const IMAGE_PACKET_SIZE: u32 = 1024;

// Plausibility limits. Exceeding any of them fails the open.
pub const MAX_REASONABLE_STRINGTAB: u32 = 0x10_0000;
pub const MAX_REASONABLE_SECTIONS: u32 = 200;
pub const MAX_REASONABLE_SYMBOLS: u32 = 100_000;

// df_flags
pub const DF_LITTLE: u16 = 0x100;
pub const DF_BIG: u16 = 0x200;
pub const DF_BYTE_ORDER: u16 = DF_LITTLE | DF_BIG;

// Target ISA identifiers
pub const TMS470_ID: u16 = 0x97;
pub const LEAD_ID: u16 = 0x98;
pub const TMS32060_ID: u16 = 0x99;
pub const LEAD3_ID: u16 = 0x9c;

// dn_scnum sentinels
pub const DN_UNDEF: i16 = 0;
pub const DN_ABS: i16 = -1;

// dn_sclass values
pub const DN_EXT: i16 = 2;
pub const DN_STATLAB: i16 = 20;
pub const DN_EXTLAB: i16 = 21;

/// Relocation symbol index meaning "the section being relocated".
pub const SYMNDX_CURRENT_SECTION: i32 = -1;

#[inline]
fn word(data: &[u8], index: usize, host: Endianness) -> u32 {
    let at = index * 4;
    host.read_u32_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

#[inline]
fn put_word(out: &mut Vec<u8>, value: u32, host: Endianness) {
    out.extend_from_slice(&host.write_u32_bytes(value));
}

#[inline]
const fn lo16(w: u32) -> u16 {
    (w & 0xFFFF) as u16
}

#[inline]
const fn hi16(w: u32) -> u16 {
    (w >> 16) as u16
}

#[inline]
const fn pair(lo: u16, hi: u16) -> u32 {
    lo as u32 | (hi as u32) << 16
}

/// DOFF file header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileHeader {
    /// String table size in bytes, including the file name.
    pub strtab_size: u32,
    pub entry_point: u32,
    pub byte_reshuffle: u32,
    /// Size of the string table up to and including the last section name.
    pub scn_name_size: u32,
    pub no_syms: u16,
    /// Longest string, terminator included, excluding the file name.
    pub max_str_len: u16,
    pub no_scns: u16,
    pub target_scns: u16,
    pub doff_version: u16,
    pub target_id: u16,
    pub flags: u16,
    /// Section of the entry point, `DN_UNDEF` for none, `DN_ABS` for absolute.
    pub entry_secn: i16,
    pub checksum: u32,
}

impl FileHeader {
    pub const SIZE: usize = 36;
    /// Word index of `byte_reshuffle`.
    pub const MARKER_WORD: usize = 2;

    /// Decode from an already reordered buffer.
    pub fn parse(data: &[u8], host: Endianness) -> Self {
        let w = |i| word(data, i, host);
        Self {
            strtab_size: w(0),
            entry_point: w(1),
            byte_reshuffle: w(2),
            scn_name_size: w(3),
            no_syms: lo16(w(4)),
            max_str_len: hi16(w(4)),
            no_scns: lo16(w(5)),
            target_scns: hi16(w(5)),
            doff_version: lo16(w(6)),
            target_id: hi16(w(6)),
            flags: lo16(w(7)),
            entry_secn: hi16(w(7)) as i16,
            checksum: w(8),
        }
    }

    pub fn words(&self) -> [u32; 9] {
        [
            self.strtab_size,
            self.entry_point,
            self.byte_reshuffle,
            self.scn_name_size,
            pair(self.no_syms, self.max_str_len),
            pair(self.no_scns, self.target_scns),
            pair(self.doff_version, self.target_id),
            pair(self.flags, self.entry_secn as u16),
            self.checksum,
        ]
    }

    pub fn to_bytes(&self, order: Endianness) -> Vec<u8> {
        words_to_bytes(&self.words(), order)
    }

    /// Target byte order declared in `flags`, if any.
    pub fn big_endian_target(&self) -> Option<bool> {
        match self.flags & DF_BYTE_ORDER {
            DF_BIG => Some(true),
            DF_LITTLE => Some(false),
            _ => None,
        }
    }
}

/// Integrity record following the file header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyRecord {
    pub timestamp: u32,
    pub scn_rec_checksum: u32,
    pub str_tab_checksum: u32,
    pub sym_tab_checksum: u32,
    pub verify_rec_checksum: u32,
}

impl VerifyRecord {
    pub const SIZE: usize = 20;

    pub fn parse(data: &[u8], host: Endianness) -> Self {
        let w = |i| word(data, i, host);
        Self {
            timestamp: w(0),
            scn_rec_checksum: w(1),
            str_tab_checksum: w(2),
            sym_tab_checksum: w(3),
            verify_rec_checksum: w(4),
        }
    }

    pub fn words(&self) -> [u32; 5] {
        [
            self.timestamp,
            self.scn_rec_checksum,
            self.str_tab_checksum,
            self.sym_tab_checksum,
            self.verify_rec_checksum,
        ]
    }

    pub fn to_bytes(&self, order: Endianness) -> Vec<u8> {
        words_to_bytes(&self.words(), order)
    }
}

/// On-disk section record (`doff_scnhdr_t`).
///
/// Field order matches the external `LDR_SECTION_INFO` layout; see
/// [`crate::section::SectionInfo`] for the conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionRecord {
    /// Offset of the name in the string table.
    pub name_offset: u32,
    /// Run address, in target AUs.
    pub run_addr: u32,
    /// Load address, in target AUs.
    pub load_addr: u32,
    /// Size, in target AUs.
    pub size: u32,
    pub page: u16,
    pub flags: u16,
    /// Absolute byte offset of the first image packet.
    pub first_pkt_offset: u32,
    pub packet_count: i32,
}

impl SectionRecord {
    pub const SIZE: usize = 28;

    pub fn parse(data: &[u8], host: Endianness) -> Self {
        let w = |i| word(data, i, host);
        Self {
            name_offset: w(0),
            run_addr: w(1),
            load_addr: w(2),
            size: w(3),
            page: lo16(w(4)),
            flags: hi16(w(4)),
            first_pkt_offset: w(5),
            packet_count: w(6) as i32,
        }
    }

    pub fn words(&self) -> [u32; 7] {
        [
            self.name_offset,
            self.run_addr,
            self.load_addr,
            self.size,
            pair(self.page, self.flags),
            self.first_pkt_offset,
            self.packet_count as u32,
        ]
    }

    pub fn to_bytes(&self, order: Endianness) -> Vec<u8> {
        words_to_bytes(&self.words(), order)
    }
}

/// On-disk symbol table entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name_offset: u32,
    pub value: i32,
    /// 1-based section number, or `DN_UNDEF` / `DN_ABS`.
    pub section: i16,
    pub storage_class: i16,
}

impl SymbolEntry {
    pub const SIZE: usize = 12;

    pub fn parse(data: &[u8], host: Endianness) -> Self {
        let w = |i| word(data, i, host);
        Self {
            name_offset: w(0),
            value: w(1) as i32,
            section: lo16(w(2)) as i16,
            storage_class: hi16(w(2)) as i16,
        }
    }

    pub fn words(&self) -> [u32; 3] {
        [
            self.name_offset,
            self.value as u32,
            pair(self.section as u16, self.storage_class as u16),
        ]
    }

    pub fn to_bytes(&self, order: Endianness) -> Vec<u8> {
        words_to_bytes(&self.words(), order)
    }
}

/// Fixed part of an image packet; the payload follows it in the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketHeader {
    pub num_relocs: i32,
    /// Valid payload bytes; the stream carries it padded to a word.
    pub packet_size: i32,
    pub checksum: u32,
}

impl PacketHeader {
    pub const SIZE: usize = 12;

    pub fn parse(data: &[u8], host: Endianness) -> Self {
        let w = |i| word(data, i, host);
        Self {
            num_relocs: w(0) as i32,
            packet_size: w(1) as i32,
            checksum: w(2),
        }
    }

    pub fn words(&self) -> [u32; 3] {
        [
            self.num_relocs as u32,
            self.packet_size as u32,
            self.checksum,
        ]
    }

    pub fn to_bytes(&self, order: Endianness) -> Vec<u8> {
        words_to_bytes(&self.words(), order)
    }
}

/// Relocation record as stored after a packet's payload.
///
/// `operand` is the union word: a symbol index, a literal, a packet-relative
/// PC, or a field descriptor, depending on the relocation type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocRecord {
    /// Packet-relative address of the reference, in target AUs.
    pub vaddr: u32,
    pub operand: u32,
    pub disp: u16,
    pub reloc_type: u16,
}

impl RelocRecord {
    pub const SIZE: usize = 12;

    pub fn parse(data: &[u8], host: Endianness) -> Self {
        let w = |i| word(data, i, host);
        Self {
            vaddr: w(0),
            operand: w(1),
            disp: lo16(w(2)),
            reloc_type: hi16(w(2)),
        }
    }

    pub fn words(&self) -> [u32; 3] {
        [self.vaddr, self.operand, pair(self.disp, self.reloc_type)]
    }

    pub fn to_bytes(&self, order: Endianness) -> Vec<u8> {
        words_to_bytes(&self.words(), order)
    }

    /// Build the operand word of a field-descriptor record.
    pub const fn field_operand(offset: u8, fieldsz: u8, wordsz: u8) -> u32 {
        offset as u32 | (fieldsz as u32) << 8 | (wordsz as u32) << 16
    }
}

/// Serialize words in `order`.
pub fn words_to_bytes(words: &[u32], order: Endianness) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for &w in words {
        put_word(&mut out, w, order);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_packs_half_words_low_first() {
        let hdr = FileHeader {
            no_syms: 3,
            max_str_len: 9,
            entry_secn: DN_ABS,
            ..Default::default()
        };
        let w = hdr.words();
        assert_eq!(w[4], 0x0009_0003);
        assert_eq!(w[7] >> 16, 0xFFFF);
    }

    #[test]
    fn records_parse_in_either_order() {
        let rec = SectionRecord {
            name_offset: 6,
            run_addr: 0x8000_0000,
            load_addr: 0x8000_0000,
            size: 64,
            page: 1,
            flags: 0x0230,
            first_pkt_offset: 0x100,
            packet_count: 1,
        };
        for order in [Endianness::Little, Endianness::Big] {
            assert_eq!(SectionRecord::parse(&rec.to_bytes(order), order), rec);
        }
    }

    #[test]
    fn byte_order_flags() {
        let mut hdr = FileHeader::default();
        assert_eq!(hdr.big_endian_target(), None);
        hdr.flags = DF_BIG;
        assert_eq!(hdr.big_endian_target(), Some(true));
        hdr.flags = DF_LITTLE | 0x1;
        assert_eq!(hdr.big_endian_target(), Some(false));
    }

    #[test]
    fn field_operand_layout() {
        let rec = RelocRecord {
            operand: RelocRecord::field_operand(5, 12, 32),
            reloc_type: 0x400d,
            ..Default::default()
        };
        assert_eq!(rec.operand, 0x0020_0C05);
        assert_eq!(rec.words()[2], 0x400d_0000);
    }
}
