//! Section metadata as seen by callers.

use bitflags::bitflags;

use crate::doff::SectionRecord;

bitflags! {
    /// `ds_flags` of a section record.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SectionFlags: u16 {
        /// Section type, see [`SectionType`].
        const TYPE = 0x000F;
        /// Occupies target memory.
        const ALLOCATE = 0x0010;
        /// Has image data in the file.
        const DOWNLOAD = 0x0020;
        /// `log2` of the required alignment, in target AUs.
        const ALIGN = 0x0F00;
    }
}

impl SectionFlags {
    pub fn section_type(self) -> SectionType {
        SectionType::from((self.bits() & Self::TYPE.bits()) as u8)
    }

    pub fn alignment(self) -> u32 {
        1 << ((self.bits() & Self::ALIGN.bits()) >> 8)
    }

    pub fn is_allocated(self) -> bool {
        self.contains(Self::ALLOCATE)
    }

    pub fn is_downloaded(self) -> bool {
        self.contains(Self::DOWNLOAD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Text,
    Data,
    Bss,
    /// Compressed initialization records.
    Cinit,
    Other(u8),
}

impl From<u8> for SectionType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Text,
            1 => Self::Data,
            2 => Self::Bss,
            3 => Self::Cinit,
            n => Self::Other(n),
        }
    }
}

/// Per-section view handed to callers (`LDR_SECTION_INFO`).
///
/// Addresses and size are in target AUs. `context` is the absolute byte
/// offset of the first image packet and is what
/// [`Module::get_section`](crate::module::Module::get_section) seeks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    pub name: String,
    pub run_addr: u32,
    pub load_addr: u32,
    pub size: u32,
    pub page: u16,
    pub flags: SectionFlags,
    pub context: u32,
    pub packet_count: i32,
}

impl SectionInfo {
    pub fn from_record(name: &[u8], rec: &SectionRecord) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            run_addr: rec.run_addr,
            load_addr: rec.load_addr,
            size: rec.size,
            page: rec.page,
            flags: SectionFlags::from_bits_retain(rec.flags),
            context: rec.first_pkt_offset,
            packet_count: rec.packet_count,
        }
    }

    /// Inverse of [`SectionInfo::from_record`] with an explicit name offset.
    pub fn to_record(&self, name_offset: u32) -> SectionRecord {
        SectionRecord {
            name_offset,
            run_addr: self.run_addr,
            load_addr: self.load_addr,
            size: self.size,
            page: self.page,
            flags: self.flags.bits(),
            first_pkt_offset: self.context,
            packet_count: self.packet_count,
        }
    }

    pub fn section_type(&self) -> SectionType {
        self.flags.section_type()
    }
}
