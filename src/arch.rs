//! Architecture abstraction.
//!
//! The `Architecture` trait captures everything the loader needs to know
//! about one DSP family: the ISA identifier stamped in the file header, the
//! addressable-unit widths, a fixed byte order where the family has one, the
//! `.cinit` record layout and the relocation table. A [`TargetProfile`]
//! snapshots one architecture together with the host description so the
//! rest of the loader works from plain data.

use object::Endianness;

use crate::cinit::CinitLayout;
use crate::reloc::table::RelocTable;
use crate::units::{AuWidth, Units};

pub mod c54x;
pub mod c55x;
pub mod c6000;
pub mod tms470;

/// A DSP target family.
pub trait Architecture: Sync {
    fn name(&self) -> &'static str;

    /// ISA identifier the file header must carry.
    fn target_id(&self) -> u16;

    /// Width of a code address unit.
    fn target_au(&self) -> AuWidth;

    /// Width of a data address unit.
    fn tdata_au(&self) -> AuWidth {
        self.target_au()
    }

    /// Byte order fixed by the family, or `None` when the file decides.
    fn endianness(&self) -> Option<Endianness> {
        None
    }

    fn cinit(&self) -> CinitLayout;

    fn relocations(&self) -> &'static RelocTable;
}

/// Selectable target families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum TargetFamily {
    /// TMS320C6000
    C6000,
    /// TMS470 (ARM)
    Tms470,
    /// TMS320C55x
    C55x,
    /// TMS320C54x
    C54x,
}

impl TargetFamily {
    pub fn arch(self) -> &'static dyn Architecture {
        match self {
            Self::C6000 => &c6000::C6000,
            Self::Tms470 => &tms470::Tms470,
            Self::C55x => &c55x::C55x,
            Self::C54x => &c54x::C54x,
        }
    }

    /// Family whose files carry `target_id`.
    pub fn from_target_id(target_id: u16) -> Option<Self> {
        [Self::C6000, Self::Tms470, Self::C55x, Self::C54x]
            .into_iter()
            .find(|f| f.arch().target_id() == target_id)
    }
}

/// The machine the loader runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProfile {
    /// Host addressable unit. Only affects how section names are unpacked.
    pub au: AuWidth,
    /// Byte order used to read words from the stream.
    pub order: Endianness,
}

impl Default for HostProfile {
    fn default() -> Self {
        Self {
            au: AuWidth::Bits8,
            order: Endianness::default(),
        }
    }
}

/// Caller-supplied options for one open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Require the file to declare this target byte order.
    pub big_endian: Option<bool>,
}

/// Resolved description of one host/target pairing.
#[derive(Debug, Clone, Copy)]
pub struct TargetProfile {
    pub family: TargetFamily,
    pub target_id: u16,
    pub units: Units,
    /// Fixed target byte order, `None` when the file header decides.
    pub big_endian: Option<bool>,
    pub cinit: CinitLayout,
    pub relocations: &'static RelocTable,
    pub host: HostProfile,
}

impl TargetProfile {
    pub fn new(family: TargetFamily, host: HostProfile) -> Self {
        let arch = family.arch();
        Self {
            family,
            target_id: arch.target_id(),
            units: Units::new(host.au, arch.target_au(), arch.tdata_au()),
            big_endian: arch.endianness().map(|e| e == Endianness::Big),
            cinit: arch.cinit(),
            relocations: arch.relocations(),
            host,
        }
    }

    /// Profile for `family` on the native host.
    pub fn native(family: TargetFamily) -> Self {
        Self::new(family, HostProfile::default())
    }

    pub fn host_order(&self) -> Endianness {
        self.host.order
    }
}
