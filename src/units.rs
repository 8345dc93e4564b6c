//! Addressable-unit conversions.
//!
//! DOFF sizes and offsets are always expressed in bytes, target addresses in
//! target addressable units (AUs), initialized-data records in TDATA units and
//! host buffers in host AUs. All widths are powers of two of at least eight
//! bits, so every conversion is a shift. When two widths agree the
//! conversion is the identity.

/// Width of an addressable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuWidth {
    Bits8,
    Bits16,
    Bits32,
}

impl AuWidth {
    /// Number of bits in one unit.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bits8 => 8,
            Self::Bits16 => 16,
            Self::Bits32 => 32,
        }
    }

    /// `log2` of [`AuWidth::bits`].
    pub const fn log2_bits(self) -> u32 {
        match self {
            Self::Bits8 => 3,
            Self::Bits16 => 4,
            Self::Bits32 => 5,
        }
    }

    /// Number of bytes in one unit.
    pub const fn bytes(self) -> usize {
        (self.bits() / 8) as usize
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::Bits8),
            16 => Some(Self::Bits16),
            32 => Some(Self::Bits32),
            _ => None,
        }
    }
}

const LOG_BITS_PER_BYTE: u32 = 3;

/// Shift `x` expressed in units of width `from` into units of width `to`.
#[inline]
const fn rescale(x: u32, from: u32, to: u32) -> u32 {
    if from == to {
        x
    } else if from > to {
        x << (from - to)
    } else {
        x >> (to - from)
    }
}

/// Shift with round-up when converting into a wider unit.
#[inline]
const fn rescale_round(x: u32, from: u32, to: u32) -> u32 {
    if to > from {
        let shift = to - from;
        x.wrapping_add((1 << shift) - 1) >> shift
    } else {
        rescale(x, from, to)
    }
}

/// The conversion set for one host/target pairing.
///
/// Built once from the host and target profiles; every method is a pure
/// shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Units {
    host: AuWidth,
    target: AuWidth,
    tdata: AuWidth,
}

impl Units {
    pub const fn new(host: AuWidth, target: AuWidth, tdata: AuWidth) -> Self {
        Self {
            host,
            target,
            tdata,
        }
    }

    pub const fn host(&self) -> AuWidth {
        self.host
    }

    pub const fn target(&self) -> AuWidth {
        self.target
    }

    pub const fn tdata(&self) -> AuWidth {
        self.tdata
    }

    /// Target address units to host address units.
    pub const fn taddr_to_host(&self, x: u32) -> u32 {
        rescale(x, self.target.log2_bits(), self.host.log2_bits())
    }

    /// Host address units to target address units.
    pub const fn host_to_taddr(&self, x: u32) -> u32 {
        rescale(x, self.host.log2_bits(), self.target.log2_bits())
    }

    /// Target data units to host address units.
    pub const fn tdata_to_host(&self, x: u32) -> u32 {
        rescale(x, self.tdata.log2_bits(), self.host.log2_bits())
    }

    /// Host address units to target data units.
    pub const fn host_to_tdata(&self, x: u32) -> u32 {
        rescale(x, self.host.log2_bits(), self.tdata.log2_bits())
    }

    /// Host address units to target data units, rounding partial units up.
    pub const fn host_to_tdata_round(&self, x: u32) -> u32 {
        rescale_round(x, self.host.log2_bits(), self.tdata.log2_bits())
    }

    /// Byte count to host address units.
    pub const fn byte_to_host(&self, x: u32) -> u32 {
        rescale(x, LOG_BITS_PER_BYTE, self.host.log2_bits())
    }

    /// Byte count to host address units, rounding partial units up.
    pub const fn byte_to_host_round(&self, x: u32) -> u32 {
        rescale_round(x, LOG_BITS_PER_BYTE, self.host.log2_bits())
    }

    /// Host address units to bytes.
    pub const fn host_to_byte(&self, x: u32) -> u32 {
        rescale(x, self.host.log2_bits(), LOG_BITS_PER_BYTE)
    }

    /// Target address units to bytes.
    pub const fn taddr_to_byte(&self, x: u32) -> u32 {
        rescale(x, self.target.log2_bits(), LOG_BITS_PER_BYTE)
    }

    /// Bytes to target address units.
    pub const fn byte_to_taddr(&self, x: u32) -> u32 {
        rescale(x, LOG_BITS_PER_BYTE, self.target.log2_bits())
    }

    /// Target data address to target (code) address.
    pub const fn tdata_to_taddr(&self, x: u32) -> u32 {
        rescale(x, self.tdata.log2_bits(), self.target.log2_bits())
    }

    /// Target (code) address to target data address.
    pub const fn taddr_to_tdata(&self, x: u32) -> u32 {
        rescale(x, self.target.log2_bits(), self.tdata.log2_bits())
    }

    /// Bytes to TDATA units.
    pub const fn byte_to_tdata(&self, x: u32) -> u32 {
        rescale(x, LOG_BITS_PER_BYTE, self.tdata.log2_bits())
    }

    /// TDATA units to bytes.
    pub const fn tdata_to_byte(&self, x: u32) -> u32 {
        rescale(x, self.tdata.log2_bits(), LOG_BITS_PER_BYTE)
    }

    /// Width of the unit image data is processed in: the wider of the target
    /// AU and the host AU.
    pub const fn image_unit(&self) -> AuWidth {
        if self.target.bits() < self.host.bits() {
            self.host
        } else {
            self.target
        }
    }
}
