//! Bit-field extraction and insertion over target addressable units.
//!
//! Image data is held as a byte buffer of target AUs, each AU stored in host
//! byte order. A field is `width` bits starting `offset` bits above the least
//! significant bit of the multi-AU integer that begins at AU `au`. On a
//! little-endian target that AU is the least significant; on a big-endian
//! target it is the most significant.

use object::endian::{Endian, Endianness};

use super::table::Overflow;
use crate::error::FieldError;
use crate::units::AuWidth;

/// Mutable view of a buffer as an array of target AUs.
#[derive(Debug)]
pub struct AuView<'a> {
    bytes: &'a mut [u8],
    au: AuWidth,
    order: Endianness,
}

impl<'a> AuView<'a> {
    /// `order` is the byte order each AU is stored in, i.e. the host order.
    pub fn new(bytes: &'a mut [u8], au: AuWidth, order: Endianness) -> Self {
        Self { bytes, au, order }
    }

    /// Number of whole AUs in the view.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.au.bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn au_width(&self) -> AuWidth {
        self.au
    }

    fn get(&self, i: usize) -> u32 {
        let at = i * self.au.bytes();
        let b = &self.bytes[at..at + self.au.bytes()];
        match self.au {
            AuWidth::Bits8 => u32::from(b[0]),
            AuWidth::Bits16 => u32::from(self.order.read_u16_bytes([b[0], b[1]])),
            AuWidth::Bits32 => self.order.read_u32_bytes([b[0], b[1], b[2], b[3]]),
        }
    }

    fn set(&mut self, i: usize, value: u32) {
        let at = i * self.au.bytes();
        let order = self.order;
        let b = &mut self.bytes[at..at + self.au.bytes()];
        match self.au {
            AuWidth::Bits8 => b[0] = value as u8,
            AuWidth::Bits16 => b.copy_from_slice(&order.write_u16_bytes(value as u16)),
            AuWidth::Bits32 => b.copy_from_slice(&order.write_u32_bytes(value)),
        }
    }
}

/// Where a field lives inside an [`AuView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// First AU of the containing integer.
    pub au: usize,
    /// Bit offset from the least significant bit.
    pub offset: u32,
    pub width: u32,
}

impl Field {
    fn span(&self, au: AuWidth) -> Result<usize, FieldError> {
        if self.width == 0 || self.width > 32 || self.offset + self.width > 64 {
            return Err(FieldError::BadGeometry {
                width: self.width,
                offset: self.offset,
            });
        }
        Ok(((self.offset + self.width + au.bits() - 1) / au.bits()) as usize)
    }

    fn mask(&self) -> u64 {
        (1u64 << self.width) - 1
    }
}

/// Index of the `k`th least significant AU of an `n`-AU integer at `au`.
#[inline]
fn unit(au: usize, n: usize, k: usize, big_endian: bool) -> usize {
    if big_endian {
        au + n - 1 - k
    } else {
        au + k
    }
}

fn gather(view: &AuView<'_>, field: &Field, big_endian: bool) -> Result<(u64, usize), FieldError> {
    let n = field.span(view.au)?;
    if field.au.checked_add(n).map_or(true, |end| end > view.len()) {
        return Err(FieldError::OutOfBounds {
            au: field.au,
            len: view.len(),
        });
    }
    let bits = view.au.bits() as usize;
    let mut acc = 0u64;
    for k in 0..n {
        acc |= u64::from(view.get(unit(field.au, n, k, big_endian))) << (k * bits);
    }
    Ok((acc, n))
}

/// Extract a field, sign-extending unless `sign` is [`Overflow::Unsigned`].
pub fn unpack(
    view: &AuView<'_>,
    field: Field,
    big_endian: bool,
    sign: Overflow,
) -> Result<i32, FieldError> {
    let (acc, _) = gather(view, &field, big_endian)?;
    let raw = ((acc >> field.offset) & field.mask()) as u32;
    if sign == Overflow::Unsigned || field.width == 32 {
        return Ok(raw as i32);
    }
    let shift = 32 - field.width;
    Ok(((raw << shift) as i32) >> shift)
}

/// Whether `value` fits a `width`-bit field under `policy`.
pub fn fits(value: i32, width: u32, policy: Overflow) -> bool {
    if width >= 32 {
        return true;
    }
    let v = i64::from(value);
    let half = 1i64 << (width - 1);
    let full = 1i64 << width;
    match policy {
        Overflow::Truncate => true,
        Overflow::Signed => (-half..half).contains(&v),
        Overflow::Unsigned => (0..full).contains(&v),
        Overflow::Either => (-half..full).contains(&v),
    }
}

/// Insert the low `width` bits of `value`, preserving surrounding bits.
///
/// The field is written even when `value` does not fit; the overflow is
/// reported afterwards.
pub fn repack(
    view: &mut AuView<'_>,
    field: Field,
    big_endian: bool,
    policy: Overflow,
    value: i32,
) -> Result<(), FieldError> {
    let (mut acc, n) = gather(view, &field, big_endian)?;
    let mask = field.mask() << field.offset;
    acc = (acc & !mask) | ((u64::from(value as u32) << field.offset) & mask);

    let bits = view.au.bits() as usize;
    let au_mask = (1u64 << bits) - 1;
    for k in 0..n {
        let idx = unit(field.au, n, k, big_endian);
        view.set(idx, ((acc >> (k * bits)) & au_mask) as u32);
    }

    if fits(value, field.width, policy) {
        Ok(())
    } else {
        Err(FieldError::Overflow {
            value,
            width: field.width,
        })
    }
}
