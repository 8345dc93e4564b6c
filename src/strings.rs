//! String table access.
//!
//! The table starts with the file name, followed by the section names (up to
//! `scn_name_size` bytes) and then the symbol names. It is kept exactly as
//! read from the stream.
//!
//! On a byte-addressed host names are borrowed straight out of the table. A
//! host with 16-bit addressable units sees the table as packed host words,
//! two characters each with the first character in the high byte; those
//! names are expanded into a separate buffer of `max_str_len` bytes per
//! section. Symbol names and the file name are unpacked on demand.

use std::borrow::Cow;
use std::ops::Range;

use object::endian::{Endian, Endianness};

use crate::arch::HostProfile;
use crate::error::{LoadError, Result};
use crate::units::AuWidth;

#[derive(Debug)]
pub struct StringTable {
    data: Vec<u8>,
    scn_name_size: u32,
}

impl StringTable {
    pub fn new(data: Vec<u8>, scn_name_size: u32) -> Self {
        Self {
            data,
            scn_name_size,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The NUL-terminated string at byte `offset`, without its terminator.
    pub fn get(&self, offset: u32) -> Result<&[u8]> {
        let range = terminated(&self.data, offset)?;
        Ok(&self.data[range])
    }

    /// Range of the section name at `offset`. Section names must start inside
    /// the section-name area.
    pub fn section_name(&self, offset: u32) -> Result<Range<usize>> {
        if offset >= self.scn_name_size {
            return Err(LoadError::BadStringTableOffset(offset));
        }
        terminated(&self.data, offset)
    }

    /// The name at `offset` as `host` reads it, unpacked when the host
    /// addresses 16-bit units.
    pub fn name(&self, offset: u32, host: &HostProfile) -> Result<Cow<'_, [u8]>> {
        match host.au {
            AuWidth::Bits8 => self.get(offset).map(Cow::Borrowed),
            _ => self.unpack(offset, host.order).map(Cow::Owned),
        }
    }

    /// Name of the file the module was built from.
    pub fn file_name(&self, host: &HostProfile) -> Cow<'_, [u8]> {
        self.name(0, host).unwrap_or_default()
    }

    fn unpack(&self, offset: u32, host: Endianness) -> Result<Vec<u8>> {
        let words_end = self.data.len() & !1;
        let mut name = Vec::new();
        for k in offset as usize..words_end {
            match self.packed_char(k, host) {
                0 => return Ok(name),
                c => name.push(c),
            }
        }
        Err(LoadError::BadStringTableOffset(offset))
    }

    /// The packed character at byte `k` as a 16-bit host sees it.
    fn packed_char(&self, k: usize, host: Endianness) -> u8 {
        let w = k & !1;
        let word = host.read_u16_bytes([self.data[w], self.data[w + 1]]);
        if k & 1 == 0 {
            (word >> 8) as u8
        } else {
            word as u8
        }
    }

    /// Expand the packed section name at `offset` into `slot`.
    ///
    /// `slot.len()` is the longest permitted name including its terminator.
    pub fn expand_section_name(
        &self,
        offset: u32,
        host: Endianness,
        slot: &mut [u8],
    ) -> Result<usize> {
        if offset >= self.scn_name_size {
            return Err(LoadError::BadStringTableOffset(offset));
        }
        let words_end = self.data.len() & !1;
        let mut k = offset as usize;
        for (n, out) in slot.iter_mut().enumerate() {
            if k >= words_end {
                break;
            }
            let c = self.packed_char(k, host);
            *out = c;
            if c == 0 {
                return Ok(n);
            }
            k += 1;
        }
        Err(LoadError::BadStringTableOffset(offset))
    }
}

fn terminated(data: &[u8], offset: u32) -> Result<Range<usize>> {
    let start = offset as usize;
    let tail = data
        .get(start..)
        .ok_or(LoadError::BadStringTableOffset(offset))?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(LoadError::BadStringTableOffset(offset))?;
    Ok(start..start + len)
}

/// Section names expanded for a host with 16-bit addressable units.
#[derive(Debug)]
pub struct ExpandedNames {
    data: Vec<u8>,
    stride: usize,
    lens: Vec<usize>,
}

impl ExpandedNames {
    /// Size of the buffer needed for `count` names of at most `max_len`
    /// bytes including the terminator.
    pub fn buffer_size(max_len: u16, count: u16) -> usize {
        usize::from(max_len) * usize::from(count)
    }

    pub fn build(
        table: &StringTable,
        offsets: impl ExactSizeIterator<Item = u32>,
        max_len: u16,
        host: Endianness,
    ) -> Result<Self> {
        let stride = usize::from(max_len);
        let count = offsets.len();
        let mut data = vec![0u8; stride * count];
        let mut lens = Vec::with_capacity(count);
        for (i, offset) in offsets.enumerate() {
            let slot = &mut data[i * stride..(i + 1) * stride];
            lens.push(table.expand_section_name(offset, host, slot)?);
        }
        Ok(Self { data, stride, lens })
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let len = *self.lens.get(index)?;
        let start = index * self.stride;
        Some(&self.data[start..start + len])
    }

    pub fn len(&self) -> usize {
        self.lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lens.is_empty()
    }
}
