//! `.cinit` expansion.
//!
//! A `.cinit` section is not copied to the target as-is. It holds a table of
//! records, each a count, a destination address and `count` TDATA units of
//! initial data, padded to the family's record alignment. A zero or negative
//! count ends the table. Records are fed packet by packet, so any field may
//! be split across a packet boundary.

use heapless::Vec;
use object::Endianness;

use crate::error::{LoadError, Result};
use crate::reloc::field::{self, AuView, Field};
use crate::reloc::table::Overflow;
use crate::target::TargetInitializer;
use crate::units::Units;
use crate::utils::align_up;

/// Record geometry, in TDATA units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CinitLayout {
    /// Record alignment.
    pub align: u32,
    /// Width of the count field.
    pub count: u32,
    /// Width of the address field.
    pub address: u32,
    /// High bits of the address field that hold the page.
    pub page_bits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CinitState {
    Count,
    Address,
    /// The address field straddles a packet boundary.
    PartialAddress,
    Copy,
    Done,
}

/// Widest count or address field, in bytes.
const MAX_FIELD_BYTES: usize = 4;

#[derive(Debug)]
pub struct CinitMachine {
    layout: CinitLayout,
    units: Units,
    big_endian: bool,
    host: Endianness,
    state: CinitState,
    /// Field bytes carried over from the previous packet.
    partial: Vec<u8, MAX_FIELD_BYTES>,
    /// Bytes of the table consumed so far.
    consumed: u32,
    /// Bytes of initial data still to copy.
    remaining: u32,
    addr: u32,
    page: u16,
}

impl CinitMachine {
    pub fn new(layout: CinitLayout, units: Units, big_endian: bool, host: Endianness) -> Self {
        Self {
            layout,
            units,
            big_endian,
            host,
            state: CinitState::Count,
            partial: Vec::new(),
            consumed: 0,
            remaining: 0,
            addr: 0,
            page: 0,
        }
    }

    pub fn state(&self) -> CinitState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == CinitState::Done
    }

    /// Consume one packet of the table.
    pub fn feed<I: TargetInitializer + ?Sized>(
        &mut self,
        mut data: &[u8],
        init: &mut I,
    ) -> Result<()> {
        while !data.is_empty() && self.state != CinitState::Done {
            let used = match self.state {
                CinitState::Count => {
                    let align = self.units.tdata_to_byte(self.layout.align);
                    let pad = align_up(self.consumed, align) - self.consumed;
                    if self.partial.is_empty() && pad > 0 {
                        (pad as usize).min(data.len())
                    } else {
                        let width = self.units.tdata_to_byte(self.layout.count) as usize;
                        let (used, value) = self.take_field(data, width)?;
                        if let Some(count) = value {
                            self.start_record(count);
                        }
                        used
                    }
                }
                CinitState::Address | CinitState::PartialAddress => {
                    let width = self.units.tdata_to_byte(self.layout.address) as usize;
                    let (used, value) = self.take_field(data, width)?;
                    match value {
                        Some(raw) => {
                            self.set_address(raw as u32)?;
                            self.state = CinitState::Copy;
                        }
                        None => self.state = CinitState::PartialAddress,
                    }
                    used
                }
                CinitState::Copy => {
                    let n = (self.remaining as usize).min(data.len());
                    let taddr = self.units.tdata_to_taddr(self.addr);
                    if !init.write_memory(taddr, self.page, &data[..n]) {
                        return Err(LoadError::TargetWriteFailed {
                            addr: taddr,
                            len: n,
                        });
                    }
                    self.remaining -= n as u32;
                    if self.remaining == 0 {
                        self.state = CinitState::Count;
                    } else {
                        // Stays below the record's last unit, checked in `set_address`.
                        self.addr += self.units.byte_to_tdata(n as u32);
                    }
                    n
                }
                CinitState::Done => 0,
            };
            self.consumed += used as u32;
            data = &data[used..];
        }
        Ok(())
    }

    /// Accumulate a `width`-byte field. Returns the bytes used and, once the
    /// field is complete, its value.
    fn take_field(&mut self, data: &[u8], width: usize) -> Result<(usize, Option<i32>)> {
        if width == 0 || width > MAX_FIELD_BYTES {
            return Err(LoadError::Implausible {
                what: "cinit field width",
                value: width as u32,
                limit: MAX_FIELD_BYTES as u32,
            });
        }
        let n = (width - self.partial.len()).min(data.len());
        self.partial
            .extend_from_slice(&data[..n])
            .map_err(|_| LoadError::Implausible {
                what: "cinit field width",
                value: width as u32,
                limit: MAX_FIELD_BYTES as u32,
            })?;
        if self.partial.len() < width {
            return Ok((n, None));
        }

        let mut buf = [0u8; MAX_FIELD_BYTES];
        buf[..width].copy_from_slice(&self.partial);
        self.partial.clear();
        let view = AuView::new(&mut buf[..width], self.units.tdata(), self.host);
        let f = Field {
            au: 0,
            offset: 0,
            width: width as u32 * 8,
        };
        let sign = if self.state == CinitState::Count {
            Overflow::Signed
        } else {
            Overflow::Unsigned
        };
        let offset = self.consumed;
        let value = field::unpack(&view, f, self.big_endian, sign).map_err(|source| {
            LoadError::Field {
                section: ".cinit".to_string(),
                offset,
                source,
            }
        })?;
        Ok((n, Some(value)))
    }

    fn start_record(&mut self, count: i32) {
        if count <= 0 {
            tracing::trace!("cinit table ends at byte {}", self.consumed);
            self.state = CinitState::Done;
            return;
        }
        self.remaining = self.units.tdata_to_byte(count as u32);
        self.state = CinitState::Address;
    }

    /// Latch the destination of the current record. The whole record must
    /// fit below the top of the address space.
    fn set_address(&mut self, raw: u32) -> Result<()> {
        let bits = self.layout.address * self.units.tdata().bits();
        if self.layout.page_bits > 0 && self.layout.page_bits < bits {
            let addr_bits = bits - self.layout.page_bits;
            self.page = (raw >> addr_bits) as u16;
            self.addr = raw & ((1u32 << addr_bits) - 1);
        } else {
            self.page = 0;
            self.addr = raw;
        }
        let last = self.units.byte_to_tdata(self.remaining).saturating_sub(1);
        if self.addr.checked_add(last).is_none() {
            return Err(LoadError::Implausible {
                what: "cinit record address",
                value: self.addr,
                limit: u32::MAX - last,
            });
        }
        tracing::trace!(
            "cinit record: {} bytes to {:#x} page {}",
            self.remaining,
            self.addr,
            self.page
        );
        Ok(())
    }
}
