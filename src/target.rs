//! Target-side collaborators.
//!
//! A full load needs somewhere to put sections and a way to write them. Both
//! are supplied by the caller. [`BumpAllocator`] and [`TargetMemory`] are
//! simple in-process implementations, useful for tests and for dumping a
//! loaded image.

use crate::section::SectionInfo;
use crate::units::AuWidth;
use crate::utils::align_up;

/// Places sections in target memory.
pub trait TargetAllocator {
    /// Choose addresses for `info`, updating its `run_addr` and `load_addr`.
    /// `align` is in target AUs. Returns `false` when there is no room.
    fn allocate(&mut self, info: &mut SectionInfo, align: u32) -> bool;

    /// Release a placement made by [`TargetAllocator::allocate`].
    fn deallocate(&mut self, info: &SectionInfo);
}

/// Writes into target memory.
pub trait TargetInitializer {
    /// Copy `data`, a run of target AUs in host order, to `addr`.
    fn write_memory(&mut self, addr: u32, page: u16, data: &[u8]) -> bool;

    /// Set `count` target AUs starting at `addr` to `value`.
    fn fill_memory(&mut self, addr: u32, page: u16, count: u32, value: u8) -> bool;

    /// Start execution at `entry`. Loading never calls this on its own.
    fn execute(&mut self, _entry: u32) -> bool {
        false
    }
}

impl<A: TargetAllocator + ?Sized> TargetAllocator for &mut A {
    fn allocate(&mut self, info: &mut SectionInfo, align: u32) -> bool {
        (**self).allocate(info, align)
    }

    fn deallocate(&mut self, info: &SectionInfo) {
        (**self).deallocate(info)
    }
}

impl<I: TargetInitializer + ?Sized> TargetInitializer for &mut I {
    fn write_memory(&mut self, addr: u32, page: u16, data: &[u8]) -> bool {
        (**self).write_memory(addr, page, data)
    }

    fn fill_memory(&mut self, addr: u32, page: u16, count: u32, value: u8) -> bool {
        (**self).fill_memory(addr, page, count, value)
    }

    fn execute(&mut self, entry: u32) -> bool {
        (**self).execute(entry)
    }
}

/// Bump allocator over one range of target addresses.
///
/// Releasing the most recent placement rolls the bump pointer back. Pages
/// are ignored.
#[derive(Debug, Clone)]
pub struct BumpAllocator {
    base: u32,
    limit: u32,
    next: u32,
    placed: Vec<(u32, u32)>,
}

impl BumpAllocator {
    /// `size` is in target AUs.
    pub fn new(base: u32, size: u32) -> Self {
        Self {
            base,
            limit: base.saturating_add(size),
            next: base,
            placed: Vec::new(),
        }
    }

    /// Number of live placements.
    pub fn placements(&self) -> usize {
        self.placed.len()
    }

    /// First address past the last placement.
    pub fn high_water(&self) -> u32 {
        self.next
    }
}

impl TargetAllocator for BumpAllocator {
    fn allocate(&mut self, info: &mut SectionInfo, align: u32) -> bool {
        let start = align_up(self.next, align.max(1));
        match start.checked_add(info.size) {
            Some(end) if start >= self.next && end <= self.limit => {
                info.run_addr = start;
                info.load_addr = start;
                self.next = end;
                self.placed.push((start, info.size));
                true
            }
            _ => {
                tracing::debug!("no room for {} ({} AUs)", info.name, info.size);
                false
            }
        }
    }

    fn deallocate(&mut self, info: &SectionInfo) {
        if let Some(i) = self.placed.iter().rposition(|&(a, _)| a == info.run_addr) {
            let (addr, size) = self.placed.remove(i);
            if addr + size == self.next {
                self.next = self.placed.last().map_or(self.base, |&(a, s)| a + s);
            }
        }
    }
}

/// A flat target address space backed by a `Vec`. Pages are ignored.
#[derive(Debug)]
pub struct TargetMemory {
    base: u32,
    au: AuWidth,
    bytes: Vec<u8>,
}

impl TargetMemory {
    /// `size` is in target AUs.
    pub fn new(base: u32, size: u32, au: AuWidth) -> Self {
        Self {
            base,
            au,
            bytes: vec![0; size as usize * au.bytes()],
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// An allocator covering exactly this memory.
    pub fn allocator(&self) -> BumpAllocator {
        BumpAllocator::new(self.base, (self.bytes.len() / self.au.bytes()) as u32)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn range(&self, addr: u32, count: u32) -> Option<std::ops::Range<usize>> {
        let first = addr.checked_sub(self.base)? as usize * self.au.bytes();
        let end = first.checked_add(count as usize * self.au.bytes())?;
        (end <= self.bytes.len()).then_some(first..end)
    }

    /// `count` target AUs starting at `addr`.
    pub fn read(&self, addr: u32, count: u32) -> Option<&[u8]> {
        self.range(addr, count).map(|r| &self.bytes[r])
    }
}

impl TargetInitializer for TargetMemory {
    fn write_memory(&mut self, addr: u32, _page: u16, data: &[u8]) -> bool {
        let count = (data.len() / self.au.bytes()) as u32;
        match self.range(addr, count) {
            Some(r) if r.len() == data.len() => {
                self.bytes[r].copy_from_slice(data);
                true
            }
            _ => false,
        }
    }

    fn fill_memory(&mut self, addr: u32, _page: u16, count: u32, value: u8) -> bool {
        match self.range(addr, count) {
            Some(r) => {
                self.bytes[r].fill(value);
                true
            }
            None => false,
        }
    }
}
