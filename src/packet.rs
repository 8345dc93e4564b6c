//! Image packets.
//!
//! A section's payload is stored as a run of packets starting at the
//! section's `context` offset. Each packet is a [`PacketHeader`], up to
//! [`IMAGE_PACKET_SIZE`] bytes of data padded to a word, and then
//! `num_relocs` relocation records. The header checksum covers all three.

use std::mem::size_of;

use crate::checksum::{checksum, checksum_words, is_intact};
use crate::doff::{PacketHeader, RelocRecord, IMAGE_PACKET_SIZE};
use crate::error::{LoadError, Result};
use crate::host::HostSyms;
use crate::module::Module;
use crate::section::SectionInfo;
use crate::stream::Stream;
use crate::utils::doff_align;

/// Padded payload size of a packet, rejecting sizes no packet can have.
pub fn padded_size(header: &PacketHeader) -> Result<usize> {
    if header.packet_size < 0 {
        return Err(LoadError::BadPacketSize(header.packet_size));
    }
    let size = doff_align(header.packet_size as u32);
    if size > IMAGE_PACKET_SIZE {
        return Err(LoadError::BadPacketSize(header.packet_size));
    }
    Ok(size as usize)
}

impl<S: Stream, H: HostSyms> Module<S, H> {
    /// Copy the payload of `info` into `dest`, packet by packet.
    ///
    /// Only sections without relocations can be copied this way. Failures
    /// are counted against the module but leave it usable.
    pub fn get_section(&mut self, info: &SectionInfo, dest: &mut [u8]) -> Result<()> {
        match self.copy_packets(info, dest) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.record(e)),
        }
    }

    fn copy_packets(&mut self, info: &SectionInfo, dest: &mut [u8]) -> Result<()> {
        self.seek(doff_align(info.context))?;
        let mut pos = 0usize;
        for n in 0..info.packet_count.max(0) {
            let header = self.read_packet_header()?;
            let size = padded_size(&header)?;
            let end = pos + size;
            if end > dest.len() {
                return Err(LoadError::DestinationTooSmall {
                    needed: end,
                    len: dest.len(),
                });
            }
            let data = &mut dest[pos..end];
            self.read_exact(data, "image packet")?;
            self.reorder_in_place(data);
            let sum = checksum(data, self.profile.host_order())
                .wrapping_add(checksum_words(header.words()));
            if header.num_relocs != 0 {
                return Err(LoadError::UnsupportedRelocatedPacket(header.num_relocs));
            }
            if !is_intact(sum) {
                return Err(LoadError::ChecksumFailure("image packet"));
            }
            tracing::trace!("{}: packet {} ({} bytes)", info.name, n, header.packet_size);
            pos = end;
        }
        Ok(())
    }

    pub(crate) fn read_packet_header(&mut self) -> Result<PacketHeader> {
        let mut raw = [0u8; PacketHeader::SIZE];
        self.read_exact(&mut raw, "image packet header")?;
        self.reorder_in_place(&mut raw);
        Ok(PacketHeader::parse(&raw, self.profile.host_order()))
    }

    /// Read one packet, relocations included, from the current position.
    ///
    /// `data` must hold at least [`IMAGE_PACKET_SIZE`] bytes; the padded
    /// payload length is returned. The checksum is verified before any
    /// relocation is applied, so callers see the data exactly as stored.
    pub(crate) fn read_packet(
        &mut self,
        data: &mut [u8],
        relocs: &mut Vec<RelocRecord>,
    ) -> Result<(PacketHeader, usize)> {
        let header = self.read_packet_header()?;
        let size = padded_size(&header)?;
        let payload = data
            .get_mut(..size)
            .ok_or(LoadError::DestinationTooSmall {
                needed: size,
                len: IMAGE_PACKET_SIZE as usize,
            })?;
        self.read_exact(payload, "image packet")?;
        self.reorder_in_place(payload);
        let host = self.profile.host_order();
        let mut sum = checksum(payload, host).wrapping_add(checksum_words(header.words()));

        relocs.clear();
        if header.num_relocs < 0 || header.num_relocs as u32 > IMAGE_PACKET_SIZE {
            return Err(LoadError::Implausible {
                what: "relocation count",
                value: header.num_relocs as u32,
                limit: IMAGE_PACKET_SIZE,
            });
        }
        if header.num_relocs > 0 {
            let count = header.num_relocs as usize;
            let reserved = self.reserve(count * size_of::<RelocRecord>())?;
            let mut raw = vec![0u8; count * RelocRecord::SIZE];
            let read = self.read_exact(&mut raw, "relocation records");
            if read.is_ok() {
                self.reorder_in_place(&mut raw);
                sum = sum.wrapping_add(checksum(&raw, host));
                relocs.extend(
                    raw.chunks_exact(RelocRecord::SIZE)
                        .map(|c| RelocRecord::parse(c, host)),
                );
            }
            self.syms.deallocate(reserved);
            read?;
        }

        if !is_intact(sum) {
            return Err(LoadError::ChecksumFailure("image packet"));
        }
        Ok((header, size))
    }
}
