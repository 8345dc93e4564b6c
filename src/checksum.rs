//! Checksums and byte-lane reordering.
//!
//! A DOFF file, viewed as a sequence of 32-bit words, reads the same on big-
//! and little-endian hosts once the per-file reorder map is honoured. The
//! map is recovered from the fixed `byte_reshuffle` marker in the file
//! header.
//!
//! Every checksummed structure carries a checksum word chosen so that the
//! wrapping sum of all its words, the checksum included, is all ones.

use object::endian::{Endian, Endianness};

/// Sum a checksummed structure must reach to be considered intact.
pub const ALL_ONES: u32 = 0xFFFF_FFFF;

/// XOR applied to the raw marker to obtain a reorder map.
const MAP_TRANSLATION: u32 = 0x0303_0303;

/// Accumulate 32-bit words with wrapping addition.
pub fn checksum_words<I: IntoIterator<Item = u32>>(words: I) -> u32 {
    words.into_iter().fold(0u32, |sum, w| sum.wrapping_add(w))
}

/// Checksum `data` viewed as host-order 32-bit words.
///
/// A trailing partial word is ignored; DOFF records and packets are always
/// padded to a word boundary.
pub fn checksum(data: &[u8], host: Endianness) -> u32 {
    checksum_words(data.chunks_exact(4).map(|c| read_word(c, host)))
}

/// Checksum `data` as it would read after reordering with `map`, without
/// modifying it.
pub fn checksum_reordered(data: &[u8], host: Endianness, map: Option<ReorderMap>) -> u32 {
    match map {
        None => checksum(data, host),
        Some(map) => checksum_words(
            data.chunks_exact(4)
                .map(|c| map.permute(read_word(c, host))),
        ),
    }
}

/// Whether a running sum marks an intact structure.
pub const fn is_intact(sum: u32) -> bool {
    sum == ALL_ONES
}

/// Value to store in a checksum field so the structure verifies.
pub const fn complement(sum_without_checksum: u32) -> u32 {
    !sum_without_checksum
}

#[inline]
fn read_word(chunk: &[u8], host: Endianness) -> u32 {
    host.read_u32_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
}

/// Per-file byte-lane permutation.
///
/// Byte lane `i` (counting from the least significant byte of a host-order
/// word) moves to lane `map.lane(i)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReorderMap(u32);

impl ReorderMap {
    /// The map of a file whose byte order already matches the host.
    pub const IDENTITY: ReorderMap = ReorderMap(0x0302_0100);

    /// Full byte swap within each 32-bit word.
    pub const SWAP: ReorderMap = ReorderMap(0x0001_0203);

    /// Translate the raw `byte_reshuffle` marker, as read in host order, into
    /// a map.
    pub const fn from_marker(raw: u32) -> Self {
        Self(raw ^ MAP_TRANSLATION)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_identity(self) -> bool {
        self.0 == Self::IDENTITY.0
    }

    /// A map with lane indices outside 0..=3 cannot have come from a valid
    /// marker.
    pub const fn is_plausible(self) -> bool {
        self.0 & 0xFCFC_FCFC == 0
    }

    /// Destination lane of source lane `i`.
    pub const fn lane(self, i: u32) -> u32 {
        (self.0 >> (8 * i)) & 0x3
    }

    /// Permute the byte lanes of one word.
    pub const fn permute(self, word: u32) -> u32 {
        let mut out = 0;
        let mut i = 0;
        while i < 4 {
            let byte = (word >> (8 * i)) & 0xFF;
            out |= byte << (8 * self.lane(i));
            i += 1;
        }
        out
    }

    /// Reorder every complete 32-bit word of `data` in place.
    pub fn apply(self, data: &mut [u8], host: Endianness) {
        for chunk in data.chunks_exact_mut(4) {
            let word = self.permute(read_word(chunk, host));
            chunk.copy_from_slice(&host.write_u32_bytes(word));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_translation() {
        assert!(ReorderMap::from_marker(0x0001_0203).is_identity());
        assert_eq!(ReorderMap::from_marker(0x0302_0100), ReorderMap::SWAP);
        assert!(ReorderMap::SWAP.is_plausible());
        assert!(!ReorderMap::from_marker(0xDEAD_BEEF).is_plausible());
    }

    #[test]
    fn swap_map_reverses_lanes() {
        assert_eq!(ReorderMap::SWAP.permute(0x1122_3344), 0x4433_2211);
        assert_eq!(ReorderMap::IDENTITY.permute(0x1122_3344), 0x1122_3344);
    }

    #[test]
    fn apply_swaps_bytes_on_either_host() {
        for host in [Endianness::Little, Endianness::Big] {
            let mut data = [1u8, 2, 3, 4, 5, 6, 7, 8];
            ReorderMap::SWAP.apply(&mut data, host);
            assert_eq!(data, [4, 3, 2, 1, 8, 7, 6, 5]);
        }
    }

    #[test]
    fn checksum_complement_is_all_ones() {
        let words = [0x1234_5678u32, 0xFFFF_0000, 7];
        let sum = checksum_words(words);
        let total = checksum_words(words.into_iter().chain([complement(sum)]));
        assert!(is_intact(total));
    }

    #[test]
    fn reordered_checksum_matches_in_place_reorder() {
        let host = Endianness::Little;
        let data = [9u8, 8, 7, 6, 5, 4, 3, 2];
        let mut copy = data;
        ReorderMap::SWAP.apply(&mut copy, host);
        assert_eq!(
            checksum_reordered(&data, host, Some(ReorderMap::SWAP)),
            checksum(&copy, host)
        );
    }

    #[test]
    fn reorder_twice_is_identity() {
        bolero::check!()
            .with_type::<Vec<u8>>()
            .for_each(|data: &Vec<u8>| {
                let mut work = data.clone();
                ReorderMap::SWAP.apply(&mut work, Endianness::Little);
                ReorderMap::SWAP.apply(&mut work, Endianness::Little);
                assert_eq!(&work, data);
            });
    }

    #[test]
    fn single_bit_flip_breaks_checksum() {
        bolero::check!()
            .with_type::<(Vec<u32>, u16)>()
            .for_each(|(words, bit): &(Vec<u32>, u16)| {
                if words.is_empty() {
                    return;
                }
                let mut record: Vec<u32> = words.clone();
                record.push(complement(checksum_words(words.iter().copied())));
                assert!(is_intact(checksum_words(record.iter().copied())));

                let bit = *bit as usize % (record.len() * 32);
                record[bit / 32] ^= 1 << (bit % 32);
                assert!(!is_intact(checksum_words(record.iter().copied())));
            });
    }
}
