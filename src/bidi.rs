//! BiDi (RailCom) datagram codec.
//!
//! RailCom return-channel bytes are transmitted with a DC-balanced 4-of-8
//! code: each 8-bit symbol on the wire carries 6 payload bits and has
//! exactly four "1" bits, so any single-bit error produces a symbol that is
//! absent from the codebook and gets dropped instead of decoded.
//!
//! A cutout cycle captures up to [`BIDI_DATAGRAM_LEN`] raw bytes (two from
//! channel 1, six from channel 2) into a [`Datagram`] buffer. The
//! [`Dissector`] walks that buffer lazily, decoding symbols and pairing the
//! resulting 6-bit chunks into typed [`Entry`] values. An application entry
//! is 12 bits: a 4-bit ID in the top of the first chunk, then 8 payload
//! bits split across the remainder.
//!
//! ## Functions
//!
//! - [`encode`] / [`decode`]: single-symbol codebook lookups
//! - [`make_app_datagram`]: builds the two wire bytes of one entry
//! - [`Dissector`]: restartable iterator over a received buffer
//!
//! The decode table is derived from the encode table at compile time, so
//! the two can never disagree.

pub use crate::consts::{BIDI_CH1_LEN, BIDI_CH2_LEN, BIDI_DATAGRAM_LEN};

/// Raw received RailCom bytes of one cutout cycle, channel 1 first.
pub type Datagram = [u8; BIDI_DATAGRAM_LEN];

/// The 4-of-8 codebook: index is the 6-bit payload value, entry is the
/// 8-bit wire symbol (always exactly four "1" bits), per RCN-217.
pub static SYMBOLS: [u8; 64] = [
    0xAC, 0xAA, 0xA9, 0xA5, 0xA3, 0xA6, 0x9C, 0x9A, 0x99, 0x95, 0x93, 0x96, 0x8E, 0x8D, 0x8B,
    0xB1, 0xB2, 0xB4, 0xB8, 0x74, 0x72, 0x6C, 0x6A, 0x69, 0x65, 0x63, 0x66, 0x5C, 0x5A, 0x59,
    0x55, 0x53, 0x56, 0x4E, 0x4D, 0x4B, 0x47, 0x71, 0xE8, 0xE4, 0xE2, 0xD1, 0xC9, 0xC5, 0xD8,
    0xD4, 0xD2, 0xCA, 0xC6, 0xCC, 0x78, 0x17, 0x1B, 0x1D, 0x1E, 0x2E, 0x36, 0x3A, 0x27, 0x2B,
    0x2D, 0x35, 0x39, 0x33,
];

/// Acknowledge symbol (not part of the data codebook).
pub const ACK: u8 = 0x0F;

/// Alternative acknowledge symbol.
pub const ACK2: u8 = 0xF0;

/// Decoder-busy symbol.
pub const BUSY: u8 = 0xE1;

const fn build_rev_symbols() -> [Option<u8>; 256] {
    let mut table = [None; 256];
    let mut value = 0;
    while value < SYMBOLS.len() {
        table[SYMBOLS[value] as usize] = Some(value as u8);
        value += 1;
    }
    table
}

static REV_SYMBOLS: [Option<u8>; 256] = build_rev_symbols();

/// Encodes a 6-bit value into its 8-bit wire symbol.
///
/// Only the low 6 bits of `value` are used.
pub fn encode(value: u8) -> u8 {
    SYMBOLS[usize::from(value & 0x3F)]
}

/// Decodes an 8-bit wire symbol back into its 6-bit value.
///
/// Returns `None` for symbols outside the codebook (including [`ACK`],
/// [`ACK2`] and [`BUSY`]), which is how single-bit errors are detected.
pub fn decode(symbol: u8) -> Option<u8> {
    REV_SYMBOLS[usize::from(symbol)]
}

/// Application datagram IDs per RCN-217.
pub mod app {
    /// `app:pom`: CV value answer to an operations mode CV access.
    pub const POM: u8 = 0;
    /// `app:adr_high`: upper address byte broadcast on channel 1.
    pub const ADR_HIGH: u8 = 1;
    /// `app:adr_low`: lower address byte broadcast on channel 1.
    pub const ADR_LOW: u8 = 2;
    /// `app:ext`: extended datagram.
    pub const EXT: u8 = 3;
    /// `app:dyn`: dynamic telemetry (speed, temperature, ...).
    pub const DYN: u8 = 7;
}

/// One decoded application entry from a BiDi datagram.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Entry {
    /// Upper byte of the decoder address (`0x80 | high` for long addresses).
    AdrHigh(u8),
    /// Lower byte of the decoder address.
    AdrLow(u8),
    /// CV value answering an operations mode read.
    Pom(u8),
    /// Dynamic telemetry value (first DV byte).
    Dyn(u8),
    /// Extended datagram payload.
    Ext(u8),
    /// An ID this crate does not interpret.
    Other {
        /// The 4-bit datagram ID.
        id: u8,
        /// The 8-bit payload.
        value: u8,
    },
}

impl Entry {
    fn from_chunks(first: u8, second: u8) -> Self {
        let id = first >> 2;
        let value = ((first & 0x03) << 6) | (second & 0x3F);
        match id {
            app::POM => Entry::Pom(value),
            app::ADR_HIGH => Entry::AdrHigh(value),
            app::ADR_LOW => Entry::AdrLow(value),
            app::EXT => Entry::Ext(value),
            app::DYN => Entry::Dyn(value),
            _ => Entry::Other { id, value },
        }
    }
}

/// Builds the two wire bytes of one application entry.
///
/// The 4-bit `id` lands in the top of the first 6-bit chunk, the 8-bit
/// `value` fills the rest; both chunks are then 4-of-8 encoded.
pub fn make_app_datagram(id: u8, value: u8) -> [u8; 2] {
    let first = ((id & 0x0F) << 2) | (value >> 6);
    let second = value & 0x3F;
    [encode(first), encode(second)]
}

/// Lazy, restartable dissector over one received [`Datagram`].
///
/// Iteration order follows transmission: channel 1 bytes, then channel 2.
/// Invalid symbols are skipped; an entry whose second symbol is invalid is
/// dropped entirely.
#[derive(Clone, Debug)]
pub struct Dissector<'a> {
    bytes: &'a [u8],
    index: usize,
    address: u16,
}

impl<'a> Dissector<'a> {
    /// Creates a dissector over `bytes` for a decoder with the given
    /// address (used by [`addressed_to`](Self::addressed_to)).
    pub fn new(bytes: &'a [u8], address: u16) -> Self {
        Self {
            bytes,
            index: 0,
            address,
        }
    }

    /// Restarts iteration from the first byte.
    pub fn restart(&mut self) {
        self.index = 0;
    }

    /// Scans the datagram for `app:adr` entries and reports whether they
    /// name this dissector's decoder address.
    ///
    /// A lone `AdrLow` matches a short address; an `AdrHigh`/`AdrLow` pair
    /// reassembles a long address.
    pub fn addressed_to(&self) -> bool {
        let mut high: Option<u8> = None;
        let mut clone = self.clone();
        clone.restart();
        for entry in clone {
            match entry {
                Entry::AdrHigh(h) => high = Some(h),
                Entry::AdrLow(l) => {
                    let found = match high.take() {
                        Some(h) => (u16::from(h & 0x3F) << 8) | u16::from(l),
                        None => u16::from(l),
                    };
                    if found == self.address {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn next_chunk(&mut self) -> Option<u8> {
        while self.index < self.bytes.len() {
            let symbol = self.bytes[self.index];
            self.index += 1;
            if let Some(chunk) = decode(symbol) {
                return Some(chunk);
            }
        }
        None
    }
}

impl Iterator for Dissector<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        let first = self.next_chunk()?;
        let second = self.next_chunk()?;
        Some(Entry::from_chunks(first, second))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_symbol_has_four_ones() {
        for symbol in SYMBOLS {
            assert_eq!(symbol.count_ones(), 4, "0x{symbol:02X}");
        }
    }

    #[test]
    fn test_codebook_roundtrip_and_uniqueness() {
        for value in 0..64u8 {
            assert_eq!(decode(encode(value)), Some(value));
        }
    }

    #[test]
    fn test_specials_are_not_data_symbols() {
        assert_eq!(decode(ACK), None);
        assert_eq!(decode(ACK2), None);
        assert_eq!(decode(BUSY), None);
    }

    #[test]
    fn test_dissects_adr_and_dyn_entries() {
        let mut datagram: Datagram = [0; BIDI_DATAGRAM_LEN];
        datagram[..2].copy_from_slice(&make_app_datagram(app::ADR_LOW, 3));
        datagram[2..4].copy_from_slice(&make_app_datagram(app::DYN, 0xED));
        // Remaining zero bytes are invalid symbols and must be skipped.
        let entries: Vec<Entry> = Dissector::new(&datagram, 3).collect();
        assert_eq!(entries, vec![Entry::AdrLow(3), Entry::Dyn(0xED)]);
    }

    #[test]
    fn test_invalid_symbol_drops_the_entry() {
        let bytes = [SYMBOLS[0], 0x00, 0x00, 0x00];
        // First chunk decodes, no valid second chunk follows.
        assert_eq!(Dissector::new(&bytes, 3).next(), None);
    }

    #[test]
    fn test_addressed_to_short_and_long() {
        let mut short: Datagram = [0; BIDI_DATAGRAM_LEN];
        short[..2].copy_from_slice(&make_app_datagram(app::ADR_LOW, 3));
        assert!(Dissector::new(&short, 3).addressed_to());
        assert!(!Dissector::new(&short, 4).addressed_to());

        let mut long: Datagram = [0; BIDI_DATAGRAM_LEN];
        long[..2].copy_from_slice(&make_app_datagram(app::ADR_HIGH, 0x03));
        long[2..4].copy_from_slice(&make_app_datagram(app::ADR_LOW, 0xE8));
        assert!(Dissector::new(&long, 1000).addressed_to());
    }

    #[test]
    fn test_restart_repeats_iteration() {
        let bytes = make_app_datagram(app::POM, 42);
        let mut dissector = Dissector::new(&bytes, 3);
        assert_eq!(dissector.next(), Some(Entry::Pom(42)));
        assert_eq!(dissector.next(), None);
        dissector.restart();
        assert_eq!(dissector.next(), Some(Entry::Pom(42)));
    }
}
