//! DCC packet model and NMRA S-9.2.1 packet builders.
//!
//! A [`Packet`] is a bounded byte sequence holding one DCC message ready for
//! transmission or just received: address byte(s), instruction/data bytes,
//! and a trailing XOR checksum. It is a plain array plus a length so it can
//! be copied in and out of interrupt context without allocation.
//!
//! The `make_*` builder functions assemble the common message types. Each
//! builder validates its arguments; out-of-range input yields the **empty
//! packet sentinel** (`len() == 0`) rather than an error type, because the
//! consumers run in interrupt-adjacent contexts where "nothing to send this
//! cycle" is the only sane degraded behavior.
//!
//! ## Address encoding
//!
//! - `0`: broadcast, single byte `0x00`
//! - `1..=127`: short address, single byte
//! - `128..=10239`: long address, `0xC0 | hi` then `lo`
//!
//! CV addresses are 0-based throughout the crate: CV1 is `cv_addr` 0, which
//! matches the index the decoder callbacks use.

use crate::checksum::xor_checksum;
use crate::consts::{BROADCAST_ADDRESS, MAX_LONG_ADDRESS, MAX_SHORT_ADDRESS, PACKET_CAPACITY};

/// One DCC packet: a fixed-capacity byte sequence with a valid XOR checksum
/// as its last byte (unless empty).
///
/// The empty packet (`len() == 0`) is the shared "invalid/nothing" sentinel
/// produced by builders on bad input and treated by the transmit engine as
/// "skip this cycle".
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Packet {
    bytes: [u8; PACKET_CAPACITY],
    len: u8,
}

impl Packet {
    /// The empty packet sentinel.
    pub const fn new() -> Self {
        Self {
            bytes: [0; PACKET_CAPACITY],
            len: 0,
        }
    }

    /// Copies `bytes` verbatim into a packet, checksum included.
    ///
    /// Returns the empty sentinel when `bytes` exceeds [`PACKET_CAPACITY`].
    /// No checksum validation happens here; this is the raw entry point used
    /// by custom/test packet loading.
    pub fn from_raw(bytes: &[u8]) -> Self {
        let mut packet = Self::new();
        if bytes.len() > PACKET_CAPACITY {
            return packet;
        }
        packet.bytes[..bytes.len()].copy_from_slice(bytes);
        packet.len = bytes.len() as u8;
        packet
    }

    /// Number of bytes in the packet, checksum included.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Whether this is the empty/invalid sentinel.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The packet bytes, checksum included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    fn push(&mut self, byte: u8) {
        // Capacity is checked by the builders before pushing.
        self.bytes[self.len()] = byte;
        self.len += 1;
    }

    /// Appends one byte, reporting overflow instead of panicking. Used by
    /// the receive engine's framing loop.
    pub(crate) fn push_checked(&mut self, byte: u8) -> bool {
        if self.len() >= PACKET_CAPACITY {
            return false;
        }
        self.push(byte);
        true
    }

    /// Empties the packet. Used by the receive engine when framing restarts.
    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends the XOR of all current bytes as the checksum byte.
    fn seal(mut self) -> Self {
        let sum = xor_checksum(self.as_bytes());
        self.push(sum);
        self
    }
}

/// Appends the one- or two-byte address encoding, or returns `false` when
/// the address is out of range.
fn push_address(packet: &mut Packet, address: u16) -> bool {
    if address == BROADCAST_ADDRESS {
        packet.push(0x00);
        true
    } else if address <= MAX_SHORT_ADDRESS {
        packet.push(address as u8);
        true
    } else if address <= MAX_LONG_ADDRESS {
        packet.push(0xC0 | (address >> 8) as u8);
        packet.push(address as u8);
        true
    } else {
        false
    }
}

/// The idle packet. Sent whenever nothing else is queued.
pub fn make_idle_packet() -> Packet {
    Packet::from_raw(&[0xFF, 0x00, 0xFF])
}

/// The digital decoder reset packet. Entering service mode starts with a
/// sequence of these.
pub fn make_reset_packet() -> Packet {
    Packet::from_raw(&[0x00, 0x00, 0x00])
}

/// Function group one (F0–F4) packet.
///
/// `state` carries F0 in bit 0 through F4 in bit 4; the instruction byte is
/// `0x80 | state`. Bits above bit 4 must be clear.
pub fn make_function_group_f4_f0_packet(address: u16, state: u8) -> Packet {
    if state > 0b1_1111 {
        return Packet::new();
    }
    let mut packet = Packet::new();
    if !push_address(&mut packet, address) {
        return Packet::new();
    }
    packet.push(0x80 | state);
    packet.seal()
}

/// Advanced operations (128 speed step) packet.
///
/// `speed_and_dir` carries the direction in bit 7 (1 = forward) and the
/// speed step in bits 0–6 (0 = stop, 1 = emergency stop).
pub fn make_advanced_operations_speed_packet(address: u16, speed_and_dir: u8) -> Packet {
    let mut packet = Packet::new();
    if !push_address(&mut packet, address) {
        return Packet::new();
    }
    packet.push(0x3F);
    packet.push(speed_and_dir);
    packet.seal()
}

/// Operations mode CV access, long form, verify byte.
///
/// `cv_addr` is 0-based (CV1 == 0) and must be below 1024.
pub fn make_cv_access_long_verify_packet(address: u16, cv_addr: u16, byte: u8) -> Packet {
    make_cv_access_long(address, 0b01, cv_addr, byte)
}

/// Operations mode CV access, long form, write byte.
///
/// `cv_addr` is 0-based (CV1 == 0) and must be below 1024.
pub fn make_cv_access_long_write_packet(address: u16, cv_addr: u16, byte: u8) -> Packet {
    make_cv_access_long(address, 0b11, cv_addr, byte)
}

fn make_cv_access_long(address: u16, op: u8, cv_addr: u16, byte: u8) -> Packet {
    if cv_addr >= 1024 {
        return Packet::new();
    }
    let mut packet = Packet::new();
    if !push_address(&mut packet, address) {
        return Packet::new();
    }
    packet.push(0xE0 | (op << 2) | (cv_addr >> 8) as u8);
    packet.push(cv_addr as u8);
    packet.push(byte);
    packet.seal()
}

/// Service mode direct CV access, verify byte. No address bytes; only valid
/// while the decoder is in service mode.
pub fn make_service_mode_verify_packet(cv_addr: u16, byte: u8) -> Packet {
    make_service_mode(0b01, cv_addr, byte)
}

/// Service mode direct CV access, write byte.
pub fn make_service_mode_write_packet(cv_addr: u16, byte: u8) -> Packet {
    make_service_mode(0b11, cv_addr, byte)
}

fn make_service_mode(op: u8, cv_addr: u16, byte: u8) -> Packet {
    if cv_addr >= 1024 {
        return Packet::new();
    }
    let mut packet = Packet::new();
    packet.push(0x70 | (op << 2) | (cv_addr >> 8) as u8);
    packet.push(cv_addr as u8);
    packet.push(byte);
    packet.seal()
}
