//! Constants used across the DCC protocol implementation.
//!
//! This module defines the timing bounds, framing limits, and BiDi (RailCom)
//! cutout window offsets used by the transmit and receive engines.
//!
//! Timing values follow NMRA S-9.1 (electrical) and S-9.2 (packet format);
//! the cutout window offsets follow RCN-217 (RailCom). All durations are in
//! microseconds and assume a 1 MHz timer base (1 tick == 1 µs), which is how
//! the engines hand reload values back to the hardware timer.
//!
//! ## Key Concepts
//!
//! - **Half periods**: the track waveform is self-clocking; each DCC bit is
//!   two half periods of equal nominal length, short for "1", long for "0".
//! - **Preamble minima**: a transmitter must send at least 14 "1" bits of
//!   preamble, while a receiver is only required to detect 10. Both limits
//!   exist here; which one applies depends on which side you are.
//! - **Cutout offsets**: all BiDi offsets are measured from the end of the
//!   packet end bit, per RCN-217.

/// Maximum number of bytes in one DCC packet, including address, data and
/// the trailing XOR checksum byte.
pub const PACKET_CAPACITY: usize = 18;

/// Smallest complete DCC packet: one address byte plus the checksum byte.
pub const PACKET_MIN_LEN: usize = 2;

/// Highest short (7-bit) locomotive address.
pub const MAX_SHORT_ADDRESS: u16 = 127;

/// Highest long (14-bit) locomotive address per NMRA S-9.2.1.
pub const MAX_LONG_ADDRESS: u16 = 10239;

/// The broadcast address. Packets addressed to 0 apply to every decoder.
pub const BROADCAST_ADDRESS: u16 = 0;

/// Minimum number of preamble bits a command station must transmit
/// (NMRA S-9.2). [`Timings::validate`](crate::timings::Timings::validate)
/// enforces this bound.
pub const TX_MIN_PREAMBLE_BITS: u8 = 14;

/// Default transmitter preamble length. Longer than the S-9.2 minimum to
/// leave headroom for the BiDi cutout eating into the preamble.
pub const DEFAULT_PREAMBLE_BITS: u8 = 17;

/// Default number of consecutive "1" bits a decoder requires before it
/// accepts a "0" start bit (NMRA receiver minimum).
pub const RX_PREAMBLE_THRESHOLD: u8 = 10;

/// Lower bound for a transmitted "1" half period in µs (NMRA S-9.1).
pub const BIT1_MIN_US: u8 = 52;

/// Nominal "1" half period in µs.
pub const BIT1_NOMINAL_US: u8 = 58;

/// Upper bound for a transmitted "1" half period in µs.
pub const BIT1_MAX_US: u8 = 64;

/// Lower bound for a transmitted "0" half period in µs.
pub const BIT0_MIN_US: u8 = 90;

/// Nominal "0" half period in µs.
pub const BIT0_NOMINAL_US: u8 = 100;

/// Shortest interval a receiver accepts as a "1" half period, in µs.
pub const RX_BIT1_MIN_US: u32 = 52;

/// Longest interval a receiver accepts as a "1" half period, in µs.
pub const RX_BIT1_MAX_US: u32 = 64;

/// Shortest interval a receiver accepts as a "0" half period, in µs.
pub const RX_BIT0_MIN_US: u32 = 90;

/// Longest interval a receiver accepts as a "0" half period, in µs.
/// Zero bits may be stretched this far for analog-locomotive compatibility.
pub const RX_BIT0_MAX_US: u32 = 10_000;

/// Delay from the end of the packet end bit until the cutout is fully
/// established and the track drivers must be off (RCN-217 `T_CS`).
pub const CUTOUT_START_US: u32 = 26;

/// Start of the BiDi channel 1 window, measured from the packet end bit.
pub const CH1_START_US: u32 = 80;

/// End of the BiDi channel 1 window.
pub const CH1_END_US: u32 = 177;

/// Start of the BiDi channel 2 window.
pub const CH2_START_US: u32 = 193;

/// End of the BiDi channel 2 window.
pub const CH2_END_US: u32 = 454;

/// End of the cutout; track power must be restored by this offset.
pub const CUTOUT_END_US: u32 = 488;

/// Number of raw channel 1 bytes in a BiDi datagram buffer.
pub const BIDI_CH1_LEN: usize = 2;

/// Number of raw channel 2 bytes in a BiDi datagram buffer.
pub const BIDI_CH2_LEN: usize = 6;

/// Total raw bytes captured per cutout cycle (channel 1 then channel 2).
pub const BIDI_DATAGRAM_LEN: usize = BIDI_CH1_LEN + BIDI_CH2_LEN;
