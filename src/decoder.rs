//! Decoder-side receive engine.
//!
//! [`Decoder`] reconstructs DCC packets from edge-to-edge intervals. It is
//! advanced from an input-capture interrupt via
//! [`receive()`](Decoder::receive), which classifies each captured half
//! period as a "1" or "0" half, pairs halves into bits, hunts for the
//! preamble, and frames bytes into a packet buffer. Decode and dispatch run
//! later, in task context, via [`execute()`](Decoder::execute). The only
//! shared state between the two is the ready-packet slot and the
//! [`packet_end()`](Decoder::packet_end) flag, written by the ISR and
//! read-and-cleared by the one consuming task.
//!
//! ```text
//! Hunting(count "1"s) -> Byte(8 bits) -> AfterByte -+-> Byte (sep "0")
//!                ^                                  |
//!                +----------- end bit "1" ----------+
//! ```
//!
//! Garbled input is expected on a physically noisy rail: intervals outside
//! both tolerance bands, half-period mismatches, buffer overflow and
//! checksum failures all reset the engine to preamble hunting without ever
//! surfacing an error.
//!
//! Decoded commands are dispatched through the [`DecoderOps`] trait, the
//! polymorphic extension surface a concrete locomotive decoder implements.
//! When a packet was addressed to this decoder, `execute()` also assembles
//! the BiDi reply (channel 1 `app:adr`, plus `app:pom` after a CV access)
//! and hands the encoded bytes to
//! [`DecoderOps::transmit_bidi`] for the UART to push out during the next
//! cutout.

use crate::bidi::{app, make_app_datagram};
use crate::checksum::checksum_ok;
use crate::consts::{
    BIDI_DATAGRAM_LEN, BROADCAST_ADDRESS, PACKET_MIN_LEN, RX_BIT0_MAX_US, RX_BIT0_MIN_US,
    RX_BIT1_MAX_US, RX_BIT1_MIN_US, RX_PREAMBLE_THRESHOLD,
};
use crate::packet::Packet;
use crate::timings::Bit;

/// Callback surface for decoded commands.
///
/// Every hook has a no-op (or zero-returning) default so an implementation
/// only overrides the capabilities its hardware actually has.
pub trait DecoderOps {
    /// Speed step command (0 = stop, 1 = emergency stop, 2..=127 moving).
    fn speed(&mut self, _address: u16, _speed: i32) {}

    /// Direction command; `true` is forward.
    fn direction(&mut self, _address: u16, _forward: bool) {}

    /// Function group command. `mask` marks which function bits are
    /// meaningful in `state`; bit 0 is F0.
    fn function(&mut self, _address: u16, _mask: u32, _state: u32) {}

    /// Reads a CV; `cv_addr` is 0-based. Out-of-range reads return 0.
    fn read_cv(&mut self, _cv_addr: u32) -> u8 {
        0
    }

    /// Writes a CV and returns the stored value. Out-of-range writes are a
    /// no-op returning 0.
    fn write_cv(&mut self, _cv_addr: u32, _byte: u8) -> u8 {
        0
    }

    /// Service mode entered (`true`) or left (`false`).
    fn service_mode(&mut self, _active: bool) {}

    /// Basic acknowledgement pulse requested (service mode).
    fn service_ack(&mut self) {}

    /// Encoded BiDi reply bytes to transmit during the next cutout.
    fn transmit_bidi(&mut self, _bytes: &[u8]) {}
}

/// Framing state of the receive engine.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum RxPhase {
    /// Counting consecutive "1" bits until a start bit arrives.
    Hunting { ones: u8 },
    /// Accumulating the 8 data bits of one byte, MSB first.
    Byte { acc: u8, nbits: u8 },
    /// Between bytes: "0" starts another byte, "1" ends the packet.
    AfterByte,
}

/// The decoder-side receive engine.
#[derive(Debug)]
pub struct Decoder<O: DecoderOps> {
    /// The command callbacks. Public so the surrounding task can reach its
    /// own state after wiring the decoder into a global.
    pub ops: O,
    address: u16,
    preamble_threshold: u8,
    phase: RxPhase,
    prev_half: Option<Bit>,
    buffer: Packet,
    ready: Option<Packet>,
    packet_end: bool,
    in_service: bool,
    adr_toggle: bool,
    /// Counter of successfully framed, checksum-valid packets.
    pub rx_good: u16,
    /// Counter of framing or checksum failures.
    pub rx_bad: u16,
}

fn classify(ticks: u32) -> Option<Bit> {
    if (RX_BIT1_MIN_US..=RX_BIT1_MAX_US).contains(&ticks) {
        Some(Bit::One)
    } else if (RX_BIT0_MIN_US..=RX_BIT0_MAX_US).contains(&ticks) {
        Some(Bit::Zero)
    } else {
        None
    }
}

impl<O: DecoderOps> Decoder<O> {
    /// Creates a receive engine for a decoder listening on `address`.
    pub fn new(ops: O, address: u16) -> Self {
        Self {
            ops,
            address,
            preamble_threshold: RX_PREAMBLE_THRESHOLD,
            phase: RxPhase::Hunting { ones: 0 },
            prev_half: None,
            buffer: Packet::new(),
            ready: None,
            packet_end: false,
            in_service: false,
            adr_toggle: false,
            rx_good: 0,
            rx_bad: 0,
        }
    }

    /// Resets accumulator and framing state. Call while the capture
    /// interrupt is disabled.
    pub fn init(&mut self) {
        self.phase = RxPhase::Hunting { ones: 0 };
        self.prev_half = None;
        self.buffer.clear();
        self.ready = None;
        self.packet_end = false;
        self.in_service = false;
    }

    /// Changes the decoder address future packets are matched against.
    pub fn set_address(&mut self, address: u16) {
        self.address = address;
    }

    /// Changes how many consecutive "1" bits are required before a start
    /// bit is accepted. The NMRA receiver minimum is 10.
    pub fn set_preamble_threshold(&mut self, bits: u8) {
        self.preamble_threshold = bits;
    }

    /// The per-capture entry point: consumes one edge-to-edge interval in
    /// ticks (1 µs each).
    pub fn receive(&mut self, ticks: u32) {
        let Some(half) = classify(ticks) else {
            self.reset_hunting();
            return;
        };
        match self.prev_half.take() {
            None => self.prev_half = Some(half),
            Some(prev) if prev == half => self.process_bit(half),
            Some(prev) => {
                // Odd number of halves so far: the transition realigns us.
                // The dangling half still counts as a full bit of its kind,
                // and the current half opens the next bit.
                self.process_bit(prev);
                self.prev_half = Some(half);
            }
        }
    }

    /// True exactly once per fully framed, checksum-valid packet. The
    /// caller uses this to arm the one-shot cutout timer.
    pub fn packet_end(&mut self) -> bool {
        let end = self.packet_end;
        self.packet_end = false;
        end
    }

    fn reset_hunting(&mut self) {
        self.phase = RxPhase::Hunting { ones: 0 };
        self.prev_half = None;
        self.buffer.clear();
    }

    fn process_bit(&mut self, bit: Bit) {
        match self.phase {
            RxPhase::Hunting { ones } => {
                if bit == Bit::One {
                    self.phase = RxPhase::Hunting {
                        ones: ones.saturating_add(1),
                    };
                } else if ones >= self.preamble_threshold {
                    self.buffer.clear();
                    self.phase = RxPhase::Byte { acc: 0, nbits: 0 };
                } else {
                    self.phase = RxPhase::Hunting { ones: 0 };
                }
            }
            RxPhase::Byte { acc, nbits } => {
                let acc = (acc << 1) | u8::from(bit == Bit::One);
                if nbits + 1 == 8 {
                    if self.buffer.push_checked(acc) {
                        self.phase = RxPhase::AfterByte;
                    } else {
                        self.rx_bad = self.rx_bad.wrapping_add(1);
                        self.reset_hunting();
                    }
                } else {
                    self.phase = RxPhase::Byte {
                        acc,
                        nbits: nbits + 1,
                    };
                }
            }
            RxPhase::AfterByte => {
                if bit == Bit::Zero {
                    self.phase = RxPhase::Byte { acc: 0, nbits: 0 };
                } else {
                    if self.buffer.len() >= PACKET_MIN_LEN && checksum_ok(self.buffer.as_bytes()) {
                        self.ready = Some(self.buffer);
                        self.packet_end = true;
                        self.rx_good = self.rx_good.wrapping_add(1);
                    } else {
                        self.rx_bad = self.rx_bad.wrapping_add(1);
                    }
                    // The end bit doubles as the first preamble bit.
                    self.phase = RxPhase::Hunting { ones: 1 };
                    self.buffer.clear();
                }
            }
        }
    }

    /// Task-context pump: decodes and dispatches one ready packet, if any.
    ///
    /// Returns `true` when a packet was processed. Checksum-invalid frames
    /// never get here; they were dropped inside the capture path.
    pub fn execute(&mut self) -> bool {
        let Some(packet) = self.ready.take() else {
            return false;
        };
        let bytes = packet.as_bytes();

        // Digital decoder reset: enter service mode.
        if bytes.iter().all(|&b| b == 0) {
            if !self.in_service {
                self.in_service = true;
                self.ops.service_mode(true);
            }
            return true;
        }

        // Service mode direct CV access carries no address bytes.
        if self.in_service && (0x70..=0x7F).contains(&bytes[0]) {
            self.execute_service(bytes);
            return true;
        }
        if self.in_service {
            self.in_service = false;
            self.ops.service_mode(false);
        }

        // Idle packet.
        if bytes[0] == 0xFF {
            return true;
        }

        let (address, data) = match bytes[0] {
            address @ 0..=127 => (u16::from(address), &bytes[1..bytes.len() - 1]),
            address @ 0xC0..=0xE7 => {
                if bytes.len() < PACKET_MIN_LEN + 2 {
                    return true;
                }
                (
                    (u16::from(address & 0x3F) << 8) | u16::from(bytes[1]),
                    &bytes[2..bytes.len() - 1],
                )
            }
            // Accessory and reserved address partitions.
            _ => return true,
        };

        if data.is_empty() || (address != BROADCAST_ADDRESS && address != self.address) {
            return true;
        }

        let ch2 = self.dispatch(address, data);

        if address == self.address && address != BROADCAST_ADDRESS {
            self.send_bidi_reply(ch2);
        }
        true
    }

    fn dispatch(&mut self, address: u16, data: &[u8]) -> Option<[u8; 2]> {
        let instruction = data[0];
        match instruction {
            // Advanced operations: 128 speed step control.
            0x3F if data.len() >= 2 => {
                let forward = data[1] & 0x80 != 0;
                let step = i32::from(data[1] & 0x7F);
                self.ops.direction(address, forward);
                self.ops.speed(address, step);
                #[cfg(feature = "log")]
                log::debug!("decoder {address}: speed {step} fwd={forward}");
                #[cfg(feature = "defmt-0-3")]
                defmt::debug!("decoder {}: speed {} fwd={}", address, step, forward);
                None
            }
            // Function group one, F0-F4.
            0x80..=0x9F => {
                self.ops
                    .function(address, 0x1F, u32::from(instruction & 0x1F));
                None
            }
            // Operations mode CV access, long form.
            0xE0..=0xEF if data.len() >= 3 => {
                let op = (instruction >> 2) & 0b11;
                let cv_addr = (u32::from(instruction & 0b11) << 8) | u32::from(data[1]);
                match op {
                    0b01 => {
                        let value = self.ops.read_cv(cv_addr);
                        Some(make_app_datagram(app::POM, value))
                    }
                    0b11 => {
                        let stored = self.ops.write_cv(cv_addr, data[2]);
                        Some(make_app_datagram(app::POM, stored))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn execute_service(&mut self, bytes: &[u8]) {
        if bytes.len() < 4 {
            return;
        }
        let op = (bytes[0] >> 2) & 0b11;
        let cv_addr = (u32::from(bytes[0] & 0b11) << 8) | u32::from(bytes[1]);
        let value = bytes[2];
        match op {
            0b01 => {
                if self.ops.read_cv(cv_addr) == value {
                    self.ops.service_ack();
                }
            }
            0b11 => {
                let _ = self.ops.write_cv(cv_addr, value);
                self.ops.service_ack();
            }
            _ => {}
        }
    }

    /// Channel 1 always answers with `app:adr`, alternating high and low
    /// byte; a CV access appends its `app:pom` answer for channel 2.
    fn send_bidi_reply(&mut self, ch2: Option<[u8; 2]>) {
        let adr = if self.adr_toggle {
            make_app_datagram(app::ADR_LOW, self.address as u8)
        } else {
            let high = if self.address > 127 {
                0x80 | (self.address >> 8) as u8
            } else {
                0
            };
            make_app_datagram(app::ADR_HIGH, high)
        };
        self.adr_toggle = !self.adr_toggle;

        let mut reply: heapless::Vec<u8, BIDI_DATAGRAM_LEN> = heapless::Vec::new();
        let _ = reply.extend_from_slice(&adr);
        if let Some(pom) = ch2 {
            let _ = reply.extend_from_slice(&pom);
        }
        self.ops.transmit_bidi(&reply);
    }
}
