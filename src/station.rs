//! Command station transmit engine.
//!
//! [`CommandStation`] turns queued [`Packet`]s into the precisely timed
//! two-level (N/P) track waveform. It is advanced exclusively by calling
//! [`transmit()`](CommandStation::transmit) from a timer
//! period-elapsed interrupt: each call drives the track outputs for one
//! half-bit period, advances the phase cursor, and returns the tick count
//! the caller must program into the timer's auto-reload register before the
//! current period expires.
//!
//! ```text
//! Preamble -> Data(start bit + 8 bits per byte, end bit)
//!          -> [CutoutStart -> CutoutCh1 -> CutoutCh2 -> CutoutEnd]  (bidi)
//!          -> Preamble ...
//! ```
//!
//! Side effects go through the [`TrackOutputs`] trait: track polarity, the
//! BiDi cutout hooks, and an optional scope trigger. [`PinTrack`] is the
//! stock implementation over `embedded-hal` output pins; a custom
//! implementation can drive BSRR registers or a gate driver directly.
//!
//! The interrupt path allocates nothing, takes no locks, and contains only
//! bounded branches. Everything mutable is owned by the engine; the only
//! cross-context channel is the single-slot pending-packet latch written by
//! [`packet()`](CommandStation::packet) and consumed at a packet boundary
//! (latest value wins).
//!
//! ## Zero-bit override
//!
//! A RAM-only test mechanism perturbs the timing of individual "0" bits: a
//! 64-bit position mask selects packet-section bits (start bits count,
//! preamble does not), and two signed µs deltas are added to the P and N
//! half periods of any selected bit that is a "0". "1" bits are never
//! touched; the override is cleared by `init()` and is intentionally not
//! persisted anywhere.

use crate::consts::{CH1_START_US, CH2_START_US, CUTOUT_END_US, PACKET_MIN_LEN};
use crate::packet::{Packet, make_idle_packet};
use crate::timings::{Bit, Timings, half_period};
use core::convert::Infallible;
use embedded_hal::digital::OutputPin;

/// Which half of the current bit is on the track.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Half {
    /// First half period; the P rail is driven.
    P,
    /// Second half period; the N rail is driven.
    N,
}

/// Transmit engine phase.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TxPhase {
    /// Sending preamble "1" bits; `bit` counts from 0.
    Preamble {
        /// Preamble bit index.
        bit: u8,
    },
    /// Sending the packet section; `pos` indexes start/data/end bits.
    Data {
        /// Packet-section bit position (start bits included).
        pos: u8,
    },
    /// Track drivers just switched off, cutout established.
    CutoutStart,
    /// Channel 1 window opened.
    CutoutCh1,
    /// Channel 2 window opened.
    CutoutCh2,
    /// Cutout over; power returns with the next preamble bit.
    CutoutEnd,
}

/// Per-bit-position timing perturbation for "0" bits.
///
/// Held in RAM only and reset on [`CommandStation::init`]; see the module
/// docs for the bit-position convention.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ZeroBitOverride {
    /// Selects packet-section bit positions 0..63.
    pub mask: u64,
    /// Signed µs delta added to the P half period of selected "0" bits.
    pub delta_p: i32,
    /// Signed µs delta added to the N half period of selected "0" bits.
    pub delta_n: i32,
}

impl ZeroBitOverride {
    fn apply(&self, ticks: u32, position: u8, half: Half) -> u32 {
        if position >= 64 || self.mask & (1u64 << position) == 0 {
            return ticks;
        }
        let delta = match half {
            Half::P => self.delta_p,
            Half::N => self.delta_n,
        };
        ticks.saturating_add_signed(delta)
    }
}

/// Side-effect surface of the transmit engine.
///
/// `track_outputs` is called once per half period and must be cheap; the
/// BiDi hooks fire once per cutout phase and typically toggle enable pins,
/// set a DAC comparator threshold, or arm a UART receiver.
pub trait TrackOutputs {
    /// Drives the N and P track rails.
    fn track_outputs(&mut self, n: bool, p: bool);

    /// The cutout window just opened; track drivers are already off.
    fn bidi_start(&mut self) {}

    /// The channel 1 receive window starts now.
    fn bidi_channel1(&mut self) {}

    /// The channel 2 receive window starts now.
    fn bidi_channel2(&mut self) {}

    /// The cutout is over; power returns with the next half period.
    fn bidi_end(&mut self) {}

    /// Diagnostic trigger output, raised during the first preamble bit when
    /// [`TimingsFlags::trigger_first_bit`](crate::timings::TimingsFlags)
    /// is set.
    fn trigger(&mut self, _active: bool) {}
}

/// [`TrackOutputs`] implementation over `embedded-hal` output pins.
///
/// Pin errors are ignored; on the MCUs this crate targets, GPIO writes are
/// infallible and the interrupt path has no way to report them anyway.
#[derive(Debug)]
pub struct PinTrack<N, P, EN, TR>
where
    N: OutputPin,
    P: OutputPin,
    EN: OutputPin,
    TR: OutputPin,
{
    /// N rail driver pin.
    pub n: N,
    /// P rail driver pin.
    pub p: P,
    /// Optional BiDi receiver enable pin, high during the cutout.
    pub bidi_enable: Option<EN>,
    /// Optional scope trigger pin.
    pub trigger: Option<TR>,
}

impl<N, P, EN, TR> PinTrack<N, P, EN, TR>
where
    N: OutputPin,
    P: OutputPin,
    EN: OutputPin,
    TR: OutputPin,
{
    /// Creates a pin-backed track output with both rails driven low.
    pub fn new(mut n: N, mut p: P, bidi_enable: Option<EN>, trigger: Option<TR>) -> Self {
        let _ = n.set_low();
        let _ = p.set_low();
        Self {
            n,
            p,
            bidi_enable,
            trigger,
        }
    }

    fn write(pin: &mut impl OutputPin, state: bool) {
        if state {
            let _ = pin.set_high();
        } else {
            let _ = pin.set_low();
        }
    }
}

impl<N, P, EN, TR> TrackOutputs for PinTrack<N, P, EN, TR>
where
    N: OutputPin,
    P: OutputPin,
    EN: OutputPin,
    TR: OutputPin,
{
    fn track_outputs(&mut self, n: bool, p: bool) {
        Self::write(&mut self.n, n);
        Self::write(&mut self.p, p);
    }

    fn bidi_start(&mut self) {
        if let Some(ref mut en) = self.bidi_enable {
            Self::write(en, true);
        }
    }

    fn bidi_end(&mut self) {
        if let Some(ref mut en) = self.bidi_enable {
            Self::write(en, false);
        }
    }

    fn trigger(&mut self, active: bool) {
        if let Some(ref mut tr) = self.trigger {
            Self::write(tr, active);
        }
    }
}

/// The command station transmit engine.
///
/// Exactly one packet is in flight at a time. A new packet submitted via
/// [`packet()`](Self::packet) lands in the pending slot and is swapped in at
/// the next packet boundary; when nothing is pending the engine repeats the
/// idle packet.
#[derive(Debug)]
pub struct CommandStation<T: TrackOutputs> {
    /// The side-effect hooks. Public so callers can reach the pins after
    /// the engine is dropped into a global.
    pub track: T,
    timings: Timings,
    phase: TxPhase,
    half: Half,
    current: Packet,
    pending: Option<Packet>,
    repeat: u32,
    zero_bit: ZeroBitOverride,
    /// Counter of fully transmitted packets.
    pub packets_sent: u32,
}

impl<T: TrackOutputs> CommandStation<T> {
    /// Creates an engine with default [`Timings`], idling.
    pub fn new(track: T) -> Self {
        Self {
            track,
            timings: Timings::default(),
            phase: TxPhase::Preamble { bit: 0 },
            half: Half::P,
            current: make_idle_packet(),
            pending: None,
            repeat: 0,
            zero_bit: ZeroBitOverride::default(),
            packets_sent: 0,
        }
    }

    /// Resets all transmit state and stores a new configuration.
    ///
    /// Must only be called while the update interrupt is disabled; the
    /// engine must not be mid-transmission.
    pub fn init(&mut self, timings: Timings) {
        self.timings = timings;
        self.phase = TxPhase::Preamble { bit: 0 };
        self.half = Half::P;
        self.current = make_idle_packet();
        self.pending = None;
        self.repeat = 0;
        self.zero_bit = ZeroBitOverride::default();
    }

    /// Latches `packet` into the pending slot, to be taken over at the next
    /// packet boundary. Never blocks, never touches hardware; the empty
    /// sentinel is ignored.
    pub fn packet(&mut self, packet: Packet) {
        if packet.is_empty() {
            return;
        }
        self.pending = Some(packet);
    }

    /// Latches a raw byte sequence (checksum included, not validated) for
    /// transmission. Returns `false` when `bytes` cannot form a packet.
    pub fn load_custom_packet(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() < PACKET_MIN_LEN {
            return false;
        }
        let packet = Packet::from_raw(bytes);
        if packet.is_empty() {
            return false;
        }
        self.pending = Some(packet);
        true
    }

    /// Repeats the next latched packet `count` extra times before falling
    /// back to idle. Pairs with [`load_custom_packet`](Self::load_custom_packet)
    /// for scripted test transmissions.
    pub fn trigger_transmit(&mut self, count: u32) {
        self.repeat = count;
    }

    /// Installs the zero-bit override parameters.
    pub fn set_zero_bit_override(&mut self, zero_bit: ZeroBitOverride) {
        self.zero_bit = zero_bit;
    }

    /// The active zero-bit override parameters.
    pub fn zero_bit_override(&self) -> ZeroBitOverride {
        self.zero_bit
    }

    /// Clears the zero-bit override.
    pub fn reset_zero_bit_override(&mut self) {
        self.zero_bit = ZeroBitOverride::default();
    }

    /// The active timing configuration.
    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Ready when the pending slot has been consumed; `WouldBlock` while a
    /// latched packet is still waiting for its boundary.
    pub fn flush(&self) -> nb::Result<(), Infallible> {
        if self.pending.is_some() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    /// The per-interrupt entry point: drives the track outputs for the
    /// current half period, advances the state machine, and returns the
    /// reload value (ticks, 1 µs each) for the next period.
    pub fn transmit(&mut self) -> u32 {
        match self.phase {
            TxPhase::CutoutStart => {
                self.track.track_outputs(false, false);
                self.track.bidi_start();
                self.phase = TxPhase::CutoutCh1;
                return CH1_START_US;
            }
            TxPhase::CutoutCh1 => {
                self.track.bidi_channel1();
                self.phase = TxPhase::CutoutCh2;
                return CH2_START_US - CH1_START_US;
            }
            TxPhase::CutoutCh2 => {
                self.track.bidi_channel2();
                self.phase = TxPhase::CutoutEnd;
                return CUTOUT_END_US - CH2_START_US;
            }
            TxPhase::CutoutEnd => {
                // The cutout consumed the first preamble bit; power comes
                // back with its P half, driven below.
                self.track.bidi_end();
                self.next_packet();
                self.phase = TxPhase::Preamble { bit: 0 };
                self.half = Half::P;
            }
            TxPhase::Preamble { .. } | TxPhase::Data { .. } => {}
        }

        let bit = match self.phase {
            TxPhase::Data { pos } => self.packet_bit(pos),
            _ => Bit::One,
        };

        let (n, p) = self.polarity();
        self.track.track_outputs(n, p);
        if self.timings.flags.trigger_first_bit
            && matches!(self.phase, TxPhase::Preamble { bit: 0 })
        {
            self.track.trigger(self.half == Half::P);
        }

        let mut ticks = half_period(bit, &self.timings);
        if bit == Bit::Zero {
            if let TxPhase::Data { pos } = self.phase {
                ticks = self.zero_bit.apply(ticks, pos, self.half);
            }
        }

        self.advance();
        ticks
    }

    fn polarity(&self) -> (bool, bool) {
        let p_half = self.half == Half::P;
        if self.timings.flags.invert {
            (p_half, !p_half)
        } else {
            (!p_half, p_half)
        }
    }

    /// Packet-section bit at `pos`: per byte a "0" start bit then 8 data
    /// bits MSB first; one "1" end bit after the checksum byte.
    fn packet_bit(&self, pos: u8) -> Bit {
        let pos = usize::from(pos);
        let byte_index = pos / 9;
        let within = pos % 9;
        if byte_index >= self.current.len() {
            Bit::One
        } else if within == 0 {
            Bit::Zero
        } else {
            Bit::from(self.current.as_bytes()[byte_index] & (0x80 >> (within - 1)) != 0)
        }
    }

    fn section_bits(&self) -> usize {
        self.current.len() * 9 + 1
    }

    fn next_packet(&mut self) {
        if let Some(packet) = self.pending.take() {
            self.current = packet;
        } else if self.repeat > 0 {
            self.repeat -= 1;
        } else {
            self.current = make_idle_packet();
        }
    }

    fn advance(&mut self) {
        match self.half {
            Half::P => self.half = Half::N,
            Half::N => {
                self.half = Half::P;
                self.phase = match self.phase {
                    TxPhase::Preamble { bit } => {
                        if bit + 1 >= self.timings.num_preamble {
                            TxPhase::Data { pos: 0 }
                        } else {
                            TxPhase::Preamble { bit: bit + 1 }
                        }
                    }
                    TxPhase::Data { pos } => {
                        if usize::from(pos) + 1 >= self.section_bits() {
                            self.packets_sent += 1;
                            if self.timings.flags.bidi {
                                TxPhase::CutoutStart
                            } else {
                                self.next_packet();
                                TxPhase::Preamble { bit: 0 }
                            }
                        } else {
                            TxPhase::Data { pos: pos + 1 }
                        }
                    }
                    other => other,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::make_function_group_f4_f0_packet;
    use crate::timings::TimingsFlags;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    /// Records hook invocations without touching hardware.
    #[derive(Default)]
    struct Recorder {
        outputs: Vec<(bool, bool)>,
        hooks: Vec<&'static str>,
        triggers: Vec<bool>,
    }

    impl TrackOutputs for Recorder {
        fn track_outputs(&mut self, n: bool, p: bool) {
            self.outputs.push((n, p));
        }
        fn bidi_start(&mut self) {
            self.hooks.push("start");
        }
        fn bidi_channel1(&mut self) {
            self.hooks.push("ch1");
        }
        fn bidi_channel2(&mut self) {
            self.hooks.push("ch2");
        }
        fn bidi_end(&mut self) {
            self.hooks.push("end");
        }
        fn trigger(&mut self, active: bool) {
            self.triggers.push(active);
        }
    }

    fn station() -> CommandStation<Recorder> {
        let mut station = CommandStation::new(Recorder::default());
        station.init(Timings::default());
        station
    }

    /// Collects half-period durations for `halves` transmit calls.
    fn run(station: &mut CommandStation<Recorder>, halves: usize) -> Vec<u32> {
        (0..halves).map(|_| station.transmit()).collect()
    }

    #[test]
    fn test_preamble_is_short_halves_with_alternating_polarity() {
        let mut station = station();
        let ticks = run(&mut station, 34); // 17 preamble bits, 2 halves each
        assert!(ticks.iter().all(|&t| t == 58));
        for pair in station.track.outputs.chunks(2) {
            assert_eq!(pair, [(false, true), (true, false)]);
        }
    }

    #[test]
    fn test_idle_packet_follows_preamble() {
        let mut station = station();
        let ticks = run(&mut station, 34 + 4);
        // Start bit of the first idle byte: two long halves.
        assert_eq!(&ticks[34..], &[100, 100, 58, 58]);
    }

    #[test]
    fn test_reinit_is_idempotent() {
        let mut station = station();
        station.init(Timings::default());
        let first = station.transmit();
        station.init(Timings::default());
        assert_eq!(station.transmit(), first);
    }

    #[test]
    fn test_pending_packet_swaps_only_at_boundary() {
        let mut station = station();
        let packet = make_function_group_f4_f0_packet(3, 1);
        station.packet(packet);
        assert_eq!(station.flush(), Err(nb::Error::WouldBlock));
        // Idle packet first: 17 preamble + 3*9+1 section bits.
        let idle_halves = (17 + 28) * 2;
        let _ = run(&mut station, idle_halves);
        assert_eq!(station.flush(), Ok(()));
        assert_eq!(station.packets_sent, 1);
        // Now transmitting the latched packet; skip its preamble and the
        // address start bit, then check the address byte 0x03.
        let ticks = run(&mut station, (17 + 1) * 2 + 16);
        let address_bits: Vec<u32> = ticks[36..].to_vec();
        let expected = [58u32; 16]
            .iter()
            .enumerate()
            .map(|(i, _)| if i < 12 { 100 } else { 58 }) // 0b0000_0011
            .collect::<Vec<u32>>();
        assert_eq!(address_bits, expected);
    }

    #[test]
    fn test_empty_sentinel_is_ignored() {
        let mut station = station();
        station.packet(Packet::new());
        assert_eq!(station.flush(), Ok(()));
    }

    #[test]
    fn test_custom_packet_with_trigger_repeats() {
        let mut station = station();
        assert!(station.load_custom_packet(&[0x03, 0x81, 0x82]));
        station.trigger_transmit(2);
        // Idle, then the custom packet three times (1 + 2 repeats).
        let idle_halves = (17 + 28) * 2;
        let custom_halves = (17 + 28) * 2;
        let _ = run(&mut station, idle_halves + 3 * custom_halves);
        assert_eq!(station.packets_sent, 4);
        // Next boundary falls back to idle: byte 0xFF means eight short
        // halves right after the start bit.
        let ticks = run(&mut station, (17 + 1) * 2 + 2);
        assert_eq!(&ticks[36..], &[58, 58]);
    }

    #[test]
    fn test_zero_bit_override_never_touches_one_bits() {
        let mut station = station();
        // 0xFF data bits sit at section positions 1..=8.
        assert!(station.load_custom_packet(&[0xFF, 0x00, 0xFF]));
        let baseline: Vec<u32> = {
            let mut s = station;
            let _ = run(&mut s, (17 + 28) * 2); // idle
            run(&mut s, (17 + 28) * 2)
        };

        let mut station = self::station();
        assert!(station.load_custom_packet(&[0xFF, 0x00, 0xFF]));
        station.set_zero_bit_override(ZeroBitOverride {
            mask: 0b1_1111_1110, // positions 1..=8, all "1" bits
            delta_p: 20,
            delta_n: -20,
        });
        let _ = run(&mut station, (17 + 28) * 2);
        let with_override = run(&mut station, (17 + 28) * 2);
        assert_eq!(baseline, with_override);
    }

    #[test]
    fn test_zero_bit_override_shifts_masked_zero_bit() {
        let mut station = station();
        station.set_zero_bit_override(ZeroBitOverride {
            mask: 0b1, // position 0: the address start bit
            delta_p: 20,
            delta_n: -20,
        });
        let ticks = run(&mut station, 34 + 4);
        assert_eq!(&ticks[34..36], &[120, 80]);
        // Position 1 (a "1" of 0xFF) stays nominal.
        assert_eq!(&ticks[36..], &[58, 58]);
    }

    #[test]
    fn test_override_accessors_and_reset() {
        let mut station = station();
        let params = ZeroBitOverride {
            mask: 0x04,
            delta_p: 15,
            delta_n: -15,
        };
        station.set_zero_bit_override(params);
        assert_eq!(station.zero_bit_override(), params);
        station.reset_zero_bit_override();
        assert_eq!(station.zero_bit_override(), ZeroBitOverride::default());
    }

    #[test]
    fn test_cutout_sequence_durations_and_hooks() {
        let mut station = CommandStation::new(Recorder::default());
        station.init(Timings {
            flags: TimingsFlags {
                bidi: true,
                ..TimingsFlags::default()
            },
            ..Timings::default()
        });
        let section_halves = (17 + 28) * 2;
        let _ = run(&mut station, section_halves);
        // Four cutout calls: established, ch1 at 80 µs, ch2 at 193 µs,
        // power back by 488 µs.
        let cutout = run(&mut station, 4);
        assert_eq!(&cutout[..3], &[80, 113, 295]);
        assert_eq!(cutout[3], 58); // first preamble bit resumes
        assert_eq!(station.track.hooks, vec!["start", "ch1", "ch2", "end"]);
        // Track was forced off when the cutout opened.
        assert_eq!(
            station.track.outputs[section_halves],
            (false, false)
        );
    }

    #[test]
    fn test_trigger_marks_first_preamble_bit() {
        let mut station = CommandStation::new(Recorder::default());
        station.init(Timings {
            flags: TimingsFlags {
                trigger_first_bit: true,
                ..TimingsFlags::default()
            },
            ..Timings::default()
        });
        let _ = run(&mut station, 6);
        assert_eq!(station.track.triggers, vec![true, false]);
    }

    #[test]
    fn test_pin_track_drives_rails() {
        let n = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let p = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ]);
        let mut track: PinTrack<_, _, PinMock, PinMock> = PinTrack::new(n, p, None, None);
        track.track_outputs(false, true);
        track.track_outputs(true, false);
        track.n.done();
        track.p.done();
    }
}
