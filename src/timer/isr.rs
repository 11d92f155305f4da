use crate::consts::BIT0_NOMINAL_US;
use crate::decoder::{Decoder, DecoderOps};
use crate::packet::Packet;
use crate::station::{CommandStation, TrackOutputs};
use crate::timings::Timings;
use core::cell::RefCell;
use critical_section::Mutex;

/// Used to initialize the global static [`CommandStation`] for use with
/// `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```ignore
/// static COMMAND_STATION: Mutex<RefCell<Option<CommandStation<Track>>>> =
///     global_station_init::<Track>();
/// ```
pub const fn global_station_init<T: TrackOutputs>()
-> Mutex<RefCell<Option<CommandStation<T>>>> {
    Mutex::new(RefCell::new(None))
}

/// Builds the transmit engine and stores it in the global slot.
///
/// # Arguments
/// * The global static [`CommandStation`]
/// * The track output implementation
/// * The timing configuration
///
/// # Example
/// ```ignore
/// fn main() {
///     global_station_setup(&COMMAND_STATION, track, Timings::default());
/// }
/// ```
pub fn global_station_setup<T: TrackOutputs>(
    global_station: &'static Mutex<RefCell<Option<CommandStation<T>>>>,
    track: T,
    timings: Timings,
) {
    critical_section::with(|cs| {
        let mut station = CommandStation::new(track);
        station.init(timings);
        let _ = global_station.borrow(cs).replace(Some(station));
    });
}

/// Latches a packet into the global transmit engine from thread context.
///
/// # Arguments
/// * The global static [`CommandStation`]
/// * The packet to send at the next boundary
pub fn global_station_packet<T: TrackOutputs>(
    global_station: &'static Mutex<RefCell<Option<CommandStation<T>>>>,
    packet: Packet,
) {
    critical_section::with(|cs| {
        if let Some(station) = global_station.borrow(cs).borrow_mut().as_mut() {
            station.packet(packet);
        }
    });
}

/// Runs one transmit step at each period-elapsed interrupt.
///
/// Returns the reload value for the next half period, or a nominal "0"
/// half period while the engine has not been set up yet.
///
/// # Arguments
/// * The global static [`CommandStation`]
///
/// # Example
/// ```ignore
/// #[interrupt]
/// fn TIM1_UP() {
///     let arr = global_station_transmit(&COMMAND_STATION);
///     // program arr into the timer's auto-reload register
/// }
/// ```
pub fn global_station_transmit<T: TrackOutputs>(
    global_station: &'static Mutex<RefCell<Option<CommandStation<T>>>>,
) -> u32 {
    critical_section::with(|cs| {
        match global_station.borrow(cs).borrow_mut().as_mut() {
            Some(station) => station.transmit(),
            None => u32::from(BIT0_NOMINAL_US),
        }
    })
}

/// Used to initialize the global static [`Decoder`] for use with
/// `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
pub const fn global_decoder_init<O: DecoderOps>() -> Mutex<RefCell<Option<Decoder<O>>>> {
    Mutex::new(RefCell::new(None))
}

/// Builds the receive engine and stores it in the global slot.
///
/// # Arguments
/// * The global static [`Decoder`]
/// * The command callback implementation
/// * The decoder address
pub fn global_decoder_setup<O: DecoderOps>(
    global_decoder: &'static Mutex<RefCell<Option<Decoder<O>>>>,
    ops: O,
    address: u16,
) {
    critical_section::with(|cs| {
        let _ = global_decoder
            .borrow(cs)
            .replace(Some(Decoder::new(ops, address)));
    });
}

/// Feeds one captured edge-to-edge interval at each input-capture
/// interrupt.
///
/// Returns `true` when the interval completed a valid packet, which is the
/// moment to arm the one-shot BiDi cutout timer (see
/// [`ch1_capture_delay`](super::ch1_capture_delay)).
///
/// # Example
/// ```ignore
/// #[interrupt]
/// fn TIM3_CC() {
///     if global_decoder_capture(&DECODER, captured_ticks) {
///         // arm the cutout one-shot
///     }
/// }
/// ```
pub fn global_decoder_capture<O: DecoderOps>(
    global_decoder: &'static Mutex<RefCell<Option<Decoder<O>>>>,
    ticks: u32,
) -> bool {
    critical_section::with(|cs| {
        match global_decoder.borrow(cs).borrow_mut().as_mut() {
            Some(decoder) => {
                decoder.receive(ticks);
                decoder.packet_end()
            }
            None => false,
        }
    })
}

/// Dispatches one ready packet from thread context, if any.
///
/// Call this from the main loop (or use
/// [`run_decoder_poll_loop`](super::run_decoder_poll_loop)); returns `true`
/// when a packet was processed.
pub fn global_decoder_execute<O: DecoderOps>(
    global_decoder: &'static Mutex<RefCell<Option<Decoder<O>>>>,
) -> bool {
    critical_section::with(|cs| {
        match global_decoder.borrow(cs).borrow_mut().as_mut() {
            Some(decoder) => decoder.execute(),
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTrack;
    impl TrackOutputs for NullTrack {
        fn track_outputs(&mut self, _n: bool, _p: bool) {}
    }

    struct NullOps;
    impl DecoderOps for NullOps {}

    static STATION: Mutex<RefCell<Option<CommandStation<NullTrack>>>> =
        global_station_init::<NullTrack>();
    static DECODER: Mutex<RefCell<Option<Decoder<NullOps>>>> = global_decoder_init::<NullOps>();

    #[test]
    fn test_global_station_transmits_after_setup() {
        assert_eq!(
            global_station_transmit(&STATION),
            u32::from(BIT0_NOMINAL_US)
        );
        global_station_setup(&STATION, NullTrack, Timings::default());
        // Preamble "1" halves.
        assert_eq!(global_station_transmit(&STATION), 58);
        assert_eq!(global_station_transmit(&STATION), 58);
    }

    #[test]
    fn test_global_decoder_capture_before_setup_is_inert() {
        assert!(!global_decoder_capture(&DECODER, 58));
        assert!(!global_decoder_execute(&DECODER));
        global_decoder_setup(&DECODER, NullOps, 3);
        assert!(!global_decoder_capture(&DECODER, 58));
    }
}
