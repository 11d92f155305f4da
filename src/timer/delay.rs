use crate::decoder::{Decoder, DecoderOps};
use embedded_hal::delay::DelayNs;

/// Runs a blocking loop that repeatedly dispatches ready packets on the
/// provided decoder.
///
/// This is the task-context pump for firmware that keeps the capture ISR
/// minimal: the ISR only feeds intervals via
/// [`Decoder::receive`](crate::decoder::Decoder::receive), and this loop
/// picks up completed packets and runs the command callbacks.
///
/// # Arguments
/// - `decoder`: A mutable reference to the receive engine.
/// - `delay`: A delay provider implementing `DelayNs`, typically from the HAL.
/// - `poll_us`: The pause between polls, in microseconds. One full packet
///   takes at least 4.5 ms on the wire, so anything below ~1000 µs loses
///   nothing.
///
/// # Example
/// ```ignore
/// let mut decoder = Decoder::new(Locomotive::new(), 3);
/// run_decoder_poll_loop(&mut decoder, &mut delay, 500);
/// ```
///
/// # Notes
/// - This loop never returns; it is intended for single-purpose polling
///   firmware. Interrupt-driven setups should call
///   [`Decoder::execute`](crate::decoder::Decoder::execute) from their own
///   main loop instead.
pub fn run_decoder_poll_loop<D: DelayNs, O: DecoderOps>(
    decoder: &mut Decoder<O>,
    delay: &mut D,
    poll_us: u32,
) {
    loop {
        let _ = decoder.execute();
        delay.delay_us(poll_us);
    }
}
