//! Timer setup and scheduling utilities for the DCC engines.
//!
//! Both engines assume a 1 MHz timer base (1 tick == 1 µs): the transmit
//! engine returns auto-reload values in ticks, and the receive engine
//! consumes captured edge-to-edge intervals in ticks. This module holds the
//! glue that does not fit in either engine: prescaler calculators to derive
//! the 1 MHz base from the timer input clock, one-shot delays for arming
//! the BiDi channel windows, and two scheduling front ends:
//! - `global_*` functions and the companion macros: interrupt-based
//!   dispatch through `critical_section::with` (feature `timer-isr`)
//! - `run_decoder_poll_loop`: blocking task-context pump over
//!   `embedded_hal::delay::DelayNs` (feature `delay-loop`)
//!
//! Common timer clocks: (for use with `compute_prescaler` and
//! `const_prescaler`)
//!
//! | F_TIMER | PSC register | Tick  |
//! |---------|--------------|-------|
//! |   8 MHz |            7 |  1 µs |
//! |  16 MHz |           15 |  1 µs |
//! |  64 MHz |           63 |  1 µs |
//! |  72 MHz |           71 |  1 µs |

use crate::consts::{CH1_START_US, CH2_START_US};
use libm::round;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use macros::*;

/// The timer tick rate both engines are written against.
pub const TIMER_HZ: u32 = 1_000_000;

/// Computes the prescaler register value that divides `f_timer` down to
/// the 1 MHz engine tick rate.
///
/// # Arguments
/// - `f_timer`: timer input clock in Hz (e.g. 72_000_000)
///
/// # Returns
/// - The PSC register value (divider minus one, rounded to nearest)
pub fn compute_prescaler(f_timer: u32) -> u16 {
    let divider = round(f64::from(f_timer) / f64::from(TIMER_HZ));
    (divider as u16).saturating_sub(1)
}

/// Compile-time prescaler calculator.
///
/// Same contract as [`compute_prescaler`], usable in a `const` context for
/// baking the register value into firmware configuration tables.
pub const fn const_prescaler(f_timer: u32) -> u16 {
    let divider = (f_timer + TIMER_HZ / 2) / TIMER_HZ;
    (divider as u16).saturating_sub(1)
}

/// One-shot delay for arming the BiDi channel 1 receiver, in ticks.
///
/// Started from the packet end bit (see
/// [`Decoder::packet_end`](crate::decoder::Decoder::packet_end));
/// `overhead_us` compensates for the interrupt latency between the final
/// captured edge and the timer actually starting.
pub fn ch1_capture_delay(overhead_us: u32) -> u32 {
    CH1_START_US.saturating_sub(overhead_us)
}

/// One-shot delay for arming the BiDi channel 2 receiver, in ticks.
///
/// Same reference point and `overhead_us` convention as
/// [`ch1_capture_delay`].
pub fn ch2_capture_delay(overhead_us: u32) -> u32 {
    CH2_START_US.saturating_sub(overhead_us)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prescaler_for_common_clocks() {
        assert_eq!(compute_prescaler(8_000_000), 7);
        assert_eq!(compute_prescaler(16_000_000), 15);
        assert_eq!(compute_prescaler(72_000_000), 71);
    }

    #[test]
    fn test_const_and_runtime_prescalers_agree() {
        for f_timer in [1_000_000, 8_000_000, 48_000_000, 64_000_000, 170_000_000] {
            assert_eq!(compute_prescaler(f_timer), const_prescaler(f_timer));
        }
    }

    #[test]
    fn test_prescaler_rounds_to_nearest() {
        // 72.4 MHz rounds down to a divider of 72, 72.6 MHz up to 73.
        assert_eq!(compute_prescaler(72_400_000), 71);
        assert_eq!(compute_prescaler(72_600_000), 72);
    }

    #[test]
    fn test_capture_delays_subtract_overhead() {
        assert_eq!(ch1_capture_delay(0), 80);
        assert_eq!(ch1_capture_delay(5), 75);
        assert_eq!(ch2_capture_delay(5), 188);
        // Excess overhead saturates instead of wrapping.
        assert_eq!(ch1_capture_delay(100), 0);
    }
}
