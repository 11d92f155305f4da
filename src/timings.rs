//! Transmit timing configuration and the bit/timing table.
//!
//! A [`Timings`] value captures everything the transmit engine needs to turn
//! a logical bit into a half-period reload value: the preamble length, the
//! two nominal half-bit durations, and the behavioral flags (BiDi cutout,
//! output inversion, scope trigger). It is handed to
//! [`CommandStation::init`](crate::station::CommandStation::init) once and
//! owned by the engine until the next `init` call.
//!
//! [`half_period`] is the pure bit/timing table: no side effects, no error
//! cases. Durations are validated up front by [`Timings::validate`] against
//! the NMRA S-9.1 bounds, so the per-interrupt path never has to.

use crate::consts::{
    BIT0_MIN_US, BIT0_NOMINAL_US, BIT1_MAX_US, BIT1_MIN_US, BIT1_NOMINAL_US, DEFAULT_PREAMBLE_BITS,
    TX_MIN_PREAMBLE_BITS,
};
use thiserror::Error;

/// A single DCC bit value.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Bit {
    /// Long half periods (nominally 100 µs each).
    Zero,
    /// Short half periods (nominally 58 µs each).
    One,
}

impl From<bool> for Bit {
    fn from(value: bool) -> Self {
        if value { Bit::One } else { Bit::Zero }
    }
}

/// Behavioral flags for the transmit engine.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TimingsFlags {
    /// Open a BiDi (RailCom) cutout window after every packet.
    pub bidi: bool,
    /// Swap the N and P track polarities.
    pub invert: bool,
    /// Raise the diagnostic trigger output during the first preamble bit of
    /// every packet, for oscilloscope-based verification.
    pub trigger_first_bit: bool,
}

/// Validation failures for a [`Timings`] value.
#[derive(Error, PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TimingsError {
    /// Fewer preamble bits than the NMRA S-9.2 transmitter minimum of 14.
    #[error("preamble of {0} bits is below the NMRA transmitter minimum")]
    PreambleTooShort(u8),
    /// The "1" half period is outside the 52..=64 µs S-9.1 band.
    #[error("bit1 half period of {0} µs is outside the 52..=64 µs band")]
    Bit1OutOfRange(u8),
    /// The "0" half period is below the 90 µs S-9.1 floor.
    #[error("bit0 half period of {0} µs is below the 90 µs floor")]
    Bit0OutOfRange(u8),
}

/// Timing configuration for one transmit engine instance.
///
/// Fields are public so a caller (or a test) can assemble arbitrary timings;
/// [`Timings::new`] is the checked path and is what production code should
/// use. The engine itself does not re-validate; the bounds are enforced at
/// configuration time so the interrupt path never has to.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Timings {
    /// Number of "1" bits transmitted before each packet.
    pub num_preamble: u8,
    /// Half period of a "1" bit in µs.
    pub bit1_duration: u8,
    /// Half period of a "0" bit in µs.
    pub bit0_duration: u8,
    /// Behavioral flags.
    pub flags: TimingsFlags,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            num_preamble: DEFAULT_PREAMBLE_BITS,
            bit1_duration: BIT1_NOMINAL_US,
            bit0_duration: BIT0_NOMINAL_US,
            flags: TimingsFlags::default(),
        }
    }
}

impl Timings {
    /// Builds a validated `Timings`.
    ///
    /// # Errors
    /// Returns the first [`TimingsError`] found, checking the preamble
    /// length, then the "1" duration, then the "0" duration.
    pub fn new(
        num_preamble: u8,
        bit1_duration: u8,
        bit0_duration: u8,
        flags: TimingsFlags,
    ) -> Result<Self, TimingsError> {
        let timings = Self {
            num_preamble,
            bit1_duration,
            bit0_duration,
            flags,
        };
        timings.validate()?;
        Ok(timings)
    }

    /// Checks this configuration against the NMRA transmitter bounds.
    ///
    /// # Errors
    /// See [`TimingsError`].
    pub fn validate(&self) -> Result<(), TimingsError> {
        if self.num_preamble < TX_MIN_PREAMBLE_BITS {
            return Err(TimingsError::PreambleTooShort(self.num_preamble));
        }
        if self.bit1_duration < BIT1_MIN_US || self.bit1_duration > BIT1_MAX_US {
            return Err(TimingsError::Bit1OutOfRange(self.bit1_duration));
        }
        if self.bit0_duration < BIT0_MIN_US {
            return Err(TimingsError::Bit0OutOfRange(self.bit0_duration));
        }
        Ok(())
    }
}

/// Maps a logical bit to its half-period reload value in timer ticks
/// (1 tick == 1 µs).
///
/// This value becomes the auto-reload register content for the *next* half
/// period; the waveform is produced by toggling track polarity every time
/// this many ticks elapse.
pub fn half_period(bit: Bit, timings: &Timings) -> u32 {
    match bit {
        Bit::One => u32::from(timings.bit1_duration),
        Bit::Zero => u32::from(timings.bit0_duration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings_are_valid() {
        assert_eq!(Timings::default().validate(), Ok(()));
    }

    #[test]
    fn test_half_period_uses_configured_durations() {
        let timings = Timings::default();
        assert_eq!(half_period(Bit::One, &timings), 58);
        assert_eq!(half_period(Bit::Zero, &timings), 100);
    }

    #[test]
    fn test_short_preamble_rejected() {
        let err = Timings::new(2, 58, 100, TimingsFlags::default());
        assert_eq!(err, Err(TimingsError::PreambleTooShort(2)));
    }

    #[test]
    fn test_bit1_band_enforced() {
        assert_eq!(
            Timings::new(17, 51, 100, TimingsFlags::default()),
            Err(TimingsError::Bit1OutOfRange(51))
        );
        assert_eq!(
            Timings::new(17, 65, 100, TimingsFlags::default()),
            Err(TimingsError::Bit1OutOfRange(65))
        );
        assert!(Timings::new(17, 52, 100, TimingsFlags::default()).is_ok());
        assert!(Timings::new(17, 64, 100, TimingsFlags::default()).is_ok());
    }

    #[test]
    fn test_bit0_floor_enforced() {
        assert_eq!(
            Timings::new(17, 58, 89, TimingsFlags::default()),
            Err(TimingsError::Bit0OutOfRange(89))
        );
        assert!(Timings::new(17, 58, 90, TimingsFlags::default()).is_ok());
    }
}
