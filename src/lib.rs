//! # dcc-bidi
//!
//! A portable, no_std Rust implementation of the NMRA DCC track protocol
//! for both sides of the rail: a command station transmit engine and a
//! locomotive decoder receive engine, with BiDi (RailCom) cutout support.
//!
//! This crate implements the bit-level protocol in software using:
//! - `embedded-hal` traits for digital I/O and timing
//! - interrupt-driven state machines fed from timer ISRs
//! - interrupt-safe global access with `critical-section`
//! - a DC-balanced 4-of-8 codec for the BiDi return channel
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support (for host-side tests and tools) |
//! | `delay-loop`          | Uses `embedded_hal::delay::DelayNs` for the decoder poll loop |
//! | `timer-isr` (default) | Uses `critical_section::with` for ISR dispatch |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Software Features
//!
//! - **Command station and decoder** in pure software (one timer each)
//! - Bit timing per NMRA S-9.1: 58 µs halves for "1", 100 µs halves for "0"
//! - Packet builders for speed, function, and CV access per NMRA S-9.2.1
//! - BiDi cutout windows and datagram codec per RCN-217
//! - Zero-bit timing override for tolerance testing of decoders under test
//! - Fully portable across ARM Cortex-M and AVR targets
//!
//! ## Usage
//!
//! On the command station side, drive [`station::CommandStation::transmit`]
//! from a period-elapsed timer interrupt and program the returned value
//! into the auto-reload register:
//!
//! ```ignore
//! init_command_station!(PinTrack<PB13, PB14, PB15, PA8>);
//!
//! #[interrupt]
//! fn TIM1_UP() {
//!     let arr = transmit_dcc_timer!();
//!     // write arr to the timer
//! }
//! ```
//!
//! On the decoder side, feed captured edge-to-edge intervals to
//! [`decoder::Decoder::receive`] from an input-capture interrupt and pump
//! [`decoder::Decoder::execute`] from the main loop.
//!
//! ## Integration Notes
//!
//! - Both engines assume a 1 MHz timer base; see [`timer`] for prescaler
//!   helpers.
//! - Timing precision is critical; a hardware timer in one-pulse or
//!   auto-reload-preload mode is recommended.
//! - Only one engine instance per timer should be active in
//!   interrupt-driven mode.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded
//! environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "timer-isr")]
pub use critical_section;

#[cfg(not(feature = "std"))]
pub use heapless;

pub mod bidi;
pub(crate) mod checksum;
pub mod consts;
pub mod decoder;
pub mod packet;
pub mod station;
pub mod timer;
pub mod timings;
