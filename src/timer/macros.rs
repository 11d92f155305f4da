/// Declares a static global `COMMAND_STATION` instance protected by a
/// `critical_section` mutex.
///
/// This macro creates a `static` singleton suitable for interrupt-based
/// firmware, where both the main thread and the period-elapsed ISR need to
/// safely access the shared transmit engine.
///
/// # Arguments
/// - `$track`: The concrete type of the track output implementation (must
///   implement [`TrackOutputs`](crate::station::TrackOutputs))
///
/// # Example
/// ```ignore
/// init_command_station!(PinTrack<PB13, PB14, PB15, PA8>);
/// ```
#[macro_export]
macro_rules! init_command_station {
    ( $track:ty ) => {
        pub static COMMAND_STATION: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$crate::station::CommandStation<$track>>>,
        > = $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
    };
}

/// Initializes the global `COMMAND_STATION` singleton with a new engine.
///
/// Wraps construction of the [`CommandStation`](crate::station::CommandStation)
/// and stores it inside the global declared by [`init_command_station!`].
///
/// # Arguments
/// - `$track`: The track output implementation value
/// - `$timings`: The [`Timings`](crate::timings::Timings) configuration
///
/// # Example
/// ```ignore
/// fn main() {
///     setup_command_station!(track, Timings::default());
/// }
/// ```
///
/// # Notes
/// - Must be called before the transmit timer interrupt is enabled.
/// - Requires `init_command_station!` to have been used earlier.
#[macro_export]
macro_rules! setup_command_station {
    ( $track:expr, $timings:expr ) => {
        $crate::critical_section::with(|cs| {
            let mut station = $crate::station::CommandStation::new($track);
            station.init($timings);
            let _ = COMMAND_STATION.borrow(cs).replace(Some(station));
        });
    };
}

/// Runs one transmit step on the global `COMMAND_STATION` and evaluates to
/// the reload value for the next half period.
///
/// Intended to be invoked from the period-elapsed timer ISR. While the
/// engine has not been set up yet it evaluates to a nominal "0" half
/// period, so the timer keeps a harmless cadence.
///
/// # Example
/// ```ignore
/// #[interrupt]
/// fn TIM1_UP() {
///     let arr = transmit_dcc_timer!();
///     // program arr into the auto-reload register
/// }
/// ```
#[macro_export]
macro_rules! transmit_dcc_timer {
    () => {
        $crate::critical_section::with(|cs| {
            match COMMAND_STATION.borrow(cs).borrow_mut().as_mut() {
                Some(station) => station.transmit(),
                None => u32::from($crate::consts::BIT0_NOMINAL_US),
            }
        })
    };
}

/// Declares a static global `DCC_DECODER` instance protected by a
/// `critical_section` mutex.
///
/// # Arguments
/// - `$ops`: The concrete type of the command callback implementation
///   (must implement [`DecoderOps`](crate::decoder::DecoderOps))
///
/// # Example
/// ```ignore
/// init_dcc_decoder!(Locomotive);
/// ```
#[macro_export]
macro_rules! init_dcc_decoder {
    ( $ops:ty ) => {
        pub static DCC_DECODER: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$crate::decoder::Decoder<$ops>>>,
        > = $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
    };
}

/// Initializes the global `DCC_DECODER` singleton.
///
/// # Arguments
/// - `$ops`: The command callback implementation value
/// - `$address`: The decoder address to listen on
///
/// # Example
/// ```ignore
/// fn main() {
///     setup_dcc_decoder!(Locomotive::new(), 3);
/// }
/// ```
#[macro_export]
macro_rules! setup_dcc_decoder {
    ( $ops:expr, $address:expr ) => {
        $crate::critical_section::with(|cs| {
            let _ = DCC_DECODER
                .borrow(cs)
                .replace(Some($crate::decoder::Decoder::new($ops, $address)));
        });
    };
}

/// Feeds one captured interval to the global `DCC_DECODER` and evaluates
/// to `true` when it completed a valid packet.
///
/// Intended to be invoked from the input-capture ISR; a `true` result is
/// the moment to arm the one-shot BiDi cutout timer.
///
/// # Example
/// ```ignore
/// #[interrupt]
/// fn TIM3_CC() {
///     if capture_dcc_timer!(captured_ticks) {
///         // arm the cutout one-shot
///     }
/// }
/// ```
///
/// # Notes
/// - Safe to call before setup; it evaluates to `false` until the decoder
///   has been initialized via `setup_dcc_decoder!`.
#[macro_export]
macro_rules! capture_dcc_timer {
    ( $ticks:expr ) => {
        $crate::critical_section::with(|cs| {
            match DCC_DECODER.borrow(cs).borrow_mut().as_mut() {
                Some(decoder) => {
                    decoder.receive($ticks);
                    decoder.packet_end()
                }
                None => false,
            }
        })
    };
}

/// Dispatches one ready packet on the global `DCC_DECODER` from thread
/// context, evaluating to `true` when a packet was processed.
///
/// # Example
/// ```ignore
/// loop {
///     let _ = execute_dcc_decoder!();
/// }
/// ```
#[macro_export]
macro_rules! execute_dcc_decoder {
    () => {
        $crate::critical_section::with(|cs| {
            match DCC_DECODER.borrow(cs).borrow_mut().as_mut() {
                Some(decoder) => decoder.execute(),
                None => false,
            }
        })
    };
}
