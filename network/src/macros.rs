#[cfg(not(any(feature = "log", feature = "defmt")))]
#[macro_use]
mod silent {
    macro_rules! net_log {
        ($level:ident, $($arg:expr),*) => {{ $( let _ = $arg; )* }}
    }
}

#[cfg(feature = "log")]
#[macro_use]
mod forward {
    macro_rules! net_log {
        (trace, $($arg:expr),*) => { log::trace!($($arg),*) };
        (debug, $($arg:expr),*) => { log::debug!($($arg),*) };
        (warn, $($arg:expr),*) => { log::warn!($($arg),*) };
    }
}

#[cfg(feature = "defmt")]
#[macro_use]
mod forward {
    macro_rules! net_log {
        (trace, $($arg:expr),*) => { defmt::trace!($($arg),*) };
        (debug, $($arg:expr),*) => { defmt::debug!($($arg),*) };
        (warn, $($arg:expr),*) => { defmt::warn!($($arg),*) };
    }
}

macro_rules! net_trace {
    ($($arg:expr),*) => (net_log!(trace, $($arg),*));
}

macro_rules! net_debug {
    ($($arg:expr),*) => (net_log!(debug, $($arg),*));
}

macro_rules! net_warn {
    ($($arg:expr),*) => (net_log!(warn, $($arg),*));
}
