#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("the `log` and `defmt` features are mutually exclusive");

#[macro_use]
mod macros;

pub mod config {
    use crate::time::Duration;

    /// UDP port of the station, used for the remote endpoint, the
    /// preferred local binding and subnet discovery.
    pub const Z21_PORT: u16 = 21105;

    /// Time allowed for the answer to each connect handshake request.
    pub const HANDSHAKE_STEP_TIMEOUT: Duration = Duration::from_secs(3);

    /// Period of the keep-alive check.
    pub const KEEP_ALIVE_PERIOD: Duration = Duration::from_secs(45);
    /// Command silence after which the keep-alive check sends traffic.
    pub const KEEP_ALIVE_IDLE: Duration = Duration::from_secs(40);

    /// Time budget a transport should grant a reachability probe.
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

    /// Period of the liveness watchdog.
    pub const WATCHDOG_PERIOD: Duration = Duration::from_secs(5);
    /// Reception silence after which the watchdog starts probing.
    pub const WATCHDOG_SILENCE: Duration = Duration::from_secs(15);
    /// Consecutive failed probes that declare the connection lost.
    pub const PROBE_FAILURE_LIMIT: u8 = 3;

    /// Time a requested loco info waits for its paired mode answer
    /// before it is emitted without one.
    pub const PAIRING_TIMEOUT: Duration = Duration::from_secs(3);

    /// Delay before the first RailCom poll after subscribing.
    pub const RAILCOM_POLL_DELAY: Duration = Duration::from_secs(1);
    /// Period of the RailCom polling cycle.
    pub const RAILCOM_POLL_PERIOD: Duration = Duration::from_secs(2);

    /// Width of a turnout switching pulse.
    pub const TURNOUT_PULSE: Duration = Duration::from_millis(100);
    /// Settle time after the off-pulse of a turnout command.
    pub const TURNOUT_SETTLE: Duration = Duration::from_millis(50);

    /// Default time budget for subnet discovery.
    pub const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(3000);
}

pub mod client;
pub mod phy;
pub mod time;
pub mod wire;

#[cfg(feature = "std")]
pub mod discovery;
