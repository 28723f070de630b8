//! The polled client session.
//!
//! [`Client`] owns every piece of session state but no socket and no
//! clock: datagrams and timestamps enter through [`poll`](Client::poll),
//! commands leave through an egress queue drained by the same call, and
//! decoded traffic surfaces as [`Event`]s dequeued with
//! [`next_event`](Client::next_event). [`poll_at`](Client::poll_at)
//! reports the next deadline so callers can sleep between polls.

use core::fmt;

use heapless::{Deque, FnvIndexMap, FnvIndexSet, Vec};

use z21_core::bcast::BroadcastFlags;
use z21_core::feedback::RBUS_GROUP_COUNT;
use z21_core::loco::{
    to_native_speed, DecoderProtocol, Direction, LocoAddress, LocoInfo, NativeSpeedSteps,
};
use z21_core::station::{Capabilities, FirmwareVersion, HardwareInfo, SystemState, Z21Code};
use z21_core::turnout::{TurnoutAddress, TurnoutPosition};

use crate::config;
use crate::phy::{Device, LinkHealth, RxToken as _, TxToken as _};
use crate::time::Instant;
use crate::wire::{self, construct, Datagrams, DecodeContext, FrameBuffer, Message};

mod event;
mod subscription;

pub use self::event::{Event, EventCategory, SessionState};
pub use self::subscription::Subscription;

use self::subscription::Ledger;

const EVENT_QUEUE_DEPTH: usize = 32;
const EGRESS_QUEUE_DEPTH: usize = 16;
const PENDING_LOCO_DEPTH: usize = 8;
const RAILCOM_CYCLE_DEPTH: usize = 16;
const PULSE_DEPTH: usize = 4;

/// Error returned by [`Client::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectError {
    /// The transport reports the station as unreachable.
    Unreachable,
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectError::Unreachable => write!(f, "station unreachable"),
        }
    }
}

/// Error returned by the command and query methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// The session is not in the [`SessionState::Ready`] state.
    NotConnected,
    /// Slot outside 1..=120.
    InvalidSlot,
    /// Feedback group outside 0..=1.
    InvalidGroup,
    /// A drive command needs a known speed-step range.
    InvalidSteps,
    /// Function index outside 0..=31.
    InvalidFunction,
    /// The requested position is not one a turnout can be driven to.
    InvalidPosition,
    /// A switching pulse for this turnout is still in flight.
    TurnoutBusy,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CommandError::NotConnected => write!(f, "not connected"),
            CommandError::InvalidSlot => write!(f, "slot outside 1..=120"),
            CommandError::InvalidGroup => write!(f, "feedback group outside 0..=1"),
            CommandError::InvalidSteps => write!(f, "unknown speed-step range"),
            CommandError::InvalidFunction => write!(f, "function index outside 0..=31"),
            CommandError::InvalidPosition => write!(f, "not a drivable turnout position"),
            CommandError::TurnoutBusy => write!(f, "turnout pulse in flight"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeStage {
    HardwareInfo,
    SystemState,
    Code,
    SerialNumber,
}

#[derive(Debug, Clone, Copy)]
struct Handshake {
    stage: HandshakeStage,
    deadline: Instant,
}

#[derive(Debug, Clone, Copy)]
enum PulseState {
    /// The activate pulse went out; release at the given time.
    ReleaseAt(Instant),
    /// The release pulse went out; the turnout settles until the given
    /// time and takes no new command before that.
    SettleUntil(Instant),
}

#[derive(Debug, Clone, Copy)]
struct TurnoutPulse {
    address: TurnoutAddress,
    output: u8,
    state: PulseState,
}

/// One open loco-info/loco-mode pairing.
#[derive(Debug, Clone, Copy)]
struct PendingLoco {
    /// The info answer, once it arrived.
    info: Option<LocoInfo>,
    /// When to give up on the mode answer and emit the info unpaired.
    deadline: Instant,
}

/// A Z21 LAN client session.
pub struct Client {
    state: SessionState,
    handshake: Option<Handshake>,

    hardware: Option<HardwareInfo>,
    capabilities: Option<Capabilities>,
    serial_number: Option<u32>,
    code: Option<Z21Code>,
    system_state: Option<SystemState>,

    last_command_sent: Option<Instant>,
    last_message_received: Option<Instant>,
    failed_probe_count: u8,

    keep_alive_at: Option<Instant>,
    watchdog_at: Option<Instant>,
    railcom_poll_at: Option<Instant>,

    ledger: Ledger,
    published_flags: Option<BroadcastFlags>,

    pending_loco: FnvIndexMap<LocoAddress, PendingLoco, PENDING_LOCO_DEPTH>,
    railcom_cycle: FnvIndexSet<LocoAddress, RAILCOM_CYCLE_DEPTH>,
    pulses: Vec<TurnoutPulse, PULSE_DEPTH>,

    egress: Deque<FrameBuffer, EGRESS_QUEUE_DEPTH>,
    events: Deque<Event, EVENT_QUEUE_DEPTH>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Client {
        Client {
            state: SessionState::Disconnected,
            handshake: None,
            hardware: None,
            capabilities: None,
            serial_number: None,
            code: None,
            system_state: None,
            last_command_sent: None,
            last_message_received: None,
            failed_probe_count: 0,
            keep_alive_at: None,
            watchdog_at: None,
            railcom_poll_at: None,
            ledger: Ledger::new(),
            published_flags: None,
            pending_loco: FnvIndexMap::new(),
            railcom_cycle: FnvIndexSet::new(),
            pulses: Vec::new(),
            egress: Deque::new(),
            events: Deque::new(),
        }
    }

    /// The current session state.
    pub fn session_state(&self) -> SessionState {
        self.state
    }

    /// Hardware variant and firmware, cached from the connect handshake.
    pub fn hardware_info(&self) -> Option<HardwareInfo> {
        self.hardware
    }

    /// Station feature set, cached from the connect handshake.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities
    }

    /// Serial number, cached from the connect handshake.
    pub fn serial_number(&self) -> Option<u32> {
        self.serial_number
    }

    /// Feature-lock state, cached from the connect handshake.
    pub fn z21_code(&self) -> Option<Z21Code> {
        self.code
    }

    /// The most recent system-state report.
    pub fn system_state(&self) -> Option<SystemState> {
        self.system_state
    }

    /// The broadcast mask last published to the station.
    pub fn published_flags(&self) -> Option<BroadcastFlags> {
        self.published_flags
    }

    /// Dequeue the oldest pending event.
    pub fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Start the connect handshake towards the station the device is
    /// bound to.
    ///
    /// The call arms the session and returns; the handshake itself runs
    /// inside [`poll`](Self::poll). Completion surfaces as
    /// `Event::ConnectionState(Ready)`, failure of any step as
    /// `Event::ConnectionState(Disconnected)`. Connecting while a session
    /// is up is accepted and does nothing.
    pub fn connect<D: Device>(
        &mut self,
        now: Instant,
        device: &mut D,
    ) -> Result<(), ConnectError> {
        match self.state {
            SessionState::Ready | SessionState::Connecting => {
                net_debug!("client: connect on an active session");
                Ok(())
            }
            SessionState::Disconnected | SessionState::Lost => {
                if matches!(device.probe(), LinkHealth::Dead) {
                    net_warn!("client: station unreachable, connect refused");
                    return Err(ConnectError::Unreachable);
                }
                self.set_state(SessionState::Connecting);
                self.handshake = Some(Handshake {
                    stage: HandshakeStage::HardwareInfo,
                    deadline: now + config::HANDSHAKE_STEP_TIMEOUT,
                });
                self.enqueue(construct::station::get_hardware_info());
                Ok(())
            }
        }
    }

    /// End the session: log off from the station when one is connected,
    /// disarm every timer and drop the cached handshake state.
    /// Idempotent.
    pub fn disconnect<D: Device>(&mut self, device: &mut D) {
        if matches!(self.state, SessionState::Disconnected) {
            return;
        }
        if matches!(
            self.state,
            SessionState::Ready | SessionState::Connecting
        ) {
            send_now(device, &construct::station::logoff());
        }
        self.teardown(SessionState::Disconnected);
    }

    /// Process queued ingress, run due timers and flush queued egress.
    ///
    /// Returns whether anything was processed, indicating that events
    /// may be pending.
    pub fn poll<D: Device>(&mut self, now: Instant, device: &mut D) -> bool {
        let mut activity = false;
        loop {
            let mut did = false;
            did |= self.ingress(now, device);
            did |= self.run_timers(now, device);
            did |= self.flush_egress(now, device);
            if !did {
                break;
            }
            activity = true;
        }
        activity
    }

    /// The next instant at which [`poll`](Self::poll) has work to do.
    ///
    /// `None` means no timer is armed; queued egress reports the epoch,
    /// meaning "poll again without waiting".
    pub fn poll_at(&self) -> Option<Instant> {
        if !self.egress.is_empty() {
            return Some(Instant::ZERO);
        }
        let mut at = earliest(
            self.handshake.map(|handshake| handshake.deadline),
            self.keep_alive_at,
        );
        at = earliest(at, self.watchdog_at);
        at = earliest(at, self.railcom_poll_at);
        for pulse in self.pulses.iter() {
            let deadline = match pulse.state {
                PulseState::ReleaseAt(t) => t,
                PulseState::SettleUntil(t) => t,
            };
            at = earliest(at, Some(deadline));
        }
        for pending in self.pending_loco.values() {
            at = earliest(at, Some(pending.deadline));
        }
        at
    }

    /// Register a listener for an event category.
    ///
    /// The first listener of a flag-gated category publishes the updated
    /// broadcast mask; the first RailCom listener arms the polling cycle.
    pub fn subscribe(&mut self, category: EventCategory, now: Instant) -> Subscription {
        let first = self.ledger.add(category);
        if first && matches!(self.state, SessionState::Ready) {
            if !category.broadcast_flags().is_empty() && category.guard(self.firmware()) {
                self.publish_flags();
            }
            if category.is_railcom() && self.railcom_poll_at.is_none() {
                self.railcom_poll_at = Some(now + config::RAILCOM_POLL_DELAY);
            }
        }
        Subscription { category }
    }

    /// Drop a listener. The last listener of a flag-gated category
    /// publishes the shrunk broadcast mask; the last RailCom listener
    /// stops the polling cycle.
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        let category = subscription.category;
        let last = self.ledger.remove(category);
        if !last {
            return;
        }
        if matches!(self.state, SessionState::Ready)
            && !category.broadcast_flags().is_empty()
            && category.guard(self.firmware())
        {
            self.publish_flags();
        }
        if category.is_railcom() && self.ledger.railcom_listeners() == 0 {
            self.railcom_poll_at = None;
            self.railcom_cycle.clear();
        }
    }

    // --- queries ---

    /// Request the serial number; answered with `Event::SerialNumber`.
    pub fn get_serial_number(&mut self) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::station::get_serial_number());
        Ok(())
    }

    /// Request hardware variant and firmware; answered with
    /// `Event::HardwareInfo`.
    pub fn get_hardware_info(&mut self) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::station::get_hardware_info());
        Ok(())
    }

    /// Request the firmware version through the X-Bus envelope; answered
    /// with `Event::FirmwareVersion`.
    pub fn get_firmware_version(&mut self) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::station::get_firmware_version());
        Ok(())
    }

    /// Request the feature-lock code; answered with `Event::Z21Code`.
    pub fn get_z21_code(&mut self) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::station::get_code());
        Ok(())
    }

    /// Request the broadcast mask the station holds for this client;
    /// answered with `Event::BroadcastFlags`.
    pub fn get_broadcast_flags(&mut self) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::station::get_broadcast_flags());
        Ok(())
    }

    /// Request a system-state report; answered with
    /// `Event::SystemState`.
    pub fn get_system_state(&mut self) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::station::get_system_state());
        Ok(())
    }

    /// Request the central state; answered with `Event::CentralState`.
    pub fn get_status(&mut self) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::track::get_status());
        Ok(())
    }

    /// Request the drive state of a locomotive; answered with a single
    /// `Event::LocoInfo`.
    ///
    /// The loco-info answer of the station does not carry the track
    /// protocol, so a loco-mode request is paired with it and the event
    /// is held back until both answers arrived. Either answer can be
    /// lost on the wire; a pairing that is still open after
    /// [`config::PAIRING_TIMEOUT`] is dropped and a held info is
    /// emitted without a protocol.
    pub fn get_loco_info(
        &mut self,
        address: LocoAddress,
        now: Instant,
    ) -> Result<(), CommandError> {
        self.require_ready()?;
        let deadline = now + config::PAIRING_TIMEOUT;
        match self.pending_loco.get_mut(&address) {
            Some(pending) => pending.deadline = deadline,
            None => {
                if self
                    .pending_loco
                    .insert(address, PendingLoco { info: None, deadline })
                    .is_err()
                {
                    net_debug!("client: correlation table full, mode pairing skipped");
                }
            }
        }
        self.enqueue(construct::loco::get_loco_info(address));
        self.enqueue(construct::loco::get_loco_mode(address));
        Ok(())
    }

    /// Request the track protocol of a locomotive address; answered with
    /// `Event::LocoMode`.
    pub fn get_loco_mode(&mut self, address: LocoAddress) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::loco::get_loco_mode(address));
        Ok(())
    }

    /// Request the dump of one locomotive slot (1..=120); answered with
    /// `Event::LocoSlotInfo`.
    pub fn get_loco_slot_info(&mut self, slot: u8) -> Result<(), CommandError> {
        self.require_ready()?;
        if !(1..=120).contains(&slot) {
            net_warn!("client: slot {} outside 1..=120", slot);
            return Err(CommandError::InvalidSlot);
        }
        self.enqueue(construct::loco::get_loco_slot_info(slot));
        Ok(())
    }

    /// Request the position of a turnout; answered with
    /// `Event::TurnoutInfo`.
    pub fn get_turnout_info(&mut self, address: TurnoutAddress) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::accessory::get_turnout_info(address));
        Ok(())
    }

    /// Request the track protocol of a turnout address; answered with
    /// `Event::TurnoutMode`.
    pub fn get_turnout_mode(&mut self, address: TurnoutAddress) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::accessory::get_turnout_mode(address));
        Ok(())
    }

    /// Request the occupancy state of an R-Bus group (0..=1); answered
    /// with `Event::RBusData`.
    pub fn get_rbus_data(&mut self, group: u8) -> Result<(), CommandError> {
        self.require_ready()?;
        if group >= RBUS_GROUP_COUNT {
            net_warn!("client: feedback group {} outside 0..=1", group);
            return Err(CommandError::InvalidGroup);
        }
        self.enqueue(construct::feedback::rbus_get_data(group));
        Ok(())
    }

    /// Request the RailCom data of a locomotive; answered with
    /// `Event::RailComData`.
    pub fn get_railcom_data(&mut self, address: LocoAddress) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::feedback::railcom_get_data(address));
        Ok(())
    }

    // --- commands ---

    /// Switch the track voltage on.
    pub fn set_track_power_on(&mut self) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::track::set_track_power_on());
        Ok(())
    }

    /// Switch the track voltage off.
    pub fn set_track_power_off(&mut self) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::track::set_track_power_off());
        Ok(())
    }

    /// Stop every locomotive while keeping the track powered.
    pub fn set_emergency_stop(&mut self) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::track::set_emergency_stop());
        Ok(())
    }

    /// Drive a locomotive. `speed` is given in the caller-facing
    /// normalized range and converted to the decoder's native range.
    pub fn set_loco_drive(
        &mut self,
        address: LocoAddress,
        speed: u8,
        steps: NativeSpeedSteps,
        direction: Direction,
        protocol: DecoderProtocol,
    ) -> Result<(), CommandError> {
        self.require_ready()?;
        if steps.drive_db0().is_none() {
            net_warn!("client: drive command with unknown step range");
            return Err(CommandError::InvalidSteps);
        }
        let native = to_native_speed(speed, steps, protocol);
        self.enqueue(construct::loco::set_loco_drive(
            address, native, steps, direction,
        ));
        Ok(())
    }

    /// Toggle a locomotive function (0..=31).
    pub fn set_loco_function(
        &mut self,
        address: LocoAddress,
        index: u8,
    ) -> Result<(), CommandError> {
        self.require_ready()?;
        if index > 31 {
            net_warn!("client: function index {} outside 0..=31", index);
            return Err(CommandError::InvalidFunction);
        }
        self.enqueue(construct::loco::set_loco_function(address, index));
        Ok(())
    }

    /// Select the track protocol for a locomotive address.
    pub fn set_loco_mode(
        &mut self,
        address: LocoAddress,
        protocol: DecoderProtocol,
    ) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::loco::set_loco_mode(address, protocol));
        Ok(())
    }

    /// Select the track protocol for a turnout address.
    pub fn set_turnout_mode(
        &mut self,
        address: TurnoutAddress,
        protocol: DecoderProtocol,
    ) -> Result<(), CommandError> {
        self.require_ready()?;
        self.enqueue(construct::accessory::set_turnout_mode(address, protocol));
        Ok(())
    }

    /// Drive a turnout to a position.
    ///
    /// Switching is pulsed: the activate command goes out now, the
    /// release follows after 100 ms and the turnout settles for another
    /// 50 ms. A second command for the same address inside that window
    /// is refused with [`CommandError::TurnoutBusy`].
    pub fn set_turnout_position(
        &mut self,
        address: TurnoutAddress,
        position: TurnoutPosition,
        now: Instant,
    ) -> Result<(), CommandError> {
        self.require_ready()?;
        let output = match position.output() {
            Some(output) => output,
            None => {
                net_warn!("client: turnout {} has no drivable output", address.value());
                return Err(CommandError::InvalidPosition);
            }
        };
        if self.pulses.iter().any(|pulse| pulse.address == address) {
            return Err(CommandError::TurnoutBusy);
        }
        if self
            .pulses
            .push(TurnoutPulse {
                address,
                output,
                state: PulseState::ReleaseAt(now + config::TURNOUT_PULSE),
            })
            .is_err()
        {
            net_warn!("client: pulse queue full, turnout command dropped");
            return Err(CommandError::TurnoutBusy);
        }
        self.enqueue(construct::accessory::set_turnout(address, output, true));
        Ok(())
    }

    // --- internals ---

    fn firmware(&self) -> Option<FirmwareVersion> {
        self.hardware.map(|hardware| hardware.firmware)
    }

    fn decode_context(&self) -> DecodeContext {
        DecodeContext {
            firmware: self.firmware(),
            hardware: self.hardware.map(|hardware| hardware.hardware_type),
        }
    }

    fn require_ready(&self) -> Result<(), CommandError> {
        if matches!(self.state, SessionState::Ready) {
            Ok(())
        } else {
            net_debug!("client: command refused, session not ready");
            Err(CommandError::NotConnected)
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            self.push_event(Event::ConnectionState(state));
        }
    }

    fn push_event(&mut self, event: Event) {
        if let Err(event) = self.events.push_back(event) {
            net_debug!("client: event queue full, dropping oldest");
            self.events.pop_front();
            let _ = self.events.push_back(event);
        }
    }

    fn enqueue(&mut self, frame: FrameBuffer) {
        if self.egress.push_back(frame).is_err() {
            net_warn!("client: egress queue full, command dropped");
        }
    }

    fn teardown(&mut self, next: SessionState) {
        self.handshake = None;
        self.keep_alive_at = None;
        self.watchdog_at = None;
        self.railcom_poll_at = None;
        self.hardware = None;
        self.capabilities = None;
        self.serial_number = None;
        self.code = None;
        self.system_state = None;
        self.published_flags = None;
        self.last_command_sent = None;
        self.last_message_received = None;
        self.failed_probe_count = 0;
        self.pending_loco.clear();
        self.railcom_cycle.clear();
        self.pulses.clear();
        self.egress.clear();
        self.set_state(next);
    }

    fn ingress<D: Device>(&mut self, now: Instant, device: &mut D) -> bool {
        let mut processed = false;
        while let Some((rx, _tx)) = device.receive() {
            rx.consume(|datagram| self.ingress_datagram(now, datagram));
            processed = true;
        }
        processed
    }

    fn ingress_datagram(&mut self, now: Instant, datagram: &[u8]) {
        for result in Datagrams::new(datagram) {
            let frame = match result {
                Ok(frame) => frame,
                Err(err) => {
                    net_warn!("client: malformed datagram tail: {}", err);
                    break;
                }
            };
            self.last_message_received = Some(now);
            match Message::parse(&frame, &self.decode_context()) {
                Ok(message) => self.handle_message(now, message),
                Err(wire::Error::Checksum) => {
                    net_warn!("client: checksum mismatch, frame dropped")
                }
                Err(err) => net_debug!("client: undecodable frame: {}", err),
            }
        }
    }

    fn handle_message(&mut self, now: Instant, message: Message) {
        match message {
            Message::SerialNumber(value) => {
                self.serial_number = Some(value);
                self.handshake_event(now, HandshakeStage::SerialNumber);
                self.push_event(Event::SerialNumber(value));
            }
            Message::Code(code) => {
                self.code = Some(code);
                self.handshake_event(now, HandshakeStage::Code);
                self.push_event(Event::Z21Code(code));
            }
            Message::HardwareInfo(info) => {
                self.hardware = Some(info);
                self.handshake_event(now, HandshakeStage::HardwareInfo);
                self.push_event(Event::HardwareInfo(info));
            }
            Message::SystemState(state) => {
                self.system_state = Some(state);
                if state.capabilities.is_some() {
                    self.capabilities = state.capabilities;
                }
                self.handshake_event(now, HandshakeStage::SystemState);
                self.push_event(Event::SystemState(state));
            }
            Message::BroadcastFlags(flags) => self.push_event(Event::BroadcastFlags(flags)),
            Message::LocoInfo(info) => self.route_loco_info(info),
            Message::LocoMode { address, protocol } => self.route_loco_mode(address, protocol),
            Message::RailComData(data) => self.route_railcom(data),
            Message::TurnoutMode { address, protocol } => {
                self.push_event(Event::TurnoutMode { address, protocol })
            }
            Message::TurnoutInfo { address, position } => {
                self.push_event(Event::TurnoutInfo { address, position })
            }
            Message::RBusData(data) => self.push_event(Event::RBusData(data)),
            Message::LocoSlotInfo(info) => self.push_event(Event::LocoSlotInfo(info)),
            Message::TrackPower(power) => self.push_event(Event::TrackPower(power)),
            Message::StatusChanged(state) => self.push_event(Event::CentralState(state)),
            Message::EmergencyStop => self.push_event(Event::EmergencyStop),
            Message::FirmwareVersion(version) => {
                self.push_event(Event::FirmwareVersion(version))
            }
            Message::UnknownCommand => {
                net_warn!("client: station rejected the previous command")
            }
        }
    }

    /// A loco-info answer pairs with the loco-mode answer of the same
    /// address: the station never reports the track protocol in the info
    /// frame itself, so a requested info is held back until its mode
    /// arrives.
    fn route_loco_info(&mut self, info: LocoInfo) {
        if let Some(pending) = self.pending_loco.get_mut(&info.address) {
            net_trace!(
                "client: holding loco info {} for mode pairing",
                info.address.value()
            );
            pending.info = Some(info);
        } else {
            self.push_event(Event::LocoInfo(info));
        }
    }

    fn route_loco_mode(&mut self, address: LocoAddress, protocol: DecoderProtocol) {
        match self.pending_loco.get(&address).map(|pending| pending.info) {
            Some(Some(mut info)) => {
                self.pending_loco.remove(&address);
                info.protocol = Some(protocol);
                self.push_event(Event::LocoInfo(info));
            }
            Some(None) => {
                // The paired loco info is still outstanding.
            }
            None => self.push_event(Event::LocoMode { address, protocol }),
        }
    }

    fn route_railcom(&mut self, data: z21_core::feedback::RailComData) {
        if self.railcom_poll_at.is_some() {
            match self.railcom_cycle.insert(data.address) {
                // A fresh address keeps the round-robin going; a
                // duplicate means the rotation wrapped and the cycle is
                // complete.
                Ok(true) => self.enqueue(construct::feedback::railcom_get_data_next()),
                Ok(false) => {}
                Err(_) => net_debug!("client: railcom cycle set full"),
            }
        }
        self.push_event(Event::RailComData(data));
    }

    fn handshake_event(&mut self, now: Instant, completed: HandshakeStage) {
        let Some(handshake) = self.handshake else {
            return;
        };
        if handshake.stage != completed {
            return;
        }
        match completed {
            HandshakeStage::HardwareInfo => {
                let Some(hardware) = self.hardware else {
                    return;
                };
                if hardware.firmware >= FirmwareVersion::V1_42 {
                    self.advance_handshake(
                        now,
                        HandshakeStage::SystemState,
                        construct::station::get_system_state(),
                    );
                } else {
                    self.advance_handshake(
                        now,
                        HandshakeStage::Code,
                        construct::station::get_code(),
                    );
                }
            }
            HandshakeStage::SystemState => {
                self.advance_handshake(now, HandshakeStage::Code, construct::station::get_code())
            }
            HandshakeStage::Code => self.advance_handshake(
                now,
                HandshakeStage::SerialNumber,
                construct::station::get_serial_number(),
            ),
            HandshakeStage::SerialNumber => {
                self.handshake = None;
                self.finish_connect(now);
            }
        }
    }

    fn advance_handshake(&mut self, now: Instant, stage: HandshakeStage, request: FrameBuffer) {
        self.handshake = Some(Handshake {
            stage,
            deadline: now + config::HANDSHAKE_STEP_TIMEOUT,
        });
        self.enqueue(request);
    }

    fn finish_connect(&mut self, now: Instant) {
        self.set_state(SessionState::Ready);
        self.publish_flags();
        self.keep_alive_at = Some(now + config::KEEP_ALIVE_PERIOD);
        self.watchdog_at = Some(now + config::WATCHDOG_PERIOD);
        if self.ledger.railcom_listeners() > 0 {
            self.railcom_poll_at = Some(now + config::RAILCOM_POLL_DELAY);
        }
        self.failed_probe_count = 0;
    }

    /// Send the station the mask it should push broadcasts for: the
    /// session baseline plus every populated category whose guard holds.
    fn publish_flags(&mut self) {
        let mask = BroadcastFlags::DRIVING_SWITCHING
            | BroadcastFlags::SYSTEM_STATE
            | self.ledger.active_flags(self.firmware());
        self.enqueue(construct::station::set_broadcast_flags(mask));
        self.published_flags = Some(mask);
    }

    fn run_timers<D: Device>(&mut self, now: Instant, device: &mut D) -> bool {
        let mut did = false;

        if let Some(handshake) = self.handshake {
            if now >= handshake.deadline {
                net_warn!("client: handshake step timed out, giving up");
                self.teardown(SessionState::Disconnected);
                did = true;
            }
        }

        if let Some(at) = self.keep_alive_at {
            if now >= at {
                self.keep_alive_at = Some(now + config::KEEP_ALIVE_PERIOD);
                let idle = self
                    .last_command_sent
                    .map_or(true, |t| now.duration_since(t) > config::KEEP_ALIVE_IDLE);
                if idle {
                    net_trace!("client: keep-alive");
                    self.enqueue(construct::station::get_system_state());
                }
                did = true;
            }
        }

        if let Some(at) = self.watchdog_at {
            if now >= at {
                self.watchdog_at = Some(now + config::WATCHDOG_PERIOD);
                self.run_watchdog(now, device);
                did = true;
            }
        }

        if let Some(at) = self.railcom_poll_at {
            if now >= at {
                self.railcom_poll_at = Some(now + config::RAILCOM_POLL_PERIOD);
                self.railcom_cycle.clear();
                self.enqueue(construct::feedback::railcom_get_data_next());
                did = true;
            }
        }

        did | self.run_pulses(now) | self.run_pairings(now)
    }

    fn run_watchdog<D: Device>(&mut self, now: Instant, device: &mut D) {
        let silent = self
            .last_message_received
            .map_or(true, |t| now.duration_since(t) > config::WATCHDOG_SILENCE);
        if !silent {
            return;
        }
        match device.probe() {
            LinkHealth::Alive => {
                net_debug!("client: station silent but reachable");
                self.failed_probe_count = 0;
            }
            LinkHealth::Dead => {
                self.failed_probe_count += 1;
                net_warn!(
                    "client: liveness probe failed ({}/{})",
                    self.failed_probe_count,
                    config::PROBE_FAILURE_LIMIT
                );
                if self.failed_probe_count >= config::PROBE_FAILURE_LIMIT {
                    self.teardown(SessionState::Lost);
                }
            }
            // No probe mechanism: silence alone is not evidence of a
            // dead station. The keep-alive traffic re-establishes
            // reception on a healthy link.
            LinkHealth::Unknown => {
                net_trace!("client: liveness probe inconclusive")
            }
        }
    }

    /// Drop pairings whose mode answer is overdue, emitting a held info
    /// without a protocol.
    fn run_pairings(&mut self, now: Instant) -> bool {
        let mut expired: Vec<LocoAddress, PENDING_LOCO_DEPTH> = Vec::new();
        for (address, pending) in self.pending_loco.iter() {
            if now >= pending.deadline {
                let _ = expired.push(*address);
            }
        }
        let did = !expired.is_empty();
        for address in expired {
            if let Some(pending) = self.pending_loco.remove(&address) {
                net_debug!("client: mode answer overdue for loco {}", address.value());
                if let Some(info) = pending.info {
                    self.push_event(Event::LocoInfo(info));
                }
            }
        }
        did
    }

    fn run_pulses(&mut self, now: Instant) -> bool {
        let mut did = false;
        let mut index = 0;
        while index < self.pulses.len() {
            match self.pulses[index].state {
                PulseState::ReleaseAt(at) if now >= at => {
                    let TurnoutPulse {
                        address, output, ..
                    } = self.pulses[index];
                    self.pulses[index].state =
                        PulseState::SettleUntil(now + config::TURNOUT_SETTLE);
                    self.enqueue(construct::accessory::set_turnout(address, output, false));
                    did = true;
                    index += 1;
                }
                PulseState::SettleUntil(at) if now >= at => {
                    self.pulses.swap_remove(index);
                    did = true;
                }
                _ => index += 1,
            }
        }
        did
    }

    fn flush_egress<D: Device>(&mut self, now: Instant, device: &mut D) -> bool {
        let mut sent = false;
        while let Some(frame) = self.egress.front() {
            let Some(token) = device.transmit() else {
                net_debug!("client: transmit exhausted, egress deferred");
                break;
            };
            token.consume(frame.len(), |buffer| buffer.copy_from_slice(&frame[..]));
            self.egress.pop_front();
            self.last_command_sent = Some(now);
            sent = true;
        }
        sent
    }
}

fn send_now<D: Device>(device: &mut D, frame: &FrameBuffer) {
    match device.transmit() {
        Some(token) => {
            token.consume(frame.len(), |buffer| buffer.copy_from_slice(&frame[..]));
        }
        None => net_debug!("client: transmit exhausted, frame dropped"),
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
