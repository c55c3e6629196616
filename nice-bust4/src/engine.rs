//! Protocol engine: receiver, interpreter, scheduler and cover state behind
//! one tick-driven interface.
//!
//! The host feeds received bytes through [`ProtocolEngine::on_byte`] and calls
//! [`ProtocolEngine::tick`] periodically with the transport. Everything is
//! non-blocking; time is passed in explicitly so the engine can be driven from
//! a simulated clock.

use std::collections::VecDeque;
use std::time::Instant;

use log::{debug, info, warn};

use crate::codes::{submenu, ControlCommand, MotorType, RunMode, Whose};
use crate::config::EngineConfig;
use crate::cover::{ActuatorState, CoverCall, CoverState, CoverTraits, MotionState, PositionTracker};
use crate::encoder::{parse_hex_command, prepare_raw_command, CommandEncoder};
use crate::error::{Bust4Error, Fault, Result};
use crate::frame::{BusAddress, Frame};
use crate::interpreter::{EndStop, Identity, IdentityField, Setting, Settings, StatusInterpreter, Update};
use crate::message::{InfoRequest, Packet};
use crate::receiver::FrameReceiver;
use crate::scheduler::TransmitScheduler;
use crate::transport::BusTransport;

/// Faults kept for the host before the oldest are dropped
const MAX_FAULTS: usize = 64;

/// Walky position requests carry this data byte
const WALKY_POSITION_ARG: [u8; 1] = [0x01];

/// Engine-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub malformed_frames: u64,
    pub liveness_timeouts: u64,
    pub acknowledgements: u64,
    pub unmatched_replies: u64,
    pub response_timeouts: u64,
    pub device_errors: u64,
    pub unknown_codes: u64,
    pub transport_errors: u64,
    pub queue_overflows: u64,
    pub publishes: u64,
}

pub struct ProtocolEngine {
    config: EngineConfig,
    encoder: CommandEncoder,
    receiver: FrameReceiver,
    scheduler: TransmitScheduler,
    interpreter: StatusInterpreter,
    state: ActuatorState,
    identity: Identity,
    settings: Settings,
    motor_type: Option<MotorType>,
    drive_address: BusAddress,
    init_ok: bool,
    end_stop: Option<EndStop>,
    last_poll: Option<Instant>,
    last_reinit: Option<Instant>,
    faults: VecDeque<Fault>,
    device_errors: u64,
    unknown_codes: u64,
    publishes: u64,
}

impl ProtocolEngine {
    pub fn new(config: EngineConfig) -> Self {
        let mut interpreter = StatusInterpreter::new(config.own_address);
        interpreter.oxi_address = config.oxi_address;

        Self {
            encoder: CommandEncoder::new(config.own_address, config.destination),
            receiver: FrameReceiver::new(config.rx_timeout),
            scheduler: TransmitScheduler::new(
                config.response_timeout,
                config.max_response_wait,
                config.max_queue_len,
            ),
            interpreter,
            state: ActuatorState::new(config.closed_threshold),
            identity: Identity::default(),
            settings: Settings::default(),
            motor_type: config.motor_type,
            drive_address: config.destination,
            init_ok: false,
            end_stop: None,
            last_poll: None,
            last_reinit: None,
            faults: VecDeque::with_capacity(MAX_FAULTS),
            device_errors: 0,
            unknown_codes: 0,
            publishes: 0,
            config,
        }
    }

    /// Queue bus discovery.
    pub fn start(&mut self, now: Instant) {
        info!(
            "BusT4 engine starting at {}, discovering devices",
            self.config.own_address
        );
        self.discover(now);
        self.last_reinit = Some(now);
    }

    /// Feed one received byte. Returns the cover state when it changed.
    pub fn on_byte(&mut self, byte: u8, now: Instant) -> Option<CoverState> {
        self.scheduler.note_bus_activity(now);
        match self.receiver.push(byte, now)? {
            Ok(frame) => self.handle_frame(&frame, now),
            Err(err) => {
                self.record_fault(err, now);
                None
            }
        }
    }

    /// Feed a run of received bytes. Returns the last published state.
    pub fn on_bytes(&mut self, bytes: &[u8], now: Instant) -> Option<CoverState> {
        bytes
            .iter()
            .filter_map(|b| self.on_byte(*b, now))
            .last()
    }

    /// Periodic work: timeouts, re-discovery, position polling and sending.
    pub fn tick<T: BusTransport + ?Sized>(&mut self, bus: &mut T, now: Instant) {
        self.receiver.check_timeout(now);
        if let Some(err) = self.scheduler.check_timeout(now) {
            self.record_fault(err, now);
        }

        self.maybe_reinit(now);
        self.maybe_poll_position(now);

        if let Err(err) = self.scheduler.try_send(bus, now) {
            self.record_fault(err, now);
        }
    }

    /// Queue a motion command to the drive.
    pub fn enqueue_command(&mut self, command: ControlCommand) -> Result<()> {
        let frame = self.encoder.control(command)?;
        info!("Queue command: {}", command.name());
        self.enqueue(frame)
    }

    /// Queue an operator-supplied hex frame.
    pub fn send_raw_command(&mut self, text: &str) -> Result<()> {
        let bytes = prepare_raw_command(text)?;
        info!("Queue raw command: {:02X?}", &bytes[..]);
        self.scheduler.enqueue(bytes)
    }

    /// Queue an information request built from hex-text fields.
    ///
    /// `data` may be empty.
    pub fn send_inf_cmd(
        &mut self,
        to: &str,
        whose: &str,
        command: &str,
        run: &str,
        next_data: &str,
        data: &str,
    ) -> Result<()> {
        let destination: BusAddress = to.parse()?;
        let request = InfoRequest {
            whose: parse_hex_byte(whose, "whose must be one byte")?,
            submenu: parse_hex_byte(command, "command must be one byte")?,
            run: parse_hex_byte(run, "run mode must be one byte")?,
            next_data: parse_hex_byte(next_data, "next data must be one byte")?,
            data: parse_optional_hex(data)?,
        };
        let frame = self.encoder.request(destination, request)?;
        self.enqueue(frame)
    }

    /// Write a control unit parameter.
    pub fn set_mcu(&mut self, command: &str, data: &str) -> Result<()> {
        let request = InfoRequest::new(
            Whose::ControlUnit,
            parse_hex_byte(command, "command must be one byte")?,
            RunMode::Set,
        )
        .with_data(parse_optional_hex(data)?);
        let frame = self.encoder.request(self.drive_address, request)?;
        self.enqueue(frame)
    }

    /// Write one of the L1-L3 close settings. The drive's acknowledgement
    /// triggers a read-back.
    pub fn set_setting(&mut self, setting: Setting, enabled: bool) -> Result<()> {
        let frame = self.encoder.info(
            self.drive_address,
            Whose::ControlUnit,
            setting.submenu(),
            RunMode::Set,
            0x00,
            &[u8::from(enabled)],
        )?;
        info!("Set {:?} = {}", setting, enabled);
        self.enqueue(frame)
    }

    pub fn set_auto_close(&mut self, enabled: bool) -> Result<()> {
        self.set_setting(Setting::AutoClose, enabled)
    }

    pub fn set_photo_close(&mut self, enabled: bool) -> Result<()> {
        self.set_setting(Setting::PhotoClose, enabled)
    }

    pub fn set_always_close(&mut self, enabled: bool) -> Result<()> {
        self.set_setting(Setting::AlwaysClose, enabled)
    }

    /// Translate a host cover request into commands.
    pub fn control(&mut self, call: &CoverCall) -> Result<()> {
        match self.state.plan(call)? {
            Some(command) => self.enqueue_command(command),
            None => {
                debug!("Cover call {:?} needs no command", call);
                Ok(())
            }
        }
    }

    pub fn traits(&self) -> CoverTraits {
        CoverTraits {
            supports_position: true,
            supports_stop: true,
            supports_toggle: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn motor_type(&self) -> Option<MotorType> {
        self.motor_type
    }

    pub fn motion(&self) -> MotionState {
        self.state.motion()
    }

    pub fn position(&self) -> &PositionTracker {
        self.state.tracker()
    }

    /// State as it would be published now
    pub fn cover_state(&self) -> CoverState {
        self.state.current()
    }

    pub fn drive_address(&self) -> BusAddress {
        self.drive_address
    }

    pub fn oxi_address(&self) -> Option<BusAddress> {
        self.interpreter.oxi_address
    }

    /// The control unit answered discovery
    pub fn is_initialized(&self) -> bool {
        self.init_ok
    }

    pub fn end_stop(&self) -> Option<EndStop> {
        self.end_stop
    }

    pub fn queue_len(&self) -> usize {
        self.scheduler.len()
    }

    pub fn ready_to_tx(&self) -> bool {
        self.scheduler.ready_to_tx()
    }

    /// Take the faults collected since the last call.
    pub fn drain_faults(&mut self) -> Vec<Fault> {
        self.faults.drain(..).collect()
    }

    pub fn stats(&self) -> EngineStats {
        let rx = self.receiver.stats();
        let tx = self.scheduler.stats();
        EngineStats {
            frames_received: rx.frames_ok,
            frames_sent: tx.frames_sent,
            malformed_frames: rx.malformed,
            liveness_timeouts: rx.liveness_timeouts,
            acknowledgements: tx.acknowledged,
            unmatched_replies: tx.unmatched_replies,
            response_timeouts: tx.timeouts,
            device_errors: self.device_errors,
            unknown_codes: self.unknown_codes,
            transport_errors: tx.transport_errors,
            queue_overflows: tx.dropped_full,
            publishes: self.publishes,
        }
    }

    /// Log what is known about the attached devices.
    pub fn dump_config(&self) {
        let id = &self.identity;
        let tracker = self.state.tracker();
        info!("BusT4:");
        info!("  Own address: {}", self.config.own_address);
        info!("  Drive address: {}", self.drive_address);
        match self.interpreter.oxi_address {
            Some(addr) => info!("  Receiver address: {}", addr),
            None => info!("  Receiver: not found"),
        }
        info!("  Manufacturer: {}", Identity::text(&id.manufacturer));
        info!("  Product: {}", Identity::text(&id.product));
        info!("  Hardware: {}", Identity::text(&id.hardware));
        info!("  Firmware: {}", Identity::text(&id.firmware));
        info!("  Description: {}", Identity::text(&id.description));
        if !id.oxi_product.is_empty() {
            info!("  Receiver product: {}", Identity::text(&id.oxi_product));
            info!("  Receiver hardware: {}", Identity::text(&id.oxi_hardware));
            info!("  Receiver firmware: {}", Identity::text(&id.oxi_firmware));
            info!("  Receiver description: {}", Identity::text(&id.oxi_description));
        }
        match self.motor_type {
            Some(motor) => info!("  Motor type: {:?}", motor),
            None => info!("  Motor type: unknown"),
        }
        info!(
            "  Positions: close={} open={} max={}",
            tracker.close_limit, tracker.open_limit, tracker.max_opening
        );
        info!("  Auto close (L1): {:?}", self.settings.auto_close);
        info!("  Photo close (L2): {:?}", self.settings.photo_close);
        info!("  Always close (L3): {:?}", self.settings.always_close);
        info!("  Update interval: {:?}", self.config.update_interval);
    }

    fn handle_frame(&mut self, frame: &Frame, now: Instant) -> Option<CoverState> {
        let packet = Packet::from_frame(frame);
        for update in self.interpreter.interpret(&packet) {
            self.apply(update, now);
        }
        let published = self.state.publish_if_changed();
        if published.is_some() {
            self.publishes += 1;
        }
        published
    }

    fn apply(&mut self, update: Update, now: Instant) {
        match update {
            Update::Acknowledged(reply) => {
                self.scheduler.acknowledge(reply);
            }
            Update::Motion(motion) => {
                let previous = self.state.motion();
                self.state.set_motion(motion);
                let halted = matches!(motion, MotionState::Stopped | MotionState::TimedOut);
                if halted && previous != motion && self.init_ok {
                    self.request_position(now);
                }
            }
            Update::Position(position) => {
                if self.state.update_position(position) {
                    let frame = self.encoder.control(ControlCommand::Stop);
                    self.enqueue_internal(frame, now);
                }
            }
            Update::OpenLimit(value) => {
                debug!("Open position {}", value);
                self.set_limit(|tracker| tracker.open_limit = value);
            }
            Update::CloseLimit(value) => {
                debug!("Close position {}", value);
                self.set_limit(|tracker| tracker.close_limit = value);
            }
            Update::MaxOpening(value) => {
                debug!("Maximum opening {}", value);
                self.state.tracker_mut().max_opening = value;
            }
            Update::Identity(field, value) => {
                info!("{:?}: {}", field, Identity::text(&value));
                self.identity.set(field, value);
                if field == IdentityField::Product {
                    self.interpreter.walky = self.identity.is_walky();
                }
            }
            Update::MotorType(motor) => {
                info!("Motor type: {:?}", motor);
                self.motor_type = Some(motor);
            }
            Update::Setting(setting, value) => {
                debug!("{:?} = {}", setting, value);
                self.settings.set(setting, value);
            }
            Update::SettingWritten(setting) => {
                let frame = self.encoder.info(
                    self.drive_address,
                    Whose::ControlUnit,
                    setting.submenu(),
                    RunMode::Get,
                    0x00,
                    &[],
                );
                self.enqueue_internal(frame, now);
            }
            Update::EndStop(end_stop) => {
                debug!("End stop reached: {:?}", end_stop);
                self.end_stop = Some(end_stop);
                self.state.set_motion(match end_stop {
                    EndStop::Open => MotionState::Opened,
                    EndStop::Close => MotionState::Closed,
                });
            }
            Update::Discovered { whose, address } => self.on_discovered(whose, address, now),
            Update::Fault(err) => {
                self.device_errors += 1;
                self.record_fault(err, now);
            }
            Update::Ignored(err) => {
                self.unknown_codes += 1;
                debug!("Ignored: {}", err);
            }
        }
    }

    fn set_limit(&mut self, set: impl FnOnce(&mut PositionTracker)) {
        let tracker = self.state.tracker_mut();
        set(tracker);
        let current = tracker.current;
        tracker.update(current);
    }

    fn on_discovered(&mut self, whose: Whose, address: BusAddress, now: Instant) {
        match whose {
            Whose::ControlUnit => {
                info!("Control unit found at {}", address);
                self.drive_address = address;
                self.encoder.set_destination(address);
                self.init_ok = true;
                self.init_control_unit(now);
                self.last_reinit = Some(now);
            }
            Whose::Oxi => {
                info!("OXI receiver found at {}", address);
                self.interpreter.oxi_address = Some(address);
                self.init_receiver(address, now);
            }
            Whose::All => {}
        }
    }

    fn discover(&mut self, now: Instant) {
        for code in [submenu::WHO, submenu::PRD] {
            let frame = self
                .encoder
                .info(BusAddress::BROADCAST, Whose::All, code, RunMode::Get, 0x00, &[]);
            self.enqueue_internal(frame, now);
        }
    }

    fn init_control_unit(&mut self, now: Instant) {
        let drive = self.drive_address;
        let requests: [(Whose, u8); 8] = [
            (Whose::ControlUnit, submenu::TYPE_M),
            (Whose::All, submenu::MAN),
            (Whose::All, submenu::FRM),
            (Whose::All, submenu::PRD),
            (Whose::All, submenu::HWR),
            (Whose::ControlUnit, submenu::POS_MAX),
            (Whose::ControlUnit, submenu::POS_MIN),
            (Whose::All, submenu::DSC),
        ];
        for (whose, code) in requests {
            let frame = self.encoder.info(drive, whose, code, RunMode::Get, 0x00, &[]);
            self.enqueue_internal(frame, now);
        }

        let walky_arg: &[u8] = if self.interpreter.walky {
            &WALKY_POSITION_ARG
        } else {
            &[]
        };
        let frame = self.encoder.info(
            drive,
            Whose::ControlUnit,
            submenu::MAX_OPN,
            RunMode::Get,
            0x00,
            walky_arg,
        );
        self.enqueue_internal(frame, now);
        self.request_position(now);

        for code in [
            submenu::INF_STATUS,
            submenu::AUTOCLS,
            submenu::PH_CLS_ON,
            submenu::ALW_CLS_ON,
        ] {
            let frame = self
                .encoder
                .info(drive, Whose::ControlUnit, code, RunMode::Get, 0x00, &[]);
            self.enqueue_internal(frame, now);
        }
    }

    fn init_receiver(&mut self, address: BusAddress, now: Instant) {
        for code in [submenu::PRD, submenu::HWR, submenu::FRM, submenu::DSC] {
            let frame = self
                .encoder
                .info(address, Whose::All, code, RunMode::Get, 0x00, &[]);
            self.enqueue_internal(frame, now);
        }
    }

    fn request_position(&mut self, now: Instant) {
        let arg: &[u8] = if self.interpreter.walky {
            &WALKY_POSITION_ARG
        } else {
            &[]
        };
        let frame = self.encoder.info(
            self.drive_address,
            Whose::ControlUnit,
            submenu::CUR_POS,
            RunMode::Get,
            0x00,
            arg,
        );
        self.enqueue_internal(frame, now);
    }

    fn maybe_reinit(&mut self, now: Instant) {
        if let Some(last) = self.last_reinit {
            if now.saturating_duration_since(last) < self.config.reinit_interval {
                return;
            }
        }
        self.last_reinit = Some(now);

        if !self.init_ok {
            debug!("Control unit not found yet, repeating discovery");
            self.discover(now);
        } else if self.motor_type.is_none() || !self.identity.manufacturer_known() {
            debug!("Identity incomplete, re-initialising {}", self.drive_address);
            self.init_control_unit(now);
        }
    }

    fn maybe_poll_position(&mut self, now: Instant) {
        if self.identity.is_robus() || !self.init_ok || !self.state.motion().is_moving() {
            return;
        }
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < self.config.update_interval {
                return;
            }
        }
        self.last_poll = Some(now);
        self.request_position(now);
    }

    fn enqueue(&mut self, frame: Frame) -> Result<()> {
        self.scheduler.enqueue(frame.into_bytes())
    }

    fn enqueue_internal(&mut self, frame: Result<Frame>, now: Instant) {
        if let Err(err) = frame.and_then(|f| self.enqueue(f)) {
            self.record_fault(err, now);
        }
    }

    fn record_fault(&mut self, error: Bust4Error, now: Instant) {
        match &error {
            Bust4Error::ResponseTimeout { .. } | Bust4Error::MalformedFrame { .. } => {
                debug!("Fault: {}", error)
            }
            _ => warn!("Fault: {}", error),
        }
        if self.faults.len() >= MAX_FAULTS {
            self.faults.pop_front();
        }
        self.faults.push_back(Fault::new(error, now));
    }
}

fn parse_hex_byte(text: &str, what: &'static str) -> Result<u8> {
    match parse_hex_command(text)?.as_slice() {
        [byte] => Ok(*byte),
        _ => Err(Bust4Error::InvalidArgument(what)),
    }
}

fn parse_optional_hex(text: &str) -> Result<Vec<u8>> {
    if text.chars().any(|c| c.is_ascii_alphanumeric()) {
        parse_hex_command(text)
    } else {
        Ok(Vec::new())
    }
}
