//! Maps decoded packets to actuator state updates.
//!
//! The interpreter itself holds no actuator state. It turns one [`Packet`]
//! into a list of [`Update`]s that the engine applies, which keeps the
//! dispatch tables testable without a bus.

use log::{debug, info, trace};

use crate::codes::{error_code, submenu, ControlCommand, MotorType, RunMode, Whose};
use crate::cover::MotionState;
use crate::error::Bust4Error;
use crate::frame::BusAddress;
use crate::message::{CommandReply, InfoResponse, Message, Packet, ReplyKey};

/// Manufacturer value until the drive reports one
pub const MANUFACTURER_UNKNOWN: [u8; 2] = [0x55, 0x55];

/// Product string of Walky drives ("WLA1")
pub const PRODUCT_WALKY: [u8; 7] = [0x57, 0x4C, 0x41, 0x31, 0x00, 0x06, 0x57];

/// Product string of ROBUS HSR10 drives
pub const PRODUCT_ROBUS_HSR10: [u8; 11] = [
    0x52, 0x4F, 0x42, 0x55, 0x53, 0x48, 0x53, 0x52, 0x31, 0x30, 0x00,
];

/// WHO reply continuation byte carrying the device kind
const WHO_DEVICE_BLOCK: u8 = 0x01;

/// Identity strings of the control unit and the OXI receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityField {
    Manufacturer,
    Product,
    Hardware,
    Firmware,
    Description,
    OxiProduct,
    OxiHardware,
    OxiFirmware,
    OxiDescription,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identity {
    pub manufacturer: Vec<u8>,
    pub product: Vec<u8>,
    pub hardware: Vec<u8>,
    pub firmware: Vec<u8>,
    pub description: Vec<u8>,
    pub oxi_product: Vec<u8>,
    pub oxi_hardware: Vec<u8>,
    pub oxi_firmware: Vec<u8>,
    pub oxi_description: Vec<u8>,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            manufacturer: MANUFACTURER_UNKNOWN.to_vec(),
            product: Vec::new(),
            hardware: Vec::new(),
            firmware: Vec::new(),
            description: Vec::new(),
            oxi_product: Vec::new(),
            oxi_hardware: Vec::new(),
            oxi_firmware: Vec::new(),
            oxi_description: Vec::new(),
        }
    }
}

impl Identity {
    pub fn get(&self, field: IdentityField) -> &[u8] {
        match field {
            IdentityField::Manufacturer => &self.manufacturer,
            IdentityField::Product => &self.product,
            IdentityField::Hardware => &self.hardware,
            IdentityField::Firmware => &self.firmware,
            IdentityField::Description => &self.description,
            IdentityField::OxiProduct => &self.oxi_product,
            IdentityField::OxiHardware => &self.oxi_hardware,
            IdentityField::OxiFirmware => &self.oxi_firmware,
            IdentityField::OxiDescription => &self.oxi_description,
        }
    }

    pub fn set(&mut self, field: IdentityField, value: Vec<u8>) {
        let slot = match field {
            IdentityField::Manufacturer => &mut self.manufacturer,
            IdentityField::Product => &mut self.product,
            IdentityField::Hardware => &mut self.hardware,
            IdentityField::Firmware => &mut self.firmware,
            IdentityField::Description => &mut self.description,
            IdentityField::OxiProduct => &mut self.oxi_product,
            IdentityField::OxiHardware => &mut self.oxi_hardware,
            IdentityField::OxiFirmware => &mut self.oxi_firmware,
            IdentityField::OxiDescription => &mut self.oxi_description,
        };
        *slot = value;
    }

    pub fn manufacturer_known(&self) -> bool {
        self.manufacturer != MANUFACTURER_UNKNOWN
    }

    /// Walky drives use one-byte positions
    pub fn is_walky(&self) -> bool {
        self.product == PRODUCT_WALKY
    }

    /// ROBUS HSR10 drives push position updates themselves
    pub fn is_robus(&self) -> bool {
        self.product == PRODUCT_ROBUS_HSR10
    }

    /// Printable form of an identity value
    pub fn text(value: &[u8]) -> String {
        String::from_utf8_lossy(value)
            .chars()
            .filter(|c| !c.is_control())
            .collect()
    }
}

/// Drive settings read back from the control unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Setting {
    /// Auto close (L1)
    AutoClose,
    /// Close after photo (L2)
    PhotoClose,
    /// Always close (L3)
    AlwaysClose,
}

impl Setting {
    pub const ALL: [Setting; 3] = [Setting::AutoClose, Setting::PhotoClose, Setting::AlwaysClose];

    pub fn submenu(self) -> u8 {
        match self {
            Setting::AutoClose => submenu::AUTOCLS,
            Setting::PhotoClose => submenu::PH_CLS_ON,
            Setting::AlwaysClose => submenu::ALW_CLS_ON,
        }
    }

    pub fn from_submenu(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.submenu() == code)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Settings {
    pub auto_close: Option<bool>,
    pub photo_close: Option<bool>,
    pub always_close: Option<bool>,
}

impl Settings {
    pub fn get(&self, setting: Setting) -> Option<bool> {
        match setting {
            Setting::AutoClose => self.auto_close,
            Setting::PhotoClose => self.photo_close,
            Setting::AlwaysClose => self.always_close,
        }
    }

    pub fn set(&mut self, setting: Setting, value: bool) {
        match setting {
            Setting::AutoClose => self.auto_close = Some(value),
            Setting::PhotoClose => self.photo_close = Some(value),
            Setting::AlwaysClose => self.always_close = Some(value),
        }
    }
}

/// Limit switch reached, from the I/O status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndStop {
    Open,
    Close,
}

/// One state change derived from a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// A reply addressed to us arrived; frees the transmit slot if it matches
    Acknowledged(ReplyKey),
    Motion(MotionState),
    Position(u16),
    OpenLimit(u16),
    CloseLimit(u16),
    MaxOpening(u16),
    Identity(IdentityField, Vec<u8>),
    MotorType(MotorType),
    Setting(Setting, bool),
    /// A setting was written; it should be read back
    SettingWritten(Setting),
    EndStop(EndStop),
    /// A WHO reply identified a device
    Discovered { whose: Whose, address: BusAddress },
    /// Device reported an error; state is left untouched
    Fault(Bust4Error),
    /// Code without a known meaning
    Ignored(Bust4Error),
}

/// Packet dispatch for one bus node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInterpreter {
    pub own_address: BusAddress,
    pub oxi_address: Option<BusAddress>,
    pub walky: bool,
}

impl StatusInterpreter {
    pub fn new(own_address: BusAddress) -> Self {
        Self {
            own_address,
            oxi_address: None,
            walky: false,
        }
    }

    pub fn interpret(&self, packet: &Packet) -> Vec<Update> {
        if packet.source == self.own_address {
            trace!("Ignoring echo of own frame");
            return Vec::new();
        }
        let to_us = packet.destination == self.own_address;

        match &packet.message {
            Message::InfoResponse(rsp) => self.info_response(packet.source, to_us, rsp),
            Message::CommandReply(reply) => self.command_reply(to_us, reply),
            Message::Control { command } => {
                debug!(
                    "Control 0x{:02X} from {} to {}",
                    command, packet.source, packet.destination
                );
                Vec::new()
            }
            Message::InfoRequest(req) => {
                trace!(
                    "Request for 0x{:02X} from {} to {}",
                    req.submenu,
                    packet.source,
                    packet.destination
                );
                Vec::new()
            }
            Message::Unknown { message_type, body } => {
                debug!(
                    "Unrecognised packet type 0x{:02X} from {}: {:02X?}",
                    message_type, packet.source, body
                );
                vec![Update::Ignored(Bust4Error::UnknownCode {
                    context: "message type",
                    code: *message_type,
                })]
            }
        }
    }

    fn info_response(&self, source: BusAddress, to_us: bool, rsp: &InfoResponse) -> Vec<Update> {
        let mut updates = Vec::new();
        if to_us {
            updates.push(Update::Acknowledged(ReplyKey::Info {
                submenu: rsp.submenu,
            }));
        }

        if rsp.error != error_code::NO_ERROR {
            if rsp.error == error_code::NO_COMMAND {
                info!(
                    "No command for device: submenu 0x{:02X} from {}",
                    rsp.submenu, source
                );
            } else {
                updates.push(Update::Fault(Bust4Error::DeviceError {
                    code: rsp.error,
                    submenu: rsp.submenu,
                }));
            }
            return updates;
        }

        match rsp.request_mode() {
            Some(RunMode::Get) => self.get_response(source, rsp, &mut updates),
            Some(RunMode::Set) => match Setting::from_submenu(rsp.submenu) {
                Some(setting) => updates.push(Update::SettingWritten(setting)),
                None => debug!("SET of 0x{:02X} acknowledged by {}", rsp.submenu, source),
            },
            Some(RunMode::GetSupported) => {
                info!(
                    "Supported commands of 0x{:02X} from {}: {:02X?}",
                    rsp.submenu, source, rsp.data
                );
            }
            None => {}
        }
        updates
    }

    fn get_response(&self, source: BusAddress, rsp: &InfoResponse, updates: &mut Vec<Update>) {
        let data = &rsp.data;
        let from_oxi = self.oxi_address == Some(source);

        if rsp.whose == Whose::Oxi as u8 {
            match rsp.submenu {
                submenu::OXI_REMOTE_LIST => {
                    info!("OXI remote list entry from {}: {:02X?}", source, data);
                    return;
                }
                submenu::OXI_BUTTON_READ => {
                    info!("OXI button read from {}: {:02X?}", source, data);
                    return;
                }
                _ => {}
            }
        }

        match rsp.submenu {
            submenu::WHO => {
                if rsp.next_data != WHO_DEVICE_BLOCK {
                    return;
                }
                match data.first().copied().and_then(Whose::from_u8) {
                    Some(whose @ (Whose::ControlUnit | Whose::Oxi)) => {
                        updates.push(Update::Discovered {
                            whose,
                            address: source,
                        })
                    }
                    _ => debug!("WHO reply from {} with data {:02X?}", source, data),
                }
            }
            submenu::TYPE_M => match data.first().copied() {
                Some(code) => match MotorType::from_u8(code) {
                    Some(motor) => updates.push(Update::MotorType(motor)),
                    None => updates.push(Update::Ignored(Bust4Error::UnknownCode {
                        context: "motor type",
                        code,
                    })),
                },
                None => debug!("Empty motor type reply"),
            },
            submenu::MAN => updates.push(Update::Identity(IdentityField::Manufacturer, data.clone())),
            submenu::PRD => updates.push(Update::Identity(
                if from_oxi {
                    IdentityField::OxiProduct
                } else {
                    IdentityField::Product
                },
                data.clone(),
            )),
            submenu::HWR => updates.push(Update::Identity(
                if from_oxi {
                    IdentityField::OxiHardware
                } else {
                    IdentityField::Hardware
                },
                data.clone(),
            )),
            submenu::FRM => updates.push(Update::Identity(
                if from_oxi {
                    IdentityField::OxiFirmware
                } else {
                    IdentityField::Firmware
                },
                data.clone(),
            )),
            submenu::DSC => updates.push(Update::Identity(
                if from_oxi {
                    IdentityField::OxiDescription
                } else {
                    IdentityField::Description
                },
                data.clone(),
            )),
            submenu::MAX_OPN => {
                if let Some(value) = self.position_value(rsp) {
                    updates.push(Update::MaxOpening(value));
                }
            }
            submenu::POS_MAX => {
                if let Some(value) = rsp.value_u16() {
                    updates.push(Update::OpenLimit(value));
                }
            }
            submenu::POS_MIN => {
                if let Some(value) = rsp.value_u16() {
                    updates.push(Update::CloseLimit(value));
                }
            }
            submenu::CUR_POS => {
                if let Some(value) = self.position_value(rsp) {
                    updates.push(Update::Position(value));
                }
            }
            submenu::INF_STATUS => match data.first().copied() {
                Some(code) => match MotionState::from_status(code) {
                    Some(motion) => updates.push(Update::Motion(motion)),
                    None => updates.push(Update::Ignored(Bust4Error::UnknownCode {
                        context: "gate status",
                        code,
                    })),
                },
                None => debug!("Empty gate status reply"),
            },
            submenu::AUTOCLS | submenu::PH_CLS_ON | submenu::ALW_CLS_ON => {
                if let (Some(setting), Some(value)) =
                    (Setting::from_submenu(rsp.submenu), data.first())
                {
                    updates.push(Update::Setting(setting, *value != 0));
                }
            }
            submenu::INF_IO => match data.get(2).copied() {
                Some(0x01) => updates.push(Update::EndStop(EndStop::Close)),
                Some(0x02) => updates.push(Update::EndStop(EndStop::Open)),
                Some(other) => trace!("I/O status 0x{:02X}, no end-stop", other),
                None => debug!("Short I/O status reply: {:02X?}", data),
            },
            other => {
                debug!(
                    "Unhandled parameter 0x{:02X} from {}: {:02X?}",
                    other, source, data
                );
                updates.push(Update::Ignored(Bust4Error::UnknownCode {
                    context: "submenu",
                    code: other,
                }));
            }
        }
    }

    /// One byte on Walky, big-endian u16 elsewhere
    fn position_value(&self, rsp: &InfoResponse) -> Option<u16> {
        if self.walky {
            rsp.data.get(1).map(|b| u16::from(*b))
        } else {
            rsp.value_u16()
        }
    }

    fn command_reply(&self, to_us: bool, reply: &CommandReply) -> Vec<Update> {
        let mut updates = Vec::new();
        if to_us {
            if let Some(key) = ReplyKey::of_reply(&Message::CommandReply(*reply)) {
                updates.push(Update::Acknowledged(key));
            }
        }

        if reply.error != error_code::NO_ERROR {
            if reply.error == error_code::NO_COMMAND {
                info!("No command for device: 0x{:02X}", reply.sub_run);
            } else {
                updates.push(Update::Fault(Bust4Error::DeviceError {
                    code: reply.error,
                    submenu: reply.submenu,
                }));
            }
            return updates;
        }

        if reply.is_status() {
            match MotionState::from_status(reply.sub_run) {
                Some(motion) => updates.push(Update::Motion(motion)),
                None => updates.push(Update::Ignored(Bust4Error::UnknownCode {
                    context: "status",
                    code: reply.sub_run,
                })),
            }
            updates.push(Update::Position(reply.value));
        } else if let Some(code) = reply.echoed_command() {
            match ControlCommand::from_u8(code) {
                Some(ControlCommand::Open) => updates.push(Update::Motion(MotionState::Opening)),
                Some(ControlCommand::Close) => updates.push(Update::Motion(MotionState::Closing)),
                Some(ControlCommand::Stop) => updates.push(Update::Motion(MotionState::Stopped)),
                Some(command) => debug!("Drive accepted {}", command.name()),
                None => updates.push(Update::Ignored(Bust4Error::UnknownCode {
                    context: "command echo",
                    code,
                })),
            }
        }
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRIVE: BusAddress = BusAddress::new(0x00, 0x03);
    const OXI: BusAddress = BusAddress::new(0x00, 0x0A);

    fn interpreter() -> StatusInterpreter {
        StatusInterpreter {
            own_address: BusAddress::CONTROLLER,
            oxi_address: Some(OXI),
            walky: false,
        }
    }

    fn cur_pos() -> ReplyKey {
        ReplyKey::Info {
            submenu: submenu::CUR_POS,
        }
    }

    fn get_reply(source: BusAddress, whose: Whose, submenu: u8, data: &[u8]) -> Packet {
        Packet::new(
            BusAddress::CONTROLLER,
            source,
            Message::InfoResponse(InfoResponse {
                whose: whose as u8,
                submenu,
                run: RunMode::Get.reply_code(),
                next_data: 0x00,
                error: 0x00,
                data: data.to_vec(),
            }),
        )
    }

    #[test]
    fn test_position_reply() {
        let updates = interpreter().interpret(&get_reply(DRIVE, Whose::ControlUnit, submenu::CUR_POS, &[0x04, 0x00]));
        assert_eq!(updates, vec![Update::Acknowledged(cur_pos()), Update::Position(1024)]);
    }

    #[test]
    fn test_walky_position_reply() {
        let mut interp = interpreter();
        interp.walky = true;
        let updates = interp.interpret(&get_reply(DRIVE, Whose::ControlUnit, submenu::CUR_POS, &[0x00, 0x2A]));
        assert_eq!(updates, vec![Update::Acknowledged(cur_pos()), Update::Position(42)]);
    }

    #[test]
    fn test_identity_routed_by_source() {
        let updates = interpreter().interpret(&get_reply(DRIVE, Whose::All, submenu::PRD, b"RBA3"));
        assert_eq!(updates[1], Update::Identity(IdentityField::Product, b"RBA3".to_vec()));

        let updates = interpreter().interpret(&get_reply(OXI, Whose::All, submenu::PRD, b"OXI"));
        assert_eq!(updates[1], Update::Identity(IdentityField::OxiProduct, b"OXI".to_vec()));
    }

    #[test]
    fn test_who_discovery() {
        let mut packet = get_reply(DRIVE, Whose::All, submenu::WHO, &[0x04]);
        if let Message::InfoResponse(rsp) = &mut packet.message {
            rsp.next_data = 0x01;
        }
        let updates = interpreter().interpret(&packet);
        assert_eq!(
            updates[1],
            Update::Discovered {
                whose: Whose::ControlUnit,
                address: DRIVE
            }
        );
    }

    #[test]
    fn test_device_error_leaves_state() {
        let mut packet = get_reply(DRIVE, Whose::ControlUnit, submenu::CUR_POS, &[0x04, 0x00]);
        if let Message::InfoResponse(rsp) = &mut packet.message {
            rsp.error = 0x01;
        }
        let updates = interpreter().interpret(&packet);
        assert_eq!(
            updates,
            vec![
                Update::Acknowledged(cur_pos()),
                Update::Fault(Bust4Error::DeviceError {
                    code: 0x01,
                    submenu: submenu::CUR_POS
                })
            ]
        );
    }

    #[test]
    fn test_no_command_sentinel_is_not_a_fault() {
        let mut packet = get_reply(DRIVE, Whose::ControlUnit, submenu::MAX_OPN, &[]);
        if let Message::InfoResponse(rsp) = &mut packet.message {
            rsp.error = error_code::NO_COMMAND;
        }
        assert_eq!(
            interpreter().interpret(&packet),
            vec![Update::Acknowledged(ReplyKey::Info {
                submenu: submenu::MAX_OPN
            })]
        );
    }

    #[test]
    fn test_status_and_settings() {
        let updates = interpreter().interpret(&get_reply(DRIVE, Whose::ControlUnit, submenu::INF_STATUS, &[0x05]));
        assert_eq!(updates[1], Update::Motion(MotionState::Closed));

        let updates = interpreter().interpret(&get_reply(DRIVE, Whose::ControlUnit, submenu::PH_CLS_ON, &[0x01]));
        assert_eq!(updates[1], Update::Setting(Setting::PhotoClose, true));

        let updates = interpreter().interpret(&get_reply(DRIVE, Whose::ControlUnit, submenu::INF_IO, &[0x00, 0x00, 0x02]));
        assert_eq!(updates[1], Update::EndStop(EndStop::Open));
    }

    #[test]
    fn test_set_ack_requests_reread() {
        let packet = Packet::new(
            BusAddress::CONTROLLER,
            DRIVE,
            Message::InfoResponse(InfoResponse {
                whose: Whose::ControlUnit as u8,
                submenu: submenu::AUTOCLS,
                run: RunMode::Set.reply_code(),
                next_data: 0x00,
                error: 0x00,
                data: vec![],
            }),
        );
        assert_eq!(
            interpreter().interpret(&packet),
            vec![
                Update::Acknowledged(ReplyKey::Info {
                    submenu: submenu::AUTOCLS
                }),
                Update::SettingWritten(Setting::AutoClose)
            ]
        );
    }

    #[test]
    fn test_status_reply_carries_position() {
        let packet = Packet::new(
            BusAddress::CONTROLLER,
            DRIVE,
            Message::CommandReply(CommandReply {
                menu: Whose::ControlUnit as u8,
                submenu: 0x40,
                sub_run: 0x02,
                value: 0x0300,
                error: 0x00,
            }),
        );
        assert_eq!(
            interpreter().interpret(&packet),
            vec![
                Update::Acknowledged(ReplyKey::Status),
                Update::Motion(MotionState::Opening),
                Update::Position(0x0300)
            ]
        );
    }

    #[test]
    fn test_run_echo_motion() {
        let packet = Packet::new(
            BusAddress::CONTROLLER,
            DRIVE,
            Message::CommandReply(CommandReply {
                menu: 0x01,
                submenu: 0x02,
                sub_run: 0x84,
                value: 0,
                error: 0x00,
            }),
        );
        assert_eq!(
            interpreter().interpret(&packet),
            vec![
                Update::Acknowledged(ReplyKey::Command(0x04)),
                Update::Motion(MotionState::Closing)
            ]
        );
    }

    #[test]
    fn test_unknown_codes_ignored() {
        let updates = interpreter().interpret(&get_reply(DRIVE, Whose::ControlUnit, 0x7E, &[0x01]));
        assert!(matches!(
            updates[1],
            Update::Ignored(Bust4Error::UnknownCode { code: 0x7E, .. })
        ));
    }

    #[test]
    fn test_foreign_and_echo_traffic() {
        let mut packet = get_reply(DRIVE, Whose::ControlUnit, submenu::CUR_POS, &[0x00, 0x10]);
        packet.destination = BusAddress::new(0x00, 0x70);
        // state still updates but nothing is acknowledged
        assert_eq!(interpreter().interpret(&packet), vec![Update::Position(0x10)]);

        packet.source = BusAddress::CONTROLLER;
        assert!(interpreter().interpret(&packet).is_empty());
    }

    #[test]
    fn test_identity_defaults() {
        let mut identity = Identity::default();
        assert!(!identity.manufacturer_known());
        identity.set(IdentityField::Manufacturer, b"Nice".to_vec());
        assert!(identity.manufacturer_known());
        identity.set(IdentityField::Product, PRODUCT_WALKY.to_vec());
        assert!(identity.is_walky());
        assert!(!identity.is_robus());
        assert_eq!(Identity::text(&PRODUCT_WALKY), "WLA1W");
    }
}
