//! BusT4 code tables.
//!
//! The code space is open: only the values below have a known meaning, and
//! anything else that shows up on the bus is carried through as a raw byte
//! instead of being rejected. Fixed-meaning codes with a single value per
//! name are enums; submenu and status codes overlap between packet kinds and
//! are kept as plain constants.

/// Frame start byte
pub const START_CODE: u8 = 0x55;

/// Menu byte of control commands (first body byte of CMD frames)
pub const MENU_CONTROL: u8 = 0x01;

/// Offset byte sent after the control command code
pub const CONTROL_OFFSET: u8 = 0x64;

/// Replies carry the request's run code minus this value
pub const REPLY_OFFSET: u8 = 0x80;

/// Packet message type (byte 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MessageType {
    /// Command sent to the automation
    Cmd = 0x01,
    /// Read or write device information
    Inf = 0x08,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Cmd),
            0x08 => Some(Self::Inf),
            _ => None,
        }
    }
}

/// Which logical sub-device a packet is for or from (first body byte of INF frames)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Whose {
    /// Packet for/from everyone
    All = 0x00,
    /// Packet to/from the control unit
    ControlUnit = 0x04,
    /// Packet to/from the OXI receiver
    Oxi = 0x0A,
}

impl Whose {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::All),
            0x04 => Some(Self::ControlUnit),
            0x0A => Some(Self::Oxi),
            _ => None,
        }
    }
}

/// Run mode of INF requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RunMode {
    /// Parameter change request
    Set = 0xA9,
    /// Parameter read request
    Get = 0x99,
    /// Supported commands request
    GetSupported = 0x89,
}

impl RunMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xA9 => Some(Self::Set),
            0x99 => Some(Self::Get),
            0x89 => Some(Self::GetSupported),
            _ => None,
        }
    }

    /// Run code the device puts in a complete reply to this request
    pub fn reply_code(self) -> u8 {
        self as u8 - REPLY_OFFSET
    }

    /// Run code of a reply that has more data blocks to follow
    pub fn partial_reply_code(self) -> u8 {
        self as u8 - REPLY_OFFSET - 1
    }

    /// Map a reply run code back to its request mode
    pub fn from_reply(code: u8) -> Option<Self> {
        [Self::Set, Self::Get, Self::GetSupported]
            .into_iter()
            .find(|mode| mode.reply_code() == code || mode.partial_reply_code() == code)
    }
}

/// Control command codes (byte 11 of CMD frames)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ControlCommand {
    StepByStep = 0x01,
    Stop = 0x02,
    Open = 0x03,
    Close = 0x04,
    PartialOpen1 = 0x05,
    PartialOpen2 = 0x06,
    PartialOpen3 = 0x07,
    /// Partial opening 4, shared
    PartialOpen4 = 0x0B,
    /// Partial opening 5, priority step by step
    PartialOpen5 = 0x0C,
    /// Partial opening 6, open and block
    PartialOpen6 = 0x0D,
    CloseAndLock = 0x0E,
    Lock = 0x0F,
    Unlock = 0x10,
    LightTimer = 0x11,
    LightSwitch = 0x12,
    HostStepByStep = 0x13,
    HostOpen = 0x14,
    HostClose = 0x15,
    SlaveStepByStep = 0x16,
    SlaveOpen = 0x17,
    SlaveClose = 0x18,
    UnlockAndOpen = 0x19,
    UnlockAndClose = 0x1A,
    AutoOpenOn = 0x1B,
    AutoOpenOff = 0x1C,
}

impl ControlCommand {
    pub fn from_u8(value: u8) -> Option<Self> {
        use ControlCommand::*;
        let command = match value {
            0x01 => StepByStep,
            0x02 => Stop,
            0x03 => Open,
            0x04 => Close,
            0x05 => PartialOpen1,
            0x06 => PartialOpen2,
            0x07 => PartialOpen3,
            0x0B => PartialOpen4,
            0x0C => PartialOpen5,
            0x0D => PartialOpen6,
            0x0E => CloseAndLock,
            0x0F => Lock,
            0x10 => Unlock,
            0x11 => LightTimer,
            0x12 => LightSwitch,
            0x13 => HostStepByStep,
            0x14 => HostOpen,
            0x15 => HostClose,
            0x16 => SlaveStepByStep,
            0x17 => SlaveOpen,
            0x18 => SlaveClose,
            0x19 => UnlockAndOpen,
            0x1A => UnlockAndClose,
            0x1B => AutoOpenOn,
            0x1C => AutoOpenOff,
            _ => return None,
        };
        Some(command)
    }

    pub fn name(self) -> &'static str {
        use ControlCommand::*;
        match self {
            StepByStep => "Step by step",
            Stop => "Stop",
            Open => "Open",
            Close => "Close",
            PartialOpen1 => "Partial opening 1",
            PartialOpen2 => "Partial opening 2",
            PartialOpen3 => "Partial opening 3",
            PartialOpen4 => "Partial opening 4",
            PartialOpen5 => "Partial opening 5",
            PartialOpen6 => "Partial opening 6",
            CloseAndLock => "Close and lock",
            Lock => "Lock",
            Unlock => "Unlock",
            LightTimer => "Light timer",
            LightSwitch => "Light on/off",
            HostStepByStep => "Host step by step",
            HostOpen => "Host open",
            HostClose => "Host close",
            SlaveStepByStep => "Slave step by step",
            SlaveOpen => "Slave open",
            SlaveClose => "Slave close",
            UnlockAndOpen => "Unlock and open",
            UnlockAndClose => "Unlock and close",
            AutoOpenOn => "Auto open on",
            AutoOpenOff => "Auto open off",
        }
    }
}

/// Actuator (motor) type reported by the TYPE_M request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MotorType {
    Sliding = 0x01,
    Sectional = 0x02,
    Swing = 0x03,
    Barrier = 0x04,
    UpAndOver = 0x05,
}

impl MotorType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Sliding),
            0x02 => Some(Self::Sectional),
            0x03 => Some(Self::Swing),
            0x04 => Some(Self::Barrier),
            0x05 => Some(Self::UpAndOver),
            _ => None,
        }
    }
}

/// Submenu / parameter codes (byte 10 of INF frames)
pub mod submenu {
    /// Actuator type query
    pub const TYPE_M: u8 = 0x00;
    /// Gate status (opened/closed/stopped)
    pub const INF_STATUS: u8 = 0x01;
    /// Current maneuver
    pub const CUR_MAN: u8 = 0x02;
    /// Who is online?
    pub const WHO: u8 = 0x04;
    pub const MAC: u8 = 0x07;
    /// Manufacturer
    pub const MAN: u8 = 0x08;
    /// Product
    pub const PRD: u8 = 0x09;
    /// Hardware version
    pub const HWR: u8 = 0x0A;
    /// Firmware version
    pub const FRM: u8 = 0x0B;
    /// Description
    pub const DSC: u8 = 0x0C;
    /// Current position of the automation
    pub const CUR_POS: u8 = 0x11;
    /// Maximum possible opening according to the encoder
    pub const MAX_OPN: u8 = 0x12;
    /// Maximum (opening) position by encoder
    pub const POS_MAX: u8 = 0x18;
    /// Minimum (closing) position by encoder
    pub const POS_MIN: u8 = 0x19;
    pub const INF_P_OPN1: u8 = 0x21;
    pub const INF_P_OPN2: u8 = 0x22;
    pub const INF_P_OPN3: u8 = 0x23;
    pub const INF_SLOW_OPN: u8 = 0x24;
    pub const INF_SLOW_CLS: u8 = 0x25;
    /// Receiver: remote list entry
    pub const OXI_REMOTE_LIST: u8 = 0x25;
    /// Receiver: button read
    pub const OXI_BUTTON_READ: u8 = 0x26;
    pub const SPEED_OPN: u8 = 0x42;
    pub const SPEED_CLS: u8 = 0x43;
    pub const OPN_PWR: u8 = 0x4A;
    pub const CLS_PWR: u8 = 0x4B;
    pub const OUT1: u8 = 0x51;
    pub const OUT2: u8 = 0x52;
    pub const LOCK_TIME: u8 = 0x5A;
    pub const LAMP_TIME: u8 = 0x5B;
    pub const COMM_SBS: u8 = 0x61;
    pub const COMM_OPN: u8 = 0x63;
    pub const COMM_CLS: u8 = 0x64;
    pub const COMM_STP: u8 = 0x65;
    /// Auto close (L1)
    pub const AUTOCLS: u8 = 0x80;
    /// Pause time
    pub const P_TIME: u8 = 0x81;
    /// Command to execute
    pub const RUN: u8 = 0x82;
    /// Close after photo (L2)
    pub const PH_CLS_ON: u8 = 0x84;
    /// Always close (L3)
    pub const ALW_CLS_ON: u8 = 0x88;
    /// Status in motion
    pub const STA: u8 = 0xC0;
    /// Input/output status (limit switches)
    pub const INF_IO: u8 = 0xD1;
}

/// Motion/status codes carried in status replies
pub mod status {
    pub const UNKNOWN: u8 = 0x00;
    pub const STOPPED_IDLE: u8 = 0x01;
    pub const OPENING: u8 = 0x02;
    pub const CLOSING: u8 = 0x03;
    pub const OPENED: u8 = 0x04;
    pub const CLOSED: u8 = 0x05;
    /// Maneuver ended by timeout
    pub const END_TIME: u8 = 0x06;
    pub const STOPPED: u8 = 0x08;
    /// Position search finished
    pub const SEARCH_DONE: u8 = 0x0B;
    pub const PART_OPENED: u8 = 0x10;
    /// Walky reports motion with the high bit set
    pub const WALKY_OPENING: u8 = 0x83;
    pub const WALKY_CLOSING: u8 = 0x84;
}

/// Error byte values
pub mod error_code {
    pub const NO_ERROR: u8 = 0x00;
    /// No command for this device
    pub const NO_COMMAND: u8 = 0xFD;
}
