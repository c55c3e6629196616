//! Outgoing command construction.

use bytes::Bytes;
use log::{debug, warn};

use crate::codes::{ControlCommand, RunMode, Whose};
use crate::error::{Bust4Error, Result};
use crate::frame::{checksum, header_checksum, BusAddress, Frame, OFFSET_BODY, OFFSET_CRC1};
use crate::message::{InfoRequest, Message, Packet};

/// Size of a control-shape frame
pub const CONTROL_FRAME_LEN: usize = 15;

/// Offset of crc2 in a control-shape frame
const CONTROL_CRC2: usize = CONTROL_FRAME_LEN - 2;

/// Builds frames on behalf of one bus node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEncoder {
    source: BusAddress,
    destination: BusAddress,
}

impl CommandEncoder {
    pub fn new(source: BusAddress, destination: BusAddress) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn source(&self) -> BusAddress {
        self.source
    }

    /// Destination of control commands
    pub fn destination(&self) -> BusAddress {
        self.destination
    }

    pub fn set_destination(&mut self, destination: BusAddress) {
        self.destination = destination;
    }

    /// Control command to the default destination.
    pub fn control(&self, command: ControlCommand) -> Result<Frame> {
        self.control_code(command as u8)
    }

    /// Control command from a raw code; unknown codes are sent as-is.
    pub fn control_code(&self, code: u8) -> Result<Frame> {
        Packet::new(
            self.destination,
            self.source,
            Message::Control { command: code },
        )
        .encode()
    }

    /// Addressed information request.
    pub fn info(
        &self,
        destination: BusAddress,
        whose: Whose,
        submenu: u8,
        run: RunMode,
        next_data: u8,
        data: &[u8],
    ) -> Result<Frame> {
        let request = InfoRequest::new(whose, submenu, run)
            .with_next_data(next_data)
            .with_data(data);
        self.request(destination, request)
    }

    /// Information request built from raw fields.
    pub fn request(&self, destination: BusAddress, request: InfoRequest) -> Result<Frame> {
        Packet::new(destination, self.source, Message::InfoRequest(request)).encode()
    }
}

/// Parse operator hex text, ignoring separators and other punctuation.
pub fn parse_hex_command(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if digits.is_empty() {
        return Err(Bust4Error::InvalidArgument("empty command"));
    }
    Ok(hex::decode(digits)?)
}

/// Parse a raw command and fix its checksums.
///
/// Only the 15-byte control shape has known checksum offsets; frames of any
/// other length are passed through unchanged.
pub fn prepare_raw_command(text: &str) -> Result<Bytes> {
    let mut bytes = parse_hex_command(text)?;
    if bytes.len() == CONTROL_FRAME_LEN {
        let crc1 = header_checksum(&bytes);
        let crc2 = checksum(&bytes[OFFSET_BODY..CONTROL_CRC2]);
        if bytes[OFFSET_CRC1] != crc1 || bytes[CONTROL_CRC2] != crc2 {
            debug!(
                "Raw command checksums corrected: crc1 0x{:02X}->0x{:02X} crc2 0x{:02X}->0x{:02X}",
                bytes[OFFSET_CRC1], crc1, bytes[CONTROL_CRC2], crc2
            );
        }
        bytes[OFFSET_CRC1] = crc1;
        bytes[CONTROL_CRC2] = crc2;
    } else {
        warn!(
            "Raw command of {} bytes sent without checksum correction",
            bytes.len()
        );
    }
    Ok(Bytes::from(bytes))
}
