//! Wire frame layout, checksums and validation.
//!
//! Every BusT4 packet has the same fixed header followed by a role-specific
//! body:
//!
//! ```text
//! [0x55][len][dst_net][dst_addr][src_net][src_addr][msg_type][inner_len][crc1][body...][crc2][len]
//! ```
//!
//! * `len` is repeated at both ends and equals the total frame size minus 3
//! * `crc1` is the XOR of the six bytes `dst_net` through `inner_len`
//! * `crc2` is the XOR of the body bytes between `crc1` and itself
//!
//! Fields are read through accessor functions over the raw bytes; nothing is
//! overlaid on memory.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use log::warn;

use crate::codes::START_CODE;
use crate::error::{Bust4Error, Result};

pub const OFFSET_START: usize = 0;
pub const OFFSET_LEN: usize = 1;
pub const OFFSET_DST_NET: usize = 2;
pub const OFFSET_DST_ADDR: usize = 3;
pub const OFFSET_SRC_NET: usize = 4;
pub const OFFSET_SRC_ADDR: usize = 5;
pub const OFFSET_MSG_TYPE: usize = 6;
pub const OFFSET_INNER_LEN: usize = 7;
pub const OFFSET_CRC1: usize = 8;
pub const OFFSET_BODY: usize = 9;

/// Start byte, length, six header bytes, crc1, crc2 and the trailing length
pub const MIN_FRAME_LEN: usize = 11;

/// Largest frame the single-byte length field can describe
pub const MAX_FRAME_LEN: usize = u8::MAX as usize + 3;

/// Largest body that still fits in a frame
pub const MAX_BODY_LEN: usize = MAX_FRAME_LEN - MIN_FRAME_LEN;

/// XOR reduction of a byte span; 0 for an empty span.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Header checksum over `dst_net..=inner_len`.
pub fn header_checksum(frame: &[u8]) -> u8 {
    checksum(&frame[OFFSET_DST_NET..OFFSET_CRC1])
}

/// Structural and checksum validation of a complete frame.
pub fn validate_frame(bytes: &[u8]) -> bool {
    check_frame(bytes).is_ok()
}

/// Like [`validate_frame`] but reports which check failed.
pub fn check_frame(bytes: &[u8]) -> Result<()> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(Bust4Error::malformed(format!(
            "frame too short ({} bytes)",
            bytes.len()
        )));
    }
    if bytes.len() > MAX_FRAME_LEN {
        return Err(Bust4Error::malformed(format!(
            "frame too long ({} bytes)",
            bytes.len()
        )));
    }
    if bytes[OFFSET_START] != START_CODE {
        return Err(Bust4Error::malformed(format!(
            "bad start byte 0x{:02X}",
            bytes[OFFSET_START]
        )));
    }

    let total = bytes.len();
    let declared = bytes[OFFSET_LEN] as usize;
    if declared != total - 3 {
        return Err(Bust4Error::malformed(format!(
            "length field {} does not match frame size {}",
            declared, total
        )));
    }

    let crc1 = header_checksum(bytes);
    if crc1 != bytes[OFFSET_CRC1] {
        return Err(Bust4Error::malformed(format!(
            "crc1 mismatch: calc=0x{:02X} recv=0x{:02X}",
            crc1, bytes[OFFSET_CRC1]
        )));
    }

    let crc2 = checksum(&bytes[OFFSET_BODY..total - 2]);
    if crc2 != bytes[total - 2] {
        return Err(Bust4Error::malformed(format!(
            "crc2 mismatch: calc=0x{:02X} recv=0x{:02X}",
            crc2,
            bytes[total - 2]
        )));
    }

    if bytes[total - 1] != bytes[OFFSET_LEN] {
        return Err(Bust4Error::malformed(format!(
            "trailing length 0x{:02X} does not match 0x{:02X}",
            bytes[total - 1],
            bytes[OFFSET_LEN]
        )));
    }

    Ok(())
}

/// Network/address pair identifying a node on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusAddress {
    pub network: u8,
    pub address: u8,
}

impl BusAddress {
    /// Default address of this node
    pub const CONTROLLER: BusAddress = BusAddress::new(0x00, 0x66);
    /// Broadcast to every device on network 0
    pub const BROADCAST: BusAddress = BusAddress::new(0x00, 0xFF);

    pub const fn new(network: u8, address: u8) -> Self {
        Self { network, address }
    }

    pub fn to_bytes(self) -> [u8; 2] {
        [self.network, self.address]
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}:{:02X}", self.network, self.address)
    }
}

impl FromStr for BusAddress {
    type Err = Bust4Error;

    /// Accepts `"00:66"`, `"0066"` or `"00 66"`.
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        let bytes = hex::decode(digits)?;
        match bytes.as_slice() {
            [network, address] => Ok(Self::new(*network, *address)),
            _ => Err(Bust4Error::InvalidArgument("address must be two bytes")),
        }
    }
}

/// A validated frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Validate `bytes` and wrap them.
    pub fn parse(bytes: Bytes) -> Result<Self> {
        check_frame(&bytes)?;
        Ok(Self { bytes })
    }

    /// Assemble a frame around `body`, filling in lengths and both checksums.
    pub fn build(
        destination: BusAddress,
        source: BusAddress,
        message_type: u8,
        body: &[u8],
    ) -> Result<Self> {
        if body.len() > MAX_BODY_LEN {
            warn!(
                "Refusing to build frame: body of {} bytes exceeds {}",
                body.len(),
                MAX_BODY_LEN
            );
            return Err(Bust4Error::InvalidArgument("frame body too long"));
        }

        let total = MIN_FRAME_LEN + body.len();
        let len = (total - 3) as u8;
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(START_CODE);
        buf.put_u8(len);
        buf.put_slice(&destination.to_bytes());
        buf.put_slice(&source.to_bytes());
        buf.put_u8(message_type);
        buf.put_u8((body.len() + 1) as u8);
        let crc1 = header_checksum(&buf);
        buf.put_u8(crc1);
        buf.put_slice(body);
        buf.put_u8(checksum(body));
        buf.put_u8(len);

        Ok(Self {
            bytes: buf.freeze(),
        })
    }

    pub fn destination(&self) -> BusAddress {
        BusAddress::new(self.bytes[OFFSET_DST_NET], self.bytes[OFFSET_DST_ADDR])
    }

    pub fn source(&self) -> BusAddress {
        BusAddress::new(self.bytes[OFFSET_SRC_NET], self.bytes[OFFSET_SRC_ADDR])
    }

    pub fn message_type(&self) -> u8 {
        self.bytes[OFFSET_MSG_TYPE]
    }

    pub fn inner_len(&self) -> u8 {
        self.bytes[OFFSET_INNER_LEN]
    }

    /// Role-specific bytes between crc1 and crc2
    pub fn body(&self) -> &[u8] {
        &self.bytes[OFFSET_BODY..self.bytes.len() - 2]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SBS: [u8; 15] = [
        0x55, 0x0C, 0x00, 0xFF, 0x00, 0x66, 0x01, 0x05, 0x9D, 0x01, 0x82, 0x01, 0x64, 0xE6, 0x0C,
    ];

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0xAA]), 0xAA);
        assert_eq!(checksum(&[0x00, 0xFF, 0x00, 0x66, 0x01, 0x05]), 0x9D);
        assert_eq!(checksum(&[0x01, 0x82, 0x01, 0x64]), 0xE6);
    }

    #[test]
    fn test_validate_reference_dump() {
        assert!(validate_frame(&SBS));
    }

    #[test]
    fn test_validate_rejects_each_field() {
        let mut bad = SBS;
        bad[0] = 0x54;
        assert!(!validate_frame(&bad));

        let mut bad = SBS;
        bad[1] = 0x0D;
        assert!(!validate_frame(&bad));

        let mut bad = SBS;
        bad[8] ^= 0x01;
        assert!(!validate_frame(&bad));

        let mut bad = SBS;
        bad[13] ^= 0x80;
        assert!(!validate_frame(&bad));

        let mut bad = SBS;
        bad[14] = 0x0B;
        assert!(!validate_frame(&bad));

        assert!(!validate_frame(&SBS[..10]));
    }

    #[test]
    fn test_check_frame_reports_crc() {
        let mut bad = SBS;
        bad[8] = 0x00;
        let err = check_frame(&bad).unwrap_err();
        assert_eq!(
            err,
            Bust4Error::malformed("crc1 mismatch: calc=0x9D recv=0x00")
        );
    }

    #[test]
    fn test_build_matches_reference() {
        let frame = Frame::build(
            BusAddress::BROADCAST,
            BusAddress::CONTROLLER,
            0x01,
            &[0x01, 0x82, 0x01, 0x64],
        )
        .unwrap();
        assert_eq!(frame.as_bytes(), &SBS);
        assert_eq!(frame.destination(), BusAddress::BROADCAST);
        assert_eq!(frame.source(), BusAddress::CONTROLLER);
        assert_eq!(frame.message_type(), 0x01);
        assert_eq!(frame.inner_len(), 0x05);
        assert_eq!(frame.body(), &[0x01, 0x82, 0x01, 0x64]);
    }

    #[test]
    fn test_build_empty_body() {
        let frame = Frame::build(BusAddress::BROADCAST, BusAddress::CONTROLLER, 0x08, &[]).unwrap();
        assert_eq!(frame.len(), MIN_FRAME_LEN);
        assert!(validate_frame(frame.as_bytes()));
        assert!(frame.body().is_empty());
    }

    #[test]
    fn test_build_rejects_oversized_body() {
        let body = vec![0u8; MAX_BODY_LEN + 1];
        assert!(Frame::build(BusAddress::BROADCAST, BusAddress::CONTROLLER, 0x08, &body).is_err());

        let body = vec![0u8; MAX_BODY_LEN];
        let frame = Frame::build(BusAddress::BROADCAST, BusAddress::CONTROLLER, 0x08, &body).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_LEN);
        assert!(validate_frame(frame.as_bytes()));
    }

    #[test]
    fn test_parse() {
        assert!(Frame::parse(Bytes::from_static(&SBS)).is_ok());
        assert!(Frame::parse(Bytes::from_static(&SBS[..14])).is_err());
    }

    #[test]
    fn test_bus_address_text() {
        let addr: BusAddress = "00:66".parse().unwrap();
        assert_eq!(addr, BusAddress::CONTROLLER);
        assert_eq!("00ff".parse::<BusAddress>().unwrap(), BusAddress::BROADCAST);
        assert_eq!(BusAddress::new(0x01, 0x0A).to_string(), "01:0A");
        assert!("0066FF".parse::<BusAddress>().is_err());
        assert!("zz".parse::<BusAddress>().is_err());
    }
}
