//! Message roles carried inside a frame body.
//!
//! A [`Packet`] is the decoded view of a [`Frame`]: the two bus addresses plus
//! one of the [`Message`] shapes. Classification is done on the body layout
//! alone, so bytes that match none of the known shapes decode as
//! [`Message::Unknown`] instead of failing.

use bytes::Bytes;

use crate::codes::{
    submenu, MessageType, RunMode, Whose, CONTROL_OFFSET, MENU_CONTROL, REPLY_OFFSET,
};
use crate::error::Result;
use crate::frame::{BusAddress, Frame};

/// Request body prefix: whose, submenu, run, next_data, data_len
const REQUEST_HEADER_LEN: usize = 5;
/// Response body prefix: whose, submenu, run, next_data, error
const RESPONSE_HEADER_LEN: usize = 5;
/// menu, submenu, sub_run, hb, lb, error
const COMMAND_REPLY_LEN: usize = 6;

/// Submenu code of a RUN echo
const RUN_REPLY: u8 = submenu::RUN - REPLY_OFFSET;
/// Submenu code of a status-in-motion reply
const STA_REPLY: u8 = submenu::STA - REPLY_OFFSET;

/// Read or write request for a device parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InfoRequest {
    pub whose: u8,
    pub submenu: u8,
    pub run: u8,
    pub next_data: u8,
    pub data: Vec<u8>,
}

impl InfoRequest {
    pub fn new(whose: Whose, submenu: u8, run: RunMode) -> Self {
        Self {
            whose: whose as u8,
            submenu,
            run: run as u8,
            next_data: 0x00,
            data: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_next_data(mut self, next_data: u8) -> Self {
        self.next_data = next_data;
        self
    }
}

/// Device answer to an [`InfoRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InfoResponse {
    pub whose: u8,
    pub submenu: u8,
    /// Request run code minus 0x80 (or 0x81 when more blocks follow)
    pub run: u8,
    pub next_data: u8,
    pub error: u8,
    pub data: Vec<u8>,
}

impl InfoResponse {
    pub fn request_mode(&self) -> Option<RunMode> {
        RunMode::from_reply(self.run)
    }

    /// Big-endian value of the first two data bytes
    pub fn value_u16(&self) -> Option<u16> {
        match self.data.as_slice() {
            [hb, lb, ..] => Some(u16::from_be_bytes([*hb, *lb])),
            _ => None,
        }
    }
}

/// Echo or status reply to a control command.
///
/// Sent with message type INF; the body is menu, submenu, sub_run, hb, lb,
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandReply {
    /// `CONTROL` or `FOR_CU`
    pub menu: u8,
    /// RUN or STA code minus 0x80
    pub submenu: u8,
    /// Echoed command plus 0x80, or a status code
    pub sub_run: u8,
    /// hb/lb pair; the drive position for status replies
    pub value: u16,
    pub error: u8,
}

impl CommandReply {
    pub fn is_run_echo(&self) -> bool {
        self.submenu == RUN_REPLY
    }

    pub fn is_status(&self) -> bool {
        self.submenu == STA_REPLY
    }

    /// Command a RUN echo refers to
    pub fn echoed_command(&self) -> Option<u8> {
        self.is_run_echo().then(|| self.sub_run.wrapping_sub(REPLY_OFFSET))
    }
}

/// Body shapes recognised on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Message {
    /// Direct motion command: menu CONTROL, submenu RUN, command, 0x64
    Control { command: u8 },
    InfoRequest(InfoRequest),
    InfoResponse(InfoResponse),
    CommandReply(CommandReply),
    /// Anything else, kept verbatim
    Unknown { message_type: u8, body: Vec<u8> },
}

impl Message {
    pub fn message_type(&self) -> u8 {
        match self {
            Message::Control { .. } => MessageType::Cmd as u8,
            Message::InfoRequest(_) | Message::InfoResponse(_) | Message::CommandReply(_) => {
                MessageType::Inf as u8
            }
            Message::Unknown { message_type, .. } => *message_type,
        }
    }

    pub fn body(&self) -> Vec<u8> {
        match self {
            Message::Control { command } => {
                vec![MENU_CONTROL, submenu::RUN, *command, CONTROL_OFFSET]
            }
            Message::InfoRequest(req) => {
                let mut body = Vec::with_capacity(REQUEST_HEADER_LEN + req.data.len());
                body.extend_from_slice(&[
                    req.whose,
                    req.submenu,
                    req.run,
                    req.next_data,
                    req.data.len() as u8,
                ]);
                body.extend_from_slice(&req.data);
                body
            }
            Message::InfoResponse(rsp) => {
                let mut body = Vec::with_capacity(RESPONSE_HEADER_LEN + rsp.data.len());
                body.extend_from_slice(&[
                    rsp.whose,
                    rsp.submenu,
                    rsp.run,
                    rsp.next_data,
                    rsp.error,
                ]);
                body.extend_from_slice(&rsp.data);
                body
            }
            Message::CommandReply(reply) => {
                let [hb, lb] = reply.value.to_be_bytes();
                vec![reply.menu, reply.submenu, reply.sub_run, hb, lb, reply.error]
            }
            Message::Unknown { body, .. } => body.clone(),
        }
    }

    /// Classify a frame body.
    ///
    /// Command replies are checked first: a status reply's run byte can
    /// collide with an info reply code, while its submenu byte never names a
    /// readable parameter.
    pub fn classify(message_type: u8, body: &[u8]) -> Message {
        let is_inf = message_type == MessageType::Inf as u8;
        let is_cmd = message_type == MessageType::Cmd as u8;

        if is_inf && is_command_reply(body) {
            return Message::CommandReply(CommandReply {
                menu: body[0],
                submenu: body[1],
                sub_run: body[2],
                value: u16::from_be_bytes([body[3], body[4]]),
                error: body[5],
            });
        }

        if is_inf && body.len() >= RESPONSE_HEADER_LEN && RunMode::from_reply(body[2]).is_some() {
            return Message::InfoResponse(InfoResponse {
                whose: body[0],
                submenu: body[1],
                run: body[2],
                next_data: body[3],
                error: body[4],
                data: body[RESPONSE_HEADER_LEN..].to_vec(),
            });
        }

        if is_inf && looks_like_request(body) {
            return Message::InfoRequest(InfoRequest {
                whose: body[0],
                submenu: body[1],
                run: body[2],
                next_data: body[3],
                data: body[REQUEST_HEADER_LEN..].to_vec(),
            });
        }

        if is_cmd
            && body.len() == 4
            && body[0] == MENU_CONTROL
            && body[1] == submenu::RUN
            && body[3] == CONTROL_OFFSET
        {
            return Message::Control { command: body[2] };
        }

        Message::Unknown {
            message_type,
            body: body.to_vec(),
        }
    }
}

/// menu CONTROL/FOR_CU, then either a RUN echo carrying `command + 0x80` or
/// a STA reply carrying a status code
fn is_command_reply(body: &[u8]) -> bool {
    if body.len() < COMMAND_REPLY_LEN {
        return false;
    }
    if body[0] != MENU_CONTROL && body[0] != Whose::ControlUnit as u8 {
        return false;
    }
    if looks_like_request(body) {
        return false;
    }
    match body[1] {
        RUN_REPLY => body[2] >= REPLY_OFFSET,
        STA_REPLY => true,
        _ => false,
    }
}

fn looks_like_request(body: &[u8]) -> bool {
    body.len() >= REQUEST_HEADER_LEN
        && RunMode::from_u8(body[2]).is_some()
        && body.len() == REQUEST_HEADER_LEN + body[4] as usize
}

/// What a reply answers. Used to pair replies with the frame in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReplyKey {
    /// Response to a GET/SET/GET_SUPPORTED request for this submenu
    Info { submenu: u8 },
    /// RUN echo of this control command
    Command(u8),
    /// Status-in-motion report
    Status,
}

impl ReplyKey {
    /// Key carried by a received message, if it is a reply at all.
    pub fn of_reply(message: &Message) -> Option<Self> {
        match message {
            Message::InfoResponse(rsp) => Some(ReplyKey::Info {
                submenu: rsp.submenu,
            }),
            Message::CommandReply(reply) if reply.is_status() => Some(ReplyKey::Status),
            Message::CommandReply(reply) => reply.echoed_command().map(ReplyKey::Command),
            _ => None,
        }
    }

    /// Key of the reply an outgoing frame waits for. `None` when the frame
    /// is not a recognisable request, in which case any reply will do.
    pub fn expected_for(frame: &[u8]) -> Option<Self> {
        match Packet::decode(frame).ok()?.message {
            Message::Control { command } => Some(ReplyKey::Command(command)),
            Message::InfoRequest(req) => Some(ReplyKey::Info {
                submenu: req.submenu,
            }),
            _ => None,
        }
    }
}

/// Addressed message: the decoded form of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet {
    pub destination: BusAddress,
    pub source: BusAddress,
    pub message: Message,
}

impl Packet {
    pub fn new(destination: BusAddress, source: BusAddress, message: Message) -> Self {
        Self {
            destination,
            source,
            message,
        }
    }

    pub fn encode(&self) -> Result<Frame> {
        Frame::build(
            self.destination,
            self.source,
            self.message.message_type(),
            &self.message.body(),
        )
    }

    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            destination: frame.destination(),
            source: frame.source(),
            message: Message::classify(frame.message_type(), frame.body()),
        }
    }

    /// Validate raw bytes and decode them.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let frame = Frame::parse(Bytes::copy_from_slice(bytes))?;
        Ok(Self::from_frame(&frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::ControlCommand;
    use crate::frame::validate_frame;

    fn packet(message: Message) -> Packet {
        Packet::new(BusAddress::BROADCAST, BusAddress::CONTROLLER, message)
    }

    #[test]
    fn test_control_encode() {
        let frame = packet(Message::Control {
            command: ControlCommand::Open as u8,
        })
        .encode()
        .unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0x55, 0x0C, 0x00, 0xFF, 0x00, 0x66, 0x01, 0x05, 0x9D, 0x01, 0x82, 0x03, 0x64, 0xE4, 0x0C]
        );
    }

    #[test]
    fn test_info_request_reference() {
        let req = InfoRequest::new(Whose::All, submenu::MAN, RunMode::Get);
        let frame = packet(Message::InfoRequest(req.clone())).encode().unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0x55, 0x0D, 0x00, 0xFF, 0x00, 0x66, 0x08, 0x06, 0x97, 0x00, 0x08, 0x99, 0x00, 0x00, 0x91, 0x0D]
        );
        let decoded = Packet::decode(frame.as_bytes()).unwrap();
        assert_eq!(decoded.message, Message::InfoRequest(req));
    }

    #[test]
    fn test_info_request_with_data() {
        let req = InfoRequest::new(Whose::ControlUnit, submenu::CUR_POS, RunMode::Get).with_data([0x01]);
        let frame = packet(Message::InfoRequest(req.clone())).encode().unwrap();
        assert!(validate_frame(frame.as_bytes()));
        assert_eq!(frame.inner_len(), 7);
        assert_eq!(Packet::from_frame(&frame).message, Message::InfoRequest(req));
    }

    #[test]
    fn test_info_response_decode() {
        let rsp = InfoResponse {
            whose: Whose::ControlUnit as u8,
            submenu: submenu::CUR_POS,
            run: RunMode::Get.reply_code(),
            next_data: 0x01,
            error: 0x00,
            data: vec![0x04, 0x00],
        };
        let frame = Packet::new(BusAddress::CONTROLLER, BusAddress::new(0x00, 0x03), Message::InfoResponse(rsp.clone()))
            .encode()
            .unwrap();
        let decoded = Packet::from_frame(&frame);
        assert_eq!(decoded.source, BusAddress::new(0x00, 0x03));
        match decoded.message {
            Message::InfoResponse(got) => {
                assert_eq!(got, rsp);
                assert_eq!(got.value_u16(), Some(0x0400));
                assert_eq!(got.request_mode(), Some(RunMode::Get));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_command_reply_decode() {
        let reply = CommandReply {
            menu: Whose::ControlUnit as u8,
            submenu: 0x40,
            sub_run: 0x02,
            value: 0x0123,
            error: 0x00,
        };
        let frame = packet(Message::CommandReply(reply)).encode().unwrap();
        let decoded = Packet::from_frame(&frame);
        assert_eq!(decoded.message, Message::CommandReply(reply));
        assert!(reply.is_status());
        assert!(!reply.is_run_echo());
    }

    #[test]
    fn test_status_reply_not_mistaken_for_info_response() {
        // STOPPED (0x08) equals the partial GET_SUPP reply code
        let body = [0x04, 0x40, 0x08, 0x01, 0x00, 0x00];
        match Message::classify(MessageType::Inf as u8, &body) {
            Message::CommandReply(reply) => {
                assert!(reply.is_status());
                assert_eq!(reply.sub_run, 0x08);
                assert_eq!(reply.value, 0x0100);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_run_echo() {
        let body = [0x01, 0x02, 0x83, 0x00, 0x00, 0x00];
        match Message::classify(MessageType::Inf as u8, &body) {
            Message::CommandReply(reply) => {
                assert!(reply.is_run_echo());
                assert_eq!(reply.echoed_command(), Some(0x03));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_current_maneuver_response_stays_info() {
        // CUR_MAN (0x02) GET reply shares the RUN echo submenu byte
        let body = [0x04, 0x02, 0x19, 0x00, 0x00, 0x03];
        assert!(matches!(
            Message::classify(MessageType::Inf as u8, &body),
            Message::InfoResponse(_)
        ));
    }

    #[test]
    fn test_unknown_is_tolerated() {
        let frame = Frame::build(BusAddress::BROADCAST, BusAddress::CONTROLLER, 0x03, &[0xAA, 0xBB]).unwrap();
        let decoded = Packet::from_frame(&frame);
        assert_eq!(
            decoded.message,
            Message::Unknown {
                message_type: 0x03,
                body: vec![0xAA, 0xBB]
            }
        );
    }

    #[test]
    fn test_request_with_wrong_data_len_is_unknown() {
        let body = [0x04, 0x11, 0x99, 0x00, 0x05, 0x01];
        assert!(matches!(
            Message::classify(MessageType::Inf as u8, &body),
            Message::Unknown { .. }
        ));
    }

    #[test]
    fn test_reply_keys_pair_requests_and_replies() {
        let control = packet(Message::Control {
            command: ControlCommand::Open as u8,
        })
        .encode()
        .unwrap();
        assert_eq!(
            ReplyKey::expected_for(control.as_bytes()),
            Some(ReplyKey::Command(0x03))
        );

        let request = packet(Message::InfoRequest(InfoRequest::new(
            Whose::ControlUnit,
            submenu::CUR_POS,
            RunMode::Get,
        )))
        .encode()
        .unwrap();
        assert_eq!(
            ReplyKey::expected_for(request.as_bytes()),
            Some(ReplyKey::Info {
                submenu: submenu::CUR_POS
            })
        );
        assert_eq!(ReplyKey::expected_for(&[0x55, 0x01]), None);

        let echo = Message::CommandReply(CommandReply {
            menu: MENU_CONTROL,
            submenu: RUN_REPLY,
            sub_run: 0x83,
            value: 0,
            error: 0,
        });
        assert_eq!(ReplyKey::of_reply(&echo), Some(ReplyKey::Command(0x03)));
        let status = Message::CommandReply(CommandReply {
            menu: Whose::ControlUnit as u8,
            submenu: STA_REPLY,
            sub_run: 0x02,
            value: 0x0100,
            error: 0,
        });
        assert_eq!(ReplyKey::of_reply(&status), Some(ReplyKey::Status));
        assert_eq!(
            ReplyKey::of_reply(&Message::Control { command: 0x03 }),
            None
        );
    }
}
