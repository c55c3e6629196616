//! # nice-bust4
//!
//! Protocol engine for the Nice BusT4 serial bus used by gate and door
//! actuators.
//!
//! The bus runs half-duplex at 19200 8N1. Every frame is preceded by a break
//! and starts with `0x55`; the header carries destination and source
//! network/address pairs and two XOR checksums. This crate handles:
//!
//! - **Framing**: checksum computation and frame validation ([`frame`])
//! - **Encoding**: control commands, information requests and raw operator
//!   frames ([`encoder`], [`message`])
//! - **Receiving**: byte-at-a-time accumulation with resynchronisation
//!   ([`receiver`])
//! - **Interpretation**: status, position, identity and settings replies
//!   ([`interpreter`])
//! - **Scheduling**: a FIFO transmit queue with one frame in flight
//!   ([`scheduler`])
//! - **Cover state**: motion, fractional position and publish suppression
//!   ([`cover`])
//!
//! [`ProtocolEngine`] ties these together behind `on_byte`, `tick` and
//! `enqueue_command`. The serial line itself is abstracted by
//! [`BusTransport`].
//!
//! # Features
//!
//! - `std` (default): turns on std support in `bytes`, `log`, `hex` and
//!   `serde`. The crate itself always needs std for `Instant`.
//! - `serde` (default): Serialize/Deserialize for configuration and
//!   published state.
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use nice_bust4::{ControlCommand, EngineConfig, ProtocolEngine, RecordingBus};
//!
//! let mut engine = ProtocolEngine::new(EngineConfig::default());
//! let mut bus = RecordingBus::new();
//!
//! engine.enqueue_command(ControlCommand::StepByStep).unwrap();
//! engine.tick(&mut bus, Instant::now());
//!
//! assert_eq!(
//!     hex::encode(&bus.sent()[0]),
//!     "550c00ff006601059d01820164e60c"
//! );
//! ```

pub mod codes;
pub mod config;
pub mod cover;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod frame;
pub mod interpreter;
pub mod message;
pub mod receiver;
pub mod scheduler;
pub mod transport;

pub use codes::{ControlCommand, MessageType, MotorType, RunMode, Whose};
pub use config::EngineConfig;
pub use cover::{CoverCall, CoverState, CoverTraits, MotionState, PublishedState};
pub use encoder::{parse_hex_command, prepare_raw_command, CommandEncoder};
pub use engine::{EngineStats, ProtocolEngine};
pub use error::{Bust4Error, Fault, Result};
pub use frame::{checksum, validate_frame, BusAddress, Frame};
pub use interpreter::{EndStop, Identity, Setting, Settings};
pub use message::{Message, Packet};
pub use transport::{BusTransport, RecordingBus, SerialConfig};
