//! Serial line abstraction.
//!
//! The engine never touches a UART directly. The firmware implements
//! [`BusTransport`] over the real driver; tests and host tools use
//! [`RecordingBus`].

use std::time::Duration;

use bytes::Bytes;

use crate::error::{Bust4Error, Result};

/// Line rate for normal traffic
pub const BAUD_WORK: u32 = 19200;
/// Line rate used to stretch a zero byte into a break
pub const BAUD_BREAK: u32 = 9200;

/// UART parameters for the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SerialConfig {
    pub work_baud: u32,
    pub break_baud: u32,
    /// Low time of the break preceding every frame
    pub break_duration: Duration,
    pub tx_pin: i32,
    pub rx_pin: i32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            work_baud: BAUD_WORK,
            break_baud: BAUD_BREAK,
            break_duration: Duration::from_micros(519),
            tx_pin: 17,
            rx_pin: 16,
        }
    }
}

impl SerialConfig {
    pub fn with_pins(mut self, tx_pin: i32, rx_pin: i32) -> Self {
        self.tx_pin = tx_pin;
        self.rx_pin = rx_pin;
        self
    }

    /// Time to shift out one 8N1 character at the work rate
    pub fn byte_time(&self) -> Duration {
        Duration::from_micros(10_000_000 / u64::from(self.work_baud.max(1)))
    }
}

/// Half-duplex byte sink with break support.
pub trait BusTransport {
    /// Hold the line low long enough for receivers to resynchronize.
    fn send_break(&mut self) -> Result<()>;

    /// Write bytes at the work rate, blocking until they are queued.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Break followed by the frame.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.send_break()?;
        self.write_all(frame)
    }
}

/// In-memory transport that records every frame written to it.
#[derive(Debug, Default)]
pub struct RecordingBus {
    sent: Vec<Bytes>,
    breaks: usize,
    pending_break: bool,
    fail_writes: bool,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames written so far, each preceded by a break
    pub fn sent(&self) -> &[Bytes] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.sent)
    }

    pub fn breaks(&self) -> usize {
        self.breaks
    }

    /// Make subsequent writes fail
    pub fn set_failing(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl BusTransport for RecordingBus {
    fn send_break(&mut self) -> Result<()> {
        self.breaks += 1;
        self.pending_break = true;
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(Bust4Error::Transport("write failed".to_string()));
        }
        if !self.pending_break {
            return Err(Bust4Error::Transport("write without preceding break".to_string()));
        }
        self.pending_break = false;
        self.sent.push(Bytes::copy_from_slice(bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_serial_config() {
        let config = SerialConfig::default();
        assert_eq!(config.work_baud, 19200);
        assert_eq!(config.break_baud, 9200);
        assert_eq!(config.break_duration, Duration::from_micros(519));
        assert_eq!(config.byte_time(), Duration::from_micros(520));
    }

    #[test]
    fn test_recording_bus_frames() {
        let mut bus = RecordingBus::new();
        bus.send_frame(&[0x55, 0x01]).unwrap();
        bus.send_frame(&[0x55, 0x02]).unwrap();
        assert_eq!(bus.breaks(), 2);
        assert_eq!(bus.sent().len(), 2);
        assert_eq!(&bus.sent()[1][..], &[0x55, 0x02]);
    }

    #[test]
    fn test_recording_bus_requires_break() {
        let mut bus = RecordingBus::new();
        assert!(bus.write_all(&[0x55]).is_err());

        bus.set_failing(true);
        assert!(matches!(
            bus.send_frame(&[0x55]),
            Err(Bust4Error::Transport(_))
        ));
    }
}
